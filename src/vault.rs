//! High-level [`Vault`] API: the embedding surface over one transport.
//!
//! ```no_run
//! use pixelvault::diagnostics::DiagnosticEntry;
//! use pixelvault::transport::LocalTransport;
//! use pixelvault::vault::{Vault, VaultOptions};
//!
//! let store = LocalTransport::open("/tmp/pixelvault")?;
//! let mut vault = Vault::new(store, Vec::<DiagnosticEntry>::new(), VaultOptions::default());
//!
//! let report = vault.upload("notes.txt", &b"Hello, world!"[..], Some(13))?;
//! let mut out = Vec::new();
//! vault.download(&report.container, &mut out)?;
//! assert_eq!(out, b"Hello, world!");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::io::{Read, Write};

use crate::assembler::{self, DownloadReport};
use crate::codec::{CanvasGeometry, Framing};
use crate::config::Config;
use crate::confirm::Confirm;
use crate::container::{self, DeleteOutcome};
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::recovery::{self, ResolutionReport};
use crate::retry::RetryPolicy;
use crate::transport::{ContainerId, ContainerInfo, Transport};
use crate::upload::{self, UploadReport};

// ── VaultOptions ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultOptions {
    pub geometry: CanvasGeometry,
    pub framing:  Framing,
    pub retry:    RetryPolicy,
}

impl VaultOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            geometry: config.geometry()?,
            framing:  config.codec.framing,
            retry:    config.retry_policy(),
        })
    }
}

// ── Vault ─────────────────────────────────────────────────────────────────────

/// A transport plus the diagnostics sink every operation reports into.
pub struct Vault<T: Transport, D: Diagnostics> {
    transport:   T,
    diagnostics: D,
    options:     VaultOptions,
}

impl<T: Transport, D: Diagnostics> Vault<T, D> {
    pub fn new(transport: T, diagnostics: D, options: VaultOptions) -> Self {
        Self { transport, diagnostics, options }
    }

    pub fn options(&self) -> &VaultOptions {
        &self.options
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn diagnostics_mut(&mut self) -> &mut D {
        &mut self.diagnostics
    }

    pub fn into_parts(self) -> (T, D) {
        (self.transport, self.diagnostics)
    }

    // ── Operations ───────────────────────────────────────────────────────────

    pub fn upload<R: Read>(&mut self, name: &str, source: R, size: Option<u64>) -> Result<UploadReport> {
        upload::upload(
            &mut self.transport,
            name,
            source,
            size,
            &self.options.geometry,
            &self.options.retry,
            &mut self.diagnostics,
        )
    }

    pub fn download<W: Write>(&mut self, container: &ContainerId, out: &mut W) -> Result<DownloadReport> {
        assembler::download(
            &mut self.transport,
            container,
            &self.options.geometry,
            self.options.framing,
            &self.options.retry,
            &mut self.diagnostics,
            out,
        )
    }

    /// Re-run duplicate resolution on an existing container.
    pub fn resolve(&mut self, container: &ContainerId) -> Result<ResolutionReport> {
        recovery::resolve_duplicates(
            &mut self.transport,
            container,
            &self.options.geometry,
            &self.options.retry,
            &mut self.diagnostics,
        )
    }

    pub fn list(&mut self) -> Result<Vec<ContainerInfo>> {
        container::list(&mut self.transport, &self.options.retry)
    }

    pub fn rename(&mut self, container: &ContainerId, new_name: &str) -> Result<()> {
        container::rename(&mut self.transport, container, new_name, &self.options.retry, &mut self.diagnostics)
    }

    pub fn delete(&mut self, container: &ContainerId, confirm: &mut dyn Confirm) -> Result<DeleteOutcome> {
        container::delete(&mut self.transport, container, confirm, &self.options.retry, &mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticEntry;
    use crate::transport::MemoryTransport;

    fn small_vault() -> Vault<MemoryTransport, Vec<DiagnosticEntry>> {
        let options = VaultOptions {
            geometry: CanvasGeometry::new(32).unwrap(),
            framing:  Framing::Sentinel,
            retry:    RetryPolicy::immediate(3),
        };
        Vault::new(MemoryTransport::new(), Vec::new(), options)
    }

    #[test]
    fn options_follow_config() {
        let mut config = Config::default();
        config.codec.max_fragment_bytes = 99;
        config.codec.framing = Framing::LengthMetadata;
        config.retry.max_attempts = 2;
        let options = VaultOptions::from_config(&config).unwrap();
        assert_eq!(options.geometry.max_fragment_bytes, 99);
        assert_eq!(options.framing, Framing::LengthMetadata);
        assert_eq!(options.retry.max_attempts, 2);
    }

    #[test]
    fn upload_list_rename_download() {
        let mut vault = small_vault();
        let data: Vec<u8> = (0..100u8).collect();
        let report = vault.upload("numbers", &data[..], Some(data.len() as u64)).unwrap();
        assert!(!report.verdict.is_corrupt());
        assert_eq!(report.sent, 4);

        vault.rename(&report.container, "renamed").unwrap();
        let listed = vault.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "renamed");

        let mut out = Vec::new();
        let downloaded = vault.download(&report.container, &mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(downloaded.fragments, 4);
        assert!(vault.diagnostics_mut().is_empty());
    }

    #[test]
    fn resolve_on_clean_container_is_a_no_op() {
        let mut vault = small_vault();
        let report = vault.upload("x", &b"abc"[..], Some(3)).unwrap();
        assert!(vault.resolve(&report.container).unwrap().is_clean());
    }
}
