//! Backend seam: the document store that holds containers and fragments.
//!
//! Implementations own their wire protocol and report failures through
//! [`TransportError`], classified so the retry layer can tell a busy backend
//! from a missing object.  Calls may be repeated by the caller at any time;
//! an upload that fails after the backend already stored it leaves a
//! duplicate behind, which `recovery` reconciles after the upload finishes.

pub mod local;
pub mod memory;

use std::fmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fragment::FragmentMeta;
use crate::retry::Retryable;

pub use local::LocalTransport;
pub use memory::MemoryTransport;

// ── Identifiers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for ContainerId {
    fn from(s: &str) -> Self { ContainerId(s.to_owned()) }
}

// ── Listings ─────────────────────────────────────────────────────────────────

/// A persisted fragment as the backend reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub id:          FragmentId,
    pub sequence:    u64,
    /// Absent for fragments stored without integrity metadata.
    pub checksum:    Option<u32>,
    pub payload_len: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id:   ContainerId,
    pub name: String,
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Worth retrying: timeouts, rate limits, interrupted transfers.
    #[error("Transient backend failure: {0}")]
    Transient(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// The backend refused the request; retrying will not change that.
    #[error("Backend rejected request: {0}")]
    Rejected(String),
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

// ── Transport trait ──────────────────────────────────────────────────────────

pub trait Transport {
    fn create_container(&mut self, name: &str) -> Result<ContainerId, TransportError>;

    /// Store one encoded image.  `image` is an opaque lossless raster.
    fn upload_fragment(
        &mut self,
        container: &ContainerId,
        meta:      &FragmentMeta,
        image:     &[u8],
    ) -> Result<FragmentId, TransportError>;

    /// Fragments of `container`, most recently created first.
    fn list_fragments(&mut self, container: &ContainerId) -> Result<Vec<FragmentRecord>, TransportError>;

    fn fetch_fragment_bytes(&mut self, fragment: &FragmentId) -> Result<Vec<u8>, TransportError>;

    fn delete_fragment(&mut self, fragment: &FragmentId) -> Result<(), TransportError>;

    /// Remove a container and every fragment in it.
    fn delete_container(&mut self, container: &ContainerId) -> Result<(), TransportError>;

    fn list_containers(&mut self) -> Result<Vec<ContainerInfo>, TransportError>;

    fn rename_container(&mut self, container: &ContainerId, name: &str) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn create_container(&mut self, name: &str) -> Result<ContainerId, TransportError> {
        (**self).create_container(name)
    }
    fn upload_fragment(&mut self, c: &ContainerId, m: &FragmentMeta, i: &[u8]) -> Result<FragmentId, TransportError> {
        (**self).upload_fragment(c, m, i)
    }
    fn list_fragments(&mut self, c: &ContainerId) -> Result<Vec<FragmentRecord>, TransportError> {
        (**self).list_fragments(c)
    }
    fn fetch_fragment_bytes(&mut self, f: &FragmentId) -> Result<Vec<u8>, TransportError> {
        (**self).fetch_fragment_bytes(f)
    }
    fn delete_fragment(&mut self, f: &FragmentId) -> Result<(), TransportError> {
        (**self).delete_fragment(f)
    }
    fn delete_container(&mut self, c: &ContainerId) -> Result<(), TransportError> {
        (**self).delete_container(c)
    }
    fn list_containers(&mut self) -> Result<Vec<ContainerInfo>, TransportError> {
        (**self).list_containers()
    }
    fn rename_container(&mut self, c: &ContainerId, n: &str) -> Result<(), TransportError> {
        (**self).rename_container(c, n)
    }
}
