//! Plain-text diagnostic log, handed explicitly to whatever needs it.
//!
//! One log per command invocation:
//!
//! ```text
//! Version: 1.0.17
//!
//! ----------------------------------------
//! Fragment download failure
//!     container: 3f2a…
//!     fragment: 3f2a….9c1e…
//! Error:
//! read timed out
//! ----------------------------------------
//! Normal termination.
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use tracing::warn;

pub const SEPARATOR: &str = "----------------------------------------";

/// One structured entry: what was being done, to what, and what went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub operation: String,
    pub fields:    Vec<(&'static str, String)>,
    pub error:     Option<String>,
}

impl DiagnosticEntry {
    pub fn new(operation: impl Into<String>) -> Self {
        Self { operation: operation.into(), fields: Vec::new(), error: None }
    }

    pub fn field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    pub fn error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for DiagnosticEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.operation)?;
        for (key, value) in &self.fields {
            writeln!(f, "\t{key}: {value}")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "Error:")?;
            writeln!(f, "{error}")?;
        }
        Ok(())
    }
}

/// Sink for diagnostic entries.
pub trait Diagnostics {
    fn record(&mut self, entry: DiagnosticEntry);
}

impl<D: Diagnostics + ?Sized> Diagnostics for &mut D {
    fn record(&mut self, entry: DiagnosticEntry) {
        (**self).record(entry);
    }
}

/// Collects entries in memory.
impl Diagnostics for Vec<DiagnosticEntry> {
    fn record(&mut self, entry: DiagnosticEntry) {
        self.push(entry);
    }
}

/// Writes entries to `W` as they arrive.
pub struct DiagnosticLog<W: Write> {
    out:    W,
    broken: bool,
}

impl DiagnosticLog<BufWriter<File>> {
    /// Truncate (or create) the log file at `path` and write the banner.
    pub fn create<P: AsRef<Path>>(path: P, version: &str) -> io::Result<Self> {
        Self::new(BufWriter::new(File::create(path)?), version)
    }
}

impl<W: Write> DiagnosticLog<W> {
    pub fn new(mut out: W, version: &str) -> io::Result<Self> {
        writeln!(out, "Version: {version}")?;
        writeln!(out, "Started: {}", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))?;
        writeln!(out)?;
        Ok(Self { out, broken: false })
    }

    /// Write the termination marker and hand back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        writeln!(self.out, "{SEPARATOR}")?;
        write!(self.out, "Normal termination.")?;
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> Diagnostics for DiagnosticLog<W> {
    fn record(&mut self, entry: DiagnosticEntry) {
        if self.broken {
            return;
        }
        let written = writeln!(self.out, "{SEPARATOR}")
            .and_then(|_| write!(self.out, "{entry}"))
            .and_then(|_| self.out.flush());
        if let Err(e) = written {
            // Keep going without the log rather than failing the command.
            warn!(error = %e, "diagnostic log unwritable; further entries dropped");
            self.broken = true;
        }
    }
}
