//! Upload session bookkeeping and the post-resolution fragment count check.

use std::collections::BTreeSet;

use crate::chunker::FragmentCount;
use crate::transport::FragmentRecord;

#[derive(Debug, Clone)]
pub struct UploadSession {
    pub expected: FragmentCount,
    /// Fragments handed to the backend, counting each sequence number once.
    pub sent:     u64,
    /// Sequence numbers whose upload needed more than one attempt.
    pub retried:  BTreeSet<u64>,
}

/// Result of comparing the resolved container against the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionVerdict {
    Verified { count: u64 },
    /// Non-fatal: reported and logged, never rolled back.
    CountMismatch { expected: u64, actual: u64, missing: Vec<u64> },
    /// Total unknown up front; `missing` lists holes below the highest sequence seen.
    Unverifiable { actual: u64, missing: Vec<u64> },
}

impl SessionVerdict {
    pub fn is_corrupt(&self) -> bool {
        match self {
            SessionVerdict::Verified { .. } => false,
            SessionVerdict::CountMismatch { .. } => true,
            SessionVerdict::Unverifiable { missing, .. } => !missing.is_empty(),
        }
    }
}

impl UploadSession {
    pub fn new(expected: FragmentCount) -> Self {
        Self { expected, sent: 0, retried: BTreeSet::new() }
    }

    pub fn verify(&self, resolved: &[FragmentRecord]) -> SessionVerdict {
        let present: BTreeSet<u64> = resolved.iter().map(|r| r.sequence).collect();
        let actual = resolved.len() as u64;

        match self.expected {
            FragmentCount::Known(expected) => {
                let missing: Vec<u64> = (1..=expected).filter(|s| !present.contains(s)).collect();
                if actual == expected && missing.is_empty() {
                    SessionVerdict::Verified { count: actual }
                } else {
                    SessionVerdict::CountMismatch { expected, actual, missing }
                }
            }
            FragmentCount::Unknown => {
                let top = present.last().copied().unwrap_or(0);
                let missing = (1..=top).filter(|s| !present.contains(s)).collect();
                SessionVerdict::Unverifiable { actual, missing }
            }
        }
    }
}
