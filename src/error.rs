use std::io;
use thiserror::Error;

use crate::codec::CodecError;
use crate::retry::RetryError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Fragment {sequence} is corrupted (stored checksum {expected:#010x}, computed {actual:#010x})")]
    Corruption { sequence: u64, expected: u32, actual: u32 },
    #[error("{operation} gave up after {attempts} attempts: {last}")]
    RetriesExhausted { operation: &'static str, attempts: u32, last: String },
    #[error("{operation} failed: {reason}")]
    OperationFailed { operation: &'static str, reason: String },
    #[error("Cannot read input: {0}")]
    Source(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl VaultError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::Transport(TransportError::NotFound(_)))
    }
}

impl From<RetryError<TransportError>> for VaultError {
    fn from(e: RetryError<TransportError>) -> Self {
        match e {
            RetryError::Fatal(e) => VaultError::Transport(e),
            RetryError::Exhausted { operation, attempts, last } => VaultError::RetriesExhausted {
                operation,
                attempts,
                last: last.to_string(),
            },
        }
    }
}

pub type Result<T, E = VaultError> = std::result::Result<T, E>;
