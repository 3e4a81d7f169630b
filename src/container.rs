//! Container administration: list, rename, delete.

use tracing::{info, warn};

use crate::confirm::Confirm;
use crate::diagnostics::{DiagnosticEntry, Diagnostics};
use crate::error::{Result, VaultError};
use crate::retry::{RetryError, RetryPolicy};
use crate::transport::{ContainerId, ContainerInfo, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The backend has no such container; reported after the first refusal.
    NotFound,
    /// The caller declined the confirmation.
    Declined,
}

pub fn list<T: Transport + ?Sized>(transport: &mut T, retry: &RetryPolicy) -> Result<Vec<ContainerInfo>> {
    Ok(retry.run("container listing", |_| transport.list_containers())?)
}

/// Rename a container.  Failures are recorded with their context and come
/// back as [`VaultError::OperationFailed`].
pub fn rename<T: Transport + ?Sized>(
    transport:   &mut T,
    container:   &ContainerId,
    new_name:    &str,
    retry:       &RetryPolicy,
    diagnostics: &mut dyn Diagnostics,
) -> Result<()> {
    match retry.run("container rename", |_| transport.rename_container(container, new_name)) {
        Ok(()) => {
            info!(%container, new_name, "container renamed");
            Ok(())
        }
        Err(e) => {
            diagnostics.record(
                DiagnosticEntry::new("File rename failure")
                    .field("container", container)
                    .field("new name", new_name)
                    .error(&e),
            );
            Err(VaultError::OperationFailed { operation: "rename", reason: e.to_string() })
        }
    }
}

/// Delete a container and everything in it, after asking `confirm`.
///
/// Transient failures are retried under `retry`.  A missing container ends
/// the operation at once with [`DeleteOutcome::NotFound`].
pub fn delete<T: Transport + ?Sized>(
    transport:   &mut T,
    container:   &ContainerId,
    confirm:     &mut dyn Confirm,
    retry:       &RetryPolicy,
    diagnostics: &mut dyn Diagnostics,
) -> Result<DeleteOutcome> {
    let prompt = format!("Delete container {container} and all of its fragments?");
    if !confirm.confirm(&prompt) {
        info!(%container, "deletion declined");
        return Ok(DeleteOutcome::Declined);
    }

    let result = retry.run("container delete", |attempt| {
        let result = transport.delete_container(container);
        if let Err(e @ TransportError::Transient(_)) = &result {
            warn!(%container, attempt, "deletion failed, retrying");
            diagnostics.record(
                DiagnosticEntry::new("Deletion failure")
                    .field("container", container)
                    .field("attempt", attempt)
                    .error(e),
            );
        }
        result
    });

    match result {
        Ok(()) => {
            info!(%container, "container deleted");
            Ok(DeleteOutcome::Deleted)
        }
        Err(RetryError::Fatal(TransportError::NotFound(_))) => Ok(DeleteOutcome::NotFound),
        Err(e) => {
            diagnostics.record(
                DiagnosticEntry::new("Deletion failure")
                    .field("container", container)
                    .error(&e),
            );
            Err(VaultError::OperationFailed { operation: "delete", reason: e.to_string() })
        }
    }
}
