//! Download path: fetch, verify, unpad, and concatenate fragments.
//!
//! Fragments are listed newest first; reversing the listing yields upload
//! order, and a stable sort on sequence number guards against a backend that
//! lists out of creation order.  Each fragment is fetched until its image
//! flattens to exactly one canvas, then verified against its stored checksum
//! *before* stripping.  The first mismatch aborts the download: everything
//! already written stays in `out`, nothing after the bad fragment is fetched.

use std::io::Write;

use tracing::{debug, info, warn};

use crate::codec::{decode_with, ppm, CanvasGeometry, Framing, PixelBuffer};
use crate::diagnostics::{DiagnosticEntry, Diagnostics};
use crate::error::{Result, VaultError};
use crate::fragment::{format_checksum, verify_checksum, Verification};
use crate::retry::RetryPolicy;
use crate::transport::{ContainerId, FragmentId, FragmentRecord, Transport, TransportError};

/// Summary of a finished download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub fragments:      u64,
    pub bytes_written:  u64,
    /// Fragments assembled without a stored checksum to check against.
    pub unverified:     u64,
}

/// Fetch one fragment and parse it into a full-size canvas.
///
/// A failed fetch, an unparsable image, or an image of the wrong size all count
/// as a transient partial read and are retried under `retry`.
pub fn fetch_canvas<T: Transport + ?Sized>(
    transport:   &mut T,
    fragment:    &FragmentId,
    geometry:    &CanvasGeometry,
    retry:       &RetryPolicy,
    diagnostics: &mut dyn Diagnostics,
) -> Result<PixelBuffer> {
    let canvas = retry.run("fragment download", |attempt| {
        let result = transport.fetch_fragment_bytes(fragment).and_then(|bytes| {
            let canvas = ppm::from_ppm(&bytes)
                .map_err(|e| TransportError::Transient(format!("partial image: {e}")))?;
            if canvas.len() != geometry.canvas_bytes {
                return Err(TransportError::Transient(format!(
                    "image flattens to {} bytes, expected {}",
                    canvas.len(),
                    geometry.canvas_bytes
                )));
            }
            Ok(canvas)
        });
        if let Err(e) = &result {
            diagnostics.record(
                DiagnosticEntry::new("Fragment download failure")
                    .field("fragment", fragment)
                    .field("attempt", attempt)
                    .error(e),
            );
        }
        result
    })?;
    Ok(canvas)
}

/// Put the listing into ascending sequence order.
pub fn assembly_order(mut listing: Vec<FragmentRecord>) -> Vec<FragmentRecord> {
    listing.reverse();
    listing.sort_by_key(|r| r.sequence);
    listing
}

/// Reconstruct the payload of `container` into `out`.
pub fn download<T: Transport + ?Sized, W: Write>(
    transport:   &mut T,
    container:   &ContainerId,
    geometry:    &CanvasGeometry,
    framing:     Framing,
    retry:       &RetryPolicy,
    diagnostics: &mut dyn Diagnostics,
    out:         &mut W,
) -> Result<DownloadReport> {
    let listing = retry.run("fragment listing", |_| transport.list_fragments(container))?;
    let ordered = assembly_order(listing);
    warn_on_irregular_sequence(container, &ordered, diagnostics);
    info!(%container, fragments = ordered.len(), "download started");

    let mut report = DownloadReport::default();
    for record in &ordered {
        let canvas = fetch_canvas(transport, &record.id, geometry, retry, diagnostics)?;

        match verify_checksum(record.checksum, &canvas) {
            Verification::Valid => {}
            Verification::Unchecked => report.unverified += 1,
            Verification::Mismatch { expected, actual } => {
                out.flush()?;
                diagnostics.record(
                    DiagnosticEntry::new("Download corruption detected")
                        .field("container", container)
                        .field("fragment", &record.id)
                        .field("sequence", record.sequence)
                        .field("stored checksum", format_checksum(expected))
                        .field("computed checksum", format_checksum(actual)),
                );
                return Err(VaultError::Corruption { sequence: record.sequence, expected, actual });
            }
        }

        let payload = decode_with(framing, &canvas, record.payload_len)?;
        drop(canvas);
        out.write_all(&payload)?;

        report.fragments += 1;
        report.bytes_written += payload.len() as u64;
        debug!(sequence = record.sequence, bytes = payload.len(), "fragment assembled");
    }

    out.flush()?;
    info!(%container, bytes = report.bytes_written, "download complete");
    Ok(report)
}

/// Duplicates or gaps mean the container was never fully resolved; the
/// download still proceeds, but the output will not match the original.
fn warn_on_irregular_sequence(
    container:   &ContainerId,
    ordered:     &[FragmentRecord],
    diagnostics: &mut dyn Diagnostics,
) {
    let mut expected = 1u64;
    for record in ordered {
        if record.sequence != expected {
            warn!(%container, expected, found = record.sequence, "irregular fragment sequence");
            diagnostics.record(
                DiagnosticEntry::new("Irregular fragment sequence")
                    .field("container", container)
                    .field("expected", expected)
                    .field("found", record.sequence),
            );
        }
        expected = record.sequence + 1;
    }
}
