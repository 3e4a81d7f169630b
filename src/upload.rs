//! Upload path: fragment → encode → tag → upload, then resolve and verify.
//!
//! Strictly one fragment at a time.  Each fragment's payload, canvas, and
//! image are dropped as soon as the next stage no longer needs them, so peak
//! memory stays near two canvases regardless of input size.  Nothing is
//! rolled back on failure: an interrupted upload leaves a partial container.

use std::collections::BTreeSet;
use std::io::Read;

use tracing::{debug, info, warn};

use crate::chunker::{FragmentCount, Fragmenter};
use crate::codec::{ppm, CanvasGeometry};
use crate::diagnostics::{DiagnosticEntry, Diagnostics};
use crate::error::Result;
use crate::fragment::Fragment;
use crate::recovery::{resolve_duplicates, ResolutionReport};
use crate::retry::RetryPolicy;
use crate::session::{SessionVerdict, UploadSession};
use crate::transport::{ContainerId, Transport};

#[derive(Debug, Clone)]
pub struct UploadReport {
    pub container:  ContainerId,
    pub expected:   FragmentCount,
    pub sent:       u64,
    /// Sequence numbers that needed a retry and may have been stored twice.
    pub retried:    BTreeSet<u64>,
    pub resolution: ResolutionReport,
    pub verdict:    SessionVerdict,
}

/// Upload everything `source` yields into a new container called `name`.
///
/// `size` is the source length when known; it fixes the expected fragment
/// count for the final verification.
pub fn upload<T: Transport + ?Sized, R: Read>(
    transport:   &mut T,
    name:        &str,
    source:      R,
    size:        Option<u64>,
    geometry:    &CanvasGeometry,
    retry:       &RetryPolicy,
    diagnostics: &mut dyn Diagnostics,
) -> Result<UploadReport> {
    let mut session = UploadSession::new(FragmentCount::for_size(size, geometry.max_fragment_bytes));
    let container = retry.run("container create", |_| transport.create_container(name))?;
    info!(%container, name, fragments = %session.expected, "upload started");

    for raw in Fragmenter::new(source, geometry.max_fragment_bytes) {
        let raw = raw?;
        let fragment = Fragment::encode(geometry, raw.sequence, &raw.payload)?;
        drop(raw);

        let meta = fragment.meta;
        let image = ppm::to_ppm(&fragment.canvas);
        drop(fragment);

        let mut attempts = 0;
        let uploaded = retry.run("fragment upload", |attempt| {
            attempts = attempt;
            let result = transport.upload_fragment(&container, &meta, &image);
            if let Err(e) = &result {
                diagnostics.record(
                    DiagnosticEntry::new("Fragment upload failure")
                        .field("container", &container)
                        .field("sequence", meta.sequence)
                        .field("attempt", attempt)
                        .error(e),
                );
            }
            result
        });
        drop(image);
        if attempts > 1 {
            session.retried.insert(meta.sequence);
        }
        let id = uploaded?;

        session.sent += 1;
        debug!(%container, sequence = meta.sequence, fragment = %id, "fragment uploaded");
    }

    let resolution = resolve_duplicates(transport, &container, geometry, retry, diagnostics)?;

    let resolved = retry.run("fragment listing", |_| transport.list_fragments(&container))?;
    let verdict = session.verify(&resolved);
    if verdict.is_corrupt() {
        warn!(%container, ?verdict, "upload verification failed");
        let mut entry = DiagnosticEntry::new("Upload corruption detected").field("container", &container);
        entry = match &verdict {
            SessionVerdict::CountMismatch { expected, actual, missing } => entry
                .field("expected fragments", expected)
                .field("actual fragments", actual)
                .field("missing", format!("{missing:?}")),
            SessionVerdict::Unverifiable { actual, missing } => entry
                .field("actual fragments", actual)
                .field("missing", format!("{missing:?}")),
            SessionVerdict::Verified { .. } => entry,
        };
        diagnostics.record(entry);
    }

    info!(%container, sent = session.sent, "upload complete");
    Ok(UploadReport {
        container,
        expected: session.expected,
        sent: session.sent,
        retried: session.retried,
        resolution,
        verdict,
    })
}
