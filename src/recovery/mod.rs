//! Post-upload duplicate reconciliation.
//!
//! # Why duplicates exist
//! The backend may store a fragment and still report the upload as failed;
//! the retry then stores it again.  After an upload a container can hold
//! several fragments with the same sequence number (a *duplicate group*).
//!
//! # Policy: first good wins
//! Members of a group are visited in listing order (newest first).  Each group
//! runs a small state machine:
//!
//! | State | On member | Next state |
//! |-------|-----------|------------|
//! | `Scanning` | checksum valid → keep it | `CanonicalFound` |
//! | `Scanning` | checksum invalid → delete it | `Scanning` |
//! | `CanonicalFound` | delete without checking | `Purging` |
//! | `Purging` | delete without checking | `Purging` |
//!
//! The survivor is the first valid copy encountered, not the newest or the
//! best one.  Later members are deleted unchecked.  A group with no valid
//! member loses every copy, leaving a permanent gap at that sequence number.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::assembler::fetch_canvas;
use crate::codec::CanvasGeometry;
use crate::diagnostics::{DiagnosticEntry, Diagnostics};
use crate::error::{Result, VaultError};
use crate::fragment::{format_checksum, verify_checksum, Verification};
use crate::retry::{RetryError, RetryPolicy};
use crate::transport::{ContainerId, FragmentId, FragmentRecord, Transport, TransportError};

// ── State machine ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// No valid member seen yet; every member is checked.
    Scanning,
    /// The member just kept is canonical.
    CanonicalFound,
    /// Deleting the remaining members without checking them.
    Purging,
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GroupState::Scanning       => "scanning",
            GroupState::CanonicalFound => "canonical-found",
            GroupState::Purging        => "purging",
        })
    }
}

/// What to do with the member just presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAction {
    Keep,
    /// Checked and found invalid.
    DeleteCorrupt,
    /// Deleted unchecked because a canonical copy already exists.
    DeleteRedundant,
}

#[derive(Debug, Clone)]
pub struct GroupResolver {
    state: GroupState,
}

impl Default for GroupResolver {
    fn default() -> Self {
        Self { state: GroupState::Scanning }
    }
}

impl GroupResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    /// Decide the next member's fate.  `is_valid` runs only while scanning.
    pub fn step(&mut self, is_valid: impl FnOnce() -> bool) -> MemberAction {
        match self.state {
            GroupState::Scanning => {
                if is_valid() {
                    self.state = GroupState::CanonicalFound;
                    MemberAction::Keep
                } else {
                    MemberAction::DeleteCorrupt
                }
            }
            GroupState::CanonicalFound | GroupState::Purging => {
                self.state = GroupState::Purging;
                MemberAction::DeleteRedundant
            }
        }
    }
}

// ── Report ────────────────────────────────────────────────────────────────────

/// What happened to one duplicate group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutcome {
    pub sequence:  u64,
    pub canonical: Option<FragmentId>,
    pub corrupt:   Vec<FragmentId>,
    pub redundant: Vec<FragmentId>,
}

impl GroupOutcome {
    pub fn deleted(&self) -> usize {
        self.corrupt.len() + self.redundant.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    /// Only groups with more than one member appear here.
    pub groups: Vec<GroupOutcome>,
}

impl ResolutionReport {
    pub fn is_clean(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn deleted(&self) -> usize {
        self.groups.iter().map(GroupOutcome::deleted).sum()
    }

    /// Sequence numbers left with no surviving copy.
    pub fn lost_sequences(&self) -> Vec<u64> {
        self.groups.iter().filter(|g| g.canonical.is_none()).map(|g| g.sequence).collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} duplicate group(s), {} copy(ies) removed, {} sequence(s) lost",
            self.groups.len(),
            self.deleted(),
            self.lost_sequences().len(),
        )
    }
}

// ── Resolver ──────────────────────────────────────────────────────────────────

/// Reduce every duplicate group in `container` to at most one valid copy.
pub fn resolve_duplicates<T: Transport + ?Sized>(
    transport:   &mut T,
    container:   &ContainerId,
    geometry:    &CanvasGeometry,
    retry:       &RetryPolicy,
    diagnostics: &mut dyn Diagnostics,
) -> Result<ResolutionReport> {
    let listing = retry.run("fragment listing", |_| transport.list_fragments(container))?;

    // Listing order is preserved inside each group.
    let mut groups: BTreeMap<u64, Vec<FragmentRecord>> = BTreeMap::new();
    for record in listing {
        groups.entry(record.sequence).or_default().push(record);
    }

    let mut report = ResolutionReport::default();
    for (sequence, members) in groups.into_iter().filter(|(_, m)| m.len() > 1) {
        info!(%container, sequence, copies = members.len(), "resolving duplicate group");
        diagnostics.record(
            DiagnosticEntry::new("Processing corruption of fragments")
                .field("container", container)
                .field("sequence", sequence)
                .field("copies", members.len()),
        );
        let outcome = resolve_group(transport, sequence, &members, geometry, retry, diagnostics)?;
        if outcome.canonical.is_none() {
            warn!(%container, sequence, "no valid copy survived; sequence is lost");
        }
        report.groups.push(outcome);
    }

    info!(%container, "{}", report.summary());
    Ok(report)
}

fn resolve_group<T: Transport + ?Sized>(
    transport:   &mut T,
    sequence:    u64,
    members:     &[FragmentRecord],
    geometry:    &CanvasGeometry,
    retry:       &RetryPolicy,
    diagnostics: &mut dyn Diagnostics,
) -> Result<GroupOutcome> {
    let mut resolver = GroupResolver::new();
    let mut outcome = GroupOutcome { sequence, canonical: None, corrupt: Vec::new(), redundant: Vec::new() };

    for member in members {
        let action = resolver.step(|| member_is_valid(transport, member, geometry, retry, diagnostics));
        match action {
            MemberAction::Keep => {
                debug!(fragment = %member.id, sequence, "canonical copy");
                diagnostics.record(
                    DiagnosticEntry::new("Kept canonical fragment")
                        .field("fragment", &member.id)
                        .field("state", resolver.state()),
                );
                outcome.canonical = Some(member.id.clone());
            }
            MemberAction::DeleteCorrupt | MemberAction::DeleteRedundant => {
                delete_member(transport, &member.id, retry)?;
                diagnostics.record(
                    DiagnosticEntry::new("Removed corrupt duplicate")
                        .field("fragment", &member.id)
                        .field("state", resolver.state()),
                );
                if action == MemberAction::DeleteCorrupt {
                    outcome.corrupt.push(member.id.clone());
                } else {
                    outcome.redundant.push(member.id.clone());
                }
            }
        }
    }
    Ok(outcome)
}

/// Fetch a member's stored bytes and compare against its stored checksum.
/// Members that cannot be read or carry no checksum cannot be vouched for.
fn member_is_valid<T: Transport + ?Sized>(
    transport:   &mut T,
    member:      &FragmentRecord,
    geometry:    &CanvasGeometry,
    retry:       &RetryPolicy,
    diagnostics: &mut dyn Diagnostics,
) -> bool {
    let canvas = match fetch_canvas(transport, &member.id, geometry, retry, diagnostics) {
        Ok(canvas) => canvas,
        Err(e) => {
            warn!(fragment = %member.id, error = %e, "duplicate unreadable; treating as corrupt");
            return false;
        }
    };
    match verify_checksum(member.checksum, &canvas) {
        Verification::Valid => true,
        Verification::Unchecked => false,
        Verification::Mismatch { expected, actual } => {
            debug!(
                fragment = %member.id,
                expected = %format_checksum(expected),
                actual = %format_checksum(actual),
                "checksum mismatch"
            );
            false
        }
    }
}

fn delete_member<T: Transport + ?Sized>(
    transport: &mut T,
    fragment:  &FragmentId,
    retry:     &RetryPolicy,
) -> Result<()> {
    match retry.run("fragment delete", |_| transport.delete_fragment(fragment)) {
        Ok(()) => Ok(()),
        // Already gone is as good as deleted.
        Err(RetryError::Fatal(TransportError::NotFound(_))) => Ok(()),
        Err(e) => Err(VaultError::from(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(validity: &[bool]) -> (Vec<MemberAction>, Vec<usize>) {
        let mut resolver = GroupResolver::new();
        let mut checked = Vec::new();
        let actions = validity
            .iter()
            .enumerate()
            .map(|(i, &valid)| {
                resolver.step(|| {
                    checked.push(i);
                    valid
                })
            })
            .collect();
        (actions, checked)
    }

    #[test]
    fn first_valid_member_wins() {
        use MemberAction::*;
        let (actions, checked) = run(&[false, true, true, false]);
        assert_eq!(actions, [DeleteCorrupt, Keep, DeleteRedundant, DeleteRedundant]);
        assert_eq!(checked, [0, 1], "members after the canonical one are never checked");
    }

    #[test]
    fn all_invalid_loses_everything() {
        let (actions, checked) = run(&[false, false, false]);
        assert!(actions.iter().all(|a| *a == MemberAction::DeleteCorrupt));
        assert_eq!(checked.len(), 3);
    }

    #[test]
    fn state_progression() {
        let mut r = GroupResolver::new();
        assert_eq!(r.state(), GroupState::Scanning);
        r.step(|| false);
        assert_eq!(r.state(), GroupState::Scanning);
        r.step(|| true);
        assert_eq!(r.state(), GroupState::CanonicalFound);
        r.step(|| unreachable!());
        assert_eq!(r.state(), GroupState::Purging);
        assert_eq!(r.state().to_string(), "purging");
    }

    #[test]
    fn report_counts() {
        let id = |s: &str| FragmentId(s.into());
        let report = ResolutionReport {
            groups: vec![
                GroupOutcome { sequence: 2, canonical: Some(id("a")), corrupt: vec![id("b")], redundant: vec![id("c")] },
                GroupOutcome { sequence: 5, canonical: None, corrupt: vec![id("d"), id("e")], redundant: vec![] },
            ],
        };
        assert_eq!(report.deleted(), 4);
        assert_eq!(report.lost_sequences(), [5]);
        assert!(!report.is_clean());
    }
}
