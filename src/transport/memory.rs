//! In-process backend with scripted faults.
//!
//! Behaves like a well-mannered document store until told otherwise.  Faults
//! are armed up front and consumed as calls arrive:
//!
//! | Fault | Effect |
//! |-------|--------|
//! | ghost uploads | the image is stored, then the call reports a transient error |
//! | failed fetches | fetch returns a transient error |
//! | short fetches | fetch returns only the first half of the image |
//! | failed deletes | container deletion returns a transient error |
//!
//! Every fetch is logged so tests can see which fragments were read.

use std::collections::{BTreeMap, HashMap};

use crate::fragment::FragmentMeta;
use super::{ContainerId, ContainerInfo, FragmentId, FragmentRecord, Transport, TransportError};

#[derive(Debug, Clone)]
struct StoredFragment {
    record: FragmentRecord,
    image:  Vec<u8>,
}

#[derive(Debug, Clone, Default)]
struct MemContainer {
    name:      String,
    /// Creation order, oldest first.
    fragments: Vec<StoredFragment>,
}

#[derive(Debug, Default)]
pub struct MemoryTransport {
    containers:      BTreeMap<ContainerId, MemContainer>,
    next_id:         u64,
    ghost_uploads:   HashMap<u64, u32>,
    failed_fetches:  u32,
    short_fetches:   u32,
    failed_deletes:  u32,
    fetch_log:       Vec<FragmentId>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Fault injection ──────────────────────────────────────────────────────

    /// The next `times` uploads of `sequence` are stored but reported as failed.
    pub fn ghost_uploads(&mut self, sequence: u64, times: u32) {
        *self.ghost_uploads.entry(sequence).or_default() += times;
    }

    pub fn fail_fetches(&mut self, times: u32) {
        self.failed_fetches += times;
    }

    pub fn short_fetches(&mut self, times: u32) {
        self.short_fetches += times;
    }

    pub fn fail_container_deletes(&mut self, times: u32) {
        self.failed_deletes += times;
    }

    /// Flip a byte near the end of a stored image.
    pub fn corrupt_fragment(&mut self, fragment: &FragmentId) -> bool {
        match self.find_mut(fragment) {
            Some(stored) => {
                if let Some(b) = stored.image.last_mut() {
                    *b ^= 0xFF;
                }
                true
            }
            None => false,
        }
    }

    /// Store a fragment directly, bypassing the fault script.
    pub fn insert_raw(
        &mut self,
        container: &ContainerId,
        sequence:  u64,
        checksum:  Option<u32>,
        image:     Vec<u8>,
    ) -> Option<FragmentId> {
        let id = FragmentId(self.mint("frag"));
        let stored = StoredFragment {
            record: FragmentRecord { id: id.clone(), sequence, checksum, payload_len: None },
            image,
        };
        self.containers.get_mut(container)?.fragments.push(stored);
        Some(id)
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn fetch_log(&self) -> &[FragmentId] {
        &self.fetch_log
    }

    pub fn clear_fetch_log(&mut self) {
        self.fetch_log.clear();
    }

    /// Fragment records in creation order, oldest first.
    pub fn stored(&self, container: &ContainerId) -> Vec<FragmentRecord> {
        self.containers
            .get(container)
            .map(|c| c.fragments.iter().map(|f| f.record.clone()).collect())
            .unwrap_or_default()
    }

    pub fn contains_container(&self, container: &ContainerId) -> bool {
        self.containers.contains_key(container)
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn mint(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }

    fn find_mut(&mut self, fragment: &FragmentId) -> Option<&mut StoredFragment> {
        self.containers
            .values_mut()
            .flat_map(|c| c.fragments.iter_mut())
            .find(|f| &f.record.id == fragment)
    }

    fn container_mut(&mut self, container: &ContainerId) -> Result<&mut MemContainer, TransportError> {
        self.containers
            .get_mut(container)
            .ok_or_else(|| TransportError::NotFound(format!("container {container}")))
    }
}

impl Transport for MemoryTransport {
    fn create_container(&mut self, name: &str) -> Result<ContainerId, TransportError> {
        let id = ContainerId(self.mint("cont"));
        self.containers.insert(id.clone(), MemContainer { name: name.to_owned(), fragments: Vec::new() });
        Ok(id)
    }

    fn upload_fragment(
        &mut self,
        container: &ContainerId,
        meta:      &FragmentMeta,
        image:     &[u8],
    ) -> Result<FragmentId, TransportError> {
        self.container_mut(container)?;
        let id = FragmentId(self.mint("frag"));
        let stored = StoredFragment {
            record: FragmentRecord {
                id:          id.clone(),
                sequence:    meta.sequence,
                checksum:    Some(meta.checksum),
                payload_len: Some(meta.payload_len),
            },
            image: image.to_vec(),
        };
        self.container_mut(container)?.fragments.push(stored);

        if let Some(left) = self.ghost_uploads.get_mut(&meta.sequence).filter(|n| **n > 0) {
            *left -= 1;
            return Err(TransportError::Transient(format!(
                "connection reset after storing fragment {}",
                meta.sequence
            )));
        }
        Ok(id)
    }

    fn list_fragments(&mut self, container: &ContainerId) -> Result<Vec<FragmentRecord>, TransportError> {
        let c = self.container_mut(container)?;
        Ok(c.fragments.iter().rev().map(|f| f.record.clone()).collect())
    }

    fn fetch_fragment_bytes(&mut self, fragment: &FragmentId) -> Result<Vec<u8>, TransportError> {
        self.fetch_log.push(fragment.clone());
        if self.failed_fetches > 0 {
            self.failed_fetches -= 1;
            return Err(TransportError::Transient("read timed out".into()));
        }
        let short = if self.short_fetches > 0 {
            self.short_fetches -= 1;
            true
        } else {
            false
        };
        let stored = self
            .find_mut(fragment)
            .ok_or_else(|| TransportError::NotFound(format!("fragment {fragment}")))?;
        let image = &stored.image;
        Ok(if short { image[..image.len() / 2].to_vec() } else { image.clone() })
    }

    fn delete_fragment(&mut self, fragment: &FragmentId) -> Result<(), TransportError> {
        for c in self.containers.values_mut() {
            if let Some(pos) = c.fragments.iter().position(|f| &f.record.id == fragment) {
                c.fragments.remove(pos);
                return Ok(());
            }
        }
        Err(TransportError::NotFound(format!("fragment {fragment}")))
    }

    fn delete_container(&mut self, container: &ContainerId) -> Result<(), TransportError> {
        if !self.containers.contains_key(container) {
            return Err(TransportError::NotFound(format!("container {container}")));
        }
        if self.failed_deletes > 0 {
            self.failed_deletes -= 1;
            return Err(TransportError::Transient("backend busy".into()));
        }
        self.containers.remove(container);
        Ok(())
    }

    fn list_containers(&mut self) -> Result<Vec<ContainerInfo>, TransportError> {
        Ok(self
            .containers
            .iter()
            .map(|(id, c)| ContainerInfo { id: id.clone(), name: c.name.clone() })
            .collect())
    }

    fn rename_container(&mut self, container: &ContainerId, name: &str) -> Result<(), TransportError> {
        self.container_mut(container)?.name = name.to_owned();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(sequence: u64) -> FragmentMeta {
        FragmentMeta { sequence, checksum: 0, payload_len: 1 }
    }

    #[test]
    fn lists_newest_first() {
        let mut t = MemoryTransport::new();
        let c = t.create_container("x").unwrap();
        for seq in 1..=3 {
            t.upload_fragment(&c, &meta(seq), b"img").unwrap();
        }
        let seqs: Vec<u64> = t.list_fragments(&c).unwrap().iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, [3, 2, 1]);
    }

    #[test]
    fn ghost_upload_leaves_a_copy_behind() {
        let mut t = MemoryTransport::new();
        let c = t.create_container("x").unwrap();
        t.ghost_uploads(1, 1);
        assert!(matches!(t.upload_fragment(&c, &meta(1), b"img"), Err(TransportError::Transient(_))));
        t.upload_fragment(&c, &meta(1), b"img").unwrap();
        assert_eq!(t.stored(&c).len(), 2);
    }

    #[test]
    fn short_fetch_then_full() {
        let mut t = MemoryTransport::new();
        let c = t.create_container("x").unwrap();
        let id = t.upload_fragment(&c, &meta(1), b"abcdef").unwrap();
        t.short_fetches(1);
        assert_eq!(t.fetch_fragment_bytes(&id).unwrap(), b"abc");
        assert_eq!(t.fetch_fragment_bytes(&id).unwrap(), b"abcdef");
        assert_eq!(t.fetch_log().len(), 2);
    }

    #[test]
    fn missing_objects_are_not_found() {
        let mut t = MemoryTransport::new();
        let ghost = ContainerId::from("cont-9999");
        assert!(matches!(t.delete_container(&ghost), Err(TransportError::NotFound(_))));
        assert!(matches!(t.list_fragments(&ghost), Err(TransportError::NotFound(_))));
        assert!(matches!(
            t.delete_fragment(&FragmentId("frag-1".into())),
            Err(TransportError::NotFound(_))
        ));
    }
}
