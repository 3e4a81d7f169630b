//! Directory-backed backend.
//!
//! ```text
//! <root>/<container-id>/container.json          name, creation time, serial counter
//! <root>/<container-id>/<fragment-uuid>.ppm     the image
//! <root>/<container-id>/<fragment-uuid>.json    name, sequence, checksum, payload length, serial
//! ```
//!
//! A fragment ID is `<container-id>.<fragment-uuid>`.  The serial records
//! creation order so listings come back newest first, like the hosted store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fragment::FragmentMeta;
use super::{ContainerId, ContainerInfo, FragmentId, FragmentRecord, Transport, TransportError};

const CONTAINER_FILE: &str = "container.json";

#[derive(Debug, Serialize, Deserialize)]
struct ContainerFile {
    name:        String,
    created_at:  DateTime<Utc>,
    next_serial: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct FragmentFile {
    name:        String,
    sequence:    u64,
    checksum:    u32,
    payload_len: u64,
    serial:      u64,
}

#[derive(Debug, Clone)]
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_owned();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, container: &ContainerId) -> Result<PathBuf, TransportError> {
        // IDs are minted as simple UUIDs; anything else cannot name a container here.
        if container.0.is_empty() || !container.0.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TransportError::NotFound(format!("container {container}")));
        }
        let dir = self.root.join(&container.0);
        if !dir.join(CONTAINER_FILE).is_file() {
            return Err(TransportError::NotFound(format!("container {container}")));
        }
        Ok(dir)
    }

    fn fragment_paths(&self, fragment: &FragmentId) -> Result<(PathBuf, PathBuf), TransportError> {
        let not_found = || TransportError::NotFound(format!("fragment {fragment}"));
        let (container, uuid) = fragment.0.split_once('.').ok_or_else(not_found)?;
        if uuid.is_empty() || !uuid.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(not_found());
        }
        let dir = self.container_dir(&ContainerId(container.to_owned())).map_err(|_| not_found())?;
        Ok((dir.join(format!("{uuid}.ppm")), dir.join(format!("{uuid}.json"))))
    }

    fn read_container(dir: &Path) -> Result<ContainerFile, TransportError> {
        read_json(&dir.join(CONTAINER_FILE))
    }
}

impl Transport for LocalTransport {
    fn create_container(&mut self, name: &str) -> Result<ContainerId, TransportError> {
        let id = ContainerId(Uuid::new_v4().simple().to_string());
        let dir = self.root.join(&id.0);
        fs::create_dir_all(&dir).map_err(|e| map_io(e, &id.0))?;
        write_json(&dir.join(CONTAINER_FILE), &ContainerFile {
            name:        name.to_owned(),
            created_at:  Utc::now(),
            next_serial: 0,
        })?;
        Ok(id)
    }

    fn upload_fragment(
        &mut self,
        container: &ContainerId,
        meta:      &FragmentMeta,
        image:     &[u8],
    ) -> Result<FragmentId, TransportError> {
        let dir = self.container_dir(container)?;
        let mut header = Self::read_container(&dir)?;
        let serial = header.next_serial;
        header.next_serial += 1;
        write_json(&dir.join(CONTAINER_FILE), &header)?;

        let uuid = Uuid::new_v4().simple().to_string();
        let id = FragmentId(format!("{container}.{uuid}"));
        fs::write(dir.join(format!("{uuid}.ppm")), image).map_err(|e| map_io(e, &id.0))?;
        write_json(&dir.join(format!("{uuid}.json")), &FragmentFile {
            name:        meta.name(),
            sequence:    meta.sequence,
            checksum:    meta.checksum,
            payload_len: meta.payload_len,
            serial,
        })?;
        Ok(id)
    }

    fn list_fragments(&mut self, container: &ContainerId) -> Result<Vec<FragmentRecord>, TransportError> {
        let dir = self.container_dir(container)?;
        let mut found: Vec<(u64, FragmentRecord)> = Vec::new();

        for entry in fs::read_dir(&dir).map_err(|e| map_io(e, &container.0))? {
            let path = entry.map_err(|e| map_io(e, &container.0))?.path();
            let is_meta = path.extension().is_some_and(|x| x == "json")
                && path.file_name().is_some_and(|n| n != CONTAINER_FILE);
            if !is_meta {
                continue;
            }
            let Some(uuid) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let file: FragmentFile = read_json(&path)?;
            found.push((file.serial, FragmentRecord {
                id:          FragmentId(format!("{container}.{uuid}")),
                sequence:    file.sequence,
                checksum:    Some(file.checksum),
                payload_len: Some(file.payload_len),
            }));
        }

        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found.into_iter().map(|(_, r)| r).collect())
    }

    fn fetch_fragment_bytes(&mut self, fragment: &FragmentId) -> Result<Vec<u8>, TransportError> {
        let (image, _) = self.fragment_paths(fragment)?;
        fs::read(&image).map_err(|e| map_io(e, &fragment.0))
    }

    fn delete_fragment(&mut self, fragment: &FragmentId) -> Result<(), TransportError> {
        let (image, meta) = self.fragment_paths(fragment)?;
        // Metadata first: once it is gone the fragment no longer lists.
        fs::remove_file(&meta).map_err(|e| map_io(e, &fragment.0))?;
        match fs::remove_file(&image) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(map_io(e, &fragment.0)),
            _ => Ok(()),
        }
    }

    fn delete_container(&mut self, container: &ContainerId) -> Result<(), TransportError> {
        let dir = self.container_dir(container)?;
        fs::remove_dir_all(&dir).map_err(|e| map_io(e, &container.0))
    }

    fn list_containers(&mut self) -> Result<Vec<ContainerInfo>, TransportError> {
        let mut out: Vec<(DateTime<Utc>, ContainerInfo)> = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| map_io(e, "store root"))? {
            let entry = entry.map_err(|e| map_io(e, "store root"))?;
            let header_path = entry.path().join(CONTAINER_FILE);
            if !header_path.is_file() {
                continue;
            }
            let header: ContainerFile = read_json(&header_path)?;
            let id = ContainerId(entry.file_name().to_string_lossy().into_owned());
            out.push((header.created_at, ContainerInfo { id, name: header.name }));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out.into_iter().map(|(_, info)| info).collect())
    }

    fn rename_container(&mut self, container: &ContainerId, name: &str) -> Result<(), TransportError> {
        let dir = self.container_dir(container)?;
        let mut header = Self::read_container(&dir)?;
        header.name = name.to_owned();
        write_json(&dir.join(CONTAINER_FILE), &header)
    }
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn map_io(e: io::Error, what: &str) -> TransportError {
    match e.kind() {
        io::ErrorKind::NotFound => TransportError::NotFound(what.to_owned()),
        io::ErrorKind::Interrupted
        | io::ErrorKind::TimedOut
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::UnexpectedEof => TransportError::Transient(format!("{what}: {e}")),
        _ => TransportError::Rejected(format!("{what}: {e}")),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, TransportError> {
    let what = path.display().to_string();
    let bytes = fs::read(path).map_err(|e| map_io(e, &what))?;
    serde_json::from_slice(&bytes).map_err(|e| TransportError::Rejected(format!("{what}: {e}")))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), TransportError> {
    let what = path.display().to_string();
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| TransportError::Rejected(format!("{what}: {e}")))?;
    fs::write(path, bytes).map_err(|e| map_io(e, &what))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(sequence: u64) -> FragmentMeta {
        FragmentMeta { sequence, checksum: 0xDEAD_BEEF, payload_len: 3 }
    }

    #[test]
    fn fragments_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LocalTransport::open(dir.path()).unwrap();
        let c = store.create_container("photos.tar").unwrap();

        let first  = store.upload_fragment(&c, &meta(1), b"one").unwrap();
        let second = store.upload_fragment(&c, &meta(2), b"two").unwrap();

        let listed = store.list_fragments(&c).unwrap();
        assert_eq!(listed.iter().map(|r| &r.id).collect::<Vec<_>>(), [&second, &first]);
        assert_eq!(listed[1].checksum, Some(0xDEAD_BEEF));
        assert_eq!(store.fetch_fragment_bytes(&first).unwrap(), b"one");

        store.delete_fragment(&first).unwrap();
        assert_eq!(store.list_fragments(&c).unwrap().len(), 1);
        assert!(matches!(store.fetch_fragment_bytes(&first), Err(TransportError::NotFound(_))));
    }

    #[test]
    fn rename_and_list_containers() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LocalTransport::open(dir.path()).unwrap();
        assert!(store.list_containers().unwrap().is_empty());

        let c = store.create_container("old").unwrap();
        store.rename_container(&c, "new").unwrap();
        assert_eq!(store.list_containers().unwrap(), [ContainerInfo { id: c.clone(), name: "new".into() }]);

        store.delete_container(&c).unwrap();
        assert!(matches!(store.delete_container(&c), Err(TransportError::NotFound(_))));
    }

    #[test]
    fn rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LocalTransport::open(dir.path()).unwrap();
        assert!(matches!(store.delete_container(&ContainerId::from("../etc")), Err(TransportError::NotFound(_))));
        assert!(matches!(
            store.fetch_fragment_bytes(&FragmentId("nope".into())),
            Err(TransportError::NotFound(_))
        ));
    }
}
