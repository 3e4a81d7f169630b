//! Input for an upload: a local file or an HTTP(S) resource.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, VaultError};

/// An opened upload source and its length, when the source knows it.
pub struct InputSource {
    pub reader: Box<dyn Read>,
    pub size:   Option<u64>,
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSource").field("size", &self.size).finish_non_exhaustive()
    }
}

/// True for anything starting with `http`, compared case-insensitively.
pub fn is_url(location: &str) -> bool {
    location.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("http"))
}

impl InputSource {
    pub fn open(location: &str) -> Result<Self> {
        if is_url(location) {
            Self::open_url(location)
        } else {
            Self::open_file(location)
        }
    }

    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();
        Ok(Self { reader: Box::new(file), size: Some(size) })
    }

    /// Stream a remote resource.  The size is whatever `Content-Length` says, if anything.
    pub fn open_url(url: &str) -> Result<Self> {
        let response = reqwest::blocking::Client::builder()
            .timeout(None)
            .build()
            .and_then(|client| client.get(url).send())
            .and_then(|response| response.error_for_status())
            .map_err(|e| VaultError::Source(format!("{url}: {e}")))?;
        let size = response.content_length();
        debug!(url, ?size, "remote source opened");
        Ok(Self { reader: Box::new(response), size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn url_detection() {
        assert!(is_url("https://example.com/a.iso"));
        assert!(is_url("HTTP://example.com"));
        assert!(!is_url("./http.txt"));
        assert!(!is_url("ht"));
        assert!(!is_url("/srv/data.bin"));
    }

    #[test]
    fn local_file_reports_size() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[9u8; 1234]).unwrap();
        let mut src = InputSource::open(tmp.path().to_str().unwrap()).unwrap();
        assert_eq!(src.size, Some(1234));
        let mut buf = Vec::new();
        src.reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf.len(), 1234);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(InputSource::open("/definitely/not/here.bin"), Err(VaultError::Io(_))));
    }
}
