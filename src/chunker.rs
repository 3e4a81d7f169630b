//! Fragmenter: split a byte stream into sequence-numbered pieces.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

/// Expected number of fragments for an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentCount {
    Known(u64),
    /// Source length not available up front (e.g. a response without `Content-Length`).
    Unknown,
}

impl FragmentCount {
    pub fn for_size(size: Option<u64>, max_fragment_bytes: usize) -> Self {
        match size {
            Some(size) => FragmentCount::Known(size.div_ceil(max_fragment_bytes as u64)),
            None       => FragmentCount::Unknown,
        }
    }

    pub fn known(self) -> Option<u64> {
        match self {
            FragmentCount::Known(n) => Some(n),
            FragmentCount::Unknown  => None,
        }
    }
}

impl fmt::Display for FragmentCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentCount::Known(n) => write!(f, "{n}"),
            FragmentCount::Unknown  => f.write_str("an unknown number of"),
        }
    }
}

/// A payload slice and its 1-based position in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFragment {
    pub sequence: u64,
    pub payload:  Vec<u8>,
}

/// Lazily reads `max_fragment_bytes` at a time from `reader`.
///
/// Short reads from the underlying source are accumulated, so every fragment
/// except the last is exactly `max_fragment_bytes` long.  The iterator stops
/// after the first I/O error.
pub struct Fragmenter<R> {
    reader:             R,
    max_fragment_bytes: usize,
    next_sequence:      u64,
    done:               bool,
}

impl<R: Read> Fragmenter<R> {
    pub fn new(reader: R, max_fragment_bytes: usize) -> Self {
        Self {
            reader,
            max_fragment_bytes: max_fragment_bytes.max(1),
            next_sequence: 1,
            done: false,
        }
    }

    fn read_fragment(&mut self) -> io::Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(self.max_fragment_bytes);
        (&mut self.reader)
            .take(self.max_fragment_bytes as u64)
            .read_to_end(&mut payload)?;
        Ok(payload)
    }
}

impl<R: Read + Seek> Fragmenter<R> {
    /// Start over from the beginning of a seekable source.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.next_sequence = 1;
        self.done = false;
        Ok(())
    }
}

impl<R: Read> Iterator for Fragmenter<R> {
    type Item = io::Result<RawFragment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_fragment() {
            Ok(payload) if payload.is_empty() => {
                self.done = true;
                None
            }
            Ok(payload) => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                if payload.len() < self.max_fragment_bytes {
                    self.done = true;
                }
                Some(Ok(RawFragment { sequence, payload }))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most `step` bytes per read, like a network body.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn counts_from_known_size() {
        assert_eq!(FragmentCount::for_size(Some(25_000_000), 10_223_999), FragmentCount::Known(3));
        assert_eq!(FragmentCount::for_size(Some(10_223_999), 10_223_999), FragmentCount::Known(1));
        assert_eq!(FragmentCount::for_size(Some(0), 10), FragmentCount::Known(0));
        assert_eq!(FragmentCount::for_size(None, 10), FragmentCount::Unknown);
        assert_eq!(FragmentCount::Unknown.to_string(), "an unknown number of");
    }

    #[test]
    fn splits_into_numbered_fragments() {
        let data: Vec<u8> = (0..25u8).collect();
        let frags: Vec<RawFragment> = Fragmenter::new(Cursor::new(&data), 10)
            .collect::<io::Result<_>>()
            .unwrap();
        let sizes: Vec<usize> = frags.iter().map(|f| f.payload.len()).collect();
        let seqs: Vec<u64> = frags.iter().map(|f| f.sequence).collect();
        assert_eq!(sizes, [10, 10, 5]);
        assert_eq!(seqs, [1, 2, 3]);
        let joined: Vec<u8> = frags.into_iter().flat_map(|f| f.payload).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let data = [7u8; 20];
        let n = Fragmenter::new(Cursor::new(&data[..]), 10).count();
        assert_eq!(n, 2);
        assert_eq!(Fragmenter::new(Cursor::new(&[] as &[u8]), 10).count(), 0);
    }

    #[test]
    fn short_reads_are_coalesced() {
        let data: Vec<u8> = (0..=255u8).collect();
        let src = Trickle { data: &data, step: 7 };
        let sizes: Vec<usize> = Fragmenter::new(src, 100)
            .map(|f| f.unwrap().payload.len())
            .collect();
        assert_eq!(sizes, [100, 100, 56]);
    }

    #[test]
    fn rewind_restarts_numbering() {
        let data = [1u8; 15];
        let mut frag = Fragmenter::new(Cursor::new(&data[..]), 10);
        assert_eq!(frag.by_ref().count(), 2);
        frag.rewind().unwrap();
        assert_eq!(frag.next().unwrap().unwrap().sequence, 1);
    }
}
