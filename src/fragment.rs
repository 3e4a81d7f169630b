use serde::{Deserialize, Serialize};
use crc32fast::Hasher;
use crate::codec::{encode, CanvasGeometry, CodecError, PixelBuffer};

/// CRC-32 over the unstripped canvas bytes.
pub fn checksum(canvas_bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(canvas_bytes);
    hasher.finalize()
}

/// Metadata stored beside each uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentMeta {
    pub sequence:    u64,
    pub checksum:    u32,
    pub payload_len: u64,
}

impl FragmentMeta {
    /// Backend-visible name of the fragment.
    pub fn name(&self) -> String {
        self.sequence.to_string()
    }
}

/// One encoded, tagged fragment, ready for upload.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub meta:   FragmentMeta,
    pub canvas: PixelBuffer,
}

impl Fragment {
    pub fn encode(geometry: &CanvasGeometry, sequence: u64, payload: &[u8]) -> Result<Self, CodecError> {
        let canvas = encode(geometry, payload)?;
        let meta = FragmentMeta {
            sequence,
            checksum:    checksum(canvas.as_bytes()),
            payload_len: payload.len() as u64,
        };
        Ok(Self { meta, canvas })
    }
}

/// Outcome of checking a fetched canvas against its stored checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Valid,
    Mismatch { expected: u32, actual: u32 },
    /// The backend holds no checksum for this fragment.
    Unchecked,
}

pub fn verify_checksum(stored: Option<u32>, canvas: &PixelBuffer) -> Verification {
    match stored {
        None => Verification::Unchecked,
        Some(expected) => {
            let actual = checksum(canvas.as_bytes());
            if actual == expected {
                Verification::Valid
            } else {
                Verification::Mismatch { expected, actual }
            }
        }
    }
}

/// `0x`-prefixed, zero-padded hex, as written to metadata and logs.
pub fn format_checksum(value: u32) -> String {
    format!("{value:#010x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_reference_value() {
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
        assert_eq!(format_checksum(0xCBF4_3926), "0xcbf43926");
        assert_eq!(format_checksum(7), "0x00000007");
    }

    #[test]
    fn checksum_covers_padding() {
        let g = CanvasGeometry::new(64).unwrap();
        let frag = Fragment::encode(&g, 3, b"hello").unwrap();
        assert_eq!(frag.meta.checksum, checksum(frag.canvas.as_bytes()));
        assert_ne!(frag.meta.checksum, checksum(b"hello"));
        assert_eq!(frag.meta.payload_len, 5);
        assert_eq!(frag.meta.name(), "3");
    }

    #[test]
    fn verification_outcomes() {
        let g = CanvasGeometry::new(16).unwrap();
        let frag = Fragment::encode(&g, 1, b"abc").unwrap();
        assert_eq!(verify_checksum(Some(frag.meta.checksum), &frag.canvas), Verification::Valid);
        assert_eq!(verify_checksum(None, &frag.canvas), Verification::Unchecked);

        let mut bytes = frag.canvas.clone().into_bytes();
        bytes[0] ^= 0xFF;
        let damaged = PixelBuffer::from_raw(frag.canvas.width(), frag.canvas.height(), bytes).unwrap();
        assert!(matches!(
            verify_checksum(Some(frag.meta.checksum), &damaged),
            Verification::Mismatch { .. }
        ));
    }
}
