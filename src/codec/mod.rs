//! Fragment codec: byte payload ⇄ fixed-size RGB canvas.
//!
//! # Canvas layout
//! A payload of at most `max_fragment_bytes` is followed by one sentinel byte
//! ([`SENTINEL`]) and right-padded with zeros to `canvas_bytes`, which is
//! `max_fragment_bytes + 1` rounded up to a multiple of 3.  The padded buffer
//! is read as consecutive `[r, g, b]` triples, row-major, forming an image of
//! fixed dimensions.  Every fragment of a given geometry is the same size.
//!
//! # Framing
//! [`decode`] recovers the payload by stripping **all** trailing zero bytes
//! and then exactly one more byte, assumed to be the sentinel.  Nothing checks
//! that assumption: a canvas with no sentinel (zeroed or damaged tail) silently
//! loses its last real byte.  This is the legacy framing and it is kept as-is;
//! [`Framing::LengthMetadata`] is the opt-in alternative, which trims the
//! canvas to a length stored beside the checksum and insists on the sentinel.
//! The canvas bytes are identical under both framings.

pub mod ppm;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest payload carried by one fragment with the default geometry.
pub const DEFAULT_MAX_FRAGMENT_BYTES: usize = 10_223_999;

/// Marker appended after the payload, before zero padding.  Must be non-zero.
pub const SENTINEL: u8 = 0x01;

/// Widest canvas row, in pixels.
pub const MAX_CANVAS_WIDTH: u32 = 2000;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Empty payload cannot be encoded")]
    EmptyPayload,
    #[error("Payload of {len} bytes exceeds the fragment limit of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("Fragment limit must be at least one byte")]
    ZeroFragmentLimit,
    #[error("Canvas holds {actual} bytes, expected {expected}")]
    CanvasSize { expected: usize, actual: usize },
    #[error("Stored payload length {len} does not fit a canvas of {canvas} bytes")]
    LengthOutOfRange { len: u64, canvas: usize },
    #[error("Expected sentinel after {len} payload bytes, found {found:#04x}")]
    MissingSentinel { len: u64, found: u8 },
    #[error("Malformed image: {0}")]
    Image(String),
}

// ── Geometry ─────────────────────────────────────────────────────────────────

/// Size contract shared by the encoder and decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasGeometry {
    pub max_fragment_bytes: usize,
    pub canvas_bytes:       usize,
    pub width:              u32,
    pub height:             u32,
}

impl CanvasGeometry {
    pub fn new(max_fragment_bytes: usize) -> Result<Self, CodecError> {
        if max_fragment_bytes == 0 {
            return Err(CodecError::ZeroFragmentLimit);
        }
        let canvas_bytes = max_fragment_bytes
            .checked_add(1)
            .and_then(|n| n.div_ceil(3).checked_mul(3))
            .ok_or_else(|| CodecError::Image(format!("fragment limit {max_fragment_bytes} out of range")))?;
        let pixels = (canvas_bytes / 3) as u64;

        // Widest row up to MAX_CANVAS_WIDTH that tiles the pixel count exactly.
        let mut width = pixels.min(MAX_CANVAS_WIDTH as u64);
        while pixels % width != 0 {
            width -= 1;
        }
        let height = pixels / width;
        if height > u32::MAX as u64 {
            return Err(CodecError::Image(format!("canvas height {height} out of range")));
        }

        Ok(Self {
            max_fragment_bytes,
            canvas_bytes,
            width:  width as u32,
            height: height as u32,
        })
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.canvas_bytes / 3
    }
}

impl Default for CanvasGeometry {
    fn default() -> Self {
        // 10 224 000 bytes = 2000 × 1704 px
        Self {
            max_fragment_bytes: DEFAULT_MAX_FRAGMENT_BYTES,
            canvas_bytes:       DEFAULT_MAX_FRAGMENT_BYTES + 1,
            width:              MAX_CANVAS_WIDTH,
            height:             1704,
        }
    }
}

// ── Pixel buffer ─────────────────────────────────────────────────────────────

/// `width * height * 3`, or an error when that does not fit in memory.
pub(crate) fn raster_len(width: u32, height: u32) -> Result<usize, CodecError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(3))
        .ok_or_else(|| CodecError::Image(format!("image dimensions {width}x{height} out of range")))
}

/// A row-major RGB image, stored flat as `width * height * 3` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width:  u32,
    height: u32,
    data:   Vec<u8>,
}

impl PixelBuffer {
    /// Wrap flattened RGB bytes.  The length must be exactly `width * height * 3`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CodecError> {
        let expected = raster_len(width, height)?;
        if data.len() != expected {
            return Err(CodecError::CanvasSize { expected, actual: data.len() });
        }
        Ok(Self { width, height, data })
    }

    pub fn width(&self)  -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }

    /// Flattened bytes, before any stripping.  This is what the checksum covers.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(3).map(|p| [p[0], p[1], p[2]])
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ── Framing ──────────────────────────────────────────────────────────────────

/// How the decoder finds the end of the payload inside a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// Strip trailing zeros, then one byte.  Trusts the sentinel to be there.
    #[default]
    Sentinel,
    /// Trim to the stored payload length; falls back to `Sentinel` when absent.
    LengthMetadata,
}

// ── Encode / decode ──────────────────────────────────────────────────────────

/// Lay `payload` out on a canvas of the given geometry.
pub fn encode(geometry: &CanvasGeometry, payload: &[u8]) -> Result<PixelBuffer, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    if payload.len() > geometry.max_fragment_bytes {
        return Err(CodecError::PayloadTooLarge {
            len: payload.len(),
            max: geometry.max_fragment_bytes,
        });
    }

    let mut data = Vec::with_capacity(geometry.canvas_bytes);
    data.extend_from_slice(payload);
    data.push(SENTINEL);
    data.resize(geometry.canvas_bytes, 0);

    PixelBuffer::from_raw(geometry.width, geometry.height, data)
}

/// Legacy decode: strip every trailing zero, then one more byte.
pub fn decode(canvas: &PixelBuffer) -> Vec<u8> {
    let bytes = canvas.as_bytes();
    let end = bytes.iter().rposition(|&b| b != 0).unwrap_or(0);
    bytes[..end].to_vec()
}

/// Decode using an exact payload length recorded at upload time.
pub fn decode_exact(canvas: &PixelBuffer, payload_len: u64) -> Result<Vec<u8>, CodecError> {
    let bytes = canvas.as_bytes();
    let len = usize::try_from(payload_len)
        .ok()
        .filter(|&l| l < bytes.len())
        .ok_or(CodecError::LengthOutOfRange { len: payload_len, canvas: bytes.len() })?;

    if bytes[len] != SENTINEL {
        return Err(CodecError::MissingSentinel { len: payload_len, found: bytes[len] });
    }
    Ok(bytes[..len].to_vec())
}

/// Decode under `framing`, using `payload_len` when the framing asks for it.
pub fn decode_with(
    framing:     Framing,
    canvas:      &PixelBuffer,
    payload_len: Option<u64>,
) -> Result<Vec<u8>, CodecError> {
    match (framing, payload_len) {
        (Framing::LengthMetadata, Some(len)) => decode_exact(canvas, len),
        _ => Ok(decode(canvas)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_limit_at_the_top_of_usize_is_an_error() {
        assert!(matches!(CanvasGeometry::new(usize::MAX), Err(CodecError::Image(_))));
        assert!(matches!(CanvasGeometry::new(usize::MAX - 1), Err(CodecError::Image(_))));
    }

    #[test]
    fn raw_buffer_with_huge_dimensions_is_rejected() {
        assert!(matches!(PixelBuffer::from_raw(u32::MAX, u32::MAX, vec![0; 3]), Err(CodecError::Image(_))));
    }

    #[test]
    fn default_geometry_matches_derived() {
        let derived = CanvasGeometry::new(DEFAULT_MAX_FRAGMENT_BYTES).unwrap();
        assert_eq!(derived, CanvasGeometry::default());
        assert_eq!(derived.canvas_bytes, 10_224_000);
        assert_eq!(derived.pixel_count(), 3_408_000);
        assert_eq!((derived.width, derived.height), (2000, 1704));
    }

    #[test]
    fn canvas_rounds_up_to_whole_pixels() {
        assert_eq!(CanvasGeometry::new(5).unwrap().canvas_bytes, 6);
        assert_eq!(CanvasGeometry::new(6).unwrap().canvas_bytes, 9);
        assert_eq!(CanvasGeometry::new(7).unwrap().canvas_bytes, 9);

        let g = CanvasGeometry::new(299).unwrap();
        assert_eq!(g.canvas_bytes, 300);
        assert_eq!(g.width as usize * g.height as usize, g.pixel_count());
    }

    #[test]
    fn zero_limit_rejected() {
        assert_eq!(CanvasGeometry::new(0), Err(CodecError::ZeroFragmentLimit));
    }

    #[test]
    fn encode_pads_with_sentinel_then_zeros() {
        let g = CanvasGeometry::new(8).unwrap();
        let canvas = encode(&g, b"abc").unwrap();
        assert_eq!(canvas.as_bytes(), &[b'a', b'b', b'c', SENTINEL, 0, 0, 0, 0, 0]);
        assert_eq!(canvas.pixels().count(), 3);
    }

    #[test]
    fn full_payload_fills_canvas() {
        let g = CanvasGeometry::new(8).unwrap();
        let payload = [0xAAu8; 8];
        let canvas = encode(&g, &payload).unwrap();
        assert_eq!(canvas.as_bytes()[8], SENTINEL);
        assert_eq!(decode(&canvas), payload);
    }

    #[test]
    fn rejects_empty_and_oversized() {
        let g = CanvasGeometry::new(4).unwrap();
        assert_eq!(encode(&g, b""), Err(CodecError::EmptyPayload));
        assert_eq!(
            encode(&g, b"12345"),
            Err(CodecError::PayloadTooLarge { len: 5, max: 4 })
        );
    }

    #[test]
    fn sentinel_shields_payload_zeros() {
        let g = CanvasGeometry::new(32).unwrap();
        let canvas = encode(&g, b"data\0\0").unwrap();
        assert_eq!(decode(&canvas), b"data\0\0");
    }

    #[test]
    fn sentinel_framing_eats_a_byte_when_sentinel_is_missing() {
        // Tail zeroed in transit: legacy decode strips the zeros and then a real byte.
        let canvas = PixelBuffer::from_raw(2, 1, b"dat\0\0\0".to_vec()).unwrap();
        assert_eq!(decode(&canvas), b"da");
        assert!(matches!(
            decode_with(Framing::LengthMetadata, &canvas, Some(3)),
            Err(CodecError::MissingSentinel { len: 3, found: 0 })
        ));
    }

    #[test]
    fn length_framing_trims_to_stored_length() {
        let g = CanvasGeometry::new(32).unwrap();
        let canvas = encode(&g, b"data\0\0").unwrap();
        let out = decode_with(Framing::LengthMetadata, &canvas, Some(6)).unwrap();
        assert_eq!(out, b"data\0\0");
        // Without a stored length the legacy rule applies.
        assert_eq!(decode_with(Framing::LengthMetadata, &canvas, None).unwrap(), b"data\0\0");
    }

    #[test]
    fn length_framing_checks_sentinel() {
        let g = CanvasGeometry::new(32).unwrap();
        let canvas = encode(&g, b"data").unwrap();
        assert!(matches!(
            decode_exact(&canvas, 3),
            Err(CodecError::MissingSentinel { len: 3, found: b'a' })
        ));
        assert!(matches!(
            decode_exact(&canvas, 99),
            Err(CodecError::LengthOutOfRange { .. })
        ));
    }

    #[test]
    fn all_zero_canvas_decodes_empty() {
        let canvas = PixelBuffer::from_raw(2, 1, vec![0; 6]).unwrap();
        assert!(decode(&canvas).is_empty());
    }

    #[test]
    fn from_raw_checks_length() {
        assert_eq!(
            PixelBuffer::from_raw(2, 2, vec![0; 11]),
            Err(CodecError::CanvasSize { expected: 12, actual: 11 })
        );
    }
}
