//! Binary netpbm (`P6`) container for canvases.
//!
//! Lossless, header-only framing around the raw RGB bytes, so the stored
//! image flattens back to exactly the bytes the checksum was taken over.

use super::{raster_len, CodecError, PixelBuffer};

const MAGIC: &[u8; 2] = b"P6";
const MAXVAL: u32 = 255;

/// Serialize a canvas as a `P6` image.
pub fn to_ppm(canvas: &PixelBuffer) -> Vec<u8> {
    let header = format!("P6\n{} {}\n{}\n", canvas.width(), canvas.height(), MAXVAL);
    let mut out = Vec::with_capacity(header.len() + canvas.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(canvas.as_bytes());
    out
}

/// Parse a `P6` image.  A body shorter than the header promises is an error,
/// which callers on the download path treat as a partial read.
pub fn from_ppm(bytes: &[u8]) -> Result<PixelBuffer, CodecError> {
    if bytes.len() < 2 || &bytes[..2] != MAGIC {
        return Err(CodecError::Image("not a binary PPM (P6) image".into()));
    }

    let mut cursor = Cursor { bytes, pos: 2 };
    let width  = cursor.header_field("width")?;
    let height = cursor.header_field("height")?;
    let maxval = cursor.header_field("maxval")?;
    if maxval != MAXVAL {
        return Err(CodecError::Image(format!("unsupported maxval {maxval}")));
    }
    // Exactly one whitespace byte separates the header from the raster.
    cursor.pos += 1;

    let body = bytes.get(cursor.pos..).unwrap_or(&[]);
    let expected = raster_len(width, height)?;
    if body.len() < expected {
        return Err(CodecError::CanvasSize { expected, actual: body.len() });
    }
    PixelBuffer::from_raw(width, height, body[..expected].to_vec())
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos:   usize,
}

impl Cursor<'_> {
    fn skip_separators(&mut self) {
        while let Some(&b) = self.bytes.get(self.pos) {
            if b == b'#' {
                while self.bytes.get(self.pos).is_some_and(|&c| c != b'\n') {
                    self.pos += 1;
                }
            } else if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn header_field(&mut self, what: &str) -> Result<u32, CodecError> {
        self.skip_separators();
        let start = self.pos;
        while self.bytes.get(self.pos).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CodecError::Image(format!("bad {what} in PPM header")))
    }
}
