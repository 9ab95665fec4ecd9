//! Marker fields embedded in the program image and the engine that patches them.
//!
//! Both markers are ASCII templates compiled into the binary as statics. A
//! packer copies its own image, rewrites the value regions, and appends the
//! compressed payload; the resulting unpacker finds the same labels in its own
//! file to learn its mode and where the payload starts.
//!
//! ```text
//! MY_ZIP_DATA_OFFSET:18446744073709551616\0   label[19] + value[21]
//! MY_ZIP_MODE:0                               label[12] + value[1]
//! ```

use std::io::{ErrorKind, Read};
use std::ops::Range;

use crate::error::{Error, Result};

// ── Templates ──────────────────────────────────────────────────────────────

/// Data-offset template: label, a 2^64 placeholder that only reserves width,
/// and a terminator byte. Never a real offset.
#[used]
pub static DATA_OFFSET_TEMPLATE: [u8; 40] = *b"MY_ZIP_DATA_OFFSET:18446744073709551616\0";

/// Length of `MY_ZIP_DATA_OFFSET:`.
pub const DATA_OFFSET_LABEL_LEN: usize = 19;

/// Mode template in its packer state.
#[used]
pub static MODE_TEMPLATE: [u8; 13] = *b"MY_ZIP_MODE:0";

/// Length of `MY_ZIP_MODE:`.
pub const MODE_LABEL_LEN: usize = 12;

/// Bytes read per chunk when scanning a file for a marker.
const SCAN_CHUNK: usize = 64 * 1024;

const MODE_PACK: u8 = b'0';
const MODE_UNPACK: u8 = b'1';

// ── Marker field ───────────────────────────────────────────────────────────

/// A fixed-width value slot that follows a constant label inside an image.
///
/// The label is sliced out of the template static itself, so the binary holds
/// exactly one copy of it and the first match in an image is the marker.
#[derive(Debug, Clone, Copy)]
pub struct MarkerField {
    template: &'static [u8],
    label_len: usize,
}

impl MarkerField {
    /// The data-offset marker.
    pub fn data_offset() -> Self {
        // black_box keeps the whole template materialized in the image even
        // when only its label is compared against.
        let template: &'static [u8; 40] = std::hint::black_box(&DATA_OFFSET_TEMPLATE);
        Self {
            template,
            label_len: DATA_OFFSET_LABEL_LEN,
        }
    }

    /// The mode marker.
    pub fn mode() -> Self {
        let template: &'static [u8; 13] = std::hint::black_box(&MODE_TEMPLATE);
        Self {
            template,
            label_len: MODE_LABEL_LEN,
        }
    }

    pub fn label(&self) -> &'static [u8] {
        &self.template[..self.label_len]
    }

    /// Bytes in the value region, terminator included.
    pub fn width(&self) -> usize {
        self.template.len() - self.label_len
    }

    /// Byte range of the value region inside `image`, if the label occurs and
    /// the full region fits before the end of the image.
    pub fn locate(&self, image: &[u8]) -> Option<Range<usize>> {
        let label = self.label();
        let start = image
            .windows(label.len())
            .position(|window| window == label)?
            + label.len();
        let end = start + self.width();
        (end <= image.len()).then_some(start..end)
    }
}

// ── Mode ───────────────────────────────────────────────────────────────────

/// Which execution path the image runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Template state: compress a file into a copy of this program.
    Pack,
    /// Patched state: decompress the payload appended to this program.
    Unpack,
}

impl Mode {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Pack => MODE_PACK,
            Self::Unpack => MODE_UNPACK,
        }
    }

    /// Anything other than `'0'` or `'1'` is rejected rather than guessed.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            MODE_PACK => Ok(Self::Pack),
            MODE_UNPACK => Ok(Self::Unpack),
            other => Err(Error::UnknownMode(other)),
        }
    }
}

// ── Patch engine ───────────────────────────────────────────────────────────

/// An image whose markers carry a data offset and the unpack mode.
#[derive(Debug, Clone)]
pub struct PatchedImage {
    bytes: Vec<u8>,
    data_offset: u64,
}

impl PatchedImage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Offset written into the data-offset marker.
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }
}

/// Patch `image` so that its payload is expected right after its own bytes.
pub fn patch_image(image: Vec<u8>) -> Result<PatchedImage> {
    let produced_length = image.len() as u64;
    locate_and_patch(image, produced_length)
}

/// Write `produced_length` into the data-offset marker and flip the mode
/// marker to unpack.
///
/// Both markers are located and the offset is checked against the reserved
/// width before any byte is modified. Re-patching an already patched image is
/// not prevented; it simply rewrites the same fields.
pub fn locate_and_patch(mut image: Vec<u8>, produced_length: u64) -> Result<PatchedImage> {
    let offset_field = MarkerField::data_offset();
    let mode_field = MarkerField::mode();

    let offset_region = offset_field
        .locate(&image)
        .ok_or(Error::MissingOffsetMarker)?;
    let mode_region = mode_field.locate(&image).ok_or(Error::MissingModeMarker)?;

    let digits = produced_length.to_string();
    // One byte of the region is reserved for the terminator.
    let capacity = offset_field.width() - 1;
    if digits.len() > capacity {
        return Err(Error::OffsetOverflow {
            value: produced_length,
            digits: digits.len(),
            width: capacity,
        });
    }

    let region = &mut image[offset_region];
    region[..digits.len()].copy_from_slice(digits.as_bytes());
    region[digits.len()..].fill(0);

    image[mode_region.start] = Mode::Unpack.as_byte();

    tracing::debug!(data_offset = produced_length, "patched image markers");

    Ok(PatchedImage {
        bytes: image,
        data_offset: produced_length,
    })
}

/// Read the mode marker of an image.
pub fn read_mode(image: &[u8]) -> Result<Mode> {
    let region = MarkerField::mode()
        .locate(image)
        .ok_or(Error::MissingModeMarker)?;
    Mode::from_byte(image[region.start])
}

/// Read the data offset recorded in an image.
pub fn read_offset(image: &[u8]) -> Result<u64> {
    let region = MarkerField::data_offset()
        .locate(image)
        .ok_or(Error::MissingOffsetMarker)?;
    parse_offset(&image[region])
}

/// Read the mode marker from a file without loading it whole.
pub fn scan_mode<R: Read>(reader: R) -> Result<Mode> {
    let value = scan_marker(reader, MarkerField::mode())?.ok_or(Error::MissingModeMarker)?;
    Mode::from_byte(value[0])
}

/// Read the data offset from a file without loading it whole.
pub fn scan_offset<R: Read>(reader: R) -> Result<u64> {
    let value =
        scan_marker(reader, MarkerField::data_offset())?.ok_or(Error::MissingOffsetMarker)?;
    parse_offset(&value)
}

/// The value region is a run of ASCII digits followed by padding. The
/// unpatched placeholder (2^64) does not fit in a `u64` and is reported as
/// corrupt.
fn parse_offset(value: &[u8]) -> Result<u64> {
    let digits = value.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return Err(Error::CorruptOffset("data offset is empty".to_string()));
    }
    // All ASCII digits, so the only parse failure left is overflow.
    std::str::from_utf8(&value[..digits])
        .ok()
        .and_then(|text| text.parse::<u64>().ok())
        .ok_or_else(|| Error::CorruptOffset("data offset out of range".to_string()))
}

/// Stream `reader` until the first occurrence of `field` and return a copy of
/// its value region.
///
/// Only a chunk plus the tail that could still hold a split label and region
/// is kept in memory, so an archive with a large payload is never loaded.
fn scan_marker<R: Read>(mut reader: R, field: MarkerField) -> Result<Option<Vec<u8>>> {
    let keep = field.label().len() + field.width() - 1;
    let mut chunk = vec![0u8; SCAN_CHUNK];
    let mut window: Vec<u8> = Vec::with_capacity(SCAN_CHUNK + keep);

    loop {
        let n = loop {
            match reader.read(&mut chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::io("reading program image", e)),
            }
        };
        window.extend_from_slice(&chunk[..n]);

        if let Some(region) = field.locate(&window) {
            return Ok(Some(window[region].to_vec()));
        }
        if n == 0 {
            return Ok(None);
        }
        if window.len() > keep {
            window.drain(..window.len() - keep);
        }
    }
}
