//! Intel HEX program loader.
//!
//! Accepts data (00), end-of-file (01), extended segment address (02) and
//! extended linear address (04) records. Start address records (03, 05) are
//! accepted and ignored. Anything else, a bad checksum, a record that writes
//! below the end of the previous data record, or a missing EOF record rejects
//! the whole image.

use std::fmt::Write as _;
use thiserror::Error;

/// Program memory contents decoded from a HEX image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableImage {
    words: Vec<u16>,
    byte_len: usize,
}

impl ExecutableImage {
    /// Packs little-endian bytes into program words. A trailing odd byte is
    /// paired with erased flash (0xFF).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let words = bytes
            .chunks(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0xFF)]))
            .collect();
        Self {
            words,
            byte_len: bytes.len(),
        }
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Highest byte address written plus one.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("line {line}: record does not start with ':'")]
    MissingStartCode { line: usize },
    #[error("line {line}: record contains non-hex characters or an odd digit count")]
    InvalidDigits { line: usize },
    #[error("line {line}: record length does not match its byte count")]
    LengthMismatch { line: usize },
    #[error("line {line}: checksum mismatch (expected {expected:#04x}, found {found:#04x})")]
    Checksum { line: usize, expected: u8, found: u8 },
    #[error("line {line}: unsupported record type {record_type:#04x}")]
    UnsupportedRecord { line: usize, record_type: u8 },
    #[error("line {line}: data at {address:#07x} overlaps or precedes the previous record")]
    OutOfOrder { line: usize, address: u32 },
    #[error("line {line}: {len} bytes at {address:#07x} exceed program memory of {capacity} bytes")]
    AddressOutOfRange {
        line: usize,
        address: u32,
        len: usize,
        capacity: usize,
    },
    #[error("line {line}: record after end-of-file")]
    DataAfterEof { line: usize },
    #[error("image is truncated: no end-of-file record")]
    MissingEof,
    #[error("image contains no data")]
    Empty,
}

const RECORD_DATA: u8 = 0x00;
const RECORD_EOF: u8 = 0x01;
const RECORD_EXT_SEGMENT: u8 = 0x02;
const RECORD_START_SEGMENT: u8 = 0x03;
const RECORD_EXT_LINEAR: u8 = 0x04;
const RECORD_START_LINEAR: u8 = 0x05;

/// Parses an Intel HEX text into a program image no larger than `capacity`
/// bytes. Unwritten gaps read as erased flash (0xFF).
pub fn parse_intel_hex(text: &str, capacity: usize) -> Result<ExecutableImage, ImageError> {
    let mut memory: Vec<u8> = Vec::new();
    let mut base: u32 = 0;
    let mut previous_end: Option<u32> = None;
    let mut saw_eof = false;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let record = raw.trim();
        if record.is_empty() {
            continue;
        }
        if saw_eof {
            return Err(ImageError::DataAfterEof { line });
        }
        let body = record
            .strip_prefix(':')
            .ok_or(ImageError::MissingStartCode { line })?;
        let bytes = decode_hex_bytes(body).ok_or(ImageError::InvalidDigits { line })?;
        if bytes.len() < 5 || bytes.len() != bytes[0] as usize + 5 {
            return Err(ImageError::LengthMismatch { line });
        }

        let (payload, checksum) = bytes.split_at(bytes.len() - 1);
        let sum = payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        let expected = sum.wrapping_neg();
        if expected != checksum[0] {
            return Err(ImageError::Checksum {
                line,
                expected,
                found: checksum[0],
            });
        }

        let offset = u16::from_be_bytes([payload[1], payload[2]]) as u32;
        let record_type = payload[3];
        let data = &payload[4..];

        match record_type {
            RECORD_DATA => {
                let address = base + offset;
                if previous_end.is_some_and(|end| address < end) {
                    return Err(ImageError::OutOfOrder { line, address });
                }
                let end = address as usize + data.len();
                if end > capacity {
                    return Err(ImageError::AddressOutOfRange {
                        line,
                        address,
                        len: data.len(),
                        capacity,
                    });
                }
                if memory.len() < end {
                    memory.resize(end, 0xFF);
                }
                memory[address as usize..end].copy_from_slice(data);
                previous_end = Some(end as u32);
            }
            RECORD_EOF => saw_eof = true,
            RECORD_EXT_SEGMENT | RECORD_EXT_LINEAR => {
                if data.len() != 2 {
                    return Err(ImageError::LengthMismatch { line });
                }
                let value = u16::from_be_bytes([data[0], data[1]]) as u32;
                base = if record_type == RECORD_EXT_SEGMENT {
                    value << 4
                } else {
                    value << 16
                };
            }
            RECORD_START_SEGMENT | RECORD_START_LINEAR => {}
            other => {
                return Err(ImageError::UnsupportedRecord {
                    line,
                    record_type: other,
                });
            }
        }
    }

    if !saw_eof {
        return Err(ImageError::MissingEof);
    }
    if memory.is_empty() {
        return Err(ImageError::Empty);
    }
    Ok(ExecutableImage::from_bytes(&memory))
}

fn decode_hex_bytes(digits: &str) -> Option<Vec<u8>> {
    if digits.len() % 2 != 0 || !digits.is_ascii() {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

/// Renders bytes as Intel HEX with 16-byte data records starting at address 0.
pub fn to_intel_hex(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (chunk_index, chunk) in bytes.chunks(16).enumerate() {
        let address = (chunk_index * 16) as u16;
        let mut record = vec![chunk.len() as u8];
        record.extend_from_slice(&address.to_be_bytes());
        record.push(RECORD_DATA);
        record.extend_from_slice(chunk);
        push_record(&mut out, &record);
    }
    push_record(&mut out, &[0x00, 0x00, 0x00, RECORD_EOF]);
    out
}

fn push_record(out: &mut String, record: &[u8]) {
    let checksum = record
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
        .wrapping_neg();
    out.push(':');
    for byte in record.iter().chain(std::iter::once(&checksum)) {
        let _ = write!(out, "{byte:02X}");
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    // Blink fragment as emitted by avr-gcc: two data records and EOF.
    const SAMPLE: &str = ":100000000C9434000C943E000C943E000C943E0082\n\
                          :02001000089551\n\
                          :00000001FF\n";

    #[test]
    fn test_parses_data_records_into_words() {
        let image = parse_intel_hex(SAMPLE, 32 * 1024).unwrap();
        assert_eq!(image.byte_len(), 18);
        assert_eq!(&image.words()[..3], &[0x940C, 0x0034, 0x940C]);
        assert_eq!(image.words()[8], 0x9508);
    }

    #[test]
    fn test_checksum_mismatch_is_rejected() {
        let bad = SAMPLE.replace("089551", "089550");
        let err = parse_intel_hex(&bad, 32 * 1024).unwrap_err();
        assert_eq!(
            err,
            ImageError::Checksum {
                line: 2,
                expected: 0x51,
                found: 0x50
            }
        );
    }

    #[test]
    fn test_truncated_image_is_rejected() {
        let truncated = ":100000000C9434000C943E000C943E000C943E0082\n";
        assert_eq!(parse_intel_hex(truncated, 32 * 1024), Err(ImageError::MissingEof));
        assert_eq!(parse_intel_hex("", 32 * 1024), Err(ImageError::MissingEof));
    }

    #[test]
    fn test_address_beyond_capacity_is_rejected() {
        let err = parse_intel_hex(SAMPLE, 16).unwrap_err();
        assert!(matches!(err, ImageError::AddressOutOfRange { line: 2, address: 0x10, .. }));
    }

    #[test]
    fn test_out_of_order_records_are_rejected() {
        let swapped = ":02001000089551\n\
                       :100000000C9434000C943E000C943E000C943E0082\n\
                       :00000001FF\n";
        let err = parse_intel_hex(swapped, 32 * 1024).unwrap_err();
        assert_eq!(err, ImageError::OutOfOrder { line: 2, address: 0 });
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(
            parse_intel_hex("100000\n", 64),
            Err(ImageError::MissingStartCode { line: 1 })
        );
        assert_eq!(
            parse_intel_hex(":0G\n", 64),
            Err(ImageError::InvalidDigits { line: 1 })
        );
        assert_eq!(
            parse_intel_hex(":0200000001FD\n", 64),
            Err(ImageError::LengthMismatch { line: 1 })
        );
        assert_eq!(
            parse_intel_hex(":00000006FA\n", 64),
            Err(ImageError::UnsupportedRecord { line: 1, record_type: 6 })
        );
        assert_eq!(
            parse_intel_hex(":00000001FF\n:02001000089551\n", 64),
            Err(ImageError::DataAfterEof { line: 2 })
        );
        assert_eq!(parse_intel_hex(":00000001FF\n", 64), Err(ImageError::Empty));
    }

    #[test]
    fn test_extended_linear_address_offsets_data() {
        // Base 0x0001_0000 pushes the record past a 64 KiB device.
        let text = ":020000040001F9\n:02000000089561\n:00000001FF\n";
        let err = parse_intel_hex(text, 32 * 1024).unwrap_err();
        assert!(matches!(err, ImageError::AddressOutOfRange { address: 0x10000, .. }));
    }

    #[test]
    fn test_writer_output_is_accepted() {
        let bytes: Vec<u8> = (0u8..40).collect();
        let image = parse_intel_hex(&to_intel_hex(&bytes), 32 * 1024).unwrap();
        assert_eq!(image, ExecutableImage::from_bytes(&bytes));
        assert_eq!(image.words()[0], 0x0100);
    }
}
