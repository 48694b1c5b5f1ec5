//! Token header
//!
//! The header carries the format version and the mapping-group id, each as
//! digits in a 185-symbol numeral system, each terminated by [`DELIMITER`].
//! Digit values map to contiguous code points in three runs:
//! `0-9`, `a-z`, `A-Z`, then U+00C0..=U+013A.

use super::CodecError;

/// Number of symbols in the header numeral system
pub const RADIX: u32 = 185;

/// Field terminator. Not a header digit, and canonical JSON escapes it, so it
/// never occurs in a swapped payload either.
pub const DELIMITER: char = '\u{1E}';

const EXTENDED_START: u32 = 0xC0;

fn digit_char(value: u32) -> char {
    let code = match value {
        0..=9 => '0' as u32 + value,
        10..=35 => 'a' as u32 + (value - 10),
        36..=61 => 'A' as u32 + (value - 36),
        _ => EXTENDED_START + (value - 62),
    };
    // All code points in the three runs are valid scalar values.
    char::from_u32(code).unwrap_or('0')
}

fn digit_value(c: char) -> Option<u32> {
    let code = c as u32;
    match c {
        '0'..='9' => Some(code - '0' as u32),
        'a'..='z' => Some(code - 'a' as u32 + 10),
        'A'..='Z' => Some(code - 'A' as u32 + 36),
        _ if (EXTENDED_START..EXTENDED_START + (RADIX - 62)).contains(&code) => {
            Some(code - EXTENDED_START + 62)
        }
        _ => None,
    }
}

/// Writes a number in base 185, most significant digit first
pub fn encode_number(mut value: u32) -> String {
    let mut digits = Vec::new();
    loop {
        digits.push(digit_char(value % RADIX));
        value /= RADIX;
        if value == 0 {
            break;
        }
    }
    digits.iter().rev().collect()
}

/// Reads a base-185 number
pub fn decode_number(digits: &str) -> Result<u32, CodecError> {
    if digits.is_empty() {
        return Err(CodecError::MissingHeader);
    }
    digits.chars().try_fold(0u32, |acc, c| {
        let digit = digit_value(c).ok_or(CodecError::InvalidDigit(c))?;
        acc.checked_mul(RADIX)
            .and_then(|v| v.checked_add(digit))
            .ok_or(CodecError::HeaderOverflow)
    })
}

/// Version and mapping group of an encoded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub group: u32,
}

impl Header {
    /// Renders the header followed by its final delimiter
    pub fn render(&self) -> String {
        format!(
            "{}{}{}{}",
            encode_number(self.version),
            DELIMITER,
            encode_number(self.group),
            DELIMITER
        )
    }

    /// Splits a decompressed token into its header and payload
    pub fn split(text: &str) -> Result<(Header, &str), CodecError> {
        let mut parts = text.splitn(3, DELIMITER);
        let version = parts.next().ok_or(CodecError::MissingHeader)?;
        let group = parts.next().ok_or(CodecError::MissingHeader)?;
        let payload = parts.next().ok_or(CodecError::MissingHeader)?;

        let header = Header {
            version: decode_number(version)?,
            group: decode_number(group)?,
        };
        Ok((header, payload))
    }
}
