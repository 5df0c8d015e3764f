//! NDN variable-length numbers and non-negative integer bodies.
//!
//! Wire format of a VarNum:
//! - `0x00..=0xFC`: the byte itself
//! - `0xFD`: followed by 2 bytes (big-endian)
//! - `0xFE`: followed by 4 bytes (big-endian)
//! - `0xFF`: followed by 8 bytes (big-endian)

use crate::tlv::TlvError;

/// Number of bytes `value` occupies when written as a VarNum
pub fn encoded_len(value: u64) -> usize {
    if value <= 0xFC {
        1
    } else if value <= u16::MAX as u64 {
        3
    } else if value <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

/// Append `value` to `buffer` using the smallest VarNum form
pub fn encode(value: u64, buffer: &mut Vec<u8>) {
    if value <= 0xFC {
        buffer.push(value as u8);
    } else if value <= u16::MAX as u64 {
        buffer.push(0xFD);
        buffer.extend_from_slice(&(value as u16).to_be_bytes());
    } else if value <= u32::MAX as u64 {
        buffer.push(0xFE);
        buffer.extend_from_slice(&(value as u32).to_be_bytes());
    } else {
        buffer.push(0xFF);
        buffer.extend_from_slice(&value.to_be_bytes());
    }
}

/// Read a VarNum from the start of `data`, returning the value and the
/// number of bytes consumed
pub fn decode(data: &[u8]) -> Result<(u64, usize), TlvError> {
    let first = *data.first().ok_or(TlvError::ShortBuffer)?;
    let width = match first {
        0xFD => 2,
        0xFE => 4,
        0xFF => 8,
        _ => return Ok((first as u64, 1)),
    };

    let bytes = data.get(1..1 + width).ok_or(TlvError::ShortBuffer)?;
    let value = bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
    Ok((value, 1 + width))
}

/// Encode a non-negative integer body: the narrowest of 1, 2, 4 or 8
/// big-endian bytes that holds `value`
pub fn encode_nonneg(value: u64) -> Vec<u8> {
    if value <= u8::MAX as u64 {
        vec![value as u8]
    } else if value <= u16::MAX as u64 {
        (value as u16).to_be_bytes().to_vec()
    } else if value <= u32::MAX as u64 {
        (value as u32).to_be_bytes().to_vec()
    } else {
        value.to_be_bytes().to_vec()
    }
}

/// Decode a non-negative integer body produced by [`encode_nonneg`]
pub fn decode_nonneg(body: &[u8]) -> Result<u64, TlvError> {
    match body.len() {
        1 | 2 | 4 | 8 => Ok(body.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)),
        len => Err(TlvError::Malformed(format!(
            "non-negative integer of {} bytes",
            len
        ))),
    }
}
