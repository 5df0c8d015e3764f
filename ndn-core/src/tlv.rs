use std::io::{self, Read, Write};

use crate::varnum;

/// TLV type numbers assigned by NDN-TLV and the forwarder management protocol
pub mod tlv_types {
    pub const INTEREST: u64 = 5;
    pub const DATA: u64 = 6;
    pub const NAME: u64 = 7;
    pub const NAME_COMPONENT: u64 = 8;
    pub const SELECTORS: u64 = 9;
    pub const NONCE: u64 = 10;
    pub const SCOPE: u64 = 11;
    pub const INTEREST_LIFETIME: u64 = 12;
    pub const MIN_SUFFIX_COMPONENTS: u64 = 13;
    pub const MAX_SUFFIX_COMPONENTS: u64 = 14;
    pub const PUBLISHER_PUBLICKEY_LOCATOR: u64 = 15;
    pub const EXCLUDE: u64 = 16;
    pub const CHILD_SELECTOR: u64 = 17;
    pub const MUST_BE_FRESH: u64 = 18;
    pub const ANY: u64 = 19;
    pub const META_INFO: u64 = 20;
    pub const CONTENT: u64 = 21;
    pub const SIGNATURE_INFO: u64 = 22;
    pub const SIGNATURE_VALUE: u64 = 23;
    pub const CONTENT_TYPE: u64 = 24;
    pub const FRESHNESS_PERIOD: u64 = 25;
    pub const FINAL_BLOCK_ID: u64 = 26;
    pub const SIGNATURE_TYPE: u64 = 27;
    pub const KEY_LOCATOR: u64 = 28;
    pub const KEY_LOCATOR_DIGEST: u64 = 29;

    // Forwarder management
    pub const CONTROL_RESPONSE: u64 = 101;
    pub const STATUS_CODE: u64 = 102;
    pub const STATUS_TEXT: u64 = 103;
    pub const CONTROL_PARAMETERS: u64 = 104;
    pub const FACE_ID: u64 = 105;
    pub const COST: u64 = 106;
    pub const STRATEGY: u64 = 107;
    pub const FLAGS: u64 = 108;
    pub const EXPIRATION_PERIOD: u64 = 109;
    pub const ORIGIN: u64 = 111;
    pub const URI: u64 = 114;
}

/// A TLV (Type-Length-Value) node.
///
/// A node carries either an opaque `value` or a list of `children`; the
/// length written on the wire is derived from whichever is present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TlvElement {
    pub type_: u64,
    pub value: Vec<u8>,
    pub children: Vec<TlvElement>,
}

/// Errors that can occur during TLV encoding/decoding
#[derive(Debug, thiserror::Error)]
pub enum TlvError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Buffer too short")]
    ShortBuffer,
    #[error("Wrong TLV type: expected {expected}, got {actual}")]
    WrongType { expected: u64, actual: u64 },
    #[error("Wrong number of TLV elements of type {tlv_type}")]
    WrongCount { tlv_type: u64 },
    #[error("{0} bytes left over after decoding")]
    BufferNotEmpty(usize),
    #[error("TLV of type {0} has both a value and children")]
    ValueChildrenCoexist(u64),
    #[error("Malformed TLV: {0}")]
    Malformed(String),
}

impl TlvElement {
    /// Create a leaf TLV element
    pub fn new(type_: u64, value: Vec<u8>) -> Self {
        Self {
            type_,
            value,
            children: Vec::new(),
        }
    }

    /// Create a TLV element whose value is made of nested elements
    pub fn with_children(type_: u64, children: Vec<TlvElement>) -> Self {
        Self {
            type_,
            value: Vec::new(),
            children,
        }
    }

    /// Create a leaf holding a non-negative integer
    pub fn nonneg(type_: u64, value: u64) -> Self {
        Self::new(type_, varnum::encode_nonneg(value))
    }

    /// Interpret the value as a non-negative integer
    pub fn as_nonneg(&self) -> Result<u64, TlvError> {
        varnum::decode_nonneg(&self.value)
    }

    /// First direct child of the given type
    pub fn child(&self, type_: u64) -> Option<&TlvElement> {
        self.children.iter().find(|c| c.type_ == type_)
    }

    /// Length of the value part on the wire
    pub fn value_length(&self) -> usize {
        if self.children.is_empty() {
            self.value.len()
        } else {
            self.children.iter().map(TlvElement::encoded_length).sum()
        }
    }

    /// Get the total encoded length of this TLV element
    pub fn encoded_length(&self) -> usize {
        let length = self.value_length();
        varnum::encoded_len(self.type_) + varnum::encoded_len(length as u64) + length
    }

    /// Encode this TLV element to bytes
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        let mut buffer = Vec::with_capacity(self.encoded_length());
        self.encode_to(&mut buffer)?;
        Ok(buffer)
    }

    /// Append the encoding of this element to `buffer`
    pub fn encode_to(&self, buffer: &mut Vec<u8>) -> Result<(), TlvError> {
        if !self.value.is_empty() && !self.children.is_empty() {
            return Err(TlvError::ValueChildrenCoexist(self.type_));
        }

        varnum::encode(self.type_, buffer);
        varnum::encode(self.value_length() as u64, buffer);

        if self.children.is_empty() {
            buffer.extend_from_slice(&self.value);
        } else {
            for child in &self.children {
                child.encode_to(buffer)?;
            }
        }

        Ok(())
    }

    /// Concatenated encodings of the children that precede the first child
    /// for which `stop` returns true.
    ///
    /// This is the byte string covered by a signature: everything in the
    /// record up to, but excluding, its signature value.
    pub fn encode_children_until<F>(&self, stop: F) -> Result<Vec<u8>, TlvError>
    where
        F: Fn(usize, &TlvElement) -> bool,
    {
        let mut buffer = Vec::new();
        for (index, child) in self.children.iter().enumerate() {
            if stop(index, child) {
                break;
            }
            child.encode_to(&mut buffer)?;
        }
        Ok(buffer)
    }

    /// Decode one opaque TLV element from the start of `data`, returning it
    /// together with the number of bytes consumed
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (type_, type_len) = varnum::decode(data)?;
        let (length, length_len) = varnum::decode(&data[type_len..])?;
        let offset = type_len + length_len;

        let end = usize::try_from(length)
            .ok()
            .and_then(|length| offset.checked_add(length))
            .ok_or(TlvError::ShortBuffer)?;
        let value = data.get(offset..end).ok_or(TlvError::ShortBuffer)?;

        Ok((TlvElement::new(type_, value.to_vec()), end))
    }

    /// Read exactly one element from a byte stream and return its raw wire
    /// encoding. Useful for framing TLV packets on a stream transport.
    pub fn read_raw<R: Read>(reader: &mut R) -> Result<Vec<u8>, TlvError> {
        let mut raw = Vec::new();
        read_varnum_from(reader, &mut raw)?;
        let length = read_varnum_from(reader, &mut raw)?;

        // the length is untrusted, so the buffer only grows with bytes received
        let total = usize::try_from(length)
            .ok()
            .and_then(|length| raw.len().checked_add(length))
            .ok_or(TlvError::ShortBuffer)?;
        reader.by_ref().take(length).read_to_end(&mut raw)?;
        if raw.len() != total {
            return Err(TlvError::ShortBuffer);
        }
        Ok(raw)
    }

    /// Write the encoding of this element to a byte stream
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), TlvError> {
        writer.write_all(&self.encode()?)?;
        Ok(())
    }
}

/// Read a VarNum from `reader`, appending its raw bytes to `raw`
fn read_varnum_from<R: Read>(reader: &mut R, raw: &mut Vec<u8>) -> Result<u64, TlvError> {
    let mut first = [0u8; 1];
    reader.read_exact(&mut first)?;
    let width = match first[0] {
        0xFD => 2,
        0xFE => 4,
        0xFF => 8,
        _ => 0,
    };

    let start = raw.len();
    raw.push(first[0]);
    raw.resize(start + 1 + width, 0);
    reader.read_exact(&mut raw[start + 1..])?;

    Ok(varnum::decode(&raw[start..])?.0)
}

/// Encode multiple TLV elements into a single buffer
pub fn encode_tlv_sequence(elements: &[TlvElement]) -> Result<Vec<u8>, TlvError> {
    let total_size = elements.iter().map(|e| e.encoded_length()).sum();
    let mut buffer = Vec::with_capacity(total_size);

    for element in elements {
        element.encode_to(&mut buffer)?;
    }

    Ok(buffer)
}

/// Decode multiple opaque TLV elements from a buffer
pub fn decode_tlv_sequence(data: &[u8]) -> Result<Vec<TlvElement>, TlvError> {
    let mut elements = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let (element, consumed) = TlvElement::decode(&data[offset..])?;
        elements.push(element);
        offset += consumed;
    }

    Ok(elements)
}
