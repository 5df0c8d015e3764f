use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tlv::{tlv_types, TlvElement, TlvError};

/// URI prefix of a trailing implicit digest segment
const DIGEST_PREFIX: &str = "sha256digest=";

/// An opaque name component.
///
/// Components order canonically: shorter first, then bytewise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Component(pub Vec<u8>);

impl Component {
    /// Component holding `value` verbatim
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(value.into())
    }

    /// Raw component bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `NAME_COMPONENT` TLV carrying the bytes
    pub fn to_tlv(&self) -> TlvElement {
        TlvElement::new(tlv_types::NAME_COMPONENT, self.0.clone())
    }

    /// Read a `NAME_COMPONENT` TLV
    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        if element.type_ != tlv_types::NAME_COMPONENT {
            return Err(TlvError::WrongType {
                expected: tlv_types::NAME_COMPONENT,
                actual: element.type_,
            });
        }
        Ok(Self(element.value.clone()))
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Component {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "%{:02X}", byte)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Component {
    type Err = NameParseError;

    /// Percent-decode a single URI segment
    fn from_str(segment: &str) -> Result<Self, Self::Err> {
        let bytes = segment.as_bytes();
        let mut value = Vec::with_capacity(bytes.len());
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] == b'%' {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .ok_or(NameParseError::InvalidEscape)?;
                let byte = u8::from_str_radix(hex, 16).map_err(|_| NameParseError::InvalidEscape)?;
                value.push(byte);
                i += 3;
            } else {
                value.push(bytes[i]);
                i += 1;
            }
        }

        Ok(Self(value))
    }
}

/// A hierarchical NDN name.
///
/// `implicit_digest` is the SHA-256 of a Data packet's wire encoding. It is
/// carried for matching but never written into the Name TLV.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Name {
    pub components: Vec<Component>,
    pub implicit_digest: Option<[u8; 32]>,
}

impl Name {
    /// The empty name `/`
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_components(components: Vec<Component>) -> Self {
        Self {
            components,
            implicit_digest: None,
        }
    }

    /// Attach the implicit digest of the Data this name refers to
    pub fn with_implicit_digest(mut self, digest: [u8; 32]) -> Self {
        self.implicit_digest = Some(digest);
        self
    }

    /// Append a component
    pub fn push(&mut self, component: impl Into<Component>) -> &mut Self {
        self.components.push(component.into());
        self
    }

    pub fn get(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// The first `length` components, without the implicit digest
    pub fn get_prefix(&self, length: usize) -> Name {
        let end = std::cmp::min(length, self.components.len());
        Self::from_components(self.components[..end].to_vec())
    }

    /// True if every component of `self` starts `other`
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.len() <= other.len() && self.components.iter().zip(&other.components).all(|(a, b)| a == b)
    }

    /// Canonical comparison as -1, 0 or +1
    pub fn compare(&self, other: &Name) -> i32 {
        match self.cmp(other) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    /// URI form, the same text as `Display`
    pub fn to_uri(&self) -> String {
        self.to_string()
    }

    /// `NAME` TLV with one child per component
    pub fn to_tlv(&self) -> TlvElement {
        TlvElement::with_children(
            tlv_types::NAME,
            self.components.iter().map(Component::to_tlv).collect(),
        )
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        if element.type_ != tlv_types::NAME {
            return Err(TlvError::WrongType {
                expected: tlv_types::NAME,
                actual: element.type_,
            });
        }
        let components = element
            .children
            .iter()
            .map(Component::from_tlv)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_components(components))
    }

    /// Encode name to TLV format
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        self.to_tlv().encode()
    }

    /// Decode name from TLV format
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        Self::from_tlv(&crate::grammar::NAME.decode(data)?)
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        // Vec ordering is component-wise with a proper prefix first
        self.components
            .cmp(&other.components)
            .then_with(|| self.implicit_digest.cmp(&other.implicit_digest))
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        if let Some(digest) = &self.implicit_digest {
            write!(f, "/{}", DIGEST_PREFIX)?;
            for byte in digest {
                write!(f, "{:02x}", byte)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Name {
    type Err = NameParseError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let trimmed = uri.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::new());
        }

        let mut name = Self::new();
        let segments: Vec<&str> = trimmed.split('/').collect();
        for (i, segment) in segments.iter().enumerate() {
            match segment.strip_prefix(DIGEST_PREFIX) {
                Some(hex) if i + 1 == segments.len() => {
                    name.implicit_digest = Some(parse_digest(hex)?);
                }
                _ => name.components.push(segment.parse()?),
            }
        }

        Ok(name)
    }
}

fn parse_digest(hex: &str) -> Result<[u8; 32], NameParseError> {
    if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(NameParseError::InvalidDigest);
    }
    let mut digest = [0u8; 32];
    for (i, byte) in digest.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16)
            .map_err(|_| NameParseError::InvalidDigest)?;
    }
    Ok(digest)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameParseError {
    #[error("Invalid percent escape in name component")]
    InvalidEscape,
    #[error("Implicit digest must be 64 hex characters")]
    InvalidDigest,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[test]
    fn test_name_creation() {
        let name = name("/hello/world/test");
        assert_eq!(name.len(), 3);
        assert_eq!(name.get(0).unwrap().as_bytes(), b"hello");
        assert_eq!(name.get(2).unwrap().as_bytes(), b"test");
    }

    #[test]
    fn test_trims_slashes() {
        assert_eq!(name("hello/world/"), name("/hello/world"));
        assert_eq!(name("//a//").len(), 1);
    }

    #[test]
    fn test_empty_name() {
        let empty = name("");
        assert!(empty.is_empty());
        assert_eq!(empty.to_uri(), "");
        assert_eq!(name("/"), empty);
    }

    #[test]
    fn test_percent_encoding() {
        let mut n = Name::new();
        n.push(Component::new(vec![b'a', b' ', b'/', 0xFF])).push("b~c");
        assert_eq!(n.to_uri(), "/a%20%2F%FF/b~c");
        assert_eq!(name("/a%20%2F%FF/b~c"), n);
        assert_eq!(name("/a%2f").get(0).unwrap().as_bytes(), b"a/");
    }

    #[test]
    fn test_invalid_escape() {
        assert_eq!("/a%2".parse::<Name>(), Err(NameParseError::InvalidEscape));
        assert_eq!("/a%zz".parse::<Name>(), Err(NameParseError::InvalidEscape));
    }

    #[test]
    fn test_implicit_digest_uri() {
        let digest = [0xAB; 32];
        let n = name("/a/b").with_implicit_digest(digest);
        let uri = n.to_uri();
        assert!(uri.starts_with("/a/b/sha256digest=abab"));
        assert_eq!(name(&uri), n);
        assert_eq!(n.len(), 2);
        assert_eq!(
            "/a/sha256digest=00".parse::<Name>(),
            Err(NameParseError::InvalidDigest)
        );
    }

    #[test]
    fn test_component_order() {
        let short = Component::from("Z");
        let long = Component::from("AA");
        assert!(short < long);
        assert!(Component::from("AA") < Component::from("AB"));
    }

    #[test]
    fn test_name_ordering() {
        assert_eq!(name("/A/B").compare(&name("/A/B")), 0);
        assert_eq!(name("/A/B").compare(&name("/A/C")), -1);
        assert_eq!(name("/A/B").compare(&name("/A/A")), 1);
        assert_eq!(name("/A/B").compare(&name("/A/B/C")), -1);
        assert_eq!(name("/A/B").compare(&name("/A")), 1);
    }

    #[test]
    fn test_ordering_is_antisymmetric() {
        let names = ["", "/A", "/A/B", "/A/C", "/BB", "/B/A", "/A/B/C"];
        for a in names {
            for b in names {
                assert_eq!(name(a).compare(&name(b)), -name(b).compare(&name(a)));
            }
        }
    }

    #[test]
    fn test_name_prefix() {
        let n = name("/hello/world/test");
        let prefix = n.get_prefix(2);
        assert_eq!(prefix.to_uri(), "/hello/world");
        assert!(prefix.is_prefix_of(&n));
        assert!(!n.is_prefix_of(&prefix));
        assert!(Name::new().is_prefix_of(&n));
    }

    #[test]
    fn test_name_encoding() {
        let n = name("/hello/world").with_implicit_digest([1; 32]);
        let encoded = n.encode().unwrap();
        assert_eq!(&encoded[..4], &[7, 14, 8, 5]);

        let decoded = Name::decode(&encoded).unwrap();
        assert_eq!(decoded, name("/hello/world"));
        assert!(decoded.implicit_digest.is_none());
    }
}
