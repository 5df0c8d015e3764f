//! Exclude filters carried in Interest selectors.

use serde::{Deserialize, Serialize};

use crate::grammar;
use crate::name::Component;
use crate::tlv::{tlv_types, TlvElement, TlvError};

/// One step of an exclude range: an optional component, optionally followed
/// by an `Any` marker covering everything up to the next entry's component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeEntry {
    pub component: Option<Component>,
    pub any: bool,
}

impl ExcludeEntry {
    /// Exclude exactly `component`
    pub fn component(component: impl Into<Component>) -> Self {
        Self {
            component: Some(component.into()),
            any: false,
        }
    }

    /// Also exclude everything between this component and the next entry
    pub fn with_any(mut self) -> Self {
        self.any = true;
        self
    }
}

/// An ordered list of excluded components and ranges
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Exclude {
    entries: Vec<ExcludeEntry>,
}

impl Exclude {
    /// Build from entries in ascending component order. Only the first entry
    /// may omit its component (a left-open range).
    pub fn new(entries: Vec<ExcludeEntry>) -> Result<Self, TlvError> {
        if entries.iter().skip(1).any(|e| e.component.is_none()) {
            return Err(TlvError::Malformed(
                "only the first exclude entry may omit its component".to_string(),
            ));
        }

        for pair in entries.windows(2) {
            if let (Some(a), Some(b)) = (&pair[0].component, &pair[1].component) {
                if a >= b {
                    return Err(TlvError::Malformed(format!(
                        "exclude components out of order: {} then {}",
                        a, b
                    )));
                }
            }
        }

        Ok(Self { entries })
    }

    /// Build from a flat list where `None` stands for an `Any` marker, so
    /// `[None, Some("AB")]` excludes everything up to and including `AB`.
    pub fn from_components(items: &[Option<Component>]) -> Result<Self, TlvError> {
        let mut entries: Vec<ExcludeEntry> = Vec::new();
        for item in items {
            match item {
                Some(component) => entries.push(ExcludeEntry::component(component.clone())),
                None => match entries.last_mut() {
                    Some(last) => last.any = true,
                    None => entries.push(ExcludeEntry {
                        component: None,
                        any: true,
                    }),
                },
            }
        }
        Self::new(entries)
    }

    /// Entries in ascending component order
    pub fn entries(&self) -> &[ExcludeEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if `component` is excluded
    pub fn matches(&self, component: &Component) -> bool {
        for entry in self.entries.iter().rev() {
            match &entry.component {
                Some(c) if c == component => return true,
                Some(c) if c < component => return entry.any,
                Some(_) => continue,
                None => return entry.any,
            }
        }
        false
    }

    /// `EXCLUDE` TLV: each entry's component, then `ANY` if it opens a range
    pub fn to_tlv(&self) -> TlvElement {
        let mut children = Vec::new();
        for entry in &self.entries {
            if let Some(component) = &entry.component {
                children.push(component.to_tlv());
            }
            if entry.any {
                children.push(TlvElement::new(tlv_types::ANY, Vec::new()));
            }
        }
        TlvElement::with_children(tlv_types::EXCLUDE, children)
    }

    /// Read an `EXCLUDE` TLV, enforcing ascending order
    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        if element.type_ != tlv_types::EXCLUDE {
            return Err(TlvError::WrongType {
                expected: tlv_types::EXCLUDE,
                actual: element.type_,
            });
        }

        let mut entries: Vec<ExcludeEntry> = Vec::new();
        for child in &element.children {
            match child.type_ {
                tlv_types::NAME_COMPONENT => {
                    entries.push(ExcludeEntry::component(Component::from_tlv(child)?))
                }
                tlv_types::ANY => match entries.last_mut() {
                    Some(last) => last.any = true,
                    None => entries.push(ExcludeEntry {
                        component: None,
                        any: true,
                    }),
                },
                actual => {
                    return Err(TlvError::WrongType {
                        expected: tlv_types::NAME_COMPONENT,
                        actual,
                    })
                }
            }
        }

        Self::new(entries)
    }

    /// Encode to wire format
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        self.to_tlv().encode()
    }

    /// Decode from wire format
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        Self::from_tlv(&grammar::EXCLUDE.decode(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> Component {
        Component::from(s)
    }

    #[test]
    fn test_left_open_range() {
        let exclude = Exclude::from_components(&[None, Some(c("AB"))]).unwrap();
        assert!(exclude.matches(&c("AB")));
        assert!(exclude.matches(&c("AA")));
        assert!(exclude.matches(&c("Z")));
        assert!(!exclude.matches(&c("ABC")));
        assert!(!exclude.matches(&c("AC")));
    }

    #[test]
    fn test_single_components() {
        let exclude = Exclude::from_components(&[Some(c("B")), Some(c("D"))]).unwrap();
        assert!(exclude.matches(&c("B")));
        assert!(exclude.matches(&c("D")));
        assert!(!exclude.matches(&c("A")));
        assert!(!exclude.matches(&c("C")));
        assert!(!exclude.matches(&c("E")));
    }

    #[test]
    fn test_closed_and_right_open_ranges() {
        // (B, D] and [F, ...)
        let exclude =
            Exclude::from_components(&[Some(c("B")), None, Some(c("D")), Some(c("F")), None])
                .unwrap();
        assert!(exclude.matches(&c("C")));
        assert!(exclude.matches(&c("D")));
        assert!(!exclude.matches(&c("E")));
        assert!(exclude.matches(&c("F")));
        assert!(exclude.matches(&c("ZZZ")));
        assert!(!exclude.matches(&c("A")));
    }

    #[test]
    fn test_empty_excludes_nothing() {
        let exclude = Exclude::default();
        assert!(exclude.is_empty());
        assert!(!exclude.matches(&c("A")));
    }

    #[test]
    fn test_order_is_enforced() {
        assert!(matches!(
            Exclude::from_components(&[Some(c("B")), Some(c("A"))]),
            Err(TlvError::Malformed(_))
        ));
        assert!(matches!(
            Exclude::from_components(&[Some(c("A")), Some(c("A"))]),
            Err(TlvError::Malformed(_))
        ));
        // canonical order puts the shorter component first
        assert!(Exclude::from_components(&[Some(c("Z")), Some(c("AA"))]).is_ok());
    }

    #[test]
    fn test_tlv_form() {
        let exclude = Exclude::from_components(&[None, Some(c("AB"))]).unwrap();
        let wire = exclude.encode().unwrap();
        assert_eq!(wire, vec![16, 6, 19, 0, 8, 2, b'A', b'B']);
        assert_eq!(Exclude::decode(&wire).unwrap(), exclude);
    }

    #[test]
    fn test_decode_rejects_unordered() {
        let wire = TlvElement::with_children(
            tlv_types::EXCLUDE,
            vec![c("B").to_tlv(), c("A").to_tlv()],
        )
        .encode()
        .unwrap();
        assert!(matches!(Exclude::decode(&wire), Err(TlvError::Malformed(_))));
    }
}
