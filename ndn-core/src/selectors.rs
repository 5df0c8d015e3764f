//! Interest selectors and their second-stage matching against Data.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::exclude::Exclude;
use crate::grammar;
use crate::name::{Component, Name};
use crate::packets::{Data, KeyLocator};
use crate::tlv::{tlv_types, TlvElement, TlvError};

/// Which candidate a cache returns when several survive filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChildSelector {
    #[default]
    Leftmost = 0,
    Rightmost = 1,
}

impl TryFrom<u64> for ChildSelector {
    type Error = TlvError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ChildSelector::Leftmost),
            1 => Ok(ChildSelector::Rightmost),
            other => Err(TlvError::Malformed(format!("child selector {}", other))),
        }
    }
}

/// Selectors for Interest packets
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selectors {
    pub min_suffix_components: Option<u64>,
    pub max_suffix_components: Option<u64>,
    pub publisher_public_key_locator: Option<KeyLocator>,
    pub exclude: Option<Exclude>,
    pub child_selector: Option<ChildSelector>,
    pub must_be_fresh: bool,
}

impl Selectors {
    /// Empty selectors; every field unset
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum components after the Interest name, counting the digest
    pub fn with_min_suffix_components(mut self, min: u64) -> Self {
        self.min_suffix_components = Some(min);
        self
    }

    /// Maximum components after the Interest name, counting the digest
    pub fn with_max_suffix_components(mut self, max: u64) -> Self {
        self.max_suffix_components = Some(max);
        self
    }

    /// Only accept Data signed under `locator`
    pub fn with_publisher(mut self, locator: KeyLocator) -> Self {
        self.publisher_public_key_locator = Some(locator);
        self
    }

    /// Reject Data whose next component `exclude` matches
    pub fn with_exclude(mut self, exclude: Exclude) -> Self {
        self.exclude = Some(exclude);
        self
    }

    /// Preference among surviving candidates
    pub fn with_child_selector(mut self, child_selector: ChildSelector) -> Self {
        self.child_selector = Some(child_selector);
        self
    }

    /// Require Data still within its freshness period
    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    /// Effective child selector, leftmost when unset
    pub fn child(&self) -> ChildSelector {
        self.child_selector.unwrap_or_default()
    }

    /// Check whether `data` satisfies an Interest named `interest_name`
    /// carrying these selectors.
    ///
    /// `data_digest` is the implicit digest of `data`; `arrival` is when the
    /// Data entered the store.
    pub fn matches(
        &self,
        interest_name: &Name,
        data: &Data,
        data_digest: &[u8; 32],
        arrival: Instant,
        now: Instant,
    ) -> bool {
        if let Some(digest) = &interest_name.implicit_digest {
            if digest != data_digest {
                return false;
            }
        }

        if !interest_name.is_prefix_of(&data.name) {
            return false;
        }

        // the implicit digest counts as one more component
        let suffix = (data.name.len() - interest_name.len() + 1) as u64;
        if self.min_suffix_components.map_or(false, |min| suffix < min) {
            return false;
        }
        if self.max_suffix_components.map_or(false, |max| suffix > max) {
            return false;
        }

        if self.must_be_fresh {
            match data.freshness_period() {
                Some(period) if !period.is_zero() => {
                    if now.saturating_duration_since(arrival) >= period {
                        return false;
                    }
                }
                _ => return false,
            }
        }

        if let Some(exclude) = &self.exclude {
            if exclude.matches(&next_component(interest_name, &data.name, data_digest)) {
                return false;
            }
        }

        if let Some(locator) = &self.publisher_public_key_locator {
            if data.signature_info.key_locator.as_ref() != Some(locator) {
                return false;
            }
        }

        true
    }

    /// Selectors TLV; unset fields are omitted
    pub fn to_tlv(&self) -> TlvElement {
        let mut children = Vec::new();

        if let Some(min) = self.min_suffix_components {
            children.push(TlvElement::nonneg(tlv_types::MIN_SUFFIX_COMPONENTS, min));
        }
        if let Some(max) = self.max_suffix_components {
            children.push(TlvElement::nonneg(tlv_types::MAX_SUFFIX_COMPONENTS, max));
        }
        if let Some(locator) = &self.publisher_public_key_locator {
            children.push(locator.to_tlv_as(tlv_types::PUBLISHER_PUBLICKEY_LOCATOR));
        }
        if let Some(exclude) = &self.exclude {
            children.push(exclude.to_tlv());
        }
        if let Some(child_selector) = self.child_selector {
            children.push(TlvElement::nonneg(
                tlv_types::CHILD_SELECTOR,
                child_selector as u64,
            ));
        }
        if self.must_be_fresh {
            children.push(TlvElement::new(tlv_types::MUST_BE_FRESH, Vec::new()));
        }

        TlvElement::with_children(tlv_types::SELECTORS, children)
    }

    /// Read a `SELECTORS` TLV
    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        if element.type_ != tlv_types::SELECTORS {
            return Err(TlvError::WrongType {
                expected: tlv_types::SELECTORS,
                actual: element.type_,
            });
        }

        let mut selectors = Self::default();
        for child in &element.children {
            match child.type_ {
                tlv_types::MIN_SUFFIX_COMPONENTS => {
                    selectors.min_suffix_components = Some(child.as_nonneg()?)
                }
                tlv_types::MAX_SUFFIX_COMPONENTS => {
                    selectors.max_suffix_components = Some(child.as_nonneg()?)
                }
                tlv_types::PUBLISHER_PUBLICKEY_LOCATOR => {
                    selectors.publisher_public_key_locator = Some(KeyLocator::from_tlv(child)?)
                }
                tlv_types::EXCLUDE => selectors.exclude = Some(Exclude::from_tlv(child)?),
                tlv_types::CHILD_SELECTOR => {
                    selectors.child_selector = Some(ChildSelector::try_from(child.as_nonneg()?)?)
                }
                tlv_types::MUST_BE_FRESH => selectors.must_be_fresh = true,
                actual => {
                    return Err(TlvError::WrongType {
                        expected: tlv_types::MIN_SUFFIX_COMPONENTS,
                        actual,
                    })
                }
            }
        }

        Ok(selectors)
    }

    /// Encode to wire format
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        self.to_tlv().encode()
    }

    /// Decode from wire format, checking the Selectors grammar first
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        Self::from_tlv(&grammar::SELECTORS.decode(data)?)
    }
}

/// The component of `data_name` that follows an Interest named
/// `interest_name`. The implicit digest counts as the last component, so a
/// Data named exactly like the Interest yields its digest.
pub fn next_component(interest_name: &Name, data_name: &Name, data_digest: &[u8; 32]) -> Component {
    match data_name.get(interest_name.len()) {
        Some(next) => next.clone(),
        None => Component::new(data_digest.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn data(uri: &str) -> Data {
        Data::new(name(uri), b"payload".to_vec())
    }

    fn check(selectors: &Selectors, interest: &str, data: &Data) -> bool {
        let now = Instant::now();
        selectors.matches(&name(interest), data, &[0; 32], now, now)
    }

    #[test]
    fn test_prefix_required() {
        let selectors = Selectors::new();
        assert!(check(&selectors, "/a", &data("/a/b")));
        assert!(check(&selectors, "/a/b", &data("/a/b")));
        assert!(!check(&selectors, "/a/c", &data("/a/b")));
        assert!(!check(&selectors, "/a/b/c", &data("/a/b")));
    }

    #[test]
    fn test_suffix_bounds() {
        // /a against /a/b/c has three suffix components counting the digest
        let d = data("/a/b/c");
        assert!(check(&Selectors::new().with_min_suffix_components(3), "/a", &d));
        assert!(!check(&Selectors::new().with_min_suffix_components(4), "/a", &d));
        assert!(check(&Selectors::new().with_max_suffix_components(3), "/a", &d));
        assert!(!check(&Selectors::new().with_max_suffix_components(2), "/a", &d));
        assert!(check(&Selectors::new().with_max_suffix_components(1), "/a/b/c", &d));
    }

    #[test]
    fn test_implicit_digest() {
        let d = data("/a/b");
        let digest = d.implicit_digest().unwrap();
        let now = Instant::now();
        let selectors = Selectors::new();

        let exact = name("/a/b").with_implicit_digest(digest);
        assert!(selectors.matches(&exact, &d, &digest, now, now));

        let other = name("/a/b").with_implicit_digest([9; 32]);
        assert!(!selectors.matches(&other, &d, &digest, now, now));
    }

    #[test]
    fn test_must_be_fresh() {
        let selectors = Selectors::new().with_must_be_fresh(true);
        let arrival = Instant::now();
        let interest = name("/a");

        let fresh = data("/a/b").with_freshness_period(Duration::from_millis(1000));
        let digest = [0; 32];
        assert!(selectors.matches(&interest, &fresh, &digest, arrival, arrival));
        assert!(!selectors.matches(
            &interest,
            &fresh,
            &digest,
            arrival,
            arrival + Duration::from_millis(1000)
        ));

        let zero = data("/a/b").with_freshness_period(Duration::ZERO);
        assert!(!selectors.matches(&interest, &zero, &digest, arrival, arrival));
        assert!(!selectors.matches(&interest, &data("/a/b"), &digest, arrival, arrival));
    }

    #[test]
    fn test_exclude_checks_next_component() {
        let exclude = Exclude::from_components(&[Some(Component::from("b"))]).unwrap();
        let selectors = Selectors::new().with_exclude(exclude);

        assert!(!check(&selectors, "/a", &data("/a/b/c")));
        assert!(check(&selectors, "/a", &data("/a/c/b")));
        assert!(check(&selectors, "/a", &data("/a")));
    }

    #[test]
    fn test_exclude_checks_digest_of_exact_name() {
        let d = data("/a");
        let digest = d.implicit_digest().unwrap();
        let now = Instant::now();

        let exact = Exclude::from_components(&[Some(Component::new(digest.to_vec()))]).unwrap();
        let selectors = Selectors::new().with_exclude(exact);
        assert!(!selectors.matches(&name("/a"), &d, &digest, now, now));
        assert!(selectors.matches(&name("/a"), &data("/a/b"), &digest, now, now));

        // a right-open range from "z" covers every 32-byte digest
        let range = Exclude::from_components(&[Some(Component::from("z")), None]).unwrap();
        let selectors = Selectors::new().with_exclude(range);
        assert!(!selectors.matches(&name("/a"), &d, &digest, now, now));
        assert!(selectors.matches(&name("/a"), &data("/a/b"), &digest, now, now));
    }

    #[test]
    fn test_next_component() {
        let digest = [7; 32];
        assert_eq!(next_component(&name("/a"), &name("/a/b/c"), &digest), Component::from("b"));
        assert_eq!(next_component(&name("/a"), &name("/a"), &digest), Component::new(vec![7; 32]));
        // digests sort after any shorter component
        assert!(next_component(&name("/a"), &name("/a"), &digest) > Component::from("zzz"));
    }

    #[test]
    fn test_publisher_locator() {
        let locator = KeyLocator::Name(name("/keys/alice"));
        let selectors = Selectors::new().with_publisher(locator.clone());

        let mut d = data("/a/b");
        assert!(!check(&selectors, "/a", &d));
        d.signature_info.key_locator = Some(locator);
        assert!(check(&selectors, "/a", &d));
    }

    #[test]
    fn test_tlv_form() {
        let selectors = Selectors::new()
            .with_min_suffix_components(1)
            .with_max_suffix_components(300)
            .with_publisher(KeyLocator::KeyDigest([3; 32]))
            .with_exclude(Exclude::from_components(&[None, Some(Component::from("x"))]).unwrap())
            .with_child_selector(ChildSelector::Rightmost)
            .with_must_be_fresh(true);

        let wire = selectors.encode().unwrap();
        assert_eq!(wire[0], tlv_types::SELECTORS as u8);
        assert_eq!(Selectors::decode(&wire).unwrap(), selectors);

        let empty = Selectors::new().encode().unwrap();
        assert_eq!(empty, vec![9, 0]);
        assert_eq!(Selectors::decode(&empty).unwrap(), Selectors::new());
    }

    #[test]
    fn test_bad_child_selector() {
        let wire = TlvElement::with_children(
            tlv_types::SELECTORS,
            vec![TlvElement::nonneg(tlv_types::CHILD_SELECTOR, 2)],
        )
        .encode()
        .unwrap();
        assert!(matches!(Selectors::decode(&wire), Err(TlvError::Malformed(_))));
    }
}
