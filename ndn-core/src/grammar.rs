//! Declarative TLV grammars and the matcher that validates wire bytes
//! against them.
//!
//! A [`Grammar`] node names a TLV type (or a synthetic `And`/`Or` group),
//! how many times it may occur, and the grammar of its nested value. The
//! matcher turns a byte buffer into a [`TlvElement`] tree: nodes with child
//! grammars are decoded structurally, everything else keeps its opaque value.
//! Groups never appear in the output tree.

use crate::tlv::{tlv_types, TlvElement, TlvError};
use crate::varnum;

/// How many times a grammar node may occur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Cardinality {
    fn bounds(self) -> (usize, Option<usize>) {
        match self {
            Cardinality::One => (1, Some(1)),
            Cardinality::ZeroOrOne => (0, Some(1)),
            Cardinality::ZeroOrMore => (0, None),
            Cardinality::OneOrMore => (1, None),
        }
    }
}

/// What a grammar node matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A wire TLV of the given type
    Tlv(u64),
    /// All children, in order
    And,
    /// The first child that matches
    Or,
}

/// A declarative schema node. Trees of these are built as `const` items and
/// matched against wire bytes by [`Grammar::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grammar {
    pub kind: Kind,
    pub cardinality: Cardinality,
    pub children: &'static [Grammar],
}

type Matched = (Vec<TlvElement>, usize);

impl Grammar {
    /// A TLV with an opaque value
    pub const fn leaf(type_: u64, cardinality: Cardinality) -> Self {
        Self {
            kind: Kind::Tlv(type_),
            cardinality,
            children: &[],
        }
    }

    /// A TLV whose value is itself described by `children`
    pub const fn node(type_: u64, cardinality: Cardinality, children: &'static [Grammar]) -> Self {
        Self {
            kind: Kind::Tlv(type_),
            cardinality,
            children,
        }
    }

    /// A parse-time group whose children must all match in order
    pub const fn and(cardinality: Cardinality, children: &'static [Grammar]) -> Self {
        Self {
            kind: Kind::And,
            cardinality,
            children,
        }
    }

    /// A parse-time choice; the first matching child wins
    pub const fn or(cardinality: Cardinality, children: &'static [Grammar]) -> Self {
        Self {
            kind: Kind::Or,
            cardinality,
            children,
        }
    }

    /// The same node with a different cardinality
    pub const fn with(self, cardinality: Cardinality) -> Self {
        Self {
            kind: self.kind,
            cardinality,
            children: self.children,
        }
    }

    /// Decode `data` as exactly one occurrence of this grammar.
    pub fn decode(&self, data: &[u8]) -> Result<TlvElement, TlvError> {
        let (element, consumed) = self.decode_prefix(data)?;
        if consumed != data.len() {
            return Err(TlvError::BufferNotEmpty(data.len() - consumed));
        }
        Ok(element)
    }

    /// Decode one occurrence of this grammar from the start of `data`,
    /// returning the tree and the number of bytes consumed.
    pub fn decode_prefix(&self, data: &[u8]) -> Result<(TlvElement, usize), TlvError> {
        let (mut elements, consumed) = self.match_one(data)?;
        match (elements.pop(), elements.is_empty()) {
            (Some(element), true) => Ok((element, consumed)),
            _ => Err(TlvError::WrongCount {
                tlv_type: self.first_type(),
            }),
        }
    }

    /// The first wire type this grammar can start with
    fn first_type(&self) -> u64 {
        match self.kind {
            Kind::Tlv(type_) => type_,
            Kind::And | Kind::Or => self.children.first().map_or(0, Grammar::first_type),
        }
    }

    /// Match this node once, ignoring its cardinality
    fn match_one(&self, data: &[u8]) -> Result<Matched, TlvError> {
        match self.kind {
            Kind::Tlv(expected) => {
                let (actual, _) = varnum::decode(data)?;
                if actual != expected {
                    return Err(TlvError::WrongType { expected, actual });
                }

                let (mut element, consumed) = TlvElement::decode(data)?;
                if !self.children.is_empty() {
                    let value = std::mem::take(&mut element.value);
                    let (children, used) = match_sequence(self.children, &value)?;
                    if used != value.len() {
                        return Err(TlvError::BufferNotEmpty(value.len() - used));
                    }
                    element.children = children;
                }
                Ok((vec![element], consumed))
            }
            Kind::And => match_sequence(self.children, data),
            Kind::Or => {
                let mut last_error = None;
                for child in self.children {
                    match child.match_quantified(data) {
                        Ok((elements, used)) if used > 0 => return Ok((elements, used)),
                        Ok(_) => {}
                        Err(err) => last_error = Some(err),
                    }
                }

                match varnum::decode(data) {
                    Ok((actual, _)) => Err(TlvError::WrongType {
                        expected: self.first_type(),
                        actual,
                    }),
                    Err(_) => Err(last_error.unwrap_or(TlvError::ShortBuffer)),
                }
            }
        }
    }

    /// Match this node as many times as its cardinality allows
    fn match_quantified(&self, data: &[u8]) -> Result<Matched, TlvError> {
        let (min, max) = self.cardinality.bounds();
        let mut elements = Vec::new();
        let mut offset = 0;
        let mut count = 0;

        while max.map_or(true, |max| count < max) {
            if offset == data.len() && count >= min {
                break;
            }

            match self.match_one(&data[offset..]) {
                Ok((matched, used)) => {
                    elements.extend(matched);
                    offset += used;
                    count += 1;
                    if used == 0 {
                        break;
                    }
                }
                Err(_) if count >= min => break,
                Err(TlvError::ShortBuffer) if offset == data.len() => {
                    return Err(TlvError::WrongCount {
                        tlv_type: self.first_type(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        Ok((elements, offset))
    }
}

/// Match each grammar in order against consecutive parts of `data`
fn match_sequence(grammars: &[Grammar], data: &[u8]) -> Result<Matched, TlvError> {
    let mut elements = Vec::new();
    let mut offset = 0;

    for grammar in grammars {
        let (matched, used) = grammar.match_quantified(&data[offset..])?;
        elements.extend(matched);
        offset += used;
    }

    Ok((elements, offset))
}

use Cardinality::{One, OneOrMore, ZeroOrMore, ZeroOrOne};

const NAME_COMPONENT: Grammar = Grammar::leaf(tlv_types::NAME_COMPONENT, One);
const NAME_COMPONENTS: Grammar = NAME_COMPONENT.with(ZeroOrMore);
const OPTIONAL_NAME_COMPONENT: Grammar = NAME_COMPONENT.with(ZeroOrOne);

pub const NAME: Grammar = Grammar::node(tlv_types::NAME, One, &[NAME_COMPONENTS]);
const OPTIONAL_NAME: Grammar = NAME.with(ZeroOrOne);

const KEY_LOCATOR_DIGEST: Grammar = Grammar::leaf(tlv_types::KEY_LOCATOR_DIGEST, One);
const LOCATOR_CHOICE: Grammar = Grammar::or(One, &[NAME, KEY_LOCATOR_DIGEST]);

pub const KEY_LOCATOR: Grammar = Grammar::node(tlv_types::KEY_LOCATOR, One, &[LOCATOR_CHOICE]);
const OPTIONAL_KEY_LOCATOR: Grammar = KEY_LOCATOR.with(ZeroOrOne);

// Exclude ::= (NameComponent? Any?)+
const ANY: Grammar = Grammar::leaf(tlv_types::ANY, ZeroOrOne);
const EXCLUDE_ENTRY: Grammar = Grammar::and(OneOrMore, &[OPTIONAL_NAME_COMPONENT, ANY]);

pub const EXCLUDE: Grammar = Grammar::node(tlv_types::EXCLUDE, ZeroOrOne, &[EXCLUDE_ENTRY]);

const MIN_SUFFIX_COMPONENTS: Grammar = Grammar::leaf(tlv_types::MIN_SUFFIX_COMPONENTS, ZeroOrOne);
const MAX_SUFFIX_COMPONENTS: Grammar = Grammar::leaf(tlv_types::MAX_SUFFIX_COMPONENTS, ZeroOrOne);
const PUBLISHER_PUBLICKEY_LOCATOR: Grammar =
    Grammar::node(tlv_types::PUBLISHER_PUBLICKEY_LOCATOR, ZeroOrOne, &[LOCATOR_CHOICE]);
const CHILD_SELECTOR: Grammar = Grammar::leaf(tlv_types::CHILD_SELECTOR, ZeroOrOne);
const MUST_BE_FRESH: Grammar = Grammar::leaf(tlv_types::MUST_BE_FRESH, ZeroOrOne);

pub const SELECTORS: Grammar = Grammar::node(
    tlv_types::SELECTORS,
    ZeroOrOne,
    &[
        MIN_SUFFIX_COMPONENTS,
        MAX_SUFFIX_COMPONENTS,
        PUBLISHER_PUBLICKEY_LOCATOR,
        EXCLUDE,
        CHILD_SELECTOR,
        MUST_BE_FRESH,
    ],
);

const NONCE: Grammar = Grammar::leaf(tlv_types::NONCE, One);
const SCOPE: Grammar = Grammar::leaf(tlv_types::SCOPE, ZeroOrOne);
const INTEREST_LIFETIME: Grammar = Grammar::leaf(tlv_types::INTEREST_LIFETIME, ZeroOrOne);

pub const INTEREST: Grammar = Grammar::node(
    tlv_types::INTEREST,
    One,
    &[NAME, SELECTORS, NONCE, SCOPE, INTEREST_LIFETIME],
);

const CONTENT_TYPE: Grammar = Grammar::leaf(tlv_types::CONTENT_TYPE, ZeroOrOne);
const FRESHNESS_PERIOD: Grammar = Grammar::leaf(tlv_types::FRESHNESS_PERIOD, ZeroOrOne);
const FINAL_BLOCK_ID: Grammar =
    Grammar::node(tlv_types::FINAL_BLOCK_ID, ZeroOrOne, &[NAME_COMPONENT]);

pub const META_INFO: Grammar = Grammar::node(
    tlv_types::META_INFO,
    ZeroOrOne,
    &[CONTENT_TYPE, FRESHNESS_PERIOD, FINAL_BLOCK_ID],
);

const SIGNATURE_TYPE: Grammar = Grammar::leaf(tlv_types::SIGNATURE_TYPE, One);

pub const SIGNATURE_INFO: Grammar = Grammar::node(
    tlv_types::SIGNATURE_INFO,
    One,
    &[SIGNATURE_TYPE, OPTIONAL_KEY_LOCATOR],
);

const CONTENT: Grammar = Grammar::leaf(tlv_types::CONTENT, ZeroOrOne);
const SIGNATURE_VALUE: Grammar = Grammar::leaf(tlv_types::SIGNATURE_VALUE, One);

pub const DATA: Grammar = Grammar::node(
    tlv_types::DATA,
    One,
    &[NAME, META_INFO, CONTENT, SIGNATURE_INFO, SIGNATURE_VALUE],
);

const FACE_ID: Grammar = Grammar::leaf(tlv_types::FACE_ID, ZeroOrOne);
const URI: Grammar = Grammar::leaf(tlv_types::URI, ZeroOrOne);
const ORIGIN: Grammar = Grammar::leaf(tlv_types::ORIGIN, ZeroOrOne);
const COST: Grammar = Grammar::leaf(tlv_types::COST, ZeroOrOne);
const FLAGS: Grammar = Grammar::leaf(tlv_types::FLAGS, ZeroOrOne);
const STRATEGY: Grammar = Grammar::node(tlv_types::STRATEGY, ZeroOrOne, &[NAME]);
const EXPIRATION_PERIOD: Grammar = Grammar::leaf(tlv_types::EXPIRATION_PERIOD, ZeroOrOne);

pub const CONTROL_PARAMETERS: Grammar = Grammar::node(
    tlv_types::CONTROL_PARAMETERS,
    One,
    &[
        OPTIONAL_NAME,
        FACE_ID,
        URI,
        ORIGIN,
        COST,
        FLAGS,
        STRATEGY,
        EXPIRATION_PERIOD,
    ],
);
const OPTIONAL_CONTROL_PARAMETERS: Grammar = CONTROL_PARAMETERS.with(ZeroOrOne);

const STATUS_CODE: Grammar = Grammar::leaf(tlv_types::STATUS_CODE, One);
const STATUS_TEXT: Grammar = Grammar::leaf(tlv_types::STATUS_TEXT, One);

pub const CONTROL_RESPONSE: Grammar = Grammar::node(
    tlv_types::CONTROL_RESPONSE,
    One,
    &[STATUS_CODE, STATUS_TEXT, OPTIONAL_CONTROL_PARAMETERS],
);
