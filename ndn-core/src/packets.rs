use std::io::Read;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::grammar;
use crate::name::{Component, Name};
use crate::selectors::{ChildSelector, Selectors};
use crate::signature::{self, Key, Signable, SignatureError, SignatureType};
use crate::tlv::{tlv_types, TlvElement, TlvError};
use crate::varnum;

/// Key locator for signatures and publisher selectors
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyLocator {
    Name(Name),
    KeyDigest([u8; 32]),
}

impl KeyLocator {
    pub fn to_tlv(&self) -> TlvElement {
        self.to_tlv_as(tlv_types::KEY_LOCATOR)
    }

    /// Encode under an outer type other than `KeyLocator`, as the publisher
    /// selector does
    pub fn to_tlv_as(&self, type_: u64) -> TlvElement {
        let inner = match self {
            KeyLocator::Name(name) => name.to_tlv(),
            KeyLocator::KeyDigest(digest) => {
                TlvElement::new(tlv_types::KEY_LOCATOR_DIGEST, digest.to_vec())
            }
        };
        TlvElement::with_children(type_, vec![inner])
    }

    /// Decode from a `KeyLocator`-shaped element of any outer type
    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        let inner = match element.children.as_slice() {
            [inner] => inner,
            _ => {
                return Err(TlvError::WrongCount {
                    tlv_type: element.type_,
                })
            }
        };

        match inner.type_ {
            tlv_types::NAME => Ok(KeyLocator::Name(Name::from_tlv(inner)?)),
            tlv_types::KEY_LOCATOR_DIGEST => {
                let digest = <[u8; 32]>::try_from(inner.value.as_slice()).map_err(|_| {
                    TlvError::Malformed(format!("key digest of {} bytes", inner.value.len()))
                })?;
                Ok(KeyLocator::KeyDigest(digest))
            }
            actual => Err(TlvError::WrongType {
                expected: tlv_types::NAME,
                actual,
            }),
        }
    }
}

/// Interest packet structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    pub selectors: Option<Selectors>,
    pub nonce: [u8; 4],
    pub scope: Option<u64>,
    pub interest_lifetime: Option<Duration>,
}

impl Interest {
    /// Create a new Interest with the given name and a random nonce
    pub fn new(name: Name) -> Self {
        Self {
            name,
            selectors: None,
            nonce: rand::random(),
            scope: None,
            interest_lifetime: None,
        }
    }

    pub fn with_selectors(mut self, selectors: Selectors) -> Self {
        self.selectors = Some(selectors);
        self
    }

    pub fn with_nonce(mut self, nonce: [u8; 4]) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_scope(mut self, scope: u64) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.interest_lifetime = Some(lifetime);
        self
    }

    /// Set the must_be_fresh flag
    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.selectors.get_or_insert_with(Default::default).must_be_fresh = must_be_fresh;
        self
    }

    pub fn with_child_selector(mut self, child_selector: ChildSelector) -> Self {
        self.selectors.get_or_insert_with(Default::default).child_selector = Some(child_selector);
        self
    }

    /// Draw a fresh random nonce, e.g. before retransmitting
    pub fn refresh_nonce(&mut self) {
        self.nonce = rand::random();
    }

    pub fn child_selector(&self) -> ChildSelector {
        self.selectors.as_ref().map(Selectors::child).unwrap_or_default()
    }

    /// Check if this Interest can be satisfied by `data`
    pub fn matches_data(&self, data: &Data, digest: &[u8; 32], arrival: Instant, now: Instant) -> bool {
        match &self.selectors {
            Some(selectors) => selectors.matches(&self.name, data, digest, arrival, now),
            None => Selectors::default().matches(&self.name, data, digest, arrival, now),
        }
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut children = vec![self.name.to_tlv()];
        if let Some(selectors) = &self.selectors {
            children.push(selectors.to_tlv());
        }
        children.push(TlvElement::new(tlv_types::NONCE, self.nonce.to_vec()));
        if let Some(scope) = self.scope {
            children.push(TlvElement::nonneg(tlv_types::SCOPE, scope));
        }
        if let Some(lifetime) = self.interest_lifetime {
            children.push(TlvElement::nonneg(
                tlv_types::INTEREST_LIFETIME,
                lifetime.as_millis() as u64,
            ));
        }
        TlvElement::with_children(tlv_types::INTEREST, children)
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        let mut interest = Interest::new(Name::new());
        let mut nonce = None;

        for child in &element.children {
            match child.type_ {
                tlv_types::NAME => interest.name = Name::from_tlv(child)?,
                tlv_types::SELECTORS => interest.selectors = Some(Selectors::from_tlv(child)?),
                tlv_types::NONCE => {
                    nonce = Some(<[u8; 4]>::try_from(child.value.as_slice()).map_err(|_| {
                        TlvError::Malformed(format!("nonce of {} bytes", child.value.len()))
                    })?)
                }
                tlv_types::SCOPE => interest.scope = Some(child.as_nonneg()?),
                tlv_types::INTEREST_LIFETIME => {
                    interest.interest_lifetime = Some(Duration::from_millis(child.as_nonneg()?))
                }
                actual => {
                    return Err(TlvError::WrongType {
                        expected: tlv_types::NAME,
                        actual,
                    })
                }
            }
        }

        interest.nonce = nonce.ok_or(TlvError::WrongCount {
            tlv_type: tlv_types::NONCE,
        })?;
        Ok(interest)
    }

    /// Encode Interest packet to TLV wire format
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        self.to_tlv().encode()
    }

    /// Decode Interest packet from TLV wire format
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        Self::from_tlv(&grammar::INTEREST.decode(data)?)
    }
}

/// Content type for Data packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentType {
    #[default]
    Blob,
    Link,
    Key,
    Nack,
    Other(u64),
}

impl ContentType {
    pub fn code(self) -> u64 {
        match self {
            ContentType::Blob => 0,
            ContentType::Link => 1,
            ContentType::Key => 2,
            ContentType::Nack => 3,
            ContentType::Other(code) => code,
        }
    }
}

impl From<u64> for ContentType {
    fn from(code: u64) -> Self {
        match code {
            0 => ContentType::Blob,
            1 => ContentType::Link,
            2 => ContentType::Key,
            3 => ContentType::Nack,
            other => ContentType::Other(other),
        }
    }
}

/// MetaInfo for Data packets
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetaInfo {
    pub content_type: Option<ContentType>,
    pub freshness_period: Option<Duration>,
    pub final_block_id: Option<Component>,
}

impl MetaInfo {
    pub fn to_tlv(&self) -> TlvElement {
        let mut children = Vec::new();
        if let Some(content_type) = self.content_type {
            children.push(TlvElement::nonneg(tlv_types::CONTENT_TYPE, content_type.code()));
        }
        if let Some(period) = self.freshness_period {
            children.push(TlvElement::nonneg(
                tlv_types::FRESHNESS_PERIOD,
                period.as_millis() as u64,
            ));
        }
        if let Some(final_block_id) = &self.final_block_id {
            children.push(TlvElement::with_children(
                tlv_types::FINAL_BLOCK_ID,
                vec![final_block_id.to_tlv()],
            ));
        }
        TlvElement::with_children(tlv_types::META_INFO, children)
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        let mut meta_info = Self::default();
        for child in &element.children {
            match child.type_ {
                tlv_types::CONTENT_TYPE => {
                    meta_info.content_type = Some(ContentType::from(child.as_nonneg()?))
                }
                tlv_types::FRESHNESS_PERIOD => {
                    meta_info.freshness_period = Some(Duration::from_millis(child.as_nonneg()?))
                }
                tlv_types::FINAL_BLOCK_ID => {
                    let component = child.child(tlv_types::NAME_COMPONENT).ok_or(
                        TlvError::WrongCount {
                            tlv_type: tlv_types::NAME_COMPONENT,
                        },
                    )?;
                    meta_info.final_block_id = Some(Component::from_tlv(component)?)
                }
                actual => {
                    return Err(TlvError::WrongType {
                        expected: tlv_types::CONTENT_TYPE,
                        actual,
                    })
                }
            }
        }
        Ok(meta_info)
    }
}

/// Signature information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature_type: SignatureType,
    pub key_locator: Option<KeyLocator>,
}

impl SignatureInfo {
    pub fn new(signature_type: SignatureType) -> Self {
        Self {
            signature_type,
            key_locator: None,
        }
    }

    pub fn with_key_locator(mut self, key_locator: KeyLocator) -> Self {
        self.key_locator = Some(key_locator);
        self
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut children = vec![TlvElement::nonneg(
            tlv_types::SIGNATURE_TYPE,
            self.signature_type as u64,
        )];
        if let Some(locator) = &self.key_locator {
            children.push(locator.to_tlv());
        }
        TlvElement::with_children(tlv_types::SIGNATURE_INFO, children)
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        let signature_type = element
            .child(tlv_types::SIGNATURE_TYPE)
            .ok_or(TlvError::WrongCount {
                tlv_type: tlv_types::SIGNATURE_TYPE,
            })?
            .as_nonneg()?;
        let signature_type = SignatureType::try_from(signature_type)
            .map_err(|_| TlvError::Malformed(format!("signature type {}", signature_type)))?;

        let key_locator = element
            .child(tlv_types::KEY_LOCATOR)
            .map(KeyLocator::from_tlv)
            .transpose()?;

        Ok(Self {
            signature_type,
            key_locator,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        self.to_tlv().encode()
    }

    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        Self::from_tlv(&grammar::SIGNATURE_INFO.decode(data)?)
    }
}

impl Default for SignatureInfo {
    fn default() -> Self {
        Self::new(SignatureType::DigestSha256)
    }
}

/// Data packet structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    pub name: Name,
    pub meta_info: Option<MetaInfo>,
    pub content: Vec<u8>,
    pub signature_info: SignatureInfo,
    pub signature_value: Vec<u8>,
}

impl Data {
    /// Create an unsigned Data packet with the given name and content
    pub fn new(name: Name, content: Vec<u8>) -> Self {
        Self {
            name,
            meta_info: None,
            content,
            signature_info: SignatureInfo::default(),
            signature_value: Vec::new(),
        }
    }

    pub fn with_meta_info(mut self, meta_info: MetaInfo) -> Self {
        self.meta_info = Some(meta_info);
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.meta_info.get_or_insert_with(Default::default).content_type = Some(content_type);
        self
    }

    pub fn with_freshness_period(mut self, freshness_period: Duration) -> Self {
        self.meta_info.get_or_insert_with(Default::default).freshness_period = Some(freshness_period);
        self
    }

    pub fn content_type(&self) -> ContentType {
        self.meta_info
            .as_ref()
            .and_then(|meta| meta.content_type)
            .unwrap_or_default()
    }

    pub fn freshness_period(&self) -> Option<Duration> {
        self.meta_info.as_ref().and_then(|meta| meta.freshness_period)
    }

    /// Check whether the packet is still fresh `now`, given when it arrived
    pub fn is_fresh(&self, arrival: Instant, now: Instant) -> bool {
        match self.freshness_period() {
            Some(period) if !period.is_zero() => now.saturating_duration_since(arrival) < period,
            _ => false,
        }
    }

    /// SHA-256 of the full wire encoding
    pub fn implicit_digest(&self) -> Result<[u8; 32], TlvError> {
        Ok(Sha256::digest(self.encode()?).into())
    }

    /// The name with the implicit digest attached
    pub fn full_name(&self) -> Result<Name, TlvError> {
        Ok(self.name.clone().with_implicit_digest(self.implicit_digest()?))
    }

    /// Sign with `key`, recording its type and locator in the SignatureInfo
    pub fn sign(&mut self, key: &Key) -> Result<(), SignatureError> {
        self.signature_info = SignatureInfo::new(key.signature_type())
            .with_key_locator(KeyLocator::Name(key.locator().clone()));
        self.signature_value = key.sign(&*self)?;
        Ok(())
    }

    /// Seal with a plain SHA-256 digest instead of a keyed signature
    pub fn sign_digest(&mut self) -> Result<(), SignatureError> {
        self.signature_info = SignatureInfo::new(SignatureType::DigestSha256);
        self.signature_value = signature::digest_sha256(&*self)?;
        Ok(())
    }

    pub fn verify(&self, key: &Key) -> Result<(), SignatureError> {
        if self.signature_info.signature_type != key.signature_type() {
            return Err(SignatureError::InvalidSignature);
        }
        key.verify(self, &self.signature_value)
    }

    pub fn verify_digest(&self) -> Result<(), SignatureError> {
        if self.signature_info.signature_type != SignatureType::DigestSha256 {
            return Err(SignatureError::InvalidSignature);
        }
        signature::verify_digest_sha256(self, &self.signature_value)
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut children = vec![self.name.to_tlv()];
        if let Some(meta_info) = &self.meta_info {
            children.push(meta_info.to_tlv());
        }
        children.push(TlvElement::new(tlv_types::CONTENT, self.content.clone()));
        children.push(self.signature_info.to_tlv());
        children.push(TlvElement::new(
            tlv_types::SIGNATURE_VALUE,
            self.signature_value.clone(),
        ));
        TlvElement::with_children(tlv_types::DATA, children)
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        let mut data = Data::new(Name::new(), Vec::new());

        for child in &element.children {
            match child.type_ {
                tlv_types::NAME => data.name = Name::from_tlv(child)?,
                tlv_types::META_INFO => data.meta_info = Some(MetaInfo::from_tlv(child)?),
                tlv_types::CONTENT => data.content = child.value.clone(),
                tlv_types::SIGNATURE_INFO => data.signature_info = SignatureInfo::from_tlv(child)?,
                tlv_types::SIGNATURE_VALUE => data.signature_value = child.value.clone(),
                actual => {
                    return Err(TlvError::WrongType {
                        expected: tlv_types::NAME,
                        actual,
                    })
                }
            }
        }

        Ok(data)
    }

    /// Encode Data packet to TLV wire format
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        self.to_tlv().encode()
    }

    /// Decode Data packet from TLV wire format
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        Self::from_tlv(&grammar::DATA.decode(data)?)
    }
}

impl Signable for Data {
    fn signed_portion(&self) -> Result<Vec<u8>, TlvError> {
        self.to_tlv()
            .encode_children_until(|_, child| child.type_ == tlv_types::SIGNATURE_VALUE)
    }
}

/// Packet types that can be sent over the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    Interest(Interest),
    Data(Data),
}

impl Packet {
    /// Get the name of the packet
    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(interest) => &interest.name,
            Packet::Data(data) => &data.name,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        match self {
            Packet::Interest(interest) => interest.encode(),
            Packet::Data(data) => data.encode(),
        }
    }

    /// Decode either packet kind, dispatching on the outer TLV type
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        let (type_, _) = varnum::decode(data)?;
        match type_ {
            tlv_types::INTEREST => Ok(Packet::Interest(Interest::decode(data)?)),
            tlv_types::DATA => Ok(Packet::Data(Data::decode(data)?)),
            actual => Err(TlvError::WrongType {
                expected: tlv_types::INTEREST,
                actual,
            }),
        }
    }

    /// Read one length-delimited packet from a byte stream
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, TlvError> {
        Self::decode(&TlvElement::read_raw(reader)?)
    }
}

impl From<Interest> for Packet {
    fn from(interest: Interest) -> Self {
        Packet::Interest(interest)
    }
}

impl From<Data> for Packet {
    fn from(data: Data) -> Self {
        Packet::Data(data)
    }
}
