//! Signed forwarder management commands.
//!
//! A command travels as the name of an Interest:
//!
//! ```text
//! /localhost/nfd/<module>/<command>/<ControlParameters>/<timestamp>/<nonce>/<SignatureInfo>/<SignatureValue>
//! ```
//!
//! The signature covers every name component except the last.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::grammar;
use crate::name::{Component, Name};
use crate::packets::{Interest, SignatureInfo};
use crate::signature::{Key, Signable, SignatureError};
use crate::tlv::{tlv_types, TlvElement, TlvError};
use crate::varnum;

/// Number of name components covered by the signature
const SIGNED_COMPONENTS: usize = 8;

static SIGNING_KEY: RwLock<Option<Arc<Key>>> = RwLock::new(None);

/// Install the key used by [`Command::encode`] for unsigned commands
pub fn set_signing_key(key: Arc<Key>) {
    info!("Command signing key set to {}", key.locator());
    *SIGNING_KEY.write().unwrap_or_else(PoisonError::into_inner) = Some(key);
}

pub fn signing_key() -> Option<Arc<Key>> {
    SIGNING_KEY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub fn clear_signing_key() {
    SIGNING_KEY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
}

/// Parameters of a management command or response
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlParameters {
    pub name: Option<Name>,
    pub face_id: Option<u64>,
    pub uri: Option<String>,
    pub origin: Option<u64>,
    pub cost: Option<u64>,
    pub flags: Option<u64>,
    pub strategy: Option<Name>,
    pub expiration_period: Option<Duration>,
}

impl ControlParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: Name) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_face_id(mut self, face_id: u64) -> Self {
        self.face_id = Some(face_id);
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_strategy(mut self, strategy: Name) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut children = Vec::new();
        if let Some(name) = &self.name {
            children.push(name.to_tlv());
        }
        if let Some(face_id) = self.face_id {
            children.push(TlvElement::nonneg(tlv_types::FACE_ID, face_id));
        }
        if let Some(uri) = &self.uri {
            children.push(TlvElement::new(tlv_types::URI, uri.as_bytes().to_vec()));
        }
        if let Some(origin) = self.origin {
            children.push(TlvElement::nonneg(tlv_types::ORIGIN, origin));
        }
        if let Some(cost) = self.cost {
            children.push(TlvElement::nonneg(tlv_types::COST, cost));
        }
        if let Some(flags) = self.flags {
            children.push(TlvElement::nonneg(tlv_types::FLAGS, flags));
        }
        if let Some(strategy) = &self.strategy {
            children.push(TlvElement::with_children(
                tlv_types::STRATEGY,
                vec![strategy.to_tlv()],
            ));
        }
        if let Some(period) = self.expiration_period {
            children.push(TlvElement::nonneg(
                tlv_types::EXPIRATION_PERIOD,
                period.as_millis() as u64,
            ));
        }
        TlvElement::with_children(tlv_types::CONTROL_PARAMETERS, children)
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        let mut parameters = Self::default();
        for child in &element.children {
            match child.type_ {
                tlv_types::NAME => parameters.name = Some(Name::from_tlv(child)?),
                tlv_types::FACE_ID => parameters.face_id = Some(child.as_nonneg()?),
                tlv_types::URI => {
                    let uri = String::from_utf8(child.value.clone())
                        .map_err(|_| TlvError::Malformed("URI is not UTF-8".to_string()))?;
                    parameters.uri = Some(uri);
                }
                tlv_types::ORIGIN => parameters.origin = Some(child.as_nonneg()?),
                tlv_types::COST => parameters.cost = Some(child.as_nonneg()?),
                tlv_types::FLAGS => parameters.flags = Some(child.as_nonneg()?),
                tlv_types::STRATEGY => {
                    let name = child.child(tlv_types::NAME).ok_or(TlvError::WrongCount {
                        tlv_type: tlv_types::NAME,
                    })?;
                    parameters.strategy = Some(Name::from_tlv(name)?);
                }
                tlv_types::EXPIRATION_PERIOD => {
                    parameters.expiration_period = Some(Duration::from_millis(child.as_nonneg()?))
                }
                actual => {
                    return Err(TlvError::WrongType {
                        expected: tlv_types::NAME,
                        actual,
                    })
                }
            }
        }
        Ok(parameters)
    }

    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        self.to_tlv().encode()
    }

    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        Self::from_tlv(&grammar::CONTROL_PARAMETERS.decode(data)?)
    }
}

/// The forwarder's answer to a command, carried as Data content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status_code: u64,
    pub status_text: String,
    pub body: Option<ControlParameters>,
}

impl ControlResponse {
    pub fn new(status_code: u64, status_text: impl Into<String>) -> Self {
        Self {
            status_code,
            status_text: status_text.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: ControlParameters) -> Self {
        self.body = Some(body);
        self
    }

    /// Status codes in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut children = vec![
            TlvElement::nonneg(tlv_types::STATUS_CODE, self.status_code),
            TlvElement::new(tlv_types::STATUS_TEXT, self.status_text.as_bytes().to_vec()),
        ];
        if let Some(body) = &self.body {
            children.push(body.to_tlv());
        }
        TlvElement::with_children(tlv_types::CONTROL_RESPONSE, children)
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        let status_code = element
            .child(tlv_types::STATUS_CODE)
            .ok_or(TlvError::WrongCount {
                tlv_type: tlv_types::STATUS_CODE,
            })?
            .as_nonneg()?;
        let status_text = element
            .child(tlv_types::STATUS_TEXT)
            .ok_or(TlvError::WrongCount {
                tlv_type: tlv_types::STATUS_TEXT,
            })?;
        let status_text = String::from_utf8(status_text.value.clone())
            .map_err(|_| TlvError::Malformed("status text is not UTF-8".to_string()))?;
        let body = element
            .child(tlv_types::CONTROL_PARAMETERS)
            .map(ControlParameters::from_tlv)
            .transpose()?;

        Ok(Self {
            status_code,
            status_text,
            body,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        self.to_tlv().encode()
    }

    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        Self::from_tlv(&grammar::CONTROL_RESPONSE.decode(data)?)
    }
}

/// A management request addressed to the local forwarder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub localhost: String,
    pub forwarder: String,
    pub module: String,
    pub command: String,
    pub parameters: ControlParameters,
    /// Milliseconds since the Unix epoch, stamped when signed
    pub timestamp: u64,
    pub nonce: [u8; 8],
    pub signature_info: SignatureInfo,
    pub signature_value: Vec<u8>,
}

impl Command {
    pub fn new(module: impl Into<String>, command: impl Into<String>, parameters: ControlParameters) -> Self {
        Self {
            localhost: "localhost".to_string(),
            forwarder: "nfd".to_string(),
            module: module.into(),
            command: command.into(),
            parameters,
            timestamp: 0,
            nonce: [0; 8],
            signature_info: SignatureInfo::default(),
            signature_value: Vec::new(),
        }
    }

    /// Override the `/localhost/nfd` prefix
    pub fn with_prefix(mut self, localhost: impl Into<String>, forwarder: impl Into<String>) -> Self {
        self.localhost = localhost.into();
        self.forwarder = forwarder.into();
        self
    }

    /// Encode as a name, signing with the process signing key first if the
    /// command carries no signature yet
    pub fn encode(&mut self) -> Result<Name, SignatureError> {
        if self.signature_value.is_empty() {
            let key = signing_key().ok_or(SignatureError::MissingSigningKey)?;
            self.sign(&key)?;
        }
        self.to_name()
    }

    /// Sign with `key` and encode as a name
    pub fn encode_with(&mut self, key: &Key) -> Result<Name, SignatureError> {
        self.sign(key)?;
        self.to_name()
    }

    /// Stamp a fresh timestamp and nonce, then sign
    pub fn sign(&mut self, key: &Key) -> Result<(), SignatureError> {
        self.timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        self.nonce = rand::random();
        self.signature_info = SignatureInfo::new(key.signature_type())
            .with_key_locator(key.key_locator());
        self.signature_value = key.sign(&*self)?;

        debug!(
            "Signed command {}/{} with {}",
            self.module,
            self.command,
            key.locator()
        );
        Ok(())
    }

    /// Build the Interest that carries this command
    pub fn to_interest(&mut self, lifetime: Duration) -> Result<Interest, SignatureError> {
        Ok(Interest::new(self.encode()?).with_lifetime(lifetime))
    }

    pub fn verify(&self, key: &Key) -> Result<(), SignatureError> {
        if self.signature_info.signature_type != key.signature_type() {
            return Err(SignatureError::InvalidSignature);
        }
        key.verify(self, &self.signature_value)
    }

    /// Parse a command from the name of a received Interest
    pub fn decode(name: &Name) -> Result<Self, SignatureError> {
        let [localhost, forwarder, module, command, parameters, timestamp, nonce, info, value] =
            name.components.as_slice()
        else {
            return Err(TlvError::Malformed(format!(
                "command name has {} components",
                name.len()
            ))
            .into());
        };

        let (signature_value, consumed) = TlvElement::decode(value.as_bytes())?;
        if signature_value.type_ != tlv_types::SIGNATURE_VALUE {
            return Err(TlvError::WrongType {
                expected: tlv_types::SIGNATURE_VALUE,
                actual: signature_value.type_,
            }
            .into());
        }
        if consumed != value.len() {
            return Err(TlvError::BufferNotEmpty(value.len() - consumed).into());
        }

        let nonce = <[u8; 8]>::try_from(nonce.as_bytes()).map_err(|_| {
            TlvError::Malformed(format!("command nonce of {} bytes", nonce.len()))
        })?;

        Ok(Self {
            localhost: utf8(localhost)?,
            forwarder: utf8(forwarder)?,
            module: utf8(module)?,
            command: utf8(command)?,
            parameters: ControlParameters::decode(parameters.as_bytes())?,
            timestamp: varnum::decode_nonneg(timestamp.as_bytes())?,
            nonce,
            signature_info: SignatureInfo::decode(info.as_bytes())?,
            signature_value: signature_value.value,
        })
    }

    /// The name components preceding the signature value
    fn signed_components(&self) -> Result<Vec<Component>, TlvError> {
        Ok(vec![
            Component::from(self.localhost.as_str()),
            Component::from(self.forwarder.as_str()),
            Component::from(self.module.as_str()),
            Component::from(self.command.as_str()),
            Component::new(self.parameters.encode()?),
            Component::new(varnum::encode_nonneg(self.timestamp)),
            Component::new(self.nonce.to_vec()),
            Component::new(self.signature_info.encode()?),
        ])
    }

    fn to_name(&self) -> Result<Name, SignatureError> {
        let mut components = self.signed_components()?;
        let value = TlvElement::new(tlv_types::SIGNATURE_VALUE, self.signature_value.clone());
        components.push(Component::new(value.encode()?));
        Ok(Name::from_components(components))
    }
}

impl Signable for Command {
    fn signed_portion(&self) -> Result<Vec<u8>, TlvError> {
        Name::from_components(self.signed_components()?)
            .to_tlv()
            .encode_children_until(|index, _| index >= SIGNED_COMPONENTS)
    }
}

fn utf8(component: &Component) -> Result<String, TlvError> {
    String::from_utf8(component.as_bytes().to_vec())
        .map_err(|_| TlvError::Malformed(format!("component {} is not UTF-8", component)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn register() -> Command {
        Command::new(
            "rib",
            "register",
            ControlParameters::new().with_name(name("/app")).with_cost(10),
        )
    }

    #[test]
    fn test_command_name_layout() {
        let key = Key::generate_hmac(name("/keys/cmd"));
        let mut command = register();
        let encoded = command.encode_with(&key).unwrap();

        assert_eq!(encoded.len(), 9);
        assert_eq!(encoded.get_prefix(4).to_uri(), "/localhost/nfd/rib/register");
        assert_eq!(encoded.get(4).unwrap().as_bytes()[0], tlv_types::CONTROL_PARAMETERS as u8);
        assert_eq!(encoded.get(6).unwrap().len(), 8);
        assert_eq!(encoded.get(7).unwrap().as_bytes()[0], tlv_types::SIGNATURE_INFO as u8);
        assert_eq!(encoded.get(8).unwrap().as_bytes()[0], tlv_types::SIGNATURE_VALUE as u8);
        assert!(command.timestamp > 0);
    }

    #[test]
    fn test_command_round_trip_and_verify() {
        for key in [
            Key::generate_hmac(name("/keys/hmac")),
            Key::generate_ecdsa(name("/keys/ecdsa")).unwrap(),
        ] {
            let mut command = register();
            let encoded = command.encode_with(&key).unwrap();

            // through an Interest on the wire
            let interest = Interest::new(encoded);
            let received = Interest::decode(&interest.encode().unwrap()).unwrap();
            let decoded = Command::decode(&received.name).unwrap();

            assert_eq!(decoded, command);
            decoded.verify(&key).unwrap();

            let mut tampered = decoded.clone();
            tampered.parameters.cost = Some(11);
            assert!(matches!(tampered.verify(&key), Err(SignatureError::InvalidSignature)));
        }
    }

    #[test]
    fn test_signed_portion_excludes_value() {
        let key = Key::generate_hmac(name("/keys/cmd"));
        let mut command = register();
        let encoded = command.encode_with(&key).unwrap();

        let wire = encoded.encode().unwrap();
        let last = encoded.get(8).unwrap().to_tlv().encode().unwrap();
        let portion = command.signed_portion().unwrap();
        // name header is 2 bytes for a name this short
        assert_eq!(portion, wire[2..wire.len() - last.len()].to_vec());
    }

    #[test]
    fn test_process_signing_key() {
        // the only test that touches the process-wide key
        clear_signing_key();
        let mut command = register();
        assert!(matches!(command.encode(), Err(SignatureError::MissingSigningKey)));

        let key = Arc::new(Key::generate_hmac(name("/keys/process")));
        set_signing_key(Arc::clone(&key));
        let encoded = command.encode().unwrap();
        command.verify(&key).unwrap();

        // already signed, so encoding again changes nothing
        assert_eq!(command.encode().unwrap(), encoded);

        let interest = command.to_interest(Duration::from_secs(4)).unwrap();
        assert_eq!(interest.name, encoded);
        assert_eq!(interest.interest_lifetime, Some(Duration::from_secs(4)));

        clear_signing_key();
        assert!(signing_key().is_none());

        // installed from a configured key file
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("process.pem");
        crate::pem::write_key(&mut std::fs::File::create(&path).unwrap(), &key).unwrap();
        let mut config = crate::config::Config::default();
        assert!(!config.install_signing_key().unwrap());
        config.signing.key_file = Some(path);
        assert!(config.install_signing_key().unwrap());
        assert_eq!(signing_key().unwrap().locator(), key.locator());
        clear_signing_key();
    }

    #[test]
    fn test_decode_rejects_short_name() {
        assert!(matches!(
            Command::decode(&name("/localhost/nfd/rib")),
            Err(SignatureError::Tlv(TlvError::Malformed(_)))
        ));
    }

    #[test]
    fn test_control_parameters_codec() {
        let parameters = ControlParameters {
            name: Some(name("/a/b")),
            face_id: Some(300),
            uri: Some("tcp4://127.0.0.1:6363".to_string()),
            origin: Some(0),
            cost: Some(10),
            flags: Some(1),
            strategy: Some(name("/localhost/nfd/strategy/best-route")),
            expiration_period: Some(Duration::from_secs(60)),
        };
        let decoded = ControlParameters::decode(&parameters.encode().unwrap()).unwrap();
        assert_eq!(decoded, parameters);

        let empty = ControlParameters::new();
        assert_eq!(empty.encode().unwrap(), vec![104, 0]);
    }

    #[test]
    fn test_control_response_codec() {
        let response = ControlResponse::new(200, "OK")
            .with_body(ControlParameters::new().with_face_id(7));
        let decoded = ControlResponse::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded, response);
        assert!(decoded.is_success());

        let failure = ControlResponse::new(404, "Not Found");
        let decoded = ControlResponse::decode(&failure.encode().unwrap()).unwrap();
        assert!(!decoded.is_success());
        assert!(decoded.body.is_none());
    }
}
