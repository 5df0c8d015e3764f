//! Key certificates: Data packets whose content is a public key.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, warn};

use crate::name::Name;
use crate::packets::{ContentType, Data, KeyLocator};
use crate::signature::{Key, PublicKey, SignatureError, SignatureType};

/// Freshness period stamped on every certificate
pub const CERTIFICATE_FRESHNESS: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    data: Data,
}

impl Certificate {
    /// Certify `subject`'s public key with `signer` (which may be the same key)
    pub fn new(subject: &Key, signer: &Key) -> Result<Self, SignatureError> {
        let public = subject.public_bytes()?;
        if public.is_empty() {
            return Err(SignatureError::UnsupportedKey(format!(
                "{:?} keys have no public form",
                subject.signature_type()
            )));
        }

        let mut data = Data::new(subject.locator().clone(), public)
            .with_content_type(ContentType::Key)
            .with_freshness_period(CERTIFICATE_FRESHNESS);
        data.sign(signer)?;

        debug!("Issued certificate {} signed by {}", data.name, signer.locator());
        Ok(Self { data })
    }

    /// Wrap a Data packet that claims to be a certificate
    pub fn from_data(data: Data) -> Result<Self, SignatureError> {
        if data.content_type() != ContentType::Key {
            return Err(SignatureError::UnsupportedKey(format!(
                "{} is not a key packet",
                data.name
            )));
        }
        Ok(Self { data })
    }

    pub fn name(&self) -> &Name {
        &self.data.name
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn into_data(self) -> Data {
        self.data
    }

    /// Locator of the key that signed this certificate
    pub fn signer(&self) -> Option<&KeyLocator> {
        self.data.signature_info.key_locator.as_ref()
    }

    pub fn public_key(&self) -> Result<PublicKey, SignatureError> {
        PublicKey::from_der(&self.data.content).map_err(|e| {
            warn!("Certificate {} carries an unusable key: {}", self.data.name, e);
            e
        })
    }

    pub fn verify_with(&self, signer: &Key) -> Result<(), SignatureError> {
        self.data.verify(signer)
    }

    pub fn verify_with_public(&self, signer: &PublicKey) -> Result<(), SignatureError> {
        if self.data.signature_info.signature_type != signer.signature_type() {
            return Err(SignatureError::InvalidSignature);
        }
        signer.verify(&self.data, &self.data.signature_value)
    }

    /// Check the signature against the certified key itself
    pub fn verify_self_signed(&self) -> Result<(), SignatureError> {
        if self.data.signature_info.signature_type == SignatureType::DigestSha256 {
            return self.data.verify_digest();
        }
        self.verify_with_public(&self.public_key()?)
    }

    /// Base64 of the Data wire encoding
    pub fn to_base64(&self) -> Result<String, SignatureError> {
        Ok(STANDARD.encode(self.data.encode()?))
    }

    pub fn from_base64(text: &str) -> Result<Self, SignatureError> {
        let compact: String = text.split_whitespace().collect();
        let wire = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| SignatureError::KeyError(format!("certificate encoding: {}", e)))?;
        Self::from_data(Data::decode(&wire)?)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), SignatureError> {
        writer.write_all(self.to_base64()?.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, SignatureError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::from_base64(&text)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SignatureError> {
        let mut file = fs::File::create(path)?;
        self.write_to(&mut file)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SignatureError> {
        let mut file = fs::File::open(path)?;
        Self::read_from(&mut file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[test]
    fn test_self_signed_certificate() {
        let key = Key::generate_ecdsa(name("/keys/site")).unwrap();
        let cert = Certificate::new(&key, &key).unwrap();

        assert_eq!(cert.name(), key.locator());
        assert_eq!(cert.data().content_type(), ContentType::Key);
        assert_eq!(cert.data().freshness_period(), Some(CERTIFICATE_FRESHNESS));
        assert_eq!(cert.signer(), Some(&key.key_locator()));

        cert.verify_with(&key).unwrap();
        cert.verify_self_signed().unwrap();
        assert_eq!(cert.public_key().unwrap().to_der().unwrap(), key.public_bytes().unwrap());
    }

    #[test]
    fn test_signed_by_another_key() {
        let subject = Key::generate_rsa(name("/keys/user"), 1024).unwrap();
        let anchor = Key::generate_ecdsa(name("/keys/anchor")).unwrap();
        let cert = Certificate::new(&subject, &anchor).unwrap();

        cert.verify_with(&anchor).unwrap();
        assert!(cert.verify_with(&subject).is_err());
        assert!(cert.verify_self_signed().is_err());

        let anchor_public = anchor.public_key().unwrap().unwrap();
        cert.verify_with_public(&anchor_public).unwrap();
    }

    #[test]
    fn test_hmac_cannot_be_certified() {
        let hmac = Key::generate_hmac(name("/keys/hmac"));
        let signer = Key::generate_ecdsa(name("/keys/signer")).unwrap();
        assert!(matches!(
            Certificate::new(&hmac, &signer),
            Err(SignatureError::UnsupportedKey(_))
        ));
        // but an HMAC key may sign a certificate
        let subject = Key::generate_ecdsa(name("/keys/subject")).unwrap();
        Certificate::new(&subject, &hmac).unwrap().verify_with(&hmac).unwrap();
    }

    #[test]
    fn test_file_round_trip() {
        let key = Key::generate_ecdsa(name("/keys/file")).unwrap();
        let cert = Certificate::new(&key, &key).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.cert");
        cert.save(&path).unwrap();

        let loaded = Certificate::load(&path).unwrap();
        assert_eq!(loaded, cert);
        loaded.verify_self_signed().unwrap();
    }

    #[test]
    fn test_non_key_data_rejected() {
        let data = Data::new(name("/not/a/key"), vec![1, 2, 3]);
        assert!(matches!(
            Certificate::from_data(data),
            Err(SignatureError::UnsupportedKey(_))
        ));
    }

    #[test]
    fn test_garbage_file() {
        assert!(Certificate::from_base64("@@@").is_err());
    }
}
