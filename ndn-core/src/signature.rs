use std::fmt;

use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, KeyPair, UnparsedPublicKey, ECDSA_P256_SHA256_ASN1,
    ECDSA_P256_SHA256_ASN1_SIGNING,
};
use ring::hmac;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x509_parser::prelude::{FromDer, SubjectPublicKeyInfo};
use x509_parser::public_key::PublicKey as ParsedPublicKey;

use crate::name::Name;
use crate::packets::KeyLocator;
use crate::tlv::TlvError;

/// SubjectPublicKeyInfo prefix for an uncompressed P-256 point
const P256_SPKI_HEADER: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08,
    0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00,
];

const HMAC_SECRET_LEN: usize = 32;

/// Signature types supported by the NDN protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignatureType {
    /// SHA256 digest only (no signature)
    DigestSha256 = 0,
    /// SHA256 with RSA signature
    Sha256WithRsa = 1,
    /// SHA256 with ECDSA signature
    Sha256WithEcdsa = 3,
    /// HMAC with SHA256
    HmacWithSha256 = 4,
}

impl TryFrom<u64> for SignatureType {
    type Error = SignatureError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SignatureType::DigestSha256),
            1 => Ok(SignatureType::Sha256WithRsa),
            3 => Ok(SignatureType::Sha256WithEcdsa),
            4 => Ok(SignatureType::HmacWithSha256),
            other => Err(SignatureError::UnsupportedKey(format!(
                "signature type {}",
                other
            ))),
        }
    }
}

/// Errors that can occur during signature operations
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Signature verification failed")]
    InvalidSignature,
    #[error("Invalid PEM: {0}")]
    InvalidPem(String),
    #[error("Unsupported key: {0}")]
    UnsupportedKey(String),
    #[error("TLV encoding error: {0}")]
    Tlv(#[from] TlvError),
    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),
    #[error("Key error: {0}")]
    KeyError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No signing key installed")]
    MissingSigningKey,
}

/// Anything whose wire form carries a trailing signature value.
///
/// The signed portion is the encoding of the record up to, but excluding,
/// that value.
pub trait Signable {
    fn signed_portion(&self) -> Result<Vec<u8>, TlvError>;
}

/// SHA-256 "signature" over the signed portion, for `DigestSha256`
pub fn digest_sha256(item: &dyn Signable) -> Result<Vec<u8>, SignatureError> {
    Ok(Sha256::digest(item.signed_portion()?).to_vec())
}

pub fn verify_digest_sha256(item: &dyn Signable, signature: &[u8]) -> Result<(), SignatureError> {
    let expected = digest_sha256(item)?;
    if ring::constant_time::verify_slices_are_equal(&expected, signature).is_err() {
        return Err(SignatureError::InvalidSignature);
    }
    Ok(())
}

pub struct RsaKey {
    name: Name,
    private_key: RsaPrivateKey,
}

pub struct EcdsaKey {
    name: Name,
    pkcs8: Vec<u8>,
    key_pair: EcdsaKeyPair,
}

pub struct HmacKey {
    name: Name,
    secret: Vec<u8>,
    key: hmac::Key,
}

/// A private key bearing its locator name
pub enum Key {
    Rsa(RsaKey),
    Ecdsa(EcdsaKey),
    Hmac(HmacKey),
}

impl Key {
    /// Generate a new RSA key pair
    pub fn generate_rsa(name: Name, bits: usize) -> Result<Self, SignatureError> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, bits)?;
        Ok(Key::Rsa(RsaKey { name, private_key }))
    }

    /// Generate a new P-256 ECDSA key pair
    pub fn generate_ecdsa(name: Name) -> Result<Self, SignatureError> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|_| SignatureError::KeyError("ECDSA key generation failed".to_string()))?;
        Self::ecdsa_from_pkcs8(name, pkcs8.as_ref())
    }

    /// Generate a random HMAC-SHA256 secret
    pub fn generate_hmac(name: Name) -> Self {
        let secret: [u8; HMAC_SECRET_LEN] = rand::random();
        Self::hmac_from_secret(name, &secret)
    }

    /// Rebuild a key from the bytes returned by [`Key::private_bytes`]
    pub fn from_private_bytes(
        signature_type: SignatureType,
        name: Name,
        bytes: &[u8],
    ) -> Result<Self, SignatureError> {
        match signature_type {
            SignatureType::Sha256WithRsa => {
                let private_key = RsaPrivateKey::from_pkcs1_der(bytes)
                    .map_err(|e| SignatureError::KeyError(e.to_string()))?;
                Ok(Key::Rsa(RsaKey { name, private_key }))
            }
            SignatureType::Sha256WithEcdsa => Self::ecdsa_from_pkcs8(name, bytes),
            SignatureType::HmacWithSha256 => Ok(Self::hmac_from_secret(name, bytes)),
            SignatureType::DigestSha256 => Err(SignatureError::UnsupportedKey(
                "digest signatures have no key".to_string(),
            )),
        }
    }

    fn ecdsa_from_pkcs8(name: Name, pkcs8: &[u8]) -> Result<Self, SignatureError> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8, &rng)
            .map_err(|e| SignatureError::KeyError(e.to_string()))?;
        Ok(Key::Ecdsa(EcdsaKey {
            name,
            pkcs8: pkcs8.to_vec(),
            key_pair,
        }))
    }

    fn hmac_from_secret(name: Name, secret: &[u8]) -> Self {
        Key::Hmac(HmacKey {
            name,
            secret: secret.to_vec(),
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        })
    }

    pub fn locator(&self) -> &Name {
        match self {
            Key::Rsa(key) => &key.name,
            Key::Ecdsa(key) => &key.name,
            Key::Hmac(key) => &key.name,
        }
    }

    pub fn key_locator(&self) -> KeyLocator {
        KeyLocator::Name(self.locator().clone())
    }

    pub fn signature_type(&self) -> SignatureType {
        match self {
            Key::Rsa(_) => SignatureType::Sha256WithRsa,
            Key::Ecdsa(_) => SignatureType::Sha256WithEcdsa,
            Key::Hmac(_) => SignatureType::HmacWithSha256,
        }
    }

    /// Private key bytes: PKCS#1 DER for RSA, PKCS#8 DER for ECDSA, the raw
    /// secret for HMAC
    pub fn private_bytes(&self) -> Result<Vec<u8>, SignatureError> {
        match self {
            Key::Rsa(key) => Ok(key
                .private_key
                .to_pkcs1_der()
                .map_err(|e| SignatureError::KeyError(e.to_string()))?
                .as_bytes()
                .to_vec()),
            Key::Ecdsa(key) => Ok(key.pkcs8.clone()),
            Key::Hmac(key) => Ok(key.secret.clone()),
        }
    }

    /// PKIX DER public key. HMAC keys have no public form and return an
    /// empty vector.
    pub fn public_bytes(&self) -> Result<Vec<u8>, SignatureError> {
        match self {
            Key::Rsa(key) => Ok(RsaPublicKey::from(&key.private_key)
                .to_public_key_der()
                .map_err(|e| SignatureError::KeyError(e.to_string()))?
                .as_bytes()
                .to_vec()),
            Key::Ecdsa(key) => {
                let mut der = P256_SPKI_HEADER.to_vec();
                der.extend_from_slice(key.key_pair.public_key().as_ref());
                Ok(der)
            }
            Key::Hmac(_) => Ok(Vec::new()),
        }
    }

    /// The public half, if this key type has one
    pub fn public_key(&self) -> Result<Option<PublicKey>, SignatureError> {
        match self {
            Key::Rsa(key) => Ok(Some(PublicKey::Rsa(RsaPublicKey::from(&key.private_key)))),
            Key::Ecdsa(key) => Ok(Some(PublicKey::Ecdsa(
                key.key_pair.public_key().as_ref().to_vec(),
            ))),
            Key::Hmac(_) => Ok(None),
        }
    }

    pub fn sign(&self, item: &dyn Signable) -> Result<Vec<u8>, SignatureError> {
        self.sign_bytes(&item.signed_portion()?)
    }

    pub fn verify(&self, item: &dyn Signable, signature: &[u8]) -> Result<(), SignatureError> {
        self.verify_bytes(&item.signed_portion()?, signature)
    }

    pub fn sign_bytes(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        match self {
            Key::Rsa(key) => {
                let mut rng = rand::thread_rng();
                let signing_key = SigningKey::<Sha256>::new(key.private_key.clone());
                Ok(signing_key.sign_with_rng(&mut rng, message).to_vec())
            }
            Key::Ecdsa(key) => {
                let rng = SystemRandom::new();
                let signature = key
                    .key_pair
                    .sign(&rng, message)
                    .map_err(|_| SignatureError::KeyError("ECDSA signing failed".to_string()))?;
                Ok(signature.as_ref().to_vec())
            }
            Key::Hmac(key) => Ok(hmac::sign(&key.key, message).as_ref().to_vec()),
        }
    }

    pub fn verify_bytes(&self, message: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
        match self {
            Key::Hmac(key) => {
                hmac::verify(&key.key, message, signature).map_err(|_| SignatureError::InvalidSignature)
            }
            _ => match self.public_key()? {
                Some(public) => public.verify_bytes(message, signature),
                None => Err(SignatureError::InvalidSignature),
            },
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("type", &self.signature_type())
            .field("locator", &self.locator().to_uri())
            .finish_non_exhaustive()
    }
}

/// A verification-only public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    /// Uncompressed P-256 point
    Ecdsa(Vec<u8>),
}

impl PublicKey {
    /// Parse a PKIX `SubjectPublicKeyInfo`
    pub fn from_der(der: &[u8]) -> Result<Self, SignatureError> {
        let (_, spki) = SubjectPublicKeyInfo::from_der(der)
            .map_err(|e| SignatureError::KeyError(e.to_string()))?;

        match spki.parsed() {
            Ok(ParsedPublicKey::RSA(_)) => Ok(PublicKey::Rsa(
                RsaPublicKey::from_public_key_der(der)
                    .map_err(|e| SignatureError::KeyError(e.to_string()))?,
            )),
            Ok(ParsedPublicKey::EC(point)) if point.data().len() == 65 => {
                Ok(PublicKey::Ecdsa(point.data().to_vec()))
            }
            _ => Err(SignatureError::UnsupportedKey(format!(
                "public key algorithm {}",
                spki.algorithm.algorithm
            ))),
        }
    }

    pub fn to_der(&self) -> Result<Vec<u8>, SignatureError> {
        match self {
            PublicKey::Rsa(key) => Ok(key
                .to_public_key_der()
                .map_err(|e| SignatureError::KeyError(e.to_string()))?
                .as_bytes()
                .to_vec()),
            PublicKey::Ecdsa(point) => {
                let mut der = P256_SPKI_HEADER.to_vec();
                der.extend_from_slice(point);
                Ok(der)
            }
        }
    }

    pub fn signature_type(&self) -> SignatureType {
        match self {
            PublicKey::Rsa(_) => SignatureType::Sha256WithRsa,
            PublicKey::Ecdsa(_) => SignatureType::Sha256WithEcdsa,
        }
    }

    pub fn verify(&self, item: &dyn Signable, signature: &[u8]) -> Result<(), SignatureError> {
        self.verify_bytes(&item.signed_portion()?, signature)
    }

    pub fn verify_bytes(&self, message: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
        match self {
            PublicKey::Rsa(key) => {
                let verifying_key = VerifyingKey::<Sha256>::new(key.clone());
                let signature =
                    Signature::try_from(signature).map_err(|_| SignatureError::InvalidSignature)?;
                verifying_key
                    .verify(message, &signature)
                    .map_err(|_| SignatureError::InvalidSignature)
            }
            PublicKey::Ecdsa(point) => UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, point)
                .verify(message, signature)
                .map_err(|_| SignatureError::InvalidSignature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::Data;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn all_keys() -> Vec<Key> {
        vec![
            Key::generate_rsa(name("/keys/rsa"), 1024).unwrap(),
            Key::generate_ecdsa(name("/keys/ecdsa")).unwrap(),
            Key::generate_hmac(name("/keys/hmac")),
        ]
    }

    #[test]
    fn test_signature_types() {
        assert_eq!(SignatureType::try_from(1).unwrap(), SignatureType::Sha256WithRsa);
        assert_eq!(SignatureType::try_from(0).unwrap(), SignatureType::DigestSha256);
        assert!(matches!(
            SignatureType::try_from(2),
            Err(SignatureError::UnsupportedKey(_))
        ));
        assert_eq!(SignatureType::HmacWithSha256 as u64, 4);
    }

    #[test]
    fn test_data_signing_and_verification() {
        for key in all_keys() {
            let mut data = Data::new(name("/test/data"), b"test content".to_vec());
            data.sign(&key).unwrap();

            assert_eq!(data.signature_info.signature_type, key.signature_type());
            assert_eq!(data.signature_info.key_locator, Some(key.key_locator()));
            data.verify(&key).unwrap();

            // survives the wire
            let decoded = Data::decode(&data.encode().unwrap()).unwrap();
            decoded.verify(&key).unwrap();

            data.content = b"modified content".to_vec();
            assert!(matches!(data.verify(&key), Err(SignatureError::InvalidSignature)));
        }
    }

    #[test]
    fn test_any_bit_flip_fails() {
        for key in all_keys() {
            let mut data = Data::new(name("/flip"), b"payload!".to_vec());
            data.sign(&key).unwrap();

            for bit in 0..data.signature_value.len() * 8 {
                let mut tampered = data.clone();
                tampered.signature_value[bit / 8] ^= 1 << (bit % 8);
                assert!(
                    tampered.verify(&key).is_err(),
                    "{:?} accepted a flipped signature bit {}",
                    key,
                    bit
                );
            }

            for bit in 0..data.content.len() * 8 {
                let mut tampered = data.clone();
                tampered.content[bit / 8] ^= 1 << (bit % 8);
                assert!(tampered.verify(&key).is_err());
            }
        }
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signer = Key::generate_hmac(name("/keys/a"));
        let other = Key::generate_hmac(name("/keys/b"));
        let mut data = Data::new(name("/x"), vec![1]);
        data.sign(&signer).unwrap();
        assert!(matches!(data.verify(&other), Err(SignatureError::InvalidSignature)));

        let ecdsa = Key::generate_ecdsa(name("/keys/c")).unwrap();
        assert!(matches!(data.verify(&ecdsa), Err(SignatureError::InvalidSignature)));
    }

    #[test]
    fn test_private_bytes_round_trip() {
        for key in all_keys() {
            let bytes = key.private_bytes().unwrap();
            let restored =
                Key::from_private_bytes(key.signature_type(), key.locator().clone(), &bytes)
                    .unwrap();
            assert_eq!(restored.public_bytes().unwrap(), key.public_bytes().unwrap());

            let mut data = Data::new(name("/restored"), vec![7; 16]);
            data.sign(&key).unwrap();
            data.verify(&restored).unwrap();
        }
    }

    #[test]
    fn test_public_key_from_der() {
        for key in all_keys() {
            let der = key.public_bytes().unwrap();
            if key.signature_type() == SignatureType::HmacWithSha256 {
                assert!(der.is_empty());
                assert!(key.public_key().unwrap().is_none());
                continue;
            }

            let public = PublicKey::from_der(&der).unwrap();
            assert_eq!(public.signature_type(), key.signature_type());
            assert_eq!(public.to_der().unwrap(), der);

            let mut data = Data::new(name("/pub"), b"abc".to_vec());
            data.sign(&key).unwrap();
            public.verify(&data, &data.signature_value).unwrap();
        }
    }

    #[test]
    fn test_public_key_garbage() {
        assert!(PublicKey::from_der(&[0x30, 0x03, 0x01, 0x02]).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = Key::generate_hmac(name("/keys/secret"));
        let shown = format!("{:?}", key);
        assert!(shown.contains("/keys/secret"));
        assert!(!shown.contains("secret:"));
    }

    #[test]
    fn test_digest_key_is_not_a_key() {
        assert!(matches!(
            Key::from_private_bytes(SignatureType::DigestSha256, name("/k"), &[]),
            Err(SignatureError::UnsupportedKey(_))
        ));
    }
}
