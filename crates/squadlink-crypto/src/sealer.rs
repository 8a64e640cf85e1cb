//! Challenge sealing -- encrypt an auth nonce to a peer's public key.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};

use crate::CryptoError;

/// Encrypts a challenge so only the holder of the matching private key can
/// read it. Output is base64 so it fits the string-only payload.
pub trait ChallengeSealer: Send + Sync {
    fn seal(&self, public_key_pem: &str, nonce: &str) -> Result<String, CryptoError>;
}

/// RSA PKCS#1 v1.5. Accepts `RSA PUBLIC KEY` (PKCS#1) or `PUBLIC KEY` (SPKI) PEM.
#[derive(Debug, Default, Clone, Copy)]
pub struct RsaSealer;

impl RsaSealer {
    fn parse_key(pem: &str) -> Result<RsaPublicKey, CryptoError> {
        let pem = pem.trim();
        RsaPublicKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPublicKey::from_public_key_pem(pem))
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}

impl ChallengeSealer for RsaSealer {
    fn seal(&self, public_key_pem: &str, nonce: &str) -> Result<String, CryptoError> {
        let key = Self::parse_key(public_key_pem)?;
        let sealed = key
            .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, nonce.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        Ok(BASE64.encode(sealed))
    }
}

/// Decode a sealed challenge back to raw ciphertext bytes.
pub fn decode_sealed(sealed: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(BASE64.decode(sealed)?)
}
