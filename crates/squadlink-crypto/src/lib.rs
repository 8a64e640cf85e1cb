//! Squadlink Crypto -- squad password hashing, auth nonces, challenge sealing.
//!
//! - Passwords: scrypt, PHC string format, per-hash random salt
//! - Nonces: 32 alphanumeric characters from the thread RNG
//! - Challenges: RSA PKCS#1 v1.5 to the peer's registered public key

use rand::{Rng, RngCore};
use scrypt::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use scrypt::Scrypt;

pub mod sealer;

pub use sealer::{decode_sealed, ChallengeSealer, RsaSealer};

/// Default scrypt cost: N=16384, r=8, p=1
pub const DEFAULT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const SALT_LENGTH: usize = 16;
const NONCE_LENGTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("password hashing failed: {0}")]
    HashFailed(String),
    #[error("malformed password hash: {0}")]
    MalformedHash(String),
    #[error("invalid public key: {0}")]
    InvalidKey(String),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),
}

/// Cost settings for squad password hashes.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasherConfig {
    pub log_n: u8,
}

impl Default for PasswordHasherConfig {
    fn default() -> Self {
        Self {
            log_n: DEFAULT_LOG_N,
        }
    }
}

impl PasswordHasherConfig {
    /// Salted one-way hash of `password`, as a PHC string.
    pub fn hash(&self, password: &str) -> Result<String, CryptoError> {
        let params = scrypt::Params::new(self.log_n, SCRYPT_R, SCRYPT_P, scrypt::Params::RECOMMENDED_LEN)
            .map_err(|e| CryptoError::HashFailed(e.to_string()))?;

        let mut salt_bytes = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| CryptoError::HashFailed(e.to_string()))?;

        let hash = Scrypt
            .hash_password_customized(password.as_bytes(), None, None, params, &salt)
            .map_err(|e| CryptoError::HashFailed(e.to_string()))?;
        Ok(hash.to_string())
    }
}

/// Check `password` against a PHC hash. Cost is read from the hash itself.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, CryptoError> {
    let parsed = PasswordHash::new(hash).map_err(|e| CryptoError::MalformedHash(e.to_string()))?;
    Ok(Scrypt.verify_password(password.as_bytes(), &parsed).is_ok())
}

/// Fresh random challenge nonce.
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}
