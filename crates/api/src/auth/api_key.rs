//! API key generation and validation: HMAC-SHA256 signed, constant-time
//! verified. The raw key is never stored — only its SHA-256 hash.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const API_KEY_PREFIX: &str = "utk_";
const API_KEY_VERSION: &str = "01";

#[derive(Clone)]
pub struct ApiKeyManager {
    hmac_secret: Vec<u8>,
}

impl ApiKeyManager {
    pub fn new(secret: &str) -> Self {
        Self {
            hmac_secret: secret.as_bytes().to_vec(),
        }
    }

    /// Generate a new key. Returns `(full_key, key_hash, key_prefix)` —
    /// the full key is handed to the caller once and never stored.
    pub fn generate_key(&self) -> Result<(String, String, String), ApiKeyError> {
        let key_id = Uuid::new_v4();
        let mut random_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut random_bytes);
        let random_hex = hex::encode(random_bytes);

        let payload = format!("{API_KEY_VERSION}{}{random_hex}", key_id.simple());

        let mut mac = HmacSha256::new_from_slice(&self.hmac_secret)
            .map_err(|_| ApiKeyError::HmacInitFailed)?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();
        let sig_hex = hex::encode(&signature[..8]);

        let full_key = format!("{API_KEY_PREFIX}{payload}{sig_hex}");
        let key_hash = self.hash_key(&full_key);
        let key_prefix = Self::extract_prefix(&full_key);

        Ok((full_key, key_hash, key_prefix))
    }

    /// Verify a presented key's signature against this manager's secret.
    pub fn validate_key(&self, key: &str) -> Result<bool, ApiKeyError> {
        let Some(key_body) = key.strip_prefix(API_KEY_PREFIX) else {
            return Ok(false);
        };
        if key_body.len() != 82 {
            return Ok(false);
        }
        let (payload, signature) = key_body.split_at(66);

        let mut mac = HmacSha256::new_from_slice(&self.hmac_secret)
            .map_err(|_| ApiKeyError::HmacInitFailed)?;
        mac.update(payload.as_bytes());
        let expected = mac.finalize().into_bytes();
        let expected_hex = hex::encode(&expected[..8]);

        Ok(constant_time_compare(signature, &expected_hex))
    }

    pub fn hash_key(&self, key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn extract_prefix(key: &str) -> String {
        format!("{}...", &key[..(API_KEY_PREFIX.len() + 12).min(key.len())])
    }
}

/// Compares two strings in time independent of where they first differ.
/// Does a dummy comparison on length mismatch so a length leak can't be
/// used to shortcut the timing side-channel this exists to close.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        let _ = a.as_bytes().ct_eq(a.as_bytes());
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[derive(Debug, thiserror::Error)]
pub enum ApiKeyError {
    #[error("HMAC initialization failed")]
    HmacInitFailed,
}
