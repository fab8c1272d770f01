//! RSA password exchange and the server public key cache.
//!
//! Without TLS, `sha256_password` and `caching_sha2_password` full
//! authentication send the password XOR-ed with the auth seed and encrypted
//! with the server's RSA public key using OAEP (SHA-1, MGF1-SHA-1).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;

use crate::error::AuthError;

/// Parse a PEM public key, in SubjectPublicKeyInfo or PKCS#1 form.
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, AuthError> {
    let pem = normalize_pem(pem);
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| AuthError::InvalidPublicKey(e.to_string()))
}

/// Servers send the key NUL-terminated; configured keys often end in a
/// newline.
fn normalize_pem(pem: &str) -> &str {
    pem.trim_end_matches(['\0', '\n', '\r', ' '])
}

/// Encrypt `password` for the server.
///
/// The NUL-terminated password is XOR-ed with the seed, repeated as needed,
/// before encryption.
pub fn encrypt_password(
    password: &str,
    seed: &[u8],
    key: &RsaPublicKey,
) -> Result<Vec<u8>, AuthError> {
    if seed.is_empty() {
        return Err(AuthError::EmptySeed);
    }
    let mut plain = Vec::with_capacity(password.len() + 1);
    plain.extend_from_slice(password.as_bytes());
    plain.push(0);
    for (byte, mask) in plain.iter_mut().zip(seed.iter().cycle()) {
        *byte ^= mask;
    }
    key.encrypt(&mut OsRng, Oaep::new::<Sha1>(), &plain)
        .map_err(|e| AuthError::Rsa(e.to_string()))
}

/// Parsed server public keys, keyed by their PEM text.
///
/// Each distinct PEM is parsed once; configured and fetched keys share the
/// same entries. A rotated server key has a different PEM and so gets its
/// own entry.
#[derive(Debug, Default)]
pub struct RsaKeyCache {
    keys: Mutex<HashMap<String, Arc<RsaPublicKey>>>,
    parses: AtomicUsize,
}

impl RsaKeyCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed key for `pem`, parsing it on first use.
    ///
    /// The lock is held across the parse so concurrent lookups of a new PEM
    /// parse it only once.
    pub fn get_or_parse(&self, pem: &str) -> Result<Arc<RsaPublicKey>, AuthError> {
        let pem = normalize_pem(pem);
        let mut keys = self.keys.lock();
        if let Some(key) = keys.get(pem) {
            return Ok(Arc::clone(key));
        }
        let key = Arc::new(parse_public_key(pem)?);
        self.parses.fetch_add(1, Ordering::Relaxed);
        keys.insert(pem.to_owned(), Arc::clone(&key));
        Ok(key)
    }

    /// Number of PEM parses performed so far.
    #[must_use]
    pub fn parses(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }

    /// Drop every cached key.
    pub fn clear(&self) {
        self.keys.lock().clear();
    }

    /// Number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}
