//! Authentication plugins and their password scrambles.
//!
//! # mysql_native_password
//!
//! ```text
//! SHA1(password) XOR SHA1(seed + SHA1(SHA1(password)))
//! ```
//!
//! # caching_sha2_password
//!
//! ```text
//! SHA256(password) XOR SHA256(SHA256(SHA256(password)) + seed)
//! ```
//!
//! A cache miss on the server side falls back to full authentication,
//! which needs a secure channel or RSA (see [`crate::public_key`]).

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Length of the scramble the server sends.
pub const SEED_LEN: usize = 20;

/// Authentication plugins supported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthPlugin {
    /// SHA-1 challenge-response (MySQL 5.x default).
    NativePassword,
    /// SHA-256 challenge-response with server-side cache (MySQL 8 default).
    CachingSha2Password,
    /// Password sent over TLS or RSA-encrypted.
    Sha256Password,
    /// Password sent as-is. Only safe over TLS or a local socket.
    ClearPassword,
}

impl AuthPlugin {
    /// Look up a plugin by the name the server uses.
    pub fn from_name(name: &str) -> Result<Self, AuthError> {
        match name {
            "mysql_native_password" => Ok(Self::NativePassword),
            "caching_sha2_password" => Ok(Self::CachingSha2Password),
            "sha256_password" => Ok(Self::Sha256Password),
            "mysql_clear_password" => Ok(Self::ClearPassword),
            other => Err(AuthError::UnsupportedPlugin(other.to_string())),
        }
    }

    /// Name used on the wire.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NativePassword => "mysql_native_password",
            Self::CachingSha2Password => "caching_sha2_password",
            Self::Sha256Password => "sha256_password",
            Self::ClearPassword => "mysql_clear_password",
        }
    }

    /// Whether the plugin can send the password in clear text, which
    /// requires a secure channel.
    #[must_use]
    pub const fn sends_cleartext(self) -> bool {
        matches!(self, Self::ClearPassword)
    }
}

impl std::fmt::Display for AuthPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Strip the trailing NUL some servers append to the scramble.
#[must_use]
pub fn trim_seed(seed: &[u8]) -> &[u8] {
    match seed.split_last() {
        Some((0, rest)) => rest,
        _ => seed,
    }
}

/// `mysql_native_password` response. Empty for an empty password.
#[must_use]
pub fn scramble_native(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let seed = &seed[..seed.len().min(SEED_LEN)];

    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);
    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(stage2);
    let stage3 = hasher.finalize();

    xor(&stage1, &stage3)
}

/// `caching_sha2_password` fast-auth response. Empty for an empty password.
#[must_use]
pub fn scramble_caching_sha2(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let seed = trim_seed(seed);

    let stage1 = Sha256::digest(password.as_bytes());
    let stage2 = Sha256::digest(stage1);
    let mut hasher = Sha256::new();
    hasher.update(stage2);
    hasher.update(seed);
    let stage3 = hasher.finalize();

    xor(&stage1, &stage3)
}

/// NUL-terminated clear-text password.
#[must_use]
pub fn cleartext(password: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(password.len() + 1);
    out.extend_from_slice(password.as_bytes());
    out.push(0);
    out
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}
