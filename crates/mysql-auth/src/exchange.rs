//! The authentication exchange as a state machine.
//!
//! [`AuthExchange`] holds no socket. The connection feeds it what the
//! server sends after the handshake response (auth switch requests and
//! `0x01` extra-data packets) and writes out whatever it returns. The final
//! OK or ERR packet is handled by the caller.

use std::sync::Arc;

use bytes::Bytes;
use rsa::RsaPublicKey;

use crate::credentials::Credentials;
use crate::error::AuthError;
use crate::plugin::{AuthPlugin, cleartext, scramble_caching_sha2, scramble_native, trim_seed};
use crate::public_key::{RsaKeyCache, encrypt_password, parse_public_key};

/// `caching_sha2_password` status: the scramble matched the server cache.
pub const FAST_AUTH_SUCCESS: u8 = 0x03;
/// `caching_sha2_password` status: full authentication is required.
pub const PERFORM_FULL_AUTH: u8 = 0x04;
/// `caching_sha2_password` request for the server public key.
pub const REQUEST_PUBLIC_KEY: u8 = 0x02;
/// `sha256_password` request for the server public key.
pub const SHA256_REQUEST_PUBLIC_KEY: u8 = 0x01;

/// What the connection should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStep {
    /// Send this payload, then read the next server packet.
    Send(Bytes),
    /// Send nothing and read the next server packet, expected to be OK.
    Wait,
}

/// Connection facts that shape the exchange.
#[derive(Debug, Clone, Default)]
pub struct AuthOptions {
    /// Whether the channel is TLS or a Unix socket.
    pub secure: bool,
    /// Server public key configured by the user, in PEM.
    pub server_public_key: Option<String>,
    /// Shared cache of parsed keys, configured and fetched alike.
    pub key_cache: Option<Arc<RsaKeyCache>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Started,
    AwaitingPublicKey,
    FullAuthSent,
}

/// One authentication exchange.
#[derive(Debug)]
pub struct AuthExchange {
    credentials: Credentials,
    options: AuthOptions,
    plugin: AuthPlugin,
    seed: Bytes,
    stage: Stage,
}

impl AuthExchange {
    /// Start an exchange for the plugin and seed announced in the handshake.
    pub fn new(
        credentials: Credentials,
        plugin: AuthPlugin,
        seed: Bytes,
        options: AuthOptions,
    ) -> Self {
        Self {
            credentials,
            options,
            plugin,
            seed,
            stage: Stage::Started,
        }
    }

    /// Plugin currently in use.
    #[must_use]
    pub fn plugin(&self) -> AuthPlugin {
        self.plugin
    }

    /// Mark the channel as secure, after a TLS upgrade.
    pub fn set_secure(&mut self, secure: bool) {
        self.options.secure = secure;
    }

    /// Auth response for the current plugin and seed.
    pub fn initial_response(&mut self) -> Result<Bytes, AuthError> {
        self.stage = Stage::Started;
        let password = self.credentials.password();
        let out = match self.plugin {
            AuthPlugin::NativePassword => scramble_native(password, &self.seed),
            AuthPlugin::CachingSha2Password => scramble_caching_sha2(password, &self.seed),
            AuthPlugin::ClearPassword => {
                if !self.options.secure {
                    tracing::warn!("sending mysql_clear_password over an insecure channel");
                }
                cleartext(password)
            }
            AuthPlugin::Sha256Password => {
                if password.is_empty() {
                    vec![0]
                } else if self.options.secure {
                    cleartext(password)
                } else if let Some(key) = self.known_key()? {
                    self.stage = Stage::FullAuthSent;
                    self.encrypt(&key)?
                } else {
                    self.stage = Stage::AwaitingPublicKey;
                    vec![SHA256_REQUEST_PUBLIC_KEY]
                }
            }
        };
        Ok(Bytes::from(out))
    }

    /// Handle an auth switch request: adopt the new plugin and seed and
    /// return the response to send.
    pub fn switch_plugin(&mut self, plugin_name: &str, data: &[u8]) -> Result<Bytes, AuthError> {
        let plugin = AuthPlugin::from_name(plugin_name)?;
        tracing::debug!(from = %self.plugin, to = %plugin, "auth plugin switch");
        self.plugin = plugin;
        self.seed = Bytes::copy_from_slice(trim_seed(data));
        self.initial_response()
    }

    /// Handle an `0x01` extra-data packet (payload without the header).
    pub fn more_data(&mut self, data: &[u8]) -> Result<AuthStep, AuthError> {
        match (self.plugin, self.stage) {
            (AuthPlugin::CachingSha2Password, Stage::Started) => match data.first() {
                Some(&FAST_AUTH_SUCCESS) => {
                    tracing::debug!("caching_sha2_password fast auth succeeded");
                    Ok(AuthStep::Wait)
                }
                Some(&PERFORM_FULL_AUTH) => self.full_auth(),
                _ => Err(self.unexpected(data)),
            },
            (
                AuthPlugin::CachingSha2Password | AuthPlugin::Sha256Password,
                Stage::AwaitingPublicKey,
            ) => {
                let pem = std::str::from_utf8(data)
                    .map_err(|e| AuthError::InvalidPublicKey(e.to_string()))?;
                let key = self.public_key(pem)?;
                self.stage = Stage::FullAuthSent;
                Ok(AuthStep::Send(Bytes::from(self.encrypt(&key)?)))
            }
            _ => Err(self.unexpected(data)),
        }
    }

    fn full_auth(&mut self) -> Result<AuthStep, AuthError> {
        tracing::debug!(secure = self.options.secure, "caching_sha2_password full auth");
        if self.options.secure {
            self.stage = Stage::FullAuthSent;
            return Ok(AuthStep::Send(Bytes::from(cleartext(
                self.credentials.password(),
            ))));
        }
        if let Some(key) = self.known_key()? {
            self.stage = Stage::FullAuthSent;
            return Ok(AuthStep::Send(Bytes::from(self.encrypt(&key)?)));
        }
        self.stage = Stage::AwaitingPublicKey;
        Ok(AuthStep::Send(Bytes::from_static(&[REQUEST_PUBLIC_KEY])))
    }

    /// The configured key, if any. Without one the key is fetched from the
    /// server on every full authentication.
    fn known_key(&self) -> Result<Option<Arc<RsaPublicKey>>, AuthError> {
        self.options
            .server_public_key
            .as_deref()
            .map(|pem| self.public_key(pem))
            .transpose()
    }

    fn public_key(&self, pem: &str) -> Result<Arc<RsaPublicKey>, AuthError> {
        match &self.options.key_cache {
            Some(cache) => cache.get_or_parse(pem),
            None => parse_public_key(pem).map(Arc::new),
        }
    }

    fn encrypt(&self, key: &RsaPublicKey) -> Result<Vec<u8>, AuthError> {
        encrypt_password(self.credentials.password(), &self.seed, key)
    }

    fn unexpected(&self, data: &[u8]) -> AuthError {
        AuthError::UnexpectedData {
            plugin: self.plugin.name(),
            reason: format!(
                "{} bytes starting with {:?} in stage {:?}",
                data.len(),
                data.first(),
                self.stage
            ),
        }
    }
}
