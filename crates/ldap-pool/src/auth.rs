//! Bind identity and credential resolution.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use ldap_tls::Endpoint;
use parking_lot::Mutex;

use crate::connection::{BoundConnection, Connector};
use crate::error::DirectoryError;

/// Default prompt under which the directory bind password is stored.
pub const DEFAULT_PASSWORD_PROMPT: &str = "LDAP Authentication";

/// Fallback password-store key consulted when the configured prompt is
/// absent from the store.
pub const FALLBACK_PROMPT_KEY: &str = "internaldb";

/// How the pool authenticates to the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    /// Simple bind with DN and password.
    BasicAuth,
    /// Mutual-TLS client certificate authentication.
    SslClientAuth,
}

impl FromStr for AuthType {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BasicAuth" => Ok(Self::BasicAuth),
            "SSLClientAuth" => Ok(Self::SslClientAuth),
            other => Err(DirectoryError::Configuration(format!(
                "unrecognized authType: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BasicAuth => f.write_str("BasicAuth"),
            Self::SslClientAuth => f.write_str("SSLClientAuth"),
        }
    }
}

/// External password store consulted when no explicit password is
/// configured.
pub trait PasswordStore: Send + Sync {
    /// Look up the secret stored under `prompt`, if any.
    fn get(&self, prompt: &str) -> Option<String>;
}

/// Prompt-keyed credential cache.
///
/// Cloneable handle over shared state, so several [`AuthenticationInfo`]
/// instances resolving the same prompt can be given one cache explicitly.
/// There is no process-wide static behind this.
#[derive(Clone, Default)]
pub struct PasswordCache {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl PasswordCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, prompt: &str) -> Option<String> {
        self.inner.lock().get(prompt).cloned()
    }

    fn put(&self, prompt: &str, password: &str) {
        self.inner
            .lock()
            .insert(prompt.to_string(), password.to_string());
    }
}

impl std::fmt::Debug for PasswordCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCache")
            .field("entries", &self.inner.lock().len())
            .finish()
    }
}

/// Resolves the identity and credentials the pool binds with.
pub struct AuthenticationInfo {
    auth_type: AuthType,
    bind_dn: Option<String>,
    password: Option<String>,
    prompt: String,
    client_cert_nickname: Option<String>,
    store: Option<Arc<dyn PasswordStore>>,
    cache: PasswordCache,
    // Verification binds reuse one live connection between calls; reset()
    // drops it.
    verify_conn: tokio::sync::Mutex<Option<BoundConnection>>,
}

impl AuthenticationInfo {
    /// Password-bind identity.
    pub fn basic(bind_dn: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::BasicAuth,
            bind_dn: Some(bind_dn.into()),
            password: None,
            prompt: DEFAULT_PASSWORD_PROMPT.to_string(),
            client_cert_nickname: None,
            store: None,
            cache: PasswordCache::new(),
            verify_conn: tokio::sync::Mutex::new(None),
        }
    }

    /// Client-certificate identity.
    pub fn ssl_client(nickname: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::SslClientAuth,
            bind_dn: None,
            password: None,
            prompt: DEFAULT_PASSWORD_PROMPT.to_string(),
            client_cert_nickname: Some(nickname.into()),
            store: None,
            cache: PasswordCache::new(),
            verify_conn: tokio::sync::Mutex::new(None),
        }
    }

    /// Build from configuration strings.
    ///
    /// An unrecognized `auth_type` is a fatal configuration error; no
    /// network call is attempted.
    pub fn from_config(
        auth_type: &str,
        bind_dn: Option<&str>,
        client_cert_nickname: Option<&str>,
    ) -> Result<Self, DirectoryError> {
        match AuthType::from_str(auth_type)? {
            AuthType::BasicAuth => {
                let dn = bind_dn.ok_or_else(|| {
                    DirectoryError::Configuration("BasicAuth requires a bind DN".into())
                })?;
                Ok(Self::basic(dn))
            }
            AuthType::SslClientAuth => {
                let nickname = client_cert_nickname.ok_or_else(|| {
                    DirectoryError::Configuration(
                        "SSLClientAuth requires a client certificate nickname".into(),
                    )
                })?;
                Ok(Self::ssl_client(nickname))
            }
        }
    }

    /// Set an explicit bind password, short-circuiting the resolution chain.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the prompt used for password-store lookups and cache keys.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Attach an external password store.
    #[must_use]
    pub fn with_password_store(mut self, store: Arc<dyn PasswordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a shared credential cache instead of a private one.
    #[must_use]
    pub fn with_cache(mut self, cache: PasswordCache) -> Self {
        self.cache = cache;
        self
    }

    /// The configured authentication mode.
    #[must_use]
    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    /// Configured bind DN (BasicAuth only).
    #[must_use]
    pub fn bind_dn(&self) -> Option<&str> {
        self.bind_dn.as_deref()
    }

    /// Configured client certificate nickname (SSLClientAuth only).
    #[must_use]
    pub fn client_cert_nickname(&self) -> Option<&str> {
        self.client_cert_nickname.as_deref()
    }

    /// The configured password prompt.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Resolve the bind password for `prompt`.
    ///
    /// Resolution order: explicit configured password, then the shared
    /// cache, then the external password store under `prompt` with a
    /// fallback to [`FALLBACK_PROMPT_KEY`]. A store value is cached under
    /// `prompt` only when it is non-empty and passes verification; the
    /// value is returned to the caller whether or not verification
    /// succeeded.
    ///
    /// Verification is skipped entirely against a TLS endpoint. Otherwise
    /// it attempts a real bind through `connector`: a credential rejection
    /// skips caching, while a bind that fails with some other protocol
    /// error is counted as unverifiable-but-good and cached anyway. This
    /// lenient policy is deliberate and matches the deployed behavior the
    /// surrounding server depends on.
    pub async fn resolve_password(
        &self,
        prompt: &str,
        endpoint: &Endpoint,
        connector: &Connector,
    ) -> Result<String, DirectoryError> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }
        if let Some(password) = self.cache.get(prompt) {
            tracing::trace!(prompt, "bind password served from cache");
            return Ok(password);
        }

        let store = self.store.as_ref().ok_or_else(|| {
            DirectoryError::Authentication(format!("no password available for prompt {prompt:?}"))
        })?;
        let password = store
            .get(prompt)
            .or_else(|| store.get(FALLBACK_PROMPT_KEY))
            .ok_or_else(|| {
                DirectoryError::Authentication(format!(
                    "password store has no entry for prompt {prompt:?}"
                ))
            })?;

        if !password.is_empty() && self.verify(endpoint, connector, &password).await {
            self.cache.put(prompt, &password);
        }
        Ok(password)
    }

    /// Check a candidate password with a real bind. Returns whether the
    /// candidate should be cached.
    async fn verify(&self, endpoint: &Endpoint, connector: &Connector, candidate: &str) -> bool {
        if endpoint.secure() {
            // The transport already authenticated the server; the deployed
            // behavior is to trust the stored value without a check bind.
            return true;
        }
        let Some(dn) = self.bind_dn() else {
            return true;
        };
        match connector.try_bind(endpoint, dn, candidate).await {
            Ok(conn) => {
                let mut guard = self.verify_conn.lock().await;
                if let Some(mut old) = guard.replace(conn) {
                    old.close();
                }
                true
            }
            Err(DirectoryError::Authentication(reason)) => {
                tracing::debug!(%reason, "verification bind rejected candidate password");
                false
            }
            Err(DirectoryError::Protocol(reason)) => {
                tracing::debug!(%reason, "verification bind unverifiable, caching candidate anyway");
                true
            }
            Err(err) => {
                tracing::debug!(error = %err, "could not verify candidate password");
                false
            }
        }
    }

    /// Drop the internally-held verification connection.
    pub async fn reset(&self) {
        if let Some(mut conn) = self.verify_conn.lock().await.take() {
            conn.close();
        }
    }
}

impl std::fmt::Debug for AuthenticationInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationInfo")
            .field("auth_type", &self.auth_type)
            .field("bind_dn", &self.bind_dn)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("prompt", &self.prompt)
            .field("client_cert_nickname", &self.client_cert_nickname)
            .finish_non_exhaustive()
    }
}
