//! Session authentication
//!
//! Holds the user's credentials and the session token issued by
//! `POST /api/session`. The token is cached and cleared on logout or when
//! the endpoint rejects it.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Header carrying the session token on every request
pub const SESSION_HEADER: &str = "vmware-api-session-id";

/// Environment variable consulted before prompting for a password
pub const PASSWORD_ENV: &str = "VMCTL_PASSWORD";

/// User name and password for basic-auth session login
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: &str, password: &str) -> Self {
        Self {
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

// Never print the password
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone)]
struct CachedSession {
    token: String,
    created_at: Instant,
}

/// Shared session token cache
#[derive(Clone, Default)]
pub struct SessionToken {
    cache: Arc<RwLock<Option<CachedSession>>>,
}

impl SessionToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token, if logged in
    pub async fn get(&self) -> Option<String> {
        let cache = self.cache.read().await;
        cache.as_ref().map(|s| s.token.clone())
    }

    pub async fn set(&self, token: String) {
        let mut cache = self.cache.write().await;
        *cache = Some(CachedSession {
            token,
            created_at: Instant::now(),
        });
        tracing::debug!("Session token cached");
    }

    /// Drop the cached token, returning how long the session lived
    pub async fn clear(&self) -> Option<std::time::Duration> {
        let mut cache = self.cache.write().await;
        cache.take().map(|s| s.created_at.elapsed())
    }
}

/// Validate an endpoint host name or address.
///
/// Accepts DNS names and IP literals, optionally with a port. Rejects
/// anything carrying a path, credentials, or whitespace.
pub fn validate_host(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }

    host.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']' | '_'))
}
