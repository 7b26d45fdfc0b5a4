//! Credential providers consulted at handshake time.

use async_trait::async_trait;

use crate::error::TransportError;

/// Supplies the bearer token attached to each handshake.
///
/// Called once per connection attempt, so a provider that refreshes tokens
/// can hand out a fresh one on every reconnect.
#[async_trait]
pub trait CredentialProvider: Send + Sync + std::fmt::Debug {
    /// Returns the token to present, or `None` to connect anonymously.
    async fn bearer_token(&self) -> Result<Option<String>, TransportError>;
}

/// Connects without credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

#[async_trait]
impl CredentialProvider for NoCredentials {
    async fn bearer_token(&self) -> Result<Option<String>, TransportError> {
        Ok(None)
    }
}

/// A fixed token, for long-lived service credentials and tests.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Result<Option<String>, TransportError> {
        if self.0.is_empty() {
            return Err(TransportError::AuthenticationFailed(
                "empty bearer token".to_string(),
            ));
        }
        Ok(Some(self.0.clone()))
    }
}
