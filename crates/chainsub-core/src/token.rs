//! Authentication token capability.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::TokenError;

/// Supplies the token a transport authenticates with.
///
/// `refresh_token` is called by the transport when a live token expires;
/// `fetch_new_token` by the controller when no token is held yet.
#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    /// The token currently held, if any.
    fn get_token(&self) -> Option<String>;

    /// Obtain a fresh subscription token for `subscription_id`.
    async fn fetch_new_token(&self, subscription_id: &str) -> Result<String, TokenError>;

    /// Replace an expired token.
    async fn refresh_token(&self) -> Result<String, TokenError>;

    fn set_token(&self, token: String);
}

/// A provider with a fixed token, for services that hand out long-lived
/// tokens out of band (and for tests).
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    current: Mutex<Option<String>>,
    issued: Option<String>,
}

impl StaticTokenProvider {
    /// Start holding `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(Some(token.into())),
            issued: None,
        }
    }

    /// Start empty; `fetch_new_token` hands out `token`.
    pub fn issuing(token: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(None),
            issued: Some(token.into()),
        }
    }

    fn current(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    fn get_token(&self) -> Option<String> {
        self.current().clone().filter(|t| !t.is_empty())
    }

    async fn fetch_new_token(&self, subscription_id: &str) -> Result<String, TokenError> {
        self.issued
            .clone()
            .ok_or_else(|| TokenError::Fetch(format!("no token issued for {subscription_id}")))
    }

    async fn refresh_token(&self) -> Result<String, TokenError> {
        self.get_token().ok_or(TokenError::Empty)
    }

    fn set_token(&self, token: String) {
        *self.current() = Some(token);
    }
}
