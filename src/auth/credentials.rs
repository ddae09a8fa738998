use serde::Deserialize;
use std::fmt;

/// Long-lived application credentials issued by the service console
#[derive(Clone, Deserialize)]
pub struct Credentials {
    /// Application identifier, sent in every frame header
    pub app_id: String,
    /// Public api key, embedded in the authorization string
    pub api_key: String,
    /// Secret used as the HMAC key
    pub api_secret: String,
}

impl Credentials {
    pub fn new(
        app_id: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

// Key and secret must never reach the logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}
