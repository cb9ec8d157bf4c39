use serde::{Deserialize, Serialize};
use std::fmt;

pub const EXCHANGE_ACCESS_KEY_VAR: &str = "EXCHANGE_ACCESS_KEY";
pub const EXCHANGE_SECRET_KEY_VAR: &str = "EXCHANGE_SECRET_KEY";
pub const MODEL_API_KEY_VAR: &str = "MODEL_API_KEY";

/// Session-scoped secrets. Only presence is checked here; whether they are
/// accepted is up to the agent.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub exchange_access_key: String,
    pub exchange_secret_key: String,
    pub model_api_key: String,
}

impl Credentials {
    #[cfg(test)]
    pub fn new(
        exchange_access_key: impl Into<String>,
        exchange_secret_key: impl Into<String>,
        model_api_key: impl Into<String>,
    ) -> Self {
        Self {
            exchange_access_key: exchange_access_key.into(),
            exchange_secret_key: exchange_secret_key.into(),
            model_api_key: model_api_key.into(),
        }
    }

    /// Reads the three keys from the process environment, loading `.env`
    /// first if one exists.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self {
            exchange_access_key: std::env::var(EXCHANGE_ACCESS_KEY_VAR).unwrap_or_default(),
            exchange_secret_key: std::env::var(EXCHANGE_SECRET_KEY_VAR).unwrap_or_default(),
            model_api_key: std::env::var(MODEL_API_KEY_VAR).unwrap_or_default(),
        }
    }

    pub fn has_exchange_keys(&self) -> bool {
        !self.exchange_access_key.trim().is_empty() && !self.exchange_secret_key.trim().is_empty()
    }

    pub fn has_model_key(&self) -> bool {
        !self.model_api_key.trim().is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.has_exchange_keys() && self.has_model_key()
    }

    /// Fills only the fields that are non-empty in `other`.
    pub fn merge(&mut self, other: Credentials) {
        if !other.exchange_access_key.is_empty() {
            self.exchange_access_key = other.exchange_access_key;
        }
        if !other.exchange_secret_key.is_empty() {
            self.exchange_secret_key = other.exchange_secret_key;
        }
        if !other.model_api_key.is_empty() {
            self.model_api_key = other.model_api_key;
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("exchange_access_key", &redact(&self.exchange_access_key))
            .field("exchange_secret_key", &redact(&self.exchange_secret_key))
            .field("model_api_key", &redact(&self.model_api_key))
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_checks() {
        let creds = Credentials::new("access", "secret", "sk-model");
        assert!(creds.is_complete());

        let no_secret = Credentials::new("access", "  ", "sk-model");
        assert!(!no_secret.has_exchange_keys());
        assert!(no_secret.has_model_key());
        assert!(!no_secret.is_complete());

        assert!(!Credentials::default().is_complete());
    }

    #[test]
    fn test_merge_keeps_existing() {
        let mut creds = Credentials::new("access", "secret", "");
        creds.merge(Credentials::new("", "", "sk-model"));
        assert_eq!(creds.exchange_access_key, "access");
        assert_eq!(creds.model_api_key, "sk-model");
    }

    #[test]
    fn test_debug_redacts() {
        let rendered = format!("{:?}", Credentials::new("access", "", "sk-model"));
        assert!(!rendered.contains("sk-model"));
        assert!(rendered.contains("<unset>"));
    }
}
