use super::{DEFAULT_TOKEN_TTL, MIN_TOKEN_SECRET_LENGTH};
use crate::error::{ConfigError, Error};
use serde::Deserialize;
use std::fmt::{self, Debug};
use std::time::Duration;

#[derive(Clone, Deserialize)]
pub struct IdentityConfig {
    /// Key used to sign bearer tokens
    pub token_secret: String,

    /// Token lifetime in seconds
    #[serde(default = "IdentityConfig::default_token_ttl")]
    pub token_ttl: u64,

    /// Admin account created at startup if it does not exist yet
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl IdentityConfig {
    pub const fn default_token_ttl() -> u64 {
        DEFAULT_TOKEN_TTL
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.token_secret.len() < MIN_TOKEN_SECRET_LENGTH {
            return Err(ConfigError::TokenSecretTooShort {
                min: MIN_TOKEN_SECRET_LENGTH,
            }
            .into());
        }
        Ok(())
    }

    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }
}

///
/// Secrets are NEVER displayed
///
impl Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("token_secret", &"********")
            .field("token_ttl", &self.token_ttl)
            .field("admin_email", &self.admin_email)
            .field("admin_password", &self.admin_password.as_ref().map(|_| "********"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_config(secret: &str) -> IdentityConfig {
        IdentityConfig {
            token_secret: secret.to_string(),
            token_ttl: IdentityConfig::default_token_ttl(),
            admin_email: Some("admin@example.com".to_string()),
            admin_password: Some("hunter22".to_string()),
        }
    }

    #[test]
    fn short_secrets_are_rejected() {
        assert!(identity_config("short").validate().is_err());
        assert!(identity_config(&"x".repeat(MIN_TOKEN_SECRET_LENGTH))
            .validate()
            .is_ok());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let output = format!("{:?}", identity_config("a-very-secret-signing-key-0123456789"));
        assert!(!output.contains("a-very-secret"));
        assert!(!output.contains("hunter22"));
        assert!(output.contains("admin@example.com"));
    }
}
