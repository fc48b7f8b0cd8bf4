//! Client configuration

use crate::error::{RaveError, RaveResult};
use crate::requery::RequeryPolicy;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Rave API host. Staging and live share it; the key pair decides the mode.
pub const RAVE_API_URL: &str = "https://api.flutterwave.com";

/// Gateway environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Test keys
    #[default]
    Staging,
    /// Live keys
    Live,
}

impl Environment {
    /// Parse from string. Unknown values fall back to staging.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "live" | "production" => Self::Live,
            _ => Self::Staging,
        }
    }

    /// API base URL for this environment
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Staging => RAVE_API_URL,
            Self::Live => RAVE_API_URL,
        }
    }
}

/// Rave client configuration
///
/// Deserializes from config files. Keys are never serialized back out.
#[derive(Debug, Serialize, Deserialize)]
pub struct RaveConfig {
    /// Public key (`FLWPUBK-...`)
    #[serde(default)]
    pub public_key: String,
    /// Secret key (`FLWSECK-...`), sent as the bearer token
    #[serde(skip_serializing)]
    pub secret_key: SecretString,
    /// 3DES key for card payloads. Derived from the secret key when unset.
    #[serde(default, skip_serializing)]
    pub encryption_key: Option<SecretString>,
    /// Gateway environment
    #[serde(default)]
    pub environment: Environment,
    /// Base URL override (proxies, mock servers). A path prefix is kept.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Prefix for generated transaction references
    #[serde(default = "default_transaction_prefix")]
    pub transaction_prefix: String,
    /// Use the prefix itself as the transaction reference
    #[serde(default)]
    pub override_reference: bool,
    /// Per-request HTTP timeout
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    /// Requery retry policy
    #[serde(default)]
    pub requery: RequeryPolicy,
}

fn default_transaction_prefix() -> String {
    "RV".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl RaveConfig {
    /// Create a configuration with defaults for everything but the secret key
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            public_key: String::new(),
            secret_key: SecretString::new(secret_key.into().into()),
            encryption_key: None,
            environment: Environment::default(),
            base_url: None,
            transaction_prefix: default_transaction_prefix(),
            override_reference: false,
            timeout: default_timeout(),
            requery: RequeryPolicy::default(),
        }
    }

    /// Load `SECRET_KEY`, `PUBLIC_KEY`, `ENV` and `ENCRYPTION_KEY` from the environment.
    pub fn from_env() -> RaveResult<Self> {
        let secret_key = env::var("SECRET_KEY")
            .map_err(|_| RaveError::Config("SECRET_KEY is not set".to_string()))?;

        let mut config = Self::new(secret_key);

        if let Ok(public_key) = env::var("PUBLIC_KEY") {
            config.public_key = public_key;
        }
        if let Ok(environment) = env::var("ENV") {
            config.environment = Environment::from_str(&environment);
        }
        if let Ok(key) = env::var("ENCRYPTION_KEY")
            && !key.is_empty()
        {
            config.encryption_key = Some(SecretString::new(key.into()));
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the public key
    pub fn with_public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = public_key.into();
        self
    }

    /// Set an explicit card encryption key
    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(SecretString::new(key.into().into()));
        self
    }

    /// Set the environment
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Point the client at another host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the reference prefix. With `override_reference` the prefix is used verbatim.
    pub fn with_transaction_prefix(mut self, prefix: impl Into<String>, override_reference: bool) -> Self {
        self.transaction_prefix = prefix.into();
        self.override_reference = override_reference;
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the requery policy
    pub fn with_requery(mut self, policy: RequeryPolicy) -> Self {
        self.requery = policy;
        self
    }

    /// Effective API base URL
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> RaveResult<()> {
        if self.secret_key.expose_secret().trim().is_empty() {
            return Err(RaveError::Config("secret key must not be empty".to_string()));
        }
        if self.requery.max_attempts == 0 {
            return Err(RaveError::Config(
                "requery max_attempts must be at least 1".to_string(),
            ));
        }
        url::Url::parse(self.base_url())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RaveConfig::new("FLWSECK_TEST-abc");
        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.transaction_prefix, "RV");
        assert!(!config.override_reference);
        assert_eq!(config.requery.max_attempts, 5);
        assert_eq!(config.requery.delay, Duration::from_secs(3));
        assert_eq!(config.base_url(), RAVE_API_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!(Environment::from_str("live"), Environment::Live);
        assert_eq!(Environment::from_str("LIVE"), Environment::Live);
        assert_eq!(Environment::from_str("staging"), Environment::Staging);
        assert_eq!(Environment::from_str("whatever"), Environment::Staging);
    }

    #[test]
    fn test_secret_not_in_debug() {
        let config = RaveConfig::new("FLWSECK-supersecret").with_encryption_key("enc-key-123");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("supersecret"));
        assert!(!debug.contains("enc-key-123"));
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let config: RaveConfig = serde_json::from_value(serde_json::json!({
            "secret_key": "FLWSECK_TEST-abc",
            "environment": "live"
        }))
        .unwrap();

        assert_eq!(config.secret_key.expose_secret(), "FLWSECK_TEST-abc");
        assert!(config.encryption_key.is_none());
        assert_eq!(config.environment, Environment::Live);
        assert_eq!(config.transaction_prefix, "RV");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.requery, RequeryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialize_round_trip_without_keys() {
        let config = RaveConfig::new("FLWSECK-supersecret")
            .with_public_key("FLWPUBK-abc")
            .with_encryption_key("enc-key-123")
            .with_base_url("https://proxy.example/rave")
            .with_transaction_prefix("MC", true)
            .with_requery(RequeryPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(500),
            });

        let mut value = serde_json::to_value(&config).unwrap();
        let text = value.to_string();
        assert!(!text.contains("supersecret"));
        assert!(!text.contains("enc-key-123"));
        assert!(value.get("secret_key").is_none());

        value["secret_key"] = serde_json::json!("FLWSECK-supersecret");
        let restored: RaveConfig = serde_json::from_value(value).unwrap();

        assert_eq!(restored.secret_key.expose_secret(), "FLWSECK-supersecret");
        assert!(restored.encryption_key.is_none());
        assert_eq!(restored.public_key, "FLWPUBK-abc");
        assert_eq!(restored.base_url(), "https://proxy.example/rave");
        assert_eq!(restored.transaction_prefix, "MC");
        assert!(restored.override_reference);
        assert_eq!(restored.requery, config.requery);
        assert_eq!(restored.timeout, config.timeout);
    }

    #[test]
    fn test_deserialize_requires_secret_key() {
        let result: Result<RaveConfig, _> =
            serde_json::from_value(serde_json::json!({"public_key": "FLWPUBK-abc"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        assert!(matches!(
            RaveConfig::new("  ").validate(),
            Err(RaveError::Config(_))
        ));

        let config = RaveConfig::new("FLWSECK-abc").with_requery(RequeryPolicy {
            max_attempts: 0,
            ..Default::default()
        });
        assert!(config.validate().is_err());

        let config = RaveConfig::new("FLWSECK-abc").with_base_url("not a url");
        assert!(config.validate().is_err());
    }
}
