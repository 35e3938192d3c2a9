//! Alibaba Cloud Credentials
//!
//! Access key pair, optionally with an STS security token.

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use std::fmt;

/// Access key credentials used to sign every request
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    secret_key: String,
    pub security_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key: &str, secret_key: &str, security_token: Option<&str>) -> Self {
        Self {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            security_token: security_token.map(str::to_string),
        }
    }

    /// Build credentials from provider configuration
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let access_key = config
            .access_key
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ProviderError::Config(
                    "access key is not set. Set 'access_key' or ALICLOUD_ACCESS_KEY".to_string(),
                )
            })?;
        let secret_key = config
            .secret_key
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ProviderError::Config(
                    "secret key is not set. Set 'secret_key' or ALICLOUD_SECRET_KEY".to_string(),
                )
            })?;

        Ok(Self::new(
            access_key,
            secret_key,
            config.security_token.as_deref().filter(|v| !v.is_empty()),
        ))
    }

    pub(crate) fn secret_key(&self) -> &str {
        &self.secret_key
    }
}

// Security: never print the secret
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .field("security_token", &self.security_token.as_ref().map(|_| "***"))
            .finish()
    }
}
