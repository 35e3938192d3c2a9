//! Provider error types
//!
//! Remote failures are carried as [`ApiError`] (code, message, request id).
//! Handlers classify them by matching the code or message against the
//! per-service lists in [`codes`].

use std::fmt;
use thiserror::Error;

/// Error codes returned by the remote services that handlers match on.
pub mod codes {
    // SLB
    pub const LOAD_BALANCER_NOT_FOUND: &str = "InvalidLoadBalancerId.NotFound";
    pub const LISTENER_NOT_FOUND: &str = "The specified resource does not exist";
    pub const LISTENER_ALREADY_EXISTS: &str = "ListenerAlreadyExists";
    pub const SLB_ORDER_FAILED: &str = "OrderFailed";
    pub const SYSTEM_BUSY: &str = "SystemBusy";

    // ECS
    pub const INSTANCE_NOT_FOUND: &str = "InvalidInstanceId.NotFound";
    pub const INSTANCE_NOT_FOUND_LEGACY: &str = "Instance.Notfound";
    pub const SECURITY_GROUP_NOT_FOUND: &str = "InvalidSecurityGroupId.NotFound";

    // Log service
    pub const PROJECT_NOT_EXIST: &str = "ProjectNotExist";
    pub const LOG_STORE_NOT_EXIST: &str = "LogStoreNotExist";
    pub const INDEX_CONFIG_NOT_EXIST: &str = "IndexConfigNotExist";
    pub const CONFIG_NOT_EXIST: &str = "ConfigNotExist";
    pub const GROUP_NOT_EXIST: &str = "GroupNotExist";
    pub const MACHINE_GROUP_NOT_EXIST: &str = "MachineGroupNotExist";
    pub const CONSUMER_GROUP_NOT_EXIST: &str = "ConsumerGroupNotExist";
    pub const INTERNAL_SERVER_ERROR: &str = "InternalServerError";

    // Function Compute
    pub const SERVICE_NOT_FOUND: &str = "ServiceNotFound";
    pub const ACCESS_DENIED: &str = "AccessDenied";
    pub const DOES_NOT_EXIST: &str = "does not exist";
}

/// An error returned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Remote service that answered (e.g. "slb", "log")
    pub service: String,
    /// The API action or REST path that failed
    pub action: String,
    /// Error code, e.g. `InvalidLoadBalancerId.NotFound`
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
    /// HTTP status code
    pub status: u16,
}

impl ApiError {
    /// True when the code equals, or the message contains, any of `expected`.
    pub fn is_any(&self, expected: &[&str]) -> bool {
        expected
            .iter()
            .any(|e| self.code == *e || self.message.contains(e))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} failed [{}]: {} (HTTP {})",
            self.service, self.action, self.code, self.message, self.status
        )?;
        if let Some(ref id) = self.request_id {
            write!(f, " [RequestId: {}]", id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{kind} {id} is not found")]
    NotFound { kind: String, id: String },

    #[error("Timeout after {waited_secs}s waiting for {what}; last observed: {last}")]
    Timeout {
        what: String,
        last: String,
        waited_secs: u64,
    },

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Invalid resource id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error("Changing {fields:?} requires replacing the resource")]
    RequiresReplacement { fields: Vec<&'static str> },

    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("Provider configuration error: {0}")]
    Config(String),

    #[error("Unexpected response from {action}: {reason}")]
    Response { action: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_id(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidId {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn response(action: &str, reason: impl Into<String>) -> Self {
        Self::Response {
            action: action.to_string(),
            reason: reason.into(),
        }
    }

    /// True for [`ProviderError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True for [`ProviderError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when this is a remote error matching any of `expected`.
    pub fn is_api_error(&self, expected: &[&str]) -> bool {
        match self {
            Self::Api(e) => e.is_any(expected),
            _ => false,
        }
    }

    /// The remote error, if any.
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}
