//! Alibaba Cloud resource provider
//!
//! Reconciles declarative resource configs (load balancers, listeners, ECS
//! instances, log service objects, Function Compute services) against the
//! Alibaba Cloud API. The host drives [`Provider`] with JSON documents.

pub mod aliyun;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod resource;
pub mod service;
pub mod wait;

pub use config::ProviderConfig;
pub use error::{ApiError, ProviderError, Result};
pub use logging::{setup_logging, LogLevel};
pub use provider::Provider;
pub use resource::{Resource, State};
