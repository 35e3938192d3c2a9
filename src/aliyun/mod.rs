//! Alibaba Cloud API Module
//!
//! Signing, credentials and the shared HTTP client.

pub mod client;
pub mod credentials;
pub mod http;
pub mod signature;

pub use client::AliyunClient;
pub use credentials::Credentials;
pub use http::{RestRequest, RpcRequest};
