//! Resource abstraction layer
//!
//! Each managed resource type implements [`Resource`]: typed desired-state
//! arguments in, a [`State`] document out. The provider dispatches on
//! [`Resource::TYPE_NAME`] and converts JSON at the edge.
//!
//! # Architecture
//!
//! - [`id`] - Composite id parsing
//! - [`diff`] - Partial-update field diffing
//! - [`validation`] - Argument checks shared by the resource types
//! - one module per resource type

pub mod diff;
pub mod id;
pub mod validation;

pub mod fc_service;
pub mod instance;
pub mod log_config;
pub mod log_consumer_group;
pub mod log_machine_group_attachment;
pub mod log_store_index;
pub mod slb;
pub mod slb_listener;

use crate::aliyun::AliyunClient;
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use fc_service::FcService;
pub use instance::Instance;
pub use log_config::LogConfig;
pub use log_consumer_group::LogConsumerGroup;
pub use log_machine_group_attachment::LogMachineGroupAttachment;
pub use log_store_index::LogStoreIndex;
pub use slb::Slb;
pub use slb_listener::SlbListener;

/// Reconciled state: the id, the arguments as last seen remotely and the
/// computed attributes, flattened into one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State<C, A> {
    pub id: String,
    #[serde(flatten)]
    pub args: C,
    #[serde(flatten)]
    pub attributes: A,
}

impl<C, A> State<C, A> {
    pub fn new(id: impl Into<String>, args: C, attributes: A) -> Self {
        Self {
            id: id.into(),
            args,
            attributes,
        }
    }
}

/// Computed attributes for resources that have none
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoAttributes {}

pub type StateOf<R> = State<<R as Resource>::Args, <R as Resource>::Attributes>;

/// A managed resource type
#[async_trait]
pub trait Resource: Sized + Send + Sync + 'static {
    /// Resource type name, e.g. `alicloud_slb`
    const TYPE_NAME: &'static str;

    /// Desired-state arguments
    type Args: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + std::fmt::Debug;

    /// Computed attributes
    type Attributes: Serialize + DeserializeOwned + Clone + Default + Send + Sync + std::fmt::Debug;

    /// Local argument checks, run before any remote call
    fn validate(_args: &Self::Args) -> Result<()> {
        Ok(())
    }

    /// Fields whose change cannot be applied in place
    fn replacement_fields(_prior: &Self::Args, _desired: &Self::Args) -> Vec<&'static str> {
        Vec::new()
    }

    /// Copy arguments the remote API never returns (secrets, create-only
    /// inputs) from `known` into freshly read `args`
    fn carry_over(_known: &Self::Args, _args: &mut Self::Args) {}

    async fn create(client: &AliyunClient, args: &Self::Args) -> Result<StateOf<Self>>;

    /// `None` when the resource no longer exists
    async fn read(client: &AliyunClient, id: &str) -> Result<Option<StateOf<Self>>>;

    async fn update(
        client: &AliyunClient,
        prior: &StateOf<Self>,
        desired: &Self::Args,
    ) -> Result<StateOf<Self>>;

    async fn delete(client: &AliyunClient, id: &str) -> Result<()>;

    /// Adopt an existing remote resource by id
    async fn import(client: &AliyunClient, id: &str) -> Result<StateOf<Self>> {
        Self::read(client, id)
            .await?
            .ok_or_else(|| ProviderError::not_found(Self::TYPE_NAME, id))
    }
}

/// Read back after a write, keeping arguments the remote API does not return
pub async fn read_back<R: Resource>(
    client: &AliyunClient,
    id: &str,
    written: &R::Args,
) -> Result<StateOf<R>> {
    let mut state = R::read(client, id)
        .await?
        .ok_or_else(|| ProviderError::not_found(R::TYPE_NAME, id))?;
    R::carry_over(written, &mut state.args);
    Ok(state)
}
