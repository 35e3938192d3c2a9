//! Provider entry points
//!
//! Maps resource type names to [`Resource`] implementations. Configs and
//! states cross this boundary as JSON documents; everything below it is
//! typed.

use crate::aliyun::AliyunClient;
use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::resource::{
    FcService, Instance, LogConfig, LogConsumerGroup, LogMachineGroupAttachment, LogStoreIndex,
    Resource, Slb, SlbListener, StateOf,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Every supported resource type name
pub const RESOURCE_TYPES: &[&str] = &[
    Slb::TYPE_NAME,
    SlbListener::TYPE_NAME,
    Instance::TYPE_NAME,
    LogConfig::TYPE_NAME,
    LogConsumerGroup::TYPE_NAME,
    LogMachineGroupAttachment::TYPE_NAME,
    LogStoreIndex::TYPE_NAME,
    FcService::TYPE_NAME,
];

/// Run `$op::<R>(args..)` for the resource type named `$type_name`
macro_rules! dispatch {
    ($type_name:expr, $op:ident ( $($arg:expr),* )) => {
        match $type_name {
            t if t == Slb::TYPE_NAME => $op::<Slb>($($arg),*).await,
            t if t == SlbListener::TYPE_NAME => $op::<SlbListener>($($arg),*).await,
            t if t == Instance::TYPE_NAME => $op::<Instance>($($arg),*).await,
            t if t == LogConfig::TYPE_NAME => $op::<LogConfig>($($arg),*).await,
            t if t == LogConsumerGroup::TYPE_NAME => $op::<LogConsumerGroup>($($arg),*).await,
            t if t == LogMachineGroupAttachment::TYPE_NAME => {
                $op::<LogMachineGroupAttachment>($($arg),*).await
            }
            t if t == LogStoreIndex::TYPE_NAME => $op::<LogStoreIndex>($($arg),*).await,
            t if t == FcService::TYPE_NAME => $op::<FcService>($($arg),*).await,
            other => Err(ProviderError::UnknownResourceType(other.to_string())),
        }
    };
}

pub struct Provider {
    client: AliyunClient,
}

impl Provider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self::from_client(AliyunClient::new(config)?))
    }

    /// Build from the config file and environment
    pub fn from_default_config() -> Result<Self> {
        let config =
            ProviderConfig::load().map_err(|e| ProviderError::Config(format!("{:#}", e)))?;
        Self::new(&config)
    }

    pub fn from_client(client: AliyunClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &AliyunClient {
        &self.client
    }

    pub fn resource_types() -> &'static [&'static str] {
        RESOURCE_TYPES
    }

    /// Create a resource from its config document and return its state document
    pub async fn create(&self, type_name: &str, config: Value) -> Result<Value> {
        tracing::info!("create {}", type_name);
        dispatch!(type_name, create_as(&self.client, type_name, config))
    }

    /// Read a resource's state. `prior` is the last known state document,
    /// used to keep arguments the remote API does not return. `None` when
    /// the resource is gone.
    pub async fn read(
        &self,
        type_name: &str,
        id: &str,
        prior: Option<&Value>,
    ) -> Result<Option<Value>> {
        tracing::debug!("read {} {}", type_name, id);
        dispatch!(type_name, read_as(&self.client, id, prior))
    }

    /// Apply `desired` to the resource described by the `prior` state document
    pub async fn update(&self, type_name: &str, prior: &Value, desired: Value) -> Result<Value> {
        tracing::info!("update {}", type_name);
        dispatch!(type_name, update_as(&self.client, type_name, prior, desired))
    }

    pub async fn delete(&self, type_name: &str, id: &str) -> Result<()> {
        tracing::info!("delete {} {}", type_name, id);
        dispatch!(type_name, delete_as(&self.client, id))
    }

    /// Adopt an existing remote resource by id
    pub async fn import(&self, type_name: &str, id: &str) -> Result<Value> {
        tracing::info!("import {} {}", type_name, id);
        dispatch!(type_name, import_as(&self.client, id))
    }
}

fn parse<T: DeserializeOwned>(type_name: &str, what: &str, doc: Value) -> Result<T> {
    serde_json::from_value(doc)
        .map_err(|e| ProviderError::validation(format!("invalid {} {}: {}", type_name, what, e)))
}

fn state_document<R: Resource>(state: &StateOf<R>) -> Result<Value> {
    Ok(serde_json::to_value(state)?)
}

async fn create_as<R: Resource>(
    client: &AliyunClient,
    type_name: &str,
    config: Value,
) -> Result<Value> {
    let args: R::Args = parse(type_name, "config", config)?;
    R::validate(&args)?;
    let state = R::create(client, &args).await?;
    tracing::info!("created {} {}", R::TYPE_NAME, state.id);
    state_document::<R>(&state)
}

async fn read_as<R: Resource>(
    client: &AliyunClient,
    id: &str,
    prior: Option<&Value>,
) -> Result<Option<Value>> {
    let Some(mut state) = R::read(client, id).await? else {
        return Ok(None);
    };

    if let Some(prior) = prior {
        match serde_json::from_value::<R::Args>(prior.clone()) {
            Ok(known) => R::carry_over(&known, &mut state.args),
            Err(e) => tracing::warn!(
                "Ignoring unreadable prior state of {} {}: {}",
                R::TYPE_NAME,
                id,
                e
            ),
        }
    }

    state_document::<R>(&state).map(Some)
}

async fn update_as<R: Resource>(
    client: &AliyunClient,
    type_name: &str,
    prior: &Value,
    desired: Value,
) -> Result<Value> {
    let prior: StateOf<R> = parse(type_name, "state", prior.clone())?;
    let desired: R::Args = parse(type_name, "config", desired)?;
    R::validate(&desired)?;

    let fields = R::replacement_fields(&prior.args, &desired);
    if !fields.is_empty() {
        return Err(ProviderError::RequiresReplacement { fields });
    }

    let state = R::update(client, &prior, &desired).await?;
    state_document::<R>(&state)
}

async fn delete_as<R: Resource>(client: &AliyunClient, id: &str) -> Result<()> {
    R::delete(client, id).await
}

async fn import_as<R: Resource>(client: &AliyunClient, id: &str) -> Result<Value> {
    let state = R::import(client, id).await?;
    state_document::<R>(&state)
}
