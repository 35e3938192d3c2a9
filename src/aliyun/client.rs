//! Alibaba Cloud Client
//!
//! Main client for interacting with Alibaba Cloud APIs, combining
//! credentials, the signed HTTP layer and per-service endpoints.

use super::credentials::Credentials;
use super::http::{AliyunHttpClient, RestDialect, RestRequest, RpcRequest};
use crate::config::{Endpoints, ProviderConfig, Timeouts};
use crate::error::{ProviderError, Result};
use serde_json::Value;

pub const ECS_API_VERSION: &str = "2014-05-26";
pub const SLB_API_VERSION: &str = "2014-05-26";
pub const FC_API_VERSION: &str = "2016-08-15";

/// Main Alibaba Cloud client. Cheap to clone; read-only after construction.
#[derive(Clone)]
pub struct AliyunClient {
    pub credentials: Credentials,
    pub http: AliyunHttpClient,
    pub region: String,
    pub account_id: Option<String>,
    endpoints: Endpoints,
    timeouts: Timeouts,
}

impl AliyunClient {
    /// Create a new client from provider configuration
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let credentials = Credentials::from_config(config)?;
        check_endpoint("ecs", config.endpoints.ecs.as_deref())?;
        check_endpoint("slb", config.endpoints.slb.as_deref())?;
        check_endpoint("log", config.endpoints.log.as_deref())?;
        check_endpoint("fc", config.endpoints.fc.as_deref())?;
        if config.timeouts.poll_interval_ms == 0 {
            return Err(ProviderError::Config(
                "timeouts.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        let http = AliyunHttpClient::new(config.timeouts.request())?;

        Ok(Self {
            credentials,
            http,
            region: config.effective_region(),
            account_id: config.account_id.clone().filter(|v| !v.is_empty()),
            endpoints: config.endpoints.clone(),
            timeouts: config.timeouts.clone(),
        })
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    // =========================================================================
    // ECS API helpers
    // =========================================================================

    /// Build ECS endpoint URL
    pub fn ecs_url(&self) -> String {
        self.endpoints
            .ecs
            .clone()
            .unwrap_or_else(|| format!("https://ecs.{}.aliyuncs.com", self.region))
    }

    /// Call an ECS action; `RegionId` defaults to the client region
    pub async fn ecs(&self, request: RpcRequest) -> Result<Value> {
        let request = self.with_region(request);
        self.http
            .rpc(
                &self.credentials,
                "ecs",
                &self.ecs_url(),
                ECS_API_VERSION,
                &request,
            )
            .await
    }

    // =========================================================================
    // SLB API helpers
    // =========================================================================

    /// Build SLB endpoint URL
    pub fn slb_url(&self) -> String {
        self.endpoints
            .slb
            .clone()
            .unwrap_or_else(|| "https://slb.aliyuncs.com".to_string())
    }

    /// Call an SLB action; `RegionId` defaults to the client region
    pub async fn slb(&self, request: RpcRequest) -> Result<Value> {
        let request = self.with_region(request);
        self.http
            .rpc(
                &self.credentials,
                "slb",
                &self.slb_url(),
                SLB_API_VERSION,
                &request,
            )
            .await
    }

    fn with_region(&self, request: RpcRequest) -> RpcRequest {
        if request.get("RegionId").is_some() {
            request
        } else {
            request.set("RegionId", &self.region)
        }
    }

    // =========================================================================
    // Log service API helpers
    // =========================================================================

    /// Build the project-scoped log service base URL
    pub fn log_url(&self, project: &str) -> String {
        match self.endpoints.log {
            Some(ref base) => base.replace("{project}", project),
            None => format!("https://{}.{}.log.aliyuncs.com", project, self.region),
        }
    }

    /// Make a log service request against `project`
    pub async fn log(&self, project: &str, request: RestRequest) -> Result<Value> {
        self.http
            .rest(
                &self.credentials,
                RestDialect::Log,
                &self.log_url(project),
                &request,
            )
            .await
    }

    // =========================================================================
    // Function Compute API helpers
    // =========================================================================

    /// Build Function Compute base URL
    pub fn fc_url(&self) -> Result<String> {
        if let Some(ref base) = self.endpoints.fc {
            return Ok(base.clone());
        }
        let account = self.account_id.as_deref().ok_or_else(|| {
            ProviderError::Config(
                "account_id is required for Function Compute. Set 'account_id' or ALICLOUD_ACCOUNT_ID"
                    .to_string(),
            )
        })?;
        Ok(format!("https://{}.{}.fc.aliyuncs.com", account, self.region))
    }

    /// Versioned Function Compute path
    pub fn fc_path(path: &str) -> String {
        format!("/{}/{}", FC_API_VERSION, path.trim_start_matches('/'))
    }

    /// Make a Function Compute request. `request.path` must be versioned (see [`Self::fc_path`]).
    pub async fn fc(&self, request: RestRequest) -> Result<Value> {
        let base = self.fc_url()?;
        self.http
            .rest(
                &self.credentials,
                RestDialect::FunctionCompute,
                &base,
                &request,
            )
            .await
    }
}

/// Endpoint overrides must be absolute http(s) URLs
fn check_endpoint(service: &str, endpoint: Option<&str>) -> Result<()> {
    let Some(raw) = endpoint else {
        return Ok(());
    };
    let parsed = url::Url::parse(&raw.replace("{project}", "project")).map_err(|e| {
        ProviderError::Config(format!("invalid {} endpoint '{}': {}", service, raw, e))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ProviderError::Config(format!(
            "invalid {} endpoint '{}': scheme must be http or https",
            service, raw
        )));
    }
    Ok(())
}
