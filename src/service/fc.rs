//! Function Compute describe helpers

use crate::aliyun::{AliyunClient, RestRequest};
use crate::error::{codes, Result};
use serde_json::Value;

/// Path of a service, or of the service collection when `name` is `None`
pub fn service_path(name: Option<&str>) -> String {
    match name {
        Some(name) => AliyunClient::fc_path(&format!("services/{}", name)),
        None => AliyunClient::fc_path("services"),
    }
}

/// Describe a service. `None` when it does not exist.
pub async fn describe_service(client: &AliyunClient, name: &str) -> Result<Option<Value>> {
    match client.fc(RestRequest::get(service_path(Some(name)))).await {
        Ok(service) => Ok(Some(service)),
        Err(e) if e.is_api_error(&[codes::SERVICE_NOT_FOUND]) => Ok(None),
        Err(e) => Err(e),
    }
}
