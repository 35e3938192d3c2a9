//! Log service describe helpers
//!
//! Every describe retries on `InternalServerError` for the configured log
//! retry budget and maps the not-exist codes to `None`.

use super::response::strings_at;
use crate::aliyun::{AliyunClient, RestRequest};
use crate::error::{codes, Result};
use crate::wait::{retry, retry_on, RetryOutcome};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;

/// Full-text part of a logstore index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexLine {
    #[serde(default)]
    pub token: Vec<String>,
    #[serde(default, rename = "caseSensitive")]
    pub case_sensitive: bool,
    #[serde(default)]
    pub chn: bool,
}

/// One field of a logstore index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
    #[serde(default)]
    pub token: Vec<String>,
    #[serde(default, rename = "caseSensitive")]
    pub case_sensitive: bool,
    #[serde(default)]
    pub chn: bool,
    #[serde(default)]
    pub doc_value: bool,
}

/// A logstore index. Unknown top-level fields are carried through updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogIndex {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<IndexLine>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, IndexKey>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl LogIndex {
    pub fn is_empty(&self) -> bool {
        self.line.is_none() && self.keys.is_empty()
    }
}

/// A consumer group as listed by the log service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerGroup {
    #[serde(rename = "name")]
    pub name: String,
    #[serde(default)]
    pub timeout: i64,
    #[serde(default, rename = "order")]
    pub in_order: bool,
}

/// GET `path`, retrying on `InternalServerError`; `not_found` codes yield `None`
async fn get_or_absent(
    client: &AliyunClient,
    project: &str,
    path: &str,
    not_found: &[&str],
) -> Result<Option<Value>> {
    let timeouts = client.timeouts();
    retry(
        &format!("GET {} in project {}", path, project),
        timeouts.log_retry(),
        timeouts.poll_interval(),
        move || async move {
            match client.log(project, RestRequest::get(path)).await {
                Ok(v) => Ok(RetryOutcome::Done(Some(v))),
                Err(e) if e.is_api_error(not_found) => Ok(RetryOutcome::Done(None)),
                Err(e) => retry_on(e, &[codes::INTERNAL_SERVER_ERROR]),
            }
        },
    )
    .await
}

/// Run a mutating log call, retrying on `InternalServerError`
pub async fn call_with_retry(
    client: &AliyunClient,
    project: &str,
    request: RestRequest,
) -> Result<Value> {
    let timeouts = client.timeouts();
    let what = format!("{} {} in project {}", request.method, request.path, project);
    let request = &request;
    retry(
        &what,
        timeouts.log_retry(),
        timeouts.poll_interval(),
        move || async move {
            match client.log(project, request.clone()).await {
                Ok(v) => Ok(RetryOutcome::Done(v)),
                Err(e) => retry_on(e, &[codes::INTERNAL_SERVER_ERROR]),
            }
        },
    )
    .await
}

pub async fn describe_project(client: &AliyunClient, project: &str) -> Result<Option<Value>> {
    get_or_absent(client, project, "/", &[codes::PROJECT_NOT_EXIST]).await
}

pub async fn describe_log_store(
    client: &AliyunClient,
    project: &str,
    logstore: &str,
) -> Result<Option<Value>> {
    get_or_absent(
        client,
        project,
        &format!("/logstores/{}", logstore),
        &[codes::PROJECT_NOT_EXIST, codes::LOG_STORE_NOT_EXIST],
    )
    .await
}

/// The logstore's index. `None` when the project, logstore or index is
/// missing. An index with neither a line nor keys still exists.
pub async fn describe_index(
    client: &AliyunClient,
    project: &str,
    logstore: &str,
) -> Result<Option<LogIndex>> {
    let raw = get_or_absent(
        client,
        project,
        &format!("/logstores/{}/index", logstore),
        &[
            codes::PROJECT_NOT_EXIST,
            codes::LOG_STORE_NOT_EXIST,
            codes::INDEX_CONFIG_NOT_EXIST,
        ],
    )
    .await?;

    match raw {
        Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
        None => Ok(None),
    }
}

pub async fn describe_config(
    client: &AliyunClient,
    project: &str,
    name: &str,
) -> Result<Option<Value>> {
    get_or_absent(
        client,
        project,
        &format!("/configs/{}", name),
        &[codes::PROJECT_NOT_EXIST, codes::CONFIG_NOT_EXIST],
    )
    .await
}

/// Find a consumer group by name in the logstore's list
pub async fn describe_consumer_group(
    client: &AliyunClient,
    project: &str,
    logstore: &str,
    name: &str,
) -> Result<Option<ConsumerGroup>> {
    let raw = get_or_absent(
        client,
        project,
        &format!("/logstores/{}/consumergroups", logstore),
        &[codes::PROJECT_NOT_EXIST, codes::LOG_STORE_NOT_EXIST],
    )
    .await?;

    let groups: Vec<ConsumerGroup> = match raw {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?,
        _ => Vec::new(),
    };

    Ok(groups.into_iter().find(|g| g.name == name))
}

/// Configs applied to a machine group. `None` when the project or group is missing.
pub async fn applied_configs(
    client: &AliyunClient,
    project: &str,
    group: &str,
) -> Result<Option<Vec<String>>> {
    let raw = get_or_absent(
        client,
        project,
        &format!("/machinegroups/{}/configs", group),
        &[
            codes::PROJECT_NOT_EXIST,
            codes::GROUP_NOT_EXIST,
            codes::MACHINE_GROUP_NOT_EXIST,
        ],
    )
    .await?;

    Ok(raw.map(|r| strings_at(&r, "configs")))
}

/// Apply each config to the machine group
pub async fn apply_configs(
    client: &AliyunClient,
    project: &str,
    group: &str,
    configs: &[String],
) -> Result<()> {
    for config in configs {
        tracing::info!("Applying log config {} to machine group {}", config, group);
        call_with_retry(
            client,
            project,
            RestRequest::new(
                Method::PUT,
                format!("/machinegroups/{}/configs/{}", group, config),
            ),
        )
        .await?;
    }
    Ok(())
}

/// Remove each config from the machine group; already-gone configs are skipped
pub async fn remove_configs(
    client: &AliyunClient,
    project: &str,
    group: &str,
    configs: &[String],
) -> Result<()> {
    for config in configs {
        tracing::info!("Removing log config {} from machine group {}", config, group);
        let request = RestRequest::delete(format!("/machinegroups/{}/configs/{}", group, config));
        match call_with_retry(client, project, request).await {
            Ok(_) => {}
            Err(e) if e.is_api_error(&[codes::GROUP_NOT_EXIST, codes::CONFIG_NOT_EXIST]) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// DELETE `path`, then poll `exists` until it reports the resource gone.
/// `not_found` codes on the DELETE itself mean it is already gone.
pub async fn delete_until_gone<F, Fut>(
    client: &AliyunClient,
    project: &str,
    path: &str,
    not_found: &[&str],
    exists: F,
) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let timeouts = client.timeouts();
    let exists = &exists;
    retry(
        &format!("DELETE {} in project {}", path, project),
        timeouts.log_delete(),
        timeouts.poll_interval(),
        move || async move {
            match call_with_retry(client, project, RestRequest::delete(path)).await {
                Ok(_) => {}
                Err(e) if e.is_api_error(not_found) => return Ok(RetryOutcome::Done(())),
                Err(e) => return Err(e),
            }

            if exists().await? {
                Ok(RetryOutcome::Again(format!("{} still exists", path)))
            } else {
                Ok(RetryOutcome::Done(()))
            }
        },
    )
    .await
}
