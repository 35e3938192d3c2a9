//! alicloud_fc_service: Function Compute services

use super::diff::Diff;
use super::validation::{length_in_range, required_when};
use super::{read_back, Resource, State, StateOf};
use crate::aliyun::{AliyunClient, RestRequest};
use crate::error::{codes, ProviderError, Result};
use crate::service::ecs::describe_vswitch;
use crate::service::fc::{describe_service, service_path};
use crate::service::log::{describe_log_store, describe_project};
use crate::service::response::{bool_at, str_or_empty, string_at, strings_at};
use crate::wait::{retry, retry_on, RetryOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// Prefix for generated names
pub const UNIQUE_PREFIX: &str = "tf-";
const UNIQUE_SUFFIX_LEN: usize = 26;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcServiceArgs {
    #[serde(default)]
    pub name: Option<String>,
    /// Generate the name from this prefix; conflicts with `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub internet_access: bool,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub logstore: Option<String>,
    #[serde(default)]
    pub security_group_id: Option<String>,
    #[serde(default)]
    pub vswitch_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FcServiceAttributes {
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub last_modified: String,
}

pub struct FcService;

/// `prefix` followed by a unique suffix
pub fn prefixed_unique_id(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, &suffix[..UNIQUE_SUFFIX_LEN])
}

fn service_name(args: &FcServiceArgs) -> String {
    match (&args.name, &args.name_prefix) {
        (Some(name), _) => name.clone(),
        (None, Some(prefix)) => prefixed_unique_id(prefix),
        (None, None) => prefixed_unique_id(UNIQUE_PREFIX),
    }
}

/// VPC config body; `None` when no vswitches are set
async fn vpc_config(client: &AliyunClient, args: &FcServiceArgs) -> Result<Option<Value>> {
    let Some(first) = args.vswitch_ids.iter().next() else {
        return Ok(None);
    };

    let vswitch = describe_vswitch(client, first)
        .await?
        .ok_or_else(|| ProviderError::not_found("VSwitch", first.as_str()))?;

    Ok(Some(json!({
        "vSwitchIds": args.vswitch_ids,
        "securityGroupId": args.security_group_id.as_deref().unwrap_or_default(),
        "vpcId": str_or_empty(&vswitch, "VpcId"),
    })))
}

fn log_config(args: &FcServiceArgs) -> Value {
    json!({
        "project": args.project.as_deref().unwrap_or_default(),
        "logstore": args.logstore.as_deref().unwrap_or_default(),
    })
}

/// Wait until the log project and logstore the service writes to exist
async fn ensure_logstore_exists(client: &AliyunClient, args: &FcServiceArgs) -> Result<()> {
    let Some(project) = args.project.as_deref().filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    let logstore = args.logstore.as_deref().filter(|l| !l.is_empty());
    let timeouts = client.timeouts();

    retry(
        &format!("log project {} to exist", project),
        timeouts.log_retry(),
        timeouts.poll_interval(),
        move || async move {
            if describe_project(client, project).await?.is_none() {
                return Ok(RetryOutcome::Again(format!("log project {} not found", project)));
            }
            if let Some(logstore) = logstore {
                if describe_log_store(client, project, logstore).await?.is_none() {
                    return Ok(RetryOutcome::Again(format!("logstore {} not found", logstore)));
                }
            }
            Ok(RetryOutcome::Done(()))
        },
    )
    .await
}

#[async_trait]
impl Resource for FcService {
    const TYPE_NAME: &'static str = "alicloud_fc_service";
    type Args = FcServiceArgs;
    type Attributes = FcServiceAttributes;

    fn validate(args: &FcServiceArgs) -> Result<()> {
        if args.name.is_some() && args.name_prefix.is_some() {
            return Err(ProviderError::validation(
                "'name' conflicts with 'name_prefix'",
            ));
        }
        if let Some(ref name) = args.name {
            length_in_range("name", name, 1, 128)?;
        }
        if let Some(ref prefix) = args.name_prefix {
            length_in_range("name_prefix", prefix, 0, 128 - UNIQUE_SUFFIX_LEN)?;
        }
        let vpc = !args.vswitch_ids.is_empty();
        required_when("security_group_id", &args.security_group_id, vpc, "'vswitch_ids' is set")?;
        required_when("role", &args.role, vpc, "'vswitch_ids' is set")?;
        Ok(())
    }

    fn replacement_fields(prior: &FcServiceArgs, desired: &FcServiceArgs) -> Vec<&'static str> {
        let mut diff = Diff::new();
        diff.check_set("name", &prior.name, &desired.name);
        diff.check_set("name_prefix", &prior.name_prefix, &desired.name_prefix);
        diff.into_fields()
    }

    fn carry_over(known: &FcServiceArgs, args: &mut FcServiceArgs) {
        args.name_prefix = known.name_prefix.clone();
    }

    async fn create(client: &AliyunClient, args: &FcServiceArgs) -> Result<StateOf<Self>> {
        // Fails early when no account id is configured
        client.fc_url()?;

        let name = service_name(args);
        ensure_logstore_exists(client, args).await?;

        let mut body = json!({
            "serviceName": name,
            "description": args.description.as_deref().unwrap_or_default(),
            "internetAccess": args.internet_access,
            "role": args.role.as_deref().unwrap_or_default(),
            "logConfig": log_config(args),
        });
        if let Some(vpc) = vpc_config(client, args).await? {
            body["vpcConfig"] = vpc;
        }

        tracing::info!("Creating function compute service {}", name);
        let timeouts = client.timeouts();
        let request = &RestRequest::post(service_path(None), body);
        let created = retry(
            &format!("create function compute service {}", name),
            timeouts.delete(),
            timeouts.poll_interval(),
            move || async move {
                match client.fc(request.clone()).await {
                    Ok(service) => Ok(RetryOutcome::Done(service)),
                    Err(e) => retry_on(e, &[codes::ACCESS_DENIED, codes::DOES_NOT_EXIST]),
                }
            },
        )
        .await?;

        let id = string_at(&created, "serviceName").unwrap_or(name);
        let written = FcServiceArgs {
            name: Some(id.clone()),
            ..args.clone()
        };
        read_back::<Self>(client, &id, &written).await
    }

    async fn read(client: &AliyunClient, id: &str) -> Result<Option<StateOf<Self>>> {
        let Some(service) = describe_service(client, id).await? else {
            tracing::warn!("Function compute service {} not found", id);
            return Ok(None);
        };

        let text = |path: &str| string_at(&service, path).filter(|v| !v.is_empty());

        let args = FcServiceArgs {
            name: Some(text("serviceName").unwrap_or_else(|| id.to_string())),
            name_prefix: None,
            description: text("description"),
            internet_access: bool_at(&service, "internetAccess").unwrap_or(true),
            role: text("role"),
            project: text("logConfig.project"),
            logstore: text("logConfig.logstore"),
            security_group_id: text("vpcConfig.securityGroupId"),
            vswitch_ids: strings_at(&service, "vpcConfig.vSwitchIds")
                .into_iter()
                .collect(),
        };
        let attributes = FcServiceAttributes {
            vpc_id: str_or_empty(&service, "vpcConfig.vpcId"),
            last_modified: str_or_empty(&service, "lastModifiedTime"),
        };

        Ok(Some(State::new(id, args, attributes)))
    }

    async fn update(
        client: &AliyunClient,
        prior: &StateOf<Self>,
        desired: &FcServiceArgs,
    ) -> Result<StateOf<Self>> {
        let old = &prior.args;
        let mut diff = Diff::new();
        let mut body = Map::new();

        if diff.check("role", &old.role, &desired.role) {
            body.insert("role".into(), json!(desired.role.as_deref().unwrap_or_default()));
        }
        if diff.check("internet_access", &old.internet_access, &desired.internet_access) {
            body.insert("internetAccess".into(), json!(desired.internet_access));
        }
        if diff.check("description", &old.description, &desired.description) {
            body.insert(
                "description".into(),
                json!(desired.description.as_deref().unwrap_or_default()),
            );
        }
        let project_changed = diff.check("project", &old.project, &desired.project);
        let logstore_changed = diff.check("logstore", &old.logstore, &desired.logstore);
        if project_changed || logstore_changed {
            ensure_logstore_exists(client, desired).await?;
            body.insert("logConfig".into(), log_config(desired));
        }
        let vswitches_changed = diff.check("vswitch_ids", &old.vswitch_ids, &desired.vswitch_ids);
        let group_changed = diff.check(
            "security_group_id",
            &old.security_group_id,
            &desired.security_group_id,
        );
        if vswitches_changed || group_changed {
            let vpc = vpc_config(client, desired).await?.unwrap_or_else(|| {
                json!({"vSwitchIds": [], "securityGroupId": "", "vpcId": ""})
            });
            body.insert("vpcConfig".into(), vpc);
        }

        if !diff.is_empty() {
            tracing::info!("Updating function compute service {}: {:?}", prior.id, diff.fields());
            client
                .fc(RestRequest::put(service_path(Some(&prior.id)), Value::Object(body)))
                .await?;
        }

        read_back::<Self>(client, &prior.id, desired).await
    }

    async fn delete(client: &AliyunClient, id: &str) -> Result<()> {
        let timeouts = client.timeouts();
        retry(
            &format!("delete function compute service {}", id),
            timeouts.delete(),
            timeouts.poll_interval(),
            move || async move {
                match client.fc(RestRequest::delete(service_path(Some(id)))).await {
                    Ok(_) => {}
                    Err(e) if e.is_api_error(&[codes::SERVICE_NOT_FOUND]) => {
                        return Ok(RetryOutcome::Done(()))
                    }
                    Err(e) => return Err(e),
                }

                match describe_service(client, id).await {
                    Ok(None) => Ok(RetryOutcome::Done(())),
                    Ok(Some(_)) => Ok(RetryOutcome::Again(format!("service {} still exists", id))),
                    Err(e) => Ok(RetryOutcome::Again(e.to_string())),
                }
            },
        )
        .await
    }
}
