//! alicloud_log_config: a Logtail collection config shipping files to a logstore

use super::diff::Diff;
use super::id::{join_id, split_id};
use super::{read_back, NoAttributes, Resource, State, StateOf};
use crate::aliyun::{AliyunClient, RestRequest};
use crate::error::{codes, ProviderError, Result};
use crate::service::log::{call_with_retry, delete_until_gone, describe_config};
use crate::service::response::{lookup, str_or_empty};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const INPUT_TYPE_FILE: &str = "file";
pub const OUTPUT_TYPE: &str = "LogService";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfigArgs {
    pub project: String,
    pub name: String,
    #[serde(default)]
    pub logstore: String,
    /// Logtail input detail document
    pub input_detail: Value,
}

pub struct LogConfig;

fn config_body(args: &LogConfigArgs) -> Value {
    json!({
        "configName": args.name,
        "inputType": INPUT_TYPE_FILE,
        "inputDetail": args.input_detail,
        "outputType": OUTPUT_TYPE,
        "outputDetail": {
            "logstoreName": args.logstore,
        },
    })
}

/// Accept the input detail either as a document or as its JSON text
fn input_detail(raw: Option<&Value>) -> Result<Value> {
    match raw {
        Some(Value::String(text)) => Ok(serde_json::from_str(text)?),
        Some(v) => Ok(v.clone()),
        None => Ok(Value::Object(Default::default())),
    }
}

#[async_trait]
impl Resource for LogConfig {
    const TYPE_NAME: &'static str = "alicloud_log_config";
    type Args = LogConfigArgs;
    type Attributes = NoAttributes;

    fn validate(args: &LogConfigArgs) -> Result<()> {
        let detail = input_detail(Some(&args.input_detail))?;
        if !detail.is_object() {
            return Err(ProviderError::validation(
                "'input_detail' must be a JSON object",
            ));
        }
        Ok(())
    }

    fn replacement_fields(prior: &LogConfigArgs, desired: &LogConfigArgs) -> Vec<&'static str> {
        let mut diff = Diff::new();
        diff.check("project", &prior.project, &desired.project);
        diff.check("name", &prior.name, &desired.name);
        diff.into_fields()
    }

    async fn create(client: &AliyunClient, args: &LogConfigArgs) -> Result<StateOf<Self>> {
        let args = LogConfigArgs {
            input_detail: input_detail(Some(&args.input_detail))?,
            ..args.clone()
        };

        tracing::info!("Creating log config {} in project {}", args.name, args.project);
        call_with_retry(
            client,
            &args.project,
            RestRequest::post("/configs", config_body(&args)),
        )
        .await?;

        let id = join_id(&[&args.project, &args.name]);
        read_back::<Self>(client, &id, &args).await
    }

    async fn read(client: &AliyunClient, id: &str) -> Result<Option<StateOf<Self>>> {
        let [project, name] = split_id::<2>(id)?;

        let Some(config) = describe_config(client, project, name).await? else {
            tracing::warn!("Log config {} not found", id);
            return Ok(None);
        };

        let args = LogConfigArgs {
            project: project.to_string(),
            name: lookup(&config, "configName")
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string(),
            logstore: str_or_empty(&config, "outputDetail.logstoreName"),
            input_detail: input_detail(lookup(&config, "inputDetail"))?,
        };
        Ok(Some(State::new(id, args, NoAttributes {})))
    }

    async fn update(
        client: &AliyunClient,
        prior: &StateOf<Self>,
        desired: &LogConfigArgs,
    ) -> Result<StateOf<Self>> {
        let [project, name] = split_id::<2>(&prior.id)?;
        let desired = LogConfigArgs {
            input_detail: input_detail(Some(&desired.input_detail))?,
            ..desired.clone()
        };

        let mut diff = Diff::new();
        diff.check("input_detail", &prior.args.input_detail, &desired.input_detail);
        diff.check("logstore", &prior.args.logstore, &desired.logstore);

        if !diff.is_empty() {
            tracing::info!("Updating log config {}: {:?}", prior.id, diff.fields());
            let body = config_body(&LogConfigArgs {
                name: name.to_string(),
                ..desired.clone()
            });
            call_with_retry(
                client,
                project,
                RestRequest::put(format!("/configs/{}", name), body),
            )
            .await?;
        }

        read_back::<Self>(client, &prior.id, &desired).await
    }

    async fn delete(client: &AliyunClient, id: &str) -> Result<()> {
        let [project, name] = split_id::<2>(id)?;
        delete_until_gone(
            client,
            project,
            &format!("/configs/{}", name),
            &[codes::PROJECT_NOT_EXIST, codes::CONFIG_NOT_EXIST],
            move || async move { Ok(describe_config(client, project, name).await?.is_some()) },
        )
        .await
    }
}
