//! alicloud_log_consumer_group

use super::diff::Diff;
use super::id::{join_id, split_id};
use super::validation::int_in_range;
use super::{read_back, NoAttributes, Resource, State, StateOf};
use crate::aliyun::{AliyunClient, RestRequest};
use crate::error::{codes, Result};
use crate::service::log::{call_with_retry, delete_until_gone, describe_consumer_group};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConsumerGroupArgs {
    pub project: String,
    pub logstore: String,
    pub name: String,
    /// Heartbeat timeout in seconds
    pub timeout: i64,
    #[serde(default)]
    pub in_order: bool,
}

pub struct LogConsumerGroup;

fn groups_path(logstore: &str) -> String {
    format!("/logstores/{}/consumergroups", logstore)
}

#[async_trait]
impl Resource for LogConsumerGroup {
    const TYPE_NAME: &'static str = "alicloud_log_consumer_group";
    type Args = LogConsumerGroupArgs;
    type Attributes = NoAttributes;

    fn validate(args: &LogConsumerGroupArgs) -> Result<()> {
        int_in_range("timeout", args.timeout, 1, 86400)
    }

    fn replacement_fields(
        prior: &LogConsumerGroupArgs,
        desired: &LogConsumerGroupArgs,
    ) -> Vec<&'static str> {
        let mut diff = Diff::new();
        diff.check("project", &prior.project, &desired.project);
        diff.check("logstore", &prior.logstore, &desired.logstore);
        diff.check("name", &prior.name, &desired.name);
        diff.into_fields()
    }

    async fn create(client: &AliyunClient, args: &LogConsumerGroupArgs) -> Result<StateOf<Self>> {
        tracing::info!(
            "Creating consumer group {} on {}/{}",
            args.name,
            args.project,
            args.logstore
        );
        let body = json!({
            "consumerGroup": args.name,
            "timeout": args.timeout,
            "order": args.in_order,
        });
        call_with_retry(
            client,
            &args.project,
            RestRequest::post(groups_path(&args.logstore), body),
        )
        .await?;

        let id = join_id(&[&args.project, &args.logstore, &args.name]);
        read_back::<Self>(client, &id, args).await
    }

    async fn read(client: &AliyunClient, id: &str) -> Result<Option<StateOf<Self>>> {
        let [project, logstore, name] = split_id::<3>(id)?;

        let Some(group) = describe_consumer_group(client, project, logstore, name).await? else {
            tracing::warn!("Consumer group {} not found", id);
            return Ok(None);
        };

        let args = LogConsumerGroupArgs {
            project: project.to_string(),
            logstore: logstore.to_string(),
            name: group.name,
            timeout: group.timeout,
            in_order: group.in_order,
        };
        Ok(Some(State::new(id, args, NoAttributes {})))
    }

    async fn update(
        client: &AliyunClient,
        prior: &StateOf<Self>,
        desired: &LogConsumerGroupArgs,
    ) -> Result<StateOf<Self>> {
        let [project, logstore, name] = split_id::<3>(&prior.id)?;

        let mut diff = Diff::new();
        diff.check("timeout", &prior.args.timeout, &desired.timeout);
        diff.check("in_order", &prior.args.in_order, &desired.in_order);

        if !diff.is_empty() {
            tracing::info!("Updating consumer group {}: {:?}", prior.id, diff.fields());
            let body = json!({
                "order": desired.in_order,
                "timeout": desired.timeout,
            });
            call_with_retry(
                client,
                project,
                RestRequest::put(format!("{}/{}", groups_path(logstore), name), body),
            )
            .await?;
        }

        read_back::<Self>(client, &prior.id, desired).await
    }

    async fn delete(client: &AliyunClient, id: &str) -> Result<()> {
        let [project, logstore, name] = split_id::<3>(id)?;
        delete_until_gone(
            client,
            project,
            &format!("{}/{}", groups_path(logstore), name),
            &[
                codes::PROJECT_NOT_EXIST,
                codes::LOG_STORE_NOT_EXIST,
                codes::CONSUMER_GROUP_NOT_EXIST,
            ],
            move || async move {
                Ok(describe_consumer_group(client, project, logstore, name)
                    .await?
                    .is_some())
            },
        )
        .await
    }
}
