//! alicloud_log_machine_group_attachment: configs applied to a machine group

use super::diff::Diff;
use super::id::{join_id, split_id};
use super::{read_back, NoAttributes, Resource, State, StateOf};
use crate::aliyun::AliyunClient;
use crate::error::{ProviderError, Result};
use crate::service::log::{applied_configs, apply_configs, remove_configs};
use crate::wait::{retry, RetryOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMachineGroupAttachmentArgs {
    pub project: String,
    pub group_name: String,
    pub config_names: BTreeSet<String>,
}

impl LogMachineGroupAttachmentArgs {
    fn configs(&self) -> Vec<String> {
        self.config_names.iter().cloned().collect()
    }
}

pub struct LogMachineGroupAttachment;

#[async_trait]
impl Resource for LogMachineGroupAttachment {
    const TYPE_NAME: &'static str = "alicloud_log_machine_group_attachment";
    type Args = LogMachineGroupAttachmentArgs;
    type Attributes = NoAttributes;

    fn validate(args: &LogMachineGroupAttachmentArgs) -> Result<()> {
        if args.config_names.is_empty() {
            return Err(ProviderError::validation(
                "'config_names' must contain at least one config",
            ));
        }
        Ok(())
    }

    fn replacement_fields(
        prior: &LogMachineGroupAttachmentArgs,
        desired: &LogMachineGroupAttachmentArgs,
    ) -> Vec<&'static str> {
        let mut diff = Diff::new();
        diff.check("project", &prior.project, &desired.project);
        diff.check("group_name", &prior.group_name, &desired.group_name);
        diff.into_fields()
    }

    async fn create(
        client: &AliyunClient,
        args: &LogMachineGroupAttachmentArgs,
    ) -> Result<StateOf<Self>> {
        apply_configs(client, &args.project, &args.group_name, &args.configs()).await?;

        let id = join_id(&[&args.project, &args.group_name]);
        read_back::<Self>(client, &id, args).await
    }

    async fn read(client: &AliyunClient, id: &str) -> Result<Option<StateOf<Self>>> {
        let [project, group] = split_id::<2>(id)?;

        let configs = applied_configs(client, project, group).await?.unwrap_or_default();
        if configs.is_empty() {
            tracing::warn!("Machine group {} has no applied configs", id);
            return Ok(None);
        }

        let args = LogMachineGroupAttachmentArgs {
            project: project.to_string(),
            group_name: group.to_string(),
            config_names: configs.into_iter().collect(),
        };
        Ok(Some(State::new(id, args, NoAttributes {})))
    }

    async fn update(
        client: &AliyunClient,
        prior: &StateOf<Self>,
        desired: &LogMachineGroupAttachmentArgs,
    ) -> Result<StateOf<Self>> {
        let [project, group] = split_id::<2>(&prior.id)?;

        if prior.args.config_names != desired.config_names {
            remove_configs(client, project, group, &prior.args.configs()).await?;
            apply_configs(client, project, group, &desired.configs()).await?;
        }

        read_back::<Self>(client, &prior.id, desired).await
    }

    async fn delete(client: &AliyunClient, id: &str) -> Result<()> {
        let [project, group] = split_id::<2>(id)?;
        let timeouts = client.timeouts();
        retry(
            &format!("remove configs from machine group {}", id),
            timeouts.log_delete(),
            timeouts.poll_interval(),
            move || async move {
                let configs = applied_configs(client, project, group).await?.unwrap_or_default();
                if configs.is_empty() {
                    return Ok(RetryOutcome::Done(()));
                }
                remove_configs(client, project, group, &configs).await?;
                Ok(RetryOutcome::Again(format!(
                    "removed {} configs, checking again",
                    configs.len()
                )))
            },
        )
        .await
    }
}
