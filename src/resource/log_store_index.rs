//! alicloud_log_store_index: the full-text part or one field of a logstore index
//!
//! A logstore has a single index document. This resource owns either its
//! `line` (id `<project>:<logstore>`) or one entry of its `keys`
//! (id `<project>:<logstore>:<field_name>`) and leaves the rest untouched.

use super::diff::Diff;
use super::id::{join_id, split_id_range};
use super::validation::one_of;
use super::{read_back, NoAttributes, Resource, State, StateOf};
use crate::aliyun::{AliyunClient, RestRequest};
use crate::error::{ProviderError, Result};
use crate::service::log::{
    call_with_retry, describe_index, describe_log_store, IndexKey, IndexLine, LogIndex,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    #[default]
    FullText,
    Field,
}

pub const TEXT_TYPE: &str = "text";
const FIELD_TYPES: &[&str] = &[TEXT_TYPE, "long", "double", "json"];

fn default_field_type() -> String {
    "long".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStoreIndexArgs {
    pub project: String,
    pub logstore: String,
    #[serde(default)]
    pub index_type: IndexType,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub include_chinese: bool,
    /// Delimiter characters, one token per character
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub field_name: Option<String>,
    #[serde(default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub field_alias: Option<String>,
    #[serde(default)]
    pub enable_analytics: bool,
}

impl LogStoreIndexArgs {
    fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }
}

pub struct LogStoreIndex;

fn split_token(token: &str) -> Vec<String> {
    token.chars().map(String::from).collect()
}

fn join_token(tokens: &[String]) -> String {
    tokens.concat()
}

/// Write this resource's part into `index`
fn merge_into(args: &LogStoreIndexArgs, mut index: LogIndex) -> Result<LogIndex> {
    match args.index_type {
        IndexType::FullText => {
            index.line = Some(IndexLine {
                token: split_token(&args.token),
                case_sensitive: args.case_sensitive,
                chn: args.include_chinese,
            });
        }
        IndexType::Field => {
            let name = args.field_name().ok_or_else(|| {
                ProviderError::validation("'field_name' is required when 'index_type' is 'Field'")
            })?;
            // An unset alias keeps the one already on the key
            let alias = match args.field_alias {
                Some(ref alias) => alias.clone(),
                None => index
                    .keys
                    .get(name)
                    .map(|k| k.alias.clone())
                    .unwrap_or_default(),
            };
            index.keys.insert(
                name.to_string(),
                IndexKey {
                    field_type: args.field_type.clone(),
                    alias,
                    token: split_token(&args.token),
                    case_sensitive: args.case_sensitive,
                    chn: args.include_chinese,
                    doc_value: args.enable_analytics,
                },
            );
        }
    }
    Ok(index)
}

fn index_path(logstore: &str) -> String {
    format!("/logstores/{}/index", logstore)
}

async fn put_index(
    client: &AliyunClient,
    project: &str,
    logstore: &str,
    index: &LogIndex,
) -> Result<()> {
    let body = serde_json::to_value(index)?;
    call_with_retry(client, project, RestRequest::put(index_path(logstore), body)).await?;
    Ok(())
}

#[async_trait]
impl Resource for LogStoreIndex {
    const TYPE_NAME: &'static str = "alicloud_log_store_index";
    type Args = LogStoreIndexArgs;
    type Attributes = NoAttributes;

    fn validate(args: &LogStoreIndexArgs) -> Result<()> {
        if args.index_type == IndexType::Field {
            if args.field_name().is_none() {
                return Err(ProviderError::validation(
                    "'field_name' is required when 'index_type' is 'Field'",
                ));
            }
            one_of("field_type", &args.field_type, FIELD_TYPES)?;
            if args.field_type == TEXT_TYPE && args.token.is_empty() {
                return Err(ProviderError::validation(
                    "'token' is required when 'field_type' is 'text'",
                ));
            }
        }
        Ok(())
    }

    fn replacement_fields(
        prior: &LogStoreIndexArgs,
        desired: &LogStoreIndexArgs,
    ) -> Vec<&'static str> {
        let mut diff = Diff::new();
        diff.check("project", &prior.project, &desired.project);
        diff.check("logstore", &prior.logstore, &desired.logstore);
        diff.check("index_type", &prior.index_type, &desired.index_type);
        if desired.index_type == IndexType::Field {
            diff.check("field_name", &prior.field_name(), &desired.field_name());
        }
        diff.into_fields()
    }

    async fn create(client: &AliyunClient, args: &LogStoreIndexArgs) -> Result<StateOf<Self>> {
        let project = args.project.as_str();
        let logstore = args.logstore.as_str();

        if describe_log_store(client, project, logstore).await?.is_none() {
            return Err(ProviderError::not_found(
                "Log Store",
                join_id(&[project, logstore]),
            ));
        }

        let id = match args.field_name().filter(|_| args.index_type == IndexType::Field) {
            Some(field) => join_id(&[project, logstore, field]),
            None => join_id(&[project, logstore]),
        };

        match describe_index(client, project, logstore).await? {
            Some(existing) => {
                match args.index_type {
                    IndexType::FullText if existing.line.is_some() => {
                        return Err(ProviderError::validation(format!(
                            "There is already a FullText index in the logstore {}. Please import it using id '{}'.",
                            logstore, id
                        )));
                    }
                    IndexType::Field
                        if args.field_name().is_some_and(|f| existing.keys.contains_key(f)) =>
                    {
                        return Err(ProviderError::validation(format!(
                            "There is already a Field index with key {} in the logstore {}. Please import it using id '{}'.",
                            args.field_name().unwrap_or_default(),
                            logstore,
                            id
                        )));
                    }
                    _ => {}
                }
                let index = merge_into(args, existing)?;
                tracing::info!("Adding to the existing index of logstore {}", logstore);
                put_index(client, project, logstore, &index).await?;
            }
            None => {
                let index = merge_into(args, LogIndex::default())?;
                tracing::info!("Creating index for logstore {}", logstore);
                let body = serde_json::to_value(&index)?;
                let request = RestRequest::post(index_path(logstore), body);
                call_with_retry(client, project, request).await?;
            }
        }

        read_back::<Self>(client, &id, args).await
    }

    async fn read(client: &AliyunClient, id: &str) -> Result<Option<StateOf<Self>>> {
        let parts = split_id_range(id, 2, 3)?;
        let (project, logstore) = (parts[0], parts[1]);

        let Some(index) = describe_index(client, project, logstore).await? else {
            tracing::warn!("Index of logstore {} not found", logstore);
            return Ok(None);
        };

        let args = match parts.get(2) {
            None => {
                let Some(line) = index.line else {
                    return Ok(None);
                };
                LogStoreIndexArgs {
                    project: project.to_string(),
                    logstore: logstore.to_string(),
                    index_type: IndexType::FullText,
                    case_sensitive: line.case_sensitive,
                    include_chinese: line.chn,
                    token: join_token(&line.token),
                    field_name: None,
                    field_type: default_field_type(),
                    field_alias: None,
                    enable_analytics: false,
                }
            }
            Some(field) => {
                let Some(key) = index.keys.get(*field) else {
                    return Ok(None);
                };
                LogStoreIndexArgs {
                    project: project.to_string(),
                    logstore: logstore.to_string(),
                    index_type: IndexType::Field,
                    case_sensitive: key.case_sensitive,
                    include_chinese: key.chn,
                    token: join_token(&key.token),
                    field_name: Some(field.to_string()),
                    field_type: key.field_type.clone(),
                    field_alias: Some(key.alias.clone()).filter(|a| !a.is_empty()),
                    enable_analytics: key.doc_value,
                }
            }
        };

        Ok(Some(State::new(id, args, NoAttributes {})))
    }

    async fn update(
        client: &AliyunClient,
        prior: &StateOf<Self>,
        desired: &LogStoreIndexArgs,
    ) -> Result<StateOf<Self>> {
        let old = &prior.args;
        let mut diff = Diff::new();
        diff.check("case_sensitive", &old.case_sensitive, &desired.case_sensitive);
        diff.check("include_chinese", &old.include_chinese, &desired.include_chinese);
        diff.check("token", &old.token, &desired.token);
        if desired.index_type == IndexType::Field {
            diff.check("field_type", &old.field_type, &desired.field_type);
            diff.check_set("field_alias", &old.field_alias, &desired.field_alias);
            diff.check("enable_analytics", &old.enable_analytics, &desired.enable_analytics);
        }

        if !diff.is_empty() {
            let existing = describe_index(client, &old.project, &old.logstore)
                .await?
                .unwrap_or_default();
            let index = merge_into(desired, existing)?;
            tracing::info!("Updating index {}: {:?}", prior.id, diff.fields());
            put_index(client, &old.project, &old.logstore, &index).await?;
        }

        read_back::<Self>(client, &prior.id, desired).await
    }

    async fn delete(client: &AliyunClient, id: &str) -> Result<()> {
        let parts = split_id_range(id, 2, 3)?;
        let (project, logstore) = (parts[0], parts[1]);

        let Some(mut index) = describe_index(client, project, logstore).await? else {
            return Ok(());
        };

        let removed = match parts.get(2) {
            None => index.line.take().is_some(),
            Some(field) => index.keys.remove(*field).is_some(),
        };
        if !removed {
            return Ok(());
        }

        if index.is_empty() {
            tracing::info!("Deleting the index of logstore {}", logstore);
            call_with_retry(client, project, RestRequest::delete(index_path(logstore))).await?;
        } else {
            put_index(client, project, logstore, &index).await?;
        }
        Ok(())
    }
}
