//! alicloud_instance: ECS instances

use super::diff::Diff;
use super::validation::{int_in_range, length_in_range, one_of};
use super::{read_back, Resource, State, StateOf};
use crate::aliyun::{AliyunClient, RpcRequest};
use crate::error::{ProviderError, Result};
use crate::service::ecs::{
    add_tags, allocate_public_ip, check_zone, delete_instance, describe_instance,
    describe_system_disk, describe_tags, describe_user_data, join_security_groups,
    leave_security_groups, reboot_instance, remove_tags, security_group_exists, start_instance,
    status, stop_instance, wait_for_instance,
};
use crate::service::response::{bool_at, i64_at, str_or_empty, string_at, strings_at};
use crate::wait::{retry, RetryOutcome};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

pub const PRE_PAID: &str = "PrePaid";
pub const POST_PAID: &str = "PostPaid";
pub const IO_OPTIMIZED: &str = "optimized";
pub const IO_NONE: &str = "none";

const DISK_CATEGORIES: &[&str] = &["cloud", "cloud_ssd", "cloud_efficiency", "ephemeral_ssd"];
const INTERNET_CHARGE_TYPES: &[&str] = &["PayByBandwidth", "PayByTraffic"];

fn default_instance_name() -> String {
    "ECS-Instance".to_string()
}

fn default_disk_category() -> String {
    "cloud".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceArgs {
    #[serde(default)]
    pub availability_zone: Option<String>,
    pub image_id: String,
    pub instance_type: String,
    #[serde(default)]
    pub security_groups: BTreeSet<String>,
    #[serde(default)]
    pub allocate_public_ip: bool,
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub internet_charge_type: Option<String>,
    #[serde(default)]
    pub internet_max_bandwidth_out: i64,
    #[serde(default)]
    pub host_name: Option<String>,
    /// Never returned by the API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub io_optimized: String,
    #[serde(default = "default_disk_category")]
    pub system_disk_category: String,
    #[serde(default)]
    pub system_disk_size: Option<i64>,
    #[serde(default)]
    pub vswitch_id: Option<String>,
    #[serde(default)]
    pub instance_charge_type: Option<String>,
    /// Months, PrePaid only
    #[serde(default)]
    pub period: Option<i64>,
    #[serde(default)]
    pub user_data: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl InstanceArgs {
    fn is_pre_paid(&self) -> bool {
        self.instance_charge_type.as_deref() == Some(PRE_PAID)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAttributes {
    #[serde(default)]
    pub public_ip: String,
    #[serde(default)]
    pub private_ip: String,
    #[serde(default)]
    pub status: String,
}

pub struct Instance;

/// Parameters shared by `CreateInstance` and `RunInstances`
fn launch_request(action: &str, args: &InstanceArgs, security_group: Option<&str>) -> RpcRequest {
    let io_optimized = if args.io_optimized == IO_OPTIMIZED {
        IO_OPTIMIZED
    } else {
        IO_NONE
    };

    RpcRequest::new(action)
        .set("ImageId", &args.image_id)
        .set("InstanceType", &args.instance_type)
        .set_opt("ZoneId", args.availability_zone.as_deref())
        .set("SystemDisk.Category", &args.system_disk_category)
        .set_opt("SystemDisk.Size", args.system_disk_size)
        .set_opt("SecurityGroupId", security_group)
        .set_opt("InstanceName", Some(args.instance_name.as_str()))
        .set_opt("Description", args.description.as_deref())
        .set_opt("InternetChargeType", args.internet_charge_type.as_deref())
        .set_opt(
            "InternetMaxBandwidthOut",
            Some(args.internet_max_bandwidth_out).filter(|b| *b > 0),
        )
        .set_opt("HostName", args.host_name.as_deref())
        .set_opt("Password", args.password.as_deref())
        .set("IoOptimized", io_optimized)
        .set_opt("InstanceChargeType", args.instance_charge_type.as_deref())
        .set_opt("Period", args.period.filter(|p| *p > 0))
        .set_opt(
            "UserData",
            args.user_data.as_deref().map(|d| STANDARD.encode(d)),
        )
        .set_opt("VSwitchId", args.vswitch_id.as_deref())
}

/// Security groups not passed at launch. The first group goes into the launch request.
fn remaining_security_groups(args: &InstanceArgs) -> Vec<String> {
    args.security_groups.iter().skip(1).cloned().collect()
}

/// Tags to remove and tags to add to get from `prior` to `desired`
fn tag_changes(
    prior: &BTreeMap<String, String>,
    desired: &BTreeMap<String, String>,
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let remove = prior
        .iter()
        .filter(|(k, v)| desired.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let add = desired
        .iter()
        .filter(|(k, v)| prior.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    (remove, add)
}

fn private_ip(instance: &Value) -> String {
    let vpc = strings_at(instance, "VpcAttributes.PrivateIpAddress.IpAddress");
    if let Some(ip) = vpc.first() {
        return ip.clone();
    }
    strings_at(instance, "InnerIpAddress.IpAddress").join(",")
}

fn public_ip(instance: &Value) -> String {
    strings_at(instance, "PublicIpAddress.IpAddress")
        .into_iter()
        .next()
        .or_else(|| string_at(instance, "EipAddress.IpAddress").filter(|ip| !ip.is_empty()))
        .unwrap_or_default()
}

/// Log a failed post-create wait without failing the create
async fn wait_logged(client: &AliyunClient, id: &str, target: &str) {
    if let Err(e) = wait_for_instance(client, id, target, Duration::ZERO).await {
        tracing::warn!("Waiting for instance {} to become {} failed: {}", id, target, e);
    }
}

async fn allocate_ip_if_requested(
    client: &AliyunClient,
    id: &str,
    args: &InstanceArgs,
) -> Result<()> {
    if args.allocate_public_ip {
        let ip = allocate_public_ip(client, id).await?;
        tracing::info!("Allocated public IP {} for instance {}", ip, id);
    }
    Ok(())
}

#[async_trait]
impl Resource for Instance {
    const TYPE_NAME: &'static str = "alicloud_instance";
    type Args = InstanceArgs;
    type Attributes = InstanceAttributes;

    fn validate(args: &InstanceArgs) -> Result<()> {
        length_in_range("instance_name", &args.instance_name, 2, 128)?;
        if let Some(ref description) = args.description {
            length_in_range("description", description, 2, 256)?;
        }
        if let Some(ref charge) = args.internet_charge_type {
            one_of("internet_charge_type", charge, INTERNET_CHARGE_TYPES)?;
        }
        int_in_range("internet_max_bandwidth_out", args.internet_max_bandwidth_out, 0, 100)?;
        one_of("io_optimized", &args.io_optimized, &[IO_OPTIMIZED, IO_NONE])?;
        one_of("system_disk_category", &args.system_disk_category, DISK_CATEGORIES)?;
        if let Some(size) = args.system_disk_size {
            int_in_range("system_disk_size", size, 40, 500)?;
        }
        if let Some(ref charge) = args.instance_charge_type {
            one_of("instance_charge_type", charge, &[PRE_PAID, POST_PAID])?;
        }
        if args.is_pre_paid() && args.period.unwrap_or_default() == 0 {
            return Err(ProviderError::validation(
                "period is required for instance_charge_type is PrePaid",
            ));
        }
        if args.allocate_public_ip && args.internet_max_bandwidth_out <= 0 {
            return Err(ProviderError::validation(
                "if allocate_public_ip is true then internet_max_bandwidth_out cannot equal zero",
            ));
        }
        Ok(())
    }

    fn replacement_fields(prior: &InstanceArgs, desired: &InstanceArgs) -> Vec<&'static str> {
        let mut diff = Diff::new();
        diff.check_set("availability_zone", &prior.availability_zone, &desired.availability_zone);
        diff.check("image_id", &prior.image_id, &desired.image_id);
        diff.check("instance_type", &prior.instance_type, &desired.instance_type);
        diff.check_set(
            "internet_charge_type",
            &prior.internet_charge_type,
            &desired.internet_charge_type,
        );
        diff.check(
            "internet_max_bandwidth_out",
            &prior.internet_max_bandwidth_out,
            &desired.internet_max_bandwidth_out,
        );
        diff.check("io_optimized", &prior.io_optimized, &desired.io_optimized);
        diff.check(
            "system_disk_category",
            &prior.system_disk_category,
            &desired.system_disk_category,
        );
        diff.check_set("system_disk_size", &prior.system_disk_size, &desired.system_disk_size);
        diff.check_set(
            "instance_charge_type",
            &prior.instance_charge_type,
            &desired.instance_charge_type,
        );
        diff.check_set("period", &prior.period, &desired.period);
        diff.check_set("user_data", &prior.user_data, &desired.user_data);
        diff.into_fields()
    }

    fn carry_over(known: &InstanceArgs, args: &mut InstanceArgs) {
        args.password = known.password.clone();
        args.allocate_public_ip = known.allocate_public_ip;
        if args.period.is_none() {
            args.period = known.period;
        }
    }

    async fn create(client: &AliyunClient, args: &InstanceArgs) -> Result<StateOf<Self>> {
        if let Some(ref zone) = args.availability_zone {
            check_zone(client, zone, "Instance", &args.system_disk_category).await?;
        }

        let mut security_group = None;
        if let Some(first) = args.security_groups.iter().next() {
            if security_group_exists(client, first).await? {
                security_group = Some(first.as_str());
            } else {
                tracing::warn!("Security group {} not found, creating instance without it", first);
            }
        }

        let id = if args.is_pre_paid() {
            let request = launch_request("CreateInstance", args, security_group);
            let response = client.ecs(request).await?;
            let id = string_at(&response, "InstanceId")
                .ok_or_else(|| ProviderError::response("CreateInstance", "missing InstanceId"))?;
            tracing::info!("Created instance {}", id);

            allocate_ip_if_requested(client, &id, args).await?;
            wait_logged(client, &id, status::STOPPED).await;
            start_instance(client, &id).await?;
            wait_logged(client, &id, status::RUNNING).await;
            id
        } else {
            let request = launch_request("RunInstances", args, security_group).set("Amount", 1);
            let response = client.ecs(request).await?;
            let id = string_at(&response, "InstanceIdSets.InstanceIdSet.0")
                .ok_or_else(|| ProviderError::response("RunInstances", "missing InstanceIdSet"))?;
            tracing::info!("Launched instance {}", id);

            wait_logged(client, &id, status::RUNNING).await;
            allocate_ip_if_requested(client, &id, args).await?;
            wait_logged(client, &id, status::RUNNING).await;
            id
        };

        add_tags(client, &id, &args.tags).await?;

        // Launch takes a single group, the rest are joined afterwards
        let extra = remaining_security_groups(args);
        if !extra.is_empty() {
            tracing::info!("Joining instance {} to security groups {:?}", id, extra);
            join_security_groups(client, &id, &extra).await?;
        }

        read_back::<Self>(client, &id, args).await
    }

    async fn read(client: &AliyunClient, id: &str) -> Result<Option<StateOf<Self>>> {
        let Some(instance) = describe_instance(client, id).await? else {
            tracing::warn!("Instance {} not found", id);
            return Ok(None);
        };

        let disk = describe_system_disk(client, id).await?;
        let user_data = describe_user_data(client, id).await?;
        let tags = describe_tags(client, id).await?;

        let text = |path: &str| string_at(&instance, path).filter(|v| !v.is_empty());

        let args = InstanceArgs {
            availability_zone: text("ZoneId"),
            image_id: str_or_empty(&instance, "ImageId"),
            instance_type: str_or_empty(&instance, "InstanceType"),
            security_groups: strings_at(&instance, "SecurityGroupIds.SecurityGroupId")
                .into_iter()
                .collect(),
            allocate_public_ip: false,
            instance_name: text("InstanceName").unwrap_or_else(default_instance_name),
            description: text("Description"),
            internet_charge_type: text("InternetChargeType"),
            internet_max_bandwidth_out: i64_at(&instance, "InternetMaxBandwidthOut")
                .unwrap_or_default(),
            host_name: text("HostName"),
            password: None,
            io_optimized: if bool_at(&instance, "IoOptimized").unwrap_or(false) {
                IO_OPTIMIZED.to_string()
            } else {
                IO_NONE.to_string()
            },
            system_disk_category: disk
                .as_ref()
                .and_then(|d| string_at(d, "Category"))
                .unwrap_or_else(default_disk_category),
            system_disk_size: disk.as_ref().and_then(|d| i64_at(d, "Size")),
            vswitch_id: text("VpcAttributes.VSwitchId"),
            instance_charge_type: text("InstanceChargeType"),
            period: None,
            user_data,
            tags,
        };
        let attributes = InstanceAttributes {
            public_ip: public_ip(&instance),
            private_ip: private_ip(&instance),
            status: str_or_empty(&instance, "Status"),
        };

        Ok(Some(State::new(id, args, attributes)))
    }

    async fn update(
        client: &AliyunClient,
        prior: &StateOf<Self>,
        desired: &InstanceArgs,
    ) -> Result<StateOf<Self>> {
        let id = prior.id.as_str();
        let old = &prior.args;

        if desired.vswitch_id.is_some() && desired.vswitch_id != old.vswitch_id {
            return Err(ProviderError::validation(format!(
                "'vswitch_id' isn't allowed to modify. Current instance's vswitch id is {:?}",
                old.vswitch_id.as_deref().unwrap_or_default()
            )));
        }

        let (remove, add) = tag_changes(&old.tags, &desired.tags);
        remove_tags(client, id, &remove).await?;
        add_tags(client, id, &add).await?;

        let mut diff = Diff::new();
        let mut request = RpcRequest::new("ModifyInstanceAttribute").set("InstanceId", id);
        if diff.check("instance_name", &old.instance_name, &desired.instance_name) {
            request = request.set("InstanceName", &desired.instance_name);
        }
        if diff.check_set("description", &old.description, &desired.description) {
            request = request.set_opt("Description", desired.description.as_deref());
        }
        if diff.check_set("host_name", &old.host_name, &desired.host_name) {
            request = request.set_opt("HostName", desired.host_name.as_deref());
        }
        let password_changed = diff.check_set("password", &old.password, &desired.password);
        if password_changed {
            request = request.set_opt("Password", desired.password.as_deref());
        }

        if !diff.is_empty() {
            tracing::info!("Modifying instance {}: {:?}", id, diff.fields());
            client.ecs(request).await?;
        }

        if password_changed && prior.attributes.status.eq_ignore_ascii_case(status::RUNNING) {
            tracing::info!("Rebooting instance {} to apply the new password", id);
            reboot_instance(client, id).await?;
            wait_for_instance(client, id, status::RUNNING, Duration::ZERO).await?;
        }

        let joined: Vec<String> = desired
            .security_groups
            .difference(&old.security_groups)
            .cloned()
            .collect();
        let left: Vec<String> = old
            .security_groups
            .difference(&desired.security_groups)
            .cloned()
            .collect();
        join_security_groups(client, id, &joined).await?;
        leave_security_groups(client, id, &left).await?;

        read_back::<Self>(client, id, desired).await
    }

    async fn delete(client: &AliyunClient, id: &str) -> Result<()> {
        let timeouts = client.timeouts();
        retry(
            &format!("delete instance {}", id),
            timeouts.delete(),
            timeouts.poll_interval(),
            move || async move {
                let Some(instance) = describe_instance(client, id).await? else {
                    return Ok(RetryOutcome::Done(()));
                };

                let current = str_or_empty(&instance, "Status");
                if !current.eq_ignore_ascii_case(status::STOPPED) {
                    if let Err(e) = stop_instance(client, id, true).await {
                        return Ok(RetryOutcome::Again(format!("stop failed: {}", e)));
                    }
                    let stopped =
                        wait_for_instance(client, id, status::STOPPED, Duration::ZERO).await;
                    if let Err(e) = stopped {
                        return Ok(RetryOutcome::Again(format!("not stopped yet: {}", e)));
                    }
                }

                match delete_instance(client, id).await {
                    Ok(()) => Ok(RetryOutcome::Done(())),
                    Err(e) => Ok(RetryOutcome::Again(format!("instance in use: {}", e))),
                }
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args() -> InstanceArgs {
        serde_json::from_value(json!({
            "image_id": "ubuntu_16",
            "instance_type": "ecs.n4.small",
            "io_optimized": "optimized",
            "security_groups": ["sg-1"],
            "user_data": "echo hello"
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_and_validation() {
        let args = args();
        assert_eq!(args.instance_name, "ECS-Instance");
        assert_eq!(args.system_disk_category, "cloud");
        assert!(Instance::validate(&args).is_ok());

        let mut bad = args.clone();
        bad.system_disk_size = Some(20);
        assert!(Instance::validate(&bad).is_err());

        let mut bad = args.clone();
        bad.instance_charge_type = Some(PRE_PAID.to_string());
        let err = Instance::validate(&bad).unwrap_err();
        assert!(err.to_string().contains("period"));

        let mut bad = args;
        bad.allocate_public_ip = true;
        assert!(Instance::validate(&bad).is_err());
        bad.internet_max_bandwidth_out = 5;
        assert!(Instance::validate(&bad).is_ok());
    }

    #[test]
    fn test_launch_request() {
        let mut args = args();
        args.password = Some("Secret123".to_string());
        let request = launch_request("RunInstances", &args, Some("sg-1"));
        assert_eq!(request.get("ImageId"), Some("ubuntu_16"));
        assert_eq!(request.get("SecurityGroupId"), Some("sg-1"));
        assert_eq!(request.get("IoOptimized"), Some("optimized"));
        assert_eq!(request.get("UserData"), Some("ZWNobyBoZWxsbw=="));
        assert_eq!(request.get("Password"), Some("Secret123"));
        assert_eq!(request.get("InternetMaxBandwidthOut"), None);
        assert_eq!(request.get("Period"), None);
    }

    #[test]
    fn test_remaining_security_groups() {
        let mut args = args();
        assert!(remaining_security_groups(&args).is_empty());

        args.security_groups.insert("sg-3".to_string());
        args.security_groups.insert("sg-2".to_string());
        assert_eq!(remaining_security_groups(&args), vec!["sg-2", "sg-3"]);
    }

    #[test]
    fn test_tag_changes() {
        let prior: BTreeMap<String, String> = [("env", "dev"), ("app", "web")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let desired: BTreeMap<String, String> = [("env", "prod"), ("team", "ops")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let (remove, add) = tag_changes(&prior, &desired);
        assert_eq!(remove.keys().collect::<Vec<_>>(), vec!["app", "env"]);
        assert_eq!(add.get("env").map(String::as_str), Some("prod"));
        assert!(add.contains_key("team"));
    }

    #[test]
    fn test_carry_over_keeps_secrets() {
        let mut known = args();
        known.password = Some("Secret123".to_string());
        known.allocate_public_ip = true;
        known.period = Some(1);

        let mut read = args();
        Instance::carry_over(&known, &mut read);
        assert_eq!(read.password.as_deref(), Some("Secret123"));
        assert!(read.allocate_public_ip);
        assert_eq!(read.period, Some(1));
    }

    #[test]
    fn test_ip_extraction() {
        let vpc = json!({
            "VpcAttributes": {"PrivateIpAddress": {"IpAddress": ["172.16.0.5"]}},
            "InnerIpAddress": {"IpAddress": []},
            "PublicIpAddress": {"IpAddress": ["47.0.0.1"]}
        });
        assert_eq!(private_ip(&vpc), "172.16.0.5");
        assert_eq!(public_ip(&vpc), "47.0.0.1");

        let classic = json!({
            "InnerIpAddress": {"IpAddress": ["10.0.0.1", "10.0.0.2"]},
            "EipAddress": {"IpAddress": "8.8.8.8"}
        });
        assert_eq!(private_ip(&classic), "10.0.0.1,10.0.0.2");
        assert_eq!(public_ip(&classic), "8.8.8.8");
    }

    #[test]
    fn test_replacement_fields() {
        let prior = args();
        let mut desired = args();
        desired.instance_name = "web-1".to_string();
        desired.security_groups.insert("sg-2".to_string());
        assert!(Instance::replacement_fields(&prior, &desired).is_empty());

        desired.image_id = "centos_7".to_string();
        desired.system_disk_size = Some(80);
        assert_eq!(
            Instance::replacement_fields(&prior, &desired),
            vec!["image_id", "system_disk_size"]
        );
    }
}
