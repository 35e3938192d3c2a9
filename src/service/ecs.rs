//! ECS describe, action and wait helpers

use super::response::{list_at, lookup, str_or_empty, string_at, strings_at};
use crate::aliyun::{AliyunClient, RpcRequest};
use crate::error::{codes, ProviderError, Result};
use crate::wait::{wait_for_status, WaitOptions};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Instance statuses
pub mod status {
    pub const PENDING: &str = "Pending";
    pub const STARTING: &str = "Starting";
    pub const RUNNING: &str = "Running";
    pub const STOPPING: &str = "Stopping";
    pub const STOPPED: &str = "Stopped";
}

/// Describe an instance. `None` when it does not exist.
pub async fn describe_instance(client: &AliyunClient, id: &str) -> Result<Option<Value>> {
    let ids = serde_json::to_string(&[id])?;
    let request = RpcRequest::new("DescribeInstances").set("InstanceIds", ids);

    let response = match client.ecs(request).await {
        Ok(r) => r,
        Err(e)
            if e.is_api_error(&[codes::INSTANCE_NOT_FOUND, codes::INSTANCE_NOT_FOUND_LEGACY]) =>
        {
            return Ok(None)
        }
        Err(e) => return Err(e),
    };

    Ok(list_at(&response, "Instances.Instance")
        .iter()
        .find(|i| str_or_empty(i, "InstanceId") == id)
        .cloned())
}

/// The instance's system disk. `None` when no disk is attached.
pub async fn describe_system_disk(
    client: &AliyunClient,
    instance_id: &str,
) -> Result<Option<Value>> {
    let request = RpcRequest::new("DescribeDisks")
        .set("InstanceId", instance_id)
        .set("DiskType", "system");
    let response = client.ecs(request).await?;

    Ok(list_at(&response, "Disks.Disk").first().cloned())
}

/// Base64-decoded user data. Data that is not valid base64 is returned as is.
pub async fn describe_user_data(
    client: &AliyunClient,
    instance_id: &str,
) -> Result<Option<String>> {
    let request = RpcRequest::new("DescribeUserdata").set("InstanceId", instance_id);
    let response = client.ecs(request).await?;

    Ok(string_at(&response, "UserData")
        .filter(|v| !v.is_empty())
        .map(|raw| decode_user_data(&raw)))
}

pub fn decode_user_data(raw: &str) -> String {
    STANDARD
        .decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string())
}

/// Verify that `zone_id` exists and offers `resource_type` and `disk_category`
pub async fn check_zone(
    client: &AliyunClient,
    zone_id: &str,
    resource_type: &str,
    disk_category: &str,
) -> Result<()> {
    let response = client.ecs(RpcRequest::new("DescribeZones")).await?;
    let zones = list_at(&response, "Zones.Zone");

    let Some(zone) = zones.iter().find(|z| str_or_empty(z, "ZoneId") == zone_id) else {
        let known: Vec<String> = zones.iter().map(|z| str_or_empty(z, "ZoneId")).collect();
        return Err(ProviderError::validation(format!(
            "availability zone {} is not available in region {}. Expected one of {:?}",
            zone_id, client.region, known
        )));
    };

    let resources = strings_at(zone, "AvailableResourceCreation.ResourceTypes");
    if !resources.iter().any(|r| r == resource_type) {
        return Err(ProviderError::validation(format!(
            "{} is not available in zone {}",
            resource_type, zone_id
        )));
    }

    let disks = strings_at(zone, "AvailableDiskCategories.DiskCategories");
    if !disks.iter().any(|d| d == disk_category) {
        return Err(ProviderError::validation(format!(
            "disk category {} is not available in zone {}. Expected one of {:?}",
            disk_category, zone_id, disks
        )));
    }

    Ok(())
}

/// True when the security group exists
pub async fn security_group_exists(client: &AliyunClient, id: &str) -> Result<bool> {
    let request = RpcRequest::new("DescribeSecurityGroupAttribute").set("SecurityGroupId", id);
    match client.ecs(request).await {
        Ok(sg) => Ok(lookup(&sg, "SecurityGroupId").is_some()),
        Err(e) if e.is_api_error(&[codes::SECURITY_GROUP_NOT_FOUND]) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Describe a VPC switch. `None` when it does not exist.
pub async fn describe_vswitch(client: &AliyunClient, id: &str) -> Result<Option<Value>> {
    let request = RpcRequest::new("DescribeVSwitches").set("VSwitchId", id);
    let response = client.ecs(request).await?;

    Ok(list_at(&response, "VSwitches.VSwitch")
        .iter()
        .find(|v| str_or_empty(v, "VSwitchId") == id)
        .cloned())
}

/// Tags on an instance
pub async fn describe_tags(
    client: &AliyunClient,
    instance_id: &str,
) -> Result<BTreeMap<String, String>> {
    let request = RpcRequest::new("DescribeTags")
        .set("ResourceType", "instance")
        .set("ResourceId", instance_id);
    let response = client.ecs(request).await?;

    Ok(list_at(&response, "Tags.Tag")
        .iter()
        .map(|t| (str_or_empty(t, "TagKey"), str_or_empty(t, "TagValue")))
        .filter(|(k, _)| !k.is_empty())
        .collect())
}

fn tag_request(action: &str, instance_id: &str, tags: &BTreeMap<String, String>) -> RpcRequest {
    let mut request = RpcRequest::new(action)
        .set("ResourceType", "instance")
        .set("ResourceId", instance_id);
    for (n, (k, v)) in tags.iter().enumerate() {
        request = request
            .set(&format!("Tag.{}.Key", n + 1), k)
            .set(&format!("Tag.{}.Value", n + 1), v);
    }
    request
}

pub async fn add_tags(
    client: &AliyunClient,
    instance_id: &str,
    tags: &BTreeMap<String, String>,
) -> Result<()> {
    if tags.is_empty() {
        return Ok(());
    }
    client.ecs(tag_request("AddTags", instance_id, tags)).await?;
    Ok(())
}

pub async fn remove_tags(
    client: &AliyunClient,
    instance_id: &str,
    tags: &BTreeMap<String, String>,
) -> Result<()> {
    if tags.is_empty() {
        return Ok(());
    }
    client.ecs(tag_request("RemoveTags", instance_id, tags)).await?;
    Ok(())
}

pub async fn join_security_groups(
    client: &AliyunClient,
    instance_id: &str,
    groups: &[String],
) -> Result<()> {
    for group in groups {
        let request = RpcRequest::new("JoinSecurityGroup")
            .set("InstanceId", instance_id)
            .set("SecurityGroupId", group);
        client.ecs(request).await?;
    }
    Ok(())
}

pub async fn leave_security_groups(
    client: &AliyunClient,
    instance_id: &str,
    groups: &[String],
) -> Result<()> {
    for group in groups {
        let request = RpcRequest::new("LeaveSecurityGroup")
            .set("InstanceId", instance_id)
            .set("SecurityGroupId", group);
        client.ecs(request).await?;
    }
    Ok(())
}

pub async fn start_instance(client: &AliyunClient, id: &str) -> Result<()> {
    client
        .ecs(RpcRequest::new("StartInstance").set("InstanceId", id))
        .await?;
    Ok(())
}

pub async fn stop_instance(client: &AliyunClient, id: &str, force: bool) -> Result<()> {
    client
        .ecs(
            RpcRequest::new("StopInstance")
                .set("InstanceId", id)
                .set("ForceStop", force),
        )
        .await?;
    Ok(())
}

pub async fn reboot_instance(client: &AliyunClient, id: &str) -> Result<()> {
    client
        .ecs(
            RpcRequest::new("RebootInstance")
                .set("InstanceId", id)
                .set("ForceStop", false),
        )
        .await?;
    Ok(())
}

pub async fn delete_instance(client: &AliyunClient, id: &str) -> Result<()> {
    client
        .ecs(RpcRequest::new("DeleteInstance").set("InstanceId", id))
        .await?;
    Ok(())
}

/// Allocate a public IP address and return it
pub async fn allocate_public_ip(client: &AliyunClient, id: &str) -> Result<String> {
    let response = client
        .ecs(RpcRequest::new("AllocatePublicIpAddress").set("InstanceId", id))
        .await?;
    Ok(str_or_empty(&response, "IpAddress"))
}

/// Wait for an instance status (see [`status`])
pub async fn wait_for_instance(
    client: &AliyunClient,
    id: &str,
    target: &str,
    timeout: Duration,
) -> Result<()> {
    let options = WaitOptions::new(client.timeouts(), timeout);
    wait_for_status("Instance", id, target, options, move || async move {
        Ok(describe_instance(client, id)
            .await?
            .and_then(|i| string_at(&i, "Status")))
    })
    .await
}
