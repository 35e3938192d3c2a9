//! alicloud_slb: Server Load Balancer instances

use super::diff::Diff;
use super::validation::{int_in_range, length_in_range, one_of};
use super::{read_back, Resource, State, StateOf};
use crate::aliyun::{AliyunClient, RpcRequest};
use crate::error::{codes, ProviderError, Result};
use crate::service::response::{i64_at, str_or_empty, string_at};
use crate::service::slb::{describe_load_balancer, wait_for_load_balancer};
use crate::wait::{retry, RetryOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const PAY_BY_TRAFFIC: &str = "paybytraffic";
pub const PAY_BY_BANDWIDTH: &str = "paybybandwidth";

const SPECIFICATIONS: &[&str] = &[
    "slb.s1.small",
    "slb.s2.small",
    "slb.s2.medium",
    "slb.s3.small",
    "slb.s3.medium",
    "slb.s3.large",
];

fn default_charge_type() -> String {
    PAY_BY_TRAFFIC.to_string()
}

fn default_bandwidth() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlbArgs {
    /// Generated as `tf-lb-<suffix>` when unset
    #[serde(default)]
    pub name: Option<String>,
    /// Internet-facing when true, intranet otherwise
    #[serde(default)]
    pub internet: bool,
    #[serde(default)]
    pub vswitch_id: Option<String>,
    #[serde(default = "default_charge_type")]
    pub internet_charge_type: String,
    #[serde(default = "default_bandwidth")]
    pub bandwidth: i64,
    #[serde(default)]
    pub specification: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlbAttributes {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub status: String,
}

pub struct Slb;

/// Default load balancer name
pub fn generate_name() -> String {
    format!("tf-lb-{}", uuid::Uuid::new_v4().simple())
}

#[async_trait]
impl Resource for Slb {
    const TYPE_NAME: &'static str = "alicloud_slb";
    type Args = SlbArgs;
    type Attributes = SlbAttributes;

    fn validate(args: &SlbArgs) -> Result<()> {
        if let Some(ref name) = args.name {
            length_in_range("name", name, 1, 80)?;
        }
        one_of(
            "internet_charge_type",
            &args.internet_charge_type.to_ascii_lowercase(),
            &[PAY_BY_TRAFFIC, PAY_BY_BANDWIDTH],
        )?;
        int_in_range("bandwidth", args.bandwidth, 1, 1000)?;
        if let Some(ref spec) = args.specification {
            one_of("specification", spec, SPECIFICATIONS)?;
        }
        Ok(())
    }

    fn replacement_fields(prior: &SlbArgs, desired: &SlbArgs) -> Vec<&'static str> {
        let mut diff = Diff::new();
        diff.check("internet", &prior.internet, &desired.internet);
        diff.check_set("vswitch_id", &prior.vswitch_id, &desired.vswitch_id);
        diff.into_fields()
    }

    async fn create(client: &AliyunClient, args: &SlbArgs) -> Result<StateOf<Self>> {
        let name = args.name.clone().unwrap_or_else(generate_name);
        let address_type = if args.internet { "internet" } else { "intranet" };

        let request = RpcRequest::new("CreateLoadBalancer")
            .set("LoadBalancerName", &name)
            .set("AddressType", address_type)
            .set("InternetChargeType", args.internet_charge_type.to_ascii_lowercase())
            .set_opt("VSwitchId", args.vswitch_id.as_deref())
            .set_opt("Bandwidth", Some(args.bandwidth).filter(|b| *b != 0))
            .set_opt("LoadBalancerSpec", args.specification.as_deref());

        tracing::info!("Creating load balancer {}", name);
        let response = client.slb(request).await.map_err(|e| {
            if e.is_api_error(&[codes::SLB_ORDER_FAILED]) {
                ProviderError::validation(format!(
                    "Your account may not support to create a '{}' load balancer. Please change it to '{}' and try again: {}",
                    PAY_BY_BANDWIDTH, PAY_BY_TRAFFIC, e
                ))
            } else {
                e
            }
        })?;

        let id = string_at(&response, "LoadBalancerId").ok_or_else(|| {
            ProviderError::response("CreateLoadBalancer", "missing LoadBalancerId")
        })?;

        wait_for_load_balancer(client, &id, "active", Duration::ZERO).await?;

        let written = SlbArgs {
            name: Some(name),
            ..args.clone()
        };
        read_back::<Self>(client, &id, &written).await
    }

    async fn read(client: &AliyunClient, id: &str) -> Result<Option<StateOf<Self>>> {
        let Some(lb) = describe_load_balancer(client, id).await? else {
            tracing::warn!("Load balancer {} not found", id);
            return Ok(None);
        };

        let non_empty = |path: &str| string_at(&lb, path).filter(|v| !v.is_empty());

        let args = SlbArgs {
            name: non_empty("LoadBalancerName"),
            internet: str_or_empty(&lb, "AddressType").eq_ignore_ascii_case("internet"),
            vswitch_id: non_empty("VSwitchId"),
            internet_charge_type: non_empty("InternetChargeType")
                .map(|v| v.to_ascii_lowercase())
                .unwrap_or_else(default_charge_type),
            bandwidth: i64_at(&lb, "Bandwidth").unwrap_or_else(default_bandwidth),
            specification: non_empty("LoadBalancerSpec"),
        };
        let attributes = SlbAttributes {
            address: str_or_empty(&lb, "Address"),
            status: str_or_empty(&lb, "LoadBalancerStatus"),
        };

        Ok(Some(State::new(id, args, attributes)))
    }

    async fn update(
        client: &AliyunClient,
        prior: &StateOf<Self>,
        desired: &SlbArgs,
    ) -> Result<StateOf<Self>> {
        let id = prior.id.as_str();
        let old = &prior.args;

        if let Some(ref name) = desired.name {
            if old.name.as_ref() != Some(name) {
                let request = RpcRequest::new("SetLoadBalancerName")
                    .set("LoadBalancerId", id)
                    .set("LoadBalancerName", name);
                client.slb(request).await?;
            }
        }

        let mut diff = Diff::new();
        let mut spec = RpcRequest::new("ModifyLoadBalancerInternetSpec").set("LoadBalancerId", id);
        if diff.check(
            "internet_charge_type",
            &old.internet_charge_type.to_ascii_lowercase(),
            &desired.internet_charge_type.to_ascii_lowercase(),
        ) {
            spec = spec.set(
                "InternetChargeType",
                desired.internet_charge_type.to_ascii_lowercase(),
            );
        }
        if diff.check("bandwidth", &old.bandwidth, &desired.bandwidth) {
            spec = spec.set("Bandwidth", desired.bandwidth);
        }
        if !diff.is_empty() {
            tracing::info!("Updating internet spec of load balancer {}: {:?}", id, diff.fields());
            client.slb(spec).await?;
        }

        if Diff::new().check_set("specification", &old.specification, &desired.specification) {
            let request = RpcRequest::new("ModifyLoadBalancerInstanceSpec")
                .set("LoadBalancerId", id)
                .set_opt("LoadBalancerSpec", desired.specification.as_deref());
            client.slb(request).await?;
        }

        read_back::<Self>(client, id, desired).await
    }

    async fn delete(client: &AliyunClient, id: &str) -> Result<()> {
        let timeouts = client.timeouts();
        retry(
            &format!("delete load balancer {}", id),
            timeouts.delete(),
            timeouts.poll_interval(),
            move || async move {
                let request = RpcRequest::new("DeleteLoadBalancer").set("LoadBalancerId", id);
                match client.slb(request).await {
                    Ok(_) => {}
                    Err(e) if e.is_api_error(&[codes::LOAD_BALANCER_NOT_FOUND]) => {
                        return Ok(RetryOutcome::Done(()))
                    }
                    Err(e) => return Err(e),
                }

                match describe_load_balancer(client, id).await? {
                    None => Ok(RetryOutcome::Done(())),
                    Some(_) => Ok(RetryOutcome::Again(format!(
                        "load balancer {} still exists",
                        id
                    ))),
                }
            },
        )
        .await
    }
}
