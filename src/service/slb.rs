//! SLB describe and wait helpers

use super::response::{i64_at, list_at, str_or_empty, string_at};
use crate::aliyun::{AliyunClient, RpcRequest};
use crate::error::{codes, ProviderError, Result};
use crate::wait::{wait_for_status, WaitOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Listener protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Tcp,
    Udp,
}

impl Protocol {
    /// Upper-case form used in action names (`CreateLoadBalancerHTTPListener`)
    pub fn api_name(self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }

    /// http and https listeners carry sticky session and layer-7 health checks
    pub fn is_layer7(self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(ProviderError::validation(format!(
                "protocol must be one of http, https, tcp, udp, got '{}'",
                other
            ))),
        }
    }
}

/// Describe a load balancer. `None` when it does not exist.
pub async fn describe_load_balancer(client: &AliyunClient, id: &str) -> Result<Option<Value>> {
    let request = RpcRequest::new("DescribeLoadBalancerAttribute").set("LoadBalancerId", id);

    let lb = match client.slb(request).await {
        Ok(lb) => lb,
        Err(e) if e.is_api_error(&[codes::LOAD_BALANCER_NOT_FOUND]) => return Ok(None),
        Err(e) => return Err(e),
    };

    if string_at(&lb, "LoadBalancerId").as_deref() != Some(id) {
        return Ok(None);
    }

    Ok(Some(lb))
}

/// Describe a listener. `None` when the load balancer or the listener is gone.
pub async fn describe_listener(
    client: &AliyunClient,
    load_balancer_id: &str,
    port: u16,
    protocol: Protocol,
) -> Result<Option<Value>> {
    let request = RpcRequest::new(format!(
        "DescribeLoadBalancer{}ListenerAttribute",
        protocol.api_name()
    ))
    .set("LoadBalancerId", load_balancer_id)
    .set("ListenerPort", port);

    let listener = match client.slb(request).await {
        Ok(listener) => listener,
        Err(e) if e.is_api_error(&[codes::LOAD_BALANCER_NOT_FOUND, codes::LISTENER_NOT_FOUND]) => {
            return Ok(None)
        }
        Err(e) => return Err(e),
    };

    if i64_at(&listener, "ListenerPort") != Some(i64::from(port)) {
        return Ok(None);
    }

    Ok(Some(listener))
}

/// Protocol of the listener on `port`, from the load balancer's port list.
/// `None` when the load balancer is gone or has no listener on that port.
pub async fn listener_protocol(
    client: &AliyunClient,
    load_balancer_id: &str,
    port: u16,
) -> Result<Option<Protocol>> {
    let Some(lb) = describe_load_balancer(client, load_balancer_id).await? else {
        return Ok(None);
    };

    list_at(&lb, "ListenerPortsAndProtocol.ListenerPortAndProtocol")
        .iter()
        .find(|p| i64_at(p, "ListenerPort") == Some(i64::from(port)))
        .map(|p| str_or_empty(p, "ListenerProtocol").parse())
        .transpose()
}

/// Id of the forwarding rule matching `domain` and `url` on a listener
pub async fn describe_rule_id(
    client: &AliyunClient,
    load_balancer_id: &str,
    port: u16,
    domain: &str,
    url: &str,
) -> Result<String> {
    let request = RpcRequest::new("DescribeRules")
        .set("LoadBalancerId", load_balancer_id)
        .set("ListenerPort", port);
    let response = client.slb(request).await?;

    list_at(&response, "Rules.Rule")
        .iter()
        .find(|r| str_or_empty(r, "Domain") == domain && str_or_empty(r, "Url") == url)
        .and_then(|r| string_at(r, "RuleId"))
        .ok_or_else(|| {
            ProviderError::not_found(
                "Rule",
                format!("domain={} url={} on {}:{}", domain, url, load_balancer_id, port),
            )
        })
}

/// Wait for a load balancer status (`active`, `inactive`, `locked`)
pub async fn wait_for_load_balancer(
    client: &AliyunClient,
    id: &str,
    status: &str,
    timeout: Duration,
) -> Result<()> {
    let options = WaitOptions::new(client.timeouts(), timeout);
    wait_for_status("Load Balancer", id, status, options, move || async move {
        Ok(describe_load_balancer(client, id)
            .await?
            .and_then(|lb| string_at(&lb, "LoadBalancerStatus")))
    })
    .await
}

/// Wait for a listener status (`stopped`, `running`)
pub async fn wait_for_listener(
    client: &AliyunClient,
    load_balancer_id: &str,
    port: u16,
    protocol: Protocol,
    status: &str,
    timeout: Duration,
) -> Result<()> {
    let options = WaitOptions::new(client.timeouts(), timeout);
    let id = format!("{}:{}", load_balancer_id, port);
    wait_for_status("Load Balancer Listener", &id, status, options, move || async move {
        Ok(describe_listener(client, load_balancer_id, port, protocol)
            .await?
            .and_then(|l| string_at(&l, "Status")))
    })
    .await
}
