//! alicloud_slb_listener: a frontend port on a load balancer
//!
//! The id is `<load_balancer_id>:<frontend_port>`. The protocol is not part
//! of the id; it is resolved from the load balancer's port list on every
//! read and delete.

use super::diff::Diff;
use super::id::{join_id, parse_listener_id};
use super::validation::{all_of_split, int_in_range, length_in_range, one_of, required_when};
use super::{read_back, Resource, State, StateOf};
use crate::aliyun::{AliyunClient, RpcRequest};
use crate::error::{codes, ProviderError, Result};
use crate::service::response::{i64_at, string_at};
use crate::service::slb::{describe_listener, listener_protocol, wait_for_listener, Protocol};
use crate::wait::{retry, retry_on, RetryOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const ON: &str = "on";
pub const OFF: &str = "off";
pub const STICKY_INSERT: &str = "insert";
pub const STICKY_SERVER: &str = "server";

const SCHEDULERS: &[&str] = &["wrr", "wlc"];
const HEALTH_CHECK_TYPES: &[&str] = &["tcp", "http"];
const HTTP_CODES: &[&str] = &["http_2xx", "http_3xx", "http_4xx", "http_5xx"];

/// Health-check port value meaning "use the backend port"
const BACKEND_PORT_SENTINEL: i64 = -520;

fn default_scheduler() -> String {
    "wrr".to_string()
}
fn default_off() -> String {
    OFF.to_string()
}
fn default_on() -> String {
    ON.to_string()
}
fn default_health_check_type() -> String {
    "tcp".to_string()
}
fn default_health_check_uri() -> String {
    "/".to_string()
}
fn default_threshold() -> i64 {
    3
}
fn default_health_check_timeout() -> i64 {
    5
}
fn default_health_check_interval() -> i64 {
    2
}
fn default_http_code() -> String {
    "http_2xx".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlbListenerArgs {
    pub load_balancer_id: String,
    pub frontend_port: u16,
    pub backend_port: u16,
    pub protocol: Protocol,
    /// -1 for unlimited, otherwise 1..=1000 Mbps
    pub bandwidth: i64,
    #[serde(default = "default_scheduler")]
    pub scheduler: String,
    #[serde(default)]
    pub server_group_id: Option<String>,

    // http and https
    #[serde(default = "default_off")]
    pub sticky_session: String,
    #[serde(default)]
    pub sticky_session_type: Option<String>,
    #[serde(default)]
    pub cookie_timeout: Option<i64>,
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default = "default_on")]
    pub health_check: String,

    // tcp and udp
    #[serde(default)]
    pub persistence_timeout: i64,
    #[serde(default = "default_health_check_type")]
    pub health_check_type: String,

    #[serde(default)]
    pub health_check_domain: Option<String>,
    #[serde(default = "default_health_check_uri")]
    pub health_check_uri: String,
    #[serde(default)]
    pub health_check_connect_port: Option<i64>,
    #[serde(default = "default_threshold")]
    pub healthy_threshold: i64,
    #[serde(default = "default_threshold")]
    pub unhealthy_threshold: i64,
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout: i64,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: i64,
    #[serde(default = "default_http_code")]
    pub health_check_http_code: String,

    // https
    #[serde(default)]
    pub ssl_certificate_id: Option<String>,
}

impl SlbListenerArgs {
    fn sticky_on(&self) -> bool {
        self.protocol.is_layer7() && self.sticky_session == ON
    }

    /// tcp and udp listeners always health-check
    fn health_check_on(&self) -> bool {
        !self.protocol.is_layer7() || self.health_check == ON
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlbListenerAttributes {
    #[serde(default)]
    pub status: String,
}

pub struct SlbListener;

/// Name of the health-check timeout parameter; layer-7 and layer-4
/// listeners call it differently.
pub fn health_check_timeout_param(protocol: Protocol) -> &'static str {
    if protocol.is_layer7() {
        "HealthCheckTimeout"
    } else {
        "HealthCheckConnectTimeout"
    }
}

fn base_request(action: String, args: &SlbListenerArgs) -> RpcRequest {
    RpcRequest::new(action)
        .set("LoadBalancerId", &args.load_balancer_id)
        .set("ListenerPort", args.frontend_port)
        .set("BackendServerPort", args.backend_port)
        .set("Bandwidth", args.bandwidth)
        .set_opt("VServerGroupId", args.server_group_id.as_deref())
}

/// Full create request for the listener's protocol
fn create_request(args: &SlbListenerArgs) -> RpcRequest {
    let protocol = args.protocol;
    let mut request = base_request(
        format!("CreateLoadBalancer{}Listener", protocol.api_name()),
        args,
    )
    .set("Scheduler", &args.scheduler);

    if protocol.is_layer7() {
        request = request
            .set("StickySession", &args.sticky_session)
            .set("HealthCheck", &args.health_check);
        if args.sticky_on() {
            request = request
                .set_opt("StickySessionType", args.sticky_session_type.as_deref())
                .set_opt("CookieTimeout", args.cookie_timeout)
                .set_opt("Cookie", args.cookie.as_deref());
        }
    } else {
        request = request.set("PersistenceTimeout", args.persistence_timeout);
        if protocol == Protocol::Tcp {
            request = request.set("HealthCheckType", &args.health_check_type);
        }
    }

    if args.health_check_on() {
        request = request
            .set_opt("HealthCheckConnectPort", args.health_check_connect_port)
            .set("HealthyThreshold", args.healthy_threshold)
            .set("UnhealthyThreshold", args.unhealthy_threshold)
            .set(health_check_timeout_param(protocol), args.health_check_timeout)
            .set("HealthCheckInterval", args.health_check_interval);
        if protocol != Protocol::Udp {
            request = request
                .set_opt("HealthCheckDomain", args.health_check_domain.as_deref())
                .set("HealthCheckURI", &args.health_check_uri)
                .set("HealthCheckHttpCode", &args.health_check_http_code);
        }
    }

    if protocol == Protocol::Https {
        request = request.set_opt("ServerCertificateId", args.ssl_certificate_id.as_deref());
    }

    request
}

/// Stage changed fields into a `SetLoadBalancer<P>ListenerAttribute` request.
/// Returns `None` when nothing changed.
fn update_request(prior: &SlbListenerArgs, desired: &SlbListenerArgs) -> Option<RpcRequest> {
    let protocol = desired.protocol;
    let mut diff = Diff::new();
    let mut request = base_request(
        format!("SetLoadBalancer{}ListenerAttribute", protocol.api_name()),
        desired,
    );

    diff.check("bandwidth", &prior.bandwidth, &desired.bandwidth);
    if diff.check("scheduler", &prior.scheduler, &desired.scheduler) {
        request = request.set("Scheduler", &desired.scheduler);
    }
    diff.check_set("server_group_id", &prior.server_group_id, &desired.server_group_id);

    if protocol.is_layer7() {
        if diff.check("sticky_session", &prior.sticky_session, &desired.sticky_session) {
            request = request.set("StickySession", &desired.sticky_session);
        }
        if diff.check_set(
            "sticky_session_type",
            &prior.sticky_session_type,
            &desired.sticky_session_type,
        ) {
            request = request.set_opt("StickySessionType", desired.sticky_session_type.as_deref());
        }
        if diff.check_set("cookie_timeout", &prior.cookie_timeout, &desired.cookie_timeout) {
            request = request.set_opt("CookieTimeout", desired.cookie_timeout);
        }
        if diff.check_set("cookie", &prior.cookie, &desired.cookie) {
            request = request.set_opt("Cookie", desired.cookie.as_deref());
        }
        if diff.check("health_check", &prior.health_check, &desired.health_check) {
            request = request.set("HealthCheck", &desired.health_check);
        }
    } else if diff.check(
        "persistence_timeout",
        &prior.persistence_timeout,
        &desired.persistence_timeout,
    ) {
        request = request.set("PersistenceTimeout", desired.persistence_timeout);
    }

    if protocol == Protocol::Tcp
        && diff.check("health_check_type", &prior.health_check_type, &desired.health_check_type)
    {
        request = request.set("HealthCheckType", &desired.health_check_type);
    }

    if protocol != Protocol::Udp {
        if diff.check_set(
            "health_check_domain",
            &prior.health_check_domain,
            &desired.health_check_domain,
        ) {
            request = request.set_opt("HealthCheckDomain", desired.health_check_domain.as_deref());
        }
        if diff.check("health_check_uri", &prior.health_check_uri, &desired.health_check_uri) {
            request = request.set("HealthCheckURI", &desired.health_check_uri);
        }
        if diff.check(
            "health_check_http_code",
            &prior.health_check_http_code,
            &desired.health_check_http_code,
        ) {
            request = request.set("HealthCheckHttpCode", &desired.health_check_http_code);
        }
    }

    if diff.check_set(
        "health_check_connect_port",
        &prior.health_check_connect_port,
        &desired.health_check_connect_port,
    ) {
        request = request.set_opt("HealthCheckConnectPort", desired.health_check_connect_port);
    }
    if diff.check("healthy_threshold", &prior.healthy_threshold, &desired.healthy_threshold) {
        request = request.set("HealthyThreshold", desired.healthy_threshold);
    }
    if diff.check(
        "unhealthy_threshold",
        &prior.unhealthy_threshold,
        &desired.unhealthy_threshold,
    ) {
        request = request.set("UnhealthyThreshold", desired.unhealthy_threshold);
    }
    if diff.check(
        "health_check_timeout",
        &prior.health_check_timeout,
        &desired.health_check_timeout,
    ) {
        request = request.set(health_check_timeout_param(protocol), desired.health_check_timeout);
    }
    if diff.check(
        "health_check_interval",
        &prior.health_check_interval,
        &desired.health_check_interval,
    ) {
        request = request.set("HealthCheckInterval", desired.health_check_interval);
    }

    if protocol == Protocol::Https {
        diff.check_set(
            "ssl_certificate_id",
            &prior.ssl_certificate_id,
            &desired.ssl_certificate_id,
        );
        request = request.set_opt("ServerCertificateId", desired.ssl_certificate_id.as_deref());
    }

    if diff.is_empty() {
        return None;
    }
    tracing::debug!("Listener changes: {:?}", diff.fields());
    Some(request)
}

fn listener_args(
    load_balancer_id: &str,
    port: u16,
    protocol: Protocol,
    listener: &Value,
) -> SlbListenerArgs {
    let text = |path: &str| string_at(listener, path).filter(|v| !v.is_empty());
    let port_at = |path: &str| i64_at(listener, path).and_then(|p| u16::try_from(p).ok());

    let timeout_key = if i64_at(listener, "HealthCheckTimeout").is_some() {
        "HealthCheckTimeout"
    } else {
        "HealthCheckConnectTimeout"
    };

    SlbListenerArgs {
        load_balancer_id: load_balancer_id.to_string(),
        frontend_port: port_at("ListenerPort").unwrap_or(port),
        backend_port: port_at("BackendServerPort").unwrap_or_default(),
        protocol,
        bandwidth: i64_at(listener, "Bandwidth").unwrap_or(-1),
        scheduler: text("Scheduler").unwrap_or_else(default_scheduler),
        server_group_id: text("VServerGroupId"),
        sticky_session: text("StickySession").unwrap_or_else(default_off),
        sticky_session_type: text("StickySessionType"),
        cookie_timeout: i64_at(listener, "CookieTimeout").filter(|t| *t > 0),
        cookie: text("Cookie"),
        health_check: text("HealthCheck").unwrap_or_else(default_on),
        persistence_timeout: i64_at(listener, "PersistenceTimeout").unwrap_or_default(),
        health_check_type: text("HealthCheckType").unwrap_or_else(default_health_check_type),
        health_check_domain: text("HealthCheckDomain"),
        health_check_uri: text("HealthCheckURI").unwrap_or_else(default_health_check_uri),
        health_check_connect_port: i64_at(listener, "HealthCheckConnectPort").filter(|p| *p != 0),
        healthy_threshold: i64_at(listener, "HealthyThreshold").unwrap_or_else(default_threshold),
        unhealthy_threshold: i64_at(listener, "UnhealthyThreshold")
            .unwrap_or_else(default_threshold),
        health_check_timeout: i64_at(listener, timeout_key)
            .unwrap_or_else(default_health_check_timeout),
        health_check_interval: i64_at(listener, "HealthCheckInterval")
            .unwrap_or_else(default_health_check_interval),
        health_check_http_code: text("HealthCheckHttpCode").unwrap_or_else(default_http_code),
        ssl_certificate_id: text("ServerCertificateId"),
    }
}

#[async_trait]
impl Resource for SlbListener {
    const TYPE_NAME: &'static str = "alicloud_slb_listener";
    type Args = SlbListenerArgs;
    type Attributes = SlbListenerAttributes;

    fn validate(args: &SlbListenerArgs) -> Result<()> {
        if args.frontend_port == 0 || args.backend_port == 0 {
            return Err(ProviderError::validation(
                "'frontend_port' and 'backend_port' must be between 1 and 65535",
            ));
        }
        if args.bandwidth != -1 {
            int_in_range("bandwidth", args.bandwidth, 1, 1000)?;
        }
        one_of("scheduler", &args.scheduler, SCHEDULERS)?;
        one_of("sticky_session", &args.sticky_session, &[ON, OFF])?;
        one_of("health_check", &args.health_check, &[ON, OFF])?;
        one_of("health_check_type", &args.health_check_type, HEALTH_CHECK_TYPES)?;
        if let Some(ref kind) = args.sticky_session_type {
            one_of("sticky_session_type", kind, &[STICKY_INSERT, STICKY_SERVER])?;
        }
        if let Some(timeout) = args.cookie_timeout {
            int_in_range("cookie_timeout", timeout, 1, 86400)?;
        }
        if let Some(ref cookie) = args.cookie {
            length_in_range("cookie", cookie, 1, 200)?;
        }
        int_in_range("persistence_timeout", args.persistence_timeout, 0, 3600)?;
        int_in_range("healthy_threshold", args.healthy_threshold, 1, 10)?;
        int_in_range("unhealthy_threshold", args.unhealthy_threshold, 1, 10)?;
        int_in_range("health_check_timeout", args.health_check_timeout, 1, 50)?;
        int_in_range("health_check_interval", args.health_check_interval, 1, 50)?;
        all_of_split("health_check_http_code", &args.health_check_http_code, HTTP_CODES)?;
        if let Some(ref domain) = args.health_check_domain {
            length_in_range("health_check_domain", domain, 1, 80)?;
        }
        length_in_range("health_check_uri", &args.health_check_uri, 1, 80)?;
        if let Some(port) = args.health_check_connect_port {
            if port != BACKEND_PORT_SENTINEL {
                int_in_range("health_check_connect_port", port, 1, 65535)?;
            }
        }

        required_when(
            "ssl_certificate_id",
            &args.ssl_certificate_id,
            args.protocol == Protocol::Https,
            "the protocol is 'https'",
        )?;

        if args.protocol.is_layer7() {
            required_when(
                "sticky_session_type",
                &args.sticky_session_type,
                args.sticky_on(),
                "the StickySession is on",
            )?;
            let sticky_type = args.sticky_session_type.as_deref();
            if args.sticky_on()
                && sticky_type == Some(STICKY_INSERT)
                && args.cookie_timeout.is_none()
            {
                return Err(ProviderError::validation(
                    "'cookie_timeout': required field is not set when the StickySession is on and StickySessionType is insert",
                ));
            }
            required_when(
                "cookie",
                &args.cookie,
                args.sticky_on() && sticky_type == Some(STICKY_SERVER),
                "the StickySession is on and StickySessionType is server",
            )?;
            if args.health_check == ON && args.health_check_connect_port.is_none() {
                return Err(ProviderError::validation(
                    "'health_check_connect_port': required field is not set when the HealthCheck is on",
                ));
            }
        }
        Ok(())
    }

    fn replacement_fields(prior: &SlbListenerArgs, desired: &SlbListenerArgs) -> Vec<&'static str> {
        let mut diff = Diff::new();
        diff.check("load_balancer_id", &prior.load_balancer_id, &desired.load_balancer_id);
        diff.check("frontend_port", &prior.frontend_port, &desired.frontend_port);
        diff.check("backend_port", &prior.backend_port, &desired.backend_port);
        diff.check("protocol", &prior.protocol, &desired.protocol);
        diff.into_fields()
    }

    async fn create(client: &AliyunClient, args: &SlbListenerArgs) -> Result<StateOf<Self>> {
        let lb_id = args.load_balancer_id.as_str();
        let port = args.frontend_port;
        let protocol = args.protocol;

        tracing::info!("Creating {} listener {} on load balancer {}", protocol, port, lb_id);
        if let Err(e) = client.slb(create_request(args)).await {
            if e.is_api_error(&[codes::LISTENER_ALREADY_EXISTS]) {
                return Err(ProviderError::validation(format!(
                    "The listener with the frontend port {} already exists. Please define a new '{}' resource and use ID '{}:{}' to import it or modify its frontend port and then try again.",
                    port,
                    Self::TYPE_NAME,
                    lb_id,
                    port
                )));
            }
            return Err(e);
        }

        let id = join_id(&[lb_id, &port.to_string()]);

        wait_for_listener(client, lb_id, port, protocol, "stopped", Duration::ZERO).await?;

        let start = RpcRequest::new("StartLoadBalancerListener")
            .set("LoadBalancerId", lb_id)
            .set("ListenerPort", port);
        client.slb(start).await?;

        wait_for_listener(client, lb_id, port, protocol, "running", Duration::ZERO).await?;

        read_back::<Self>(client, &id, args).await
    }

    async fn read(client: &AliyunClient, id: &str) -> Result<Option<StateOf<Self>>> {
        let (lb_id, port) = parse_listener_id(id)?;

        let Some(protocol) = listener_protocol(client, &lb_id, port).await? else {
            tracing::warn!("Listener {} not found on its load balancer", id);
            return Ok(None);
        };

        let Some(listener) = describe_listener(client, &lb_id, port, protocol).await? else {
            return Ok(None);
        };

        let args = listener_args(&lb_id, port, protocol, &listener);
        let attributes = SlbListenerAttributes {
            status: string_at(&listener, "Status").unwrap_or_default(),
        };
        Ok(Some(State::new(id, args, attributes)))
    }

    async fn update(
        client: &AliyunClient,
        prior: &StateOf<Self>,
        desired: &SlbListenerArgs,
    ) -> Result<StateOf<Self>> {
        if let Some(request) = update_request(&prior.args, desired) {
            tracing::info!("Updating listener {}", prior.id);
            client.slb(request).await?;
        }
        read_back::<Self>(client, &prior.id, desired).await
    }

    async fn delete(client: &AliyunClient, id: &str) -> Result<()> {
        let (lb_id, port) = parse_listener_id(id)?;

        let Some(protocol) = listener_protocol(client, &lb_id, port).await? else {
            return Ok(());
        };

        let timeouts = client.timeouts();
        let lb_id = lb_id.as_str();
        retry(
            &format!("delete listener {}", id),
            timeouts.delete(),
            timeouts.poll_interval(),
            move || async move {
                let request = RpcRequest::new("DeleteLoadBalancerListener")
                    .set("LoadBalancerId", lb_id)
                    .set("ListenerPort", port);
                match client.slb(request).await {
                    Ok(_) => {}
                    Err(e)
                        if e.is_api_error(&[
                            codes::LISTENER_NOT_FOUND,
                            codes::LOAD_BALANCER_NOT_FOUND,
                        ]) =>
                    {
                        return Ok(RetryOutcome::Done(()))
                    }
                    Err(e) => return retry_on(e, &[codes::SYSTEM_BUSY]),
                }

                match describe_listener(client, lb_id, port, protocol).await? {
                    None => Ok(RetryOutcome::Done(())),
                    Some(_) => Ok(RetryOutcome::Again(format!(
                        "listener {}:{} still exists",
                        lb_id, port
                    ))),
                }
            },
        )
        .await
    }
}
