//! Shared setup for the mocked-API integration tests

#![allow(dead_code)]

use alicloud_provider::config::{Endpoints, Timeouts};
use alicloud_provider::{Provider, ProviderConfig};
use wiremock::MockServer;

/// Log project every log test writes to
pub const PROJECT: &str = "proj";

/// Short budgets so retry and wait loops finish quickly against the mock
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        default_wait_secs: 2,
        poll_interval_ms: 10,
        delete_secs: 2,
        log_retry_secs: 2,
        log_delete_secs: 2,
        request_secs: 5,
    }
}

/// Config pointing every service at `server`. Log requests land under `/<project>`.
pub fn config_for(server: &MockServer) -> ProviderConfig {
    let uri = server.uri();
    ProviderConfig {
        region: Some("cn-hangzhou".to_string()),
        access_key: Some("test-ak".to_string()),
        secret_key: Some("test-sk".to_string()),
        security_token: None,
        account_id: Some("1234567890".to_string()),
        endpoints: Endpoints {
            ecs: Some(uri.clone()),
            slb: Some(uri.clone()),
            log: Some(format!("{}/{{project}}", uri)),
            fc: Some(uri),
        },
        timeouts: fast_timeouts(),
    }
}

pub fn provider_for(server: &MockServer) -> Provider {
    Provider::new(&config_for(server)).expect("provider should build")
}

/// Path of a log API call within the test project
pub fn log_path(path: &str) -> String {
    format!("/{}{}", PROJECT, path)
}
