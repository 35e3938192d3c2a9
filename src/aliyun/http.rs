//! HTTP utilities for Alibaba Cloud API calls
//!
//! Executes signed RPC (query-string) and REST requests and turns error
//! bodies into [`ApiError`]s.

use super::credentials::Credentials;
use super::signature::{
    canonicalized_query, canonicalized_resource, content_md5, sign_rest, sign_rpc,
    RestSigningInput, SIGNATURE_METHOD, SIGNATURE_VERSION,
};
use crate::error::{ApiError, ProviderError, Result};
use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

const USER_AGENT: &str = concat!("alicloud-provider/", env!("CARGO_PKG_VERSION"));

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// An RPC-style API call: an action name plus flat parameters
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub action: String,
    pub params: BTreeMap<String, String>,
}

impl RpcRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: BTreeMap::new(),
        }
    }

    /// Set a parameter
    pub fn set(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Set a parameter only when present and non-empty
    pub fn set_opt<T: ToString>(self, key: &str, value: Option<T>) -> Self {
        match value.map(|v| v.to_string()).filter(|v| !v.is_empty()) {
            Some(v) => self.set(key, v),
            None => self,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// REST dialects differ in auth scheme, signed header prefixes and error keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestDialect {
    Log,
    FunctionCompute,
}

impl RestDialect {
    fn service(self) -> &'static str {
        match self {
            RestDialect::Log => "log",
            RestDialect::FunctionCompute => "fc",
        }
    }

    fn auth_scheme(self) -> &'static str {
        match self {
            RestDialect::Log => "LOG",
            RestDialect::FunctionCompute => "FC",
        }
    }

    fn header_prefixes(self) -> &'static [&'static str] {
        match self {
            RestDialect::Log => &["x-log-", "x-acs-"],
            RestDialect::FunctionCompute => &["x-fc-"],
        }
    }

    fn request_id_header(self) -> &'static str {
        match self {
            RestDialect::Log => "x-log-requestid",
            RestDialect::FunctionCompute => "x-fc-request-id",
        }
    }
}

/// A REST-style API call
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    /// Path starting with `/`
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl RestRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// HTTP client wrapper for Alibaba Cloud API calls
#[derive(Clone)]
pub struct AliyunHttpClient {
    client: Client,
}

impl AliyunHttpClient {
    /// Create a new HTTP client
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    /// Make a signed RPC call against `endpoint`
    pub async fn rpc(
        &self,
        credentials: &Credentials,
        service: &str,
        endpoint: &str,
        version: &str,
        request: &RpcRequest,
    ) -> Result<Value> {
        let mut params = request.params.clone();
        params.insert("Action".to_string(), request.action.clone());
        params.insert("Format".to_string(), "JSON".to_string());
        params.insert("Version".to_string(), version.to_string());
        params.insert("AccessKeyId".to_string(), credentials.access_key.clone());
        params.insert("SignatureMethod".to_string(), SIGNATURE_METHOD.to_string());
        params.insert("SignatureVersion".to_string(), SIGNATURE_VERSION.to_string());
        params.insert(
            "SignatureNonce".to_string(),
            uuid::Uuid::new_v4().to_string(),
        );
        params.insert(
            "Timestamp".to_string(),
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        );
        if let Some(ref token) = credentials.security_token {
            params.insert("SecurityToken".to_string(), token.clone());
        }

        let signature = sign_rpc(credentials.secret_key(), "GET", &params);
        params.insert("Signature".to_string(), signature);

        let url = format!(
            "{}/?{}",
            endpoint.trim_end_matches('/'),
            canonicalized_query(&params)
        );

        tracing::debug!("RPC {} {}", service, request.action);

        let response = self.client.get(&url).send().await?;
        handle_response(service, &request.action, None, response).await
    }

    /// Make a signed REST call against `base_url`
    pub async fn rest(
        &self,
        credentials: &Credentials,
        dialect: RestDialect,
        base_url: &str,
        request: &RestRequest,
    ) -> Result<Value> {
        let body = match request.body {
            Some(ref body) => serde_json::to_vec(body)?,
            None => Vec::new(),
        };
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let content_type = "application/json";
        let md5 = if body.is_empty() {
            String::new()
        } else {
            content_md5(&body)
        };

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        match dialect {
            RestDialect::Log => {
                headers.insert("x-log-apiversion".to_string(), "0.6.0".to_string());
                headers.insert("x-log-signaturemethod".to_string(), "hmac-sha1".to_string());
                headers.insert("x-log-bodyrawsize".to_string(), body.len().to_string());
                if let Some(ref token) = credentials.security_token {
                    headers.insert("x-acs-security-token".to_string(), token.clone());
                }
            }
            RestDialect::FunctionCompute => {
                if let Some(ref token) = credentials.security_token {
                    headers.insert("x-fc-security-token".to_string(), token.clone());
                }
            }
        }

        let resource = canonicalized_resource(&request.path, &request.query);
        let signature = sign_rest(
            credentials.secret_key(),
            dialect.header_prefixes(),
            &RestSigningInput {
                method: request.method.as_str(),
                content_md5: &md5,
                content_type,
                date: &date,
                headers: &headers,
                resource: &resource,
            },
        );

        let url = format!("{}{}", base_url.trim_end_matches('/'), request.path);
        tracing::debug!("{} {}", request.method, url);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .query(&request.query)
            .header("Date", &date)
            .header("Content-Type", content_type)
            .header(
                "Authorization",
                format!(
                    "{} {}:{}",
                    dialect.auth_scheme(),
                    credentials.access_key,
                    signature
                ),
            );
        for (k, v) in &headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        if !body.is_empty() {
            builder = builder.header("Content-MD5", &md5).body(body);
        }

        let response = builder.send().await?;
        handle_response(
            dialect.service(),
            &request.label(),
            Some(dialect.request_id_header()),
            response,
        )
        .await
    }
}

async fn handle_response(
    service: &str,
    action: &str,
    request_id_header: Option<&str>,
    response: reqwest::Response,
) -> Result<Value> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await?;

    if !status.is_success() {
        // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
        tracing::error!(
            "API error: {} {} - {} - {}",
            service,
            action,
            status,
            sanitize_for_log(&body)
        );
        return Err(ProviderError::Api(parse_api_error(
            service,
            action,
            status.as_u16(),
            request_id_header.and_then(|h| header_str(&headers, h)),
            &body,
        )));
    }

    // Handle empty response
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body)
        .map_err(|e| ProviderError::response(action, format!("invalid JSON body: {}", e)))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Build an [`ApiError`] from an error body. RPC services use
/// `Code`/`Message`, the log service `errorCode`/`errorMessage` and
/// Function Compute `ErrorCode`/`ErrorMessage`.
pub fn parse_api_error(
    service: &str,
    action: &str,
    status: u16,
    request_id: Option<String>,
    body: &str,
) -> ApiError {
    let json: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let pick = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| json.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string)
    };

    ApiError {
        service: service.to_string(),
        action: action.to_string(),
        code: pick(&["Code", "errorCode", "ErrorCode"])
            .unwrap_or_else(|| format!("Http{}", status)),
        message: pick(&["Message", "errorMessage", "ErrorMessage"])
            .unwrap_or_else(|| sanitize_for_log(body)),
        request_id: pick(&["RequestId", "requestId"]).or(request_id),
        status,
    }
}
