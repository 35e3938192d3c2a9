//! Request signing
//!
//! Two schemes are in use:
//!
//! - RPC services (ECS, SLB) sign the canonicalized query string with
//!   HMAC-SHA1 keyed by `secret + "&"`.
//! - REST services (Log, Function Compute) sign
//!   `VERB\nContent-MD5\nContent-Type\nDate\n<prefixed headers><resource>`
//!   with HMAC-SHA1 keyed by the secret.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha1::Sha1;
use std::collections::BTreeMap;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const SIGNATURE_VERSION: &str = "1.0";

/// RFC 3986 percent-encoding as required by the RPC signature
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Sorted `k=v&k=v` with both sides percent-encoded
pub fn canonicalized_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn rpc_string_to_sign(method: &str, params: &BTreeMap<String, String>) -> String {
    format!(
        "{}&{}&{}",
        method,
        percent_encode("/"),
        percent_encode(&canonicalized_query(params))
    )
}

/// Signature for an RPC request. `params` must not contain `Signature`.
pub fn sign_rpc(secret: &str, method: &str, params: &BTreeMap<String, String>) -> String {
    let key = format!("{}&", secret);
    hmac_sha1_base64(key.as_bytes(), rpc_string_to_sign(method, params).as_bytes())
}

/// Inputs to a REST signature
pub struct RestSigningInput<'a> {
    pub method: &'a str,
    pub content_md5: &'a str,
    pub content_type: &'a str,
    pub date: &'a str,
    /// All request headers, keys lowercase
    pub headers: &'a BTreeMap<String, String>,
    /// Path plus query as sent
    pub resource: &'a str,
}

pub fn rest_string_to_sign(header_prefixes: &[&str], input: &RestSigningInput<'_>) -> String {
    let mut out = format!(
        "{}\n{}\n{}\n{}\n",
        input.method, input.content_md5, input.content_type, input.date
    );
    for (k, v) in input.headers {
        if header_prefixes.iter().any(|p| k.starts_with(p)) {
            out.push_str(&format!("{}:{}\n", k, v.trim()));
        }
    }
    out.push_str(input.resource);
    out
}

pub fn sign_rest(secret: &str, header_prefixes: &[&str], input: &RestSigningInput<'_>) -> String {
    hmac_sha1_base64(
        secret.as_bytes(),
        rest_string_to_sign(header_prefixes, input).as_bytes(),
    )
}

/// Canonical resource for REST signing: path, then sorted unencoded query
pub fn canonicalized_resource(path: &str, query: &BTreeMap<String, String>) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let q = query
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", path, q)
}

/// Uppercase hex MD5 of the body, as the log service expects
pub fn content_md5(body: &[u8]) -> String {
    let digest = Md5::digest(body);
    digest.iter().map(|b| format!("{:02X}", b)).collect()
}

fn hmac_sha1_base64(key: &[u8], data: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    STANDARD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_percent_encode_rfc3986() {
        assert_eq!(percent_encode("a b*c~/"), "a%20b%2Ac~%2F");
        assert_eq!(percent_encode("Abc-_.9"), "Abc-_.9");
    }

    #[test]
    fn test_rpc_signature_reference_vector() {
        let params = map(&[
            ("AccessKeyId", "testid"),
            ("Action", "DescribeRegions"),
            ("Format", "XML"),
            ("SignatureMethod", "HMAC-SHA1"),
            ("SignatureNonce", "3ee8c1b8-83d3-44af-a94f-4e0ad82fd6cf"),
            ("SignatureVersion", "1.0"),
            ("Timestamp", "2016-02-23T12:46:24Z"),
            ("Version", "2014-05-26"),
        ]);

        assert_eq!(
            rpc_string_to_sign("GET", &params),
            "GET&%2F&AccessKeyId%3Dtestid%26Action%3DDescribeRegions%26Format%3DXML\
             %26SignatureMethod%3DHMAC-SHA1%26SignatureNonce%3D3ee8c1b8-83d3-44af-a94f-4e0ad82fd6cf\
             %26SignatureVersion%3D1.0%26Timestamp%3D2016-02-23T12%253A46%253A24Z%26Version%3D2014-05-26"
        );
        assert_eq!(
            sign_rpc("testsecret", "GET", &params),
            "OLeaidS1JvxuMvnyHOwuJ+uX5qY="
        );
    }

    #[test]
    fn test_rest_signature_filters_headers() {
        let headers = map(&[
            ("x-log-apiversion", "0.6.0"),
            ("x-log-bodyrawsize", "0"),
            ("x-log-signaturemethod", "hmac-sha1"),
            ("content-type", "application/json"),
            ("user-agent", "ignored"),
        ]);
        let input = RestSigningInput {
            method: "POST",
            content_md5: "1B2M2Y8AsgTpgAmY7PhCfg==",
            content_type: "application/json",
            date: "Mon, 09 Nov 2015 06:11:16 GMT",
            headers: &headers,
            resource: "/logstores/app/consumergroups",
        };

        let text = rest_string_to_sign(&["x-log-", "x-acs-"], &input);
        assert!(!text.contains("user-agent"));
        assert_eq!(
            sign_rest("testsecret", &["x-log-", "x-acs-"], &input),
            "V8EhWjQMn0qfzdGGjeJ8BiApYCE="
        );
    }

    #[test]
    fn test_canonicalized_resource_sorts_query() {
        let query = map(&[("type", "log"), ("offset", "0")]);
        assert_eq!(
            canonicalized_resource("/logstores", &query),
            "/logstores?offset=0&type=log"
        );
        assert_eq!(canonicalized_resource("/configs", &BTreeMap::new()), "/configs");
    }

    #[test]
    fn test_content_md5_uppercase_hex() {
        assert_eq!(content_md5(br#"{"a":1}"#), "BB6CB5C68DF4652941CAF652A366F2D8");
    }
}
