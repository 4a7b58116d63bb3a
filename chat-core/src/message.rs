//! Request / response envelopes carried inside frames.
//!
//! Both travel as JSON. The core never interprets `url` or `body`; it
//! only (de)serializes them and checks the status code.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Protocol tag for one-shot request/response exchanges.
pub const PROTO_HTTP: &str = "http";
/// Protocol tag for the streaming handshake.
pub const PROTO_WS: &str = "ws";

// ── StatusCode ───────────────────────────────────────────────────

/// Numeric status carried in a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const REQUEST_TIMEOUT: StatusCode = StatusCode(408);
    pub const BAD_GATEWAY: StatusCode = StatusCode(502);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Canonical reason phrase, empty for codes the core never produces.
    pub fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            404 => "Not Found",
            408 => "Request Timeout",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            _ => "",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

// ── Headers ──────────────────────────────────────────────────────

/// Header values are either strings or numbers on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Text(String),
    Number(serde_json::Number),
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue::Text(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue::Text(s)
    }
}

impl From<i64> for HeaderValue {
    fn from(n: i64) -> Self {
        HeaderValue::Number(n.into())
    }
}

impl From<u64> for HeaderValue {
    fn from(n: u64) -> Self {
        HeaderValue::Number(n.into())
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Text(s) => f.write_str(s),
            HeaderValue::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Header mapping; ordering carries no meaning.
pub type Headers = BTreeMap<String, HeaderValue>;

// ── Request ──────────────────────────────────────────────────────

/// A request sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub proto: String,
    #[serde(default)]
    pub header: Headers,
    #[serde(default)]
    pub body: String,
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>, proto: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            proto: proto.into(),
            header: Headers::new(),
            body: String::new(),
        }
    }

    /// The fixed request that opens a streaming session on `url`.
    pub fn handshake(url: impl Into<String>) -> Self {
        Self::new("ws", url, PROTO_WS).with_header("Content-Type", "application/json")
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ChatError> {
        Ok(serde_json::to_vec(self)?)
    }
}

// ── Response ─────────────────────────────────────────────────────

/// A reply from the server. Missing fields decode as empty values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    pub status: String,
    pub status_code: u16,
    pub header: Headers,
    pub body: String,
}

impl Response {
    /// A body-less response carrying `code` and its reason phrase.
    pub fn with_status(code: StatusCode) -> Self {
        Self {
            status: code.reason().to_string(),
            status_code: code.as_u16(),
            ..Default::default()
        }
    }

    pub fn code(&self) -> StatusCode {
        StatusCode(self.status_code)
    }

    pub fn is_success(&self) -> bool {
        self.code().is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code() == StatusCode::UNAUTHORIZED
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ChatError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_json_shape() {
        let req = Request::new("POST", "/api/v1/signin", PROTO_HTTP)
            .with_header("Content-Type", "application/json")
            .with_header("Retry", 3i64)
            .with_body(r#"{"login":"bob"}"#);

        let value: serde_json::Value = serde_json::from_slice(&req.to_json().unwrap()).unwrap();
        assert_eq!(value["method"], "POST");
        assert_eq!(value["url"], "/api/v1/signin");
        assert_eq!(value["proto"], "http");
        assert_eq!(value["header"]["Content-Type"], "application/json");
        assert_eq!(value["header"]["Retry"], 3);
        assert_eq!(value["body"], r#"{"login":"bob"}"#);
    }

    #[test]
    fn handshake_request_is_fixed() {
        let req = Request::handshake("/api/v1/chatting");
        assert_eq!(req.method, "ws");
        assert_eq!(req.proto, PROTO_WS);
        assert_eq!(req.body, "");
        assert_eq!(
            req.header.get("Content-Type"),
            Some(&HeaderValue::from("application/json"))
        );
    }

    #[test]
    fn response_parses_mixed_header_values() {
        let resp = Response::from_slice(
            br#"{"status":"OK","status_code":200,"header":{"a":"x","n":42},"body":"{}"}"#,
        )
        .unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.header["a"], HeaderValue::from("x"));
        assert_eq!(resp.header["n"], HeaderValue::from(42i64));
        assert_eq!(resp.header["n"].to_string(), "42");
    }

    #[test]
    fn response_missing_fields_default() {
        let resp = Response::from_slice(br#"{"body":"hi"}"#).unwrap();
        assert_eq!(resp.status_code, 0);
        assert!(!resp.is_success());
        assert!(resp.header.is_empty());
    }

    #[test]
    fn response_rejects_malformed_json() {
        assert!(matches!(
            Response::from_slice(b"not json"),
            Err(ChatError::Parse(_))
        ));
    }

    #[test]
    fn success_and_auth_predicates() {
        assert!(Response::with_status(StatusCode(204)).is_success());
        assert!(!Response::with_status(StatusCode(300)).is_success());
        assert!(!Response::with_status(StatusCode(199)).is_success());
        assert!(Response::with_status(StatusCode::UNAUTHORIZED).is_unauthorized());
    }

    #[test]
    fn status_display() {
        assert_eq!(StatusCode::SERVICE_UNAVAILABLE.to_string(), "503 Service Unavailable");
    }
}
