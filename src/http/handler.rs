//! Protocol handlers: routes that answer requests directly instead of
//! rendering a page.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::resolve::{Params, SearchParams};

/// Transport-independent request handed to a [`RouteHandler`].
#[derive(Debug, Clone, Default)]
pub struct HandlerRequest {
    pub method: String,
    pub path: String,
    pub params: Params,
    pub search: SearchParams,
    /// Lower-cased header names.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HandlerRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HandlerResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .header("content-type", "text/plain; charset=utf-8")
            .body(body.into().into_bytes())
    }

    pub fn json(status: u16, value: &impl Serialize) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status).header("content-type", "application/json").body(body),
            Err(e) => Self::text(500, format!("serialization failed: {e}")),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

/// Request in, response out.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, request: HandlerRequest) -> HandlerResponse;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_builders() {
        let resp = HandlerResponse::json(201, &json!({"ok": true}));
        assert_eq!(resp.status, 201);
        assert_eq!(resp.headers, vec![("content-type".into(), "application/json".into())]);
        assert_eq!(resp.body, br#"{"ok":true}"#.to_vec());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = HandlerRequest {
            headers: BTreeMap::from([("x-token".to_string(), "abc".to_string())]),
            ..HandlerRequest::default()
        };
        assert_eq!(req.header("X-Token"), Some("abc"));
    }
}
