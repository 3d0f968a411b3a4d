//! Request handling.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4)
//! - Extract the request target for resolution
//! - Convert transport requests for protocol handlers
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Body size limited before handing a request to a handler

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Request};
use std::collections::BTreeMap;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::http::handler::HandlerRequest;
use crate::resolve::MatchChain;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Largest body forwarded to a protocol handler.
pub const MAX_HANDLER_BODY: usize = 2 * 1024 * 1024;

/// Issues UUID v4 request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Origin-form target (`/path?query`) of a request.
pub fn target<B>(request: &Request<B>) -> String {
    request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

/// Buffer the body and build the handler view of a request.
pub async fn to_handler_request(
    request: Request<Body>,
    chain: &MatchChain,
) -> Result<HandlerRequest, axum::Error> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_HANDLER_BODY).await?;

    let headers: BTreeMap<String, String> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    Ok(HandlerRequest {
        method: parts.method.to_string(),
        path: chain.pathname().to_string(),
        params: chain.params().clone(),
        search: chain.search_params().clone(),
        headers,
        body: body.to_vec(),
    })
}
