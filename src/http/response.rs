//! Response construction.
//!
//! # Responsibilities
//! - Map render status to HTTP status (200, 404, 307, 308, 500)
//! - Stream the HTML document: head and shell first, boundaries as they settle
//! - Convert protocol handler responses
//!
//! # Design Decisions
//! - Root failures never leak error details; the client gets a generic page
//! - The shell is one body frame; each boundary chunk is its own frame

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{self, StreamExt};
use std::convert::Infallible;

use crate::http::handler::HandlerResponse;
use crate::render::{RedirectSignal, RenderStatus, RenderStream};

const HTML: &str = "text/html; charset=utf-8";

/// Full response for a render stream.
pub fn document(render: RenderStream) -> Response {
    let (shell, chunks) = render.split();
    let status = match &shell.status {
        RenderStatus::Redirect(signal) => return redirect(signal),
        RenderStatus::Failed(_) => return failure_page(),
        RenderStatus::Ok => StatusCode::OK,
        RenderStatus::NotFound => StatusCode::NOT_FOUND,
    };

    let prelude = format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">{}</head><body>{}",
        shell.head_or_default().to_head_html(),
        shell.body.as_ref().map(|b| b.to_html()).unwrap_or_default()
    );

    let deferred = stream::unfold(chunks, |mut chunks| async move {
        chunks
            .next()
            .await
            .map(|chunk| (Bytes::from(chunk.to_html()), chunks))
    });
    let body = stream::once(async move { Bytes::from(prelude) })
        .chain(deferred)
        .chain(stream::once(async { Bytes::from_static(b"</body></html>") }))
        .map(Ok::<_, Infallible>);

    (status, [(header::CONTENT_TYPE, HTML)], Body::from_stream(body)).into_response()
}

pub fn redirect(signal: &RedirectSignal) -> Response {
    let status = StatusCode::from_u16(signal.kind.status_code()).unwrap_or(StatusCode::TEMPORARY_REDIRECT);
    match HeaderValue::from_str(&signal.location) {
        Ok(location) => (status, [(header::LOCATION, location)]).into_response(),
        Err(_) => {
            tracing::error!(location = %signal.location, "Redirect location is not a valid header value");
            failure_page()
        }
    }
}

/// Generic page for failures that reached the root.
pub fn failure_page() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, HTML)],
        "<!DOCTYPE html><html><head><title>500</title></head><body><h1>500</h1><p>Internal Server Error</p></body></html>",
    )
        .into_response()
}

pub fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "GET, HEAD")]).into_response()
}

pub fn from_handler(resp: HandlerResponse) -> Response {
    let Ok(status) = StatusCode::from_u16(resp.status) else {
        tracing::error!(status = resp.status, "Handler returned an invalid status");
        return failure_page();
    };
    let mut response = (status, Body::from(resp.body)).into_response();
    let headers = response.headers_mut();
    for (name, value) in resp.headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::warn!(header = %name, "Dropping invalid handler header"),
        }
    }
    response
}
