//! HTTP adapter tests, driven in-process with `oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

mod common;

use common::GatedSource;

async fn send(source: Arc<GatedSource>, method: Method, uri: &str, body: Body) -> Response {
    let request = Request::builder().method(method).uri(uri).body(body).unwrap();
    common::app(source).oneshot(request).await.unwrap()
}

async fn get(uri: &str) -> Response {
    send(Arc::new(GatedSource::new()), Method::GET, uri, Body::empty()).await
}

async fn text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_matched_page_renders_document() {
    let response = get("/about").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
    assert!(response.headers().contains_key("x-request-id"));

    let html = text(response).await;
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<title>About | Acme</title>"));
    assert!(html.contains("data-layout=\"\""));
    assert!(html.ends_with("</body></html>"));
}

#[tokio::test]
async fn test_unmatched_path_is_404_inside_root_layout() {
    let response = get("/no/such/page").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let html = text(response).await;
    assert!(html.contains("This page could not be found."));
    assert!(html.contains("data-layout"));
}

#[tokio::test]
async fn test_private_folder_is_not_routable() {
    assert_eq!(get("/_drafts/secret").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_redirects_map_to_307_and_308() {
    let permanent = get("/old-shop").await;
    assert_eq!(permanent.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(permanent.headers()[header::LOCATION], "/shop");

    let temporary = get("/login").await;
    assert_eq!(temporary.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(temporary.headers()[header::LOCATION], "/about");
}

#[tokio::test]
async fn test_uncaught_error_is_generic_500() {
    let response = get("/boom").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let html = text(response).await;
    assert!(html.contains("Internal Server Error"));
    assert!(!html.contains("exploded"));
}

#[tokio::test]
async fn test_caught_error_keeps_200() {
    let response = get("/dashboard/broken").await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = text(response).await;
    assert!(html.contains("role=\"alert\""));
    assert!(html.contains("data-layout=\"dashboard\""));
}

#[tokio::test]
async fn test_optional_catch_all_matches_bare_path() {
    assert_eq!(get("/docs").await.status(), StatusCode::OK);
    assert_eq!(get("/docs/guide/install").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_page_data_is_rendered() {
    let source = Arc::new(GatedSource::new().with("item/lamp", json!({"name": "Desk Lamp"})));
    let response = send(source.clone(), Method::GET, "/shop/lamp", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text(response).await.contains("Desk Lamp"));
    assert_eq!(source.calls("item/lamp"), 1);
}

#[tokio::test]
async fn test_handler_route_answers_directly() {
    let response = send(
        Arc::new(GatedSource::new()),
        Method::POST,
        "/api/echo",
        Body::from("ping"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&text(response).await).unwrap();
    assert_eq!(body, json!({"method": "POST", "path": "/api/echo", "body": "ping"}));
}

#[tokio::test]
async fn test_non_get_on_page_is_405() {
    let response = send(Arc::new(GatedSource::new()), Method::POST, "/about", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "GET, HEAD");
}

#[tokio::test]
async fn test_suspended_region_streams_after_shell() {
    let source = Arc::new(GatedSource::new().with("feed", json!(["first"])).gated("feed"));
    let response = send(source.clone(), Method::GET, "/feed", Body::empty()).await;

    // headers and shell are out before the data arrives
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(source.completed(), 0);

    source.gate("feed").open();
    let html = text(response).await;
    let fallback = html.find("Loading...").unwrap();
    let chunk = html.find("<template data-boundary=\"B:1\">").unwrap();
    assert!(fallback < chunk);
    assert!(html[chunk..].contains("<li>first</li>"));
}
