mod common;

use std::collections::HashMap;

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use accessify::quota::{QuotaStore, QuotaType, RestQuotaStore};
use accessify::ProcessingError;
use common::start_server;

fn has_keys(headers: &HeaderMap) -> bool {
    let apikey = headers.get("apikey").and_then(|v| v.to_str().ok());
    let bearer = headers.get("authorization").and_then(|v| v.to_str().ok());
    apikey == Some("anon-key") && bearer == Some("Bearer anon-key")
}

fn app() -> Router {
    Router::new()
        .route(
            "/rest/v1/rpc/decrement_quota",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                if !has_keys(&headers) {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                assert_eq!(body["user_id"], "user-1");
                assert_eq!(body["amount"], 1);
                // Only images have units left
                Json(body["quota_type"] == "image_count").into_response()
            }),
        )
        .route(
            "/rest/v1/processing_quota",
            get(|headers: HeaderMap, Query(params): Query<HashMap<String, String>>| async move {
                if !has_keys(&headers) {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                assert_eq!(params.get("select").map(String::as_str), Some("*"));
                match params.get("user_id").map(String::as_str) {
                    Some("eq.user-1") => Json(json!([{
                        "user_id": "user-1",
                        "audio_minutes": 30,
                        "image_count": 5,
                        "pdf_pages": 0
                    }]))
                    .into_response(),
                    _ => Json(json!([])).into_response(),
                }
            }),
        )
}

#[tokio::test]
async fn test_decrement_reports_reservation() {
    let (base_url, shutdown_tx) = start_server(app()).await;
    let store = RestQuotaStore::new(&base_url, "anon-key");

    assert!(store.decrement_quota("user-1", QuotaType::ImageCount, 1).await.unwrap());
    assert!(!store.decrement_quota("user-1", QuotaType::PdfPages, 1).await.unwrap());
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_fetch_quota() {
    let (base_url, shutdown_tx) = start_server(app()).await;
    let store = RestQuotaStore::new(&format!("{}/", base_url), "anon-key");

    let quota = store.fetch_quota("user-1").await.unwrap();

    assert_eq!(quota.audio_minutes, 30);
    assert_eq!(quota.remaining(QuotaType::ImageCount), 5);
    assert_eq!(quota.remaining(QuotaType::PdfPages), 0);
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_fetch_quota_unknown_user() {
    let (base_url, shutdown_tx) = start_server(app()).await;
    let store = RestQuotaStore::new(&base_url, "anon-key");

    let result = store.fetch_quota("nobody").await;

    assert!(matches!(result, Err(ProcessingError::QuotaStore(_))));
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn test_rejected_key_is_store_error() {
    let (base_url, shutdown_tx) = start_server(app()).await;
    let store = RestQuotaStore::new(&base_url, "wrong-key");

    let result = store.decrement_quota("user-1", QuotaType::ImageCount, 1).await;

    match result {
        Err(ProcessingError::QuotaStore(reason)) => assert!(reason.contains("401")),
        other => panic!("expected quota store error, got {:?}", other),
    }
    shutdown_tx.send(()).ok();
}
