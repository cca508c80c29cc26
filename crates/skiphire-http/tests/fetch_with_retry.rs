use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use skiphire_http::{ApiError, BackoffPolicy, HttpClientConfig, HttpFetcher};
use tokio::net::TcpListener;

async fn spawn_stub(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });
    format!("http://{addr}")
}

fn fetcher(retries: u32, base_ms: u64) -> HttpFetcher {
    HttpFetcher::new(HttpClientConfig {
        timeout: Duration::from_secs(5),
        user_agent: None,
        backoff: BackoffPolicy::new(retries, Duration::from_millis(base_ms)),
    })
    .expect("fetcher")
}

#[tokio::test]
async fn exhausted_retries_make_four_attempts_with_doubling_waits() {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route(
            "/skips",
            get(|State(hits): State<Arc<AtomicUsize>>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(serde_json::json!({ "message": "upstream down" })),
                )
            }),
        )
        .with_state(hits.clone());
    let base = spawn_stub(router).await;

    let started = Instant::now();
    let err = fetcher(3, 20)
        .get_json::<Vec<serde_json::Value>>(&format!("{base}/skips"))
        .await
        .expect_err("should exhaust retries");

    assert_eq!(hits.load(Ordering::SeqCst), 4);
    assert!(started.elapsed() >= Duration::from_millis(20 + 40 + 80));
    assert_eq!(err.status_code(), Some(503));
    assert_eq!(err.to_string(), "upstream down");
    assert_eq!(
        err.details()
            .and_then(|d| d.get("message"))
            .and_then(|m| m.as_str()),
        Some("upstream down")
    );
}

#[tokio::test]
async fn transient_failures_recover() {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route(
            "/skips",
            get(|State(hits): State<Arc<AtomicUsize>>| async move {
                if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                } else {
                    Json(vec![1, 2, 3]).into_response()
                }
            }),
        )
        .with_state(hits.clone());
    let base = spawn_stub(router).await;

    let body: Vec<i32> = fetcher(3, 5)
        .get_json(&format!("{base}/skips"))
        .await
        .expect("third attempt succeeds");

    assert_eq!(body, vec![1, 2, 3]);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn malformed_success_body_is_not_retried() {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route(
            "/skips",
            get(|State(hits): State<Arc<AtomicUsize>>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                "definitely not json"
            }),
        )
        .with_state(hits.clone());
    let base = spawn_stub(router).await;

    let err = fetcher(3, 5)
        .get_json::<Vec<i32>>(&format!("{base}/skips"))
        .await
        .expect_err("malformed body");

    assert!(matches!(err, ApiError::Malformed { .. }));
    assert_eq!(err.status_code(), None);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unparsable_error_body_keeps_status_message() {
    let router = Router::new().route(
        "/skips",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let base = spawn_stub(router).await;

    let err = fetcher(0, 1)
        .get_json::<Vec<i32>>(&format!("{base}/skips"))
        .await
        .expect_err("500");

    assert_eq!(err.status_code(), Some(500));
    assert_eq!(err.to_string(), "API Error: 500 Internal Server Error");
    assert!(err.details().is_none());
}

#[tokio::test]
async fn transport_failures_carry_no_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = fetcher(1, 1)
        .get_json::<Vec<i32>>(&format!("http://{addr}/skips"))
        .await
        .expect_err("connection refused");

    assert!(matches!(err, ApiError::Transport { .. }));
    assert_eq!(err.status_code(), None);
}
