//! Axum HTTP surface for the product catalog.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use skiphire_catalog::{CatalogConfig, CatalogService};
use skiphire_core::ApiErrorBody;
use skiphire_http::ApiError;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub struct AppState {
    pub catalog: CatalogService,
}

impl AppState {
    pub fn new(catalog: CatalogService) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ProductsQuery {
    page: Option<String>,
}

/// Upstream failure reported to HTTP callers as `{ message, statusCode? }`.
#[derive(Debug)]
pub struct AppError(pub ApiError);

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            ApiError::HttpStatus {
                status, message, ..
            } => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody::new(message.clone()).with_status(*status),
            ),
            ApiError::Transport { source, .. } if source.is_timeout() => (
                StatusCode::GATEWAY_TIMEOUT,
                ApiErrorBody::new("Upstream product service timed out"),
            ),
            ApiError::Transport { .. } => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody::new("Upstream product service is unavailable"),
            ),
            ApiError::Malformed { .. } | ApiError::InvalidShape(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody::new("Upstream product service returned an unexpected response"),
            ),
        };
        (status, Json(body)).into_response()
    }
}

pub fn app(state: AppState) -> Router {
    let images_dir = state.catalog.config().images_dir.clone();
    Router::new()
        .route("/api/products", get(list_products_handler))
        .route("/api/products/{id}", get(product_detail_handler))
        .nest_service("/images/products", ServeDir::new(images_dir))
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(config: CatalogConfig) -> anyhow::Result<()> {
    let port = config.port;
    let catalog = CatalogService::from_config(config)?;
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, "catalog server listening");
    axum::serve(listener, app(AppState::new(catalog)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(CatalogConfig::from_env()).await
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

fn parse_page(raw: Option<&str>) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|page| *page > 0)
        .unwrap_or(1)
}

async fn list_products_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductsQuery>,
) -> Result<Response, AppError> {
    let page = parse_page(query.page.as_deref());
    match state.catalog.fetch_page(page).await {
        Ok(data) => Ok(Json(data).into_response()),
        Err(err) => {
            error!(page, error = %err, "failed to fetch products");
            Err(err.into())
        }
    }
}

async fn product_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.catalog.product_by_id(&id).await {
        Some(product) => Json(product).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiErrorBody::new(format!("Product with ID {id} not found"))),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use skiphire_catalog::ImageIndex;
    use skiphire_http::HttpFetcher;
    use tower::ServiceExt;

    #[test]
    fn page_parameter_is_lenient() {
        assert_eq!(parse_page(None), 1);
        assert_eq!(parse_page(Some("3")), 3);
        assert_eq!(parse_page(Some("0")), 1);
        assert_eq!(parse_page(Some("-2")), 1);
        assert_eq!(parse_page(Some("abc")), 1);
    }

    #[tokio::test]
    async fn upstream_status_errors_report_message_and_code() {
        let resp = AppError(ApiError::HttpStatus {
            status: 503,
            message: "maintenance".into(),
            details: None,
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let parsed: ApiErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed, ApiErrorBody::new("maintenance").with_status(503));
    }

    #[tokio::test]
    async fn serves_local_product_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("skip.png"), b"png-bytes").unwrap();
        let config = CatalogConfig {
            images_dir: dir.path().to_path_buf(),
            ..CatalogConfig::default()
        };
        let fetcher = HttpFetcher::new(config.http_client_config()).unwrap();
        let images = ImageIndex::load(dir.path());
        let catalog = CatalogService::new(config, fetcher, Arc::new(images)).unwrap();

        let resp = app(AppState::new(catalog))
            .oneshot(
                axum::http::Request::builder()
                    .uri("/images/products/skip.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"png-bytes");
    }
}
