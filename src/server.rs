use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::config::{AppConfig, ConfigError};
use crate::error::PricingError;
use crate::pricing::cache::CacheTier;
use crate::pricing::migration::MigrationStrategy;
use crate::pricing::tenant::TenantPricingConfig;
use crate::pricing::{PricingEngine, QuoteInput, QuoteResponse};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PricingEngine>,
    pub readiness: Arc<AtomicBool>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(engine: Arc<PricingEngine>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            engine,
            readiness: Arc::new(AtomicBool::new(false)),
            metrics,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("server io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire shape of a quote request.
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub dimensions: DimensionsBody,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DimensionsBody {
    pub width_mm: f64,
    pub height_mm: f64,
}

#[derive(Debug, Deserialize)]
struct ClearCacheBody {
    #[serde(default)]
    tier: Option<CacheTier>,
}

#[derive(Debug, Deserialize)]
struct MigrationBody {
    strategy: MigrationStrategy,
    #[serde(default)]
    rollout_percentage: u8,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/api/v1/quote", post(quote))
        .route("/api/v1/pricing/info", get(pricing_info))
        .route("/api/v1/pricing/cache/stats", get(cache_stats))
        .route("/api/v1/pricing/cache/clear", post(clear_cache))
        .route("/api/v1/pricing/tenants", get(list_tenants))
        .route(
            "/api/v1/pricing/tenants/:tenant_id",
            get(get_tenant).put(update_tenant),
        )
        .route("/api/v1/pricing/experiments", get(experiments))
        .route(
            "/api/v1/pricing/migration",
            get(migration_status).put(set_migration),
        )
        .with_state(state)
}

pub async fn serve(config: &AppConfig) -> Result<(), ServerError> {
    let addr = config.server.socket_addr()?;
    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let engine = Arc::new(PricingEngine::new(config.pricing.engine_settings()));
    let state = AppState::new(engine, Some(metric_handle));
    let readiness = state.readiness.clone();
    let app = router(state).layer(prometheus_layer);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness.store(true, Ordering::Release);
    info!(%addr, "quote service listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.readiness.load(Ordering::Acquire) {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "starting"})),
        )
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, PricingError> {
    let input = QuoteInput {
        parameters: request.parameters,
        width_mm: request.dimensions.width_mm,
        height_mm: request.dimensions.height_mm,
        tenant_id: request.tenant_id,
        user_id: request.user_id,
        request_id: request.request_id,
    };
    let result = state.engine.quote(&input).await?;
    Ok(Json(result.to_response()))
}

async fn pricing_info(State(state): State<AppState>) -> Json<Value> {
    Json(state.engine.pricing_info())
}

async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.cache_stats())
}

async fn clear_cache(
    State(state): State<AppState>,
    Json(body): Json<ClearCacheBody>,
) -> impl IntoResponse {
    state.engine.clear_cache(body.tier).await;
    Json(json!({"status": "cleared"}))
}

async fn list_tenants(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"tenants": state.engine.tenant_ids()}))
}

async fn get_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Json<TenantPricingConfig> {
    Json(state.engine.tenant_config(Some(&tenant_id)))
}

async fn update_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(mut config): Json<TenantPricingConfig>,
) -> Result<Json<TenantPricingConfig>, PricingError> {
    if config.tenant_id != tenant_id {
        return Err(PricingError::invalid_parameters(format!(
            "tenant_id mismatch: path says {tenant_id:?}, body says {:?}",
            config.tenant_id
        )));
    }
    config.tenant_id = tenant_id;
    state.engine.update_tenant_config(config.clone());
    Ok(Json(config))
}

async fn experiments(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.ab_status())
}

async fn migration_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.migration_status())
}

async fn set_migration(
    State(state): State<AppState>,
    Json(body): Json<MigrationBody>,
) -> impl IntoResponse {
    state
        .engine
        .set_migration(body.strategy, body.rollout_percentage);
    Json(state.engine.migration_status())
}
