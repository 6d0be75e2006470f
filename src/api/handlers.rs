//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint. Cache operations
//! block on locks and file I/O, so they run on the blocking thread pool.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::DualCache;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, DeleteResponse, GetResponse, HealthResponse, SetRequest, SetResponse,
    StatsResponse,
};

/// Application state shared across all handlers.
///
/// The cache synchronizes internally, so a plain `Arc` is enough.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<DualCache<Value>>,
}

impl AppState {
    /// Creates a new AppState around an already built cache.
    pub fn new(cache: DualCache<Value>) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Builds the cache described by the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.builder().build()?))
    }
}

/// Runs a cache call off the async executor.
async fn run_blocking<R, F>(state: &AppState, op: F) -> Result<R>
where
    F: FnOnce(&DualCache<Value>) -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    let cache = Arc::clone(&state.cache);
    tokio::task::spawn_blocking(move || op(&cache))
        .await
        .map_err(|e| CacheError::Internal(format!("cache task failed: {}", e)))?
}

/// Handler for PUT /set
///
/// Stores a JSON value; `ttl_ms` overrides the default TTL in volatile entry mode.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let SetRequest { key, value, ttl_ms } = req;
    let stored_key = key.clone();
    run_blocking(&state, move |cache| match ttl_ms {
        Some(ms) => cache.put_with_ttl(&stored_key, value, Duration::from_millis(ms)),
        None => cache.put(&stored_key, value),
    })
    .await?;

    Ok(Json(SetResponse::new(key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let lookup = key.clone();
    let entry = run_blocking(&state, move |cache| cache.get_entry(&lookup)).await?;

    match entry {
        Some(entry) => {
            let ttl_ms = entry.ttl_remaining_ms();
            Ok(Json(GetResponse::new(key, entry.value, ttl_ms)))
        }
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
///
/// Invalidating a missing key still succeeds.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let target = key.clone();
    run_blocking(&state, move |cache| cache.invalidate(&target)).await?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for DELETE /clear
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    run_blocking(&state, |cache| cache.clear()).await?;
    Ok(Json(ClearResponse::cleared()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = run_blocking(&state, |cache| Ok(cache.stats())).await?;
    Ok(Json(StatsResponse::from(stats)))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
