//! HTTP route handlers for the Presence server.
//!
//! This module provides the HTTP API:
//!
//! - `POST /api/status` / `GET /api/current` - desktop activity channel
//! - `POST /api/heartrate` / `GET /api/latest_heartrate` - heart-rate channel
//! - `POST /api/phone_status` / `GET /api/phone_latest` - phone channel
//! - `GET /api/dashboard` - all three channel states in one response
//! - `GET /health` - health check
//!
//! # Architecture
//!
//! POST handlers are the ingestion gateway: credential check, schema
//! validation, then one atomic append to the channel store. GET handlers are
//! the query gateway: read the latest record, evaluate staleness lazily
//! against the request clock, and serialize a presentation-ready response.
//! Every handler shares [`AppState`]; nothing else is global.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::auth;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::ingest::{parse_report, ActivityReport, HeartRateReport, PhoneStatusReport};
use crate::staleness::{self, Liveness};
use crate::store::{ChannelRecord, Store};
use crate::types::{
    ActivityRecord, HeartRateRecord, LockState, OpenApp, PhoneStatusRecord, RecordId,
};

/// Maximum body size for report ingestion (1 MB).
const MAX_BODY_SIZE: usize = 1024 * 1024;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration, including the shared credential.
    pub config: Arc<Config>,

    /// The channel store.
    pub store: Store,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state from configuration and an opened store.
    #[must_use]
    pub fn new(config: Config, store: Store) -> Self {
        Self {
            config: Arc::new(config),
            store,
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Config carries the shared secret; keep it out of debug output.
        f.debug_struct("AppState")
            .field("config", &"<Config>")
            .field("store", &self.store)
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
///
/// GET endpoints are CORS-enabled so a dashboard page served from another
/// origin can poll them; the trace layer logs one span per request.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", post(post_status))
        .route("/api/current", get(get_current))
        .route("/api/heartrate", post(post_heartrate))
        .route("/api/latest_heartrate", get(get_latest_heartrate))
        .route("/api/phone_status", post(post_phone_status))
        .route("/api/phone_latest", get(get_phone_latest))
        .route("/api/dashboard", get(get_dashboard))
        .route("/health", get(get_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Ingestion gateway
// ============================================================================

/// Acknowledgement returned for every stored report.
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    /// Identifier assigned to the stored record at append time.
    pub id: RecordId,
}

/// Shared ingestion flow: authenticate, validate, append.
///
/// The credential check runs first so malformed bodies from unauthenticated
/// callers are rejected as unauthorized, and nothing is stored unless every
/// step succeeds.
async fn ingest_report<T, R, F>(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    build: F,
) -> ApiResult<Json<Ack>>
where
    T: DeserializeOwned,
    R: ChannelRecord,
    F: FnOnce(T, DateTime<Utc>) -> ApiResult<R>,
{
    if let Err(err) = auth::authorize(headers, body, &state.config.secret_token) {
        warn!(channel = %R::CHANNEL, error = %err, "Rejected report");
        return Err(err.into());
    }

    let report: T = parse_report(body).inspect_err(|err| {
        debug!(channel = %R::CHANNEL, error = %err, "Failed to parse report");
    })?;

    let record = build(report, Utc::now())?;
    let id = state.store.append(record).await?;

    info!(channel = %R::CHANNEL, id = %id, "Report stored");
    Ok(Json(Ack { ok: true, id }))
}

/// POST /api/status - ingest a desktop activity report.
async fn post_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Ack>> {
    ingest_report(&state, &headers, &body, ActivityReport::into_record).await
}

/// POST /api/heartrate - ingest a heart-rate sample.
async fn post_heartrate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Ack>> {
    ingest_report(&state, &headers, &body, HeartRateReport::into_record).await
}

/// POST /api/phone_status - ingest a phone status report.
async fn post_phone_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Ack>> {
    ingest_report(&state, &headers, &body, PhoneStatusReport::into_record).await
}

// ============================================================================
// Query gateway
// ============================================================================

/// Reads the latest record of a channel and evaluates its staleness.
async fn current_state<R: ChannelRecord>(state: &AppState) -> ApiResult<(Option<R>, Liveness)> {
    let latest = state.store.latest::<R>().await?;
    let threshold = state.config.thresholds.for_channel(R::CHANNEL);
    let liveness = staleness::evaluate(
        latest.as_ref().map(ChannelRecord::created_at),
        Utc::now(),
        threshold,
    );
    Ok((latest, liveness))
}

/// Current desktop activity state (`GET /api/current`).
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentActivity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_process: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_title: Option<String>,
    /// Empty both for an idle desktop and for a channel that never reported.
    #[serde(default)]
    pub apps: Vec<OpenApp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<u64>,
    pub is_live: bool,
}

impl CurrentActivity {
    fn compose(record: Option<ActivityRecord>, liveness: Liveness) -> Self {
        let (reported_at, active_process, active_title, apps) = match record {
            Some(record) => (
                Some(record.created_at),
                record.active_process,
                record.active_title,
                record.open_apps,
            ),
            None => (None, None, None, Vec::new()),
        };

        Self {
            reported_at,
            active_process,
            active_title,
            apps,
            age_seconds: liveness.age_seconds,
            is_live: liveness.is_live,
        }
    }
}

/// Latest heart-rate state (`GET /api/latest_heartrate`).
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestHeartRate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<u64>,
    pub is_live: bool,
}

impl LatestHeartRate {
    fn compose(record: Option<HeartRateRecord>, liveness: Liveness) -> Self {
        let (reported_at, rate, source) = match record {
            Some(record) => (Some(record.created_at), Some(record.rate), record.source),
            None => (None, None, None),
        };

        Self {
            reported_at,
            rate,
            source,
            age_seconds: liveness.age_seconds,
            is_live: liveness.is_live,
        }
    }
}

/// Latest phone state (`GET /api/phone_latest`).
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneLatest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<LockState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<u64>,
    pub is_live: bool,
}

impl PhoneLatest {
    fn compose(record: Option<PhoneStatusRecord>, liveness: Liveness) -> Self {
        let (reported_at, locked, battery, app, source) = match record {
            Some(record) => (
                Some(record.created_at),
                Some(record.locked),
                record.battery,
                record.app,
                record.source,
            ),
            None => (None, None, None, None, None),
        };

        Self {
            reported_at,
            locked,
            battery,
            app,
            source,
            age_seconds: liveness.age_seconds,
            is_live: liveness.is_live,
        }
    }
}

/// Combined dashboard state (`GET /api/dashboard`).
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub activity: CurrentActivity,
    pub heart_rate: LatestHeartRate,
    pub phone: PhoneLatest,
}

/// GET /api/current - latest desktop activity plus staleness.
async fn get_current(State(state): State<AppState>) -> ApiResult<Json<CurrentActivity>> {
    let (record, liveness) = current_state::<ActivityRecord>(&state).await?;
    Ok(Json(CurrentActivity::compose(record, liveness)))
}

/// GET /api/latest_heartrate - latest heart-rate sample plus staleness.
async fn get_latest_heartrate(State(state): State<AppState>) -> ApiResult<Json<LatestHeartRate>> {
    let (record, liveness) = current_state::<HeartRateRecord>(&state).await?;
    Ok(Json(LatestHeartRate::compose(record, liveness)))
}

/// GET /api/phone_latest - latest phone status plus staleness.
async fn get_phone_latest(State(state): State<AppState>) -> ApiResult<Json<PhoneLatest>> {
    let (record, liveness) = current_state::<PhoneStatusRecord>(&state).await?;
    Ok(Json(PhoneLatest::compose(record, liveness)))
}

/// GET /api/dashboard - all channel states in one response.
async fn get_dashboard(State(state): State<AppState>) -> ApiResult<Json<Dashboard>> {
    let (activity, activity_liveness) = current_state::<ActivityRecord>(&state).await?;
    let (heart_rate, heart_rate_liveness) = current_state::<HeartRateRecord>(&state).await?;
    let (phone, phone_liveness) = current_state::<PhoneStatusRecord>(&state).await?;

    Ok(Json(Dashboard {
        activity: CurrentActivity::compose(activity, activity_liveness),
        heart_rate: LatestHeartRate::compose(heart_rate, heart_rate_liveness),
        phone: PhoneLatest::compose(phone, phone_liveness),
    }))
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for the health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - health check. No authentication required.
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================
