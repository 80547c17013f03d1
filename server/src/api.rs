use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Json, Query, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sitescan_engine::url::{domain_of, normalize_target};
use sitescan_engine::{ScanError, ScanReport, Scanner};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Settings;
use crate::db::{Database, LinkError};
use crate::feedback::{FeedbackError, FeedbackService, RatingSubmission};
use crate::models::{
    Cleared, FeedbackRecord, NewScan, ScanRecord, SearchPage, SearchQuery, Stats,
};
use crate::visitors::{CaptchaError, Challenge, VisitorStore};

/// Largest `limit` the recent endpoints accept
const MAX_LIMIT: u32 = 100;

/// Application state
pub struct AppState {
    pub db: Database,
    pub scanner: Scanner,
    pub visitors: Arc<dyn VisitorStore>,
    pub feedback: FeedbackService,
    pub settings: Settings,
}

impl AppState {
    pub fn new(
        db: Database,
        scanner: Scanner,
        visitors: Arc<dyn VisitorStore>,
        settings: Settings,
    ) -> Self {
        let feedback = FeedbackService::new(db.clone(), visitors.clone());
        Self {
            db,
            scanner,
            visitors,
            feedback,
            settings,
        }
    }
}

// API Error handling
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// Structured refusal of a CAPTCHA or rating gate check
    Forbidden {
        message: String,
        reason: &'static str,
        remaining_attempts: Option<u32>,
    },
    NotFound(String),
    /// Every fetch strategy failed
    ScanFailed(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Forbidden {
                message,
                reason,
                remaining_attempts,
            } => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": message,
                    "reason": reason,
                    "remaining_attempts": remaining_attempts,
                }),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::ScanFailed(msg) => (StatusCode::BAD_GATEWAY, json!({ "error": msg })),
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::InvalidUrl(e) => ApiError::BadRequest(format!("Invalid URL: {}", e)),
            ScanError::Fetch(e) => ApiError::ScanFailed(format!("Scan failed: {}", e)),
        }
    }
}

impl From<FeedbackError> for ApiError {
    fn from(err: FeedbackError) -> Self {
        match err {
            FeedbackError::InvalidRating(rating) => {
                ApiError::BadRequest(format!("rating must be between 1 and 5, got {}", rating))
            }
            FeedbackError::Captcha(e) => ApiError::Forbidden {
                message: e.to_string(),
                reason: match e {
                    CaptchaError::Unknown => "captcha_unknown",
                    CaptchaError::Expired => "captcha_expired",
                    CaptchaError::WrongAnswer => "captcha_wrong",
                },
                remaining_attempts: None,
            },
            FeedbackError::Rejected(r) => ApiError::Forbidden {
                message: r.to_string(),
                reason: r.reason(),
                remaining_attempts: Some(r.remaining_attempts()),
            },
            FeedbackError::Link(e @ LinkError::ScanNotFound(_)) => ApiError::NotFound(e.to_string()),
            FeedbackError::Link(e @ LinkError::AlreadyRated(_)) => ApiError::BadRequest(e.to_string()),
            FeedbackError::Storage(e) => e.into(),
        }
    }
}

/// Address of the caller: first `X-Forwarded-For` entry, else the socket peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl ClientAddr {
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match (forwarded, peer) {
            (Some(addr), _) => ClientAddr(addr.to_string()),
            (None, Some(peer)) => ClientAddr(peer.ip().to_string()),
            (None, None) => ClientAddr("unknown".to_string()),
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientAddr::resolve(&parts.headers, peer))
    }
}

// Request and response types
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub id: i64,
    #[serde(flatten)]
    pub report: ScanReport,
}

#[derive(Debug, Serialize)]
pub struct ScanNewResponse {
    pub exists: bool,
    pub scan: ScanRecord,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AdminRequest {
    pub pin: String,
}

/// Build the router with every route and layer
pub fn router(state: Arc<AppState>) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/scan", post(scan_site))
        .route("/api/websites/scan-new", post(scan_new_site))
        .route("/api/websites/search", get(search_websites))
        .route("/api/scans/recent", get(recent_scans))
        .route("/api/captcha", get(new_captcha))
        .route("/api/ratings", post(submit_rating))
        .route("/api/feedback/recent", get(recent_feedback))
        .route("/api/stats", get(get_stats))
        .route("/api/admin/scans", delete(clear_scans))
        .layer(middleware::from_fn_with_state(state.clone(), track_visitor))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until the process is stopped
pub async fn start_api_server(state: Arc<AppState>, addr: &str) -> anyhow::Result<()> {
    let app = router(state);

    info!("Starting API server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn track_visitor(
    State(state): State<Arc<AppState>>,
    ClientAddr(addr): ClientAddr,
    request: Request,
    next: Next,
) -> Response {
    state.visitors.touch(&addr, Instant::now());
    next.run(request).await
}

fn limit_or_default(query: &LimitQuery, settings: &Settings) -> u32 {
    query
        .limit
        .unwrap_or(settings.recent_limit)
        .clamp(1, MAX_LIMIT)
}

// API route handlers
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "message": "SiteScan API is running" }))
}

async fn scan_and_store(state: &AppState, url: &str) -> Result<(ScanRecord, ScanReport), ApiError> {
    let report = state.scanner.scan(url).await.map_err(|e| {
        warn!("Scan of {} failed: {}", url, e);
        ApiError::from(e)
    })?;
    let record = state.db.insert_scan(&NewScan::from_report(&report))?;
    Ok((record, report))
}

async fn scan_site(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, ApiError> {
    let (record, report) = scan_and_store(&state, &req.url).await?;
    Ok(Json(ScanResponse {
        id: record.id,
        report,
    }))
}

/// Scan a domain unless it already has a stored scan
async fn scan_new_site(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<ScanNewResponse>, ApiError> {
    let target = normalize_target(&req.url).map_err(ScanError::from)?;
    let domain = domain_of(&target);

    if let Some(existing) = state.db.find_latest_by_domain(&domain)? {
        info!("{} already scanned as #{}", domain, existing.id);
        return Ok(Json(ScanNewResponse {
            exists: true,
            scan: existing,
        }));
    }

    let (record, _) = scan_and_store(&state, target.as_str()).await?;
    Ok(Json(ScanNewResponse {
        exists: false,
        scan: record,
    }))
}

async fn search_websites(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchPage>, ApiError> {
    Ok(Json(state.db.search_scans(&query)?))
}

async fn recent_scans(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ScanRecord>>, ApiError> {
    let limit = limit_or_default(&query, &state.settings);
    Ok(Json(state.db.recent_scans(limit)?))
}

async fn new_captcha(State(state): State<Arc<AppState>>) -> Json<Challenge> {
    Json(state.visitors.issue_captcha(Instant::now()))
}

async fn submit_rating(
    State(state): State<Arc<AppState>>,
    ClientAddr(addr): ClientAddr,
    Json(submission): Json<RatingSubmission>,
) -> Result<Json<FeedbackRecord>, ApiError> {
    let record = state
        .feedback
        .submit_rating(&addr, submission, Instant::now())
        .map_err(|e| {
            info!("Rating from {} refused: {}", addr, e);
            ApiError::from(e)
        })?;
    Ok(Json(record))
}

async fn recent_feedback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<FeedbackRecord>>, ApiError> {
    let limit = limit_or_default(&query, &state.settings);
    Ok(Json(state.db.recent_feedback(limit)?))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<Stats>, ApiError> {
    let mut stats = state.db.stats()?;
    stats.live_visitors = state.visitors.active_count(Instant::now());
    Ok(Json(stats))
}

async fn clear_scans(
    State(state): State<Arc<AppState>>,
    ClientAddr(addr): ClientAddr,
    Json(req): Json<AdminRequest>,
) -> Result<Json<Cleared>, ApiError> {
    if state.settings.admin_pin.as_deref() != Some(req.pin.as_str()) {
        warn!("Refused bulk clear from {}", addr);
        return Err(ApiError::Forbidden {
            message: "invalid admin PIN".to_string(),
            reason: "invalid_pin",
            remaining_attempts: None,
        });
    }

    Ok(Json(state.db.clear_all()?))
}
