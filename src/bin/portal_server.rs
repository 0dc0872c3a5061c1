// Patron portal JSON API.
// Patron identity comes from the path; session handling sits in front of this service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::NaiveDate;
use patron_portal::core::feedback::{self, FeedbackForm};
use patron_portal::core::{checkouts, fines, payments, requests};
use patron_portal::utils::logger;
use patron_portal::{PortalConfig, PortalError, PortalService, SortField, View};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct AppState {
    service: Arc<PortalService>,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
        .into_response()
    }
}

/// Maps a failure to an HTTP status with a patron-safe message.
struct ApiError(PortalError);

impl From<PortalError> for ApiError {
    fn from(e: PortalError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PortalError::NotFound { .. } => StatusCode::NOT_FOUND,
            PortalError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            PortalError::Validation { .. }
            | PortalError::Spam { .. }
            | PortalError::PickupNotAllowed { .. }
            | PortalError::PaymentNotAllowed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PortalError::InvalidSignature => StatusCode::BAD_REQUEST,
            PortalError::PaymentFailed { .. } => StatusCode::PAYMENT_REQUIRED,
            PortalError::Http(_) | PortalError::Ils { .. } | PortalError::Serialization(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("❌ {} (Category: {:?})", self.0, self.0.category());
        } else {
            tracing::debug!("Request failed: {}", self.0);
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.0.user_friendly_message()),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult = std::result::Result<Response, ApiError>;

#[derive(Debug, Deserialize)]
struct ListQuery {
    view: Option<String>,
    sort: Option<String>,
}

impl ListQuery {
    fn view(&self) -> Result<View, PortalError> {
        self.view.as_deref().unwrap_or("own").parse()
    }

    fn sort(&self, default: SortField) -> Result<SortField, PortalError> {
        match self.sort.as_deref() {
            Some(sort) => sort.parse(),
            None => Ok(default),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateRequestBody {
    pickup: Option<String>,
    not_needed_after: Option<NaiveDate>,
}

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/patrons/:key/summary
async fn get_summary(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult {
    Ok(ApiResponse::ok(state.service.summary(&key).await?))
}

/// GET /api/patrons/:key/checkouts
async fn get_checkouts(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let rows = checkouts::list(&state.service, &key, query.view()?, query.sort(SortField::DueDate)?).await?;
    Ok(ApiResponse::ok(rows))
}

/// POST /api/patrons/:key/checkouts/:id/renew
async fn renew(State(state): State<AppState>, Path((key, id)): Path<(String, String)>) -> ApiResult {
    Ok(ApiResponse::ok(checkouts::renew(&state.service, &key, &id).await?))
}

/// POST /api/patrons/:key/checkouts/renew-all
async fn renew_all(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult {
    Ok(ApiResponse::ok(checkouts::renew_all(&state.service, &key).await?))
}

/// GET /api/patrons/:key/requests
async fn get_requests(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let rows = requests::list(&state.service, &key, query.view()?, query.sort(SortField::Date)?).await?;
    Ok(ApiResponse::ok(rows))
}

/// POST /api/patrons/:key/requests/:id/cancel
async fn cancel_request(
    State(state): State<AppState>,
    Path((key, id)): Path<(String, String)>,
) -> ApiResult {
    Ok(ApiResponse::ok(requests::cancel(&state.service, &key, &id).await?))
}

/// POST /api/patrons/:key/requests/:id
async fn update_request(
    State(state): State<AppState>,
    Path((key, id)): Path<(String, String)>,
    Json(body): Json<UpdateRequestBody>,
) -> ApiResult {
    let flash = requests::update(
        &state.service,
        &key,
        &id,
        body.pickup.as_deref(),
        body.not_needed_after,
    )
    .await?;
    Ok(ApiResponse::ok(flash))
}

/// GET /api/patrons/:key/fines
async fn get_fines(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    Ok(ApiResponse::ok(fines::list(&state.service, &key, query.view()?).await?))
}

/// POST /api/patrons/:key/payments
async fn start_payment(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    Ok(ApiResponse::ok(payments::start(&state.service, &key, query.view()?).await?))
}

/// POST /api/payments/accept - gateway callback, form encoded
async fn accept_payment(
    State(state): State<AppState>,
    Form(params): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    ApiResponse::ok(payments::accept(&state.service, params).await)
}

/// POST /api/payments/cancel
async fn cancel_payment() -> impl IntoResponse {
    ApiResponse::ok(payments::cancel())
}

/// POST /api/feedback
async fn submit_feedback(Json(form): Json<FeedbackForm>) -> ApiResult {
    Ok(ApiResponse::ok(feedback::submit(form)?))
}

fn router(state: AppState) -> Router {
    let patron_routes = Router::new()
        .route("/:key/summary", get(get_summary))
        .route("/:key/checkouts", get(get_checkouts))
        .route("/:key/checkouts/renew-all", post(renew_all))
        .route("/:key/checkouts/:id/renew", post(renew))
        .route("/:key/requests", get(get_requests))
        .route("/:key/requests/:id", post(update_request))
        .route("/:key/requests/:id/cancel", post(cancel_request))
        .route("/:key/fines", get(get_fines))
        .route("/:key/payments", post(start_payment));

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .nest("/patrons", patron_routes)
        .route("/payments/accept", post(accept_payment))
        .route("/payments/cancel", post(cancel_payment))
        .route("/feedback", post(submit_feedback));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let json_logs = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(true);
    logger::init_server_logger(json_logs);

    let config_path = std::env::var("PORTAL_CONFIG").unwrap_or_else(|_| "portal.toml".to_string());
    let config = PortalConfig::from_file(&config_path)?;
    let service = PortalService::from_config(&config)?;
    tracing::info!("✓ Configuration loaded from {}", config_path);

    let state = AppState {
        service: Arc::new(service),
    };

    let addr = std::env::var("PORTAL_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🚀 Patron portal API listening on http://{}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
