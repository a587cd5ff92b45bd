//! HTTP server and API endpoints for the verification server.

use crate::{
    clock::SystemClock,
    config::ServerConfig,
    email::MailDispatcher,
    error::{VerificationError, VerificationResult},
    service::VerificationService,
    store::CodeStore,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Routes listed by the fallback handler
const ROUTES: &[&str] = &[
    "GET /api/health",
    "GET /api/test-email",
    "POST /api/send-verification",
    "POST /api/verify-code",
];

/// Shared application state
#[derive(Debug, Clone)]
pub struct SharedState {
    pub service: Arc<VerificationService>,
}

/// Request to issue a code
#[derive(Debug, Serialize, Deserialize)]
pub struct SendVerificationRequest {
    #[serde(default)]
    pub email: Option<String>,
}

/// Request to check a code
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyCodeRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Plain success response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: String,
    pub email_configured: bool,
}

/// Mail transport check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEmailResponse {
    pub success: bool,
    pub message: String,
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Create the HTTP router with all endpoints
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(health).fallback(not_found))
        .route("/api/test-email", get(test_email).fallback(not_found))
        .route("/api/send-verification", post(send_verification).fallback(not_found))
        .route("/api/verify-code", post(verify_code).fallback(not_found))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "Server is running".to_string(),
        timestamp: state.service.store().now().to_rfc3339_opts(SecondsFormat::Millis, true),
        email_configured: state.service.email_configured(),
    })
}

/// Open the mail transport and report the outcome
async fn test_email(State(state): State<SharedState>) -> (StatusCode, Json<TestEmailResponse>) {
    match state.service.test_connection().await {
        Ok(account) => (
            StatusCode::OK,
            Json(TestEmailResponse {
                success: true,
                message: "Email configuration is working".to_string(),
                configured: true,
                email_user: Some(account),
                error: None,
            }),
        ),
        Err(failure) => {
            warn!("Email configuration test failed: {}", failure.reason);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TestEmailResponse {
                    success: false,
                    message: "Email configuration test failed".to_string(),
                    configured: failure.configured,
                    email_user: None,
                    error: Some(failure.reason),
                }),
            )
        }
    }
}

/// Issue a code and mail it
async fn send_verification(
    State(state): State<SharedState>,
    payload: Result<Json<SendVerificationRequest>, JsonRejection>,
) -> VerificationResult<Json<MessageResponse>> {
    let Json(request) = payload.map_err(reject_body)?;
    let email = request.email.unwrap_or_default();

    info!("Verification code requested for {}", email);

    state.service.issue(&email).await?;

    Ok(MessageResponse::ok("Verification code sent successfully"))
}

/// Check a previously issued code
async fn verify_code(
    State(state): State<SharedState>,
    payload: Result<Json<VerifyCodeRequest>, JsonRejection>,
) -> VerificationResult<Json<MessageResponse>> {
    let Json(request) = payload.map_err(reject_body)?;
    let email = request.email.unwrap_or_default();
    let code = request.code.unwrap_or_default();

    state.service.verify(&email, &code)?;

    Ok(MessageResponse::ok("Email verified successfully"))
}

/// Anything that did not match a route
async fn not_found() -> Response {
    let body = Json(serde_json::json!({
        "success": false,
        "message": format!("Route not found. Available routes: {}", ROUTES.join(", ")),
    }));

    (StatusCode::NOT_FOUND, body).into_response()
}

fn reject_body(rejection: JsonRejection) -> VerificationError {
    VerificationError::InvalidInput(format!("Invalid request body: {}", rejection.body_text()))
}

/// Start the HTTP server
pub async fn start_server(config: &ServerConfig) -> VerificationResult<()> {
    info!("Starting verification server...");

    let store = Arc::new(CodeStore::new(Arc::new(SystemClock)));

    let dispatcher = MailDispatcher::from_config(&config.smtp)
        .map_err(|e| VerificationError::Internal(anyhow::anyhow!("Invalid SMTP settings: {}", e)))?;
    if !dispatcher.is_configured() {
        warn!(
            "Email credentials not set ({} / {}); code delivery is disabled",
            crate::config::EMAIL_USER_ENV,
            crate::config::EMAIL_PASS_ENV
        );
    }

    let code_ttl = i64::try_from(config.verification.code_ttl_minutes)
        .ok()
        .and_then(chrono::Duration::try_minutes)
        .ok_or_else(|| {
            VerificationError::Internal(anyhow::anyhow!(
                "Code TTL of {} minutes is out of range",
                config.verification.code_ttl_minutes
            ))
        })?;
    let cleanup_secs = config
        .verification
        .cleanup_interval_minutes
        .checked_mul(60)
        .ok_or_else(|| {
            VerificationError::Internal(anyhow::anyhow!(
                "Cleanup interval of {} minutes is out of range",
                config.verification.cleanup_interval_minutes
            ))
        })?;

    let service = Arc::new(VerificationService::new(
        store.clone(),
        dispatcher,
        code_ttl,
        std::time::Duration::from_secs(config.verification.dispatch_timeout_secs),
    ));

    if service.email_configured() {
        info!("Testing email connection...");
        if let Err(failure) = service.test_connection().await {
            warn!("Email connection test failed: {}", failure.reason);
        }
    }

    // Evict codes nobody came back for
    let cleanup_store = store.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(cleanup_secs));

        loop {
            interval.tick().await;
            cleanup_store.purge_expired();
        }
    });

    let app = create_router(SharedState { service });

    // Bind and serve
    let bind_addr = format!("{}:{}", config.http.bind_address, config.http.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| VerificationError::Internal(anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e)))?;

    info!("Verification server listening on {}", bind_addr);
    info!("Endpoints:");
    info!("  GET  /api/health             - Health check");
    info!("  GET  /api/test-email         - Test email configuration");
    info!("  POST /api/send-verification  - Send verification code");
    info!("  POST /api/verify-code        - Verify code");

    axum::serve(listener, app)
        .await
        .map_err(|e| VerificationError::Internal(anyhow::anyhow!("Server error: {}", e)))?;

    Ok(())
}
