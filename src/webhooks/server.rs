//! Admission webhook server.
//!
//! Provides HTTP endpoints for the Cache admission webhooks:
//! - `/mutate-cache` - records the creating user in the `owner` label
//! - `/validate-cache` - runs the tiered validation policies
//!
//! Mount the TLS certificate secret to the operator pod at /etc/webhook/certs/
//! and register both paths in the Mutating/ValidatingWebhookConfiguration.
//! The webhook server starts automatically when certificates are present.

use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::post};
use kube::Resource;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use tracing::{debug, error, info, warn};

use crate::crd::Cache;
use crate::webhooks::mutation::mutation_patch;
use crate::webhooks::policies::{ValidationContext, validate_all};

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 9443;

/// Create a denial response with reason embedded in message.
/// kube-rs deny() only sets status.message, so we format as "[reason] message"
fn deny_with_reason<T: Resource<DynamicType = ()>>(
    request: &AdmissionRequest<T>,
    message: &str,
    reason: &str,
) -> AdmissionResponse {
    AdmissionResponse::from(request).deny(format!("[{}] {}", reason, message))
}

/// Create the webhook router
pub fn create_webhook_router() -> Router {
    Router::new()
        .route("/mutate-cache", post(mutate_cache))
        .route("/validate-cache", post(validate_cache))
}

fn into_request(
    review: AdmissionReview<Cache>,
) -> Result<AdmissionRequest<Cache>, (StatusCode, Json<AdmissionReview<DynamicObject>>)> {
    review.try_into().map_err(|e| {
        error!(error = %e, "Failed to extract admission request");
        (
            StatusCode::BAD_REQUEST,
            Json(AdmissionResponse::invalid(format!("Invalid AdmissionReview: {}", e)).into_review()),
        )
    })
}

/// Mutating admission handler for Cache
async fn mutate_cache(Json(review): Json<AdmissionReview<Cache>>) -> impl IntoResponse {
    match into_request(review) {
        Ok(request) => (StatusCode::OK, Json(review_mutation(&request).into_review())),
        Err(rejection) => rejection,
    }
}

/// Validating admission handler for Cache
async fn validate_cache(Json(review): Json<AdmissionReview<Cache>>) -> impl IntoResponse {
    match into_request(review) {
        Ok(request) => (StatusCode::OK, Json(review_validation(&request).into_review())),
        Err(rejection) => rejection,
    }
}

/// Decide the mutation response for one request
pub fn review_mutation(request: &AdmissionRequest<Cache>) -> AdmissionResponse {
    let uid = &request.uid;
    let ops = mutation_patch(request);
    if ops.is_empty() {
        debug!(uid = %uid, operation = ?request.operation, "No mutation required");
        return AdmissionResponse::from(request);
    }

    info!(uid = %uid, name = ?request.name, patch_ops = ops.len(), "Mutating Cache");
    match AdmissionResponse::from(request).with_patch(json_patch::Patch(ops)) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to serialize patch");
            deny_with_reason(request, &format!("patch serialization error: {}", e), "InternalError")
        }
    }
}

/// Decide the validation response for one request
pub fn review_validation(request: &AdmissionRequest<Cache>) -> AdmissionResponse {
    let uid = &request.uid;
    debug!(
        uid = %uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = ?request.name,
        "Processing admission request"
    );

    // DELETE operations are always allowed
    if request.operation == Operation::Delete {
        info!(uid = %uid, "Admission request allowed (DELETE)");
        return AdmissionResponse::from(request);
    }

    let Some(cache) = request.object.as_ref() else {
        error!(uid = %uid, "Missing object in request");
        return deny_with_reason(request, "Missing object in request", "InvalidRequest");
    };

    let old_cache = match request.operation {
        Operation::Update => request.old_object.as_ref(),
        _ => None,
    };

    let ctx = ValidationContext {
        cache,
        old_cache,
    };

    let result = validate_all(&ctx);
    if !result.allowed {
        let reason = result
            .reason
            .unwrap_or_else(|| "ValidationFailed".to_string());
        let message = result
            .message
            .unwrap_or_else(|| "Validation failed".to_string());
        warn!(uid = %uid, reason = %reason, message = %message, "Admission request denied");
        return deny_with_reason(request, &message, &reason);
    }

    info!(uid = %uid, "Admission request allowed");
    AdmissionResponse::from(request)
}

/// Errors that can occur when running the webhook server
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
    /// Server error
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Run the webhook server with TLS
///
/// Binds to 0.0.0.0:9443 and serves the Cache admission endpoints.
/// TLS certificates are loaded from the paths specified.
pub async fn run_webhook_server(cert_path: &str, key_path: &str) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let app = create_webhook_router();

    let config = RustlsConfig::from_pem_file(PathBuf::from(cert_path), PathBuf::from(key_path))
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], WEBHOOK_PORT));
    info!(port = WEBHOOK_PORT, "Webhook server listening with TLS");

    axum_server::bind_rustls(addr, config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
