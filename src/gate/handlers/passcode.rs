use crate::gate::{
    handlers::{bearer_token, ClientAddressing},
    service::{AdminService, GateError, VerificationService, Verdict},
};
use axum::{
    extract::{ConnectInfo, Extension},
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize)]
pub struct PasscodeRequest {
    passcode: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    error: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Json<Self> {
        Json(Self {
            error: error.into(),
        })
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RelayFailureResponse {
    message: String,
    error: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeniedResponse {
    message: String,
    remaining_attempts: u32,
    locked: bool,
}

fn submitted_code(payload: Option<Json<PasscodeRequest>>) -> String {
    payload
        .and_then(|Json(request)| request.passcode)
        .unwrap_or_default()
}

#[utoipa::path(
    post,
    path= "/add_passcode",
    request_body = PasscodeRequest,
    responses (
        (status = 200, description = "Passcode replaced", body = MessageResponse),
        (status = 400, description = "Passcode missing or empty", body = MessageResponse),
        (status = 403, description = "Missing or invalid admin bearer token", body = ErrorResponse),
        (status = 500, description = "Passcode could not be stored", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag= "passcode"
)]
// axum handler for replacing the active passcode
#[instrument(skip_all)]
pub async fn add_passcode(
    admin: Extension<Arc<AdminService>>,
    headers: HeaderMap,
    payload: Option<Json<PasscodeRequest>>,
) -> Response {
    let code = submitted_code(payload);

    match admin.set_passcode(bearer_token(&headers), &code).await {
        Ok(()) => (
            StatusCode::OK,
            MessageResponse::new("Passcode updated successfully"),
        )
            .into_response(),
        Err(GateError::Unauthorized) => {
            (StatusCode::FORBIDDEN, ErrorResponse::new("Unauthorized")).into_response()
        }
        Err(GateError::BadRequest(message)) => {
            (StatusCode::BAD_REQUEST, MessageResponse::new(message)).into_response()
        }
        Err(GateError::NotFound | GateError::Internal) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new("Failed to update passcode"),
        )
            .into_response(),
    }
}

#[utoipa::path(
    post,
    path= "/check_passcode",
    request_body = PasscodeRequest,
    responses (
        (status = 200, description = "Access granted, door opened", body = MessageResponse),
        (status = 400, description = "Passcode missing or empty", body = ErrorResponse),
        (status = 403, description = "Wrong passcode", body = DeniedResponse),
        (status = 404, description = "No passcode configured", body = MessageResponse),
        (status = 429, description = "Client is locked out", body = MessageResponse),
        (status = 500, description = "Access granted but the door relay failed, or internal error", body = RelayFailureResponse),
    ),
    tag= "passcode"
)]
// axum handler for checking a passcode and opening the door
#[instrument(skip_all)]
pub async fn check_passcode(
    verifier: Extension<Arc<VerificationService>>,
    addressing: Extension<ClientAddressing>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Option<Json<PasscodeRequest>>,
) -> Response {
    let client_key = addressing.client_key(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let code = submitted_code(payload);

    debug!(client = %client_key, "checking passcode");

    match verifier.verify(&client_key, &code).await {
        Ok(verdict) => verdict_response(verdict),
        Err(GateError::BadRequest(message)) => {
            (StatusCode::BAD_REQUEST, ErrorResponse::new(message)).into_response()
        }
        Err(GateError::NotFound) => {
            (StatusCode::NOT_FOUND, MessageResponse::new("No passcode found")).into_response()
        }
        Err(GateError::Unauthorized | GateError::Internal) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new("Internal server error"),
        )
            .into_response(),
    }
}

fn verdict_response(verdict: Verdict) -> Response {
    match verdict {
        Verdict::Granted => (
            StatusCode::OK,
            MessageResponse::new("Access granted. Door opened."),
        )
            .into_response(),
        Verdict::GrantedButRelayFailed(failure) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RelayFailureResponse {
                message: "Access granted, but failed to open door.".to_string(),
                error: failure.detail().to_string(),
            }),
        )
            .into_response(),
        Verdict::Denied { remaining_attempts } => (
            StatusCode::FORBIDDEN,
            Json(DeniedResponse {
                message: format!("Access denied. {remaining_attempts} tries left."),
                remaining_attempts,
                locked: false,
            }),
        )
            .into_response(),
        Verdict::DeniedLocked => (
            StatusCode::FORBIDDEN,
            Json(DeniedResponse {
                message: "Access denied. Too many failed attempts. Try again later.".to_string(),
                remaining_attempts: 0,
                locked: true,
            }),
        )
            .into_response(),
        Verdict::Locked { retry_after } => {
            let mut headers = HeaderMap::new();
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds(retry_after)));
            (
                StatusCode::TOO_MANY_REQUESTS,
                headers,
                MessageResponse::new("Too many failed attempts. Try again later."),
            )
                .into_response()
        }
    }
}

// Whole seconds, rounded up, never zero.
fn retry_after_seconds(retry_after: Duration) -> u64 {
    let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    seconds.max(1)
}
