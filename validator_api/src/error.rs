//! The `{code, message}` error envelope and warp rejection handling.
//!
//! Every non-2xx response carries a JSON body with `Content-Type:
//! application/json`, mirroring beacon-API semantics: body and parameter
//! parse failures are 400s with structured messages, wrong methods and
//! unknown routes are 404s.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::{reject::Reject, Rejection, Reply};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: u16,
    pub message: String,
}

/// A structured API error, propagated through warp as a custom rejection.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub code: StatusCode,
    pub message: String,
}

impl Reject for ApiError {}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }

    pub fn reject(self) -> Rejection {
        warp::reject::custom(self)
    }
}

/// Translates pipeline errors into VC-facing status codes. Peer-side detail
/// never leaks; validation failures are 4xx, everything else 5xx.
pub fn from_core(e: dv_core::Error) -> ApiError {
    use dv_core::Error;
    match e {
        Error::Cancelled => ApiError::service_unavailable("shutting down"),
        Error::DutyNotFound(duty) => ApiError::not_found(format!("duty not found: {}", duty)),
        Error::DeadlineExceeded(duty) => {
            ApiError::not_found(format!("duty deadline exceeded: {}", duty))
        }
        Error::DoubleSign { duty, share_index, .. } => ApiError::bad_request(format!(
            "conflicting partial signature from share {} for duty {}",
            share_index, duty
        )),
        Error::UnknownPubkey(pubkey) => {
            ApiError::bad_request(format!("unknown validator {:?}", pubkey))
        }
        Error::InvalidPartialSignature { duty, .. } => {
            ApiError::bad_request(format!("invalid partial signature for duty {}", duty))
        }
        other => ApiError::internal(format!("internal error: {:?}", other)),
    }
}

fn json_error(code: StatusCode, message: &str) -> impl Reply {
    let body = warp::reply::json(&ErrorMessage {
        code: code.as_u16(),
        message: message.to_string(),
    });
    warp::reply::with_status(body, code)
}

/// The recover filter terminating every route chain.
pub async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    if let Some(api_error) = rejection.find::<ApiError>() {
        return Ok(json_error(api_error.code, &api_error.message));
    }
    if rejection.is_not_found() {
        return Ok(json_error(StatusCode::NOT_FOUND, "not found"));
    }
    if rejection
        .find::<warp::reject::MethodNotAllowed>()
        .is_some()
    {
        // Wrong method reads as an unknown endpoint to VCs.
        return Ok(json_error(StatusCode::NOT_FOUND, "not found"));
    }
    Ok(json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "unhandled internal error",
    ))
}

/// Parses a JSON request body with the structured parse-error messages.
pub fn parse_body<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::bad_request("empty request body"));
    }
    serde_json::from_slice(bytes)
        .map_err(|_| ApiError::bad_request("failed parsing json request body"))
}
