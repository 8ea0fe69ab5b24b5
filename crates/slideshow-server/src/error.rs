//! API error types.

use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use slideshow_core::translate;
use slideshow_proxy::{ProxyError, SessionCookie};
use thiserror::Error;
use tracing::{error, warn};

/// Shown when the device did not answer before the deadline.
pub const TIMEOUT_MESSAGE: &str = "The device did not respond in time. Please try again.";

/// Shown when the device could not be reached at all.
pub const UNREACHABLE_MESSAGE: &str = "The device could not be reached.";

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Caller sent a malformed or invalid payload.
    #[error("{0}")]
    BadRequest(String),

    /// Method not supported on this route.
    #[error("{0}")]
    MethodNotAllowed(String),

    /// Device answered with an error status; the status is mirrored.
    #[error("{message}")]
    Device {
        status: StatusCode,
        message: String,
        set_cookie: Option<String>,
    },

    /// Anything else.
    #[error("{message}")]
    Internal {
        message: String,
        set_cookie: Option<String>,
    },
}

impl ApiError {
    /// Builds the browser-facing error for a failed device call.
    ///
    /// Cookies the device rotated on the failing response are re-homed into
    /// the session carrier. Device hosts never appear in the message.
    pub fn from_proxy(err: ProxyError, fallback: &str, carrier: &SessionCookie) -> Self {
        let set_cookie = err.session().and_then(|jar| carrier.set_cookie(jar));

        match err {
            ProxyError::Status { status, body, .. } => {
                let fallback = if body.is_empty() { fallback } else { body.as_str() };
                Self::Device {
                    status,
                    message: translate(status.as_u16(), fallback),
                    set_cookie,
                }
            }
            ProxyError::Timeout(_) => {
                warn!(phase = %err.phase(), "{}", err);
                Self::internal(TIMEOUT_MESSAGE, set_cookie)
            }
            ProxyError::Network(_) => {
                warn!(phase = %err.phase(), "{}", err);
                Self::internal(UNREACHABLE_MESSAGE, set_cookie)
            }
            ProxyError::UnexpectedContentType { .. } | ProxyError::Decode { .. } => {
                warn!(phase = %err.phase(), "{}", err);
                Self::internal(fallback, set_cookie)
            }
            ProxyError::Registry(_)
            | ProxyError::Host(_)
            | ProxyError::InvalidUrl(_)
            | ProxyError::Client(_) => {
                error!(phase = %err.phase(), "{}", err);
                Self::internal(fallback, None)
            }
        }
    }

    fn internal(message: &str, set_cookie: Option<String>) -> Self {
        Self::Internal {
            message: message.to_string(),
            set_cookie,
        }
    }

    /// HTTP status sent to the browser.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Device { status, .. } => *status,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub status: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            message: self.to_string(),
            status: status.as_u16(),
        };

        let set_cookie = match self {
            Self::Device { set_cookie, .. } | Self::Internal { set_cookie, .. } => set_cookie,
            _ => None,
        };

        let mut response = (status, axum::Json(body)).into_response();
        if let Some(value) = set_cookie.and_then(|value| HeaderValue::from_str(&value).ok()) {
            response.headers_mut().append(SET_COOKIE, value);
        }
        response
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
