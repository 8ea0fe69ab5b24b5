//! Upstream error translation.
//!
//! Players answer failures with backend-specific bodies. Before anything
//! reaches the browser, the status code is mapped onto a small set of
//! categories with fixed messages; only unmapped statuses use the caller's
//! fallback text.

use serde::Serialize;

/// User-facing error category for an upstream status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// 400: input validation failed upstream.
    InvalidRequest,
    /// 401: session expired or invalid; the caller must sign in again.
    SessionExpired,
    /// 404: resource not found.
    NotFound,
    /// 415: unsupported media type.
    UnsupportedMediaType,
    /// 429: rate limited.
    RateLimited,
    /// Anything else.
    Generic,
}

impl ErrorCategory {
    /// Classifies an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorCategory::InvalidRequest,
            401 => ErrorCategory::SessionExpired,
            404 => ErrorCategory::NotFound,
            415 => ErrorCategory::UnsupportedMediaType,
            429 => ErrorCategory::RateLimited,
            _ => ErrorCategory::Generic,
        }
    }

    /// Fixed message for this category. `None` for [`ErrorCategory::Generic`].
    pub fn message(&self) -> Option<&'static str> {
        match self {
            ErrorCategory::InvalidRequest => {
                Some("The request was invalid. Please check your input.")
            }
            ErrorCategory::SessionExpired => {
                Some("Session expired or invalid. Please sign in again.")
            }
            ErrorCategory::NotFound => Some("The requested resource was not found."),
            ErrorCategory::UnsupportedMediaType => {
                Some("The media type is not supported (415).")
            }
            ErrorCategory::RateLimited => Some("Too many requests. Please try again later."),
            ErrorCategory::Generic => None,
        }
    }

    /// Returns the category name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidRequest => "invalid_request",
            ErrorCategory::SessionExpired => "session_expired",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::UnsupportedMediaType => "unsupported_media_type",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::Generic => "generic",
        }
    }
}

/// Maps an upstream status code to the message shown to the user.
///
/// ```
/// use slideshow_core::translate::translate;
///
/// assert_eq!(translate(418, "Could not load state"), "Could not load state");
/// assert!(translate(401, "x").contains("sign in"));
/// ```
pub fn translate(status: u16, fallback: &str) -> String {
    ErrorCategory::from_status(status)
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}
