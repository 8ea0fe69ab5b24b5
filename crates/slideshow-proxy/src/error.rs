//! Error types for the device proxy.

use std::time::Duration;

use reqwest::StatusCode;
use slideshow_core::{HostGuardError, RegistryError};
use thiserror::Error;

use crate::proxy::ForwardPhase;
use crate::session::CookieJar;

/// Proxy error type.
///
/// Variants produced after the device answered carry the cookie jar the
/// device handed out, so the caller's stored session can still be rotated.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Unknown device id or broken registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Device host rejected by the allow-list.
    #[error(transparent)]
    Host(#[from] HostGuardError),

    /// Device host and path do not form a usable URL.
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    /// No response within the deadline.
    #[error("Device did not respond within {} ms", .0.as_millis())]
    Timeout(Duration),

    /// Connection refused, DNS failure, reset, ...
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Device answered 2xx with something other than JSON.
    #[error("Unexpected content type from device: {content_type}")]
    UnexpectedContentType {
        content_type: String,
        session: CookieJar,
    },

    /// Device answered with a non-success status.
    #[error("Device responded with HTTP {status}")]
    Status {
        status: StatusCode,
        body: String,
        session: CookieJar,
    },

    /// Device answered JSON that does not match the expected shape.
    #[error("Invalid JSON from device: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        session: CookieJar,
    },

    /// HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ProxyError {
    /// Phase the forward had reached when it failed.
    pub fn phase(&self) -> ForwardPhase {
        match self {
            Self::Client(_) => ForwardPhase::Idle,
            Self::Registry(_) => ForwardPhase::Resolving,
            Self::Host(_) => ForwardPhase::HostChecking,
            Self::InvalidUrl(_) => ForwardPhase::Sending,
            Self::Timeout(_) => ForwardPhase::TimedOut,
            Self::Network(_) => ForwardPhase::NetworkError,
            Self::UnexpectedContentType { .. } | Self::Status { .. } | Self::Decode { .. } => {
                ForwardPhase::Succeeded
            }
        }
    }

    /// Upstream HTTP status, if the device answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Cookies the device set on the failing response.
    pub fn session(&self) -> Option<&CookieJar> {
        match self {
            Self::UnexpectedContentType { session, .. }
            | Self::Status { session, .. }
            | Self::Decode { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Returns true for deadline failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
