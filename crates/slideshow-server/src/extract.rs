//! Request extractors.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use slideshow_core::config::ACTIVE_DEVICE_HEADER;
use slideshow_proxy::session::read_active_device;
use slideshow_proxy::CallerContext;

use crate::state::AppState;

/// The caller's unpacked device session.
///
/// A missing or corrupt session cookie yields an anonymous caller.
#[derive(Debug, Clone)]
pub struct Caller(pub CallerContext);

impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = state.session.read(&parts.headers);
        Ok(Self(CallerContext::with_jar(jar)))
    }
}

/// Device the caller last selected: header first, then the marker cookie.
pub fn preferred_device(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTIVE_DEVICE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| read_active_device(headers))
}
