//! API request/response models.

use serde::{Deserialize, Serialize};
use slideshow_core::DeviceDefinition;

/// POST /api/auth/login request.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginRequest {
    pub device_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    /// Returns `(device_id, username, password)` when all are non-empty.
    pub fn credentials(&self) -> Option<(&str, &str, &str)> {
        fn non_empty(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|value| !value.is_empty())
        }

        Some((
            non_empty(&self.device_id)?,
            non_empty(&self.username)?,
            non_empty(&self.password)?,
        ))
    }
}

/// POST /api/auth/logout request. The body is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogoutRequest {
    pub device_id: Option<String>,
}

/// Query for POST /api/auth/logout.
#[derive(Debug, Default, Deserialize)]
pub struct LogoutQuery {
    pub device: Option<String>,
}

/// Query carrying an HTML-form method override.
#[derive(Debug, Default, Deserialize)]
pub struct MethodOverride {
    #[serde(rename = "_method")]
    pub method: Option<String>,
}

/// Generic success acknowledgement.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// GET /health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub devices: usize,
}

/// GET /api/devices/active response.
#[derive(Debug, Serialize)]
pub struct ActiveDeviceResponse {
    pub device: Option<DeviceDefinition>,
}
