//! Runtime settings shared by the proxy and the route layer.

use std::time::Duration;

use thiserror::Error;

/// Default name of the cookie carrying the packed device session.
pub const DEFAULT_SESSION_COOKIE: &str = "slideshow_manager_session";

/// Cookie remembering the most recently signed-in device.
pub const ACTIVE_DEVICE_COOKIE: &str = "slideshow_active_device";

/// Request header that overrides the active-device cookie.
pub const ACTIVE_DEVICE_HEADER: &str = "x-slideshow-device";

/// Environment variable holding the device registry JSON.
pub const DEVICE_REGISTRY_ENV: &str = "SLIDESHOW_MANAGER_DEVICE_REGISTRY";

/// Default deadline for one upstream call.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_millis(8000);

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Cookie name is empty or contains characters not allowed in a cookie name.
    #[error("invalid session cookie name {0:?}")]
    InvalidCookieName(String),

    /// Upstream timeout of zero.
    #[error("upstream timeout must be greater than zero")]
    ZeroTimeout,
}

/// Settings for the session bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Name of the session carrier cookie.
    pub session_cookie: String,
    /// Deadline for each upstream call, from send to response head.
    pub upstream_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

impl ManagerConfig {
    /// Sets the session cookie name.
    pub fn with_session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie = name.into();
        self
    }

    /// Sets the upstream timeout.
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    /// Checks the settings before the server starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_cookie_token(&self.session_cookie) {
            return Err(ConfigError::InvalidCookieName(self.session_cookie.clone()));
        }
        if self.upstream_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// RFC 6265 cookie-name token check.
fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.session_cookie, "slideshow_manager_session");
        assert_eq!(config.upstream_timeout, Duration::from_millis(8000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_overrides() {
        let config = ManagerConfig::default()
            .with_session_cookie("sm_session")
            .with_upstream_timeout(Duration::from_secs(2));
        assert_eq!(config.session_cookie, "sm_session");
        assert_eq!(config.upstream_timeout, Duration::from_secs(2));
    }

    #[test]
    fn rejects_bad_cookie_names() {
        for name in ["", "has space", "semi;colon", "eq=uals"] {
            let config = ManagerConfig::default().with_session_cookie(name);
            assert_eq!(
                config.validate(),
                Err(ConfigError::InvalidCookieName(name.to_string()))
            );
        }
    }

    #[test]
    fn rejects_zero_timeout() {
        let config = ManagerConfig::default().with_upstream_timeout(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }
}
