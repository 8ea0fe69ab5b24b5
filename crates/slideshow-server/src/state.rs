//! Application state for the API server.

use std::sync::Arc;

use slideshow_core::{AuditSink, DeviceRegistry, HostAllowList, ManagerConfig, TracingAuditSink};
use slideshow_proxy::{DeviceProxy, SessionCookie};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Forwarding engine with the registry and allow-list.
    pub proxy: Arc<DeviceProxy>,
    /// Session carrier cookie settings.
    pub session: Arc<SessionCookie>,
    /// Runtime settings.
    pub config: Arc<ManagerConfig>,
    /// Where mutating actions are recorded.
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    /// Creates state from a loaded registry and allow-list.
    pub fn new(
        registry: DeviceRegistry,
        allow_list: HostAllowList,
        config: ManagerConfig,
    ) -> slideshow_proxy::Result<Self> {
        let proxy = DeviceProxy::with_timeout(
            Arc::new(registry),
            Arc::new(allow_list),
            config.upstream_timeout,
        )?;

        Ok(Self {
            proxy: Arc::new(proxy),
            session: Arc::new(SessionCookie::new(config.session_cookie.clone())),
            config: Arc::new(config),
            audit: Arc::new(TracingAuditSink),
        })
    }

    /// Replaces the audit sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// The device registry.
    pub fn registry(&self) -> &DeviceRegistry {
        self.proxy.registry()
    }
}
