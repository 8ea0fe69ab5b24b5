//! Slideshow Manager Server - HTTP API in front of the players.
//!
//! Every device route forwards to the named player through the session
//! bridge and re-homes any cookies the player rotates.
//!
//! ## Endpoints
//!
//! - `GET /health` - Liveness probe
//! - `GET /api/devices` - Configured devices
//! - `GET /api/devices/active` - Device selected by header or marker cookie
//! - `POST /api/auth/login` - Sign in to a device
//! - `POST /api/auth/logout` - Sign out and clear session cookies
//! - `GET /api/devices/{id}/state` - Player status
//! - `GET /api/devices/{id}/config` - Player configuration
//! - `GET|POST /api/devices/{id}/sources` - List or create media sources
//! - `PUT|DELETE /api/devices/{id}/sources/{name}` - Update or delete a source
//! - `PUT /api/devices/{id}/playback` - Save playback settings
//! - `POST /api/devices/{id}/player/{action}` - start, stop, reload
//! - `POST /api/devices/{id}/player/info-screen` - Toggle the info screen
//! - `GET /api/devices/{id}/config/export` - Download configuration
//! - `POST /api/devices/{id}/config/import` - Upload configuration
//! - `GET /api/devices/{id}/logs/{log_name}` - Download a log file
//! - `GET /api/devices/{id}/media/preview/{*path}` - Media preview
//!
//! ## Example
//!
//! ```no_run
//! use slideshow_core::{DeviceRegistry, HostAllowList, ManagerConfig};
//! use slideshow_server::{AppState, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let state = AppState::new(
//!         DeviceRegistry::empty(),
//!         HostAllowList::allow_all(),
//!         ManagerConfig::default(),
//!     )
//!     .unwrap();
//!     let server = Server::with_state(ServerConfig::default(), state).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
pub mod extract;
mod handlers;
pub mod models;
pub mod state;

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, Result};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default server host (localhost only).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Largest accepted configuration upload.
pub const MAX_IMPORT_BYTES: usize = 16 * 1024 * 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 3000).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Builds the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/devices", get(handlers::list_devices))
        .route("/api/devices/active", get(handlers::active_device))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/devices/{device_id}/state", get(handlers::device_state))
        .route("/api/devices/{device_id}/config", get(handlers::device_config))
        .route(
            "/api/devices/{device_id}/sources",
            get(handlers::list_sources).post(handlers::create_source),
        )
        .route(
            "/api/devices/{device_id}/sources/{name}",
            put(handlers::update_source)
                .delete(handlers::delete_source)
                .post(handlers::source_method_override),
        )
        .route("/api/devices/{device_id}/playback", put(handlers::update_playback))
        .route(
            "/api/devices/{device_id}/player/info-screen",
            post(handlers::info_screen),
        )
        .route(
            "/api/devices/{device_id}/player/{action}",
            post(handlers::player_action),
        )
        .route(
            "/api/devices/{device_id}/config/export",
            get(handlers::export_config),
        )
        .route(
            "/api/devices/{device_id}/config/import",
            post(handlers::import_config).layer(DefaultBodyLimit::max(MAX_IMPORT_BYTES)),
        )
        .route(
            "/api/devices/{device_id}/logs/{log_name}",
            get(handlers::download_log),
        )
        .route(
            "/api/devices/{device_id}/media/preview/{*path}",
            get(handlers::media_preview),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server with the given application state.
    pub fn with_state(
        config: ServerConfig,
        state: AppState,
    ) -> std::result::Result<Self, ServerError> {
        let router = build_router(state);

        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self { router, addr })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until Ctrl-C.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("Starting Slideshow Manager on {}", self.addr);

        let socket = Socket::new(
            Domain::for_address(self.addr),
            Type::STREAM,
            Some(Protocol::TCP),
        )
        .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Lingering TIME_WAIT sockets must not block a restart.
        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        info!("Server stopped");
        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
