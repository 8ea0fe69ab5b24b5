//! Slideshow Manager Proxy - session-bridging HTTP client for players.
//!
//! The proxy forwards a browser's request to one configured player and
//! carries the player's session cookies back inside the manager's own
//! cookie:
//!
//! - [`session`]: cookie jar extraction, packing and replay
//! - [`proxy`]: [`DeviceProxy::forward`] with deadline and redirect policy
//! - [`contracts`]: typed request and response bodies

pub mod contracts;
pub mod error;
pub mod proxy;
pub mod session;

pub use error::{ProxyError, Result};
pub use proxy::{
    BufferedResponse, CallerContext, DeviceProxy, ForwardPhase, Passthrough, Proxied,
    ProxyRequest, UpstreamResponse, PROXY_USER_AGENT, UPSTREAM_ACCEPT,
};
pub use session::{CookieJar, SessionCookie};
