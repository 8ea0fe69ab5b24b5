//! Slideshow Manager Core - device registry, host guard and error translation.
//!
//! This crate holds the pieces of the session bridge that do not touch the
//! network:
//!
//! - [`registry`]: immutable id -> device lookup built once at startup
//! - [`host_guard`]: allow-list check run before every upstream call
//! - [`translate`]: upstream status -> user-facing message
//! - [`audit`]: write-only audit sink
//! - [`config`]: shared settings and cookie names

pub mod audit;
pub mod config;
pub mod host_guard;
pub mod registry;
pub mod translate;

pub use audit::{AuditEntry, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use config::{ConfigError, ManagerConfig};
pub use host_guard::{HostAllowList, HostGuardError};
pub use registry::{DeviceDefinition, DeviceRegistry, RegistryError};
pub use translate::{translate, ErrorCategory};
