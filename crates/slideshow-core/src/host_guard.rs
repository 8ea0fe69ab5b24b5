//! Host allow-list.
//!
//! Restricts which hostnames the proxy may reach. An empty allow-list
//! disables the restriction; otherwise the hostname of a device's base URL
//! must match one entry exactly (no wildcards, port ignored). Entries are
//! lowercased because URL parsing lowercases http(s) hostnames.

use std::collections::BTreeSet;

use thiserror::Error;
use url::Url;

/// Host guard errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostGuardError {
    /// The hostname is not on the allow-list.
    #[error("host {0} is not permitted by the allow-list")]
    HostNotAllowed(String),

    /// The device host could not be parsed into a URL with a hostname.
    #[error("invalid device host {0}")]
    InvalidHost(String),
}

/// Process-wide set of reachable hostnames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAllowList {
    hosts: BTreeSet<String>,
}

impl HostAllowList {
    /// An allow-list that permits every host.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Creates an allow-list from hostnames. Entries are trimmed, lowercased
    /// and blanks dropped.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|host| host.as_ref().trim().to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .collect();

        Self { hosts }
    }

    /// Parses a comma-separated list such as `player1.local, player2.local`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// Returns true when at least one host is configured.
    pub fn is_restricted(&self) -> bool {
        !self.hosts.is_empty()
    }

    /// Configured hostnames, sorted.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    /// Checks a device base URL against the allow-list.
    pub fn check(&self, host_url: &str) -> Result<(), HostGuardError> {
        if !self.is_restricted() {
            return Ok(());
        }

        let url =
            Url::parse(host_url).map_err(|_| HostGuardError::InvalidHost(host_url.to_string()))?;
        let hostname = url
            .host_str()
            .ok_or_else(|| HostGuardError::InvalidHost(host_url.to_string()))?;

        if self.hosts.contains(hostname) {
            Ok(())
        } else {
            Err(HostGuardError::HostNotAllowed(hostname.to_string()))
        }
    }
}
