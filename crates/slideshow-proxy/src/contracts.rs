//! Typed payloads exchanged with a player.
//!
//! Read models are lenient: every field is optional or defaulted and unknown
//! fields are kept in `extra`, so a newer player does not break the manager.
//! Write models are strict and validated before they are forwarded.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A write payload failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ContractError {
    pub field: &'static str,
    pub reason: String,
}

impl ContractError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// `GET /api/state`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceState {
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback: Option<PlaybackStatus>,
    pub audit_log: Vec<DeviceAuditRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What the player is currently showing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One line of the player's own audit log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceAuditRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `GET /api/config`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback: Option<PlaybackConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Playback section of the device config as reported by the player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_fit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_rotation: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splitscreen_sources: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of `GET /api/sources`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSource {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub auto_scan: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Generic acknowledgement for write calls. Defaults to `{}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionAck(pub Value);

impl Default for ActionAck {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

// ---------------------------------------------------------------------------
// Write models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFit {
    Contain,
    Stretch,
    Original,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionType {
    Cut,
    Fade,
    Slide,
    Zoom,
}

/// `PUT /api/playback`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    pub image_duration: u32,
    pub image_fit: ImageFit,
    pub image_rotation: u16,
    pub transition_type: TransitionType,
    pub transition_duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splitscreen_sources: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_player_args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_viewer_args: Option<Vec<String>>,
}

impl PlaybackSettings {
    pub const MAX_SPLITSCREEN_SOURCES: usize = 4;

    pub fn validate(&self) -> Result<(), ContractError> {
        if !(1..=3600).contains(&self.image_duration) {
            return Err(ContractError::new(
                "image_duration",
                "must be between 1 and 3600 seconds",
            ));
        }
        if self.image_rotation > 359 {
            return Err(ContractError::new(
                "image_rotation",
                "must be between 0 and 359 degrees",
            ));
        }
        if !(0.2..=10.0).contains(&self.transition_duration) {
            return Err(ContractError::new(
                "transition_duration",
                "must be between 0.2 and 10 seconds",
            ));
        }
        if self
            .splitscreen_sources
            .as_ref()
            .is_some_and(|sources| sources.len() > Self::MAX_SPLITSCREEN_SOURCES)
        {
            return Err(ContractError::new(
                "splitscreen_sources",
                format!("at most {} sources", Self::MAX_SPLITSCREEN_SOURCES),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Filesystem,
    Network,
}

/// `POST /api/sources`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePayload {
    pub name: String,
    pub kind: SourceKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub auto_scan: bool,
}

impl SourcePayload {
    pub fn validate(&self) -> Result<(), ContractError> {
        require_non_empty("name", Some(&self.name))?;
        require_non_empty("path", Some(&self.path))
    }
}

/// `PUT /api/sources/{name}`: only the fields present are changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<SourceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_scan: Option<bool>,
}

impl SourceUpdate {
    pub fn validate(&self) -> Result<(), ContractError> {
        require_non_empty("name", self.name.as_ref())?;
        require_non_empty("path", self.path.as_ref())
    }
}

fn require_non_empty(field: &'static str, value: Option<&String>) -> Result<(), ContractError> {
    match value {
        Some(value) if value.trim().is_empty() => Err(ContractError::new(field, "must not be empty")),
        _ => Ok(()),
    }
}

/// `POST /api/player/info-screen`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoScreenToggle {
    pub enabled: bool,
}

/// Player commands accepted on `POST /api/player/{action}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    Start,
    Stop,
    Reload,
}

impl PlayerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reload => "reload",
        }
    }
}

impl FromStr for PlayerAction {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "reload" => Ok(Self::Reload),
            other => Err(ContractError::new(
                "action",
                format!("unsupported player action {other:?}"),
            )),
        }
    }
}

impl fmt::Display for PlayerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
