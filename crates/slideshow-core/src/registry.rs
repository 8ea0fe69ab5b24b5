//! Device registry.
//!
//! Maps stable device ids to the connection info of each slideshow player.
//! The registry is built exactly once at startup and is read-only afterwards;
//! picking up configuration edits requires a restart.
//!
//! ## Loading rules
//!
//! - The configuration is a JSON array of device objects.
//! - Every entry needs a non-empty `id` and an absolute `http(s)` `host`.
//! - Ids must be unique.
//! - Any violation rejects the whole registry. A partially loaded registry is
//!   never returned.
//!
//! ## Usage
//!
//! ```
//! use slideshow_core::registry::DeviceRegistry;
//!
//! let registry = DeviceRegistry::from_json(
//!     r#"[{"id": "lobby", "name": "Lobby", "host": "http://10.0.0.5:8080"}]"#,
//! )
//! .unwrap();
//!
//! assert_eq!(registry.list().len(), 1);
//! assert_eq!(registry.get("lobby").unwrap().name, "Lobby");
//! assert!(registry.get("kitchen").is_err());
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The device configuration could not be parsed or validated.
    #[error("failed to parse device registry: {0}")]
    Configuration(String),

    /// No device with the given id is configured.
    #[error("unknown device {0}")]
    NotFound(String),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Connection info for one remote player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDefinition {
    /// Stable, unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Base URL (scheme, host and optional port).
    pub host: String,
    /// Free-form operator notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl DeviceDefinition {
    /// Creates a device definition.
    pub fn new(id: impl Into<String>, name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            host: host.into(),
            notes: None,
        }
    }

    /// Sets the notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Entry shape as it appears in configuration, before validation.
#[derive(Debug, Deserialize)]
struct RawDevice {
    id: Option<String>,
    name: Option<String>,
    host: Option<String>,
    notes: Option<String>,
}

/// Immutable lookup table of configured devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    /// Devices in configuration order.
    devices: Vec<DeviceDefinition>,
    /// Id to position in `devices`.
    index: HashMap<String, usize>,
}

impl DeviceRegistry {
    /// Creates a registry with no devices.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a registry from already constructed definitions.
    pub fn new(devices: Vec<DeviceDefinition>) -> Result<Self> {
        let mut index = HashMap::with_capacity(devices.len());

        for (position, device) in devices.iter().enumerate() {
            if device.id.trim().is_empty() || device.host.trim().is_empty() {
                return Err(RegistryError::Configuration(format!(
                    "device at position {position} must include id and host"
                )));
            }

            validate_host(&device.id, &device.host)?;

            if index.insert(device.id.clone(), position).is_some() {
                return Err(RegistryError::Configuration(format!(
                    "duplicate device id {}",
                    device.id
                )));
            }
        }

        Ok(Self { devices, index })
    }

    /// Parses a registry from its JSON representation.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| RegistryError::Configuration(e.to_string()))?;

        if !value.is_array() {
            return Err(RegistryError::Configuration(
                "registry must be an array".to_string(),
            ));
        }

        let raw_devices: Vec<RawDevice> = serde_json::from_value(value)
            .map_err(|e| RegistryError::Configuration(e.to_string()))?;

        let devices = raw_devices
            .into_iter()
            .enumerate()
            .map(|(position, raw)| {
                let (Some(id), Some(host)) = (raw.id, raw.host) else {
                    return Err(RegistryError::Configuration(format!(
                        "device at position {position} must include id and host"
                    )));
                };
                let name = raw
                    .name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| id.clone());

                Ok(DeviceDefinition {
                    id,
                    name,
                    host,
                    notes: raw.notes.filter(|notes| !notes.is_empty()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(devices)
    }

    /// Loads the registry from an environment variable holding a JSON array.
    ///
    /// An unset or blank variable yields an empty registry.
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(raw) if !raw.trim().is_empty() => Self::from_json(&raw),
            Ok(_) | Err(std::env::VarError::NotPresent) => Ok(Self::empty()),
            Err(std::env::VarError::NotUnicode(_)) => Err(RegistryError::Configuration(format!(
                "{var} is not valid unicode"
            ))),
        }
    }

    /// Reads and parses a registry file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;

        Self::from_json(&raw)
    }

    /// Returns all devices in configuration order.
    pub fn list(&self) -> &[DeviceDefinition] {
        &self.devices
    }

    /// Looks up a device by id.
    pub fn get(&self, id: &str) -> Result<&DeviceDefinition> {
        self.index
            .get(id)
            .map(|&position| &self.devices[position])
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Returns true if a device with this id is configured.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Picks the device read-only views should show by default.
    ///
    /// A known `preferred` id wins; otherwise the first configured device.
    pub fn default_device(&self, preferred: Option<&str>) -> Option<&DeviceDefinition> {
        preferred
            .and_then(|id| self.get(id).ok())
            .or_else(|| self.devices.first())
    }

    /// Number of configured devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if no devices are configured.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

fn validate_host(id: &str, host: &str) -> Result<()> {
    let url = Url::parse(host).map_err(|e| {
        RegistryError::Configuration(format!("device {id} has invalid host {host}: {e}"))
    })?;

    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(RegistryError::Configuration(format!(
            "device {id} host must be an absolute http(s) URL, got {host}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TWO_DEVICES: &str = r#"[
        {"id": "lobby", "name": "Lobby", "host": "http://10.0.0.5:8080"},
        {"id": "cafe", "name": "Cafe", "host": "https://cafe.local", "notes": "second floor"}
    ]"#;

    #[test]
    fn get_finds_every_listed_device() {
        let registry = DeviceRegistry::from_json(TWO_DEVICES).unwrap();

        assert_eq!(registry.len(), 2);
        for device in registry.list() {
            assert_eq!(registry.get(&device.id).unwrap().id, device.id);
        }
    }

    #[test]
    fn list_keeps_configuration_order() {
        let registry = DeviceRegistry::from_json(TWO_DEVICES).unwrap();
        let ids: Vec<_> = registry.list().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["lobby", "cafe"]);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = DeviceRegistry::from_json(TWO_DEVICES).unwrap();

        match registry.get("attic") {
            Err(RegistryError::NotFound(id)) => assert_eq!(id, "attic"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn empty_array_is_valid() {
        let registry = DeviceRegistry::from_json("[]").unwrap();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
        assert!(registry.default_device(None).is_none());
    }

    #[test]
    fn non_array_is_rejected() {
        let err = DeviceRegistry::from_json(r#"{"id": "lobby"}"#).unwrap_err();
        assert!(matches!(err, RegistryError::Configuration(_)));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = DeviceRegistry::from_json("[{").unwrap_err();
        assert!(matches!(err, RegistryError::Configuration(_)));
    }

    #[test]
    fn one_bad_entry_rejects_the_whole_registry() {
        let raw = r#"[
            {"id": "lobby", "host": "http://10.0.0.5"},
            {"id": "cafe"}
        ]"#;
        let err = DeviceRegistry::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("must include id and host"));
    }

    #[test]
    fn empty_id_is_rejected() {
        let raw = r#"[{"id": "", "host": "http://10.0.0.5"}]"#;
        assert!(DeviceRegistry::from_json(raw).is_err());
    }

    #[test]
    fn relative_host_is_rejected() {
        let raw = r#"[{"id": "lobby", "host": "player.local"}]"#;
        assert!(DeviceRegistry::from_json(raw).is_err());

        let raw = r#"[{"id": "lobby", "host": "ftp://player.local"}]"#;
        assert!(DeviceRegistry::from_json(raw).is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let raw = r#"[
            {"id": "lobby", "host": "http://a.local"},
            {"id": "lobby", "host": "http://b.local"}
        ]"#;
        let err = DeviceRegistry::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn missing_name_falls_back_to_id() {
        let registry =
            DeviceRegistry::from_json(r#"[{"id": "lobby", "host": "http://a.local"}]"#).unwrap();
        assert_eq!(registry.get("lobby").unwrap().name, "lobby");
    }

    #[test]
    fn notes_are_kept() {
        let registry = DeviceRegistry::from_json(TWO_DEVICES).unwrap();
        assert_eq!(
            registry.get("cafe").unwrap().notes.as_deref(),
            Some("second floor")
        );
        assert!(registry.get("lobby").unwrap().notes.is_none());
    }

    #[test]
    fn default_device_prefers_known_marker() {
        let registry = DeviceRegistry::from_json(TWO_DEVICES).unwrap();

        assert_eq!(registry.default_device(Some("cafe")).unwrap().id, "cafe");
        assert_eq!(registry.default_device(Some("gone")).unwrap().id, "lobby");
        assert_eq!(registry.default_device(None).unwrap().id, "lobby");
    }

    #[test]
    fn new_validates_definitions() {
        let devices = vec![
            DeviceDefinition::new("lobby", "Lobby", "http://a.local").with_notes("entrance"),
            DeviceDefinition::new("cafe", "Cafe", "not a url"),
        ];
        assert!(DeviceRegistry::new(devices).is_err());
    }

    #[test]
    fn from_file_reads_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TWO_DEVICES.as_bytes()).unwrap();

        let registry = DeviceRegistry::from_file(file.path()).unwrap();
        assert!(registry.contains("lobby"));
        assert!(registry.contains("cafe"));
    }

    #[test]
    fn from_file_missing_is_configuration_error() {
        let err = DeviceRegistry::from_file("/nonexistent/devices.json").unwrap_err();
        assert!(matches!(err, RegistryError::Configuration(_)));
    }

    #[test]
    fn from_env_unset_is_empty() {
        let registry = DeviceRegistry::from_env("SLIDESHOW_TEST_REGISTRY_UNSET").unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn from_env_parses_value() {
        std::env::set_var("SLIDESHOW_TEST_REGISTRY_SET", TWO_DEVICES);
        let registry = DeviceRegistry::from_env("SLIDESHOW_TEST_REGISTRY_SET").unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn definition_serializes_without_empty_notes() {
        let device = DeviceDefinition::new("lobby", "Lobby", "http://a.local");
        let json = serde_json::to_value(&device).unwrap();
        assert!(json.get("notes").is_none());
        assert_eq!(json["host"], "http://a.local");
    }
}
