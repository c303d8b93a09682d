//! CLI configuration
//!
//! Read from an optional TOML file, then overridden by environment variables
//! and finally by command-line flags.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use bacnet_rw::datatype::GENERIC;
use bacnet_rw::{AtomicKind, Datatype, GatewayConfig, ObjectType, PropertyIdentifier, StandardRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Invalid vendor property {property} on {object_type}: {reason}")]
    InvalidVendorProperty {
        object_type: String,
        property: u32,
        reason: String,
    },
}

/// bacrw.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Vendor used to resolve vendor-specific properties
    #[serde(default)]
    pub vendor_id: u16,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Filter used when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default = "default_vendor_properties")]
    pub vendor_properties: Vec<VendorProperty>,
}

/// A vendor-specific property and its atomic datatype
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorProperty {
    pub vendor_id: u16,
    pub object_type: String,
    pub property: u32,
    /// `Boolean`, `Unsigned`, `Real`, `CharacterString`, ...
    pub datatype: String,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_log_filter() -> String {
    "bacrw=info,bacnet_rw=info".to_string()
}

fn default_vendor_properties() -> Vec<VendorProperty> {
    vec![VendorProperty {
        vendor_id: 5,
        object_type: "device".to_string(),
        property: 3653,
        datatype: "Boolean".to_string(),
    }]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vendor_id: 0,
            timeout_ms: default_timeout_ms(),
            log_filter: default_log_filter(),
            vendor_properties: default_vendor_properties(),
        }
    }
}

fn atomic_kind(name: &str) -> Option<AtomicKind> {
    const KINDS: [AtomicKind; 12] = [
        AtomicKind::Null,
        AtomicKind::Boolean,
        AtomicKind::Unsigned,
        AtomicKind::Integer,
        AtomicKind::Real,
        AtomicKind::Double,
        AtomicKind::OctetString,
        AtomicKind::CharacterString,
        AtomicKind::BitString,
        AtomicKind::Date,
        AtomicKind::Time,
        AtomicKind::ObjectIdentifier,
    ];

    if name == "Enumerated" {
        return Some(AtomicKind::Enumerated(&GENERIC));
    }
    KINDS.into_iter().find(|kind| kind.name() == name)
}

impl Config {
    /// Load `path` if given, then apply environment overrides
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                debug!("Loading config from: {}", path.display());
                let content = fs::read_to_string(path).await?;
                toml::from_str(&content)?
            }
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Reads:
    /// - `BACRW_VENDOR_ID`
    /// - `BACRW_TIMEOUT_MS`
    fn apply_env(&mut self) {
        if let Some(vendor_id) = std::env::var("BACRW_VENDOR_ID")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.vendor_id = vendor_id;
        }
        if let Some(timeout_ms) = std::env::var("BACRW_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.timeout_ms = timeout_ms;
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig::default().with_timeout(Duration::from_millis(self.timeout_ms))
    }

    /// Standard registry plus the configured vendor properties
    pub fn registry(&self) -> Result<StandardRegistry, ConfigError> {
        let registry = StandardRegistry::new();
        for entry in &self.vendor_properties {
            let invalid = |reason: &str| ConfigError::InvalidVendorProperty {
                object_type: entry.object_type.clone(),
                property: entry.property,
                reason: reason.to_string(),
            };

            let object_type = ObjectType::from_name(&entry.object_type)
                .ok_or_else(|| invalid("unknown object type"))?;
            let kind = atomic_kind(&entry.datatype).ok_or_else(|| invalid("unknown datatype"))?;

            registry.register_vendor_property(
                entry.vendor_id,
                object_type,
                PropertyIdentifier::from_code(entry.property),
                Datatype::Atomic(kind),
            );
        }
        Ok(registry)
    }
}
