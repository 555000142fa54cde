//! External library types: the curated registry and per-game installs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// An entry in the curated registry of loadable libraries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Registry row identifier.
    pub id: Uuid,
    /// Short name used for install/uninstall.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Upstream package name.
    pub package_name: String,
    /// Pinned version.
    pub version: String,
    /// CDN URL the runtime loads the library from.
    pub cdn_url: String,
    /// Global binding the library installs on load.
    pub global_name: String,
    /// Optional description.
    pub description: Option<String>,
}

/// A library installed into a game, as listed in the bundle manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledExternal {
    /// Short name.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Upstream package name.
    pub package_name: String,
    /// Pinned version.
    pub version: String,
    /// CDN URL.
    pub cdn_url: String,
    /// Global binding name.
    pub global_name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Load mechanism: `"script"` (default) or `"module"`.
    pub load_type: String,
    /// Import map for module-loaded libraries.
    pub module_imports: Option<BTreeMap<String, String>>,
    /// Install time.
    pub installed_at: chrono::DateTime<chrono::Utc>,
}

/// Full detail for an installed external, including its API surface docs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalDetail {
    /// The installed external.
    #[serde(flatten)]
    pub external: InstalledExternal,
    /// API surface documentation for the agent.
    pub api_surface: String,
}
