//! Configuration Management
//!
//! Named connection profiles on disk.
//!
//! # Configuration Locations
//! - Local: `.tablereader/config.json` (team-shareable, per-project)
//! - Global: `~/.config/tablereader/connections.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit connection parameters (highest priority, handled by the CLI)
//! 2. Local config file
//! 3. Global config file
//!
//! Both files share one format:
//! ```json
//! {
//!   "connections": {
//!     "dev": { "engine": "postgres", "host": "localhost", "port": 5432,
//!              "user": "app", "password_env": "DEV_DB_PASSWORD", "encrypt": false }
//!   },
//!   "default": "dev"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::{ConnectionConfig, ConnectionKind, DatabaseType};
use crate::error::{ReaderError, Result};

/// Contents of one profile file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileFile {
    /// Named connections
    #[serde(default)]
    pub connections: BTreeMap<String, StoredConnection>,

    /// Name of the default connection (must exist in `connections`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Stored connection configuration
///
/// Same shape as `ConnectionConfig`, plus an optional environment variable
/// holding the password so it need not be written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConnection {
    #[serde(flatten)]
    pub config: ConnectionConfig,

    /// Environment variable name for password (if not storing password directly)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoredConnection {
    /// Resolve environment variables into a usable `ConnectionConfig`
    pub fn resolve(&self) -> Result<ConnectionConfig> {
        let mut config = self.config.clone();

        if let Some(env_var) = &self.password_env {
            let password = std::env::var(env_var).map_err(|_| {
                ReaderError::config_error(format!(
                    "Environment variable {env_var} not found for password"
                ))
            })?;
            config.password = Some(password);
        }

        Ok(config)
    }
}

/// Password-free view of a saved profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub engine: DatabaseType,
    pub kind: ConnectionKind,
    pub target: String,
    pub is_default: bool,
}

impl ProfileFile {
    /// Look up a profile by name, or the default profile when `name` is None
    pub fn resolve(&self, name: Option<&str>) -> Result<ConnectionConfig> {
        let available = || self.connections.keys().cloned().collect::<Vec<_>>().join(", ");

        let conn_name = match name {
            Some(n) => n,
            None => self.default.as_deref().ok_or_else(|| {
                ReaderError::config_error(format!(
                    "No default connection set. Available connections: [{}]. \
                     Specify one with --name or set a default in the config.",
                    available()
                ))
            })?,
        };

        let stored = self.connections.get(conn_name).ok_or_else(|| {
            ReaderError::config_error(format!(
                "Connection '{conn_name}' not found. Available connections: [{}]",
                available()
            ))
        })?;

        stored.resolve()
    }

    /// Overlay `local` on `self`: local profiles replace global ones with the
    /// same name, and a local default wins
    #[must_use]
    pub fn merged_with(mut self, local: ProfileFile) -> ProfileFile {
        self.connections.extend(local.connections);
        if local.default.is_some() {
            self.default = local.default;
        }
        self
    }

    /// Add or replace a profile; the first profile becomes the default
    pub fn insert(&mut self, name: String, stored: StoredConnection) {
        if self.connections.is_empty() {
            self.default = Some(name.clone());
        }
        self.connections.insert(name, stored);
    }

    /// Password-free summaries in name order
    #[must_use]
    pub fn summaries(&self) -> Vec<ProfileSummary> {
        self.connections
            .iter()
            .map(|(name, stored)| ProfileSummary {
                name: name.clone(),
                engine: stored.config.engine,
                kind: stored.config.connection_type,
                target: stored.config.display_target(),
                is_default: self.default.as_deref() == Some(name.as_str()),
            })
            .collect()
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.tablereader/config.json` (team-shareable)
    Local,
    /// Global config: `~/.config/tablereader/connections.json` (per-user)
    Global,
}

impl ConfigLocation {
    pub fn path(self) -> Result<PathBuf> {
        match self {
            Self::Local => local_config_path(),
            Self::Global => global_config_path(),
        }
    }
}

/// Get path to local config file (`.tablereader/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        ReaderError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".tablereader").join("config.json"))
}

/// Get path to global config file (`~/.config/tablereader/connections.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ReaderError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("tablereader").join("connections.json"))
}

/// Load a profile file; a missing file is an empty one
pub fn load_profiles(path: &Path) -> Result<ProfileFile> {
    if !path.exists() {
        return Ok(ProfileFile::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| ReaderError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents).map_err(|e| {
        ReaderError::config_error(format!("Invalid config file {}: {e}", path.display()))
    })
}

/// Write a profile file, creating its directory if needed
pub fn save_profiles(path: &Path, profiles: &ProfileFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            ReaderError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(profiles)
        .map_err(|e| ReaderError::config_error(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| ReaderError::config_error(format!("Could not write config file: {e}")))
}

/// Load the merged view of the global and local files
pub fn load_with_precedence() -> Result<ProfileFile> {
    let global = load_profiles(&global_config_path()?)?;
    let local = load_profiles(&local_config_path()?)?;
    Ok(global.merged_with(local))
}

/// Resolve a profile by name (or the default) from the merged view
pub fn resolve_connection(name: Option<&str>) -> Result<ConnectionConfig> {
    let profiles = load_with_precedence()?;
    if profiles.connections.is_empty() {
        return Err(ReaderError::config_error(
            "No saved connections. Run 'tablereader connect' to create one.",
        ));
    }
    profiles.resolve(name)
}

/// Save a connection profile to `path`
///
/// With `password_env` set, the password is dropped from the stored profile.
pub fn save_connection_at(
    path: &Path,
    name: &str,
    mut config: ConnectionConfig,
    password_env: Option<String>,
) -> Result<()> {
    if password_env.is_some() {
        config.password = None;
    }

    let mut profiles = load_profiles(path)?;
    profiles.insert(name.to_string(), StoredConnection { config, password_env });
    save_profiles(path, &profiles)?;

    tracing::info!(name, path = %path.display(), "saved connection profile");
    Ok(())
}

/// Save a connection profile to the local or global file
pub fn save_connection(
    name: &str,
    config: ConnectionConfig,
    password_env: Option<String>,
    location: ConfigLocation,
) -> Result<PathBuf> {
    let path = location.path()?;
    save_connection_at(&path, name, config, password_env)?;
    Ok(path)
}

/// List every saved profile from the merged view
pub fn list_connections() -> Result<Vec<ProfileSummary>> {
    let profiles = load_with_precedence()?;

    for (name, stored) in &profiles.connections {
        if let Err(e) = stored.resolve() {
            tracing::warn!(name = %name, "profile will not resolve: {e}");
        }
    }

    Ok(profiles.summaries())
}
