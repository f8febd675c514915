//! Configuration file handling
//!
//! A single TOML file describes the tables, the store to talk to and the
//! submit defaults:
//!
//! ```toml
//! root = "users"
//!
//! [submit]
//! destructive = false
//! order = "topological"
//!
//! [store]
//! kind = "postgrest"
//! url = "http://localhost:3000"
//! api_key_env = "FORMSYNC_API_KEY"
//!
//! [[tables]]
//! name = "users"
//! many_to_one = { org_id = "orgs" }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::graph::{ScheduleOrder, SubmitOptions};
use crate::schema::{Schema, TableDescriptor};
use crate::store::{Backend, MemoryStore, PostgrestStore};

const CONFIG_DIR: &str = "formsync";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_API_KEY_ENV: &str = "FORMSYNC_API_KEY";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Table the form edits, unless given on the command line
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub submit: SubmitConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tables: Vec<TableDescriptor>,
}

/// Defaults for submit cycles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitConfig {
    /// Run deletes for every table, not only tables marked destructive
    #[serde(default)]
    pub destructive: bool,
    #[serde(default, alias = "ordering")]
    pub order: ScheduleOrder,
    /// Upper bound for a whole cycle
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Postgrest,
}

/// Which store the capability functions talk to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            url: None,
            api_key_env: default_api_key_env(),
        }
    }
}

impl StoreConfig {
    /// API key from the configured environment variable, if set and non-empty
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Create the configured store
    pub fn connect(&self) -> Result<Backend> {
        match self.kind {
            StoreKind::Memory => Ok(Backend::Memory(MemoryStore::new())),
            StoreKind::Postgrest => {
                let url = self
                    .url
                    .as_deref()
                    .context("store.url is required for the postgrest store")?;
                let api_key = self.api_key();
                if api_key.is_none() {
                    debug!("No API key in ${}, sending unauthenticated requests", self.api_key_env);
                }
                Ok(Backend::Postgrest(PostgrestStore::new(url, api_key)?))
            }
        }
    }
}

impl Config {
    /// Default location: `<config dir>/formsync/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR)
            .join(CONFIG_FILE)
    }

    /// Load from an explicit path, or from the default location.
    ///
    /// An explicit path must exist; a missing default file yields the
    /// default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        if !path.exists() {
            if explicit {
                anyhow::bail!("Config file does not exist: {}", path.display());
            }
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!("Loaded config from {} ({} tables)", path.display(), config.tables.len());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn schema(&self) -> Result<Schema> {
        Schema::new(self.tables.iter().cloned()).context("Invalid table configuration")
    }

    /// Submit options, with command line overrides applied
    pub fn submit_options(&self, destructive: bool, order: Option<ScheduleOrder>) -> SubmitOptions {
        SubmitOptions {
            destructive: destructive || self.submit.destructive,
            order: order.unwrap_or(self.submit.order),
        }
    }

    /// Root table: the override, else the configured one
    pub fn root_table(&self, root: Option<&str>) -> Result<String> {
        root.map(str::to_string)
            .or_else(|| self.root.clone())
            .context("No root table given; pass --root or set `root` in the config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableKind;

    const SAMPLE: &str = r#"
root = "users"

[submit]
destructive = true
order = "greedy"
timeout_secs = 30

[store]
kind = "postgrest"
url = "http://localhost:3000"

[[tables]]
name = "users"
many_to_one = { org_id = "orgs" }

[[tables]]
name = "orgs"

[[tables]]
name = "user_roles"
kind = "join"
many_to_many = { user_id = "users", role_id = "roles" }
destructive = true

[[tables]]
name = "roles"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.root.as_deref(), Some("users"));
        assert!(config.submit.destructive);
        assert_eq!(config.submit.order, ScheduleOrder::Greedy);
        assert_eq!(config.submit.timeout_secs, Some(30));
        assert_eq!(config.store.kind, StoreKind::Postgrest);
        assert_eq!(config.store.api_key_env, "FORMSYNC_API_KEY");
        assert_eq!(config.tables.len(), 4);
        assert_eq!(config.tables[2].kind, TableKind::Join);

        let schema = config.schema().unwrap();
        assert!(schema.get("user_roles").unwrap().destructive);
    }

    #[test]
    fn test_empty_config_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.store.kind, StoreKind::Memory);
        assert_eq!(config.submit.order, ScheduleOrder::Topological);
    }

    #[test]
    fn test_ordering_alias() {
        let config = Config::from_toml("[submit]\nordering = \"greedy\"\n").unwrap();
        assert_eq!(config.submit.order, ScheduleOrder::Greedy);
    }

    #[test]
    fn test_submit_options_overrides() {
        let config = Config::from_toml("[submit]\norder = \"greedy\"\n").unwrap();
        let options = config.submit_options(false, None);
        assert!(!options.destructive);
        assert_eq!(options.order, ScheduleOrder::Greedy);

        let options = config.submit_options(true, Some(ScheduleOrder::Topological));
        assert!(options.destructive);
        assert_eq!(options.order, ScheduleOrder::Topological);
    }

    #[test]
    fn test_root_table() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.root_table(None).unwrap(), "users");
        assert_eq!(config.root_table(Some("orgs")).unwrap(), "orgs");
        assert!(Config::default().root_table(None).is_err());
    }

    #[test]
    fn test_missing_explicit_path_fails() {
        let path = std::env::temp_dir().join("formsync-does-not-exist.toml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("formsync-config-{}.toml", std::process::id()));
        fs::write(&path, SAMPLE).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.tables.len(), 4);
    }

    #[test]
    fn test_postgrest_requires_url() {
        let store = StoreConfig {
            kind: StoreKind::Postgrest,
            ..Default::default()
        };
        assert!(store.connect().is_err());
        assert_eq!(StoreConfig::default().connect().unwrap().label(), "memory");
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let config = Config::from_toml("[[tables]]\nname = \"users\"\n[[tables]]\nname = \"users\"\n").unwrap();
        assert!(config.schema().is_err());
    }
}
