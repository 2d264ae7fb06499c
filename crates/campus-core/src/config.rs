//! Configuration management for campus.
//!
//! Loads configuration from ${CAMPUS_HOME}/config.toml with sensible defaults,
//! then applies `CAMPUS_*` environment overrides.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod paths {
    //! Path resolution for campus configuration and data directories.
    //!
    //! CAMPUS_HOME resolution order:
    //! 1. CAMPUS_HOME environment variable (if set)
    //! 2. ~/.config/campus (default)
    //! 3. ./.campus when no home directory can be determined

    use std::path::PathBuf;

    /// Returns the campus home directory.
    pub fn campus_home() -> PathBuf {
        if let Ok(home) = std::env::var("CAMPUS_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".campus"),
            |h| h.join(".config").join("campus"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        campus_home().join("config.toml")
    }

    /// Returns the path to the cached login credentials.
    pub fn credentials_path() -> PathBuf {
        campus_home().join("credentials.json")
    }

    /// Returns the directory holding log files.
    pub fn logs_dir() -> PathBuf {
        campus_home().join("logs")
    }
}

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Identity provider settings (Keycloak-compatible OIDC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub server_url: String,
    pub realm: String,
    pub client_id: String,
    /// Loopback port for the authorization callback (0 = random high port).
    pub redirect_port: u16,
    pub scopes: String,
    pub open_browser: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_logout_redirect_uri: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            realm: "elearning-realm".to_string(),
            client_id: "campus-cli".to_string(),
            redirect_port: 8765,
            scopes: "openid profile email".to_string(),
            open_browser: true,
            post_logout_redirect_uri: None,
        }
    }
}

impl IdentityConfig {
    /// Issuer URL of the realm (`{server}/realms/{realm}`).
    pub fn issuer(&self) -> String {
        format!(
            "{}/realms/{}",
            self.server_url.trim_end_matches('/'),
            self.realm
        )
    }
}

/// Course backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081/api".to_string(),
            timeout_secs: 15,
            max_retries: 2,
            retry_backoff_ms: 300,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Token refresh timer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    pub min_validity_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            min_validity_secs: 60,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        // A zero interval would make tokio's interval panic.
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn min_validity(&self) -> Duration {
        Duration::from_secs(self.min_validity_secs)
    }
}

/// Terminal UI settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub notice_secs: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { notice_secs: 5 }
    }
}

impl UiConfig {
    pub fn notice_duration(&self) -> Duration {
        Duration::from_secs(self.notice_secs)
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub identity: IdentityConfig,
    pub api: ApiConfig,
    pub refresh: RefreshConfig,
    pub ui: UiConfig,
}

impl Config {
    /// Loads configuration from the default config path and applies
    /// environment overrides.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&paths::config_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Applies `CAMPUS_*` overrides using the given variable lookup.
    pub fn apply_env_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("CAMPUS_IDENTITY_URL") {
            self.identity.server_url = url;
        }
        if let Some(realm) = non_empty("CAMPUS_REALM") {
            self.identity.realm = realm;
        }
        if let Some(client_id) = non_empty("CAMPUS_CLIENT_ID") {
            self.identity.client_id = client_id;
        }
        if let Some(url) = non_empty("CAMPUS_API_URL") {
            self.api.base_url = url;
        }
        if var("CAMPUS_NO_BROWSER").is_some() {
            self.identity.open_browser = false;
        }
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Generates a fresh config TOML from Rust defaults.
    ///
    /// Uses the embedded template for structure/comments and merges
    /// generated values from `Config::default()` into it.
    ///
    /// # Errors
    /// Returns an error if serialization or template parsing fails.
    pub fn generate() -> Result<String> {
        use toml_edit::DocumentMut;

        let generated_toml = toml::to_string(&Config::default())
            .context("Failed to serialize default config to TOML")?;

        let mut doc: DocumentMut = default_config_template()
            .parse()
            .context("Failed to parse default config template")?;
        let generated_doc: DocumentMut = generated_toml
            .parse()
            .context("Failed to parse generated config")?;

        merge_items(doc.as_table_mut(), generated_doc.as_table());

        Ok(doc.to_string())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

/// Recursively merges items from source table into target table.
/// Values are overwritten, comments in the target are kept.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source.iter() {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(src_arr) => {
                target[key] = Item::ArrayOfTables(src_arr.clone());
            }
            Item::None => {}
        }
    }
}
