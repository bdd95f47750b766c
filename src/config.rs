//! Configuration model, discovery and loading.
//!
//! Settings come from `config.toml` in the app config directory, overridable
//! per key with `DRAFTSMITH__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "draftsmith";
pub const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "DRAFTSMITH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory served at `/` for the bundled client. Supports `~`.
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            static_dir: "public".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    /// Whole-request cap in seconds, streaming included.
    pub timeout_secs: u64,
    /// Falls back to `ANTHROPIC_API_KEY` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 8192,
            timeout_secs: 300,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Language tag of the fenced block the model is asked to produce.
    pub fence_language: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            fence_language: "html".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
}

impl AppPaths {
    /// `$XDG_CONFIG_HOME/draftsmith`, or the platform config dir, or
    /// `~/.config/draftsmith` as a last resort.
    pub fn discover() -> Self {
        let base = std::env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::config_dir)
            .unwrap_or_else(|| PathBuf::from(shellexpand::tilde("~/.config").as_ref()));
        Self {
            config_dir: base.join(APP_NAME),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }
}

/// Load the config, writing a commented default file first if none exists.
pub fn load_or_init(paths: &AppPaths) -> Result<AppConfig> {
    let config_path = paths.config_file();
    if !config_path.exists() {
        write_default_config(&config_path).with_context(|| {
            format!("failed to write default config to {}", config_path.display())
        })?;
    }
    load_from(&config_path)
}

pub fn load_from(path: &Path) -> Result<AppConfig> {
    let settings = Config::builder()
        .add_source(File::from(path.to_path_buf()).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .context("failed to read configuration")?;
    settings
        .try_deserialize()
        .context("configuration is invalid")
}

pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let rendered = toml::to_string_pretty(&AppConfig::default())?;
    let contents = format!(
        "# {APP_NAME} configuration\n\
         # Override any value with {ENV_PREFIX}__SECTION__KEY environment variables,\n\
         # e.g. {ENV_PREFIX}__SERVER__PORT=9090.\n\n{rendered}"
    );
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Expand `~` in user-supplied paths.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.backend.base_url, "https://api.anthropic.com");
        assert!(config.backend.api_key.is_none());
        assert_eq!(config.generation.fence_language, "html");
    }

    #[test]
    fn written_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_default_config(&path).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 9090\n\n[backend]\nmodel = \"claude-opus-4-1\"\n")
            .unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded.server.port, 9090);
        assert_eq!(loaded.server.host, "127.0.0.1");
        assert_eq!(loaded.backend.model, "claude-opus-4-1");
        assert_eq!(loaded.backend.max_tokens, 8192);
    }

    #[test]
    fn load_or_init_creates_the_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths {
            config_dir: dir.path().join("draftsmith"),
        };
        assert!(!paths.config_file().exists());

        let loaded = load_or_init(&paths).unwrap();
        assert!(paths.config_file().exists());
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn tilde_paths_expand_to_the_home_directory() {
        let expanded = expand_path("~/apps/public");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert_eq!(expand_path("public"), PathBuf::from("public"));
    }
}
