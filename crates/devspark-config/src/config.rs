//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

/// Default Supabase URL (can be overridden at compile time via DEVSPARK_SUPABASE_URL).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("DEVSPARK_SUPABASE_URL") {
    Some(url) => url,
    None => "https://your-project-url.supabase.co",
};

/// Default Supabase anon key (can be overridden at compile time via DEVSPARK_SUPABASE_ANON_KEY).
pub const DEFAULT_SUPABASE_ANON_KEY: &str = match option_env!("DEVSPARK_SUPABASE_ANON_KEY") {
    Some(key) => key,
    None => "public-anon-key",
};

/// Origin the OAuth redirect URIs are derived from. The CLI listens for
/// callbacks on this origin's port.
pub const DEFAULT_SITE_ORIGIN: &str = match option_env!("DEVSPARK_SITE_ORIGIN") {
    Some(origin) => origin,
    None => "http://localhost:9876",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Per-provider override merged into the built-in OAuth provider table.
///
/// Every field is optional; only the fields present replace the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOverride {
    #[serde(default, alias = "clientId", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, alias = "redirectUri", skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, alias = "authUrl", skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(default, alias = "tokenUrl", skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, alias = "responseType", skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Site origin, e.g. `https://devspark.dev`.
    #[serde(default = "default_site_origin")]
    pub site_origin: String,
    /// Base URL of the site's `/api/auth/*` endpoints. Falls back to `site_origin`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// Supabase project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase anon (publishable) key.
    #[serde(default = "default_supabase_anon_key")]
    pub supabase_anon_key: String,
    /// OAuth provider overrides keyed by provider name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub providers: BTreeMap<String, ProviderOverride>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_site_origin() -> String {
    DEFAULT_SITE_ORIGIN.to_string()
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_anon_key() -> String {
    DEFAULT_SUPABASE_ANON_KEY.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            site_origin: default_site_origin(),
            api_base_url: None,
            supabase_url: default_supabase_url(),
            supabase_anon_key: default_supabase_anon_key(),
            providers: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Only the log level can be overridden at runtime.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("DEVSPARK_LOG_LEVEL") {
            if !log_level.trim().is_empty() {
                self.log_level = log_level.trim().to_string();
            }
        }
    }

    /// Check that every configured URL parses.
    pub fn validate(&self) -> CoreResult<()> {
        self.site_origin()?;
        self.api_base_url()?;
        self.supabase_url()?;
        if self.supabase_anon_key.trim().is_empty() {
            return Err(CoreError::Config("supabase_anon_key is empty".to_string()));
        }
        Ok(())
    }

    /// Site origin as a parsed URL.
    pub fn site_origin(&self) -> CoreResult<Url> {
        Url::parse(&self.site_origin).map_err(CoreError::from)
    }

    /// Base URL for the site's auth API.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        let raw = self.api_base_url.as_deref().unwrap_or(&self.site_origin);
        Url::parse(raw).map_err(CoreError::from)
    }

    /// Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }
}
