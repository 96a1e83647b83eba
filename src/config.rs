// Filegate Configuration Module
// API endpoint and sign-in settings, from file, environment and flags

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::OidcConfig;
use crate::error::{ClientError, Result};

/// Cognito user pool + hosted UI settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CognitoSettings {
    pub region: String,
    pub user_pool_id: String,
    pub client_id: String,
    /// Hosted UI domain prefix (Cognito > App integration > Domain)
    pub domain_prefix: String,
    /// Where the sign-in redirect lands, without trailing slash
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
}

fn default_app_base_url() -> String {
    "http://localhost:5173".to_string()
}

impl Default for CognitoSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            user_pool_id: String::new(),
            client_id: String::new(),
            domain_prefix: String::new(),
            app_base_url: default_app_base_url(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the file API (API Gateway invoke URL)
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub cognito: CognitoSettings,
    /// Full OIDC configuration; takes precedence over `cognito` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc: Option<OidcConfig>,
}

impl AppConfig {
    /// OIDC configuration to sign in with
    pub fn oidc_config(&self) -> OidcConfig {
        match self.oidc {
            Some(ref oidc) => oidc.clone(),
            None => OidcConfig::cognito(
                &self.cognito.region,
                &self.cognito.user_pool_id,
                &self.cognito.client_id,
                &self.cognito.domain_prefix,
                &self.cognito.app_base_url,
            ),
        }
    }

    /// Apply `FILEGATE_*` overrides from `lookup` (usually `std::env::var`)
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("FILEGATE_API_URL") {
            self.api_url = v;
        }
        if let Some(v) = get("FILEGATE_COGNITO_REGION") {
            self.cognito.region = v;
        }
        if let Some(v) = get("FILEGATE_USER_POOL_ID") {
            self.cognito.user_pool_id = v;
        }
        if let Some(v) = get("FILEGATE_CLIENT_ID") {
            self.cognito.client_id = v;
        }
        if let Some(v) = get("FILEGATE_DOMAIN_PREFIX") {
            self.cognito.domain_prefix = v;
        }
        if let Some(v) = get("FILEGATE_APP_BASE_URL") {
            self.cognito.app_base_url = v;
        }
    }

    /// Check everything needed to sign in and call the API
    pub fn validate(&self) -> Result<()> {
        let api = self.api_url.trim();
        if api.is_empty() {
            return Err(ClientError::Config(
                "API URL is not set (config api_url, FILEGATE_API_URL or --api-url)".to_string(),
            ));
        }
        if !(api.starts_with("http://") || api.starts_with("https://")) {
            return Err(ClientError::Config(format!("API URL must be http(s): {}", api)));
        }

        if self.oidc.is_none() {
            for (name, value) in [
                ("cognito.region", &self.cognito.region),
                ("cognito.user_pool_id", &self.cognito.user_pool_id),
                ("cognito.client_id", &self.cognito.client_id),
                ("cognito.domain_prefix", &self.cognito.domain_prefix),
            ] {
                if value.trim().is_empty() {
                    return Err(ClientError::Config(format!("{} is not set", name)));
                }
            }
        }
        self.oidc_config().validate()
    }
}

/// Default location of the config file
pub fn default_config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
    config_dir.join("filegate").join("config.json")
}

/// Read a config file
pub fn load_config_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| ClientError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| ClientError::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load the configuration: explicit file (must exist), else the default
/// file when present, else defaults. Environment overrides are applied last.
pub fn load_app_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let mut config = match explicit {
        Some(path) => load_config_file(path)?,
        None => {
            let path = default_config_path();
            if path.exists() {
                load_config_file(&path)?
            } else {
                tracing::debug!("No config file at {:?}, using defaults", path);
                AppConfig::default()
            }
        }
    };
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

/// Write a config file, creating its directory
pub fn save_app_config(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ClientError::Config(format!("Failed to create config directory: {}", e)))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("Failed to serialize config: {}", e)))?;
    fs::write(path, content).map_err(|e| ClientError::Config(format!("Failed to write config: {}", e)))?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}
