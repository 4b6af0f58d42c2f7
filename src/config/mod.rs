use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Public base URL of the frontend, used for CORS and reset links.
    #[serde(default = "default_app_url")]
    pub app_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            app_url: default_app_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_app_url() -> String {
    "http://localhost:3000".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret for signing access tokens. Overridden by JWT_ACCESS_TOKEN_SECRET.
    #[serde(default = "default_secret")]
    pub access_token_secret: String,
    /// Secret for signing refresh tokens. Overridden by JWT_REFRESH_TOKEN_SECRET.
    #[serde(default = "default_secret")]
    pub refresh_token_secret: String,
    #[serde(default = "default_access_ttl_minutes")]
    pub access_token_ttl_minutes: i64,
    #[serde(default = "default_refresh_ttl_days")]
    pub refresh_token_ttl_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_secret: default_secret(),
            refresh_token_secret: default_secret(),
            access_token_ttl_minutes: default_access_ttl_minutes(),
            refresh_token_ttl_days: default_refresh_ttl_days(),
        }
    }
}

fn default_secret() -> String {
    // Random per-process secret when none is configured; sessions will not
    // survive a restart in that case.
    uuid::Uuid::new_v4().to_string()
}

fn default_access_ttl_minutes() -> i64 {
    15
}

fn default_refresh_ttl_days() -> i64 {
    7
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// General API budget per window and IP.
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    /// Public submission budget per window and IP.
    #[serde(default = "default_submit_requests")]
    pub submit_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_requests_per_window: default_api_requests(),
            submit_requests_per_window: default_submit_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_requests() -> u32 {
    120
}

fn default_submit_requests() -> u32 {
    10
}

fn default_window_seconds() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Formbase".to_string()
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Directory containing the LiberationSans TTF files used for PDF export.
    #[serde(default = "default_fonts_dir")]
    pub fonts_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            fonts_dir: default_fonts_dir(),
        }
    }
}

fn default_fonts_dir() -> PathBuf {
    PathBuf::from("./fonts")
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse configuration file")?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables take precedence over the config file for
    /// secrets and the public URL, so deployments can keep them off disk.
    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("JWT_ACCESS_TOKEN_SECRET") {
            if !secret.is_empty() {
                self.auth.access_token_secret = secret;
            }
        }
        if let Ok(secret) = std::env::var("JWT_REFRESH_TOKEN_SECRET") {
            if !secret.is_empty() {
                self.auth.refresh_token_secret = secret;
            }
        }
        if let Ok(url) = std::env::var("APP_URL") {
            if !url.is_empty() {
                self.server.app_url = url;
            }
        }
    }
}
