use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TutehubSettings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub session: SessionSettings,
    pub cookies: CookieSettings,
    pub security: SecuritySettings,
    pub provider: ProviderSettings,
    pub static_files: StaticFilesSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub redirect_base_url: String,
    pub cors_origins: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `redis://`, `rediss://` or `memory://`
    pub url: String,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Keys the CSRF MAC and the OAuth state cookie. Required.
    pub secret: String,
    /// Lifetime of a freshly created session
    pub ttl_seconds: u64,
    /// Rolling renewal window. If 0, renewal is disabled.
    /// When the remaining lifetime drops to this value or below, a request
    /// pushes the expiry back out to a full TTL.
    pub renew_within_seconds: u64,
    /// How long the store keeps a record after it expired, so that late
    /// requests are told the session expired rather than never existed
    pub store_grace_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub secure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SecuritySettings {
    /// Allow anonymous GET/HEAD on resource routes
    pub public_reads: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub name: String,
    pub display_name: Option<String>,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
    pub scopes: Vec<String>,

    // Direct values (can be overridden by environment variables)
    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    // Environment variable names for overrides
    pub client_id_env: Option<String>,
    pub client_secret_env: Option<String>,

    pub extra_auth_params: HashMap<String, String>,
    pub timeout_seconds: u64,
    pub success_redirect: String,
    pub failure_redirect: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticFilesSettings {
    pub folder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            redirect_base_url: "http://localhost:8080".to_string(),
            cors_origins: "*".to_string(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_seconds: 5,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_seconds: 3600,
            renew_within_seconds: 0,
            store_grace_seconds: 300,
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self { secure: true }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: "google".to_string(),
            display_name: Some("Google".to_string()),
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            scopes: Vec::new(),
            client_id: None,
            client_secret: None,
            client_id_env: Some("GOOGLE_CLIENT_ID".to_string()),
            client_secret_env: Some("GOOGLE_CLIENT_SECRET".to_string()),
            extra_auth_params: HashMap::new(),
            timeout_seconds: 10,
            success_redirect: "/".to_string(),
            failure_redirect: "/auth/failure?error=auth_failed".to_string(),
        }
    }
}

impl Default for StaticFilesSettings {
    fn default() -> Self {
        Self {
            folder: "TuteFiles".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TutehubSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be read or parsed
    pub fn load() -> Result<Self> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        settings.init_logger();

        Ok(settings)
    }

    /// Start the logger; `RUST_LOG` wins over `logging.level`
    fn init_logger(&self) {
        let env = env_logger::Env::default().default_filter_or(self.log_filter());
        if env_logger::Builder::from_env(env).try_init().is_err() {
            log::debug!("Logger already initialised");
        }
    }

    /// Filter directive for the logger, `info` when unset
    #[must_use]
    pub fn log_filter(&self) -> &str {
        let level = self.logging.level.trim();
        if level.is_empty() {
            "info"
        } else {
            level
        }
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `TUTEHUB_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    fn load_base_settings() -> Result<Self> {
        let mut settings = Self::read_settings_file(Path::new("Settings.toml"))?.unwrap_or_default();

        if let Ok(secrets_dir) = std::env::var("TUTEHUB_SECRETS_DIR") {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            match Self::read_settings_file(&secrets_path)? {
                Some(secrets_settings) => {
                    log::info!("Overriding settings from {}", secrets_path.display());
                    settings = secrets_settings;
                }
                None => log::info!(
                    "TUTEHUB_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                ),
            }
        }

        Ok(settings)
    }

    /// Parse one settings file; `Ok(None)` when it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not valid TOML
    pub fn read_settings_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings = basic_toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        log::info!("Loaded settings from {}", path.display());
        Ok(Some(settings))
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_database_env_overrides(&mut settings.database);
        Self::apply_session_env_overrides(&mut settings.session);

        if let Some(secure) = Self::env_parse::<bool>("COOKIE_SECURE") {
            settings.cookies.secure = secure;
        }
        if let Some(public_reads) = Self::env_parse::<bool>("PUBLIC_READS") {
            settings.security.public_reads = public_reads;
        }
        if let Ok(folder) = std::env::var("STATIC_FOLDER_PATH") {
            settings.static_files.folder = folder;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            settings.logging.level = level;
        }
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Some(port) = Self::env_parse::<u16>("PORT") {
            app_settings.port = port;
        }
        if let Ok(redirect_base_url) = std::env::var("REDIRECT_BASE_URL") {
            app_settings.redirect_base_url = redirect_base_url;
        }
        if let Ok(cors_origins) = std::env::var("CORS_ORIGINS") {
            app_settings.cors_origins = cors_origins;
        }
    }

    fn apply_database_env_overrides(database: &mut DatabaseSettings) {
        // MONGODB_URL is honoured for deployments that still export the old name
        let url = std::env::var("DATABASE_URL").or_else(|_| std::env::var("MONGODB_URL"));
        if let Ok(url) = url {
            database.url = url;
        }
    }

    /// Apply environment overrides for session settings
    pub fn apply_session_env_overrides(session_settings: &mut SessionSettings) {
        if let Ok(secret) = std::env::var("SESSION_SECRET") {
            if !secret.is_empty() {
                session_settings.secret = secret;
            }
        }
        if let Some(ttl) = Self::env_parse::<u64>("SESSION_TTL_SECONDS") {
            session_settings.ttl_seconds = ttl;
        }
        if let Some(window) = Self::env_parse::<u64>("SESSION_RENEW_WITHIN_SECONDS") {
            session_settings.renew_within_seconds = window;
        }
    }

    fn env_parse<T: std::str::FromStr>(env_var: &str) -> Option<T> {
        std::env::var(env_var).ok().and_then(|value| value.parse().ok())
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Check the requirements the server cannot start without
    ///
    /// # Errors
    ///
    /// Returns `AppError::Configuration` naming the first missing value
    pub fn validate(&self) -> Result<(), AppError> {
        if self.database.url.trim().is_empty() {
            return Err(AppError::Configuration(
                "database url is not set (DATABASE_URL)".to_string(),
            ));
        }
        if self.session.secret.trim().is_empty() {
            return Err(AppError::Configuration(
                "session secret is not set (SESSION_SECRET)".to_string(),
            ));
        }
        if self.session.ttl_seconds == 0 {
            return Err(AppError::Configuration(
                "session ttl_seconds must be greater than zero".to_string(),
            ));
        }
        if self.provider.get_client_id().filter(|id| !id.is_empty()).is_none() {
            return Err(AppError::Configuration(format!(
                "client id for provider {} is not set",
                self.provider.name
            )));
        }
        if self.provider.get_client_secret().filter(|s| !s.is_empty()).is_none() {
            return Err(AppError::Configuration(format!(
                "client secret for provider {} is not set",
                self.provider.name
            )));
        }
        Ok(())
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Human-readable provider name, falling back to the configured key
    #[must_use]
    pub fn provider_label(&self) -> &str {
        self.provider
            .display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.provider.name)
    }

    /// Get CORS origins as a vector of strings
    #[must_use]
    pub fn get_cors_origins(&self) -> Vec<String> {
        self.application
            .cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl ProviderSettings {
    /// Get the client ID, checking environment variable first, then falling back to direct value
    #[must_use]
    pub fn get_client_id(&self) -> Option<String> {
        if let Some(env_var) = &self.client_id_env {
            if let Ok(value) = std::env::var(env_var) {
                return Some(value);
            }
        }
        self.client_id.clone()
    }

    /// Get the client secret, checking environment variable first, then falling back to direct value
    #[must_use]
    pub fn get_client_secret(&self) -> Option<String> {
        if let Some(env_var) = &self.client_secret_env {
            if let Ok(value) = std::env::var(env_var) {
                return Some(value);
            }
        }
        self.client_secret.clone()
    }
}
