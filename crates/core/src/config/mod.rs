//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CASA_SW_*)
//! 2. TOML config file (if CASA_SW_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (CASA_SW_*)
/// 2. TOML config file (if CASA_SW_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding cache generations and sync tasks.
    ///
    /// Set via CASA_SW_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin that root-relative URLs are resolved against.
    ///
    /// Set via CASA_SW_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to read per response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds. Unset leaves timeouts to the network stack.
    ///
    /// Set via CASA_SW_TIMEOUT_MS environment variable.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Identifier returned by the `get-version` message.
    #[serde(default = "default_version")]
    pub version: String,

    /// Name of the current static (precache) generation.
    ///
    /// Changing it invalidates the previous static generation on next activate.
    #[serde(default = "default_static_cache")]
    pub static_cache: String,

    /// Name of the current dynamic (write-through) generation.
    #[serde(default = "default_dynamic_cache")]
    pub dynamic_cache: String,

    /// URLs fetched into the static generation at install, in order.
    #[serde(default = "default_precache_manifest")]
    pub precache_manifest: Vec<String>,

    /// Path prefixes always served network-first.
    #[serde(default = "default_network_first_prefixes")]
    pub network_first_prefixes: Vec<String>,

    /// File extensions (without dot) served cache-first.
    #[serde(default = "default_cache_first_extensions")]
    pub cache_first_extensions: Vec<String>,

    /// Document served to HTML navigations that cannot be answered.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Image served to image requests that cannot be answered.
    #[serde(default = "default_fallback_image")]
    pub fallback_image: String,

    /// Take over clients immediately after install instead of waiting for them to close.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,

    /// Replay target for `contact-form` sync tasks.
    #[serde(default = "default_contact_form_endpoint")]
    pub contact_form_endpoint: String,

    /// Replay target for `investment-inquiry` sync tasks.
    #[serde(default = "default_investment_inquiry_endpoint")]
    pub investment_inquiry_endpoint: String,

    /// Polled by the `property-updates` periodic sync.
    #[serde(default = "default_property_updates_url")]
    pub property_updates_url: String,

    /// Cache key under which the polled property data is stored.
    #[serde(default = "default_property_listing_url")]
    pub property_listing_url: String,

    /// Icon used when a push payload carries none.
    #[serde(default = "default_notification_icon")]
    pub notification_icon: String,

    #[serde(default = "default_notification_badge")]
    pub notification_badge: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./casa-sw-cache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_user_agent() -> String {
    "casa-sw/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_version() -> String {
    "casa-de-casablanca-v1.0.0".into()
}

fn default_static_cache() -> String {
    "casa-static-v1.0.0".into()
}

fn default_dynamic_cache() -> String {
    "casa-dynamic-v1.0.0".into()
}

fn default_precache_manifest() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/css/styles.css",
        "/js/main.js",
        "/assets/logo.svg",
        "/assets/logo-white.svg",
        "/manifest.json",
        "/assets/fallback-image.svg",
        "/offline.html",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_network_first_prefixes() -> Vec<String> {
    ["/api/", "/contact", "/calculator"].into_iter().map(String::from).collect()
}

fn default_cache_first_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "svg", "gif", "webp", "css", "js", "woff", "woff2", "ttf", "otf"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_offline_page() -> String {
    "/offline.html".into()
}

fn default_fallback_image() -> String {
    "/assets/fallback-image.svg".into()
}

fn default_contact_form_endpoint() -> String {
    "/api/contact".into()
}

fn default_investment_inquiry_endpoint() -> String {
    "/api/investment-inquiry".into()
}

fn default_property_updates_url() -> String {
    "/api/properties/updates".into()
}

fn default_property_listing_url() -> String {
    "/api/properties".into()
}

fn default_notification_icon() -> String {
    "/assets/icon-192x192.png".into()
}

fn default_notification_badge() -> String {
    "/assets/badge-72x72.png".into()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: None,
            version: default_version(),
            static_cache: default_static_cache(),
            dynamic_cache: default_dynamic_cache(),
            precache_manifest: default_precache_manifest(),
            network_first_prefixes: default_network_first_prefixes(),
            cache_first_extensions: default_cache_first_extensions(),
            offline_page: default_offline_page(),
            fallback_image: default_fallback_image(),
            skip_waiting: true,
            contact_form_endpoint: default_contact_form_endpoint(),
            investment_inquiry_endpoint: default_investment_inquiry_endpoint(),
            property_updates_url: default_property_updates_url(),
            property_listing_url: default_property_listing_url(),
            notification_icon: default_notification_icon(),
            notification_badge: default_notification_badge(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `CASA_SW_`
    /// 2. TOML file from `CASA_SW_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("CASA_SW_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CASA_SW_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./casa-sw-cache.sqlite"));
        assert_eq!(config.user_agent, "casa-sw/0.1");
        assert_eq!(config.static_cache, "casa-static-v1.0.0");
        assert_eq!(config.dynamic_cache, "casa-dynamic-v1.0.0");
        assert_eq!(config.version, "casa-de-casablanca-v1.0.0");
        assert!(config.timeout_ms.is_none());
        assert!(config.skip_waiting);
        assert!(config.precache_manifest.contains(&config.offline_page));
        assert!(config.precache_manifest.contains(&config.fallback_image));
    }

    #[test]
    fn test_timeout_duration() {
        assert_eq!(AppConfig::default().timeout(), None);

        let config = AppConfig { timeout_ms: Some(1_500), ..Default::default() };
        assert_eq!(config.timeout(), Some(Duration::from_millis(1_500)));
    }

    #[test]
    fn test_load_layers_toml_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "casa.toml",
                r#"
                static_cache = "casa-static-v2.0.0"
                network_first_prefixes = ["/api/"]
                "#,
            )?;
            jail.set_env("CASA_SW_CONFIG_FILE", "casa.toml");
            jail.set_env("CASA_SW_ORIGIN", "https://casa.test");
            jail.set_env("CASA_SW_TIMEOUT_MS", "2500");

            let config = AppConfig::load().expect("config loads");
            assert_eq!(config.static_cache, "casa-static-v2.0.0");
            assert_eq!(config.network_first_prefixes, vec!["/api/".to_string()]);
            assert_eq!(config.origin, "https://casa.test");
            assert_eq!(config.timeout_ms, Some(2500));
            assert_eq!(config.dynamic_cache, "casa-dynamic-v1.0.0");
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CASA_SW_DYNAMIC_CACHE", "casa-static-v1.0.0");
            let result = AppConfig::load();
            assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "dynamic_cache"));
            Ok(())
        });
    }
}
