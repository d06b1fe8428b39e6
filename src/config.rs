use std::env;
use std::time::Duration;

use crate::models::PluginOptions;
use crate::services::http::useragents;
use crate::services::resolver::ResolverSettings;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,

    // Fetching
    pub user_agent: String,
    pub fetch_timeout_ms: u64,
    pub max_retries: u32,

    // Resolution
    pub selection_timeout_ms: u64,
    pub max_resolve_depth: usize,
    pub plugin_options: PluginOptions,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Server
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .unwrap_or(3001),

            // Fetching - desktop browser UA, most embeds refuse unknown clients
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| useragents::FIREFOX.to_string()),

            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "20000".to_string())
                .parse()
                .unwrap_or(20_000), // 20 seconds

            // Failed fetches are terminal unless retries are opted into
            max_retries: env::var("MAX_RETRIES")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),

            // Resolution
            selection_timeout_ms: env::var("SELECTION_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30_000), // 30 seconds

            max_resolve_depth: env::var("MAX_RESOLVE_DEPTH")
                .unwrap_or_else(|_| "16".to_string())
                .parse()
                .unwrap_or(16),

            plugin_options: PluginOptions::from_env(),
        }
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            user_agent: self.user_agent.clone(),
            selection_timeout: Duration::from_millis(self.selection_timeout_ms),
            max_depth: self.max_resolve_depth,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
