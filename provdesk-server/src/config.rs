//! Server configuration

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address to bind
    pub bind: String,

    /// Port to listen on
    pub port: u16,

    /// Path to the SQLite database file
    pub database: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
            database: "provdesk.db".to_string(),
        }
    }
}

impl Config {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            bind: std::env::var("PROVDESK_BIND").unwrap_or(defaults.bind),
            port: std::env::var("PROVDESK_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            database: std::env::var("PROVDESK_DB").unwrap_or(defaults.database),
        }
    }
}
