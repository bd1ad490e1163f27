use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub node_env: String,
    pub jwt_secret: Option<String>,
    pub timezone: String,
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let node_env = env::var("NODE_ENV").unwrap_or_else(|_| "development".to_string());
        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url: env::var("DB_CONNECTION_STRING")
                .or_else(|_| env::var("DATABASE_URL"))
                .context("DB_CONNECTION_STRING must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            jwt_secret: env::var("JWT_SECRET").ok(),
            timezone: env::var("TIMEZONE").unwrap_or_else(|_| "Asia/Kolkata".to_string()),
            node_env,
            allowed_origins,
        })
    }

    pub fn is_production(&self) -> bool {
        self.node_env == "production"
    }
}
