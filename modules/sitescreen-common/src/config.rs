use std::env;

/// Credentials and endpoints loaded from environment variables.
/// Per-run tuning (thresholds, batch sizes) comes from the CLI instead.
#[derive(Debug, Clone)]
pub struct Config {
    /// Anthropic key for the vision classifier.
    pub anthropic_api_key: String,
    /// Postgres connection string; only required by the database driver.
    pub database_url: Option<String>,
    /// Outscraper key; only required when seeding input from the search API.
    pub outscraper_api_key: Option<String>,
}

impl Config {
    /// Load configuration for an enrichment run. Panics with a clear message
    /// if the vision credential is missing — checked once, before any batch.
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            database_url: env::var("DATABASE_URL").ok(),
            outscraper_api_key: env::var("OUTSCRAPER_API_KEY").ok(),
        }
    }

    /// Load a minimal config for verification-only runs (no AI keys needed).
    pub fn verify_from_env() -> Self {
        Self {
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            database_url: env::var("DATABASE_URL").ok(),
            outscraper_api_key: env::var("OUTSCRAPER_API_KEY").ok(),
        }
    }

    /// Postgres URL, or a clear panic for runs that require the database.
    pub fn require_database_url(&self) -> &str {
        self.database_url
            .as_deref()
            .unwrap_or_else(|| panic!("DATABASE_URL environment variable is required"))
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
