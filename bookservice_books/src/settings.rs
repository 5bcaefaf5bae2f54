use anyhow::Context;
use serde::Deserialize;

/// Process settings, every field can be overridden with a `BOOKS_` prefixed environment variable
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Empty selects the in-memory database, `postgres://` urls the PostgreSQL one
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Number of http workers, actix picks the number of cores when missing
    pub workers: Option<usize>,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(config::Environment::with_prefix("BOOKS").try_parsing(true))
    }

    fn load_from(environment: config::Environment) -> anyhow::Result<Self> {
        config::Config::builder()
            .set_default("database_url", "")?
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8080)?
            .add_source(environment)
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Failed to parse settings")
    }
}

#[cfg(test)]
mod settings_tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_select_in_memory_database() {
        let settings = Settings::load_from(
            config::Environment::with_prefix("BOOKS").source(Some(HashMap::new())),
        )
        .expect("Failed to load settings");

        assert_eq!(
            settings,
            Settings {
                database_url: "".to_string(),
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: None,
            }
        );
    }

    #[test]
    fn environment_overrides_defaults() {
        let environment = HashMap::from([
            (
                "BOOKS_DATABASE_URL".to_string(),
                "postgres://postgres:postgres@db/books".to_string(),
            ),
            ("BOOKS_PORT".to_string(), "9000".to_string()),
            ("BOOKS_WORKERS".to_string(), "4".to_string()),
        ]);
        let settings = Settings::load_from(
            config::Environment::with_prefix("BOOKS")
                .try_parsing(true)
                .source(Some(environment)),
        )
        .expect("Failed to load settings");

        assert_eq!(settings.database_url, "postgres://postgres:postgres@db/books");
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.workers, Some(4));
    }
}
