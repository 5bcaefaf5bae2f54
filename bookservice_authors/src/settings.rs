use anyhow::Context;
use serde::Deserialize;

/// Process settings, read from `AUTHORS_` prefixed environment variables
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Empty selects the in-memory database
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(config::Environment::with_prefix("AUTHORS").try_parsing(true))
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
    fn environment_overrides_defaults() {
        let environment = HashMap::from([
            ("AUTHORS_HOST".to_string(), "127.0.0.1".to_string()),
            ("AUTHORS_PORT".to_string(), "8002".to_string()),
        ]);
        let settings = Settings::load_from(
            config::Environment::with_prefix("AUTHORS")
                .try_parsing(true)
                .source(Some(environment)),
        )
        .expect("Failed to load settings");

        assert_eq!(
            settings,
            Settings {
                database_url: "".to_string(),
                host: "127.0.0.1".to_string(),
                port: 8002,
                workers: None,
            }
        );
    }
}
