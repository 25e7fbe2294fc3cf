use std::path::Path;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use promql::builder::BuilderOptions;
use promql::parser::ParserOptions;
use promql::types::is_valid_duration;

/// Default configuration file, looked up in the working directory
pub const CONFIG_FILE: &str = "promql-builder.toml";

/// Prefix for environment overrides, e.g. `PROMQL_BUILDER__PARSER__MAX_DEPTH`
pub const ENV_PREFIX: &str = "PROMQL_BUILDER__";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when neither `--verbose` nor `--quiet` is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Parser limits
    pub parser: ParserOptions,
    /// Query builder behaviour
    pub builder: BuilderOptions,
    pub logging: LoggingConfig,
}

impl Configuration {
    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
    }

    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    /// Load from an explicit TOML file, still honouring environment overrides
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        if !path.is_file() {
            return Err(Box::new(figment::Error::from(format!(
                "configuration file not found: {}",
                path.display()
            ))));
        }

        let config = Self::figment()
            .merge(Toml::file_exact(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.parser.max_query_length == 0 {
            anyhow::bail!("parser.max_query_length must be greater than zero");
        }
        if self.parser.max_depth == 0 {
            anyhow::bail!("parser.max_depth must be greater than zero");
        }
        if !is_valid_duration(&self.builder.default_rate_window) {
            anyhow::bail!(
                "builder.default_rate_window '{}' is not a valid duration",
                self.builder.default_rate_window
            );
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "logging.level '{}' must be one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();

        assert_eq!(config.parser.max_query_length, 16384);
        assert_eq!(config.parser.max_depth, 128);
        assert_eq!(config.builder.default_rate_window, "5m");
        assert!(config.builder.preserve_raw_text);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_configless_operation() {
        Jail::expect_with(|_jail| {
            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config, Configuration::default());
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                [parser]
                max_depth = 32

                [builder]
                default_rate_window = "1m"
                "#,
            )?;

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.parser.max_depth, 32);
            assert_eq!(config.parser.max_query_length, 16384);
            assert_eq!(config.builder.default_rate_window, "1m");
            assert!(config.builder.preserve_raw_text);
            Ok(())
        });
    }

    #[test]
    fn test_env_var_override() {
        Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "[logging]\nlevel = \"debug\"")?;
            jail.set_env("PROMQL_BUILDER__LOGGING__LEVEL", "warn");
            jail.set_env("PROMQL_BUILDER__BUILDER__PRESERVE_RAW_TEXT", "false");

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.logging.level, "warn");
            assert!(!config.builder.preserve_raw_text);
            Ok(())
        });
    }

    #[test]
    fn test_load_from_path() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[parser]\nmax_query_length = 512")?;

            let config = Configuration::load_from_path(Path::new("custom.toml")).map_err(|e| *e)?;
            assert_eq!(config.parser.max_query_length, 512);

            assert!(Configuration::load_from_path(Path::new("missing.toml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Configuration::default();
        config.builder.default_rate_window = "5 minutes".to_string();
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.parser.max_depth = 0;
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }
}
