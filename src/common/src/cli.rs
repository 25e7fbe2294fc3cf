use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared across all binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(
        short,
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Enable quiet mode (minimal output)"
    )]
    pub quiet: bool,
}

/// Subcommands that only need configuration, not a query
#[derive(Subcommand, Debug, Clone)]
pub enum CommonCommands {
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Pick the log level from CLI flags, falling back to the configured level
    pub fn log_level<'a>(args: &CommonArgs, config: &'a Configuration) -> &'a str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            &config.logging.level
        }
    }

    /// Initialize logging based on CLI arguments and configuration
    ///
    /// `RUST_LOG` takes precedence when set.
    pub fn init_logging(args: &CommonArgs, config: &Configuration) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(args, config)));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("PromQL Builder Configuration:");
            println!("=============================");
            println!("Max query length: {}", config.parser.max_query_length);
            println!("Max nesting depth: {}", config.parser.max_depth);
            println!(
                "Default rate window: {}",
                config.builder.default_rate_window
            );
            println!("Preserve raw text: {}", config.builder.preserve_raw_text);
            println!("Log level: {}", config.logging.level);
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::debug!("Validating configuration...");
        config.validate().context("Invalid configuration")?;
        log::debug!("Configuration validation passed");
        Ok(())
    }

    /// Handle commands that don't take a query
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<()> {
        match command {
            CommonCommands::Config { json } => display_config(config, *json),
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(())
            }
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    fn args(verbose: bool, quiet: bool) -> CommonArgs {
        CommonArgs {
            config: None,
            verbose,
            quiet,
        }
    }

    #[test]
    fn test_log_level_precedence() {
        let mut config = Configuration::default();
        config.logging.level = "error".to_string();

        assert_eq!(utils::log_level(&args(false, true), &config), "warn");
        assert_eq!(utils::log_level(&args(true, false), &config), "debug");
        assert_eq!(utils::log_level(&args(false, false), &config), "error");
    }

    #[test]
    fn test_validate_config_wraps_error() {
        let mut config = Configuration::default();
        config.parser.max_query_length = 0;

        let err = utils::validate_config(&config).unwrap_err();
        assert_eq!(err.to_string(), "Invalid configuration");
        assert!(format!("{err:#}").contains("max_query_length"));
    }

    #[test]
    fn test_version_info() {
        let version = utils::version_info();
        assert!(version.contains(env!("CARGO_PKG_VERSION")));
    }
}
