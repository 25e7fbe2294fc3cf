use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::Configuration;
use common::cli::{CommonArgs, CommonCommands, utils};
use promql::QueryBuilder;
use promql::parser::{self, extract_matchers, extract_metric_names};

#[derive(Parser)]
#[command(name = "promql-builder")]
#[command(about = "Parse, inspect and rewrite PromQL queries")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a query and show its structure
    Parse {
        query: String,
        #[arg(long, help = "Show the query structure in JSON format")]
        json: bool,
    },
    /// Parse a query and print it rendered from its structure
    Format { query: String },
    /// Check that a query parses
    Validate { query: String },
    #[command(flatten)]
    Common(CommonCommands),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = utils::load_config(cli.common.config.as_ref())?;
    utils::init_logging(&cli.common, &config);
    utils::validate_config(&config)?;

    match &cli.command {
        Command::Parse { query, json } => parse_query(query, *json, &config),
        Command::Format { query } => format_query(query, &config),
        Command::Validate { query } => validate_query(query, &config),
        Command::Common(command) => utils::handle_common_command(command, &config),
    }
}

fn parse_builder(query: &str, config: &Configuration) -> Result<QueryBuilder> {
    QueryBuilder::parse_with(query, &config.parser, config.builder.clone())
        .with_context(|| format!("Failed to parse query: {query}"))
}

#[tracing::instrument(skip_all)]
fn parse_query(query: &str, json: bool, config: &Configuration) -> Result<()> {
    let builder = parse_builder(query, config)?;
    let info = builder.info();

    if json {
        let json = serde_json::to_string_pretty(&info)
            .context("Failed to serialize query info to JSON")?;
        println!("{json}");
        return Ok(());
    }

    let expr = parser::parse_with(query, &config.parser)?;

    println!("Metric: {}", info.metric_name.as_deref().unwrap_or("-"));
    println!("Referenced metrics: {}", extract_metric_names(&expr).join(", "));
    for matcher in extract_matchers(&expr) {
        println!("  Matcher: {matcher}");
    }
    if let Some(range) = &info.range_window {
        println!("Range: {range}");
    }
    if let Some(offset) = &info.offset {
        println!("Offset: {offset}");
    }
    for function in builder.functions() {
        println!("Function: {function}");
    }
    for op in &info.arithmetic_ops {
        println!("Arithmetic: {} {}", op.operator, op.value);
    }
    for op in &info.binary_ops {
        println!("Binary: {} {}", op.operator, op.value);
    }
    if !builder.is_decomposed() {
        println!("Note: query was only partially decomposed");
    }
    if let Some(full_query) = &info.full_query {
        println!("Rendered: {full_query}");
    }
    Ok(())
}

#[tracing::instrument(skip_all)]
fn format_query(query: &str, config: &Configuration) -> Result<()> {
    let builder = parse_builder(query, config)?;
    println!("{}", builder.render()?);
    Ok(())
}

#[tracing::instrument(skip_all)]
fn validate_query(query: &str, config: &Configuration) -> Result<()> {
    parser::parse_with(query, &config.parser)
        .with_context(|| format!("Invalid query: {query}"))?;
    log::info!("Query is valid");
    println!("OK");
    Ok(())
}
