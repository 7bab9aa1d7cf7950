//! costscope - per-scope cost attribution for LLM calls

mod cli;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use costscope_core::{
    export_calls_to_csv, export_report_to_json, export_report_to_markdown, JsonRenderer,
    ProfilerConfig, Session, StaticPricing, TextRenderer,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "costscope",
    version,
    about = "Per-scope cost attribution for LLM calls",
    long_about = "Inspect LLM spend recorded by costscope-instrumented programs.\n\
                  \n\
                  Calls are attributed to the named scopes that were active when they\n\
                  completed, rolled up into a ranked cost tree, and checked against a few\n\
                  rules that suggest cheaper setups.\n\
                  \n\
                  Examples:\n\
                    costscope report                   # Ranked cost tree of the stored session\n\
                    costscope report --format json     # Same, as JSON\n\
                    costscope stats                    # Totals by scope and model\n\
                    costscope hints                    # Optimization hints\n\
                    costscope export --csv calls.csv   # One row per call\n\
                    costscope price gpt-4o             # Price sheet for a model\n\
                    costscope demo                     # Simulated agent pipeline\n\
                  \n\
                  Environment Variables:\n\
                    COSTSCOPE_DB                       # Store location (default: ~/.costscope/usage.db)\n\
                    COSTSCOPE_CONFIG                   # Config file (default: ~/.costscope/config.toml)\n\
                    COSTSCOPE_SESSION                  # Session name shown in reports\n\
                    COSTSCOPE_LOG                      # Log filter, falls back to RUST_LOG\n\
                    COSTSCOPE_NO_COLOR                 # Disable ANSI colors in tables"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the call record store
    #[arg(long, global = true, env = "COSTSCOPE_DB")]
    db: Option<PathBuf>,

    /// Path to the config file
    #[arg(long, global = true, env = "COSTSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Session name shown in reports
    #[arg(long, global = true, env = "COSTSCOPE_SESSION")]
    session: Option<String>,

    /// Disable colored table headers
    #[arg(long, global = true, env = "COSTSCOPE_NO_COLOR")]
    no_color: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Render the ranked cost tree with hints
    Report {
        #[arg(long, value_enum, default_value = "text")]
        format: ReportFormat,
    },
    /// Totals by scope and model
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Optimization hints for the stored session
    Hints {
        #[arg(long)]
        json: bool,
    },
    /// Write the stored session to a file
    Export {
        #[command(flatten)]
        target: ExportTarget,
    },
    /// Delete every stored call record
    Clear,
    /// Price sheet for a model, or all known models
    Price {
        model: Option<String>,

        /// Input tokens of the sample call
        #[arg(long, default_value_t = 1_000)]
        input: u64,

        /// Output tokens of the sample call
        #[arg(long, default_value_t = 500)]
        output: u64,
    },
    /// Record a simulated research pipeline into a throwaway session and report it
    Demo,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ExportTarget {
    /// One row per call
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Full report as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Summary tables and hints as Markdown
    #[arg(long)]
    markdown: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let no_color = cli.no_color;

    match &cli.command {
        Command::Price {
            model,
            input,
            output,
        } => run_price(model.as_deref(), *input, *output, no_color),
        Command::Demo => run_demo(&cli).await,
        Command::Report { format } => run_report(&open_store(&cli)?, *format),
        Command::Stats { json } => {
            println!("{}", cli::format_stats(&open_store(&cli)?.stats(), *json, no_color));
            Ok(())
        }
        Command::Hints { json } => {
            println!("{}", cli::format_hints(&open_store(&cli)?.hints(), *json, no_color));
            Ok(())
        }
        Command::Export { target } => run_export(&open_store(&cli)?, target),
        Command::Clear => run_clear(&open_store(&cli)?),
    }
}

/// Logs go to stderr so command output stays pipeable
fn init_tracing() {
    let filter = EnvFilter::try_from_env("COSTSCOPE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("costscope=info,costscope_core=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// File config, then `COSTSCOPE_*` variables, then command-line flags
fn load_config(cli: &Cli) -> Result<ProfilerConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => dirs::home_dir()
            .context("Could not determine home directory")?
            .join(".costscope")
            .join("config.toml"),
    };

    let mut config = ProfilerConfig::load(&path)?.apply_env();
    if let Some(db) = &cli.db {
        config.persist_path = Some(db.clone());
    }
    if let Some(session) = &cli.session {
        config.session_name = session.clone();
    }
    Ok(config)
}

/// Session replayed from the persistent store
fn open_store(cli: &Cli) -> Result<Session> {
    let mut config = load_config(cli)?;
    config.persist = true;
    let db_path = config.db_path();

    let session = Session::builder()
        .config(config)
        .build()
        .with_context(|| match &db_path {
            Some(path) => format!("Failed to open call store at {}", path.display()),
            None => "Failed to open call store".to_string(),
        })?;

    tracing::debug!(calls = session.total_calls(), "Store opened");
    Ok(session)
}

// ============================================================================
// CLI Command Handlers
// ============================================================================

fn run_report(session: &Session, format: ReportFormat) -> Result<()> {
    let rendered = match format {
        ReportFormat::Text => session.render(&TextRenderer::default())?,
        ReportFormat::Json => session.render(&JsonRenderer::default())?,
    };
    print!("{}", rendered);
    if !rendered.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn run_export(session: &Session, target: &ExportTarget) -> Result<()> {
    if let Some(path) = &target.csv {
        let records: Vec<_> = session.records().iter().map(|r| (**r).clone()).collect();
        export_calls_to_csv(&records, path)?;
        println!("Exported {} calls to {}", records.len(), path.display());
    } else if let Some(path) = &target.json {
        export_report_to_json(&session.report(), path)?;
        println!("Exported report to {}", path.display());
    } else if let Some(path) = &target.markdown {
        export_report_to_markdown(&session.report(), path)?;
        println!("Exported report to {}", path.display());
    }
    Ok(())
}

fn run_clear(session: &Session) -> Result<()> {
    let calls = session.total_calls();
    session.reset();
    session.flush();
    println!("Cleared {} stored calls", calls);
    Ok(())
}

fn run_price(model: Option<&str>, input: u64, output: u64, no_color: bool) -> Result<()> {
    match model {
        Some(model) => {
            let sheet = cli::format_price(&StaticPricing::new(), model, input, output)?;
            println!("{}", sheet);
        }
        None => println!("{}", cli::format_price_list(no_color)),
    }
    Ok(())
}

async fn run_demo(cli: &Cli) -> Result<()> {
    let mut config = load_config(cli)?;
    config.persist = false;
    if cli.session.is_none() {
        config.session_name = "demo".to_string();
    }

    let session = Session::builder().config(config).build()?;
    cli::run_demo_pipeline(&session).await;

    print!("{}", session.render(&TextRenderer::default())?);
    Ok(())
}
