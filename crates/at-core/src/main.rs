//! at-core CLI entry point.
//!
//! Maintenance commands for an audit store:
//! - replay: re-insert records a reserve file kept
//! - count: count current records in a Parquet store
//! - config: show or validate the effective configuration

use at_common::{Error, Value};
use at_config::{
    load_config, validate_config, AuditConfig, ConfigSnapshot, LoadedConfig, ValidationError,
};
use at_core::exit_codes::ExitCode;
use at_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use at_core::{replay_file, AuditDao};
use at_store::{Filter, ParquetGateway};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Audit trail store maintenance
#[derive(Parser)]
#[command(name = "at-core")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to the config file (audit.toml or audit.json)
    #[arg(long, global = true, env = "AT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Re-insert records from a reserve file into a Parquet store
    Replay(ReplayArgs),

    /// Count current records in a Parquet store
    Count(CountArgs),

    /// Configuration management
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Directory of the Parquet store
    #[arg(long)]
    store: PathBuf,

    /// Reserve file to replay
    reserve: PathBuf,
}

#[derive(Args, Debug)]
struct CountArgs {
    /// Directory of the Parquet store
    #[arg(long)]
    store: PathBuf,

    /// Only count the record with this id
    #[arg(long)]
    id: Option<i64>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the resolved config)
        path: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let exit_code = match &cli.command {
        Commands::Replay(args) => run_replay(&cli.global, args),
        Commands::Count(args) => run_count(&cli.global, args),
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => run_config_show(&cli.global),
            ConfigCommands::Validate { path } => run_config_validate(&cli.global, path.as_deref()),
        },
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Store commands
// ============================================================================

fn run_replay(global: &GlobalOpts, args: &ReplayArgs) -> ExitCode {
    let loaded = match load(global) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    if !args.reserve.exists() {
        return output_error(
            ExitCode::StoreError,
            &format!("reserve file not found: {}", args.reserve.display()),
        );
    }

    let result = open_store(&args.store).and_then(|gateway| {
        replay_file(
            gateway.as_ref(),
            &loaded.config.storage.table,
            &args.reserve,
            loaded.config.reserve.max_generation,
        )
    });

    match result {
        Ok(report) => {
            let response = serde_json::json!({
                "command": "replay",
                "store": args.store.display().to_string(),
                "reserve": args.reserve.display().to_string(),
                "replayed": report.replayed,
                "skipped": report.skipped,
            });
            print_json(&response);
            if report.skipped > 0 {
                ExitCode::PartialReplay
            } else {
                ExitCode::Clean
            }
        }
        Err(e) => output_engine_error(&e),
    }
}

fn run_count(global: &GlobalOpts, args: &CountArgs) -> ExitCode {
    let loaded = match load(global) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let storage = &loaded.config.storage;

    let filter = match args.id {
        Some(id) => Filter::eq(storage.columns.id.as_str(), Value::Long(id)),
        None => Filter::All,
    };

    let result = open_store(&args.store)
        .and_then(|gateway| AuditDao::open(gateway, storage))
        .and_then(|dao| dao.count_records(&filter));

    match result {
        Ok(count) => {
            let response = serde_json::json!({
                "command": "count",
                "store": args.store.display().to_string(),
                "table": storage.table,
                "id": args.id,
                "count": count,
            });
            print_json(&response);
            ExitCode::Clean
        }
        Err(e) => output_engine_error(&e),
    }
}

fn open_store(dir: &Path) -> Result<Arc<ParquetGateway>, Error> {
    if !dir.is_dir() {
        return Err(Error::Storage(format!(
            "store directory not found: {}",
            dir.display()
        )));
    }
    Ok(Arc::new(ParquetGateway::open(dir)?))
}

// ============================================================================
// Config commands
// ============================================================================

fn run_config_show(global: &GlobalOpts) -> ExitCode {
    let loaded = match load(global) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let snapshot = ConfigSnapshot::new(&loaded);

    let response = serde_json::json!({
        "command": "config show",
        "snapshot": snapshot,
        "config": loaded.config,
    });
    print_json(&response);
    ExitCode::Clean
}

fn run_config_validate(global: &GlobalOpts, path: Option<&Path>) -> ExitCode {
    let result = match path {
        Some(p) => AuditConfig::from_file(p).and_then(|config| {
            validate_config(&config)?;
            Ok(p.display().to_string())
        }),
        None => load_config(global.config.as_deref()).map(|loaded| {
            loaded
                .path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| loaded.source.to_string())
        }),
    };

    match result {
        Ok(source) => {
            let response = serde_json::json!({
                "command": "config validate",
                "source": source,
                "valid": true,
            });
            print_json(&response);
            ExitCode::Clean
        }
        Err(e) => output_config_error(&e),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn load(global: &GlobalOpts) -> Result<LoadedConfig, ExitCode> {
    load_config(global.config.as_deref()).map_err(|e| output_config_error(&e))
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("at-core: failed to render output: {}", e),
    }
}

fn output_error(code: ExitCode, message: &str) -> ExitCode {
    let response = serde_json::json!({
        "error": code.code_name(),
        "exit_code": code.as_i32(),
        "message": message,
    });
    print_json(&response);
    code
}

fn output_engine_error(error: &Error) -> ExitCode {
    tracing::error!(code = error.code(), error = %error, "command failed");
    output_error(ExitCode::from_error(error), &error.to_string())
}

fn output_config_error(error: &ValidationError) -> ExitCode {
    tracing::error!(code = error.code(), error = %error, "configuration rejected");
    output_error(ExitCode::ConfigError, &error.to_string())
}
