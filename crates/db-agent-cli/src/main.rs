#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        clippy::dbg_macro,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only output and panic-based assertions are permitted."
    )
)]
// crates/db-agent-cli/src/main.rs
// ============================================================================
// Module: Agent CLI Entry Point
// Description: Command dispatcher for serving and operational checks.
// Purpose: Provide the db-agent binary with a strict exit-code contract.
// Dependencies: clap, db-agent-config, db-agent-server, tokio
// ============================================================================

//! ## Overview
//! The CLI reads configuration from the environment, builds the application
//! once, and serves the HTTP surface. Operational subcommands follow the
//! fleet exit-code contract: 0 on success, 1 on any failure with the
//! message on stderr.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use db_agent_config::AgentConfig;
use db_agent_server::Application;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "db-agent", disable_help_subcommand = true, arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the agent HTTP server.
    Serve,
    /// Validate configuration from the environment and exit.
    CheckConfig,
    /// Print the resolved runtime claims snapshot and exit.
    Attestation,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for operator-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve => serve().await,
        Commands::CheckConfig => check_config(),
        Commands::Attestation => attestation(),
    }
}

/// Starts the HTTP server from environment configuration.
async fn serve() -> CliResult<ExitCode> {
    let config = AgentConfig::from_env().map_err(|err| CliError::new(err.to_string()))?;
    let app = Application::from_config(config)
        .await
        .map_err(|err| CliError::new(err.to_string()))?;
    db_agent_server::serve(app).await.map_err(|err| CliError::new(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

/// Validates configuration and reports the outcome.
fn check_config() -> CliResult<ExitCode> {
    let config = AgentConfig::from_env().map_err(|err| CliError::new(err.to_string()))?;
    emit_line(&format!(
        "configuration ok: service={} driver={} auth_enabled={}",
        config.service.name,
        match config.database.driver {
            db_agent_config::DbDriver::Sqlite => "sqlite",
            db_agent_config::DbDriver::Postgres => "postgres",
        },
        config.auth.enabled,
    ));
    Ok(ExitCode::SUCCESS)
}

/// Prints the resolved runtime claims snapshot.
fn attestation() -> CliResult<ExitCode> {
    let config = AgentConfig::from_env().map_err(|err| CliError::new(err.to_string()))?;
    let claims = config.runtime_claims();
    let payload =
        serde_json::to_string_pretty(&claims).map_err(|err| CliError::new(err.to_string()))?;
    emit_line(&payload);
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn emit_line(message: &str) {
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "{message}");
}

/// Writes an error to stderr and returns the failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "error: {message}");
    ExitCode::FAILURE
}
