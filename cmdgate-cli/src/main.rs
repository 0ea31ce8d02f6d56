//! cmdgate - allowlist gate for commands run by agents and scripts
//!
//! Every subcommand resolves the same policy and snapshot locations, builds an
//! [`AuthorizationGate`] and hands it to the command handler.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cmdgate_core::integrity::FileSnapshotStore;
use cmdgate_core::{AuthorizationGate, GateOptions, GatePaths, Verdict};

mod executor;
mod trust_cli;

/// `check`: the command was refused
const EXIT_DENIED: u8 = 1;
/// The policy is missing, unreadable or malformed
const EXIT_CONFIG_ERROR: u8 = 2;
/// `exec`: the command was refused and not started
const EXIT_EXEC_DENIED: u8 = 126;

type Gate = AuthorizationGate<FileSnapshotStore>;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "cmdgate",
    about = "Allowlist gate for commands run by agents and scripts",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Project root holding .cmdgate/policy.yml (default: current directory)
    #[clap(long, global = true)]
    project_dir: Option<PathBuf>,

    /// Global cmdgate directory holding policy.yml and integrity.json
    #[clap(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Skip policy integrity verification. Tampered policies will be trusted.
    #[clap(
        long,
        global = true,
        env = "CMDGATE_SKIP_INTEGRITY",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    skip_integrity: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether a command would be allowed, without running it
    Check {
        /// Print the verdict as JSON
        #[clap(long)]
        json: bool,

        #[clap(flatten)]
        invocation: Invocation,
    },

    /// Authorize a command and run it directly (no shell)
    Exec {
        #[clap(flatten)]
        invocation: Invocation,
    },

    /// Review policy changes and approve them as trusted
    Approve,

    /// Compare policy files with the trusted snapshot
    Verify {
        /// Output results as JSON
        #[clap(long)]
        json: bool,

        /// Also list the tracked files and their hashes
        #[clap(long)]
        verbose: bool,
    },
}

/// The gated command line
///
/// Everything from the command name on is taken verbatim, so flags such as
/// `--help` or `--json` after it belong to the gated command.
#[derive(Args, Debug)]
struct Invocation {
    /// Command name as configured in the policy, then its arguments
    #[clap(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    argv: Vec<String>,
}

impl Invocation {
    fn split(&self) -> Result<(&str, &[String])> {
        let (command, args) = self.argv.split_first().context("No command given")?;
        Ok((command.as_str(), args))
    }
}

/// Initialize tracing from --log-level
///
/// Logs go to stderr so stdout stays clean for executed commands and JSON.
fn initialize_tracing(log_level: &LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level.to_filter_directive()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level);

    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let paths = GatePaths::discover(&project_dir, cli.config_dir)
        .context("Failed to resolve cmdgate paths")?;
    let gate = AuthorizationGate::from_paths(
        &paths,
        GateOptions {
            skip_integrity: cli.skip_integrity,
        },
    );

    match cli.command {
        Command::Check { json, invocation } => {
            let (command, args) = invocation.split()?;
            check_command(&gate, command, args, json)
        }
        Command::Exec { invocation } => {
            let (command, args) = invocation.split()?;
            exec_command(&gate, command, args).await
        }
        Command::Approve => trust_cli::approve_command(&gate),
        Command::Verify { json, verbose } => trust_cli::verify_command(&gate, json, verbose),
    }
}

/// Run the gate; `None` after reporting a configuration error
fn authorize(gate: &Gate, command: &str, args: &[String]) -> Result<Option<Verdict>> {
    match gate.authorize(command, args) {
        Ok(verdict) => Ok(Some(verdict)),
        Err(e) if e.is_config_error() => {
            eprintln!("cmdgate: {}", e.display_chain());
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to authorize '{command}'")),
    }
}

fn check_command(gate: &Gate, command: &str, args: &[String], json: bool) -> Result<ExitCode> {
    let Some(verdict) = authorize(gate, command, args)? else {
        return Ok(ExitCode::from(EXIT_CONFIG_ERROR));
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        match &verdict {
            Verdict::Authorized { matched_pattern } => {
                println!(
                    "Authorized: matched pattern {}",
                    serde_json::to_string(matched_pattern)?
                );
            }
            Verdict::Denied { reason } => println!("Denied: {reason}"),
        }
    }

    Ok(if verdict.is_authorized() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_DENIED)
    })
}

async fn exec_command(gate: &Gate, command: &str, args: &[String]) -> Result<ExitCode> {
    let Some(verdict) = authorize(gate, command, args)? else {
        return Ok(ExitCode::from(EXIT_CONFIG_ERROR));
    };

    match verdict {
        Verdict::Denied { reason } => {
            eprintln!("cmdgate: denied: {reason}");
            Ok(ExitCode::from(EXIT_EXEC_DENIED))
        }
        Verdict::Authorized { matched_pattern } => {
            debug!("Running '{}' (pattern {:?})", command, matched_pattern);
            match executor::run(command, args).await {
                Ok(status) => Ok(ExitCode::from(executor::exit_code(status))),
                Err(e) => {
                    eprintln!("cmdgate: {e:#}");
                    Ok(ExitCode::from(executor::EXIT_SPAWN_FAILED))
                }
            }
        }
    }
}
