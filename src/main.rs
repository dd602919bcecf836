use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::{Context as _, Result};
use clap::Parser;

mod cmd;
mod config;
mod error;
mod grpc;
mod launch;
mod probe;
mod utils;

use cmd::dispatch::Outcome;
use cmd::{Context, OutputFormat, StyleOptions};
use config::Config;
use error::{DispatchError, ErrorPolicy, UNKNOWN_COMMAND_EXIT};
use launch::TokioLauncher;

/// svcctl - drive a locally running gRPC service during development
///
/// Usage:
///   svcctl                      list available commands
///   svcctl <command> [args...]  run a command; args after the name are forwarded as-is
///
/// Commands:
///   test, list, ping, ping2, shutdown      quick checks through the RPC inspection tool
///   run | r, t, dbg, refresh               local developer scripts
///   c                                      GET health endpoint, ping x3, shutdown
///   a                                      feature-test RPC, shutdown
///   probe [--shutdown] [--attempts N]      start the service and verify it answers
///
/// Configuration:
///   --config PATH | SVCCTL_CONFIG | ./svcctl.yaml, then SVCCTL_* env, then flags
///
/// Exit status:
///   0 success (or failure absorbed by --on-error swallow), 2 unknown command,
///   130 interrupted, child's status when a child fails, 1 otherwise
#[derive(Parser, Debug)]
#[command(
    name = "svcctl",
    version,
    author,
    about = "svcctl - drive a locally running gRPC service during development",
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Silence all non-error output
    #[arg(short, long)]
    quiet: bool,

    /// YAML config file (or SVCCTL_CONFIG env)
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// gRPC address handed to the inspection tool
    #[arg(long, value_name = "HOST:PORT")]
    rpc_addr: Option<String>,

    /// HTTP health endpoint
    #[arg(long, value_name = "URL")]
    http_url: Option<String>,

    /// RPC inspection tool command
    #[arg(long, value_name = "COMMAND")]
    inspect_tool: Option<String>,

    /// What to do when a child process fails or is interrupted
    #[arg(long = "on-error", value_enum, value_name = "POLICY")]
    on_error: Option<ErrorPolicy>,

    /// Machine-readable output for listings and probe results
    #[arg(long)]
    json: bool,

    /// Command name followed by its arguments
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    argv: Vec<String>,
}

impl Cli {
    /// CLI flags are the last layer (flag > env > file > defaults).
    fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(v) = &self.rpc_addr {
            cfg.rpc_addr = v.clone();
        }
        if let Some(v) = &self.http_url {
            cfg.http_url = v.clone();
        }
        if let Some(v) = &self.inspect_tool {
            cfg.inspect_tool = v.clone();
        }
        if let Some(v) = self.on_error {
            cfg.on_error = v;
        }
    }

    fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    utils::init_logging(utils::derive_level(cli.verbose, cli.quiet));

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::load(cli.config.as_deref(), |k| std::env::var(k).ok())?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;
    let policy = config.on_error;

    let launcher = TokioLauncher::new(config.http_timeout())?;
    let format = cli.format();
    let style = StyleOptions::detect();
    let ctx = Rc::new(Context {
        config,
        launcher: Rc::new(launcher),
        format,
        style: style.clone(),
    });
    let table = cmd::builtin_table(ctx)?;

    let mut stdout = std::io::stdout().lock();
    match cmd::dispatch(&table, &cli.argv, format, &style, &mut stdout) {
        Ok(Outcome::Listed) => Ok(ExitCode::SUCCESS),
        Ok(Outcome::Ran { name }) => {
            tracing::debug!(command = %name, "done");
            Ok(ExitCode::SUCCESS)
        }
        Err(DispatchError::UnknownCommand(name)) => {
            eprintln!("unknown command '{name}' (run without arguments to list commands)");
            Ok(ExitCode::from(UNKNOWN_COMMAND_EXIT))
        }
        Err(DispatchError::Command(err)) => match policy.absorb(err) {
            None => Ok(ExitCode::SUCCESS),
            Some(err) => {
                tracing::error!("{err}");
                Ok(ExitCode::from(err.exit_code()))
            }
        },
        Err(other) => Err(other.into()),
    }
}
