/*!
`builtin.rs`

The commands `svcctl` ships with, declared as one list and registered into a
`CommandTable` at startup.

  test      echo test
  list      <tool> list <addr>
  ping      <tool> call <addr> Ping <ping_request>
  ping2     <tool> call <addr> Ping2 <ping_request>
  shutdown  <tool> call <addr> Shutdown ''
  run / r   scripts.run  + args
  t         scripts.test + args
  dbg       scripts.dbg  (no args)
  refresh   scripts.refresh + args
  c         GET http_url, ping x3, shutdown
  a         feature_method, shutdown
  probe     start the service, wait for HTTP, verify Ping

Composite commands stop at the first failing step.
*/

use std::io::Write;
use std::rc::Rc;

use clap::Parser;
use tracing::debug;

use crate::cmd::format::{OutputFormat, StyleOptions, render_probe};
use crate::cmd::registry::CommandTable;
use crate::config::Config;
use crate::error::{CommandError, DispatchError};
use crate::grpc::{InspectTool, methods};
use crate::launch::{CommandLine, Launcher};
use crate::probe::{ProbeSettings, run_probe};

/// How many pings the `c` command sends before shutting down.
const COMPOSITE_PINGS: usize = 3;

/// Everything handlers share.
pub struct Context {
    pub config: Config,
    pub launcher: Rc<dyn Launcher>,
    pub format: OutputFormat,
    pub style: StyleOptions,
}

type Action = fn(&Builtins, &[String]) -> Result<(), CommandError>;

const BUILTINS: &[(&str, &str, Action)] = &[
    ("test", "echo through the dispatcher", Builtins::test),
    ("list", "list the service's RPC methods", Builtins::list),
    ("ping", "call Ping with the configured request", Builtins::ping),
    ("ping2", "call Ping2 with the configured request", Builtins::ping2),
    ("shutdown", "ask the service to shut down", Builtins::shutdown),
    ("run", "start the local run script", Builtins::run),
    ("r", "alias for run", Builtins::run),
    ("t", "start the local test runner", Builtins::test_runner),
    ("dbg", "attach the debugger script", Builtins::dbg),
    ("refresh", "start the local refresh script", Builtins::refresh),
    ("c", "fetch http, ping x3, then shutdown", Builtins::check_cycle),
    ("a", "call the feature-test RPC, then shutdown", Builtins::feature),
    ("probe", "start the service and verify it answers", Builtins::probe),
];

struct Builtins {
    ctx: Rc<Context>,
    tool: InspectTool,
    run_script: CommandLine,
    test_script: CommandLine,
    dbg_script: CommandLine,
    refresh_script: CommandLine,
}

/// Build the table of built-in commands for `ctx`.
pub fn builtin_table(ctx: Rc<Context>) -> Result<CommandTable, DispatchError> {
    let cfg = &ctx.config;
    let builtins = Rc::new(Builtins {
        tool: InspectTool::new(&cfg.inspect_tool, cfg.rpc_addr.clone())?,
        run_script: CommandLine::parse(&cfg.scripts.run)?,
        test_script: CommandLine::parse(&cfg.scripts.test)?,
        dbg_script: CommandLine::parse(&cfg.scripts.dbg)?,
        refresh_script: CommandLine::parse(&cfg.scripts.refresh)?,
        ctx: ctx.clone(),
    });

    let mut table = CommandTable::new();
    for &(name, summary, action) in BUILTINS {
        let b = builtins.clone();
        table.register(name, summary, move |args| action(&b, args))?;
    }
    Ok(table)
}

impl Builtins {
    fn launcher(&self) -> &dyn Launcher {
        self.ctx.launcher.as_ref()
    }

    fn call(&self, method: &str, request: &str) -> Result<(), CommandError> {
        self.launcher().run(&self.tool.call(method, request))
    }

    fn ping_request(&self) -> &str {
        &self.ctx.config.ping_request
    }

    fn test(&self, _: &[String]) -> Result<(), CommandError> {
        self.launcher().run(&CommandLine::new("echo").arg("test"))
    }

    fn list(&self, _: &[String]) -> Result<(), CommandError> {
        self.launcher().run(&self.tool.list())
    }

    fn ping(&self, _: &[String]) -> Result<(), CommandError> {
        self.call(methods::PING, self.ping_request())
    }

    fn ping2(&self, _: &[String]) -> Result<(), CommandError> {
        self.call(methods::PING2, self.ping_request())
    }

    fn shutdown(&self, _: &[String]) -> Result<(), CommandError> {
        self.call(methods::SHUTDOWN, "")
    }

    fn run(&self, args: &[String]) -> Result<(), CommandError> {
        self.launcher()
            .run(&self.run_script.clone().args(args.iter().cloned()))
    }

    fn test_runner(&self, args: &[String]) -> Result<(), CommandError> {
        self.launcher()
            .run(&self.test_script.clone().args(args.iter().cloned()))
    }

    fn dbg(&self, args: &[String]) -> Result<(), CommandError> {
        if !args.is_empty() {
            debug!(?args, "dbg takes no arguments; ignoring");
        }
        self.launcher().run(&self.dbg_script)
    }

    fn refresh(&self, args: &[String]) -> Result<(), CommandError> {
        self.launcher()
            .run(&self.refresh_script.clone().args(args.iter().cloned()))
    }

    fn check_cycle(&self, args: &[String]) -> Result<(), CommandError> {
        let body = self.launcher().fetch(&self.ctx.config.http_url)?;
        write_stdout(&body)?;
        for _ in 0..COMPOSITE_PINGS {
            self.ping(args)?;
        }
        self.shutdown(args)
    }

    fn feature(&self, args: &[String]) -> Result<(), CommandError> {
        let cfg = &self.ctx.config;
        self.call(&cfg.feature_method, &cfg.feature_request)?;
        self.shutdown(args)
    }

    fn probe(&self, args: &[String]) -> Result<(), CommandError> {
        let opts = match ProbeArgs::try_parse_from(args) {
            Ok(opts) => opts,
            // --help lands here too
            Err(e) if !e.use_stderr() => return write_stdout(e.to_string().trim_end()),
            Err(e) => return Err(CommandError::Usage(e.to_string())),
        };

        let mut settings = ProbeSettings::from_config(&self.ctx.config)?;
        if let Some(service) = &opts.service {
            settings.service = CommandLine::parse(service)?;
        }
        if let Some(attempts) = opts.attempts {
            if attempts == 0 {
                return Err(CommandError::Usage("--attempts must be at least 1".into()));
            }
            settings.attempts = attempts;
        }

        let result = run_probe(self.launcher(), &settings)?;
        write_stdout(&render_probe(&result, self.ctx.format, &self.ctx.style))?;

        if opts.shutdown {
            self.shutdown(&[])?;
        }
        Ok(())
    }
}

fn write_stdout(text: &str) -> Result<(), CommandError> {
    write_line(&mut std::io::stdout().lock(), text)
}

/// A closed pipe downstream (`svcctl c | head -c0`) is an error, not a panic.
fn write_line(out: &mut dyn Write, text: &str) -> Result<(), CommandError> {
    writeln!(out, "{text}")
        .and_then(|()| out.flush())
        .map_err(CommandError::Output)
}

/// Arguments accepted by `svcctl probe`.
#[derive(Parser, Debug)]
#[command(name = "probe", no_binary_name = true, disable_version_flag = true)]
struct ProbeArgs {
    /// Call Shutdown once the probe succeeds
    #[arg(long)]
    shutdown: bool,

    /// Override probe.attempts
    #[arg(long, value_name = "N")]
    attempts: Option<u32>,

    /// Override probe.service (shell-style command)
    #[arg(long, value_name = "COMMAND")]
    service: Option<String>,
}
