/*!
Readiness + Ping probe against a freshly started service.

Flow:
  1. spawn the service (detached; not waited on, not killed)
  2. wait_ready: up to `attempts` HTTP GETs, each preceded by `delay`;
     a failed request moves on to the next attempt, the first successful
     response must carry `expected_body` and ends the loop
  3. check_ping: `rpc_repeats` JSON Ping calls, each reply's `message`
     must equal `expected_message`

Nothing after a failed step runs: a service that never answers produces
`NotReady` and no RPC is issued.
*/

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::CommandError;
use crate::grpc::{InspectTool, decode_reply, methods, reply_message};
use crate::launch::{CommandLine, Launcher};

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub service: CommandLine,
    pub http_url: String,
    pub attempts: u32,
    pub delay: Duration,
    pub expected_body: String,
    pub ping: CommandLine,
    pub expected_message: String,
    pub rpc_repeats: u32,
}

impl ProbeSettings {
    pub fn from_config(cfg: &Config) -> Result<Self, CommandError> {
        let tool = InspectTool::new(&cfg.inspect_tool, cfg.rpc_addr.clone())?;
        Ok(Self {
            service: CommandLine::parse(&cfg.probe.service)?,
            http_url: cfg.http_url.clone(),
            attempts: cfg.probe.attempts,
            delay: Duration::from_millis(cfg.probe.delay_ms),
            expected_body: cfg.probe.expected_body.clone(),
            ping: tool.call_json(methods::PING, &cfg.ping_request),
            expected_message: cfg.probe.expected_message.clone(),
            rpc_repeats: cfg.probe.rpc_repeats,
        })
    }
}

/// Outcome of one probe run.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    /// 1-based attempt that saw the service ready (0 = never polled)
    pub attempt: u32,
    pub http_body: Option<String>,
    pub rpc_responses: Vec<Value>,
}

pub fn run_probe(
    launcher: &dyn Launcher,
    settings: &ProbeSettings,
) -> Result<ProbeResult, CommandError> {
    info!(service = %settings.service, "starting service");
    launcher.spawn(&settings.service)?;

    let (attempt, body) = wait_ready(
        launcher,
        &settings.http_url,
        settings.attempts,
        settings.delay,
        &settings.expected_body,
    )?;
    info!(attempt, "service ready");

    let mut result = ProbeResult {
        attempt,
        http_body: Some(body),
        rpc_responses: Vec::with_capacity(settings.rpc_repeats as usize),
    };
    for n in 1..=settings.rpc_repeats {
        let reply = check_ping(launcher, &settings.ping, &settings.expected_message)?;
        debug!(n, "ping reply matched");
        result.rpc_responses.push(reply);
    }
    Ok(result)
}

/// Poll `url` until it answers; returns the attempt number and the (trimmed) body.
pub fn wait_ready(
    launcher: &dyn Launcher,
    url: &str,
    attempts: u32,
    delay: Duration,
    expected_body: &str,
) -> Result<(u32, String), CommandError> {
    for attempt in 1..=attempts {
        std::thread::sleep(delay);
        let body = match launcher.fetch(url) {
            Ok(body) => body,
            Err(e) => {
                debug!(attempt, error = %e, "not ready yet");
                continue;
            }
        };
        let body = body.trim().to_string();
        if body != expected_body {
            return Err(CommandError::BodyMismatch {
                expected: expected_body.to_string(),
                actual: body,
            });
        }
        return Ok((attempt, body));
    }
    Err(CommandError::NotReady {
        url: url.to_string(),
        attempts,
    })
}

/// Issue one JSON Ping and require the expected `message`.
pub fn check_ping(
    launcher: &dyn Launcher,
    ping: &CommandLine,
    expected_message: &str,
) -> Result<Value, CommandError> {
    let out = launcher.capture(ping)?;
    let reply = decode_reply(&out)?;
    let message = reply_message(&reply)?;
    if message != expected_message {
        return Err(CommandError::MessageMismatch {
            expected: expected_message.to_string(),
            actual: message.to_string(),
        });
    }
    Ok(reply)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted launcher shared by the probe and built-in command tests.

    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Step {
        Run(CommandLine),
        Capture(CommandLine),
        Spawn(CommandLine),
        Fetch(String),
    }

    /// Records every call; answers from scripted queues.
    ///
    /// Empty queues answer with success (`run`/`spawn`), `{"message":"hi: ok"}`
    /// (`capture`) and a refused connection (`fetch`).
    #[derive(Default)]
    pub struct ScriptedLauncher {
        pub steps: RefCell<Vec<Step>>,
        pub fetches: RefCell<VecDeque<Result<String, ()>>>,
        pub captures: RefCell<VecDeque<String>>,
        /// `run` calls (0-based, counting only runs) that exit non-zero
        pub failing_runs: Vec<usize>,
    }

    impl ScriptedLauncher {
        pub fn steps(&self) -> Vec<Step> {
            self.steps.borrow().clone()
        }

        pub fn with_fetches(self, answers: Vec<Result<&str, ()>>) -> Self {
            *self.fetches.borrow_mut() = answers
                .into_iter()
                .map(|r| r.map(str::to_string))
                .collect();
            self
        }

        pub fn with_captures(self, answers: Vec<&str>) -> Self {
            *self.captures.borrow_mut() = answers.into_iter().map(str::to_string).collect();
            self
        }

        fn runs_so_far(&self) -> usize {
            self.steps
                .borrow()
                .iter()
                .filter(|s| matches!(s, Step::Run(_)))
                .count()
        }
    }

    impl Launcher for ScriptedLauncher {
        fn run(&self, cmd: &CommandLine) -> Result<(), CommandError> {
            let index = self.runs_so_far();
            self.steps.borrow_mut().push(Step::Run(cmd.clone()));
            if self.failing_runs.contains(&index) {
                return Err(CommandError::NonZeroExit {
                    command: cmd.to_string(),
                    code: Some(1),
                });
            }
            Ok(())
        }

        fn capture(&self, cmd: &CommandLine) -> Result<String, CommandError> {
            self.steps.borrow_mut().push(Step::Capture(cmd.clone()));
            Ok(self
                .captures
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| r#"{"message": "hi: ok"}"#.to_string()))
        }

        fn spawn(&self, cmd: &CommandLine) -> Result<(), CommandError> {
            self.steps.borrow_mut().push(Step::Spawn(cmd.clone()));
            Ok(())
        }

        fn fetch(&self, url: &str) -> Result<String, CommandError> {
            self.steps.borrow_mut().push(Step::Fetch(url.to_string()));
            match self.fetches.borrow_mut().pop_front() {
                Some(Ok(body)) => Ok(body),
                Some(Err(())) | None => Err(CommandError::NotReady {
                    url: url.to_string(),
                    attempts: 1,
                }),
            }
        }
    }
}
