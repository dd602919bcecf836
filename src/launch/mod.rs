//! Process + HTTP launching.
//!
//! CommandLine   -> program + args (parse from shell-style text, display shell-quoted)
//! Launcher      -> the seam handlers and the probe go through (run / capture / spawn / fetch)
//! TokioLauncher -> real implementation on a current-thread tokio runtime;
//!                  Ctrl-C while a child runs kills it and reports `Interrupted`.

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use shell_words::split as shell_split;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::CommandError;

/// A program plus its argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Parse a shell-style command string (`"./run --fast"`, `"docker exec svc grpc_cli"`).
    ///
    /// Quoting follows POSIX shell rules; no expansion happens.
    pub fn parse(raw: &str) -> Result<Self, CommandError> {
        let bad = |reason: &str| CommandError::BadCommandLine {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(bad("command is empty"));
        }
        let mut parts = shell_split(trimmed).map_err(|e| bad(&e.to_string()))?;
        if parts.is_empty() || parts[0].is_empty() {
            return Err(bad("empty program name"));
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
        })
    }

    #[cfg(test)]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[cfg(test)]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str));
        f.write_str(&shell_words::join(words))
    }
}

/// Everything a handler may do to the outside world.
pub trait Launcher {
    /// Run to completion with inherited stdio; non-zero exit is an error.
    fn run(&self, cmd: &CommandLine) -> Result<(), CommandError>;

    /// Run to completion and return stdout (stderr stays on the terminal).
    fn capture(&self, cmd: &CommandLine) -> Result<String, CommandError>;

    /// Start without waiting; the child outlives this call. Its stdout is
    /// sent to our stderr so it never mixes with (or holds open) our stdout.
    fn spawn(&self, cmd: &CommandLine) -> Result<(), CommandError>;

    /// HTTP GET, returning the body of a 2xx response.
    fn fetch(&self, url: &str) -> Result<String, CommandError>;
}

/// Real launcher: tokio child processes + reqwest.
pub struct TokioLauncher {
    rt: tokio::runtime::Runtime,
    http: reqwest::Client,
}

impl TokioLauncher {
    pub fn new(http_timeout: Duration) -> Result<Self, CommandError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(CommandError::Runtime)?;
        let http = {
            let _guard = rt.enter();
            reqwest::Client::builder()
                .timeout(http_timeout)
                .build()
                .map_err(|source| CommandError::Http {
                    url: "<client>".into(),
                    source,
                })?
        };
        Ok(Self { rt, http })
    }
}

fn check_status(cmd: &CommandLine, status: ExitStatus) -> Result<(), CommandError> {
    trace!(command = %cmd, ?status, "child finished");
    if status.success() {
        Ok(())
    } else {
        Err(CommandError::NonZeroExit {
            command: cmd.to_string(),
            code: status.code(),
        })
    }
}

fn spawn_error(cmd: &CommandLine) -> impl FnOnce(std::io::Error) -> CommandError + '_ {
    move |source| CommandError::Spawn {
        command: cmd.to_string(),
        source,
    }
}

#[cfg(unix)]
fn detached_stdout() -> std::io::Result<Stdio> {
    use std::os::fd::AsFd;
    Ok(Stdio::from(std::io::stderr().as_fd().try_clone_to_owned()?))
}

#[cfg(not(unix))]
fn detached_stdout() -> std::io::Result<Stdio> {
    Ok(Stdio::null())
}

impl Launcher for TokioLauncher {
    fn run(&self, cmd: &CommandLine) -> Result<(), CommandError> {
        debug!(command = %cmd, "run");
        self.rt.block_on(async {
            let mut child = cmd
                .to_command()
                .kill_on_drop(true)
                .spawn()
                .map_err(spawn_error(cmd))?;
            tokio::select! {
                status = child.wait() => check_status(cmd, status.map_err(spawn_error(cmd))?),
                _ = tokio::signal::ctrl_c() => {
                    let _ = child.kill().await;
                    Err(CommandError::Interrupted { command: cmd.to_string() })
                }
            }
        })
    }

    fn capture(&self, cmd: &CommandLine) -> Result<String, CommandError> {
        debug!(command = %cmd, "capture");
        self.rt.block_on(async {
            let child = cmd
                .to_command()
                .stdout(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(spawn_error(cmd))?;
            // Dropping the output future on interrupt drops (and kills) the child.
            tokio::select! {
                output = child.wait_with_output() => {
                    let output = output.map_err(spawn_error(cmd))?;
                    check_status(cmd, output.status)?;
                    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
                }
                _ = tokio::signal::ctrl_c() => {
                    Err(CommandError::Interrupted { command: cmd.to_string() })
                }
            }
        })
    }

    fn spawn(&self, cmd: &CommandLine) -> Result<(), CommandError> {
        debug!(command = %cmd, "spawn (detached)");
        let _guard = self.rt.enter();
        let child = cmd
            .to_command()
            .stdout(detached_stdout().map_err(spawn_error(cmd))?)
            .spawn()
            .map_err(spawn_error(cmd))?;
        debug!(pid = ?child.id(), "service started");
        Ok(())
    }

    fn fetch(&self, url: &str) -> Result<String, CommandError> {
        debug!(url, "fetch");
        let http_err = |source| CommandError::Http {
            url: url.to_string(),
            source,
        };
        self.rt.block_on(async {
            let resp = self
                .http
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(http_err)?;
            resp.text().await.map_err(http_err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn launcher() -> TokioLauncher {
        TokioLauncher::new(Duration::from_secs(5)).unwrap()
    }

    /// Serve a single HTTP response on an ephemeral port; returns the URL.
    fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let mut seen = Vec::new();
                while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => seen.extend_from_slice(&buf[..n]),
                    }
                }
                let resp = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes());
            }
        });
        format!("http://127.0.0.1:{port}/")
    }

    fn closed_port_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}/")
    }

    #[test]
    fn parse_simple() {
        let cmd = CommandLine::parse("./run --fast").unwrap();
        assert_eq!(cmd.program(), "./run");
        assert_eq!(cmd.arguments(), ["--fast"]);
    }

    #[test]
    fn parse_quoted() {
        let cmd = CommandLine::parse(r#"grpc_cli call "name: 'ok'""#).unwrap();
        assert_eq!(cmd.arguments(), ["call", "name: 'ok'"]);
    }

    #[test]
    fn parse_rejects_empty_and_unbalanced() {
        assert!(CommandLine::parse("   ").is_err());
        assert!(CommandLine::parse("./run \"oops").is_err());
    }

    #[test]
    fn display_quotes_arguments() {
        let cmd = CommandLine::new("grpc_cli")
            .args(["call", "localhost:50051", "Shutdown"])
            .arg("");
        assert!(cmd.to_string().ends_with("Shutdown ''"));
        let reparsed = CommandLine::parse(&cmd.to_string()).unwrap();
        assert_eq!(reparsed, cmd);
    }

    #[cfg(unix)]
    #[test]
    fn run_reports_exit_status() {
        let l = launcher();
        l.run(&CommandLine::new("true")).unwrap();
        let err = l
            .run(&CommandLine::new("sh").args(["-c", "exit 3"]))
            .unwrap_err();
        assert!(matches!(err, CommandError::NonZeroExit { code: Some(3), .. }));
    }

    #[test]
    fn run_missing_program_is_spawn_error() {
        let err = launcher()
            .run(&CommandLine::new("svcctl-definitely-not-installed"))
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn capture_returns_stdout() {
        let out = launcher()
            .capture(&CommandLine::new("echo").arg("hi: ok"))
            .unwrap();
        assert_eq!(out.trim(), "hi: ok");
    }

    #[test]
    fn fetch_returns_body() {
        let url = serve_once("200 OK", "hi");
        assert_eq!(launcher().fetch(&url).unwrap(), "hi");
    }

    #[test]
    fn fetch_non_success_status_is_error() {
        let url = serve_once("503 Service Unavailable", "later");
        let err = launcher().fetch(&url).unwrap_err();
        assert!(matches!(err, CommandError::Http { .. }));
    }

    #[test]
    fn fetch_refused_is_error() {
        let err = launcher().fetch(&closed_port_url()).unwrap_err();
        assert!(matches!(err, CommandError::Http { .. }));
    }
}
