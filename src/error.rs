//! Error taxonomy for dispatching and running commands.
//!
//! DispatchError -> name resolution / registration problems (wraps CommandError)
//! CommandError  -> anything a handler or the probe can fail with
//! ErrorPolicy   -> propagate (default) or swallow non-zero exits / interrupts

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exit status used when the requested command is not registered.
pub const UNKNOWN_COMMAND_EXIT: u8 = 2;

/// Exit status for a malformed command line handed to a built-in (`probe --attempts x`).
pub const USAGE_EXIT: u8 = 2;

/// Exit status used when the user interrupts a running child (128 + SIGINT).
pub const INTERRUPTED_EXIT: u8 = 130;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}", describe_code(.code))]
    NonZeroExit { command: String, code: Option<i32> },

    #[error("`{command}` was interrupted")]
    Interrupted { command: String },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server not started after {attempts} attempt(s) at {url}")]
    NotReady { url: String, attempts: u32 },

    #[error("unexpected response body: expected {expected:?}, got {actual:?}")]
    BodyMismatch { expected: String, actual: String },

    #[error("failed to decode JSON reply: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
    },

    #[error("reply has no string field `{field}`")]
    MissingField { field: &'static str },

    #[error("unexpected `message`: expected {expected:?}, got {actual:?}")]
    MessageMismatch { expected: String, actual: String },

    #[error("invalid command line {raw:?}: {reason}")]
    BadCommandLine { raw: String, reason: String },

    #[error("{0}")]
    Usage(String),

    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no status (killed by signal)".to_string(),
    }
}

impl CommandError {
    /// Process exit status the binary reports for this error under the
    /// propagate policy.
    pub fn exit_code(&self) -> u8 {
        match self {
            CommandError::NonZeroExit { code: Some(c), .. } => {
                u8::try_from(*c).ok().filter(|c| *c != 0).unwrap_or(1)
            }
            CommandError::Interrupted { .. } => INTERRUPTED_EXIT,
            CommandError::Usage(_) => USAGE_EXIT,
            _ => 1,
        }
    }

    /// Errors the swallow policy is allowed to absorb.
    pub fn is_swallowable(&self) -> bool {
        matches!(
            self,
            CommandError::NonZeroExit { .. } | CommandError::Interrupted { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("command name cannot be empty")]
    EmptyName,

    #[error("failed to write command listing: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// What to do with a failed child process once it reaches the top level.
#[derive(clap::ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Abort and report the failure through the exit status
    #[default]
    Propagate,
    /// Treat non-zero child exits and user interrupts as a clean exit
    Swallow,
}

impl ErrorPolicy {
    /// Returns `None` when the error is absorbed by this policy.
    pub fn absorb(self, err: CommandError) -> Option<CommandError> {
        match self {
            ErrorPolicy::Swallow if err.is_swallowable() => {
                tracing::debug!(error = %err, "swallowed by error policy");
                None
            }
            _ => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_zero(code: Option<i32>) -> CommandError {
        CommandError::NonZeroExit {
            command: "grpc_cli list localhost:50051".into(),
            code,
        }
    }

    #[test]
    fn exit_code_follows_child_status() {
        assert_eq!(non_zero(Some(3)).exit_code(), 3);
        assert_eq!(non_zero(None).exit_code(), 1, "signal death maps to 1");
        assert_eq!(non_zero(Some(256)).exit_code(), 1, "out of range maps to 1");
        assert_eq!(
            CommandError::Interrupted {
                command: "./run".into()
            }
            .exit_code(),
            INTERRUPTED_EXIT
        );
        assert_eq!(
            CommandError::NotReady {
                url: "http://localhost:8000/".into(),
                attempts: 3
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn usage_and_output_errors() {
        assert_eq!(CommandError::Usage("bad --attempts".into()).exit_code(), USAGE_EXIT);
        let pipe = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
        let err = CommandError::Output(pipe);
        assert_eq!(err.exit_code(), 1);
        assert!(!err.is_swallowable());
    }

    #[test]
    fn propagate_keeps_every_error() {
        assert!(ErrorPolicy::Propagate.absorb(non_zero(Some(1))).is_some());
    }

    #[test]
    fn swallow_absorbs_only_exit_and_interrupt() {
        assert!(ErrorPolicy::Swallow.absorb(non_zero(Some(1))).is_none());
        assert!(
            ErrorPolicy::Swallow
                .absorb(CommandError::Interrupted {
                    command: "./dbg".into()
                })
                .is_none()
        );
        let kept = ErrorPolicy::Swallow.absorb(CommandError::MissingField { field: "message" });
        assert!(matches!(kept, Some(CommandError::MissingField { .. })));
    }

    #[test]
    fn non_zero_message_mentions_status() {
        assert!(non_zero(Some(7)).to_string().contains("status 7"));
        assert!(non_zero(None).to_string().contains("signal"));
    }
}
