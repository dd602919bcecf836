//! RPC inspection tool wrapper (`grpc_cli`-compatible).
//!
//! InspectTool::list       -> `<tool> list <addr>`
//! InspectTool::call       -> `<tool> call <addr> <method> <request>`
//! InspectTool::call_json  -> `<tool> call --json_output <addr> <method> <request>`
//! decode_reply / reply_message -> JSON reply handling for `--json_output`
//!
use serde_json::Value;

use crate::error::CommandError;
use crate::launch::CommandLine;

/// Methods exposed by the service that the built-in commands use.
pub mod methods {
    pub const PING: &str = "Ping";
    pub const PING2: &str = "Ping2";
    pub const SHUTDOWN: &str = "Shutdown";
}

/// Builds command lines for the inspection tool against one service address.
#[derive(Debug, Clone)]
pub struct InspectTool {
    tool: CommandLine,
    addr: String,
}

impl InspectTool {
    /// `tool` may carry its own prefix arguments (`"docker exec svc grpc_cli"`).
    pub fn new(tool: &str, addr: impl Into<String>) -> Result<Self, CommandError> {
        Ok(Self {
            tool: CommandLine::parse(tool)?,
            addr: addr.into(),
        })
    }

    pub fn list(&self) -> CommandLine {
        self.tool.clone().args(["list", self.addr.as_str()])
    }

    pub fn call(&self, method: &str, request: &str) -> CommandLine {
        self.tool
            .clone()
            .args(["call", self.addr.as_str(), method, request])
    }

    pub fn call_json(&self, method: &str, request: &str) -> CommandLine {
        self.tool
            .clone()
            .args(["call", "--json_output", self.addr.as_str(), method, request])
    }
}

/// Decode the JSON the tool prints with `--json_output`.
///
/// The tool may print a trailing status line ("Rpc succeeded with OK status")
/// on stdout on some builds, so only the first JSON value is taken.
pub fn decode_reply(raw: &str) -> Result<Value, CommandError> {
    let mut stream = serde_json::Deserializer::from_str(raw.trim()).into_iter::<Value>();
    match stream.next() {
        Some(v) => v.map_err(|source| CommandError::Decode { source }),
        None => serde_json::from_str::<Value>("")
            .map_err(|source| CommandError::Decode { source }),
    }
}

/// Extract the `message` field of a Ping reply.
pub fn reply_message(reply: &Value) -> Result<&str, CommandError> {
    reply
        .get("message")
        .and_then(|v| v.as_str())
        .ok_or(CommandError::MissingField { field: "message" })
}
