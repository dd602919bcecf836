/*!
Layered configuration for `svcctl`.

Precedence (lowest -> highest):
  1. built-in defaults (the addresses / payloads of the local dev service)
  2. YAML file: `--config <PATH>`, else `$SVCCTL_CONFIG`, else `./svcctl.yaml` if present
  3. environment: SVCCTL_RPC_ADDR, SVCCTL_HTTP_URL, SVCCTL_INSPECT_TOOL, SVCCTL_ON_ERROR
  4. CLI flags (applied by `main`)

Example file:

  rpc_addr: "localhost:50051"
  http_url: "http://localhost:8000/"
  on_error: swallow
  scripts:
    run: "./run --release"
  probe:
    service: "./build/bapid"
    attempts: 5
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ErrorPolicy;
use crate::launch::CommandLine;

pub const CONFIG_ENV: &str = "SVCCTL_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "svcctl.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// gRPC endpoint handed to the inspection tool
    pub rpc_addr: String,
    /// HTTP health endpoint
    pub http_url: String,
    /// RPC inspection tool (shell-style command)
    pub inspect_tool: String,
    /// Text-format request sent with Ping / Ping2
    pub ping_request: String,
    /// Method invoked by the `a` command
    pub feature_method: String,
    pub feature_request: String,
    /// Timeout for a single HTTP request, in milliseconds
    pub http_timeout_ms: u64,
    pub scripts: Scripts,
    pub on_error: ErrorPolicy,
    pub probe: ProbeConfig,
}

/// Local developer scripts, each a shell-style command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scripts {
    pub run: String,
    pub test: String,
    pub dbg: String,
    pub refresh: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    /// Service binary started by the probe
    pub service: String,
    pub attempts: u32,
    pub delay_ms: u64,
    pub expected_body: String,
    pub expected_message: String,
    pub rpc_repeats: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_addr: "localhost:50051".into(),
            http_url: "http://localhost:8000/".into(),
            inspect_tool: "grpc_cli".into(),
            ping_request: "name: 'ok'".into(),
            feature_method: "FeatureTest".into(),
            feature_request: String::new(),
            http_timeout_ms: 2_000,
            scripts: Scripts::default(),
            on_error: ErrorPolicy::default(),
            probe: ProbeConfig::default(),
        }
    }
}

impl Default for Scripts {
    fn default() -> Self {
        Self {
            run: "./run".into(),
            test: "./test".into(),
            dbg: "./dbg".into(),
            refresh: "./refresh".into(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            service: "./bapid".into(),
            attempts: 3,
            delay_ms: 1_000,
            expected_body: "hi".into(),
            expected_message: "hi: ok".into(),
            rpc_repeats: 3,
        }
    }
}

impl Config {
    /// Resolve the config file (if any), read it, then apply environment overrides.
    ///
    /// `env` is a lookup function so tests don't have to touch the process environment.
    pub fn load(explicit: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = match resolve_path(explicit, &env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_env(&env)?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid config file: {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an all-defaults map.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("failed to parse YAML config")
    }

    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("SVCCTL_RPC_ADDR") {
            self.rpc_addr = v;
        }
        if let Some(v) = non_empty("SVCCTL_HTTP_URL") {
            self.http_url = v;
        }
        if let Some(v) = non_empty("SVCCTL_INSPECT_TOOL") {
            self.inspect_tool = v;
        }
        if let Some(v) = non_empty("SVCCTL_ON_ERROR") {
            self.on_error = <ErrorPolicy as clap::ValueEnum>::from_str(v.trim(), true)
                .map_err(|e| anyhow::anyhow!("SVCCTL_ON_ERROR: {e}"))?;
        }
        Ok(())
    }

    /// Reject values that would only fail later, deep inside a handler.
    pub fn validate(&self) -> Result<()> {
        if self.rpc_addr.trim().is_empty() {
            bail!("rpc_addr cannot be empty");
        }
        let url = Url::parse(&self.http_url)
            .with_context(|| format!("http_url is not a valid URL: '{}'", self.http_url))?;
        // The HTTP client is built without TLS.
        if url.scheme() != "http" {
            bail!("http_url must be a plain http:// URL, got '{}'", url.scheme());
        }
        if self.probe.attempts == 0 {
            bail!("probe.attempts must be at least 1");
        }
        if self.feature_method.trim().is_empty() {
            bail!("feature_method cannot be empty");
        }
        let commands = [
            ("inspect_tool", &self.inspect_tool),
            ("scripts.run", &self.scripts.run),
            ("scripts.test", &self.scripts.test),
            ("scripts.dbg", &self.scripts.dbg),
            ("scripts.refresh", &self.scripts.refresh),
            ("probe.service", &self.probe.service),
        ];
        for (field, raw) in commands {
            CommandLine::parse(raw).with_context(|| format!("invalid {field}"))?;
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

fn resolve_path(
    explicit: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Some(p) = env(CONFIG_ENV).filter(|p| !p.trim().is_empty()) {
        return Some(PathBuf::from(p));
    }
    let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
    fallback.is_file().then_some(fallback)
}
