/*!
format.rs

Human / JSON rendering for the command listing and probe results.

  - StyleOptions::detect() honours NO_COLOR and COLUMNS
  - color(role, text, &style)
  - render_listing(table, format, &style)
  - render_probe(result, format, &style)

Nothing here prints; callers decide where output goes.
*/

use crate::cmd::registry::CommandTable;
use crate::probe::ProbeResult;

/// Output mode selected with `--json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub use_color: bool,
    pub term_width: usize,
}

impl StyleOptions {
    pub fn detect() -> Self {
        let mut style = Self::plain();
        style.use_color = std::env::var_os("NO_COLOR").is_none();
        if let Some(width) = std::env::var("COLUMNS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            style.term_width = width.clamp(40, 220);
        }
        style
    }

    pub fn plain() -> Self {
        Self {
            use_color: false,
            term_width: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Primary,
    Accent,
    Success,
    Dim,
}

pub fn color(role: Role, text: impl AsRef<str>, style: &StyleOptions) -> String {
    if !style.use_color {
        return text.as_ref().to_string();
    }
    let code = match role {
        Role::Primary => "38;5;45",
        Role::Accent => "38;5;213",
        Role::Success => "38;5;82",
        Role::Dim => "2",
    };
    format!("\x1b[{code}m{}\x1b[0m", text.as_ref())
}

fn truncate_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Listing printed when no command is given.
pub fn render_listing(
    table: &CommandTable,
    format: OutputFormat,
    style: &StyleOptions,
) -> String {
    if format == OutputFormat::Json {
        let commands: Vec<_> = table
            .entries()
            .iter()
            .map(|e| serde_json::json!({ "name": e.name(), "summary": e.summary() }))
            .collect();
        return serde_json::json!({
            "status": "ok",
            "count": table.len(),
            "commands": commands,
        })
        .to_string();
    }

    if table.is_empty() {
        return color(Role::Dim, "No commands registered", style);
    }

    let name_width = table.names().map(|n| n.chars().count()).max().unwrap_or(0);
    let summary_width = style.term_width.saturating_sub(name_width + 4).max(10);

    let mut lines = Vec::with_capacity(table.len() + 1);
    lines.push(color(
        Role::Primary,
        format!("Commands ({})", table.len()),
        style,
    ));
    for e in table.entries() {
        let padded = format!("{:<name_width$}", e.name());
        let summary = truncate_ellipsis(e.summary(), summary_width);
        let line = if summary.is_empty() {
            format!("  {}", color(Role::Accent, padded.trim_end(), style))
        } else {
            format!(
                "  {}  {}",
                color(Role::Accent, padded, style),
                color(Role::Dim, summary, style)
            )
        };
        lines.push(line);
    }
    lines.join("\n")
}

pub fn render_probe(
    result: &ProbeResult,
    format: OutputFormat,
    style: &StyleOptions,
) -> String {
    if format == OutputFormat::Json {
        let body = serde_json::json!({ "status": "ok", "probe": result });
        return serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
    }
    let mut lines = vec![color(
        Role::Success,
        format!("service ready after attempt {}", result.attempt),
        style,
    )];
    if let Some(body) = &result.http_body {
        lines.push(format!("  http body: {body:?}"));
    }
    for (i, reply) in result.rpc_responses.iter().enumerate() {
        lines.push(format!("  ping #{}: {reply}", i + 1));
    }
    lines.join("\n")
}
