use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<bool> = OnceCell::new();

const CRATE_TARGET: &str = "reasoning_stream";
const DEFAULT_JSON_LOG_FILE: &str = "reasoning-stream.logs.jsonl";

/// Where log records go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogOutput {
    /// Compact lines on stderr, leaving stdout to the snapshot consumer.
    Console,
    /// JSONL records appended to a file. Each record carries the
    /// `reconstruct` span with its `stream_id`.
    JsonFile(PathBuf),
}

/// Resolved logging settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    /// `EnvFilter` directive string.
    pub filter: String,
    pub output: LogOutput,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: scoped_filter("info"),
            output: LogOutput::Console,
        }
    }
}

impl LogSettings {
    /// Reads settings from the process environment.
    ///
    /// - `REASONING_STREAM_OBSERVABILITY`: `0`/`false`/`off` disables setup.
    /// - `REASONING_STREAM_LOG_LEVEL`: a bare level applies to this crate
    ///   only (`debug` becomes `warn,reasoning_stream=debug`); a full
    ///   directive is used as given.
    /// - `RUST_LOG`: used verbatim when the above is unset.
    /// - `REASONING_STREAM_JSON_LOG_PATH`: switch to JSONL file output.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("REASONING_STREAM_OBSERVABILITY")
            .and_then(|value| parse_bool(&value))
            .unwrap_or(true);

        let filter = match lookup("REASONING_STREAM_LOG_LEVEL").map(|v| v.trim().to_string()) {
            Some(level) if is_bare_level(&level) => scoped_filter(&level),
            Some(directive) if !directive.is_empty() => directive,
            _ => lookup("RUST_LOG")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| scoped_filter("info")),
        };

        let output = match lookup("REASONING_STREAM_JSON_LOG_PATH") {
            Some(path) if !path.trim().is_empty() => LogOutput::JsonFile(PathBuf::from(path)),
            _ => LogOutput::Console,
        };

        Self {
            enabled,
            filter,
            output,
        }
    }

    fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        tracing_subscriber::EnvFilter::try_new(&self.filter)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(scoped_filter("info")))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn is_bare_level(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    )
}

/// Keeps HTTP and runtime crates at `warn` while this crate logs at `level`.
fn scoped_filter(level: &str) -> String {
    format!("warn,{CRATE_TARGET}={}", level.to_ascii_lowercase())
}

fn json_writer(path: &Path) -> tracing_appender::rolling::RollingFileAppender {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let _ = std::fs::create_dir_all(dir);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_JSON_LOG_FILE);
    tracing_appender::rolling::never(dir, file_name)
}

/// Installs a global subscriber from [`LogSettings::from_env`] once per
/// process.
pub fn init_observability() -> bool {
    init_with(LogSettings::from_env())
}

/// Installs a global subscriber from explicit settings.
///
/// Only the first call in a process has an effect. Returns `true` if that
/// call installed a subscriber; `false` when logging is disabled or another
/// subscriber was already set.
pub fn init_with(settings: LogSettings) -> bool {
    *INIT.get_or_init(|| {
        if !settings.enabled {
            return false;
        }
        let filter = settings.env_filter();
        match &settings.output {
            LogOutput::JsonFile(path) => {
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_writer(json_writer(path));
                tracing_subscriber::registry()
                    .with(filter)
                    .with(json_layer)
                    .try_init()
                    .is_ok()
            }
            LogOutput::Console => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                tracing_subscriber::registry()
                    .with(filter)
                    .with(console_layer)
                    .try_init()
                    .is_ok()
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_log_this_crate_at_info() {
        let resolved = settings(&[]);
        assert_eq!(resolved, LogSettings::default());
        assert_eq!(resolved.filter, "warn,reasoning_stream=info");
    }

    #[test]
    fn bare_level_is_scoped_to_this_crate() {
        let resolved = settings(&[("REASONING_STREAM_LOG_LEVEL", " DEBUG ")]);
        assert_eq!(resolved.filter, "warn,reasoning_stream=debug");
    }

    #[test]
    fn full_directive_is_used_verbatim() {
        let resolved = settings(&[
            ("REASONING_STREAM_LOG_LEVEL", "reasoning_stream::run=trace"),
            ("RUST_LOG", "error"),
        ]);
        assert_eq!(resolved.filter, "reasoning_stream::run=trace");
        assert_eq!(settings(&[("RUST_LOG", "hyper=info")]).filter, "hyper=info");
    }

    #[test]
    fn json_path_and_disable_flag() {
        let resolved = settings(&[
            ("REASONING_STREAM_OBSERVABILITY", "off"),
            ("REASONING_STREAM_JSON_LOG_PATH", "logs/run.jsonl"),
        ]);
        assert!(!resolved.enabled);
        assert_eq!(resolved.output, LogOutput::JsonFile(PathBuf::from("logs/run.jsonl")));
        assert!(settings(&[("REASONING_STREAM_OBSERVABILITY", "maybe")]).enabled);
    }

    #[test]
    fn init_runs_once() {
        let disabled = LogSettings {
            enabled: false,
            ..LogSettings::default()
        };
        let first = init_with(disabled);
        assert_eq!(init_with(LogSettings::default()), first);
        tracing::debug!("observability initialized twice without panicking");
    }
}
