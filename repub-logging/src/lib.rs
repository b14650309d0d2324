//! Environment-driven `tracing` setup for the registry server.
//!
//! The subscriber is configured from a handful of environment variables:
//!
//! - `LOG_LEVEL`: default filter directive (`info`), overridden by `RUST_LOG`
//! - `LOG_FORMAT`: `human` or `json`
//! - `LOG_OUTPUT`: `console`, `file` or `both`
//! - `LOG_FILE_PATH`: target of the daily rolling file appender

use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, registry, EnvFilter};

const DEFAULT_LOG_FILE: &str = "/tmp/repub-server.log";

// --- Custom "Tee" Writer ---
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A, B> Write for Tee<A, B>
where
    A: Write,
    B: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write(buf);
        let res_b = self.b.write(buf);
        res_a.or(res_b)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B, W1, W2> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a, Writer = W1>,
    B: MakeWriter<'a, Writer = W2>,
    W1: Write + 'a,
    W2: Write + 'a,
{
    type Writer = Tee<W1, W2>;
    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

/// Where formatted log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
    /// Filtering only, no formatting layer.
    None,
}

/// Line format of the formatting layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub output: LogOutput,
    pub format: LogFormat,
    pub file_path: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Console,
            format: LogFormat::Human,
            file_path: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl LogSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    ///
    /// Unknown values fall back to the defaults instead of failing, logging
    /// must never keep the server from starting.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let level = lookup("LOG_LEVEL")
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .map(|v| if v == "warning" { "warn".to_string() } else { v })
            .unwrap_or(defaults.level);

        let output = match lookup("LOG_OUTPUT").as_deref().map(str::trim) {
            Some("file") => LogOutput::File,
            Some("both") => LogOutput::Both,
            Some("none") => LogOutput::None,
            _ => LogOutput::Console,
        };

        let format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Human,
        };

        let file_path = lookup("LOG_FILE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.file_path);

        Self {
            level,
            output,
            format,
            file_path,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        for directive in ["tokio=warn", "hyper=warn"] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    }

    fn file_target(&self) -> (PathBuf, PathBuf) {
        let log_dir = self
            .file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("/tmp"))
            .to_path_buf();
        let log_filename = self
            .file_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("repub-server.log"));
        (log_dir, log_filename)
    }
}

/// Initializes the global tracing subscriber based on environment variables.
///
/// The returned guard must be held for the lifetime of the process when file
/// output is enabled, dropping it flushes and stops the background writer.
pub fn init_subscriber() -> Option<WorkerGuard> {
    init_with(&LogSettings::from_env())
}

/// Initializes the global tracing subscriber from explicit settings.
pub fn init_with(settings: &LogSettings) -> Option<WorkerGuard> {
    let subscriber = registry().with(settings.env_filter());
    let is_json = settings.format == LogFormat::Json;
    let (log_dir, log_filename) = settings.file_target();

    let guard = match settings.output {
        LogOutput::Both => {
            let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let tee_writer = MakeTee {
                make_a: std::io::stdout,
                make_b: non_blocking,
            };

            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(tee_writer);
            if is_json {
                subscriber.with(fmt_layer.json()).init();
            } else {
                subscriber.with(fmt_layer).init();
            }
            Some(guard)
        }
        LogOutput::Console => {
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);
            if is_json {
                subscriber.with(fmt_layer.json()).init();
            } else {
                subscriber.with(fmt_layer).init();
            }
            None
        }
        LogOutput::File => {
            let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            if is_json {
                subscriber.with(fmt_layer.json()).init();
            } else {
                subscriber.with(fmt_layer).init();
            }
            Some(guard)
        }
        LogOutput::None => {
            subscriber.init();
            None
        }
    };

    tracing::debug!(
        level = %settings.level,
        output = ?settings.output,
        format = ?settings.format,
        "Logging initialized"
    );
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let settings = settings_from(&[]);
        assert_eq!(settings, LogSettings::default());
        assert_eq!(settings.level, "info");
        assert_eq!(settings.output, LogOutput::Console);
        assert_eq!(settings.format, LogFormat::Human);
    }

    #[test]
    fn test_level_is_normalized() {
        assert_eq!(settings_from(&[("LOG_LEVEL", "DEBUG")]).level, "debug");
        assert_eq!(settings_from(&[("LOG_LEVEL", "warning")]).level, "warn");
        assert_eq!(settings_from(&[("LOG_LEVEL", "  ")]).level, "info");
    }

    #[test]
    fn test_output_and_format_parsing() {
        let settings = settings_from(&[
            ("LOG_OUTPUT", "both"),
            ("LOG_FORMAT", "json"),
            ("LOG_FILE_PATH", "/var/log/repub/server.log"),
        ]);
        assert_eq!(settings.output, LogOutput::Both);
        assert_eq!(settings.format, LogFormat::Json);

        let (dir, file) = settings.file_target();
        assert_eq!(dir, PathBuf::from("/var/log/repub"));
        assert_eq!(file, PathBuf::from("server.log"));
    }

    #[test]
    fn test_unknown_values_fall_back() {
        let settings = settings_from(&[("LOG_OUTPUT", "syslog"), ("LOG_FORMAT", "xml")]);
        assert_eq!(settings.output, LogOutput::Console);
        assert_eq!(settings.format, LogFormat::Human);
    }

    #[test]
    fn test_init_installs_global_subscriber() {
        let settings = LogSettings {
            level: "debug".to_string(),
            output: LogOutput::None,
            ..LogSettings::default()
        };

        let guard = init_with(&settings);
        assert!(guard.is_none());
        assert!(tracing::dispatcher::has_been_set());
    }

    #[test]
    fn test_bare_file_name_logs_to_tmp() {
        let settings = settings_from(&[("LOG_FILE_PATH", "server.log")]);
        let (dir, file) = settings.file_target();
        assert_eq!(dir, PathBuf::from("/tmp"));
        assert_eq!(file, PathBuf::from("server.log"));
    }
}
