//! Logger bootstrap for the sysfips binary and embedding hosts.
//!
//! The filter comes from `RUST_LOG`, then `SYSFIPS_LOG_LEVEL`, then the
//! caller's default. When resolver diagnostics are requested the
//! [`LOG_TARGET`] directive is forced to `debug` on top of whatever the
//! environment selected, so `--debug` cannot be silenced by an inherited
//! filter.

use crate::diagnostics::LOG_TARGET;
use env_logger::fmt::Formatter;
use log::Record;
use serde_json::json;
use std::env;
use std::io::{self, Write};
use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

const FILTER_ENV: &str = "RUST_LOG";
const FORMAT_ENV: &str = "SYSFIPS_LOG_FORMAT";
const LEVEL_ENV: &str = "SYSFIPS_LOG_LEVEL";

/// Output encoding of log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl LogFormat {
    /// `plain` (any case) selects plain text; everything else is JSON.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("plain") {
            LogFormat::Plain
        } else {
            LogFormat::Json
        }
    }

    fn from_env() -> Self {
        env::var(FORMAT_ENV)
            .map(|value| Self::parse(&value))
            .unwrap_or(LogFormat::Json)
    }
}

/// Build the `env_logger` filter string.
///
/// A trailing `/regex` in the selected spec is preserved; the diagnostics
/// directive is inserted before it.
pub fn filter_spec(
    rust_log: Option<&str>,
    level: Option<&str>,
    default_level: &str,
    diagnostics: bool,
) -> String {
    let selected = [rust_log, level]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|spec| !spec.is_empty())
        .unwrap_or(default_level);

    if !diagnostics {
        return selected.to_string();
    }

    let forced = format!("{LOG_TARGET}=debug");
    match selected.split_once('/') {
        Some((directives, pattern)) => format!("{directives},{forced}/{pattern}"),
        None => format!("{selected},{forced}"),
    }
}

/// Initialize the global logger once; later calls are no-ops.
///
/// `diagnostics` requests that resolver diagnostic lines (logged by
/// [`crate::LogSink`]) always pass the filter.
pub fn init(default_level: &str, diagnostics: bool) {
    let _ = INIT.get_or_init(|| configure(default_level, diagnostics));
}

fn configure(default_level: &str, diagnostics: bool) {
    let rust_log = env::var(FILTER_ENV).ok();
    let level = env::var(LEVEL_ENV).ok();
    let spec = filter_spec(
        rust_log.as_deref(),
        level.as_deref(),
        default_level,
        diagnostics,
    );

    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&spec);
    match LogFormat::from_env() {
        LogFormat::Json => builder.format(write_json),
        LogFormat::Plain => builder.format(write_plain),
    };

    if let Err(err) = builder.try_init() {
        eprintln!("failed to initialize logger: {err}");
    }
}

fn write_json(buf: &mut Formatter, record: &Record<'_>) -> io::Result<()> {
    let payload = json!({
        "timestamp": buf.timestamp().to_string(),
        "level": record.level().as_str().to_lowercase(),
        "target": record.target(),
        "message": record.args().to_string(),
    });
    writeln!(buf, "{payload}")
}

fn write_plain(buf: &mut Formatter, record: &Record<'_>) -> io::Result<()> {
    writeln!(
        buf,
        "{} {} {} - {}",
        buf.timestamp(),
        record.level().as_str().to_lowercase(),
        record.target(),
        record.args()
    )
}
