//! Console log formatting for the lamp binary.
//!
//! Lines look like `[timestamp] [source] [level] message key=value`. The
//! source column is the `component` field when present, otherwise it is
//! derived from the event target (`lamp_session::manager` becomes
//! `lamp-session`).

use std::fmt::{self, Write as _};
use std::io::IsTerminal;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

const SOURCE_WIDTH: usize = 18;
const LEVEL_WIDTH: usize = 9;

/// Log with a `component` tag shown in the source column
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(component = $component, $($arg)*)
    };
}

/// Warn with a `component` tag shown in the source column
#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(component = $component, $($arg)*)
    };
}

/// Debug with a `component` tag shown in the source column
#[macro_export]
macro_rules! component_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(component = $component, $($arg)*)
    };
}

/// Error with a `component` tag shown in the source column
#[macro_export]
macro_rules! component_error {
    ($component:expr, $($arg:tt)*) => {
        tracing::error!(component = $component, $($arg)*)
    };
}

/// Event formatter for console output
pub struct LampLogFormatter {
    service_name: String,
    color_enabled: bool,
}

impl LampLogFormatter {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            color_enabled: std::io::stderr().is_terminal()
                && std::env::var("TERM").map_or(true, |term| term != "dumb"),
        }
    }

    fn source(&self, component: Option<&str>, target: &str) -> String {
        let name = match component {
            Some(component) => format!("lamp-{}", component),
            None => match target.split("::").next() {
                Some(krate) if krate.starts_with("lamp_") => krate.replace('_', "-"),
                _ => self.service_name.clone(),
            },
        };
        pad(&name, SOURCE_WIDTH)
    }

    fn color(&self, level: &Level) -> &'static str {
        if !self.color_enabled {
            return "";
        }
        match *level {
            Level::ERROR => COLOR_BRIGHT_RED,
            Level::WARN => COLOR_BRIGHT_YELLOW,
            Level::INFO => COLOR_GREEN,
            Level::DEBUG | Level::TRACE => COLOR_BRIGHT_GRAY,
        }
    }
}

fn level_label(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "✗ ERROR",
        Level::WARN => "⚠ WARN",
        Level::INFO => "ℹ INFO",
        Level::DEBUG => "◦ DEBUG",
        Level::TRACE => "◦ TRACE",
    }
}

fn pad(name: &str, width: usize) -> String {
    if name.chars().count() > width {
        let truncated: String = name.chars().take(width - 1).collect();
        format!("{}…", truncated)
    } else {
        format!("{:<width$}", name, width = width)
    }
}

impl<S, N> FormatEvent<S, N> for LampLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let metadata = event.metadata();
        let level = metadata.level();

        let mut fields = FieldVisitor::default();
        event.record(&mut fields);

        let (cyan, reset) = if self.color_enabled {
            (COLOR_CYAN, COLOR_RESET)
        } else {
            ("", "")
        };

        write!(
            writer,
            "{}[{}] [{}] [{}{:<width$}{}] ",
            cyan,
            timestamp,
            self.source(fields.component.as_deref(), metadata.target()),
            self.color(level),
            level_label(level),
            reset,
            width = LEVEL_WIDTH,
        )?;
        writeln!(writer, "{}{}{}", fields.message, fields.extra, reset)
    }
}

/// Collects the message, the component tag and any other fields
#[derive(Default)]
struct FieldVisitor {
    message: String,
    component: Option<String>,
    extra: String,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "component" => self.component = Some(value.to_string()),
            name => {
                let _ = write!(self.extra, " {}={}", name, value);
            }
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        let unquoted = rendered
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(&rendered);
        match field.name() {
            "message" => self.message = rendered.clone(),
            "component" => self.component = Some(unquoted.to_string()),
            name => {
                let _ = write!(self.extra, " {}={}", name, unquoted);
            }
        }
    }
}
