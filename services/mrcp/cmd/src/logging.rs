use std::fmt::{self, Write as _};
use std::io::IsTerminal;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

const SERVICE_NAME_WIDTH: usize = 16;
const LOG_LEVEL_WIDTH: usize = 9;

/// `[timestamp] [service] [level] message key=value...` log lines
pub struct MrcpLogFormatter {
    service_name: String,
    color_enabled: bool,
}

impl MrcpLogFormatter {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            color_enabled: is_terminal(),
        }
    }

    #[cfg(test)]
    fn plain(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            color_enabled: false,
        }
    }

    /// Log target's crate becomes the service column, e.g. `mrcp-session`
    fn format_service_name(&self, target: &str) -> String {
        let name = match target.split("::").next() {
            Some(krate) if krate.starts_with("mrcp_") => krate.replace('_', "-"),
            _ => self.service_name.clone(),
        };

        if name.chars().count() > SERVICE_NAME_WIDTH {
            let truncated: String = name.chars().take(SERVICE_NAME_WIDTH - 1).collect();
            format!("{}…", truncated)
        } else {
            format!("{:<width$}", name, width = SERVICE_NAME_WIDTH)
        }
    }

    fn format_log_level(&self, level: &tracing::Level) -> String {
        let level_str = match *level {
            tracing::Level::ERROR => "✗ ERROR",
            tracing::Level::WARN => "⚠ WARN",
            tracing::Level::INFO => "ℹ INFO",
            tracing::Level::DEBUG => "◦ DEBUG",
            tracing::Level::TRACE => "◦ TRACE",
        };
        format!("{:<width$}", level_str, width = LOG_LEVEL_WIDTH)
    }

    fn color_for_level(&self, level: &tracing::Level) -> &'static str {
        if !self.color_enabled {
            return "";
        }
        match *level {
            tracing::Level::ERROR => COLOR_BRIGHT_RED,
            tracing::Level::WARN => COLOR_BRIGHT_YELLOW,
            tracing::Level::INFO => COLOR_GREEN,
            tracing::Level::DEBUG | tracing::Level::TRACE => COLOR_BRIGHT_GRAY,
        }
    }

    fn render(&self, timestamp: &str, target: &str, level: &tracing::Level, fields: &FieldVisitor) -> String {
        let color = self.color_for_level(level);
        let reset = if self.color_enabled { COLOR_RESET } else { "" };
        let cyan = if self.color_enabled { COLOR_CYAN } else { "" };

        let mut line = format!(
            "{}[{}] [{}] [{}{}{}] {}",
            cyan,
            timestamp,
            self.format_service_name(target),
            color,
            self.format_log_level(level),
            reset,
            fields.message
        );
        for (key, value) in &fields.extra {
            let _ = write!(line, " {}={}", key, value);
        }
        line.push_str(reset);
        line
    }
}

impl<S, N> FormatEvent<S, N> for MrcpLogFormatter
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
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        let metadata = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        writeln!(
            writer,
            "{}",
            self.render(&timestamp, metadata.target(), metadata.level(), &visitor)
        )
    }
}

/// Collects the message and any structured fields of an event
#[derive(Default)]
struct FieldVisitor {
    message: String,
    extra: Vec<(&'static str, String)>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        let rendered = rendered
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .map(str::to_string)
            .unwrap_or(rendered);
        self.push(field.name(), rendered);
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.push(field.name(), value.to_string());
    }
}

impl FieldVisitor {
    fn push(&mut self, name: &'static str, value: String) {
        if name == "message" {
            self.message = value;
        } else {
            self.extra.push((name, value));
        }
    }
}

fn is_terminal() -> bool {
    if std::env::var("TERM").unwrap_or_default() == "dumb" {
        return false;
    }
    std::io::stdout().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_column_from_target() {
        let formatter = MrcpLogFormatter::plain("mrcp-server");
        assert_eq!(
            formatter.format_service_name("mrcp_session::session").trim_end(),
            "mrcp-session"
        );
        assert_eq!(formatter.format_service_name("h2::codec").trim_end(), "mrcp-server");
        assert_eq!(
            formatter.format_service_name("mrcp_session").chars().count(),
            SERVICE_NAME_WIDTH
        );
    }

    #[test]
    fn test_render_plain_line() {
        let formatter = MrcpLogFormatter::plain("mrcp-server");
        let fields = FieldVisitor {
            message: "channel opened".to_string(),
            extra: vec![("channel", "c1@speechsynth".to_string()), ("request_id", "7".to_string())],
        };
        let line = formatter.render(
            "2024-01-01 00:00:00.000",
            "mrcp_session::session",
            &tracing::Level::INFO,
            &fields,
        );
        assert!(line.starts_with("[2024-01-01 00:00:00.000] [mrcp-session"));
        assert!(line.contains("ℹ INFO"));
        assert!(line.ends_with("channel opened channel=c1@speechsynth request_id=7"));
        assert!(!line.contains('\x1b'));
    }
}
