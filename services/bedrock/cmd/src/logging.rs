//! Console log format for the bedrock binary.
//!
//! Lines read `timestamp LEVEL component peer message key=value...`. The
//! component comes from a `component` field or the last segment of the event
//! target. The peer comes from a `peer` field on the event or on the nearest
//! enclosing span; session drivers open such a span for every connection.

use std::fmt;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_DIM: &str = "\x1b[2m";
const COLOR_RED: &str = "\x1b[31m";
const COLOR_YELLOW: &str = "\x1b[33m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BLUE: &str = "\x1b[34m";

const COMPONENT_WIDTH: usize = 8;
// Widest IPv4 socket address
const PEER_WIDTH: usize = 21;
const NO_PEER: &str = "-";

/// Log at info level tagged with a component column
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(component = $component, $($arg)*)
    };
}

/// Log at warn level tagged with a component column
#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(component = $component, $($arg)*)
    };
}

/// Peer address attached to a span
#[derive(Debug, Clone)]
struct Peer(String);

/// Stores the `peer` field of new spans for [`BedrockLogFormatter`]
pub struct PeerLayer;

impl<S> Layer<S> for PeerLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut fields = EventFields::default();
        attrs.record(&mut fields);
        if let (Some(peer), Some(span)) = (fields.peer, ctx.span(id)) {
            span.extensions_mut().insert(Peer(peer));
        }
    }
}

/// Column formatter for session logs
pub struct BedrockLogFormatter {
    color_enabled: bool,
}

impl BedrockLogFormatter {
    pub fn new() -> Self {
        Self {
            color_enabled: color_enabled(),
        }
    }

    #[cfg(test)]
    fn plain() -> Self {
        Self {
            color_enabled: false,
        }
    }

    fn paint(&self, color: &'static str) -> (&'static str, &'static str) {
        if self.color_enabled {
            (color, COLOR_RESET)
        } else {
            ("", "")
        }
    }
}

impl Default for BedrockLogFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => COLOR_RED,
        Level::WARN => COLOR_YELLOW,
        Level::INFO => COLOR_GREEN,
        Level::DEBUG => COLOR_BLUE,
        Level::TRACE => COLOR_DIM,
    }
}

/// `bedrock_session::client` logs as `client`, the binary as `main`
fn target_component(target: &str) -> &str {
    match target.rsplit("::").next() {
        Some(last) if last != target => last,
        _ => "main",
    }
}

fn span_peer<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<String>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    for span in ctx.event_scope()? {
        if let Some(peer) = span.extensions().get::<Peer>() {
            return Some(peer.0.clone());
        }
    }
    None
}

impl<S, N> FormatEvent<S, N> for BedrockLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let mut fields = EventFields::default();
        event.record(&mut fields);

        let peer = fields.peer.take().or_else(|| span_peer(ctx));
        let component = fields
            .component
            .take()
            .unwrap_or_else(|| target_component(metadata.target()).to_string());

        let (dim, dim_reset) = self.paint(COLOR_DIM);
        let (level_on, level_off) = self.paint(level_color(metadata.level()));

        write!(
            writer,
            "{}{}{} {}{:<5}{} {:<cw$} {:<pw$} {}",
            dim,
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            dim_reset,
            level_on,
            metadata.level(),
            level_off,
            component,
            peer.as_deref().unwrap_or(NO_PEER),
            fields.message,
            cw = COMPONENT_WIDTH,
            pw = PEER_WIDTH,
        )?;
        for (name, value) in &fields.extra {
            write!(writer, " {}{}={}{}", dim, name, value, dim_reset)?;
        }
        writeln!(writer)
    }
}

/// Splits an event or span into the columns it feeds
#[derive(Default)]
struct EventFields {
    message: String,
    component: Option<String>,
    peer: Option<String>,
    extra: Vec<(&'static str, String)>,
}

impl EventFields {
    fn set(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            "component" => self.component = Some(value),
            "peer" => self.peer = Some(value),
            name => self.extra.push((name, value)),
        }
    }
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.set(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field, value.to_string());
    }
}

/// Color only on a terminal, and never with `NO_COLOR` or `TERM=dumb`
fn color_enabled() -> bool {
    use std::io::IsTerminal;

    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var("TERM").unwrap_or_default() == "dumb" {
        return false;
    }
    std::io::stdout().is_terminal()
}
