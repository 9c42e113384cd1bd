//! Output formatting for kwatch (text, json)

use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use kwatch_client::{EventKind, WatchEvent};
use serde_json::Value;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One line per event: kind, name, resourceVersion (default)
    #[default]
    Text,
    /// The raw event as a JSON line
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print an info message to stderr (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg.dimmed());
        }
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print a single event in the configured format
    pub fn print_event(&self, event: &WatchEvent<Value>) {
        match self.format {
            OutputFormat::Text => println!("{}", format_text(event)),
            OutputFormat::Json => match serde_json::to_string(event) {
                Ok(json) => println!("{}", json),
                Err(e) => self.error(&format!("Failed to encode event: {}", e)),
            },
        }
    }
}

fn colored_kind(kind: EventKind) -> ColoredString {
    let label = format!("{:<8}", kind.as_str());
    match kind {
        EventKind::Added => label.green(),
        EventKind::Modified => label.yellow(),
        EventKind::Deleted => label.red(),
        EventKind::Bookmark => label.dimmed(),
        EventKind::Error => label.red().bold(),
    }
}

fn metadata_field<'a>(object: Option<&'a Value>, pointer: &str) -> Option<&'a str> {
    object.and_then(|o| o.pointer(pointer)).and_then(Value::as_str)
}

/// Render an event as a single text line
fn format_text(event: &WatchEvent<Value>) -> String {
    if let Some(status) = event.status() {
        let detail = status
            .message
            .as_deref()
            .or(status.reason.as_deref())
            .unwrap_or("");
        return format!("{} {} {}", colored_kind(event.kind()), status.code, detail)
            .trim_end()
            .to_string();
    }

    let object = event
        .object()
        .or_else(|| event.bookmark().map(|bookmark| &bookmark.object));

    let name = metadata_field(object, "/metadata/namespace")
        .map(|ns| format!("{}/", ns))
        .unwrap_or_default()
        + metadata_field(object, "/metadata/name").unwrap_or("-");

    format!(
        "{} {} {}",
        colored_kind(event.kind()),
        name.bold(),
        event.resource_version().unwrap_or("-")
    )
}
