//! Output formatting for session status.
//!
//! This module renders the outcome of a status fetch in several formats:
//! - **Text**: Human-readable terminal output
//! - **HTML**: A fragment suitable for embedding in a portal page
//! - **JSON**: Machine-readable JSON output
//! - **Waybar**: JSON object for status bar widgets that poll the command
//!
//! A failed fetch is always rendered on its own: no topic, tempo or roster is
//! ever shown next to an error.
//!
//! # Example
//!
//! ```rust
//! use jamfarm_core::format::{FormatOptions, OutputFormat, StatusFormatter};
//! use jamfarm_core::{ServerAddress, StatusSnapshot};
//!
//! let formatter = StatusFormatter::new(FormatOptions::default());
//! let address = ServerAddress::new("localhost", 2049);
//! let snapshot = StatusSnapshot::new().with_topic("Welcome");
//!
//! let text = formatter.render(OutputFormat::Text, &address, &Ok(snapshot));
//! assert!(text.contains("Welcome"));
//! ```

use std::borrow::Cow;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::status::{ServerAddress, StatusError, StatusSnapshot};

/// The output format for status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Human-readable terminal output.
    #[default]
    Text,
    /// HTML fragment.
    Html,
    /// Machine-readable JSON output.
    Json,
    /// JSON output for Waybar status bar.
    Waybar,
}

/// Configuration options for output formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatOptions {
    /// Maximum length for the topic (truncated with ellipsis).
    pub max_topic_length: Option<usize>,
    /// Text shown when nobody is connected.
    pub no_users_text: String,
    /// Placeholder for fields the server never reported.
    pub absent_text: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            max_topic_length: None,
            no_users_text: "No users".to_string(),
            absent_text: "-".to_string(),
        }
    }
}

/// Waybar-compatible JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaybarOutput {
    /// Text to display in the bar.
    pub text: String,
    /// Tooltip text (shown on hover).
    pub tooltip: String,
    /// CSS class for styling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Alternative text (for accessibility).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

impl WaybarOutput {
    /// Creates a new WaybarOutput with required fields.
    pub fn new(text: impl Into<String>, tooltip: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tooltip: tooltip.into(),
            class: None,
            alt: None,
        }
    }

    /// Sets the CSS class.
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Sets the alt text.
    pub fn with_alt(mut self, alt: impl Into<String>) -> Self {
        self.alt = Some(alt.into());
        self
    }
}

/// JSON output format for machine consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonOutput {
    /// A successful fetch.
    Status(JsonStatus),
    /// A failed fetch.
    Error(JsonFailure),
}

/// Successful status in JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonStatus {
    /// `host:port` of the server.
    pub server: String,
    /// Current topic.
    pub topic: Option<String>,
    /// Beats per minute.
    pub bpm: Option<u16>,
    /// Beats per interval.
    pub bpi: Option<u16>,
    /// Number of connected users.
    pub user_count: usize,
    /// Connected users.
    pub users: Vec<JsonUser>,
}

/// A user in JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonUser {
    /// Nickname.
    pub nick: String,
    /// Channels in arrival order.
    pub channels: Vec<String>,
}

/// Failed fetch in JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonFailure {
    /// `host:port` of the server.
    pub server: String,
    /// Error description.
    pub error: JsonError,
}

/// Error body in JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonError {
    /// Stable error kind identifier.
    pub kind: String,
    /// Underlying error text.
    pub detail: String,
}

/// Formatter for status output.
#[derive(Debug, Clone, Default)]
pub struct StatusFormatter {
    options: FormatOptions,
}

impl StatusFormatter {
    /// Creates a new formatter with the given options.
    pub fn new(options: FormatOptions) -> Self {
        Self { options }
    }

    /// Returns the formatting options.
    pub fn options(&self) -> &FormatOptions {
        &self.options
    }

    /// Renders a fetch outcome in the requested format.
    ///
    /// JSON is pretty-printed; Waybar output is a single line.
    pub fn render(
        &self,
        format: OutputFormat,
        address: &ServerAddress,
        outcome: &Result<StatusSnapshot, StatusError>,
    ) -> String {
        match (format, outcome) {
            (OutputFormat::Text, Ok(snapshot)) => self.format_text(address, snapshot),
            (OutputFormat::Text, Err(error)) => self.format_text_error(address, error),
            (OutputFormat::Html, Ok(snapshot)) => self.format_html(address, snapshot),
            (OutputFormat::Html, Err(error)) => self.format_html_error(address, error),
            (OutputFormat::Json, _) => to_json(&self.format_json(address, outcome)),
            (OutputFormat::Waybar, _) => {
                serde_json::to_string(&self.format_waybar(address, outcome)).unwrap_or_default()
            }
        }
    }

    /// Formats a snapshot for the terminal.
    pub fn format_text(&self, address: &ServerAddress, snapshot: &StatusSnapshot) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Server: {}", address);
        let _ = writeln!(out, "Topic:  {}", self.topic_or_absent(snapshot));
        let _ = writeln!(out, "BPM:    {}", self.number_or_absent(snapshot.beats_per_minute));
        let _ = writeln!(out, "BPI:    {}", self.number_or_absent(snapshot.beats_per_interval));

        if snapshot.users.is_empty() {
            let _ = writeln!(out, "Users:  {}", self.options.no_users_text);
        } else {
            let _ = writeln!(out, "Users:  {}", snapshot.user_count());
            for user in snapshot.users.values() {
                if user.channels.is_empty() {
                    let _ = writeln!(out, "  - {}", user.nickname);
                } else {
                    let _ = writeln!(out, "  - {} ({})", user.nickname, user.channels.join(", "));
                }
            }
        }

        out
    }

    /// Formats a failed fetch for the terminal.
    pub fn format_text_error(&self, address: &ServerAddress, error: &StatusError) -> String {
        format!("Server: {}\nError:  {}\n", address, error)
    }

    /// Formats a snapshot as an HTML fragment.
    ///
    /// All server-provided text is escaped.
    pub fn format_html(&self, address: &ServerAddress, snapshot: &StatusSnapshot) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "<dl><dt>Server</dt><dd>{}</dd><dt>Topic</dt><dd>{}</dd><dt>BPM</dt><dd>{}</dd><dt>BPI</dt><dd>{}</dd></dl>",
            html_escape(&address.to_string()),
            html_escape(&self.topic_or_absent(snapshot)),
            html_escape(&self.number_or_absent(snapshot.beats_per_minute)),
            html_escape(&self.number_or_absent(snapshot.beats_per_interval)),
        );

        if snapshot.users.is_empty() {
            let _ = writeln!(out, "<p>{}</p>", html_escape(&self.options.no_users_text));
            return out;
        }

        out.push_str("<ul>\n");
        for user in snapshot.users.values() {
            let _ = write!(out, "  <li>{}", html_escape(&user.nickname));
            if !user.channels.is_empty() {
                let channels: Vec<String> = user.channels.iter().map(|c| html_escape(c)).collect();
                let _ = write!(out, " ({})", channels.join(", "));
            }
            out.push_str("</li>\n");
        }
        out.push_str("</ul>\n");
        out
    }

    /// Formats a failed fetch as an HTML fragment.
    pub fn format_html_error(&self, address: &ServerAddress, error: &StatusError) -> String {
        format!(
            "<p class=\"error\" data-server=\"{}\" data-kind=\"{}\">{}: {}</p>\n",
            html_escape(&address.to_string()),
            error.kind.as_str(),
            html_escape(error.kind.label()),
            html_escape(&error.detail),
        )
    }

    /// Formats a fetch outcome as structured JSON output.
    pub fn format_json(
        &self,
        address: &ServerAddress,
        outcome: &Result<StatusSnapshot, StatusError>,
    ) -> JsonOutput {
        match outcome {
            Ok(snapshot) => JsonOutput::Status(JsonStatus {
                server: address.to_string(),
                topic: snapshot
                    .topic
                    .as_deref()
                    .map(|t| self.truncate_topic(t).into_owned()),
                bpm: snapshot.beats_per_minute,
                bpi: snapshot.beats_per_interval,
                user_count: snapshot.user_count(),
                users: snapshot
                    .users
                    .values()
                    .map(|u| JsonUser {
                        nick: u.nickname.clone(),
                        channels: u.channels.clone(),
                    })
                    .collect(),
            }),
            Err(error) => JsonOutput::Error(JsonFailure {
                server: address.to_string(),
                error: JsonError {
                    kind: error.kind.as_str().to_string(),
                    detail: error.detail.clone(),
                },
            }),
        }
    }

    /// Formats a fetch outcome for a Waybar custom module.
    pub fn format_waybar(
        &self,
        address: &ServerAddress,
        outcome: &Result<StatusSnapshot, StatusError>,
    ) -> WaybarOutput {
        let snapshot = match outcome {
            Ok(snapshot) => snapshot,
            Err(error) => {
                return WaybarOutput::new(error.kind.label(), html_escape(&error.detail))
                    .with_class("error")
                    .with_alt(error.kind.as_str());
            }
        };

        let count = snapshot.user_count();
        let text = format!(
            "{} {} {}/{}",
            count,
            if count == 1 { "user" } else { "users" },
            self.number_or_absent(snapshot.beats_per_interval),
            self.number_or_absent(snapshot.beats_per_minute),
        );

        let mut lines = vec![html_escape(&address.to_string())];
        if let Some(topic) = snapshot.topic.as_deref() {
            lines.push(html_escape(&self.truncate_topic(topic)));
        }
        if snapshot.users.is_empty() {
            lines.push(html_escape(&self.options.no_users_text));
        } else {
            let users: Vec<String> = snapshot
                .users
                .values()
                .map(|u| html_escape(&u.nickname))
                .collect();
            lines.push(bulletize(&users));
        }

        WaybarOutput::new(text, lines.join("\n"))
            .with_class(if count == 0 { "empty" } else { "active" })
    }

    fn topic_or_absent(&self, snapshot: &StatusSnapshot) -> String {
        match snapshot.topic.as_deref() {
            Some(topic) => self.truncate_topic(topic).into_owned(),
            None => self.options.absent_text.clone(),
        }
    }

    fn number_or_absent(&self, value: Option<u16>) -> String {
        value
            .map(|v| v.to_string())
            .unwrap_or_else(|| self.options.absent_text.clone())
    }

    fn truncate_topic<'a>(&self, topic: &'a str) -> Cow<'a, str> {
        match self.options.max_topic_length {
            Some(max) => ellipsis(topic, max),
            None => Cow::Borrowed(topic),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    // These types contain only strings, numbers and options.
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Truncates a string with ellipsis if it exceeds the given length.
pub fn ellipsis(s: &str, max_len: usize) -> Cow<'_, str> {
    if max_len == 0 {
        return Cow::Borrowed("");
    }

    let char_count = s.chars().count();

    if char_count <= max_len {
        return Cow::Borrowed(s);
    }

    let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
    Cow::Owned(format!("{}...", truncated))
}

/// Escapes text for HTML display.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Creates bullet points from a list of items.
pub fn bulletize(items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }
    items
        .iter()
        .map(|item| format!("• {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}
