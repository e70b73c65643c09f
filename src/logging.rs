use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "eventhub=debug,tower_http=debug";

/// Entries buffered per subscriber before the slowest one starts lagging
pub const DEFAULT_LOG_STREAM_CAPACITY: usize = 1024;

/// A formatted tracing event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub target: String,
    pub message: String,
    pub time: DateTime<Utc>,
}

/// Process-wide fan-out of log entries
///
/// Fed by [`LogStreamLayer`]; anything may subscribe. Publishing with no
/// subscribers is a no-op.
#[derive(Clone)]
pub struct LogStream {
    sender: broadcast::Sender<LogEntry>,
}

impl LogStream {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }

    pub fn publish(&self, entry: LogEntry) {
        let _ = self.sender.send(entry);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// A tracing layer that publishes every event into this stream
    pub fn layer(&self) -> LogStreamLayer {
        LogStreamLayer {
            stream: self.clone(),
        }
    }
}

impl Default for LogStream {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_STREAM_CAPACITY)
    }
}

pub struct LogStreamLayer {
    stream: LogStream,
}

impl<S: Subscriber> Layer<S> for LogStreamLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if self.stream.subscriber_count() == 0 {
            return;
        }

        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        self.stream.publish(LogEntry {
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message: visitor.finish(),
            time: Utc::now(),
        });
    }
}

/// Collects the message and `key=value` pairs of one event
#[derive(Default)]
struct EntryVisitor {
    message: String,
    fields: Vec<String>,
}

impl EntryVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            return self.message;
        }
        let fields = self.fields.join(" ");
        if self.message.is_empty() {
            fields
        } else {
            format!("{} {}", self.message, fields)
        }
    }
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// Installs the global subscriber: env filter, console output and `stream`
pub fn init_tracing(stream: &LogStream) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .with(stream.layer())
        .init();
}
