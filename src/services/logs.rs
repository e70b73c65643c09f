use std::sync::Arc;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::lifecycle::{Lifecycle, ServiceState};
use crate::event::{EventMessage, EventType};
use crate::hub::Broadcaster;
use crate::logging::{LogEntry, LogStream};

/// Label carried by every forwarded log message
pub const LOG_MESSAGE: &str = "System Log";

/// Targets never forwarded
///
/// Forwarding one log entry makes the hub, the handler registry and this
/// service log in turn, so their own output would feed back forever.
pub const SUPPRESSED_TARGETS: &[&str] = &[
    "eventhub::hub",
    "eventhub::event",
    "eventhub::services::stats",
    "eventhub::services::logs",
];

pub fn is_suppressed(target: &str) -> bool {
    SUPPRESSED_TARGETS.iter().any(|prefix| {
        target == *prefix
            || target
                .strip_prefix(prefix)
                .map(|rest| rest.starts_with("::"))
                .unwrap_or(false)
    })
}

/// Streams the process log to `logs` subscribers
pub struct LogService {
    broadcaster: Arc<dyn Broadcaster>,
    stream: LogStream,
    lifecycle: Lifecycle,
}

impl LogService {
    pub fn new(broadcaster: Arc<dyn Broadcaster>, stream: LogStream) -> Self {
        Self {
            broadcaster,
            stream,
            lifecycle: Lifecycle::new("logs"),
        }
    }

    /// Subscribes to the log stream and starts forwarding
    ///
    /// Entries published after this returns are guaranteed to be seen.
    /// Returns false if the service was already running.
    #[instrument(skip(self))]
    pub fn run(&self) -> bool {
        let broadcaster = Arc::clone(&self.broadcaster);
        let stream = self.stream.clone();
        self.lifecycle.start(move |cancel| {
            let entries = stream.subscribe();
            forward(broadcaster, entries, cancel)
        })
    }

    /// Unsubscribes and returns the service to idle
    pub fn stop(&self) -> bool {
        self.lifecycle.stop(ServiceState::Idle)
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    pub fn state(&self) -> ServiceState {
        self.lifecycle.state()
    }
}

async fn forward(
    broadcaster: Arc<dyn Broadcaster>,
    mut entries: Receiver<LogEntry>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = entries.recv() => match received {
                Ok(entry) => {
                    if is_suppressed(&entry.target) {
                        continue;
                    }
                    forward_entry(broadcaster.as_ref(), entry).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Log forwarder lagged, entries lost");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    debug!("Log forwarder exited");
}

async fn forward_entry(broadcaster: &dyn Broadcaster, entry: LogEntry) {
    let body = match serde_json::to_value(&entry) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to serialize log entry");
            return;
        }
    };

    if let Err(e) = broadcaster
        .broadcast_message(EventMessage::new(EventType::Logs, LOG_MESSAGE, body))
        .await
    {
        warn!(error = %e, "Failed to broadcast log entry");
    }
}
