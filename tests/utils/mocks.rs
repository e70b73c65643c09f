use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use eventhub::{Broadcaster, EventMessage, HubError};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Broadcaster that keeps every message it is given
#[derive(Clone, Default)]
pub struct RecordingBroadcaster {
    sent: Arc<RwLock<Vec<EventMessage>>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<EventMessage> {
        self.sent.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.sent.read().await.len()
    }

    /// Polls until at least `count` messages arrived or `timeout` passed
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<EventMessage> {
        self.wait_until(|messages| messages.len() >= count, timeout)
            .await
    }

    /// Polls until `done` holds for the recorded messages or `timeout` passed
    pub async fn wait_until<F>(&self, done: F, timeout: Duration) -> Vec<EventMessage>
    where
        F: Fn(&[EventMessage]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let messages = self.messages().await;
            if done(&messages) || tokio::time::Instant::now() >= deadline {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn broadcast_message(&self, message: EventMessage) -> Result<(), HubError> {
        message.validate()?;
        self.sent.write().await.push(message);
        Ok(())
    }
}
