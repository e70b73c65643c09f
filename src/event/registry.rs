use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{
    handler::{HandlerContext, MessageHandler},
    types::EventType,
};
use crate::hub::HubError;

/// Upper bound on a single handler invocation
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// Counts from one call to [`HandlerRegistry::deliver`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that were invoked
    pub invoked: usize,
    /// Invocations that returned an error, panicked or timed out
    pub failed: usize,
}

/// Maps event types to the in-process handlers interested in them
///
/// Registrations are never removed. The same handler registered twice for
/// a type is invoked twice.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<EventType, Vec<Arc<dyn MessageHandler>>>>,
    handler_timeout: Duration,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Set the timeout for individual handler execution
    pub fn with_handler_timeout(mut self, handler_timeout: Duration) -> Self {
        self.handler_timeout = handler_timeout;
        self
    }

    /// Adds `handler` to the delivery set of every type in `event_types`
    pub async fn register(&self, event_types: &[EventType], handler: Arc<dyn MessageHandler>) {
        let mut handlers = self.handlers.write().await;
        for event_type in event_types {
            handlers
                .entry(*event_type)
                .or_default()
                .push(Arc::clone(&handler));
        }

        info!(
            handler = handler.name(),
            event_types = ?event_types,
            "Registered message handler"
        );
    }

    /// Number of registrations for `event_type`, duplicates included
    pub async fn handler_count(&self, event_type: EventType) -> usize {
        self.handlers
            .read()
            .await
            .get(&event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Runs every handler registered for `event_type`
    ///
    /// The handler list is copied out under the lock so handlers are free to
    /// broadcast or register while they run. Failures are logged and counted,
    /// never returned.
    pub async fn deliver(
        &self,
        ctx: &HandlerContext,
        client_id: &str,
        event_type: EventType,
        payload: &[u8],
        message_id: &str,
    ) -> DispatchReport {
        let handlers: Vec<Arc<dyn MessageHandler>> = {
            let handlers = self.handlers.read().await;
            handlers.get(&event_type).cloned().unwrap_or_default()
        };

        let mut report = DispatchReport::default();
        if handlers.is_empty() {
            debug!(
                event_type = %event_type,
                message_id = %message_id,
                "No handlers registered for event type"
            );
            return report;
        }

        for handler in handlers {
            report.invoked += 1;
            if let Err(e) = self
                .invoke(handler.as_ref(), ctx, client_id, event_type, payload, message_id)
                .await
            {
                report.failed += 1;
                warn!(
                    handler = handler.name(),
                    event_type = %event_type,
                    client_id = %client_id,
                    message_id = %message_id,
                    error = %e,
                    "Message handler failed"
                );
            }
        }

        report
    }

    /// Invokes one handler with timeout and panic isolation
    async fn invoke(
        &self,
        handler: &dyn MessageHandler,
        ctx: &HandlerContext,
        client_id: &str,
        event_type: EventType,
        payload: &[u8],
        message_id: &str,
    ) -> Result<(), HubError> {
        let fut = AssertUnwindSafe(handler.handle(ctx, client_id, event_type, payload, message_id))
            .catch_unwind();

        match timeout(self.handler_timeout, fut).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic_err)) => Err(HubError::HandlerFault {
                handler: handler.name().to_string(),
                reason: panic_message(panic_err.as_ref()),
            }),
            Err(_elapsed) => Err(HubError::HandlerFault {
                handler: handler.name().to_string(),
                reason: format!("timed out after {:?}", self.handler_timeout),
            }),
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic_err: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic_err.downcast_ref::<&'static str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = panic_err.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}
