// Streaming services layered on the hub
//
// Health and System answer client requests. Stats and Logs run background
// loops that publish on their own event types.

// Public API - what other modules can use
pub use health::HealthService;
pub use lifecycle::{Lifecycle, ServiceState};
pub use logs::{is_suppressed, LogService, LOG_MESSAGE, SUPPRESSED_TARGETS};
pub use stats::{StatsMessage, StatsService, STATS_MESSAGE};
pub use system::SystemService;

// Internal modules
mod health;
mod lifecycle;
mod logs;
mod stats;
mod system;
