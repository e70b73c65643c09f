pub mod mocks;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use mocks::RecordingBroadcaster;
#[allow(unused_imports)]
pub use setup::{drain, next_message, TestSetup, TestSetupBuilder};
