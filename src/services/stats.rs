use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::lifecycle::{Lifecycle, ServiceState};
use crate::event::{EventMessage, EventType};
use crate::hub::Broadcaster;

/// Label carried by every stats message
pub const STATS_MESSAGE: &str = "System Stats";

/// One sample of process resource usage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsMessage {
    /// Resident memory of the process
    pub memory_bytes: u64,
    pub cpu_user_seconds: f64,
    pub cpu_system_seconds: f64,
    /// Tasks currently alive on the tokio runtime
    pub alive_tasks: usize,
}

impl StatsMessage {
    /// Samples the current process
    pub fn sample() -> Self {
        let usage = resource_usage();
        Self {
            memory_bytes: resident_memory_bytes().unwrap_or(usage.max_rss_bytes),
            cpu_user_seconds: usage.user_seconds,
            cpu_system_seconds: usage.system_seconds,
            alive_tasks: tokio::runtime::Handle::try_current()
                .map(|handle| handle.metrics().num_alive_tasks())
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Default)]
struct ResourceUsage {
    user_seconds: f64,
    system_seconds: f64,
    max_rss_bytes: u64,
}

#[cfg(unix)]
fn resource_usage() -> ResourceUsage {
    // SAFETY: rusage is plain old data and getrusage only writes into it.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return ResourceUsage::default();
    }

    // ru_maxrss is kilobytes on Linux and bytes on macOS
    let rss_unit: u64 = if cfg!(target_os = "macos") { 1 } else { 1024 };

    ResourceUsage {
        user_seconds: timeval_seconds(usage.ru_utime),
        system_seconds: timeval_seconds(usage.ru_stime),
        max_rss_bytes: (usage.ru_maxrss.max(0) as u64).saturating_mul(rss_unit),
    }
}

#[cfg(not(unix))]
fn resource_usage() -> ResourceUsage {
    ResourceUsage::default()
}

#[cfg(unix)]
fn timeval_seconds(tv: libc::timeval) -> f64 {
    tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0
}

/// Current resident set size from /proc, where available
#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    // SAFETY: sysconf has no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(resident_pages.saturating_mul(page_size as u64))
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> Option<u64> {
    None
}

/// Periodically broadcasts process resource usage on the `stats` type
pub struct StatsService {
    broadcaster: Arc<dyn Broadcaster>,
    lifecycle: Lifecycle,
}

impl StatsService {
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            broadcaster,
            lifecycle: Lifecycle::new("stats"),
        }
    }

    /// Starts sampling every `period`
    ///
    /// The first sample is taken one period after the call. Returns false if
    /// the service was already running.
    #[instrument(skip(self))]
    pub fn run(&self, period: Duration) -> bool {
        let broadcaster = Arc::clone(&self.broadcaster);
        self.lifecycle
            .start(move |cancel| collect(broadcaster, period, cancel))
    }

    /// Stops the collector; calling it again is harmless
    pub fn stop(&self) -> bool {
        self.lifecycle.stop(ServiceState::Stopped)
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    pub fn state(&self) -> ServiceState {
        self.lifecycle.state()
    }
}

async fn collect(broadcaster: Arc<dyn Broadcaster>, period: Duration, cancel: CancellationToken) {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let sample = StatsMessage::sample();
                let body = match serde_json::to_value(&sample) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize stats sample");
                        continue;
                    }
                };

                if let Err(e) = broadcaster
                    .broadcast_message(EventMessage::new(EventType::Stats, STATS_MESSAGE, body))
                    .await
                {
                    warn!(error = %e, "Failed to broadcast stats");
                }
            }
        }
    }

    debug!("Stats collector exited");
}
