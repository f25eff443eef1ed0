use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use dashmap::{DashMap, mapref::entry::Entry};

/// A per-tier request budget: `limit` requests per `window`.
///
/// Fixed window rather than sliding window or token bucket: a burst
/// straddling a window boundary can reach roughly twice the limit, which
/// is acceptable for abuse deterrence and keeps the state per identifier
/// at a single counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuota {
    pub limit: u32,
    pub window: Duration,
}

impl RateQuota {
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Auth endpoints - 5 requests per minute
    pub const AUTH: RateQuota = RateQuota::new(5, Duration::from_secs(60));
    /// AI chat - 10 requests per minute
    pub const AI_CHAT: RateQuota = RateQuota::new(10, Duration::from_secs(60));
    /// AI image generation - 3 requests per minute (expensive)
    pub const AI_IMAGE: RateQuota = RateQuota::new(3, Duration::from_secs(60));
    /// Standard API - 60 requests per minute
    pub const API: RateQuota = RateQuota::new(60, Duration::from_secs(60));
    /// Search - 20 requests per minute
    pub const SEARCH: RateQuota = RateQuota::new(20, Duration::from_secs(60));
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at_ms: u64,
}

/// Fixed-window counters keyed by an opaque identifier (middleware keys
/// are `tier:user-id` or `tier:ip`). One owned instance per server,
/// constructor-injected; tests build their own isolated instances.
///
/// The read-then-write on a key is not atomic across concurrent callers
/// sharing an identifier, so a tight burst can overshoot the limit by a
/// small margin.
#[derive(Default)]
pub struct FixedWindowLimiter {
    windows: DashMap<String, Window>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the request fits the identifier's current window.
    /// Expired or absent windows restart at a count of 1; a full window
    /// denies without mutating state.
    pub fn allow(&self, identifier: &str, quota: RateQuota) -> bool {
        self.allow_at(identifier, quota, now_ms())
    }

    /// Requests left in the live window, or `limit` when none is live.
    pub fn remaining(&self, identifier: &str, limit: u32) -> u32 {
        self.remaining_at(identifier, limit, now_ms())
    }

    /// Whole seconds until the live window resets, rounded up; 0 when no
    /// window is live.
    pub fn reset_seconds(&self, identifier: &str) -> u64 {
        self.reset_seconds_at(identifier, now_ms())
    }

    /// Drops every expired record. Purely a memory bound: `allow` already
    /// treats expired records as absent, so the sweep period cannot affect
    /// the outcome of any call.
    pub fn sweep(&self) {
        self.sweep_at(now_ms());
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.windows.len()
    }

    fn allow_at(&self, identifier: &str, quota: RateQuota, now_ms: u64) -> bool {
        let window_ms = quota.window.as_millis() as u64;
        match self.windows.entry(identifier.to_string()) {
            Entry::Occupied(mut entry) => {
                let window = entry.get_mut();
                if now_ms > window.reset_at_ms {
                    *window = Window {
                        count: 1,
                        reset_at_ms: now_ms + window_ms,
                    };
                    true
                } else if window.count >= quota.limit {
                    false
                } else {
                    window.count += 1;
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Window {
                    count: 1,
                    reset_at_ms: now_ms + window_ms,
                });
                true
            }
        }
    }

    fn remaining_at(&self, identifier: &str, limit: u32, now_ms: u64) -> u32 {
        match self.windows.get(identifier) {
            Some(window) if now_ms <= window.reset_at_ms => limit.saturating_sub(window.count),
            _ => limit,
        }
    }

    fn reset_seconds_at(&self, identifier: &str, now_ms: u64) -> u64 {
        match self.windows.get(identifier) {
            Some(window) if now_ms <= window.reset_at_ms => {
                (window.reset_at_ms - now_ms).div_ceil(1000)
            }
            _ => 0,
        }
    }

    fn sweep_at(&self, now_ms: u64) {
        self.windows.retain(|_, window| now_ms <= window.reset_at_ms);
    }
}

/// Aborts the background sweep when dropped, giving the limiter an
/// explicit start/stop lifecycle instead of a detached task.
pub struct SweeperHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl SweeperHandle {
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Sweeps expired records every `period`. The period is independent of any
/// window size; 5 minutes matches the production configuration.
pub fn spawn_sweeper(limiter: &Arc<FixedWindowLimiter>, period: Duration) -> SweeperHandle {
    let limiter = Arc::clone(limiter);
    let handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        // the first tick fires immediately; harmless, sweep is idempotent
        loop {
            tick.tick().await;
            limiter.sweep();
        }
    });
    SweeperHandle { handle }
}
