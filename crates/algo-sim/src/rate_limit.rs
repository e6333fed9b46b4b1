//! Per-caller sliding-window rate limiter.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::RateLimitSettings;

/// Number of tracked callers above which idle windows are swept, at most
/// once per window.
const SWEEP_THRESHOLD: usize = 1024;

/// Admits at most `max_requests` per caller within any trailing `window`.
///
/// Rejected attempts are not recorded, so a caller that keeps retrying is
/// admitted again as soon as its oldest accepted request leaves the window.
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    max_requests: usize,
    window: Duration,
    last_sweep: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
            last_sweep: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(settings.max_requests, Duration::from_secs(settings.window_secs))
    }

    pub fn admit(&self, caller: &str) -> bool {
        self.admit_at(caller, Instant::now())
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Callers currently holding a window.
    pub fn tracked_callers(&self) -> usize {
        self.windows.len()
    }

    pub(crate) fn admit_at(&self, caller: &str, now: Instant) -> bool {
        if self.windows.len() > SWEEP_THRESHOLD && self.sweep_due(now) {
            self.sweep(now);
        }

        let mut timestamps = self.windows.entry(caller.to_string()).or_default();
        while timestamps
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= self.window)
        {
            timestamps.pop_front();
        }

        if timestamps.len() >= self.max_requests {
            tracing::warn!(
                caller = %redact_caller(caller),
                limit = self.max_requests,
                window_secs = self.window.as_secs(),
                "Rate limit exceeded"
            );
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Claims the next sweep slot if a full window has passed since the last.
    fn sweep_due(&self, now: Instant) -> bool {
        let mut last = self.last_sweep.lock();
        match *last {
            Some(at) if now.saturating_duration_since(at) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Forget callers whose newest request has left the window.
    fn sweep(&self, now: Instant) {
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            timestamps
                .back()
                .is_some_and(|&t| now.saturating_duration_since(t) < self.window)
        });
        tracing::debug!(
            before,
            after = self.windows.len(),
            "Swept idle rate-limit windows"
        );
    }
}

/// Resolve who a request counts against: the presented API key, else the
/// peer address, else a shared bucket.
pub fn caller_identity(api_key: Option<&str>, peer: Option<IpAddr>) -> String {
    match (api_key.map(str::trim).filter(|k| !k.is_empty()), peer) {
        (Some(key), _) => format!("key:{}", key),
        (None, Some(ip)) => format!("ip:{}", ip),
        (None, None) => "unknown".to_string(),
    }
}

fn redact_caller(caller: &str) -> String {
    match caller.strip_prefix("key:") {
        Some(key) => format!("key:{}", crate::config::redact(key)),
        None => caller.to_string(),
    }
}
