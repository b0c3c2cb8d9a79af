//! Per-tenant sliding-window rate limiter. Granularity is
//! deliberately per-process — no
//! cross-process coordination.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Drops timestamps older than `now - 1.0s`; if the remaining count is
    /// already `>= rps`, rejects; otherwise records `now` and accepts.
    pub fn allow(&self, tenant_id: &str, rps: i32) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let entry = windows.entry(tenant_id.to_string()).or_default();

        while let Some(&front) = entry.front() {
            if now.duration_since(front) > WINDOW {
                entry.pop_front();
            } else {
                break;
            }
        }

        if entry.len() as i32 >= rps {
            return false;
        }
        entry.push_back(now);
        true
    }
}
