use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Fixed-window request budget per client key (usually the remote IP)
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, (u32, Instant)>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request for `key`; false once the budget for the current window is spent.
    pub async fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().await;

        // Forget clients whose window has lapsed so the map stays bounded.
        let window = self.window;
        windows.retain(|_, (_, start)| now.duration_since(*start) <= window);

        let (count, _) = windows.entry(key.to_string()).or_insert((0, now));
        if *count >= self.max_requests {
            return false;
        }
        *count += 1;
        true
    }
}

impl From<&common::RateLimitConfig> for RateLimiter {
    fn from(cfg: &common::RateLimitConfig) -> Self {
        Self::new(cfg.max_requests, Duration::from_secs(cfg.window_seconds))
    }
}
