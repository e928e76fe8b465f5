//! Per-client token-bucket admission control
//!
//! Guards the HTTP surface. Each client key (source address) owns a bucket
//! holding up to `burst` tokens that refills continuously at `rate`
//! tokens/second. A background sweep evicts buckets idle past a retention
//! window so the map stays bounded. State is process-local.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// How often the eviction sweep runs
const EVICTION_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Idle time after which a bucket is evicted
const BUCKET_RETENTION: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_seen: Instant,
}

pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    rate: f64,
    burst: f64,
}

impl RateLimiter {
    /// `rate` is tokens/second, `burst` the bucket capacity.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rate,
            burst: f64::from(burst),
        }
    }

    /// Admit or reject one request for `key`.
    ///
    /// First sight lazily creates the bucket seeded at `burst - 1`: the
    /// request that created it has already consumed its token.
    pub async fn allow(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();

        let Some(bucket) = buckets.get_mut(key) else {
            buckets.insert(
                key.to_string(),
                Bucket {
                    tokens: self.burst - 1.0,
                    last_seen: now,
                },
            );
            return true;
        };

        // Refill proportionally to elapsed time, capped at burst
        let elapsed = now.duration_since(bucket.last_seen).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_seen = now;

        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }

    /// Drop buckets idle beyond the retention window.
    #[instrument(skip(self))]
    pub async fn evict_idle(&self) {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        let now = Instant::now();
        buckets.retain(|_, b| now.duration_since(b.last_seen) < BUCKET_RETENTION);
        let evicted = before - buckets.len();
        if evicted > 0 {
            debug!("evicted {evicted} idle rate-limit buckets");
        }
    }

    /// Number of tracked buckets (observability/testing).
    pub async fn bucket_count(&self) -> usize {
        self.buckets.lock().await.len()
    }

    /// Spawn the daemon-style eviction sweep. The task runs until aborted on
    /// shutdown.
    pub fn spawn_eviction_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EVICTION_INTERVAL);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                limiter.evict_idle().await;
            }
        })
    }
}
