use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_per_window: u32,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_per_window: 10,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Messages seen from the domain in the current window, this one included.
    pub count: u32,
}

/// Per-sender-domain message counter. Kept behind a trait so a shared store
/// can replace the in-process map when more than one instance takes mail.
pub trait SenderRateLimiter: Send + Sync {
    /// Count one message from `domain` and say whether it is within the limit.
    fn check(&self, domain: &str) -> RateLimitDecision;

    fn reset_all(&self);
}

#[derive(Debug, Clone)]
struct WindowCount {
    count: u32,
    window_start: DateTime<Utc>,
}

/// Fixed-window counter keyed by lower-cased domain, cleared wholesale by
/// [`DomainRateLimiter::spawn_reset_task`].
#[derive(Clone)]
pub struct DomainRateLimiter {
    store: Arc<DashMap<String, WindowCount>>,
    policy: RateLimitPolicy,
}

impl DomainRateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Clear every counter once per window until `shutdown` fires.
    pub fn spawn_reset_task(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(limiter.policy.window);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("rate limiter reset task stopping");
                        break;
                    }
                    _ = ticker.tick() => limiter.reset_all(),
                }
            }
        })
    }
}

impl Default for DomainRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}

impl SenderRateLimiter for DomainRateLimiter {
    fn check(&self, domain: &str) -> RateLimitDecision {
        let now = Utc::now();
        let window = chrono::Duration::from_std(self.policy.window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));

        let mut entry = self
            .store
            .entry(domain.trim().to_ascii_lowercase())
            .or_insert_with(|| WindowCount {
                count: 0,
                window_start: now,
            });
        let data = entry.value_mut();

        // Covers the gap if the reset task is not running
        if now.signed_duration_since(data.window_start) >= window {
            data.count = 0;
            data.window_start = now;
        }

        data.count = data.count.saturating_add(1);
        RateLimitDecision {
            allowed: data.count <= self.policy.max_per_window,
            count: data.count,
        }
    }

    fn reset_all(&self) {
        debug!(domains = self.store.len(), "resetting sender rate limits");
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eleventh_message_is_rejected() {
        let limiter = DomainRateLimiter::default();
        for n in 1..=10 {
            let decision = limiter.check("news.example.com");
            assert!(decision.allowed, "message {n} was rejected");
            assert_eq!(decision.count, n);
        }
        let eleventh = limiter.check("news.example.com");
        assert!(!eleventh.allowed);
        assert_eq!(eleventh.count, 11);
    }

    #[test]
    fn test_domains_are_isolated() {
        let limiter = DomainRateLimiter::new(RateLimitPolicy {
            max_per_window: 2,
            window: Duration::from_secs(60),
        });
        for _ in 0..5 {
            limiter.check("a.example.com");
        }
        assert!(!limiter.check("a.example.com").allowed);
        assert_eq!(
            limiter.check("b.example.com"),
            RateLimitDecision {
                allowed: true,
                count: 1
            }
        );
    }

    #[test]
    fn test_domain_key_is_case_insensitive() {
        let limiter = DomainRateLimiter::default();
        limiter.check("Example.COM");
        assert_eq!(limiter.check("example.com").count, 2);
    }

    #[test]
    fn test_reset_all_clears_counts() {
        let limiter = DomainRateLimiter::default();
        for _ in 0..11 {
            limiter.check("example.com");
        }
        limiter.reset_all();
        assert_eq!(limiter.check("example.com").count, 1);
    }

    #[test]
    fn test_expired_window_restarts_count() {
        let limiter = DomainRateLimiter::new(RateLimitPolicy {
            max_per_window: 1,
            window: Duration::ZERO,
        });
        assert!(limiter.check("example.com").allowed);
        assert!(limiter.check("example.com").allowed);
    }

    #[tokio::test]
    async fn test_reset_task_clears_each_window() {
        let limiter = DomainRateLimiter::new(RateLimitPolicy {
            max_per_window: 10,
            window: Duration::from_millis(50),
        });
        let shutdown = CancellationToken::new();
        let handle = limiter.spawn_reset_task(shutdown.clone());

        limiter.check("example.com");
        limiter.check("example.com");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(limiter.store.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
