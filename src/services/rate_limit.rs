use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::clock::Clock;
use crate::error::Result;

/// Fixed limits applied to failed logins.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    /// Failures allowed inside one window; reaching it triggers the lockout.
    pub max_attempts: u32,
    /// How long failures keep counting after the first one.
    pub window: Duration,
    /// How long a client stays blocked.
    pub lockout: Duration,
}

/// Result of checking a client before a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub remaining_attempts: u32,
    pub blocked_until: Option<DateTime<Utc>>,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RateLimitRecord {
    failure_count: u32,
    blocked_until: Option<DateTime<Utc>>,
    window_start: DateTime<Utc>,
}

impl RateLimitRecord {
    fn is_stale(&self, now: DateTime<Utc>, policy: &RateLimitPolicy) -> bool {
        let block_over = self.blocked_until.is_none_or(|until| now >= until);
        block_over && now - self.window_start >= policy.window
    }
}

/// Failed-login tracker for a single process.
#[derive(Clone)]
pub struct MemoryRateLimiter {
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    records: Arc<Mutex<HashMap<String, RateLimitRecord>>>,
}

impl MemoryRateLimiter {
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, RateLimitRecord>> {
        // A poisoned map only ever holds counters; keep using it.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn check(&self, identifier: &str) -> RateLimitStatus {
        let now = self.clock.now();
        let records = self.records();

        let record = match records.get(identifier) {
            Some(record) if !record.is_stale(now, &self.policy) => record,
            _ => {
                return RateLimitStatus {
                    allowed: true,
                    remaining_attempts: self.policy.max_attempts,
                    blocked_until: None,
                    reset_at: now + self.policy.window,
                };
            }
        };

        if let Some(until) = record.blocked_until.filter(|until| now < *until) {
            return RateLimitStatus {
                allowed: false,
                remaining_attempts: 0,
                blocked_until: Some(until),
                reset_at: until,
            };
        }

        // An expired block leaves a fresh allowance behind.
        if record.blocked_until.is_some() || now - record.window_start >= self.policy.window {
            return RateLimitStatus {
                allowed: true,
                remaining_attempts: self.policy.max_attempts,
                blocked_until: None,
                reset_at: now + self.policy.window,
            };
        }

        RateLimitStatus {
            allowed: true,
            remaining_attempts: self.policy.max_attempts.saturating_sub(record.failure_count),
            blocked_until: None,
            reset_at: record.window_start + self.policy.window,
        }
    }

    pub fn record_failure(&self, identifier: &str) {
        let now = self.clock.now();
        let mut records = self.records();

        let record = records
            .entry(identifier.to_string())
            .or_insert_with(|| RateLimitRecord {
                failure_count: 0,
                blocked_until: None,
                window_start: now,
            });

        let block_expired = record.blocked_until.is_some_and(|until| now >= until);
        if block_expired || now - record.window_start >= self.policy.window {
            record.failure_count = 0;
            record.blocked_until = None;
            record.window_start = now;
        }

        record.failure_count += 1;
        if record.failure_count >= self.policy.max_attempts && record.blocked_until.is_none() {
            record.blocked_until = Some(now + self.policy.lockout);
            tracing::warn!(
                "🚫 Client {} locked out until {}",
                identifier,
                now + self.policy.lockout
            );
        }
    }

    pub fn reset(&self, identifier: &str) {
        self.records().remove(identifier);
    }

    /// Drops records whose window and block have both lapsed.
    ///
    /// # Returns
    ///
    /// The number of evicted records.
    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, record| !record.is_stale(now, &self.policy));
        before - records.len()
    }
}

/// Failed-login tracker shared across instances through Redis.
///
/// Uses a counter key that lives for one window and a block key that lives
/// for one lockout; Redis expiry does the eviction.
#[derive(Clone)]
pub struct RedisRateLimiter {
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    redis: ConnectionManager,
}

impl RedisRateLimiter {
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>, redis: ConnectionManager) -> Self {
        Self {
            policy,
            clock,
            redis,
        }
    }

    fn count_key(identifier: &str) -> String {
        format!("rate_limit:login:{}", identifier)
    }

    fn block_key(identifier: &str) -> String {
        format!("rate_limit:login_block:{}", identifier)
    }

    pub async fn check(&self, identifier: &str) -> Result<RateLimitStatus> {
        let mut redis = self.redis.clone();
        let now = self.clock.now();

        let block_ttl: i64 = redis.ttl(Self::block_key(identifier)).await?;
        if block_ttl > 0 {
            let until = now + Duration::seconds(block_ttl);
            return Ok(RateLimitStatus {
                allowed: false,
                remaining_attempts: 0,
                blocked_until: Some(until),
                reset_at: until,
            });
        }

        let key = Self::count_key(identifier);
        let count: Option<u32> = redis.get(&key).await?;
        let count_ttl: i64 = redis.ttl(&key).await?;
        let reset_at = if count_ttl > 0 {
            now + Duration::seconds(count_ttl)
        } else {
            now + self.policy.window
        };

        Ok(RateLimitStatus {
            allowed: true,
            remaining_attempts: self.policy.max_attempts.saturating_sub(count.unwrap_or(0)),
            blocked_until: None,
            reset_at,
        })
    }

    pub async fn record_failure(&self, identifier: &str) -> Result<()> {
        let mut redis = self.redis.clone();
        let key = Self::count_key(identifier);

        let count: u32 = redis.incr(&key, 1).await?;
        if count == 1 {
            let _: () = redis
                .expire(&key, self.policy.window.num_seconds().max(1))
                .await?;
        }

        if count >= self.policy.max_attempts {
            let _: () = redis
                .set_ex(
                    Self::block_key(identifier),
                    "1",
                    self.policy.lockout.num_seconds().max(1) as u64,
                )
                .await?;
            let _: () = redis.del(&key).await?;
            tracing::warn!("🚫 Client {} locked out", identifier);
        }

        Ok(())
    }

    pub async fn reset(&self, identifier: &str) -> Result<()> {
        let mut redis = self.redis.clone();
        let _: () = redis
            .del(&[Self::count_key(identifier), Self::block_key(identifier)])
            .await?;
        Ok(())
    }
}

/// The login throttle, either process-local or backed by Redis.
#[derive(Clone)]
pub enum RateLimiter {
    Memory(MemoryRateLimiter),
    Redis(RedisRateLimiter),
}

impl RateLimiter {
    pub async fn check(&self, identifier: &str) -> Result<RateLimitStatus> {
        match self {
            RateLimiter::Memory(limiter) => Ok(limiter.check(identifier)),
            RateLimiter::Redis(limiter) => limiter.check(identifier).await,
        }
    }

    pub async fn record_failure(&self, identifier: &str) -> Result<()> {
        match self {
            RateLimiter::Memory(limiter) => {
                limiter.record_failure(identifier);
                Ok(())
            }
            RateLimiter::Redis(limiter) => limiter.record_failure(identifier).await,
        }
    }

    pub async fn reset(&self, identifier: &str) -> Result<()> {
        match self {
            RateLimiter::Memory(limiter) => {
                limiter.reset(identifier);
                Ok(())
            }
            RateLimiter::Redis(limiter) => limiter.reset(identifier).await,
        }
    }

    /// Evicts stale in-memory records. Redis expires its own keys.
    pub fn prune(&self) -> usize {
        match self {
            RateLimiter::Memory(limiter) => limiter.prune(),
            RateLimiter::Redis(_) => 0,
        }
    }
}

/// Renders a wait time the way it is shown to users, e.g. "14 minutes".
pub fn format_remaining(remaining: Duration) -> String {
    let seconds = remaining.num_seconds().max(1);
    if seconds < 60 {
        return plural(seconds, "second");
    }

    // Round up so "0 minutes" is never shown while still blocked.
    let minutes = (seconds + 59) / 60;
    if minutes < 60 {
        return plural(minutes, "minute");
    }

    let hours = minutes / 60;
    let rest = minutes % 60;
    if rest == 0 {
        plural(hours, "hour")
    } else {
        format!("{} {}", plural(hours, "hour"), plural(rest, "minute"))
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}
