use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::crypto::credentials::CredentialVerifier;
use crate::crypto::signer::HmacSha256Signer;
use crate::error::{AppError, Result};
use crate::services::rate_limit::{
    MemoryRateLimiter, RateLimitPolicy, RateLimiter, RedisRateLimiter,
};
use crate::services::revalidation::{RevalidationDispatcher, WebhookInvalidator};
use crate::services::session::SessionCodec;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// Time source shared by sessions and the rate limiter.
    pub clock: Arc<dyn Clock>,
    /// Checks the admin password.
    pub credentials: CredentialVerifier,
    /// Issues and validates session tokens.
    pub sessions: SessionCodec,
    /// Login throttle.
    pub rate_limiter: RateLimiter,
    /// Purges public pages after admin writes.
    pub revalidator: RevalidationDispatcher<WebhookInvalidator>,
}

impl AppState {
    /// Creates a new `AppState` on the system clock.
    ///
    /// Connects to Redis when `REDIS_URL` is configured, otherwise keeps the
    /// login throttle in process memory.
    pub async fn new(config: &Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let policy = rate_limit_policy(config);

        let rate_limiter = match &config.redis_url {
            Some(url) => {
                let redis_client = redis::Client::open(url.as_str())?;
                let redis = ConnectionManager::new(redis_client).await?;
                tracing::info!("✅ Redis rate limiter initialized");
                RateLimiter::Redis(RedisRateLimiter::new(policy, clock.clone(), redis))
            }
            None => {
                tracing::info!("✅ In-memory rate limiter initialized");
                RateLimiter::Memory(MemoryRateLimiter::new(policy, clock.clone()))
            }
        };

        Self::with_parts(config, clock, rate_limiter)
    }

    /// Assembles the state from an explicit clock and rate limiter.
    pub fn with_parts(
        config: &Config,
        clock: Arc<dyn Clock>,
        rate_limiter: RateLimiter,
    ) -> Result<Self> {
        let signer = HmacSha256Signer::new(&config.session_secret)
            .map_err(|e| AppError::Internal(format!("Invalid session secret: {}", e)))?;
        let sessions = SessionCodec::new(
            Arc::new(signer),
            clock.clone(),
            config.session_duration,
            config.session_renewal_threshold,
        );

        let invalidator = WebhookInvalidator::new(
            config.revalidate_url.clone(),
            config.revalidate_secret.clone(),
        )
        .map_err(|e| AppError::Internal(format!("HTTP client setup failed: {}", e)))?;

        Ok(AppState {
            config: config.clone(),
            clock,
            credentials: CredentialVerifier::new(&config.admin_password),
            sessions,
            rate_limiter,
            revalidator: RevalidationDispatcher::new(invalidator),
        })
    }
}

/// The login throttle limits from configuration.
pub fn rate_limit_policy(config: &Config) -> RateLimitPolicy {
    RateLimitPolicy {
        max_attempts: config.rate_limit_max_attempts,
        window: config.rate_limit_window,
        lockout: config.rate_limit_lockout,
    }
}
