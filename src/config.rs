use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Duration;
use zeroize::Zeroizing;

/// Minimum HMAC key length (32 bytes = 256 bits for HMAC-SHA256).
pub const MIN_SESSION_SECRET_LEN: usize = 32;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The administrator password checked at login.
    pub admin_password: Zeroizing<String>,
    /// The key used to sign session tokens.
    pub session_secret: Zeroizing<Vec<u8>>,
    /// How long an issued session stays valid.
    pub session_duration: Duration,
    /// Remaining lifetime under which a session counts as expiring soon.
    pub session_renewal_threshold: Duration,
    /// Failed logins allowed inside one window before lockout.
    pub rate_limit_max_attempts: u32,
    /// The window failed logins are counted in.
    pub rate_limit_window: Duration,
    /// How long a client stays blocked once locked out.
    pub rate_limit_lockout: Duration,
    /// Whether forwarded-for headers are trusted to identify clients.
    pub trust_proxy_headers: bool,
    /// The URL of the Redis server. When unset the rate limiter stays in memory.
    pub redis_url: Option<String>,
    /// Webhook that purges cached public pages.
    pub revalidate_url: Option<String>,
    /// Shared secret sent to the revalidation webhook.
    pub revalidate_secret: Option<Zeroizing<String>>,
    /// Address the server listens on.
    pub bind_addr: SocketAddr,
    /// Root directory of the static site.
    pub public_dir: String,
    /// Whether the app runs in production (secure cookies).
    pub production: bool,
}

/// Upper bound on any configured lifetime, window or lockout.
pub const MAX_CONFIGURED_DURATION_DAYS: i64 = 365;

/// Reads an optional setting from `source`, falling back to `default`.
fn env_or<T>(source: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match source(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        _ => Ok(default),
    }
}

fn env_opt(source: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    source(key).filter(|v| !v.trim().is_empty())
}

/// Turns a positive amount of `unit`s into a bounded `Duration`.
fn positive_duration(
    key: &str,
    amount: i64,
    unit: fn(i64) -> Option<Duration>,
) -> Result<Duration> {
    if amount <= 0 {
        anyhow::bail!("{} must be positive", key);
    }

    let duration = unit(amount)
        .filter(|d| *d <= Duration::days(MAX_CONFIGURED_DURATION_DAYS))
        .with_context(|| {
            format!(
                "{} must not exceed {} days",
                key, MAX_CONFIGURED_DURATION_DAYS
            )
        })?;
    Ok(duration)
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds a `Config` from any key lookup shaped like the process environment.
    pub fn from_source(source: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let admin_password =
            Zeroizing::new(source("ADMIN_PASSWORD").context("ADMIN_PASSWORD must be set")?);
        if admin_password.is_empty() {
            anyhow::bail!("ADMIN_PASSWORD must not be empty");
        }

        let session_secret = Zeroizing::new(
            source("SESSION_SECRET")
                .context("SESSION_SECRET must be set (generate with: openssl rand -hex 32)")?
                .into_bytes(),
        );
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            anyhow::bail!(
                "SESSION_SECRET must be at least {} bytes",
                MIN_SESSION_SECRET_LEN
            );
        }

        let session_duration = positive_duration(
            "SESSION_DURATION_HOURS",
            env_or(&source, "SESSION_DURATION_HOURS", 12)?,
            Duration::try_hours,
        )?;
        let session_renewal_threshold = positive_duration(
            "SESSION_RENEWAL_MINUTES",
            env_or(&source, "SESSION_RENEWAL_MINUTES", 60)?,
            Duration::try_minutes,
        )?;
        let rate_limit_window = positive_duration(
            "RATE_LIMIT_WINDOW_MINUTES",
            env_or(&source, "RATE_LIMIT_WINDOW_MINUTES", 15)?,
            Duration::try_minutes,
        )?;
        let rate_limit_lockout = positive_duration(
            "RATE_LIMIT_LOCKOUT_MINUTES",
            env_or(&source, "RATE_LIMIT_LOCKOUT_MINUTES", 15)?,
            Duration::try_minutes,
        )?;

        let max_attempts: u32 = env_or(&source, "RATE_LIMIT_MAX_ATTEMPTS", 5)?;
        if max_attempts == 0 {
            anyhow::bail!("RATE_LIMIT_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            admin_password,
            session_secret,
            session_duration,
            session_renewal_threshold,
            rate_limit_max_attempts: max_attempts,
            rate_limit_window,
            rate_limit_lockout,
            trust_proxy_headers: env_or(&source, "TRUST_PROXY_HEADERS", false)?,
            redis_url: env_opt(&source, "REDIS_URL"),
            revalidate_url: env_opt(&source, "REVALIDATE_URL"),
            revalidate_secret: env_opt(&source, "REVALIDATE_SECRET").map(Zeroizing::new),
            bind_addr: env_or(
                &source,
                "BIND_ADDR",
                SocketAddr::from(([127, 0, 0, 1], 3000)),
            )?,
            public_dir: env_opt(&source, "PUBLIC_DIR").unwrap_or_else(|| "public".to_string()),
            production: source("APP_ENV").is_some_and(|v| v == "production"),
        })
    }

    /// A configuration with defaults and the given secrets, used by tests and tooling.
    pub fn with_secrets(admin_password: &str, session_secret: &[u8]) -> Self {
        Self {
            admin_password: Zeroizing::new(admin_password.to_string()),
            session_secret: Zeroizing::new(session_secret.to_vec()),
            session_duration: Duration::hours(12),
            session_renewal_threshold: Duration::minutes(60),
            rate_limit_max_attempts: 5,
            rate_limit_window: Duration::minutes(15),
            rate_limit_lockout: Duration::minutes(15),
            trust_proxy_headers: false,
            redis_url: None,
            revalidate_url: None,
            revalidate_secret: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            public_dir: "public".to_string(),
            production: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let mut vars: HashMap<String, String> = HashMap::from([
            ("ADMIN_PASSWORD".to_string(), "hunter2".to_string()),
            (
                "SESSION_SECRET".to_string(),
                "0123456789abcdef0123456789abcdef".to_string(),
            ),
        ]);
        for (key, value) in pairs {
            vars.insert(key.to_string(), value.to_string());
        }
        Config::from_source(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[]).unwrap();
        assert_eq!(config.session_duration, Duration::hours(12));
        assert_eq!(config.session_renewal_threshold, Duration::minutes(60));
        assert_eq!(config.rate_limit_max_attempts, 5);
        assert_eq!(config.rate_limit_window, Duration::minutes(15));
        assert_eq!(config.rate_limit_lockout, Duration::minutes(15));
        assert!(!config.trust_proxy_headers);
        assert!(!config.production);
    }

    #[test]
    fn zero_or_negative_durations_are_rejected() {
        for key in [
            "SESSION_DURATION_HOURS",
            "SESSION_RENEWAL_MINUTES",
            "RATE_LIMIT_WINDOW_MINUTES",
            "RATE_LIMIT_LOCKOUT_MINUTES",
        ] {
            assert!(load(&[(key, "0")]).is_err(), "{key}=0 accepted");
            assert!(load(&[(key, "-5")]).is_err(), "{key}=-5 accepted");
        }
    }

    #[test]
    fn oversized_durations_are_rejected_without_panicking() {
        assert!(load(&[("SESSION_DURATION_HOURS", "9223372036854775807")]).is_err());
        assert!(load(&[("RATE_LIMIT_LOCKOUT_MINUTES", "9223372036854775807")]).is_err());
        assert!(load(&[("SESSION_DURATION_HOURS", "8761")]).is_err());
        assert!(load(&[("SESSION_DURATION_HOURS", "8760")]).is_ok());
    }

    #[test]
    fn missing_or_weak_secrets_are_rejected() {
        assert!(load(&[("SESSION_SECRET", "short")]).is_err());
        assert!(load(&[("ADMIN_PASSWORD", "")]).is_err());
        assert!(load(&[("RATE_LIMIT_MAX_ATTEMPTS", "0")]).is_err());
    }

    #[test]
    fn proxy_headers_are_opt_in() {
        assert!(load(&[("TRUST_PROXY_HEADERS", "true")]).unwrap().trust_proxy_headers);
    }
}
