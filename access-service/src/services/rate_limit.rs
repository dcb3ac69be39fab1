//! Sliding-window rate limiting keyed by (identifier, action, origin).
//!
//! Each key holds a counter that resets once the window passes. Reaching an
//! action's attempt ceiling puts the key into a blocked state until
//! `window_reset_at + block_duration`; blocked attempts are rejected without
//! incrementing and without running the guarded operation. The first attempt
//! after the block lapses starts a fresh window.
//!
//! The window state lives behind `WindowStore` so deployments can keep it
//! in-process (DashMap) or share it across instances (Redis).

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::services::ServiceError;

/// Actions with independent rate-limit policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitAction {
    Login,
    PasswordReset,
    Api,
    SecondFactor,
}

impl LimitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitAction::Login => "login",
            LimitAction::PasswordReset => "password_reset",
            LimitAction::Api => "api",
            LimitAction::SecondFactor => "second_factor",
        }
    }
}

/// Attempt ceiling, window length and post-ceiling block length.
#[derive(Debug, Clone, Copy)]
pub struct LimitPolicy {
    pub max_attempts: u32,
    pub window: Duration,
    pub block: Duration,
}

impl LimitPolicy {
    pub const fn new(max_attempts: u32, window_secs: u64, block_secs: u64) -> Self {
        Self {
            max_attempts,
            window: Duration::from_secs(window_secs),
            block: Duration::from_secs(block_secs),
        }
    }
}

/// Per-action policies with the platform defaults.
#[derive(Debug, Clone, Copy)]
pub struct LimitPolicies {
    pub login: LimitPolicy,
    pub password_reset: LimitPolicy,
    pub api: LimitPolicy,
    pub second_factor: LimitPolicy,
}

impl Default for LimitPolicies {
    fn default() -> Self {
        Self {
            login: LimitPolicy::new(5, 15 * 60, 30 * 60),
            password_reset: LimitPolicy::new(3, 60 * 60, 60 * 60),
            api: LimitPolicy::new(100, 15 * 60, 15 * 60),
            second_factor: LimitPolicy::new(3, 5 * 60, 15 * 60),
        }
    }
}

impl LimitPolicies {
    pub fn for_action(&self, action: LimitAction) -> LimitPolicy {
        match action {
            LimitAction::Login => self.login,
            LimitAction::PasswordReset => self.password_reset,
            LimitAction::Api => self.api,
            LimitAction::SecondFactor => self.second_factor,
        }
    }
}

/// Outcome of an attempt against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    Allowed { remaining: u32 },
    Blocked { retry_after: Duration },
}

impl Permit {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Permit::Allowed { .. })
    }
}

/// Keyed window state backend.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Register one attempt against the key, applying the window algorithm
    /// atomically per key.
    async fn hit(
        &self,
        key: &str,
        policy: &LimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<Permit, ServiceError>;

    /// Drop windows whose state can no longer affect an outcome.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, ServiceError>;
}

#[derive(Debug, Clone)]
struct WindowState {
    count: u32,
    window_reset_at: DateTime<Utc>,
    blocked_until: Option<DateTime<Utc>>,
}

impl WindowState {
    fn fresh(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 0,
            window_reset_at: now
                + ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::seconds(0)),
            blocked_until: None,
        }
    }
}

/// Process-local window store over a concurrency-safe keyed map.
#[derive(Default)]
pub struct MemoryWindowStore {
    windows: DashMap<String, WindowState>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn hit(
        &self,
        key: &str,
        policy: &LimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<Permit, ServiceError> {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowState::fresh(now, policy.window));
        let state = entry.value_mut();

        if let Some(blocked_until) = state.blocked_until {
            if now < blocked_until {
                let retry_after = (blocked_until - now).to_std().unwrap_or(Duration::ZERO);
                return Ok(Permit::Blocked { retry_after });
            }
            // Block lapsed: the window fully resets on this attempt
            *state = WindowState::fresh(now, policy.window);
        }

        if now >= state.window_reset_at {
            *state = WindowState::fresh(now, policy.window);
        }

        state.count += 1;
        if state.count >= policy.max_attempts {
            // The attempt that reaches the ceiling still runs; everything
            // after it is rejected until the block lapses.
            state.blocked_until = Some(
                state.window_reset_at
                    + ChronoDuration::from_std(policy.block)
                        .unwrap_or_else(|_| ChronoDuration::seconds(0)),
            );
        }

        Ok(Permit::Allowed {
            remaining: policy.max_attempts.saturating_sub(state.count),
        })
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let before = self.windows.len();
        self.windows.retain(|_, state| match state.blocked_until {
            Some(blocked_until) => blocked_until > now,
            None => state.window_reset_at > now,
        });
        Ok(before.saturating_sub(self.windows.len()))
    }
}

/// Redis-backed window store for multi-instance deployments. The window
/// algorithm runs server-side in a Lua script so updates stay atomic per key.
#[derive(Clone)]
pub struct RedisWindowStore {
    manager: redis::aio::ConnectionManager,
    script: redis::Script,
}

const WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local block = tonumber(ARGV[3])
local max = tonumber(ARGV[4])

local fields = redis.call('HMGET', key, 'count', 'reset', 'blocked')
local count = tonumber(fields[1])
local reset = tonumber(fields[2])
local blocked = tonumber(fields[3])

if blocked and now < blocked then
  return {0, blocked - now}
end

if (not count) or (not reset) or blocked or now >= reset then
  redis.call('DEL', key)
  count = 0
  reset = now + window
end

count = count + 1
redis.call('HSET', key, 'count', count, 'reset', reset)
if count >= max then
  redis.call('HSET', key, 'blocked', reset + block)
end
redis.call('PEXPIRE', key, (reset + block) - now)

local remaining = max - count
if remaining < 0 then remaining = 0 end
return {1, remaining}
"#;

impl RedisWindowStore {
    pub async fn connect(url: &str) -> Result<Self, ServiceError> {
        tracing::info!(url = %url, "Connecting to Redis for rate-limit windows");
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await.map_err(|e| {
            ServiceError::StoreUnavailable(anyhow::anyhow!("Failed to connect to Redis: {}", e))
        })?;

        Ok(Self {
            manager,
            script: redis::Script::new(WINDOW_SCRIPT),
        })
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn hit(
        &self,
        key: &str,
        policy: &LimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<Permit, ServiceError> {
        let mut conn = self.manager.clone();
        let (allowed, value): (i64, i64) = self
            .script
            .key(format!("rlw:{}", key))
            .arg(now.timestamp_millis())
            .arg(policy.window.as_millis() as i64)
            .arg(policy.block.as_millis() as i64)
            .arg(i64::from(policy.max_attempts))
            .invoke_async(&mut conn)
            .await?;

        if allowed == 1 {
            Ok(Permit::Allowed {
                remaining: value.max(0) as u32,
            })
        } else {
            Ok(Permit::Blocked {
                retry_after: Duration::from_millis(value.max(0) as u64),
            })
        }
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, ServiceError> {
        // Keys carry a PEXPIRE; Redis reclaims them on its own
        Ok(0)
    }
}

/// The rate limiter: policies plus a window store.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    store: Arc<dyn WindowStore>,
    policies: LimitPolicies,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn WindowStore>, policies: LimitPolicies) -> Self {
        Self { store, policies }
    }

    pub fn policies(&self) -> &LimitPolicies {
        &self.policies
    }

    /// Register an attempt for (identifier, action, origin).
    ///
    /// A store failure lets the attempt through with a warning: brute-force
    /// protection degrades to the lockout guard rather than turning a cache
    /// outage into a login outage.
    pub async fn check(
        &self,
        action: LimitAction,
        identifier: &str,
        origin: Option<IpAddr>,
    ) -> Permit {
        let policy = self.policies.for_action(action);
        let origin_key = origin
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "-".to_string());
        let key = format!("{}:{}:{}", action.as_str(), identifier, origin_key);

        match self.store.hit(&key, &policy, Utc::now()).await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::warn!(error = %e, action = action.as_str(), "Rate-limit store unavailable; letting attempt through");
                Permit::Allowed { remaining: 0 }
            }
        }
    }

    pub async fn purge_expired(&self) -> Result<usize, ServiceError> {
        self.store.purge_expired(Utc::now()).await
    }
}
