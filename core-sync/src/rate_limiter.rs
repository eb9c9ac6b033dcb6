//! # Rate Limiter
//!
//! Dual-budget request gate for the catalog API.
//!
//! The API grants separate per-minute quotas to authenticated and anonymous
//! callers and reports what is left on every response. The limiter tracks
//! both budgets, sleeps a caller once its budget drops to the low-water mark,
//! and absorbs explicit "too many requests" replies by waiting them out.
//!
//! The internal lock is never held across a sleep, so [`RateLimiter::status`]
//! answers immediately even while a caller is waiting for the window to roll.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::rate_limiter::{RateLimiter, RequestClass};
//!
//! let limiter = RateLimiter::new();
//! limiter.wait(RequestClass::Authenticated).await;
//! limiter.decrement(RequestClass::Authenticated).await;
//! // ... execute the request ...
//! limiter.update_from_headers(&response.headers).await;
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_AUTH_LIMIT: u32 = 60;
pub const DEFAULT_ANON_LIMIT: u32 = 25;
pub const LOW_WATER_MARK: u32 = 2;

const HEADER_AUTH_LIMIT: &str = "x-discogs-ratelimit-auth";
const HEADER_AUTH_REMAINING: &str = "x-discogs-ratelimit-auth-remaining";
const HEADER_ANON_LIMIT: &str = "x-discogs-ratelimit";
const HEADER_ANON_REMAINING: &str = "x-discogs-ratelimit-remaining";

/// Which quota a request is charged against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    Authenticated,
    Anonymous,
}

impl RequestClass {
    pub fn from_authenticated(authenticated: bool) -> Self {
        if authenticated {
            RequestClass::Authenticated
        } else {
            RequestClass::Anonymous
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub window: Duration,
    pub default_auth_limit: u32,
    pub default_anon_limit: u32,
    /// Callers sleep once remaining is at or below this value
    pub low_water_mark: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window: RATE_LIMIT_WINDOW,
            default_auth_limit: DEFAULT_AUTH_LIMIT,
            default_anon_limit: DEFAULT_ANON_LIMIT,
            low_water_mark: LOW_WATER_MARK,
        }
    }
}

/// Point-in-time view of both budgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub auth_remaining: u32,
    pub auth_limit: u32,
    pub anon_remaining: u32,
    pub anon_limit: u32,
    pub is_rate_limited: bool,
    /// Seconds until the limiter releases (when limited) or the window rolls
    pub seconds_until_reset: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateBudget {
    remaining: u32,
    /// Last advertised limit, or the default until the API reports one
    limit: u32,
}

impl RateBudget {
    fn full(limit: u32) -> Self {
        Self {
            remaining: limit,
            limit,
        }
    }

    fn refill(&mut self) {
        self.remaining = self.limit;
    }
}

#[derive(Debug)]
struct LimiterState {
    auth: RateBudget,
    anon: RateBudget,
    window_start: Instant,
    limited_until: Option<Instant>,
}

impl LimiterState {
    fn budget(&self, class: RequestClass) -> &RateBudget {
        match class {
            RequestClass::Authenticated => &self.auth,
            RequestClass::Anonymous => &self.anon,
        }
    }

    fn budget_mut(&mut self, class: RequestClass) -> &mut RateBudget {
        match class {
            RequestClass::Authenticated => &mut self.auth,
            RequestClass::Anonymous => &mut self.anon,
        }
    }

    fn reset(&mut self, now: Instant) {
        self.auth.refill();
        self.anon.refill();
        self.window_start = now;
        self.limited_until = None;
    }

    fn roll_window(&mut self, now: Instant, window: Duration) {
        if now >= self.window_start + window {
            self.reset(now);
        }
    }
}

/// Request-budget gate shared by every catalog call in the process
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: RwLock<LimiterState>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_config(RateLimiterConfig::default())
    }

    pub fn with_config(config: RateLimiterConfig) -> Self {
        let state = LimiterState {
            auth: RateBudget::full(config.default_auth_limit),
            anon: RateBudget::full(config.default_anon_limit),
            window_start: Instant::now(),
            limited_until: None,
        };

        Self {
            config,
            state: RwLock::new(state),
        }
    }

    /// Block until a request of `class` may be sent.
    ///
    /// Returns immediately while the budget is above the low-water mark.
    /// Otherwise sleeps until the current window elapses and refills both
    /// budgets.
    pub async fn wait(&self, class: RequestClass) {
        let deadline = {
            let mut state = self.state.write().await;
            let now = Instant::now();
            state.roll_window(now, self.config.window);

            let remaining = state.budget(class).remaining;
            if remaining > self.config.low_water_mark {
                return;
            }

            let deadline = state.window_start + self.config.window;
            state.limited_until = Some(deadline);

            warn!(
                ?class,
                remaining,
                wait_secs = deadline.saturating_duration_since(now).as_secs(),
                "Request budget at low-water mark, waiting for window reset"
            );
            deadline
        };

        sleep_until(deadline).await;

        let mut state = self.state.write().await;
        let now = Instant::now();
        // Another waiter may already have rolled the window
        if now >= state.window_start + self.config.window {
            state.reset(now);
            debug!(
                auth_remaining = state.auth.remaining,
                anon_remaining = state.anon.remaining,
                "Rate limit window reset"
            );
        } else if state.limited_until.is_some_and(|until| until <= now) {
            state.limited_until = None;
        }
    }

    /// Charge one request against `class` before its response arrives.
    pub async fn decrement(&self, class: RequestClass) {
        let mut state = self.state.write().await;
        let budget = state.budget_mut(class);
        budget.remaining = budget.remaining.saturating_sub(1);
        debug!(?class, remaining = budget.remaining, "Request budget decremented");
    }

    /// Overwrite limits and remaining counts from response headers.
    ///
    /// Header names are matched case-insensitively. A header that is missing
    /// or unparsable leaves the tracked value untouched.
    pub async fn update_from_headers(&self, headers: &HashMap<String, String>) {
        let auth_limit = header_value(headers, HEADER_AUTH_LIMIT);
        let auth_remaining = header_value(headers, HEADER_AUTH_REMAINING);
        let anon_limit = header_value(headers, HEADER_ANON_LIMIT);
        let anon_remaining = header_value(headers, HEADER_ANON_REMAINING);

        if auth_limit.is_none()
            && auth_remaining.is_none()
            && anon_limit.is_none()
            && anon_remaining.is_none()
        {
            return;
        }

        let mut state = self.state.write().await;
        apply_headers(&mut state.auth, auth_limit, auth_remaining);
        apply_headers(&mut state.anon, anon_limit, anon_remaining);

        debug!(
            auth_remaining = state.auth.remaining,
            auth_limit = state.auth.limit,
            anon_remaining = state.anon.remaining,
            anon_limit = state.anon.limit,
            "Rate limit headers applied"
        );
    }

    /// Wait out an explicit "too many requests" reply, then refill both
    /// budgets. A non-positive `retry_after_secs` waits the full window.
    pub async fn wait_for_reset(&self, retry_after_secs: i64) {
        let pause = u64::try_from(retry_after_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(self.config.window);

        let deadline = {
            let mut state = self.state.write().await;
            let deadline = Instant::now() + pause;
            state.limited_until = Some(deadline);
            deadline
        };

        warn!(wait_secs = pause.as_secs(), "Rate limited by catalog API, waiting for reset");
        sleep_until(deadline).await;

        let mut state = self.state.write().await;
        state.reset(Instant::now());
        debug!("Rate limit cleared after explicit reset");
    }

    pub async fn status(&self) -> RateLimitStatus {
        let state = self.state.read().await;
        let now = Instant::now();

        let limited_until = state.limited_until.filter(|until| *until > now);
        let reset_at = limited_until.unwrap_or(state.window_start + self.config.window);
        let wait = reset_at.saturating_duration_since(now);
        let seconds_until_reset = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);

        RateLimitStatus {
            auth_remaining: state.auth.remaining,
            auth_limit: state.auth.limit,
            anon_remaining: state.anon.remaining,
            anon_limit: state.anon.limit,
            is_rate_limited: limited_until.is_some(),
            seconds_until_reset,
        }
    }

    pub async fn is_rate_limited(&self) -> bool {
        self.status().await.is_rate_limited
    }
}

fn header_value(headers: &HashMap<String, String>, name: &str) -> Option<u32> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value.trim().parse::<u32>().ok())
}

fn apply_headers(budget: &mut RateBudget, limit: Option<u32>, remaining: Option<u32>) {
    if let Some(limit) = limit.filter(|limit| *limit > 0) {
        budget.limit = limit;
    }
    if let Some(remaining) = remaining {
        budget.remaining = remaining;
    }
}

// ============================================================================
// Tests
// ============================================================================
