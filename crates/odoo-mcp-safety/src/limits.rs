//! Per-session rate limiting
//!
//! Independent read and write budgets plus global per-minute/per-hour
//! budgets and a one-second burst allowance, all keyed by MCP session.
//! Backed by governor's keyed GCRA state, which uses monotonic time and is
//! safe under concurrent tool invocations.

use std::num::NonZeroU32;

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter as Governor};
use odoo_mcp_config::RateLimitConfig;
use thiserror::Error;

use crate::Operation;

type Keyed = Governor<String, DashMapStateStore<String>, DefaultClock>;

/// Budget exhausted; carries the wait before the next slot opens
#[derive(Debug, Error)]
#[error("{scope} rate limit exceeded, retry after {retry_after}s")]
pub struct RateLimitExceeded {
    pub scope: &'static str,
    pub retry_after: u64,
}

struct Budget {
    scope: &'static str,
    limiter: Keyed,
}

impl Budget {
    fn new(scope: &'static str, quota: Quota) -> Self {
        Self {
            scope,
            limiter: Governor::dashmap(quota),
        }
    }

    fn check(&self, session: &str) -> Result<(), RateLimitExceeded> {
        self.limiter.check_key(&session.to_owned()).map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            RateLimitExceeded {
                scope: self.scope,
                retry_after: wait.as_secs().max(1),
            }
        })
    }
}

/// The session-keyed limiter
pub struct RateLimiter {
    enabled: bool,
    burst: Budget,
    read_per_minute: Budget,
    write_per_minute: Budget,
    global_per_minute: Budget,
    global_per_hour: Budget,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let quota = |n: u32, per: fn(NonZeroU32) -> Quota| {
            per(NonZeroU32::new(n.max(1)).expect("nonzero"))
        };
        Self {
            enabled: config.enabled,
            burst: Budget::new("burst", quota(config.burst, Quota::per_second)),
            read_per_minute: Budget::new(
                "read",
                quota(config.read_calls_per_minute, Quota::per_minute),
            ),
            write_per_minute: Budget::new(
                "write",
                quota(config.write_calls_per_minute, Quota::per_minute),
            ),
            global_per_minute: Budget::new(
                "global",
                quota(config.calls_per_minute, Quota::per_minute),
            ),
            global_per_hour: Budget::new(
                "hourly",
                quota(config.calls_per_hour, Quota::per_hour),
            ),
        }
    }

    /// Admit or reject one call for a session
    pub fn check(&self, session: &str, operation: Operation) -> Result<(), RateLimitExceeded> {
        if !self.enabled {
            return Ok(());
        }

        self.burst.check(session)?;
        if operation.is_write() {
            self.write_per_minute.check(session)?;
        } else {
            self.read_per_minute.check(session)?;
        }
        self.global_per_minute.check(session)?;
        self.global_per_hour.check(session)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(burst: u32, write_per_minute: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            enabled: true,
            calls_per_minute: 1000,
            calls_per_hour: 10_000,
            burst,
            read_calls_per_minute: 1000,
            write_calls_per_minute: write_per_minute,
        })
    }

    #[test]
    fn disabled_limiter_always_admits() {
        let limiter = RateLimiter::new(&RateLimitConfig::default());
        for _ in 0..10_000 {
            assert!(limiter.check("s", Operation::Read).is_ok());
        }
    }

    #[test]
    fn burst_budget_bounds_accepted_calls() {
        let limiter = limiter(3, 1000);
        let mut accepted = 0;
        for _ in 0..10 {
            if limiter.check("s", Operation::Read).is_ok() {
                accepted += 1;
            }
        }
        // Within one window, accepted calls never exceed budget + burst
        assert!(accepted <= 3, "accepted {accepted} of burst 3");
        assert!(accepted >= 1);
    }

    #[test]
    fn write_budget_independent_of_reads() {
        let limiter = limiter(1000, 2);
        assert!(limiter.check("s", Operation::Write).is_ok());
        assert!(limiter.check("s", Operation::Write).is_ok());
        let err = limiter
            .check("s", Operation::Write)
            .expect_err("third write must exceed");
        assert_eq!(err.scope, "write");
        assert!(err.retry_after >= 1);
        // Reads still flow
        assert!(limiter.check("s", Operation::Read).is_ok());
    }

    #[test]
    fn sessions_are_isolated() {
        let limiter = limiter(2, 1000);
        assert!(limiter.check("a", Operation::Read).is_ok());
        assert!(limiter.check("a", Operation::Read).is_ok());
        assert!(limiter.check("a", Operation::Read).is_err());
        assert!(limiter.check("b", Operation::Read).is_ok());
    }
}
