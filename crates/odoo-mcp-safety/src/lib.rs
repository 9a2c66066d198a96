//! Safety gate
//!
//! Mode enforcement, model/field/method filtering with always-on default
//! blocklists, a per-session rate limiter, and the append-only audit
//! writer.

mod audit;
mod limits;
mod modes;

pub use audit::{AuditEntry, AuditLogger};
pub use limits::{RateLimitExceeded, RateLimiter};
pub use modes::{Operation, SafetyPolicy};

use thiserror::Error;

/// Rejections produced by the gate
#[derive(Debug, Error)]
pub enum SafetyError {
    /// Operation not permitted in the current mode
    #[error("{0}")]
    ModeViolation(String),

    /// Model access denied by allow/blocklist
    #[error("{0}")]
    ModelBlocked(String),

    /// A blocked field appeared in write values
    #[error("{0}")]
    FieldBlocked(String),

    /// The method is on the blocklist
    #[error("{0}")]
    MethodBlocked(String),
}
