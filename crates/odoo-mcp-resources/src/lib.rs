//! Resource engine
//!
//! The `odoo://` URI scheme, static and templated read-only resources, and
//! polling-based change subscriptions.

mod provider;
mod uri;

pub use provider::{ResourceDefinition, ResourceProvider, ResourceTemplate, ServerIdentity};
pub use uri::{DEFAULT_LIMIT, MAX_LIMIT, OdooUri, UriCategory, UriError, parse_odoo_uri};

/// Per-client subscription cap
pub const MAX_SUBSCRIPTIONS_PER_CLIENT: usize = 50;
