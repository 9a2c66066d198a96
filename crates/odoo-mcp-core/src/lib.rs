//! Shared leaf types for the Odoo MCP bridge
//!
//! Everything here is wire-protocol agnostic: the detected backend version,
//! the unified RPC fault that every adapter produces, and the adapter error
//! sum type that crosses the adapter/tool boundary.

mod fault;
mod version;

pub use fault::{OdooError, RpcFault, extract_exception_line};
pub use version::{Edition, OdooVersion, WireProtocol};
