//! Toolset framework and the tools built on it
//!
//! A toolset is a named group of tools registered together and gated on
//! prerequisites (installed backend modules, version bounds, other
//! toolsets). The core toolset provides model-generic CRUD plus deep
//! search; the wizard module implements the wizard execution protocol;
//! `sales` is the shipped workflow toolset.

pub mod base;
pub mod core;
pub mod formatting;
pub mod registry;
pub mod sales;
pub mod wizard;

pub use base::{
    ToolAnnotations, ToolContext, ToolFn, ToolSpec, Toolset, ToolsetMetadata, tool_name,
};
pub use registry::{
    RegistrationReport, ToolsetRegistrationResult, ToolsetRegistry, ToolsetStatus,
};
