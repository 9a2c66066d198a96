//! Backend connection layer
//!
//! Three interchangeable wire adapters behind one capability trait, a
//! multi-probe version detector, and the lifecycle manager that owns the
//! connection state machine.

mod adapter;
mod backend;
mod json2;
mod jsonrpc;
mod manager;
mod version;
mod xmlrpc;

pub use adapter::{OdooAdapter, merged_context};
pub use backend::Backend;
pub use json2::Json2Adapter;
pub use jsonrpc::JsonRpcAdapter;
pub use manager::{ConnectionInfo, ConnectionManager, ConnectionState};
pub use version::{detect_version, parse_version_str, parse_version_value};
pub use xmlrpc::XmlRpcAdapter;
