use std::path::PathBuf;

use clap::Parser;
use odoo_mcp_config::{OdooMcpConfig, OperationMode, ProtocolChoice, TransportKind};
use secrecy::SecretString;

/// MCP server for Odoo
#[derive(Debug, Parser)]
#[command(name = "odoo-mcp", about = "Model Context Protocol server for Odoo ERP")]
pub struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long, env = "ODOO_MCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Odoo server URL
    #[arg(long)]
    pub url: Option<String>,

    /// Odoo database name
    #[arg(long)]
    pub database: Option<String>,

    /// Odoo login
    #[arg(long)]
    pub username: Option<String>,

    /// Odoo password
    #[arg(long)]
    pub password: Option<String>,

    /// Odoo API key (preferred over the password when both are set)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Wire protocol: auto, xmlrpc, jsonrpc, or json2
    #[arg(long)]
    pub protocol: Option<ProtocolChoice>,

    /// Transport: stdio, sse, or http
    #[arg(long)]
    pub transport: Option<TransportKind>,

    /// Listen host for the sse/http transports
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port for the sse/http transports
    #[arg(long)]
    pub port: Option<u16>,

    /// Safety mode: readonly, restricted, or full
    #[arg(long)]
    pub mode: Option<OperationMode>,

    /// Log level filter (e.g. info, debug, odoo_mcp=trace)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Overlay CLI values onto the merged file/env configuration
    pub fn apply_to(&self, config: &mut OdooMcpConfig) {
        if let Some(url) = &self.url {
            config.connection.url = url.clone();
        }
        if let Some(database) = &self.database {
            config.connection.database = database.clone();
        }
        if let Some(username) = &self.username {
            config.connection.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.connection.password = Some(SecretString::from(password.clone()));
        }
        if let Some(api_key) = &self.api_key {
            config.connection.api_key = Some(SecretString::from(api_key.clone()));
        }
        if let Some(protocol) = self.protocol {
            config.connection.protocol = protocol;
        }
        if let Some(transport) = self.transport {
            config.transport.kind = transport;
        }
        if let Some(host) = &self.host {
            config.transport.host = host.clone();
        }
        if let Some(port) = self.port {
            config.transport.port = port;
        }
        if let Some(mode) = self.mode {
            config.safety.mode = mode;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}
