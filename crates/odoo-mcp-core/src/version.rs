use std::fmt;

use serde::{Deserialize, Serialize};

/// Odoo edition as detected at connection time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    Community,
    Enterprise,
    Unknown,
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Community => f.write_str("community"),
            Self::Enterprise => f.write_str("enterprise"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Wire protocol spoken to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireProtocol {
    /// XML-RPC via `/xmlrpc/2/*` (Odoo 14-18)
    Xmlrpc,
    /// Session-cookie JSON-RPC via `/web/dataset/call_kw` (Odoo 14-18)
    Jsonrpc,
    /// Bearer-token JSON-2 via `/json/2/*` (Odoo 19+)
    Json2,
}

impl WireProtocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Xmlrpc => "xmlrpc",
            Self::Jsonrpc => "jsonrpc",
            Self::Json2 => "json2",
        }
    }
}

impl fmt::Display for WireProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detected backend version, immutable for a connection lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OdooVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    /// Release level (`final`, `saas`, or `unknown` for the fallback)
    pub level: String,
    pub serial: u32,
    /// The raw version string as reported by the server
    pub full_string: String,
    pub edition: Edition,
}

impl OdooVersion {
    /// The assumed version when every probe fails
    pub fn fallback() -> Self {
        Self {
            major: 14,
            minor: 0,
            micro: 0,
            level: "unknown".to_owned(),
            serial: 0,
            full_string: "14.0 (assumed)".to_owned(),
            edition: Edition::Unknown,
        }
    }

    /// Protocol recommended for this version: 14-16 XML-RPC, 17-18
    /// JSON-RPC, 19+ JSON-2
    pub const fn recommended_protocol(&self) -> WireProtocol {
        match self.major {
            0..=16 => WireProtocol::Xmlrpc,
            17 | 18 => WireProtocol::Jsonrpc,
            _ => WireProtocol::Json2,
        }
    }
}

impl fmt::Display for OdooVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.level == "saas" {
            write!(f, "saas-{}.{}", self.major, self.minor)?;
        } else {
            write!(f, "{}.{}", self.major, self.minor)?;
        }
        // Keep the enterprise marker round-trippable
        if self.edition == Edition::Enterprise {
            f.write_str("e")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_selection_by_major() {
        let mut v = OdooVersion::fallback();
        assert_eq!(v.recommended_protocol(), WireProtocol::Xmlrpc);
        v.major = 16;
        assert_eq!(v.recommended_protocol(), WireProtocol::Xmlrpc);
        v.major = 17;
        assert_eq!(v.recommended_protocol(), WireProtocol::Jsonrpc);
        v.major = 18;
        assert_eq!(v.recommended_protocol(), WireProtocol::Jsonrpc);
        v.major = 19;
        assert_eq!(v.recommended_protocol(), WireProtocol::Json2);
        v.major = 21;
        assert_eq!(v.recommended_protocol(), WireProtocol::Json2);
    }

    #[test]
    fn display_preserves_major_minor() {
        let v = OdooVersion {
            major: 17,
            minor: 2,
            micro: 0,
            level: "final".to_owned(),
            serial: 0,
            full_string: "17.2".to_owned(),
            edition: Edition::Community,
        };
        assert_eq!(v.to_string(), "17.2");
    }

    #[test]
    fn saas_display() {
        let v = OdooVersion {
            major: 17,
            minor: 4,
            micro: 0,
            level: "saas".to_owned(),
            serial: 0,
            full_string: "saas~17.4".to_owned(),
            edition: Edition::Enterprise,
        };
        assert_eq!(v.to_string(), "saas-17.4e");
    }

    #[test]
    fn enterprise_marker_round_trips() {
        let v = OdooVersion {
            major: 16,
            minor: 0,
            micro: 0,
            level: "final".to_owned(),
            serial: 0,
            full_string: "16.0e".to_owned(),
            edition: Edition::Enterprise,
        };
        assert_eq!(v.to_string(), "16.0e");
    }
}
