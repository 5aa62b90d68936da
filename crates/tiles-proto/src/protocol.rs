use serde::{Deserialize, Serialize};

/// One dashboard entry. `url` doubles as the lookup key for edit and remove,
/// but nothing enforces uniqueness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub url: String,
    /// Public icon path, e.g. `/static/icons/example.com.png`.
    #[serde(default)]
    pub icon: String,
}

impl Tile {
    pub fn new(label: impl Into<String>, url: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            icon: icon.into(),
        }
    }
}

/// A listening socket as reported by `GET /ports`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortEntry {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Process name owning the socket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proc: Option<String>,
}

impl PortEntry {
    pub fn port_only(port: u16) -> Self {
        Self {
            port,
            pid: None,
            proc: None,
        }
    }
}

/// Which lister produced a port report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortSource {
    #[serde(rename = "primary")]
    Primary,
    #[serde(rename = "fallback-shell")]
    FallbackShell,
}

/// Body of `GET /ports`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortReport {
    Listed {
        ok: bool,
        ports: Vec<PortEntry>,
        source: PortSource,
    },
    Failed {
        ok: bool,
        error: String,
    },
}

impl PortReport {
    pub fn listed(ports: Vec<PortEntry>, source: PortSource) -> Self {
        Self::Listed {
            ok: true,
            ports,
            source,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            ok: false,
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Listed { .. })
    }
}
