//! Version information for the relay.

/// Relay version from Cargo.toml
pub const RELAY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version information reported on the status endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub relay: &'static str,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            relay: RELAY_VERSION,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }
}
