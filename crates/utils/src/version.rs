use serde::Serialize;
use ts_rs::TS;

/// Gateway semver, stamped from the workspace manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Oldest extension release the backend still speaks to. The extension
/// compares this against its own version during the capability handshake and
/// refuses to connect when it is older.
pub const MIN_EXTENSION_VERSION: &str = "0.2.0";

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct VersionInfo {
    pub version: &'static str,
    pub min_extension_version: &'static str,
    pub features: VersionFeatures,
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct VersionFeatures {
    pub multi_key_support: bool,
    pub proxy_mode: bool,
    pub server_mode: bool,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            min_extension_version: MIN_EXTENSION_VERSION,
            features: VersionFeatures {
                multi_key_support: true,
                proxy_mode: true,
                server_mode: true,
            },
        }
    }
}
