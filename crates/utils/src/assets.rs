use std::{env, path::PathBuf};

use directories::ProjectDirs;

const ASSET_DIR_ENV: &str = "GATEWAY_ASSET_DIR";

/// Directory for the gateway's local state (sqlite database, port file).
///
/// `GATEWAY_ASSET_DIR` overrides the platform default, which is the
/// OS-conventional data directory for the application.
pub fn asset_dir() -> PathBuf {
    if let Ok(custom) = env::var(ASSET_DIR_ENV) {
        return PathBuf::from(custom);
    }

    ProjectDirs::from("ai", "linkgate", "linkgate")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| {
            tracing::warn!("no home directory available, falling back to ./data");
            PathBuf::from("./data")
        })
}
