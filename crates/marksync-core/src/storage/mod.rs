mod config;
pub mod local_store;
pub mod migrations;
pub mod schema;

pub use config::{ApiConfig, Config, GradingConfig, StoreConfig, SyncConfig};
pub use local_store::{LocalStore, StoreCell, StoreLocation};
pub use schema::{Collection, IndexDef, IndexKind};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the marksync data directory, creating it if needed.
///
/// `MARKSYNC_DATA_DIR` wins when set; otherwise `~/.config/marksync[-dev]/`
/// with `MARKSYNC_ENV=dev` selecting the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("MARKSYNC_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("MARKSYNC_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("marksync-dev")
            } else {
                base_dir.join("marksync")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
