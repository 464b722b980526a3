//! Session configuration
//!
//! Defaults can come from a JSON file; command-line flags are applied on top
//! by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{ConfigSource, RelayError};

/// Port used when none is given
#[cfg(windows)]
pub const DEFAULT_PORT: &str = "COM1";
/// Port used when none is given
#[cfg(not(windows))]
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Baud rate used when none is given
pub const DEFAULT_BAUD_RATE: u32 = 57600;

/// Relay session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Output file; `None` writes to stdout
    pub output: Option<PathBuf>,
    /// Suppress the startup banner
    pub quiet: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            output: None,
            quiet: false,
        }
    }
}

impl RelayConfig {
    /// Load a config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, RelayError> {
        let wrap = |source: ConfigSource| RelayError::Config {
            path: path.to_path_buf(),
            source,
        };
        let content = std::fs::read_to_string(path).map_err(|e| wrap(e.into()))?;
        serde_json::from_str(&content).map_err(|e| wrap(e.into()))
    }

    /// Reject settings the port cannot be opened with
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.port_name.is_empty() {
            return Err(RelayError::Usage("port name must not be empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(RelayError::Usage(
                "baud rate must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
