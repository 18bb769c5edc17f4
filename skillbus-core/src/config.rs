//! Broker configuration
//!
//! The broker is configured from a JSON document whose relevant section
//! lives under the `aace.localSkillService` key:
//!
//! ```json
//! {
//!   "aace.localSkillService": {
//!     "lssSocketPath": "/tmp/lss.sock",
//!     "lmbSocketPath": "/tmp/lmb.sock"
//!   }
//! }
//! ```
//!
//! `lssSocketPath` is required — it is the Unix-domain socket the broker
//! listens on. `lmbSocketPath` is an optional pass-through for
//! collaborating services; the broker itself never consumes it.

use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

/// Key of the broker's section in the configuration root
pub const CONFIG_ROOT_KEY: &str = "aace.localSkillService";

/// Parsed broker configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Unix-domain socket path the broker listens on
    pub lss_socket_path: PathBuf,
    /// Pass-through socket path for collaborating services
    #[serde(default)]
    pub lmb_socket_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Extract and parse the broker section from a configuration root
    pub fn from_root(root: &Value) -> Result<Self> {
        let section = root
            .get(CONFIG_ROOT_KEY)
            .ok_or_else(|| Error::Config(format!("missing configuration key: {CONFIG_ROOT_KEY}")))?;
        serde_json::from_value(section.clone())
            .map_err(|e| Error::Config(format!("invalid {CONFIG_ROOT_KEY} section: {e}")))
    }
}
