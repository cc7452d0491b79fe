//! Server configuration.
//!
//! Loaded from JSON. Every field has a default, so a file only needs the
//! values it changes:
//!
//! ```json
//! {
//!   "bind_addr": "0.0.0.0:18346",
//!   "fps": 20,
//!   "overrun": { "burst": { "max": 3 } },
//!   "console_password": "hunter2",
//!   "session": { "quit_timeout_secs": 10 }
//! }
//! ```

use std::path::Path;

use delve_session::SessionConfig;
use delve_tick::{OverrunPolicy, TurnConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::DelveError;

/// Smallest accepted input bound. One full contact record must fit.
const MIN_INBOUND_BYTES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    pub bind_addr: String,
    /// Size of the session table, consoles included.
    pub max_sessions: usize,
    /// Turns per second.
    pub fps: u32,
    /// Catch-up behaviour when a turn starts late.
    pub overrun: OverrunPolicy,
    pub session: SessionConfig,
    /// Console logins are refused while this is unset.
    pub console_password: Option<String>,
    /// Only accept console contacts from loopback addresses.
    pub console_local_only: bool,
    /// Unprocessed input a session may hold before it is dropped.
    pub max_inbound_bytes: usize,
    /// Entries per client visual table.
    pub visual_table_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:18346".into(),
            max_sessions: 32,
            fps: 10,
            overrun: OverrunPolicy::Skip,
            session: SessionConfig::default(),
            console_password: None,
            console_local_only: true,
            max_inbound_bytes: 64 * 1024,
            visual_table_size: 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, DelveError> {
        serde_json::from_str(json).map_err(|e| DelveError::Config(e.to_string()))
    }

    /// Reads and parses a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DelveError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Clamps out-of-range values, logging each change.
    pub fn validated(mut self) -> Self {
        if self.fps == 0 || self.fps > TurnConfig::MAX_FPS {
            let clamped = self.fps.clamp(1, TurnConfig::MAX_FPS);
            warn!(fps = self.fps, clamped, "fps out of range, clamping");
            self.fps = clamped;
        }
        if self.max_sessions == 0 || self.max_sessions > u16::MAX as usize {
            let clamped = self.max_sessions.clamp(1, u16::MAX as usize);
            warn!(max_sessions = self.max_sessions, clamped, "max_sessions out of range, clamping");
            self.max_sessions = clamped;
        }
        if self.max_inbound_bytes < MIN_INBOUND_BYTES {
            warn!(
                max_inbound_bytes = self.max_inbound_bytes,
                clamped = MIN_INBOUND_BYTES,
                "max_inbound_bytes too small, clamping"
            );
            self.max_inbound_bytes = MIN_INBOUND_BYTES;
        }
        if self.visual_table_size == 0 {
            warn!("visual_table_size is 0, using 1");
            self.visual_table_size = 1;
        }
        if self.console_password.as_deref() == Some("") {
            warn!("empty console password, console disabled");
            self.console_password = None;
        }
        self
    }

    pub fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            policy: self.overrun,
            ..TurnConfig::with_fps(self.fps)
        }
    }
}
