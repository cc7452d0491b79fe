//! A minimal Delve world: one walled room, a town strip, and walking.
//!
//! ```text
//! cargo run -p arena -- [config.json]
//! ```
//!
//! The optional config file has two sections, both optional:
//!
//! ```json
//! {
//!   "server": { "bind_addr": "0.0.0.0:18346", "console_password": "hunter2" },
//!   "arena": { "energy_per_turn": 50 }
//! }
//! ```

mod arena;

use std::path::Path;

use delve::prelude::*;
use serde::Deserialize;

use crate::arena::{Arena, ArenaConfig};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DemoConfig {
    server: ServerConfig,
    arena: ArenaConfig,
}

impl DemoConfig {
    fn load(path: &Path) -> Result<Self, DelveError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| DelveError::Config(e.to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    delve::logging::init("info");

    let config = match std::env::args_os().nth(1) {
        Some(path) => DemoConfig::load(Path::new(&path))?,
        None => DemoConfig::default(),
    };
    tracing::info!(bind = %config.server.bind_addr, "starting arena");

    let server = DelveServer::builder(Arena::with_config(config.arena))
        .config(config.server)
        .build()
        .await?;

    let reactor = server.run().await?;
    tracing::info!(
        turns = reactor.sim().turn(),
        population = reactor.sim().population(),
        "arena stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_config_sections_default_independently() {
        let cfg: DemoConfig =
            serde_json::from_str(r#"{ "arena": { "energy_per_turn": 50 } }"#).unwrap();
        assert_eq!(cfg.arena.energy_per_turn, 50);
        assert_eq!(cfg.server, ServerConfig::default());
    }

    #[test]
    fn test_demo_config_missing_file_is_io_error() {
        let err = DemoConfig::load(Path::new("/nonexistent/arena.json")).unwrap_err();
        assert!(matches!(err, DelveError::Io(_)));
    }
}
