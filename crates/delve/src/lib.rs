//! # Delve
//!
//! Session and transport core for tick-driven multiplayer terminal games.
//!
//! Delve accepts TCP clients, runs the contact handshake, and keeps one
//! session per client in a fixed table. Every turn it reads what clients
//! sent, dispatches the commands their state allows, defers commands their
//! entity has no energy for, advances the game world once, and writes each
//! client one batch of output.
//!
//! The game world is yours: implement [`Simulation`](delve_command::Simulation)
//! and hand it to the server.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use delve::prelude::*;
//!
//! # async fn start<W: Simulation>(world: W) -> Result<(), DelveError> {
//! delve::logging::init("info");
//! let server = DelveServer::builder(world)
//!     .config(ServerConfig::default())
//!     .build()
//!     .await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod console;
mod error;
mod listener;
pub mod logging;
mod net;
mod server;

pub use config::ServerConfig;
pub use error::DelveError;
pub use server::{DelveServer, DelveServerBuilder, REASON_SHUTDOWN, Reactor, TickReport};

pub use delve_command as command;
pub use delve_protocol as protocol;
pub use delve_session as session;
pub use delve_tick as tick;
pub use delve_transport as transport;

/// Everything needed to write a game on top of Delve.
pub mod prelude {
    pub use crate::{DelveError, DelveServer, DelveServerBuilder, Reactor, ServerConfig};
    pub use delve_command::{
        Execution, ScreenLimits, ScreenLine, ScreenView, Simulation,
    };
    pub use delve_protocol::{Action, Cell, RleMode, VisualKind};
    pub use delve_session::{
        AccountInfo, AccountValidator, AllowAll, EntityId, SessionConfig, SessionError, SessionId,
        VisualSetup,
    };
    pub use delve_transport::Connection;
}
