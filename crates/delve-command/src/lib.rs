//! Command dispatch for Delve.
//!
//! This crate sits between the session table and the game world. It turns
//! the bytes a session has received into calls on a [`Simulation`]:
//!
//! 1. **Dispatch tables** ([`DispatchTable`]): one per session state,
//!    covering every packet kind
//! 2. **Energy gate** ([`Dispatcher::process_pending_commands`]): defers
//!    turn-consuming commands the entity cannot afford yet, keeping their
//!    order
//! 3. **Lifecycle** ([`lifecycle`]): destroy, graceful quit, timeout reaper
//! 4. **Output**: chat broadcast ([`chat`]) and screen rows ([`screen`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Reactor (above)  ← reads sockets, runs one pass per session per tick
//!     ↕
//! Command layer (this crate)  ← what a packet means in the current state
//!     ↕
//! Session + Protocol (below)  ← who is connected, what the bytes say
//! ```

pub mod chat;
mod dispatch;
mod error;
mod handlers;
pub mod lifecycle;
mod process;
pub mod screen;
mod simulation;

pub use dispatch::{
    DispatchContext, DispatchSettings, DispatchTable, Dispatcher, Handler, HandlerResult, Route,
};
pub use error::CommandError;
pub use process::ProcessOutcome;
pub use simulation::{Execution, ScreenLimits, ScreenLine, ScreenView, Simulation};
