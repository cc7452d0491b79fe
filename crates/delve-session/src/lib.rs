//! Session table and lifecycle for Delve.
//!
//! This crate owns the record the server keeps per connection:
//!
//! 1. **Lifecycle**: the `FREE → SETUP → PLAYING → QUIT → FREE` state
//!    machine plus the separate `CONSOLE` path ([`SessionState`])
//! 2. **Storage**: a fixed-capacity arena with a free-list
//!    ([`SessionStore`]), indexed by [`SessionId`]
//! 3. **Entity bindings**: the two-way `session ↔ entity` map that keeps
//!    back-references valid when the simulation compacts its table
//!    ([`EntityBindings`])
//! 4. **Deferred commands**: the per-session FIFO of commands waiting for
//!    energy ([`RetryQueue`])
//! 5. **Contact checks**: name validation and the [`AccountValidator`] hook
//!
//! # How it fits in the stack
//!
//! ```text
//! Command layer (above)  ← dispatches packets against sessions
//!     ↕
//! Session layer (this crate)  ← who is connected and in what state
//!     ↕
//! Transport + Protocol (below)  ← sockets and packet bytes
//! ```

mod auth;
mod bindings;
mod error;
mod names;
mod retry;
mod session;
mod store;

pub use auth::{AccountInfo, AccountValidator, AllowAll};
pub use bindings::{EntityBindings, EntityId};
pub use error::SessionError;
pub use names::check_names;
pub use retry::{DeferredCommand, RetryQueue};
pub use session::{
    ConsoleFlags, Credentials, ScreenSetup, Session, SessionConfig, SessionId, SessionState,
    TimeoutTicks, VisualSetup,
};
pub use store::SessionStore;
