//! The `Simulation` trait: what the server needs from the game world.
//!
//! The reactor owns sessions and sockets; the simulation owns entities,
//! energy, and the map. They meet only through this trait, called from the
//! reactor thread once per command or once per tick.

use delve_protocol::{Action, Cell};
use delve_session::{EntityId, SessionId, VisualSetup};

/// Outcome of [`Simulation::try_execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// The action ran and spent the entity's energy.
    Executed,
    /// The action is valid but cannot run yet. It will be retried.
    Deferred,
}

/// Screen sizes the simulation can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenLimits {
    pub min_cols: u16,
    pub min_rows: u16,
    pub max_cols: u16,
    pub max_rows: u16,
}

impl Default for ScreenLimits {
    fn default() -> Self {
        Self {
            min_cols: 80,
            min_rows: 24,
            max_cols: 255,
            max_rows: 255,
        }
    }
}

impl ScreenLimits {
    pub fn accepts(&self, cols: u16, rows: u16) -> bool {
        (self.min_cols..=self.max_cols).contains(&cols)
            && (self.min_rows..=self.max_rows).contains(&rows)
    }
}

/// What a client can display, passed to [`Simulation::screen_updates`].
#[derive(Debug, Clone, Copy)]
pub struct ScreenView<'a> {
    /// Client glyph overrides, if it sent any.
    pub visuals: Option<&'a VisualSetup>,
    pub cols: u16,
    pub rows: u16,
    /// Every row must be sent, not just the changed ones.
    pub full_redraw: bool,
}

/// One row to send as a `LineInfo` packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenLine {
    pub row: u16,
    pub cells: Vec<Cell>,
}

/// The game world behind the server.
///
/// Entity ids are dense indices. Removing an entity may move the last one
/// into the freed index; [`detach_entity`](Self::detach_entity) reports
/// that move so the session bindings can follow it.
///
/// # Example
///
/// ```rust
/// use delve_command::{Execution, Simulation};
/// use delve_protocol::Action;
/// use delve_session::{EntityId, SessionId};
///
/// /// Every entity always has energy and nothing is ever safe.
/// #[derive(Default)]
/// struct Void {
///     entities: Vec<SessionId>,
/// }
///
/// impl Simulation for Void {
///     fn has_energy(&self, _entity: EntityId) -> bool {
///         true
///     }
///
///     fn try_execute(&mut self, _entity: EntityId, _action: &Action) -> Execution {
///         Execution::Executed
///     }
///
///     fn attach_entity(&mut self, session: SessionId, _nick: &str) -> Result<EntityId, String> {
///         self.entities.push(session);
///         Ok(EntityId(self.entities.len() as u32 - 1))
///     }
///
///     fn detach_entity(&mut self, entity: EntityId) -> Option<EntityId> {
///         let last = self.entities.len().checked_sub(1)?;
///         self.entities.swap_remove(entity.0 as usize);
///         (entity.0 as usize != last).then_some(EntityId(last as u32))
///     }
///
///     fn entity_is_in_safe_location(&self, _entity: EntityId) -> bool {
///         false
///     }
/// }
/// ```
pub trait Simulation: Send + 'static {
    /// Returns `true` if the entity may take a turn-consuming action now.
    fn has_energy(&self, entity: EntityId) -> bool;

    /// Runs `action` for `entity`. Only called after `has_energy` said yes.
    fn try_execute(&mut self, entity: EntityId, action: &Action) -> Execution;

    /// Creates the entity for a session entering play.
    ///
    /// An `Err` carries the reason the session is refused.
    fn attach_entity(&mut self, session: SessionId, nick: &str) -> Result<EntityId, String>;

    /// Removes `entity`.
    ///
    /// If another entity was moved into its index, returns that entity's
    /// previous id.
    fn detach_entity(&mut self, entity: EntityId) -> Option<EntityId>;

    /// Whether a quitting entity may vanish at once instead of lingering.
    fn entity_is_in_safe_location(&self, entity: EntityId) -> bool;

    /// Runs one world turn. Called once per tick after all input.
    fn advance(&mut self, _turn: u64) {}

    /// Rows that changed for `entity` since the last call.
    fn screen_updates(&mut self, _entity: EntityId, _view: &ScreenView<'_>) -> Vec<ScreenLine> {
        Vec::new()
    }

    fn screen_limits(&self) -> ScreenLimits {
        ScreenLimits::default()
    }
}
