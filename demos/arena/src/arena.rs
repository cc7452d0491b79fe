use delve::prelude::*;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// World constants
// ---------------------------------------------------------------------------

pub const WIDTH: usize = 80;
pub const HEIGHT: usize = 24;

/// Rows `1..=TOWN_ROWS` form the town. Quitting there needs no linger.
pub const TOWN_ROWS: usize = 3;

const ATTR_WALL: u16 = 7;
const ATTR_FLOOR: u16 = 1;
const ATTR_TOWN: u16 = 3;
const ATTR_SELF: u16 = 14;
const ATTR_OTHER: u16 = 12;

/// Feature-table slots a client may override.
const FEAT_FLOOR: usize = 1;
const FEAT_WALL: usize = 2;
const FEAT_TOWN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Energy every entity gains per turn.
    pub energy_per_turn: u32,
    /// Energy one action spends.
    pub action_cost: u32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            energy_per_turn: 25,
            action_cost: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Body {
    session: SessionId,
    glyph: u8,
    x: usize,
    y: usize,
    energy: u32,
    /// Rows last sent to this entity's client.
    seen: Vec<Vec<Cell>>,
}

/// A walled room with a town strip along the top.
#[derive(Debug, Default)]
pub struct Arena {
    config: ArenaConfig,
    bodies: Vec<Body>,
    turn: u64,
}

impl Arena {
    pub fn new() -> Self {
        Self::with_config(ArenaConfig::default())
    }

    pub fn with_config(config: ArenaConfig) -> Self {
        Self {
            config,
            bodies: Vec::new(),
            turn: 0,
        }
    }

    pub fn population(&self) -> usize {
        self.bodies.len()
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn position(&self, entity: EntityId) -> Option<(usize, usize)> {
        self.bodies.get(entity.0 as usize).map(|b| (b.x, b.y))
    }

    pub fn session_of(&self, entity: EntityId) -> Option<SessionId> {
        self.bodies.get(entity.0 as usize).map(|b| b.session)
    }

    fn is_wall(x: usize, y: usize) -> bool {
        x == 0 || y == 0 || x == WIDTH - 1 || y == HEIGHT - 1
    }

    fn is_town(y: usize) -> bool {
        (1..=TOWN_ROWS).contains(&y)
    }

    fn occupant(&self, x: usize, y: usize) -> Option<usize> {
        self.bodies.iter().position(|b| b.x == x && b.y == y)
    }

    fn terrain(x: usize, y: usize, visuals: Option<&VisualSetup>) -> Cell {
        let (slot, attr, ch) = if Self::is_wall(x, y) {
            (FEAT_WALL, ATTR_WALL, b'#')
        } else if Self::is_town(y) {
            (FEAT_TOWN, ATTR_TOWN, b':')
        } else {
            (FEAT_FLOOR, ATTR_FLOOR, b'.')
        };
        visuals
            .and_then(|v| v.get(VisualKind::Feature, slot))
            .filter(|c| c.ch != 0)
            .unwrap_or(Cell::new(attr, ch))
    }

    /// Renders the whole screen as `viewer` sees it.
    fn frame(&self, viewer: usize, view: &ScreenView<'_>) -> Vec<Vec<Cell>> {
        let cols = view.cols as usize;
        (0..view.rows as usize)
            .map(|y| {
                (0..cols)
                    .map(|x| {
                        if x >= WIDTH || y >= HEIGHT {
                            return Cell::new(0, b' ');
                        }
                        match self.occupant(x, y) {
                            Some(i) if i == viewer => Cell::new(ATTR_SELF, b'@'),
                            Some(i) => Cell::new(ATTR_OTHER, self.bodies[i].glyph),
                            None => Self::terrain(x, y, view.visuals),
                        }
                    })
                    .collect()
            })
            .collect()
    }

    fn spawn_point(&self) -> Option<(usize, usize)> {
        (1..=TOWN_ROWS)
            .flat_map(|y| (1..WIDTH - 1).map(move |x| (x, y)))
            .find(|&(x, y)| self.occupant(x, y).is_none())
    }

    /// Moves one step. A blocked step leaves the walker in place but still
    /// spends the turn.
    fn walk(&mut self, index: usize, dir: u8) {
        let Some((dx, dy)) = direction(dir) else {
            return;
        };
        let body = &self.bodies[index];
        let nx = body.x.saturating_add_signed(dx);
        let ny = body.y.saturating_add_signed(dy);
        if Self::is_wall(nx, ny) {
            return;
        }
        match self.occupant(nx, ny) {
            Some(other) if other != index => {
                tracing::debug!(
                    session = %self.bodies[index].session,
                    blocker = %self.bodies[other].session,
                    "someone is in the way"
                );
            }
            _ => {
                let body = &mut self.bodies[index];
                body.x = nx;
                body.y = ny;
            }
        }
    }
}

/// Keypad directions. `5` stays in place.
fn direction(dir: u8) -> Option<(isize, isize)> {
    match dir {
        1 => Some((-1, 1)),
        2 => Some((0, 1)),
        3 => Some((1, 1)),
        4 => Some((-1, 0)),
        5 => Some((0, 0)),
        6 => Some((1, 0)),
        7 => Some((-1, -1)),
        8 => Some((0, -1)),
        9 => Some((1, -1)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

impl Simulation for Arena {
    fn has_energy(&self, entity: EntityId) -> bool {
        self.bodies
            .get(entity.0 as usize)
            .is_some_and(|b| b.energy >= self.config.action_cost)
    }

    fn try_execute(&mut self, entity: EntityId, action: &Action) -> Execution {
        let index = entity.0 as usize;
        if index >= self.bodies.len() {
            return Execution::Executed;
        }
        if let Action::Walk { dir } | Action::Run { dir } = *action {
            self.walk(index, dir);
        }
        let body = &mut self.bodies[index];
        body.energy = body.energy.saturating_sub(self.config.action_cost);
        Execution::Executed
    }

    fn attach_entity(&mut self, session: SessionId, nick: &str) -> Result<EntityId, String> {
        let (x, y) = self.spawn_point().ok_or_else(|| "Town is full".to_owned())?;
        let glyph = nick
            .bytes()
            .find(u8::is_ascii_alphabetic)
            .unwrap_or(b'p');
        self.bodies.push(Body {
            session,
            glyph,
            x,
            y,
            energy: 0,
            seen: Vec::new(),
        });
        let entity = EntityId(self.bodies.len() as u32 - 1);
        tracing::info!(%session, %entity, x, y, "entity spawned");
        Ok(entity)
    }

    fn detach_entity(&mut self, entity: EntityId) -> Option<EntityId> {
        let index = entity.0 as usize;
        if index >= self.bodies.len() {
            return None;
        }
        let last = self.bodies.len() - 1;
        self.bodies.swap_remove(index);
        (index != last).then_some(EntityId(last as u32))
    }

    fn entity_is_in_safe_location(&self, entity: EntityId) -> bool {
        self.bodies
            .get(entity.0 as usize)
            .is_some_and(|b| Self::is_town(b.y))
    }

    fn advance(&mut self, turn: u64) {
        self.turn = turn;
        let gain = self.config.energy_per_turn;
        for body in &mut self.bodies {
            body.energy = body.energy.saturating_add(gain);
        }
    }

    fn screen_updates(&mut self, entity: EntityId, view: &ScreenView<'_>) -> Vec<ScreenLine> {
        let index = entity.0 as usize;
        if index >= self.bodies.len() {
            return Vec::new();
        }
        let frame = self.frame(index, view);
        let seen = &mut self.bodies[index].seen;
        let redraw = view.full_redraw || seen.len() != frame.len();
        let lines = frame
            .iter()
            .enumerate()
            .filter(|(y, row)| redraw || seen.get(*y).is_none_or(|old| old != *row))
            .map(|(y, row)| ScreenLine {
                row: y as u16,
                cells: row.clone(),
            })
            .collect();
        *seen = frame;
        lines
    }
}
