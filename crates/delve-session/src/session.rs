//! Session types: the record the server keeps for every open connection.
//!
//! A session tracks:
//! - WHERE it is in the lifecycle ([`SessionState`])
//! - WHAT bytes are in flight (inbound, outbound, retry queue, scratch)
//! - WHO is on the other end ([`Credentials`], [`AccountInfo`])
//! - HOW the client wants its screen drawn ([`ScreenSetup`], [`VisualSetup`])
//! - WHEN it last did anything (for the timeout reaper)

use std::fmt;
use std::net::SocketAddr;

use delve_protocol::{Cell, ProtocolError, RleMode, ServerPacket, VisualKind};
use delve_transport::Connection;
use serde::{Deserialize, Serialize};

use crate::{AccountInfo, RetryQueue};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Per-state idle limits, in seconds.
///
/// Converted to ticks once at startup with [`SessionConfig::to_ticks`];
/// the reaper itself only ever compares tick counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a socket may take to send its contact record.
    pub contact_timeout_secs: u64,
    /// How long a session may stay in `SETUP` without activity.
    pub setup_timeout_secs: u64,
    /// Idle limit while `PLAYING`.
    pub play_timeout_secs: u64,
    /// How long a quitting entity lingers before it is removed.
    pub quit_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            contact_timeout_secs: 15,
            setup_timeout_secs: 180,
            play_timeout_secs: 30,
            quit_timeout_secs: 5,
        }
    }
}

impl SessionConfig {
    /// Converts every limit to ticks at `fps` ticks per second.
    pub fn to_ticks(&self, fps: u32) -> TimeoutTicks {
        let fps = u64::from(fps.max(1));
        TimeoutTicks {
            contact: self.contact_timeout_secs.saturating_mul(fps),
            setup: self.setup_timeout_secs.saturating_mul(fps),
            play: self.play_timeout_secs.saturating_mul(fps),
            quit: self.quit_timeout_secs.saturating_mul(fps),
        }
    }
}

/// [`SessionConfig`] expressed in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutTicks {
    pub contact: u64,
    pub setup: u64,
    pub play: u64,
    pub quit: u64,
}

impl TimeoutTicks {
    /// The limit that applies in `state`, or `None` if it never times out.
    pub fn for_state(&self, state: SessionState) -> Option<u64> {
        match state {
            SessionState::Setup => Some(self.setup),
            SessionState::Playing => Some(self.play),
            SessionState::Quit => Some(self.quit),
            SessionState::Free | SessionState::Console => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle state of a session slot.
///
/// ```text
///   FREE ──(accept)──→ SETUP ──(enter play)──→ PLAYING ──(quit)──→ QUIT
///    ↑ ↑                 │                        │                  │
///    │ └─────────────────┴──────(destroy)─────────┴──────────────────┘
///    │
///    └──(destroy)── CONSOLE ←──(console contact)── FREE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Free = 0x00,
    Setup = 0x01,
    Playing = 0x02,
    Quit = 0x04,
    Console = 0x08,
}

impl SessionState {
    /// Returns `true` if the slot is in use.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Free)
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Free, Self::Setup)
                | (Self::Free, Self::Console)
                | (Self::Setup, Self::Playing)
                | (Self::Setup, Self::Free)
                | (Self::Playing, Self::Quit)
                | (Self::Playing, Self::Free)
                | (Self::Quit, Self::Free)
                | (Self::Console, Self::Free)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "FREE"),
            Self::Setup => write!(f, "SETUP"),
            Self::Playing => write!(f, "PLAYING"),
            Self::Quit => write!(f, "QUIT"),
            Self::Console => write!(f, "CONSOLE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Ids and credentials
// ---------------------------------------------------------------------------

/// Index of a slot in the [`SessionStore`](crate::SessionStore).
///
/// Stable for the lifetime of one connection. Reused after the slot is
/// freed, so never keep one past a destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u16);

impl SessionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Who is on the other end, as presented in the contact record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Character name, already validated and normalised.
    pub nick: String,
    /// Login name on the client machine.
    pub real: String,
    /// Client host name as reported by the client.
    pub host: String,
    pub pass: String,
    /// Remote socket address, if the transport knows it.
    pub addr: Option<SocketAddr>,
}

// ---------------------------------------------------------------------------
// Client capabilities
// ---------------------------------------------------------------------------

/// Screen size and RLE convention from the client's setup packet.
///
/// The RLE mode is fixed once play begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSetup {
    pub cols: u16,
    pub rows: u16,
    pub rle: RleMode,
}

/// Per-client glyph overrides for feature, object, and monster kinds.
///
/// Allocated on the first `Visuals` packet and kept when the slot is
/// reused; a new occupant starts from cleared tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualSetup {
    tables: [Vec<Cell>; VisualKind::COUNT],
}

impl VisualSetup {
    /// Allocates every table with `size` entries.
    pub fn new(size: usize) -> Self {
        Self {
            tables: std::array::from_fn(|_| vec![Cell::default(); size]),
        }
    }

    /// Entries per table.
    pub fn size(&self) -> usize {
        self.tables[0].len()
    }

    pub fn get(&self, kind: VisualKind, index: usize) -> Option<Cell> {
        self.tables[kind as usize].get(index).copied()
    }

    /// Copies `entries` into `kind` starting at `offset`.
    ///
    /// Returns `false` and changes nothing if the range does not fit.
    pub fn write(&mut self, kind: VisualKind, offset: usize, entries: &[Cell]) -> bool {
        let table = &mut self.tables[kind as usize];
        let Some(end) = offset.checked_add(entries.len()) else {
            return false;
        };
        if end > table.len() {
            return false;
        }
        table[offset..end].copy_from_slice(entries);
        true
    }

    /// Clears every entry without releasing the allocation.
    pub fn reset(&mut self) {
        for table in &mut self.tables {
            table.fill(Cell::default());
        }
    }
}

/// Console-only flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsoleFlags {
    /// Password accepted.
    pub authenticated: bool,
    /// Receives a copy of player chat.
    pub listening: bool,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One slot of the session table.
///
/// The connection is `None` for free slots and for sessions whose peer is
/// gone but which still linger in `QUIT`. There is no third option: once
/// closed, the connection is dropped.
pub struct Session {
    id: SessionId,
    state: SessionState,
    /// Raw bytes read from the socket and not yet dispatched.
    pub inbound: Vec<u8>,
    /// Encoded packets waiting for this tick's flush.
    pub outbound: Vec<u8>,
    /// Commands waiting for energy, oldest first.
    pub retry: RetryQueue,
    /// Handshake bytes before the session existed.
    pub scratch: Vec<u8>,
    conn: Option<Box<dyn Connection>>,
    pub credentials: Credentials,
    pub account: AccountInfo,
    visuals: Option<VisualSetup>,
    pub screen: Option<ScreenSetup>,
    /// Cosmetic option flags, stored verbatim.
    pub options: Vec<u8>,
    pub console: ConsoleFlags,
    /// A full screen resend is due on the next output phase.
    pub redraw_pending: bool,
    /// Why the session entered `QUIT`.
    pub quit_reason: Option<String>,
    timeout_ticks: u64,
    last_activity: u64,
}

impl Session {
    pub(crate) fn vacant(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Free,
            inbound: Vec::new(),
            outbound: Vec::new(),
            retry: RetryQueue::new(),
            scratch: Vec::new(),
            conn: None,
            credentials: Credentials::default(),
            account: AccountInfo::default(),
            visuals: None,
            screen: None,
            options: Vec::new(),
            console: ConsoleFlags::default(),
            redraw_pending: false,
            quit_reason: None,
            timeout_ticks: 0,
            last_activity: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn nick(&self) -> &str {
        &self.credentials.nick
    }

    /// Idle limit for the current state, in ticks.
    pub fn timeout_ticks(&self) -> u64 {
        self.timeout_ticks
    }

    /// Tick of the last state change or received byte.
    pub fn last_activity(&self) -> u64 {
        self.last_activity
    }

    /// Records activity at `now`.
    pub fn touch(&mut self, now: u64) {
        self.last_activity = now;
    }

    /// Returns `true` once strictly more than the timeout has elapsed.
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.last_activity) > self.timeout_ticks
    }

    pub(crate) fn set_state(&mut self, state: SessionState, now: u64, timeout_ticks: u64) {
        self.state = state;
        self.timeout_ticks = timeout_ticks;
        self.last_activity = now;
    }

    /// The live connection, if the peer has not gone away.
    pub fn connection_mut(&mut self) -> Option<&mut (dyn Connection + 'static)> {
        self.conn.as_deref_mut()
    }

    pub(crate) fn attach(&mut self, conn: Box<dyn Connection>) {
        self.conn = Some(conn);
    }

    /// Closes and drops the connection, leaving the detached sentinel.
    pub fn detach(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
    }

    pub fn is_detached(&self) -> bool {
        self.conn.is_none()
    }

    pub fn visuals(&self) -> Option<&VisualSetup> {
        self.visuals.as_ref()
    }

    /// Returns the visual tables, allocating them on first use.
    pub fn visuals_or_alloc(&mut self, size: usize) -> &mut VisualSetup {
        self.visuals.get_or_insert_with(|| VisualSetup::new(size))
    }

    /// RLE mode for screen packets. `None` mode until setup says otherwise.
    pub fn rle_mode(&self) -> RleMode {
        self.screen.map_or(RleMode::None, |s| s.rle)
    }

    /// Encodes `packet` into the outbound buffer.
    pub fn send(&mut self, packet: &ServerPacket) -> Result<(), ProtocolError> {
        let mode = self.rle_mode();
        packet.encode(&mut self.outbound, mode)
    }

    /// Appends a console text line (no packet framing).
    pub fn send_line(&mut self, line: &str) {
        self.outbound.extend_from_slice(line.as_bytes());
        self.outbound.push(b'\n');
    }

    /// Returns the slot to its vacant shape. Keeps the visual table
    /// allocation.
    pub(crate) fn wipe(&mut self) {
        self.detach();
        let visuals = self.visuals.take().map(|mut v| {
            v.reset();
            v
        });
        *self = Self::vacant(self.id);
        self.visuals = visuals;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("nick", &self.credentials.nick)
            .field("conn", &self.conn.as_ref().map(|c| c.id()))
            .field("inbound", &self.inbound.len())
            .field("outbound", &self.outbound.len())
            .field("retry", &self.retry.len())
            .field("last_activity", &self.last_activity)
            .field("timeout_ticks", &self.timeout_ticks)
            .finish()
    }
}
