//! Packet catalogue: tags, turn costs, and typed payloads.
//!
//! Every packet starts with a one-byte tag. After the tag, the schema for
//! that [`PacketKind`] fixes exactly how many bytes follow, so a decoder
//! never has to backtrack.
//!
//! The same tag is used in both directions for symmetric packets (`Quit`,
//! `Keepalive`, `Message`, `Play`), but the payloads differ, hence the
//! separate [`ClientPacket`] and [`ServerPacket`] types.

use std::fmt;

use crate::codec::{BIG_STRING_MAX, PacketReader, PacketWriter, SMALL_STRING_MAX};
use crate::rle::{Cell, RleMode, rle_decode, rle_encode};
use crate::{DecodeError, ProtocolError};

/// Version exchanged in the contact record. Clients must match exactly.
pub const PROTOCOL_VERSION: u16 = 3;

// ---------------------------------------------------------------------------
// PacketKind
// ---------------------------------------------------------------------------

/// Whether executing a command spends the entity's turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnCost {
    /// Runs regardless of energy and never blocks later commands.
    Free,
    /// Needs energy; while one is waiting, later consuming commands wait too.
    Consuming,
}

impl TurnCost {
    pub fn is_consuming(self) -> bool {
        matches!(self, Self::Consuming)
    }
}

/// Every packet type in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PacketKind {
    Undefined = 0,
    Play = 1,
    Quit = 2,
    Keepalive = 3,
    End = 4,
    ClientSetup = 5,
    Visuals = 6,
    Options = 7,
    Message = 8,
    Redraw = 9,
    Walk = 10,
    Run = 11,
    Tunnel = 12,
    Cast = 13,
    UseItem = 14,
    Rest = 15,
    LineInfo = 20,
}

impl PacketKind {
    /// Number of packet kinds.
    pub const COUNT: usize = 17;

    /// All kinds, in [`index`](Self::index) order.
    pub const ALL: [PacketKind; Self::COUNT] = [
        Self::Undefined,
        Self::Play,
        Self::Quit,
        Self::Keepalive,
        Self::End,
        Self::ClientSetup,
        Self::Visuals,
        Self::Options,
        Self::Message,
        Self::Redraw,
        Self::Walk,
        Self::Run,
        Self::Tunnel,
        Self::Cast,
        Self::UseItem,
        Self::Rest,
        Self::LineInfo,
    ];

    /// The wire tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Looks up a wire tag. `None` means the tag is not in the catalogue.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Undefined,
            1 => Self::Play,
            2 => Self::Quit,
            3 => Self::Keepalive,
            4 => Self::End,
            5 => Self::ClientSetup,
            6 => Self::Visuals,
            7 => Self::Options,
            8 => Self::Message,
            9 => Self::Redraw,
            10 => Self::Walk,
            11 => Self::Run,
            12 => Self::Tunnel,
            13 => Self::Cast,
            14 => Self::UseItem,
            15 => Self::Rest,
            20 => Self::LineInfo,
            _ => return None,
        })
    }

    /// Dense position of this kind, `0..COUNT`. Used to index tables.
    pub fn index(self) -> usize {
        match self {
            Self::LineInfo => 16,
            other => other as usize,
        }
    }

    /// Declared turn cost of the command this packet carries.
    ///
    /// Every kind is listed so a new one has to declare its cost.
    pub fn turn_cost(self) -> TurnCost {
        match self {
            Self::Walk | Self::Run | Self::Tunnel | Self::Cast | Self::UseItem | Self::Rest => {
                TurnCost::Consuming
            }
            Self::Undefined
            | Self::Play
            | Self::Quit
            | Self::Keepalive
            | Self::End
            | Self::ClientSetup
            | Self::Visuals
            | Self::Options
            | Self::Message
            | Self::Redraw
            | Self::LineInfo => TurnCost::Free,
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// Result code of the contact handshake, sent as the first reply byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0,
    /// Client is older than the server.
    VersionOld = 1,
    /// Bad names, console not allowed, or a malformed contact.
    Invalid = 2,
    /// Account rejected the credentials.
    Account = 3,
    /// Session table is full.
    GameFull = 4,
    /// Server-side socket failure.
    Socket = 5,
    /// Client is newer than the server.
    VersionNew = 6,
}

impl StatusCode {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Success,
            1 => Self::VersionOld,
            2 => Self::Invalid,
            3 => Self::Account,
            4 => Self::GameFull,
            5 => Self::Socket,
            6 => Self::VersionNew,
            _ => return None,
        })
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::VersionOld => "client version too old",
            Self::Invalid => "invalid contact",
            Self::Account => "account rejected",
            Self::GameFull => "game full",
            Self::Socket => "socket error",
            Self::VersionNew => "client version too new",
        };
        f.write_str(s)
    }
}

/// What kind of connection the contact record opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ConnType {
    Player = 0,
    Console = 1,
}

/// First record a client sends after connecting.
///
/// Console contacts carry only the type and version; the name fields are
/// empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRequest {
    pub conn_type: ConnType,
    pub version: u16,
    pub real: String,
    pub host: String,
    pub nick: String,
    pub pass: String,
}

impl ContactRequest {
    /// A player contact at the current protocol version.
    pub fn player(real: &str, host: &str, nick: &str, pass: &str) -> Self {
        Self {
            conn_type: ConnType::Player,
            version: PROTOCOL_VERSION,
            real: real.into(),
            host: host.into(),
            nick: nick.into(),
            pass: pass.into(),
        }
    }

    /// A console contact at the current protocol version.
    pub fn console() -> Self {
        Self {
            conn_type: ConnType::Console,
            version: PROTOCOL_VERSION,
            real: String::new(),
            host: String::new(),
            nick: String::new(),
            pass: String::new(),
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut w = PacketWriter::new(buf);
        w.u16(self.conn_type as u16).u16(self.version);
        if self.conn_type == ConnType::Player {
            w.str(&self.real, SMALL_STRING_MAX)
                .str(&self.host, SMALL_STRING_MAX)
                .str(&self.nick, SMALL_STRING_MAX)
                .str(&self.pass, SMALL_STRING_MAX);
        }
    }

    /// Decodes a contact record, consuming nothing unless it is complete.
    pub fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let start = r.position();
        let result = Self::decode_inner(r);
        if result.is_err() {
            r.seek(start);
        }
        result
    }

    fn decode_inner(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let conn_type = match r.u16()? {
            0 => ConnType::Player,
            1 => ConnType::Console,
            other => {
                return Err(DecodeError::Malformed(format!(
                    "unknown connection type {other}"
                )));
            }
        };
        let version = r.u16()?;
        let mut req = Self {
            conn_type,
            version,
            real: String::new(),
            host: String::new(),
            nick: String::new(),
            pass: String::new(),
        };
        if conn_type == ConnType::Player {
            req.real = r.str(SMALL_STRING_MAX)?;
            req.host = r.str(SMALL_STRING_MAX)?;
            req.nick = r.str(SMALL_STRING_MAX)?;
            req.pass = r.str(SMALL_STRING_MAX)?;
        }
        Ok(req)
    }
}

/// Server answer to a [`ContactRequest`]. Always five bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactReply {
    pub status: StatusCode,
    /// Characters on the account (0 for rejections and consoles).
    pub characters: u16,
    /// Character slots allowed on the account.
    pub max_characters: u16,
}

impl ContactReply {
    /// A rejection with no account details.
    pub fn rejected(status: StatusCode) -> Self {
        Self {
            status,
            characters: 0,
            max_characters: 0,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        PacketWriter::new(buf)
            .u8(self.status as u8)
            .u16(self.characters)
            .u16(self.max_characters);
    }

    pub fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let start = r.position();
        let result = Self::decode_inner(r);
        if result.is_err() {
            r.seek(start);
        }
        result
    }

    fn decode_inner(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let raw = r.u8()?;
        let status = StatusCode::from_u8(raw)
            .ok_or_else(|| DecodeError::Malformed(format!("unknown status {raw}")))?;
        Ok(Self {
            status,
            characters: r.u16()?,
            max_characters: r.u16()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Which visual table a `Visuals` packet fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VisualKind {
    Feature = 0,
    Object = 1,
    Monster = 2,
}

impl VisualKind {
    pub const COUNT: usize = 3;

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Feature),
            1 => Some(Self::Object),
            2 => Some(Self::Monster),
            _ => None,
        }
    }
}

/// A turn-consuming command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Walk { dir: u8 },
    Run { dir: u8 },
    Tunnel { dir: u8 },
    Cast { book: u8, spell: u8, dir: u8 },
    UseItem { item: i16, dir: u8 },
    Rest { turns: i16 },
}

impl Action {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Walk { .. } => PacketKind::Walk,
            Self::Run { .. } => PacketKind::Run,
            Self::Tunnel { .. } => PacketKind::Tunnel,
            Self::Cast { .. } => PacketKind::Cast,
            Self::UseItem { .. } => PacketKind::UseItem,
            Self::Rest { .. } => PacketKind::Rest,
        }
    }
}

/// A decoded packet sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    /// Request to enter play.
    Play,
    Quit,
    Keepalive { stamp: u32 },
    End,
    ClientSetup { cols: u16, rows: u16, rle: RleMode },
    Visuals { kind: VisualKind, offset: u16, entries: Vec<Cell> },
    Options { flags: Vec<u8> },
    Message { text: String },
    Redraw,
    Action(Action),
}

impl ClientPacket {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Play => PacketKind::Play,
            Self::Quit => PacketKind::Quit,
            Self::Keepalive { .. } => PacketKind::Keepalive,
            Self::End => PacketKind::End,
            Self::ClientSetup { .. } => PacketKind::ClientSetup,
            Self::Visuals { .. } => PacketKind::Visuals,
            Self::Options { .. } => PacketKind::Options,
            Self::Message { .. } => PacketKind::Message,
            Self::Redraw => PacketKind::Redraw,
            Self::Action(a) => a.kind(),
        }
    }

    /// Appends tag and payload.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut w = PacketWriter::new(buf);
        w.u8(self.kind().tag());
        match self {
            Self::Play | Self::Quit | Self::End | Self::Redraw => {}
            Self::Keepalive { stamp } => {
                w.u32(*stamp);
            }
            Self::ClientSetup { cols, rows, rle } => {
                w.u16(*cols).u16(*rows).u8(*rle as u8);
            }
            Self::Visuals {
                kind,
                offset,
                entries,
            } => {
                let count = entries.len().min(u16::MAX as usize);
                w.u8(*kind as u8).u16(*offset).u16(count as u16);
                for cell in &entries[..count] {
                    w.u16(cell.attr).u8(cell.ch);
                }
            }
            Self::Options { flags } => {
                w.u8(flags.len().min(u8::MAX as usize) as u8);
                w.bytes(&flags[..flags.len().min(u8::MAX as usize)]);
            }
            Self::Message { text } => {
                w.str(text, BIG_STRING_MAX);
            }
            Self::Action(action) => match *action {
                Action::Walk { dir } | Action::Run { dir } | Action::Tunnel { dir } => {
                    w.u8(dir);
                }
                Action::Cast { book, spell, dir } => {
                    w.u8(book).u8(spell).u8(dir);
                }
                Action::UseItem { item, dir } => {
                    w.i16(item).u8(dir);
                }
                Action::Rest { turns } => {
                    w.i16(turns);
                }
            },
        }
    }

    /// Decodes one packet including its tag.
    ///
    /// On any error the reader is rewound to where the packet started.
    pub fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let start = r.position();
        let result = r.u8().and_then(|tag| {
            let kind = PacketKind::from_tag(tag).ok_or(DecodeError::UnknownTag(tag))?;
            Self::decode_body(kind, r)
        });
        if result.is_err() {
            r.seek(start);
        }
        result
    }

    /// Decodes the payload of a packet whose tag has already been read.
    ///
    /// The reader is left mid-packet on error; callers that need to retry
    /// must rewind to the tag themselves.
    pub fn decode_body(kind: PacketKind, r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(match kind {
            PacketKind::Play => Self::Play,
            PacketKind::Quit => Self::Quit,
            PacketKind::End => Self::End,
            PacketKind::Redraw => Self::Redraw,
            PacketKind::Keepalive => Self::Keepalive { stamp: r.u32()? },
            PacketKind::ClientSetup => {
                let cols = r.u16()?;
                let rows = r.u16()?;
                let raw = r.u8()?;
                let rle = RleMode::from_u8(raw)
                    .ok_or_else(|| DecodeError::Malformed(format!("unknown RLE mode {raw}")))?;
                Self::ClientSetup { cols, rows, rle }
            }
            PacketKind::Visuals => {
                let raw = r.u8()?;
                let kind = VisualKind::from_u8(raw)
                    .ok_or_else(|| DecodeError::Malformed(format!("unknown visual table {raw}")))?;
                let offset = r.u16()?;
                let count = r.u16()? as usize;
                let mut entries = Vec::with_capacity(count.min(r.remaining() / 3 + 1));
                for _ in 0..count {
                    let attr = r.u16()?;
                    let ch = r.u8()?;
                    entries.push(Cell::new(attr, ch));
                }
                Self::Visuals {
                    kind,
                    offset,
                    entries,
                }
            }
            PacketKind::Options => {
                let count = r.u8()? as usize;
                let mut flags = Vec::with_capacity(count);
                for _ in 0..count {
                    flags.push(r.u8()?);
                }
                Self::Options { flags }
            }
            PacketKind::Message => Self::Message {
                text: r.str(BIG_STRING_MAX)?,
            },
            PacketKind::Walk => Self::Action(Action::Walk { dir: r.u8()? }),
            PacketKind::Run => Self::Action(Action::Run { dir: r.u8()? }),
            PacketKind::Tunnel => Self::Action(Action::Tunnel { dir: r.u8()? }),
            PacketKind::Cast => Self::Action(Action::Cast {
                book: r.u8()?,
                spell: r.u8()?,
                dir: r.u8()?,
            }),
            PacketKind::UseItem => Self::Action(Action::UseItem {
                item: r.i16()?,
                dir: r.u8()?,
            }),
            PacketKind::Rest => Self::Action(Action::Rest { turns: r.i16()? }),
            PacketKind::Undefined | PacketKind::LineInfo => {
                return Err(DecodeError::Malformed(format!(
                    "{kind} is not a client packet"
                )));
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// A packet the server writes into a session's outbound buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    /// Answer to an enter-play request.
    Play { status: StatusCode },
    /// Final notification before the connection closes.
    Quit { reason: String },
    Keepalive { stamp: u32 },
    Message { text: String },
    /// One screen row, RLE-encoded in the session's pinned mode.
    LineInfo { row: u16, cells: Vec<Cell> },
    /// Batch terminator appended at flush time.
    End,
}

impl ServerPacket {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Play { .. } => PacketKind::Play,
            Self::Quit { .. } => PacketKind::Quit,
            Self::Keepalive { .. } => PacketKind::Keepalive,
            Self::Message { .. } => PacketKind::Message,
            Self::LineInfo { .. } => PacketKind::LineInfo,
            Self::End => PacketKind::End,
        }
    }

    /// Appends tag and payload. Only `LineInfo` can fail, and only before
    /// anything is written.
    pub fn encode(&self, buf: &mut Vec<u8>, mode: RleMode) -> Result<(), ProtocolError> {
        if let Self::LineInfo { row, cells } = self {
            if cells.len() > u16::MAX as usize {
                return Err(ProtocolError::InvalidMessage(format!(
                    "row of {} cells is too wide",
                    cells.len()
                )));
            }
            let mut body = Vec::with_capacity(cells.len() * 3);
            rle_encode(cells, mode, &mut body)?;
            PacketWriter::new(buf)
                .u8(PacketKind::LineInfo.tag())
                .u16(*row)
                .u16(cells.len() as u16)
                .bytes(&body);
            return Ok(());
        }

        let mut w = PacketWriter::new(buf);
        w.u8(self.kind().tag());
        match self {
            Self::Play { status } => {
                w.u8(*status as u8);
            }
            Self::Quit { reason } => {
                w.str(reason, BIG_STRING_MAX);
            }
            Self::Keepalive { stamp } => {
                w.u32(*stamp);
            }
            Self::Message { text } => {
                w.str(text, BIG_STRING_MAX);
            }
            Self::End | Self::LineInfo { .. } => {}
        }
        Ok(())
    }

    /// Decodes one server packet, as a client would. Rewinds on error.
    pub fn decode(r: &mut PacketReader<'_>, mode: RleMode) -> Result<Self, DecodeError> {
        let start = r.position();
        let result = Self::decode_inner(r, mode);
        if result.is_err() {
            r.seek(start);
        }
        result
    }

    fn decode_inner(r: &mut PacketReader<'_>, mode: RleMode) -> Result<Self, DecodeError> {
        let tag = r.u8()?;
        let kind = PacketKind::from_tag(tag).ok_or(DecodeError::UnknownTag(tag))?;
        Ok(match kind {
            PacketKind::Play => {
                let raw = r.u8()?;
                let status = StatusCode::from_u8(raw)
                    .ok_or_else(|| DecodeError::Malformed(format!("unknown status {raw}")))?;
                Self::Play { status }
            }
            PacketKind::Quit => Self::Quit {
                reason: r.str(BIG_STRING_MAX)?,
            },
            PacketKind::Keepalive => Self::Keepalive { stamp: r.u32()? },
            PacketKind::Message => Self::Message {
                text: r.str(BIG_STRING_MAX)?,
            },
            PacketKind::LineInfo => {
                let row = r.u16()?;
                let count = r.u16()? as usize;
                let mut pos = r.position();
                let cells = rle_decode(r.buffer(), &mut pos, count, mode)?;
                r.seek(pos);
                Self::LineInfo { row, cells }
            }
            PacketKind::End => Self::End,
            other => {
                return Err(DecodeError::Malformed(format!(
                    "{other} is not a server packet"
                )));
            }
        })
    }
}

/// Decodes every complete server packet in `bytes`. Test and client helper.
pub fn decode_server_stream(bytes: &[u8], mode: RleMode) -> Result<Vec<ServerPacket>, DecodeError> {
    let mut r = PacketReader::new(bytes);
    let mut out = Vec::new();
    while !r.is_empty() {
        out.push(ServerPacket::decode(&mut r, mode)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_kind_tag_round_trips_for_all() {
        for (i, kind) in PacketKind::ALL.iter().enumerate() {
            assert_eq!(PacketKind::from_tag(kind.tag()), Some(*kind));
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_packet_kind_unknown_tag() {
        assert_eq!(PacketKind::from_tag(16), None);
        assert_eq!(PacketKind::from_tag(0xff), None);
    }

    #[test]
    fn test_turn_cost_declared_per_kind() {
        assert!(PacketKind::Walk.turn_cost().is_consuming());
        assert!(PacketKind::Rest.turn_cost().is_consuming());
        assert!(!PacketKind::Keepalive.turn_cost().is_consuming());
        assert!(!PacketKind::Message.turn_cost().is_consuming());
        assert!(!PacketKind::Options.turn_cost().is_consuming());
    }

    #[test]
    fn test_client_walk_is_two_bytes() {
        let mut buf = Vec::new();
        ClientPacket::Action(Action::Walk { dir: 6 }).encode(&mut buf);
        assert_eq!(buf, [10, 6]);
    }

    #[test]
    fn test_client_visuals_oversize_count_matches_body() {
        let packet = ClientPacket::Visuals {
            kind: VisualKind::Monster,
            offset: 0,
            entries: vec![Cell::new(1, b'k'); 70_000],
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf);
        assert_eq!(u16::from_be_bytes([buf[4], buf[5]]), u16::MAX);
        assert_eq!(buf.len(), 6 + u16::MAX as usize * 3);

        let mut r = PacketReader::new(&buf);
        match ClientPacket::decode(&mut r).unwrap() {
            ClientPacket::Visuals { entries, .. } => assert_eq!(entries.len(), u16::MAX as usize),
            other => panic!("unexpected {other:?}"),
        }
        assert!(r.is_empty());
    }

    #[test]
    fn test_client_decode_unknown_tag_rewinds() {
        let buf = [0x7f, 1, 2];
        let mut r = PacketReader::new(&buf);
        let err = ClientPacket::decode(&mut r).unwrap_err();
        assert_eq!(err, DecodeError::UnknownTag(0x7f));
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_client_decode_partial_cast_is_incomplete() {
        let mut buf = Vec::new();
        ClientPacket::Action(Action::Cast {
            book: 1,
            spell: 2,
            dir: 3,
        })
        .encode(&mut buf);
        let mut r = PacketReader::new(&buf[..3]);
        assert!(ClientPacket::decode(&mut r).unwrap_err().is_incomplete());
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_client_decode_line_info_is_malformed() {
        let buf = [PacketKind::LineInfo.tag(), 0, 0];
        let mut r = PacketReader::new(&buf);
        assert!(matches!(
            ClientPacket::decode(&mut r),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_client_setup_bad_rle_mode_is_malformed() {
        let buf = [PacketKind::ClientSetup.tag(), 0, 80, 0, 24, 9];
        let mut r = PacketReader::new(&buf);
        assert!(ClientPacket::decode(&mut r).unwrap_err().is_fatal());
    }

    #[test]
    fn test_contact_request_console_has_no_names() {
        let mut buf = Vec::new();
        ContactRequest::console().encode(&mut buf);
        assert_eq!(buf, [0, 1, 0, PROTOCOL_VERSION as u8]);

        let mut r = PacketReader::new(&buf);
        let req = ContactRequest::decode(&mut r).unwrap();
        assert_eq!(req.conn_type, ConnType::Console);
        assert!(req.nick.is_empty());
    }

    #[test]
    fn test_contact_request_player_partial_rewinds() {
        let mut buf = Vec::new();
        ContactRequest::player("Ann", "box", "Ann", "pw").encode(&mut buf);
        let mut r = PacketReader::new(&buf[..buf.len() - 1]);
        assert!(ContactRequest::decode(&mut r).unwrap_err().is_incomplete());
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_contact_request_unknown_conn_type_is_malformed() {
        let buf = [0, 9, 0, 3];
        let mut r = PacketReader::new(&buf);
        assert!(ContactRequest::decode(&mut r).unwrap_err().is_fatal());
    }

    #[test]
    fn test_contact_reply_is_five_bytes() {
        let mut buf = Vec::new();
        ContactReply {
            status: StatusCode::Success,
            characters: 1,
            max_characters: 4,
        }
        .encode(&mut buf);
        assert_eq!(buf, [0, 0, 1, 0, 4]);
    }

    #[test]
    fn test_server_quit_carries_reason() {
        let mut buf = Vec::new();
        ServerPacket::Quit {
            reason: "Timeout".into(),
        }
        .encode(&mut buf, RleMode::Classic)
        .unwrap();
        ServerPacket::End.encode(&mut buf, RleMode::Classic).unwrap();

        let packets = decode_server_stream(&buf, RleMode::Classic).unwrap();
        assert_eq!(
            packets,
            vec![
                ServerPacket::Quit {
                    reason: "Timeout".into()
                },
                ServerPacket::End
            ]
        );
    }

    #[test]
    fn test_server_line_info_uses_rle_body() {
        let wall = Cell::new(7, b'#');
        let mut buf = Vec::new();
        ServerPacket::LineInfo {
            row: 3,
            cells: vec![wall, wall],
        }
        .encode(&mut buf, RleMode::Classic)
        .unwrap();
        // tag + row + count + one 5-byte run
        assert_eq!(buf.len(), 1 + 2 + 2 + 5);

        let mut r = PacketReader::new(&buf);
        let decoded = ServerPacket::decode(&mut r, RleMode::Classic).unwrap();
        assert_eq!(
            decoded,
            ServerPacket::LineInfo {
                row: 3,
                cells: vec![wall, wall]
            }
        );
    }

    #[test]
    fn test_status_code_from_u8() {
        assert_eq!(StatusCode::from_u8(4), Some(StatusCode::GameFull));
        assert_eq!(StatusCode::from_u8(7), None);
        assert_eq!(StatusCode::GameFull.to_string(), "game full");
    }
}
