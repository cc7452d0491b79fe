//! Wire protocol for Delve.
//!
//! This crate defines the byte-level language clients and the server speak:
//!
//! - **Codec** ([`Field`], [`PacketReader`], [`PacketWriter`]): big-endian
//!   fixed-width integers and length-prefixed strings.
//! - **Types** ([`PacketKind`], [`ClientPacket`], [`ServerPacket`],
//!   [`ContactRequest`]): the packet catalogue and handshake records.
//! - **RLE** ([`rle_encode`], [`rle_decode`]): compact screen rows.
//! - **Errors** ([`DecodeError`], [`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer knows nothing about sockets or sessions. It turns
//! bytes into typed packets and back, and it reports "not enough bytes yet"
//! separately from "these bytes are garbage".
//!
//! ```text
//! Transport (bytes) → Protocol (packets) → Command dispatch (per session)
//! ```

mod codec;
mod error;
mod rle;
mod types;

pub use codec::{
    BIG_STRING_MAX, BigString, BoundedString, Field, PacketReader, PacketWriter,
    SMALL_STRING_MAX, SmallString, decode_field, encode_field, truncate_str,
};
pub use error::{DecodeError, ProtocolError};
pub use rle::{
    CLASSIC_RUN_MARKER, Cell, LARGE_RUN_MARKER, LITERAL_LEN, RUN_LEN, RleMode, rle_decode,
    rle_encode,
};
pub use types::{
    Action, ClientPacket, ConnType, ContactReply, ContactRequest, PROTOCOL_VERSION, PacketKind,
    ServerPacket, StatusCode, TurnCost, VisualKind, decode_server_stream,
};
