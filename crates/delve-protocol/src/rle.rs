//! Run-length encoding for screen rows.
//!
//! A screen row is a sequence of [`Cell`]s. Each cell is sent either as a
//! 3-byte literal (`ch u8, attr u16`) or, for two or more identical cells in
//! a row, as a 5-byte run (`ch u8, attr|marker u16, count u16`). The marker
//! is a reserved attribute bit that depends on the mode the client asked
//! for during setup:
//!
//! | mode      | marker   | max run  | attribute range |
//! |-----------|----------|----------|-----------------|
//! | `None`    | none     | 1        | any             |
//! | `Classic` | `0x40`   | 255      | bit 6 clear     |
//! | `Large`   | `0x8000` | 65535    | bit 15 clear    |
//!
//! A receiver decoding with the wrong mode misrenders instead of failing,
//! which is why the mode is pinned for the lifetime of a session.

use std::fmt;

use crate::{DecodeError, ProtocolError};
use crate::codec::Field;

/// Run marker bit for classic clients.
pub const CLASSIC_RUN_MARKER: u16 = 0x40;

/// Run marker bit for large (extended tile set) clients.
pub const LARGE_RUN_MARKER: u16 = 0x8000;

/// Encoded size of a literal cell.
pub const LITERAL_LEN: usize = 3;

/// Encoded size of a run record.
pub const RUN_LEN: usize = 5;

/// One screen position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cell {
    /// Colour and tile-bank bits.
    pub attr: u16,
    /// Glyph.
    pub ch: u8,
}

impl Cell {
    pub fn new(attr: u16, ch: u8) -> Self {
        Self { attr, ch }
    }
}

/// Run-marker convention negotiated with a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum RleMode {
    /// Literals only.
    None = 0,
    /// Marker `0x40`, byte-sized repeat counts.
    #[default]
    Classic = 1,
    /// Marker `0x8000`, full 16-bit repeat counts.
    Large = 2,
}

impl RleMode {
    /// Parses the wire value sent in client setup.
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::Classic),
            2 => Some(Self::Large),
            _ => None,
        }
    }

    /// The attribute bit that flags a run, if runs are enabled.
    pub fn marker(self) -> Option<u16> {
        match self {
            Self::None => None,
            Self::Classic => Some(CLASSIC_RUN_MARKER),
            Self::Large => Some(LARGE_RUN_MARKER),
        }
    }

    /// Longest run a single record may carry.
    pub fn max_run(self) -> usize {
        match self {
            Self::None => 1,
            Self::Classic => 255,
            Self::Large => u16::MAX as usize,
        }
    }
}

impl fmt::Display for RleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Classic => write!(f, "classic"),
            Self::Large => write!(f, "large"),
        }
    }
}

/// Appends the RLE encoding of `cells` to `out`.
///
/// Nothing is written if any attribute collides with the mode's marker.
pub fn rle_encode(cells: &[Cell], mode: RleMode, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    if let Some(marker) = mode.marker() {
        if let Some(bad) = cells.iter().find(|c| c.attr & marker != 0) {
            return Err(ProtocolError::AttrOutOfRange {
                attr: bad.attr,
                mode,
            });
        }
    }

    let max_run = mode.max_run();
    let mut i = 0;
    while i < cells.len() {
        let cell = cells[i];
        let mut n = 1;
        while n < max_run && i + n < cells.len() && cells[i + n] == cell {
            n += 1;
        }

        match mode.marker() {
            Some(marker) if n >= 2 => {
                out.push(cell.ch);
                (cell.attr | marker).encode(out);
                (n as u16).encode(out);
            }
            _ => {
                out.push(cell.ch);
                cell.attr.encode(out);
            }
        }
        i += n;
    }
    Ok(())
}

/// Decodes exactly `count` cells starting at `*cursor`.
///
/// The cursor only moves once every cell is available. A run of zero or one
/// that overshoots `count` is malformed.
pub fn rle_decode(
    buf: &[u8],
    cursor: &mut usize,
    count: usize,
    mode: RleMode,
) -> Result<Vec<Cell>, DecodeError> {
    let mut pos = *cursor;
    let mut cells = Vec::with_capacity(count);

    while cells.len() < count {
        let ch = u8::decode(buf, &mut pos)?;
        let attr = u16::decode(buf, &mut pos)?;

        match mode.marker() {
            Some(marker) if attr & marker != 0 => {
                let n = u16::decode(buf, &mut pos)? as usize;
                if n == 0 || cells.len() + n > count {
                    return Err(DecodeError::Malformed(format!(
                        "run of {n} overflows row of {count} cells"
                    )));
                }
                let cell = Cell::new(attr & !marker, ch);
                cells.extend(std::iter::repeat_n(cell, n));
            }
            _ => cells.push(Cell::new(attr, ch)),
        }
    }

    *cursor = pos;
    Ok(cells)
}
