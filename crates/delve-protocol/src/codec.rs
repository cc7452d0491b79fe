//! Typed field codec.
//!
//! Every packet payload is a sequence of fields whose widths are fixed by
//! the packet's schema. Integers are big-endian. Strings are a `u16` byte
//! length followed by UTF-8, with a declared maximum per field.
//!
//! Decoding never consumes a partial field: on [`DecodeError::Incomplete`]
//! the cursor is left exactly where it was, so the caller can keep the
//! bytes and retry after the next read.

use crate::DecodeError;

/// Maximum byte length of a short string field (names, hosts, passwords).
pub const SMALL_STRING_MAX: usize = 80;

/// Maximum byte length of a long string field (chat, quit reasons).
pub const BIG_STRING_MAX: usize = 1024;

/// A value with a fixed wire schema.
pub trait Field: Sized {
    /// Appends the encoded value to `buf`.
    fn encode(&self, buf: &mut Vec<u8>);

    /// Decodes a value starting at `*cursor`, advancing it on success.
    fn decode(buf: &[u8], cursor: &mut usize) -> Result<Self, DecodeError>;
}

/// Appends `value` to `buf`.
pub fn encode_field<T: Field>(buf: &mut Vec<u8>, value: &T) {
    value.encode(buf);
}

/// Decodes a `T` at `*cursor`. The cursor only moves on success.
pub fn decode_field<T: Field>(buf: &[u8], cursor: &mut usize) -> Result<T, DecodeError> {
    T::decode(buf, cursor)
}

fn take<'a>(buf: &'a [u8], cursor: &mut usize, n: usize) -> Result<&'a [u8], DecodeError> {
    let start = *cursor;
    let end = start + n;
    if buf.len() < end {
        return Err(DecodeError::Incomplete {
            needed: end - buf.len(),
        });
    }
    *cursor = end;
    Ok(&buf[start..end])
}

macro_rules! int_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Field for $ty {
                fn encode(&self, buf: &mut Vec<u8>) {
                    buf.extend_from_slice(&self.to_be_bytes());
                }

                fn decode(buf: &[u8], cursor: &mut usize) -> Result<Self, DecodeError> {
                    const N: usize = std::mem::size_of::<$ty>();
                    let bytes = take(buf, cursor, N)?;
                    let mut raw = [0u8; N];
                    raw.copy_from_slice(bytes);
                    Ok(<$ty>::from_be_bytes(raw))
                }
            }
        )*
    };
}

int_field!(u8, i8, u16, i16, u32, i32);

/// Cuts `s` to at most `max` bytes without splitting a character.
pub fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn encode_str(buf: &mut Vec<u8>, s: &str, max: usize) {
    let s = truncate_str(s, max.min(u16::MAX as usize));
    (s.len() as u16).encode(buf);
    buf.extend_from_slice(s.as_bytes());
}

fn decode_str(buf: &[u8], cursor: &mut usize, max: usize) -> Result<String, DecodeError> {
    let mut pos = *cursor;
    let len = u16::decode(buf, &mut pos)? as usize;
    if len > max {
        return Err(DecodeError::Malformed(format!(
            "string of {len} bytes exceeds limit {max}"
        )));
    }
    let bytes = take(buf, &mut pos, len)?;
    let s = std::str::from_utf8(bytes)
        .map_err(|e| DecodeError::Malformed(format!("string is not UTF-8: {e}")))?
        .to_owned();
    *cursor = pos;
    Ok(s)
}

/// A string field with a compile-time byte limit.
///
/// Encoding silently truncates to `MAX` bytes; decoding rejects anything
/// longer as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoundedString<const MAX: usize>(pub String);

/// Names, hosts, and passwords.
pub type SmallString = BoundedString<SMALL_STRING_MAX>;

/// Chat lines and disconnect reasons.
pub type BigString = BoundedString<BIG_STRING_MAX>;

impl<const MAX: usize> BoundedString<MAX> {
    /// Wraps `s`, truncating it to the limit.
    pub fn new(s: impl Into<String>) -> Self {
        let s = s.into();
        let keep = truncate_str(&s, MAX).len();
        let mut s = s;
        s.truncate(keep);
        Self(s)
    }

    /// Returns the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<const MAX: usize> Field for BoundedString<MAX> {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_str(buf, &self.0, MAX);
    }

    fn decode(buf: &[u8], cursor: &mut usize) -> Result<Self, DecodeError> {
        decode_str(buf, cursor, MAX).map(Self)
    }
}

// ---------------------------------------------------------------------------
// PacketWriter / PacketReader
// ---------------------------------------------------------------------------

/// Appends fields to a growable buffer.
pub struct PacketWriter<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> PacketWriter<'a> {
    /// Writes into `buf`, after whatever it already holds.
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }

    /// Appends any [`Field`].
    pub fn put<T: Field>(&mut self, value: &T) -> &mut Self {
        value.encode(self.buf);
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.put(&v)
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.put(&v)
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.put(&v)
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.put(&v)
    }

    /// Appends a string field, truncated to `max` bytes.
    pub fn str(&mut self, s: &str, max: usize) -> &mut Self {
        encode_str(self.buf, s, max);
        self
    }

    /// Appends raw bytes with no framing.
    pub fn bytes(&mut self, raw: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(raw);
        self
    }

    /// Total bytes in the underlying buffer.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Reads fields from a byte slice with an internal cursor.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The full underlying slice.
    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    /// Moves the cursor; used to rewind to a packet boundary.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    /// Decodes any [`Field`].
    pub fn read<T: Field>(&mut self) -> Result<T, DecodeError> {
        T::decode(self.buf, &mut self.pos)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        self.read()
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        self.read()
    }

    pub fn i16(&mut self) -> Result<i16, DecodeError> {
        self.read()
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        self.read()
    }

    /// Decodes a string field limited to `max` bytes.
    pub fn str(&mut self, max: usize) -> Result<String, DecodeError> {
        decode_str(self.buf, &mut self.pos, max)
    }

    /// Returns the next byte without consuming it.
    pub fn peek_u8(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }
}
