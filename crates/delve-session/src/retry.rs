//! Deferred commands waiting for turn energy.
//!
//! A command that is well-formed but cannot run yet is kept as the exact
//! bytes it arrived as: tag plus raw argument bytes. Next tick those bytes
//! are put back in front of any newly read input, so the command is decoded
//! and dispatched again in its original position.

use std::collections::VecDeque;

/// One deferred command, byte-identical to what the client sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredCommand {
    tag: u8,
    raw_args: Vec<u8>,
}

impl DeferredCommand {
    pub fn new(tag: u8, raw_args: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            raw_args: raw_args.into(),
        }
    }

    /// Splits a complete encoded packet into tag and arguments.
    ///
    /// Returns `None` for an empty slice.
    pub fn from_packet(packet: &[u8]) -> Option<Self> {
        let (&tag, args) = packet.split_first()?;
        Some(Self::new(tag, args))
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn raw_args(&self) -> &[u8] {
        &self.raw_args
    }

    /// Encoded length (tag plus arguments).
    pub fn encoded_len(&self) -> usize {
        1 + self.raw_args.len()
    }

    /// Appends the original wire bytes to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(self.tag);
        buf.extend_from_slice(&self.raw_args);
    }
}

/// FIFO of [`DeferredCommand`]s for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryQueue {
    commands: VecDeque<DeferredCommand>,
    /// Sum of `encoded_len` over `commands`.
    bytes: usize,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends at the back. Order of pushes is order of replay.
    pub fn push(&mut self, command: DeferredCommand) {
        self.bytes += command.encoded_len();
        self.commands.push_back(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn front(&self) -> Option<&DeferredCommand> {
        self.commands.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeferredCommand> {
        self.commands.iter()
    }

    /// Total encoded bytes held. Counted against the session's input bound.
    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    /// Empties the queue into one contiguous byte stream, oldest first.
    pub fn drain_bytes(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for cmd in self.commands.drain(..) {
            cmd.write_to(&mut out);
        }
        self.bytes = 0;
        out
    }

    pub fn clear(&mut self) {
        self.bytes = 0;
        self.commands.clear();
    }
}
