//! Wire envelope shared by both directions of the link.
//!
//! Every message on the bus is laid out as
//!
//! ```text
//! [SYNC, LENGTH, COMMAND, DATA0, ..., DATAn]
//! ```
//!
//! where `SYNC` is always [`SYNC_BYTE`] and `LENGTH` counts the command byte plus the data bytes,
//! but neither itself nor the sync byte. A frame therefore occupies `2 + LENGTH` bytes on the
//! wire.
//!
//! [`encode`] builds an owned [`FrameBuf`], [`validate`] and [`validate_exact`] check a received
//! byte sequence and return a borrowed [`Frame`] view into it.

use crate::error::{EncodeError, FormatError};

/// Value that must appear at the start of every frame
pub const SYNC_BYTE: u8 = 0x5A;
/// Bytes on the wire not counted by the length field (sync + length)
pub const OVERHEAD_BYTES: usize = 2;
/// Capacity of the link buffers on both sides
pub const BUFFER_SIZE: usize = 128;
/// Largest payload that fits in [`BUFFER_SIZE`] alongside sync, length and command
pub const MAX_PAYLOAD: usize = BUFFER_SIZE - OVERHEAD_BYTES - 1;

/// Offset of the sync byte
pub const SYNC_INDEX: usize = 0;
/// Offset of the length byte
pub const LENGTH_INDEX: usize = 1;
/// Offset of the command byte
pub const COMMAND_INDEX: usize = 2;
/// Offset of the first data byte
pub const DATA_INDEX: usize = 3;

/// A validated frame borrowed from a receive buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame<'a> {
    command: u8,
    payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// View a command and payload as a frame. Nothing is checked; use [`encode`] to get something
    /// that is guaranteed to fit on the wire.
    #[inline]
    pub const fn new(command: u8, payload: &'a [u8]) -> Self {
        Frame { command, payload }
    }

    /// Command byte
    #[inline]
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Data bytes following the command
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Value of the length field: command plus data bytes
    #[inline]
    pub fn length(&self) -> usize {
        1 + self.payload.len()
    }

    /// Total bytes this frame occupies on the wire
    #[inline]
    pub fn wire_len(&self) -> usize {
        OVERHEAD_BYTES + self.length()
    }

    /// Copy this frame into an owned buffer
    #[inline]
    pub fn to_frame_buf(&self) -> Result<FrameBuf, EncodeError> {
        encode(self.command, self.payload)
    }
}

/// An encoded frame stored inline, ready to be clocked out
///
/// This is the unit handed between the link and its users: completed receptions are copied
/// out of the receive buffer into one of these and outbound messages are queued as one.
#[derive(Clone, Copy)]
pub struct FrameBuf {
    bytes: [u8; BUFFER_SIZE],
    len: u8,
}

impl FrameBuf {
    /// A frame with no data: `[SYNC, 1, command]`
    pub const fn bare(command: u8) -> Self {
        let mut bytes = [0; BUFFER_SIZE];
        bytes[SYNC_INDEX] = SYNC_BYTE;
        bytes[LENGTH_INDEX] = 1;
        bytes[COMMAND_INDEX] = command;
        FrameBuf {
            bytes,
            len: (OVERHEAD_BYTES + 1) as u8,
        }
    }

    /// Encoded bytes, starting with the sync byte
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    /// Borrowed view of the frame
    #[inline]
    pub fn frame(&self) -> Frame<'_> {
        Frame {
            command: self.command(),
            payload: self.payload(),
        }
    }

    /// Command byte
    #[inline]
    pub fn command(&self) -> u8 {
        self.bytes[COMMAND_INDEX]
    }

    /// Data bytes following the command
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.bytes[DATA_INDEX..usize::from(self.len)]
    }

    /// Number of bytes on the wire
    #[inline]
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Always false, a frame carries at least sync, length and command
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl core::fmt::Debug for FrameBuf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("FrameBuf").field(&self.as_bytes()).finish()
    }
}

impl PartialEq for FrameBuf {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for FrameBuf {}

#[cfg(feature = "defmt")]
impl defmt::Format for FrameBuf {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "FrameBuf({=[u8]:#x})", self.as_bytes())
    }
}

/// Build `[SYNC, 1 + payload.len(), command, payload...]`
pub fn encode(command: u8, payload: &[u8]) -> Result<FrameBuf, EncodeError> {
    let length = 1 + payload.len();
    if length > usize::from(u8::MAX) {
        return Err(EncodeError::TooLong);
    }
    let wire_len = OVERHEAD_BYTES + length;
    if wire_len > BUFFER_SIZE {
        return Err(EncodeError::ExceedsBuffer);
    }

    let mut bytes = [0; BUFFER_SIZE];
    bytes[SYNC_INDEX] = SYNC_BYTE;
    bytes[LENGTH_INDEX] = length as u8;
    bytes[COMMAND_INDEX] = command;
    bytes[DATA_INDEX..wire_len].copy_from_slice(payload);

    Ok(FrameBuf {
        bytes,
        len: wire_len as u8,
    })
}

/// Check the envelope at the start of `bytes`. Bytes past the end of the frame are ignored, so
/// this can be pointed at a whole receive buffer.
pub fn validate(bytes: &[u8]) -> Result<Frame<'_>, FormatError> {
    match bytes.first() {
        Some(&SYNC_BYTE) => (),
        Some(_) => return Err(FormatError::BadSync),
        None => return Err(FormatError::Truncated),
    }

    let length = match bytes.get(LENGTH_INDEX) {
        Some(&len) => usize::from(len),
        None => return Err(FormatError::Truncated),
    };
    if length == 0 || length == usize::from(u8::MAX) {
        return Err(FormatError::BadLength);
    }

    let wire_len = OVERHEAD_BYTES + length;
    if bytes.len() < wire_len {
        return Err(FormatError::Truncated);
    }

    Ok(Frame {
        command: bytes[COMMAND_INDEX],
        payload: &bytes[DATA_INDEX..wire_len],
    })
}

/// Like [`validate`], but `bytes` must be exactly one frame long
pub fn validate_exact(bytes: &[u8]) -> Result<Frame<'_>, FormatError> {
    let frame = validate(bytes)?;
    if frame.wire_len() != bytes.len() {
        return Err(FormatError::LengthMismatch);
    }
    Ok(frame)
}
