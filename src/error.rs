//! Error types shared by both sides of the link.
//!
//! HAL errors are reduced to their `embedded-hal` [`ErrorKind`](embedded_hal::spi::ErrorKind)
//! so [`LinkError`] stays the same type regardless of the pins and SPI peripheral in use.

use embedded_hal::digital;
use embedded_hal::spi;

/// Reasons a received byte sequence is not a valid frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FormatError {
    /// First byte is not the sync byte
    BadSync,
    /// Fewer bytes than the length field promises
    Truncated,
    /// Length field is zero (no command byte) or 255
    BadLength,
    /// More bytes were observed than the length field accounts for
    LengthMismatch,
}

/// Reasons a frame could not be built
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// Command plus payload does not fit the one byte length field
    TooLong,
    /// Encoded frame is larger than the link buffer
    ExceedsBuffer,
}

/// Reasons a valid frame does not decode as a typed message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Command byte has no typed message in this direction
    UnknownCommand,
    /// Payload is not the size the command requires
    WrongLength,
    /// A payload field is out of range
    InvalidValue,
}

/// Link-level transfer errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// Peer did not assert its ready line in time
    Timeout,
    /// Peer is signalling it has its own message to push, or a message is already queued
    Busy,
    /// Incoming frame is larger than the buffer supplied
    Overflow,
    /// Link failed to initialize and is permanently disabled
    Offline,
    /// SPI peripheral error
    Bus(spi::ErrorKind),
    /// Handshake or chip-select pin error
    Pin(digital::ErrorKind),
    /// Bytes clocked in from the peer are not a valid frame
    Frame(FormatError),
}

impl From<FormatError> for LinkError {
    fn from(err: FormatError) -> Self {
        LinkError::Frame(err)
    }
}

impl LinkError {
    #[inline]
    pub(crate) fn pin<E: digital::Error>(err: E) -> Self {
        LinkError::Pin(err.kind())
    }

    #[inline]
    pub(crate) fn bus<E: spi::Error>(err: E) -> Self {
        LinkError::Bus(err.kind())
    }
}
