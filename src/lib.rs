//! Flow-controlled SPI link between two microcontrollers, built on [`embedded_hal`] traits.
//!
//! One processor (the radio MCU) is the SPI master, the other (the application MCU) is the
//! slave. Next to the usual clock, data and chip-select signals the link uses two handshake
//! lines driven by the slave:
//!
//! * **SRDY**, the slave is ready for the master to clock a session.
//! * **MRDY**, the slave has a message queued for the master to read.
//!
//! Messages travel in a small envelope, `[0x5A, LENGTH, COMMAND, DATA...]`, described in
//! [`frame`]. The command byte is split into ranges for board control, application messages and a
//! self-test, see [`command`].
//!
//! The slave side is a [`SlaveLink`] state machine stepped from a 1 ms tick, fed by per-byte
//! callbacks from the SPI interrupt. The master side is a [`MasterLink`] with blocking
//! [`send`](MasterLink::send) and [`receive`](MasterLink::receive) calls. Frames received on
//! either side are routed by a [`Dispatcher`] into board-control handlers or a [`Mailbox`].
//!
//! [`embedded_hal`]: https://github.com/rust-embedded/embedded-hal
//!
//! # Usage
//!
//! Nothing here touches hardware directly. Give the links pins from your HAL and a millisecond
//! counter (any `Fn() -> u32` works):
//!
//! ```ignore
//! use flowspi::{FlowInput, FlowOutput, Polarity, SlaveConfig, SlaveLink};
//!
//! let mut link = SlaveLink::initialize(
//!     FlowInput::new(cs_pin, Polarity::ActiveLow),
//!     FlowOutput::new(srdy_pin, Polarity::ActiveLow),
//!     FlowOutput::new(mrdy_pin, Polarity::ActiveLow),
//!     || systick_ms(),
//!     SlaveConfig::default(),
//! );
//!
//! loop {
//!     if let Some(frame) = link.run_active_state() {
//!         dispatcher.dispatch(&frame, &mut link).ok();
//!     }
//!     wait_for_tick();
//! }
//! ```
//!
//! # Features
//!
//! `defmt`: log link events and derive `defmt::Format` for the public types.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

// Must come first so the logging macros are visible in every module
mod fmt;

pub mod command;
pub mod dispatch;
pub mod error;
pub mod flow;
pub mod frame;
pub mod master;
pub mod message;
pub mod slave;
pub mod time;

#[cfg(test)]
mod mock;

pub use dispatch::{BoardControl, Dispatched, Dispatcher, Mailbox, Outbound};
pub use error::{DecodeError, EncodeError, FormatError, LinkError};
pub use flow::{FlowInput, FlowOutput, Polarity};
pub use frame::{Frame, FrameBuf};
pub use master::{MasterConfig, MasterLink};
pub use slave::{LinkFlags, SlaveConfig, SlaveLink, State};
pub use time::Millis;
