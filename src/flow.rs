//! Flow-control signal pair and chip-select
//!
//! Two single-bit handshake lines gate when the SPI clock may run:
//!
//! * **SRDY** (ready to receive, slave to master): the slave asserts it to tell the master it may
//!   clock the next session. It is dropped briefly while each received byte is stored.
//! * **MRDY** (ready to send, slave to master): the slave asserts it while it has a message queued.
//!   If MRDY is asserted when chip-select arrives the master is reading; otherwise it is writing.
//!
//! Chip-select is driven by the master and sensed by the slave. All three lines are plain level
//! signals with no debouncing. On the reference boards they are open-drain and active low, which
//! is what [`Polarity::default()`] gives.

use crate::error::LinkError;
use embedded_hal::digital::{InputPin, OutputPin};

/// Electrical level that means "asserted"
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    /// Asserted when the line is low
    #[default]
    ActiveLow,
    /// Asserted when the line is high
    ActiveHigh,
}

/// A handshake line this side drives
pub struct FlowOutput<P> {
    pin: P,
    polarity: Polarity,
    asserted: bool,
}

impl<P: OutputPin> FlowOutput<P> {
    /// Wrap an output pin. The line is not touched until [`assert`](Self::assert) or
    /// [`deassert`](Self::deassert) is called.
    pub fn new(pin: P, polarity: Polarity) -> Self {
        FlowOutput {
            pin,
            polarity,
            asserted: false,
        }
    }

    /// Drive the line to its asserted level
    #[inline]
    pub fn assert(&mut self) -> Result<(), LinkError> {
        let res = match self.polarity {
            Polarity::ActiveLow => self.pin.set_low(),
            Polarity::ActiveHigh => self.pin.set_high(),
        };
        res.map_err(LinkError::pin)?;
        self.asserted = true;
        Ok(())
    }

    /// Drive the line to its idle level
    #[inline]
    pub fn deassert(&mut self) -> Result<(), LinkError> {
        let res = match self.polarity {
            Polarity::ActiveLow => self.pin.set_high(),
            Polarity::ActiveHigh => self.pin.set_low(),
        };
        res.map_err(LinkError::pin)?;
        self.asserted = false;
        Ok(())
    }

    /// Last level written by this side
    #[inline(always)]
    pub fn is_asserted(&self) -> bool {
        self.asserted
    }

    /// Release the underlying pin
    pub fn free(self) -> P {
        self.pin
    }
}

/// A handshake line driven by the other side
pub struct FlowInput<P> {
    pin: P,
    polarity: Polarity,
}

impl<P: InputPin> FlowInput<P> {
    /// Wrap an input pin
    pub fn new(pin: P, polarity: Polarity) -> Self {
        FlowInput { pin, polarity }
    }

    /// Sample the line
    #[inline]
    pub fn is_asserted(&mut self) -> Result<bool, LinkError> {
        let res = match self.polarity {
            Polarity::ActiveLow => self.pin.is_low(),
            Polarity::ActiveHigh => self.pin.is_high(),
        };
        res.map_err(LinkError::pin)
    }

    /// Release the underlying pin
    pub fn free(self) -> P {
        self.pin
    }
}
