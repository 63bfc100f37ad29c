//! Master side of the link
//!
//! The master owns the SPI clock and chip-select. Every transfer is a blocking call that asserts
//! chip-select, waits for the slave to raise SRDY, clocks the bytes one at a time through a
//! [`FullDuplex`] peripheral and releases chip-select after a short settle delay. Waits on the
//! handshake lines are bounded by [`MasterConfig::ready_timeout_ms`].
//!
//! The bus is used half duplex. [`MasterLink::send()`] discards whatever the slave clocks back,
//! [`MasterLink::receive()`] clocks out the dummy byte and learns the frame length from the second
//! byte it receives.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_nb::spi::FullDuplex;

use crate::command;
use crate::dispatch::Outbound;
use crate::error::LinkError;
use crate::flow::{FlowInput, FlowOutput};
use crate::frame::{self, Frame, FrameBuf, LENGTH_INDEX, OVERHEAD_BYTES};
use crate::slave::DUMMY_BYTE;
use crate::time::{Deadline, Millis};

/// Timing and filler settings for a [`MasterLink`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MasterConfig {
    /// Longest wait for a handshake line, in ms
    pub ready_timeout_ms: u32,
    /// Pause between the last clocked byte and releasing chip-select, in µs
    pub settle_delay_us: u32,
    /// Byte clocked out while receiving
    pub dummy: u8,
}

impl Default for MasterConfig {
    fn default() -> Self {
        MasterConfig {
            ready_timeout_ms: 100,
            settle_delay_us: 10,
            dummy: DUMMY_BYTE,
        }
    }
}

impl MasterConfig {
    /// Set the handshake timeout
    #[inline]
    pub fn ready_timeout(mut self, ms: u32) -> Self {
        self.ready_timeout_ms = ms;
        self
    }

    /// Set the chip-select settle delay
    #[inline]
    pub fn settle_delay(mut self, us: u32) -> Self {
        self.settle_delay_us = us;
        self
    }
}

/// Master end of the flow-controlled link
pub struct MasterLink<SPI, CS, SRDY, MRDY, CLK, D> {
    spi: SPI,
    cs: FlowOutput<CS>,
    srdy: FlowInput<SRDY>,
    mrdy: FlowInput<MRDY>,
    clock: CLK,
    delay: D,
    config: MasterConfig,
}

impl<SPI, CS, SRDY, MRDY, CLK, D> MasterLink<SPI, CS, SRDY, MRDY, CLK, D>
where
    SPI: FullDuplex<u8>,
    CS: OutputPin,
    SRDY: InputPin,
    MRDY: InputPin,
    CLK: Millis,
    D: DelayNs,
{
    /// Take ownership of the bus and handshake lines. Chip-select is released.
    pub fn new(
        spi: SPI,
        cs: FlowOutput<CS>,
        srdy: FlowInput<SRDY>,
        mrdy: FlowInput<MRDY>,
        clock: CLK,
        delay: D,
        config: MasterConfig,
    ) -> Result<Self, LinkError> {
        let mut link = MasterLink {
            spi,
            cs,
            srdy,
            mrdy,
            clock,
            delay,
            config,
        };
        link.cs.deassert()?;
        Ok(link)
    }

    /// Write `bytes` to the slave.
    ///
    /// Fails with [`LinkError::Timeout`] if the slave does not raise SRDY in time, in which case
    /// chip-select is released. Fails with [`LinkError::Busy`] if the slave is holding a message
    /// of its own (MRDY asserted); no byte is clocked and chip-select is left asserted so the
    /// caller can decide how to resolve the collision, typically by [`receive`](Self::receive)
    /// followed by a retry, or [`release`](Self::release).
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.cs.assert()?;
        if let Err(e) = self.wait_ready() {
            self.cs.deassert()?;
            return Err(e);
        }
        if self.mrdy.is_asserted()? {
            warn!("spi master: slave busy, send refused");
            return Err(LinkError::Busy);
        }

        for &byte in bytes {
            if let Err(e) = self.transfer(byte) {
                self.cs.deassert()?;
                return Err(e);
            }
        }

        self.finish()
    }

    /// Read one frame from the slave into `buf`, returning the number of bytes received.
    ///
    /// The length is learned from the second byte. If the frame is larger than `buf`, `buf` is
    /// filled, the session is closed and [`LinkError::Overflow`] is returned.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        self.cs.assert()?;
        if let Err(e) = self.wait_ready() {
            self.cs.deassert()?;
            return Err(e);
        }

        let mut expected = OVERHEAD_BYTES;
        let mut count = 0;
        while count < expected {
            let Some(slot) = buf.get_mut(count) else {
                self.finish()?;
                warn!("spi master: {} byte frame overflows {} byte buffer", expected, count);
                return Err(LinkError::Overflow);
            };
            *slot = match self.transfer(self.config.dummy) {
                Ok(byte) => byte,
                Err(e) => {
                    self.cs.deassert()?;
                    return Err(e);
                }
            };
            if count == LENGTH_INDEX {
                expected += usize::from(*slot);
            }
            count += 1;
        }

        self.finish()?;
        Ok(count)
    }

    /// Release chip-select, e.g. after [`send`](Self::send) returned [`LinkError::Busy`], and wait
    /// for the slave to close the session.
    pub fn release(&mut self) -> Result<(), LinkError> {
        self.end_session()
    }

    /// Whether the slave has a message waiting (MRDY asserted)
    pub fn message_waiting(&mut self) -> Result<bool, LinkError> {
        self.mrdy.is_asserted()
    }

    /// Read and validate a frame if the slave has one waiting.
    pub fn poll_incoming<'b>(
        &mut self,
        buf: &'b mut [u8],
    ) -> Result<Option<Frame<'b>>, LinkError> {
        if !self.mrdy.is_asserted()? {
            return Ok(None);
        }
        let n = self.receive(buf)?;
        let frame = frame::validate_exact(&buf[..n])?;
        Ok(Some(frame))
    }

    /// Check the link end to end: send a self-test request, wait for the slave to signal its
    /// answer and read it back. `buf` is scratch space for the answer.
    ///
    /// Returns `Ok(false)` if the slave answered with anything other than a self-test response.
    pub fn self_test(&mut self, buf: &mut [u8]) -> Result<bool, LinkError> {
        self.send(FrameBuf::bare(command::TEST).as_bytes())?;

        let deadline = Deadline::start(&self.clock, self.config.ready_timeout_ms);
        while !self.mrdy.is_asserted()? {
            if deadline.expired(&self.clock) {
                warn!("spi master: no self-test response");
                return Err(LinkError::Timeout);
            }
        }

        let n = self.receive(buf)?;
        let passed = match frame::validate_exact(&buf[..n]) {
            Ok(frame) => frame.command() == command::TEST_RESPONSE,
            Err(_) => false,
        };
        info!("spi master: self-test {}", if passed { "passed" } else { "failed" });
        Ok(passed)
    }

    /// Current configuration
    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// Release the bus, pins, clock and delay
    pub fn free(self) -> (SPI, CS, SRDY, MRDY, CLK, D) {
        (
            self.spi,
            self.cs.free(),
            self.srdy.free(),
            self.mrdy.free(),
            self.clock,
            self.delay,
        )
    }

    fn wait_ready(&mut self) -> Result<(), LinkError> {
        let deadline = Deadline::start(&self.clock, self.config.ready_timeout_ms);
        loop {
            if self.srdy.is_asserted()? {
                return Ok(());
            }
            if deadline.expired(&self.clock) {
                warn!("spi master: SRDY timeout");
                return Err(LinkError::Timeout);
            }
        }
    }

    #[inline]
    fn transfer(&mut self, byte: u8) -> Result<u8, LinkError> {
        nb::block!(self.spi.write(byte)).map_err(LinkError::bus)?;
        nb::block!(self.spi.read()).map_err(LinkError::bus)
    }

    fn finish(&mut self) -> Result<(), LinkError> {
        self.delay.delay_us(self.config.settle_delay_us);
        self.end_session()
    }

    // SRDY stays asserted until the slave has seen chip-select go away. Starting another transfer
    // before that would clock into the session that is still open on the slave.
    fn end_session(&mut self) -> Result<(), LinkError> {
        self.cs.deassert()?;
        let deadline = Deadline::start(&self.clock, self.config.ready_timeout_ms);
        while self.srdy.is_asserted()? {
            if deadline.expired(&self.clock) {
                warn!("spi master: slave did not close the session");
                return Err(LinkError::Timeout);
            }
        }
        Ok(())
    }
}

impl<SPI, CS, SRDY, MRDY, CLK, D> Outbound for MasterLink<SPI, CS, SRDY, MRDY, CLK, D>
where
    SPI: FullDuplex<u8>,
    CS: OutputPin,
    SRDY: InputPin,
    MRDY: InputPin,
    CLK: Millis,
    D: DelayNs,
{
    fn submit(&mut self, frame: &FrameBuf) -> Result<(), LinkError> {
        self.send(frame.as_bytes())
    }
}
