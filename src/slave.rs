//! Slave side of the link
//!
//! The slave runs a small state machine, stepped once per scheduler tick (1 ms on the reference
//! boards) through [`SlaveLink::run_active_state()`], plus two flow-control callbacks that the SPI
//! interrupt handler calls once per byte:
//!
//! * [`SlaveLink::rx_flow_control()`] stores a byte the master clocked in.
//! * [`SlaveLink::tx_flow_control()`] supplies the next byte for the master to clock out.
//!
//! A session starts when chip-select is seen asserted while the link is idle. If the slave has a
//! message queued (MRDY asserted) the master is reading it, otherwise the master is writing.
//! Either way the slave then raises SRDY to let the master start clocking. The session ends when
//! chip-select is released, or when the session outlives its timeout, at which point both ready
//! lines are dropped and the link is idle again. Received frames are validated and handed back
//! by copy from `run_active_state()`.
//!
//! The callbacks and the state machine step must never run at the same time. The usual way to
//! arrange that is to keep the link in a `critical_section::Mutex<RefCell<..>>` shared between the
//! main loop and the interrupt handler:
//!
//! ```ignore
//! static LINK: Mutex<RefCell<Option<SlaveLink<Cs, Srdy, Mrdy, Tick>>>> =
//!     Mutex::new(RefCell::new(None));
//!
//! #[interrupt]
//! fn EUSCI_A0() {
//!     critical_section::with(|cs| {
//!         let Some(ref mut link) = *LINK.borrow_ref_mut(cs) else { return };
//!         let byte = spi_slave.read_rx();
//!         link.rx_flow_control(byte);
//!         spi_slave.write_tx(link.tx_flow_control());
//!     });
//! }
//! ```

use bitflags::bitflags;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::dispatch::Outbound;
use crate::error::LinkError;
use crate::flow::{FlowInput, FlowOutput};
use crate::frame::{self, FrameBuf, BUFFER_SIZE};
use crate::time::{is_time_up, Millis};

/// Byte clocked out when the slave has nothing (more) to send
pub const DUMMY_BYTE: u8 = 0xF0;

bitflags! {
    /// Session and diagnostic flags of a [`SlaveLink`]
    ///
    /// The low half tracks the session in progress, the high half latches error conditions until
    /// the application clears them with [`SlaveLink::clear_flags()`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct LinkFlags: u32 {
        /// A master write session is open
        const RX_IN_PROGRESS     = 0x0000_0001;
        /// A master read session is open
        const TX_IN_PROGRESS     = 0x0000_0002;
        /// A session timed out with chip-select still asserted; no new session starts until
        /// chip-select is released
        const CS_RELEASE_PENDING = 0x0000_0004;

        /// More bytes arrived than the receive buffer holds
        const RX_OVERFLOW        = 0x0001_0000;
        /// A master write session was not closed in time
        const RX_TIMEOUT         = 0x0002_0000;
        /// A master read session was not closed in time
        const TX_TIMEOUT         = 0x0004_0000;
        /// A completed reception was not a valid frame
        const BAD_FRAME          = 0x0008_0000;
        /// A handshake or chip-select pin reported an error
        const PIN_FAULT          = 0x0010_0000;
        /// The master ended a read session before the queued message was fully clocked out;
        /// the message was dropped
        const TX_INCOMPLETE      = 0x0020_0000;

        /// All latched diagnostics
        const DIAGNOSTICS = Self::RX_OVERFLOW.bits()
            | Self::RX_TIMEOUT.bits()
            | Self::TX_TIMEOUT.bits()
            | Self::BAD_FRAME.bits()
            | Self::PIN_FAULT.bits()
            | Self::TX_INCOMPLETE.bits();
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LinkFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "LinkFlags({=u32:#x})", self.bits())
    }
}

/// Slave state machine states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Waiting for chip-select
    Idle,
    /// Master is writing a message to us
    Rx,
    /// Master is reading our queued message
    Tx,
    /// Link could not be brought up; every operation is a no-op
    Error,
}

/// Timing and filler settings for a [`SlaveLink`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlaveConfig {
    /// Longest a master write session may keep chip-select asserted, in ms
    pub rx_timeout_ms: u32,
    /// Longest a master read session may keep chip-select asserted, in ms
    pub tx_timeout_ms: u32,
    /// Byte clocked out when there is nothing to send
    pub dummy: u8,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        SlaveConfig {
            rx_timeout_ms: 1000,
            tx_timeout_ms: 1000,
            dummy: DUMMY_BYTE,
        }
    }
}

impl SlaveConfig {
    /// Set the receive session timeout
    #[inline]
    pub fn rx_timeout(mut self, ms: u32) -> Self {
        self.rx_timeout_ms = ms;
        self
    }

    /// Set the transmit session timeout
    #[inline]
    pub fn tx_timeout(mut self, ms: u32) -> Self {
        self.tx_timeout_ms = ms;
        self
    }
}

// Written only by the Rx callback, read only once the session is over.
struct RxBuffer {
    bytes: [u8; BUFFER_SIZE],
    cursor: usize,
    count: usize,
}

impl RxBuffer {
    const fn new() -> Self {
        RxBuffer {
            bytes: [0; BUFFER_SIZE],
            cursor: 0,
            count: 0,
        }
    }

    #[inline(always)]
    fn reset(&mut self) {
        self.cursor = 0;
        self.count = 0;
    }

    // Returns true once the session has received more than the buffer holds. The cursor wraps
    // back to the start so writes always stay in bounds.
    #[inline(always)]
    fn push(&mut self, byte: u8) -> bool {
        self.bytes[self.cursor] = byte;
        self.cursor += 1;
        if self.cursor == BUFFER_SIZE {
            self.cursor = 0;
        }
        self.count = self.count.saturating_add(1);
        self.count > BUFFER_SIZE
    }

    #[inline]
    fn received(&self) -> Option<&[u8]> {
        if self.count > BUFFER_SIZE {
            None
        } else {
            Some(&self.bytes[..self.count])
        }
    }
}

/// Slave end of the flow-controlled link
///
/// * `CS` senses the master's chip-select
/// * `SRDY` drives the ready-to-receive line
/// * `MRDY` drives the ready-to-send line
/// * `CLK` is the millisecond time base used for session timeouts
pub struct SlaveLink<CS, SRDY, MRDY, CLK> {
    cs: FlowInput<CS>,
    srdy: FlowOutput<SRDY>,
    mrdy: FlowOutput<MRDY>,
    clock: CLK,
    config: SlaveConfig,
    state: State,
    flags: LinkFlags,
    session_start: u32,
    rx: RxBuffer,
    pending: Option<FrameBuf>,
    tx_index: usize,
}

impl<CS, SRDY, MRDY, CLK> SlaveLink<CS, SRDY, MRDY, CLK>
where
    CS: InputPin,
    SRDY: OutputPin,
    MRDY: OutputPin,
    CLK: Millis,
{
    /// Bring up the link with both ready lines released.
    ///
    /// If the handshake lines cannot be driven the link starts in [`State::Error`] and stays
    /// there: stepping it does nothing and nothing can be queued.
    pub fn initialize(
        cs: FlowInput<CS>,
        srdy: FlowOutput<SRDY>,
        mrdy: FlowOutput<MRDY>,
        clock: CLK,
        config: SlaveConfig,
    ) -> Self {
        let mut link = SlaveLink {
            cs,
            srdy,
            mrdy,
            clock,
            config,
            state: State::Idle,
            flags: LinkFlags::empty(),
            session_start: 0,
            rx: RxBuffer::new(),
            pending: None,
            tx_index: 0,
        };

        match link.release_lines() {
            Ok(()) => info!("spi slave link ready"),
            Err(e) => {
                warn!("spi slave link failed to start: {}", e);
                link.flags.insert(LinkFlags::PIN_FAULT);
                link.state = State::Error;
            }
        }
        link
    }

    /// Run one step of the state machine. Returns a copy of the frame received in a session
    /// that just completed, if it was valid.
    pub fn run_active_state(&mut self) -> Option<FrameBuf> {
        let step = match self.state {
            State::Idle => self.sm_idle(),
            State::Rx => self.sm_rx(),
            State::Tx => self.sm_tx(),
            State::Error => Ok(None),
        };

        match step {
            Ok(frame) => frame,
            Err(e) => {
                warn!("spi slave pin fault: {}", e);
                self.flags.insert(LinkFlags::PIN_FAULT);
                let _ = self.end_session();
                None
            }
        }
    }

    /// Receive flow-control callback, called from the SPI interrupt with each byte clocked in
    /// by the master. Bytes arriving outside a master write session are dropped.
    #[inline]
    pub fn rx_flow_control(&mut self, byte: u8) {
        if self.state != State::Rx {
            return;
        }

        // Hold the master off while the byte is stored
        if self.srdy.deassert().is_err() {
            self.flags.insert(LinkFlags::PIN_FAULT);
        }
        if self.rx.push(byte) {
            self.flags.insert(LinkFlags::RX_OVERFLOW);
        }
        if self.srdy.assert().is_err() {
            self.flags.insert(LinkFlags::PIN_FAULT);
        }
    }

    /// Transmit flow-control callback, called from the SPI interrupt whenever the peripheral
    /// wants the next byte to shift out. Outside a master read session, and past the end of the
    /// queued message, this is the dummy byte.
    #[inline]
    pub fn tx_flow_control(&mut self) -> u8 {
        if self.state != State::Tx {
            return self.config.dummy;
        }

        let byte = self
            .pending
            .as_ref()
            .and_then(|msg| msg.as_bytes().get(self.tx_index).copied())
            .unwrap_or(self.config.dummy);
        self.tx_index = self.tx_index.saturating_add(1);

        if self.srdy.assert().is_err() {
            self.flags.insert(LinkFlags::PIN_FAULT);
        }
        byte
    }

    /// Queue a message for the master to read. MRDY is raised on the next idle step, never in the
    /// middle of a session. Only one message can be queued at a time.
    pub fn queue_message(&mut self, msg: FrameBuf) -> Result<(), LinkError> {
        if self.state == State::Error {
            return Err(LinkError::Offline);
        }
        if self.pending.is_some() {
            return Err(LinkError::Busy);
        }
        self.pending = Some(msg);
        Ok(())
    }

    /// Whether a message is waiting to be read by the master
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Session and diagnostic flags
    #[inline]
    pub fn flags(&self) -> LinkFlags {
        self.flags
    }

    /// Clear latched diagnostic flags. Session flags are left alone.
    #[inline]
    pub fn clear_flags(&mut self, flags: LinkFlags) {
        self.flags.remove(flags & LinkFlags::DIAGNOSTICS);
    }

    /// Bytes handed to the master so far in the current read session
    #[inline]
    pub fn bytes_sent(&self) -> usize {
        self.tx_index
    }

    fn sm_idle(&mut self) -> Result<Option<FrameBuf>, LinkError> {
        if self.pending.is_some() && !self.mrdy.is_asserted() {
            self.mrdy.assert()?;
        }

        let cs = self.cs.is_asserted()?;
        if self.flags.contains(LinkFlags::CS_RELEASE_PENDING) {
            if !cs {
                self.flags.remove(LinkFlags::CS_RELEASE_PENDING);
            }
            return Ok(None);
        }
        if !cs {
            return Ok(None);
        }

        self.session_start = self.clock.now_ms();
        if self.mrdy.is_asserted() {
            // MRDY stays up for the whole read so a master trying to write sees the collision
            self.tx_index = 0;
            self.flags.insert(LinkFlags::TX_IN_PROGRESS);
            self.state = State::Tx;
            trace!("spi slave: master read started");
        } else {
            self.rx.reset();
            self.flags.insert(LinkFlags::RX_IN_PROGRESS);
            self.state = State::Rx;
            trace!("spi slave: master write started");
        }
        self.srdy.assert()?;
        Ok(None)
    }

    fn sm_rx(&mut self) -> Result<Option<FrameBuf>, LinkError> {
        if !self.cs.is_asserted()? {
            let frame = self.complete_rx();
            self.end_session()?;
            return Ok(frame);
        }

        if is_time_up(self.clock.now_ms(), self.session_start, self.config.rx_timeout_ms) {
            warn!("spi slave: rx session timed out");
            self.flags
                .insert(LinkFlags::RX_TIMEOUT | LinkFlags::CS_RELEASE_PENDING);
            self.end_session()?;
        }
        Ok(None)
    }

    fn sm_tx(&mut self) -> Result<Option<FrameBuf>, LinkError> {
        if !self.cs.is_asserted()? {
            if let Some(msg) = self.pending.take() {
                if self.tx_index < msg.len() {
                    warn!(
                        "spi slave: master read {} of {} bytes, message dropped",
                        self.tx_index,
                        msg.len()
                    );
                    self.flags.insert(LinkFlags::TX_INCOMPLETE);
                }
            }
            self.end_session()?;
            return Ok(None);
        }

        if is_time_up(self.clock.now_ms(), self.session_start, self.config.tx_timeout_ms) {
            warn!("spi slave: tx session timed out");
            self.flags
                .insert(LinkFlags::TX_TIMEOUT | LinkFlags::CS_RELEASE_PENDING);
            self.pending = None;
            self.end_session()?;
        }
        Ok(None)
    }

    fn complete_rx(&mut self) -> Option<FrameBuf> {
        let Some(bytes) = self.rx.received() else {
            warn!("spi slave: rx overflow, frame dropped");
            self.flags.insert(LinkFlags::RX_OVERFLOW);
            return None;
        };
        if bytes.is_empty() {
            return None;
        }

        match frame::validate_exact(bytes) {
            Ok(frame) => frame.to_frame_buf().ok(),
            Err(e) => {
                debug!("spi slave: dropped bad frame: {}", e);
                self.flags.insert(LinkFlags::BAD_FRAME);
                None
            }
        }
    }

    // Back to idle. State is reset before touching the pins so a pin error cannot strand the
    // link mid-session.
    fn end_session(&mut self) -> Result<(), LinkError> {
        self.state = State::Idle;
        self.flags
            .remove(LinkFlags::RX_IN_PROGRESS | LinkFlags::TX_IN_PROGRESS);
        self.rx.reset();
        self.tx_index = 0;
        self.release_lines()
    }

    fn release_lines(&mut self) -> Result<(), LinkError> {
        let srdy = self.srdy.deassert();
        let mrdy = self.mrdy.deassert();
        srdy.and(mrdy)
    }
}

impl<CS, SRDY, MRDY, CLK> Outbound for SlaveLink<CS, SRDY, MRDY, CLK>
where
    CS: InputPin,
    SRDY: OutputPin,
    MRDY: OutputPin,
    CLK: Millis,
{
    fn submit(&mut self, msg: &FrameBuf) -> Result<(), LinkError> {
        self.queue_message(*msg)
    }
}
