// Host-side doubles for the pins, SPI peripheral and time base used by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, ErrorType, InputPin, OutputPin};
use embedded_hal_nb::spi::{self, FullDuplex};

use crate::time::Millis;

/// One electrical line, shared between whoever drives it and whoever reads it. `true` is high.
#[derive(Clone)]
pub struct Wire(Rc<Cell<bool>>);

impl Wire {
    pub fn new(level: bool) -> Self {
        Wire(Rc::new(Cell::new(level)))
    }

    pub fn level(&self) -> bool {
        self.0.get()
    }

    pub fn set(&self, level: bool) {
        self.0.set(level)
    }
}

impl ErrorType for Wire {
    type Error = Infallible;
}

impl InputPin for Wire {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.get())
    }
}

impl OutputPin for Wire {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set(true);
        Ok(())
    }
}

#[derive(Debug)]
pub struct PinFault;

impl digital::Error for PinFault {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// A pin whose every operation fails
pub struct FaultyPin;

impl ErrorType for FaultyPin {
    type Error = PinFault;
}

impl InputPin for FaultyPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Err(PinFault)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Err(PinFault)
    }
}

impl OutputPin for FaultyPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Err(PinFault)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Err(PinFault)
    }
}

/// Millisecond counter advanced by the test, or by `step` on every read
#[derive(Clone)]
pub struct TickClock {
    now: Rc<Cell<u32>>,
    step: u32,
}

impl TickClock {
    pub fn manual() -> Self {
        TickClock {
            now: Rc::new(Cell::new(0)),
            step: 0,
        }
    }

    /// Every read moves time forward by `step` ms, so busy-waits always terminate
    pub fn auto(step: u32) -> Self {
        TickClock {
            now: Rc::new(Cell::new(0)),
            step,
        }
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }

    pub fn peek(&self) -> u32 {
        self.now.get()
    }
}

impl Millis for TickClock {
    fn now_ms(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.step));
        now
    }
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Full-duplex SPI that records what was clocked out and replays scripted input
#[derive(Clone, Default)]
pub struct ScriptSpi {
    sent: Rc<RefCell<Vec<u8>>>,
    replies: Rc<RefCell<VecDeque<u8>>>,
    staged: Rc<Cell<Option<u8>>>,
}

impl ScriptSpi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_with(&self, bytes: &[u8]) {
        self.replies.borrow_mut().extend(bytes.iter().copied());
    }

    pub fn sent(&self) -> Vec<u8> {
        self.sent.borrow().clone()
    }
}

impl spi::ErrorType for ScriptSpi {
    type Error = Infallible;
}

impl FullDuplex<u8> for ScriptSpi {
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.staged.take().ok_or(nb::Error::WouldBlock)
    }

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.sent.borrow_mut().push(word);
        let reply = self.replies.borrow_mut().pop_front().unwrap_or(0xFF);
        self.staged.set(Some(reply));
        Ok(())
    }
}
