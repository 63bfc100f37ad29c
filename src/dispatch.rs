//! Command dispatcher and application mailbox
//!
//! Every frame that comes off the link goes through [`Dispatcher::dispatch()`], which routes it by
//! command range:
//!
//! * [`TEST`](command::TEST) is answered with [`TEST_RESPONSE`](command::TEST_RESPONSE)
//!   straight away, through whichever [`Outbound`] side the frame arrived on.
//! * [`TEST_RESPONSE`](command::TEST_RESPONSE) is recorded as a passed self-test.
//! * Board-control commands are decoded and handed to a [`BoardControl`] implementation.
//! * Application messages are posted to a [`Mailbox`] for the application task to pick up.
//! * Everything else is dropped.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::command::{self, CommandClass};
use crate::error::LinkError;
use crate::frame::{FrameBuf, COMMAND_INDEX};
use crate::message::{BoardCommand, LcdLine};

/// Something that can carry a frame to the peer
pub trait Outbound {
    /// Queue or send `frame`
    fn submit(&mut self, frame: &FrameBuf) -> Result<(), LinkError>;
}

/// Board peripherals driven by board-control commands
///
/// Every method defaults to doing nothing, so boards only implement what they have.
pub trait BoardControl {
    /// Switch an LED
    fn led(&mut self, _led: u8, _on: bool) {}

    /// Replace the contents of a display line
    fn lcd_line(&mut self, _line: LcdLine, _text: &[u8]) {}

    /// Forward text to the debug port
    fn debug(&mut self, _text: &[u8]) {}

    /// Drive a buzzer, frequency 0 is off
    fn buzzer(&mut self, _buzzer: u8, _frequency: u8) {}

    /// A button was pressed on the other board
    fn button(&mut self, _button: u8) {}
}

/// Board with no peripherals
impl BoardControl for () {}

/// Outcome of dispatching one frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dispatched {
    /// A self-test request was answered
    Replied,
    /// A board-control command was applied
    Handled,
    /// An application message was posted to the mailbox, carrying this command
    Posted(u8),
    /// The peer answered our self-test
    TestResponse,
    /// Nothing was done with the frame
    Ignored,
}

struct Slot {
    msg: Option<FrameBuf>,
    overwritten: u32,
}

/// Single-slot holding area for the latest application message
///
/// A new message replaces an unread one (last write wins). The slot lives behind a
/// [`critical_section::Mutex`] so it can be a `static` shared between the link task and the
/// application task:
///
/// ```
/// use flowspi::Mailbox;
///
/// static MAILBOX: Mailbox = Mailbox::new();
///
/// assert_eq!(MAILBOX.check(), None);
/// ```
pub struct Mailbox {
    slot: Mutex<RefCell<Slot>>,
}

impl Mailbox {
    /// An empty mailbox
    pub const fn new() -> Self {
        Mailbox {
            slot: Mutex::new(RefCell::new(Slot {
                msg: None,
                overwritten: 0,
            })),
        }
    }

    /// Store `msg`, replacing anything unread
    pub fn post(&self, msg: FrameBuf) {
        critical_section::with(|cs| {
            let mut slot = self.slot.borrow_ref_mut(cs);
            if slot.msg.is_some() {
                slot.overwritten = slot.overwritten.wrapping_add(1);
            }
            slot.msg = Some(msg);
        })
    }

    /// Command byte of the unread message, if any
    pub fn check(&self) -> Option<u8> {
        critical_section::with(|cs| self.slot.borrow_ref(cs).msg.map(|msg| msg.command()))
    }

    /// Copy the unread message as `[COMMAND, DATA...]` into `buf` and mark it read. Returns the
    /// number of bytes copied.
    ///
    /// If `buf` is too short the message stays unread and `None` is returned.
    pub fn get(&self, buf: &mut [u8]) -> Option<usize> {
        critical_section::with(|cs| {
            let mut slot = self.slot.borrow_ref_mut(cs);
            let msg = slot.msg.as_ref()?;
            let body = &msg.as_bytes()[COMMAND_INDEX..];
            let dest = buf.get_mut(..body.len())?;
            dest.copy_from_slice(body);
            let n = body.len();
            slot.msg = None;
            Some(n)
        })
    }

    /// Remove and return the unread message
    pub fn take(&self) -> Option<FrameBuf> {
        critical_section::with(|cs| self.slot.borrow_ref_mut(cs).msg.take())
    }

    /// Number of messages replaced before they were read
    pub fn overwritten(&self) -> u32 {
        critical_section::with(|cs| self.slot.borrow_ref(cs).overwritten)
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes received frames
pub struct Dispatcher<'m, B> {
    board: B,
    mailbox: &'m Mailbox,
    test_passed: bool,
}

impl<'m, B: BoardControl> Dispatcher<'m, B> {
    /// Dispatcher delivering board commands to `board` and application messages to `mailbox`
    pub fn new(board: B, mailbox: &'m Mailbox) -> Self {
        Dispatcher {
            board,
            mailbox,
            test_passed: false,
        }
    }

    /// Act on one received frame. Self-test replies go out through `outbound`.
    pub fn dispatch<O: Outbound + ?Sized>(
        &mut self,
        frame: &FrameBuf,
        outbound: &mut O,
    ) -> Result<Dispatched, LinkError> {
        let cmd = frame.command();
        match CommandClass::of(cmd) {
            CommandClass::Test => {
                let reply = test_response();
                outbound.submit(&reply)?;
                debug!("self-test request answered");
                Ok(Dispatched::Replied)
            }
            CommandClass::TestResponse => {
                self.test_passed = true;
                info!("self-test passed");
                Ok(Dispatched::TestResponse)
            }
            CommandClass::BoardFromRadio | CommandClass::BoardFromApp => {
                match BoardCommand::parse(frame.frame()) {
                    Ok(board_cmd) => {
                        self.apply(board_cmd);
                        Ok(Dispatched::Handled)
                    }
                    Err(e) => {
                        debug!("board command {=u8:#x} not applied: {}", cmd, e);
                        Ok(Dispatched::Ignored)
                    }
                }
            }
            CommandClass::Application => {
                self.mailbox.post(*frame);
                trace!("application message {=u8:#x} posted", cmd);
                Ok(Dispatched::Posted(cmd))
            }
            CommandClass::Empty | CommandClass::Reserved => Ok(Dispatched::Ignored),
        }
    }

    /// Whether a self-test response has been seen
    pub fn self_test_passed(&self) -> bool {
        self.test_passed
    }

    /// Forget any earlier self-test response
    pub fn reset_self_test(&mut self) {
        self.test_passed = false;
    }

    /// Board the dispatcher drives
    pub fn board(&mut self) -> &mut B {
        &mut self.board
    }

    fn apply(&mut self, cmd: BoardCommand<'_>) {
        match cmd {
            BoardCommand::Led { led, on } => self.board.led(led, on),
            BoardCommand::Lcd { line, text } => self.board.lcd_line(line, text),
            BoardCommand::Debug(text) => self.board.debug(text),
            BoardCommand::Buzzer { buzzer, frequency } => self.board.buzzer(buzzer, frequency),
            BoardCommand::Button(button) => self.board.button(button),
        }
    }
}

/// The `[SYNC, 1, TEST_RESPONSE]` self-test answer
pub const fn test_response() -> FrameBuf {
    FrameBuf::bare(command::TEST_RESPONSE)
}
