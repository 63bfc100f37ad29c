//! Reserved command IDs
//!
//! The command byte is partitioned by numeric range so a single byte tells both which side
//! originated a message and what kind of message it is:
//!
//! | Range          | Use                                          |
//! |----------------|----------------------------------------------|
//! | `0x00`         | empty, "no message"                          |
//! | `0x01..=0x1F`  | board control, radio MCU to application MCU  |
//! | `0x20..=0x3F`  | board control, application MCU to radio MCU  |
//! | `0x40..=0xEF`  | application messages                         |
//! | `0xF0..=0xFD`  | reserved                                     |
//! | `0xFE`, `0xFF` | connectivity self-test response / request   |

/// No message
pub const EMPTY: u8 = 0x00;

/// LED control: `[led, state]`, state 1 = on, 0 = off
pub const LED: u8 = 0x01;
/// Null-terminated text for display line 1 (line is erased first)
pub const LCD1: u8 = 0x02;
/// Null-terminated text for display line 2 (line is erased first)
pub const LCD2: u8 = 0x03;
/// Null-terminated text forwarded to the debug port
pub const DEBUG: u8 = 0x04;
/// Buzzer control: `[buzzer, frequency]`, frequency 0 = off
pub const BUZZER: u8 = 0x05;

/// Button pressed: `[button]`
pub const BUTTON: u8 = 0x21;

/// First application message ID
pub const APP_MESSAGE_START: u8 = 0x40;
/// First reserved ID above the application range
pub const RESERVED_START: u8 = 0xF0;

/// Self-test response
pub const TEST_RESPONSE: u8 = 0xFE;
/// Self-test request; the receiver answers with [`TEST_RESPONSE`]
pub const TEST: u8 = 0xFF;
/// Length field of both self-test frames
pub const TEST_LENGTH: u8 = 1;

/// Which range a command ID falls in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandClass {
    /// [`EMPTY`]
    Empty,
    /// Board control sent by the radio MCU
    BoardFromRadio,
    /// Board control sent by the application MCU
    BoardFromApp,
    /// Application layer message, buffered for a consumer
    Application,
    /// Unassigned ID in the reserved block
    Reserved,
    /// [`TEST`]
    Test,
    /// [`TEST_RESPONSE`]
    TestResponse,
}

impl CommandClass {
    /// Classify a command byte
    pub const fn of(command: u8) -> Self {
        match command {
            EMPTY => CommandClass::Empty,
            0x01..=0x1F => CommandClass::BoardFromRadio,
            0x20..=0x3F => CommandClass::BoardFromApp,
            APP_MESSAGE_START..=0xEF => CommandClass::Application,
            RESERVED_START..=0xFD => CommandClass::Reserved,
            TEST_RESPONSE => CommandClass::TestResponse,
            TEST => CommandClass::Test,
        }
    }

    /// Board control or self-test, handled as soon as it arrives
    pub const fn is_system(self) -> bool {
        matches!(
            self,
            CommandClass::BoardFromRadio
                | CommandClass::BoardFromApp
                | CommandClass::Test
                | CommandClass::TestResponse
        )
    }
}
