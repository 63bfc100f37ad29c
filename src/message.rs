//! Typed board-control and application messages
//!
//! These sit on top of the raw [`Frame`] envelope. Board-control messages drive the peripherals
//! of the application board on behalf of the radio MCU (and report button presses back), the
//! application messages carry the two-player game that runs over the radio.
//!
//! Text payloads (LCD lines, debug output) travel null-terminated. [`BoardCommand::encode`]
//! appends the terminator and [`BoardCommand::parse`] strips it.

use crate::command;
use crate::error::{DecodeError, EncodeError};
use crate::frame::{encode, Frame, FrameBuf, MAX_PAYLOAD};

/// Ask the peer whether it is still in step
pub const SYNC_CHECK: u8 = 0xA0;
/// Abandon the current game
pub const RESET: u8 = 0xA1;
/// Propose a new game: `[starter]`
pub const GAME_REQUEST: u8 = 0xA2;
/// Leave the game
pub const GAME_RELEASE: u8 = 0xA3;
/// A move: `[position, status]`
pub const GAME_MOVE: u8 = 0xAA;
/// Positive acknowledgement
pub const ACK: u8 = 0xAE;
/// Negative acknowledgement
pub const NACK: u8 = 0xAF;

/// Squares on the game board, numbered from 0
pub const BOARD_POSITIONS: u8 = 9;

/// Which player makes the first move of a requested game
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Starter {
    /// The requesting side
    Local = 1,
    /// The other side
    Remote = 2,
}

impl TryFrom<u8> for Starter {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Starter::Local),
            2 => Ok(Starter::Remote),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

/// Game state reported alongside each move
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum GameStatus {
    /// No result reported yet
    Unknown = 0,
    /// Game continues
    Playing = 1,
    /// Sender of the move won
    HomeWins = 2,
    /// Receiver of the move won
    AwayWins = 3,
    /// Board full with no winner
    Draw = 4,
}

impl TryFrom<u8> for GameStatus {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GameStatus::Unknown),
            1 => Ok(GameStatus::Playing),
            2 => Ok(GameStatus::HomeWins),
            3 => Ok(GameStatus::AwayWins),
            4 => Ok(GameStatus::Draw),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

/// Display line addressed by an LCD message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LcdLine {
    /// Top line ([`command::LCD1`])
    One,
    /// Bottom line ([`command::LCD2`])
    Two,
}

impl LcdLine {
    #[inline]
    fn command(self) -> u8 {
        match self {
            LcdLine::One => command::LCD1,
            LcdLine::Two => command::LCD2,
        }
    }
}

/// Board-control message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BoardCommand<'a> {
    /// Switch an LED
    Led {
        /// LED index
        led: u8,
        /// New state
        on: bool,
    },
    /// Replace the contents of a display line
    Lcd {
        /// Line to write
        line: LcdLine,
        /// Text, without terminator
        text: &'a [u8],
    },
    /// Text for the debug port, without terminator
    Debug(&'a [u8]),
    /// Drive a buzzer; a frequency of 0 silences it
    Buzzer {
        /// Buzzer index
        buzzer: u8,
        /// Frequency code
        frequency: u8,
    },
    /// A button was pressed on the application board
    Button(u8),
}

impl<'a> BoardCommand<'a> {
    /// Decode a board-control frame
    pub fn parse(frame: Frame<'a>) -> Result<Self, DecodeError> {
        let data = frame.payload();
        match frame.command() {
            command::LED => {
                let [led, state] = fixed::<2>(data)?;
                let on = match state {
                    0 => false,
                    1 => true,
                    _ => return Err(DecodeError::InvalidValue),
                };
                Ok(BoardCommand::Led { led, on })
            }
            command::LCD1 => Ok(BoardCommand::Lcd {
                line: LcdLine::One,
                text: until_nul(data),
            }),
            command::LCD2 => Ok(BoardCommand::Lcd {
                line: LcdLine::Two,
                text: until_nul(data),
            }),
            command::DEBUG => Ok(BoardCommand::Debug(until_nul(data))),
            command::BUZZER => {
                let [buzzer, frequency] = fixed::<2>(data)?;
                Ok(BoardCommand::Buzzer { buzzer, frequency })
            }
            command::BUTTON => {
                let [button] = fixed::<1>(data)?;
                Ok(BoardCommand::Button(button))
            }
            _ => Err(DecodeError::UnknownCommand),
        }
    }

    /// Encode into a frame ready to queue or send
    pub fn encode(&self) -> Result<FrameBuf, EncodeError> {
        match *self {
            BoardCommand::Led { led, on } => encode(command::LED, &[led, u8::from(on)]),
            BoardCommand::Lcd { line, text } => encode_text(line.command(), text),
            BoardCommand::Debug(text) => encode_text(command::DEBUG, text),
            BoardCommand::Buzzer { buzzer, frequency } => {
                encode(command::BUZZER, &[buzzer, frequency])
            }
            BoardCommand::Button(button) => encode(command::BUTTON, &[button]),
        }
    }
}

/// Game message exchanged between the two players
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppMessage {
    /// Ask the peer whether it is still in step
    SyncCheck,
    /// Abandon the current game
    Reset,
    /// Propose a game
    GameRequest(Starter),
    /// Leave the game
    GameRelease,
    /// Play a square
    GameMove {
        /// Square index, below [`BOARD_POSITIONS`]
        position: u8,
        /// Game state after the move
        status: GameStatus,
    },
    /// Positive acknowledgement
    Ack,
    /// Negative acknowledgement
    Nack,
}

impl AppMessage {
    /// Decode an application frame
    pub fn parse(frame: Frame<'_>) -> Result<Self, DecodeError> {
        let data = frame.payload();
        let msg = match frame.command() {
            SYNC_CHECK => fixed::<0>(data).map(|_| AppMessage::SyncCheck)?,
            RESET => fixed::<0>(data).map(|_| AppMessage::Reset)?,
            GAME_REQUEST => {
                let [starter] = fixed::<1>(data)?;
                AppMessage::GameRequest(Starter::try_from(starter)?)
            }
            GAME_RELEASE => fixed::<0>(data).map(|_| AppMessage::GameRelease)?,
            GAME_MOVE => {
                let [position, status] = fixed::<2>(data)?;
                if position >= BOARD_POSITIONS {
                    return Err(DecodeError::InvalidValue);
                }
                AppMessage::GameMove {
                    position,
                    status: GameStatus::try_from(status)?,
                }
            }
            ACK => fixed::<0>(data).map(|_| AppMessage::Ack)?,
            NACK => fixed::<0>(data).map(|_| AppMessage::Nack)?,
            _ => return Err(DecodeError::UnknownCommand),
        };
        Ok(msg)
    }

    /// Command byte this message travels under
    pub fn command(&self) -> u8 {
        match self {
            AppMessage::SyncCheck => SYNC_CHECK,
            AppMessage::Reset => RESET,
            AppMessage::GameRequest(_) => GAME_REQUEST,
            AppMessage::GameRelease => GAME_RELEASE,
            AppMessage::GameMove { .. } => GAME_MOVE,
            AppMessage::Ack => ACK,
            AppMessage::Nack => NACK,
        }
    }

    /// Encode into a frame ready to queue or send
    pub fn encode(&self) -> Result<FrameBuf, EncodeError> {
        match *self {
            AppMessage::GameRequest(starter) => encode(GAME_REQUEST, &[starter as u8]),
            AppMessage::GameMove { position, status } => {
                encode(GAME_MOVE, &[position, status as u8])
            }
            _ => encode(self.command(), &[]),
        }
    }
}

fn fixed<const N: usize>(data: &[u8]) -> Result<[u8; N], DecodeError> {
    data.try_into().map_err(|_| DecodeError::WrongLength)
}

fn until_nul(data: &[u8]) -> &[u8] {
    match data.iter().position(|&b| b == 0) {
        Some(end) => &data[..end],
        None => data,
    }
}

fn encode_text(command: u8, text: &[u8]) -> Result<FrameBuf, EncodeError> {
    let mut scratch = [0u8; MAX_PAYLOAD];
    let Some(dest) = scratch.get_mut(..text.len()) else {
        return Err(EncodeError::ExceedsBuffer);
    };
    dest.copy_from_slice(text);
    // Terminator slot must also fit
    if text.len() == MAX_PAYLOAD {
        return Err(EncodeError::ExceedsBuffer);
    }
    encode(command, &scratch[..text.len() + 1])
}
