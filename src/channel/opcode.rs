//! Execution-target wire format.
//!
//! A frame is one opcode character followed directly by the payload text,
//! sent as a single WebSocket text message: no length prefix, no terminator.

use std::fmt;

/// One-byte tag identifying a frame's purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 77,
    Exec = 78,
    SetFps = 79,
    Msg = 80,
}

impl Opcode {
    /// The character that starts a frame with this opcode.
    pub fn as_char(self) -> char {
        char::from(self as u8)
    }

    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'M' => Some(Self::Nop),
            'N' => Some(Self::Exec),
            'O' => Some(Self::SetFps),
            'P' => Some(Self::Msg),
            _ => None,
        }
    }
}

/// A message on the execution channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggedMessage {
    Nop,
    /// Full script source to run.
    Exec(String),
    SetFps(u32),
    /// Human-readable status text.
    Msg(String),
}

/// Reasons a frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,
    #[error("unknown opcode {0:?}")]
    UnknownOpcode(char),
    #[error("invalid fps value {0:?}")]
    InvalidFps(String),
}

impl TaggedMessage {
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Nop => Opcode::Nop,
            Self::Exec(_) => Opcode::Exec,
            Self::SetFps(_) => Opcode::SetFps,
            Self::Msg(_) => Opcode::Msg,
        }
    }

    /// Encode to the wire: opcode character then payload.
    pub fn encode(&self) -> String {
        let opcode = self.opcode().as_char();
        match self {
            Self::Nop => opcode.to_string(),
            Self::Exec(text) | Self::Msg(text) => {
                let mut frame = String::with_capacity(text.len() + 1);
                frame.push(opcode);
                frame.push_str(text);
                frame
            }
            Self::SetFps(fps) => format!("{opcode}{fps}"),
        }
    }

    /// Decode a text frame. A `Nop` frame's payload is ignored.
    pub fn decode(frame: &str) -> Result<Self, DecodeError> {
        let mut chars = frame.chars();
        let first = chars.next().ok_or(DecodeError::Empty)?;
        let opcode = Opcode::from_char(first).ok_or(DecodeError::UnknownOpcode(first))?;
        let payload = chars.as_str();

        Ok(match opcode {
            Opcode::Nop => Self::Nop,
            Opcode::Exec => Self::Exec(payload.to_string()),
            Opcode::SetFps => Self::SetFps(
                payload
                    .parse()
                    .map_err(|_| DecodeError::InvalidFps(payload.to_string()))?,
            ),
            Opcode::Msg => Self::Msg(payload.to_string()),
        })
    }
}

/// Text received from a peer. Never acted upon, only logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// The frame decoded as a tagged message.
    Tagged(TaggedMessage),
    /// Anything else.
    Untagged(String),
}

impl InboundMessage {
    pub fn classify(text: String) -> Self {
        match TaggedMessage::decode(&text) {
            Ok(msg) => Self::Tagged(msg),
            Err(_) => Self::Untagged(text),
        }
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tagged(msg) => write!(f, "{:?}", msg.opcode()),
            Self::Untagged(text) => write!(f, "untagged ({} bytes)", text.len()),
        }
    }
}
