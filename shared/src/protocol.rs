//! ASCII wire protocol
//!
//! One message per datagram: an upper-case tag followed by space separated
//! fields. Positions carry six decimal places so that replicas agree on
//! continuous coordinates to well below a movement step.

use crate::character::{CharacterId, Direction};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Upper bound on an encoded message, in bytes
pub const MAX_MESSAGE_LEN: usize = 96;
pub const MAX_NAME_LEN: usize = 31;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty datagram")]
    Empty,
    #[error("datagram is not ASCII text")]
    NotAscii,
    #[error("datagram of {0} bytes exceeds the message limit")]
    TooLong(usize),
    #[error("unknown message tag '{0}'")]
    UnknownTag(String),
    #[error("{tag}: missing field '{field}'")]
    MissingField {
        tag: &'static str,
        field: &'static str,
    },
    #[error("{tag}: invalid field '{field}': {value}")]
    InvalidField {
        tag: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("{0}: unexpected trailing fields")]
    TrailingFields(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Peer asks for a slot
    Join { name: String },
    Welcome { id: CharacterId, lives: u32 },
    Reject,
    Waiting { remaining: u32 },
    Name { id: CharacterId, name: String },
    Start,
    /// Seconds left before play; zero starts the round
    Countdown { seconds: u32 },
    /// Authoritative position snapshot
    Move {
        id: CharacterId,
        x: f32,
        y: f32,
        z: f32,
        direction: Direction,
    },
    /// Peer's requested step for the character it controls
    RemoteMove { id: CharacterId, direction: Direction },
    ShootWeapon { id: CharacterId },
    Died { id: CharacterId, lives: u32 },
    Kills { id: CharacterId, kills: u32 },
    Spawn { id: CharacterId, x: f32, y: f32 },
    Reset,
    Quit,
    Ping { sequence: u32 },
    Pong { sequence: u32 },
}

impl Message {
    pub fn tag(&self) -> &'static str {
        match self {
            Message::Join { .. } => "JOIN",
            Message::Welcome { .. } => "WELCOME",
            Message::Reject => "REJECT",
            Message::Waiting { .. } => "WAITING",
            Message::Name { .. } => "NAME",
            Message::Start => "START",
            Message::Countdown { .. } => "COUNTDOWN",
            Message::Move { .. } => "MOVE",
            Message::RemoteMove { .. } => "REMOTE_MOVE",
            Message::ShootWeapon { .. } => "SHOOT_WEAPON",
            Message::Died { .. } => "DIED",
            Message::Kills { .. } => "KILLS",
            Message::Spawn { .. } => "SPAWN",
            Message::Reset => "RESET",
            Message::Quit => "QUIT",
            Message::Ping { .. } => "PING",
            Message::Pong { .. } => "PONG",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn decode(datagram: &[u8]) -> Result<Self, ProtocolError> {
        if datagram.len() > MAX_MESSAGE_LEN {
            return Err(ProtocolError::TooLong(datagram.len()));
        }
        if !datagram.is_ascii() {
            return Err(ProtocolError::NotAscii);
        }
        std::str::from_utf8(datagram)
            .map_err(|_| ProtocolError::NotAscii)?
            .parse()
    }
}

/// Strips whitespace and control characters and caps the length
pub fn sanitize_name(raw: &str) -> String {
    let name: String = raw
        .chars()
        .filter(|c| c.is_ascii_graphic())
        .take(MAX_NAME_LEN)
        .collect();
    if name.is_empty() {
        "player".to_string()
    } else {
        name
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        match self {
            Message::Join { name } => write!(f, "{} {}", tag, name),
            Message::Welcome { id, lives } => write!(f, "{} {} {}", tag, id.wire(), lives),
            Message::Waiting { remaining } => write!(f, "{} {}", tag, remaining),
            Message::Name { id, name } => write!(f, "{} {} {}", tag, id.wire(), name),
            Message::Countdown { seconds } => write!(f, "{} {}", tag, seconds),
            Message::Move {
                id,
                x,
                y,
                z,
                direction,
            } => write!(
                f,
                "{} {} {:.6} {:.6} {:.6} {}",
                tag,
                id.wire(),
                x,
                y,
                z,
                direction
            ),
            Message::RemoteMove { id, direction } => {
                write!(f, "{} {} {}", tag, id.wire(), direction)
            }
            Message::ShootWeapon { id } => write!(f, "{} {}", tag, id.wire()),
            Message::Died { id, lives } => write!(f, "{} {} {}", tag, id.wire(), lives),
            Message::Kills { id, kills } => write!(f, "{} {} {}", tag, id.wire(), kills),
            Message::Spawn { id, x, y } => write!(f, "{} {} {:.6} {:.6}", tag, id.wire(), x, y),
            Message::Ping { sequence } | Message::Pong { sequence } => {
                write!(f, "{} {}", tag, sequence)
            }
            Message::Reject | Message::Start | Message::Reset | Message::Quit => f.write_str(tag),
        }
    }
}

/// Cursor over the fields of one message
struct Fields<'a> {
    tag: &'static str,
    parts: std::str::SplitAsciiWhitespace<'a>,
}

impl<'a> Fields<'a> {
    fn next(&mut self, field: &'static str) -> Result<&'a str, ProtocolError> {
        self.parts.next().ok_or(ProtocolError::MissingField {
            tag: self.tag,
            field,
        })
    }

    fn invalid(&self, field: &'static str, value: &str) -> ProtocolError {
        ProtocolError::InvalidField {
            tag: self.tag,
            field,
            value: value.to_string(),
        }
    }

    fn number(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        let raw = self.next(field)?;
        raw.parse().map_err(|_| self.invalid(field, raw))
    }

    fn coordinate(&mut self, field: &'static str) -> Result<f32, ProtocolError> {
        let raw = self.next(field)?;
        match raw.parse::<f32>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(self.invalid(field, raw)),
        }
    }

    fn character(&mut self) -> Result<CharacterId, ProtocolError> {
        let raw = self.next("id")?;
        raw.parse::<u8>()
            .ok()
            .and_then(CharacterId::from_wire)
            .ok_or_else(|| self.invalid("id", raw))
    }

    fn direction(&mut self) -> Result<Direction, ProtocolError> {
        let raw = self.next("direction")?;
        Direction::from_wire(raw).ok_or_else(|| self.invalid("direction", raw))
    }

    fn name(&mut self) -> Result<String, ProtocolError> {
        let raw = self.next("name")?;
        if raw.len() > MAX_NAME_LEN {
            return Err(self.invalid("name", raw));
        }
        Ok(raw.to_string())
    }

    fn finish(mut self, message: Message) -> Result<Message, ProtocolError> {
        match self.parts.next() {
            Some(_) => Err(ProtocolError::TrailingFields(self.tag)),
            None => Ok(message),
        }
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parts = text.split_ascii_whitespace();
        let raw_tag = parts.next().ok_or(ProtocolError::Empty)?;
        let tag = match raw_tag {
            "JOIN" => "JOIN",
            "WELCOME" => "WELCOME",
            "REJECT" => "REJECT",
            "WAITING" => "WAITING",
            "NAME" => "NAME",
            "START" => "START",
            "COUNTDOWN" => "COUNTDOWN",
            "MOVE" => "MOVE",
            "REMOTE_MOVE" => "REMOTE_MOVE",
            "SHOOT_WEAPON" => "SHOOT_WEAPON",
            "DIED" => "DIED",
            "KILLS" => "KILLS",
            "SPAWN" => "SPAWN",
            "RESET" => "RESET",
            "QUIT" => "QUIT",
            "PING" => "PING",
            "PONG" => "PONG",
            other => return Err(ProtocolError::UnknownTag(other.to_string())),
        };
        let mut fields = Fields { tag, parts };

        let message = match tag {
            "JOIN" => Message::Join {
                name: fields.name()?,
            },
            "WELCOME" => Message::Welcome {
                id: fields.character()?,
                lives: fields.number("lives")?,
            },
            "REJECT" => Message::Reject,
            "WAITING" => Message::Waiting {
                remaining: fields.number("remaining")?,
            },
            "NAME" => Message::Name {
                id: fields.character()?,
                name: fields.name()?,
            },
            "START" => Message::Start,
            "COUNTDOWN" => Message::Countdown {
                seconds: fields.number("seconds")?,
            },
            "MOVE" => Message::Move {
                id: fields.character()?,
                x: fields.coordinate("x")?,
                y: fields.coordinate("y")?,
                z: fields.coordinate("z")?,
                direction: fields.direction()?,
            },
            "REMOTE_MOVE" => Message::RemoteMove {
                id: fields.character()?,
                direction: fields.direction()?,
            },
            "SHOOT_WEAPON" => Message::ShootWeapon {
                id: fields.character()?,
            },
            "DIED" => Message::Died {
                id: fields.character()?,
                lives: fields.number("lives")?,
            },
            "KILLS" => Message::Kills {
                id: fields.character()?,
                kills: fields.number("kills")?,
            },
            "SPAWN" => Message::Spawn {
                id: fields.character()?,
                x: fields.coordinate("x")?,
                y: fields.coordinate("y")?,
            },
            "RESET" => Message::Reset,
            "QUIT" => Message::Quit,
            "PING" => Message::Ping {
                sequence: fields.number("sequence")?,
            },
            _ => Message::Pong {
                sequence: fields.number("sequence")?,
            },
        };

        fields.finish(message)
    }
}
