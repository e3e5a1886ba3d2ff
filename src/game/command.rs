//! Player commands and their wire syntax.
//!
//! Bots submit one line of whitespace-separated commands per turn. Each
//! command is a one-letter tag plus fields:
//!
//! - `m <entity> <n|s|e|w|o>` — move an entity (or hold with `o`)
//! - `g` — spawn a new entity at the factory
//! - `c <entity>` — convert an entity into a dropoff
//!
//! An unrecognized tag or malformed field is a protocol failure for the
//! submitting player, not a recoverable command error.

use std::fmt;

use crate::game::{Direction, EntityId};

/// A command issued by a player during their turn.
///
/// The command set is closed; every ledger matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Move an entity one cell in a direction.
    Move {
        /// The entity to move.
        entity: EntityId,
        /// Where to move it.
        direction: Direction,
    },
    /// Spawn a new entity at the player's factory.
    Spawn,
    /// Convert an entity into a dropoff on its current cell.
    Construct {
        /// The entity to convert.
        entity: EntityId,
    },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move { entity, direction } => {
                write!(f, "m {entity} {}", direction.to_wire())
            }
            Self::Spawn => write!(f, "g"),
            Self::Construct { entity } => write!(f, "c {entity}"),
        }
    }
}

/// Error produced when a command line cannot be parsed.
///
/// Parse failures are protocol errors: they terminate the submitting player
/// rather than entering the recoverable-error retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The offending token or a description of what was missing.
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed command: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse one line of whitespace-separated commands.
///
/// An empty line parses to an empty command list.
///
/// # Errors
///
/// Returns a [`ParseError`] on an unknown tag, a missing field, or a field
/// that does not parse.
pub fn parse_commands(line: &str) -> Result<Vec<Command>, ParseError> {
    let mut tokens = line.split_whitespace();
    let mut commands = Vec::new();

    while let Some(tag) = tokens.next() {
        let command = match tag {
            "m" => {
                let entity = parse_entity(tokens.next())?;
                let direction = tokens
                    .next()
                    .ok_or_else(|| ParseError::new("move without direction"))?;
                let mut chars = direction.chars();
                let (c, rest) = (chars.next(), chars.next());
                let direction = match (c, rest) {
                    (Some(c), None) => Direction::from_wire(c),
                    _ => None,
                }
                .ok_or_else(|| ParseError::new(format!("bad direction {direction:?}")))?;
                Command::Move { entity, direction }
            }
            "g" => Command::Spawn,
            "c" => Command::Construct {
                entity: parse_entity(tokens.next())?,
            },
            other => return Err(ParseError::new(format!("unknown tag {other:?}"))),
        };
        commands.push(command);
    }

    Ok(commands)
}

fn parse_entity(token: Option<&str>) -> Result<EntityId, ParseError> {
    let token = token.ok_or_else(|| ParseError::new("missing entity id"))?;
    token
        .parse()
        .map_err(|_| ParseError::new(format!("bad entity id {token:?}")))
}
