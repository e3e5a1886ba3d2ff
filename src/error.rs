//! Engine and transport error types.

use std::fmt;

/// A transport or protocol failure for a single player.
///
/// These are fatal to the affected player only: the engine terminates the
/// player immediately and the game proceeds with the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The bot missed its response deadline.
    Timeout {
        /// The deadline that was missed, in milliseconds.
        deadline_ms: u64,
    },
    /// The bot sent text the engine cannot understand.
    Protocol(String),
    /// The connection to the bot failed.
    Io(String),
    /// The bot process is gone.
    Disconnected,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { deadline_ms } => {
                write!(f, "response missed the {deadline_ms}ms deadline")
            }
            Self::Protocol(message) => write!(f, "protocol violation: {message}"),
            Self::Io(message) => write!(f, "connection failure: {message}"),
            Self::Disconnected => write!(f, "bot process is gone"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Error constructing a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No factories were supplied.
    NoPlayers,
    /// More factories than the configured player limit.
    TooManyPlayers {
        /// Requested player count.
        requested: usize,
        /// Configured maximum.
        limit: usize,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPlayers => write!(f, "a game needs at least one player"),
            Self::TooManyPlayers { requested, limit } => {
                write!(f, "{requested} players requested, limit is {limit}")
            }
        }
    }
}

impl std::error::Error for EngineError {}
