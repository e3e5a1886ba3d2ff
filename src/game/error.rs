//! Recoverable command errors.
//!
//! These drive the retry-without-offenders loop: every violation found
//! during a check pass is accumulated (never thrown mid-commit), logged with
//! a window of the surrounding commands, and — unless marked ignored —
//! costs the offending player their whole command list for the turn.

use std::fmt;

use crate::game::{Command, Energy, EntityId, Location, PlayerId};

/// What rule a command violated.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandErrorKind {
    /// The referenced entity does not exist or is not owned by the player.
    EntityNotFound {
        /// The entity the command referenced.
        entity: EntityId,
    },
    /// The entity cannot afford the move cost. Ignored by default: the move
    /// is dropped and the entity stays put.
    InsufficientEntityEnergy {
        /// Energy the entity carries.
        available: Energy,
        /// Energy the move requires.
        required: Energy,
    },
    /// The player's committed expenses exceed their balance.
    InsufficientBalance {
        /// The player's balance at the start of the turn.
        available: Energy,
        /// Total expense the player tried to commit.
        committed: Energy,
    },
    /// More than one command referenced the same entity this turn.
    DuplicateEntity {
        /// The entity referenced more than once.
        entity: EntityId,
    },
    /// More than one spawn was submitted this turn.
    ExcessiveSpawns,
    /// A construct targeted a cell that is already owned.
    CellOwned {
        /// The cell in question.
        location: Location,
        /// Its current owner.
        owner: PlayerId,
    },
    /// Two or more of the player's own entities collided. Ignored by
    /// default: the collision resolves normally, this is a diagnostic.
    SelfCollision {
        /// Where the collision happened.
        location: Location,
        /// The player's entities involved.
        entities: Vec<EntityId>,
    },
}

/// A recoverable error caused by one player command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandError {
    /// The player that issued the command.
    pub player: PlayerId,
    /// The offending command.
    pub command: Command,
    /// Sibling commands that contributed to the violation, for diagnostics.
    pub context: Vec<Command>,
    /// If true, the engine logs the error and proceeds; the player is not
    /// treated as an offender. Cleared in strict-errors mode.
    pub ignored: bool,
    /// The violated rule.
    pub kind: CommandErrorKind,
}

impl CommandError {
    /// Create an error with no context commands.
    #[must_use]
    pub fn new(player: PlayerId, command: Command, kind: CommandErrorKind) -> Self {
        Self {
            player,
            command,
            context: Vec::new(),
            ignored: false,
            kind,
        }
    }

    /// Attach context commands.
    #[must_use]
    pub fn with_context(mut self, context: Vec<Command>) -> Self {
        self.context = context;
        self
    }

    /// Mark the error as ignorable (unless strict mode clears this).
    #[must_use]
    pub const fn ignored(mut self, ignored: bool) -> Self {
        self.ignored = ignored;
        self
    }

    /// A short label printed before the context command window.
    #[must_use]
    pub const fn context_message(&self) -> &'static str {
        match self.kind {
            CommandErrorKind::DuplicateEntity { .. } => {
                "The other commands issued to this entity:"
            }
            CommandErrorKind::ExcessiveSpawns => "The other spawn commands issued this turn:",
            _ => "Commands contributing to this error:",
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CommandErrorKind::EntityNotFound { entity } => {
                write!(f, "entity {entity} not found or not owned")
            }
            CommandErrorKind::InsufficientEntityEnergy {
                available,
                required,
            } => write!(
                f,
                "entity has insufficient energy for move: has {available}, needs {required}"
            ),
            CommandErrorKind::InsufficientBalance {
                available,
                committed,
            } => write!(
                f,
                "player has insufficient energy: has {available}, tried to spend {committed}"
            ),
            CommandErrorKind::DuplicateEntity { entity } => {
                write!(f, "entity {entity} was issued more than one command")
            }
            CommandErrorKind::ExcessiveSpawns => {
                write!(f, "more than one spawn issued this turn")
            }
            CommandErrorKind::CellOwned { location, owner } => write!(
                f,
                "cell ({}, {}) is already owned by player {owner}",
                location.x, location.y
            ),
            CommandErrorKind::SelfCollision { location, entities } => write!(
                f,
                "own entities {entities:?} collided at ({}, {})",
                location.x, location.y
            ),
        }
    }
}

impl std::error::Error for CommandError {}
