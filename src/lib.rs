// Allow unwrap and unreadable literals in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::unreadable_literal))]
//! Ember: a deterministic turn-based engine for multi-agent
//! resource-collection competitions.
//!
//! Independent, untrusted bot processes submit textual commands each turn;
//! the engine validates them, deterministically resolves conflicts between
//! simultaneous commands, and atomically advances a shared economy to
//! produce a reproducible, auditable game history.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │          Turn Engine                │  retrieval, economy, ranking
//! ├─────────────────────────────────────┤
//! │        Turn Transaction             │  retry-without-offenders loop
//! ├─────────────────────────────────────┤
//! │   Command Ledgers + World Store     │  validate/commit, pure data
//! └─────────────────────────────────────┘
//! ```
//!
//! Commands flow down through the transaction into the store; events flow
//! back out to the replay. Command retrieval is the only concurrent phase
//! and is strictly isolated from mutation.

pub mod bot;
pub mod config;
pub mod engine;
pub mod error;
pub mod game;
pub mod replay;

pub use config::Constants;
pub use engine::{GameEngine, GameOutcome};
pub use error::{EngineError, TransportError};

// Re-export key game types at crate root for convenience
pub use game::{Command, Direction, Energy, EntityId, GameEvent, Location, Map, PlayerId};
