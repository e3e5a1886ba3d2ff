//! Bot command sources.
//!
//! The engine depends only on the [`CommandSource`] trait: one command
//! request per living player per turn, each with its own deadline. Requests
//! are dispatched concurrently and joined before any store mutation, and an
//! in-flight request is never cancelled — a timeout only changes how its
//! result is interpreted. Implementations:
//!
//! - [`ScriptedSource`] replays canned per-turn command lists (tests and
//!   demos).
//! - [`ProcessSource`] drives child processes over pipes with a
//!   line-oriented protocol.
//!
//! # Wire protocol
//!
//! At launch each bot receives, on stdin:
//!
//! ```text
//! <constants as one JSON line>
//! <num_players> <your_player_id>
//! <player_id> <factory_x> <factory_y>     (one line per player)
//! <width> <height>
//! <width cell energies>                   (one line per row)
//! ```
//!
//! and replies with a single line: its name. Every turn it receives:
//!
//! ```text
//! <turn>
//! <player_id> <energy> <num_entities> <num_dropoffs>   (one line per player)
//! <entity_id> <x> <y> <energy>            (one line per entity)
//! <x> <y>                                 (one line per dropoff)
//! <num_changed_cells>
//! <x> <y> <energy>                        (one line per changed cell)
//! ```
//!
//! and replies with one line of whitespace-separated commands (`m <id>
//! <n|s|e|w|o>`, `g`, `c <id>`), possibly empty.

use std::collections::{BTreeMap, VecDeque};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command as ProcessCommand, Stdio};
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::thread;
use std::time::Duration;

use crate::config::Constants;
use crate::error::TransportError;
use crate::game::{Command, Energy, Location, Map, PlayerId, parse_commands};
use crate::replay::{CellUpdate, EntityState};

/// Everything a bot is told about one player before a turn.
#[derive(Debug, Clone)]
pub struct PlayerObservation {
    /// The observed player.
    pub player: PlayerId,
    /// Their energy balance.
    pub energy: Energy,
    /// Their entities.
    pub entities: Vec<EntityState>,
    /// Their dropoff locations.
    pub dropoffs: Vec<Location>,
}

/// Per-turn state the engine exposes for the transport to forward outward.
#[derive(Debug, Clone)]
pub struct TurnObservation {
    /// The turn about to be played.
    pub turn: u32,
    /// Every player's visible state.
    pub players: Vec<PlayerObservation>,
    /// Cells whose energy changed since the previous turn.
    pub changed_cells: Vec<CellUpdate>,
}

/// A source of per-player commands.
///
/// `get_commands` may be called concurrently for different players; the
/// engine never calls it for the same player twice in one turn.
pub trait CommandSource: Send + Sync {
    /// Retrieve one player's commands for the turn described by
    /// `observation`, within `deadline`.
    ///
    /// # Errors
    ///
    /// A [`TransportError`] terminates the player; it never affects other
    /// players or the engine.
    fn get_commands(
        &self,
        player: PlayerId,
        observation: &TurnObservation,
        deadline: Duration,
    ) -> Result<Vec<Command>, TransportError>;

    /// Tear down the connection to a terminated player. Default: no-op.
    fn disconnect(&self, player: PlayerId) {
        let _ = player;
    }

    /// The player's self-reported name, if the transport knows one.
    fn player_name(&self, player: PlayerId) -> Option<String> {
        let _ = player;
        None
    }
}

/// One scripted turn for a [`ScriptedSource`] player.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Submit these commands.
    Commands(Vec<Command>),
    /// Simulate a transport failure.
    Fail,
}

/// A command source that replays canned command lists. Once a player's
/// script runs out they submit nothing each turn.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    scripts: Mutex<BTreeMap<PlayerId, VecDeque<ScriptedTurn>>>,
}

impl ScriptedSource {
    /// Create an empty source: every player submits nothing every turn.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scripted turn for a player.
    pub fn push(&self, player: PlayerId, turn: ScriptedTurn) {
        let mut scripts = lock(&self.scripts);
        scripts.entry(player).or_default().push_back(turn);
    }

    /// Append one turn of commands for a player.
    pub fn push_commands(&self, player: PlayerId, commands: Vec<Command>) {
        self.push(player, ScriptedTurn::Commands(commands));
    }
}

impl CommandSource for ScriptedSource {
    fn get_commands(
        &self,
        player: PlayerId,
        _observation: &TurnObservation,
        _deadline: Duration,
    ) -> Result<Vec<Command>, TransportError> {
        let mut scripts = lock(&self.scripts);
        match scripts.get_mut(&player).and_then(VecDeque::pop_front) {
            None => Ok(Vec::new()),
            Some(ScriptedTurn::Commands(commands)) => Ok(commands),
            Some(ScriptedTurn::Fail) => {
                Err(TransportError::Protocol("scripted failure".to_string()))
            }
        }
    }
}

/// Recover a mutex guard even if a panicking thread poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A pipe-connected child process bot.
struct BotConnection {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    /// Lines read from the bot's stdout by a dedicated reader thread. The
    /// thread outlives any deadline, so a late response is drained on the
    /// next read rather than cancelling anything.
    lines: Mutex<Receiver<std::io::Result<String>>>,
    name: String,
}

/// A command source backed by child processes.
pub struct ProcessSource {
    bots: BTreeMap<PlayerId, BotConnection>,
}

impl std::fmt::Debug for ProcessSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSource")
            .field("players", &self.bots.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ProcessSource {
    /// Launch one bot per shell command and complete the init handshake.
    /// Player ids are assigned in order.
    ///
    /// # Errors
    ///
    /// Returns an error if a bot cannot be spawned or fails the handshake;
    /// callers should treat that as fatal to game setup.
    pub fn launch(
        shell_commands: &[String],
        constants: &Constants,
        map: &Map,
        factories: &[Location],
    ) -> Result<Self, TransportError> {
        let mut bots = BTreeMap::new();
        #[allow(clippy::cast_possible_truncation)]
        for (index, shell_command) in shell_commands.iter().enumerate() {
            let player = index as PlayerId;
            let mut child = ProcessCommand::new("sh")
                .arg("-c")
                .arg(shell_command)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| TransportError::Io(format!("spawn {shell_command:?}: {e}")))?;

            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| TransportError::Io("no stdin pipe".to_string()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| TransportError::Io("no stdout pipe".to_string()))?;

            let (sender, receiver) = channel();
            thread::spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines() {
                    if sender.send(line).is_err() {
                        break;
                    }
                }
            });

            let connection = BotConnection {
                child: Mutex::new(child),
                stdin: Mutex::new(stdin),
                lines: Mutex::new(receiver),
                name: String::new(),
            };

            Self::send_init(&connection, player, constants, map, factories)?;
            let deadline = Duration::from_millis(constants.turn_deadline_ms);
            let name = Self::read_line(&connection, deadline)?;
            bots.insert(
                player,
                BotConnection {
                    name: name.trim().to_string(),
                    ..connection
                },
            );
        }
        Ok(Self { bots })
    }

    fn connection(&self, player: PlayerId) -> Result<&BotConnection, TransportError> {
        self.bots.get(&player).ok_or(TransportError::Disconnected)
    }

    fn send_init(
        connection: &BotConnection,
        player: PlayerId,
        constants: &Constants,
        map: &Map,
        factories: &[Location],
    ) -> Result<(), TransportError> {
        let mut text = serde_json::to_string(constants)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        text.push('\n');
        text.push_str(&format!("{} {player}\n", factories.len()));
        for (id, factory) in factories.iter().enumerate() {
            text.push_str(&format!("{id} {} {}\n", factory.x, factory.y));
        }
        text.push_str(&format!("{} {}\n", map.width(), map.height()));
        for y in 0..map.height() {
            let row: Vec<String> = (0..map.width())
                .map(|x| map.at(Location::new(x, y)).energy.to_string())
                .collect();
            text.push_str(&row.join(" "));
            text.push('\n');
        }
        Self::send(connection, &text)
    }

    fn send(connection: &BotConnection, text: &str) -> Result<(), TransportError> {
        let mut stdin = lock(&connection.stdin);
        stdin
            .write_all(text.as_bytes())
            .and_then(|()| stdin.flush())
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn read_line(
        connection: &BotConnection,
        deadline: Duration,
    ) -> Result<String, TransportError> {
        let lines = lock(&connection.lines);
        match lines.recv_timeout(deadline) {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(e)) => Err(TransportError::Io(e.to_string())),
            Err(RecvTimeoutError::Timeout) => {
                #[allow(clippy::cast_possible_truncation)]
                let deadline_ms = deadline.as_millis() as u64;
                Err(TransportError::Timeout { deadline_ms })
            }
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn frame_text(observation: &TurnObservation) -> String {
        let mut text = format!("{}\n", observation.turn);
        for player in &observation.players {
            text.push_str(&format!(
                "{} {} {} {}\n",
                player.player,
                player.energy,
                player.entities.len(),
                player.dropoffs.len()
            ));
            for entity in &player.entities {
                text.push_str(&format!(
                    "{} {} {} {}\n",
                    entity.id, entity.location.x, entity.location.y, entity.energy
                ));
            }
            for dropoff in &player.dropoffs {
                text.push_str(&format!("{} {}\n", dropoff.x, dropoff.y));
            }
        }
        text.push_str(&format!("{}\n", observation.changed_cells.len()));
        for cell in &observation.changed_cells {
            text.push_str(&format!(
                "{} {} {}\n",
                cell.location.x, cell.location.y, cell.energy
            ));
        }
        text
    }
}

impl CommandSource for ProcessSource {
    fn get_commands(
        &self,
        player: PlayerId,
        observation: &TurnObservation,
        deadline: Duration,
    ) -> Result<Vec<Command>, TransportError> {
        let connection = self.connection(player)?;
        Self::send(connection, &Self::frame_text(observation))?;
        let line = Self::read_line(connection, deadline)?;
        parse_commands(&line).map_err(|e| TransportError::Protocol(e.to_string()))
    }

    fn disconnect(&self, player: PlayerId) {
        if let Some(connection) = self.bots.get(&player) {
            let mut child = lock(&connection.child);
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn player_name(&self, player: PlayerId) -> Option<String> {
        self.bots
            .get(&player)
            .filter(|connection| !connection.name.is_empty())
            .map(|connection| connection.name.clone())
    }
}

impl Drop for ProcessSource {
    fn drop(&mut self) {
        for connection in self.bots.values() {
            let mut child = lock(&connection.child);
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Direction;

    fn observation() -> TurnObservation {
        TurnObservation {
            turn: 1,
            players: Vec::new(),
            changed_cells: Vec::new(),
        }
    }

    #[test]
    fn test_scripted_source_pops_turns_in_order() {
        let source = ScriptedSource::new();
        source.push_commands(0, vec![Command::Spawn]);
        source.push_commands(
            0,
            vec![Command::Move {
                entity: 0,
                direction: Direction::North,
            }],
        );

        let deadline = Duration::from_millis(10);
        assert_eq!(
            source.get_commands(0, &observation(), deadline).unwrap(),
            vec![Command::Spawn]
        );
        assert_eq!(
            source.get_commands(0, &observation(), deadline).unwrap(),
            vec![Command::Move {
                entity: 0,
                direction: Direction::North
            }]
        );
        // Script exhausted: silence, not failure.
        assert_eq!(
            source.get_commands(0, &observation(), deadline).unwrap(),
            vec![]
        );
    }

    #[test]
    fn test_scripted_failure() {
        let source = ScriptedSource::new();
        source.push(1, ScriptedTurn::Fail);
        let result = source.get_commands(1, &observation(), Duration::from_millis(10));
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }

    #[test]
    fn test_process_source_handshake_and_silence() {
        // A bot that reports its name and then replies with an empty command
        // line forever, ignoring its input.
        let constants = Constants {
            turn_deadline_ms: 5000,
            ..Constants::default()
        };
        let map = Map::new(8, 8).expect("valid size");
        let factories = [Location::new(1, 1)];
        let source = ProcessSource::launch(
            &["echo idle-bot; while true; do echo; done".to_string()],
            &constants,
            &map,
            &factories,
        )
        .expect("launch");

        assert_eq!(source.player_name(0), Some("idle-bot".to_string()));
        let commands = source
            .get_commands(0, &observation(), Duration::from_millis(5000))
            .expect("idle bot responds");
        assert_eq!(commands, vec![]);
        source.disconnect(0);
    }

    #[test]
    fn test_process_source_timeout() {
        let constants = Constants {
            turn_deadline_ms: 200,
            ..Constants::default()
        };
        let map = Map::new(8, 8).expect("valid size");
        let factories = [Location::new(1, 1)];
        // Never writes anything: the handshake read must time out without
        // hanging the launcher.
        let result = ProcessSource::launch(
            &["sleep 60".to_string()],
            &constants,
            &map,
            &factories,
        );
        assert!(matches!(result, Err(TransportError::Timeout { .. })));
    }

    #[test]
    fn test_process_source_garbage_commands() {
        let constants = Constants {
            turn_deadline_ms: 5000,
            ..Constants::default()
        };
        let map = Map::new(8, 8).expect("valid size");
        let factories = [Location::new(1, 1)];
        let source = ProcessSource::launch(
            &["echo chaos-bot; while true; do echo zzz; done".to_string()],
            &constants,
            &map,
            &factories,
        )
        .expect("launch");

        let result = source.get_commands(0, &observation(), Duration::from_millis(5000));
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }
}
