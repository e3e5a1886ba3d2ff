//! Replay command implementation.

use std::path::PathBuf;

use super::{CliError, OutputFormat};
use ember::replay::Replay;

/// Execute the replay command: summarize a saved replay file.
///
/// # Errors
///
/// Returns an error if the replay cannot be loaded.
pub(crate) fn execute(recording: PathBuf, format: OutputFormat) -> Result<(), CliError> {
    let replay = Replay::load(&recording)
        .map_err(|e| CliError::new(format!("Failed to load {}: {e}", recording.display())))?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&replay.statistics)
                .map_err(|e| CliError::new(format!("JSON serialization failed: {e}")))?;
            println!("{json}");
        }
        OutputFormat::Text => {
            println!(
                "Replay: seed {}, {}x{}, {} turns, {} players",
                replay.seed,
                replay.map_width,
                replay.map_height,
                replay.frames.len(),
                replay.players.len()
            );
            let events: usize = replay.frames.iter().map(|frame| frame.events.len()).sum();
            println!("Events recorded: {events}");
            println!();
            for stats in &replay.statistics {
                let name = replay
                    .players
                    .iter()
                    .find(|player| player.id == stats.player_id)
                    .map_or("unknown", |player| player.name.as_str());
                println!(
                    "  #{} {} — deposited {}, alive to turn {}",
                    stats.rank, name, stats.total_production, stats.last_turn_alive
                );
            }
        }
    }

    Ok(())
}
