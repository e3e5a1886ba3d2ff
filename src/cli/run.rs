//! Run command implementation.

use std::path::PathBuf;

use super::output::{JsonGameResult, format_text};
use super::{CliError, OutputFormat};
use ember::bot::{CommandSource, ProcessSource};
use ember::engine::generate_map;
use ember::{Constants, GameEngine};

/// Execute the run command.
///
/// # Errors
///
/// Returns an error if the bots cannot be launched or the game cannot be
/// set up.
#[allow(clippy::too_many_arguments)]
pub(crate) fn execute(
    bots: Vec<String>,
    seed: Option<u64>,
    width: u16,
    height: u16,
    turns: Option<u32>,
    config: Option<PathBuf>,
    strict: bool,
    format: OutputFormat,
    save: Option<PathBuf>,
    quiet: bool,
) -> Result<(), CliError> {
    let mut constants = match config {
        Some(path) => Constants::load(&path)
            .map_err(|e| CliError::new(format!("Failed to load {}: {e}", path.display())))?,
        None => Constants::default(),
    };
    if strict {
        constants.strict_errors = true;
    }

    // Generate seed if not provided
    let seed = seed.unwrap_or_else(|| {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    });

    let (map, factories) = generate_map(seed, width, height, bots.len())?;
    let source = ProcessSource::launch(&bots, &constants, &map, &factories)?;

    let mut engine = GameEngine::new(&constants, map, &factories, seed)?;
    if let Some(turns) = turns {
        engine.set_turn_limit(turns);
    }
    #[allow(clippy::cast_possible_truncation)]
    for index in 0..bots.len() {
        let player = index as u8;
        if let Some(name) = source.player_name(player) {
            engine.set_player_name(player, name);
        }
    }

    if !quiet {
        println!("Running game with seed {seed} on {width}x{height}...");
        println!();
    }

    let outcome = engine.run(&source);

    if let Some(save_path) = save {
        outcome.replay.save(&save_path).map_err(|e| {
            CliError::new(format!("Failed to save replay: {e}"))
        })?;
        if !quiet {
            println!("Replay saved to: {}", save_path.display());
            println!();
        }
    }

    match format {
        OutputFormat::Text => {
            print!("{}", format_text(&outcome));
        }
        OutputFormat::Json => {
            let result = JsonGameResult::from_outcome(&outcome);
            let json = serde_json::to_string_pretty(&result)
                .map_err(|e| CliError::new(format!("JSON serialization failed: {e}")))?;
            println!("{json}");
        }
    }

    Ok(())
}
