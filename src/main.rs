use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use paddock::{
    scenario::{Scenario, ScenarioLoader},
    snapshot::{load_from_path, save_to_path},
    Game,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Headless farm simulation runner")]
struct Cli {
    /// Path to the scenario YAML file (built-in starter farm when omitted)
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Seconds of game time to simulate
    #[arg(long)]
    seconds: Option<f64>,

    /// Override autosave interval in ticks (0 disables)
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Directory for autosaves
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Resume from a saved snapshot instead of the scenario layout
    #[arg(long)]
    load: Option<PathBuf>,

    /// Write the final state here
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut scenario = match &cli.scenario {
        Some(path) => ScenarioLoader::new(".").load(path)?,
        None => Scenario::default_farm(),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&scenario.logging.level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(interval) = cli.snapshot_interval {
        scenario.snapshot_interval_ticks = interval;
    }
    let snapshot_dir = cli
        .snapshot_dir
        .clone()
        .or_else(|| Some(PathBuf::from("snapshots")));

    let mut game = Game::from_scenario(&scenario, snapshot_dir)?;
    if let Some(path) = &cli.load {
        let file = load_from_path(path)?;
        game.load(file.world)
            .with_context(|| format!("Snapshot {} failed validation", path.display()))?;
    }

    let seconds = scenario.seconds(cli.seconds);
    let tick_seconds = game.engine().clock().tick_seconds();
    let ticks = (seconds / tick_seconds).floor().max(0.0) as u64;
    game.run_ticks(ticks)?;

    if let Some(path) = &cli.save {
        save_to_path(path, &scenario.name, &game.snapshot())?;
    }

    let world = game.world();
    println!(
        "Scenario '{}' ran {} ticks. Balance: {} (income {}/tick), entities: {}, animals: {}",
        scenario.name,
        ticks,
        world.balance(),
        world.income_per_tick(),
        world.entity_count(),
        world.animals().count()
    );
    Ok(())
}
