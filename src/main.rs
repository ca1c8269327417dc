use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use train_sim::simulation::{
    LogConfirmer, Saveable, Scenario, Simulator, TrainEvent, TrainType,
};

#[derive(Parser)]
#[command(name = "train_sim")]
#[command(about = "Headless train simulation")]
struct Cli {
    /// Scenario file (JSON); runs the built-in demo line when omitted
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Number of simulation ticks to run
    #[arg(long, default_value = "1200")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.1")]
    delta: f32,

    /// Simulated seconds between progress reports
    #[arg(long, default_value = "10")]
    seconds_per_report: f32,

    /// Write the final simulator state to this file
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn,train_sim=info"))
        .init();
    let cli = Cli::parse();

    let scenario = match &cli.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::demo(),
    };
    let mut simulator = Simulator::from_scenario(&scenario)
        .with_context(|| format!("Starting scenario {}", scenario.name))?;
    run_headless(&mut simulator, &cli);

    if let Some(path) = &cli.save {
        let bytes = simulator.save_to_bytes();
        std::fs::write(path, &bytes)
            .with_context(|| format!("Writing save file {}", path.display()))?;
        info!("Saved {} bytes to {}", bytes.len(), path.display());
    }
    Ok(())
}

/// Run the simulation without any UI, logging progress
fn run_headless(simulator: &mut Simulator, cli: &Cli) {
    info!("Running train simulation in headless mode...");
    info!("Ticks: {}, Delta: {}s", cli.ticks, cli.delta);

    let ticks_per_report = (cli.seconds_per_report / cli.delta).ceil().max(1.0) as u32;
    let mut signals: Vec<TrainEvent> = Vec::new();
    let mut confirmer = LogConfirmer;

    for tick in 1..=cli.ticks {
        simulator.update(cli.delta, &mut signals, &mut confirmer);
        // no UI: every activity message counts as read
        simulator.acknowledge_event();
        if tick % ticks_per_report == 0 {
            info!(
                "--- After tick {} ({:.1}s simulated time) ---",
                tick,
                tick as f32 * cli.delta
            );
            report_trains(simulator);
        }
    }

    info!("=== SIMULATION COMPLETE ===");
    info!("Elapsed time: {:.2}s", cli.ticks as f32 * cli.delta);
    info!("Total trains: {}", simulator.trains().len());
    let moving = simulator
        .trains()
        .iter()
        .filter(|t| !t.is_stopped())
        .count();
    info!("Moving trains: {}", moving);
    if let Some(player) = simulator.player_train() {
        info!("Player train: {}", player.name);
        info!("Player distance travelled: {:.1} m", player.distance_travelled_m);
    }
    if let Some(activity) = simulator.activity() {
        info!("Activity status: {:?}", activity.status);
    }
    info!("Signals emitted: {}", signals.len());
}

fn report_trains(simulator: &Simulator) {
    for train in simulator.trains() {
        let marker = if train.train_type == TrainType::Player {
            "*"
        } else {
            " "
        };
        info!(
            "{} {:<12} {:>3} cars  {:>6.1} m/s  {:>8.1} m",
            marker,
            train.name,
            train.cars.len(),
            train.speed_mps,
            train.distance_travelled_m
        );
    }
}
