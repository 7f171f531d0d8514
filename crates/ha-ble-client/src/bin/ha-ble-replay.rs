//! Replay a scripted controller session through the dispatcher.
//!
//! ```text
//! ha-ble-replay --script session.yaml [--config link.yaml] [--json]
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ha_ble_client::replay::{Replay, Script, StepOutcome};
use ha_ble_client::EngineConfig;
use ha_ble_protocol::ZoneTree;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ha-ble-replay", version, about = "Replay a scripted controller BLE session")]
struct Args {
    /// YAML script of steps to replay.
    #[arg(short, long)]
    script: PathBuf,

    /// Engine configuration (overrides the script's `config` section).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print step outcomes as JSON lines.
    #[arg(long)]
    json: bool,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    ha_ble_metrics::describe_metrics();

    let script = Script::load(&args.script)
        .with_context(|| format!("loading script {}", args.script.display()))?;

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => script.config.clone().unwrap_or_default(),
    };
    config.validate()?;

    tracing::info!(
        "Replaying {} steps on link '{}' ({:?} layout)",
        script.steps.len(),
        config.name,
        config.id_layout
    );

    let mut replay = Replay::new(config);
    for (i, step) in script.steps.iter().enumerate() {
        let outcome = replay.run_step(i + 1, step)?;
        if args.json {
            println!("{}", serde_json::to_string(&outcome)?);
        } else {
            print_outcome(&outcome);
        }
    }

    Ok(())
}

fn print_outcome(outcome: &StepOutcome) {
    println!("[{}] {} -> {}", outcome.step, outcome.action, outcome.state);
    for frame in &outcome.written {
        println!("    tx {}", frame);
    }
    if let Some(reason) = &outcome.rejected {
        println!("    rejected: {}", reason);
    }
    for kind in &outcome.errors {
        println!("    error: {}", kind);
    }
    for tree in &outcome.updates {
        print_tree(tree);
    }
}

fn print_tree(tree: &ZoneTree) {
    println!("    zones ({} devices):", tree.device_count());
    for zone in tree.zones() {
        println!("      {} [{}]", zone.display_name(), zone.id);
        for device in &zone.devices {
            println!(
                "        #{} {} {} = {}",
                device.index,
                device.id,
                device.display_kind().label(),
                device.value
            );
        }
    }
}
