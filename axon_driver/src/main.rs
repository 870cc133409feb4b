//! # AXON simulation binary
//!
//! Runs the output driver against the software peripheral backend with a
//! scripted motion scenario and prints the observed timing.
//!
//! # Usage
//!
//! ```bash
//! # Default scenario with built-in settings
//! axon_sim
//!
//! # Load a settings snapshot and run 2 seconds of simulated time
//! axon_sim --settings axon.toml --duration-ms 2000
//!
//! # Verbose logging
//! axon_sim -v
//! ```

#![deny(warnings)]

use std::path::PathBuf;

use axon_common::settings::Settings;
use axon_common::signals::{AxisSignals, SpindleState, StepCommand};
use axon_driver::SimRig;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// AXON output driver - simulated timing scenario runner
#[derive(Parser, Debug)]
#[command(name = "axon_sim")]
#[command(version)]
#[command(about = "Runs the interrupt-driven output driver on simulated peripherals")]
#[command(long_about = None)]
struct Args {
    /// Path to a TOML settings snapshot. Built-in defaults when omitted.
    #[arg(short = 'c', long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Simulated runtime [ms]
    #[arg(short, long, default_value_t = 1_000)]
    duration_ms: u64,

    /// Step cycle period [µs]
    #[arg(long, default_value_t = 250)]
    cycle_us: u32,

    /// Number of scripted step commands
    #[arg(long, default_value_t = 400)]
    steps: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("simulation failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    setup_tracing(&args);

    info!("AXON sim v{} starting...", env!("CARGO_PKG_VERSION"));

    let settings = match &args.settings {
        Some(path) => {
            info!("Loading settings snapshot from {:?}", path);
            Settings::from_toml_file(path)?
        }
        None => {
            let mut s = Settings::default();
            s.spindle.ramped = true;
            s.debounce.enabled = true;
            s
        }
    };

    let mut rig = SimRig::new(&settings)?;
    info!(caps = ?rig.driver.caps(), "driver initialized");

    // Scripted scenario: spin up, run a block of steps, hit a limit.
    rig.driver.spindle_set_state(SpindleState::ON, 800.0);
    rig.driver.set_cycle_period_us(args.cycle_us);
    for i in 0..args.steps {
        rig.driver.host_mut().push(StepCommand::new(
            AxisSignals::X | AxisSignals::Y,
            AxisSignals::Y,
            i == 0,
        ));
    }
    rig.driver.limits_enable(true);
    rig.driver.wake_up();

    let limit_at_us = args.duration_ms * 1_000 / 2;
    rig.run_until(limit_at_us);
    rig.driver.hw_mut().set_limit_inputs(AxisSignals::X);
    rig.driver.hw_mut().trigger_limit_edge(AxisSignals::X);
    rig.run_until(args.duration_ms * 1_000);
    rig.driver.go_idle(true);

    let step_edges = rig.driver.hw().step_port_writes().len();
    let ramp_writes = rig.driver.hw().pwm_compare_history().len();
    info!(
        sim_ms = args.duration_ms,
        step_edges,
        ramp_writes,
        limit_events = rig.driver.host().limit_events.len(),
        queued_left = rig.driver.host().queued(),
        "scenario complete"
    );
    for (t, signals) in &rig.driver.host().limit_events {
        info!("limit {:?} reported at t={}µs", signals, t);
    }

    info!("AXON sim shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
