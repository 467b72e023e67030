// Headless monitoring example
//
// Runs the acquisition engine against the built-in simulated controller, printing every
// sample and connection change. Use --drop-every to watch the reconnection logic work.

use clap::Parser;
use sfc_monitor::{ConnectionState, Monitor, MonitorConfig, MonitorEvent, Simulator};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "headless_monitor")]
#[command(version = "1.0")]
#[command(about = "Monitor a simulated mass-flow controller from the terminal")]
struct Args {
    /// TOML config file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Flow setpoint to apply after connecting, in sccm
    #[arg(short, long, default_value_t = 20.0)]
    setpoint: f64,

    /// How long to run, in seconds
    #[arg(short, long, default_value_t = 30)]
    duration: u64,

    /// Pull the simulated cable every N seconds
    #[arg(long)]
    drop_every: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let config = match &args.config {
        Some(path) => MonitorConfig::load_from_file(path)?,
        None => MonitorConfig::default(),
    };

    println!("SFC Headless Monitor");
    println!("====================");
    println!("Poll interval: {:?}", config.poll_interval());
    println!("Reconnect interval: {:?}", config.reconnect_interval());
    println!("Logging to: {}", config.log_dir.display());
    println!("Press Ctrl+C to stop\n");

    let simulator = Simulator::new(0.0);
    let (events, rx) = mpsc::channel::<MonitorEvent>();
    let mut monitor = Monitor::connect(simulator.connector(), &config, Arc::new(events))?;
    println!("✓ Connected, initial setpoint {}", monitor.setpoint());

    let applied = monitor.set_setpoint(args.setpoint)?;
    println!("✓ Setpoint set to {}\n", applied);

    let started = Instant::now();
    let mut last_drop = Instant::now();
    let buffer = monitor.buffer();

    while started.elapsed() < Duration::from_secs(args.duration) {
        if let Some(period) = args.drop_every {
            if last_drop.elapsed() >= Duration::from_secs(period) {
                println!("-- pulling the cable --");
                simulator.drop_link();
                last_drop = Instant::now();
            }
        }

        monitor.service(Duration::from_millis(50));

        for event in rx.try_iter() {
            match event {
                MonitorEvent::Sample(sample) => println!(
                    "{}  set {:6.2}  flow {:6.2}  temp {:5.2} °C  [{}] {}",
                    sample.timestamp().format("%H:%M:%S%.3f"),
                    sample.setpoint(),
                    sample.measured(),
                    sample.temperature(),
                    sample.status().indicator().as_str(),
                    sample.status(),
                ),
                MonitorEvent::ConnectionState(ConnectionState::Reconnecting) => {
                    println!("⏳ Attempting to reconnect...");
                }
                MonitorEvent::ConnectionState(state) => println!("== {} ==", state),
            }
        }
    }

    let smoothed = buffer.moving_average(config.averaging_window);
    if let Some(last) = smoothed.last() {
        println!(
            "\n{}-point average of the latest flow: {:.3} sccm",
            config.averaging_window, last
        );
    }
    println!("{} samples in history", buffer.len());

    monitor.shutdown();
    println!("Device set to zero flow, monitor stopped");
    Ok(())
}
