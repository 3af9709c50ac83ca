//! Stepper-axis supervisor binary.
//!
//! Connects to the controller (with retry), then runs the cyclic control
//! loop until Ctrl-C or until the link is declared dead.

use std::net::SocketAddr;
use std::process;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use axis_supervisor::bus::connect_with_retry;
use axis_supervisor::config::{ConnectConfig, SupervisorConfig};
use axis_supervisor::control::Supervisor;
use axis_supervisor::tags::CoilMap;

/// Cyclic stepper-axis control loop over Modbus-TCP
#[derive(Parser, Debug)]
#[command(name = "axis-supervisor")]
#[command(version)]
#[command(about = "Supervises a stepper-motor axis on a PLC over Modbus-TCP")]
struct Args {
    /// Controller endpoint (host:port).
    #[arg(long, default_value = "192.168.0.10:502")]
    endpoint: SocketAddr,

    /// Modbus unit id of the controller.
    #[arg(long, default_value_t = 0)]
    unit_id: u8,

    /// First selector coil (auto; hand and e-stop follow at +1 and +2).
    #[arg(long, default_value_t = 16385)]
    selector_auto: u16,

    /// Motor pulse coil.
    #[arg(long, default_value_t = 16390)]
    motor_pulse: u16,

    /// Motor direction coil.
    #[arg(long, default_value_t = 16391)]
    motor_direction: u16,

    /// Pulses per sweep before the direction inverts.
    #[arg(long, default_value_t = 200)]
    pulses_per_sweep: u32,

    /// Pulse dwell in milliseconds (high and low hold time).
    #[arg(long, default_value_t = 10)]
    dwell_ms: u64,

    /// Extra settle delay per cycle in milliseconds.
    #[arg(long, default_value_t = 0)]
    cycle_delay_ms: u64,

    /// Per-call bus deadline in milliseconds.
    #[arg(long, default_value_t = 1000)]
    call_timeout_ms: u64,

    /// Connection attempts before giving up.
    #[arg(long, default_value_t = 3)]
    connect_attempts: u32,

    /// Consecutive failed cycles tolerated before shutting down.
    #[arg(long, default_value_t = 5)]
    max_failures: u32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("axis-supervisor v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args).await {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("axis-supervisor shutdown complete");
}

fn setup_tracing(args: &Args) {
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = SupervisorConfig {
        coils: CoilMap {
            selector_auto: args.selector_auto,
            selector_hand: args.selector_auto.wrapping_add(1),
            e_stop: args.selector_auto.wrapping_add(2),
            motor_pulse: args.motor_pulse,
            motor_direction: args.motor_direction,
        },
        pulses_per_sweep: args.pulses_per_sweep,
        pulse_dwell: Duration::from_millis(args.dwell_ms),
        cycle_delay: Duration::from_millis(args.cycle_delay_ms),
        call_timeout: Duration::from_millis(args.call_timeout_ms),
        max_consecutive_failures: args.max_failures,
    };
    let connect = ConnectConfig {
        endpoint: args.endpoint,
        unit_id: args.unit_id,
        attempts: args.connect_attempts,
        ..ConnectConfig::default()
    };

    let bus = connect_with_retry(&connect, config.call_timeout).await?;
    let mut supervisor = Supervisor::new(bus, config)?;
    info!("entering control loop");

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            let _ = stop_tx.send(true);
        }
    });

    let result = supervisor.run(&stop_rx).await;
    supervisor.into_bus().disconnect().await;
    result?;
    Ok(())
}
