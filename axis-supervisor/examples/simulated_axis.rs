/// Supervisor running against the in-process PLC simulator.
///
/// Run with: `cargo run --example simulated-axis --features simulator`
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use axis_supervisor::bus::connect_with_retry;
use axis_supervisor::config::{ConnectConfig, SupervisorConfig};
use axis_supervisor::control::Supervisor;
use axis_supervisor::simulator::{spawn_tcp_simulator, AxisPanel, Simulator};
use axis_supervisor::tags::{CoilMap, TagId};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let map = CoilMap::default();
    let simulator = Simulator::new(AxisPanel::new(&map));
    let panel = simulator.panel();
    let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let (addr, _server) = spawn_tcp_simulator(bind, simulator).await.unwrap();
    println!("simulated controller listening on {addr}");

    // Flip the panel into auto mode, as an operator would.
    panel.lock().unwrap().set(TagId::SelectorAuto, true);

    let connect = ConnectConfig {
        endpoint: addr,
        ..ConnectConfig::default()
    };
    let config = SupervisorConfig {
        pulses_per_sweep: 10,
        pulse_dwell: Duration::from_millis(10),
        ..SupervisorConfig::default()
    };
    let bus = connect_with_retry(&connect, config.call_timeout).await.unwrap();
    let mut supervisor = Supervisor::new(bus, config).unwrap();

    // Two full sweeps: the direction bit inverts after every 10 pulses.
    for cycle in 1..=25 {
        let outcome = supervisor.run_cycle().await.unwrap();
        let panel = panel.lock().unwrap();
        println!(
            "cycle {cycle:>2}: {outcome:?}, device steps={}, direction={}",
            panel.step_edges(),
            panel.get(TagId::MotorDirection),
        );
    }
}
