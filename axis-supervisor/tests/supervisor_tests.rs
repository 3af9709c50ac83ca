//! End-to-end cycles against the in-process PLC simulator.
//!
//! Each test spawns its own simulator on an ephemeral port and drives real
//! Modbus-TCP round-trips through the supervisor.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axis_supervisor::bus::{connect_with_retry, CoilBus, ModbusCoilBus};
use axis_supervisor::config::{ConnectConfig, SupervisorConfig};
use axis_supervisor::control::{CycleOutcome, Supervisor};
use axis_supervisor::simulator::{spawn_tcp_simulator, AxisPanel, Simulator};
use axis_supervisor::tags::{CoilMap, TagId};

fn test_config() -> SupervisorConfig {
    SupervisorConfig {
        pulse_dwell: Duration::from_millis(1),
        ..SupervisorConfig::default()
    }
}

async fn start_panel(map: &CoilMap) -> (Arc<Mutex<AxisPanel>>, SocketAddr) {
    let simulator = Simulator::new(AxisPanel::new(map));
    let panel = simulator.panel();
    let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let (addr, _server) = spawn_tcp_simulator(bind, simulator).await.unwrap();
    (panel, addr)
}

async fn connect(endpoint: SocketAddr) -> ModbusCoilBus {
    let connect = ConnectConfig {
        endpoint,
        unit_id: 0,
        attempts: 3,
        backoff: Duration::from_millis(50),
    };
    connect_with_retry(&connect, Duration::from_secs(1))
        .await
        .unwrap()
}

#[tokio::test]
async fn batched_selector_read_maps_addresses() {
    let map = CoilMap::default();
    let (panel, addr) = start_panel(&map).await;
    let mut bus = connect(addr).await;
    panel.lock().unwrap().set(TagId::EStop, true);

    // Logical 16385..=16387 map to protocol 16384..=16386 on the device.
    let bits = bus.read_coils(map.selector_auto, 3).await.unwrap();
    assert_eq!(bits, vec![false, false, true]);
}

#[tokio::test]
async fn read_outside_the_defined_bank_is_an_error() {
    let map = CoilMap::default();
    let (_panel, addr) = start_panel(&map).await;
    let mut bus = connect(addr).await;

    // Logical 16388 falls into the gap between e-stop and motor pulse.
    assert!(bus.read_coils(16388, 1).await.is_err());
}

#[tokio::test]
async fn auto_mode_steps_are_counted_by_the_device() {
    let map = CoilMap::default();
    let (panel, addr) = start_panel(&map).await;
    let bus = connect(addr).await;
    panel.lock().unwrap().set(TagId::SelectorAuto, true);

    let mut supervisor = Supervisor::new(bus, test_config()).unwrap();
    for _ in 0..5 {
        assert_eq!(supervisor.run_cycle().await.unwrap(), CycleOutcome::Pulsed);
    }

    let panel = panel.lock().unwrap();
    assert_eq!(panel.step_edges(), 5);
    assert!(!panel.get(TagId::MotorPulse)); // every pulse ends low
    assert_eq!(supervisor.state().pulse_count, 5);
}

#[tokio::test]
async fn e_stop_freezes_the_device() {
    let map = CoilMap::default();
    let (panel, addr) = start_panel(&map).await;
    let bus = connect(addr).await;
    {
        let mut panel = panel.lock().unwrap();
        panel.set(TagId::SelectorAuto, true);
        panel.set(TagId::EStop, true);
    }

    let mut supervisor = Supervisor::new(bus, test_config()).unwrap();
    for _ in 0..3 {
        assert_eq!(
            supervisor.run_cycle().await.unwrap(),
            CycleOutcome::EStopHold
        );
    }

    let panel = panel.lock().unwrap();
    assert_eq!(panel.step_edges(), 0);
    assert!(!panel.get(TagId::MotorDirection));
}

#[tokio::test]
async fn e_stop_release_resumes_in_auto() {
    let map = CoilMap::default();
    let (panel, addr) = start_panel(&map).await;
    let bus = connect(addr).await;
    {
        let mut panel = panel.lock().unwrap();
        panel.set(TagId::SelectorAuto, true);
        panel.set(TagId::EStop, true);
    }

    let mut supervisor = Supervisor::new(bus, test_config()).unwrap();
    assert_eq!(
        supervisor.run_cycle().await.unwrap(),
        CycleOutcome::EStopHold
    );

    panel.lock().unwrap().set(TagId::EStop, false);
    assert_eq!(supervisor.run_cycle().await.unwrap(), CycleOutcome::Pulsed);
    assert_eq!(panel.lock().unwrap().step_edges(), 1);
}

#[tokio::test]
async fn direction_flip_is_committed_to_the_device() {
    let map = CoilMap::default();
    let (panel, addr) = start_panel(&map).await;
    let bus = connect(addr).await;
    panel.lock().unwrap().set(TagId::SelectorAuto, true);

    let config = SupervisorConfig {
        pulses_per_sweep: 3,
        ..test_config()
    };
    let mut supervisor = Supervisor::new(bus, config).unwrap();
    // Three pulses complete the sweep; the fourth cycle flips, then pulses.
    for _ in 0..4 {
        assert_eq!(supervisor.run_cycle().await.unwrap(), CycleOutcome::Pulsed);
    }

    let panel = panel.lock().unwrap();
    assert!(panel.get(TagId::MotorDirection));
    assert_eq!(panel.step_edges(), 4);
    assert_eq!(supervisor.state().pulse_count, 1);
    assert!(supervisor.state().direction);
}

#[tokio::test]
async fn hand_mode_acknowledge_reaches_the_device() {
    let map = CoilMap::default();
    let (panel, addr) = start_panel(&map).await;
    let bus = connect(addr).await;
    panel.lock().unwrap().set(TagId::SelectorHand, true);

    let mut supervisor = Supervisor::new(bus, test_config()).unwrap();
    assert_eq!(supervisor.run_cycle().await.unwrap(), CycleOutcome::HandAck);

    let panel = panel.lock().unwrap();
    assert!(panel.get(TagId::SelectorHand));
    assert_eq!(panel.step_edges(), 0);
}

#[tokio::test]
async fn restart_resumes_from_the_device_direction() {
    let map = CoilMap::default();
    let (panel, addr) = start_panel(&map).await;
    let bus = connect(addr).await;
    panel.lock().unwrap().set(TagId::SelectorAuto, true);

    let config = SupervisorConfig {
        pulses_per_sweep: 2,
        ..test_config()
    };
    let mut supervisor = Supervisor::new(bus, config.clone()).unwrap();
    // Two pulses, then the flip cycle: the device coil ends up true.
    for _ in 0..3 {
        supervisor.run_cycle().await.unwrap();
    }
    assert!(supervisor.state().direction);
    supervisor.into_bus().disconnect().await;

    // A fresh supervisor starts with direction=false but re-synchronizes to
    // the controller's coil on its first cycle, even with no mode selected.
    panel.lock().unwrap().set(TagId::SelectorAuto, false);
    let bus = connect(addr).await;
    let mut supervisor = Supervisor::new(bus, config).unwrap();
    assert!(!supervisor.state().direction);
    assert_eq!(supervisor.run_cycle().await.unwrap(), CycleOutcome::Idle);
    assert!(supervisor.state().direction);
    assert_eq!(supervisor.state().pulse_count, 0);
}
