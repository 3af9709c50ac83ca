use std::net::SocketAddr;
use std::time::Duration;

use crate::tags::CoilMap;

/// All supervisor tunables as named options.
///
/// Defaults match the reference installation: 200 pulses per sweep, 10 ms
/// pulse dwell, no extra cycle pacing.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Coil address map (logical, 1-based).
    pub coils: CoilMap,
    /// Pulses per sweep before the direction bit inverts.
    pub pulses_per_sweep: u32,
    /// High and low hold time of one step pulse. Both edges must dwell long
    /// enough for the controller's input scan to sample them.
    pub pulse_dwell: Duration,
    /// Extra settle delay appended to every cycle. Zero paces the loop by
    /// the pulse timing alone.
    pub cycle_delay: Duration,
    /// Deadline for each individual coil read or write.
    pub call_timeout: Duration,
    /// Consecutive failed cycles tolerated before the link counts as dead.
    pub max_consecutive_failures: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            coils: CoilMap::default(),
            pulses_per_sweep: 200,
            pulse_dwell: Duration::from_millis(10),
            cycle_delay: Duration::ZERO,
            call_timeout: Duration::from_secs(1),
            max_consecutive_failures: 5,
        }
    }
}

/// Connection establishment policy.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Controller endpoint.
    pub endpoint: SocketAddr,
    /// Modbus unit id of the controller.
    pub unit_id: u8,
    /// Connection attempts before giving up.
    pub attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for ConnectConfig {
    /// Endpoint of the reference Click PLC installation.
    fn default() -> Self {
        Self {
            endpoint: SocketAddr::from(([192, 168, 0, 10], 502)),
            unit_id: 0,
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}
