use std::time::Duration;

use tokio::time::sleep;

use crate::bus::{CoilBus, LogicalAddress};
use crate::error::BusError;

/// Emit one step pulse on `address`: assert, hold, deassert, hold.
///
/// The two dwell intervals are equal and elapse in-line — the caller does
/// not proceed until both transitions are committed on the bus. Overlapping
/// pulses or a truncated low time are mis-steps the software cannot detect,
/// so the dwell is a hardware timing contract, not a convenience sleep.
///
/// A failure between the edges can leave the coil asserted; the caller's
/// escalation policy covers that case.
pub async fn pulse(
    bus: &mut dyn CoilBus,
    address: LogicalAddress,
    dwell: Duration,
) -> Result<(), BusError> {
    bus.write_coil(address, true).await?;
    sleep(dwell).await;
    bus.write_coil(address, false).await?;
    sleep(dwell).await;
    Ok(())
}
