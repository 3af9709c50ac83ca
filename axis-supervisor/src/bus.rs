use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tokio_modbus::client::{tcp::connect_slave, Client, Context, Reader, Writer};
use tokio_modbus::slave::Slave;
use tracing::{info, warn};

use crate::config::ConnectConfig;
use crate::error::{BusError, SupervisorError};

/// Logical, 1-based coil number as printed in the controller's address map.
pub type LogicalAddress = u16;

/// Translate a logical 1-based coil number to its 0-based protocol address.
pub fn protocol_address(logical: LogicalAddress) -> Result<tokio_modbus::Address, BusError> {
    logical.checked_sub(1).ok_or(BusError::InvalidAddress)
}

/// Boolean I/O primitives against the controller's coil space.
///
/// Addresses are logical (1-based); implementations own the off-by-one
/// translation. Every failure surfaces as a [`BusError`] — the control loop
/// decides whether to retry the cycle or escalate.
#[async_trait]
pub trait CoilBus: Send {
    /// Read `count` consecutive coils starting at `address`, returned in
    /// ascending address order with exactly `count` entries.
    async fn read_coils(
        &mut self,
        address: LogicalAddress,
        count: u16,
    ) -> Result<Vec<bool>, BusError>;

    /// Write a single coil.
    async fn write_coil(&mut self, address: LogicalAddress, value: bool) -> Result<(), BusError>;
}

/// [`CoilBus`] over a live tokio-modbus TCP connection.
///
/// Imposes a per-call deadline so a dead link shows up as a
/// [`BusError::Timeout`] instead of blocking the cycle forever.
pub struct ModbusCoilBus {
    ctx: Context,
    call_timeout: Duration,
}

impl ModbusCoilBus {
    /// Wrap an established connection.
    pub fn new(ctx: Context, call_timeout: Duration) -> Self {
        Self { ctx, call_timeout }
    }

    /// Close the underlying connection. Teardown failures are only logged;
    /// nothing depends on them.
    pub async fn disconnect(mut self) {
        if let Err(err) = self.ctx.disconnect().await {
            tracing::debug!("disconnect: {err}");
        }
    }
}

#[async_trait]
impl CoilBus for ModbusCoilBus {
    async fn read_coils(
        &mut self,
        address: LogicalAddress,
        count: u16,
    ) -> Result<Vec<bool>, BusError> {
        let proto = protocol_address(address)?;
        let response = timeout(self.call_timeout, self.ctx.read_coils(proto, count))
            .await
            .map_err(|_| BusError::Timeout(self.call_timeout))?;
        let bits = response?.map_err(BusError::Exception)?;
        if bits.len() < count as usize {
            return Err(BusError::ShortRead {
                address,
                requested: count,
                got: bits.len(),
            });
        }
        // Servers may pad the payload up to a byte boundary.
        Ok(bits[..count as usize].to_vec())
    }

    async fn write_coil(&mut self, address: LogicalAddress, value: bool) -> Result<(), BusError> {
        let proto = protocol_address(address)?;
        let response = timeout(self.call_timeout, self.ctx.write_single_coil(proto, value))
            .await
            .map_err(|_| BusError::Timeout(self.call_timeout))?;
        response?.map_err(BusError::Exception)?;
        Ok(())
    }
}

/// Connect to the controller, retrying per the configured policy.
///
/// Each attempt is bounded by `call_timeout`; exhausting all attempts is
/// fatal ([`SupervisorError::Connection`]) — the loop never starts against
/// a dead endpoint.
pub async fn connect_with_retry(
    connect: &ConnectConfig,
    call_timeout: Duration,
) -> Result<ModbusCoilBus, SupervisorError> {
    let mut last: Option<Box<dyn std::error::Error + Send + Sync>> = None;

    for attempt in 1..=connect.attempts {
        info!(endpoint = %connect.endpoint, attempt, "connecting to controller");
        let slave = Slave(connect.unit_id);
        match timeout(call_timeout, connect_slave(connect.endpoint, slave)).await {
            Ok(Ok(ctx)) => {
                info!(endpoint = %connect.endpoint, "connected");
                return Ok(ModbusCoilBus::new(ctx, call_timeout));
            }
            Ok(Err(err)) => {
                warn!(attempt, "connect failed: {err}");
                last = Some(err.into());
            }
            Err(_) => {
                warn!(attempt, "connect timed out after {call_timeout:?}");
                last = Some(Box::new(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connection attempt timed out",
                )));
            }
        }
        if attempt < connect.attempts {
            sleep(connect.backoff).await;
        }
    }

    Err(SupervisorError::Connection {
        endpoint: connect.endpoint,
        attempts: connect.attempts,
        source: last.unwrap_or_else(|| "no connection attempts configured".into()),
    })
}
