use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::bus::LogicalAddress;
use crate::tags::AddressConflictError;

/// Failure of a single coil read or write on the Modbus link.
#[derive(Debug, Error)]
pub enum BusError {
    /// Transport-level failure (reset connection, broken framing, ...).
    #[error("modbus transport error: {0}")]
    Transport(#[from] tokio_modbus::Error),

    /// The controller answered with a Modbus exception code.
    #[error("modbus exception: {0}")]
    Exception(tokio_modbus::Exception),

    /// The call did not complete within the configured per-call deadline.
    #[error("bus call timed out after {0:?}")]
    Timeout(Duration),

    /// The controller returned fewer bits than requested.
    #[error("short read at coil {address}: requested {requested}, got {got}")]
    ShortRead {
        /// Logical (1-based) start address of the read.
        address: LogicalAddress,
        /// Requested coil count.
        requested: u16,
        /// Bits actually returned.
        got: usize,
    },

    /// Logical coil numbers are 1-based; zero cannot be translated.
    #[error("invalid logical coil address 0")]
    InvalidAddress,
}

/// Fatal supervisor failures.
///
/// Anything that reaches this level terminates the process: the loop never
/// runs without a live connection and a validated coil map, and it refuses
/// to spin forever against a dead link.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The initial connection could not be established.
    #[error("failed to connect to {endpoint} after {attempts} attempt(s)")]
    Connection {
        /// Controller endpoint.
        endpoint: SocketAddr,
        /// Attempts made before giving up.
        attempts: u32,
        /// Last connect failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Coil map validation failed at startup.
    #[error(transparent)]
    AddressConflict(#[from] AddressConflictError),

    /// Too many consecutive cycles failed on the bus.
    #[error("modbus link down after {consecutive} consecutive cycle failures")]
    LinkDown {
        /// Failed cycles in a row.
        consecutive: u32,
        /// The failure that tipped the count over.
        #[source]
        last: BusError,
    },
}
