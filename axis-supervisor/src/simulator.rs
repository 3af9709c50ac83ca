use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use futures::future;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_modbus::{server, Exception, Request, Response};
use tokio_modbus::{Address, Quantity};

use crate::tags::{CoilMap, TagId};

/// Raw coil space of the simulated controller, keyed by protocol (0-based)
/// address.
#[derive(Debug, Clone, Default)]
pub struct CoilBank(HashMap<Address, bool>);

impl CoilBank {
    /// Define `cnt` consecutive coils starting at `addr`, all initially off.
    pub fn insert(&mut self, addr: Address, cnt: Quantity) {
        for i in 0..cnt {
            self.0.insert(addr + i, false);
        }
    }

    /// Read `cnt` consecutive coils starting at `addr`.
    pub fn read(&self, addr: Address, cnt: Quantity) -> Result<Vec<bool>, std::io::Error> {
        let mut bits = vec![false; cnt.into()];
        for i in 0..cnt {
            let coil_addr = addr + i;
            if let Some(value) = self.0.get(&coil_addr) {
                bits[i as usize] = *value;
            } else {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    format!("no coil at address {coil_addr}"),
                ));
            }
        }
        Ok(bits)
    }

    /// Write one existing coil.
    pub fn write(&mut self, addr: Address, value: bool) -> Result<(), std::io::Error> {
        if let Some(coil) = self.0.get_mut(&addr) {
            *coil = value;
            Ok(())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("no coil at address {addr}"),
            ))
        }
    }
}

/// Simulated operator panel and stepper driver behind the coil map.
///
/// Counts rising edges on the motor-pulse coil the way the real stepper
/// driver counts steps, so tests can assert exact pulse counts. Addresses in
/// the map must be valid (1-based); build the map through
/// [`crate::tags::TagRegistry::new`] validation first.
#[derive(Debug, Clone)]
pub struct AxisPanel {
    coils: CoilBank,
    map: CoilMap,
    step_edges: u64,
    last_pulse_level: bool,
}

impl AxisPanel {
    /// Panel with all coils of the map defined and off.
    pub fn new(map: &CoilMap) -> Self {
        let mut coils = CoilBank::default();
        coils.insert(map.selector_auto - 1, 3);
        coils.insert(map.motor_pulse - 1, 1);
        coils.insert(map.motor_direction - 1, 1);
        Self {
            coils,
            map: *map,
            step_edges: 0,
            last_pulse_level: false,
        }
    }

    /// Operator action: flip a panel coil from outside the served link.
    pub fn set(&mut self, id: TagId, value: bool) {
        self.coils.0.insert(self.map.address_of(id) - 1, value);
    }

    /// Current level of a panel coil.
    pub fn get(&self, id: TagId) -> bool {
        self.coils
            .0
            .get(&(self.map.address_of(id) - 1))
            .copied()
            .unwrap_or(false)
    }

    /// Steps the simulated driver has seen (rising edges on the pulse coil).
    pub fn step_edges(&self) -> u64 {
        self.step_edges
    }

    fn apply_write(&mut self, addr: Address, value: bool) -> Result<(), std::io::Error> {
        let pulse_coil = self.map.motor_pulse - 1;
        if addr == pulse_coil {
            if value && !self.last_pulse_level {
                self.step_edges += 1;
            }
            self.last_pulse_level = value;
        }
        self.coils.write(addr, value)
    }

    fn service_call(&mut self, req: Request) -> future::Ready<Result<Response, Exception>> {
        match req {
            Request::ReadCoils(addr, cnt) => match self.coils.read(addr, cnt) {
                Ok(bits) => future::ready(Ok(Response::ReadCoils(bits))),
                Err(_) => future::ready(Err(Exception::IllegalDataAddress)),
            },
            Request::WriteSingleCoil(addr, value) => match self.apply_write(addr, value) {
                Ok(()) => future::ready(Ok(Response::WriteSingleCoil(addr, value))),
                Err(_) => future::ready(Err(Exception::IllegalDataAddress)),
            },
            _ => future::ready(Err(Exception::IllegalFunction)),
        }
    }
}

/// Wrapper around [`AxisPanel`] needed because of
/// [tokio_modbus::server::Service](https://docs.rs/tokio-modbus/latest/tokio_modbus/server/trait.Service.html).
#[derive(Debug, Clone)]
pub struct Simulator(pub Arc<Mutex<AxisPanel>>);

impl Simulator {
    pub fn new(panel: AxisPanel) -> Self {
        Self(Arc::new(Mutex::new(panel)))
    }

    /// Handle for poking the panel while the server runs.
    pub fn panel(&self) -> Arc<Mutex<AxisPanel>> {
        self.0.clone()
    }
}

impl tokio_modbus::server::Service for Simulator {
    type Request = Request<'static>;
    type Future = future::Ready<Result<Response, Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let panel = &mut self.0.lock().unwrap();
        panel.service_call(req)
    }
}

async fn run_tcp_server_context(listener: TcpListener, simulator: Simulator) {
    let server = server::tcp::Server::new(listener);
    let new_service = |_socket_addr| Ok(Some(simulator.clone()));
    let on_connected = |stream, socket_addr| async move {
        server::tcp::accept_tcp_connection(stream, socket_addr, new_service)
    };
    let on_process_error = |err| {
        tracing::warn!("simulator: {err}");
    };
    let _ = server.serve(&on_connected, on_process_error).await;
}

/// Bind `socket_addr` (port 0 for an ephemeral port) and serve the panel
/// forever. Returns the bound address and the server task handle.
pub async fn spawn_tcp_simulator(
    socket_addr: SocketAddr,
    simulator: Simulator,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(socket_addr).await?;
    let local_addr = listener.local_addr()?;
    let handle = tokio::spawn(run_tcp_server_context(listener, simulator));
    Ok((local_addr, handle))
}
