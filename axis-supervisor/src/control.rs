//! The cyclic control state machine.
//!
//! Per cycle, in fixed order:
//!
//! 1. batched read of the three selector coils (auto, hand, E-stop),
//! 2. readback of the direction coil — the controller stays authoritative,
//!    so a restart or an HMI override re-synchronizes instead of resetting,
//! 3. E-stop override of the mode selectors for this cycle's decision (the
//!    raw values are still recorded for diagnostics),
//! 4. direction flip once a full sweep of pulses has accumulated, checked
//!    independently of the selected mode but held while the E-stop is
//!    asserted,
//! 5. hand-mode acknowledge write, or
//! 6. auto-mode step pulse and counter increment.
//!
//! The flip write in step 4 always precedes a pulse in the same cycle, so a
//! flip-and-pulse cycle steps in the new direction.

use tokio::sync::watch;
use tracing::{error, info, trace, warn};

use crate::bus::CoilBus;
use crate::config::SupervisorConfig;
use crate::error::{BusError, SupervisorError};
use crate::pulse::pulse;
use crate::tags::{TagId, TagRegistry};

/// Machine state that survives across cycles and E-stop holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlState {
    /// Pulses issued since the last direction flip.
    pub pulse_count: u32,
    /// Currently commanded direction. Re-read from the controller every
    /// cycle; only ever flipped by the sweep-complete check.
    pub direction: bool,
}

/// Raw input snapshot of one cycle, before the E-stop override.
#[derive(Debug, Clone, Copy)]
pub struct CycleInputs {
    /// Selector switch in auto position.
    pub auto_mode: bool,
    /// Selector switch in hand position.
    pub hand_mode: bool,
    /// Emergency stop asserted.
    pub e_stop: bool,
    /// Direction coil readback.
    pub direction: bool,
}

/// What a completed cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// One step pulse was issued.
    Pulsed,
    /// Hand mode acknowledged back to its coil.
    HandAck,
    /// E-stop held the axis; nothing was written.
    EStopHold,
    /// Neither mode selected; nothing to do.
    Idle,
}

/// The cyclic supervisor: owns the bus, the tag registry and the persisted
/// control state, and advances them one cycle at a time.
pub struct Supervisor<B> {
    bus: B,
    config: SupervisorConfig,
    registry: TagRegistry,
    state: ControlState,
    consecutive_failures: u32,
    e_stop_latched: bool,
}

impl<B: CoilBus> Supervisor<B> {
    /// Build a supervisor over an established bus connection.
    ///
    /// Validates the coil map; an aliased or non-batchable map is fatal
    /// here, before any bus traffic.
    pub fn new(bus: B, config: SupervisorConfig) -> Result<Self, SupervisorError> {
        let registry = TagRegistry::new(&config.coils)?;
        Ok(Self {
            bus,
            config,
            registry,
            state: ControlState::default(),
            consecutive_failures: 0,
            e_stop_latched: false,
        })
    }

    /// Current persisted control state.
    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Tag registry with the last-observed point values.
    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// Hand the bus back, e.g. to disconnect on shutdown.
    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Read this cycle's inputs: one batched selector read, then the
    /// direction readback. No outputs are written here.
    async fn read_inputs(&mut self) -> Result<CycleInputs, BusError> {
        let map = &self.config.coils;
        let selectors = self.bus.read_coils(map.selector_auto, 3).await?;
        let direction = self.bus.read_coils(map.motor_direction, 1).await?[0];
        Ok(CycleInputs {
            auto_mode: selectors[0],
            hand_mode: selectors[1],
            e_stop: selectors[2],
            direction,
        })
    }

    /// Execute one full cycle.
    ///
    /// On a bus failure the cycle aborts where it stands — in particular, a
    /// failed input read means no output is written at all — and the
    /// persisted state is left untouched for the next attempt.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, BusError> {
        let inputs = self.read_inputs().await?;
        trace!(?inputs, "cycle inputs");

        // Raw values recorded before any override.
        self.registry.update(TagId::SelectorAuto, inputs.auto_mode);
        self.registry.update(TagId::SelectorHand, inputs.hand_mode);
        self.registry.update(TagId::EStop, inputs.e_stop);
        self.registry.update(TagId::MotorDirection, inputs.direction);

        // The controller's direction coil is authoritative.
        self.state.direction = inputs.direction;

        if inputs.e_stop {
            if !self.e_stop_latched {
                warn!("e-stop asserted, holding axis");
                self.e_stop_latched = true;
            }
            return Ok(CycleOutcome::EStopHold);
        }
        if self.e_stop_latched {
            info!(
                direction = self.state.direction,
                pulse_count = self.state.pulse_count,
                "e-stop released, resuming"
            );
            self.e_stop_latched = false;
        }

        // Past this point the E-stop override is moot: it would have forced
        // both modes false and we would already have returned.
        let auto_mode = inputs.auto_mode;
        let hand_mode = inputs.hand_mode;

        // Sweep complete: invert and commit the direction, restart the
        // counter. Checked every cycle regardless of mode.
        if self.state.pulse_count >= self.config.pulses_per_sweep {
            self.state.direction = !self.state.direction;
            self.bus
                .write_coil(self.config.coils.motor_direction, self.state.direction)
                .await?;
            self.registry
                .update(TagId::MotorDirection, self.state.direction);
            self.state.pulse_count = 0;
            info!(direction = self.state.direction, "direction flipped after full sweep");
        }

        if hand_mode {
            // Status acknowledge back to the hand-selector coil.
            self.bus
                .write_coil(self.config.coils.selector_hand, true)
                .await?;
            return Ok(CycleOutcome::HandAck);
        }

        if auto_mode {
            pulse(
                &mut self.bus,
                self.config.coils.motor_pulse,
                self.config.pulse_dwell,
            )
            .await?;
            self.registry.update(TagId::MotorPulse, false);
            self.state.pulse_count += 1;
            trace!(pulse_count = self.state.pulse_count, "step pulse issued");
            return Ok(CycleOutcome::Pulsed);
        }

        Ok(CycleOutcome::Idle)
    }

    /// Run cycles until `shutdown` flips to true.
    ///
    /// A failed cycle is logged and retried on the next one; after
    /// `max_consecutive_failures` in a row the loop gives up with
    /// [`SupervisorError::LinkDown`] instead of spinning against a dead
    /// link. The shutdown flag is checked between cycles, never mid-cycle.
    pub async fn run(&mut self, shutdown: &watch::Receiver<bool>) -> Result<(), SupervisorError> {
        while !*shutdown.borrow() {
            match self.run_cycle().await {
                Ok(outcome) => {
                    self.consecutive_failures = 0;
                    trace!(?outcome, "cycle complete");
                }
                Err(err) => {
                    self.consecutive_failures += 1;
                    warn!(
                        consecutive = self.consecutive_failures,
                        "cycle aborted: {err}"
                    );
                    if self.consecutive_failures >= self.config.max_consecutive_failures {
                        error!(
                            "giving up after {} consecutive bus failures",
                            self.consecutive_failures
                        );
                        return Err(SupervisorError::LinkDown {
                            consecutive: self.consecutive_failures,
                            last: err,
                        });
                    }
                }
            }
            if !self.config.cycle_delay.is_zero() {
                tokio::time::sleep(self.config.cycle_delay).await;
            }
        }
        info!("shutdown requested, leaving control loop");
        Ok(())
    }
}
