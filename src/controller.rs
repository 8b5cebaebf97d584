//! Control loop for Helios
//!
//! This module owns the long-lived control state (rolling window, debounce
//! timers, load state) and drives one cycle per sampling interval:
//! sample, smooth, decide, actuate, record, publish. Cycles never overlap and
//! shutdown is only observed between cycles.

use crate::actuator::LoadActuator;
use crate::config::ConfigStore;
use crate::controls::{ControlStateMachine, on_off};
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::power::PowerSource;
use crate::recorder::Recorder;
use crate::smoothing::Smoother;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

mod cycle;
pub mod shutdown;
mod snapshot;
mod types;

pub use shutdown::{ShutdownHandle, ShutdownSignal};
pub use types::{ControllerCommand, ControllerHandle, ControllerSnapshot, ControllerState};

/// Main controller for Helios
pub struct Controller {
    store: ConfigStore,
    power: Arc<dyn PowerSource>,
    actuator: Arc<dyn LoadActuator>,
    recorder: Arc<dyn Recorder>,

    smoother: Smoother,
    machine: ControlStateMachine,
    logger: StructuredLogger,

    state: watch::Sender<ControllerState>,
    snapshot_tx: watch::Sender<Arc<ControllerSnapshot>>,
    snapshot_rx: watch::Receiver<Arc<ControllerSnapshot>>,
    events_tx: broadcast::Sender<String>,
    commands_tx: mpsc::UnboundedSender<ControllerCommand>,
    commands_rx: mpsc::UnboundedReceiver<ControllerCommand>,

    total_cycles: u64,
    failed_reads: u64,
    failed_switches: u64,
    last_cleanup: Option<DateTime<Utc>>,
}

impl Controller {
    /// Validate the configuration and read the initial socket state.
    ///
    /// An invalid configuration is fatal. An unreadable socket is assumed OFF.
    pub async fn new(
        store: ConfigStore,
        power: Arc<dyn PowerSource>,
        actuator: Arc<dyn LoadActuator>,
        recorder: Arc<dyn Recorder>,
    ) -> Result<Self> {
        let logger = get_logger("controller");
        let config = store.get().await;
        config.validate()?;

        let thresholds = crate::thresholds::compute(&config.electrical)?;
        logger.info(&format!("Calculated ON threshold: {} W", thresholds.on_w));
        logger.info(&format!("Calculated OFF threshold: {} W", thresholds.off_w));
        logger.info(&format!("Auto mode: {}", config.control.auto_mode));

        let initially_on = match actuator.read_state().await {
            Ok(on) => on,
            Err(e) => {
                logger.warn(&format!(
                    "Could not read initial socket state, assuming OFF: {}",
                    e
                ));
                false
            }
        };
        logger.info(&format!("Initial socket state: {}", on_off(initially_on)));

        let (state, _) = watch::channel(ControllerState::Initializing);
        let initial = Arc::new(ControllerSnapshot::initial(&config, initially_on));
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);
        let (events_tx, _) = broadcast::channel::<String>(100);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        Ok(Self {
            store,
            power,
            actuator,
            recorder,
            smoother: Smoother::new(config.sampling.buffer_capacity()),
            machine: ControlStateMachine::new(initially_on),
            logger,
            state,
            snapshot_tx,
            snapshot_rx,
            events_tx,
            commands_tx,
            commands_rx,
            total_cycles: 0,
            failed_reads: 0,
            failed_switches: 0,
            last_cleanup: None,
        })
    }

    /// Cloneable handle for other tasks (web server, signal handler)
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            commands: self.commands_tx.clone(),
            snapshot: self.snapshot_rx.clone(),
            events: self.events_tx.clone(),
        }
    }

    /// Subscribe to lifecycle state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn machine(&self) -> &ControlStateMachine {
        &self.machine
    }

    pub fn smoother(&self) -> &Smoother {
        &self.smoother
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }
}
