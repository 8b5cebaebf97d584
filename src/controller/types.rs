use crate::controls::Decision;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Initializing,
    Running,
    ShuttingDown,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Initializing => "Initializing",
            ControllerState::Running => "Running",
            ControllerState::ShuttingDown => "ShuttingDown",
        }
    }
}

/// Commands accepted by the controller from other tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerCommand {
    /// Run a cycle now instead of waiting for the next tick
    CycleNow,
}

/// What the last completed cycle saw and did
#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    pub timestamp: String,
    pub controller_state: String,

    pub power_w: Option<f64>,
    pub power_timestamp: Option<String>,
    pub avg_w: Option<f64>,
    pub median_w: Option<f64>,
    pub samples_in_window: usize,
    pub window_capacity: usize,

    pub socket_on: bool,
    pub auto_mode: bool,
    pub manual_socket_state: Option<bool>,
    pub is_night: bool,
    pub on_threshold_w: Option<u64>,
    pub off_threshold_w: Option<u64>,

    pub decision: Option<Decision>,
    /// A switch was requested this cycle and the actuator rejected it
    pub switch_failed: bool,
    pub last_switched_at: Option<DateTime<Utc>>,
    pub stable_on_since: Option<DateTime<Utc>>,
    pub stable_off_since: Option<DateTime<Utc>>,

    pub total_cycles: u64,
    pub failed_reads: u64,
    pub failed_switches: u64,
    /// Set when the live configuration could not be used this cycle
    pub config_error: Option<String>,
}

/// Cloneable access to a running controller
#[derive(Clone)]
pub struct ControllerHandle {
    pub(crate) commands: mpsc::UnboundedSender<ControllerCommand>,
    pub(crate) snapshot: watch::Receiver<Arc<ControllerSnapshot>>,
    pub(crate) events: broadcast::Sender<String>,
}

impl ControllerHandle {
    /// Ask for an immediate cycle; false if the controller is gone
    pub fn request_cycle(&self) -> bool {
        self.commands.send(ControllerCommand::CycleNow).is_ok()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<ControllerSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Arc<ControllerSnapshot>> {
        self.snapshot.clone()
    }

    /// JSON report of every completed cycle
    pub fn subscribe_events(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }
}
