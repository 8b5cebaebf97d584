use super::{Controller, ControllerSnapshot, ControllerState};
use crate::config::{Config, ControlConfig};
use crate::controls::Decision;
use crate::power::PowerReading;
use crate::smoothing::SmoothedPower;
use crate::thresholds::Thresholds;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Everything a cycle learned, before it is folded into a snapshot
pub(super) struct CycleOutcome {
    pub now: DateTime<Utc>,
    pub auto_mode: bool,
    pub manual_socket_state: Option<bool>,
    pub reading: Option<PowerReading>,
    pub smoothed: Option<SmoothedPower>,
    pub thresholds: Option<Thresholds>,
    pub night: bool,
    pub decision: Option<Decision>,
    pub switch_failed: bool,
    pub config_error: Option<String>,
}

impl CycleOutcome {
    pub fn new(now: DateTime<Utc>, control: &ControlConfig) -> Self {
        Self {
            now,
            auto_mode: control.auto_mode,
            manual_socket_state: control.manual_socket_state,
            reading: None,
            smoothed: None,
            thresholds: None,
            night: false,
            decision: None,
            switch_failed: false,
            config_error: None,
        }
    }
}

impl ControllerSnapshot {
    /// Snapshot published before the first cycle completes
    pub fn initial(config: &Config, socket_on: bool) -> Self {
        let thresholds = crate::thresholds::compute(&config.electrical).ok();
        Self {
            timestamp: Utc::now().to_rfc3339(),
            controller_state: ControllerState::Initializing.as_str().to_string(),
            power_w: None,
            power_timestamp: None,
            avg_w: None,
            median_w: None,
            samples_in_window: 0,
            window_capacity: config.sampling.buffer_capacity(),
            socket_on,
            auto_mode: config.control.auto_mode,
            manual_socket_state: config.control.manual_socket_state,
            is_night: false,
            on_threshold_w: thresholds.map(|t| t.on_w),
            off_threshold_w: thresholds.map(|t| t.off_w),
            decision: None,
            switch_failed: false,
            last_switched_at: None,
            stable_on_since: None,
            stable_off_since: None,
            total_cycles: 0,
            failed_reads: 0,
            failed_switches: 0,
            config_error: None,
        }
    }
}

impl Controller {
    fn build_snapshot(&self, outcome: CycleOutcome) -> ControllerSnapshot {
        let load = self.machine.load_state();
        let timers = self.machine.timers();
        let window = self.smoother.window();
        ControllerSnapshot {
            timestamp: outcome.now.to_rfc3339(),
            controller_state: self.state.borrow().as_str().to_string(),
            power_w: outcome.reading.as_ref().map(|r| r.power_w),
            power_timestamp: outcome.reading.and_then(|r| r.timestamp),
            avg_w: outcome.smoothed.map(|s| s.mean_w),
            median_w: outcome.smoothed.map(|s| s.median_w),
            samples_in_window: window.len(),
            window_capacity: window.capacity(),
            socket_on: load.is_on,
            auto_mode: outcome.auto_mode,
            manual_socket_state: outcome.manual_socket_state,
            is_night: outcome.night,
            on_threshold_w: outcome.thresholds.map(|t| t.on_w),
            off_threshold_w: outcome.thresholds.map(|t| t.off_w),
            decision: outcome.decision,
            switch_failed: outcome.switch_failed,
            last_switched_at: load.last_switched_at,
            stable_on_since: timers.stable_on_since,
            stable_off_since: timers.stable_off_since,
            total_cycles: self.total_cycles,
            failed_reads: self.failed_reads,
            failed_switches: self.failed_switches,
            config_error: outcome.config_error,
        }
    }

    /// Store the snapshot for readers and broadcast it as a JSON event
    pub(super) fn publish(&self, outcome: CycleOutcome) -> Arc<ControllerSnapshot> {
        let snap = Arc::new(self.build_snapshot(outcome));
        self.snapshot_tx.send_replace(snap.clone());
        match serde_json::to_string(&*snap) {
            Ok(json) => {
                // No subscribers is not an error
                let _ = self.events_tx.send(json);
            }
            Err(e) => self
                .logger
                .warn(&format!("Failed to serialize cycle report: {}", e)),
        }
        snap
    }
}
