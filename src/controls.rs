//! Socket control state machine for Helios
//!
//! Decides, once per cycle, whether the load should be switched. Branches are
//! evaluated in a fixed order and the first applicable one wins:
//!
//! 1. manual override (`auto_mode == false`)
//! 2. night cutoff
//! 3. automatic ON, only while the load is off
//! 4. automatic OFF, only while the load is on
//!
//! Automatic switching requires the smoothed power to hold past a threshold
//! for a configured time. A single cycle that breaks the condition resets the
//! timer to empty. The machine never performs I/O: the caller actuates a
//! [`Decision::Switch`] and reports success through [`ControlStateMachine::commit`].
//! A failed actuation is simply not committed, so the next cycle retries with
//! the accumulated stability intact.
//!
//! The manual and night branches clear both debounce timers on every cycle
//! they handle, whether or not a switch is requested and before any
//! actuation. The automatic branches never run while either applies, so the
//! timers only matter again after a return to automatic daytime control, and
//! from there stability is accumulated from scratch.

use crate::config::{ControlConfig, SamplingConfig};
use crate::logging::{StructuredLogger, get_logger};
use crate::thresholds::Thresholds;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// Physical state of the load as last confirmed by a successful actuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct LoadState {
    pub is_on: bool,
    pub last_switched_at: Option<DateTime<Utc>>,
}

/// Anti-flapping timers; each is empty whenever its condition does not hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct DebounceTimers {
    pub stable_on_since: Option<DateTime<Utc>>,
    pub stable_off_since: Option<DateTime<Utc>>,
}

impl DebounceTimers {
    pub fn clear(&mut self) {
        self.stable_on_since = None;
        self.stable_off_since = None;
    }

    pub fn is_empty(&self) -> bool {
        self.stable_on_since.is_none() && self.stable_off_since.is_none()
    }
}

/// Why a switch was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    ManualOverride,
    NightCutoff,
    SurplusStable,
    SurplusLost,
}

impl SwitchReason {
    pub fn describe(&self) -> &'static str {
        match self {
            SwitchReason::ManualOverride => "manual control",
            SwitchReason::NightCutoff => "night mode",
            SwitchReason::SurplusStable => "surplus stable",
            SwitchReason::SurplusLost => "surplus lost",
        }
    }
}

/// Why the load is left as it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    /// Manual mode and the load already matches the target
    ManualInSync,
    /// Manual mode without a target state
    ManualNoTarget,
    /// Night window active and the load is off
    Night,
    /// No power sample this cycle
    NoSample,
    /// Load off, power below the ON threshold
    BelowOnThreshold,
    /// Load off, power high but not for long enough yet
    StabilizingOn,
    /// Load on, still inside the minimum on-time
    MinOnTime,
    /// Load on, power above the OFF threshold
    AboveOffThreshold,
    /// Load on, power low but not for long enough yet
    StabilizingOff,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Hold { reason: HoldReason },
    Switch { target: bool, reason: SwitchReason },
}

impl Decision {
    pub fn target(&self) -> Option<bool> {
        match self {
            Decision::Switch { target, .. } => Some(*target),
            Decision::Hold { .. } => None,
        }
    }

    fn hold(reason: HoldReason) -> Self {
        Decision::Hold { reason }
    }

    fn switch(target: bool, reason: SwitchReason) -> Self {
        Decision::Switch { target, reason }
    }
}

/// Everything one evaluation looks at besides the machine's own state
#[derive(Debug, Clone, Copy)]
pub struct ControlInputs<'a> {
    /// Smoothed (mean) power; `None` when no sample arrived this cycle
    pub avg_power_w: Option<f64>,
    pub thresholds: Thresholds,
    pub night: bool,
    pub control: &'a ControlConfig,
    pub sampling: &'a SamplingConfig,
    pub now: DateTime<Utc>,
}

/// Load state plus debounce timers, persisting across cycles
pub struct ControlStateMachine {
    load: LoadState,
    timers: DebounceTimers,
    logger: StructuredLogger,
}

fn secs(s: u64) -> TimeDelta {
    TimeDelta::seconds(i64::try_from(s).unwrap_or(i64::MAX).min(i64::MAX / 1000))
}

impl ControlStateMachine {
    /// Start from a known load state (as read from the actuator at startup)
    pub fn new(initially_on: bool) -> Self {
        Self {
            load: LoadState {
                is_on: initially_on,
                last_switched_at: None,
            },
            timers: DebounceTimers::default(),
            logger: get_logger("controls"),
        }
    }

    pub fn load_state(&self) -> LoadState {
        self.load
    }

    pub fn timers(&self) -> DebounceTimers {
        self.timers
    }

    /// Decide this cycle's action, advancing or resetting the timers
    pub fn evaluate(&mut self, inputs: &ControlInputs<'_>) -> Decision {
        let ctl = inputs.control;

        if !ctl.auto_mode {
            // Automatic tracking is suspended; stability must be re-earned later
            self.timers.clear();
            return match ctl.manual_socket_state {
                Some(target) if target != self.load.is_on => {
                    Decision::switch(target, SwitchReason::ManualOverride)
                }
                Some(_) => Decision::hold(HoldReason::ManualInSync),
                None => Decision::hold(HoldReason::ManualNoTarget),
            };
        }

        if inputs.night {
            self.timers.clear();
            return if self.load.is_on {
                Decision::switch(false, SwitchReason::NightCutoff)
            } else {
                Decision::hold(HoldReason::Night)
            };
        }

        let Some(avg) = inputs.avg_power_w else {
            return Decision::hold(HoldReason::NoSample);
        };

        if self.load.is_on {
            self.evaluate_off(avg, inputs)
        } else {
            self.evaluate_on(avg, inputs)
        }
    }

    fn evaluate_on(&mut self, avg: f64, inputs: &ControlInputs<'_>) -> Decision {
        if avg < inputs.thresholds.on_watts() {
            if self.timers.stable_on_since.take().is_some() {
                self.logger
                    .debug(&format!("Surplus dropped to {:.0}W, ON timer reset", avg));
            }
            return Decision::hold(HoldReason::BelowOnThreshold);
        }

        let since = *self.timers.stable_on_since.get_or_insert(inputs.now);
        if inputs.now - since >= secs(inputs.sampling.require_stable_on_s) {
            Decision::switch(true, SwitchReason::SurplusStable)
        } else {
            Decision::hold(HoldReason::StabilizingOn)
        }
    }

    fn evaluate_off(&mut self, avg: f64, inputs: &ControlInputs<'_>) -> Decision {
        let can_turn_off = match self.load.last_switched_at {
            None => true,
            Some(at) => inputs.now - at >= secs(inputs.sampling.min_on_time_s),
        };

        if !can_turn_off {
            self.timers.stable_off_since = None;
            return Decision::hold(HoldReason::MinOnTime);
        }
        if avg > inputs.thresholds.off_watts() {
            self.timers.stable_off_since = None;
            return Decision::hold(HoldReason::AboveOffThreshold);
        }

        let since = *self.timers.stable_off_since.get_or_insert(inputs.now);
        if inputs.now - since >= secs(inputs.sampling.require_stable_off_s) {
            Decision::switch(false, SwitchReason::SurplusLost)
        } else {
            Decision::hold(HoldReason::StabilizingOff)
        }
    }

    /// Record a successful actuation to `is_on` at `at`.
    ///
    /// Both timers are cleared: no stability survives a state change.
    pub fn commit(&mut self, is_on: bool, at: DateTime<Utc>) {
        self.load = LoadState {
            is_on,
            last_switched_at: Some(at),
        };
        self.timers.clear();
    }
}

pub(crate) fn on_off(v: bool) -> &'static str {
    if v { "ON" } else { "OFF" }
}
