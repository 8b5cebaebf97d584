//! ON/OFF power thresholds derived from the electrical configuration.
//!
//! `on  = floor(voltage * current * safety_margin)`
//! `off = floor(on * (1 - hysteresis))`
//!
//! Recomputed every cycle; both are whole watts and `off <= on` always holds.

use crate::config::ElectricalConfig;
use crate::error::{HeliosError, Result};
use serde::Serialize;

/// Switching thresholds in whole watts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    pub on_w: u64,
    pub off_w: u64,
}

impl Thresholds {
    pub fn on_watts(&self) -> f64 {
        self.on_w as f64
    }

    pub fn off_watts(&self) -> f64 {
        self.off_w as f64
    }
}

/// Compute thresholds, rejecting parameters that cannot describe a real load
pub fn compute(cfg: &ElectricalConfig) -> Result<Thresholds> {
    if !(cfg.grid_voltage_v.is_finite() && cfg.grid_voltage_v > 0.0) {
        return Err(HeliosError::validation(
            "electrical.grid_voltage_v",
            "Must be positive",
        ));
    }
    if !(cfg.max_current_a.is_finite() && cfg.max_current_a > 0.0) {
        return Err(HeliosError::validation(
            "electrical.max_current_a",
            "Must be positive",
        ));
    }
    if !(cfg.safety_margin > 0.0 && cfg.safety_margin <= 1.0) {
        return Err(HeliosError::validation(
            "electrical.safety_margin",
            "Must be in (0, 1]",
        ));
    }
    if !(cfg.hysteresis >= 0.0 && cfg.hysteresis < 1.0) {
        return Err(HeliosError::validation(
            "electrical.hysteresis",
            "Must be in [0, 1)",
        ));
    }

    let on = (cfg.grid_voltage_v * cfg.max_current_a * cfg.safety_margin).floor();
    let off = (on * (1.0 - cfg.hysteresis)).floor();

    // Float-to-int casts saturate; inputs are finite and positive here
    Ok(Thresholds {
        on_w: on as u64,
        off_w: (off as u64).min(on as u64),
    })
}
