//! # Helios - solar-surplus smart socket controller
//!
//! Switches a smart socket on when rooftop solar production can carry the
//! connected load and off again when it cannot, without flapping on passing
//! clouds.
//!
//! ## Architecture
//!
//! - `smoothing`: rolling window mean/median of the power signal
//! - `thresholds`: ON/OFF thresholds from electrical parameters
//! - `night`: night window evaluation in the configured timezone
//! - `controls`: the switching state machine (hysteresis, debounce, dwell)
//! - `power`: power source trait and the SolarEdge client
//! - `actuator`: load actuator trait and the Hue smart plug client
//! - `recorder`: per-cycle CSV recording and retention
//! - `controller`: the control loop tying the above together
//! - `config`: YAML configuration, validation, dotted-path updates
//! - `logging`: structured logging and tracing
//! - `web`: HTTP status and administration API

pub mod actuator;
pub mod config;
pub mod controller;
pub mod controls;
pub mod error;
pub mod logging;
pub mod night;
pub mod power;
pub mod recorder;
pub mod smoothing;
pub mod thresholds;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use controller::Controller;
pub use error::{HeliosError, Result};
