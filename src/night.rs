//! Night window evaluation.
//!
//! The window is `[start, end)` in local time of the configured timezone.
//! When `start >= end` the window crosses midnight.

use crate::config::NightConfig;
use crate::error::{HeliosError, Result};
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;

/// Parse `HH:MM` (or `HH:MM:SS`)
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    let v = value.trim();
    NaiveTime::parse_from_str(v, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(v, "%H:%M:%S"))
        .map_err(|_| {
            HeliosError::validation("night_mode".to_string(), format!("Malformed time '{}'", value))
        })
}

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| HeliosError::validation("timezone".to_string(), format!("Unknown timezone '{}'", name)))
}

/// A parsed night window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl NightWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self {
            start: parse_time_of_day(start)?,
            end: parse_time_of_day(end)?,
        })
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start >= self.end
    }

    /// Start inclusive, end exclusive
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start < self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

/// Whether `time_of_day` falls in the configured window; false when disabled
pub fn is_night(time_of_day: NaiveTime, cfg: &NightConfig) -> Result<bool> {
    if !cfg.enabled {
        return Ok(false);
    }
    Ok(NightWindow::parse(&cfg.start, &cfg.end)?.contains(time_of_day))
}

/// [`is_night`] for an absolute instant, evaluated in `timezone`
pub fn is_night_at(now: DateTime<Utc>, cfg: &NightConfig, timezone: &str) -> Result<bool> {
    if !cfg.enabled {
        return Ok(false);
    }
    let tz = parse_timezone(timezone)?;
    is_night(now.with_timezone(&tz).time(), cfg)
}
