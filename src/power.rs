//! Power source integration for Helios
//!
//! The control loop only sees the [`PowerSource`] trait. The production
//! implementation polls the SolarEdge monitoring API site overview.

use crate::config::{ConfigStore, SolarEdgeConfig};
use crate::error::{HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::Value;
use std::time::Duration;

/// One reading of instantaneous production
#[derive(Debug, Clone, PartialEq)]
pub struct PowerReading {
    /// Current production in watts
    pub power_w: f64,
    /// Source-side timestamp of the measurement, if reported
    pub timestamp: Option<String>,
}

/// Anything that can report current solar production
#[async_trait::async_trait]
pub trait PowerSource: Send + Sync {
    async fn read(&self) -> Result<PowerReading>;
}

/// SolarEdge monitoring API client
///
/// Endpoint, key and timeout are taken from the live configuration on every
/// request so edits made through the web API apply on the next cycle.
pub struct SolarEdgeClient {
    store: ConfigStore,
    logger: StructuredLogger,
}

impl SolarEdgeClient {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store,
            logger: get_logger("solaredge"),
        }
    }

    async fn fetch(&self, cfg: &SolarEdgeConfig) -> Result<PowerReading> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout(cfg.timeout_s)?)
            .build()?;
        let resp = client
            .get(&cfg.url)
            .query(&[("api_key", cfg.api_key.as_str())])
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("helios/", env!("CARGO_PKG_VERSION")))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(HeliosError::api(format!("SolarEdge returned HTTP {}", status)));
        }

        let body: Value = resp.json().await?;
        parse_overview(&body)
    }
}

#[async_trait::async_trait]
impl PowerSource for SolarEdgeClient {
    async fn read(&self) -> Result<PowerReading> {
        let cfg = self.store.get().await.solaredge;
        match self.fetch(&cfg).await {
            Ok(reading) => {
                self.logger.debug(&format!(
                    "Read {:.0}W (updated {})",
                    reading.power_w,
                    reading.timestamp.as_deref().unwrap_or("unknown")
                ));
                Ok(reading)
            }
            Err(e) => {
                self.logger.warn(&format!("SolarEdge read failed: {}", e));
                Err(e)
            }
        }
    }
}

/// Convert a configured timeout in seconds
pub(crate) fn request_timeout(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| HeliosError::config(format!("Invalid request timeout {}", secs)))
}

/// Extract `overview.currentPower.power` and `overview.lastUpdateTime`
pub fn parse_overview(body: &Value) -> Result<PowerReading> {
    let overview = body
        .get("overview")
        .ok_or_else(|| HeliosError::api("SolarEdge response lacks 'overview'"))?;

    let power_w = overview
        .get("currentPower")
        .and_then(|c| c.get("power"))
        .and_then(Value::as_f64)
        .ok_or_else(|| HeliosError::api("SolarEdge response lacks numeric currentPower.power"))?;

    if !power_w.is_finite() {
        return Err(HeliosError::api("SolarEdge reported a non-finite power value"));
    }

    let timestamp = overview
        .get("lastUpdateTime")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(PowerReading { power_w, timestamp })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_overview_body() {
        let body = json!({
            "overview": {
                "lastUpdateTime": "2024-06-01 12:00:00",
                "currentPower": { "power": 2345.5 }
            }
        });
        let r = parse_overview(&body).unwrap();
        assert_eq!(r.power_w, 2345.5);
        assert_eq!(r.timestamp.as_deref(), Some("2024-06-01 12:00:00"));
    }

    #[test]
    fn integer_power_and_missing_timestamp() {
        let body = json!({ "overview": { "currentPower": { "power": 0 } } });
        let r = parse_overview(&body).unwrap();
        assert_eq!(r.power_w, 0.0);
        assert!(r.timestamp.is_none());
    }

    #[test]
    fn malformed_bodies_are_transient_errors() {
        for body in [
            json!({}),
            json!({ "overview": {} }),
            json!({ "overview": { "currentPower": { "power": null } } }),
            json!({ "overview": { "currentPower": { "power": "lots" } } }),
        ] {
            let err = parse_overview(&body).unwrap_err();
            assert!(err.is_transient(), "{body}");
        }
    }
}
