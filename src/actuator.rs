//! Load actuator integration for Helios
//!
//! The socket is driven through the [`LoadActuator`] trait. The production
//! implementation talks to a Philips Hue bridge over the CLIP v2 API.

use crate::config::{ConfigStore, HueConfig};
use crate::controls::on_off;
use crate::error::{HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::power::request_timeout;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{Value, json};

const APP_KEY_HEADER: &str = "hue-application-key";

/// A switchable load
#[async_trait::async_trait]
pub trait LoadActuator: Send + Sync {
    /// Current on/off state as reported by the device
    async fn read_state(&self) -> Result<bool>;

    /// Request a state change; `Ok` means the device acknowledged it
    async fn set_state(&self, on: bool) -> Result<()>;
}

/// Hue bridge smart plug client
pub struct HueSocketClient {
    store: ConfigStore,
    logger: StructuredLogger,
}

impl HueSocketClient {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store,
            logger: get_logger("hue"),
        }
    }

    fn http(cfg: &HueConfig) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(request_timeout(cfg.timeout_s)?)
            .danger_accept_invalid_certs(!cfg.verify_tls)
            .build()?)
    }

    async fn get_on(&self, cfg: &HueConfig) -> Result<bool> {
        let resp = Self::http(cfg)?
            .get(&cfg.url)
            .header(APP_KEY_HEADER, &cfg.app_key)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(HeliosError::api(format!("Hue bridge returned HTTP {}", status)));
        }
        let body: Value = resp.json().await?;
        parse_on_state(&body)
    }

    async fn put_on(&self, cfg: &HueConfig, on: bool) -> Result<()> {
        let resp = Self::http(cfg)?
            .put(&cfg.url)
            .header(APP_KEY_HEADER, &cfg.app_key)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&json!({ "on": { "on": on } }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(HeliosError::api(format!("Hue bridge returned HTTP {}", status)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LoadActuator for HueSocketClient {
    async fn read_state(&self) -> Result<bool> {
        let cfg = self.store.get().await.hue;
        self.get_on(&cfg).await.inspect_err(|e| {
            self.logger.warn(&format!("Hue state read failed: {}", e));
        })
    }

    async fn set_state(&self, on: bool) -> Result<()> {
        let cfg = self.store.get().await.hue;
        match self.put_on(&cfg, on).await {
            Ok(()) => {
                self.logger.info(&format!("Socket switched {}", on_off(on)));
                Ok(())
            }
            Err(e) => {
                self.logger.error(&format!("Hue switch failed: {}", e));
                Err(e)
            }
        }
    }
}

/// Read `data[0].on.on` from a CLIP v2 resource body
pub fn parse_on_state(body: &Value) -> Result<bool> {
    body.get("data")
        .and_then(|d| d.get(0))
        .and_then(|r| r.get("on"))
        .and_then(|o| o.get("on"))
        .and_then(Value::as_bool)
        .ok_or_else(|| HeliosError::api("Hue response lacks data[0].on.on"))
}
