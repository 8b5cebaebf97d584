#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use helios::actuator::LoadActuator;
use helios::config::{Config, ConfigStore};
use helios::power::{PowerReading, PowerSource};
use helios::recorder::{RecordedEntry, Recorder};
use helios::{HeliosError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Config with ON = 2000 W, OFF = 1750 W, 10 s cadence, no night window
pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.electrical.grid_voltage_v = 200.0;
    cfg.electrical.max_current_a = 10.0;
    cfg.electrical.safety_margin = 1.0;
    cfg.electrical.hysteresis = 0.125;
    cfg.sampling.window_s = 300;
    cfg.sampling.sample_interval_s = 10;
    cfg.sampling.require_stable_on_s = 30;
    cfg.sampling.require_stable_off_s = 30;
    cfg.sampling.min_on_time_s = 0;
    cfg.night_mode.enabled = false;
    cfg.logging.csv_retention_days = 0;
    cfg
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_717_243_200 + secs, 0).unwrap()
}

/// Serves queued readings; an empty queue is a read failure
#[derive(Default)]
pub struct FakePower {
    queue: Mutex<VecDeque<Result<f64>>>,
}

impl FakePower {
    pub fn push(&self, watts: f64) {
        self.queue.lock().unwrap().push_back(Ok(watts));
    }

    pub fn push_failure(&self) {
        self.queue
            .lock()
            .unwrap()
            .push_back(Err(HeliosError::network("connection refused")));
    }
}

#[async_trait::async_trait]
impl PowerSource for FakePower {
    async fn read(&self) -> Result<PowerReading> {
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(Ok(power_w)) => Ok(PowerReading {
                power_w,
                timestamp: Some("2024-06-01 12:00:00".to_string()),
            }),
            Some(Err(e)) => Err(e),
            None => Err(HeliosError::timeout("no reading queued")),
        }
    }
}

/// Records every switch request; can be told to fail
#[derive(Default)]
pub struct FakeSocket {
    pub on: Mutex<bool>,
    pub fail_reads: Mutex<bool>,
    pub fail_next_switches: Mutex<u32>,
    pub requests: Mutex<Vec<bool>>,
}

impl FakeSocket {
    pub fn starting(on: bool) -> Self {
        let s = Self::default();
        *s.on.lock().unwrap() = on;
        s
    }

    pub fn unreadable() -> Self {
        let s = Self::default();
        *s.fail_reads.lock().unwrap() = true;
        s
    }

    pub fn fail_next(&self, n: u32) {
        *self.fail_next_switches.lock().unwrap() = n;
    }

    pub fn requests(&self) -> Vec<bool> {
        self.requests.lock().unwrap().clone()
    }

    pub fn is_on(&self) -> bool {
        *self.on.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl LoadActuator for FakeSocket {
    async fn read_state(&self) -> Result<bool> {
        if *self.fail_reads.lock().unwrap() {
            return Err(HeliosError::network("bridge unreachable"));
        }
        Ok(*self.on.lock().unwrap())
    }

    async fn set_state(&self, on: bool) -> Result<()> {
        self.requests.lock().unwrap().push(on);
        let mut remaining = self.fail_next_switches.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(HeliosError::api("Hue bridge returned HTTP 503"));
        }
        *self.on.lock().unwrap() = on;
        Ok(())
    }
}

/// In-memory recorder
#[derive(Default)]
pub struct MemoryRecorder {
    pub rows: Mutex<Vec<RecordedEntry>>,
    pub cleanups: Mutex<Vec<u32>>,
}

impl MemoryRecorder {
    pub fn rows(&self) -> Vec<RecordedEntry> {
        self.rows.lock().unwrap().clone()
    }
}

impl Recorder for MemoryRecorder {
    fn append(&self, entry: &RecordedEntry) {
        self.rows.lock().unwrap().push(entry.clone());
    }

    fn recent(&self, limit: usize) -> Result<Vec<RecordedEntry>> {
        let rows = self.rows.lock().unwrap();
        let start = rows.len().saturating_sub(limit);
        Ok(rows[start..].to_vec())
    }

    fn cleanup(&self, retention_days: u32) -> Result<usize> {
        self.cleanups.lock().unwrap().push(retention_days);
        Ok(0)
    }
}

pub struct Harness {
    pub store: ConfigStore,
    pub power: Arc<FakePower>,
    pub socket: Arc<FakeSocket>,
    pub recorder: Arc<MemoryRecorder>,
}

impl Harness {
    pub fn new(config: Config, socket: FakeSocket) -> Self {
        Self {
            store: ConfigStore::new(config, None),
            power: Arc::new(FakePower::default()),
            socket: Arc::new(socket),
            recorder: Arc::new(MemoryRecorder::default()),
        }
    }

    pub async fn controller(&self) -> helios::Controller {
        helios::Controller::new(
            self.store.clone(),
            self.power.clone(),
            self.socket.clone(),
            self.recorder.clone(),
        )
        .await
        .unwrap()
    }
}
