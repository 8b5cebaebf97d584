//! Per-cycle CSV recording
//!
//! One row per cycle that obtained a power sample. Recording is best effort:
//! write failures are logged and never reach the control loop.

use crate::error::{HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const CSV_HEADER: &str = "timestamp,power_w,avg_w,median_w,socket_on,auto_mode";

/// One recorded cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RecordedEntry {
    pub timestamp: String,
    pub power_w: f64,
    pub avg_w: f64,
    pub median_w: f64,
    pub socket_on: bool,
    pub auto_mode: bool,
}

impl RecordedEntry {
    fn to_row(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.timestamp, self.power_w, self.avg_w, self.median_w, self.socket_on, self.auto_mode
        )
    }

    fn from_row(line: &str) -> Self {
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        let num = |i: usize| {
            cells
                .get(i)
                .and_then(|c| c.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(0.0)
        };
        let flag = |i: usize, default: bool| {
            cells
                .get(i)
                .filter(|c| !c.is_empty())
                .map(|c| c.eq_ignore_ascii_case("true") || *c == "1")
                .unwrap_or(default)
        };
        Self {
            timestamp: cells.first().map(|s| s.to_string()).unwrap_or_default(),
            power_w: num(1),
            avg_w: num(2),
            median_w: num(3),
            socket_on: flag(4, false),
            auto_mode: flag(5, true),
        }
    }
}

/// Parse a recorded timestamp; offset-less values are taken as UTC
pub fn parse_row_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let v = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(v, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Sink for cycle records
pub trait Recorder: Send + Sync {
    /// Append one row; failures are logged, not returned
    fn append(&self, entry: &RecordedEntry);

    /// The last `limit` rows, oldest first
    fn recent(&self, limit: usize) -> Result<Vec<RecordedEntry>>;

    /// Drop rows older than `retention_days`; returns how many were removed
    fn cleanup(&self, retention_days: u32) -> Result<usize>;
}

/// CSV file recorder
pub struct CsvRecorder {
    path: PathBuf,
    lock: Mutex<()>,
    logger: StructuredLogger,
}

impl CsvRecorder {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            logger: get_logger("recorder"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the file with its header if it does not exist yet
    pub fn ensure_header(&self) -> Result<()> {
        let _g = self.guard();
        self.ensure_header_locked()
    }

    fn ensure_header_locked(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{}\n", CSV_HEADER))?;
        self.logger
            .info(&format!("Created CSV log {}", self.path.display()));
        Ok(())
    }

    fn try_append(&self, entry: &RecordedEntry) -> Result<()> {
        let _g = self.guard();
        self.ensure_header_locked()?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", entry.to_row())?;
        Ok(())
    }

    /// [`Recorder::cleanup`] relative to a given instant
    pub fn cleanup_at(&self, retention_days: u32, now: DateTime<Utc>) -> Result<usize> {
        if retention_days == 0 {
            return Ok(0);
        }
        let _g = self.guard();
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        // A cutoff before the representable range means nothing is old enough
        let Some(cutoff) = TimeDelta::try_days(i64::from(retention_days))
            .and_then(|d| now.checked_sub_signed(d))
        else {
            return Ok(0);
        };
        let mut lines = contents.lines();
        let header = lines.next().unwrap_or(CSV_HEADER);
        let mut kept = vec![header];
        let mut removed = 0usize;
        for line in lines.filter(|l| !l.trim().is_empty()) {
            let ts = line.split(',').next().and_then(parse_row_timestamp);
            match ts {
                Some(ts) if ts < cutoff => removed += 1,
                _ => kept.push(line),
            }
        }

        if removed > 0 {
            let mut body = kept.join("\n");
            body.push('\n');
            let tmp = self.path.with_extension("csv.tmp");
            fs::write(&tmp, body)
                .and_then(|_| fs::rename(&tmp, &self.path))
                .map_err(|e| {
                    HeliosError::persistence(format!(
                        "Failed to rewrite {}: {}",
                        self.path.display(),
                        e
                    ))
                })?;
            self.logger.info(&format!(
                "Removed {} CSV rows older than {} days",
                removed, retention_days
            ));
        }
        Ok(removed)
    }
}

impl Recorder for CsvRecorder {
    fn append(&self, entry: &RecordedEntry) {
        if let Err(e) = self.try_append(entry) {
            self.logger.error(&format!("Error writing to CSV: {}", e));
        }
    }

    fn recent(&self, limit: usize) -> Result<Vec<RecordedEntry>> {
        let _g = self.guard();
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let rows: Vec<&str> = contents
            .lines()
            .skip(1)
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = rows.len().saturating_sub(limit);
        Ok(rows[start..].iter().map(|l| RecordedEntry::from_row(l)).collect())
    }

    fn cleanup(&self, retention_days: u32) -> Result<usize> {
        self.cleanup_at(retention_days, Utc::now())
    }
}
