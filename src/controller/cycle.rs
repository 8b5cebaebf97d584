use super::snapshot::CycleOutcome;
use super::{Controller, ControllerCommand, ControllerSnapshot, ControllerState, ShutdownSignal};
use crate::config::Config;
use crate::controls::{ControlInputs, Decision, on_off};
use crate::error::Result;
use crate::night;
use crate::recorder::RecordedEntry;
use crate::smoothing::PowerSample;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use std::sync::Arc;
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior, interval_at};

fn ticker(start: Instant, period_s: u64) -> Interval {
    let period = Duration::from_secs(period_s.max(1));
    let mut t = interval_at(start, period);
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    t
}

/// Cycle timestamp rendered in the configured timezone
fn local_timestamp(now: DateTime<Utc>, timezone: &str) -> String {
    match night::parse_timezone(timezone) {
        Ok(tz) => now
            .with_timezone(&tz)
            .to_rfc3339_opts(SecondsFormat::Secs, false),
        Err(_) => now.to_rfc3339_opts(SecondsFormat::Secs, false),
    }
}

impl Controller {
    /// Run cycles until `shutdown` fires.
    ///
    /// The first cycle runs immediately. A cycle that has started always
    /// completes before shutdown is honoured.
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> Result<()> {
        self.logger.info("Starting control loop");
        self.state.send_replace(ControllerState::Running);

        let mut period_s = self.store.get().await.sampling.sample_interval_s.max(1);
        let mut ticks = ticker(Instant::now(), period_s);

        loop {
            if shutdown.is_triggered() {
                self.logger.info("Shutdown signal received");
                break;
            }
            tokio::select! {
                _ = ticks.tick() => {
                    self.run_cycle(Utc::now()).await;
                }
                Some(cmd) = self.commands_rx.recv() => {
                    match cmd {
                        ControllerCommand::CycleNow => {
                            self.logger.debug("Immediate cycle requested");
                            self.run_cycle(Utc::now()).await;
                        }
                    }
                }
                _ = shutdown.wait() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }

            let configured = self.store.get().await.sampling.sample_interval_s.max(1);
            if configured != period_s {
                self.logger.info(&format!(
                    "Sample interval changed from {}s to {}s",
                    period_s, configured
                ));
                period_s = configured;
                ticks = ticker(Instant::now() + Duration::from_secs(period_s), period_s);
            }
        }

        self.state.send_replace(ControllerState::ShuttingDown);
        self.snapshot_tx.send_modify(|snap| {
            let mut updated = (**snap).clone();
            updated.controller_state = ControllerState::ShuttingDown.as_str().to_string();
            *snap = Arc::new(updated);
        });
        self.logger.info("Control loop stopped");
        Ok(())
    }

    /// Execute one full cycle at `now` and publish its snapshot
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Arc<ControllerSnapshot> {
        let log = self.logger.with_field("cycle", self.total_cycles + 1);
        let config = self.store.get().await;
        self.smoother.resize(config.sampling.buffer_capacity());
        self.maybe_cleanup(&config, now);

        let mut outcome = CycleOutcome::new(now, &config.control);

        let reading = match self.power.read().await {
            Ok(r) => Some(r),
            Err(e) => {
                self.failed_reads = self.failed_reads.saturating_add(1);
                log.warn(&format!("No power sample this cycle: {}", e));
                None
            }
        };
        outcome.smoothed = reading.as_ref().map(|r| {
            self.smoother.observe(PowerSample {
                value_w: r.power_w,
                observed_at: now,
            })
        });
        outcome.reading = reading;

        let evaluated = crate::thresholds::compute(&config.electrical).and_then(|t| {
            Ok((
                t,
                night::is_night_at(now, &config.night_mode, &config.timezone)?,
            ))
        });

        match evaluated {
            Err(e) => {
                log.error(&format!(
                    "Invalid configuration, holding current state: {}",
                    e
                ));
                outcome.config_error = Some(e.to_string());
            }
            Ok((thresholds, is_night)) => {
                outcome.thresholds = Some(thresholds);
                outcome.night = is_night;
                let decision = self.machine.evaluate(&ControlInputs {
                    avg_power_w: outcome.smoothed.map(|s| s.mean_w),
                    thresholds,
                    night: is_night,
                    control: &config.control,
                    sampling: &config.sampling,
                    now,
                });
                if let Decision::Switch { target, reason } = decision {
                    outcome.switch_failed = !self.actuate(target, reason.describe(), now).await;
                }
                outcome.decision = Some(decision);
            }
        }

        if let (Some(r), Some(s)) = (&outcome.reading, &outcome.smoothed) {
            let socket_on = self.machine.load_state().is_on;
            self.recorder.append(&RecordedEntry {
                timestamp: local_timestamp(now, &config.timezone),
                power_w: r.power_w,
                avg_w: s.mean_w,
                median_w: s.median_w,
                socket_on,
                auto_mode: config.control.auto_mode,
            });
            log.info(&format!(
                "Power={:.0}W | avg={:.0}W | median={:.0}W | socket={} | auto={}",
                r.power_w,
                s.mean_w,
                s.median_w,
                on_off(socket_on),
                on_off(config.control.auto_mode)
            ));
        }

        self.total_cycles = self.total_cycles.saturating_add(1);
        self.publish(outcome)
    }

    /// Drive the actuator; only a successful call is committed
    async fn actuate(&mut self, target: bool, why: &str, now: DateTime<Utc>) -> bool {
        self.logger
            .info(&format!("Turning socket {} ({})", on_off(target), why));
        match self.actuator.set_state(target).await {
            Ok(()) => {
                self.machine.commit(target, now);
                true
            }
            Err(e) => {
                self.failed_switches = self.failed_switches.saturating_add(1);
                self.logger.error(&format!(
                    "Switch {} failed, retrying next cycle: {}",
                    on_off(target),
                    e
                ));
                false
            }
        }
    }

    /// Retention cleanup, at most once per day of uptime
    fn maybe_cleanup(&mut self, config: &Config, now: DateTime<Utc>) {
        let retention = config.logging.csv_retention_days;
        if retention == 0 {
            return;
        }
        let due = self
            .last_cleanup
            .is_none_or(|last| now - last >= TimeDelta::days(1));
        if !due {
            return;
        }
        self.last_cleanup = Some(now);
        match self.recorder.cleanup(retention) {
            Ok(0) => self.logger.debug("CSV cleanup found nothing to remove"),
            Ok(n) => self
                .logger
                .info(&format!("CSV cleanup removed {} rows", n)),
            Err(e) => self.logger.warn(&format!("CSV cleanup failed: {}", e)),
        }
    }
}
