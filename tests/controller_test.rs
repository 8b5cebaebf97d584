mod common;

use common::{FakeSocket, Harness, at, test_config};
use helios::controller::shutdown;
use helios::controls::{Decision, HoldReason, SwitchReason};
use serde_json::Value;
use std::time::Duration;

#[tokio::test]
async fn surplus_switches_on_after_stable_period() {
    let h = Harness::new(test_config(), FakeSocket::starting(false));
    let mut ctl = h.controller().await;

    for (t, w) in [(0, 2100.0), (10, 2200.0), (20, 2050.0)] {
        h.power.push(w);
        let snap = ctl.run_cycle(at(t)).await;
        assert!(!snap.socket_on, "t={t}");
        assert_eq!(
            snap.decision,
            Some(Decision::Hold {
                reason: HoldReason::StabilizingOn
            })
        );
        assert_eq!(snap.stable_on_since, Some(at(0)));
    }
    assert!(h.socket.requests().is_empty());

    h.power.push(2100.0);
    let snap = ctl.run_cycle(at(30)).await;
    assert_eq!(
        snap.decision,
        Some(Decision::Switch {
            target: true,
            reason: SwitchReason::SurplusStable
        })
    );
    assert!(snap.socket_on);
    assert_eq!(snap.last_switched_at, Some(at(30)));
    assert!(snap.stable_on_since.is_none());
    assert_eq!(h.socket.requests(), vec![true]);
    assert_eq!(snap.on_threshold_w, Some(2000));
    assert_eq!(snap.off_threshold_w, Some(1750));
}

#[tokio::test]
async fn failed_switch_keeps_stability_and_retries() {
    let h = Harness::new(test_config(), FakeSocket::starting(false));
    let mut ctl = h.controller().await;
    h.socket.fail_next(1);

    for t in [0, 10, 20] {
        h.power.push(2500.0);
        ctl.run_cycle(at(t)).await;
    }
    h.power.push(2500.0);
    let snap = ctl.run_cycle(at(30)).await;
    assert!(snap.switch_failed);
    assert!(!snap.socket_on);
    assert_eq!(snap.stable_on_since, Some(at(0)));
    assert_eq!(snap.failed_switches, 1);

    h.power.push(2500.0);
    let snap = ctl.run_cycle(at(40)).await;
    assert!(!snap.switch_failed);
    assert!(snap.socket_on);
    assert_eq!(h.socket.requests(), vec![true, true]);
}

#[tokio::test]
async fn missing_sample_holds_without_recording() {
    let h = Harness::new(test_config(), FakeSocket::starting(false));
    let mut ctl = h.controller().await;

    h.power.push(2500.0);
    ctl.run_cycle(at(0)).await;
    h.power.push_failure();
    let snap = ctl.run_cycle(at(10)).await;

    assert_eq!(
        snap.decision,
        Some(Decision::Hold {
            reason: HoldReason::NoSample
        })
    );
    assert!(snap.power_w.is_none());
    assert_eq!(snap.failed_reads, 1);
    assert_eq!(snap.stable_on_since, Some(at(0)));
    assert_eq!(snap.samples_in_window, 1);
    assert_eq!(h.recorder.rows().len(), 1);
}

#[tokio::test]
async fn manual_override_applies_once() {
    let mut cfg = test_config();
    cfg.control.auto_mode = false;
    cfg.control.manual_socket_state = Some(true);
    let h = Harness::new(cfg, FakeSocket::starting(false));
    let mut ctl = h.controller().await;

    for t in 0..5 {
        h.power.push(0.0);
        ctl.run_cycle(at(t * 10)).await;
    }
    assert_eq!(h.socket.requests(), vec![true]);
    assert!(h.socket.is_on());

    let rows = h.recorder.rows();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.socket_on && !r.auto_mode));
}

#[tokio::test]
async fn hot_reload_applies_on_next_cycle() {
    let h = Harness::new(test_config(), FakeSocket::starting(true));
    let mut ctl = h.controller().await;

    h.power.push(3000.0);
    let snap = ctl.run_cycle(at(0)).await;
    assert!(snap.socket_on);

    h.store
        .update(&[
            ("control.auto_mode".to_string(), Value::Bool(false)),
            ("control.manual_socket_state".to_string(), Value::Bool(false)),
        ])
        .await
        .unwrap();

    h.power.push(3000.0);
    let snap = ctl.run_cycle(at(10)).await;
    assert!(!snap.socket_on);
    assert!(!snap.auto_mode);
    assert_eq!(h.socket.requests(), vec![false]);
}

#[tokio::test]
async fn window_resizes_when_interval_changes() {
    let h = Harness::new(test_config(), FakeSocket::starting(false));
    let mut ctl = h.controller().await;
    for t in 0..10 {
        h.power.push(100.0 * t as f64);
        ctl.run_cycle(at(t * 10)).await;
    }
    assert_eq!(ctl.smoother().window().len(), 10);

    h.store
        .update(&[("sampling.sample_interval_s".to_string(), Value::from(60))])
        .await
        .unwrap();
    h.power.push(1000.0);
    let snap = ctl.run_cycle(at(100)).await;
    assert_eq!(snap.window_capacity, 5);
    assert_eq!(snap.samples_in_window, 5);
    // 600, 700, 800, 900, 1000
    assert_eq!(snap.avg_w, Some(800.0));
}

#[tokio::test]
async fn unreadable_socket_is_assumed_off() {
    let h = Harness::new(test_config(), FakeSocket::unreadable());
    let ctl = h.controller().await;
    assert!(!ctl.machine().load_state().is_on);
    assert!(!ctl.handle().snapshot().socket_on);
}

#[tokio::test]
async fn invalid_config_is_fatal_at_startup() {
    let mut cfg = test_config();
    cfg.electrical.safety_margin = 0.0;
    let h = Harness::new(cfg, FakeSocket::starting(false));
    let result = helios::Controller::new(
        h.store.clone(),
        h.power.clone(),
        h.socket.clone(),
        h.recorder.clone(),
    )
    .await;
    match result {
        Err(e) => assert!(e.is_configuration()),
        Ok(_) => panic!("invalid configuration accepted"),
    }
}

#[tokio::test]
async fn cleanup_runs_once_per_day() {
    let mut cfg = test_config();
    cfg.logging.csv_retention_days = 7;
    let h = Harness::new(cfg, FakeSocket::starting(false));
    let mut ctl = h.controller().await;

    h.power.push(0.0);
    ctl.run_cycle(at(0)).await;
    h.power.push(0.0);
    ctl.run_cycle(at(3_600)).await;
    h.power.push(0.0);
    ctl.run_cycle(at(86_400)).await;

    assert_eq!(*h.recorder.cleanups.lock().unwrap(), vec![7, 7]);
}

#[tokio::test]
async fn cycle_reports_are_broadcast() {
    let h = Harness::new(test_config(), FakeSocket::starting(false));
    let mut ctl = h.controller().await;
    let mut events = ctl.handle().subscribe_events();

    h.power.push(1234.0);
    ctl.run_cycle(at(0)).await;

    let payload = events.recv().await.unwrap();
    let v: Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(v["power_w"], 1234.0);
    assert_eq!(v["total_cycles"], 1);
    assert_eq!(v["decision"]["action"], "hold");
}

#[tokio::test]
async fn run_loop_cycles_and_stops_on_shutdown() {
    let mut cfg = test_config();
    cfg.sampling.sample_interval_s = 1;
    cfg.sampling.window_s = 10;
    let h = Harness::new(cfg, FakeSocket::starting(false));
    for _ in 0..50 {
        h.power.push(500.0);
    }
    let mut ctl = h.controller().await;
    let handle = ctl.handle();
    let mut snapshots = handle.watch_snapshot();
    let (trigger, signal) = shutdown::channel();

    let task = tokio::spawn(async move {
        ctl.run(signal).await.unwrap();
        ctl.total_cycles()
    });

    // First tick fires immediately
    tokio::time::timeout(Duration::from_secs(5), snapshots.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(handle.request_cycle());
    tokio::time::timeout(Duration::from_secs(5), snapshots.changed())
        .await
        .unwrap()
        .unwrap();

    trigger.trigger();
    let cycles = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(cycles >= 2);
    assert_eq!(handle.snapshot().controller_state, "ShuttingDown");
}
