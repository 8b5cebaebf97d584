#![no_main]
use chrono::NaiveTime;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let secs = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) % 86_400;
    let Some(now) = NaiveTime::from_num_seconds_from_midnight_opt(secs, 0) else {
        return;
    };
    let text = String::from_utf8_lossy(&data[4..]);
    let (start, end) = text.split_once('|').unwrap_or((text.as_ref(), "06:00"));

    if let Ok(window) = helios::night::NightWindow::parse(start, end) {
        let inside = window.contains(now);
        if window.start == window.end {
            assert!(inside);
        }
        if !window.wraps_midnight() {
            assert_eq!(inside, window.start <= now && now < window.end);
        }
    }
});
