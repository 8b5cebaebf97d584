#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = serde_yaml::from_str::<helios::Config>(text) else {
        return;
    };

    // Anything that validates must yield usable thresholds and a night window
    if config.validate().is_ok() {
        let t = helios::thresholds::compute(&config.electrical).unwrap();
        assert!(t.off_w <= t.on_w);
        assert!(config.sampling.buffer_capacity() >= 1);
        helios::night::NightWindow::parse(&config.night_mode.start, &config.night_mode.end)
            .unwrap();
    }
});
