use super::*;

impl Default for ElectricalConfig {
    fn default() -> Self {
        Self {
            grid_voltage_v: 230.0,
            max_current_a: 10.0,
            safety_margin: 0.9,
            hysteresis: 0.15,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            window_s: 300,
            sample_interval_s: 30,
            require_stable_on_s: 120,
            require_stable_off_s: 180,
            min_on_time_s: 600,
        }
    }
}

impl Default for NightConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start: "22:00".to_string(),
            end: "06:00".to_string(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            auto_mode: true,
            manual_socket_state: None,
        }
    }
}

impl Default for SolarEdgeConfig {
    fn default() -> Self {
        Self {
            url: "https://monitoringapi.solaredge.com/site/0/overview".to_string(),
            api_key: String::new(),
            timeout_s: 10.0,
        }
    }
}

impl Default for HueConfig {
    fn default() -> Self {
        Self {
            url: "https://192.168.1.2/clip/v2/resource/light/00000000-0000-0000-0000-000000000000"
                .to_string(),
            app_key: String::new(),
            timeout_s: 5.0,
            verify_tls: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: String::new(),
            backup_count: 5,
            console_output: true,
            json_format: false,
            csv_log_file: "solar_log.csv".to_string(),
            csv_retention_days: 30,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5050,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            electrical: ElectricalConfig::default(),
            sampling: SamplingConfig::default(),
            night_mode: NightConfig::default(),
            control: ControlConfig::default(),
            solaredge: SolarEdgeConfig::default(),
            hue: HueConfig::default(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
            timezone: "UTC".to_string(),
        }
    }
}
