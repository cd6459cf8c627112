use std::time::Duration;

use thiserror::Error;

use crate::alarm::{AlarmPolicy, Comparator};
use crate::report::PayloadFormat;
use crate::sampling::SamplingPolicy;

// Hardware wiring (original board layout).
pub const DHT_GPIO: i32 = 17;
pub const ALARM_LED_GPIO: i32 = 32;
pub const BUZZER_GPIO: i32 = 25;
pub const I2C_SDA_GPIO: i32 = 21;
pub const I2C_SCL_GPIO: i32 = 22;

pub const SHT31_I2C_ADDR: u8 = 0x44;
pub const I2C_BAUDRATE_ESP32: u32 = 100_000;
pub const BUZZER_TONE_HZ: u32 = 2_000;

// Provisioning access point, exposed only when stored credentials fail.
pub const PROVISIONING_AP_SSID: &str = "VitalTrackSetup";
pub const PROVISIONING_AP_PASS: &str = "password";
pub const PROVISIONING_PORTAL_TIMEOUT: Duration = Duration::from_secs(180);
pub const RESTART_GRACE: Duration = Duration::from_secs(3);

// Pacing. One blocking pause per loop iteration, nothing runs in between.
pub const LOOP_DELAY: Duration = Duration::from_millis(5_000);
pub const RECONNECT_PAUSE: Duration = Duration::from_millis(100);
pub const SENSOR_FAILURE_BACKOFF: Duration = Duration::from_millis(5_000);
pub const INTER_SAMPLE_PAUSE: Duration = Duration::from_millis(200);
pub const SAMPLES_PER_READING: u8 = 5;

pub const WIFI_CONNECT_ATTEMPTS: u32 = 5;
pub const WIFI_RETRY_DELAY: Duration = Duration::from_secs(3);
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub const TIMESTAMP_PATTERN: &str = "%Y-%m-%d %H:%M:%S";
pub const TIMEZONE: &str = match option_env!("VITALTRACK_TIMEZONE") {
    Some(tz) => tz,
    None => "UTC",
};

// Values baked from `.env` at build time (see build.rs), with the original
// firmware's configuration as defaults.
const SERVER_HOST: &str = match option_env!("VITALTRACK_SERVER_HOST") {
    Some(host) => host,
    None => "192.168.1.4",
};
const SERVER_PORT: &str = match option_env!("VITALTRACK_SERVER_PORT") {
    Some(port) => port,
    None => "3000",
};
const API_ENDPOINT: &str = match option_env!("VITALTRACK_API_ENDPOINT") {
    Some(path) => path,
    None => "/api/vitaltrack",
};
const DEVICE_ID: &str = match option_env!("VITALTRACK_DEVICE_ID") {
    Some(id) => id,
    None => "Worker01",
};
const PROFILE: &str = match option_env!("VITALTRACK_PROFILE") {
    Some(profile) => profile,
    None => "averaged-json",
};
const ALARM_THRESHOLD_OVERRIDE: Option<&str> = option_env!("VITALTRACK_ALARM_THRESHOLD");

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("server host must not be empty")]
    EmptyHost,
    #[error("invalid server port `{0}`")]
    InvalidPort(String),
    #[error("API endpoint `{0}` must start with '/'")]
    InvalidEndpoint(String),
    #[error("device id must not be empty")]
    EmptyDeviceId,
    #[error("unknown profile `{0}` (expected `averaged-json` or `single-shot-query`)")]
    UnknownProfile(String),
    #[error("alarm threshold `{0}` is not a finite number")]
    InvalidThreshold(String),
}

/// The two firmware variants, unified as named policy presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    /// 5-sample averaging, JSON POST body, inclusive 38.0 °C threshold.
    AveragedJson,
    /// One read per iteration, query-string GET, strict 2.0 °C threshold.
    SingleShotQuery,
}

impl Profile {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "averaged-json" => Ok(Self::AveragedJson),
            "single-shot-query" => Ok(Self::SingleShotQuery),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }

    pub fn sampling(&self) -> SamplingPolicy {
        match self {
            Self::AveragedJson => SamplingPolicy::Averaged {
                samples: SAMPLES_PER_READING,
                pause: INTER_SAMPLE_PAUSE,
            },
            Self::SingleShotQuery => SamplingPolicy::SingleShot,
        }
    }

    pub fn encoding(&self) -> PayloadFormat {
        match self {
            Self::AveragedJson => PayloadFormat::JsonBody,
            Self::SingleShotQuery => PayloadFormat::QueryString,
        }
    }

    pub fn alarm(&self) -> AlarmPolicy {
        match self {
            Self::AveragedJson => AlarmPolicy {
                threshold_c: 38.0,
                comparator: Comparator::AtOrAbove,
            },
            Self::SingleShotQuery => AlarmPolicy {
                threshold_c: 2.0,
                comparator: Comparator::Above,
            },
        }
    }

    /// Whether an invalid reading actively drops the alarm outputs, instead
    /// of leaving them at their previous level.
    pub fn clears_alarm_on_invalid(&self) -> bool {
        matches!(self, Self::SingleShotQuery)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub host: &'static str,
    pub port: u16,
    pub path: &'static str,
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub device_id: &'static str,
    pub server: ServerConfig,
    pub profile: Profile,
    pub alarm: AlarmPolicy,
}

impl Config {
    /// Validates the baked-in configuration once, at startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::parse(
            SERVER_HOST,
            SERVER_PORT,
            API_ENDPOINT,
            DEVICE_ID,
            PROFILE,
            ALARM_THRESHOLD_OVERRIDE,
        )
    }

    fn parse(
        host: &'static str,
        port: &str,
        path: &'static str,
        device_id: &'static str,
        profile: &str,
        threshold_override: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;
        if !path.starts_with('/') {
            return Err(ConfigError::InvalidEndpoint(path.to_string()));
        }
        if device_id.trim().is_empty() {
            return Err(ConfigError::EmptyDeviceId);
        }
        let profile = Profile::parse(profile)?;

        let mut alarm = profile.alarm();
        if let Some(raw) = threshold_override {
            let threshold: f32 = raw
                .parse()
                .ok()
                .filter(|t: &f32| t.is_finite())
                .ok_or_else(|| ConfigError::InvalidThreshold(raw.to_string()))?;
            alarm.threshold_c = threshold;
        }

        Ok(Self {
            device_id,
            server: ServerConfig { host, port, path },
            profile,
            alarm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = Config::parse(
            "192.168.1.4",
            "3000",
            "/api/vitaltrack",
            "Worker01",
            "averaged-json",
            None,
        )
        .unwrap();

        assert_eq!(config.server.base_url(), "http://192.168.1.4:3000/api/vitaltrack");
        assert_eq!(config.profile, Profile::AveragedJson);
        assert_eq!(config.alarm.threshold_c, 38.0);
        assert_eq!(config.alarm.comparator, Comparator::AtOrAbove);
    }

    #[test]
    fn rejects_malformed_port() {
        let err = Config::parse("host", "3000h", "/api", "dev", "averaged-json", None);
        assert_eq!(err, Err(ConfigError::InvalidPort("3000h".to_string())));
    }

    #[test]
    fn rejects_unknown_profile() {
        let err = Config::parse("host", "80", "/api", "dev", "both-at-once", None);
        assert_eq!(
            err,
            Err(ConfigError::UnknownProfile("both-at-once".to_string()))
        );
    }

    #[test]
    fn rejects_endpoint_without_leading_slash() {
        let err = Config::parse("host", "80", "api", "dev", "averaged-json", None);
        assert_eq!(err, Err(ConfigError::InvalidEndpoint("api".to_string())));
    }

    #[test]
    fn threshold_override_keeps_profile_comparator() {
        let config = Config::parse(
            "host",
            "80",
            "/api",
            "dev",
            "single-shot-query",
            Some("30.5"),
        )
        .unwrap();

        assert_eq!(config.alarm.threshold_c, 30.5);
        assert_eq!(config.alarm.comparator, Comparator::Above);
    }

    #[test]
    fn threshold_override_must_be_finite() {
        let err = Config::parse("host", "80", "/api", "dev", "averaged-json", Some("NaN"));
        assert_eq!(err, Err(ConfigError::InvalidThreshold("NaN".to_string())));
    }
}
