use crate::models::Reading;
use crate::time_utils::get_formatted_timestamp;
use log::{error, info, warn};

const SPLASH_SCREEN: &str = r#"
 __     ___ _        _ _____               _
 \ \   / (_) |_ __ _| |_   _| __ __ _  ___| | __
  \ \ / /| | __/ _` | | | || '__/ _` |/ __| |/ /
   \ V / | | || (_| | | | || | | (_| | (__|   <
    \_/  |_|\__\__,_|_| |_||_|  \__,_|\___|_|\_\"#;

pub enum LogLevel {
    Info,
    Warn,
    Error,
}

pub fn print_splash_screen() {
    info!("{}", SPLASH_SCREEN);
}

pub fn log_reading(reading: &Reading) {
    let ts = get_formatted_timestamp();

    let msg = format!(
        "🌡 {:.2} °C | 💧 {:.2} %",
        reading.temperature, reading.humidity
    );
    log_message(LogLevel::Info, &msg, &ts);
}

pub fn log_sensor_error(sensor_name: &str, error: impl std::fmt::Debug) {
    let ts = get_formatted_timestamp();

    log_message(
        LogLevel::Error,
        &format!("🚫 {} Error: {:?}", sensor_name, error),
        &ts,
    );
}

pub fn log_sampling_failed() {
    let ts = get_formatted_timestamp();

    log_message(LogLevel::Error, "❌ Sensor read failed", &ts);
}

pub fn log_report_status(status: u16) {
    let ts = get_formatted_timestamp();

    if (200..300).contains(&status) {
        log_message(LogLevel::Info, &format!("📤 Sent | HTTP {}", status), &ts);
    } else {
        log_message(
            LogLevel::Warn,
            &format!("📤 Server rejected reading | HTTP {}", status),
            &ts,
        );
    }
}

pub fn log_report_error(error: &anyhow::Error) {
    let ts = get_formatted_timestamp();

    log_message(LogLevel::Error, &format!("❌ HTTP Error: {:?}", error), &ts);
}

pub fn log_alarm(temperature: f32, threshold: f32) {
    let ts = get_formatted_timestamp();

    log_message(
        LogLevel::Warn,
        &format!(
            "🚨 Danger: {:.2} °C crossed the {:.1} °C threshold",
            temperature, threshold
        ),
        &ts,
    );
}

fn log_message(level: LogLevel, message: &str, custom_ts: &str) {
    let uptime = crate::time_utils::get_uptime_string();
    let prefix = format!("{} [{}]", uptime, custom_ts);

    match level {
        LogLevel::Error => error!("\x1b[31m{} {}\x1b[0m", prefix, message),
        LogLevel::Warn => warn!("\x1b[38;5;11m{} {}\x1b[0m", prefix, message),
        LogLevel::Info => info!("\x1b[38;5;40m{} {}\x1b[0m", prefix, message),
    }
}
