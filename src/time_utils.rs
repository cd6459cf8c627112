use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use esp_idf_svc::sys::esp_timer_get_time;

use crate::config::{TIMESTAMP_PATTERN, TIMEZONE};

pub fn get_uptime_string() -> String {
    let micros = unsafe { esp_timer_get_time() };
    let seconds = micros / 1_000_000;
    let millis = (micros % 1_000_000) / 1_000;
    format!("[{:>4}.{:03}s]", seconds, millis)
}

pub fn get_formatted_timestamp() -> String {
    let now = get_current_time_in_timezone();
    now.format(TIMESTAMP_PATTERN).to_string()
}

fn get_current_time_in_timezone() -> DateTime<Tz> {
    Utc::now().with_timezone(cached_timezone())
}

fn cached_timezone() -> &'static Tz {
    static TZ: OnceLock<Tz> = OnceLock::new();
    TZ.get_or_init(|| TIMEZONE.parse().unwrap_or(chrono_tz::UTC))
}
