use std::time::Duration;

use anyhow::Context;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::{AnyIOPin, AnyOutputPin, PinDriver};
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::ledc::{LedcDriver, LedcTimerDriver, Resolution, config::TimerConfig};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::log::EspLogger;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys::link_patches;
use log::{info, warn};

use vitaltrack_rs::alarm::GpioAlarm;
use vitaltrack_rs::config::{
    ALARM_LED_GPIO, BUZZER_GPIO, BUZZER_TONE_HZ, Config, DHT_GPIO, I2C_BAUDRATE_ESP32,
    I2C_SCL_GPIO, I2C_SDA_GPIO, SHT31_I2C_ADDR,
};
use vitaltrack_rs::control::{ControlLoop, Pacer};
use vitaltrack_rs::logging;
use vitaltrack_rs::network::{self, HttpReporter};
use vitaltrack_rs::sensors::{Dht22, Sht31};

/// Blocking FreeRTOS pause; the loop suspends here and nothing else runs.
struct FreeRtosPacer;

impl Pacer for FreeRtosPacer {
    fn pause(&mut self, duration: Duration) {
        FreeRtos::delay_ms(duration.as_millis() as u32);
    }
}

fn main() -> anyhow::Result<()> {
    link_patches();
    EspLogger::initialize_default();
    logging::print_splash_screen();

    let config = Config::from_env().context("Invalid build-time configuration")?;
    info!(
        "🛠 Device `{}` | {:?} profile | reporting to {}",
        config.device_id,
        config.profile,
        config.server.base_url()
    );

    let peripherals = Peripherals::take().with_context(|| "Failed to take Peripherals")?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // Secondary sensor: probed and cross-checked once at boot, never read in
    // the loop. Absence only degrades, the DHT22 still carries the system.
    let i2c_config = I2cConfig::new().baudrate(Hertz::from(I2C_BAUDRATE_ESP32));
    let i2c_driver = I2cDriver::new(
        peripherals.i2c0,
        unsafe { AnyIOPin::new(I2C_SDA_GPIO) },
        unsafe { AnyIOPin::new(I2C_SCL_GPIO) },
        &i2c_config,
    )
    .with_context(|| "Failed to initialize I2C Driver")?;

    match Sht31::probe(i2c_driver, SHT31_I2C_ADDR, &mut FreeRtos) {
        Ok(mut sht31) => {
            info!("✅ SHT31 Ready");
            match sht31.measure(&mut FreeRtos) {
                Ok(reference) => info!(
                    "🔬 SHT31 cross-check: {:.2} °C | {:.2} %",
                    reference.temperature, reference.humidity
                ),
                Err(e) => warn!("⚠️ SHT31 cross-check failed: {:?}", e),
            }
        }
        Err(e) => warn!("⚠️ SHT31 Not Found (DHT22 still works): {:?}", e),
    }

    let dht = Dht22::new(unsafe { AnyIOPin::new(DHT_GPIO) })?;

    let led = PinDriver::output(unsafe { AnyOutputPin::new(ALARM_LED_GPIO) })?;
    let mut buzzer_timer = LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig {
            frequency: Hertz(BUZZER_TONE_HZ),
            resolution: Resolution::Bits10,
            ..Default::default()
        },
    )?;
    let buzzer = LedcDriver::new(peripherals.ledc.channel0, &mut buzzer_timer, unsafe {
        AnyOutputPin::new(BUZZER_GPIO)
    })?;
    let alarm = GpioAlarm::new(led, buzzer)?;

    // Either returns connected or ends in the provisioning portal + restart.
    let wifi = network::establish(peripherals.modem, sys_loop, nvs)?;

    let reporter = HttpReporter::new(&config.server, config.device_id, config.profile.encoding())?;

    let mut control = ControlLoop::new(
        wifi,
        dht,
        reporter,
        alarm,
        FreeRtosPacer,
        config.profile,
        config.alarm,
    );
    control.run()
}
