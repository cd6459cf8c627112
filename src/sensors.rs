use anyhow::Context;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use esp_idf_svc::hal::delay::Ets;
use esp_idf_svc::hal::gpio::{AnyIOPin, InputOutput, PinDriver};
use esp_idf_svc::sys::EspError;
use thiserror::Error;

use crate::models::Reading;
use crate::sampling::VitalSensor;

// DHT22 single-wire timing (datasheet).
const START_LOW_US: u32 = 1_100;
const START_RELEASE_US: u32 = 40;
const LEVEL_TIMEOUT_US: u32 = 100;
// A high pulse of ~26-28 µs encodes 0, ~70 µs encodes 1.
const BIT_THRESHOLD_US: u32 = 50;

#[derive(Debug, Error)]
pub enum DhtError {
    #[error("line stuck for more than {0} µs")]
    Timeout(u32),
    #[error("frame checksum mismatch")]
    Checksum,
    #[error("gpio error: {0}")]
    Gpio(#[from] EspError),
}

/// DHT22 on a single open-drain GPIO. The wire protocol is bit-banged the
/// way the rest of this chip family does it: busy-wait level sampling with
/// microsecond delays, so reads must happen from one thread.
pub struct Dht22<'d> {
    pin: PinDriver<'d, AnyIOPin, InputOutput>,
}

impl<'d> Dht22<'d> {
    pub fn new(pin: AnyIOPin) -> anyhow::Result<Self> {
        let mut pin =
            PinDriver::input_output_od(pin).context("Failed to claim the DHT22 data pin")?;
        pin.set_high()?;
        Ok(Self { pin })
    }

    /// Busy-waits until the line reaches `level`, returning the time the
    /// previous level lasted.
    fn wait_for(&self, level: bool, timeout_us: u32) -> Result<u32, DhtError> {
        let mut waited = 0;
        while self.pin.is_high() != level {
            if waited >= timeout_us {
                return Err(DhtError::Timeout(timeout_us));
            }
            Ets::delay_us(1);
            waited += 1;
        }
        Ok(waited)
    }

    fn read_frame(&mut self) -> Result<[u8; 5], DhtError> {
        // MCU start signal: hold the line down >1 ms, then release.
        self.pin.set_low()?;
        Ets::delay_us(START_LOW_US);
        self.pin.set_high()?;
        Ets::delay_us(START_RELEASE_US);

        // Sensor response: ~80 µs low, ~80 µs high, then 40 data bits.
        self.wait_for(false, LEVEL_TIMEOUT_US)?;
        self.wait_for(true, LEVEL_TIMEOUT_US)?;
        self.wait_for(false, LEVEL_TIMEOUT_US)?;

        let mut frame = [0u8; 5];
        for bit in 0..40 {
            // Each bit: 50 µs low preamble, then a high pulse whose width
            // encodes the value.
            self.wait_for(true, LEVEL_TIMEOUT_US)?;
            let width = self.wait_for(false, LEVEL_TIMEOUT_US)?;
            frame[bit / 8] <<= 1;
            if width > BIT_THRESHOLD_US {
                frame[bit / 8] |= 1;
            }
        }

        if !checksum_ok(&frame) {
            return Err(DhtError::Checksum);
        }
        Ok(frame)
    }
}

impl VitalSensor for Dht22<'_> {
    fn sample(&mut self) -> anyhow::Result<Reading> {
        let frame = self.read_frame().context("DHT22 read failed")?;
        Ok(decode_dht_frame(&frame))
    }
}

fn checksum_ok(frame: &[u8; 5]) -> bool {
    frame[0]
        .wrapping_add(frame[1])
        .wrapping_add(frame[2])
        .wrapping_add(frame[3])
        == frame[4]
}

fn decode_dht_frame(frame: &[u8; 5]) -> Reading {
    let humidity = u16::from_be_bytes([frame[0], frame[1]]) as f32 / 10.0;
    let magnitude = u16::from_be_bytes([frame[2] & 0x7F, frame[3]]) as f32 / 10.0;
    let temperature = if frame[2] & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    };
    Reading::new(temperature, humidity)
}

// SHT31 command set (datasheet).
const SHT31_SOFT_RESET: [u8; 2] = [0x30, 0xA2];
const SHT31_READ_STATUS: [u8; 2] = [0xF3, 0x2D];
const SHT31_MEASURE_HIGH_REP: [u8; 2] = [0x24, 0x00];

#[derive(Debug, Error)]
pub enum Sht31Error<E: core::fmt::Debug> {
    #[error("i2c bus error: {0:?}")]
    Bus(E),
    #[error("crc mismatch in sensor response")]
    Crc,
}

/// Secondary SHT31 sensor on the I2C bus. Probed at boot for an optional
/// cross-check measurement; the control loop never reads it.
pub struct Sht31<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Sht31<I2C> {
    /// Soft-resets the sensor and confirms presence with a CRC-checked
    /// status-register read.
    pub fn probe(
        mut i2c: I2C,
        address: u8,
        delay: &mut impl DelayNs,
    ) -> Result<Self, Sht31Error<I2C::Error>> {
        i2c.write(address, &SHT31_SOFT_RESET)
            .map_err(Sht31Error::Bus)?;
        delay.delay_ms(2);

        i2c.write(address, &SHT31_READ_STATUS)
            .map_err(Sht31Error::Bus)?;
        delay.delay_ms(1);
        let mut status = [0u8; 3];
        i2c.read(address, &mut status).map_err(Sht31Error::Bus)?;
        if crc8(&status[..2]) != status[2] {
            return Err(Sht31Error::Crc);
        }

        Ok(Self { i2c, address })
    }

    /// One single-shot, high-repeatability measurement.
    pub fn measure(
        &mut self,
        delay: &mut impl DelayNs,
    ) -> Result<Reading, Sht31Error<I2C::Error>> {
        self.i2c
            .write(self.address, &SHT31_MEASURE_HIGH_REP)
            .map_err(Sht31Error::Bus)?;
        // High-repeatability conversion takes up to 15 ms.
        delay.delay_ms(16);

        let mut raw = [0u8; 6];
        self.i2c
            .read(self.address, &mut raw)
            .map_err(Sht31Error::Bus)?;
        if crc8(&raw[..2]) != raw[2] || crc8(&raw[3..5]) != raw[5] {
            return Err(Sht31Error::Crc);
        }

        let raw_temperature = u16::from_be_bytes([raw[0], raw[1]]);
        let raw_humidity = u16::from_be_bytes([raw[3], raw[4]]);
        Ok(Reading::new(
            convert_temperature(raw_temperature),
            convert_humidity(raw_humidity),
        ))
    }
}

fn convert_temperature(raw: u16) -> f32 {
    -45.0 + 175.0 * raw as f32 / 65535.0
}

fn convert_humidity(raw: u16) -> f32 {
    100.0 * raw as f32 / 65535.0
}

fn crc8(data: &[u8]) -> u8 {
    // Polynomial 0x31, init 0xFF, per the SHT3x datasheet.
    let mut crc = 0xFFu8;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dht_frame_decodes_positive_temperature() {
        // 65.2 % RH, 26.3 °C
        let reading = decode_dht_frame(&[0x02, 0x8C, 0x01, 0x07, 0x96]);
        assert!((reading.humidity - 65.2).abs() < 1e-4);
        assert!((reading.temperature - 26.3).abs() < 1e-4);
    }

    #[test]
    fn dht_frame_decodes_negative_temperature() {
        // Sign bit set in the temperature high byte: -10.1 °C
        let reading = decode_dht_frame(&[0x02, 0x8C, 0x80, 0x65, 0x73]);
        assert!((reading.temperature + 10.1).abs() < 1e-4);
    }

    #[test]
    fn dht_checksum_catches_corruption() {
        let mut frame = [0x02, 0x8C, 0x01, 0x07, 0x96];
        assert!(checksum_ok(&frame));
        frame[1] ^= 0x01;
        assert!(!checksum_ok(&frame));
    }

    #[test]
    fn sht31_crc_matches_the_datasheet_vector() {
        assert_eq!(crc8(&[0xBE, 0xEF]), 0x92);
    }

    #[test]
    fn sht31_conversion_covers_the_datasheet_range() {
        assert!((convert_temperature(0) + 45.0).abs() < 1e-4);
        assert!((convert_temperature(u16::MAX) - 130.0).abs() < 1e-4);
        assert!((convert_humidity(0)).abs() < 1e-4);
        assert!((convert_humidity(u16::MAX) - 100.0).abs() < 1e-4);
    }
}
