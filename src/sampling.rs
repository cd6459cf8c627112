use std::time::Duration;

use crate::config::{LOOP_DELAY, SENSOR_FAILURE_BACKOFF};
use crate::control::Pacer;
use crate::logging::log_sensor_error;
use crate::models::{Reading, ReadingAccumulator};

/// The primary temperature/humidity sensor, as seen by the control loop.
pub trait VitalSensor {
    fn sample(&mut self) -> anyhow::Result<Reading>;
}

/// How one reported `Reading` is produced per iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SamplingPolicy {
    /// One read; usable iff both values are non-NaN.
    SingleShot,
    /// Up to `samples` reads with a fixed pause after each; the result is
    /// the mean over the valid subset.
    Averaged { samples: u8, pause: Duration },
}

impl SamplingPolicy {
    /// Polls the sensor according to the policy. `None` means no usable
    /// reading this iteration (report and alarm evaluation are skipped).
    pub fn collect(
        &self,
        sensor: &mut impl VitalSensor,
        pacer: &mut impl Pacer,
    ) -> Option<Reading> {
        match *self {
            Self::SingleShot => match sensor.sample() {
                Ok(reading) if reading.is_valid() => Some(reading),
                Ok(_) => None,
                Err(e) => {
                    log_sensor_error("DHT22", e);
                    None
                }
            },
            Self::Averaged { samples, pause } => {
                let mut acc = ReadingAccumulator::default();
                for _ in 0..samples {
                    match sensor.sample() {
                        Ok(reading) => acc.record(reading),
                        Err(e) => log_sensor_error("DHT22", e),
                    }
                    pacer.pause(pause);
                }
                acc.mean()
            }
        }
    }

    /// Pause applied when an iteration produced no usable reading.
    pub fn failure_backoff(&self) -> Duration {
        match self {
            Self::SingleShot => LOOP_DELAY,
            Self::Averaged { .. } => SENSOR_FAILURE_BACKOFF,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::testing::RecordingPacer;
    use std::collections::VecDeque;

    struct ScriptedSensor {
        polls: VecDeque<anyhow::Result<Reading>>,
    }

    impl ScriptedSensor {
        fn new(polls: Vec<anyhow::Result<Reading>>) -> Self {
            Self {
                polls: polls.into(),
            }
        }
    }

    impl VitalSensor for ScriptedSensor {
        fn sample(&mut self) -> anyhow::Result<Reading> {
            self.polls
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }
    }

    fn averaged() -> SamplingPolicy {
        SamplingPolicy::Averaged {
            samples: 5,
            pause: Duration::from_millis(200),
        }
    }

    #[test]
    fn averaged_takes_the_mean_of_the_valid_subset() {
        let mut sensor = ScriptedSensor::new(vec![
            Ok(Reading::new(20.0, 40.0)),
            Ok(Reading::new(f32::NAN, 45.0)),
            Ok(Reading::new(22.0, 50.0)),
            Err(anyhow::anyhow!("checksum mismatch")),
            Ok(Reading::new(24.0, 60.0)),
        ]);
        let mut pacer = RecordingPacer::default();

        let reading = averaged().collect(&mut sensor, &mut pacer).unwrap();
        assert!((reading.temperature - 22.0).abs() < 1e-5);
        assert!((reading.humidity - 50.0).abs() < 1e-5);
        // One inter-read pause per poll, real waiting replaced by recording.
        assert_eq!(pacer.pauses.len(), 5);
        assert!(pacer.pauses.iter().all(|p| *p == Duration::from_millis(200)));
    }

    #[test]
    fn averaged_with_zero_valid_reads_is_terminal_for_the_iteration() {
        let mut sensor = ScriptedSensor::new(vec![
            Ok(Reading::new(f32::NAN, f32::NAN)),
            Err(anyhow::anyhow!("timeout")),
            Err(anyhow::anyhow!("timeout")),
            Ok(Reading::new(f32::NAN, 50.0)),
            Err(anyhow::anyhow!("timeout")),
        ]);
        let mut pacer = RecordingPacer::default();

        assert!(averaged().collect(&mut sensor, &mut pacer).is_none());
        assert_eq!(averaged().failure_backoff(), SENSOR_FAILURE_BACKOFF);
    }

    #[test]
    fn single_shot_rejects_nan() {
        let mut pacer = RecordingPacer::default();

        let mut sensor = ScriptedSensor::new(vec![Ok(Reading::new(36.5, f32::NAN))]);
        assert!(
            SamplingPolicy::SingleShot
                .collect(&mut sensor, &mut pacer)
                .is_none()
        );

        let mut sensor = ScriptedSensor::new(vec![Ok(Reading::new(36.5, 55.2))]);
        let reading = SamplingPolicy::SingleShot
            .collect(&mut sensor, &mut pacer)
            .unwrap();
        assert_eq!(reading, Reading::new(36.5, 55.2));
        // Single-shot never pauses between reads.
        assert!(pacer.pauses.is_empty());
    }
}
