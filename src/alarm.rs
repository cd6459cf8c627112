use esp_idf_svc::hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_svc::hal::ledc::LedcDriver;

/// How the temperature is compared against the threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
    /// Boundary temperature counts as danger (averaged profile).
    AtOrAbove,
    /// Strictly greater than the threshold (single-shot profile).
    Above,
}

/// Pure threshold evaluation, recomputed fresh every iteration. No
/// hysteresis, debounce or latching.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlarmPolicy {
    pub threshold_c: f32,
    pub comparator: Comparator,
}

impl AlarmPolicy {
    pub fn is_danger(&self, temperature_c: f32) -> bool {
        if temperature_c.is_nan() {
            return false;
        }
        match self.comparator {
            Comparator::AtOrAbove => temperature_c >= self.threshold_c,
            Comparator::Above => temperature_c > self.threshold_c,
        }
    }
}

/// The alarm output lines, as seen by the control loop.
pub trait AlarmSink {
    fn set_danger(&mut self, danger: bool) -> anyhow::Result<()>;
}

/// LED line plus LEDC-driven buzzer. The buzzer timer runs at the tone
/// frequency; switching the duty between 50% and 0 starts and stops the tone.
pub struct GpioAlarm<'d> {
    led: PinDriver<'d, AnyOutputPin, Output>,
    buzzer: LedcDriver<'d>,
    tone_duty: u32,
}

impl<'d> GpioAlarm<'d> {
    pub fn new(
        led: PinDriver<'d, AnyOutputPin, Output>,
        mut buzzer: LedcDriver<'d>,
    ) -> anyhow::Result<Self> {
        let tone_duty = buzzer.get_max_duty() / 2;
        buzzer.set_duty(0)?;
        buzzer.enable()?;

        let mut alarm = Self {
            led,
            buzzer,
            tone_duty,
        };
        alarm.set_danger(false)?;
        Ok(alarm)
    }
}

impl AlarmSink for GpioAlarm<'_> {
    fn set_danger(&mut self, danger: bool) -> anyhow::Result<()> {
        if danger {
            self.led.set_high()?;
            self.buzzer.set_duty(self.tone_duty)?;
        } else {
            self.led.set_low()?;
            self.buzzer.set_duty(0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averaged_profile_boundary_is_danger() {
        let policy = AlarmPolicy {
            threshold_c: 38.0,
            comparator: Comparator::AtOrAbove,
        };
        assert!(policy.is_danger(38.0));
        assert!(policy.is_danger(38.01));
        assert!(!policy.is_danger(37.99));
    }

    #[test]
    fn single_shot_profile_boundary_is_safe() {
        let policy = AlarmPolicy {
            threshold_c: 2.0,
            comparator: Comparator::Above,
        };
        assert!(!policy.is_danger(2.0));
        assert!(policy.is_danger(2.01));
        assert!(!policy.is_danger(1.99));
    }

    #[test]
    fn nan_never_alarms() {
        let policy = AlarmPolicy {
            threshold_c: 2.0,
            comparator: Comparator::Above,
        };
        assert!(!policy.is_danger(f32::NAN));
    }
}
