use std::time::Duration;

use log::warn;

use crate::alarm::{AlarmPolicy, AlarmSink};
use crate::config::{LOOP_DELAY, RECONNECT_PAUSE, Profile};
use crate::logging::{
    log_alarm, log_reading, log_report_error, log_report_status, log_sampling_failed,
};
use crate::report::ReportSink;
use crate::sampling::{SamplingPolicy, VitalSensor};

/// The connectivity gate. Reconnect requests are fire-and-forget; the loop
/// just skips the iteration and checks again next time.
pub trait Link {
    fn is_connected(&mut self) -> bool;
    fn request_reconnect(&mut self);
}

/// Blocking pause between steps. The production implementation delays the
/// FreeRTOS task; tests substitute a recorder so the loop body runs without
/// real-time waiting.
pub trait Pacer {
    fn pause(&mut self, duration: Duration);
}

/// What one iteration did, mostly for tests and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// A valid reading was produced, reported and evaluated.
    Completed,
    /// The link was down; nothing was sampled or sent.
    SkippedOffline,
    /// Sampling produced no usable reading; nothing was sent.
    SkippedInvalid,
}

/// The single sequential control loop: gate → sample → report → alarm → pace.
///
/// Owns all peripheral handles for its lifetime. The alarm lines are the only
/// state carried across iterations and they are overwritten on every
/// completed tick.
pub struct ControlLoop<L, S, R, A, P> {
    link: L,
    sensor: S,
    reporter: R,
    alarm: A,
    pacer: P,
    sampling: SamplingPolicy,
    alarm_policy: AlarmPolicy,
    clear_alarm_on_invalid: bool,
}

impl<L, S, R, A, P> ControlLoop<L, S, R, A, P>
where
    L: Link,
    S: VitalSensor,
    R: ReportSink,
    A: AlarmSink,
    P: Pacer,
{
    pub fn new(
        link: L,
        sensor: S,
        reporter: R,
        alarm: A,
        pacer: P,
        profile: Profile,
        alarm_policy: AlarmPolicy,
    ) -> Self {
        Self {
            link,
            sensor,
            reporter,
            alarm,
            pacer,
            sampling: profile.sampling(),
            alarm_policy,
            clear_alarm_on_invalid: profile.clears_alarm_on_invalid(),
        }
    }

    pub fn run(&mut self) -> ! {
        loop {
            self.tick();
        }
    }

    /// One iteration. Every pause is a plain blocking delay; once a step
    /// starts it runs to completion.
    pub fn tick(&mut self) -> Tick {
        if !self.link.is_connected() {
            self.link.request_reconnect();
            self.pacer.pause(RECONNECT_PAUSE);
            return Tick::SkippedOffline;
        }

        let Some(reading) = self.sampling.collect(&mut self.sensor, &mut self.pacer) else {
            log_sampling_failed();
            if self.clear_alarm_on_invalid {
                self.drive_alarm(false);
            }
            self.pacer.pause(self.sampling.failure_backoff());
            return Tick::SkippedInvalid;
        };

        match self.reporter.send(&reading) {
            Ok(status) => log_report_status(status),
            Err(e) => log_report_error(&e),
        }
        log_reading(&reading);

        let danger = self.alarm_policy.is_danger(reading.temperature);
        self.drive_alarm(danger);
        if danger {
            log_alarm(reading.temperature, self.alarm_policy.threshold_c);
        }

        self.pacer.pause(LOOP_DELAY);
        Tick::Completed
    }

    fn drive_alarm(&mut self, danger: bool) {
        // Output line faults are not escalated; the next tick overwrites them.
        if let Err(e) = self.alarm.set_danger(danger) {
            warn!("⚠️ Alarm output failed: {:?}", e);
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::Pacer;
    use std::time::Duration;

    #[derive(Default)]
    pub struct RecordingPacer {
        pub pauses: Vec<Duration>,
    }

    impl Pacer for RecordingPacer {
        fn pause(&mut self, duration: Duration) {
            self.pauses.push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingPacer;
    use super::*;
    use crate::config::SENSOR_FAILURE_BACKOFF;
    use crate::models::Reading;

    struct ScriptedLink {
        connected: bool,
        reconnects: u32,
    }

    impl Link for ScriptedLink {
        fn is_connected(&mut self) -> bool {
            self.connected
        }
        fn request_reconnect(&mut self) {
            self.reconnects += 1;
        }
    }

    struct ConstantSensor(Reading);

    impl VitalSensor for ConstantSensor {
        fn sample(&mut self) -> anyhow::Result<Reading> {
            Ok(self.0)
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        sent: Vec<Reading>,
    }

    impl ReportSink for RecordingReporter {
        fn send(&mut self, reading: &Reading) -> anyhow::Result<u16> {
            self.sent.push(*reading);
            Ok(200)
        }
    }

    #[derive(Default)]
    struct RecordingAlarm {
        states: Vec<bool>,
    }

    impl AlarmSink for RecordingAlarm {
        fn set_danger(&mut self, danger: bool) -> anyhow::Result<()> {
            self.states.push(danger);
            Ok(())
        }
    }

    fn control_loop(
        connected: bool,
        reading: Reading,
        profile: Profile,
    ) -> ControlLoop<ScriptedLink, ConstantSensor, RecordingReporter, RecordingAlarm, RecordingPacer>
    {
        ControlLoop::new(
            ScriptedLink {
                connected,
                reconnects: 0,
            },
            ConstantSensor(reading),
            RecordingReporter::default(),
            RecordingAlarm::default(),
            RecordingPacer::default(),
            profile,
            profile.alarm(),
        )
    }

    #[test]
    fn offline_iterations_never_touch_the_network() {
        let mut cl = control_loop(false, Reading::new(40.0, 50.0), Profile::AveragedJson);

        assert_eq!(cl.tick(), Tick::SkippedOffline);
        assert!(cl.reporter.sent.is_empty());
        assert_eq!(cl.link.reconnects, 1);
        assert_eq!(cl.pacer.pauses, vec![RECONNECT_PAUSE]);
    }

    #[test]
    fn danger_reading_raises_the_alarm_in_the_same_iteration() {
        let mut cl = control_loop(true, Reading::new(38.0, 50.0), Profile::AveragedJson);

        assert_eq!(cl.tick(), Tick::Completed);
        // Boundary temperature is danger in the averaged profile.
        assert_eq!(cl.alarm.states, vec![true]);
        assert_eq!(cl.reporter.sent.len(), 1);
    }

    #[test]
    fn safe_reading_drops_the_alarm_in_the_same_iteration() {
        let mut cl = control_loop(true, Reading::new(37.9, 50.0), Profile::AveragedJson);

        assert_eq!(cl.tick(), Tick::Completed);
        assert_eq!(cl.alarm.states, vec![false]);
    }

    #[test]
    fn averaged_reports_the_mean_of_identical_polls() {
        let mut cl = control_loop(true, Reading::new(36.5, 55.2), Profile::AveragedJson);

        cl.tick();
        assert_eq!(cl.reporter.sent, vec![Reading::new(36.5, 55.2)]);
        // 5 inter-read pauses plus the loop delay.
        assert_eq!(cl.pacer.pauses.len(), 6);
        assert_eq!(*cl.pacer.pauses.last().unwrap(), LOOP_DELAY);
    }

    #[test]
    fn identical_readings_produce_identical_outcomes() {
        let mut cl = control_loop(true, Reading::new(39.0, 50.0), Profile::AveragedJson);

        cl.tick();
        cl.tick();
        assert_eq!(cl.reporter.sent[0], cl.reporter.sent[1]);
        assert_eq!(cl.alarm.states, vec![true, true]);
    }

    #[test]
    fn invalid_reading_skips_report_and_backs_off() {
        let mut cl = control_loop(
            true,
            Reading::new(f32::NAN, f32::NAN),
            Profile::AveragedJson,
        );

        assert_eq!(cl.tick(), Tick::SkippedInvalid);
        assert!(cl.reporter.sent.is_empty());
        // The averaged profile leaves the alarm lines untouched...
        assert!(cl.alarm.states.is_empty());
        assert_eq!(*cl.pacer.pauses.last().unwrap(), SENSOR_FAILURE_BACKOFF);
    }

    #[test]
    fn single_shot_profile_clears_the_alarm_on_invalid_reading() {
        let mut cl = control_loop(
            true,
            Reading::new(f32::NAN, 50.0),
            Profile::SingleShotQuery,
        );

        assert_eq!(cl.tick(), Tick::SkippedInvalid);
        // ...while the single-shot profile actively drops it.
        assert_eq!(cl.alarm.states, vec![false]);
        assert_eq!(*cl.pacer.pauses.last().unwrap(), LOOP_DELAY);
    }

    #[test]
    fn single_shot_boundary_temperature_stays_safe() {
        let mut cl = control_loop(true, Reading::new(2.0, 50.0), Profile::SingleShotQuery);

        cl.tick();
        assert_eq!(cl.alarm.states, vec![false]);
    }
}
