//! Playback controller: projection state machine and timing derivation.
//!
//! The controller owns a three-state machine - idle, running a bounded
//! (repeat-counted) sequence, or running a continuously looping sequence -
//! and derives device timing parameters from a requested frame rate before
//! each timed start. Continuous playback is exclusive: at most one
//! continuous sequence runs at a time, and swapping requires a full
//! stop/start cycle against the device.

use log::{debug, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::driver::{
    DeviceDriver, DeviceHandle, FrameTiming, ProjectionState, SeqControl, SequenceId,
};
use crate::error::{Error, Result};
use crate::pool::SequencePool;

/// How many times a sequence plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RepeatMode {
    /// Play the sequence `n` times, then return to idle. `n` must be at
    /// least 1.
    Bounded(u32),
    /// Loop until explicitly stopped.
    Continuous,
}

impl RepeatMode {
    /// Map the command-surface repeat count, where the literal 0 means
    /// "continuous", onto the internal representation.
    pub fn from_repeat_count(repeats: u32) -> Self {
        match repeats {
            0 => RepeatMode::Continuous,
            n => RepeatMode::Bounded(n),
        }
    }
}

/// Projection state of one device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PlaybackState {
    /// No sequence is playing.
    #[default]
    Idle,
    /// A finite repeat count is playing; returns to idle on its own.
    RunningBounded,
    /// A sequence is looping until stopped.
    RunningContinuous,
}

/// Derive device timing for a requested frame rate.
///
/// PictureTime is 1,000,000 / rate microseconds, truncated, then clamped
/// up to the device-reported minimum - the device's own minimum-picture-
/// time inquiry is the authoritative floor. The synch pulse spans half the
/// picture time; illumination stays at the device default because
/// uninterrupted binary mode ignores it; synch and trigger delays are zero
/// for master-clocked, untriggered operation.
pub fn timing_for_rate(frame_rate_hz: f64, min_picture_us: u32) -> Result<FrameTiming> {
    if !frame_rate_hz.is_finite() || frame_rate_hz <= 0.0 {
        return Err(Error::invalid_config(format!(
            "frame rate must be a positive number of Hz, got {frame_rate_hz}"
        )));
    }
    let picture_us = ((1_000_000.0 / frame_rate_hz) as u32).max(min_picture_us);
    Ok(FrameTiming {
        illuminate_us: None,
        picture_us,
        synch_delay_us: 0,
        synch_pulse_width_us: picture_us / 2,
        trigger_in_delay_us: 0,
    })
}

/// State machine governing projection on one device.
#[derive(Debug, Default)]
pub struct PlaybackController {
    state: PlaybackState,
}

impl PlaybackController {
    /// Create a controller in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state. Bounded completion is folded in by
    /// [`has_completed`](Self::has_completed) /
    /// [`wait_for_completion`](Self::wait_for_completion), not observed
    /// spontaneously.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Start playback of `id` at the requested frame rate.
    ///
    /// Rejects ids that are not pool members. For bounded playback the
    /// repeat count is pushed as a sequence control before the timing
    /// update. If the timing push fails, no start is issued - the device
    /// never runs with stale or rejected timing.
    pub fn run<D: DeviceDriver>(
        &mut self,
        driver: &mut D,
        device: DeviceHandle,
        pool: &SequencePool,
        id: SequenceId,
        frame_rate_hz: f64,
        mode: RepeatMode,
    ) -> Result<()> {
        if !pool.contains(id) {
            return Err(Error::UnknownSequence(id));
        }
        if let RepeatMode::Bounded(0) = mode {
            return Err(Error::invalid_config(
                "bounded playback needs a repeat count of at least 1",
            ));
        }

        if let RepeatMode::Bounded(repeats) = mode {
            driver.seq_control(device, id, SeqControl::Repeat(repeats))?;
        }

        let min_picture_us = driver.seq_min_picture_time(device, id)?;
        let timing = timing_for_rate(frame_rate_hz, min_picture_us)?;
        driver.seq_timing(device, id, &timing)?;
        debug!(
            "sequence {id}: picture time {} us, synch pulse {} us",
            timing.picture_us, timing.synch_pulse_width_us
        );

        match mode {
            RepeatMode::Continuous => self.start_continuous(driver, device, pool, id),
            RepeatMode::Bounded(_) => {
                driver.proj_start(device, id)?;
                self.state = PlaybackState::RunningBounded;
                Ok(())
            }
        }
    }

    /// Start continuous playback with the device's default timing.
    ///
    /// Used for static content (cleared panels, single patterns) where the
    /// frame rate is irrelevant. If continuous playback is already active
    /// it is stopped first - the device supports one looping sequence at a
    /// time.
    pub fn start_continuous<D: DeviceDriver>(
        &mut self,
        driver: &mut D,
        device: DeviceHandle,
        pool: &SequencePool,
        id: SequenceId,
    ) -> Result<()> {
        if !pool.contains(id) {
            return Err(Error::UnknownSequence(id));
        }

        if self.state == PlaybackState::RunningContinuous {
            if let Err(err) = self.stop(driver, device) {
                warn!("implicit stop before continuous swap failed: {err}");
            }
        }

        driver.proj_start_continuous(device, id)?;
        self.state = PlaybackState::RunningContinuous;
        Ok(())
    }

    /// Halt projection and wait for the device to acknowledge.
    ///
    /// The halt request is non-blocking; the wait blocks until the device
    /// reports completion. The state returns to idle regardless of what
    /// either call reports.
    pub fn stop<D: DeviceDriver>(&mut self, driver: &mut D, device: DeviceHandle) -> Result<()> {
        let halt = driver.proj_halt(device);
        let wait = driver.proj_wait(device);
        self.state = PlaybackState::Idle;
        halt?;
        wait?;
        Ok(())
    }

    /// Non-blocking poll: has the device finished projecting?
    ///
    /// Folds an observed bounded completion back into the idle state.
    pub fn has_completed<D: DeviceDriver>(
        &mut self,
        driver: &mut D,
        device: DeviceHandle,
    ) -> Result<bool> {
        let idle = driver.proj_state(device)? == ProjectionState::Idle;
        if idle && self.state == PlaybackState::RunningBounded {
            self.state = PlaybackState::Idle;
        }
        Ok(idle)
    }

    /// Block until the device reports projection completion.
    pub fn wait_for_completion<D: DeviceDriver>(
        &mut self,
        driver: &mut D,
        device: DeviceHandle,
    ) -> Result<()> {
        driver.proj_wait(device)?;
        if self.state == PlaybackState::RunningBounded {
            self.state = PlaybackState::Idle;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockDriver, MockHandle};

    #[test]
    fn thirty_hz_derives_the_documented_timing() {
        let timing = timing_for_rate(30.0, 44).unwrap();
        assert_eq!(timing.picture_us, 33_333);
        assert_eq!(timing.synch_pulse_width_us, 16_666);
        assert_eq!(timing.illuminate_us, None);
        assert_eq!(timing.synch_delay_us, 0);
        assert_eq!(timing.trigger_in_delay_us, 0);
    }

    #[test]
    fn picture_time_clamps_to_device_minimum() {
        let timing = timing_for_rate(1_000_000.0, 44).unwrap();
        assert_eq!(timing.picture_us, 44);
        assert_eq!(timing.synch_pulse_width_us, 22);
    }

    #[test]
    fn nonpositive_rates_are_rejected() {
        for rate in [0.0, -30.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                timing_for_rate(rate, 44),
                Err(Error::InvalidConfig(_))
            ));
        }
    }

    fn running_setup() -> (MockDriver, MockHandle, DeviceHandle, SequencePool) {
        let (mut driver, handle) = MockDriver::new();
        let device = driver.device_alloc(0).unwrap();
        let pool = SequencePool::new();
        (driver, handle, device, pool)
    }

    #[test]
    fn run_rejects_unknown_sequence() {
        let (mut driver, _handle, device, pool) = running_setup();
        let mut controller = PlaybackController::new();
        let err = controller
            .run(
                &mut driver,
                device,
                &pool,
                SequenceId(7),
                60.0,
                RepeatMode::Bounded(1),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownSequence(SequenceId(7))));
        assert_eq!(controller.state(), PlaybackState::Idle);
    }

    #[test]
    fn timing_failure_issues_no_start() {
        let (mut driver, handle, device, mut pool) = running_setup();
        let id = pool.allocate_standard(&mut driver, device, 2).unwrap();
        handle.fail_seq_timing(true);
        handle.clear_calls();

        let mut controller = PlaybackController::new();
        let err = controller
            .run(&mut driver, device, &pool, id, 60.0, RepeatMode::Bounded(3))
            .unwrap_err();
        assert!(matches!(err, Error::Driver(_)));
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(!handle
            .calls()
            .iter()
            .any(|c| matches!(c, Call::ProjStart(_) | Call::ProjStartContinuous(_))));
    }

    #[test]
    fn continuous_swap_stops_the_previous_run_first() {
        let (mut driver, handle, device, mut pool) = running_setup();
        let first = pool.allocate_standard(&mut driver, device, 1).unwrap();
        let second = pool.allocate_standard(&mut driver, device, 1).unwrap();

        let mut controller = PlaybackController::new();
        controller
            .start_continuous(&mut driver, device, &pool, first)
            .unwrap();
        assert_eq!(controller.state(), PlaybackState::RunningContinuous);
        handle.clear_calls();

        controller
            .start_continuous(&mut driver, device, &pool, second)
            .unwrap();
        assert_eq!(
            handle.calls(),
            vec![
                Call::ProjHalt,
                Call::ProjWait,
                Call::ProjStartContinuous(second),
            ]
        );
        assert_eq!(controller.state(), PlaybackState::RunningContinuous);
    }

    #[test]
    fn bounded_completion_folds_back_to_idle() {
        let (mut driver, handle, device, mut pool) = running_setup();
        let id = pool.allocate_standard(&mut driver, device, 4).unwrap();

        let mut controller = PlaybackController::new();
        controller
            .run(&mut driver, device, &pool, id, 60.0, RepeatMode::Bounded(3))
            .unwrap();
        assert_eq!(controller.state(), PlaybackState::RunningBounded);
        assert!(!controller.has_completed(&mut driver, device).unwrap());

        handle.complete_projection();
        assert!(controller.has_completed(&mut driver, device).unwrap());
        assert_eq!(controller.state(), PlaybackState::Idle);
    }

    #[test]
    fn stop_clears_state_even_when_halt_fails() {
        let (mut driver, handle, device, mut pool) = running_setup();
        let id = pool.allocate_standard(&mut driver, device, 1).unwrap();

        let mut controller = PlaybackController::new();
        controller
            .start_continuous(&mut driver, device, &pool, id)
            .unwrap();
        handle.fail_proj_halt(true);

        assert!(controller.stop(&mut driver, device).is_err());
        assert_eq!(controller.state(), PlaybackState::Idle);
    }
}
