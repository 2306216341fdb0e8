// Fixed-period chassis control loop
//
// Each cycle: sample input -> interlock -> (armed) heading lock + kinematics ->
// dispatch to the wheels -> mirror on telemetry. When tripped every wheel gets a
// zero reference and the loop backs off before evaluating again.

use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info, warn};

use crate::config::{ChassisConfig, ConfigError, INDICATOR_LABEL};
use crate::control::{HeadingLock, MecanumKinematics, SafetyInterlock, TransitionDetector};
use crate::io::{HeadingSource, InputSource, StatusIndicator, TelemetrySink};
use crate::messages::{
    Axis, BodyVelocityCommand, HeadingState, IndicatorPattern, InterlockState,
    OperatorInputSample, Wheel, WheelVelocities,
};
use crate::motor::{DispatchReport, WheelActuators, WheelError};

/// Error types that keep the runtime from starting
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to enable wheel motors: {0}")]
    Startup(#[from] WheelError),
}

/// External collaborators the loop reads from and writes to
pub struct Collaborators {
    pub input: Box<dyn InputSource>,
    pub heading: Box<dyn HeadingSource>,
    pub telemetry: Box<dyn TelemetrySink>,
    pub indicator: Box<dyn StatusIndicator>,
}

/// What happened in one cycle
#[derive(Debug)]
pub struct CycleReport {
    pub interlock: InterlockState,
    /// Body command, only present when armed
    pub command: Option<BodyVelocityCommand>,
    pub wheels: WheelVelocities,
    pub dispatch: DispatchReport,
}

pub struct Runtime {
    config: ChassisConfig,
    interlock: SafetyInterlock,
    transitions: TransitionDetector,
    heading_lock: HeadingLock,
    kinematics: MecanumKinematics,
    actuators: WheelActuators,
    io: Collaborators,
    heading_lost: bool,
    wheel_faulted: [bool; 4],
}

impl Runtime {
    /// Validate the config and enable every wheel; any failure is fatal
    pub fn init(
        config: ChassisConfig,
        mut actuators: WheelActuators,
        io: Collaborators,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;
        actuators.enable_all()?;

        Ok(Self {
            interlock: SafetyInterlock::new(config.emergency_switch, config.emergency_level),
            transitions: TransitionDetector::new(),
            heading_lock: HeadingLock::new(config.heading_lock()),
            kinematics: MecanumKinematics::new(&config.geometry),
            actuators,
            io,
            heading_lost: false,
            wheel_faulted: [false; 4],
            config,
        })
    }

    pub fn heading_lock(&self) -> &HeadingLock {
        &self.heading_lock
    }

    /// Run one control cycle without sleeping
    pub fn step(&mut self) -> CycleReport {
        let input = self.io.input.sample();
        let interlock = self.interlock.evaluate(input.as_ref());
        self.on_interlock(interlock);

        let (command, wheels) = match (interlock, &input) {
            (InterlockState::Armed, Some(sample)) => {
                let command = self.command_from(sample);
                (Some(command), self.kinematics.solve(&command))
            }
            // Tripped: heading lock is left alone so re-arming resumes the held heading
            _ => (None, WheelVelocities::zero()),
        };

        let dispatch = self.actuators.dispatch(&wheels);
        self.log_dispatch(&dispatch);
        self.io.telemetry.publish(&wheels);

        CycleReport {
            interlock,
            command,
            wheels,
            dispatch,
        }
    }

    /// Run forever at the configured period
    pub async fn run(&mut self) {
        let period = self.config.loop_period();
        let backoff = self.config.trip_backoff();
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Runtime started: {}ms period, {}ms trip backoff",
            period.as_millis(),
            backoff.as_millis()
        );

        loop {
            tick.tick().await;

            let report = self.step();
            if report.interlock == InterlockState::Tripped {
                sleep(backoff).await;
                tick.reset();
            }
        }
    }

    /// Zero and release the wheels
    pub fn cleanup(&mut self) {
        self.actuators.shutdown();
        self.io.telemetry.publish(&WheelVelocities::zero());
    }

    /// Edge-triggered reactions to the interlock decision
    fn on_interlock(&mut self, state: InterlockState) {
        let previous = self.transitions.last();
        let Some(state) = self.transitions.observe(state) else {
            return;
        };

        match state {
            InterlockState::Tripped => warn!("Interlock tripped, stopping chassis"),
            InterlockState::Armed => {
                info!("Interlock armed");
                if self.config.reseed_on_rearm && previous == Some(InterlockState::Tripped) {
                    debug!("Dropping held heading on re-arm");
                    self.heading_lock.reset();
                }
            }
        }
        self.io
            .indicator
            .set_indicator(INDICATOR_LABEL, &IndicatorPattern::for_state(state));
        self.io.telemetry.publish_interlock(state);
    }

    /// Body command from the sticks, rotation through the heading lock
    fn command_from(&mut self, sample: &OperatorInputSample) -> BodyVelocityCommand {
        let cfg = &self.config;
        let lateral = sample.axis(Axis::LeftX) * cfg.linear_speed_scale;
        let vx = sample.axis(Axis::LeftY) * cfg.linear_speed_scale;
        let vy = if cfg.lateral_sign_inverted { -lateral } else { lateral };
        // Stick right is clockwise, omega is counter-clockwise positive
        let manual_omega = -sample.axis(Axis::RightX) * cfg.angular_speed_scale;
        let dt = cfg.loop_period().as_secs_f32();

        let heading = self
            .io
            .heading
            .sample()
            .and_then(HeadingState::from_sensor_yaw);

        let omega = match heading {
            Some(heading) => {
                if self.heading_lost {
                    info!("Heading available again");
                    self.heading_lost = false;
                }
                self.heading_lock.update(manual_omega, heading, dt)
            }
            None => {
                if !self.heading_lost {
                    warn!("Heading unavailable, holding zero rotation");
                    self.heading_lost = true;
                }
                0.0
            }
        };

        let command = BodyVelocityCommand { vx, vy, omega };
        debug!("Command: {:?}", command);
        command
    }

    /// Warn once when a wheel starts failing and once when it recovers
    fn log_dispatch(&mut self, report: &DispatchReport) {
        for wheel in Wheel::ALL {
            let failure = report.failures.iter().find(|f| f.wheel == wheel);
            let faulted = &mut self.wheel_faulted[wheel.index()];
            match (failure, *faulted) {
                (Some(failure), false) => {
                    warn!("Dispatch failed: {}", failure);
                    *faulted = true;
                }
                (None, true) => {
                    info!("{} wheel dispatch recovered", wheel);
                    *faulted = false;
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Switch, SwitchLevel};
    use crate::motor::SimulatedBus;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::timeout;

    const IDS: [u8; 4] = [1, 2, 3, 4];
    const EPS: f32 = 1e-4;

    #[derive(Clone, Default)]
    struct SharedInput(Arc<Mutex<Option<OperatorInputSample>>>);

    impl SharedInput {
        fn set(&self, sample: Option<OperatorInputSample>) {
            *self.0.lock().unwrap() = sample;
        }
    }

    impl InputSource for SharedInput {
        fn sample(&mut self) -> Option<OperatorInputSample> {
            self.0.lock().unwrap().clone()
        }
    }

    #[derive(Clone, Default)]
    struct SharedHeading(Arc<Mutex<Option<f32>>>);

    impl SharedHeading {
        /// Set the heading as the runtime will see it (counter-clockwise positive)
        fn set_yaw(&self, yaw: Option<f32>) {
            *self.0.lock().unwrap() = yaw.map(|y| -y);
        }
    }

    impl HeadingSource for SharedHeading {
        fn sample(&mut self) -> Option<f32> {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        wheels: Arc<Mutex<Vec<WheelVelocities>>>,
        indications: Arc<Mutex<Vec<IndicatorPattern>>>,
    }

    impl TelemetrySink for Recorder {
        fn publish(&mut self, wheels: &WheelVelocities) {
            self.wheels.lock().unwrap().push(*wheels);
        }
    }

    impl StatusIndicator for Recorder {
        fn set_indicator(&mut self, label: &str, pattern: &IndicatorPattern) {
            assert_eq!(label, INDICATOR_LABEL);
            self.indications.lock().unwrap().push(*pattern);
        }
    }

    struct Harness {
        runtime: Runtime,
        bus: SimulatedBus,
        input: SharedInput,
        heading: SharedHeading,
        recorder: Recorder,
    }

    fn harness_with(config: ChassisConfig) -> Harness {
        let bus = SimulatedBus::new(IDS);
        let input = SharedInput::default();
        let heading = SharedHeading::default();
        heading.set_yaw(Some(0.0));
        let recorder = Recorder::default();

        let runtime = Runtime::init(
            config,
            WheelActuators::new(Box::new(bus.clone()), IDS),
            Collaborators {
                input: Box::new(input.clone()),
                heading: Box::new(heading.clone()),
                telemetry: Box::new(recorder.clone()),
                indicator: Box::new(recorder.clone()),
            },
        )
        .unwrap();

        Harness {
            runtime,
            bus,
            input,
            heading,
            recorder,
        }
    }

    fn harness() -> Harness {
        harness_with(ChassisConfig::default())
    }

    fn armed() -> OperatorInputSample {
        OperatorInputSample::new().with_switch(Switch::Right, SwitchLevel::Up)
    }

    fn tripped() -> OperatorInputSample {
        OperatorInputSample::new()
            .with_axis(Axis::LeftY, 1.0)
            .with_switch(Switch::Right, SwitchLevel::Down)
    }

    #[test]
    fn test_forward_stick_drives_all_wheels_equally() {
        let mut h = harness();
        h.input.set(Some(armed().with_axis(Axis::LeftY, 0.5)));

        let report = h.runtime.step();
        assert_eq!(report.interlock, InterlockState::Armed);

        let expected = 0.5 * crate::config::LINEAR_SPEED_SCALE / crate::config::WHEEL_RADIUS;
        for v in h.bus.references(IDS).as_array() {
            assert!((v - expected).abs() < EPS, "{} != {}", v, expected);
        }
    }

    #[test]
    fn test_lateral_stick_sign() {
        // Stick right drives right, which is negative vy
        let mut h = harness();
        h.input.set(Some(armed().with_axis(Axis::LeftX, 1.0)));
        let command = h.runtime.step().command.unwrap();
        assert!((command.vy + crate::config::LINEAR_SPEED_SCALE).abs() < EPS);

        let mut h = harness_with(ChassisConfig {
            lateral_sign_inverted: false,
            ..Default::default()
        });
        h.input.set(Some(armed().with_axis(Axis::LeftX, 1.0)));
        let command = h.runtime.step().command.unwrap();
        assert!((command.vy - crate::config::LINEAR_SPEED_SCALE).abs() < EPS);
    }

    #[test]
    fn test_indicator_fires_only_on_transitions() {
        let mut h = harness();
        let sequence = [None, Some(tripped()), Some(armed()), Some(armed()), None];
        let mut states = Vec::new();
        for input in sequence {
            h.input.set(input);
            states.push(h.runtime.step().interlock);
        }

        use InterlockState::*;
        assert_eq!(states, vec![Tripped, Tripped, Armed, Armed, Tripped]);
        assert_eq!(
            *h.recorder.indications.lock().unwrap(),
            vec![
                IndicatorPattern::warning(),
                IndicatorPattern::normal(),
                IndicatorPattern::warning()
            ]
        );
    }

    #[test]
    fn test_tripped_forces_zero() {
        let mut h = harness();
        h.input.set(Some(armed().with_axis(Axis::LeftY, 1.0).with_axis(Axis::RightX, 1.0)));
        h.runtime.step();
        assert!(!h.bus.references(IDS).is_zero());

        // Emergency switch with the stick still pushed
        h.input.set(Some(tripped()));
        let report = h.runtime.step();
        assert_eq!(report.interlock, InterlockState::Tripped);
        assert!(report.command.is_none());
        assert!(h.bus.references(IDS).is_zero());

        // Disconnected
        h.input.set(Some(armed().with_axis(Axis::LeftY, 1.0)));
        h.runtime.step();
        h.input.set(None);
        h.runtime.step();
        assert!(h.bus.references(IDS).is_zero());

        // Marked invalid by the source
        let mut invalid = armed().with_axis(Axis::LeftY, 1.0);
        invalid.valid = false;
        h.input.set(Some(invalid));
        assert_eq!(h.runtime.step().interlock, InterlockState::Tripped);
        assert!(h.bus.references(IDS).is_zero());
    }

    #[test]
    fn test_telemetry_mirrors_every_cycle() {
        let mut h = harness();
        h.input.set(None);
        h.runtime.step();
        h.input.set(Some(armed().with_axis(Axis::LeftY, 0.2)));
        let report = h.runtime.step();

        let published = h.recorder.wheels.lock().unwrap().clone();
        assert_eq!(published.len(), 2);
        assert!(published[0].is_zero());
        assert_eq!(published[1], report.wheels);
    }

    #[test]
    fn test_partial_actuator_failure_isolated() {
        let mut h = harness();
        h.bus.set_offline(2, true);
        h.input.set(Some(armed().with_axis(Axis::LeftY, 0.5)));

        let report = h.runtime.step();
        assert_eq!(report.dispatch.failed_wheels(), vec![Wheel::FrontRight]);
        assert_eq!(h.bus.reference(1), Some(report.wheels.front_left));
        assert_eq!(h.bus.reference(2), None);
        assert_eq!(h.bus.reference(3), Some(report.wheels.back_left));
        assert_eq!(h.bus.reference(4), Some(report.wheels.back_right));

        // Zeroing on trip still reaches the healthy wheels
        h.input.set(None);
        h.runtime.step();
        assert_eq!(h.bus.reference(1), Some(0.0));
        assert_eq!(h.bus.reference(3), Some(0.0));
        assert_eq!(h.bus.reference(4), Some(0.0));
    }

    #[test]
    fn test_heading_lock_seeds_then_corrects() {
        let mut h = harness();
        h.heading.set_yaw(Some(1.0));
        h.input.set(Some(armed()));

        let report = h.runtime.step();
        assert_eq!(report.command.unwrap().omega, 0.0);
        let state = h.runtime.heading_lock().state();
        assert!(state.initialized);
        assert!((state.target_yaw - 1.0).abs() < EPS);

        // Pushed clockwise: lock turns back counter-clockwise
        h.heading.set_yaw(Some(0.8));
        assert!(h.runtime.step().command.unwrap().omega > 0.0);
    }

    #[test]
    fn test_manual_rotation_passes_through() {
        let mut h = harness();
        h.input.set(Some(armed().with_axis(Axis::RightX, 0.5)));
        h.heading.set_yaw(Some(0.3));

        let command = h.runtime.step().command.unwrap();
        assert!((command.omega + 0.5 * crate::config::ANGULAR_SPEED_SCALE).abs() < EPS);
        assert!((h.runtime.heading_lock().state().target_yaw - 0.3).abs() < EPS);
    }

    #[test]
    fn test_stick_inside_deadzone_holds_heading() {
        let mut h = harness();
        h.input.set(Some(armed().with_axis(Axis::RightX, 0.01)));
        let command = h.runtime.step().command.unwrap();
        assert_eq!(command.omega, 0.0);
    }

    #[test]
    fn test_missing_heading_falls_back_to_zero_rotation() {
        let mut h = harness();
        h.heading.set_yaw(None);
        h.input.set(Some(
            armed()
                .with_axis(Axis::LeftY, 0.5)
                .with_axis(Axis::RightX, 1.0),
        ));

        let command = h.runtime.step().command.unwrap();
        assert_eq!(command.omega, 0.0);
        assert!(command.vx > 0.0);
        assert!(!h.runtime.heading_lock().state().initialized);

        // NaN from the sensor is treated the same
        h.heading.0.lock().unwrap().replace(f32::NAN);
        assert_eq!(h.runtime.step().command.unwrap().omega, 0.0);

        // So is a finite but garbage reading, and the cycle still completes
        h.heading.0.lock().unwrap().replace(1.0e9);
        let report = h.runtime.step();
        assert_eq!(report.command.unwrap().omega, 0.0);
        assert!(report.dispatch.is_ok());
    }

    #[test]
    fn test_trip_keeps_held_heading_by_default() {
        let mut h = harness();
        h.heading.set_yaw(Some(0.5));
        h.input.set(Some(armed()));
        h.runtime.step();

        h.input.set(None);
        h.heading.set_yaw(Some(-0.4));
        h.runtime.step();

        h.input.set(Some(armed()));
        h.runtime.step();
        let state = h.runtime.heading_lock().state();
        assert!((state.target_yaw - 0.5).abs() < EPS);
    }

    #[test]
    fn test_reseed_on_rearm_option() {
        let mut h = harness_with(ChassisConfig {
            reseed_on_rearm: true,
            ..Default::default()
        });
        h.heading.set_yaw(Some(0.5));
        h.input.set(Some(armed()));
        h.runtime.step();

        h.input.set(None);
        h.heading.set_yaw(Some(-0.4));
        h.runtime.step();

        h.input.set(Some(armed()));
        let report = h.runtime.step();
        assert_eq!(report.command.unwrap().omega, 0.0);
        let state = h.runtime.heading_lock().state();
        assert!((state.target_yaw + 0.4).abs() < EPS);
    }

    #[test]
    fn test_init_fails_when_motor_cannot_enable() {
        let bus = SimulatedBus::new(IDS);
        bus.set_offline(4, true);
        let recorder = Recorder::default();

        let result = Runtime::init(
            ChassisConfig::default(),
            WheelActuators::new(Box::new(bus), IDS),
            Collaborators {
                input: Box::new(SharedInput::default()),
                heading: Box::new(SharedHeading::default()),
                telemetry: Box::new(recorder.clone()),
                indicator: Box::new(recorder),
            },
        );
        match result {
            Err(RuntimeError::Startup(e)) => assert_eq!(e.wheel, Wheel::BackRight),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("runtime started with an offline motor"),
        }
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let mut config = ChassisConfig::default();
        config.geometry.track_width = -1.0;
        let recorder = Recorder::default();

        let result = Runtime::init(
            config,
            WheelActuators::new(Box::new(SimulatedBus::new(IDS)), IDS),
            Collaborators {
                input: Box::new(SharedInput::default()),
                heading: Box::new(SharedHeading::default()),
                telemetry: Box::new(recorder.clone()),
                indicator: Box::new(recorder),
            },
        );
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_cleanup_zeros_and_releases() {
        let mut h = harness();
        h.input.set(Some(armed().with_axis(Axis::LeftY, 1.0)));
        h.runtime.step();

        h.runtime.cleanup();
        assert!(h.bus.references(IDS).is_zero());
        assert!(IDS.iter().all(|&id| !h.bus.is_enabled(id)));
    }

    fn cycles(h: &Harness) -> usize {
        h.recorder.wheels.lock().unwrap().len()
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_every_period_while_armed() {
        let mut h = harness();
        h.input.set(Some(armed().with_axis(Axis::LeftY, 0.5)));

        // Ticks at 0, 10, ..., 100 ms
        let result = timeout(Duration::from_millis(105), h.runtime.run()).await;
        assert!(result.is_err());
        assert_eq!(cycles(&h), 11);
        assert!(!h.bus.references(IDS).is_zero());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_backs_off_while_tripped() {
        let mut h = harness();
        h.input.set(Some(armed().with_axis(Axis::LeftY, 0.5)));
        h.runtime.step();
        h.recorder.wheels.lock().unwrap().clear();
        h.input.set(None);

        // Cycles at 0, 510 and 1020 ms: each trip sleeps 500 ms, then the tick restarts
        let result = timeout(Duration::from_millis(1250), h.runtime.run()).await;
        assert!(result.is_err());
        assert_eq!(cycles(&h), 3);
        // Zero went out before the first backoff
        assert!(h.bus.references(IDS).is_zero());
        assert!(h.recorder.wheels.lock().unwrap().iter().all(|w| w.is_zero()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_resumes_period_after_rearm() {
        let mut h = harness();
        let input = h.input.clone();
        input.set(None);

        let rearm = async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            input.set(Some(armed()));
        };
        // Trip at 0 ms, re-armed during backoff, then ticks at 510, 520, ..., 600 ms
        let run = timeout(Duration::from_millis(605), h.runtime.run());
        let (result, ()) = tokio::join!(run, rearm);
        assert!(result.is_err());
        assert_eq!(cycles(&h), 11);
    }
}
