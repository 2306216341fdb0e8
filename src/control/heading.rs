// Heading lock: hold the last released heading with a PID on the yaw error

use std::f32::consts::PI;

use tracing::debug;

use super::pid::{PidConfig, PidController};
use crate::messages::HeadingState;

/// Two times PI (full circle in radians).
pub const TWO_PI: f32 = 2.0 * PI;

/// Wrap an angle into (-pi, pi].
///
/// Reduces with `%` first, so any finite magnitude lands in range in bounded time.
pub fn normalize_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return angle;
    }
    let mut a = angle % TWO_PI;
    if a > PI {
        a -= TWO_PI;
    } else if a <= -PI {
        a += TWO_PI;
    }
    a
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadingLockConfig {
    /// Manual rotation commands at or below this magnitude (rad/s) count as released
    pub rotation_deadzone: f32,
    pub pid: PidConfig,
}

/// State persisted across cycles
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadingLockState {
    pub target_yaw: f32,
    pub initialized: bool,
}

/// Passes manual rotation through, or holds the remembered heading when released
#[derive(Debug)]
pub struct HeadingLock {
    deadzone: f32,
    pid: PidController,
    state: HeadingLockState,
}

impl HeadingLock {
    pub fn new(config: HeadingLockConfig) -> Self {
        Self {
            deadzone: config.rotation_deadzone,
            pid: PidController::new(config.pid),
            state: HeadingLockState::default(),
        }
    }

    pub fn state(&self) -> HeadingLockState {
        self.state
    }

    /// Compute the angular velocity command (rad/s) for this cycle
    ///
    /// `heading` must hold a finite yaw.
    pub fn update(&mut self, manual_omega: f32, heading: HeadingState, dt: f32) -> f32 {
        let yaw = heading.current_yaw;

        if !self.state.initialized {
            debug!("Heading lock seeded at {:.3} rad", yaw);
            self.seed(yaw);
        }

        if manual_omega.abs() > self.deadzone {
            // Operator is steering: follow the chassis so the lock engages where rotation stops
            self.seed(yaw);
            return manual_omega;
        }

        let error = normalize_angle(self.state.target_yaw - yaw);
        self.pid.update(error, dt)
    }

    /// Forget the held heading; the next armed cycle seeds from the current yaw
    pub fn reset(&mut self) {
        self.state = HeadingLockState::default();
        self.pid.reset();
    }

    fn seed(&mut self, yaw: f32) {
        self.state.target_yaw = yaw;
        self.state.initialized = true;
        // Old error history refers to a different target
        self.pid.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.01;

    fn lock() -> HeadingLock {
        HeadingLock::new(HeadingLockConfig {
            rotation_deadzone: 0.2,
            pid: PidConfig {
                kp: 1.0,
                ki: 0.0,
                kd: 0.0,
                max_output: 10.0,
                deadband: 0.0,
                integral_limit: 1.0,
            },
        })
    }

    #[test]
    fn test_normalize_angle() {
        assert!((normalize_angle(PI / 2.0) - PI / 2.0).abs() < 1e-6);
        assert_eq!(normalize_angle(PI), PI);
        assert!((normalize_angle(-PI) - PI).abs() < 1e-6);
        assert!((normalize_angle(6.0) - (6.0 - TWO_PI)).abs() < 1e-6);
        // Several turns away still lands in range
        let a = normalize_angle(7.0 * TWO_PI + 0.3);
        assert!((a - 0.3).abs() < 1e-3);
        let a = normalize_angle(-5.0 * TWO_PI - 0.3);
        assert!((a + 0.3).abs() < 1e-3);
    }

    #[test]
    fn test_normalize_angle_huge_magnitude() {
        // Beyond f32 resolution of a 2*pi step; must still return in range
        for angle in [1.0e9f32, -1.0e9, 3.0e38, f32::MAX, -f32::MAX] {
            let a = normalize_angle(angle);
            assert!(a > -PI && a <= PI, "{} -> {}", angle, a);
        }
    }

    #[test]
    fn test_first_cycle_seeds_target() {
        let mut lock = lock();
        assert!(!lock.state().initialized);

        let omega = lock.update(0.0, HeadingState::new(1.0), DT);
        assert_eq!(omega, 0.0);
        assert!(lock.state().initialized);
        assert_eq!(lock.state().target_yaw, 1.0);
    }

    #[test]
    fn test_error_wraps_across_pi() {
        let mut lock = lock();
        lock.update(0.0, HeadingState::new(3.0), DT);

        // Raw error 3.0 - (-3.0) = 6.0 wraps to about -0.283
        let omega = lock.update(0.0, HeadingState::new(-3.0), DT);
        assert!((omega - (6.0 - TWO_PI)).abs() < 1e-4, "omega {}", omega);
        assert!(omega > -PI && omega <= PI);
    }

    #[test]
    fn test_manual_rotation_passes_through_and_reseeds() {
        let mut lock = lock();
        lock.update(0.0, HeadingState::new(0.0), DT);

        for (i, yaw) in [0.1f32, 0.4, 0.9, 1.3].iter().enumerate() {
            let cmd = 0.5 + i as f32 * 0.1;
            let omega = lock.update(cmd, HeadingState::new(*yaw), DT);
            assert_eq!(omega, cmd);
            assert_eq!(lock.state().target_yaw, *yaw);
        }

        // Released: hold where rotation stopped, not the pre-rotation heading
        let omega = lock.update(0.0, HeadingState::new(1.3), DT);
        assert_eq!(omega, 0.0);
        assert_eq!(lock.state().target_yaw, 1.3);
    }

    #[test]
    fn test_holds_against_disturbance() {
        let mut lock = lock();
        lock.update(0.0, HeadingState::new(0.5), DT);

        // Knocked clockwise: command turns back counter-clockwise
        let omega = lock.update(0.1, HeadingState::new(0.3), DT);
        assert!((omega - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_reset_forgets_target() {
        let mut lock = lock();
        lock.update(0.0, HeadingState::new(0.5), DT);
        lock.reset();
        assert!(!lock.state().initialized);

        let omega = lock.update(0.0, HeadingState::new(-1.0), DT);
        assert_eq!(omega, 0.0);
        assert_eq!(lock.state().target_yaw, -1.0);
    }
}
