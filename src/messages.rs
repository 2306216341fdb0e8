// Message types flowing through one control cycle

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::control::heading::normalize_angle;

/// Body-frame velocity command fed to the kinematics solver
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyVelocityCommand {
    pub vx: f32,    // m/s, forward positive
    pub vy: f32,    // m/s, left positive
    pub omega: f32, // rad/s, counter-clockwise positive
}

/// The four wheels of the chassis, in dispatch order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wheel {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl Wheel {
    pub const ALL: [Wheel; 4] = [
        Wheel::FrontLeft,
        Wheel::FrontRight,
        Wheel::BackLeft,
        Wheel::BackRight,
    ];

    pub fn index(self) -> usize {
        match self {
            Wheel::FrontLeft => 0,
            Wheel::FrontRight => 1,
            Wheel::BackLeft => 2,
            Wheel::BackRight => 3,
        }
    }
}

impl fmt::Display for Wheel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Wheel::FrontLeft => "front_left",
            Wheel::FrontRight => "front_right",
            Wheel::BackLeft => "back_left",
            Wheel::BackRight => "back_right",
        };
        f.write_str(name)
    }
}

/// Wheel angular velocities in rad/s, one per wheel
// Default gives all-zero velocities, which is what we send when tripped
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelVelocities {
    pub front_left: f32,
    pub front_right: f32,
    pub back_left: f32,
    pub back_right: f32,
}

impl WheelVelocities {
    pub fn new(front_left: f32, front_right: f32, back_left: f32, back_right: f32) -> Self {
        Self {
            front_left,
            front_right,
            back_left,
            back_right,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn get(&self, wheel: Wheel) -> f32 {
        self.as_array()[wheel.index()]
    }

    /// Returns velocities as array [front_left, front_right, back_left, back_right]
    pub fn as_array(&self) -> [f32; 4] {
        [
            self.front_left,
            self.front_right,
            self.back_left,
            self.back_right,
        ]
    }

    pub fn is_zero(&self) -> bool {
        self.as_array().iter().all(|&v| v == 0.0)
    }
}

/// Logical analog channels of the operator's controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    LeftX,
    LeftY,
    RightX,
    RightY,
}

/// Logical discrete switch channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Switch {
    Left,
    Right,
}

/// Three-position switch level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchLevel {
    Up,
    Middle,
    Down,
}

/// One snapshot of the operator's controller
///
/// `valid == false` means the source considers itself disconnected or stale; the
/// interlock treats that the same as a missing sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorInputSample {
    pub axes: HashMap<Axis, f32>,
    pub switches: HashMap<Switch, SwitchLevel>,
    pub valid: bool,
}

impl OperatorInputSample {
    pub fn new() -> Self {
        Self {
            axes: HashMap::new(),
            switches: HashMap::new(),
            valid: true,
        }
    }

    pub fn with_axis(mut self, axis: Axis, value: f32) -> Self {
        self.axes.insert(axis, value);
        self
    }

    pub fn with_switch(mut self, switch: Switch, level: SwitchLevel) -> Self {
        self.switches.insert(switch, level);
        self
    }

    /// Normalized axis value in [-1, 1]; unmapped or non-finite channels read as 0
    pub fn axis(&self, axis: Axis) -> f32 {
        match self.axes.get(&axis) {
            Some(v) if v.is_finite() => v.clamp(-1.0, 1.0),
            _ => 0.0,
        }
    }

    pub fn switch(&self, switch: Switch) -> Option<SwitchLevel> {
        self.switches.get(&switch).copied()
    }
}

impl Default for OperatorInputSample {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest raw yaw magnitude (rad) accepted from a heading sensor
pub const MAX_SENSOR_YAW: f32 = 1.0e3;

/// Chassis heading snapshot, radians in (-pi, pi], counter-clockwise positive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadingState {
    pub current_yaw: f32,
}

impl HeadingState {
    pub fn new(current_yaw: f32) -> Self {
        Self {
            current_yaw: normalize_angle(current_yaw),
        }
    }

    /// Build from a raw IMU yaw reading.
    ///
    /// The IMU reports yaw clockwise-positive, so the reading is negated before
    /// use. Non-finite or implausibly large readings are rejected.
    pub fn from_sensor_yaw(raw_yaw: f32) -> Option<Self> {
        if raw_yaw.is_finite() && raw_yaw.abs() <= MAX_SENSOR_YAW {
            Some(Self::new(-raw_yaw))
        } else {
            None
        }
    }
}

/// Safety interlock decision for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterlockState {
    Armed,
    Tripped,
}

/// RGB color for the status LED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
    pub const GREEN: Rgb = Rgb { r: 0, g: 255, b: 0 };
}

/// How the status LED animates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IndicatorMode {
    Solid,
    Blink { period_ms: u32, duty: f32 },
    Breathe { period_ms: u32 },
}

/// Full status-indicator request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPattern {
    pub color: Rgb,
    #[serde(flatten)]
    pub mode: IndicatorMode,
}

impl IndicatorPattern {
    /// Fast red blink shown while the interlock is tripped
    pub fn warning() -> Self {
        Self {
            color: Rgb::RED,
            mode: IndicatorMode::Blink {
                period_ms: 200,
                duty: 0.5,
            },
        }
    }

    /// Slow green breathe shown while armed
    pub fn normal() -> Self {
        Self {
            color: Rgb::GREEN,
            mode: IndicatorMode::Breathe { period_ms: 2000 },
        }
    }

    pub fn for_state(state: InterlockState) -> Self {
        match state {
            InterlockState::Armed => Self::normal(),
            InterlockState::Tripped => Self::warning(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_axis_defaults_and_clamps() {
        let sample = OperatorInputSample::new()
            .with_axis(Axis::LeftY, 1.7)
            .with_axis(Axis::LeftX, f32::NAN);
        assert_eq!(sample.axis(Axis::LeftY), 1.0);
        assert_eq!(sample.axis(Axis::LeftX), 0.0);
        assert_eq!(sample.axis(Axis::RightX), 0.0);
    }

    #[test]
    fn test_sensor_yaw_is_negated_and_wrapped() {
        let heading = HeadingState::from_sensor_yaw(0.5).unwrap();
        assert!((heading.current_yaw + 0.5).abs() < 1e-6);

        let heading = HeadingState::from_sensor_yaw(-3.0 * PI / 2.0).unwrap();
        assert!((heading.current_yaw - (-PI / 2.0)).abs() < 1e-5);

        assert!(HeadingState::from_sensor_yaw(f32::NAN).is_none());
        assert!(HeadingState::from_sensor_yaw(f32::INFINITY).is_none());
    }

    #[test]
    fn test_garbage_sensor_yaw_is_unavailable() {
        assert!(HeadingState::from_sensor_yaw(1.0e9).is_none());
        assert!(HeadingState::from_sensor_yaw(-1.0e9).is_none());

        // A few turns of unwrapped yaw is still a valid reading
        let heading = HeadingState::from_sensor_yaw(10.0 * PI + 0.25).unwrap();
        assert!((heading.current_yaw + 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_wheel_lookup_matches_fields() {
        let wheels = WheelVelocities::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(wheels.get(Wheel::FrontLeft), 1.0);
        assert_eq!(wheels.get(Wheel::FrontRight), 2.0);
        assert_eq!(wheels.get(Wheel::BackLeft), 3.0);
        assert_eq!(wheels.get(Wheel::BackRight), 4.0);
        assert!(WheelVelocities::zero().is_zero());
    }

    #[test]
    fn test_indicator_serializes_flat() {
        let json = serde_json::to_value(IndicatorPattern::warning()).unwrap();
        assert_eq!(json["mode"], "blink");
        assert_eq!(json["period_ms"], 200);
        assert_eq!(json["color"]["r"], 255);
    }
}
