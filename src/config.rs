// Loop timing, topics, chassis geometry and controller tuning
//
// The constants are the compiled-in defaults. `ChassisConfig` mirrors them and can
// be overridden from a JSON file at startup; it is never mutated afterwards.
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::heading::HeadingLockConfig;
use crate::control::kinematics::ChassisGeometry;
use crate::control::pid::PidConfig;
use crate::messages::{Switch, SwitchLevel};

// Control loop period (100 Hz)
pub const LOOP_PERIOD: Duration = Duration::from_millis(10);

// Extra sleep after a tripped cycle, throttles re-evaluation while in the safe state
pub const TRIP_BACKOFF: Duration = Duration::from_millis(500);

// Operator input older than this is treated as disconnected
pub const INPUT_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_RT_WHEELS: &str = "chassis/rt/wheels"; // wheel velocity references
pub const TOPIC_INTERLOCK: &str = "chassis/state/interlock"; // armed / tripped
pub const TOPIC_INDICATOR: &str = "chassis/state/indicator"; // status LED requests

// Status indicator label
pub const INDICATOR_LABEL: &str = "chassis";

// Stick scaling
pub const LINEAR_SPEED_SCALE: f32 = 3.5; // m/s at full stick
pub const ANGULAR_SPEED_SCALE: f32 = 4.0; // rad/s at full stick
pub const ROTATION_DEADZONE: f32 = 0.05; // fraction of full stick

// Emergency switch: right switch pulled down trips the interlock
pub const EMERGENCY_SWITCH: Switch = Switch::Right;
pub const EMERGENCY_LEVEL: SwitchLevel = SwitchLevel::Down;

// Chassis geometry (meters)
pub const TRACK_WIDTH: f32 = 0.40;
pub const WHEELBASE: f32 = 0.36;
pub const WHEEL_RADIUS: f32 = 0.076;

// Heading hold PID
pub const HEADING_KP: f32 = 6.0;
pub const HEADING_KI: f32 = 0.2;
pub const HEADING_KD: f32 = 0.3;
pub const HEADING_MAX_OUTPUT: f32 = 3.0; // rad/s
pub const HEADING_DEADBAND: f32 = 0.005; // rad
pub const HEADING_INTEGRAL_LIMIT: f32 = 0.5; // rad/s contributed by the I term

// Motor bus
pub const MOTOR_PORT: &str = "/dev/ttyACM0";
pub const MOTOR_IDS: [u8; 4] = [1, 2, 3, 4]; // [front_left, front_right, back_left, back_right]
// Right-hand motors are mounted mirrored
pub const MOTOR_INVERTED: [bool; 4] = [false, true, false, true];

/// Error types for loading the configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {field} must be {requirement} (got {value})")]
    Invalid {
        field: &'static str,
        requirement: &'static str,
        value: f32,
    },
}

/// Serial motor bus settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    pub port: String,
    pub ids: [u8; 4],
    pub inverted: [bool; 4],
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            port: MOTOR_PORT.to_string(),
            ids: MOTOR_IDS,
            inverted: MOTOR_INVERTED,
        }
    }
}

/// Complete startup configuration of one chassis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisConfig {
    pub geometry: ChassisGeometry,
    pub heading_pid: PidConfig,
    pub linear_speed_scale: f32,
    pub angular_speed_scale: f32,
    pub rotation_deadzone: f32,
    pub emergency_switch: Switch,
    pub emergency_level: SwitchLevel,
    /// Negate the lateral stick so that pushing right drives right (vy is left-positive)
    pub lateral_sign_inverted: bool,
    /// Drop the held heading when the interlock re-arms after a trip
    pub reseed_on_rearm: bool,
    pub loop_period_ms: u64,
    pub trip_backoff_ms: u64,
    pub input_timeout_ms: u64,
    pub motors: MotorConfig,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            geometry: ChassisGeometry::new(TRACK_WIDTH, WHEELBASE, WHEEL_RADIUS),
            heading_pid: PidConfig {
                kp: HEADING_KP,
                ki: HEADING_KI,
                kd: HEADING_KD,
                max_output: HEADING_MAX_OUTPUT,
                deadband: HEADING_DEADBAND,
                integral_limit: HEADING_INTEGRAL_LIMIT,
            },
            linear_speed_scale: LINEAR_SPEED_SCALE,
            angular_speed_scale: ANGULAR_SPEED_SCALE,
            rotation_deadzone: ROTATION_DEADZONE,
            emergency_switch: EMERGENCY_SWITCH,
            emergency_level: EMERGENCY_LEVEL,
            lateral_sign_inverted: true,
            reseed_on_rearm: false,
            loop_period_ms: LOOP_PERIOD.as_millis() as u64,
            trip_backoff_ms: TRIP_BACKOFF.as_millis() as u64,
            input_timeout_ms: INPUT_TIMEOUT.as_millis() as u64,
            motors: MotorConfig::default(),
        }
    }
}

impl ChassisConfig {
    /// Load a config file; missing fields fall back to the defaults above
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("geometry.track_width", self.geometry.track_width),
            ("geometry.wheelbase", self.geometry.wheelbase),
            ("geometry.wheel_radius", self.geometry.wheel_radius),
            ("loop_period_ms", self.loop_period_ms as f32),
        ];
        for (field, value) in positive {
            // also rejects NaN
            if !(value > 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    requirement: "> 0",
                    value,
                });
            }
        }

        let non_negative = [
            ("heading_pid.max_output", self.heading_pid.max_output),
            ("heading_pid.deadband", self.heading_pid.deadband),
            ("heading_pid.integral_limit", self.heading_pid.integral_limit),
            ("linear_speed_scale", self.linear_speed_scale),
            ("angular_speed_scale", self.angular_speed_scale),
            ("rotation_deadzone", self.rotation_deadzone),
        ];
        for (field, value) in non_negative {
            if !(value >= 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    requirement: ">= 0",
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_period_ms)
    }

    pub fn trip_backoff(&self) -> Duration {
        Duration::from_millis(self.trip_backoff_ms)
    }

    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }

    /// Heading-lock settings; the deadzone is given on the stick, the lock compares rad/s
    pub fn heading_lock(&self) -> HeadingLockConfig {
        HeadingLockConfig {
            rotation_deadzone: self.rotation_deadzone * self.angular_speed_scale,
            pid: self.heading_pid.clone(),
        }
    }
}
