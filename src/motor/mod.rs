// Motor control module for the mecanum base
//
// Provides:
// - The `MotorBus` boundary every wheel motor transport implements
// - Wheel registry that owns one bus and addresses the four wheels by id
// - Feetech STS serial protocol implementation
// - Simulated bus for running without hardware

mod driver;
pub mod feetech;
pub mod sim;

pub use driver::{DispatchReport, WheelActuators, WheelError};
pub use feetech::{FeetechBus, FeetechError, FeetechMotorBus};
pub use sim::{MirroredBus, SimulatedBus};

/// Error types for a single wheel motor
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Motor bus error: {0}")]
    Bus(#[from] FeetechError),

    #[error("Motor {id} not responding")]
    NotResponding { id: u8 },

    #[error("Motor {id} is not configured on this bus")]
    UnknownMotor { id: u8 },

    #[error("Motor {id} is offline")]
    Offline { id: u8 },
}

/// Transport shared by all wheel motors of one chassis
pub trait MotorBus: Send {
    /// Prepare one motor for velocity control, called once per wheel at startup
    fn enable(&mut self, motor_id: u8) -> Result<(), ActuatorError>;

    /// Command one motor's angular velocity in rad/s (wheel frame, before mounting inversion)
    fn set_angular_velocity_reference(
        &mut self,
        motor_id: u8,
        rad_per_s: f32,
    ) -> Result<(), ActuatorError>;

    /// Release one motor (torque off)
    fn disable(&mut self, _motor_id: u8) -> Result<(), ActuatorError> {
        Ok(())
    }
}
