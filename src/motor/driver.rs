// Wheel registry for the mecanum base
//
// Owns the motor bus exclusively; each wheel is just a motor id on it. Dispatch
// talks to every wheel independently so one stalled motor cannot keep the others
// from receiving their reference (most importantly a zero when tripped).

use tracing::{debug, info, warn};

use super::{ActuatorError, MotorBus};
use crate::messages::{Wheel, WheelVelocities};

/// A motor failure tagged with the wheel it belongs to
#[derive(Debug, thiserror::Error)]
#[error("{wheel} wheel (motor {motor_id}): {source}")]
pub struct WheelError {
    pub wheel: Wheel,
    pub motor_id: u8,
    #[source]
    pub source: ActuatorError,
}

/// Outcome of sending one set of references
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub failures: Vec<WheelError>,
}

impl DispatchReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_wheels(&self) -> Vec<Wheel> {
        self.failures.iter().map(|f| f.wheel).collect()
    }
}

/// High-level driver for the four wheel motors
pub struct WheelActuators {
    bus: Box<dyn MotorBus>,
    motor_ids: [u8; 4], // [front_left, front_right, back_left, back_right]
}

impl WheelActuators {
    pub fn new(bus: Box<dyn MotorBus>, motor_ids: [u8; 4]) -> Self {
        Self { bus, motor_ids }
    }

    pub fn motor_id(&self, wheel: Wheel) -> u8 {
        self.motor_ids[wheel.index()]
    }

    /// Enable every wheel; the first failure aborts startup
    pub fn enable_all(&mut self) -> Result<(), WheelError> {
        info!("Enabling wheel motors {:?}", self.motor_ids);
        for wheel in Wheel::ALL {
            let motor_id = self.motor_id(wheel);
            self.bus
                .enable(motor_id)
                .map_err(|source| WheelError {
                    wheel,
                    motor_id,
                    source,
                })?;
            debug!("{} wheel (motor {}) enabled", wheel, motor_id);
        }
        info!("Wheel motors enabled");
        Ok(())
    }

    /// Send references to all four wheels, continuing past individual failures
    pub fn dispatch(&mut self, velocities: &WheelVelocities) -> DispatchReport {
        let mut report = DispatchReport::default();

        for wheel in Wheel::ALL {
            let motor_id = self.motor_id(wheel);
            if let Err(source) = self
                .bus
                .set_angular_velocity_reference(motor_id, velocities.get(wheel))
            {
                report.failures.push(WheelError {
                    wheel,
                    motor_id,
                    source,
                });
            }
        }
        report
    }

    /// Command zero velocity on every wheel
    pub fn stop(&mut self) -> DispatchReport {
        self.dispatch(&WheelVelocities::zero())
    }

    /// Stop, then release torque on every wheel
    pub fn shutdown(&mut self) {
        info!("Stopping all wheels");
        for failure in self.stop().failures {
            warn!("Failed to stop: {}", failure);
        }
        for wheel in Wheel::ALL {
            let motor_id = self.motor_id(wheel);
            if let Err(e) = self.bus.disable(motor_id) {
                warn!("Failed to disable {} wheel (motor {}): {}", wheel, motor_id, e);
            }
        }
    }
}

impl Drop for WheelActuators {
    fn drop(&mut self) {
        // Never leave the wheels spinning on the last reference
        for failure in self.stop().failures {
            warn!("Failed to stop on drop: {}", failure);
        }
    }
}
