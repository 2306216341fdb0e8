// Heading sources
//
// Sources report the raw sensor yaw (radians, clockwise positive, as the IMU
// mounts it). The runtime converts it to a `HeadingState`.

use std::time::Instant;

use crate::control::heading::normalize_angle;
use crate::control::kinematics::{ChassisGeometry, MecanumKinematics};
use crate::motor::SimulatedBus;

/// Non-blocking source of the chassis yaw
pub trait HeadingSource: Send {
    /// Latest raw yaw, or `None` when the sensor has no valid reading
    fn sample(&mut self) -> Option<f32>;
}

/// Yaw integrated from the wheel references recorded on a simulated bus
///
/// Stands in for an IMU: assumes the wheels track their references perfectly
/// and never slip, so it cannot see external disturbances.
pub struct DeadReckoningImu {
    bus: SimulatedBus,
    motor_ids: [u8; 4],
    kinematics: MecanumKinematics,
    yaw: f32, // counter-clockwise positive, (-pi, pi]
    last_sample: Option<Instant>,
}

impl DeadReckoningImu {
    pub fn new(bus: SimulatedBus, motor_ids: [u8; 4], geometry: &ChassisGeometry) -> Self {
        Self {
            bus,
            motor_ids,
            kinematics: MecanumKinematics::new(geometry),
            yaw: 0.0,
            last_sample: None,
        }
    }

    /// Advance the simulated heading by `dt` seconds at the current wheel references
    pub fn integrate(&mut self, dt: f32) {
        let wheels = self.bus.references(self.motor_ids);
        self.yaw = normalize_angle(self.yaw + self.kinematics.forward(&wheels).omega * dt);
    }

    /// Yaw in the sensor's clockwise-positive convention
    pub fn raw_yaw(&self) -> f32 {
        -self.yaw
    }
}

impl HeadingSource for DeadReckoningImu {
    fn sample(&mut self) -> Option<f32> {
        let now = Instant::now();
        if let Some(last) = self.last_sample {
            self.integrate((now - last).as_secs_f32());
        }
        self.last_sample = Some(now);
        Some(self.raw_yaw())
    }
}
