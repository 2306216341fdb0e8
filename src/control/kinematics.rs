// Mecanum inverse kinematics for the four-wheel chassis
// Converts body-frame velocities (vx, vy, omega) to individual wheel angular velocities.
//
// Sign convention (rollers in an X pattern seen from above, all wheels spin
// positive when the chassis drives forward):
//   front_left  = (vx - vy - omega*(a+b)) / r
//   front_right = (vx + vy + omega*(a+b)) / r
//   back_left   = (vx + vy - omega*(a+b)) / r
//   back_right  = (vx - vy + omega*(a+b)) / r
// Motor mounting direction is handled by the motor bus, not here.

use serde::{Deserialize, Serialize};

use crate::messages::{BodyVelocityCommand, WheelVelocities};

/// Chassis dimensions in meters, all strictly positive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChassisGeometry {
    pub track_width: f32,  // left wheel center to right wheel center
    pub wheelbase: f32,    // front axle to back axle
    pub wheel_radius: f32,
}

impl ChassisGeometry {
    pub fn new(track_width: f32, wheelbase: f32, wheel_radius: f32) -> Self {
        Self {
            track_width,
            wheelbase,
            wheel_radius,
        }
    }

    /// Half track plus half wheelbase, the lever arm of a rotation command
    pub fn rotation_arm(&self) -> f32 {
        self.track_width / 2.0 + self.wheelbase / 2.0
    }
}

/// Stateless mecanum solver for one chassis geometry
#[derive(Debug, Clone, Copy)]
pub struct MecanumKinematics {
    arm: f32,
    wheel_radius: f32,
}

impl MecanumKinematics {
    pub fn new(geometry: &ChassisGeometry) -> Self {
        Self {
            arm: geometry.rotation_arm(),
            wheel_radius: geometry.wheel_radius,
        }
    }

    /// Convert a body velocity command to wheel angular velocities (rad/s)
    ///
    /// No clamping is done here, the actuator layer limits what it sends.
    pub fn solve(&self, cmd: &BodyVelocityCommand) -> WheelVelocities {
        let turn = cmd.omega * self.arm;
        let r = self.wheel_radius;

        WheelVelocities {
            front_left: (cmd.vx - cmd.vy - turn) / r,
            front_right: (cmd.vx + cmd.vy + turn) / r,
            back_left: (cmd.vx + cmd.vy - turn) / r,
            back_right: (cmd.vx - cmd.vy + turn) / r,
        }
    }

    /// Recover the body velocity from wheel angular velocities (least squares)
    pub fn forward(&self, wheels: &WheelVelocities) -> BodyVelocityCommand {
        let r = self.wheel_radius;
        let WheelVelocities {
            front_left: fl,
            front_right: fr,
            back_left: bl,
            back_right: br,
        } = *wheels;

        BodyVelocityCommand {
            vx: r * (fl + fr + bl + br) / 4.0,
            vy: r * (-fl + fr + bl - br) / 4.0,
            omega: r * (-fl + fr - bl + br) / (4.0 * self.arm),
        }
    }
}
