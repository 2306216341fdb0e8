// Command generation for the mecanum base
//
// Provides:
// - Mecanum inverse kinematics (body velocity -> wheel velocities)
// - Heading lock (PID hold of the released heading)
// - Safety interlock (armed / tripped decision)

pub mod heading;
pub mod interlock;
pub mod kinematics;
pub mod pid;

pub use heading::{HeadingLock, HeadingLockConfig, normalize_angle};
pub use interlock::{SafetyInterlock, TransitionDetector};
pub use kinematics::{ChassisGeometry, MecanumKinematics};
pub use pid::{PidConfig, PidController};
