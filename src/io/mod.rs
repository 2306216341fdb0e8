// External collaborators of the control loop
//
// Provides:
// - Operator input (keyboard teleop)
// - Heading (dead reckoning from wheel references)
// - Telemetry and status indicator sinks (zenoh, log)

pub mod imu;
pub mod input;
pub mod telemetry;

pub use imu::{DeadReckoningImu, HeadingSource};
pub use input::{InputSource, KeyboardTeleop};
pub use telemetry::{LogSink, StatusIndicator, TelemetrySink, ZenohLink};
