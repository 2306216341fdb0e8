// Feetech STS serial servo protocol, velocity mode only
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]

use serialport::SerialPort;
use std::f32::consts::PI;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

use super::{ActuatorError, MotorBus};
use crate::config::MotorConfig;

/// Default serial configuration for Feetech motors
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
/// Read timeout per status reply. Writes are blocking round trips made from the
/// control loop, so each silent motor stretches a cycle by up to this much (up
/// to four times this with every wheel silent); healthy wheels are still
/// written, only later.
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Motor resolution: 4096 steps per revolution
const STEPS_PER_RAD: f32 = 4096.0 / (2.0 * PI);

/// Maximum raw velocity command in steps/s (safety limit)
pub const MAX_RAW: i16 = 3000;

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
enum Instruction {
    Ping = 0x01,
    Write = 0x03,
}

/// RAM registers used for velocity control
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    OperatingMode = 33, // 1 byte: 0=position, 1=velocity, 2=PWM, 3=step
    TorqueEnable = 40,  // 1 byte: 0=off, 1=on
    GoalVelocity = 46,  // 2 bytes (sign-magnitude, velocity mode)
    Lock = 55,          // 1 byte: 0=unlocked, 1=locked
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
}

/// Error types for Feetech communication
#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from motor {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for motor {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Motor {id} returned error status: 0x{status:02X}")]
    MotorError { id: u8, status: u8 },

    #[error("Timeout waiting for response from motor {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Feetech motor bus over any byte port (a serial port in production)
pub struct FeetechBus<P> {
    port: P,
}

impl FeetechBus<Box<dyn SerialPort>> {
    /// Open a serial connection to the motor bus
    pub fn open(port_name: &str) -> Result<Self> {
        let port = serialport::new(port_name, DEFAULT_BAUDRATE)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self { port })
    }
}

impl<P: Read + Write> FeetechBus<P> {
    pub fn with_port(port: P) -> Self {
        Self { port }
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);
        packet.push(Self::checksum(&packet[2..]));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_exact_or_timeout(&mut self, buf: &mut [u8], id: u8) -> Result<()> {
        self.port.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => FeetechError::Timeout { id },
            _ => FeetechError::Io(e),
        })
    }

    /// Read a status packet and return its parameters
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut head = [0u8; 4];
        self.read_exact_or_timeout(&mut head, expected_id)?;

        if head[..2] != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", &head[..2]),
            });
        }
        let (id, length) = (head[2], head[3] as usize);
        if id != expected_id {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }
        if length < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Length {} too short", length),
            });
        }

        // error byte + params + checksum
        let mut body = vec![0u8; length];
        self.read_exact_or_timeout(&mut body, id)?;

        let (payload, received) = body.split_at(length - 1);
        let mut checksum_data = vec![id, length as u8];
        checksum_data.extend_from_slice(payload);
        if Self::checksum(&checksum_data) != received[0] {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        if payload[0] != 0 {
            return Err(FeetechError::MotorError {
                id,
                status: payload[0],
            });
        }
        Ok(payload[1..].to_vec())
    }

    /// Ping a motor; `false` when it does not answer in time
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        let packet = Self::build_packet(id, Instruction::Write, &[register as u8, value]);
        debug!("Write u8 to motor {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;
        self.read_response(id).map(|_| ())
    }

    /// Write two bytes (little-endian) to a register
    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        let [lo, hi] = value.to_le_bytes();
        let packet = Self::build_packet(id, Instruction::Write, &[register as u8, lo, hi]);
        debug!("Write u16 to motor {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;
        self.read_response(id).map(|_| ())
    }

    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Set operating mode (torque must be disabled first)
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    /// Set goal velocity in steps/s (motor must be in velocity mode)
    pub fn set_velocity(&mut self, id: u8, velocity: i16) -> Result<()> {
        self.write_u16(id, Register::GoalVelocity, encode_sign_magnitude(velocity))
    }
}

/// Encode a signed value to sign-magnitude format
/// Bit 15 = sign (1 = negative), Bits 0-14 = magnitude
fn encode_sign_magnitude(value: i16) -> u16 {
    let magnitude = value.unsigned_abs() & 0x7FFF;
    if value < 0 { 0x8000 | magnitude } else { magnitude }
}

/// Convert rad/s to raw steps/s, clamped to the motor limit
pub fn rad_per_s_to_raw(rad_per_s: f32) -> i16 {
    let steps = (rad_per_s * STEPS_PER_RAD).round();
    if steps.is_nan() {
        return 0;
    }
    steps.clamp(-(MAX_RAW as f32), MAX_RAW as f32) as i16
}

/// Four wheel motors on one Feetech bus
///
/// The bus is the single owner of the port; wheels address it by motor id.
pub struct FeetechMotorBus<P> {
    bus: FeetechBus<P>,
    inverted: Vec<(u8, bool)>,
}

impl<P: Read + Write> FeetechMotorBus<P> {
    pub fn new(bus: FeetechBus<P>, config: &MotorConfig) -> Self {
        let inverted = config
            .ids
            .iter()
            .copied()
            .zip(config.inverted.iter().copied())
            .collect();
        Self { bus, inverted }
    }

    fn direction(&self, id: u8) -> std::result::Result<f32, ActuatorError> {
        match self.inverted.iter().find(|(motor, _)| *motor == id) {
            Some((_, true)) => Ok(-1.0),
            Some((_, false)) => Ok(1.0),
            None => Err(ActuatorError::UnknownMotor { id }),
        }
    }
}

impl<P: Read + Write + Send> MotorBus for FeetechMotorBus<P> {
    /// Check the motor answers, switch it to velocity mode and enable torque
    fn enable(&mut self, motor_id: u8) -> std::result::Result<(), ActuatorError> {
        self.direction(motor_id)?;
        if !self.bus.ping(motor_id)? {
            return Err(ActuatorError::NotResponding { id: motor_id });
        }
        // Operating mode can only change with torque off
        self.bus.disable_torque(motor_id)?;
        self.bus.set_operating_mode(motor_id, OperatingMode::Velocity)?;
        self.bus.enable_torque(motor_id)?;
        Ok(())
    }

    fn set_angular_velocity_reference(
        &mut self,
        motor_id: u8,
        rad_per_s: f32,
    ) -> std::result::Result<(), ActuatorError> {
        let raw = rad_per_s_to_raw(rad_per_s * self.direction(motor_id)?);
        self.bus.set_velocity(motor_id, raw)?;
        Ok(())
    }

    fn disable(&mut self, motor_id: u8) -> std::result::Result<(), ActuatorError> {
        self.bus.disable_torque(motor_id)?;
        Ok(())
    }
}
