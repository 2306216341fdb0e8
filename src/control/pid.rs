// Discrete single-axis PID operating directly on an error signal

use serde::{Deserialize, Serialize};

/// PID gains and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Output magnitude limit
    pub max_output: f32,
    /// Errors smaller than this are treated as zero
    pub deadband: f32,
    /// Magnitude limit of the integral contribution, stops windup when saturated
    pub integral_limit: f32,
}

/// A simple discrete PID controller.
#[derive(Debug, Clone)]
pub struct PidController {
    config: PidConfig,
    integral: f32,
    prev_error: Option<f32>,
}

impl PidController {
    pub fn new(config: PidConfig) -> Self {
        Self {
            config,
            integral: 0.0,
            prev_error: None,
        }
    }

    /// Compute control output for the current error.
    ///
    /// The first call after construction or `reset` has no derivative term,
    /// a large error on the first sample would otherwise produce a spike.
    pub fn update(&mut self, error: f32, dt: f32) -> f32 {
        let cfg = &self.config;
        let error = if error.abs() < cfg.deadband { 0.0 } else { error };

        if dt > 0.0 {
            self.integral = (self.integral + cfg.ki * error * dt)
                .clamp(-cfg.integral_limit, cfg.integral_limit);
        }

        let derivative = match self.prev_error {
            Some(prev) if dt > 0.0 => (error - prev) / dt,
            _ => 0.0,
        };
        self.prev_error = Some(error);

        let out = cfg.kp * error + self.integral + cfg.kd * derivative;
        out.clamp(-cfg.max_output, cfg.max_output)
    }

    /// Reset integrator and derivative history.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }

    /// Current integral contribution to the output
    pub fn integral(&self) -> f32 {
        self.integral
    }
}
