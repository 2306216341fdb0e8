// In-memory motor bus for running the runtime without hardware
//
// Clones share state, so the dead-reckoning heading (and tests) can watch what
// the runtime commands.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ActuatorError, MotorBus};
use crate::messages::WheelVelocities;

#[derive(Debug, Default)]
struct SimState {
    known: HashSet<u8>,
    enabled: HashSet<u8>,
    offline: HashSet<u8>,
    references: HashMap<u8, f32>,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBus {
    pub fn new(motor_ids: [u8; 4]) -> Self {
        let bus = Self::default();
        bus.lock().known.extend(motor_ids);
        bus
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // State stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make a motor stop answering (enable and dispatch fail)
    pub fn set_offline(&self, motor_id: u8, offline: bool) {
        let mut state = self.lock();
        if offline {
            state.offline.insert(motor_id);
        } else {
            state.offline.remove(&motor_id);
        }
    }

    pub fn is_enabled(&self, motor_id: u8) -> bool {
        self.lock().enabled.contains(&motor_id)
    }

    /// Last reference accepted by a motor
    pub fn reference(&self, motor_id: u8) -> Option<f32> {
        self.lock().references.get(&motor_id).copied()
    }

    /// Last accepted references in wheel order; wheels never commanded read as 0
    pub fn references(&self, motor_ids: [u8; 4]) -> WheelVelocities {
        let state = self.lock();
        let [fl, fr, bl, br] = motor_ids.map(|id| state.references.get(&id).copied().unwrap_or(0.0));
        WheelVelocities::new(fl, fr, bl, br)
    }

    fn check(state: &SimState, motor_id: u8) -> Result<(), ActuatorError> {
        if !state.known.contains(&motor_id) {
            return Err(ActuatorError::UnknownMotor { id: motor_id });
        }
        if state.offline.contains(&motor_id) {
            return Err(ActuatorError::Offline { id: motor_id });
        }
        Ok(())
    }
}

impl MotorBus for SimulatedBus {
    fn enable(&mut self, motor_id: u8) -> Result<(), ActuatorError> {
        let mut state = self.lock();
        Self::check(&state, motor_id)?;
        state.enabled.insert(motor_id);
        Ok(())
    }

    fn set_angular_velocity_reference(
        &mut self,
        motor_id: u8,
        rad_per_s: f32,
    ) -> Result<(), ActuatorError> {
        let mut state = self.lock();
        Self::check(&state, motor_id)?;
        state.references.insert(motor_id, rad_per_s);
        Ok(())
    }

    fn disable(&mut self, motor_id: u8) -> Result<(), ActuatorError> {
        let mut state = self.lock();
        Self::check(&state, motor_id)?;
        state.enabled.remove(&motor_id);
        Ok(())
    }
}

/// Forwards to a real bus and records every accepted reference on a simulated one
pub struct MirroredBus<B> {
    inner: B,
    mirror: SimulatedBus,
}

impl<B: MotorBus> MirroredBus<B> {
    pub fn new(inner: B, mirror: SimulatedBus) -> Self {
        Self { inner, mirror }
    }
}

impl<B: MotorBus> MotorBus for MirroredBus<B> {
    fn enable(&mut self, motor_id: u8) -> Result<(), ActuatorError> {
        self.inner.enable(motor_id)?;
        self.mirror.enable(motor_id)
    }

    fn set_angular_velocity_reference(
        &mut self,
        motor_id: u8,
        rad_per_s: f32,
    ) -> Result<(), ActuatorError> {
        self.inner
            .set_angular_velocity_reference(motor_id, rad_per_s)?;
        self.mirror.set_angular_velocity_reference(motor_id, rad_per_s)
    }

    fn disable(&mut self, motor_id: u8) -> Result<(), ActuatorError> {
        self.inner.disable(motor_id)?;
        self.mirror.disable(motor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let bus = SimulatedBus::new([1, 2, 3, 4]);
        let mut handle = bus.clone();
        handle.set_angular_velocity_reference(4, -2.5).unwrap();
        assert_eq!(bus.reference(4), Some(-2.5));
        assert_eq!(bus.references([1, 2, 3, 4]).back_right, -2.5);
    }

    #[test]
    fn test_unknown_motor_rejected() {
        let mut bus = SimulatedBus::new([1, 2, 3, 4]);
        assert!(matches!(
            bus.enable(9),
            Err(ActuatorError::UnknownMotor { id: 9 })
        ));
    }

    #[test]
    fn test_mirror_only_records_accepted_references() {
        let inner = SimulatedBus::new([1, 2, 3, 4]);
        let mirror = SimulatedBus::new([1, 2, 3, 4]);
        let mut bus = MirroredBus::new(inner.clone(), mirror.clone());

        bus.set_angular_velocity_reference(1, 3.0).unwrap();
        inner.set_offline(2, true);
        assert!(bus.set_angular_velocity_reference(2, 3.0).is_err());

        assert_eq!(mirror.reference(1), Some(3.0));
        assert_eq!(mirror.reference(2), None);
    }

    #[test]
    fn test_offline_motor_recovers() {
        let mut bus = SimulatedBus::new([1, 2, 3, 4]);
        bus.set_offline(1, true);
        assert!(bus.set_angular_velocity_reference(1, 1.0).is_err());
        bus.set_offline(1, false);
        assert!(bus.set_angular_velocity_reference(1, 1.0).is_ok());
    }
}
