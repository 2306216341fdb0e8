// Safety interlock: decides each cycle whether the chassis may move
//
// The decision itself is memoryless. `TransitionDetector` sits next to it so the
// caller only reacts (indicator, log) when the decision changes.

use crate::messages::{InterlockState, OperatorInputSample, Switch, SwitchLevel};

#[derive(Debug, Clone, Copy)]
pub struct SafetyInterlock {
    emergency_switch: Switch,
    tripped_level: SwitchLevel,
}

impl SafetyInterlock {
    pub fn new(emergency_switch: Switch, tripped_level: SwitchLevel) -> Self {
        Self {
            emergency_switch,
            tripped_level,
        }
    }

    /// Tripped when the input is missing, marked invalid, or the emergency switch is thrown
    pub fn evaluate(&self, input: Option<&OperatorInputSample>) -> InterlockState {
        match input {
            None => InterlockState::Tripped,
            Some(sample) if !sample.valid => InterlockState::Tripped,
            Some(sample) if sample.switch(self.emergency_switch) == Some(self.tripped_level) => {
                InterlockState::Tripped
            }
            Some(_) => InterlockState::Armed,
        }
    }
}

/// Reports a state only when it differs from the previous one
///
/// The very first observation always counts as a transition.
#[derive(Debug, Default)]
pub struct TransitionDetector {
    last: Option<InterlockState>,
}

impl TransitionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, state: InterlockState) -> Option<InterlockState> {
        if self.last == Some(state) {
            return None;
        }
        self.last = Some(state);
        Some(state)
    }

    pub fn last(&self) -> Option<InterlockState> {
        self.last
    }
}
