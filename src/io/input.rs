// Operator input sources
//
// Keyboard teleop: WASD = left stick, Z/X = rotate, R/F = speed, Space = emergency
// switch, Q = quit. The key thread keeps refreshing the sample; if it stops (quit,
// crash, terminal gone) the sample goes stale and the interlock trips.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::messages::{Axis, OperatorInputSample, Switch, SwitchLevel};

/// Non-blocking source of operator input
pub trait InputSource: Send {
    /// Latest sample, or `None` when the source is disconnected or stale
    fn sample(&mut self) -> Option<OperatorInputSample>;
}

const STICK_LEVELS: [f32; 3] = [0.1, 0.3, 0.6]; // fraction of full stick
const KEY_HOLD: Duration = Duration::from_millis(100); // release sticks after this long without a key
const POLL: Duration = Duration::from_millis(20);

/// What a key press asks the teleop loop to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    Moved,
    Changed,
    Quit,
    Ignored,
}

/// Virtual controller driven by key presses
#[derive(Debug, Clone)]
pub struct TeleopKeys {
    level: usize,
    left_x: f32,
    left_y: f32,
    right_x: f32,
    emergency: SwitchLevel,
}

impl Default for TeleopKeys {
    fn default() -> Self {
        Self {
            level: 0,
            left_x: 0.0,
            left_y: 0.0,
            right_x: 0.0,
            // Start in emergency stop, operator arms explicitly
            emergency: SwitchLevel::Down,
        }
    }
}

impl TeleopKeys {
    pub fn apply(&mut self, code: KeyCode) -> KeyAction {
        let stick = STICK_LEVELS[self.level];
        match code {
            KeyCode::Char('w') => self.left_y = stick,
            KeyCode::Char('s') => self.left_y = -stick,
            KeyCode::Char('a') => self.left_x = -stick,
            KeyCode::Char('d') => self.left_x = stick,
            // Right stick to the left turns counter-clockwise
            KeyCode::Char('z') => self.right_x = -stick,
            KeyCode::Char('x') => self.right_x = stick,
            KeyCode::Char('r') => {
                self.level = (self.level + 1).min(STICK_LEVELS.len() - 1);
                return KeyAction::Changed;
            }
            KeyCode::Char('f') => {
                self.level = self.level.saturating_sub(1);
                return KeyAction::Changed;
            }
            KeyCode::Char(' ') => {
                self.emergency = match self.emergency {
                    SwitchLevel::Down => SwitchLevel::Up,
                    _ => SwitchLevel::Down,
                };
                return KeyAction::Changed;
            }
            KeyCode::Char('q') | KeyCode::Esc => return KeyAction::Quit,
            _ => return KeyAction::Ignored,
        }
        KeyAction::Moved
    }

    pub fn release_sticks(&mut self) {
        self.left_x = 0.0;
        self.left_y = 0.0;
        self.right_x = 0.0;
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn emergency(&self) -> SwitchLevel {
        self.emergency
    }

    pub fn sample(&self) -> OperatorInputSample {
        OperatorInputSample::new()
            .with_axis(Axis::LeftX, self.left_x)
            .with_axis(Axis::LeftY, self.left_y)
            .with_axis(Axis::RightX, self.right_x)
            .with_switch(Switch::Right, self.emergency)
    }
}

#[derive(Debug)]
struct Shared {
    sample: OperatorInputSample,
    updated_at: Instant,
    alive: bool,
}

/// Keyboard teleop running on its own thread in raw terminal mode
pub struct KeyboardTeleop {
    shared: Arc<Mutex<Shared>>,
    timeout: Duration,
}

impl KeyboardTeleop {
    /// Start the key thread; the receiver fires when the operator quits
    pub fn spawn(timeout: Duration) -> std::io::Result<(Self, oneshot::Receiver<()>)> {
        let keys = TeleopKeys::default();
        let shared = Arc::new(Mutex::new(Shared {
            sample: keys.sample(),
            updated_at: Instant::now(),
            alive: true,
        }));
        let (quit_tx, quit_rx) = oneshot::channel();

        enable_raw_mode()?;
        info!("Controls: WASD=move, Z/X=rotate, R/F=speed, Space=arm/disarm, Q=quit");
        info!("Starting disarmed, press Space to arm");

        let thread_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("keyboard-teleop".into())
            .spawn(move || {
                if let Err(e) = key_loop(keys, &thread_shared) {
                    warn!("Keyboard input failed: {}", e);
                }
                if let Err(e) = disable_raw_mode() {
                    warn!("Failed to restore terminal: {}", e);
                }
                thread_shared
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .alive = false;
                let _ = quit_tx.send(());
            })?;

        Ok((Self { shared, timeout }, quit_rx))
    }
}

fn key_loop(mut keys: TeleopKeys, shared: &Mutex<Shared>) -> std::io::Result<()> {
    let mut last_movement = Instant::now();

    loop {
        if event::poll(POLL)? {
            if let Event::Key(KeyEvent {
                code,
                kind,
                modifiers,
                ..
            }) = event::read()?
            {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                // Raw mode swallows SIGINT, treat Ctrl+C as quit
                if pressed && modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
                    return Ok(());
                }
                if pressed {
                    match keys.apply(code) {
                        KeyAction::Moved => last_movement = Instant::now(),
                        KeyAction::Changed => info!(
                            "Stick level {}, emergency switch {:?}",
                            keys.level() + 1,
                            keys.emergency()
                        ),
                        KeyAction::Quit => return Ok(()),
                        KeyAction::Ignored => {}
                    }
                }
            }
        }

        if last_movement.elapsed() > KEY_HOLD {
            keys.release_sticks();
        }

        let mut guard = shared.lock().unwrap_or_else(|e| e.into_inner());
        guard.sample = keys.sample();
        guard.updated_at = Instant::now();
    }
}

impl InputSource for KeyboardTeleop {
    fn sample(&mut self) -> Option<OperatorInputSample> {
        let shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        if !shared.alive || shared.updated_at.elapsed() > self.timeout {
            return None;
        }
        Some(shared.sample.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_in_emergency_stop() {
        let keys = TeleopKeys::default();
        assert_eq!(keys.sample().switch(Switch::Right), Some(SwitchLevel::Down));
    }

    #[test]
    fn test_space_toggles_emergency_switch() {
        let mut keys = TeleopKeys::default();
        assert_eq!(keys.apply(KeyCode::Char(' ')), KeyAction::Changed);
        assert_eq!(keys.sample().switch(Switch::Right), Some(SwitchLevel::Up));
        keys.apply(KeyCode::Char(' '));
        assert_eq!(keys.sample().switch(Switch::Right), Some(SwitchLevel::Down));
    }

    #[test]
    fn test_movement_keys_and_speed_levels() {
        let mut keys = TeleopKeys::default();
        assert_eq!(keys.apply(KeyCode::Char('w')), KeyAction::Moved);
        assert_eq!(keys.sample().axis(Axis::LeftY), STICK_LEVELS[0]);

        keys.apply(KeyCode::Char('r'));
        keys.apply(KeyCode::Char('r'));
        keys.apply(KeyCode::Char('r'));
        assert_eq!(keys.level(), STICK_LEVELS.len() - 1);

        keys.apply(KeyCode::Char('d'));
        keys.apply(KeyCode::Char('z'));
        let sample = keys.sample();
        assert_eq!(sample.axis(Axis::LeftX), 0.6);
        assert_eq!(sample.axis(Axis::RightX), -0.6);

        keys.release_sticks();
        let sample = keys.sample();
        assert_eq!(sample.axis(Axis::LeftX), 0.0);
        assert_eq!(sample.axis(Axis::LeftY), 0.0);
        assert_eq!(sample.axis(Axis::RightX), 0.0);
    }

    #[test]
    fn test_quit_keys() {
        let mut keys = TeleopKeys::default();
        assert_eq!(keys.apply(KeyCode::Char('q')), KeyAction::Quit);
        assert_eq!(keys.apply(KeyCode::Esc), KeyAction::Quit);
        assert_eq!(keys.apply(KeyCode::Char('k')), KeyAction::Ignored);
    }

    #[test]
    fn test_stale_input_reads_absent() {
        let mut source = KeyboardTeleop {
            shared: Arc::new(Mutex::new(Shared {
                sample: TeleopKeys::default().sample(),
                updated_at: Instant::now() - Duration::from_secs(1),
                alive: true,
            })),
            timeout: Duration::from_millis(250),
        };
        assert!(source.sample().is_none());

        source.shared.lock().unwrap().updated_at = Instant::now();
        assert!(source.sample().is_some());

        source.shared.lock().unwrap().alive = false;
        assert!(source.sample().is_none());
    }
}
