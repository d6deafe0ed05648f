//! Scripted input for headless clients

use shared::{Input, Keystate};

/// Default length of one autopilot manoeuvre cycle, in seconds
pub const DEFAULT_PERIOD: f32 = 4.0;

/// Drives a ship from a repeating pattern instead of a keyboard
///
/// Each cycle spends its first half thrusting, the third quarter turning
/// left and the last quarter turning right. Fire, when enabled, is held
/// throughout; the ship's cooldown limits the actual rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Autopilot {
    pub thrust: bool,
    pub steer: bool,
    pub fire: bool,
    period: f32,
}

impl Autopilot {
    pub fn new(thrust: bool, steer: bool, fire: bool) -> Self {
        Self {
            thrust,
            steer,
            fire,
            period: DEFAULT_PERIOD,
        }
    }

    /// Touches no key at all.
    pub fn idle() -> Self {
        Self::new(false, false, false)
    }

    pub fn with_period(mut self, period: f32) -> Self {
        self.period = period.max(f32::EPSILON);
        self
    }

    /// Updates `input` for `elapsed` seconds since the client started.
    ///
    /// Keys are pressed and released through [`Keystate`], so the usual
    /// press and release edges appear in the frame where a key changes.
    pub fn apply(&self, elapsed: f32, input: &mut Input) {
        let phase = (elapsed % self.period) / self.period;

        set(&mut input.up, self.thrust && phase < 0.5);
        set(&mut input.left, self.steer && (0.5..0.75).contains(&phase));
        set(&mut input.right, self.steer && phase >= 0.75);
        set(&mut input.fire, self.fire);
        set(&mut input.down, false);
    }
}

fn set(key: &mut Keystate, held: bool) {
    if held {
        key.down();
    } else {
        key.up();
    }
}
