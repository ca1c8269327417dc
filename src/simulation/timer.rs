//! Countdown timer used by the power-supply automata

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Tolerance for comparing accumulated time against the setup delay
const TIMER_EPSILON_S: f32 = 1e-4;

/// A countdown measured in simulated seconds
///
/// The owner advances it explicitly with [`Timer::update`], so it only
/// counts time while its automaton is being ticked.
#[derive(Debug, Clone, Copy, PartialEq, Default, Encode, Decode, Serialize, Deserialize)]
pub struct Timer {
    setup_s: f32,
    elapsed_s: f32,
    started: bool,
}

impl Timer {
    pub fn new(setup_s: f32) -> Self {
        Self {
            setup_s: setup_s.max(0.0),
            elapsed_s: 0.0,
            started: false,
        }
    }

    pub fn setup(&mut self, setup_s: f32) {
        self.setup_s = setup_s.max(0.0);
    }

    pub fn setup_s(&self) -> f32 {
        self.setup_s
    }

    /// (Re)arms the timer from zero
    pub fn start(&mut self) {
        self.started = true;
        self.elapsed_s = 0.0;
    }

    pub fn stop(&mut self) {
        self.started = false;
        self.elapsed_s = 0.0;
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn update(&mut self, elapsed_s: f32) {
        if self.started {
            self.elapsed_s += elapsed_s.max(0.0);
        }
    }

    /// True once a started timer has accumulated its full delay
    pub fn triggered(&self) -> bool {
        self.started && self.elapsed_s + TIMER_EPSILON_S >= self.setup_s
    }

    pub fn remaining_s(&self) -> f32 {
        if self.started {
            (self.setup_s - self.elapsed_s).max(0.0)
        } else {
            self.setup_s
        }
    }
}
