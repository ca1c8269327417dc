//! Pantographs
//!
//! A vehicle carries up to [`MAX_PANTOGRAPHS`] pantographs, addressed by a
//! 1-based number. The collection reports the most raised state of its
//! members.

use bitcode::{Decode, Encode};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::super::signals::{CabControl, CabSetting, Outbox, TrainEvent};
use super::super::timer::Timer;
use super::state::{PantographState, PowerSupplyEvent};

pub const MAX_PANTOGRAPHS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PantographConfig {
    /// Time to travel between down and up
    pub delay_s: f32,
}

impl Default for PantographConfig {
    fn default() -> Self {
        Self { delay_s: 2.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct PantographSnapshot {
    pub state: PantographState,
    pub timer: Timer,
}

#[derive(Debug, Clone)]
pub struct Pantograph {
    id: usize,
    state: PantographState,
    timer: Timer,
}

impl Pantograph {
    pub fn new(id: usize, config: &PantographConfig) -> Self {
        Self {
            id,
            state: PantographState::Down,
            timer: Timer::new(config.delay_s),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> PantographState {
        self.state
    }

    fn set_state(&mut self, state: PantographState, outbox: &mut Outbox) {
        if self.state == state {
            return;
        }
        debug!("Pantograph {}: {:?} -> {:?}", self.id, self.state, state);
        self.state = state;
        let event = match state {
            PantographState::Up => TrainEvent::PantographUp(self.id),
            PantographState::Down => TrainEvent::PantographDown(self.id),
            PantographState::Raising => TrainEvent::PantographRaising(self.id),
            PantographState::Lowering => TrainEvent::PantographLowering(self.id),
            PantographState::Unavailable => return,
        };
        outbox.signal(event);
    }

    pub fn raise(&mut self, outbox: &mut Outbox) {
        if matches!(self.state, PantographState::Down | PantographState::Lowering) {
            self.timer.start();
            self.set_state(PantographState::Raising, outbox);
        }
    }

    pub fn lower(&mut self, outbox: &mut Outbox) {
        if matches!(self.state, PantographState::Up | PantographState::Raising) {
            self.timer.start();
            self.set_state(PantographState::Lowering, outbox);
        }
    }

    pub fn update(&mut self, elapsed_s: f32, outbox: &mut Outbox) {
        match self.state {
            PantographState::Raising => {
                self.timer.update(elapsed_s);
                if self.timer.triggered() {
                    self.timer.stop();
                    self.set_state(PantographState::Up, outbox);
                }
            }
            PantographState::Lowering => {
                self.timer.update(elapsed_s);
                if self.timer.triggered() {
                    self.timer.stop();
                    self.set_state(PantographState::Down, outbox);
                }
            }
            _ => {}
        }
    }

    pub fn save(&self) -> PantographSnapshot {
        PantographSnapshot {
            state: self.state,
            timer: self.timer,
        }
    }

    pub fn restore(&mut self, snapshot: PantographSnapshot) {
        self.state = snapshot.state;
        self.timer = snapshot.timer;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pantographs {
    list: Vec<Pantograph>,
}

impl Pantographs {
    pub fn new(configs: &[PantographConfig]) -> Self {
        if configs.len() > MAX_PANTOGRAPHS {
            warn!(
                "{} pantographs configured, only the first {} are used",
                configs.len(),
                MAX_PANTOGRAPHS
            );
        }
        let list = configs
            .iter()
            .take(MAX_PANTOGRAPHS)
            .enumerate()
            .map(|(i, config)| Pantograph::new(i + 1, config))
            .collect();
        Self { list }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&Pantograph> {
        id.checked_sub(1).and_then(|i| self.list.get(i))
    }

    /// The most raised state of all pantographs
    pub fn state(&self) -> PantographState {
        self.list
            .iter()
            .map(Pantograph::state)
            .max()
            .unwrap_or(PantographState::Unavailable)
    }

    pub fn state_of(&self, id: usize) -> PantographState {
        self.get(id)
            .map(Pantograph::state)
            .unwrap_or(PantographState::Unavailable)
    }

    pub fn update(&mut self, elapsed_s: f32, outbox: &mut Outbox) {
        for pantograph in &mut self.list {
            pantograph.update(elapsed_s, outbox);
        }
    }

    pub fn handle_event(&mut self, event: PowerSupplyEvent, outbox: &mut Outbox) {
        let (id, raise) = match event {
            PowerSupplyEvent::RaisePantograph(id) => (id, true),
            PowerSupplyEvent::LowerPantograph(id) => (id, false),
            _ => return,
        };
        let Some(pantograph) = id.checked_sub(1).and_then(|i| self.list.get_mut(i)) else {
            outbox.warn(format!("No pantograph {}", id));
            return;
        };
        if raise {
            pantograph.raise(outbox);
            outbox.confirm(CabControl::Pantograph(id), CabSetting::On, "raise");
        } else {
            pantograph.lower(outbox);
            outbox.confirm(CabControl::Pantograph(id), CabSetting::Off, "lower");
        }
    }

    pub fn lower_all(&mut self, outbox: &mut Outbox) {
        for pantograph in &mut self.list {
            pantograph.lower(outbox);
        }
    }

    pub fn save(&self) -> Vec<PantographSnapshot> {
        self.list.iter().map(Pantograph::save).collect()
    }

    pub fn restore(&mut self, snapshots: Vec<PantographSnapshot>) {
        for (pantograph, snapshot) in self.list.iter_mut().zip(snapshots) {
            pantograph.restore(snapshot);
        }
    }
}

/// First-order filter of the catenary voltage seen through the pantographs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineVoltageFilter {
    time_constant_s: f32,
    voltage_v: f32,
}

impl LineVoltageFilter {
    pub fn new(time_constant_s: f32) -> Self {
        Self {
            time_constant_s: time_constant_s.max(0.0),
            voltage_v: 0.0,
        }
    }

    pub fn voltage_v(&self) -> f32 {
        self.voltage_v
    }

    pub fn set_voltage_v(&mut self, voltage_v: f32) {
        self.voltage_v = voltage_v.max(0.0);
    }

    pub fn update(&mut self, elapsed_s: f32, pantograph: PantographState, line_voltage_v: f32) {
        let target = if pantograph == PantographState::Up {
            line_voltage_v.max(0.0)
        } else {
            0.0
        };
        let k = if self.time_constant_s > 0.0 {
            (elapsed_s / self.time_constant_s).min(1.0)
        } else {
            1.0
        };
        self.voltage_v += (target - self.voltage_v) * k;
    }
}
