//! Electric train supply switch

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::super::signals::{CabControl, CabSetting, Outbox, TrainEvent};
use super::super::timer::Timer;
use super::state::PowerSupplyEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EtsSwitchMode {
    /// On whenever auxiliary power is on
    #[default]
    Automatic,
    /// The vehicle cannot feed the train line
    Unfitted,
    /// Driver-operated latch
    Switch,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EtsSwitchConfig {
    pub mode: EtsSwitchMode,
    pub delay_s: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct EtsSwitchState {
    pub command_switch: bool,
    pub on: bool,
    pub timer: Timer,
}

#[derive(Debug, Clone)]
pub struct ElectricTrainSupplySwitch {
    mode: EtsSwitchMode,
    command_switch: bool,
    on: bool,
    timer: Timer,
}

impl ElectricTrainSupplySwitch {
    pub fn new(config: &EtsSwitchConfig) -> Self {
        Self {
            mode: config.mode,
            command_switch: false,
            on: false,
            timer: Timer::new(config.delay_s),
        }
    }

    pub fn mode(&self) -> EtsSwitchMode {
        self.mode
    }

    pub fn on(&self) -> bool {
        self.on
    }

    pub fn command_switch(&self) -> bool {
        self.command_switch
    }

    fn set_on(&mut self, on: bool, outbox: &mut Outbox) {
        if self.on != on {
            self.on = on;
            outbox.signal(if on {
                TrainEvent::ElectricTrainSupplyOn
            } else {
                TrainEvent::ElectricTrainSupplyOff
            });
        }
    }

    /// `auxiliary_on` is the vehicle's auxiliary power as last computed
    pub fn update(&mut self, elapsed_s: f32, auxiliary_on: bool, outbox: &mut Outbox) {
        match self.mode {
            EtsSwitchMode::Unfitted => self.set_on(false, outbox),
            EtsSwitchMode::Automatic => self.set_on(auxiliary_on, outbox),
            EtsSwitchMode::Switch => {
                if self.on {
                    if !self.command_switch || !auxiliary_on {
                        self.timer.stop();
                        self.set_on(false, outbox);
                    }
                } else if self.command_switch && auxiliary_on {
                    if !self.timer.started() {
                        self.timer.start();
                    }
                    self.timer.update(elapsed_s);
                    if self.timer.triggered() {
                        self.timer.stop();
                        self.set_on(true, outbox);
                    }
                } else {
                    self.timer.stop();
                }
            }
        }
    }

    pub fn handle_event(&mut self, event: PowerSupplyEvent, outbox: &mut Outbox) {
        if self.mode != EtsSwitchMode::Switch {
            return;
        }
        match event {
            PowerSupplyEvent::SwitchOnElectricTrainSupply => {
                self.command_switch = true;
                outbox.signal(TrainEvent::ElectricTrainSupplyCommandOn);
                outbox.confirm(CabControl::ElectricTrainSupply, CabSetting::On, "ETS on");
            }
            PowerSupplyEvent::SwitchOffElectricTrainSupply => {
                self.command_switch = false;
                outbox.signal(TrainEvent::ElectricTrainSupplyCommandOff);
                outbox.confirm(CabControl::ElectricTrainSupply, CabSetting::Off, "ETS off");
            }
            _ => {}
        }
    }

    pub fn save(&self) -> EtsSwitchState {
        EtsSwitchState {
            command_switch: self.command_switch,
            on: self.on,
            timer: self.timer,
        }
    }

    pub fn restore(&mut self, state: EtsSwitchState) {
        self.command_switch = state.command_switch;
        self.on = state.on;
        self.timer = state.timer;
    }
}
