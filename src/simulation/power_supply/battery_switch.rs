//! Battery switch and master key

use bitcode::{Decode, Encode};
use log::debug;
use serde::{Deserialize, Serialize};

use super::super::signals::{CabControl, CabSetting, Outbox, TrainEvent};
use super::super::timer::Timer;
use super::state::{PowerSupplyEvent, PowerSupplyState, PowerSupplyStates};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BatterySwitchMode {
    #[default]
    AlwaysOn,
    /// A latching switch; closing waits for the delay
    Switch,
    /// Separate close and open buttons; close must be held for the delay
    PushButtons,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatterySwitchConfig {
    pub mode: BatterySwitchMode,
    pub delay_s: f32,
    /// Initial position of a switch-mode battery switch
    pub default_on: bool,
}

impl Default for BatterySwitchConfig {
    fn default() -> Self {
        Self {
            mode: BatterySwitchMode::AlwaysOn,
            delay_s: 0.0,
            default_on: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct BatterySwitchState {
    pub command_switch: bool,
    pub command_button_on: bool,
    pub command_button_off: bool,
    pub on: bool,
    pub timer: Timer,
}

/// Connects the battery to the low-voltage bus
#[derive(Debug, Clone)]
pub struct BatterySwitch {
    mode: BatterySwitchMode,
    command_switch: bool,
    command_button_on: bool,
    command_button_off: bool,
    on: bool,
    timer: Timer,
}

impl BatterySwitch {
    pub fn new(config: &BatterySwitchConfig) -> Self {
        let on = match config.mode {
            BatterySwitchMode::AlwaysOn => true,
            _ => config.default_on,
        };
        Self {
            mode: config.mode,
            command_switch: on,
            command_button_on: false,
            command_button_off: false,
            on,
            timer: Timer::new(config.delay_s),
        }
    }

    pub fn mode(&self) -> BatterySwitchMode {
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
            debug!("Battery switch {}", if on { "on" } else { "off" });
            self.on = on;
            outbox.signal(if on {
                TrainEvent::BatterySwitchOn
            } else {
                TrainEvent::BatterySwitchOff
            });
        }
    }

    pub fn update(&mut self, elapsed_s: f32, outbox: &mut Outbox) {
        match self.mode {
            BatterySwitchMode::AlwaysOn => self.set_on(true, outbox),
            BatterySwitchMode::Switch => {
                if self.on {
                    if !self.command_switch {
                        self.timer.stop();
                        self.set_on(false, outbox);
                    }
                } else if self.command_switch {
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
            BatterySwitchMode::PushButtons => {
                if self.on {
                    if self.command_button_off {
                        self.timer.stop();
                        self.set_on(false, outbox);
                    }
                } else if self.command_button_on {
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
        match (self.mode, event) {
            (BatterySwitchMode::Switch, PowerSupplyEvent::CloseBatterySwitch) => {
                self.command_switch = true;
                outbox.signal(TrainEvent::BatterySwitchCommandOn);
                outbox.confirm(CabControl::BatterySwitch, CabSetting::On, "battery switch on");
            }
            (BatterySwitchMode::Switch, PowerSupplyEvent::OpenBatterySwitch) => {
                self.command_switch = false;
                outbox.signal(TrainEvent::BatterySwitchCommandOff);
                outbox.confirm(CabControl::BatterySwitch, CabSetting::Off, "battery switch off");
            }
            (BatterySwitchMode::PushButtons, PowerSupplyEvent::CloseBatterySwitchButtonPressed)
            | (BatterySwitchMode::PushButtons, PowerSupplyEvent::CloseBatterySwitch) => {
                if event == PowerSupplyEvent::CloseBatterySwitch {
                    self.command_button_off = false;
                }
                self.command_button_on = true;
                outbox.signal(TrainEvent::BatterySwitchCommandOn);
                outbox.confirm(CabControl::BatterySwitch, CabSetting::On, "battery close pressed");
            }
            (BatterySwitchMode::PushButtons, PowerSupplyEvent::CloseBatterySwitchButtonReleased) => {
                self.command_button_on = false;
            }
            (BatterySwitchMode::PushButtons, PowerSupplyEvent::OpenBatterySwitchButtonPressed)
            | (BatterySwitchMode::PushButtons, PowerSupplyEvent::OpenBatterySwitch) => {
                if event == PowerSupplyEvent::OpenBatterySwitch {
                    self.command_button_on = false;
                }
                self.command_button_off = true;
                outbox.signal(TrainEvent::BatterySwitchCommandOff);
                outbox.confirm(CabControl::BatterySwitch, CabSetting::Off, "battery open pressed");
            }
            (BatterySwitchMode::PushButtons, PowerSupplyEvent::OpenBatterySwitchButtonReleased) => {
                self.command_button_off = false;
            }
            _ => {}
        }
    }

    pub fn save(&self) -> BatterySwitchState {
        BatterySwitchState {
            command_switch: self.command_switch,
            command_button_on: self.command_button_on,
            command_button_off: self.command_button_off,
            on: self.on,
            timer: self.timer,
        }
    }

    pub fn restore(&mut self, state: BatterySwitchState) {
        self.command_switch = state.command_switch;
        self.command_button_on = state.command_button_on;
        self.command_button_off = state.command_button_off;
        self.on = state.on;
        self.timer = state.timer;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MasterKeyMode {
    #[default]
    AlwaysOn,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterKeyConfig {
    pub mode: MasterKeyMode,
    /// Time the cab stays powered after the key is turned off
    pub delay_off_s: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct MasterKeyState {
    pub command_switch: bool,
    pub on: bool,
    pub timer: Timer,
}

/// Cab activation key
#[derive(Debug, Clone)]
pub struct MasterKey {
    mode: MasterKeyMode,
    command_switch: bool,
    on: bool,
    timer: Timer,
}

impl MasterKey {
    pub fn new(config: &MasterKeyConfig) -> Self {
        let on = config.mode == MasterKeyMode::AlwaysOn;
        Self {
            mode: config.mode,
            command_switch: on,
            on,
            timer: Timer::new(config.delay_off_s),
        }
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
                TrainEvent::MasterKeyOn
            } else {
                TrainEvent::MasterKeyOff
            });
        }
    }

    pub fn update(&mut self, elapsed_s: f32, outbox: &mut Outbox) {
        match self.mode {
            MasterKeyMode::AlwaysOn => self.set_on(true, outbox),
            MasterKeyMode::Manual => {
                if self.on {
                    if self.command_switch {
                        self.timer.stop();
                    } else {
                        if !self.timer.started() {
                            self.timer.start();
                        }
                        self.timer.update(elapsed_s);
                        if self.timer.triggered() {
                            self.timer.stop();
                            self.set_on(false, outbox);
                        }
                    }
                } else if self.command_switch {
                    self.set_on(true, outbox);
                }
            }
        }
    }

    pub fn handle_event(&mut self, event: PowerSupplyEvent, outbox: &mut Outbox) {
        if self.mode != MasterKeyMode::Manual {
            return;
        }
        match event {
            PowerSupplyEvent::TurnOnMasterKey => {
                self.command_switch = true;
                outbox.confirm(CabControl::MasterKey, CabSetting::On, "master key on");
            }
            PowerSupplyEvent::TurnOffMasterKey => {
                self.command_switch = false;
                outbox.confirm(CabControl::MasterKey, CabSetting::Off, "master key off");
            }
            _ => {}
        }
    }

    pub fn save(&self) -> MasterKeyState {
        MasterKeyState {
            command_switch: self.command_switch,
            on: self.on,
            timer: self.timer,
        }
    }

    pub fn restore(&mut self, state: MasterKeyState) {
        self.command_switch = state.command_switch;
        self.on = state.on;
        self.timer = state.timer;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct LowVoltageState {
    pub battery_switch: BatterySwitchState,
    pub master_key: MasterKeyState,
}

/// Battery switch and master key, which every vehicle updates first
#[derive(Debug, Clone)]
pub struct LowVoltageSupply {
    pub battery_switch: BatterySwitch,
    pub master_key: MasterKey,
}

impl LowVoltageSupply {
    pub fn new(battery_switch: &BatterySwitchConfig, master_key: &MasterKeyConfig) -> Self {
        Self {
            battery_switch: BatterySwitch::new(battery_switch),
            master_key: MasterKey::new(master_key),
        }
    }

    /// Updates both switches and publishes the battery, low-voltage and cab states
    pub fn update(&mut self, elapsed_s: f32, states: &mut PowerSupplyStates, outbox: &mut Outbox) {
        self.battery_switch.update(elapsed_s, outbox);
        self.master_key.update(elapsed_s, outbox);
        let battery = self.battery_switch.on();
        states.battery = PowerSupplyState::from_bool(battery);
        states.low_voltage = PowerSupplyState::from_bool(battery);
        states.cab = PowerSupplyState::from_bool(battery && self.master_key.on());
    }

    pub fn handle_event(&mut self, event: PowerSupplyEvent, outbox: &mut Outbox) {
        self.battery_switch.handle_event(event, outbox);
        self.master_key.handle_event(event, outbox);
    }

    pub fn save(&self) -> LowVoltageState {
        LowVoltageState {
            battery_switch: self.battery_switch.save(),
            master_key: self.master_key.save(),
        }
    }

    pub fn restore(&mut self, state: LowVoltageState) {
        self.battery_switch.restore(state.battery_switch);
        self.master_key.restore(state.master_key);
    }
}
