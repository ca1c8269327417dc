//! Power supplies of vehicles without their own traction source
//!
//! Control cars mirror the lead locomotive's main and auxiliary power;
//! passenger cars draw heating, ventilation and lighting load from the
//! electric train supply line.

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::super::signals::Outbox;
use super::battery_switch::{BatterySwitchConfig, LowVoltageState, LowVoltageSupply, MasterKeyConfig};
use super::script::{PowerSupplyScript, ScriptRegistry};
use super::state::{PowerSupplyEvent, PowerSupplyInputs, PowerSupplyState, PowerSupplyStates};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlCarPowerSupplyConfig {
    pub script: String,
    pub battery_switch: BatterySwitchConfig,
    pub master_key: MasterKeyConfig,
}

impl Default for ControlCarPowerSupplyConfig {
    fn default() -> Self {
        Self {
            script: "Default".to_string(),
            battery_switch: BatterySwitchConfig::default(),
            master_key: MasterKeyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct ControlCarPowerSupplyState {
    pub states: PowerSupplyStates,
    pub low_voltage: LowVoltageState,
}

#[derive(Debug)]
pub struct ControlCarSystems {
    pub low_voltage: LowVoltageSupply,
    pub states: PowerSupplyStates,
    pub inputs: PowerSupplyInputs,
    pub outbox: Outbox,
}

#[derive(Debug, Default)]
pub struct DefaultControlCarScript;

impl PowerSupplyScript<ControlCarSystems> for DefaultControlCarScript {
    fn name(&self) -> &str {
        "Default"
    }

    fn update(&mut self, s: &mut ControlCarSystems, elapsed_s: f32) {
        s.low_voltage.update(elapsed_s, &mut s.states, &mut s.outbox);
        s.states.set_main(
            PowerSupplyState::from_bool(s.inputs.train_main_on),
            &mut s.outbox,
        );
        s.states.set_auxiliary(
            PowerSupplyState::from_bool(s.inputs.train_auxiliary_on),
            &mut s.outbox,
        );
        s.states.electric_train_supply = PowerSupplyState::from_bool(s.inputs.train_ets_on);
    }

    fn handle_event(&mut self, s: &mut ControlCarSystems, event: PowerSupplyEvent) {
        match event {
            PowerSupplyEvent::QuickPowerOn => {
                s.low_voltage
                    .handle_event(PowerSupplyEvent::CloseBatterySwitch, &mut s.outbox);
                s.low_voltage
                    .handle_event(PowerSupplyEvent::TurnOnMasterKey, &mut s.outbox);
            }
            PowerSupplyEvent::QuickPowerOff => {
                s.low_voltage
                    .handle_event(PowerSupplyEvent::TurnOffMasterKey, &mut s.outbox);
                s.low_voltage
                    .handle_event(PowerSupplyEvent::OpenBatterySwitch, &mut s.outbox);
            }
            event => s.low_voltage.handle_event(event, &mut s.outbox),
        }
    }
}

#[derive(Debug)]
pub struct ControlCarPowerSupply {
    systems: ControlCarSystems,
    script: Box<dyn PowerSupplyScript<ControlCarSystems>>,
}

impl ControlCarPowerSupply {
    pub fn new(config: &ControlCarPowerSupplyConfig, registry: &ScriptRegistry) -> Self {
        let script: Box<dyn PowerSupplyScript<ControlCarSystems>> = match config.script.as_str() {
            "Default" | "" => Box::new(DefaultControlCarScript),
            name => registry
                .control_car
                .create_or(name, || Box::new(DefaultControlCarScript)),
        };
        let mut supply = Self {
            systems: ControlCarSystems {
                low_voltage: LowVoltageSupply::new(&config.battery_switch, &config.master_key),
                states: PowerSupplyStates::default(),
                inputs: PowerSupplyInputs::default(),
                outbox: Outbox::new(),
            },
            script,
        };
        supply.script.initialize(&mut supply.systems);
        supply
    }

    pub fn systems(&self) -> &ControlCarSystems {
        &self.systems
    }

    pub fn states(&self) -> &PowerSupplyStates {
        &self.systems.states
    }

    pub fn script_name(&self) -> &str {
        self.script.name()
    }

    pub fn update(&mut self, elapsed_s: f32, inputs: PowerSupplyInputs) {
        self.systems.inputs = inputs;
        self.script.update(&mut self.systems, elapsed_s);
    }

    pub fn handle_event(&mut self, event: PowerSupplyEvent) {
        self.script.handle_event(&mut self.systems, event);
    }

    pub fn drain_outbox(&mut self, outbox: &mut Outbox) {
        outbox.append(&mut self.systems.outbox);
    }

    pub fn save(&self) -> ControlCarPowerSupplyState {
        ControlCarPowerSupplyState {
            states: self.systems.states,
            low_voltage: self.systems.low_voltage.save(),
        }
    }

    pub fn restore(&mut self, state: ControlCarPowerSupplyState) {
        self.systems.states = state.states;
        self.systems.low_voltage.restore(state.low_voltage);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassengerCarPowerSupplyConfig {
    pub script: String,
    pub battery_switch: BatterySwitchConfig,
    pub heating_power_w: f32,
    pub ventilation_power_w: f32,
    pub lighting_power_w: f32,
}

impl Default for PassengerCarPowerSupplyConfig {
    fn default() -> Self {
        Self {
            script: "Default".to_string(),
            battery_switch: BatterySwitchConfig::default(),
            heating_power_w: 40_000.0,
            ventilation_power_w: 5_000.0,
            lighting_power_w: 2_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct PassengerCarPowerSupplyState {
    pub states: PowerSupplyStates,
    pub low_voltage: LowVoltageState,
    pub ets_demand_w: f32,
}

#[derive(Debug)]
pub struct PassengerCarSystems {
    pub low_voltage: LowVoltageSupply,
    pub states: PowerSupplyStates,
    pub inputs: PowerSupplyInputs,
    pub heating_power_w: f32,
    pub ventilation_power_w: f32,
    pub lighting_power_w: f32,
    /// Load this car puts on the ETS line
    pub ets_demand_w: f32,
    pub outbox: Outbox,
}

#[derive(Debug, Default)]
pub struct DefaultPassengerCarScript;

impl PowerSupplyScript<PassengerCarSystems> for DefaultPassengerCarScript {
    fn name(&self) -> &str {
        "Default"
    }

    fn update(&mut self, s: &mut PassengerCarSystems, elapsed_s: f32) {
        s.low_voltage.update(elapsed_s, &mut s.states, &mut s.outbox);
        s.states.cab = PowerSupplyState::Unavailable;
        let ets = s.inputs.train_ets_on;
        s.states.electric_train_supply = PowerSupplyState::from_bool(ets);
        // the ETS line also charges the low-voltage bus
        s.states.low_voltage = PowerSupplyState::from_bool(ets || s.states.battery.is_on());
        s.ets_demand_w = if ets {
            s.heating_power_w + s.ventilation_power_w + s.lighting_power_w
        } else {
            0.0
        };
    }

    fn handle_event(&mut self, s: &mut PassengerCarSystems, event: PowerSupplyEvent) {
        s.low_voltage.handle_event(event, &mut s.outbox);
    }
}

#[derive(Debug)]
pub struct PassengerCarPowerSupply {
    systems: PassengerCarSystems,
    script: Box<dyn PowerSupplyScript<PassengerCarSystems>>,
}

impl PassengerCarPowerSupply {
    pub fn new(config: &PassengerCarPowerSupplyConfig, registry: &ScriptRegistry) -> Self {
        let script: Box<dyn PowerSupplyScript<PassengerCarSystems>> =
            match config.script.as_str() {
                "Default" | "" => Box::new(DefaultPassengerCarScript),
                name => registry
                    .passenger_car
                    .create_or(name, || Box::new(DefaultPassengerCarScript)),
            };
        let mut supply = Self {
            systems: PassengerCarSystems {
                low_voltage: LowVoltageSupply::new(
                    &config.battery_switch,
                    &MasterKeyConfig::default(),
                ),
                states: PowerSupplyStates {
                    main: PowerSupplyState::Unavailable,
                    auxiliary: PowerSupplyState::Unavailable,
                    cab: PowerSupplyState::Unavailable,
                    ..PowerSupplyStates::default()
                },
                inputs: PowerSupplyInputs::default(),
                heating_power_w: config.heating_power_w.max(0.0),
                ventilation_power_w: config.ventilation_power_w.max(0.0),
                lighting_power_w: config.lighting_power_w.max(0.0),
                ets_demand_w: 0.0,
                outbox: Outbox::new(),
            },
            script,
        };
        supply.script.initialize(&mut supply.systems);
        supply
    }

    pub fn systems(&self) -> &PassengerCarSystems {
        &self.systems
    }

    pub fn states(&self) -> &PowerSupplyStates {
        &self.systems.states
    }

    pub fn script_name(&self) -> &str {
        self.script.name()
    }

    pub fn ets_demand_w(&self) -> f32 {
        self.systems.ets_demand_w
    }

    pub fn update(&mut self, elapsed_s: f32, inputs: PowerSupplyInputs) {
        self.systems.inputs = inputs;
        self.script.update(&mut self.systems, elapsed_s);
    }

    pub fn handle_event(&mut self, event: PowerSupplyEvent) {
        self.script.handle_event(&mut self.systems, event);
    }

    pub fn drain_outbox(&mut self, outbox: &mut Outbox) {
        outbox.append(&mut self.systems.outbox);
    }

    pub fn save(&self) -> PassengerCarPowerSupplyState {
        PassengerCarPowerSupplyState {
            states: self.systems.states,
            low_voltage: self.systems.low_voltage.save(),
            ets_demand_w: self.systems.ets_demand_w,
        }
    }

    pub fn restore(&mut self, state: PassengerCarPowerSupplyState) {
        self.systems.states = state.states;
        self.systems.low_voltage.restore(state.low_voltage);
        self.systems.ets_demand_w = state.ets_demand_w;
    }
}
