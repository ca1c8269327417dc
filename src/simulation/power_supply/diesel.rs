//! Diesel locomotive power supply

use bitcode::{Decode, Encode};
use log::warn;
use serde::{Deserialize, Serialize};

use super::super::signals::Outbox;
use super::super::timer::Timer;
use super::battery_switch::{BatterySwitchConfig, LowVoltageState, LowVoltageSupply, MasterKeyConfig};
use super::diesel_engine::{DieselEngineConfig, DieselEngineSnapshot, DieselEngines};
use super::ets_switch::{ElectricTrainSupplySwitch, EtsSwitchConfig, EtsSwitchState};
use super::relay::{Relay, RelayConfig, RelayStateSnapshot};
use super::script::{PowerSupplyScript, ScriptRegistry};
use super::state::{PowerSupplyEvent, PowerSupplyInputs, PowerSupplyState, PowerSupplyStates};
use super::delayed_on;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DieselPowerSupplyConfig {
    pub script: String,
    pub battery_switch: BatterySwitchConfig,
    pub master_key: MasterKeyConfig,
    pub engines: Vec<DieselEngineConfig>,
    pub traction_cut_off_relay: RelayConfig,
    pub ets_switch: EtsSwitchConfig,
    pub power_on_delay_s: f32,
    pub auxiliary_power_on_delay_s: f32,
    pub fuel_capacity_l: f32,
    /// Defaults to a full tank
    pub initial_fuel_l: Option<f32>,
}

impl Default for DieselPowerSupplyConfig {
    fn default() -> Self {
        Self {
            script: "Default".to_string(),
            battery_switch: BatterySwitchConfig::default(),
            master_key: MasterKeyConfig::default(),
            engines: vec![DieselEngineConfig::default()],
            traction_cut_off_relay: RelayConfig::default(),
            ets_switch: EtsSwitchConfig::default(),
            power_on_delay_s: 0.0,
            auxiliary_power_on_delay_s: 0.0,
            fuel_capacity_l: 5000.0,
            initial_fuel_l: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct DieselPowerSupplyState {
    pub states: PowerSupplyStates,
    pub low_voltage: LowVoltageState,
    pub engines: Vec<DieselEngineSnapshot>,
    pub traction_cut_off_relay: RelayStateSnapshot,
    pub ets_switch: EtsSwitchState,
    pub fuel_l: f32,
    pub power_on_timer: Timer,
    pub auxiliary_power_on_timer: Timer,
}

/// A diesel fuel tank
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuelTank {
    pub capacity_l: f32,
    pub level_l: f32,
}

impl FuelTank {
    pub fn new(capacity_l: f32, initial_l: Option<f32>) -> Self {
        let capacity_l = capacity_l.max(0.0);
        Self {
            capacity_l,
            level_l: initial_l.unwrap_or(capacity_l).clamp(0.0, capacity_l),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.level_l <= 0.0
    }

    /// Removes the fuel burnt at `flow_lph` during `elapsed_s`
    pub fn burn(&mut self, flow_lph: f32, elapsed_s: f32) {
        self.level_l = (self.level_l - flow_lph * elapsed_s / 3600.0).max(0.0);
    }

    pub fn refill(&mut self) {
        self.level_l = self.capacity_l;
    }

    /// Feeds `engines` for `elapsed_s`; running dry stops every engine
    pub fn supply(&mut self, engines: &mut DieselEngines, elapsed_s: f32, outbox: &mut Outbox) {
        self.burn(engines.fuel_flow_lph(), elapsed_s);
        if self.is_empty() && engines.any_running() {
            warn!("Fuel tank empty, stopping diesel engines");
            outbox.warn("Fuel tank empty");
            engines.stop_all(outbox);
        }
    }
}

/// Everything a diesel locomotive script can read and drive
#[derive(Debug)]
pub struct DieselSystems {
    pub low_voltage: LowVoltageSupply,
    pub engines: DieselEngines,
    pub traction_cut_off_relay: Relay,
    pub ets_switch: ElectricTrainSupplySwitch,
    pub fuel: FuelTank,
    pub states: PowerSupplyStates,
    pub inputs: PowerSupplyInputs,
    pub power_on_timer: Timer,
    pub auxiliary_power_on_timer: Timer,
    pub outbox: Outbox,
}

impl DieselSystems {
    fn new(config: &DieselPowerSupplyConfig, registry: &ScriptRegistry) -> Self {
        Self {
            low_voltage: LowVoltageSupply::new(&config.battery_switch, &config.master_key),
            engines: DieselEngines::new(&config.engines),
            traction_cut_off_relay: Relay::traction_cut_off_relay(
                &config.traction_cut_off_relay,
                &registry.relays,
            ),
            ets_switch: ElectricTrainSupplySwitch::new(&config.ets_switch),
            fuel: FuelTank::new(config.fuel_capacity_l, config.initial_fuel_l),
            states: PowerSupplyStates::default(),
            inputs: PowerSupplyInputs::default(),
            power_on_timer: Timer::new(config.power_on_delay_s),
            auxiliary_power_on_timer: Timer::new(config.auxiliary_power_on_delay_s),
            outbox: Outbox::new(),
        }
    }

    /// Engine update plus fuel accounting; an empty tank stops the engines
    pub fn update_engines(&mut self, elapsed_s: f32) {
        let ets_draw_w = if self.states.electric_train_supply.is_on() {
            self.inputs.ets_load_w
        } else {
            0.0
        };
        self.engines.update(
            elapsed_s,
            self.inputs.throttle_percent,
            self.inputs.speed_mps,
            ets_draw_w,
            &mut self.outbox,
        );
        self.fuel.supply(&mut self.engines, elapsed_s, &mut self.outbox);
    }

    pub fn dispatch_event(&mut self, event: PowerSupplyEvent) {
        self.low_voltage.handle_event(event, &mut self.outbox);
        let low_voltage_on = self.low_voltage.battery_switch.on();
        self.engines
            .handle_event(event, low_voltage_on, &mut self.outbox);
        self.traction_cut_off_relay.handle_event(event);
        self.traction_cut_off_relay.drain_outbox(&mut self.outbox);
        self.ets_switch.handle_event(event, &mut self.outbox);
    }
}

/// Built-in diesel locomotive behaviour
#[derive(Debug, Default)]
pub struct DefaultDieselScript;

impl PowerSupplyScript<DieselSystems> for DefaultDieselScript {
    fn name(&self) -> &str {
        "Default"
    }

    fn update(&mut self, s: &mut DieselSystems, elapsed_s: f32) {
        s.low_voltage.update(elapsed_s, &mut s.states, &mut s.outbox);
        let auxiliary_on = s.states.auxiliary.is_on();
        s.ets_switch.update(elapsed_s, auxiliary_on, &mut s.outbox);
        s.update_engines(elapsed_s);

        let running = s.engines.any_running();
        s.traction_cut_off_relay
            .set_closing_authorization(s.inputs.tcs_closing_authorization && running);
        s.traction_cut_off_relay.update(elapsed_s);
        s.traction_cut_off_relay.drain_outbox(&mut s.outbox);

        let auxiliary = delayed_on(&mut s.auxiliary_power_on_timer, running, elapsed_s);
        s.states
            .set_auxiliary(PowerSupplyState::from_bool(auxiliary), &mut s.outbox);
        let main = delayed_on(
            &mut s.power_on_timer,
            running && s.traction_cut_off_relay.is_closed(),
            elapsed_s,
        );
        s.states
            .set_main(PowerSupplyState::from_bool(main), &mut s.outbox);
        s.states.electric_train_supply =
            PowerSupplyState::from_bool(s.ets_switch.on() && s.states.auxiliary.is_on());
    }

    fn handle_event(&mut self, s: &mut DieselSystems, event: PowerSupplyEvent) {
        match event {
            PowerSupplyEvent::QuickPowerOn => {
                for step in [
                    PowerSupplyEvent::CloseBatterySwitch,
                    PowerSupplyEvent::TurnOnMasterKey,
                ] {
                    s.dispatch_event(step);
                }
                // quick start skips the low-voltage check
                s.engines.start_all(&mut s.outbox);
                for step in [
                    PowerSupplyEvent::CloseTractionCutOffRelay,
                    PowerSupplyEvent::SwitchOnElectricTrainSupply,
                ] {
                    s.dispatch_event(step);
                }
            }
            PowerSupplyEvent::QuickPowerOff => {
                s.engines.stop_all(&mut s.outbox);
                for step in [
                    PowerSupplyEvent::SwitchOffElectricTrainSupply,
                    PowerSupplyEvent::OpenTractionCutOffRelay,
                    PowerSupplyEvent::TurnOffMasterKey,
                    PowerSupplyEvent::OpenBatterySwitch,
                ] {
                    s.dispatch_event(step);
                }
            }
            event => s.dispatch_event(event),
        }
    }
}

/// A diesel locomotive's power supply and its script
#[derive(Debug)]
pub struct DieselPowerSupply {
    systems: DieselSystems,
    script: Box<dyn PowerSupplyScript<DieselSystems>>,
}

impl DieselPowerSupply {
    pub fn new(config: &DieselPowerSupplyConfig, registry: &ScriptRegistry) -> Self {
        let script: Box<dyn PowerSupplyScript<DieselSystems>> = match config.script.as_str() {
            "Default" | "" => Box::new(DefaultDieselScript),
            name => registry
                .diesel
                .create_or(name, || Box::new(DefaultDieselScript)),
        };
        let mut supply = Self {
            systems: DieselSystems::new(config, registry),
            script,
        };
        supply.script.initialize(&mut supply.systems);
        supply
    }

    pub fn systems(&self) -> &DieselSystems {
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

    pub fn traction_power_w(&self, throttle_percent: f32) -> f32 {
        if self.systems.states.main.is_on() {
            self.systems.engines.output_power_w() * (throttle_percent / 100.0).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn drain_outbox(&mut self, outbox: &mut Outbox) {
        outbox.append(&mut self.systems.outbox);
    }

    pub fn refuel(&mut self) {
        self.systems.fuel.refill();
    }

    pub fn save(&self) -> DieselPowerSupplyState {
        let s = &self.systems;
        DieselPowerSupplyState {
            states: s.states,
            low_voltage: s.low_voltage.save(),
            engines: s.engines.save(),
            traction_cut_off_relay: s.traction_cut_off_relay.save(),
            ets_switch: s.ets_switch.save(),
            fuel_l: s.fuel.level_l,
            power_on_timer: s.power_on_timer,
            auxiliary_power_on_timer: s.auxiliary_power_on_timer,
        }
    }

    pub fn restore(&mut self, state: DieselPowerSupplyState) {
        let s = &mut self.systems;
        s.states = state.states;
        s.low_voltage.restore(state.low_voltage);
        s.engines.restore(state.engines);
        s.traction_cut_off_relay.restore(state.traction_cut_off_relay);
        s.ets_switch.restore(state.ets_switch);
        s.fuel.level_l = state.fuel_l.clamp(0.0, s.fuel.capacity_l);
        s.power_on_timer = state.power_on_timer;
        s.auxiliary_power_on_timer = state.auxiliary_power_on_timer;
    }
}
