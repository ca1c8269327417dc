//! Electric locomotive power supply
//!
//! Pantographs pick up line voltage, the circuit breaker connects it to the
//! main transformer. Auxiliary power follows the pantograph, main power the
//! breaker, each after its own delay.

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::super::signals::Outbox;
use super::super::timer::Timer;
use super::battery_switch::{BatterySwitchConfig, LowVoltageState, LowVoltageSupply, MasterKeyConfig};
use super::ets_switch::{ElectricTrainSupplySwitch, EtsSwitchConfig, EtsSwitchState};
use super::pantograph::{LineVoltageFilter, PantographConfig, PantographSnapshot, Pantographs};
use super::relay::{Relay, RelayConfig, RelayStateSnapshot};
use super::script::{PowerSupplyScript, ScriptRegistry};
use super::state::{
    PantographState, PowerSupplyEvent, PowerSupplyInputs, PowerSupplyState, PowerSupplyStates,
};
use super::delayed_on;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectricPowerSupplyConfig {
    /// `Default` or a registered custom script
    pub script: String,
    pub battery_switch: BatterySwitchConfig,
    pub master_key: MasterKeyConfig,
    pub pantographs: Vec<PantographConfig>,
    pub circuit_breaker: RelayConfig,
    pub ets_switch: EtsSwitchConfig,
    pub power_on_delay_s: f32,
    pub auxiliary_power_on_delay_s: f32,
    /// Line voltage below which the breaker may not close
    pub min_line_voltage_v: f32,
    /// Time constant of the line-voltage filter
    pub line_voltage_filter_s: f32,
    pub max_power_w: f32,
}

impl Default for ElectricPowerSupplyConfig {
    fn default() -> Self {
        Self {
            script: "Default".to_string(),
            battery_switch: BatterySwitchConfig::default(),
            master_key: MasterKeyConfig::default(),
            pantographs: vec![PantographConfig::default(), PantographConfig::default()],
            circuit_breaker: RelayConfig::default(),
            ets_switch: EtsSwitchConfig::default(),
            power_on_delay_s: 0.0,
            auxiliary_power_on_delay_s: 0.0,
            min_line_voltage_v: 10_000.0,
            line_voltage_filter_s: 0.5,
            max_power_w: 4_000_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct ElectricPowerSupplyState {
    pub states: PowerSupplyStates,
    pub low_voltage: LowVoltageState,
    pub pantographs: Vec<PantographSnapshot>,
    pub circuit_breaker: RelayStateSnapshot,
    pub ets_switch: EtsSwitchState,
    pub filtered_line_voltage_v: f32,
    pub power_on_timer: Timer,
    pub auxiliary_power_on_timer: Timer,
}

/// Everything an electric locomotive script can read and drive
#[derive(Debug)]
pub struct ElectricSystems {
    pub low_voltage: LowVoltageSupply,
    pub pantographs: Pantographs,
    pub circuit_breaker: Relay,
    pub ets_switch: ElectricTrainSupplySwitch,
    pub states: PowerSupplyStates,
    pub inputs: PowerSupplyInputs,
    pub line_voltage: LineVoltageFilter,
    pub power_on_timer: Timer,
    pub auxiliary_power_on_timer: Timer,
    pub min_line_voltage_v: f32,
    pub max_power_w: f32,
    pub outbox: Outbox,
}

impl ElectricSystems {
    fn new(config: &ElectricPowerSupplyConfig, registry: &ScriptRegistry) -> Self {
        Self {
            low_voltage: LowVoltageSupply::new(&config.battery_switch, &config.master_key),
            pantographs: Pantographs::new(&config.pantographs),
            circuit_breaker: Relay::circuit_breaker(&config.circuit_breaker, &registry.relays),
            ets_switch: ElectricTrainSupplySwitch::new(&config.ets_switch),
            states: PowerSupplyStates::default(),
            inputs: PowerSupplyInputs::default(),
            line_voltage: LineVoltageFilter::new(config.line_voltage_filter_s),
            power_on_timer: Timer::new(config.power_on_delay_s),
            auxiliary_power_on_timer: Timer::new(config.auxiliary_power_on_delay_s),
            min_line_voltage_v: config.min_line_voltage_v,
            max_power_w: config.max_power_w.max(0.0),
            outbox: Outbox::new(),
        }
    }

    pub fn line_voltage_ok(&self) -> bool {
        self.pantographs.state() == PantographState::Up
            && self.line_voltage.voltage_v() >= self.min_line_voltage_v
    }

    /// Forwards a cab event to every component
    pub fn dispatch_event(&mut self, event: PowerSupplyEvent) {
        self.low_voltage.handle_event(event, &mut self.outbox);
        self.pantographs.handle_event(event, &mut self.outbox);
        self.circuit_breaker.handle_event(event);
        self.circuit_breaker.drain_outbox(&mut self.outbox);
        self.ets_switch.handle_event(event, &mut self.outbox);
    }
}

/// Built-in electric locomotive behaviour
#[derive(Debug, Default)]
pub struct DefaultElectricScript;

impl PowerSupplyScript<ElectricSystems> for DefaultElectricScript {
    fn name(&self) -> &str {
        "Default"
    }

    fn update(&mut self, s: &mut ElectricSystems, elapsed_s: f32) {
        s.low_voltage.update(elapsed_s, &mut s.states, &mut s.outbox);
        let auxiliary_on = s.states.auxiliary.is_on();
        s.ets_switch.update(elapsed_s, auxiliary_on, &mut s.outbox);
        s.pantographs.update(elapsed_s, &mut s.outbox);
        s.line_voltage
            .update(elapsed_s, s.pantographs.state(), s.inputs.line_voltage_v);

        let line_ok = s.line_voltage_ok();
        s.circuit_breaker.set_closing_authorization(
            s.inputs.tcs_closing_authorization && s.states.low_voltage.is_on() && line_ok,
        );
        s.circuit_breaker.update(elapsed_s);
        s.circuit_breaker.drain_outbox(&mut s.outbox);

        let auxiliary = delayed_on(&mut s.auxiliary_power_on_timer, line_ok, elapsed_s);
        s.states
            .set_auxiliary(PowerSupplyState::from_bool(auxiliary), &mut s.outbox);
        let main = delayed_on(
            &mut s.power_on_timer,
            s.circuit_breaker.is_closed(),
            elapsed_s,
        );
        s.states
            .set_main(PowerSupplyState::from_bool(main), &mut s.outbox);
        s.states.electric_train_supply =
            PowerSupplyState::from_bool(s.ets_switch.on() && s.states.auxiliary.is_on());
    }

    fn handle_event(&mut self, s: &mut ElectricSystems, event: PowerSupplyEvent) {
        match event {
            PowerSupplyEvent::QuickPowerOn => {
                for step in [
                    PowerSupplyEvent::CloseBatterySwitch,
                    PowerSupplyEvent::TurnOnMasterKey,
                    PowerSupplyEvent::RaisePantograph(1),
                    PowerSupplyEvent::GiveCircuitBreakerClosingAuthorization,
                    PowerSupplyEvent::CloseCircuitBreaker,
                    PowerSupplyEvent::SwitchOnElectricTrainSupply,
                ] {
                    s.dispatch_event(step);
                }
            }
            PowerSupplyEvent::QuickPowerOff => {
                s.pantographs.lower_all(&mut s.outbox);
                for step in [
                    PowerSupplyEvent::SwitchOffElectricTrainSupply,
                    PowerSupplyEvent::OpenCircuitBreaker,
                    PowerSupplyEvent::RemoveCircuitBreakerClosingAuthorization,
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

/// An electric locomotive's power supply and its script
#[derive(Debug)]
pub struct ElectricPowerSupply {
    systems: ElectricSystems,
    script: Box<dyn PowerSupplyScript<ElectricSystems>>,
}

impl ElectricPowerSupply {
    pub fn new(config: &ElectricPowerSupplyConfig, registry: &ScriptRegistry) -> Self {
        let script: Box<dyn PowerSupplyScript<ElectricSystems>> = match config.script.as_str() {
            "Default" | "" => Box::new(DefaultElectricScript),
            name => registry
                .electric
                .create_or(name, || Box::new(DefaultElectricScript)),
        };
        let mut supply = Self {
            systems: ElectricSystems::new(config, registry),
            script,
        };
        supply.script.initialize(&mut supply.systems);
        supply
    }

    pub fn systems(&self) -> &ElectricSystems {
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

    /// Power available at the wheels for a throttle setting
    pub fn traction_power_w(&self, throttle_percent: f32) -> f32 {
        if self.systems.states.main.is_on() {
            self.systems.max_power_w * (throttle_percent / 100.0).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn drain_outbox(&mut self, outbox: &mut Outbox) {
        outbox.append(&mut self.systems.outbox);
    }

    pub fn save(&self) -> ElectricPowerSupplyState {
        let s = &self.systems;
        ElectricPowerSupplyState {
            states: s.states,
            low_voltage: s.low_voltage.save(),
            pantographs: s.pantographs.save(),
            circuit_breaker: s.circuit_breaker.save(),
            ets_switch: s.ets_switch.save(),
            filtered_line_voltage_v: s.line_voltage.voltage_v(),
            power_on_timer: s.power_on_timer,
            auxiliary_power_on_timer: s.auxiliary_power_on_timer,
        }
    }

    pub fn restore(&mut self, state: ElectricPowerSupplyState) {
        let s = &mut self.systems;
        s.states = state.states;
        s.low_voltage.restore(state.low_voltage);
        s.pantographs.restore(state.pantographs);
        s.circuit_breaker.restore(state.circuit_breaker);
        s.ets_switch.restore(state.ets_switch);
        s.line_voltage.set_voltage_v(state.filtered_line_voltage_v);
        s.power_on_timer = state.power_on_timer;
        s.auxiliary_power_on_timer = state.auxiliary_power_on_timer;
    }
}
