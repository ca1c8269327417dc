//! Dual-mode (electro-diesel) locomotive power supply
//!
//! The traction cut-off relay may close when either source is ready: a
//! running diesel engine, or a raised pantograph behind a closed circuit
//! breaker. Electric traction takes precedence when both are available.

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::super::signals::Outbox;
use super::super::timer::Timer;
use super::battery_switch::{BatterySwitchConfig, LowVoltageState, LowVoltageSupply, MasterKeyConfig};
use super::diesel::FuelTank;
use super::diesel_engine::{DieselEngineConfig, DieselEngineSnapshot, DieselEngines};
use super::ets_switch::{ElectricTrainSupplySwitch, EtsSwitchConfig, EtsSwitchState};
use super::pantograph::{LineVoltageFilter, PantographConfig, PantographSnapshot, Pantographs};
use super::relay::{Relay, RelayConfig, RelayStateSnapshot};
use super::script::{PowerSupplyScript, ScriptRegistry};
use super::state::{
    PantographState, PowerSupplyEvent, PowerSupplyInputs, PowerSupplyState, PowerSupplyStates,
};
use super::delayed_on;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode, Serialize, Deserialize)]
pub enum TractionSource {
    #[default]
    None,
    Electric,
    Diesel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DualModePowerSupplyConfig {
    pub script: String,
    pub battery_switch: BatterySwitchConfig,
    pub master_key: MasterKeyConfig,
    pub pantographs: Vec<PantographConfig>,
    pub circuit_breaker: RelayConfig,
    pub engines: Vec<DieselEngineConfig>,
    pub traction_cut_off_relay: RelayConfig,
    pub ets_switch: EtsSwitchConfig,
    pub power_on_delay_s: f32,
    pub auxiliary_power_on_delay_s: f32,
    pub min_line_voltage_v: f32,
    pub line_voltage_filter_s: f32,
    /// Traction power in electric mode
    pub electric_max_power_w: f32,
    pub fuel_capacity_l: f32,
    pub initial_fuel_l: Option<f32>,
}

impl Default for DualModePowerSupplyConfig {
    fn default() -> Self {
        Self {
            script: "Default".to_string(),
            battery_switch: BatterySwitchConfig::default(),
            master_key: MasterKeyConfig::default(),
            pantographs: vec![PantographConfig::default()],
            circuit_breaker: RelayConfig::default(),
            engines: vec![DieselEngineConfig::default()],
            traction_cut_off_relay: RelayConfig::default(),
            ets_switch: EtsSwitchConfig::default(),
            power_on_delay_s: 0.0,
            auxiliary_power_on_delay_s: 0.0,
            min_line_voltage_v: 10_000.0,
            line_voltage_filter_s: 0.5,
            electric_max_power_w: 4_000_000.0,
            fuel_capacity_l: 3000.0,
            initial_fuel_l: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct DualModePowerSupplyState {
    pub states: PowerSupplyStates,
    pub low_voltage: LowVoltageState,
    pub pantographs: Vec<PantographSnapshot>,
    pub circuit_breaker: RelayStateSnapshot,
    pub engines: Vec<DieselEngineSnapshot>,
    pub traction_cut_off_relay: RelayStateSnapshot,
    pub ets_switch: EtsSwitchState,
    pub filtered_line_voltage_v: f32,
    pub fuel_l: f32,
    pub source: TractionSource,
    pub power_on_timer: Timer,
    pub auxiliary_power_on_timer: Timer,
}

#[derive(Debug)]
pub struct DualModeSystems {
    pub low_voltage: LowVoltageSupply,
    pub pantographs: Pantographs,
    pub circuit_breaker: Relay,
    pub engines: DieselEngines,
    pub traction_cut_off_relay: Relay,
    pub ets_switch: ElectricTrainSupplySwitch,
    pub fuel: FuelTank,
    pub line_voltage: LineVoltageFilter,
    pub source: TractionSource,
    pub states: PowerSupplyStates,
    pub inputs: PowerSupplyInputs,
    pub power_on_timer: Timer,
    pub auxiliary_power_on_timer: Timer,
    pub min_line_voltage_v: f32,
    pub electric_max_power_w: f32,
    pub outbox: Outbox,
}

impl DualModeSystems {
    fn new(config: &DualModePowerSupplyConfig, registry: &ScriptRegistry) -> Self {
        Self {
            low_voltage: LowVoltageSupply::new(&config.battery_switch, &config.master_key),
            pantographs: Pantographs::new(&config.pantographs),
            circuit_breaker: Relay::circuit_breaker(&config.circuit_breaker, &registry.relays),
            engines: DieselEngines::new(&config.engines),
            traction_cut_off_relay: Relay::traction_cut_off_relay(
                &config.traction_cut_off_relay,
                &registry.relays,
            ),
            ets_switch: ElectricTrainSupplySwitch::new(&config.ets_switch),
            fuel: FuelTank::new(config.fuel_capacity_l, config.initial_fuel_l),
            line_voltage: LineVoltageFilter::new(config.line_voltage_filter_s),
            source: TractionSource::None,
            states: PowerSupplyStates::default(),
            inputs: PowerSupplyInputs::default(),
            power_on_timer: Timer::new(config.power_on_delay_s),
            auxiliary_power_on_timer: Timer::new(config.auxiliary_power_on_delay_s),
            min_line_voltage_v: config.min_line_voltage_v,
            electric_max_power_w: config.electric_max_power_w.max(0.0),
            outbox: Outbox::new(),
        }
    }

    pub fn line_voltage_ok(&self) -> bool {
        self.pantographs.state() == PantographState::Up
            && self.line_voltage.voltage_v() >= self.min_line_voltage_v
    }

    /// Pantograph up behind a closed breaker
    pub fn electric_ready(&self) -> bool {
        self.pantographs.state() == PantographState::Up && self.circuit_breaker.is_closed()
    }

    pub fn dispatch_event(&mut self, event: PowerSupplyEvent) {
        self.low_voltage.handle_event(event, &mut self.outbox);
        self.pantographs.handle_event(event, &mut self.outbox);
        self.circuit_breaker.handle_event(event);
        self.circuit_breaker.drain_outbox(&mut self.outbox);
        let low_voltage_on = self.low_voltage.battery_switch.on();
        self.engines
            .handle_event(event, low_voltage_on, &mut self.outbox);
        self.traction_cut_off_relay.handle_event(event);
        self.traction_cut_off_relay.drain_outbox(&mut self.outbox);
        self.ets_switch.handle_event(event, &mut self.outbox);
    }
}

/// Built-in dual-mode behaviour
#[derive(Debug, Default)]
pub struct DefaultDualModeScript;

impl PowerSupplyScript<DualModeSystems> for DefaultDualModeScript {
    fn name(&self) -> &str {
        "Default"
    }

    fn update(&mut self, s: &mut DualModeSystems, elapsed_s: f32) {
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

        // the engines only carry the ETS load when they are the traction source
        let ets_draw_w = if s.source == TractionSource::Diesel && s.states.electric_train_supply.is_on() {
            s.inputs.ets_load_w
        } else {
            0.0
        };
        s.engines.update(
            elapsed_s,
            s.inputs.throttle_percent,
            s.inputs.speed_mps,
            ets_draw_w,
            &mut s.outbox,
        );
        s.fuel.supply(&mut s.engines, elapsed_s, &mut s.outbox);

        let running = s.engines.any_running();
        let electric = s.electric_ready();
        s.traction_cut_off_relay
            .set_closing_authorization(s.inputs.tcs_closing_authorization && (running || electric));
        s.traction_cut_off_relay.update(elapsed_s);
        s.traction_cut_off_relay.drain_outbox(&mut s.outbox);

        s.source = if electric {
            TractionSource::Electric
        } else if running {
            TractionSource::Diesel
        } else {
            TractionSource::None
        };

        let auxiliary = delayed_on(&mut s.auxiliary_power_on_timer, line_ok || running, elapsed_s);
        s.states
            .set_auxiliary(PowerSupplyState::from_bool(auxiliary), &mut s.outbox);
        let main = delayed_on(
            &mut s.power_on_timer,
            s.traction_cut_off_relay.is_closed() && (running || electric),
            elapsed_s,
        );
        s.states
            .set_main(PowerSupplyState::from_bool(main), &mut s.outbox);
        s.states.electric_train_supply =
            PowerSupplyState::from_bool(s.ets_switch.on() && s.states.auxiliary.is_on());
    }

    fn handle_event(&mut self, s: &mut DualModeSystems, event: PowerSupplyEvent) {
        match event {
            PowerSupplyEvent::QuickPowerOn => {
                for step in [
                    PowerSupplyEvent::CloseBatterySwitch,
                    PowerSupplyEvent::TurnOnMasterKey,
                    PowerSupplyEvent::RaisePantograph(1),
                    PowerSupplyEvent::GiveCircuitBreakerClosingAuthorization,
                    PowerSupplyEvent::CloseCircuitBreaker,
                    PowerSupplyEvent::CloseTractionCutOffRelay,
                    PowerSupplyEvent::SwitchOnElectricTrainSupply,
                ] {
                    s.dispatch_event(step);
                }
            }
            PowerSupplyEvent::QuickPowerOff => {
                s.pantographs.lower_all(&mut s.outbox);
                s.engines.stop_all(&mut s.outbox);
                for step in [
                    PowerSupplyEvent::SwitchOffElectricTrainSupply,
                    PowerSupplyEvent::OpenTractionCutOffRelay,
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

#[derive(Debug)]
pub struct DualModePowerSupply {
    systems: DualModeSystems,
    script: Box<dyn PowerSupplyScript<DualModeSystems>>,
}

impl DualModePowerSupply {
    pub fn new(config: &DualModePowerSupplyConfig, registry: &ScriptRegistry) -> Self {
        let script: Box<dyn PowerSupplyScript<DualModeSystems>> = match config.script.as_str() {
            "Default" | "" => Box::new(DefaultDualModeScript),
            name => registry
                .dual_mode
                .create_or(name, || Box::new(DefaultDualModeScript)),
        };
        let mut supply = Self {
            systems: DualModeSystems::new(config, registry),
            script,
        };
        supply.script.initialize(&mut supply.systems);
        supply
    }

    pub fn systems(&self) -> &DualModeSystems {
        &self.systems
    }

    pub fn states(&self) -> &PowerSupplyStates {
        &self.systems.states
    }

    pub fn script_name(&self) -> &str {
        self.script.name()
    }

    pub fn source(&self) -> TractionSource {
        self.systems.source
    }

    pub fn update(&mut self, elapsed_s: f32, inputs: PowerSupplyInputs) {
        self.systems.inputs = inputs;
        self.script.update(&mut self.systems, elapsed_s);
    }

    pub fn handle_event(&mut self, event: PowerSupplyEvent) {
        self.script.handle_event(&mut self.systems, event);
    }

    pub fn traction_power_w(&self, throttle_percent: f32) -> f32 {
        if !self.systems.states.main.is_on() {
            return 0.0;
        }
        let throttle = (throttle_percent / 100.0).clamp(0.0, 1.0);
        match self.systems.source {
            TractionSource::Electric => self.systems.electric_max_power_w * throttle,
            TractionSource::Diesel => self.systems.engines.output_power_w() * throttle,
            TractionSource::None => 0.0,
        }
    }

    pub fn drain_outbox(&mut self, outbox: &mut Outbox) {
        outbox.append(&mut self.systems.outbox);
    }

    pub fn refuel(&mut self) {
        self.systems.fuel.refill();
    }

    pub fn save(&self) -> DualModePowerSupplyState {
        let s = &self.systems;
        DualModePowerSupplyState {
            states: s.states,
            low_voltage: s.low_voltage.save(),
            pantographs: s.pantographs.save(),
            circuit_breaker: s.circuit_breaker.save(),
            engines: s.engines.save(),
            traction_cut_off_relay: s.traction_cut_off_relay.save(),
            ets_switch: s.ets_switch.save(),
            filtered_line_voltage_v: s.line_voltage.voltage_v(),
            fuel_l: s.fuel.level_l,
            source: s.source,
            power_on_timer: s.power_on_timer,
            auxiliary_power_on_timer: s.auxiliary_power_on_timer,
        }
    }

    pub fn restore(&mut self, state: DualModePowerSupplyState) {
        let s = &mut self.systems;
        s.states = state.states;
        s.low_voltage.restore(state.low_voltage);
        s.pantographs.restore(state.pantographs);
        s.circuit_breaker.restore(state.circuit_breaker);
        s.engines.restore(state.engines);
        s.traction_cut_off_relay.restore(state.traction_cut_off_relay);
        s.ets_switch.restore(state.ets_switch);
        s.line_voltage.set_voltage_v(state.filtered_line_voltage_v);
        s.fuel.level_l = state.fuel_l.clamp(0.0, s.fuel.capacity_l);
        s.source = state.source;
        s.power_on_timer = state.power_on_timer;
        s.auxiliary_power_on_timer = state.auxiliary_power_on_timer;
    }
}
