//! Vehicle power supplies
//!
//! Small automata (battery switch, master key, pantographs, circuit breaker,
//! traction cut-off relay, ETS switch, diesel engines and gearboxes) are
//! composed into one aggregate per vehicle type. Each aggregate is driven by
//! a script and publishes a fixed set of named supply states.

mod battery_switch;
mod cars;
mod diesel;
mod diesel_engine;
mod dual_mode;
mod electric;
mod ets_switch;
mod gearbox;
mod pantograph;
mod relay;
mod script;
mod state;

pub use battery_switch::{
    BatterySwitch, BatterySwitchConfig, BatterySwitchMode, BatterySwitchState, LowVoltageState,
    LowVoltageSupply, MasterKey, MasterKeyConfig, MasterKeyMode, MasterKeyState,
};
pub use cars::{
    ControlCarPowerSupply, ControlCarPowerSupplyConfig, ControlCarPowerSupplyState,
    ControlCarSystems, DefaultControlCarScript, DefaultPassengerCarScript,
    PassengerCarPowerSupply, PassengerCarPowerSupplyConfig, PassengerCarPowerSupplyState,
    PassengerCarSystems,
};
pub use diesel::{
    DefaultDieselScript, DieselPowerSupply, DieselPowerSupplyConfig, DieselPowerSupplyState,
    DieselSystems, FuelTank,
};
pub use diesel_engine::{
    DieselEngine, DieselEngineConfig, DieselEngineSnapshot, DieselEngines, EngineInputs,
};
pub use dual_mode::{
    DefaultDualModeScript, DualModePowerSupply, DualModePowerSupplyConfig,
    DualModePowerSupplyState, DualModeSystems, TractionSource,
};
pub use electric::{
    DefaultElectricScript, ElectricPowerSupply, ElectricPowerSupplyConfig,
    ElectricPowerSupplyState, ElectricSystems,
};
pub use ets_switch::{ElectricTrainSupplySwitch, EtsSwitchConfig, EtsSwitchMode, EtsSwitchState};
pub use gearbox::{GearBox, GearBoxConfig, GearBoxOperation, GearBoxState, GearConfig};
pub use pantograph::{
    LineVoltageFilter, Pantograph, PantographConfig, PantographSnapshot, Pantographs,
    MAX_PANTOGRAPHS,
};
pub use relay::{
    AutomaticRelayScript, ManualRelayScript, Relay, RelayConfig, RelayCore, RelayDriverControls,
    RelayKind, RelayStateSnapshot,
};
pub use script::{PowerSupplyScript, ScriptRegistry, ScriptTable};
pub use state::{
    DieselEngineState, PantographState, PowerSupplyEvent, PowerSupplyInputs, PowerSupplyState,
    PowerSupplyStates, RelayState,
};

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::signals::Outbox;
use super::timer::Timer;

/// Output of a condition that has to hold for the timer's delay
///
/// Returns false and disarms the timer as soon as `condition` drops.
pub(crate) fn delayed_on(timer: &mut Timer, condition: bool, elapsed_s: f32) -> bool {
    if !condition {
        timer.stop();
        return false;
    }
    if !timer.started() {
        timer.start();
    }
    timer.update(elapsed_s);
    timer.triggered()
}

/// Static power-supply configuration of one vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PowerSupplyConfig {
    Electric(ElectricPowerSupplyConfig),
    Diesel(DieselPowerSupplyConfig),
    DualMode(DualModePowerSupplyConfig),
    ControlCar(ControlCarPowerSupplyConfig),
    PassengerCar(PassengerCarPowerSupplyConfig),
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub enum PowerSupplySnapshot {
    Electric(ElectricPowerSupplyState),
    Diesel(DieselPowerSupplyState),
    DualMode(DualModePowerSupplyState),
    ControlCar(ControlCarPowerSupplyState),
    PassengerCar(PassengerCarPowerSupplyState),
}

/// The power supply a vehicle owns
#[derive(Debug)]
pub enum PowerSupply {
    Electric(ElectricPowerSupply),
    Diesel(DieselPowerSupply),
    DualMode(DualModePowerSupply),
    ControlCar(ControlCarPowerSupply),
    PassengerCar(PassengerCarPowerSupply),
}

impl PowerSupply {
    pub fn new(config: &PowerSupplyConfig, registry: &ScriptRegistry) -> Self {
        match config {
            PowerSupplyConfig::Electric(c) => {
                PowerSupply::Electric(ElectricPowerSupply::new(c, registry))
            }
            PowerSupplyConfig::Diesel(c) => PowerSupply::Diesel(DieselPowerSupply::new(c, registry)),
            PowerSupplyConfig::DualMode(c) => {
                PowerSupply::DualMode(DualModePowerSupply::new(c, registry))
            }
            PowerSupplyConfig::ControlCar(c) => {
                PowerSupply::ControlCar(ControlCarPowerSupply::new(c, registry))
            }
            PowerSupplyConfig::PassengerCar(c) => {
                PowerSupply::PassengerCar(PassengerCarPowerSupply::new(c, registry))
            }
        }
    }

    pub fn states(&self) -> &PowerSupplyStates {
        match self {
            PowerSupply::Electric(p) => p.states(),
            PowerSupply::Diesel(p) => p.states(),
            PowerSupply::DualMode(p) => p.states(),
            PowerSupply::ControlCar(p) => p.states(),
            PowerSupply::PassengerCar(p) => p.states(),
        }
    }

    /// True for vehicles that can haul a train on their own
    pub fn is_traction(&self) -> bool {
        matches!(
            self,
            PowerSupply::Electric(_) | PowerSupply::Diesel(_) | PowerSupply::DualMode(_)
        )
    }

    pub fn update(&mut self, elapsed_s: f32, inputs: PowerSupplyInputs) {
        match self {
            PowerSupply::Electric(p) => p.update(elapsed_s, inputs),
            PowerSupply::Diesel(p) => p.update(elapsed_s, inputs),
            PowerSupply::DualMode(p) => p.update(elapsed_s, inputs),
            PowerSupply::ControlCar(p) => p.update(elapsed_s, inputs),
            PowerSupply::PassengerCar(p) => p.update(elapsed_s, inputs),
        }
    }

    pub fn handle_event(&mut self, event: PowerSupplyEvent) {
        match self {
            PowerSupply::Electric(p) => p.handle_event(event),
            PowerSupply::Diesel(p) => p.handle_event(event),
            PowerSupply::DualMode(p) => p.handle_event(event),
            PowerSupply::ControlCar(p) => p.handle_event(event),
            PowerSupply::PassengerCar(p) => p.handle_event(event),
        }
    }

    /// Power available at the wheels for a throttle setting
    pub fn traction_power_w(&self, throttle_percent: f32) -> f32 {
        match self {
            PowerSupply::Electric(p) => p.traction_power_w(throttle_percent),
            PowerSupply::Diesel(p) => p.traction_power_w(throttle_percent),
            PowerSupply::DualMode(p) => p.traction_power_w(throttle_percent),
            PowerSupply::ControlCar(_) | PowerSupply::PassengerCar(_) => 0.0,
        }
    }

    /// Load this vehicle puts on the ETS line
    pub fn ets_demand_w(&self) -> f32 {
        match self {
            PowerSupply::PassengerCar(p) => p.ets_demand_w(),
            _ => 0.0,
        }
    }

    pub fn drain_outbox(&mut self, outbox: &mut Outbox) {
        match self {
            PowerSupply::Electric(p) => p.drain_outbox(outbox),
            PowerSupply::Diesel(p) => p.drain_outbox(outbox),
            PowerSupply::DualMode(p) => p.drain_outbox(outbox),
            PowerSupply::ControlCar(p) => p.drain_outbox(outbox),
            PowerSupply::PassengerCar(p) => p.drain_outbox(outbox),
        }
    }

    pub fn save(&self) -> PowerSupplySnapshot {
        match self {
            PowerSupply::Electric(p) => PowerSupplySnapshot::Electric(p.save()),
            PowerSupply::Diesel(p) => PowerSupplySnapshot::Diesel(p.save()),
            PowerSupply::DualMode(p) => PowerSupplySnapshot::DualMode(p.save()),
            PowerSupply::ControlCar(p) => PowerSupplySnapshot::ControlCar(p.save()),
            PowerSupply::PassengerCar(p) => PowerSupplySnapshot::PassengerCar(p.save()),
        }
    }

    /// True when `snapshot` was taken from a supply of the same kind
    pub fn accepts(&self, snapshot: &PowerSupplySnapshot) -> bool {
        matches!(
            (self, snapshot),
            (PowerSupply::Electric(_), PowerSupplySnapshot::Electric(_))
                | (PowerSupply::Diesel(_), PowerSupplySnapshot::Diesel(_))
                | (PowerSupply::DualMode(_), PowerSupplySnapshot::DualMode(_))
                | (PowerSupply::ControlCar(_), PowerSupplySnapshot::ControlCar(_))
                | (PowerSupply::PassengerCar(_), PowerSupplySnapshot::PassengerCar(_))
        )
    }

    /// Restores a snapshot taken from the same kind of supply
    pub fn restore(&mut self, snapshot: PowerSupplySnapshot) -> anyhow::Result<()> {
        match (self, snapshot) {
            (PowerSupply::Electric(p), PowerSupplySnapshot::Electric(s)) => p.restore(s),
            (PowerSupply::Diesel(p), PowerSupplySnapshot::Diesel(s)) => p.restore(s),
            (PowerSupply::DualMode(p), PowerSupplySnapshot::DualMode(s)) => p.restore(s),
            (PowerSupply::ControlCar(p), PowerSupplySnapshot::ControlCar(s)) => p.restore(s),
            (PowerSupply::PassengerCar(p), PowerSupplySnapshot::PassengerCar(s)) => p.restore(s),
            _ => anyhow::bail!("Power supply snapshot does not match the vehicle's configuration"),
        }
        Ok(())
    }
}
