//! States, driver events and per-tick inputs shared by the power-supply automata

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::super::signals::{Outbox, TrainEvent};

/// State of a power line or supply
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Encode, Decode, Serialize,
    Deserialize,
)]
pub enum PowerSupplyState {
    /// The vehicle has no such supply
    Unavailable,
    #[default]
    PowerOff,
    PowerOn,
}

impl PowerSupplyState {
    pub fn from_bool(on: bool) -> Self {
        if on {
            PowerSupplyState::PowerOn
        } else {
            PowerSupplyState::PowerOff
        }
    }

    pub fn is_on(self) -> bool {
        self == PowerSupplyState::PowerOn
    }
}

/// Pantograph position, ordered from lowest to highest
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Encode, Decode, Serialize,
    Deserialize,
)]
pub enum PantographState {
    Unavailable,
    #[default]
    Down,
    Lowering,
    Raising,
    Up,
}

/// State of a circuit breaker or traction cut-off relay
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Encode, Decode, Serialize,
    Deserialize,
)]
pub enum RelayState {
    Unavailable,
    #[default]
    Open,
    Closing,
    Closed,
}

/// Diesel engine state, ordered from least to most active
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Encode, Decode, Serialize,
    Deserialize,
)]
pub enum DieselEngineState {
    Unavailable,
    #[default]
    Stopped,
    Stopping,
    Starting,
    Running,
}

/// Driver or automation command injected into a power supply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerSupplyEvent {
    QuickPowerOn,
    QuickPowerOff,
    CloseBatterySwitch,
    OpenBatterySwitch,
    CloseBatterySwitchButtonPressed,
    CloseBatterySwitchButtonReleased,
    OpenBatterySwitchButtonPressed,
    OpenBatterySwitchButtonReleased,
    TurnOnMasterKey,
    TurnOffMasterKey,
    /// Pantograph number, 1-based
    RaisePantograph(usize),
    LowerPantograph(usize),
    CloseCircuitBreaker,
    OpenCircuitBreaker,
    CloseCircuitBreakerButtonPressed,
    CloseCircuitBreakerButtonReleased,
    OpenCircuitBreakerButtonPressed,
    OpenCircuitBreakerButtonReleased,
    GiveCircuitBreakerClosingAuthorization,
    RemoveCircuitBreakerClosingAuthorization,
    CloseTractionCutOffRelay,
    OpenTractionCutOffRelay,
    CloseTractionCutOffRelayButtonPressed,
    CloseTractionCutOffRelayButtonReleased,
    OpenTractionCutOffRelayButtonPressed,
    OpenTractionCutOffRelayButtonReleased,
    /// Starts every diesel engine
    StartEngine,
    StopEngine,
    /// Starts one diesel engine, 1-based
    StartEngineNumber(usize),
    StopEngineNumber(usize),
    SwitchOnElectricTrainSupply,
    SwitchOffElectricTrainSupply,
    GearUp,
    GearDown,
}

/// Values a vehicle reads from its train and cab every tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSupplyInputs {
    pub speed_mps: f32,
    /// Throttle demand, 0–100 %
    pub throttle_percent: f32,
    /// Permission from the train control system to close breakers and relays
    pub tcs_closing_authorization: bool,
    /// Catenary voltage at the vehicle's position
    pub line_voltage_v: f32,
    /// Electric train supply on the train line (from the lead locomotive)
    pub train_ets_on: bool,
    /// Main power of the lead locomotive, as seen by control cars
    pub train_main_on: bool,
    pub train_auxiliary_on: bool,
    /// ETS load this vehicle has to deliver
    pub ets_load_w: f32,
}

impl Default for PowerSupplyInputs {
    fn default() -> Self {
        Self {
            speed_mps: 0.0,
            throttle_percent: 0.0,
            tcs_closing_authorization: true,
            line_voltage_v: 0.0,
            train_ets_on: false,
            train_main_on: false,
            train_auxiliary_on: false,
            ets_load_w: 0.0,
        }
    }
}

/// Named supply states every vehicle exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct PowerSupplyStates {
    pub main: PowerSupplyState,
    pub auxiliary: PowerSupplyState,
    pub electric_train_supply: PowerSupplyState,
    pub low_voltage: PowerSupplyState,
    pub battery: PowerSupplyState,
    pub cab: PowerSupplyState,
}

impl Default for PowerSupplyStates {
    fn default() -> Self {
        Self {
            main: PowerSupplyState::PowerOff,
            auxiliary: PowerSupplyState::PowerOff,
            electric_train_supply: PowerSupplyState::PowerOff,
            low_voltage: PowerSupplyState::PowerOff,
            battery: PowerSupplyState::PowerOff,
            cab: PowerSupplyState::PowerOff,
        }
    }
}

impl PowerSupplyStates {
    pub fn set_main(&mut self, state: PowerSupplyState, outbox: &mut Outbox) {
        if self.main != state {
            self.main = state;
            outbox.signal(if state.is_on() {
                TrainEvent::PowerSupplyMainOn
            } else {
                TrainEvent::PowerSupplyMainOff
            });
        }
    }

    pub fn set_auxiliary(&mut self, state: PowerSupplyState, outbox: &mut Outbox) {
        if self.auxiliary != state {
            self.auxiliary = state;
            outbox.signal(if state.is_on() {
                TrainEvent::PowerSupplyAuxiliaryOn
            } else {
                TrainEvent::PowerSupplyAuxiliaryOff
            });
        }
    }
}
