//! Diesel engines
//!
//! Each engine is a Stopped/Starting/Running/Stopping automaton carrying a
//! continuously integrated RPM that chases the demanded RPM under rate
//! limits. Power and fuel flow come from RPM-indexed tables.

use bitcode::{Decode, Encode};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::super::interpolator::Interpolator;
use super::super::signals::{CabControl, CabSetting, Outbox, TrainEvent};
use super::gearbox::{GearBox, GearBoxConfig, GearBoxState};
use super::state::{DieselEngineState, PowerSupplyEvent};

/// Below this share of idle RPM a clutch-locked engine stalls
const UNDERSPEED_STALL_FRACTION: f32 = 0.9;
/// Converts torque (N·m) × RPM to watts
const TORQUE_RPM_TO_W: f32 = 9.54;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DieselEngineConfig {
    pub idle_rpm: f32,
    /// Defaults to 1.5 × idle
    pub max_rpm: Option<f32>,
    /// Cranking speed, defaults to ⅔ of idle
    pub starting_rpm: Option<f32>,
    /// RPM above which a starting engine counts as running, defaults to 1.1 × starting
    pub starting_confirmation_rpm: Option<f32>,
    /// Overspeed limit while clutch-locked, defaults to 1.05 × max
    pub governor_rpm: Option<f32>,
    pub change_up_rpm_ps: f32,
    pub change_down_rpm_ps: f32,
    pub rate_of_change_up_rpm_pss: f32,
    pub rate_of_change_down_rpm_pss: f32,
    pub accel_factor: f32,
    pub max_power_w: f32,
    /// Throttle % → demanded RPM
    pub throttle_rpm_table: Option<Vec<(f32, f32)>>,
    /// RPM → available power (W)
    pub power_table: Option<Vec<(f32, f32)>>,
    /// RPM → torque (N·m), used with a gearbox
    pub torque_table: Option<Vec<(f32, f32)>>,
    /// RPM → fuel flow (l/h)
    pub consumption_table: Option<Vec<(f32, f32)>>,
    pub gearbox: Option<GearBoxConfig>,
}

impl Default for DieselEngineConfig {
    fn default() -> Self {
        Self {
            idle_rpm: 600.0,
            max_rpm: None,
            starting_rpm: None,
            starting_confirmation_rpm: None,
            governor_rpm: None,
            change_up_rpm_ps: 100.0,
            change_down_rpm_ps: 100.0,
            rate_of_change_up_rpm_pss: 50.0,
            rate_of_change_down_rpm_pss: 50.0,
            accel_factor: 1.0,
            max_power_w: 1_000_000.0,
            throttle_rpm_table: None,
            power_table: None,
            torque_table: None,
            consumption_table: None,
            gearbox: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct DieselEngineSnapshot {
    pub state: DieselEngineState,
    pub real_rpm: f32,
    pub demanded_rpm: f32,
    pub output_power_w: f32,
    pub load_fraction: f32,
    pub gearbox: Option<GearBoxState>,
}

/// Per-tick values an engine reads
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineInputs {
    pub throttle_percent: f32,
    pub speed_mps: f32,
    /// Electric train supply power taken from this engine
    pub ets_draw_w: f32,
}

#[derive(Debug, Clone)]
pub struct DieselEngine {
    id: usize,
    idle_rpm: f32,
    max_rpm: f32,
    starting_rpm: f32,
    starting_confirmation_rpm: f32,
    governor_rpm: f32,
    change_up_rpm_ps: f32,
    change_down_rpm_ps: f32,
    rate_of_change_up_rpm_pss: f32,
    rate_of_change_down_rpm_pss: f32,
    accel_factor: f32,
    max_power_w: f32,
    throttle_rpm: Interpolator,
    power: Interpolator,
    /// Power → RPM, absent when the power table cannot be inverted
    rpm_for_power: Option<Interpolator>,
    torque: Option<Interpolator>,
    consumption: Interpolator,
    gearbox: Option<GearBox>,

    state: DieselEngineState,
    real_rpm: f32,
    demanded_rpm: f32,
    output_power_w: f32,
    available_power_w: f32,
    load_fraction: f32,
    fuel_flow_lph: f32,
}

fn positive_or(name: &str, value: f32, fallback: f32) -> f32 {
    if value > 0.0 {
        value
    } else {
        warn!("Diesel engine {} = {} is not positive, using {}", name, value, fallback);
        fallback
    }
}

impl DieselEngine {
    /// Builds an engine, repairing inconsistent configuration with warnings
    pub fn new(id: usize, config: &DieselEngineConfig) -> Self {
        let idle_rpm = positive_or("idle_rpm", config.idle_rpm, 600.0);
        let max_rpm = match config.max_rpm {
            Some(max) if max > idle_rpm => max,
            Some(max) => {
                warn!(
                    "Diesel engine max_rpm {} not above idle {}, using {}",
                    max,
                    idle_rpm,
                    idle_rpm * 1.5
                );
                idle_rpm * 1.5
            }
            None => {
                warn!("Diesel engine max_rpm not set, using {}", idle_rpm * 1.5);
                idle_rpm * 1.5
            }
        };
        let governor_rpm = match config.governor_rpm {
            Some(governor) if governor >= max_rpm => governor,
            _ => {
                warn!("Diesel engine governor_rpm not set, using {}", max_rpm * 1.05);
                max_rpm * 1.05
            }
        };
        let starting_rpm = config
            .starting_rpm
            .filter(|rpm| *rpm > 0.0)
            .unwrap_or(idle_rpm * 2.0 / 3.0);
        let starting_confirmation_rpm = match config.starting_confirmation_rpm {
            Some(rpm) if rpm > 0.0 && rpm < max_rpm => rpm,
            Some(rpm) => {
                warn!(
                    "Diesel engine starting_confirmation_rpm {} out of range, using {}",
                    rpm,
                    starting_rpm * 1.1
                );
                starting_rpm * 1.1
            }
            None => starting_rpm * 1.1,
        };
        let max_power_w = positive_or("max_power_w", config.max_power_w, 1_000_000.0);
        let full_load_lph = max_power_w * 2.5e-4;

        let throttle_rpm = Interpolator::or_warn(
            "throttle_rpm_table",
            config.throttle_rpm_table.as_deref(),
            || Interpolator::linear(0.0, idle_rpm, 100.0, max_rpm),
        );
        let power = Interpolator::or_warn("power_table", config.power_table.as_deref(), || {
            Interpolator::linear(idle_rpm, 0.0, max_rpm, max_power_w)
        });
        let rpm_for_power = match power.inverse() {
            Ok(table) => Some(table),
            Err(e) => {
                warn!("Table power_table: {}, ETS load will not raise engine speed", e);
                None
            }
        };
        let torque = config.torque_table.as_deref().and_then(|points| {
            match Interpolator::from_points(points) {
                Ok(table) => Some(table),
                Err(e) => {
                    warn!("Table torque_table: {}, using power table", e);
                    None
                }
            }
        });
        let consumption = Interpolator::or_warn(
            "consumption_table",
            config.consumption_table.as_deref(),
            || Interpolator::linear(idle_rpm, full_load_lph * 0.1, max_rpm, full_load_lph),
        );

        Self {
            id,
            idle_rpm,
            max_rpm,
            starting_rpm,
            starting_confirmation_rpm,
            governor_rpm,
            change_up_rpm_ps: positive_or("change_up_rpm_ps", config.change_up_rpm_ps, 100.0),
            change_down_rpm_ps: positive_or("change_down_rpm_ps", config.change_down_rpm_ps, 100.0),
            rate_of_change_up_rpm_pss: positive_or(
                "rate_of_change_up_rpm_pss",
                config.rate_of_change_up_rpm_pss,
                50.0,
            ),
            rate_of_change_down_rpm_pss: positive_or(
                "rate_of_change_down_rpm_pss",
                config.rate_of_change_down_rpm_pss,
                50.0,
            ),
            accel_factor: positive_or("accel_factor", config.accel_factor, 1.0),
            max_power_w,
            throttle_rpm,
            power,
            rpm_for_power,
            torque,
            consumption,
            gearbox: config.gearbox.as_ref().map(GearBox::new),
            state: DieselEngineState::Stopped,
            real_rpm: 0.0,
            demanded_rpm: 0.0,
            output_power_w: 0.0,
            available_power_w: 0.0,
            load_fraction: 0.0,
            fuel_flow_lph: 0.0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> DieselEngineState {
        self.state
    }

    pub fn real_rpm(&self) -> f32 {
        self.real_rpm
    }

    pub fn demanded_rpm(&self) -> f32 {
        self.demanded_rpm
    }

    pub fn idle_rpm(&self) -> f32 {
        self.idle_rpm
    }

    pub fn max_rpm(&self) -> f32 {
        self.max_rpm
    }

    pub fn governor_rpm(&self) -> f32 {
        self.governor_rpm
    }

    pub fn starting_confirmation_rpm(&self) -> f32 {
        self.starting_confirmation_rpm
    }

    /// Power available for traction after the ETS draw
    pub fn output_power_w(&self) -> f32 {
        self.output_power_w
    }

    pub fn max_power_w(&self) -> f32 {
        self.max_power_w
    }

    pub fn load_fraction(&self) -> f32 {
        self.load_fraction
    }

    pub fn fuel_flow_lph(&self) -> f32 {
        self.fuel_flow_lph
    }

    pub fn gearbox(&self) -> Option<&GearBox> {
        self.gearbox.as_ref()
    }

    /// Share of output power reaching the wheels
    pub fn transmission_fraction(&self) -> f32 {
        self.gearbox
            .as_ref()
            .map_or(1.0, GearBox::transmission_fraction)
    }

    fn set_state(&mut self, state: DieselEngineState, outbox: &mut Outbox) {
        if self.state == state {
            return;
        }
        debug!("Diesel engine {}: {:?} -> {:?}", self.id, self.state, state);
        self.state = state;
        let event = match state {
            DieselEngineState::Starting => TrainEvent::EngineStarting(self.id),
            DieselEngineState::Running => TrainEvent::EnginePowerOn(self.id),
            DieselEngineState::Stopping => TrainEvent::EngineStopping(self.id),
            DieselEngineState::Stopped => TrainEvent::EnginePowerOff(self.id),
            DieselEngineState::Unavailable => return,
        };
        outbox.signal(event);
    }

    pub fn start(&mut self, outbox: &mut Outbox) {
        if matches!(
            self.state,
            DieselEngineState::Stopped | DieselEngineState::Stopping
        ) {
            self.set_state(DieselEngineState::Starting, outbox);
        }
    }

    pub fn stop(&mut self, outbox: &mut Outbox) {
        if matches!(
            self.state,
            DieselEngineState::Starting | DieselEngineState::Running
        ) {
            self.set_state(DieselEngineState::Stopping, outbox);
        }
    }

    fn stall(&mut self, reason: &str, outbox: &mut Outbox) {
        warn!("Diesel engine {} stalled ({})", self.id, reason);
        outbox.warn(format!("Diesel engine {} stalled ({})", self.id, reason));
        self.set_state(DieselEngineState::Stopped, outbox);
    }

    fn demanded_for_state(&self, throttle_percent: f32, ets_draw_w: f32) -> f32 {
        match self.state {
            DieselEngineState::Running => {
                // an ETS load holds the engine at least at the speed that covers it
                let ets_rpm = match &self.rpm_for_power {
                    Some(table) if ets_draw_w > 0.0 => table.get(ets_draw_w),
                    _ => 0.0,
                };
                self.throttle_rpm
                    .get(throttle_percent)
                    .max(ets_rpm)
                    .clamp(self.idle_rpm, self.max_rpm)
            }
            DieselEngineState::Starting => (self.starting_confirmation_rpm * 1.1)
                .max(self.starting_rpm)
                .min(self.max_rpm),
            _ => 0.0,
        }
    }

    /// Rate-limited approach of the real RPM to the demanded RPM
    fn integrate_rpm(&mut self, elapsed_s: f32) {
        let demanded = self.demanded_rpm;
        if self.real_rpm < demanded {
            let rate = (2.0 * self.rate_of_change_up_rpm_pss * self.accel_factor
                * (demanded - self.real_rpm))
                .sqrt()
                .min(self.change_up_rpm_ps);
            self.real_rpm = (self.real_rpm + rate * elapsed_s).min(demanded);
        } else if self.real_rpm > demanded {
            let rate = (2.0 * self.rate_of_change_down_rpm_pss * (self.real_rpm - demanded))
                .sqrt()
                .min(self.change_down_rpm_ps);
            self.real_rpm = (self.real_rpm - rate * elapsed_s).max(demanded);
        }
        self.real_rpm = self.real_rpm.clamp(0.0, self.max_rpm);
    }

    pub fn update(&mut self, elapsed_s: f32, inputs: EngineInputs, outbox: &mut Outbox) {
        self.demanded_rpm = self.demanded_for_state(inputs.throttle_percent, inputs.ets_draw_w);

        let running = self.state == DieselEngineState::Running;
        let idle_rpm = self.idle_rpm;
        let mut shaft_rpm = None;
        if let Some(gearbox) = &mut self.gearbox {
            gearbox.update(
                elapsed_s,
                inputs.throttle_percent,
                inputs.speed_mps,
                idle_rpm,
                running,
                outbox,
            );
            if gearbox.is_locked() {
                shaft_rpm = Some(gearbox.shaft_rpm(inputs.speed_mps));
            }
        }

        let stall = match shaft_rpm {
            Some(shaft) if running && shaft > self.governor_rpm => Some("overspeed"),
            Some(shaft) if running && shaft < UNDERSPEED_STALL_FRACTION * self.idle_rpm => {
                Some("underspeed")
            }
            _ => None,
        };
        match (shaft_rpm, stall) {
            (_, Some(reason)) => {
                self.stall(reason, outbox);
                // a stalled engine runs down from where it was
                self.demanded_rpm = 0.0;
                self.integrate_rpm(elapsed_s);
            }
            (Some(shaft), None) if running => self.real_rpm = shaft.clamp(0.0, self.max_rpm),
            _ => self.integrate_rpm(elapsed_s),
        }

        match self.state {
            DieselEngineState::Starting if self.real_rpm > self.starting_confirmation_rpm => {
                self.set_state(DieselEngineState::Running, outbox);
            }
            DieselEngineState::Stopping if self.real_rpm <= 0.0 => {
                self.set_state(DieselEngineState::Stopped, outbox);
            }
            _ => {}
        }

        self.update_power(inputs);
    }

    fn update_power(&mut self, inputs: EngineInputs) {
        let running = self.state == DieselEngineState::Running;
        self.available_power_w = match (&self.torque, &self.gearbox) {
            (Some(torque), Some(_)) => torque.get(self.real_rpm) * self.real_rpm / TORQUE_RPM_TO_W,
            _ => self.power.get(self.real_rpm),
        }
        .clamp(0.0, self.max_power_w);

        if running {
            self.output_power_w = (self.available_power_w - inputs.ets_draw_w).max(0.0);
            let traction_w = self.output_power_w * (inputs.throttle_percent / 100.0).clamp(0.0, 1.0);
            self.load_fraction = if self.available_power_w > 0.0 {
                ((traction_w + inputs.ets_draw_w) / self.available_power_w).clamp(0.0, 1.0)
            } else {
                0.0
            };
        } else {
            self.output_power_w = 0.0;
            self.load_fraction = 0.0;
        }

        self.fuel_flow_lph = match self.state {
            DieselEngineState::Running | DieselEngineState::Starting => {
                self.consumption.get(self.real_rpm).max(0.0)
            }
            _ => 0.0,
        };
    }

    pub fn handle_gear_event(&mut self, event: PowerSupplyEvent, outbox: &mut Outbox) {
        if let Some(gearbox) = &mut self.gearbox {
            gearbox.handle_event(event, outbox);
        }
    }

    pub fn save(&self) -> DieselEngineSnapshot {
        DieselEngineSnapshot {
            state: self.state,
            real_rpm: self.real_rpm,
            demanded_rpm: self.demanded_rpm,
            output_power_w: self.output_power_w,
            load_fraction: self.load_fraction,
            gearbox: self.gearbox.as_ref().map(GearBox::save),
        }
    }

    pub fn restore(&mut self, snapshot: DieselEngineSnapshot) {
        self.state = snapshot.state;
        self.real_rpm = snapshot.real_rpm.clamp(0.0, self.max_rpm);
        self.demanded_rpm = snapshot.demanded_rpm;
        self.output_power_w = snapshot.output_power_w;
        self.load_fraction = snapshot.load_fraction;
        if let (Some(gearbox), Some(state)) = (&mut self.gearbox, snapshot.gearbox) {
            gearbox.restore(state);
        }
    }
}

/// All diesel engines of one vehicle
#[derive(Debug, Clone, Default)]
pub struct DieselEngines {
    list: Vec<DieselEngine>,
}

impl DieselEngines {
    pub fn new(configs: &[DieselEngineConfig]) -> Self {
        Self {
            list: configs
                .iter()
                .enumerate()
                .map(|(i, config)| DieselEngine::new(i + 1, config))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DieselEngine> {
        self.list.iter()
    }

    pub fn get(&self, id: usize) -> Option<&DieselEngine> {
        id.checked_sub(1).and_then(|i| self.list.get(i))
    }

    /// The most active state of all engines
    pub fn state(&self) -> DieselEngineState {
        self.list
            .iter()
            .map(DieselEngine::state)
            .max()
            .unwrap_or(DieselEngineState::Unavailable)
    }

    pub fn any_running(&self) -> bool {
        self.list
            .iter()
            .any(|engine| engine.state() == DieselEngineState::Running)
    }

    /// Traction power at the wheels, before throttle
    pub fn output_power_w(&self) -> f32 {
        self.list
            .iter()
            .map(|engine| engine.output_power_w() * engine.transmission_fraction())
            .sum()
    }

    pub fn max_power_w(&self) -> f32 {
        self.list.iter().map(DieselEngine::max_power_w).sum()
    }

    pub fn fuel_flow_lph(&self) -> f32 {
        self.list.iter().map(DieselEngine::fuel_flow_lph).sum()
    }

    pub fn start_all(&mut self, outbox: &mut Outbox) {
        for engine in &mut self.list {
            engine.start(outbox);
        }
    }

    pub fn stop_all(&mut self, outbox: &mut Outbox) {
        for engine in &mut self.list {
            engine.stop(outbox);
        }
    }

    /// `ets_draw_w` is charged against the first running engine
    pub fn update(
        &mut self,
        elapsed_s: f32,
        throttle_percent: f32,
        speed_mps: f32,
        ets_draw_w: f32,
        outbox: &mut Outbox,
    ) {
        let ets_engine = self
            .list
            .iter()
            .position(|engine| engine.state() == DieselEngineState::Running);
        for (i, engine) in self.list.iter_mut().enumerate() {
            let inputs = EngineInputs {
                throttle_percent,
                speed_mps,
                ets_draw_w: if Some(i) == ets_engine { ets_draw_w } else { 0.0 },
            };
            engine.update(elapsed_s, inputs, outbox);
        }
    }

    /// Applies engine and gear commands
    ///
    /// Starting needs low-voltage power; the caller passes whether it is on.
    pub fn handle_event(&mut self, event: PowerSupplyEvent, low_voltage_on: bool, outbox: &mut Outbox) {
        match event {
            PowerSupplyEvent::StartEngine | PowerSupplyEvent::StartEngineNumber(_)
                if !low_voltage_on =>
            {
                outbox.warn("Cannot start the diesel engine without low voltage power");
            }
            PowerSupplyEvent::StartEngine => {
                self.start_all(outbox);
                outbox.confirm(CabControl::DieselEngine, CabSetting::On, "start");
            }
            PowerSupplyEvent::StopEngine => {
                self.stop_all(outbox);
                outbox.confirm(CabControl::DieselEngine, CabSetting::Off, "stop");
            }
            PowerSupplyEvent::StartEngineNumber(id) => {
                match id.checked_sub(1).and_then(|i| self.list.get_mut(i)) {
                    Some(engine) => {
                        engine.start(outbox);
                        outbox.confirm(CabControl::DieselEngine, CabSetting::On, format!("start engine {}", id));
                    }
                    None => outbox.warn(format!("No diesel engine {}", id)),
                }
            }
            PowerSupplyEvent::StopEngineNumber(id) => {
                match id.checked_sub(1).and_then(|i| self.list.get_mut(i)) {
                    Some(engine) => {
                        engine.stop(outbox);
                        outbox.confirm(CabControl::DieselEngine, CabSetting::Off, format!("stop engine {}", id));
                    }
                    None => outbox.warn(format!("No diesel engine {}", id)),
                }
            }
            PowerSupplyEvent::GearUp | PowerSupplyEvent::GearDown => {
                for engine in &mut self.list {
                    engine.handle_gear_event(event, outbox);
                }
            }
            _ => {}
        }
    }

    pub fn save(&self) -> Vec<DieselEngineSnapshot> {
        self.list.iter().map(DieselEngine::save).collect()
    }

    pub fn restore(&mut self, snapshots: Vec<DieselEngineSnapshot>) {
        for (engine, snapshot) in self.list.iter_mut().zip(snapshots) {
            engine.restore(snapshot);
        }
    }
}
