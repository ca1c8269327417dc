//! Trains and their cars
//!
//! A train owns its cars exclusively, front to rear. Each car keeps the id
//! of the train it belongs to and owns its power supply. The train's
//! position is the persisted state of a traveller at the front coupler,
//! facing the train's forward direction.

use anyhow::{Context, Result};
use bitcode::{Decode, Encode};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::power_supply::{
    PowerSupply, PowerSupplyConfig, PowerSupplyEvent, PowerSupplyInputs, PowerSupplySnapshot,
    ScriptRegistry,
};
use super::signals::Outbox;
use super::track::{TrackDb, Traveller, TravellerDirection, TravellerState};
use super::types::{CarId, TrainId, WorldLocation, GRAVITY_MPSS, STANDSTILL_SPEED_MPS};

/// Rolling resistance as a share of weight
const ROLLING_RESISTANCE: f32 = 0.002;
/// Air drag coefficient, N/(m/s)²
const AIR_DRAG_N_PER_MPS2: f32 = 6.0;
/// Full-service brake deceleration
const MAX_BRAKE_DECEL_MPSS: f32 = 1.0;
/// Tractive effort is limited by power above this speed
const MIN_POWER_SPEED_MPS: f32 = 1.0;
/// Speed tolerance band of the AI driver
const AI_SPEED_BAND_MPS: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarConfig {
    pub id: String,
    pub length_m: f32,
    pub mass_kg: f32,
    /// Driving cab fitted
    pub has_cab: bool,
    /// Maximum tractive effort of a powered car
    pub max_force_n: f32,
    pub power_supply: Option<PowerSupplyConfig>,
}

impl Default for CarConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            length_m: 20.0,
            mass_kg: 40_000.0,
            has_cab: false,
            max_force_n: 300_000.0,
            power_supply: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarKind {
    Locomotive,
    ControlCar,
    Passenger,
    Freight,
}

/// One rolling-stock vehicle
#[derive(Debug)]
pub struct TrainCar {
    pub id: CarId,
    pub length_m: f32,
    pub mass_kg: f32,
    pub has_cab: bool,
    pub max_force_n: f32,
    /// Car faces against the train's forward direction
    pub flipped: bool,
    /// Owning train
    pub train: TrainId,
    pub power_supply: Option<PowerSupply>,
}

impl TrainCar {
    pub fn new(config: &CarConfig, train: TrainId, registry: &ScriptRegistry) -> Self {
        let length_m = if config.length_m > 0.0 {
            config.length_m
        } else {
            warn!("Car {} has length {}, using 20 m", config.id, config.length_m);
            20.0
        };
        let mass_kg = if config.mass_kg > 0.0 {
            config.mass_kg
        } else {
            warn!("Car {} has mass {}, using 40 t", config.id, config.mass_kg);
            40_000.0
        };
        Self {
            id: CarId::new(config.id.clone()),
            length_m,
            mass_kg,
            has_cab: config.has_cab,
            max_force_n: config.max_force_n.max(0.0),
            flipped: false,
            train,
            power_supply: config
                .power_supply
                .as_ref()
                .map(|c| PowerSupply::new(c, registry)),
        }
    }

    pub fn kind(&self) -> CarKind {
        match &self.power_supply {
            Some(p) if p.is_traction() => CarKind::Locomotive,
            Some(PowerSupply::ControlCar(_)) => CarKind::ControlCar,
            Some(PowerSupply::PassengerCar(_)) => CarKind::Passenger,
            _ => CarKind::Freight,
        }
    }

    pub fn is_locomotive(&self) -> bool {
        self.kind() == CarKind::Locomotive
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Encode, Decode, Serialize, Deserialize,
)]
pub enum TrainType {
    Player,
    Ai,
    #[default]
    Static,
}

/// Where a train starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrainStart {
    /// Front coupler at a world location, facing the node's forward direction unless reversed
    Location {
        location: WorldLocation,
        #[serde(default)]
        reversed: bool,
    },
    /// Front coupler at an offset from the start of a vector node
    Node {
        node: usize,
        offset_m: f32,
        #[serde(default)]
        reversed: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub name: String,
    #[serde(default)]
    pub train_type: TrainType,
    pub start: TrainStart,
    pub cars: Vec<CarConfig>,
    #[serde(default)]
    pub speed_mps: f32,
    /// Cruising speed of an AI train; an AI train without one has no path
    #[serde(default)]
    pub ai_target_speed_mps: Option<f32>,
    /// AI train held until an activity restarts it
    #[serde(default)]
    pub waiting: bool,
    #[serde(default)]
    pub throttle_percent: f32,
    /// Run the quick power-on sequence when the train is placed
    #[serde(default)]
    pub power_on: bool,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct TrainSnapshot {
    pub id: TrainId,
    pub name: String,
    pub train_type: TrainType,
    pub front: TravellerState,
    pub speed_mps: f32,
    pub throttle_percent: f32,
    pub brake_percent: f32,
    pub reverser: f32,
    pub waiting: bool,
    pub uncoupled_from: Option<TrainId>,
    pub distance_travelled_m: f32,
    pub cars: Vec<CarSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct CarSnapshot {
    pub id: CarId,
    pub flipped: bool,
    pub power_supply: Option<PowerSupplySnapshot>,
}

#[derive(Debug)]
pub struct Train {
    pub id: TrainId,
    pub name: String,
    pub train_type: TrainType,
    pub cars: Vec<TrainCar>,
    /// Front coupler, facing forward
    pub front: TravellerState,
    /// Positive along the front traveller's direction
    pub speed_mps: f32,
    pub throttle_percent: f32,
    pub brake_percent: f32,
    /// +1 forward, -1 reverse
    pub reverser: f32,
    pub ai_target_speed_mps: Option<f32>,
    pub waiting: bool,
    /// Train this one was just split from; not re-coupled until they separate
    pub uncoupled_from: Option<TrainId>,
    pub distance_travelled_m: f32,
    pub outbox: Outbox,
}

impl Train {
    /// Builds a train and places it on the track
    ///
    /// Fails when the start position cannot be resolved on the track graph.
    pub fn new(
        id: TrainId,
        config: &TrainConfig,
        track: &TrackDb,
        registry: &ScriptRegistry,
    ) -> Result<Self> {
        if config.cars.is_empty() {
            anyhow::bail!("Train {} has no cars", config.name);
        }
        let front = match &config.start {
            TrainStart::Location { location, reversed } => {
                let traveller = Traveller::from_location(track, location)
                    .with_context(|| format!("Placing train {}", config.name))?;
                if *reversed {
                    traveller.reversed().state()
                } else {
                    traveller.state()
                }
            }
            TrainStart::Node {
                node,
                offset_m,
                reversed,
            } => {
                let direction = if *reversed {
                    TravellerDirection::Backward
                } else {
                    TravellerDirection::Forward
                };
                Traveller::from_node_offset(track, *node, *offset_m, direction)
                    .with_context(|| format!("Placing train {}", config.name))?
                    .state()
            }
        };
        let cars = config
            .cars
            .iter()
            .map(|car| TrainCar::new(car, id, registry))
            .collect();
        let mut train = Self {
            id,
            name: config.name.clone(),
            train_type: config.train_type,
            cars,
            front,
            speed_mps: config.speed_mps,
            throttle_percent: config.throttle_percent.clamp(0.0, 100.0),
            brake_percent: 0.0,
            reverser: 1.0,
            ai_target_speed_mps: config.ai_target_speed_mps,
            waiting: config.waiting,
            uncoupled_from: None,
            distance_travelled_m: 0.0,
            outbox: Outbox::new(),
        };
        // the whole train has to fit on the track behind the front coupler
        let mut rear = train.front_traveller(track)?.reversed();
        let short = rear.move_by(train.length_m());
        if short > 0.0 {
            warn!(
                "Train {} does not fit on the track, {:.1} m hang over the end",
                train.name, short
            );
        }
        if config.power_on {
            train.handle_power_supply_event(PowerSupplyEvent::QuickPowerOn);
        }
        Ok(train)
    }

    pub fn length_m(&self) -> f32 {
        self.cars.iter().map(|car| car.length_m).sum()
    }

    pub fn mass_kg(&self) -> f32 {
        self.cars.iter().map(|car| car.mass_kg).sum()
    }

    pub fn car_ids(&self) -> Vec<CarId> {
        self.cars.iter().map(|car| car.id.clone()).collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.speed_mps.abs() < STANDSTILL_SPEED_MPS
    }

    /// Moving rear first, or standing with the reverser set backward
    pub fn is_running_backward(&self) -> bool {
        if self.is_stopped() {
            self.reverser < 0.0
        } else {
            self.speed_mps < 0.0
        }
    }

    /// Traveller at the end that leads in the current running direction
    pub fn leading_traveller<'a>(&self, track: &'a TrackDb) -> Result<Traveller<'a>> {
        if self.is_running_backward() {
            self.rear_traveller(track)
        } else {
            self.front_traveller(track)
        }
    }

    pub fn has_ai_path(&self) -> bool {
        self.ai_target_speed_mps.is_some()
    }

    /// True when some locomotive carries a driving cab
    pub fn has_cab_locomotive(&self) -> bool {
        self.cars.iter().any(|car| car.has_cab && car.is_locomotive())
    }

    pub fn front_traveller<'a>(&self, track: &'a TrackDb) -> Result<Traveller<'a>> {
        Traveller::from_state(track, &self.front)
            .with_context(|| format!("Train {} front position", self.name))
    }

    /// Traveller at the rear coupler, facing away from the train
    pub fn rear_traveller<'a>(&self, track: &'a TrackDb) -> Result<Traveller<'a>> {
        let mut rear = self.front_traveller(track)?.reversed();
        rear.move_by(self.length_m());
        Ok(rear)
    }

    /// Centre location of every car, front to rear
    pub fn car_locations(&self, track: &TrackDb) -> Result<Vec<(CarId, WorldLocation)>> {
        let mut traveller = self.front_traveller(track)?.reversed();
        let mut locations = Vec::with_capacity(self.cars.len());
        let mut previous_half = 0.0;
        for car in &self.cars {
            traveller.move_by(previous_half + car.length_m / 2.0);
            locations.push((car.id.clone(), traveller.location()));
            previous_half = car.length_m / 2.0;
        }
        Ok(locations)
    }

    pub fn front_location(&self, track: &TrackDb) -> Result<WorldLocation> {
        Ok(self.front_traveller(track)?.location())
    }

    /// Routes a driver command to every car's power supply
    pub fn handle_power_supply_event(&mut self, event: PowerSupplyEvent) {
        for car in &mut self.cars {
            if let Some(power_supply) = &mut car.power_supply {
                power_supply.handle_event(event);
                power_supply.drain_outbox(&mut self.outbox);
            }
        }
    }

    /// Index of the first car able to haul the train
    pub fn lead_locomotive(&self) -> Option<usize> {
        self.cars.iter().position(TrainCar::is_locomotive)
    }

    /// Sets the car back-references after the car list changed
    pub fn claim_cars(&mut self) {
        for car in &mut self.cars {
            car.train = self.id;
        }
    }

    fn drive_ai(&mut self) {
        match (self.train_type, self.ai_target_speed_mps) {
            (TrainType::Ai, Some(target)) if !self.waiting => {
                let speed = self.speed_mps.abs();
                if speed < target - AI_SPEED_BAND_MPS {
                    self.throttle_percent = 100.0;
                    self.brake_percent = 0.0;
                } else if speed > target + AI_SPEED_BAND_MPS {
                    self.throttle_percent = 0.0;
                    self.brake_percent = 50.0;
                } else {
                    self.throttle_percent = 30.0;
                    self.brake_percent = 0.0;
                }
            }
            (TrainType::Player, _) => {}
            _ => {
                self.throttle_percent = 0.0;
                self.brake_percent = 100.0;
            }
        }
    }

    fn update_power_supplies(&mut self, elapsed_s: f32, line_voltage_v: f32) {
        let lead = self.lead_locomotive();
        let (main, auxiliary, ets) = lead
            .and_then(|i| self.cars[i].power_supply.as_ref())
            .map(|p| {
                let states = p.states();
                (
                    states.main.is_on(),
                    states.auxiliary.is_on(),
                    states.electric_train_supply.is_on(),
                )
            })
            .unwrap_or_default();
        let ets_load_w: f32 = self
            .cars
            .iter()
            .filter_map(|car| car.power_supply.as_ref())
            .map(PowerSupply::ets_demand_w)
            .sum();
        let inputs = PowerSupplyInputs {
            speed_mps: self.speed_mps,
            throttle_percent: self.throttle_percent,
            tcs_closing_authorization: true,
            line_voltage_v,
            train_ets_on: ets,
            train_main_on: main,
            train_auxiliary_on: auxiliary,
            ets_load_w: 0.0,
        };
        for (i, car) in self.cars.iter_mut().enumerate() {
            if let Some(power_supply) = &mut car.power_supply {
                let mut car_inputs = inputs;
                if Some(i) == lead {
                    car_inputs.ets_load_w = ets_load_w;
                }
                power_supply.update(elapsed_s, car_inputs);
                power_supply.drain_outbox(&mut self.outbox);
            }
        }
    }

    fn update_speed(&mut self, elapsed_s: f32) {
        let mass = self.mass_kg();
        let power_w: f32 = self
            .cars
            .iter()
            .filter_map(|car| car.power_supply.as_ref())
            .map(|p| p.traction_power_w(self.throttle_percent))
            .sum();
        let max_force_n: f32 = self
            .cars
            .iter()
            .filter(|car| car.is_locomotive())
            .map(|car| car.max_force_n)
            .sum();
        let traction_n = if power_w > 0.0 {
            (power_w / self.speed_mps.abs().max(MIN_POWER_SPEED_MPS)).min(max_force_n)
        } else {
            0.0
        };
        let resistance_n = mass * GRAVITY_MPSS * ROLLING_RESISTANCE
            + AIR_DRAG_N_PER_MPS2 * self.speed_mps * self.speed_mps;
        let brake_n = (self.brake_percent / 100.0).clamp(0.0, 1.0) * mass * MAX_BRAKE_DECEL_MPSS;

        self.speed_mps += self.reverser.signum() * traction_n / mass * elapsed_s;
        let retard = (resistance_n + brake_n) / mass * elapsed_s;
        if self.speed_mps.abs() <= retard {
            self.speed_mps = 0.0;
        } else {
            self.speed_mps -= self.speed_mps.signum() * retard;
        }
    }

    fn update_position(&mut self, track: &TrackDb, elapsed_s: f32) -> Result<()> {
        let distance = self.speed_mps * elapsed_s;
        if distance == 0.0 {
            return Ok(());
        }
        let length = self.length_m();
        let (front, leftover) = if distance > 0.0 {
            let mut front = self.front_traveller(track)?;
            let leftover = front.move_by(distance);
            (front.state(), leftover)
        } else {
            let mut rear = self.rear_traveller(track)?;
            let leftover = rear.move_by(-distance);
            let mut front = rear.reversed();
            front.move_by(length);
            (front.state(), leftover)
        };
        self.front = front;
        self.distance_travelled_m += distance.abs() - leftover.abs();
        if leftover.abs() > 0.0 {
            warn!("Train {} ran into the end of the track", self.name);
            self.outbox
                .warn(format!("Train {} ran into the end of the track", self.name));
            self.speed_mps = 0.0;
        }
        Ok(())
    }

    /// Advances power supplies, speed and position by one tick
    pub fn update(&mut self, track: &TrackDb, elapsed_s: f32, line_voltage_v: f32) -> Result<()> {
        self.drive_ai();
        self.update_power_supplies(elapsed_s, line_voltage_v);
        self.update_speed(elapsed_s);
        self.update_position(track, elapsed_s)
    }

    pub fn save(&self) -> TrainSnapshot {
        TrainSnapshot {
            id: self.id,
            name: self.name.clone(),
            train_type: self.train_type,
            front: self.front,
            speed_mps: self.speed_mps,
            throttle_percent: self.throttle_percent,
            brake_percent: self.brake_percent,
            reverser: self.reverser,
            waiting: self.waiting,
            uncoupled_from: self.uncoupled_from,
            distance_travelled_m: self.distance_travelled_m,
            cars: self
                .cars
                .iter()
                .map(|car| CarSnapshot {
                    id: car.id.clone(),
                    flipped: car.flipped,
                    power_supply: car.power_supply.as_ref().map(PowerSupply::save),
                })
                .collect(),
        }
    }

    /// Rebuilds a train from a snapshot, taking its cars from `take_car`
    pub fn restore(
        snapshot: TrainSnapshot,
        ai_target_speed_mps: Option<f32>,
        mut take_car: impl FnMut(&CarId) -> Option<TrainCar>,
    ) -> Result<Self> {
        let mut cars = Vec::with_capacity(snapshot.cars.len());
        for car_state in snapshot.cars {
            let mut car = take_car(&car_state.id)
                .with_context(|| format!("Car {} is not in the loaded consists", car_state.id))?;
            car.flipped = car_state.flipped;
            match (&mut car.power_supply, car_state.power_supply) {
                (Some(power_supply), Some(state)) => power_supply
                    .restore(state)
                    .with_context(|| format!("Restoring car {}", car.id))?,
                (None, None) => {}
                _ => anyhow::bail!("Car {} power supply does not match the save", car.id),
            }
            cars.push(car);
        }
        debug!("Restored train {} with {} cars", snapshot.name, cars.len());
        let mut train = Self {
            id: snapshot.id,
            name: snapshot.name,
            train_type: snapshot.train_type,
            cars,
            front: snapshot.front,
            speed_mps: snapshot.speed_mps,
            throttle_percent: snapshot.throttle_percent,
            brake_percent: snapshot.brake_percent,
            reverser: snapshot.reverser,
            ai_target_speed_mps,
            waiting: snapshot.waiting,
            uncoupled_from: snapshot.uncoupled_from,
            distance_travelled_m: snapshot.distance_travelled_m,
            outbox: Outbox::new(),
        };
        train.claim_cars();
        Ok(train)
    }
}
