//! Activity events: static trigger definitions plus their runtime state

use bitcode::{Decode, Encode};
use log::warn;
use serde::{Deserialize, Serialize};

use super::super::track::{Siding, TrackDb, Traveller};
use super::super::train::Train;
use super::super::types::{CarId, WorldLocation};
use super::ActivityContext;

/// Slack added to a siding's length when testing containment
const SIDING_TOLERANCE_M: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_activation_level")]
    pub activation_level: i32,
    #[serde(default)]
    pub reversible: bool,
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub outcomes: Outcomes,
    /// Train the trigger looks at; the player train when unset
    #[serde(default)]
    pub train: Option<String>,
}

fn default_activation_level() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TriggerConfig {
    /// Train end within `radius_m` of a point, measured along the track
    Location {
        location: WorldLocation,
        radius_m: f32,
        #[serde(default)]
        stop_required: bool,
    },
    /// Seconds since the activity started
    Time { time_s: f64 },
    Action(ActionTrigger),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionTrigger {
    AllStops,
    AssembleTrain { cars: Vec<String> },
    AssembleTrainAtLocation { cars: Vec<String>, siding_id: u32 },
    DropOffWagonsAtLocation { cars: Vec<String>, siding_id: u32 },
    PickUpWagons { cars: Vec<String> },
    ReachSpeed { speed_mps: f32 },
}

impl ActionTrigger {
    fn siding_id(&self) -> Option<u32> {
        match self {
            ActionTrigger::AssembleTrainAtLocation { siding_id, .. }
            | ActionTrigger::DropOffWagonsAtLocation { siding_id, .. } => Some(*siding_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Outcomes {
    pub display_message: Option<String>,
    pub activate: Vec<u32>,
    pub restore_activation_level: Vec<u32>,
    pub increment_activation_level: Vec<u32>,
    pub decrement_activation_level: Vec<u32>,
    pub activity_success: bool,
    pub activity_fail: Option<String>,
    pub restart_waiting_train: Option<String>,
}

/// Dynamic part of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub activation_level: i32,
    pub times_triggered: u32,
    pub is_disabled: bool,
}

/// An event while the activity runs
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub config: EventConfig,
    pub activation_level: i32,
    pub times_triggered: u32,
    pub is_disabled: bool,
    /// False when the referenced siding is missing from the track database
    siding_valid: bool,
}

impl ActivityEvent {
    pub fn new(config: EventConfig, track: &TrackDb) -> Self {
        let siding_valid = match &config.trigger {
            TriggerConfig::Action(action) => match action.siding_id() {
                Some(id) if track.siding(id).is_none() => {
                    warn!(
                        "Event {} references siding {} which is not in the track database; location check disabled",
                        config.id, id
                    );
                    false
                }
                _ => true,
            },
            _ => true,
        };
        Self {
            activation_level: config.activation_level,
            times_triggered: 0,
            is_disabled: false,
            siding_valid,
            config,
        }
    }

    pub fn id(&self) -> u32 {
        self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_reversible(&self) -> bool {
        self.config.reversible
    }

    /// True when the update loop should look at this event at all
    pub fn is_armed(&self) -> bool {
        self.activation_level > 0 && (self.times_triggered == 0 || self.config.reversible)
    }

    fn bound_train<'a>(&self, ctx: &ActivityContext<'a>) -> Option<&'a Train> {
        match &self.config.train {
            Some(name) => ctx.trains.iter().find(|t| &t.name == name),
            None => ctx.player(),
        }
    }

    /// Evaluates the trigger predicate
    pub fn is_triggered(&self, ctx: &ActivityContext<'_>, all_stops_done: bool) -> bool {
        match &self.config.trigger {
            TriggerConfig::Time { time_s } => ctx.elapsed_s() >= *time_s,
            TriggerConfig::Location {
                location,
                radius_m,
                stop_required,
            } => match self.bound_train(ctx) {
                Some(train) => {
                    (!stop_required || train.is_stopped())
                        && train_near(ctx.track, train, location, *radius_m)
                }
                None => false,
            },
            TriggerConfig::Action(action) => self.is_action_done(action, ctx, all_stops_done),
        }
    }

    fn is_action_done(
        &self,
        action: &ActionTrigger,
        ctx: &ActivityContext<'_>,
        all_stops_done: bool,
    ) -> bool {
        match action {
            ActionTrigger::AllStops => all_stops_done,
            ActionTrigger::ReachSpeed { speed_mps } => self
                .bound_train(ctx)
                .is_some_and(|train| train.speed_mps.abs() >= *speed_mps),
            ActionTrigger::AssembleTrain { cars } => {
                let wanted = car_ids(cars);
                ctx.trains.iter().any(|train| consist_matches(train, &wanted))
            }
            ActionTrigger::AssembleTrainAtLocation { cars, siding_id } => {
                let wanted = car_ids(cars);
                ctx.trains.iter().any(|train| {
                    consist_matches(train, &wanted)
                        && train.is_stopped()
                        && self.train_in_siding(ctx, train, *siding_id)
                })
            }
            ActionTrigger::PickUpWagons { cars } => {
                let wanted = car_ids(cars);
                self.bound_train(ctx).is_some_and(|train| {
                    train.is_stopped()
                        && wanted
                            .iter()
                            .all(|id| train.cars.iter().any(|c| &c.id == id))
                })
            }
            ActionTrigger::DropOffWagonsAtLocation { cars, siding_id } => {
                let wanted = car_ids(cars);
                wanted.iter().all(|id| {
                    ctx.trains.iter().any(|train| {
                        Some(train.id) != ctx.player_train
                            && train.is_stopped()
                            && train.cars.iter().any(|c| &c.id == id)
                            && self.car_in_siding(ctx, train, id, *siding_id)
                    })
                })
            }
        }
    }

    fn train_in_siding(&self, ctx: &ActivityContext<'_>, train: &Train, siding_id: u32) -> bool {
        if !self.siding_valid {
            return true;
        }
        let Some(siding) = ctx.track.siding(siding_id) else {
            return true;
        };
        let ends = train
            .front_location(ctx.track)
            .and_then(|front| Ok((front, train.rear_traveller(ctx.track)?.location())));
        match ends {
            Ok((front, rear)) => {
                within_siding(ctx.track, siding, &front) && within_siding(ctx.track, siding, &rear)
            }
            Err(e) => {
                warn!("Siding check for train {} failed: {:#}", train.name, e);
                false
            }
        }
    }

    fn car_in_siding(
        &self,
        ctx: &ActivityContext<'_>,
        train: &Train,
        car: &CarId,
        siding_id: u32,
    ) -> bool {
        if !self.siding_valid {
            return true;
        }
        let Some(siding) = ctx.track.siding(siding_id) else {
            return true;
        };
        match train.car_locations(ctx.track) {
            Ok(locations) => locations
                .iter()
                .filter(|(id, _)| id == car)
                .all(|(_, location)| within_siding(ctx.track, siding, location)),
            Err(e) => {
                warn!("Siding check for train {} failed: {:#}", train.name, e);
                false
            }
        }
    }

    pub fn save(&self) -> EventSnapshot {
        EventSnapshot {
            activation_level: self.activation_level,
            times_triggered: self.times_triggered,
            is_disabled: self.is_disabled,
        }
    }

    pub fn restore(&mut self, snapshot: EventSnapshot) {
        self.activation_level = snapshot.activation_level;
        self.times_triggered = snapshot.times_triggered;
        self.is_disabled = snapshot.is_disabled;
    }
}

fn car_ids(cars: &[String]) -> Vec<CarId> {
    cars.iter().map(CarId::new).collect()
}

/// Exact consist match, in either order
fn consist_matches(train: &Train, wanted: &[CarId]) -> bool {
    if train.cars.len() != wanted.len() {
        return false;
    }
    let forward = train.cars.iter().zip(wanted).all(|(car, id)| &car.id == id);
    let backward = train
        .cars
        .iter()
        .rev()
        .zip(wanted)
        .all(|(car, id)| &car.id == id);
    forward || backward
}

/// Track distance from the leading end of the train to `target` is within `radius_m`
///
/// The front leads unless the train runs backward after a reversal.
fn train_near(track: &TrackDb, train: &Train, target: &WorldLocation, radius_m: f32) -> bool {
    match train.leading_traveller(track) {
        Ok(end) => track_distance(&end, target, radius_m).is_some(),
        Err(e) => {
            warn!("Location check for train {} failed: {:#}", train.name, e);
            false
        }
    }
}

/// Distance along the track in either direction, if within `max_distance_m`
pub fn track_distance(
    traveller: &Traveller<'_>,
    target: &WorldLocation,
    max_distance_m: f32,
) -> Option<f32> {
    let ahead = traveller.distance_to(target, max_distance_m);
    let behind = traveller.reversed().distance_to(target, max_distance_m);
    match (ahead, behind) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// True when `location` lies on the track between the siding's two ends
pub fn within_siding(track: &TrackDb, siding: &Siding, location: &WorldLocation) -> bool {
    let Ok(start) = Traveller::from_location(track, &siding.start) else {
        return false;
    };
    let search = siding.start.distance(&siding.end) * 2.0 + SIDING_TOLERANCE_M;
    let toward_end = match start.distance_to(&siding.end, search) {
        Some(length) => Some((start.clone(), length)),
        None => {
            let reversed = start.reversed();
            reversed
                .distance_to(&siding.end, search)
                .map(|length| (reversed, length))
        }
    };
    match toward_end {
        Some((traveller, length)) => traveller
            .distance_to(location, length + SIDING_TOLERANCE_M)
            .is_some(),
        None => false,
    }
}
