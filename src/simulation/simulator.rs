//! Simulator: the composition root driving trains, coupling and the activity
//!
//! Everything runs on the caller's thread. Within a tick trains update in
//! list order, then coupling is checked, then the activity is evaluated and
//! finally all pending notifications are delivered to the sinks.

use anyhow::{Context, Result};
use bitcode::{Decode, Encode};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::activity::{Activity, ActivityContext, ActivitySnapshot};
use super::persist::{decode_or_warn, Saveable};
use super::power_supply::{PowerSupplyEvent, ScriptRegistry};
use super::scenario::Scenario;
use super::signals::{CabControl, CabSetting, Confirmer, Outbox, SignalSink, TrainEvent};
use super::track::{TrackDb, TravellerState, MAX_CENTERLINE_OFFSET_M};
use super::train::{Train, TrainCar, TrainSnapshot, TrainType};
use super::types::{CarId, TrainId, WorldLocation};

/// Closing speed above which trains collide instead of coupling
pub const MAX_COUPLING_SPEED_MPS: f32 = 1.5;

/// Gap at which two just-split trains may couple again
pub const UNCOUPLE_SEPARATION_M: f32 = 5.0;

/// Cooperative cancellation flag shared with a long-running operation
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrainEnd {
    Front,
    Rear,
}

/// A detected contact between two trains
#[derive(Debug, Clone, Copy)]
struct Contact {
    a: usize,
    b: usize,
    a_end: TrainEnd,
    b_end: TrainEnd,
    closing_speed_mps: f32,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct SimulatorSnapshot {
    pub clock_time_s: f64,
    pub next_train_id: usize,
    pub player_train: Option<TrainId>,
    pub trains: Vec<TrainSnapshot>,
    pub activity: Option<ActivitySnapshot>,
}

#[derive(Debug)]
pub struct Simulator {
    track: TrackDb,
    trains: Vec<Train>,
    next_train_id: usize,
    player_train: Option<TrainId>,
    activity: Option<Activity>,
    clock_time_s: f64,
    line_voltage_v: f32,
    /// AI cruising speed per train name, needed again after a restore
    ai_speeds: HashMap<String, f32>,
    outbox: Outbox,
}

impl Simulator {
    pub fn from_scenario(scenario: &Scenario) -> Result<Self> {
        Self::new(scenario, &ScriptRegistry::new())
    }

    /// Builds the track, places every train and loads the activity
    ///
    /// Fails when a train cannot be placed on the track, or when an activity
    /// is present without a player train that can be driven.
    pub fn new(scenario: &Scenario, registry: &ScriptRegistry) -> Result<Self> {
        let mut track = TrackDb::new(scenario.track.nodes.clone());
        let problems = track.validate();
        if problems > 0 {
            warn!("Track of scenario {} has {} link problems", scenario.name, problems);
        }
        for siding in &scenario.track.sidings {
            track.add_siding(siding.clone());
        }
        if let Some(cant) = &scenario.track.super_elevation {
            track.compute_super_elevation(cant.design_speed_mps, cant.max_m);
        }

        let mut trains = Vec::with_capacity(scenario.trains.len());
        let mut player_train = None;
        let mut ai_speeds = HashMap::new();
        for (index, config) in scenario.trains.iter().enumerate() {
            let id = TrainId(index);
            let mut train = Train::new(id, config, &track, registry)
                .with_context(|| format!("Loading train {} of {}", config.name, scenario.name))?;
            if train.train_type == TrainType::Player {
                if player_train.is_some() {
                    warn!("Train {} is a second player train, making it static", train.name);
                    train.train_type = TrainType::Static;
                } else {
                    player_train = Some(id);
                }
            }
            if let Some(speed) = config.ai_target_speed_mps {
                ai_speeds.insert(config.name.clone(), speed);
            }
            trains.push(train);
        }

        if let Some(id) = player_train {
            let player = trains
                .iter()
                .find(|t| t.id == id)
                .context("Player train disappeared while loading")?;
            if !player.has_cab_locomotive() {
                anyhow::bail!("Player train {} has no locomotive with a cab", player.name);
            }
        }
        let activity = match &scenario.activity {
            Some(config) => {
                if player_train.is_none() {
                    anyhow::bail!("Activity {} needs a player train", config.name);
                }
                Some(Activity::new(config, &track))
            }
            None => None,
        };

        info!(
            "Simulator ready: {} track nodes, {} trains",
            track.node_count(),
            trains.len()
        );
        Ok(Self {
            track,
            next_train_id: trains.len(),
            trains,
            player_train,
            activity,
            clock_time_s: scenario.clock_start_s(),
            line_voltage_v: scenario.line_voltage_v,
            ai_speeds,
            outbox: Outbox::new(),
        })
    }

    pub fn track(&self) -> &TrackDb {
        &self.track
    }

    pub fn trains(&self) -> &[Train] {
        &self.trains
    }

    pub fn train(&self, id: TrainId) -> Option<&Train> {
        self.trains.iter().find(|t| t.id == id)
    }

    pub fn train_mut(&mut self, id: TrainId) -> Option<&mut Train> {
        self.trains.iter_mut().find(|t| t.id == id)
    }

    pub fn train_by_name(&self, name: &str) -> Option<&Train> {
        self.trains.iter().find(|t| t.name == name)
    }

    pub fn player_train_id(&self) -> Option<TrainId> {
        self.player_train
    }

    pub fn player_train(&self) -> Option<&Train> {
        self.train(self.player_train?)
    }

    pub fn activity(&self) -> Option<&Activity> {
        self.activity.as_ref()
    }

    pub fn clock_time_s(&self) -> f64 {
        self.clock_time_s
    }

    /// Acknowledges the outstanding activity event
    pub fn acknowledge_event(&mut self) {
        if let Some(activity) = &mut self.activity {
            activity.acknowledge();
        }
    }

    pub fn set_junction_route(&mut self, node: usize, route: usize) -> Result<()> {
        self.track.set_junction_route(node, route)
    }

    /// Sends a driver command to every power supply of a train
    pub fn handle_power_supply_event(&mut self, id: TrainId, event: PowerSupplyEvent) -> Result<()> {
        let train = self
            .train_mut(id)
            .with_context(|| format!("No train {:?}", id))?;
        train.handle_power_supply_event(event);
        Ok(())
    }

    /// Advances the whole simulation by one tick
    pub fn update(
        &mut self,
        elapsed_s: f32,
        sink: &mut dyn SignalSink,
        confirmer: &mut dyn Confirmer,
    ) {
        self.clock_time_s += f64::from(elapsed_s);
        for train in &mut self.trains {
            if let Err(e) = train.update(&self.track, elapsed_s, self.line_voltage_v) {
                warn!("Train {} update failed: {:#}", train.name, e);
            }
        }
        self.clear_separated_trains();
        self.check_coupling();
        self.update_activity();
        self.deliver(sink, confirmer);
    }

    /// Runs ahead up to `seconds` in steps, checking `token` between steps
    ///
    /// Returns false when cancelled before the full span ran.
    pub fn run_ahead(
        &mut self,
        seconds: f32,
        step_s: f32,
        token: &CancellationToken,
        sink: &mut dyn SignalSink,
        confirmer: &mut dyn Confirmer,
    ) -> bool {
        let step_s = if step_s > 0.0 { step_s } else { 0.1 };
        let mut done = 0.0;
        while done < seconds {
            if token.is_cancelled() {
                info!("Run-ahead cancelled after {:.1} s", done);
                return false;
            }
            let step = step_s.min(seconds - done);
            self.update(step, sink, confirmer);
            done += step;
        }
        debug!("Run-ahead of {:.1} s complete", seconds);
        true
    }

    fn update_activity(&mut self) {
        let Some(activity) = &mut self.activity else {
            return;
        };
        let ctx = ActivityContext {
            clock_time_s: self.clock_time_s,
            start_time_s: activity.start_time_s,
            track: &self.track,
            trains: &self.trains,
            player_train: self.player_train,
        };
        activity.update(&ctx);
        for name in activity.take_restart_requests() {
            match self.trains.iter_mut().find(|t| t.name == name) {
                Some(train) => {
                    info!("Restarting waiting train {}", name);
                    train.waiting = false;
                }
                None => warn!("Activity asked to restart unknown train {}", name),
            }
        }
    }

    fn deliver(&mut self, sink: &mut dyn SignalSink, confirmer: &mut dyn Confirmer) {
        for train in &mut self.trains {
            train.outbox.drain_into(sink, confirmer);
        }
        if let Some(activity) = &mut self.activity {
            activity.outbox.drain_into(sink, confirmer);
        }
        self.outbox.drain_into(sink, confirmer);
    }

    fn end_state(&self, index: usize, end: TrainEnd) -> Result<TravellerState> {
        let train = &self.trains[index];
        Ok(match end {
            TrainEnd::Front => train.front_traveller(&self.track)?.state(),
            TrainEnd::Rear => train.rear_traveller(&self.track)?.state(),
        })
    }

    /// Finds the first pair of trains whose ends touch
    fn find_contact(&self) -> Option<Contact> {
        for a in 0..self.trains.len() {
            for b in 0..self.trains.len() {
                if a == b {
                    continue;
                }
                let (ta, tb) = (&self.trains[a], &self.trains[b]);
                // the moving train does the coupling
                if ta.is_stopped() || tb.speed_mps.abs() > ta.speed_mps.abs() {
                    continue;
                }
                if ta.uncoupled_from == Some(tb.id) || tb.uncoupled_from == Some(ta.id) {
                    continue;
                }
                for a_end in [TrainEnd::Front, TrainEnd::Rear] {
                    for b_end in [TrainEnd::Front, TrainEnd::Rear] {
                        match self.ends_touch(a, a_end, b, b_end) {
                            Ok(true) => {
                                let outward = |train: &Train, end| match end {
                                    TrainEnd::Front => train.speed_mps,
                                    TrainEnd::Rear => -train.speed_mps,
                                };
                                return Some(Contact {
                                    a,
                                    b,
                                    a_end,
                                    b_end,
                                    closing_speed_mps: outward(ta, a_end) + outward(tb, b_end),
                                });
                            }
                            Ok(false) => {}
                            Err(e) => {
                                warn!("Coupling check of {} failed: {:#}", ta.name, e);
                            }
                        }
                    }
                }
            }
        }
        None
    }

    fn ends_touch(&self, a: usize, a_end: TrainEnd, b: usize, b_end: TrainEnd) -> Result<bool> {
        let ta = &self.trains[a];
        let tb = &self.trains[b];
        let ea = match a_end {
            TrainEnd::Front => ta.front_traveller(&self.track)?,
            TrainEnd::Rear => ta.rear_traveller(&self.track)?,
        };
        let eb = match b_end {
            TrainEnd::Front => tb.front_traveller(&self.track)?,
            TrainEnd::Rear => tb.rear_traveller(&self.track)?,
        };
        if !self
            .track
            .are_connected(ea.track_node_index(), eb.track_node_index())
        {
            return Ok(false);
        }
        // both ends face outward, so touching ends face each other
        if (ea.heading_rad() - eb.heading_rad()).cos() > 0.0 {
            return Ok(false);
        }
        let gap = ea.overlap_distance_m(&eb, false);
        let distance = ea.location().distance_2d(&eb.location());
        let lateral = (distance * distance - gap * gap).max(0.0).sqrt();
        Ok(gap < 0.0 && lateral <= MAX_CENTERLINE_OFFSET_M)
    }

    fn check_coupling(&mut self) {
        let Some(contact) = self.find_contact() else {
            return;
        };
        if contact.closing_speed_mps > MAX_COUPLING_SPEED_MPS {
            let (a_id, b_id) = (self.trains[contact.a].id, self.trains[contact.b].id);
            let text = format!(
                "Trains {} and {} collided at {:.1} m/s",
                self.trains[contact.a].name, self.trains[contact.b].name, contact.closing_speed_mps
            );
            warn!("{}", text);
            for (index, other) in [(contact.a, b_id), (contact.b, a_id)] {
                let train = &mut self.trains[index];
                train.speed_mps = 0.0;
                train.uncoupled_from = Some(other);
            }
            self.outbox.signal(TrainEvent::CoupleImpact);
            self.outbox.warn(text);
            return;
        }
        if let Err(e) = self.couple(contact) {
            warn!("Coupling failed: {:#}", e);
        }
    }

    /// Merges train `b` into the moving train `a`
    fn couple(&mut self, contact: Contact) -> Result<()> {
        let new_front = match contact.a_end {
            TrainEnd::Front => match contact.b_end {
                // b continues ahead of a: its far end leads
                TrainEnd::Rear => self.end_state(contact.b, TrainEnd::Front)?,
                TrainEnd::Front => self.end_state(contact.b, TrainEnd::Rear)?,
            },
            TrainEnd::Rear => self.end_state(contact.a, TrainEnd::Front)?,
        };
        let same_direction = contact.a_end != contact.b_end;

        let mut b = self.trains.remove(contact.b);
        let a_index = if contact.b < contact.a {
            contact.a - 1
        } else {
            contact.a
        };
        let a = &mut self.trains[a_index];

        let mass_a = a.mass_kg();
        let mass_b = b.mass_kg();
        let speed_b = if same_direction {
            b.speed_mps
        } else {
            -b.speed_mps
        };
        a.speed_mps = (mass_a * a.speed_mps + mass_b * speed_b) / (mass_a + mass_b);

        let mut b_cars = std::mem::take(&mut b.cars);
        if !same_direction {
            b_cars.reverse();
            for car in &mut b_cars {
                car.flipped = !car.flipped;
            }
        }
        match contact.a_end {
            TrainEnd::Front => {
                b_cars.append(&mut a.cars);
                a.cars = b_cars;
            }
            TrainEnd::Rear => a.cars.append(&mut b_cars),
        }
        a.front = new_front;
        a.claim_cars();
        a.outbox.append(&mut b.outbox);
        if self.player_train == Some(b.id) {
            a.train_type = TrainType::Player;
            self.player_train = Some(a.id);
        }
        info!("Train {} coupled to {}, {} cars", b.name, a.name, a.cars.len());
        self.outbox.signal(TrainEvent::Couple);
        self.outbox
            .confirm(CabControl::Coupler, CabSetting::On, format!("Coupled to {}", b.name));
        Ok(())
    }

    /// Splits a train behind car `after_index`; returns the detached train's id
    pub fn uncouple(&mut self, train: TrainId, after_index: usize) -> Result<TrainId> {
        let new_id = TrainId(self.next_train_id);
        let index = self
            .trains
            .iter()
            .position(|t| t.id == train)
            .with_context(|| format!("No train {:?} to uncouple", train))?;
        let source = &mut self.trains[index];
        if after_index + 1 >= source.cars.len() {
            anyhow::bail!(
                "Train {} has {} cars, cannot uncouple after car {}",
                source.name,
                source.cars.len(),
                after_index
            );
        }
        let kept_length: f32 = source.cars[..=after_index].iter().map(|c| c.length_m).sum();
        let mut front = source.front_traveller(&self.track)?;
        front.move_by(-kept_length);
        let detached_front = front.state();

        let cars: Vec<TrainCar> = source.cars.drain(after_index + 1..).collect();
        source.uncoupled_from = Some(new_id);
        let mut detached = Train {
            id: new_id,
            name: format!("{} ({})", source.name, new_id.0),
            train_type: TrainType::Static,
            cars,
            front: detached_front,
            speed_mps: source.speed_mps,
            throttle_percent: 0.0,
            brake_percent: 0.0,
            reverser: source.reverser,
            ai_target_speed_mps: None,
            waiting: false,
            uncoupled_from: Some(train),
            distance_travelled_m: 0.0,
            outbox: Outbox::new(),
        };
        detached.claim_cars();
        info!(
            "Uncoupled {} cars from {} as {}",
            detached.cars.len(),
            source.name,
            detached.name
        );
        self.next_train_id += 1;
        self.trains.push(detached);
        self.outbox.signal(TrainEvent::Uncouple);
        Ok(new_id)
    }

    /// Clears the uncoupling guard once two split trains have moved apart
    fn clear_separated_trains(&mut self) {
        let mut separated = Vec::new();
        for (index, train) in self.trains.iter().enumerate() {
            let Some(other_id) = train.uncoupled_from else {
                continue;
            };
            let Some(other) = self.trains.iter().find(|t| t.id == other_id) else {
                separated.push(index);
                continue;
            };
            match self.end_gap_m(train, other) {
                Ok(gap) if gap > UNCOUPLE_SEPARATION_M => separated.push(index),
                Ok(_) => {}
                Err(e) => warn!("Separation check of {} failed: {:#}", train.name, e),
            }
        }
        for index in separated {
            debug!("Train {} may couple again", self.trains[index].name);
            self.trains[index].uncoupled_from = None;
        }
    }

    /// Smallest straight-line distance between the ends of two trains
    fn end_gap_m(&self, a: &Train, b: &Train) -> Result<f32> {
        let ends = |train: &Train| -> Result<[WorldLocation; 2]> {
            Ok([
                train.front_traveller(&self.track)?.location(),
                train.rear_traveller(&self.track)?.location(),
            ])
        };
        let (ea, eb) = (ends(a)?, ends(b)?);
        Ok(ea
            .iter()
            .flat_map(|x| eb.iter().map(move |y| x.distance(y)))
            .fold(f32::INFINITY, f32::min))
    }

    /// Hands the player's controls to another train
    ///
    /// The target needs a locomotive with a cab. The previous player train
    /// continues as an AI train when it has a path, otherwise it stands.
    pub fn switch_player_train(&mut self, target: TrainId) -> Result<()> {
        let train = self
            .train(target)
            .with_context(|| format!("No train {:?} to switch to", target))?;
        if !train.has_cab_locomotive() {
            anyhow::bail!("Train {} has no locomotive with a cab", train.name);
        }
        if self.player_train == Some(target) {
            return Ok(());
        }
        let previous = self.player_train;
        if let Some(old) = previous.and_then(|id| self.train_mut(id)) {
            old.train_type = if old.has_ai_path() {
                TrainType::Ai
            } else {
                TrainType::Static
            };
            info!("Train {} is now {:?}", old.name, old.train_type);
        }
        let train = self
            .train_mut(target)
            .with_context(|| format!("No train {:?} to switch to", target))?;
        train.train_type = TrainType::Player;
        let name = train.name.clone();
        self.player_train = Some(target);
        info!("Player switched to train {}", name);
        self.outbox.confirm(
            CabControl::PlayerTrain,
            CabSetting::On,
            format!("Now driving {}", name),
        );
        Ok(())
    }

    pub fn save(&self) -> SimulatorSnapshot {
        SimulatorSnapshot {
            clock_time_s: self.clock_time_s,
            next_train_id: self.next_train_id,
            player_train: self.player_train,
            trains: self.trains.iter().map(Train::save).collect(),
            activity: self.activity.as_ref().map(Activity::save),
        }
    }

    /// Restores dynamic state onto a simulator built from the same scenario
    ///
    /// Cars are matched by id, so consists split or joined since loading
    /// are rebuilt as saved. The save is checked in full first; a rejected
    /// save leaves the simulator as it was.
    pub fn restore(&mut self, snapshot: SimulatorSnapshot) -> Result<()> {
        self.check_snapshot(&snapshot)?;
        if let (Some(activity), Some(state)) = (&mut self.activity, snapshot.activity) {
            activity.restore(state)?;
        }

        let mut cars: HashMap<CarId, TrainCar> = HashMap::new();
        for train in self.trains.drain(..) {
            for car in train.cars {
                cars.insert(car.id.clone(), car);
            }
        }
        let mut trains = Vec::with_capacity(snapshot.trains.len());
        for state in snapshot.trains {
            let ai_speed = self.ai_speeds.get(&state.name).copied();
            let name = state.name.clone();
            let train = Train::restore(state, ai_speed, |id| cars.remove(id))
                .with_context(|| format!("Restoring train {}", name))?;
            trains.push(train);
        }
        for id in cars.keys() {
            warn!("Car {} is not part of the save and was dropped", id);
        }
        self.trains = trains;
        self.next_train_id = snapshot.next_train_id;
        self.player_train = snapshot.player_train;
        self.clock_time_s = snapshot.clock_time_s;
        info!(
            "Restored {} trains at clock {:.1} s",
            self.trains.len(),
            self.clock_time_s
        );
        Ok(())
    }

    /// Everything `restore` can reject, checked without changing anything
    fn check_snapshot(&self, snapshot: &SimulatorSnapshot) -> Result<()> {
        let mut loaded = HashMap::new();
        for car in self.trains.iter().flat_map(|t| &t.cars) {
            if loaded.insert(&car.id, car).is_some() {
                anyhow::bail!("Car {} appears twice in the loaded consists", car.id);
            }
        }
        let mut saved = HashSet::new();
        let mut train_ids = HashSet::new();
        for train in &snapshot.trains {
            if !train_ids.insert(train.id) {
                anyhow::bail!("Save holds train {:?} twice", train.id);
            }
            for state in &train.cars {
                if !saved.insert(&state.id) {
                    anyhow::bail!("Saved car {} appears in more than one place", state.id);
                }
                let car = loaded
                    .get(&state.id)
                    .with_context(|| format!("Saved car {} is not in the loaded consists", state.id))?;
                let fits = match (&car.power_supply, &state.power_supply) {
                    (Some(supply), Some(snapshot)) => supply.accepts(snapshot),
                    (None, None) => true,
                    _ => false,
                };
                if !fits {
                    anyhow::bail!("Car {} power supply does not match the save", state.id);
                }
            }
        }
        if let Some(player) = snapshot.player_train {
            if !train_ids.contains(&player) {
                anyhow::bail!("Saved player train {:?} is missing from the save", player);
            }
        }
        match (&self.activity, &snapshot.activity) {
            (Some(activity), Some(state)) => activity.check_snapshot(state)?,
            (None, None) => {}
            _ => anyhow::bail!("Save and scenario disagree on whether an activity runs"),
        }
        Ok(())
    }
}

impl Saveable for Simulator {
    const SAVE_KEY: &'static str = "simulator";

    fn save_to_bytes(&self) -> Vec<u8> {
        bitcode::encode(&self.save())
    }

    fn load_from_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let snapshot: SimulatorSnapshot =
            decode_or_warn(Self::SAVE_KEY, bytes).context("Save data could not be decoded")?;
        self.restore(snapshot)
    }
}
