//! Activity event engine
//!
//! Events are evaluated in declared order once per tick while the activity
//! runs. Only one triggered event may be outstanding: nothing else is
//! evaluated until the caller acknowledges it. Outcomes change the
//! activation levels of sibling events directly, so the whole dynamic state
//! is the per-event (level, trigger count, disabled) triple.

mod event;
mod tasks;

pub use event::{
    track_distance, within_siding, ActionTrigger, ActivityEvent, EventConfig, EventSnapshot,
    Outcomes, TriggerConfig,
};
pub use tasks::{PassengerStopConfig, PassengerStopTask, TaskSnapshot, TaskStatus};

use bitcode::{Decode, Encode};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::signals::{CabControl, CabSetting, Outbox};
use super::track::TrackDb;
use super::train::Train;
use super::types::TrainId;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub name: String,
    /// Clock time the activity starts at
    pub start_time_s: f64,
    pub events: Vec<EventConfig>,
    pub stops: Vec<PassengerStopConfig>,
}

/// What the activity reads from the simulation each tick
#[derive(Debug, Clone, Copy)]
pub struct ActivityContext<'a> {
    pub clock_time_s: f64,
    pub start_time_s: f64,
    pub track: &'a TrackDb,
    pub trains: &'a [Train],
    pub player_train: Option<TrainId>,
}

impl<'a> ActivityContext<'a> {
    pub fn player(&self) -> Option<&'a Train> {
        let id = self.player_train?;
        self.trains.iter().find(|t| t.id == id)
    }

    pub fn elapsed_s(&self) -> f64 {
        self.clock_time_s - self.start_time_s
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Encode, Decode, Serialize, Deserialize)]
pub enum ActivityStatus {
    #[default]
    Running,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct ActivitySnapshot {
    pub status: ActivityStatus,
    pub events: Vec<EventSnapshot>,
    pub tasks: Vec<TaskSnapshot>,
    pub triggered_event: Option<u32>,
    pub last_triggered_event: Option<u32>,
    pub last_clock_time_s: Option<f64>,
}

#[derive(Debug)]
pub struct Activity {
    pub name: String,
    pub start_time_s: f64,
    pub events: Vec<ActivityEvent>,
    pub tasks: Vec<PassengerStopTask>,
    pub status: ActivityStatus,
    /// Event waiting for acknowledgement
    pub triggered_event: Option<u32>,
    pub last_triggered_event: Option<u32>,
    restart_requests: Vec<String>,
    last_clock_time_s: Option<f64>,
    pub outbox: Outbox,
}

impl Activity {
    pub fn new(config: &ActivityConfig, track: &TrackDb) -> Self {
        let events: Vec<ActivityEvent> = config
            .events
            .iter()
            .cloned()
            .map(|event| ActivityEvent::new(event, track))
            .collect();
        for (i, event) in events.iter().enumerate() {
            if events[..i].iter().any(|other| other.id() == event.id()) {
                warn!("Activity {} has duplicate event id {}", config.name, event.id());
            }
        }
        debug!(
            "Activity {}: {} events, {} stops",
            config.name,
            events.len(),
            config.stops.len()
        );
        Self {
            name: config.name.clone(),
            start_time_s: config.start_time_s,
            events,
            tasks: config
                .stops
                .iter()
                .cloned()
                .map(PassengerStopTask::new)
                .collect(),
            status: ActivityStatus::Running,
            triggered_event: None,
            last_triggered_event: None,
            restart_requests: Vec::new(),
            last_clock_time_s: None,
            outbox: Outbox::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status != ActivityStatus::Running
    }

    pub fn event(&self, id: u32) -> Option<&ActivityEvent> {
        self.events.iter().find(|e| e.id() == id)
    }

    /// True once the last station stop has been evaluated
    ///
    /// A stop counts regardless of whether it succeeded. With no stops the
    /// condition holds immediately.
    pub fn all_stops_done(&self) -> bool {
        self.tasks
            .last()
            .map_or(true, |task| task.status.is_completed())
    }

    /// Clears the outstanding event so the next one can surface
    pub fn acknowledge(&mut self) {
        self.triggered_event = None;
    }

    /// Names of waiting trains that outcomes asked to restart
    pub fn take_restart_requests(&mut self) -> Vec<String> {
        std::mem::take(&mut self.restart_requests)
    }

    /// Runs one evaluation pass
    pub fn update(&mut self, ctx: &ActivityContext<'_>) {
        if self.is_completed() {
            return;
        }
        let elapsed_s = self
            .last_clock_time_s
            .map_or(0.0, |last| (ctx.clock_time_s - last).max(0.0));
        self.last_clock_time_s = Some(ctx.clock_time_s);

        if let Some(task) = self.tasks.iter_mut().find(|t| !t.status.is_completed()) {
            task.update(ctx, elapsed_s, &mut self.outbox);
        }

        let all_stops_done = self.all_stops_done();
        for i in 0..self.events.len() {
            if self.triggered_event.is_some() || self.is_completed() {
                break;
            }
            let event = &self.events[i];
            if !event.is_armed() {
                continue;
            }
            let triggered = event.is_triggered(ctx, all_stops_done);
            let event = &mut self.events[i];
            if !triggered {
                if event.is_reversible() && event.times_triggered > 0 {
                    event.is_disabled = false;
                }
                continue;
            }
            if event.is_disabled {
                continue;
            }
            event.times_triggered += 1;
            if event.is_reversible() {
                event.is_disabled = true;
            } else {
                event.activation_level = 0;
            }
            let id = event.id();
            let outcomes = event.config.outcomes.clone();
            info!("Activity event {} ({}) triggered", id, event.name());
            self.apply_outcomes(&outcomes);
            self.triggered_event = Some(id);
            self.last_triggered_event = Some(id);
        }
    }

    fn adjust_level(&mut self, id: u32, change: impl Fn(&ActivityEvent) -> i32) {
        match self.events.iter_mut().find(|e| e.id() == id) {
            Some(event) => {
                event.activation_level = change(event);
                debug!(
                    "Activity event {} activation level now {}",
                    id, event.activation_level
                );
            }
            None => warn!("Outcome refers to unknown event {}", id),
        }
    }

    fn apply_outcomes(&mut self, outcomes: &Outcomes) {
        for &id in &outcomes.activate {
            self.adjust_level(id, |_| 1);
        }
        for &id in &outcomes.restore_activation_level {
            self.adjust_level(id, |e| e.config.activation_level);
        }
        for &id in &outcomes.increment_activation_level {
            self.adjust_level(id, |e| e.activation_level + 1);
        }
        for &id in &outcomes.decrement_activation_level {
            self.adjust_level(id, |e| e.activation_level - 1);
        }
        if let Some(message) = &outcomes.display_message {
            self.outbox
                .confirm(CabControl::Activity, CabSetting::On, message.clone());
        }
        if let Some(train) = &outcomes.restart_waiting_train {
            self.restart_requests.push(train.clone());
        }
        if let Some(reason) = &outcomes.activity_fail {
            warn!("Activity {} failed: {}", self.name, reason);
            self.outbox
                .warn(format!("Activity failed: {}", reason));
            self.status = ActivityStatus::Failed(reason.clone());
        } else if outcomes.activity_success {
            info!("Activity {} completed successfully", self.name);
            self.outbox.inform("Activity completed successfully");
            self.status = ActivityStatus::Succeeded;
        }
    }

    pub fn save(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            status: self.status.clone(),
            events: self.events.iter().map(ActivityEvent::save).collect(),
            tasks: self.tasks.iter().map(PassengerStopTask::save).collect(),
            triggered_event: self.triggered_event,
            last_triggered_event: self.last_triggered_event,
            last_clock_time_s: self.last_clock_time_s,
        }
    }

    /// Restores a snapshot taken from an activity built from the same config
    /// Fails when `snapshot` was not taken from this activity
    pub fn check_snapshot(&self, snapshot: &ActivitySnapshot) -> anyhow::Result<()> {
        if snapshot.events.len() != self.events.len() || snapshot.tasks.len() != self.tasks.len()
        {
            anyhow::bail!(
                "Activity {} save has {} events and {} stops, expected {} and {}",
                self.name,
                snapshot.events.len(),
                snapshot.tasks.len(),
                self.events.len(),
                self.tasks.len()
            );
        }
        Ok(())
    }

    pub fn restore(&mut self, snapshot: ActivitySnapshot) -> anyhow::Result<()> {
        self.check_snapshot(&snapshot)?;
        for (event, state) in self.events.iter_mut().zip(snapshot.events) {
            event.restore(state);
        }
        for (task, state) in self.tasks.iter_mut().zip(snapshot.tasks) {
            task.restore(state);
        }
        self.status = snapshot.status;
        self.triggered_event = snapshot.triggered_event;
        self.last_triggered_event = snapshot.last_triggered_event;
        self.last_clock_time_s = snapshot.last_clock_time_s;
        Ok(())
    }
}
