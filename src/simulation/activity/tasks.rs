//! Station-stop tasks of the player's timetable

use bitcode::{Decode, Encode};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::super::signals::Outbox;
use super::super::types::WorldLocation;
use super::event::track_distance;
use super::ActivityContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerStopConfig {
    pub station: String,
    pub location: WorldLocation,
    #[serde(default = "default_platform_radius_m")]
    pub radius_m: f32,
    /// Clock time the train may leave
    pub scheduled_departure_s: f64,
    #[serde(default = "default_min_dwell_s")]
    pub min_dwell_s: f64,
}

fn default_platform_radius_m() -> f32 {
    100.0
}

fn default_min_dwell_s() -> f64 {
    20.0
}

/// Progress of a task
///
/// `Pending` has not been evaluated yet, `InProgress` is being evaluated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode, Serialize, Deserialize,
)]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed { succeeded: bool },
}

impl TaskStatus {
    pub fn is_completed(self) -> bool {
        matches!(self, TaskStatus::Completed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    pub dwell_s: f64,
    pub arrival_s: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PassengerStopTask {
    pub config: PassengerStopConfig,
    pub status: TaskStatus,
    /// Seconds spent standing at the platform
    pub dwell_s: f64,
    pub arrival_s: Option<f64>,
}

impl PassengerStopTask {
    pub fn new(config: PassengerStopConfig) -> Self {
        Self {
            config,
            status: TaskStatus::Pending,
            dwell_s: 0.0,
            arrival_s: None,
        }
    }

    /// Advances the task for one tick
    ///
    /// The task starts once the player train stands at the platform and
    /// completes when it leaves again. Leaving before the minimum dwell or
    /// before the scheduled departure counts as a failed stop.
    pub fn update(&mut self, ctx: &ActivityContext<'_>, elapsed_s: f64, outbox: &mut Outbox) {
        let Some(train) = ctx.player() else {
            return;
        };
        match self.status {
            TaskStatus::Pending => {
                if !train.is_stopped() {
                    return;
                }
                let at_platform = train
                    .front_traveller(ctx.track)
                    .ok()
                    .and_then(|front| {
                        track_distance(&front, &self.config.location, self.config.radius_m)
                    })
                    .is_some();
                if at_platform {
                    debug!("Arrived at {}", self.config.station);
                    self.status = TaskStatus::InProgress;
                    self.arrival_s = Some(ctx.clock_time_s);
                    self.dwell_s = 0.0;
                    outbox.inform(format!("Arrived at {}", self.config.station));
                }
            }
            TaskStatus::InProgress => {
                if train.is_stopped() {
                    self.dwell_s += elapsed_s;
                    return;
                }
                let succeeded = self.dwell_s >= self.config.min_dwell_s
                    && ctx.clock_time_s >= self.config.scheduled_departure_s;
                info!(
                    "Departed {} after {:.0} s, {}",
                    self.config.station,
                    self.dwell_s,
                    if succeeded { "on schedule" } else { "too early" }
                );
                if !succeeded {
                    outbox.warn(format!("Departed {} too early", self.config.station));
                }
                self.status = TaskStatus::Completed { succeeded };
            }
            TaskStatus::Completed { .. } => {}
        }
    }

    pub fn save(&self) -> TaskSnapshot {
        TaskSnapshot {
            status: self.status,
            dwell_s: self.dwell_s,
            arrival_s: self.arrival_s,
        }
    }

    pub fn restore(&mut self, snapshot: TaskSnapshot) {
        self.status = snapshot.status;
        self.dwell_s = snapshot.dwell_s;
        self.arrival_s = snapshot.arrival_s;
    }
}
