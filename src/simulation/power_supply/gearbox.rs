//! Mechanical gearbox between a diesel engine and the wheels
//!
//! The clutch engages progressively while the driver applies throttle in
//! gear. It locks once the shaft turns fast enough for the engine to run at
//! shaft speed; from then on the engine RPM follows the wheels.

use bitcode::{Decode, Encode};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use super::super::signals::{CabControl, CabSetting, Outbox, TrainEvent};
use super::super::types::STANDSTILL_SPEED_MPS;
use super::state::PowerSupplyEvent;

/// Up-shift when the current gear reaches this share of its top speed
const AUTOMATIC_UPSHIFT_FRACTION: f32 = 0.95;
/// Down-shift below this share of the next lower gear's top speed
const AUTOMATIC_DOWNSHIFT_FRACTION: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GearBoxOperation {
    #[default]
    Manual,
    Automatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GearConfig {
    /// Engine revolutions per axle revolution
    pub ratio: f32,
    pub max_speed_mps: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GearBoxConfig {
    pub operation: GearBoxOperation,
    pub gears: Vec<GearConfig>,
    pub wheel_radius_m: f32,
    pub clutch_engage_time_s: f32,
    pub freewheel: bool,
}

impl Default for GearBoxConfig {
    fn default() -> Self {
        Self {
            operation: GearBoxOperation::Manual,
            gears: vec![
                GearConfig {
                    ratio: 12.0,
                    max_speed_mps: 7.0,
                },
                GearConfig {
                    ratio: 7.0,
                    max_speed_mps: 13.0,
                },
                GearConfig {
                    ratio: 4.5,
                    max_speed_mps: 20.0,
                },
                GearConfig {
                    ratio: 3.0,
                    max_speed_mps: 30.0,
                },
            ],
            wheel_radius_m: 0.45,
            clutch_engage_time_s: 2.0,
            freewheel: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct GearBoxState {
    pub current_gear: usize,
    pub clutch: f32,
    pub locked: bool,
    pub freewheeling: bool,
}

#[derive(Debug, Clone)]
pub struct GearBox {
    operation: GearBoxOperation,
    gears: Vec<GearConfig>,
    wheel_radius_m: f32,
    clutch_engage_time_s: f32,
    freewheel: bool,
    /// 0 is neutral
    current_gear: usize,
    clutch: f32,
    locked: bool,
    freewheeling: bool,
}

impl GearBox {
    pub fn new(config: &GearBoxConfig) -> Self {
        let gears: Vec<GearConfig> = config
            .gears
            .iter()
            .copied()
            .filter(|gear| {
                let valid = gear.ratio > 0.0 && gear.max_speed_mps > 0.0;
                if !valid {
                    warn!("Ignoring gear with ratio {} and max speed {}", gear.ratio, gear.max_speed_mps);
                }
                valid
            })
            .collect();
        let wheel_radius_m = if config.wheel_radius_m > 0.0 {
            config.wheel_radius_m
        } else {
            warn!("Invalid wheel radius {}, using 0.45 m", config.wheel_radius_m);
            0.45
        };
        Self {
            operation: config.operation,
            gears,
            wheel_radius_m,
            clutch_engage_time_s: config.clutch_engage_time_s.max(0.0),
            freewheel: config.freewheel,
            current_gear: 0,
            clutch: 0.0,
            locked: false,
            freewheeling: false,
        }
    }

    pub fn current_gear(&self) -> usize {
        self.current_gear
    }

    pub fn gear_count(&self) -> usize {
        self.gears.len()
    }

    pub fn clutch(&self) -> f32 {
        self.clutch
    }

    /// True when the engine is rigidly coupled to the wheels
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_freewheeling(&self) -> bool {
        self.freewheeling
    }

    /// Share of engine power reaching the wheels
    pub fn transmission_fraction(&self) -> f32 {
        if self.current_gear == 0 || self.freewheeling {
            0.0
        } else {
            self.clutch
        }
    }

    /// Engine-side shaft RPM for a train speed in the current gear
    pub fn shaft_rpm(&self, speed_mps: f32) -> f32 {
        match self.current_gear.checked_sub(1).and_then(|i| self.gears.get(i)) {
            Some(gear) => gear.ratio * speed_mps.abs() / (2.0 * PI * self.wheel_radius_m) * 60.0,
            None => 0.0,
        }
    }

    fn select_gear(&mut self, gear: usize, outbox: &mut Outbox) {
        if gear == self.current_gear || gear > self.gears.len() {
            return;
        }
        debug!("Gear {} -> {}", self.current_gear, gear);
        outbox.signal(if gear > self.current_gear {
            TrainEvent::GearUp
        } else {
            TrainEvent::GearDown
        });
        outbox.signal(TrainEvent::GearPosition(gear));
        self.current_gear = gear;
        self.clutch = 0.0;
        self.set_locked(false, outbox);
    }

    fn set_locked(&mut self, locked: bool, outbox: &mut Outbox) {
        if self.locked != locked {
            self.locked = locked;
            outbox.signal(if locked {
                TrainEvent::ClutchEngaged
            } else {
                TrainEvent::ClutchDisengaged
            });
        }
    }

    pub fn handle_event(&mut self, event: PowerSupplyEvent, outbox: &mut Outbox) {
        if self.operation != GearBoxOperation::Manual {
            return;
        }
        match event {
            PowerSupplyEvent::GearUp => {
                if self.current_gear < self.gears.len() {
                    self.select_gear(self.current_gear + 1, outbox);
                    outbox.confirm(
                        CabControl::GearBox,
                        CabSetting::Increase,
                        format!("gear {}", self.current_gear),
                    );
                }
            }
            PowerSupplyEvent::GearDown => {
                if self.current_gear > 0 {
                    self.select_gear(self.current_gear - 1, outbox);
                    let setting = if self.current_gear == 0 {
                        CabSetting::Neutral
                    } else {
                        CabSetting::Decrease
                    };
                    outbox.confirm(CabControl::GearBox, setting, format!("gear {}", self.current_gear));
                }
            }
            _ => {}
        }
    }

    fn automatic_gear(&self, throttle_percent: f32, speed_mps: f32) -> usize {
        if self.gears.is_empty() {
            return 0;
        }
        let speed = speed_mps.abs();
        match self.current_gear {
            0 if throttle_percent > 0.0 => 1,
            0 => 0,
            gear => {
                let top = self.gears[gear - 1].max_speed_mps;
                if gear < self.gears.len() && speed > top * AUTOMATIC_UPSHIFT_FRACTION {
                    gear + 1
                } else if gear > 1
                    && speed < self.gears[gear - 2].max_speed_mps * AUTOMATIC_DOWNSHIFT_FRACTION
                {
                    gear - 1
                } else {
                    gear
                }
            }
        }
    }

    pub fn update(
        &mut self,
        elapsed_s: f32,
        throttle_percent: f32,
        speed_mps: f32,
        idle_rpm: f32,
        engine_running: bool,
        outbox: &mut Outbox,
    ) {
        if self.operation == GearBoxOperation::Automatic && engine_running {
            let gear = self.automatic_gear(throttle_percent, speed_mps);
            self.select_gear(gear, outbox);
        }

        let target = if !engine_running || self.current_gear == 0 {
            0.0
        } else if throttle_percent > 0.0 {
            1.0
        } else if speed_mps.abs() < STANDSTILL_SPEED_MPS {
            0.0
        } else if self.operation == GearBoxOperation::Automatic
            && self.shaft_rpm(speed_mps) < idle_rpm
        {
            0.0
        } else {
            self.clutch
        };
        if self.clutch_engage_time_s <= 0.0 {
            self.clutch = target;
        } else {
            let step = elapsed_s / self.clutch_engage_time_s;
            self.clutch = if self.clutch < target {
                (self.clutch + step).min(target)
            } else {
                (self.clutch - step).max(target)
            };
        }

        self.freewheeling = self.freewheel && self.current_gear > 0 && throttle_percent <= 0.0;
        let locked = self.clutch >= 1.0
            && self.current_gear > 0
            && !self.freewheeling
            && (self.locked || self.shaft_rpm(speed_mps) >= idle_rpm);
        self.set_locked(locked, outbox);
    }

    pub fn save(&self) -> GearBoxState {
        GearBoxState {
            current_gear: self.current_gear,
            clutch: self.clutch,
            locked: self.locked,
            freewheeling: self.freewheeling,
        }
    }

    pub fn restore(&mut self, state: GearBoxState) {
        self.current_gear = state.current_gear.min(self.gears.len());
        self.clutch = state.clutch.clamp(0.0, 1.0);
        self.locked = state.locked;
        self.freewheeling = state.freewheeling;
    }
}
