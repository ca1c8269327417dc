//! Scenario description: track, consists and activity loaded as one unit

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::activity::{ActionTrigger, ActivityConfig, EventConfig, Outcomes, TriggerConfig};
use super::power_supply::{
    ControlCarPowerSupplyConfig, DieselEngineConfig, DieselPowerSupplyConfig,
    DualModePowerSupplyConfig, ElectricPowerSupplyConfig, PassengerCarPowerSupplyConfig,
    PowerSupplyConfig,
};
use super::track::{
    EndNode, JunctionNode, Siding, TrackNode, TrackPin, VectorNode, VectorSection,
};
use super::train::{CarConfig, TrainConfig, TrainStart, TrainType};
use super::types::WorldLocation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperElevationConfig {
    pub design_speed_mps: f32,
    pub max_m: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub nodes: Vec<TrackNode>,
    pub sidings: Vec<Siding>,
    pub super_elevation: Option<SuperElevationConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub name: String,
    pub track: TrackConfig,
    pub trains: Vec<TrainConfig>,
    pub activity: Option<ActivityConfig>,
    /// Catenary voltage seen by pantographs
    pub line_voltage_v: f32,
    /// Clock time when no activity sets one
    pub start_time_s: f64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: String::new(),
            track: TrackConfig::default(),
            trains: Vec::new(),
            activity: None,
            line_voltage_v: 25_000.0,
            start_time_s: 0.0,
        }
    }
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Reading scenario {}", path.display()))?;
        let scenario: Scenario = serde_json::from_str(&text)
            .with_context(|| format!("Parsing scenario {}", path.display()))?;
        info!(
            "Loaded scenario {}: {} track nodes, {} trains",
            scenario.name,
            scenario.track.nodes.len(),
            scenario.trains.len()
        );
        Ok(scenario)
    }

    /// Clock time the simulation starts at
    pub fn clock_start_s(&self) -> f64 {
        self.activity
            .as_ref()
            .map_or(self.start_time_s, |a| a.start_time_s)
    }

    /// A small line with a junction and a curved goods siding
    ///
    /// An electric express leaves the main line start, a diesel shunter and
    /// a waiting dual-mode local stand in the siding.
    pub fn demo() -> Self {
        let origin = WorldLocation::local(0.0, 0.0, 0.0);
        let junction = WorldLocation::local(0.0, 0.0, 1000.0);
        let approach = VectorSection::straight(origin, 0.0, 1000.0);
        let main = VectorSection::straight(junction, 0.0, 3000.0);
        let curve = VectorSection::curved(junction, 0.0, 500.0, 0.2);
        let (curve_end, curve_heading) = curve.end_location();
        let siding = VectorSection::straight(curve_end, curve_heading, 600.0);
        let (siding_end, _) = siding.end_location();
        let (goods_start, _) = siding.location_at(20.0);
        let (goods_end, _) = siding.location_at(250.0);
        let (main_end, _) = main.end_location();

        let nodes = vec![
            TrackNode::End(EndNode {
                location: origin,
                pin: Some(TrackPin::new(1, 0)),
            }),
            TrackNode::Vector(VectorNode {
                sections: vec![approach],
                start_pin: Some(TrackPin::new(0, 0)),
                end_pin: Some(TrackPin::new(2, 0)),
            }),
            TrackNode::Junction(JunctionNode {
                location: junction,
                trunk_pin: Some(TrackPin::new(1, 1)),
                route_pins: vec![TrackPin::new(3, 0), TrackPin::new(5, 0)],
                selected_route: 0,
            }),
            TrackNode::Vector(VectorNode {
                sections: vec![main],
                start_pin: Some(TrackPin::new(2, 1)),
                end_pin: Some(TrackPin::new(4, 0)),
            }),
            TrackNode::End(EndNode {
                location: main_end,
                pin: Some(TrackPin::new(3, 1)),
            }),
            TrackNode::Vector(VectorNode {
                sections: vec![curve, siding],
                start_pin: Some(TrackPin::new(2, 2)),
                end_pin: Some(TrackPin::new(6, 0)),
            }),
            TrackNode::End(EndNode {
                location: siding_end,
                pin: Some(TrackPin::new(5, 1)),
            }),
        ];

        let engine = DieselEngineConfig {
            max_rpm: Some(900.0),
            governor_rpm: Some(950.0),
            ..DieselEngineConfig::default()
        };
        let coach = |id: &str| CarConfig {
            id: id.to_string(),
            length_m: 25.0,
            power_supply: Some(PowerSupplyConfig::PassengerCar(
                PassengerCarPowerSupplyConfig::default(),
            )),
            ..CarConfig::default()
        };
        let wagon = |id: &str| CarConfig {
            id: id.to_string(),
            length_m: 15.0,
            mass_kg: 25_000.0,
            ..CarConfig::default()
        };

        let express = TrainConfig {
            name: "Express".to_string(),
            train_type: TrainType::Player,
            start: TrainStart::Node {
                node: 1,
                offset_m: 300.0,
                reversed: false,
            },
            cars: vec![
                CarConfig {
                    id: "E100".to_string(),
                    mass_kg: 80_000.0,
                    has_cab: true,
                    power_supply: Some(PowerSupplyConfig::Electric(
                        ElectricPowerSupplyConfig::default(),
                    )),
                    ..CarConfig::default()
                },
                coach("C201"),
                coach("C202"),
                coach("C203"),
            ],
            speed_mps: 0.0,
            ai_target_speed_mps: None,
            waiting: false,
            throttle_percent: 10.0,
            power_on: true,
        };
        let shunter = TrainConfig {
            name: "Shunter".to_string(),
            train_type: TrainType::Static,
            start: TrainStart::Node {
                node: 5,
                offset_m: 160.0,
                reversed: false,
            },
            cars: vec![
                CarConfig {
                    id: "D300".to_string(),
                    mass_kg: 60_000.0,
                    has_cab: true,
                    max_force_n: 150_000.0,
                    power_supply: Some(PowerSupplyConfig::Diesel(DieselPowerSupplyConfig {
                        engines: vec![engine.clone()],
                        ..DieselPowerSupplyConfig::default()
                    })),
                    ..CarConfig::default()
                },
                wagon("W401"),
                wagon("W402"),
            ],
            speed_mps: 0.0,
            ai_target_speed_mps: None,
            waiting: false,
            throttle_percent: 0.0,
            power_on: false,
        };
        let local = TrainConfig {
            name: "Local".to_string(),
            train_type: TrainType::Ai,
            start: TrainStart::Node {
                node: 5,
                offset_m: 230.0,
                reversed: false,
            },
            cars: vec![
                CarConfig {
                    id: "B500".to_string(),
                    has_cab: true,
                    power_supply: Some(PowerSupplyConfig::DualMode(DualModePowerSupplyConfig {
                        engines: vec![engine],
                        ..DualModePowerSupplyConfig::default()
                    })),
                    ..CarConfig::default()
                },
                CarConfig {
                    id: "B501".to_string(),
                    has_cab: true,
                    power_supply: Some(PowerSupplyConfig::ControlCar(
                        ControlCarPowerSupplyConfig::default(),
                    )),
                    ..CarConfig::default()
                },
            ],
            speed_mps: 0.0,
            ai_target_speed_mps: Some(3.0),
            waiting: true,
            throttle_percent: 0.0,
            power_on: true,
        };

        let activity = ActivityConfig {
            name: "Morning express".to_string(),
            start_time_s: 8.0 * 3600.0,
            events: vec![
                EventConfig {
                    id: 1,
                    name: "Depart".to_string(),
                    activation_level: 1,
                    reversible: false,
                    trigger: TriggerConfig::Time { time_s: 5.0 },
                    outcomes: Outcomes {
                        display_message: Some("Depart towards the junction".to_string()),
                        activate: vec![2],
                        ..Outcomes::default()
                    },
                    train: None,
                },
                EventConfig {
                    id: 2,
                    name: "Line speed".to_string(),
                    activation_level: 0,
                    reversible: false,
                    trigger: TriggerConfig::Action(ActionTrigger::ReachSpeed { speed_mps: 10.0 }),
                    outcomes: Outcomes {
                        display_message: Some("The local may leave the siding".to_string()),
                        restart_waiting_train: Some("Local".to_string()),
                        ..Outcomes::default()
                    },
                    train: None,
                },
                EventConfig {
                    id: 3,
                    name: "Past the junction".to_string(),
                    activation_level: 1,
                    reversible: false,
                    trigger: TriggerConfig::Location {
                        location: WorldLocation::local(0.0, 0.0, 1500.0),
                        radius_m: 25.0,
                        stop_required: false,
                    },
                    outcomes: Outcomes {
                        display_message: Some("Well done".to_string()),
                        activity_success: true,
                        ..Outcomes::default()
                    },
                    train: None,
                },
            ],
            stops: Vec::new(),
        };

        Self {
            name: "Demo line".to_string(),
            track: TrackConfig {
                nodes,
                sidings: vec![Siding {
                    id: 1,
                    name: "Goods siding".to_string(),
                    start: goods_start,
                    end: goods_end,
                }],
                super_elevation: Some(SuperElevationConfig {
                    design_speed_mps: 20.0,
                    max_m: 0.15,
                }),
            },
            trains: vec![express, shunter, local],
            activity: Some(activity),
            line_voltage_v: 25_000.0,
            start_time_s: 0.0,
        }
    }
}
