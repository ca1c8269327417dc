use train_sim::simulation::power_supply::{ElectricPowerSupplyConfig, PowerSupplyConfig};
use train_sim::simulation::track::{EndNode, TrackNode, TrackPin, VectorNode, VectorSection};
use train_sim::simulation::{
    CancellationToken, CarConfig, Message, NullSink, Saveable, Scenario, Simulator, TrackConfig,
    TrainConfig, TrainEvent, TrainId, TrainStart, TrainType, WorldLocation,
};

/// A single straight 2 km line between two buffer stops
fn straight_track() -> TrackConfig {
    let origin = WorldLocation::local(0.0, 0.0, 0.0);
    let line = VectorSection::straight(origin, 0.0, 2000.0);
    let (end, _) = line.end_location();
    TrackConfig {
        nodes: vec![
            TrackNode::End(EndNode {
                location: origin,
                pin: Some(TrackPin::new(1, 0)),
            }),
            TrackNode::Vector(VectorNode {
                sections: vec![line],
                start_pin: Some(TrackPin::new(0, 0)),
                end_pin: Some(TrackPin::new(2, 0)),
            }),
            TrackNode::End(EndNode {
                location: end,
                pin: Some(TrackPin::new(1, 1)),
            }),
        ],
        sidings: Vec::new(),
        super_elevation: None,
    }
}

fn locomotive(id: &str) -> CarConfig {
    CarConfig {
        id: id.to_string(),
        has_cab: true,
        power_supply: Some(PowerSupplyConfig::Electric(
            ElectricPowerSupplyConfig::default(),
        )),
        ..CarConfig::default()
    }
}

fn wagon(id: &str) -> CarConfig {
    CarConfig {
        id: id.to_string(),
        ..CarConfig::default()
    }
}

fn train(name: &str, train_type: TrainType, offset_m: f32, cars: Vec<CarConfig>) -> TrainConfig {
    TrainConfig {
        name: name.to_string(),
        train_type,
        start: TrainStart::Node {
            node: 1,
            offset_m,
            reversed: false,
        },
        cars,
        speed_mps: 0.0,
        ai_target_speed_mps: None,
        waiting: false,
        throttle_percent: 0.0,
        power_on: false,
    }
}

/// A locomotive approaching two standing wagons 1 m ahead of it
fn shunting_scenario(approach_speed_mps: f32) -> Scenario {
    let mut engine = train("Engine", TrainType::Player, 500.0, vec![locomotive("L1")]);
    engine.speed_mps = approach_speed_mps;
    let wagons = train(
        "Wagons",
        TrainType::Static,
        541.0,
        vec![wagon("W1"), wagon("W2")],
    );
    Scenario {
        name: "shunting".to_string(),
        track: straight_track(),
        trains: vec![engine, wagons],
        ..Scenario::default()
    }
}

fn run(simulator: &mut Simulator, ticks: usize, signals: &mut Vec<TrainEvent>) -> Vec<Message> {
    let mut messages = Vec::new();
    for _ in 0..ticks {
        simulator.update(0.1, signals, &mut messages);
    }
    messages
}

#[test]
fn test_demo_scenario_loads() {
    let simulator = Simulator::from_scenario(&Scenario::demo()).unwrap();
    assert_eq!(simulator.trains().len(), 3);
    assert_eq!(simulator.player_train().unwrap().name, "Express");
    assert_eq!(simulator.clock_time_s(), 8.0 * 3600.0);
    assert!(simulator.activity().is_some());
    assert_eq!(simulator.track().siding(1).unwrap().name, "Goods siding");
}

#[test]
fn test_demo_activity_progresses() {
    let mut simulator = Simulator::from_scenario(&Scenario::demo()).unwrap();
    let mut signals = Vec::new();
    let mut messages = Vec::new();
    for _ in 0..100 {
        simulator.update(0.1, &mut signals, &mut messages);
        simulator.acknowledge_event();
    }
    let activity = simulator.activity().unwrap();
    assert_eq!(activity.event(1).unwrap().times_triggered, 1);
    assert!(activity.event(2).unwrap().is_armed());
    assert!(simulator.player_train().unwrap().distance_travelled_m > 0.0);
    assert!(messages.iter().any(
        |m| matches!(m, Message::Confirm { text, .. } if text == "Depart towards the junction")
    ));
}

#[test]
fn test_scenario_json_round_trip() {
    let demo = Scenario::demo();
    let path = std::env::temp_dir().join(format!("train_sim_scenario_{}.json", std::process::id()));
    std::fs::write(&path, serde_json::to_string_pretty(&demo).unwrap()).unwrap();
    let loaded = Scenario::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded, demo);

    assert!(Scenario::load(&path).is_err());
}

#[test]
fn test_activity_without_player_is_rejected() {
    let mut scenario = Scenario::demo();
    for config in &mut scenario.trains {
        if config.train_type == TrainType::Player {
            config.train_type = TrainType::Static;
        }
    }
    assert!(Simulator::from_scenario(&scenario).is_err());
}

#[test]
fn test_player_without_cab_is_rejected() {
    let scenario = Scenario {
        name: "no cab".to_string(),
        track: straight_track(),
        trains: vec![train("Rake", TrainType::Player, 500.0, vec![wagon("W1")])],
        ..Scenario::default()
    };
    assert!(Simulator::from_scenario(&scenario).is_err());
}

#[test]
fn test_second_player_train_is_demoted() {
    let scenario = Scenario {
        name: "two players".to_string(),
        track: straight_track(),
        trains: vec![
            train("First", TrainType::Player, 500.0, vec![locomotive("L1")]),
            train("Second", TrainType::Player, 900.0, vec![locomotive("L2")]),
        ],
        ..Scenario::default()
    };
    let simulator = Simulator::from_scenario(&scenario).unwrap();
    assert_eq!(simulator.player_train_id(), Some(TrainId(0)));
    assert_eq!(
        simulator.train_by_name("Second").unwrap().train_type,
        TrainType::Static
    );
}

#[test]
fn test_slow_contact_couples_trains() {
    let mut simulator = Simulator::from_scenario(&shunting_scenario(1.0)).unwrap();
    let mut signals = Vec::new();
    run(&mut simulator, 30, &mut signals);

    assert_eq!(simulator.trains().len(), 1);
    let merged = &simulator.trains()[0];
    let ids: Vec<String> = merged.car_ids().iter().map(|id| id.to_string()).collect();
    assert_eq!(ids, vec!["W1", "W2", "L1"]);
    assert!(merged.cars.iter().all(|car| car.train == merged.id));
    assert_eq!(simulator.player_train_id(), Some(merged.id));
    assert!(merged.speed_mps > 0.0 && merged.speed_mps < 1.0);
    assert!(signals.contains(&TrainEvent::Couple));
}

#[test]
fn test_fast_contact_does_not_couple() {
    let mut simulator = Simulator::from_scenario(&shunting_scenario(3.0)).unwrap();
    let mut signals = Vec::new();
    let messages = run(&mut simulator, 20, &mut signals);

    assert_eq!(simulator.trains().len(), 2);
    assert!(signals.contains(&TrainEvent::CoupleImpact));
    assert!(!signals.contains(&TrainEvent::Couple));
    assert!(simulator.trains().iter().all(|t| t.speed_mps == 0.0));
    assert!(messages.iter().any(|m| matches!(m, Message::Warning(_))));
}

#[test]
fn test_uncouple_creates_static_train() {
    let mut simulator = Simulator::from_scenario(&Scenario::demo()).unwrap();
    let express = simulator.player_train_id().unwrap();
    let detached = simulator.uncouple(express, 1).unwrap();
    assert_eq!(detached, TrainId(3));
    assert_eq!(simulator.trains().len(), 4);

    let front = simulator.train(express).unwrap();
    let rear = simulator.train(detached).unwrap();
    assert_eq!(front.cars.len(), 2);
    assert_eq!(rear.cars.len(), 2);
    assert_eq!(rear.train_type, TrainType::Static);
    assert_eq!(front.uncoupled_from, Some(detached));
    assert_eq!(rear.uncoupled_from, Some(express));
    assert!(rear.cars.iter().all(|car| car.train == detached));

    let rear_front = rear.front_location(simulator.track()).unwrap();
    assert!(rear_front.approx_eq(&WorldLocation::local(0.0, 0.0, 255.0), 0.01));

    assert!(simulator.uncouple(express, 1).is_err());
    assert!(simulator.uncouple(TrainId(42), 0).is_err());
}

#[test]
fn test_switch_player_train() {
    let mut simulator = Simulator::from_scenario(&Scenario::demo()).unwrap();
    let shunter = simulator.train_by_name("Shunter").unwrap().id;
    simulator.switch_player_train(shunter).unwrap();

    assert_eq!(simulator.player_train_id(), Some(shunter));
    assert_eq!(
        simulator.train_by_name("Shunter").unwrap().train_type,
        TrainType::Player
    );
    assert_eq!(
        simulator.train_by_name("Express").unwrap().train_type,
        TrainType::Static
    );

    let express = simulator.train_by_name("Express").unwrap().id;
    let coaches = simulator.uncouple(express, 0).unwrap();
    assert!(simulator.switch_player_train(coaches).is_err());
    assert_eq!(simulator.player_train_id(), Some(shunter));
}

#[test]
fn test_save_and_restore() {
    let mut simulator = Simulator::from_scenario(&Scenario::demo()).unwrap();
    let mut signals = Vec::new();
    run(&mut simulator, 50, &mut signals);
    let express = simulator.player_train_id().unwrap();
    simulator.uncouple(express, 2).unwrap();
    run(&mut simulator, 10, &mut signals);
    let bytes = simulator.save_to_bytes();

    let mut restored = Simulator::from_scenario(&Scenario::demo()).unwrap();
    restored.load_from_bytes(&bytes).unwrap();

    assert_eq!(restored.clock_time_s(), simulator.clock_time_s());
    assert_eq!(restored.player_train_id(), simulator.player_train_id());
    assert_eq!(restored.trains().len(), simulator.trains().len());
    for (a, b) in restored.trains().iter().zip(simulator.trains()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.car_ids(), b.car_ids());
        assert_eq!(a.front, b.front);
        assert_eq!(a.speed_mps, b.speed_mps);
        assert_eq!(a.train_type, b.train_type);
    }
    assert_eq!(
        restored.activity().unwrap().save(),
        simulator.activity().unwrap().save()
    );

    // both continue identically
    run(&mut simulator, 10, &mut signals);
    run(&mut restored, 10, &mut signals);
    for (a, b) in restored.trains().iter().zip(simulator.trains()) {
        assert_eq!(a.front, b.front);
    }
}

#[test]
fn test_restore_rejects_bad_saves() {
    let mut simulator = Simulator::from_scenario(&Scenario::demo()).unwrap();
    assert!(simulator.load_from_bytes(&[1, 2, 3]).is_err());

    let other = Simulator::from_scenario(&shunting_scenario(0.0)).unwrap();
    assert!(simulator.load_from_bytes(&other.save_to_bytes()).is_err());
    // a rejected save leaves the simulator untouched
    assert_eq!(simulator.trains().len(), 3);
}

#[test]
fn test_restore_rejects_duplicated_train_without_changes() {
    let mut simulator = Simulator::from_scenario(&Scenario::demo()).unwrap();
    let mut signals = Vec::new();
    run(&mut simulator, 20, &mut signals);
    let before = simulator.save();

    let mut snapshot = simulator.save();
    let copy = snapshot.trains[0].clone();
    snapshot.trains.push(copy);
    assert!(simulator.restore(snapshot).is_err());

    assert_eq!(simulator.trains().len(), 3);
    assert_eq!(simulator.save(), before);
}

#[test]
fn test_restore_rejects_mismatched_activity_without_changes() {
    let mut simulator = Simulator::from_scenario(&Scenario::demo()).unwrap();
    let mut signals = Vec::new();
    run(&mut simulator, 20, &mut signals);
    let before = simulator.save();

    let mut snapshot = simulator.save();
    snapshot.clock_time_s += 100.0;
    snapshot.activity.as_mut().unwrap().events.pop();
    assert!(simulator.restore(snapshot).is_err());
    assert_eq!(simulator.save(), before);

    let mut snapshot = simulator.save();
    snapshot.activity = None;
    assert!(simulator.restore(snapshot).is_err());
    assert_eq!(simulator.save(), before);
}

#[test]
fn test_restore_rejects_mismatched_power_supply_without_changes() {
    let mut simulator = Simulator::from_scenario(&Scenario::demo()).unwrap();
    let before = simulator.save();

    let mut snapshot = simulator.save();
    let last = snapshot.trains.len() - 1;
    snapshot.trains[last].cars[0].power_supply = None;
    assert!(simulator.restore(snapshot).is_err());
    assert_eq!(simulator.trains().len(), 3);
    assert_eq!(simulator.save(), before);
}

#[test]
fn test_run_ahead_honours_cancellation() {
    let mut simulator = Simulator::from_scenario(&Scenario::demo()).unwrap();
    let start = simulator.clock_time_s();
    let token = CancellationToken::new();
    let mut messages = Vec::new();

    assert!(simulator.run_ahead(5.0, 0.5, &token, &mut NullSink, &mut messages));
    assert!((simulator.clock_time_s() - start - 5.0).abs() < 1e-3);

    let clone = token.clone();
    clone.cancel();
    assert!(token.is_cancelled());
    let before = simulator.clock_time_s();
    assert!(!simulator.run_ahead(5.0, 0.5, &token, &mut NullSink, &mut messages));
    assert_eq!(simulator.clock_time_s(), before);
}
