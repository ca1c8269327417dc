use train_sim::simulation::activity::{
    ActionTrigger, Activity, ActivityConfig, ActivityContext, ActivityStatus, EventConfig,
    Outcomes, PassengerStopConfig, TaskStatus, TriggerConfig,
};
use train_sim::simulation::power_supply::ScriptRegistry;
use train_sim::simulation::track::TrackDb;
use train_sim::simulation::{Message, Scenario, Train, TrainId, WorldLocation};

const PLAYER: TrainId = TrainId(0);

/// Demo track with its siding, and the demo consists placed on it
fn demo_world() -> (TrackDb, Vec<Train>) {
    let scenario = Scenario::demo();
    let mut track = TrackDb::new(scenario.track.nodes.clone());
    for siding in scenario.track.sidings.iter().cloned() {
        track.add_siding(siding);
    }
    let registry = ScriptRegistry::new();
    let trains = scenario
        .trains
        .iter()
        .enumerate()
        .map(|(i, config)| Train::new(TrainId(i), config, &track, &registry).unwrap())
        .collect();
    (track, trains)
}

fn context<'a>(track: &'a TrackDb, trains: &'a [Train], clock_time_s: f64) -> ActivityContext<'a> {
    ActivityContext {
        clock_time_s,
        start_time_s: 0.0,
        track,
        trains,
        player_train: Some(PLAYER),
    }
}

fn event(id: u32, trigger: TriggerConfig) -> EventConfig {
    EventConfig {
        id,
        name: format!("event {}", id),
        activation_level: 1,
        reversible: false,
        trigger,
        outcomes: Outcomes::default(),
        train: None,
    }
}

fn activity(track: &TrackDb, events: Vec<EventConfig>) -> Activity {
    let config = ActivityConfig {
        name: "test".to_string(),
        start_time_s: 0.0,
        events,
        stops: Vec::new(),
    };
    Activity::new(&config, track)
}

#[test]
fn test_time_event_fires_after_its_time() {
    let (track, trains) = demo_world();
    let mut activity = activity(&track, vec![event(1, TriggerConfig::Time { time_s: 60.0 })]);

    activity.update(&context(&track, &trains, 59.0));
    assert_eq!(activity.triggered_event, None);

    activity.update(&context(&track, &trains, 61.0));
    assert_eq!(activity.triggered_event, Some(1));
    assert_eq!(activity.event(1).unwrap().times_triggered, 1);
}

#[test]
fn test_only_one_event_outstanding() {
    let (track, trains) = demo_world();
    let mut activity = activity(
        &track,
        vec![
            event(1, TriggerConfig::Time { time_s: 10.0 }),
            event(2, TriggerConfig::Time { time_s: 10.0 }),
        ],
    );

    activity.update(&context(&track, &trains, 20.0));
    assert_eq!(activity.triggered_event, Some(1));
    activity.update(&context(&track, &trains, 21.0));
    assert_eq!(activity.triggered_event, Some(1));
    assert_eq!(activity.event(2).unwrap().times_triggered, 0);

    activity.acknowledge();
    activity.update(&context(&track, &trains, 22.0));
    assert_eq!(activity.triggered_event, Some(2));
    assert_eq!(activity.last_triggered_event, Some(2));
}

#[test]
fn test_non_reversible_event_fires_once() {
    let (track, trains) = demo_world();
    let mut activity = activity(&track, vec![event(1, TriggerConfig::Time { time_s: 0.0 })]);

    for clock in 1..20 {
        activity.update(&context(&track, &trains, f64::from(clock)));
        activity.acknowledge();
    }
    let fired = activity.event(1).unwrap();
    assert_eq!(fired.times_triggered, 1);
    assert_eq!(fired.activation_level, 0);
    assert!(!fired.is_armed());
}

#[test]
fn test_outcomes_activate_other_events() {
    let (track, trains) = demo_world();
    let mut first = event(1, TriggerConfig::Time { time_s: 0.0 });
    first.outcomes.activate = vec![2];
    first.outcomes.display_message = Some("go".to_string());
    let mut second = event(2, TriggerConfig::Time { time_s: 0.0 });
    second.activation_level = 0;
    let mut activity = activity(&track, vec![first, second]);

    assert!(!activity.event(2).unwrap().is_armed());
    activity.update(&context(&track, &trains, 1.0));
    assert_eq!(activity.triggered_event, Some(1));
    assert!(activity.event(2).unwrap().is_armed());
    assert!(activity
        .outbox
        .messages
        .iter()
        .any(|m| matches!(m, Message::Confirm { text, .. } if text == "go")));

    activity.acknowledge();
    activity.update(&context(&track, &trains, 2.0));
    assert_eq!(activity.triggered_event, Some(2));
}

#[test]
fn test_reversible_event_rearms_after_condition_clears() {
    let (track, mut trains) = demo_world();
    let mut fast = event(
        1,
        TriggerConfig::Action(ActionTrigger::ReachSpeed { speed_mps: 10.0 }),
    );
    fast.reversible = true;
    let mut activity = activity(&track, vec![fast]);

    trains[0].speed_mps = 12.0;
    activity.update(&context(&track, &trains, 1.0));
    assert_eq!(activity.triggered_event, Some(1));
    activity.acknowledge();

    // still fast: disabled until the condition clears
    activity.update(&context(&track, &trains, 2.0));
    assert_eq!(activity.triggered_event, None);
    assert!(activity.event(1).unwrap().is_disabled);

    trains[0].speed_mps = 5.0;
    activity.update(&context(&track, &trains, 3.0));
    assert!(!activity.event(1).unwrap().is_disabled);

    trains[0].speed_mps = 11.0;
    activity.update(&context(&track, &trains, 4.0));
    assert_eq!(activity.triggered_event, Some(1));
    assert_eq!(activity.event(1).unwrap().times_triggered, 2);
}

#[test]
fn test_missing_siding_does_not_block_event() {
    let (track, trains) = demo_world();
    let cars = ["E100", "C201", "C202", "C203"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let mut activity = activity(
        &track,
        vec![event(
            1,
            TriggerConfig::Action(ActionTrigger::AssembleTrainAtLocation {
                cars,
                siding_id: 99,
            }),
        )],
    );
    activity.update(&context(&track, &trains, 1.0));
    assert_eq!(activity.triggered_event, Some(1));
}

#[test]
fn test_assemble_train_needs_exact_consist() {
    let (track, trains) = demo_world();
    let mut activity = activity(
        &track,
        vec![
            event(
                1,
                TriggerConfig::Action(ActionTrigger::AssembleTrain {
                    cars: vec!["E100".to_string(), "C201".to_string()],
                }),
            ),
            event(
                2,
                TriggerConfig::Action(ActionTrigger::AssembleTrain {
                    cars: vec!["B501".to_string(), "B500".to_string()],
                }),
            ),
        ],
    );
    activity.update(&context(&track, &trains, 1.0));
    // the local's consist matches in reverse order; the express has more cars
    assert_eq!(activity.triggered_event, Some(2));
    assert_eq!(activity.event(1).unwrap().times_triggered, 0);
}

#[test]
fn test_drop_off_wagons_in_siding() {
    let (track, trains) = demo_world();
    let mut activity = activity(
        &track,
        vec![
            event(
                1,
                TriggerConfig::Action(ActionTrigger::DropOffWagonsAtLocation {
                    cars: vec!["C201".to_string()],
                    siding_id: 1,
                }),
            ),
            event(
                2,
                TriggerConfig::Action(ActionTrigger::DropOffWagonsAtLocation {
                    cars: vec!["W401".to_string()],
                    siding_id: 1,
                }),
            ),
        ],
    );
    activity.update(&context(&track, &trains, 1.0));
    // cars of the player train never count as dropped off
    assert_eq!(activity.event(1).unwrap().times_triggered, 0);
    assert_eq!(activity.triggered_event, Some(2));
}

#[test]
fn test_location_event_uses_track_distance() {
    let (track, trains) = demo_world();
    let near = event(
        1,
        TriggerConfig::Location {
            location: WorldLocation::local(0.0, 0.0, 310.0),
            radius_m: 20.0,
            stop_required: true,
        },
    );
    let far = event(
        2,
        TriggerConfig::Location {
            location: WorldLocation::local(0.0, 0.0, 600.0),
            radius_m: 20.0,
            stop_required: false,
        },
    );
    let mut activity = activity(&track, vec![far, near]);
    activity.update(&context(&track, &trains, 1.0));
    assert_eq!(activity.triggered_event, Some(1));
    assert_eq!(activity.event(2).unwrap().times_triggered, 0);
}

#[test]
fn test_location_event_measures_from_leading_end() {
    let (track, mut trains) = demo_world();
    let rear = trains[0].rear_traveller(&track).unwrap().location();
    assert!(rear.approx_eq(&WorldLocation::local(0.0, 0.0, 205.0), 0.01));
    let at_rear = event(
        1,
        TriggerConfig::Location {
            location: rear,
            radius_m: 5.0,
            stop_required: false,
        },
    );
    let mut activity = activity(&track, vec![at_rear]);

    activity.update(&context(&track, &trains, 1.0));
    assert_eq!(activity.triggered_event, None);

    // after a reversal the rear end leads
    trains[0].reverser = -1.0;
    assert!(trains[0].is_running_backward());
    activity.update(&context(&track, &trains, 2.0));
    assert_eq!(activity.triggered_event, Some(1));
}

#[test]
fn test_fail_outcome_ends_activity() {
    let (track, trains) = demo_world();
    let mut fail = event(1, TriggerConfig::Time { time_s: 0.0 });
    fail.outcomes.activity_fail = Some("late".to_string());
    let later = event(2, TriggerConfig::Time { time_s: 0.0 });
    let mut activity = activity(&track, vec![fail, later]);

    activity.update(&context(&track, &trains, 1.0));
    assert_eq!(activity.status, ActivityStatus::Failed("late".to_string()));
    assert!(activity.is_completed());

    activity.acknowledge();
    activity.update(&context(&track, &trains, 2.0));
    assert_eq!(activity.event(2).unwrap().times_triggered, 0);
}

#[test]
fn test_all_stops_without_stops_is_immediate() {
    let (track, trains) = demo_world();
    let mut done = event(1, TriggerConfig::Action(ActionTrigger::AllStops));
    done.outcomes.activity_success = true;
    let mut activity = activity(&track, vec![done]);
    assert!(activity.all_stops_done());

    activity.update(&context(&track, &trains, 1.0));
    assert_eq!(activity.status, ActivityStatus::Succeeded);
}

#[test]
fn test_station_stop_dwell_and_departure() {
    let (track, mut trains) = demo_world();
    let config = ActivityConfig {
        name: "stops".to_string(),
        start_time_s: 0.0,
        events: vec![event(1, TriggerConfig::Action(ActionTrigger::AllStops))],
        stops: vec![PassengerStopConfig {
            station: "Halt".to_string(),
            location: WorldLocation::local(0.0, 0.0, 290.0),
            radius_m: 50.0,
            scheduled_departure_s: 30.0,
            min_dwell_s: 20.0,
        }],
    };
    let mut activity = Activity::new(&config, &track);
    assert!(!activity.all_stops_done());

    activity.update(&context(&track, &trains, 0.0));
    assert_eq!(activity.tasks[0].status, TaskStatus::InProgress);
    activity.update(&context(&track, &trains, 10.0));
    activity.update(&context(&track, &trains, 25.0));
    assert!((activity.tasks[0].dwell_s - 25.0).abs() < 1e-9);
    assert_eq!(activity.triggered_event, None);

    trains[0].speed_mps = 5.0;
    activity.update(&context(&track, &trains, 40.0));
    assert_eq!(
        activity.tasks[0].status,
        TaskStatus::Completed { succeeded: true }
    );
    assert_eq!(activity.triggered_event, Some(1));
}

#[test]
fn test_early_departure_still_completes_stops() {
    let (track, mut trains) = demo_world();
    let config = ActivityConfig {
        name: "stops".to_string(),
        start_time_s: 0.0,
        events: vec![event(1, TriggerConfig::Action(ActionTrigger::AllStops))],
        stops: vec![PassengerStopConfig {
            station: "Halt".to_string(),
            location: WorldLocation::local(0.0, 0.0, 290.0),
            radius_m: 50.0,
            scheduled_departure_s: 300.0,
            min_dwell_s: 20.0,
        }],
    };
    let mut activity = Activity::new(&config, &track);
    activity.update(&context(&track, &trains, 0.0));
    activity.update(&context(&track, &trains, 5.0));
    trains[0].speed_mps = 5.0;
    activity.update(&context(&track, &trains, 6.0));

    assert_eq!(
        activity.tasks[0].status,
        TaskStatus::Completed { succeeded: false }
    );
    assert_eq!(activity.triggered_event, Some(1));
    assert!(activity
        .outbox
        .messages
        .iter()
        .any(|m| matches!(m, Message::Warning(_))));
}

#[test]
fn test_snapshot_restores_event_state() {
    let (track, trains) = demo_world();
    let events = vec![
        event(1, TriggerConfig::Time { time_s: 0.0 }),
        event(2, TriggerConfig::Time { time_s: 100.0 }),
    ];
    let mut original = activity(&track, events.clone());
    original.update(&context(&track, &trains, 1.0));
    let snapshot = original.save();

    let mut restored = activity(&track, events);
    restored.restore(snapshot).unwrap();
    assert_eq!(restored.triggered_event, Some(1));
    assert_eq!(restored.event(1).unwrap().times_triggered, 1);
    assert_eq!(restored.save(), original.save());

    let mut mismatched = activity(&track, vec![event(1, TriggerConfig::Time { time_s: 0.0 })]);
    assert!(mismatched.restore(original.save()).is_err());
}
