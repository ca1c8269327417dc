use train_sim::simulation::power_supply::{
    BatterySwitch, BatterySwitchConfig, BatterySwitchMode, ControlCarPowerSupply,
    ControlCarPowerSupplyConfig, DieselEngine, DieselEngineConfig, DieselEngineState,
    DieselEngines, DualModePowerSupply, DualModePowerSupplyConfig, ElectricPowerSupply,
    ElectricPowerSupplyConfig, ElectricTrainSupplySwitch, EngineInputs, EtsSwitchConfig,
    EtsSwitchMode, FuelTank, GearBox, GearBoxConfig, GearBoxOperation, MasterKey,
    MasterKeyConfig, MasterKeyMode, PantographConfig, PantographState, Pantographs,
    PassengerCarPowerSupply, PassengerCarPowerSupplyConfig, PowerSupplyEvent, PowerSupplyInputs,
    PowerSupplyScript, PowerSupplyState, Relay, RelayConfig, RelayCore, RelayKind, RelayState,
    ScriptRegistry, TractionSource,
};
use train_sim::simulation::{Message, Outbox, TrainEvent};

fn breaker(closing_delay_s: f32) -> Relay {
    let config = RelayConfig {
        closing_delay_s,
        ..RelayConfig::default()
    };
    Relay::new(RelayKind::CircuitBreaker, &config, &ScriptRegistry::new().relays)
}

#[test]
fn test_relay_closes_after_delay() {
    let mut relay = breaker(5.0);
    relay.set_closing_authorization(true);

    relay.update(1.0);
    assert_eq!(relay.state(), RelayState::Closing);

    for _ in 0..4 {
        relay.update(1.0);
        assert_eq!(relay.state(), RelayState::Closing);
    }
    relay.update(1.0);
    assert_eq!(relay.state(), RelayState::Closed);

    let mut outbox = Outbox::new();
    relay.drain_outbox(&mut outbox);
    assert_eq!(outbox.count(TrainEvent::CircuitBreakerClosing), 1);
    assert_eq!(outbox.count(TrainEvent::CircuitBreakerClosed), 1);
}

#[test]
fn test_relay_opens_when_authorization_drops_while_closing() {
    let mut relay = breaker(5.0);
    relay.set_closing_authorization(true);
    relay.update(1.0);
    relay.update(1.0);
    assert_eq!(relay.state(), RelayState::Closing);

    relay.set_closing_authorization(false);
    relay.update(1.0);
    assert_eq!(relay.state(), RelayState::Open);

    // a fresh authorisation restarts the full delay
    relay.set_closing_authorization(true);
    relay.update(1.0);
    for _ in 0..4 {
        relay.update(1.0);
    }
    assert_eq!(relay.state(), RelayState::Closing);
    relay.update(1.0);
    assert!(relay.is_closed());
}

#[test]
fn test_manual_relay_needs_closing_order() {
    let config = RelayConfig {
        script: "Manual".to_string(),
        ..RelayConfig::default()
    };
    let mut relay = Relay::circuit_breaker(&config, &ScriptRegistry::new().relays);
    relay.set_closing_authorization(true);
    relay.update(0.1);
    assert_eq!(relay.state(), RelayState::Open);

    relay.handle_event(PowerSupplyEvent::CloseCircuitBreaker);
    relay.update(0.1);
    relay.update(0.1);
    assert!(relay.is_closed());

    relay.handle_event(PowerSupplyEvent::OpenCircuitBreaker);
    relay.update(0.1);
    assert_eq!(relay.state(), RelayState::Open);
}

#[test]
fn test_closed_relay_opens_when_authorization_is_lost() {
    let mut relay = breaker(1.0);
    relay.set_closing_authorization(true);
    relay.update(1.0);
    relay.update(1.0);
    assert!(relay.is_closed());

    relay.set_closing_authorization(false);
    relay.update(0.1);
    assert_eq!(relay.state(), RelayState::Open);

    let mut outbox = Outbox::new();
    relay.drain_outbox(&mut outbox);
    assert_eq!(outbox.count(TrainEvent::CircuitBreakerClosed), 1);
    assert_eq!(outbox.count(TrainEvent::CircuitBreakerOpen), 1);
}

#[test]
fn test_closed_manual_relay_opens_on_order_or_lost_authorization() {
    let config = RelayConfig {
        script: "Manual".to_string(),
        ..RelayConfig::default()
    };
    let mut relay = Relay::traction_cut_off_relay(&config, &ScriptRegistry::new().relays);
    relay.set_closing_authorization(true);
    relay.handle_event(PowerSupplyEvent::CloseTractionCutOffRelay);
    relay.update(0.1);
    relay.update(0.1);
    assert!(relay.is_closed());

    relay.handle_event(PowerSupplyEvent::OpenTractionCutOffRelay);
    relay.update(0.1);
    assert_eq!(relay.state(), RelayState::Open);

    // the opening order is cleared by the next closing order
    relay.handle_event(PowerSupplyEvent::CloseTractionCutOffRelay);
    relay.update(0.1);
    relay.update(0.1);
    assert!(relay.is_closed());

    relay.set_closing_authorization(false);
    relay.update(0.1);
    assert_eq!(relay.state(), RelayState::Open);
    relay.update(0.1);
    assert_eq!(relay.state(), RelayState::Open);

    let mut outbox = Outbox::new();
    relay.drain_outbox(&mut outbox);
    assert_eq!(outbox.count(TrainEvent::TractionCutOffRelayClosed), 2);
    assert_eq!(outbox.count(TrainEvent::TractionCutOffRelayOpen), 2);
}

#[test]
fn test_battery_switch_waits_for_delay() {
    let config = BatterySwitchConfig {
        mode: BatterySwitchMode::Switch,
        delay_s: 2.0,
        default_on: false,
    };
    let mut battery = BatterySwitch::new(&config);
    let mut outbox = Outbox::new();
    assert!(!battery.on());

    battery.handle_event(PowerSupplyEvent::CloseBatterySwitch, &mut outbox);
    assert!(battery.command_switch());
    battery.update(1.0, &mut outbox);
    assert!(!battery.on());
    battery.update(1.0, &mut outbox);
    assert!(battery.on());
    assert_eq!(outbox.count(TrainEvent::BatterySwitchOn), 1);

    battery.handle_event(PowerSupplyEvent::OpenBatterySwitch, &mut outbox);
    battery.update(0.1, &mut outbox);
    assert!(!battery.on());
    assert_eq!(outbox.count(TrainEvent::BatterySwitchOff), 1);
}

#[test]
fn test_always_on_battery_ignores_commands() {
    let mut battery = BatterySwitch::new(&BatterySwitchConfig::default());
    let mut outbox = Outbox::new();
    battery.handle_event(PowerSupplyEvent::OpenBatterySwitch, &mut outbox);
    battery.update(1.0, &mut outbox);
    assert!(battery.on());
    assert!(outbox.messages.is_empty());
}

#[test]
fn test_master_key_turns_off_after_delay() {
    let config = MasterKeyConfig {
        mode: MasterKeyMode::Manual,
        delay_off_s: 3.0,
    };
    let mut key = MasterKey::new(&config);
    let mut outbox = Outbox::new();
    assert!(!key.on());

    key.handle_event(PowerSupplyEvent::TurnOnMasterKey, &mut outbox);
    key.update(0.1, &mut outbox);
    assert!(key.on());

    key.handle_event(PowerSupplyEvent::TurnOffMasterKey, &mut outbox);
    key.update(2.0, &mut outbox);
    assert!(key.on());
    key.update(1.0, &mut outbox);
    assert!(!key.on());
    assert_eq!(outbox.count(TrainEvent::MasterKeyOn), 1);
    assert_eq!(outbox.count(TrainEvent::MasterKeyOff), 1);
    assert_eq!(
        outbox
            .messages
            .iter()
            .filter(|m| matches!(m, Message::Confirm { .. }))
            .count(),
        2
    );
}

#[test]
fn test_diesel_engine_runs_only_after_confirmation() {
    let config = DieselEngineConfig {
        max_rpm: Some(900.0),
        ..DieselEngineConfig::default()
    };
    let mut engine = DieselEngine::new(1, &config);
    let mut outbox = Outbox::new();
    engine.start(&mut outbox);
    assert_eq!(engine.state(), DieselEngineState::Starting);

    let inputs = EngineInputs {
        throttle_percent: 100.0,
        ..EngineInputs::default()
    };
    let mut saw_running = false;
    for _ in 0..600 {
        let was_starting = engine.state() == DieselEngineState::Starting;
        engine.update(0.1, inputs, &mut outbox);
        if was_starting && engine.state() == DieselEngineState::Running {
            assert!(engine.real_rpm() > engine.starting_confirmation_rpm());
            saw_running = true;
        }
        assert!(engine.real_rpm() >= 0.0);
        assert!(engine.real_rpm() <= engine.max_rpm());
    }
    assert!(saw_running);
    assert_eq!(engine.state(), DieselEngineState::Running);
    assert!((engine.real_rpm() - 900.0).abs() < 1.0);
    assert!(engine.output_power_w() > 0.0);
    assert_eq!(outbox.count(TrainEvent::EnginePowerOn(1)), 1);
}

#[test]
fn test_diesel_engine_stops_at_zero_rpm() {
    let config = DieselEngineConfig {
        max_rpm: Some(900.0),
        ..DieselEngineConfig::default()
    };
    let mut engine = DieselEngine::new(2, &config);
    let mut outbox = Outbox::new();
    engine.start(&mut outbox);
    for _ in 0..200 {
        engine.update(0.1, EngineInputs::default(), &mut outbox);
    }
    assert_eq!(engine.state(), DieselEngineState::Running);

    engine.stop(&mut outbox);
    for _ in 0..400 {
        engine.update(0.1, EngineInputs::default(), &mut outbox);
        assert!(engine.real_rpm() >= 0.0);
    }
    assert_eq!(engine.state(), DieselEngineState::Stopped);
    assert_eq!(engine.real_rpm(), 0.0);
    assert_eq!(engine.output_power_w(), 0.0);
    assert_eq!(outbox.count(TrainEvent::EnginePowerOff(2)), 1);
}

fn geared_config() -> DieselEngineConfig {
    DieselEngineConfig {
        max_rpm: Some(900.0),
        gearbox: Some(GearBoxConfig::default()),
        ..DieselEngineConfig::default()
    }
}

/// Running engine in first gear, clutch locked at 3 m/s
fn locked_engine(outbox: &mut Outbox) -> DieselEngine {
    let mut engine = DieselEngine::new(1, &geared_config());
    engine.start(outbox);
    for _ in 0..200 {
        engine.update(0.1, EngineInputs::default(), outbox);
    }
    assert_eq!(engine.state(), DieselEngineState::Running);

    engine.handle_gear_event(PowerSupplyEvent::GearUp, outbox);
    let inputs = EngineInputs {
        throttle_percent: 100.0,
        speed_mps: 3.0,
        ..EngineInputs::default()
    };
    for _ in 0..30 {
        engine.update(0.1, inputs, outbox);
    }
    let shaft_rpm = engine.gearbox().unwrap().shaft_rpm(3.0);
    assert!(engine.gearbox().unwrap().is_locked());
    assert_eq!(engine.state(), DieselEngineState::Running);
    assert!((engine.real_rpm() - shaft_rpm).abs() < 0.01);
    engine
}

#[test]
fn test_locked_engine_stalls_when_dragged_below_idle() {
    let mut outbox = Outbox::new();
    let mut engine = locked_engine(&mut outbox);
    let locked_rpm = engine.real_rpm();

    let slow = EngineInputs {
        throttle_percent: 100.0,
        speed_mps: 1.0,
        ..EngineInputs::default()
    };
    engine.update(0.1, slow, &mut outbox);
    assert_eq!(engine.state(), DieselEngineState::Stopped);
    assert_eq!(outbox.count(TrainEvent::EnginePowerOff(1)), 1);
    assert!(outbox
        .messages
        .iter()
        .any(|m| matches!(m, Message::Warning(text) if text.contains("underspeed"))));

    // the RPM runs down instead of jumping to the shaft speed
    assert!(engine.real_rpm() < locked_rpm);
    assert!(engine.real_rpm() > locked_rpm - 20.0);
    assert_eq!(engine.output_power_w(), 0.0);

    for _ in 0..200 {
        let before = engine.real_rpm();
        engine.update(0.1, slow, &mut outbox);
        assert!(engine.real_rpm() <= before);
    }
    assert_eq!(engine.real_rpm(), 0.0);
    assert_eq!(engine.state(), DieselEngineState::Stopped);
}

#[test]
fn test_locked_engine_stalls_on_overspeed() {
    let mut outbox = Outbox::new();
    let mut engine = locked_engine(&mut outbox);
    let locked_rpm = engine.real_rpm();

    let fast = EngineInputs {
        throttle_percent: 100.0,
        speed_mps: 4.0,
        ..EngineInputs::default()
    };
    assert!(engine.gearbox().unwrap().shaft_rpm(4.0) > engine.governor_rpm());
    engine.update(0.1, fast, &mut outbox);
    assert_eq!(engine.state(), DieselEngineState::Stopped);
    assert!(outbox
        .messages
        .iter()
        .any(|m| matches!(m, Message::Warning(text) if text.contains("overspeed"))));
    assert!(engine.real_rpm() < locked_rpm);
    assert!(engine.real_rpm() <= engine.max_rpm());
}

#[test]
fn test_ets_draw_reduces_output_of_first_running_engine() {
    let config = DieselEngineConfig {
        max_rpm: Some(900.0),
        ..DieselEngineConfig::default()
    };
    let mut engines = DieselEngines::new(&[config.clone(), config]);
    let mut outbox = Outbox::new();
    engines.start_all(&mut outbox);
    for _ in 0..600 {
        engines.update(0.1, 100.0, 0.0, 0.0, &mut outbox);
    }
    assert!(engines.any_running());
    let first = engines.get(1).unwrap().output_power_w();
    let second = engines.get(2).unwrap().output_power_w();
    assert!(first > 500_000.0);
    assert!((first - second).abs() < 1.0);
    let full_output = engines.output_power_w();

    engines.update(0.1, 100.0, 0.0, 200_000.0, &mut outbox);
    let first = engines.get(1).unwrap().output_power_w();
    let second = engines.get(2).unwrap().output_power_w();
    assert!((second - first - 200_000.0).abs() < 1.0);
    assert!((full_output - engines.output_power_w() - 200_000.0).abs() < 1.0);
    assert_eq!(engines.get(1).unwrap().load_fraction(), 1.0);
}

#[test]
fn test_ets_load_raises_idle_speed_of_supplying_engine() {
    let config = DieselEngineConfig {
        max_rpm: Some(900.0),
        ..DieselEngineConfig::default()
    };
    let mut engines = DieselEngines::new(&[config.clone(), config]);
    let mut outbox = Outbox::new();
    engines.start_all(&mut outbox);
    for _ in 0..300 {
        engines.update(0.1, 0.0, 0.0, 0.0, &mut outbox);
    }
    assert!((engines.get(1).unwrap().real_rpm() - 600.0).abs() < 0.01);

    // 300 kW sits at 690 RPM on the default 600-900 RPM power line
    for _ in 0..100 {
        engines.update(0.1, 0.0, 0.0, 300_000.0, &mut outbox);
    }
    let supplying = engines.get(1).unwrap();
    assert!((supplying.demanded_rpm() - 690.0).abs() < 0.1);
    assert!((supplying.real_rpm() - 690.0).abs() < 0.1);
    assert!(supplying.output_power_w() < 1_000.0);
    assert!((engines.get(2).unwrap().real_rpm() - 600.0).abs() < 0.01);

    for _ in 0..100 {
        engines.update(0.1, 0.0, 0.0, 0.0, &mut outbox);
    }
    assert!((engines.get(1).unwrap().real_rpm() - 600.0).abs() < 0.01);
}

#[test]
fn test_empty_fuel_tank_stops_engines() {
    let config = DieselEngineConfig {
        max_rpm: Some(900.0),
        ..DieselEngineConfig::default()
    };
    let mut engines = DieselEngines::new(&[config]);
    let mut tank = FuelTank::new(1000.0, Some(0.05));
    let mut outbox = Outbox::new();
    engines.start_all(&mut outbox);
    for _ in 0..600 {
        engines.update(0.1, 0.0, 0.0, 0.0, &mut outbox);
        tank.supply(&mut engines, 0.1, &mut outbox);
        assert!(tank.level_l >= 0.0);
    }
    assert!(tank.is_empty());
    assert_eq!(outbox.count(TrainEvent::EnginePowerOn(1)), 1);
    assert_eq!(outbox.count(TrainEvent::EnginePowerOff(1)), 1);
    assert_eq!(engines.get(1).unwrap().state(), DieselEngineState::Stopped);
    assert_eq!(engines.fuel_flow_lph(), 0.0);
    assert!(outbox
        .messages
        .iter()
        .any(|m| matches!(m, Message::Warning(text) if text == "Fuel tank empty")));

    tank.refill();
    assert_eq!(tank.level_l, 1000.0);
}

#[test]
fn test_manual_gearbox_locks_at_shaft_speed() {
    let mut gearbox = GearBox::new(&GearBoxConfig::default());
    let mut outbox = Outbox::new();
    assert_eq!(gearbox.transmission_fraction(), 0.0);

    gearbox.handle_event(PowerSupplyEvent::GearUp, &mut outbox);
    assert_eq!(gearbox.current_gear(), 1);
    assert_eq!(outbox.count(TrainEvent::GearPosition(1)), 1);

    // the clutch engages fully but cannot lock with the train at rest
    for _ in 0..4 {
        gearbox.update(0.5, 100.0, 0.0, 600.0, true, &mut outbox);
    }
    assert_eq!(gearbox.clutch(), 1.0);
    assert!(!gearbox.is_locked());

    gearbox.update(0.5, 100.0, 3.0, 600.0, true, &mut outbox);
    assert!(gearbox.is_locked());
    assert!(gearbox.shaft_rpm(3.0) > 600.0);
    assert_eq!(gearbox.transmission_fraction(), 1.0);
    assert_eq!(outbox.count(TrainEvent::ClutchEngaged), 1);
}

#[test]
fn test_automatic_gearbox_shifts_with_speed() {
    let config = GearBoxConfig {
        operation: GearBoxOperation::Automatic,
        ..GearBoxConfig::default()
    };
    let mut gearbox = GearBox::new(&config);
    let mut outbox = Outbox::new();

    gearbox.handle_event(PowerSupplyEvent::GearUp, &mut outbox);
    assert_eq!(gearbox.current_gear(), 0);

    gearbox.update(0.1, 50.0, 0.0, 600.0, true, &mut outbox);
    assert_eq!(gearbox.current_gear(), 1);
    gearbox.update(0.1, 50.0, 7.0, 600.0, true, &mut outbox);
    assert_eq!(gearbox.current_gear(), 2);
    gearbox.update(0.1, 50.0, 1.0, 600.0, true, &mut outbox);
    assert_eq!(gearbox.current_gear(), 1);
}

#[test]
fn test_ets_switch_follows_auxiliary_power_and_command() {
    let mut outbox = Outbox::new();
    let mut automatic = ElectricTrainSupplySwitch::new(&EtsSwitchConfig::default());
    automatic.update(0.1, true, &mut outbox);
    assert!(automatic.on());
    automatic.update(0.1, false, &mut outbox);
    assert!(!automatic.on());

    let config = EtsSwitchConfig {
        mode: EtsSwitchMode::Switch,
        delay_s: 1.0,
    };
    let mut switch = ElectricTrainSupplySwitch::new(&config);
    switch.update(1.0, true, &mut outbox);
    assert!(!switch.on());

    switch.handle_event(PowerSupplyEvent::SwitchOnElectricTrainSupply, &mut outbox);
    switch.update(0.5, true, &mut outbox);
    assert!(!switch.on());
    switch.update(0.5, true, &mut outbox);
    assert!(switch.on());

    switch.update(0.1, false, &mut outbox);
    assert!(!switch.on());
    assert_eq!(outbox.count(TrainEvent::ElectricTrainSupplyOn), 2);
    assert_eq!(outbox.count(TrainEvent::ElectricTrainSupplyOff), 2);
}

#[test]
fn test_pantographs_report_most_raised_state() {
    let mut pantographs = Pantographs::new(&[PantographConfig::default(), PantographConfig::default()]);
    let mut outbox = Outbox::new();
    assert_eq!(pantographs.state(), PantographState::Down);

    pantographs.handle_event(PowerSupplyEvent::RaisePantograph(2), &mut outbox);
    assert_eq!(pantographs.state(), PantographState::Raising);
    pantographs.update(2.0, &mut outbox);
    assert_eq!(pantographs.state(), PantographState::Up);
    assert_eq!(pantographs.state_of(1), PantographState::Down);
    assert_eq!(pantographs.state_of(2), PantographState::Up);
    assert_eq!(pantographs.state_of(3), PantographState::Unavailable);
    assert_eq!(outbox.count(TrainEvent::PantographUp(2)), 1);
}

#[test]
fn test_unknown_pantograph_is_warned() {
    let mut pantographs = Pantographs::new(&[PantographConfig::default()]);
    let mut outbox = Outbox::new();
    pantographs.handle_event(PowerSupplyEvent::RaisePantograph(3), &mut outbox);
    assert_eq!(pantographs.state(), PantographState::Down);
    assert!(outbox
        .messages
        .iter()
        .any(|m| matches!(m, Message::Warning(_))));
}

#[test]
fn test_electric_quick_power_on_reaches_main_power() {
    let mut supply =
        ElectricPowerSupply::new(&ElectricPowerSupplyConfig::default(), &ScriptRegistry::new());
    assert_eq!(supply.traction_power_w(100.0), 0.0);

    supply.handle_event(PowerSupplyEvent::QuickPowerOn);
    let inputs = PowerSupplyInputs {
        line_voltage_v: 25_000.0,
        ..PowerSupplyInputs::default()
    };
    for _ in 0..100 {
        supply.update(0.1, inputs);
    }
    let states = supply.states();
    assert!(states.battery.is_on());
    assert!(states.auxiliary.is_on());
    assert!(states.main.is_on());
    assert!(supply.systems().circuit_breaker.is_closed());
    assert!(supply.traction_power_w(50.0) > 0.0);
}

#[test]
fn test_electric_without_line_voltage_stays_off() {
    let mut supply =
        ElectricPowerSupply::new(&ElectricPowerSupplyConfig::default(), &ScriptRegistry::new());
    supply.handle_event(PowerSupplyEvent::QuickPowerOn);
    for _ in 0..100 {
        supply.update(0.1, PowerSupplyInputs::default());
    }
    assert_eq!(supply.systems().pantographs.state(), PantographState::Up);
    assert!(!supply.states().main.is_on());
    assert!(!supply.systems().circuit_breaker.is_closed());
}

#[test]
fn test_dual_mode_prefers_electric_then_falls_back_to_diesel() {
    let mut supply =
        DualModePowerSupply::new(&DualModePowerSupplyConfig::default(), &ScriptRegistry::new());
    assert_eq!(supply.source(), TractionSource::None);

    supply.handle_event(PowerSupplyEvent::QuickPowerOn);
    let inputs = PowerSupplyInputs {
        line_voltage_v: 25_000.0,
        ..PowerSupplyInputs::default()
    };
    for _ in 0..100 {
        supply.update(0.1, inputs);
    }
    assert_eq!(supply.source(), TractionSource::Electric);
    assert!(supply.states().main.is_on());
    assert_eq!(supply.traction_power_w(50.0), 2_000_000.0);

    supply.handle_event(PowerSupplyEvent::StartEngine);
    supply.handle_event(PowerSupplyEvent::LowerPantograph(1));
    let inputs = PowerSupplyInputs {
        throttle_percent: 50.0,
        ..inputs
    };
    for _ in 0..300 {
        supply.update(0.1, inputs);
    }
    assert_eq!(supply.systems().pantographs.state(), PantographState::Down);
    assert!(supply.systems().engines.any_running());
    assert_eq!(supply.source(), TractionSource::Diesel);
    assert!(supply.states().main.is_on());
    assert!(supply.traction_power_w(100.0) > 0.0);

    supply.handle_event(PowerSupplyEvent::StopEngine);
    supply.update(0.1, inputs);
    assert_eq!(supply.source(), TractionSource::None);
    assert_eq!(supply.traction_power_w(100.0), 0.0);
}

#[test]
fn test_control_car_mirrors_lead_locomotive() {
    let mut car = ControlCarPowerSupply::new(
        &ControlCarPowerSupplyConfig::default(),
        &ScriptRegistry::new(),
    );
    let lead_on = PowerSupplyInputs {
        train_main_on: true,
        train_auxiliary_on: true,
        train_ets_on: true,
        ..PowerSupplyInputs::default()
    };
    car.update(0.1, lead_on);
    let states = car.states();
    assert!(states.battery.is_on());
    assert!(states.main.is_on());
    assert!(states.auxiliary.is_on());
    assert!(states.electric_train_supply.is_on());

    car.update(0.1, PowerSupplyInputs::default());
    let states = car.states();
    assert!(states.battery.is_on());
    assert!(!states.main.is_on());
    assert!(!states.auxiliary.is_on());
    assert!(!states.electric_train_supply.is_on());
}

#[test]
fn test_passenger_car_draws_ets_load_only_when_supplied() {
    let config = PassengerCarPowerSupplyConfig::default();
    let mut car = PassengerCarPowerSupply::new(&config, &ScriptRegistry::new());
    car.update(0.1, PowerSupplyInputs::default());
    assert_eq!(car.ets_demand_w(), 0.0);
    assert!(!car.states().electric_train_supply.is_on());
    assert_eq!(car.states().main, PowerSupplyState::Unavailable);

    let supplied = PowerSupplyInputs {
        train_ets_on: true,
        ..PowerSupplyInputs::default()
    };
    car.update(0.1, supplied);
    assert!(car.states().electric_train_supply.is_on());
    assert!(car.states().low_voltage.is_on());
    assert_eq!(
        car.ets_demand_w(),
        config.heating_power_w + config.ventilation_power_w + config.lighting_power_w
    );

    car.update(0.1, PowerSupplyInputs::default());
    assert_eq!(car.ets_demand_w(), 0.0);
}

#[test]
fn test_unknown_script_falls_back_to_default() {
    let registry = ScriptRegistry::new();
    let config = RelayConfig {
        script: "NoSuchScript".to_string(),
        ..RelayConfig::default()
    };
    let relay = Relay::circuit_breaker(&config, &registry.relays);
    assert_eq!(relay.script_name(), "Automatic");

    let config = ElectricPowerSupplyConfig {
        script: "NoSuchScript".to_string(),
        ..ElectricPowerSupplyConfig::default()
    };
    let supply = ElectricPowerSupply::new(&config, &registry);
    assert_eq!(supply.script_name(), "Default");
}

#[derive(Debug)]
struct NeverCloseScript;

impl PowerSupplyScript<RelayCore> for NeverCloseScript {
    fn name(&self) -> &str {
        "NeverClose"
    }

    fn update(&mut self, relay: &mut RelayCore, _elapsed_s: f32) {
        relay.set_state(RelayState::Open);
    }
}

#[test]
fn test_registered_script_is_used() {
    let mut registry = ScriptRegistry::new();
    registry
        .relays
        .register("NeverClose", || {
            Box::new(NeverCloseScript) as Box<dyn PowerSupplyScript<RelayCore>>
        });
    let config = RelayConfig {
        script: "NeverClose".to_string(),
        ..RelayConfig::default()
    };
    let mut relay = Relay::circuit_breaker(&config, &registry.relays);
    assert_eq!(relay.script_name(), "NeverClose");

    relay.set_closing_authorization(true);
    for _ in 0..10 {
        relay.update(1.0);
    }
    assert_eq!(relay.state(), RelayState::Open);
}
