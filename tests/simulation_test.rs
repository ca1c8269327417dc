use std::process::Command;

fn run_simulator(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_train_sim"))
        .args(args)
        .env("RUST_LOG", "warn,train_sim=info")
        .output()
        .expect("Failed to execute simulation")
}

/// Test that the demo line runs headless without crashing
#[test]
fn test_headless_simulation_runs() {
    let output = run_simulator(&["--ticks", "300"]);

    assert!(
        output.status.success(),
        "Simulation failed to run. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("SIMULATION COMPLETE"),
        "Simulation did not complete properly. stderr: {}",
        stderr
    );
}

/// Test that the run summary is logged
#[test]
fn test_simulation_statistics_logged() {
    let output = run_simulator(&["--ticks", "300"]);
    assert!(output.status.success(), "Simulation failed to run");

    let stderr = String::from_utf8_lossy(&output.stderr);
    for statistic in [
        "Elapsed time:",
        "Total trains:",
        "Moving trains:",
        "Player train: Express",
        "Player distance travelled:",
        "Activity status:",
        "Signals emitted:",
    ] {
        assert!(stderr.contains(statistic), "Missing '{}' statistic", statistic);
    }
}

/// Test that the player train actually moves on the demo line
#[test]
fn test_player_train_moves() {
    let output = run_simulator(&["--ticks", "600", "--delta", "0.1"]);
    assert!(output.status.success(), "Simulation failed to run");

    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr
        .lines()
        .find(|line| line.contains("Player distance travelled:"))
        .expect("Could not find 'Player distance travelled' line");

    // Format: "[2025-11-17T17:10:52Z INFO  train_sim] Player distance travelled: 812.3 m"
    let parts: Vec<&str> = line.split("Player distance travelled:").collect();
    let distance: f32 = parts
        .get(1)
        .and_then(|s| s.trim().strip_suffix('m'))
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_else(|| panic!("Could not parse distance from line: {}", line));

    assert!(distance > 10.0, "Player train barely moved: {} m", distance);
}

/// Test that the final state can be written to a save file
#[test]
fn test_save_file_written() {
    let path = std::env::temp_dir().join(format!("train_sim_save_{}.bin", std::process::id()));
    let path_arg = path.to_string_lossy().to_string();
    let output = run_simulator(&["--ticks", "50", "--save", &path_arg]);
    assert!(output.status.success(), "Simulation failed to run");

    let bytes = std::fs::read(&path).expect("Save file missing");
    std::fs::remove_file(&path).ok();
    assert!(!bytes.is_empty());
}

/// Test that a missing scenario file is reported as an error
#[test]
fn test_missing_scenario_fails() {
    let output = run_simulator(&["--scenario", "/nonexistent/scenario.json"]);
    assert!(!output.status.success());
}
