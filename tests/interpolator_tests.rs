use train_sim::simulation::{Interpolator, InterpolatorError};

#[test]
fn test_rejects_invalid_tables() {
    assert_eq!(
        Interpolator::new(vec![0.0], vec![1.0]),
        Err(InterpolatorError::TooFewPoints(1))
    );
    assert_eq!(
        Interpolator::new(vec![0.0, 1.0], vec![1.0]),
        Err(InterpolatorError::LengthMismatch(2, 1))
    );
    assert_eq!(
        Interpolator::from_points(&[(0.0, 0.0), (10.0, 1.0), (10.0, 2.0)]),
        Err(InterpolatorError::NotIncreasing(2))
    );
}

#[test]
fn test_get_interpolates_and_clamps() {
    let table =
        Interpolator::from_points(&[(600.0, 0.0), (800.0, 400.0), (900.0, 500.0)]).unwrap();
    assert_eq!(table.get(700.0), 200.0);
    assert_eq!(table.get(850.0), 450.0);
    assert_eq!(table.get(800.0), 400.0);

    // outside the table the end samples hold
    assert_eq!(table.get(0.0), 0.0);
    assert_eq!(table.get(-50.0), 0.0);
    assert_eq!(table.get(2000.0), 500.0);
}

#[test]
fn test_invalid_table_falls_back() {
    let bad = [(0.0, 1.0), (0.0, 2.0)];
    let table = Interpolator::or_warn("test_table", Some(&bad), || {
        Interpolator::linear(0.0, 0.0, 100.0, 1.0)
    });
    assert_eq!(table.get(50.0), 0.5);

    let missing = Interpolator::or_warn("test_table", None, || {
        Interpolator::linear(0.0, 3.0, 1.0, 3.0)
    });
    assert_eq!(missing.get(0.5), 3.0);

    // a degenerate fallback is still a valid flat table
    let flat = Interpolator::linear(5.0, 2.0, 5.0, 9.0);
    assert_eq!(flat.get(0.0), 2.0);
    assert_eq!(flat.get(10.0), 2.0);
}

#[test]
fn test_table_parsed_from_json_is_validated() {
    let table: Interpolator = serde_json::from_str("[[0.0, 600.0], [100.0, 900.0]]").unwrap();
    assert_eq!(table.get(50.0), 750.0);
    assert!(serde_json::from_str::<Interpolator>("[[0.0, 600.0], [0.0, 900.0]]").is_err());
}

#[test]
fn test_inverse_reads_table_backwards() {
    let power =
        Interpolator::from_points(&[(600.0, 0.0), (800.0, 400.0), (900.0, 500.0)]).unwrap();
    let rpm = power.inverse().unwrap();
    assert_eq!(rpm.get(200.0), 700.0);
    assert_eq!(rpm.get(450.0), 850.0);
    assert_eq!(rpm.get(1000.0), 900.0);

    // a falling curve is inverted in ascending order
    let falling = Interpolator::from_points(&[(0.0, 10.0), (10.0, 0.0)]).unwrap();
    assert_eq!(falling.inverse().unwrap().get(2.5), 7.5);
}

#[test]
fn test_inverse_rejects_non_monotonic_tables() {
    let peaked = Interpolator::from_points(&[(0.0, 0.0), (1.0, 5.0), (2.0, 3.0)]).unwrap();
    assert_eq!(peaked.inverse(), Err(InterpolatorError::NotInvertible(2)));

    let flat = Interpolator::linear(0.0, 1.0, 1.0, 1.0);
    assert_eq!(flat.inverse(), Err(InterpolatorError::NotInvertible(1)));
}
