use approx::assert_relative_eq;
use perimeter_core::calibration::{
    apply_scale, calculate_scale_factor, format_feet_inches, parse_feet_inches,
};
use perimeter_core::config::{FilterConfig, ValidityConfig};
use perimeter_core::perimeter::rebuild_from_subset;
use perimeter_core::validity::{apply_classification, CornerState, RestoreRule};
use perimeter_core::wall_filter::filter_walls;
use perimeter_core::{Corner, GeometryModel, Point};

fn polygon(n: usize, radius: f64) -> Vec<Point> {
    (0..n)
        .map(|i| {
            let a = i as f64 / n as f64 * std::f64::consts::TAU;
            Point::new(
                (1000.0 + radius * a.cos()).round() as i32,
                (1000.0 + radius * a.sin()).round() as i32,
            )
        })
        .collect()
}

/// Footprint with a jog on the right side; corner 6 is a real structural corner
fn ten_corner_footprint() -> GeometryModel {
    GeometryModel::from_points(&[
        Point::new(0, 0),
        Point::new(300, 0),
        Point::new(600, 0),
        Point::new(600, 250),
        Point::new(600, 500),
        Point::new(550, 500),
        Point::new(400, 500),
        Point::new(406, 660),
        Point::new(412, 820),
        Point::new(0, 820),
    ])
}

#[test]
fn closure_invariant_holds_for_any_corner_count() {
    for n in 3..=24 {
        let model = GeometryModel::from_points(&polygon(n, 400.0));

        assert_eq!(model.walls.len(), n);
        assert!(model.is_full_loop(), "{}-gon is not a single cycle", n);
        for corner in &model.corners {
            assert_eq!(model.walls.iter().filter(|w| w.start_corner_id == corner.id).count(), 1);
            assert_eq!(model.walls.iter().filter(|w| w.end_corner_id == corner.id).count(), 1);
        }
    }
}

#[test]
fn calibration_round_trip_stays_within_an_inch() {
    for reference in [1u32, 11, 12, 96, 144, 500, 666, 1234, 5000] {
        for span in [1.0, 7.5, 72.0, 144.0, 333.3, 1999.0] {
            let scale = calculate_scale_factor(reference as f64, span);
            let label = format_feet_inches(span * scale);
            let inches = parse_feet_inches(&label).unwrap();

            assert!(
                (inches as i64 - reference as i64).abs() <= 1,
                "{} in over {}px came back as {}",
                reference,
                span,
                label
            );
        }
    }
}

#[test]
fn twelve_feet_over_144_pixels() {
    let mut model = GeometryModel::from_points(&[
        Point::new(0, 0),
        Point::new(144, 0),
        Point::new(144, 72),
        Point::new(0, 72),
    ]);
    let reference = parse_feet_inches("12'-0\"").unwrap();
    let span = model.longest_wall().unwrap().length_pixels;

    let scale = calculate_scale_factor(reference as f64, span);
    apply_scale(&mut model, scale);

    assert_eq!(reference, 144);
    assert_relative_eq!(scale, 1.0);
    assert_eq!(model.walls[1].length_pixels, 72.0);
    assert_eq!(model.walls[1].length.as_deref(), Some("6'-0\""));
}

#[test]
fn right_angle_restores_flanked_corner() {
    let mut model = ten_corner_footprint();

    let report = apply_classification(&mut model, &[5, 6, 7], &ValidityConfig::default());

    assert_eq!(report.states[&6], CornerState::RestoredValid(RestoreRule::RightAngle));
    assert_eq!(report.states[&5], CornerState::Invalid);
    assert_eq!(report.states[&7], CornerState::Invalid);
    assert_eq!(model.valid_corner_count(), 8);
}

#[test]
fn minimum_valid_corner_count_is_guaranteed() {
    let config = ValidityConfig::default();

    for n in 3..=12 {
        let mut model = GeometryModel::from_points(&polygon(n, 300.0));
        let all: Vec<usize> = (0..n).collect();

        apply_classification(&mut model, &all, &config);

        assert!(
            model.valid_corner_count() >= config.min_valid_corners.min(n),
            "{}-gon kept only {} valid corners",
            n,
            model.valid_corner_count()
        );
    }
}

#[test]
fn safety_valve_never_keeps_fewer_walls() {
    let cases: Vec<(GeometryModel, Vec<usize>)> = vec![
        (ten_corner_footprint(), vec![5, 7]),
        (ten_corner_footprint(), vec![1, 3, 5, 7, 9]),
        (GeometryModel::from_points(&polygon(8, 60.0)), vec![0, 2, 4]),
        (GeometryModel::from_points(&polygon(12, 500.0)), vec![1, 2, 3, 4]),
    ];

    for (mut model, invalid) in cases {
        for &id in &invalid {
            model.corner_mut(id).unwrap().is_valid = false;
        }
        let total = model.walls.len();
        let without_valve = model
            .walls
            .iter()
            .filter(|w| !invalid.contains(&w.start_corner_id) && !invalid.contains(&w.end_corner_id))
            .count();
        assert!(
            (total - without_valve) as f64 > 0.3 * total as f64,
            "case must trigger the valve"
        );

        let outcome = filter_walls(&mut model, &FilterConfig::default());

        assert!(outcome.safety_valve_triggered);
        assert!(outcome.kept_fraction() >= without_valve as f64 / total as f64);
    }
}

#[test]
fn ten_corner_footprint_is_healed_by_the_valve() {
    let mut model = ten_corner_footprint();
    apply_classification(&mut model, &[5, 6, 7], &ValidityConfig::default());

    let outcome = filter_walls(&mut model, &FilterConfig::default());

    // Corners 5 and 7 each touch a wall over 100px
    assert!(outcome.safety_valve_triggered);
    assert_eq!(outcome.restored_corners, vec![5, 7]);
    assert!(model.is_full_loop());
}

#[test]
fn subset_rebuild_forms_closed_triangle() {
    let candidates = GeometryModel::from_corners(vec![
        Corner::new(1, Point::new(0, 0)),
        Corner::new(3, Point::new(400, 0)),
        Corner::new(4, Point::new(200, 300)),
        Corner::new(9, Point::new(205, 10)),
    ]);

    let model = rebuild_from_subset(&candidates, &[3, 1, 4]).unwrap();

    let ids: Vec<usize> = model.corners.iter().map(|c| c.id).collect();
    let originals: Vec<Option<usize>> = model.corners.iter().map(|c| c.original_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert_eq!(originals, vec![Some(3), Some(1), Some(4)]);
    assert_eq!(model.walls.len(), 3);
    assert_eq!(model.walls[2].start_corner_id, 2);
    assert_eq!(model.walls[2].end_corner_id, 0);
    assert!(model.is_full_loop());
}
