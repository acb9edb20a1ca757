//! Tests for the SEARCHING / TRACKING state machine


use opencv::core::Rect;
use parallax_window::tracking::{FaceTracker, TrackMode};
use test_helpers::{create_test_image, ScriptedDetector, ScriptedTracker};

const THRESHOLD: f64 = 8.75;

fn face_tracker(
    detections: Vec<Vec<Rect>>,
    qualities: Vec<f64>,
) -> FaceTracker<ScriptedDetector, ScriptedTracker> {
    FaceTracker::new(
        ScriptedDetector::new(detections),
        ScriptedTracker::new(qualities),
        THRESHOLD,
        (10, 20),
    )
}

#[test]
fn test_starts_searching() {
    let tracker = face_tracker(vec![], vec![]);
    assert_eq!(tracker.state().mode, TrackMode::Searching);
    assert_eq!(tracker.state().bounding_box, None);
}

#[test]
fn test_no_face_stays_searching() {
    let frame = create_test_image(480, 640, 0.0).unwrap();
    let mut tracker = face_tracker(vec![vec![], vec![]], vec![]);

    assert_eq!(tracker.step(&frame).unwrap(), None);
    assert_eq!(tracker.step(&frame).unwrap(), None);
    assert_eq!(tracker.state().mode, TrackMode::Searching);
}

#[test]
fn test_single_face_in_top_left_quadrant() {
    let frame = create_test_image(480, 640, 0.0).unwrap();
    let mut tracker = face_tracker(vec![vec![Rect::new(5, 8, 50, 50)]], vec![]);

    let region = tracker.step(&frame).unwrap();

    // Padded by 10 px horizontally and 20 px vertically, left and top clamped at 0
    let expected = Rect::new(0, 0, 65, 78);
    assert_eq!(region, None);
    assert_eq!(tracker.state().mode, TrackMode::Tracking);
    assert_eq!(tracker.state().bounding_box, Some(expected));
}

#[test]
fn test_padding_away_from_edges() {
    let frame = create_test_image(480, 640, 0.0).unwrap();
    let mut tracker = face_tracker(vec![vec![Rect::new(100, 120, 50, 50)]], vec![]);

    tracker.step(&frame).unwrap();
    assert_eq!(tracker.state().bounding_box, Some(Rect::new(90, 100, 70, 90)));
}

#[test]
fn test_largest_face_is_tracked() {
    let frame = create_test_image(480, 640, 0.0).unwrap();
    let faces = vec![Rect::new(400, 300, 40, 40), Rect::new(100, 100, 80, 90), Rect::new(10, 300, 60, 60)];
    let mut tracker = face_tracker(vec![faces], vec![]);

    tracker.step(&frame).unwrap();
    assert_eq!(tracker.state().bounding_box, Some(Rect::new(90, 80, 100, 130)));
}

#[test]
fn test_quality_at_threshold_keeps_tracking() {
    let frame = create_test_image(480, 640, 0.0).unwrap();
    let mut tracker = face_tracker(vec![vec![Rect::new(100, 100, 50, 50)]], vec![8.75]);

    tracker.step(&frame).unwrap();
    assert!(tracker.step(&frame).unwrap().is_some());
    assert_eq!(tracker.state().mode, TrackMode::Tracking);
    assert_eq!(tracker.state().quality, Some(8.75));
}

#[test]
fn test_quality_below_threshold_returns_to_searching() {
    let frame = create_test_image(480, 640, 0.0).unwrap();
    let mut tracker = face_tracker(vec![vec![Rect::new(100, 100, 50, 50)]], vec![8.74999]);

    tracker.step(&frame).unwrap();
    assert_eq!(tracker.step(&frame).unwrap(), None);
    assert_eq!(tracker.state().mode, TrackMode::Searching);
    assert_eq!(tracker.state().bounding_box, None);
}

#[test]
fn test_detector_only_runs_while_searching() {
    let frame = create_test_image(480, 640, 0.0).unwrap();
    let face = Rect::new(200, 150, 60, 60);
    let mut tracker = FaceTracker::new(
        ScriptedDetector::new(vec![vec![face], vec![face]]),
        ScriptedTracker::new(vec![20.0, 15.0, 3.0]),
        THRESHOLD,
        (10, 20),
    );

    // Detect, track twice, lose the face, then detect again
    for _ in 0..4 {
        tracker.step(&frame).unwrap();
    }
    tracker.step(&frame).unwrap();

    assert_eq!(tracker.state().mode, TrackMode::Tracking);
}

#[test]
fn test_reset_forces_new_search() {
    let frame = create_test_image(480, 640, 0.0).unwrap();
    let mut tracker = face_tracker(vec![vec![Rect::new(100, 100, 50, 50)]], vec![]);

    tracker.step(&frame).unwrap();
    tracker.reset();
    assert_eq!(tracker.state().mode, TrackMode::Searching);
}

#[test]
fn test_position_reported_from_first_tracked_frame() {
    let frame = create_test_image(480, 640, 0.0).unwrap();
    let mut tracker = face_tracker(vec![vec![Rect::new(100, 100, 50, 50)]], vec![12.0]);

    // The detection frame starts the track without reporting a position
    assert_eq!(tracker.step(&frame).unwrap(), None);
    assert_eq!(tracker.step(&frame).unwrap(), Some(Rect::new(90, 80, 70, 90)));
}
