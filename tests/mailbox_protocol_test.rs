//! Tests for the renderer/tracker handshake over a file mailbox


use opencv::core::{Rect, Vec3b};
use opencv::prelude::*;
use parallax_window::{
    config::{CalibrationConfig, MailboxConfig, RenderConfig, SceneConfig},
    correction::FrameCorrector,
    filters::NoFilter,
    mailbox::{CornerMessage, JsonSlot, Mailbox, PoseMessage, Slot},
    position::{HeadPose, PosePublisher, PositionMapper},
    renderer::{RenderLoop, RenderOutcome},
    scene::{RenderBackend, SceneContext},
    Error, Result,
};
use std::fs;
use std::path::Path;
use test_helpers::create_test_image;

/// Backend that writes a small real image so the corrector can decode it
struct FlatBackend;

impl RenderBackend for FlatBackend {
    fn render(&mut self, _scene: &SceneContext, output: &Path) -> Result<()> {
        let image = create_test_image(36, 64, 100.0)?;
        opencv::imgcodecs::imwrite(&output.to_string_lossy(), &image, &opencv::core::Vector::new())?;
        Ok(())
    }
}

fn small_render() -> RenderConfig {
    RenderConfig {
        resolution_x: 64,
        resolution_y: 36,
        ..RenderConfig::default()
    }
}

fn names() -> MailboxConfig {
    MailboxConfig {
        perspective_file: "perspective.png".to_string(),
        composite_file: "composite.png".to_string(),
        backup_file: "backup.png".to_string(),
        ..MailboxConfig::default()
    }
}

fn renderer(root: &Path) -> RenderLoop<FlatBackend> {
    let scene = SceneContext::from_config(&SceneConfig::default(), &small_render(), HeadPose::centered(15.0));
    RenderLoop::from_mailbox(scene, FlatBackend, Mailbox::open(root, &names()).unwrap())
}

fn tracker_side(root: &Path) -> (PosePublisher<JsonSlot<PoseMessage>>, FrameCorrector) {
    let Mailbox {
        pose,
        corners,
        perspective,
        backup,
        ..
    } = Mailbox::open(root, &names()).unwrap();
    let mapper = PositionMapper::from_config(&CalibrationConfig::default());
    (
        PosePublisher::new(mapper, Box::new(NoFilter), pose),
        FrameCorrector::new(perspective, backup, corners),
    )
}

#[test]
fn test_at_most_one_pose_pending() {
    let dir = tempfile::tempdir().unwrap();
    let mut renderer = renderer(dir.path());
    let (mut publisher, mut corrector) = tracker_side(dir.path());
    let pose_file = dir.path().join("head_pose.json");

    publisher.publish_initial().unwrap();
    let mut posted = 0;
    let mut consumed = 0;

    for cycle in 0..40 {
        // The tracker runs faster than the renderer
        for step in 0..3 {
            let x = 100 + cycle * 3 + step;
            if publisher.report(Some(Rect::new(x, 200, 60, 60)), (640.0, 480.0)).unwrap().is_some() {
                posted += 1;
            }
            let pending = fs::read_dir(dir.path())
                .unwrap()
                .filter(|entry| entry.as_ref().unwrap().file_name().to_string_lossy().starts_with("head_pose"))
                .count();
            assert!(pending <= 1, "{pending} pose files pending");
        }

        if cycle % 2 == 0 {
            if let RenderOutcome::Rendered { pose: Some(_), .. } = renderer.tick().unwrap() {
                consumed += 1;
            }
        }
        if corrector.has_pending() {
            corrector.next_frame().unwrap();
        }
    }

    assert!(posted > 0);
    // Every posted pose except possibly the last was consumed, plus the startup pose
    assert!(consumed >= posted, "posted {posted}, consumed {consumed}");
    assert!(consumed <= posted + 1);
    assert!(!pose_file.exists() || consumed == posted);
}

#[test]
fn test_renderer_waits_for_tracker() {
    let dir = tempfile::tempdir().unwrap();
    let mut renderer = renderer(dir.path());
    let (_, mut corrector) = tracker_side(dir.path());

    renderer.prime().unwrap();
    assert_eq!(renderer.tick().unwrap(), RenderOutcome::Backpressured);

    let frame = corrector.next_frame().unwrap().unwrap();
    assert_eq!((frame.cols(), frame.rows()), (64, 36));
    assert!(matches!(renderer.tick().unwrap(), RenderOutcome::Rendered { .. }));
}

#[test]
fn test_missing_perspective_returns_backup() {
    let dir = tempfile::tempdir().unwrap();
    let mut renderer = renderer(dir.path());
    let (_, mut corrector) = tracker_side(dir.path());

    renderer.prime().unwrap();
    corrector.next_frame().unwrap();
    assert!(dir.path().join("backup.png").exists());

    // Nothing new rendered: the raw backup comes back untouched
    let frame = corrector.next_frame().unwrap().unwrap();
    assert_eq!(*frame.at_2d::<Vec3b>(18, 32).unwrap(), Vec3b::from([100, 100, 100]));
    assert!(dir.path().join("backup.png").exists());
}

#[test]
fn test_corners_follow_pose() {
    let dir = tempfile::tempdir().unwrap();
    let mut renderer = renderer(dir.path());
    let corners: JsonSlot<CornerMessage> = JsonSlot::new(dir.path().join("corners.json"));

    renderer.tick().unwrap();
    let centred = corners.read().unwrap().unwrap();

    fs::remove_file(dir.path().join("perspective.png")).unwrap();
    let pose = JsonSlot::<PoseMessage>::new(dir.path().join("head_pose.json"));
    pose.post(&PoseMessage { pos: [15.0, 2.0, 1.0] }).unwrap();
    renderer.tick().unwrap();

    assert_ne!(corners.read().unwrap().unwrap(), centred);
    assert!(!pose.is_full());
}

#[test]
fn test_stale_garbage_pose_fails_loudly_once() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("head_pose.json"), "not json").unwrap();
    let mut renderer = renderer(dir.path());

    assert!(matches!(renderer.tick(), Err(Error::MalformedMessage { .. })));
    // The bad message was removed, so a restart is not stuck on it
    assert!(!dir.path().join("head_pose.json").exists());
    assert!(renderer.tick().is_ok());
}
