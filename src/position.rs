//! Mapping a tracked face position to a head position in scene units.

use crate::{
    config::CalibrationConfig,
    filters::PositionFilter,
    mailbox::{PoseMessage, Slot},
    Result,
};
use log::{debug, trace};
use nalgebra::Point3;
use opencv::core::Rect;

/// Viewer head position: fixed depth plus two offsets from the screen centre
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    pub depth: f64,
    pub horizontal: f64,
    pub vertical: f64,
}

impl HeadPose {
    /// Viewer straight in front of the screen
    #[must_use]
    pub fn centered(depth: f64) -> Self {
        Self {
            depth,
            horizontal: 0.0,
            vertical: 0.0,
        }
    }

    /// Scene-space eye position
    #[must_use]
    pub fn to_point(&self) -> Point3<f64> {
        Point3::new(self.depth, self.horizontal, self.vertical)
    }
}

impl From<HeadPose> for PoseMessage {
    fn from(pose: HeadPose) -> Self {
        Self {
            pos: [pose.depth, pose.horizontal, pose.vertical],
        }
    }
}

impl From<PoseMessage> for HeadPose {
    fn from(message: PoseMessage) -> Self {
        let [depth, horizontal, vertical] = message.pos;
        Self {
            depth,
            horizontal,
            vertical,
        }
    }
}

/// Converts a face box's top-left corner into a [`HeadPose`]
#[derive(Debug, Clone, Copy)]
pub struct PositionMapper {
    depth: f64,
    horizontal_scale: f64,
    vertical_scale: f64,
}

impl PositionMapper {
    #[must_use]
    pub fn new(depth: f64, horizontal_scale: f64, vertical_scale: f64) -> Self {
        Self {
            depth,
            horizontal_scale,
            vertical_scale,
        }
    }

    #[must_use]
    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(config.depth, config.horizontal_scale, config.vertical_scale)
    }

    #[must_use]
    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// Map `(x, y)` in a `width` x `height` capture frame.
    ///
    /// Both offsets are measured from the frame centre and normalized by the
    /// frame width, so a pixel counts the same on either axis. The webcam
    /// faces the viewer, hence the sign flip on both.
    #[must_use]
    pub fn map(&self, (x, y): (f64, f64), (width, height): (f64, f64)) -> HeadPose {
        let dx = (x - width / 2.0) / width;
        let dy = (y - height / 2.0) / width;
        HeadPose {
            depth: self.depth,
            horizontal: -dx * self.horizontal_scale,
            vertical: -dy * self.vertical_scale,
        }
    }
}

/// Turns tracked face boxes into pose messages, never queueing more than one
pub struct PosePublisher<P> {
    mapper: PositionMapper,
    filter: Box<dyn PositionFilter>,
    slot: P,
}

impl<P: Slot<PoseMessage>> PosePublisher<P> {
    pub fn new(mapper: PositionMapper, filter: Box<dyn PositionFilter>, slot: P) -> Self {
        Self { mapper, filter, slot }
    }

    /// Overwrite the slot with the viewer-centred startup pose
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be written.
    pub fn publish_initial(&self) -> Result<HeadPose> {
        let pose = HeadPose::centered(self.mapper.depth());
        self.slot.publish(&PoseMessage::from(pose))?;
        debug!("Posted startup pose {pose:?}");
        Ok(pose)
    }

    /// Report this frame's face box.
    ///
    /// Returns the pose that was posted, or `None` when there was no box or
    /// the previous pose has not been consumed yet. Losing the face resets
    /// the smoothing filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be written.
    pub fn report(&mut self, region: Option<Rect>, frame_size: (f64, f64)) -> Result<Option<HeadPose>> {
        let Some(region) = region else {
            self.filter.reset();
            return Ok(None);
        };

        let position = self.filter.apply(f64::from(region.x), f64::from(region.y));
        let pose = self.mapper.map(position, frame_size);
        if self.slot.post(&PoseMessage::from(pose))? {
            trace!("Posted {pose:?}");
            Ok(Some(pose))
        } else {
            Ok(None)
        }
    }

    #[must_use]
    pub fn slot(&self) -> &P {
        &self.slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{create_filter, NoFilter};
    use crate::mailbox::ChannelSlot;
    use proptest::prelude::*;

    fn mapper() -> PositionMapper {
        PositionMapper::from_config(&CalibrationConfig::default())
    }

    #[test]
    fn test_frame_centre_is_on_axis() {
        let pose = mapper().map((320.0, 240.0), (640.0, 480.0));
        assert_eq!(pose, HeadPose::centered(15.0));
    }

    #[test]
    fn test_known_offsets() {
        let pose = mapper().map((0.0, 0.0), (640.0, 480.0));
        assert!((pose.horizontal - 0.5 * 4.592).abs() < 1e-12);
        assert!((pose.vertical - 0.375 * 2.607).abs() < 1e-12);
        assert_eq!(pose.depth, 15.0);
    }

    #[test]
    fn test_message_conversion() {
        let pose = HeadPose {
            depth: 15.0,
            horizontal: -1.0,
            vertical: 0.5,
        };
        let message = PoseMessage::from(pose);
        assert_eq!(message.pos, [15.0, -1.0, 0.5]);
        assert_eq!(HeadPose::from(message), pose);
        assert_eq!(pose.to_point(), Point3::new(15.0, -1.0, 0.5));
    }

    fn publisher() -> PosePublisher<ChannelSlot<PoseMessage>> {
        PosePublisher::new(mapper(), Box::new(NoFilter), ChannelSlot::new())
    }

    #[test]
    fn test_report_posts_only_when_slot_is_empty() {
        let mut publisher = publisher();
        let face = Some(Rect::new(320, 240, 50, 50));

        assert_eq!(publisher.report(face, (640.0, 480.0)).unwrap(), Some(HeadPose::centered(15.0)));
        assert_eq!(publisher.report(face, (640.0, 480.0)).unwrap(), None);

        publisher.slot().take().unwrap();
        assert!(publisher.report(face, (640.0, 480.0)).unwrap().is_some());
    }

    #[test]
    fn test_no_region_posts_nothing() {
        let mut publisher = publisher();
        assert_eq!(publisher.report(None, (640.0, 480.0)).unwrap(), None);
        assert!(!publisher.slot().is_full());
    }

    #[test]
    fn test_lost_track_resets_filter() {
        let mut publisher = PosePublisher::new(mapper(), create_filter("exponential:0.5").unwrap(), ChannelSlot::new());
        publisher.report(Some(Rect::new(0, 0, 10, 10)), (640.0, 480.0)).unwrap();
        publisher.slot().clear().unwrap();
        publisher.report(None, (640.0, 480.0)).unwrap();

        // Fresh filter passes the first position through unsmoothed
        let pose = publisher.report(Some(Rect::new(320, 240, 10, 10)), (640.0, 480.0)).unwrap();
        assert_eq!(pose, Some(HeadPose::centered(15.0)));
    }

    #[test]
    fn test_initial_pose_overwrites_stale_message() {
        let publisher = publisher();
        publisher.slot().post(&PoseMessage { pos: [15.0, 2.0, 2.0] }).unwrap();
        publisher.publish_initial().unwrap();
        assert_eq!(publisher.slot().take().unwrap(), Some(PoseMessage { pos: [15.0, 0.0, 0.0] }));
    }

    proptest! {
        #[test]
        fn prop_horizontal_strictly_decreasing(x in 0.0f64..639.0, step in 0.5f64..50.0) {
            let m = mapper();
            let a = m.map((x, 100.0), (640.0, 480.0));
            let b = m.map((x + step, 100.0), (640.0, 480.0));
            prop_assert!(b.horizontal < a.horizontal);
            prop_assert_eq!(a.vertical, b.vertical);
        }
    }
}
