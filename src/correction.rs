//! Consumer side of the image hand-off: read, retire and undistort the
//! renderer's perspective frame.

use crate::{
    constants::MAX_UNDECODABLE_READS,
    homography::Homography,
    mailbox::{CornerMessage, ImageSlot, JsonSlot},
    projection::CornerSet,
    Error, Result,
};
use log::{debug, warn};
use opencv::core::{Mat, Scalar, Size, BORDER_CONSTANT};
use opencv::imgproc;
use opencv::prelude::*;

/// Warp `frame` so the quad at `corners` (renderer convention, origin
/// bottom-left) fills the whole image.
///
/// # Errors
///
/// Returns `DegenerateGeometry` when the corners admit no correction.
pub fn correct_frame(frame: &Mat, corners: &CornerSet) -> Result<Mat> {
    let (width, height) = (frame.cols(), frame.rows());
    let image_corners = corners.to_image_space(f64::from(height));
    let homography = Homography::correction(&image_corners, f64::from(width), f64::from(height))?;

    let mut corrected = Mat::default();
    imgproc::warp_perspective(
        frame,
        &mut corrected,
        &homography.to_mat()?,
        Size::new(width, height),
        imgproc::INTER_LINEAR,
        BORDER_CONSTANT,
        Scalar::default(),
    )?;
    Ok(corrected)
}

/// Where the corrector gets the corners matching the pending frame
pub trait CornerSource {
    /// Latest published corners; `None` when the renderer has cleared them
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` if the published corners are invalid.
    fn latest(&self) -> Result<Option<CornerSet>>;
}

impl CornerSource for JsonSlot<CornerMessage> {
    fn latest(&self) -> Result<Option<CornerSet>> {
        let Some(message) = self.read()? else {
            return Ok(None);
        };
        CornerSet::try_from(&message)
            .map(Some)
            .map_err(|reason| Error::MalformedMessage {
                slot: self.path().display().to_string(),
                reason,
            })
    }
}

/// Turns pending perspective frames into corrected frames for display
pub struct FrameCorrector<C = JsonSlot<CornerMessage>> {
    perspective: ImageSlot,
    backup: ImageSlot,
    corners: C,
    last_corrected: Option<Mat>,
    undecodable_reads: u32,
}

impl<C: CornerSource> FrameCorrector<C> {
    #[must_use]
    pub fn new(perspective: ImageSlot, backup: ImageSlot, corners: C) -> Self {
        Self {
            perspective,
            backup,
            corners,
            last_corrected: None,
            undecodable_reads: 0,
        }
    }

    /// Whether the renderer has published a frame that has not been consumed
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.perspective.is_full()
    }

    /// Produce the next frame to display.
    ///
    /// An unreadable or missing perspective frame yields the backup frame
    /// unmodified, and the backup is left as it is. A readable frame is warped
    /// with the corners published alongside it and then moved to the backup
    /// slot. The corners are read before the move: an empty perspective slot
    /// lets the renderer start its next cycle and overwrite them. When the
    /// corners are missing or degenerate the previous corrected frame (or the
    /// raw frame, if there is none) is returned instead.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` for an invalid corner message and
    /// propagates unexpected file system and `OpenCV` failures.
    pub fn next_frame(&mut self) -> Result<Option<Mat>> {
        let Some(frame) = self.perspective.read()? else {
            if self.perspective.is_full() {
                self.note_undecodable()?;
            }
            let backup = self.backup.read()?;
            if backup.is_some() {
                debug!("Perspective frame unavailable, showing backup");
            }
            return Ok(backup);
        };
        self.undecodable_reads = 0;

        let corners = self.corners.latest()?;
        self.perspective.retire_to(&self.backup)?;

        let Some(corners) = corners else {
            warn!("No screen corners published, skipping correction");
            return self.fallback(frame);
        };

        match correct_frame(&frame, &corners) {
            Ok(corrected) => {
                self.last_corrected = Some(corrected.try_clone()?);
                Ok(Some(corrected))
            }
            Err(Error::DegenerateGeometry(reason)) => {
                warn!("Skipping correction: {reason}");
                self.fallback(frame)
            }
            Err(e) => Err(e),
        }
    }

    /// A frame that never decodes would keep the renderer backpressured forever
    fn note_undecodable(&mut self) -> Result<()> {
        self.undecodable_reads += 1;
        if self.undecodable_reads < MAX_UNDECODABLE_READS {
            debug!(
                "{} could not be decoded ({} in a row)",
                self.perspective.path().display(),
                self.undecodable_reads
            );
            return Ok(());
        }

        warn!(
            "Discarding {} after {} failed decodes",
            self.perspective.path().display(),
            self.undecodable_reads
        );
        self.undecodable_reads = 0;
        self.perspective.clear()
    }

    fn fallback(&self, raw: Mat) -> Result<Option<Mat>> {
        match &self.last_corrected {
            Some(previous) => Ok(Some(previous.try_clone()?)),
            None => Ok(Some(raw)),
        }
    }
}
