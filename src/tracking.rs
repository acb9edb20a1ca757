//! Face tracking state machine.
//!
//! Detection is expensive and jumpy, so it only runs while SEARCHING. Once a
//! face is found it is handed to a region tracker, which follows it frame to
//! frame until its quality drops below the threshold, at which point the
//! machine falls back to SEARCHING.

use crate::{
    constants::EPSILON,
    face_detection::{select_largest, to_grayscale, FaceDetector},
    utils::{clamp_region, grow_region, pad_region},
    Error, Result,
};
use log::{debug, info};
use opencv::core::{Mat, Point, Rect, Scalar, CV_32F, CV_8UC1};
use opencv::imgproc;
use opencv::prelude::*;

/// Result of following a region into a new frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackUpdate {
    /// Where the region is now
    pub region: Rect,
    /// Confidence in that position; larger is better
    pub quality: f64,
}

/// Follows a previously found region across frames
pub trait RegionTracker {
    /// Begin following `region` in `frame`
    ///
    /// # Errors
    ///
    /// Returns an error if the region cannot be tracked in this frame.
    fn start(&mut self, frame: &Mat, region: Rect) -> Result<()>;

    /// Locate the region in the next frame
    ///
    /// # Errors
    ///
    /// Returns an error if tracking was never started or image operations fail.
    fn update(&mut self, frame: &Mat) -> Result<TrackUpdate>;
}

/// Which half of the state machine is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackMode {
    Searching,
    Tracking,
}

/// Observable tracker state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackState {
    pub mode: TrackMode,
    /// Current face box while tracking
    pub bounding_box: Option<Rect>,
    /// Quality reported by the last tracker update
    pub quality: Option<f64>,
}

impl TrackState {
    fn searching(quality: Option<f64>) -> Self {
        Self {
            mode: TrackMode::Searching,
            bounding_box: None,
            quality,
        }
    }
}

/// SEARCHING / TRACKING state machine over pluggable detector and tracker
pub struct FaceTracker<D, T> {
    detector: D,
    tracker: T,
    quality_threshold: f64,
    padding: (i32, i32),
    state: TrackState,
}

impl<D: FaceDetector, T: RegionTracker> FaceTracker<D, T> {
    pub fn new(detector: D, tracker: T, quality_threshold: f64, padding: (i32, i32)) -> Self {
        Self {
            detector,
            tracker,
            quality_threshold,
            padding,
            state: TrackState::searching(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> &TrackState {
        &self.state
    }

    /// Drop the current track and search again on the next frame
    pub fn reset(&mut self) {
        self.state = TrackState::searching(None);
    }

    /// Advance the machine by one frame.
    ///
    /// Returns the tracked face box to report for this frame, or `None` when
    /// this frame produced no usable position. The frame a face is first
    /// detected on only starts the track; its padded box is visible through
    /// [`FaceTracker::state`] but not reported.
    ///
    /// # Errors
    ///
    /// Propagates detector and tracker failures.
    pub fn step(&mut self, frame: &Mat) -> Result<Option<Rect>> {
        match self.state.mode {
            TrackMode::Searching => self.search(frame),
            TrackMode::Tracking => self.follow(frame),
        }
    }

    fn search(&mut self, frame: &Mat) -> Result<Option<Rect>> {
        let faces = self.detector.detect(frame)?;
        let Some(face) = select_largest(&faces) else {
            return Ok(None);
        };

        let (pad_x, pad_y) = self.padding;
        let region = pad_region(face, pad_x, pad_y);
        self.tracker.start(frame, region)?;

        info!("Face found at {region:?} among {} candidates, tracking", faces.len());
        self.state = TrackState {
            mode: TrackMode::Tracking,
            bounding_box: Some(region),
            quality: None,
        };
        // Positions are only reported from tracker updates
        Ok(None)
    }

    fn follow(&mut self, frame: &Mat) -> Result<Option<Rect>> {
        let update = self.tracker.update(frame)?;

        if update.quality >= self.quality_threshold {
            self.state = TrackState {
                mode: TrackMode::Tracking,
                bounding_box: Some(update.region),
                quality: Some(update.quality),
            };
            return Ok(Some(update.region));
        }

        info!(
            "Track quality {:.2} below {:.2}, searching",
            update.quality, self.quality_threshold
        );
        self.state = TrackState::searching(Some(update.quality));
        Ok(None)
    }
}

/// Template-matching correlation tracker.
///
/// Quality is the peak-to-sidelobe ratio of the normalized cross-correlation
/// response: how far the best match stands above the rest of the search
/// window, in standard deviations.
pub struct CorrelationTracker {
    template: Mat,
    region: Option<Rect>,
    search_margin: f64,
    learning_rate: f64,
    peak_exclusion: i32,
}

/// Minimum response samples outside the peak to estimate the sidelobe
const MIN_SIDELOBE_SAMPLES: i32 = 16;

impl CorrelationTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            template: Mat::default(),
            region: None,
            search_margin: 0.5,
            learning_rate: 0.1,
            peak_exclusion: 5,
        }
    }

    fn gray_f32(frame: &Mat) -> Result<Mat> {
        let gray = to_grayscale(frame)?;
        let mut out = Mat::default();
        gray.convert_to(&mut out, CV_32F, 1.0, 0.0)?;
        Ok(out)
    }

    fn peak_to_sidelobe(response: &Mat, peak: Point, peak_value: f64, exclusion: i32) -> Result<f64> {
        let mut mask = Mat::new_rows_cols_with_default(response.rows(), response.cols(), CV_8UC1, Scalar::all(255.0))?;
        let side = 2 * exclusion + 1;
        imgproc::rectangle(
            &mut mask,
            Rect::new(peak.x - exclusion, peak.y - exclusion, side, side),
            Scalar::all(0.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;

        if opencv::core::count_non_zero(&mask)? < MIN_SIDELOBE_SAMPLES {
            return Ok(0.0);
        }

        let mut mean = Mat::default();
        let mut std_dev = Mat::default();
        opencv::core::mean_std_dev(response, &mut mean, &mut std_dev, &mask)?;
        let mean = *mean.at::<f64>(0)?;
        let std_dev = *std_dev.at::<f64>(0)?;

        if std_dev < EPSILON {
            return Ok(0.0);
        }
        Ok((peak_value - mean) / std_dev)
    }
}

impl Default for CorrelationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionTracker for CorrelationTracker {
    fn start(&mut self, frame: &Mat, region: Rect) -> Result<()> {
        let gray = Self::gray_f32(frame)?;
        let region = clamp_region(region, gray.cols(), gray.rows())
            .ok_or_else(|| Error::InvalidInput(format!("Region {region:?} lies outside the frame")))?;

        self.template = Mat::roi(&gray, region)?.try_clone()?;
        self.region = Some(region);
        Ok(())
    }

    fn update(&mut self, frame: &Mat) -> Result<TrackUpdate> {
        let region = self
            .region
            .ok_or_else(|| Error::InvalidInput("Tracker updated before start".to_string()))?;
        let gray = Self::gray_f32(frame)?;

        let lost = TrackUpdate { region, quality: 0.0 };
        let Some(search) = clamp_region(grow_region(region, self.search_margin), gray.cols(), gray.rows()) else {
            return Ok(lost);
        };
        if search.width < region.width || search.height < region.height {
            return Ok(lost);
        }

        let window = Mat::roi(&gray, search)?.try_clone()?;
        let mut response = Mat::default();
        imgproc::match_template(&window, &self.template, &mut response, imgproc::TM_CCOEFF_NORMED, &Mat::default())?;

        let mut peak_value = 0.0;
        let mut peak = Point::default();
        opencv::core::min_max_loc(&response, None, Some(&mut peak_value), None, Some(&mut peak), &Mat::default())?;
        let quality = Self::peak_to_sidelobe(&response, peak, peak_value, self.peak_exclusion)?;

        let moved = Rect::new(search.x + peak.x, search.y + peak.y, region.width, region.height);
        debug!("Correlation peak {peak_value:.3} at {moved:?}, quality {quality:.2}");

        // Blend the new appearance into the template
        let patch = Mat::roi(&gray, moved)?.try_clone()?;
        let mut blended = Mat::default();
        opencv::core::add_weighted(
            &self.template,
            1.0 - self.learning_rate,
            &patch,
            self.learning_rate,
            0.0,
            &mut blended,
            -1,
        )?;
        self.template = blended;
        self.region = Some(moved);

        Ok(TrackUpdate { region: moved, quality })
    }
}
