//! The two processes: the renderer and the tracker/compositor.

use crate::{
    config::Config,
    constants::{KEY_ESCAPE, KEY_QUIT},
    correction::FrameCorrector,
    face_detection::CascadeDetector,
    filters::create_filter,
    mailbox::{JsonSlot, Mailbox, PoseMessage},
    position::{HeadPose, PosePublisher, PositionMapper},
    renderer::RenderLoop,
    scene::{SceneContext, WireframeBackend},
    scheduler::PacedLoop,
    tracking::{CorrelationTracker, FaceTracker},
    Error, Result,
};
use log::{debug, info, warn};
use opencv::{
    core::{Mat, Point, Scalar},
    highgui::{self, WINDOW_NORMAL},
    imgproc::{self, LINE_8},
    prelude::*,
    videoio::{self, VideoCapture, CAP_PROP_BUFFERSIZE},
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Run the renderer until shutdown.
///
/// # Errors
///
/// Returns an error if the mailbox cannot be opened, a pose message is
/// malformed, or the render backend fails.
pub fn run_renderer(config: &Config, mailbox_root: &Path, shutdown: &AtomicBool) -> Result<()> {
    let mailbox = Mailbox::open(mailbox_root, &config.mailbox)?;
    info!("Renderer using mailbox {}", mailbox.root().display());

    let eye = HeadPose::centered(config.calibration.depth);
    let scene = SceneContext::from_config(&config.scene, &config.render, eye);
    let mut renderer = RenderLoop::from_mailbox(scene, WireframeBackend::new(), mailbox);

    let ticks = renderer.run(PacedLoop::new(config.render.tick_interval()), shutdown)?;
    info!("Renderer stopped after {ticks} ticks");
    Ok(())
}

/// Webcam tracking, pose publishing and corrected-frame display
pub struct TrackerApp {
    capture: VideoCapture,
    tracker: FaceTracker<CascadeDetector, CorrelationTracker>,
    publisher: PosePublisher<JsonSlot<PoseMessage>>,
    corrector: FrameCorrector,
    window_title: String,
    poll_timeout_ms: i32,
    max_failed_reads: u32,
    debug_overlay: bool,
    shutdown: Arc<AtomicBool>,
}

impl TrackerApp {
    /// Open the webcam, the face detector and the display window.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox, the webcam, the cascade or the
    /// window cannot be set up.
    pub fn new(config: &Config, mailbox_root: &Path, debug_overlay: bool, shutdown: Arc<AtomicBool>) -> Result<Self> {
        info!("Initializing tracker");

        let Mailbox {
            pose,
            corners,
            perspective,
            backup,
            ..
        } = Mailbox::open(mailbox_root, &config.mailbox)?;

        let index = config.capture.camera_index;
        info!("Opening camera {index}");
        let mut capture = VideoCapture::new(index, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(Error::Capture(format!("Camera {index} could not be opened")));
        }
        // Keep only the newest frame for low latency
        capture.set(CAP_PROP_BUFFERSIZE, 1.0)?;

        let cal = &config.calibration;
        let tracker = FaceTracker::new(
            CascadeDetector::from_config(&config.detection)?,
            CorrelationTracker::new(),
            cal.quality_threshold,
            (cal.padding_x, cal.padding_y),
        );

        let filter = create_filter(&config.filter.kind)?;
        info!("Position filter: {}", filter.name());
        let publisher = PosePublisher::new(PositionMapper::from_config(cal), filter, pose);

        let display = &config.display;
        highgui::named_window(&display.window_title, WINDOW_NORMAL)?;
        highgui::resize_window(&display.window_title, display.window_width, display.window_height)?;

        Ok(Self {
            capture,
            tracker,
            publisher,
            corrector: FrameCorrector::new(perspective, backup, corners),
            window_title: display.window_title.clone(),
            poll_timeout_ms: display.poll_timeout_ms.max(1),
            max_failed_reads: config.capture.max_failed_reads,
            debug_overlay,
            shutdown,
        })
    }

    /// Run until the window is closed, `q`/Esc is pressed or an interrupt arrives.
    ///
    /// # Errors
    ///
    /// Returns `Capture` when the webcam stops delivering frames, and
    /// propagates mailbox, tracking and display failures.
    pub fn run(&mut self) -> Result<()> {
        self.publisher.publish_initial()?;
        if let Some(frame) = self.corrector.next_frame()? {
            highgui::imshow(&self.window_title, &frame)?;
        }

        let mut failed_reads = 0;
        let mut frame_count: u64 = 0;
        let mut last_report = Instant::now();

        info!("Entering tracking loop");
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let key = highgui::wait_key(self.poll_timeout_ms)?;
            if key == KEY_ESCAPE || key == KEY_QUIT {
                info!("Exit requested by user");
                break;
            }
            if highgui::get_window_property(&self.window_title, highgui::WND_PROP_VISIBLE)? < 1.0 {
                info!("Display window closed");
                break;
            }

            let mut frame = Mat::default();
            if !self.capture.read(&mut frame)? || frame.empty() {
                failed_reads += 1;
                if failed_reads > self.max_failed_reads {
                    return Err(Error::Capture(format!("No webcam frame after {failed_reads} attempts")));
                }
                warn!("Failed to read frame, retrying...");
                continue;
            }
            failed_reads = 0;

            let region = self.tracker.step(&frame)?;
            let size = (f64::from(frame.cols()), f64::from(frame.rows()));
            if let Some(pose) = self.publisher.report(region, size)? {
                debug!("Head at {pose:?}");
            }

            if self.debug_overlay {
                self.show_capture(&frame)?;
            }

            if self.corrector.has_pending() {
                if let Some(corrected) = self.corrector.next_frame()? {
                    highgui::imshow(&self.window_title, &corrected)?;
                }
            }

            frame_count += 1;
            if last_report.elapsed() >= Duration::from_secs(5) {
                #[allow(clippy::cast_precision_loss)]
                let fps = frame_count as f64 / last_report.elapsed().as_secs_f64();
                debug!("Tracking at {fps:.1} FPS, state {:?}", self.tracker.state().mode);
                frame_count = 0;
                last_report = Instant::now();
            }
        }

        info!("Tracker shutting down");
        Ok(())
    }

    /// Webcam view with the tracked box, in its own window
    fn show_capture(&self, frame: &Mat) -> Result<()> {
        let mut view = frame.try_clone()?;
        let state = self.tracker.state();
        if let Some(region) = state.bounding_box {
            imgproc::rectangle(&mut view, region, Scalar::new(0.0, 255.0, 0.0, 0.0), 2, LINE_8, 0)?;
        }
        let label = match state.quality {
            Some(quality) => format!("{:?} q={quality:.2}", state.mode),
            None => format!("{:?}", state.mode),
        };
        imgproc::put_text(
            &mut view,
            &label,
            Point::new(10, 30),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.8,
            Scalar::new(0.0, 255.0, 255.0, 0.0),
            2,
            LINE_8,
            false,
        )?;
        highgui::imshow("Webcam", &view)?;
        Ok(())
    }
}

impl Drop for TrackerApp {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!("Failed to release camera: {e}");
        }
        if let Err(e) = highgui::destroy_all_windows() {
            warn!("Failed to close windows: {e}");
        }
    }
}
