//! Configuration management for the renderer and tracker processes

use crate::{
    constants::{
        BACKUP_FILE, COMPOSITE_FILE, CORNERS_FILE, DEFAULT_CASCADE_MIN_NEIGHBORS, DEFAULT_CASCADE_SCALE_FACTOR,
        DEFAULT_HORIZONTAL_SCALE, DEFAULT_PADDING_X, DEFAULT_PADDING_Y, DEFAULT_QUALITY_THRESHOLD,
        DEFAULT_VERTICAL_SCALE, DEFAULT_VIEWER_DEPTH, PERSPECTIVE_FILE, POSE_FILE,
    },
    filters::create_filter,
    projection::{Camera, ReferenceQuad, RenderSize},
    Error, Result,
};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Half-extent of the default screen quad, in scene units
const SCREEN_HALF_WIDTH: f64 = 1.6;
const SCREEN_HALF_HEIGHT: f64 = 0.9;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shared mailbox location and file names
    pub mailbox: MailboxConfig,

    /// Fixed viewer calibration
    pub calibration: CalibrationConfig,

    /// Face detection parameters
    pub detection: DetectionConfig,

    /// Webcam capture
    pub capture: CaptureConfig,

    /// Corrected-frame display
    pub display: DisplayConfig,

    /// Render output and pacing
    pub render: RenderConfig,

    /// Scene geometry
    pub scene: SceneConfig,

    /// Optional head position smoothing
    pub filter: FilterConfig,
}

/// Shared mailbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Directory shared by both processes; must be supplied externally
    pub root: Option<PathBuf>,
    pub pose_file: String,
    pub corners_file: String,
    pub perspective_file: String,
    pub composite_file: String,
    pub backup_file: String,
}

/// Calibration constants for turning a face position into a head position
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Assumed viewer distance from the screen
    pub depth: f64,

    /// Horizontal scene-unit scale of the normalized offset
    pub horizontal_scale: f64,

    /// Vertical scene-unit scale of the normalized offset
    pub vertical_scale: f64,

    /// Minimum tracker quality to keep a track
    pub quality_threshold: f64,

    /// Horizontal padding added to a new detection before tracking
    pub padding_x: i32,

    /// Vertical padding added to a new detection before tracking
    pub padding_y: i32,
}

/// Haar cascade parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Cascade XML; defaults to OpenCV's frontal face cascade
    pub cascade_path: Option<PathBuf>,
    pub scale_factor: f64,
    pub min_neighbors: i32,
}

/// Webcam capture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture device index
    pub camera_index: i32,

    /// Consecutive empty frames tolerated before giving up on the webcam
    pub max_failed_reads: u32,
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub window_title: String,
    pub window_width: i32,
    pub window_height: i32,

    /// UI event poll timeout per iteration
    pub poll_timeout_ms: i32,
}

/// Render output and pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub resolution_x: u32,
    pub resolution_y: u32,

    /// Resolution percentage (100 = full size)
    pub percentage: u32,

    /// Minimum time between render ticks
    pub tick_interval_ms: u64,
}

/// A camera as stored in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub position: [f64; 3],
    pub target: [f64; 3],
    pub fov_degrees: f64,
}

/// Scene geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Screen reference quad: top-left, bottom-left, top-right, bottom-right
    pub screen_corners: [[f64; 3]; 4],

    /// Camera aimed squarely at the screen
    pub straight_camera: CameraConfig,

    /// Field of view of the viewer's eye camera
    pub perspective_fov_degrees: f64,

    /// Depth of the room drawn behind the screen
    pub room_depth: f64,
}

/// Position smoothing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Filter spec understood by [`create_filter`]; `none` forwards raw positions
    pub kind: String,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            root: None,
            pose_file: POSE_FILE.to_string(),
            corners_file: CORNERS_FILE.to_string(),
            perspective_file: PERSPECTIVE_FILE.to_string(),
            composite_file: COMPOSITE_FILE.to_string(),
            backup_file: BACKUP_FILE.to_string(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_VIEWER_DEPTH,
            horizontal_scale: DEFAULT_HORIZONTAL_SCALE,
            vertical_scale: DEFAULT_VERTICAL_SCALE,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            padding_x: DEFAULT_PADDING_X,
            padding_y: DEFAULT_PADDING_Y,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            cascade_path: None,
            scale_factor: DEFAULT_CASCADE_SCALE_FACTOR,
            min_neighbors: DEFAULT_CASCADE_MIN_NEIGHBORS,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            max_failed_reads: 30,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            window_title: "Parallax Window".to_string(),
            window_width: 960,
            window_height: 540,
            poll_timeout_ms: 1,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            resolution_x: 1920,
            resolution_y: 1080,
            percentage: 100,
            tick_interval_ms: 10,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        let (w, h) = (SCREEN_HALF_WIDTH, SCREEN_HALF_HEIGHT);
        Self {
            screen_corners: [[0.0, -w, h], [0.0, -w, -h], [0.0, w, h], [0.0, w, -h]],
            straight_camera: CameraConfig {
                position: [DEFAULT_VIEWER_DEPTH, 0.0, 0.0],
                target: [0.0, 0.0, 0.0],
                fov_degrees: 2.0 * (w / DEFAULT_VIEWER_DEPTH).atan().to_degrees(),
            },
            perspective_fov_degrees: 30.0,
            room_depth: 6.0,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: "none".to_string(),
        }
    }
}

impl CameraConfig {
    #[must_use]
    pub fn to_camera(&self) -> Camera {
        Camera::looking_at(
            Point3::from(self.position),
            Point3::from(self.target),
            self.fov_degrees.to_radians(),
        )
    }
}

impl RenderConfig {
    #[must_use]
    pub fn size(&self) -> RenderSize {
        RenderSize {
            resolution_x: self.resolution_x,
            resolution_y: self.resolution_y,
            percentage: self.percentage,
        }
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl SceneConfig {
    #[must_use]
    pub fn reference_quad(&self) -> ReferenceQuad {
        ReferenceQuad(self.screen_corners.map(Point3::from))
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Shared mailbox directory, preferring an explicit override.
    ///
    /// # Errors
    ///
    /// Returns an error when neither the override nor the config names one.
    pub fn mailbox_root(&self, cli_override: Option<&Path>) -> Result<PathBuf> {
        cli_override
            .map(Path::to_path_buf)
            .or_else(|| self.mailbox.root.clone())
            .ok_or_else(|| {
                Error::ConfigError("No mailbox root given; pass --mailbox or set mailbox.root".to_string())
            })
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let cal = &self.calibration;
        let constants = [cal.depth, cal.horizontal_scale, cal.vertical_scale, cal.quality_threshold];
        if constants.iter().any(|v| !v.is_finite()) {
            return Err(Error::ConfigError("Calibration constants must be finite".to_string()));
        }
        if cal.depth <= 0.0 {
            return Err(Error::ConfigError("Viewer depth must be greater than 0".to_string()));
        }
        if cal.padding_x < 0 || cal.padding_y < 0 {
            return Err(Error::ConfigError("Padding must not be negative".to_string()));
        }

        if self.detection.scale_factor <= 1.0 {
            return Err(Error::ConfigError("Cascade scale factor must be greater than 1.0".to_string()));
        }
        if self.detection.min_neighbors < 0 {
            return Err(Error::ConfigError("Cascade min neighbours must not be negative".to_string()));
        }

        let render = &self.render;
        if render.resolution_x == 0 || render.resolution_y == 0 {
            return Err(Error::ConfigError("Render resolution must be greater than 0".to_string()));
        }
        if render.percentage == 0 {
            return Err(Error::ConfigError("Resolution percentage must be greater than 0".to_string()));
        }
        if render.tick_interval_ms == 0 {
            return Err(Error::ConfigError("Tick interval must be at least 1 ms".to_string()));
        }

        let fovs = [self.scene.straight_camera.fov_degrees, self.scene.perspective_fov_degrees];
        if fovs.iter().any(|f| !(f.is_finite() && *f > 0.0 && *f < 180.0)) {
            return Err(Error::ConfigError("Field of view must be between 0 and 180 degrees".to_string()));
        }

        if self.display.window_width <= 0 || self.display.window_height <= 0 {
            return Err(Error::ConfigError("Window size must be greater than 0".to_string()));
        }

        create_filter(&self.filter.kind)?;

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Parallax Window Configuration

# Shared mailbox (both processes must agree on the root)
mailbox:
  root: "/tmp/parallax-window"
  pose_file: "head_pose.json"
  corners_file: "corners.json"
  perspective_file: "perspective.jpg"
  composite_file: "composite.jpg"
  backup_file: "backup.jpg"

# Viewer calibration
calibration:
  depth: 15.0
  horizontal_scale: 4.592
  vertical_scale: 2.607
  quality_threshold: 8.75
  padding_x: 10
  padding_y: 20

# Face detection
detection:
  scale_factor: 1.3
  min_neighbors: 5

# Webcam
capture:
  camera_index: 0
  max_failed_reads: 30

# Display window
display:
  window_title: "Parallax Window"
  window_width: 960
  window_height: 540
  poll_timeout_ms: 1

# Render output
render:
  resolution_x: 1920
  resolution_y: 1080
  percentage: 100
  tick_interval_ms: 10

# Position smoothing (none, exponential:<alpha>, moving_average:<n>, kalman)
filter:
  kind: "none"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(config.mailbox.root, Some(PathBuf::from("/tmp/parallax-window")));
        assert_eq!(config.calibration.quality_threshold, 8.75);
        // Sections missing from the file fall back to defaults
        assert_eq!(config.scene.perspective_fov_degrees, 30.0);
    }

    #[test]
    fn test_mailbox_root_override() {
        let mut config = Config::default();
        assert!(config.mailbox_root(None).is_err());

        config.mailbox.root = Some(PathBuf::from("/from/config"));
        assert_eq!(config.mailbox_root(None).unwrap(), PathBuf::from("/from/config"));
        assert_eq!(
            config.mailbox_root(Some(Path::new("/from/cli"))).unwrap(),
            PathBuf::from("/from/cli")
        );
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut config = Config::default();
        config.render.percentage = 0;
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

        let mut config = Config::default();
        config.calibration.depth = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.filter.kind = "wobbly".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_straight_camera_frames_screen() {
        let scene = SceneConfig::default();
        let camera = scene.straight_camera.to_camera();
        let tl = camera.project(&scene.reference_quad().0[0], 1920.0, 1080.0).unwrap();
        assert!(tl.x.abs() < 1e-9 && (tl.y - 1.0).abs() < 1e-9);
    }
}
