//! Constants used throughout the application

/// Distance of the viewer from the screen, in scene units
pub const DEFAULT_VIEWER_DEPTH: f64 = 15.0;

/// Scene-unit span of a full-width horizontal head movement
pub const DEFAULT_HORIZONTAL_SCALE: f64 = 4.592;

/// Scene-unit span of a full-width vertical head movement
pub const DEFAULT_VERTICAL_SCALE: f64 = 2.607;

/// Minimum tracker quality for a track to be kept
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 8.75;

/// Horizontal margin added to each side of a detected face, in pixels
pub const DEFAULT_PADDING_X: i32 = 10;

/// Vertical margin added to each side of a detected face, in pixels
pub const DEFAULT_PADDING_Y: i32 = 20;

/// Haar cascade pyramid scale step
pub const DEFAULT_CASCADE_SCALE_FACTOR: f64 = 1.3;

/// Haar cascade neighbour votes required per detection
pub const DEFAULT_CASCADE_MIN_NEIGHBORS: i32 = 5;

/// Assumed webcam frame rate
pub const DEFAULT_FPS: f64 = 30.0;

/// Number of corners in the reference quad
pub const QUAD_CORNERS: usize = 4;

/// Mailbox file names
pub const POSE_FILE: &str = "head_pose.json";
pub const CORNERS_FILE: &str = "corners.json";
pub const PERSPECTIVE_FILE: &str = "perspective.jpg";
pub const COMPOSITE_FILE: &str = "composite.jpg";
pub const BACKUP_FILE: &str = "backup.jpg";

/// Suffix for files being written before their atomic publish
pub const STAGING_SUFFIX: &str = "tmp";

/// Consecutive failed decodes of a present perspective frame before it is discarded
pub const MAX_UNDECODABLE_READS: u32 = 30;

/// Keys that close the display window
pub const KEY_ESCAPE: i32 = 27;
pub const KEY_QUIT: i32 = b'q' as i32;

/// Area below which a projected quad is treated as collapsed, in square pixels
pub const MIN_QUAD_AREA: f64 = 1e-6;

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-10;
