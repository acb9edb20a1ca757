//! Head-tracked "virtual window" rendering.
//!
//! Two processes cooperate through a directory of single-slot mailbox files:
//!
//! 1. The renderer moves an off-axis camera to the viewer's head position,
//!    projects the screen's corners, and renders a perspective frame plus a
//!    straight-on composite.
//! 2. The tracker follows the viewer's face in a webcam feed, posts the head
//!    position, and warps each perspective frame so the screen quad fills the
//!    display.
//!
//! # Examples
//!
//! ## Correcting a frame
//!
//! ```no_run
//! use parallax_window::{correction::correct_frame, projection::CornerSet};
//! use opencv::{imgcodecs, prelude::*};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let frame = imgcodecs::imread("perspective.jpg", imgcodecs::IMREAD_COLOR)?;
//! let corners = CornerSet::new([(120.0, 1000.0), (80.0, 60.0), (1800.0, 1040.0), (1840.0, 20.0)]);
//! let corrected = correct_frame(&frame, &corners)?;
//! println!("{}x{}", corrected.cols(), corrected.rows());
//! # Ok(())
//! # }
//! ```
//!
//! ## Mapping a face position
//!
//! ```
//! use parallax_window::{config::CalibrationConfig, position::PositionMapper};
//!
//! let mapper = PositionMapper::from_config(&CalibrationConfig::default());
//! let pose = mapper.map((320.0, 240.0), (640.0, 480.0));
//! assert_eq!((pose.horizontal, pose.vertical), (0.0, 0.0));
//! ```

/// Error types and result handling
pub mod error;

/// Calibration and protocol constants
pub mod constants;

/// Configuration management
pub mod config;

/// Camera model and off-axis corner projection
pub mod projection;

/// Perspective-correction transform
pub mod homography;

/// Single-slot message channels between the processes
pub mod mailbox;

/// Scene state and render backends
pub mod scene;

/// Render cycle state machine
pub mod renderer;

/// Bounded-rate loop and shutdown handling
pub mod scheduler;

/// Face detection
pub mod face_detection;

/// Face tracking state machine
pub mod tracking;

/// Optional smoothing of tracked positions
pub mod filters;

/// Face position to head position mapping
pub mod position;

/// Perspective frame correction
pub mod correction;

/// Renderer and tracker processes
pub mod app;

/// Region and numeric helpers
pub mod utils;

pub use error::{Error, Result};
