use crate::{config::DetectionConfig, utils::region_area, Error, Result};
use log::info;
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::imgproc;
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use std::path::{Path, PathBuf};

/// OpenCV-relative location of the stock frontal face cascade
const FRONTAL_FACE_CASCADE: &str = "haarcascades/haarcascade_frontalface_default.xml";

/// Locate OpenCV's stock frontal face cascade
fn bundled_cascade() -> Result<PathBuf> {
    let found = opencv::core::find_file(FRONTAL_FACE_CASCADE, false, true)?;
    if !found.is_empty() {
        return Ok(PathBuf::from(found));
    }

    // Install prefix recorded by the build script
    if let Some(prefix) = option_env!("OPENCV_PREFIX") {
        for data_dir in ["share/opencv4", "share/opencv"] {
            let candidate = Path::new(prefix).join(data_dir).join(FRONTAL_FACE_CASCADE);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }

    Err(Error::ConfigError(format!(
        "{FRONTAL_FACE_CASCADE} not found in OpenCV data; set detection.cascade_path"
    )))
}

/// Finds face bounding boxes in a frame
pub trait FaceDetector {
    /// Detect all faces in `frame`
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying detector fails.
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Rect>>;
}

/// The face with the largest area; the viewer is assumed to be closest.
///
/// Ties keep the earliest box.
#[must_use]
pub fn select_largest(faces: &[Rect]) -> Option<Rect> {
    faces
        .iter()
        .copied()
        .filter(|face| region_area(*face) > 0)
        .fold(None, |best: Option<Rect>, face| match best {
            Some(b) if region_area(b) >= region_area(face) => Some(b),
            _ => Some(face),
        })
}

/// Convert a BGR frame to single-channel grayscale
///
/// # Errors
///
/// Returns an error if the colour conversion fails.
pub fn to_grayscale(frame: &Mat) -> Result<Mat> {
    if frame.channels() == 1 {
        return Ok(frame.try_clone()?);
    }
    let mut gray = Mat::default();
    imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
    Ok(gray)
}

/// Viola-Jones Haar cascade detector
pub struct CascadeDetector {
    classifier: CascadeClassifier,
    scale_factor: f64,
    min_neighbors: i32,
}

impl CascadeDetector {
    /// Load a cascade from `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded as a cascade.
    pub fn new<P: AsRef<Path>>(path: P, scale_factor: f64, min_neighbors: i32) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading face cascade from {}", path.display());

        let classifier = CascadeClassifier::new(&path.to_string_lossy())?;
        if classifier.empty()? {
            return Err(Error::ConfigError(format!(
                "Face cascade could not be loaded from {}",
                path.display()
            )));
        }

        Ok(Self {
            classifier,
            scale_factor,
            min_neighbors,
        })
    }

    /// Build from configuration, falling back to OpenCV's bundled cascade
    ///
    /// # Errors
    ///
    /// Returns an error if no cascade file can be found or loaded.
    pub fn from_config(config: &DetectionConfig) -> Result<Self> {
        let path = match &config.cascade_path {
            Some(path) => path.clone(),
            None => bundled_cascade()?,
        };
        Self::new(path, config.scale_factor, config.min_neighbors)
    }
}

impl FaceDetector for CascadeDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Rect>> {
        let gray = to_grayscale(frame)?;
        let mut faces = Vector::<Rect>::new();
        self.classifier.detect_multi_scale(
            &gray,
            &mut faces,
            self.scale_factor,
            self.min_neighbors,
            0,
            Size::default(),
            Size::default(),
        )?;
        Ok(faces.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn test_select_largest() {
        let faces = [Rect::new(0, 0, 20, 20), Rect::new(100, 100, 60, 50), Rect::new(300, 10, 40, 40)];
        assert_eq!(select_largest(&faces), Some(Rect::new(100, 100, 60, 50)));
    }

    #[test]
    fn test_select_largest_tie_keeps_first() {
        let faces = [Rect::new(0, 0, 30, 30), Rect::new(50, 50, 30, 30)];
        assert_eq!(select_largest(&faces), Some(Rect::new(0, 0, 30, 30)));
    }

    #[test]
    fn test_select_largest_ignores_empty_boxes() {
        assert_eq!(select_largest(&[]), None);
        assert_eq!(select_largest(&[Rect::new(10, 10, 0, 40)]), None);
    }

    #[test]
    fn test_to_grayscale() {
        let frame = Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::new(10.0, 20.0, 30.0, 0.0)).unwrap();
        let gray = to_grayscale(&frame).unwrap();
        assert_eq!(gray.channels(), 1);
        assert_eq!((gray.rows(), gray.cols()), (48, 64));
    }
}
