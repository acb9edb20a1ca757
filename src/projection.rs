//! Off-axis corner projection.
//!
//! The perspective camera sits at the viewer's eye and always looks at the
//! centre of the screen. Projecting the screen's reference quad through it
//! tells the compositor where the screen's corners land in the rendered
//! image, which is what the correction homography needs.

use crate::{
    constants::{EPSILON, QUAD_CORNERS},
    Error, Result,
};
use nalgebra::{Isometry3, Point2, Point3, Vector3};

/// Pinhole camera described by where it is and what it looks at
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Eye position in world space
    pub position: Point3<f64>,
    /// Point the optical axis passes through
    pub target: Point3<f64>,
    /// World up direction
    pub up: Vector3<f64>,
    /// Field of view across the larger image axis, in radians
    pub fov: f64,
}

impl Camera {
    /// Create a camera with world +Z as up
    #[must_use]
    pub fn looking_at(position: Point3<f64>, target: Point3<f64>, fov: f64) -> Self {
        Self {
            position,
            target,
            up: Vector3::z(),
            fov,
        }
    }

    /// Move the eye, keeping the camera aimed at its target
    pub fn move_to(&mut self, position: Point3<f64>) {
        self.position = position;
    }

    /// World-to-camera transform, or `None` when the camera has no defined orientation
    fn view(&self) -> Option<Isometry3<f64>> {
        let forward = self.target - self.position;
        if forward.norm() < EPSILON || forward.cross(&self.up).norm() < EPSILON {
            return None;
        }
        Some(Isometry3::look_at_rh(&self.position, &self.target, &self.up))
    }

    /// Tangents of the half field of view along x and y for an image of the given aspect
    fn half_extents(&self, width: f64, height: f64) -> (f64, f64) {
        let tan_half = (self.fov / 2.0).tan();
        if width >= height {
            (tan_half, tan_half * height / width)
        } else {
            (tan_half * width / height, tan_half)
        }
    }

    /// Project a world point into normalized view coordinates.
    ///
    /// `(0, 0)` is the bottom-left of the frame and `(1, 1)` the top-right.
    /// Points outside the frame map outside `[0, 1]`. Returns `None` for
    /// points on or behind the camera plane.
    #[must_use]
    pub fn project(&self, point: &Point3<f64>, width: f64, height: f64) -> Option<Point2<f64>> {
        let view = self.view()?;
        let local = view.transform_point(point);
        let depth = -local.z;
        if depth <= EPSILON {
            return None;
        }

        let (tan_x, tan_y) = self.half_extents(width, height);
        let ndc_x = local.x / depth / tan_x;
        let ndc_y = local.y / depth / tan_y;
        Some(Point2::new(0.5 + ndc_x / 2.0, 0.5 + ndc_y / 2.0))
    }
}

/// Render output size: base resolution scaled by a percentage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSize {
    pub resolution_x: u32,
    pub resolution_y: u32,
    pub percentage: u32,
}

impl RenderSize {
    /// Effective output size in pixels
    #[must_use]
    pub fn pixels(&self) -> (f64, f64) {
        let scale = f64::from(self.percentage) / 100.0;
        (
            f64::from(self.resolution_x) * scale,
            f64::from(self.resolution_y) * scale,
        )
    }
}

/// The screen's geometric stand-in: four world-space vertices.
///
/// Vertex order is fixed: 0 top-left, 1 bottom-left, 2 top-right,
/// 3 bottom-right, as seen from the viewer's side of the screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceQuad(pub [Point3<f64>; QUAD_CORNERS]);

impl ReferenceQuad {
    /// Axis-aligned quad in the plane `x = 0`, facing +X, centred on the origin
    #[must_use]
    pub fn centered(half_width: f64, half_height: f64) -> Self {
        Self([
            Point3::new(0.0, -half_width, half_height),
            Point3::new(0.0, -half_width, -half_height),
            Point3::new(0.0, half_width, half_height),
            Point3::new(0.0, half_width, -half_height),
        ])
    }

    /// Mean of the four vertices
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        let sum = self.0.iter().fold(Vector3::zeros(), |acc, v| acc + v.coords);
        Point3::from(sum / 4.0)
    }

    /// Edges of the quad outline as vertex pairs
    #[must_use]
    pub fn outline(&self) -> [(Point3<f64>, Point3<f64>); 4] {
        let [tl, bl, tr, br] = self.0;
        [(tl, bl), (bl, br), (br, tr), (tr, tl)]
    }
}

/// Pixel positions of the reference quad's corners, in quad vertex order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerSet(pub [Point2<f64>; QUAD_CORNERS]);

impl CornerSet {
    #[must_use]
    pub fn new(points: [(f64, f64); QUAD_CORNERS]) -> Self {
        Self(points.map(|(x, y)| Point2::new(x, y)))
    }

    #[must_use]
    pub fn points(&self) -> &[Point2<f64>; QUAD_CORNERS] {
        &self.0
    }

    /// Flip the vertical axis so the origin is the top-left of an image `height` tall
    #[must_use]
    pub fn to_image_space(&self, height: f64) -> Self {
        Self(self.0.map(|p| Point2::new(p.x, height - p.y)))
    }

    /// Signed area of the quad traced 0 → 1 → 3 → 2
    #[must_use]
    pub fn signed_area(&self) -> f64 {
        let ring = [self.0[0], self.0[1], self.0[3], self.0[2]];
        let twice: f64 = (0..ring.len())
            .map(|i| {
                let a = ring[i];
                let b = ring[(i + 1) % ring.len()];
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice / 2.0
    }

    /// True when every coordinate is a finite number
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|p| p.x.is_finite() && p.y.is_finite())
    }
}

/// Project the reference quad through `camera` into output pixels.
///
/// Coordinates follow the renderer convention (origin bottom-left).
///
/// # Errors
///
/// Returns `DegenerateGeometry` if any vertex lies on or behind the camera
/// plane or the camera orientation is undefined.
pub fn project_corners(camera: &Camera, quad: &ReferenceQuad, size: RenderSize) -> Result<CornerSet> {
    let (width, height) = size.pixels();
    let mut corners = [Point2::origin(); QUAD_CORNERS];

    for (i, vertex) in quad.0.iter().enumerate() {
        let normalized = camera.project(vertex, width, height).ok_or_else(|| {
            Error::DegenerateGeometry(format!(
                "reference vertex {i} at {vertex:?} cannot be projected from {:?}",
                camera.position
            ))
        })?;
        corners[i] = Point2::new(normalized.x * width, normalized.y * height);
    }

    Ok(CornerSet(corners))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF_W: f64 = 1.6;
    const HALF_H: f64 = 0.9;
    const DEPTH: f64 = 15.0;

    fn fitted_camera() -> Camera {
        let fov = 2.0 * (HALF_W / DEPTH).atan();
        Camera::looking_at(Point3::new(DEPTH, 0.0, 0.0), Point3::origin(), fov)
    }

    fn full_hd() -> RenderSize {
        RenderSize {
            resolution_x: 1920,
            resolution_y: 1080,
            percentage: 100,
        }
    }

    fn assert_close(a: Point2<f64>, b: (f64, f64)) {
        assert!((a.x - b.0).abs() < 1e-6 && (a.y - b.1).abs() < 1e-6, "{a:?} != {b:?}");
    }

    #[test]
    fn test_centered_camera_fills_frame() {
        let corners = project_corners(&fitted_camera(), &ReferenceQuad::centered(HALF_W, HALF_H), full_hd()).unwrap();

        assert_close(corners.0[0], (0.0, 1080.0));
        assert_close(corners.0[1], (0.0, 0.0));
        assert_close(corners.0[2], (1920.0, 1080.0));
        assert_close(corners.0[3], (1920.0, 0.0));
    }

    #[test]
    fn test_image_space_flip() {
        let corners = project_corners(&fitted_camera(), &ReferenceQuad::centered(HALF_W, HALF_H), full_hd())
            .unwrap()
            .to_image_space(1080.0);

        assert_close(corners.0[0], (0.0, 0.0));
        assert_close(corners.0[1], (0.0, 1080.0));
        assert_close(corners.0[2], (1920.0, 0.0));
        assert_close(corners.0[3], (1920.0, 1080.0));
    }

    #[test]
    fn test_percentage_scales_corners() {
        let size = RenderSize {
            percentage: 50,
            ..full_hd()
        };
        let corners = project_corners(&fitted_camera(), &ReferenceQuad::centered(HALF_W, HALF_H), size).unwrap();
        assert_close(corners.0[3], (960.0, 0.0));
    }

    #[test]
    fn test_off_axis_view_is_trapezoid() {
        let mut camera = fitted_camera();
        camera.fov = 40f64.to_radians();
        camera.move_to(Point3::new(DEPTH, 3.0, 0.0));

        let corners = project_corners(&camera, &ReferenceQuad::centered(HALF_W, HALF_H), full_hd()).unwrap();
        let left_edge = corners.0[0].y - corners.0[1].y;
        let right_edge = corners.0[2].y - corners.0[3].y;

        // Eye moved towards +Y, so the +Y edge is nearer and appears taller
        assert!(right_edge > left_edge);
        assert!(corners.signed_area().abs() > 0.0);
    }

    #[test]
    fn test_vertex_behind_camera_is_degenerate() {
        let camera = Camera::looking_at(Point3::new(-5.0, 0.0, 0.0), Point3::new(-10.0, 0.0, 0.0), 1.0);
        let result = project_corners(&camera, &ReferenceQuad::centered(HALF_W, HALF_H), full_hd());
        assert!(matches!(result, Err(Error::DegenerateGeometry(_))));
    }

    #[test]
    fn test_camera_on_target_has_no_view() {
        let camera = Camera::looking_at(Point3::origin(), Point3::origin(), 1.0);
        assert!(camera.project(&Point3::new(1.0, 0.0, 0.0), 100.0, 100.0).is_none());
    }

    #[test]
    fn test_quad_center() {
        let quad = ReferenceQuad::centered(HALF_W, HALF_H);
        assert!(quad.center().coords.norm() < 1e-12);
    }
}
