//! Perspective-correction transform.
//!
//! Solves the projective map between two quadrilaterals from their four
//! corner correspondences, with `h33` fixed to 1, and rejects corner sets
//! that cannot produce an invertible map.

use crate::{
    constants::{EPSILON, MIN_QUAD_AREA, QUAD_CORNERS},
    projection::CornerSet,
    Error, Result,
};
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};
use opencv::core::Mat;
use opencv::prelude::*;

/// 3x3 projective transform acting on homogeneous pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(Matrix3<f64>);

/// Corners of the axis-aligned `width` x `height` output, in quad vertex order
#[must_use]
pub fn canonical_corners(width: f64, height: f64) -> CornerSet {
    CornerSet::new([(0.0, 0.0), (0.0, height), (width, 0.0), (width, height)])
}

fn triangle_area(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    ((b - a).perp(&(c - a)) / 2.0).abs()
}

/// Reject quads that collapse to a line or a point
fn check_quad(corners: &CornerSet, role: &str) -> Result<()> {
    if !corners.is_finite() {
        return Err(Error::DegenerateGeometry(format!("{role} corners are not finite")));
    }

    let area = corners.signed_area().abs();
    if area < MIN_QUAD_AREA {
        return Err(Error::DegenerateGeometry(format!(
            "{role} quad has zero area ({area:e})"
        )));
    }

    let p = corners.points();
    let triples = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    for (i, j, k) in triples {
        if triangle_area(&p[i], &p[j], &p[k]) < MIN_QUAD_AREA {
            return Err(Error::DegenerateGeometry(format!(
                "{role} corners {i}, {j}, {k} are collinear"
            )));
        }
    }
    Ok(())
}

impl Homography {
    #[must_use]
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    #[must_use]
    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self(matrix)
    }

    #[must_use]
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    /// Transform mapping each `src` corner onto the `dst` corner with the same index
    ///
    /// # Errors
    ///
    /// Returns `DegenerateGeometry` if either quad is degenerate or the
    /// resulting system is singular.
    pub fn between(src: &CornerSet, dst: &CornerSet) -> Result<Self> {
        check_quad(src, "source")?;
        check_quad(dst, "destination")?;

        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for i in 0..QUAD_CORNERS {
            let (x, y) = (src.0[i].x, src.0[i].y);
            let (u, v) = (dst.0[i].x, dst.0[i].y);
            let r = 2 * i;

            a[(r, 0)] = x;
            a[(r, 1)] = y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -u * x;
            a[(r, 7)] = -u * y;
            b[r] = u;

            a[(r + 1, 3)] = x;
            a[(r + 1, 4)] = y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -v * x;
            a[(r + 1, 7)] = -v * y;
            b[r + 1] = v;
        }

        let h = a
            .lu()
            .solve(&b)
            .ok_or_else(|| Error::DegenerateGeometry("correspondence system is singular".to_string()))?;

        let matrix = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        if !matrix.iter().all(|v| v.is_finite()) || matrix.determinant().abs() < EPSILON {
            return Err(Error::DegenerateGeometry("transform is not invertible".to_string()));
        }

        Ok(Self(matrix))
    }

    /// Transform taking the distorted screen quad (image space, origin top-left)
    /// onto the full `width` x `height` output rectangle.
    ///
    /// # Errors
    ///
    /// Returns `DegenerateGeometry` when the corners cannot be corrected.
    pub fn correction(corners: &CornerSet, width: f64, height: f64) -> Result<Self> {
        Self::between(corners, &canonical_corners(width, height))
    }

    /// Map a point; `None` if it lands on the line at infinity
    #[must_use]
    pub fn apply(&self, point: Point2<f64>) -> Option<Point2<f64>> {
        let mapped = self.0 * Vector3::new(point.x, point.y, 1.0);
        if mapped.z.abs() < EPSILON {
            return None;
        }
        Some(Point2::new(mapped.x / mapped.z, mapped.y / mapped.z))
    }

    /// True when every entry is within `tolerance` of the identity matrix
    #[must_use]
    pub fn is_identity(&self, tolerance: f64) -> bool {
        (self.0 - Matrix3::identity()).iter().all(|v| v.abs() <= tolerance)
    }

    /// Row-major `CV_64F` matrix for `imgproc::warp_perspective`
    ///
    /// # Errors
    ///
    /// Returns an error if `OpenCV` cannot allocate the matrix.
    pub fn to_mat(&self) -> Result<Mat> {
        let m = &self.0;
        let rows = [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ];
        Ok(Mat::from_slice_2d(&rows)?)
    }
}
