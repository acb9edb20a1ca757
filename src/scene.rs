//! Scene state owned by the renderer, and the backends that draw it.

use crate::{
    config::{RenderConfig, SceneConfig},
    position::HeadPose,
    projection::{project_corners, Camera, CornerSet, ReferenceQuad, RenderSize},
    utils::safe_cast::{f64_to_i32, f64_to_i32_clamp},
    Error, Result,
};
use log::debug;
use nalgebra::{Point2, Point3};
use opencv::core::{Mat, Point, Scalar, Vector, CV_8UC3};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;
use std::path::Path;

/// Which camera the next render is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraRole {
    /// Aimed squarely at the physical screen; produces the final composite
    Straight,
    /// The viewer's eye; produces the frame the tracker corrects
    Perspective,
}

/// Everything a render needs, owned by the render loop
#[derive(Debug, Clone)]
pub struct SceneContext {
    pub straight: Camera,
    pub perspective: Camera,
    /// Geometric stand-in for the physical screen
    pub screen: ReferenceQuad,
    pub screen_visible: bool,
    pub active: CameraRole,
    pub size: RenderSize,
    /// How far the room extends behind the screen
    pub room_depth: f64,
}

/// Room slices drawn between the screen and the back wall
const ROOM_SLICES: usize = 4;

impl SceneContext {
    /// Build the scene with the viewer's eye at `eye`
    #[must_use]
    pub fn from_config(scene: &SceneConfig, render: &RenderConfig, eye: HeadPose) -> Self {
        let screen = scene.reference_quad();
        let perspective = Camera::looking_at(eye.to_point(), screen.center(), scene.perspective_fov_degrees.to_radians());

        Self {
            straight: scene.straight_camera.to_camera(),
            perspective,
            screen,
            screen_visible: true,
            active: CameraRole::Straight,
            size: render.size(),
            room_depth: scene.room_depth,
        }
    }

    #[must_use]
    pub fn active_camera(&self) -> &Camera {
        match self.active {
            CameraRole::Straight => &self.straight,
            CameraRole::Perspective => &self.perspective,
        }
    }

    /// Move the viewer's eye; the perspective camera keeps looking at the screen
    pub fn apply_pose(&mut self, pose: HeadPose) {
        self.perspective.move_to(pose.to_point());
        debug!("Perspective camera moved to {:?}", self.perspective.position);
    }

    /// Where the screen's corners land in the perspective render
    ///
    /// # Errors
    ///
    /// Returns `DegenerateGeometry` if the screen cannot be projected.
    pub fn screen_corners(&self) -> Result<CornerSet> {
        project_corners(&self.perspective, &self.screen, self.size)
    }

    /// Edges of the box-shaped room behind the screen
    #[must_use]
    pub fn room_edges(&self) -> Vec<(Point3<f64>, Point3<f64>)> {
        let [tl, bl, tr, br] = self.screen.0;
        // Points away from the viewer, into the room
        let inward = -(tr - tl).cross(&(tl - bl)).normalize() * self.room_depth;

        let mut edges = Vec::with_capacity(4 * (ROOM_SLICES + 1));
        for corner in [tl, bl, tr, br] {
            edges.push((corner, corner + inward));
        }
        for slice in 1..=ROOM_SLICES {
            #[allow(clippy::cast_precision_loss)]
            let offset = inward * (slice as f64 / ROOM_SLICES as f64);
            let ring = [tl + offset, bl + offset, br + offset, tr + offset];
            for i in 0..ring.len() {
                edges.push((ring[i], ring[(i + 1) % ring.len()]));
            }
        }
        edges
    }
}

/// Draws the scene from the active camera into an image file
pub trait RenderBackend {
    /// Render `scene` and write the image to `output`
    ///
    /// # Errors
    ///
    /// Returns `Render` if the backend cannot produce the image.
    fn render(&mut self, scene: &SceneContext, output: &Path) -> Result<()>;
}

/// Line-drawing backend: the room as a wireframe, plus the screen outline when visible
#[derive(Debug, Clone)]
pub struct WireframeBackend {
    background: Scalar,
    room_color: Scalar,
    screen_color: Scalar,
}

impl WireframeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            background: Scalar::new(30.0, 24.0, 20.0, 0.0),
            room_color: Scalar::new(220.0, 200.0, 120.0, 0.0),
            screen_color: Scalar::new(60.0, 180.0, 255.0, 0.0),
        }
    }

    fn to_pixel(normalized: Point2<f64>, width: f64, height: f64) -> Point {
        // Generous bounds so off-frame endpoints still give the right slope
        let limit = 8 * f64_to_i32_clamp(width.max(height), 1, i32::MAX / 16);
        Point::new(
            f64_to_i32_clamp(normalized.x * width, -limit, limit),
            f64_to_i32_clamp((1.0 - normalized.y) * height, -limit, limit),
        )
    }

    fn draw_edges(
        image: &mut Mat,
        camera: &Camera,
        edges: &[(Point3<f64>, Point3<f64>)],
        (width, height): (f64, f64),
        color: Scalar,
        thickness: i32,
    ) -> Result<()> {
        for (from, to) in edges {
            let (Some(a), Some(b)) = (camera.project(from, width, height), camera.project(to, width, height)) else {
                continue;
            };
            imgproc::line(
                image,
                Self::to_pixel(a, width, height),
                Self::to_pixel(b, width, height),
                color,
                thickness,
                imgproc::LINE_AA,
                0,
            )?;
        }
        Ok(())
    }

    /// Draw `scene` into a new image
    ///
    /// # Errors
    ///
    /// Returns an error if the output size is unusable or drawing fails.
    pub fn draw(&self, scene: &SceneContext) -> Result<Mat> {
        let (width, height) = scene.size.pixels();
        let cols = f64_to_i32(width.round())?;
        let rows = f64_to_i32(height.round())?;
        if cols <= 0 || rows <= 0 {
            return Err(Error::Render(format!("Render size {cols}x{rows} is empty")));
        }

        let mut image = Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, self.background)?;
        let camera = scene.active_camera();
        Self::draw_edges(&mut image, camera, &scene.room_edges(), (width, height), self.room_color, 2)?;
        if scene.screen_visible {
            Self::draw_edges(&mut image, camera, &scene.screen.outline(), (width, height), self.screen_color, 4)?;
        }
        Ok(image)
    }
}

impl Default for WireframeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for WireframeBackend {
    fn render(&mut self, scene: &SceneContext, output: &Path) -> Result<()> {
        let image = self.draw(scene)?;
        let path = output.to_string_lossy();
        if imgcodecs::imwrite(&path, &image, &Vector::new())? {
            Ok(())
        } else {
            Err(Error::Render(format!("Could not encode render to {path}")))
        }
    }
}
