//! Producer side of the mailbox: the render cycle.
//!
//! Each cycle consumes at most one pending head pose, republishes the screen
//! corners, renders the viewer's perspective frame with the screen hidden and
//! then the straight-on composite with the screen shown. A cycle is skipped
//! entirely while the previous perspective frame is still unconsumed.

use crate::{
    mailbox::{CornerMessage, ImageSlot, JsonSlot, Mailbox, PoseMessage, Slot},
    position::HeadPose,
    projection::CornerSet,
    scene::{CameraRole, RenderBackend, SceneContext},
    scheduler::PacedLoop,
    Result,
};
use log::{debug, info, trace, warn};
use std::ops::ControlFlow;
use std::sync::atomic::AtomicBool;

/// How far the latest render cycle got.
///
/// A completed cycle rests in `RenderedFinal` until the next one starts; a
/// cycle that failed stays in the state it reached before the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    HasPendingPose,
    RenderedPerspective,
    RenderedFinal,
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    /// The tracker has not consumed the last perspective frame yet
    Backpressured,
    /// Both images were rendered
    Rendered {
        /// Pose consumed this cycle, if any
        pose: Option<HeadPose>,
        /// Corners published this cycle; `None` when projection failed
        corners: Option<CornerSet>,
    },
}

/// Render loop over a backend and the renderer's side of the mailbox
pub struct RenderLoop<B, P = JsonSlot<PoseMessage>, C = JsonSlot<CornerMessage>> {
    scene: SceneContext,
    backend: B,
    pose: P,
    corners: C,
    perspective: ImageSlot,
    composite: ImageSlot,
    state: RenderState,
}

impl<B: RenderBackend> RenderLoop<B> {
    /// Wire the loop to the file mailbox
    #[must_use]
    pub fn from_mailbox(scene: SceneContext, backend: B, mailbox: Mailbox) -> Self {
        let Mailbox {
            pose,
            corners,
            perspective,
            composite,
            ..
        } = mailbox;
        Self::new(scene, backend, pose, corners, perspective, composite)
    }
}

impl<B, P, C> RenderLoop<B, P, C>
where
    B: RenderBackend,
    P: Slot<PoseMessage>,
    C: Slot<CornerMessage>,
{
    #[must_use]
    pub fn new(scene: SceneContext, backend: B, pose: P, corners: C, perspective: ImageSlot, composite: ImageSlot) -> Self {
        Self {
            scene,
            backend,
            pose,
            corners,
            perspective,
            composite,
            state: RenderState::Idle,
        }
    }

    #[must_use]
    pub fn scene(&self) -> &SceneContext {
        &self.scene
    }

    #[must_use]
    pub fn state(&self) -> RenderState {
        self.state
    }

    fn advance(&mut self, next: RenderState) {
        trace!("Render state {:?} -> {next:?}", self.state);
        self.state = next;
    }

    /// Publish the current corners, or clear the slot if they cannot be computed
    fn publish_corners(&mut self) -> Result<Option<CornerSet>> {
        match self.scene.screen_corners() {
            Ok(corners) => {
                self.corners.publish(&CornerMessage::from(&corners))?;
                Ok(Some(corners))
            }
            Err(e) => {
                warn!("Screen corners unavailable, clearing corner slot: {e}");
                self.corners.clear()?;
                Ok(None)
            }
        }
    }

    fn render_perspective(&mut self) -> Result<()> {
        self.scene.screen_visible = false;
        self.scene.active = CameraRole::Perspective;
        let (scene, backend) = (&self.scene, &mut self.backend);
        self.perspective.publish_with(|path| backend.render(scene, path))
    }

    fn render_final(&mut self) -> Result<()> {
        self.scene.screen_visible = true;
        self.scene.active = CameraRole::Straight;
        let (scene, backend) = (&self.scene, &mut self.backend);
        self.composite.publish_with(|path| backend.render(scene, path))
    }

    /// Startup render: corners and a perspective frame for the initial pose
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox or the backend fails.
    pub fn prime(&mut self) -> Result<()> {
        info!("Priming mailbox at eye position {:?}", self.scene.perspective.position);
        self.advance(RenderState::Idle);
        self.publish_corners()?;
        self.render_perspective()?;
        self.advance(RenderState::RenderedPerspective);
        self.render_final()?;
        self.advance(RenderState::RenderedFinal);
        Ok(())
    }

    /// Run one render cycle.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` for an invalid pose message, and propagates
    /// mailbox and backend failures.
    pub fn tick(&mut self) -> Result<RenderOutcome> {
        if self.perspective.is_full() {
            trace!("Perspective frame still pending, skipping tick");
            return Ok(RenderOutcome::Backpressured);
        }
        self.advance(RenderState::Idle);

        let pose = self.pose.take()?.map(HeadPose::from);
        if let Some(pose) = pose {
            self.advance(RenderState::HasPendingPose);
            debug!("Consumed head pose {pose:?}");
            self.scene.apply_pose(pose);
        }

        let corners = self.publish_corners()?;

        self.render_perspective()?;
        self.advance(RenderState::RenderedPerspective);

        self.render_final()?;
        self.advance(RenderState::RenderedFinal);

        Ok(RenderOutcome::Rendered { pose, corners })
    }

    /// Prime, then tick at the loop's pace until shutdown.
    ///
    /// # Errors
    ///
    /// Returns the first error from priming or any tick.
    pub fn run(&mut self, pacing: PacedLoop, shutdown: &AtomicBool) -> Result<u64> {
        self.prime()?;
        info!("Render loop running every {:?}", pacing.interval());
        pacing.run(shutdown, || {
            self.tick()?;
            Ok(ControlFlow::Continue(()))
        })
    }
}
