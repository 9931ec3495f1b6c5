// Renderer - single owner of every frame-core object
//
// IMPORTANT: Field order matters for Drop! The device idle wait runs in
// `Drop::drop` before any field is released, then fields go in declaration
// order: chain (views, framebuffers, engine chain), ring (fences,
// semaphores, command pool), surface, and finally the device handle.

use ash::vk;
use std::sync::Arc;

use super::chain::{ChainPolicy, PresentationChain};
use super::error::{FrameError, FrameResult};
use super::gpu::{DrawableSurface, GpuDevice, PresentationEngine};
use super::orchestrator::{FrameEnd, FrameOrchestrator, FrameStart, FrameState, RecordingContext};
use super::ring::FrameSlotRing;
use super::viewport::aspect_of;

/// Knobs the frame core takes from configuration
#[derive(Debug, Clone)]
pub struct FrameSettings {
    pub frames_in_flight: usize,
    /// None = lock to the aspect of the first chain we build
    pub target_aspect: Option<f32>,
    pub clear_color: [f32; 4],
    pub policy: ChainPolicy,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            target_aspect: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            policy: ChainPolicy::default(),
        }
    }
}

/// Result of one pass through `render_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Presented; the chain has been rebuilt afterwards
    PresentedStale,
    /// Stale acquire: chain rebuilt, nothing submitted
    Skipped,
    /// Zero drawable size: nothing touched
    Suspended,
}

pub struct Renderer<D: GpuDevice, P: PresentationEngine, S: DrawableSurface> {
    orchestrator: FrameOrchestrator,
    chain: PresentationChain<D, P>,
    ring: FrameSlotRing<D>,
    surface: S,
    device: Arc<D>,
}

impl<D, P, S> Renderer<D, P, S>
where
    D: GpuDevice,
    P: PresentationEngine,
    S: DrawableSurface,
{
    /// Build the ring and the first chain. The surface must not be minimized.
    pub fn new(device: Arc<D>, engine: Arc<P>, surface: S, settings: FrameSettings) -> FrameResult<Self> {
        let drawable = surface.drawable_size();
        if drawable.width == 0 || drawable.height == 0 {
            return Err(FrameError::ZeroExtent {
                width: drawable.width,
                height: drawable.height,
            });
        }

        let ring = FrameSlotRing::new(device.clone(), settings.frames_in_flight)?;
        let chain = PresentationChain::build(device.clone(), engine, settings.policy, drawable)?;

        let target_aspect = settings
            .target_aspect
            .filter(|aspect| aspect.is_finite() && *aspect > 0.0)
            .unwrap_or_else(|| aspect_of(chain.extent()));

        log::info!(
            "Frame pacing: {} frames in flight, {} presentable images, target aspect {:.3}",
            ring.len(),
            chain.image_count(),
            target_aspect
        );

        Ok(Self {
            orchestrator: FrameOrchestrator::new(ring.len(), target_aspect, settings.clear_color),
            chain,
            ring,
            surface,
            device,
        })
    }

    /// Open the next frame for recording. Valid until `end_frame`.
    pub fn begin_frame(&mut self) -> FrameResult<FrameStart<D>> {
        self.orchestrator
            .begin_frame(&mut self.ring, &mut self.chain, &self.surface)
    }

    /// Submit, present and advance
    pub fn end_frame(&mut self, context: RecordingContext<D>) -> FrameResult<FrameEnd> {
        self.orchestrator
            .end_frame(&self.ring, &mut self.chain, &self.surface, context)
    }

    /// One full frame with `record` filling the command buffer
    pub fn render_frame<F>(&mut self, record: F) -> FrameResult<FrameOutcome>
    where
        F: FnOnce(&RecordingContext<D>),
    {
        let context = match self.begin_frame()? {
            FrameStart::Recording(context) => context,
            FrameStart::Skipped => return Ok(FrameOutcome::Skipped),
            FrameStart::Suspended => return Ok(FrameOutcome::Suspended),
        };

        record(&context);

        Ok(match self.end_frame(context)? {
            FrameEnd::Presented => FrameOutcome::Presented,
            FrameEnd::PresentedStale => FrameOutcome::PresentedStale,
        })
    }

    /// The surface changed size; rebuild before the next frame
    pub fn request_rebuild(&mut self) {
        self.orchestrator.request_rebuild();
    }

    pub fn current_extent(&self) -> vk::Extent2D {
        self.chain.extent()
    }

    pub fn current_aspect_target(&self) -> f32 {
        self.orchestrator.target_aspect()
    }

    /// A rebuild was requested or deferred and has not run yet
    pub fn rebuild_pending(&self) -> bool {
        self.orchestrator.rebuild_pending()
    }

    pub fn frame_state(&self) -> FrameState {
        self.orchestrator.state()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.ring.len()
    }

    pub fn frames_presented(&self) -> u64 {
        self.orchestrator.frames_presented()
    }

    pub fn chain(&self) -> &PresentationChain<D, P> {
        &self.chain
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn cursor_index(&self) -> usize {
        self.orchestrator.cursor().index()
    }

    /// Block until the GPU has finished everything we submitted
    pub fn drain(&self) -> FrameResult<()> {
        self.device
            .wait_idle()
            .map_err(FrameError::device("device wait idle"))
    }
}

impl<D, P, S> Drop for Renderer<D, P, S>
where
    D: GpuDevice,
    P: PresentationEngine,
    S: DrawableSurface,
{
    fn drop(&mut self) {
        // First action of teardown, before any field is released
        if let Err(e) = self.drain() {
            log::warn!("Device idle wait failed during renderer teardown: {}", e);
        }
        log::info!(
            "Renderer shut down after {} presented frames",
            self.orchestrator.frames_presented()
        );
    }
}
