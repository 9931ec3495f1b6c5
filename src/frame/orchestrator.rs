// Frame orchestration - drives one frame through the ring and the chain
//
// FRAME TIMELINE:
// ┌──────────────────────────────────────────────────────────────────────┐
// │ throttle ─> acquire ─> record ─> submit ─> present ─> advance         │
// │                                                                      │
// │ (CPU waits  (GPU signals  (scene    (GPU      (engine   (next slot)   │
// │  on slot     image_acquired) code)   works)    shows)                 │
// │  fence)                                                              │
// └──────────────────────────────────────────────────────────────────────┘
//
// The orchestrator owns only its cursor and state. Ring and chain are
// borrowed per call; the root `Renderer` owns them.

use ash::vk;
use std::sync::Arc;

use super::chain::PresentationChain;
use super::error::{FrameError, FrameResult};
use super::gpu::{
    ChainStatus, DrawableSurface, FrameSubmission, GpuDevice, PresentationEngine, RenderPassBegin,
};
use super::ring::{FrameCursor, FrameSlotRing};
use super::viewport::Letterbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
    /// A frame failed after its slot fence was reset. That fence will never
    /// signal, so every later call returns the original error.
    Failed,
}

/// What `begin_frame` produced
pub enum FrameStart<D: GpuDevice> {
    /// Record into the context, then hand it to `end_frame`
    Recording(RecordingContext<D>),
    /// The chain was stale; it has been rebuilt and this frame is dropped
    Skipped,
    /// Drawable size is zero; nothing was touched
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEnd {
    Presented,
    /// Presented, but the engine asked for a new chain
    PresentedStale,
}

/// Open command buffer for the current frame. Only exists between
/// `begin_frame` and `end_frame`, inside the chain's render pass.
pub struct RecordingContext<D: GpuDevice> {
    device: Arc<D>,
    commands: vk::CommandBuffer,
    image_index: u32,
    slot_index: usize,
    extent: vk::Extent2D,
    letterbox: Letterbox,
}

impl<D: GpuDevice> RecordingContext<D> {
    pub fn commands(&self) -> vk::CommandBuffer {
        self.commands
    }

    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn viewport(&self) -> vk::Viewport {
        self.letterbox.viewport
    }

    pub fn scissor(&self) -> vk::Rect2D {
        self.letterbox.scissor
    }

    /// Fill the letterboxed region with a flat color
    pub fn clear_viewport(&self, color: [f32; 4]) {
        self.device
            .clear_rect(self.commands, self.letterbox.scissor, color);
    }
}

pub struct FrameOrchestrator {
    cursor: FrameCursor,
    state: FrameState,
    target_aspect: f32,
    clear_color: [f32; 4],
    rebuild_pending: bool,
    frames_presented: u64,
    failure: Option<FrameError>,
}

impl FrameOrchestrator {
    pub fn new(frames_in_flight: usize, target_aspect: f32, clear_color: [f32; 4]) -> Self {
        Self {
            cursor: FrameCursor::new(frames_in_flight),
            state: FrameState::Idle,
            target_aspect,
            clear_color,
            rebuild_pending: false,
            frames_presented: 0,
            failure: None,
        }
    }

    pub fn cursor(&self) -> FrameCursor {
        self.cursor
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn target_aspect(&self) -> f32 {
        self.target_aspect
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    /// Mark the chain stale, e.g. after a window resize
    pub fn request_rebuild(&mut self) {
        self.rebuild_pending = true;
    }

    /// Steps 1-3: throttle, acquire, open the recording.
    pub fn begin_frame<D, P, S>(
        &mut self,
        ring: &mut FrameSlotRing<D>,
        chain: &mut PresentationChain<D, P>,
        surface: &S,
    ) -> FrameResult<FrameStart<D>>
    where
        D: GpuDevice,
        P: PresentationEngine,
        S: DrawableSurface,
    {
        self.expect_state(FrameState::Idle)?;

        // Minimized: no build, no wait, no submission until we see a real size
        let drawable = surface.drawable_size();
        if drawable.width == 0 || drawable.height == 0 {
            return Ok(FrameStart::Suspended);
        }

        if self.rebuild_pending || !chain.is_valid() {
            chain.rebuild(drawable)?;
            self.rebuild_pending = false;
        }

        let device = ring.device().clone();
        let slot = ring.slot(self.cursor);
        let (commands, image_acquired, in_flight) =
            (slot.commands, slot.image_acquired, slot.in_flight);

        // STEP 1: throttle. The fence was attached to this slot's previous
        // submission (or created signaled), so this always returns.
        self.state = FrameState::Acquiring;
        if let Err(e) = in_flight.wait(&*device, u64::MAX) {
            self.state = FrameState::Idle;
            return Err(e);
        }

        // STEP 2: acquire
        let image_index = match chain.acquire_next(&image_acquired) {
            ChainStatus::Ready(index) => index,
            ChainStatus::Stale => {
                log::debug!("Acquire reported a stale chain, rebuilding");
                self.state = FrameState::Idle;
                self.recover_stale_acquire(ring, chain, surface)?;
                return Ok(FrameStart::Skipped);
            }
            ChainStatus::Fatal(result) => {
                self.state = FrameState::Idle;
                return Err(FrameError::device("acquire next image")(result));
            }
        };

        // Committed to submitting: only now may the fence go unsignaled
        if let Err(e) = in_flight.reset(&*device) {
            self.state = FrameState::Idle;
            return Err(e);
        }
        if let Err(e) = self.open_recording(&device, chain, commands, image_index) {
            return Err(self.fail(e));
        }

        // STEP 3: hand the open command buffer to the scene
        self.state = FrameState::Recording;
        let extent = chain.extent();
        Ok(FrameStart::Recording(RecordingContext {
            device,
            commands,
            image_index,
            slot_index: self.cursor.index(),
            extent,
            letterbox: Letterbox::fit(extent, self.target_aspect),
        }))
    }

    /// Steps 4-6: close the recording, submit, present, advance.
    pub fn end_frame<D, P, S>(
        &mut self,
        ring: &FrameSlotRing<D>,
        chain: &mut PresentationChain<D, P>,
        surface: &S,
        context: RecordingContext<D>,
    ) -> FrameResult<FrameEnd>
    where
        D: GpuDevice,
        P: PresentationEngine,
        S: DrawableSurface,
    {
        self.expect_state(FrameState::Recording)?;

        if let Err(e) = self.submit_frame(ring, chain, &context) {
            return Err(self.fail(e));
        }

        // STEP 5: present. The submission is in the queue either way, so a
        // stale present still advances.
        let end = self.present_frame(chain, context.image_index)?;

        // STEP 6: advance
        self.cursor.advance();
        self.frames_presented += 1;
        self.state = FrameState::Idle;

        if end == FrameEnd::PresentedStale {
            log::debug!("Present reported a stale chain, rebuilding");
            self.rebuild_from_surface(chain, surface)?;
        }
        Ok(end)
    }

    /// STEP 4: close the recording and submit it. Recording -> Submitted.
    fn submit_frame<D, P>(
        &mut self,
        ring: &FrameSlotRing<D>,
        chain: &PresentationChain<D, P>,
        context: &RecordingContext<D>,
    ) -> FrameResult<()>
    where
        D: GpuDevice,
        P: PresentationEngine,
    {
        let device = &context.device;
        let slot = ring.slot(self.cursor);

        device.end_render_pass(context.commands);
        device
            .end_commands(context.commands)
            .map_err(FrameError::device("end command buffer"))?;

        let image = chain
            .image(context.image_index)
            .ok_or(FrameError::Device {
                operation: "look up acquired image",
                result: vk::Result::ERROR_UNKNOWN,
            })?;
        let submission = FrameSubmission {
            commands: context.commands,
            wait: slot.image_acquired.handle(),
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal: image.present_ready.handle(),
            fence: slot.in_flight.handle(),
        };
        device
            .submit(&submission)
            .map_err(FrameError::device("queue submit"))?;

        self.state = FrameState::Submitted;
        Ok(())
    }

    /// Submitted -> Presenting. A fatal present leaves the slot usable: its
    /// fence is attached to the submission and will fire.
    fn present_frame<D, P>(
        &mut self,
        chain: &PresentationChain<D, P>,
        image_index: u32,
    ) -> FrameResult<FrameEnd>
    where
        D: GpuDevice,
        P: PresentationEngine,
    {
        self.expect_state(FrameState::Submitted)?;
        self.state = FrameState::Presenting;

        match chain.present(image_index) {
            ChainStatus::Ready(()) => Ok(FrameEnd::Presented),
            ChainStatus::Stale => Ok(FrameEnd::PresentedStale),
            ChainStatus::Fatal(result) => {
                self.state = FrameState::Idle;
                Err(FrameError::device("queue present")(result))
            }
        }
    }

    fn open_recording<D, P>(
        &self,
        device: &Arc<D>,
        chain: &PresentationChain<D, P>,
        commands: vk::CommandBuffer,
        image_index: u32,
    ) -> FrameResult<()>
    where
        D: GpuDevice,
        P: PresentationEngine,
    {
        let Some(image) = chain.image(image_index) else {
            return Err(FrameError::device("look up acquired image")(vk::Result::ERROR_UNKNOWN));
        };
        let extent = chain.extent();

        device
            .begin_commands(commands)
            .map_err(FrameError::device("begin command buffer"))?;
        device.begin_render_pass(
            commands,
            &RenderPassBegin {
                render_pass: chain.render_pass(),
                framebuffer: image.target,
                extent,
                clear_color: self.clear_color,
            },
        );

        let letterbox = Letterbox::fit(extent, self.target_aspect);
        device.set_viewport(commands, letterbox.viewport);
        device.set_scissor(commands, letterbox.scissor);
        Ok(())
    }

    fn recover_stale_acquire<D, P, S>(
        &mut self,
        ring: &mut FrameSlotRing<D>,
        chain: &mut PresentationChain<D, P>,
        surface: &S,
    ) -> FrameResult<()>
    where
        D: GpuDevice,
        P: PresentationEngine,
        S: DrawableSurface,
    {
        if !self.rebuild_from_surface(chain, surface)? {
            // Rebuild deferred, so nothing has idled the device yet
            ring.device()
                .wait_idle()
                .map_err(FrameError::device("device wait idle"))?;
        }
        // Device is idle now; a suboptimal acquire may have left the
        // slot's semaphore signaled with no waiter.
        ring.renew_acquire_signal(self.cursor)
    }

    /// Rebuild against the latest drawable size, or defer while minimized.
    /// Returns whether the rebuild ran.
    fn rebuild_from_surface<D, P, S>(
        &mut self,
        chain: &mut PresentationChain<D, P>,
        surface: &S,
    ) -> FrameResult<bool>
    where
        D: GpuDevice,
        P: PresentationEngine,
        S: DrawableSurface,
    {
        let drawable = surface.drawable_size();
        if drawable.width == 0 || drawable.height == 0 {
            self.rebuild_pending = true;
            return Ok(false);
        }
        chain.rebuild(drawable)?;
        self.rebuild_pending = false;
        Ok(true)
    }

    /// Enter the terminal state, keeping the error for later calls
    fn fail(&mut self, error: FrameError) -> FrameError {
        log::error!("Frame failed after its slot fence was reset: {}", error);
        self.state = FrameState::Failed;
        self.failure = Some(error.clone());
        error
    }

    fn expect_state(&self, expected: FrameState) -> FrameResult<()> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        if self.state != expected {
            return Err(FrameError::OutOfOrder {
                expected,
                found: self.state,
            });
        }
        Ok(())
    }
}
