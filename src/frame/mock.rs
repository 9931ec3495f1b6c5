// In-memory device, presentation engine and surface for tests
//
// The mocks model queue ordering, not pixels: submissions stay pending
// until someone waits on their fence (or the device idles), and every
// protocol violation the real driver would turn into undefined behavior
// panics here instead.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::gpu::{
    ChainConfig, DrawableSurface, FrameSubmission, GpuDevice, PresentationEngine, RenderPassBegin,
    SurfaceSupport,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    WaitIdle,
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    DestroyFence(vk::Fence),
    DestroySemaphore(vk::Semaphore),
    BeginCommands(vk::CommandBuffer),
    BeginRenderPass(vk::Framebuffer),
    ClearRect,
    EndRenderPass,
    EndCommands(vk::CommandBuffer),
    Submit(FrameSubmission),
    CreateChain(ChainConfig),
    DestroyChain(vk::SwapchainKHR),
    Acquire(vk::Semaphore),
    Present(u32),
}

#[derive(Default)]
struct GpuState {
    next_handle: u64,
    fences: HashMap<vk::Fence, bool>,
    semaphores: HashMap<vk::Semaphore, bool>,
    command_pools: Vec<vk::CommandPool>,
    render_passes: Vec<vk::RenderPass>,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    pending: VecDeque<FrameSubmission>,
    submissions: usize,
    max_in_flight: usize,
    defer_completion: bool,
    blocked_waits: usize,
    fail_creation: Option<(u32, vk::Result)>,
    fail_submit: Option<vk::Result>,
    viewports: Vec<vk::Viewport>,
    scissors: Vec<vk::Rect2D>,
    calls: Vec<Call>,
}

impl GpuState {
    fn handle<H: Handle>(&mut self) -> H {
        self.next_handle += 1;
        H::from_raw(self.next_handle)
    }

    /// Counts down scripted creation failures
    fn creation(&mut self) -> VkResult<()> {
        match self.fail_creation.take() {
            Some((0, result)) => Err(result),
            Some((remaining, result)) => {
                self.fail_creation = Some((remaining - 1, result));
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn is_pending_fence(&self, fence: vk::Fence) -> bool {
        self.pending.iter().any(|s| s.fence == fence)
    }

    /// Retire pending submissions in queue order, up to and including `fence`
    fn complete_through(&mut self, fence: vk::Fence) {
        while let Some(submission) = self.pending.pop_front() {
            self.fences.insert(submission.fence, true);
            if submission.fence == fence {
                break;
            }
        }
    }

    fn complete_all(&mut self) {
        while let Some(submission) = self.pending.pop_front() {
            self.fences.insert(submission.fence, true);
        }
    }
}

#[derive(Default)]
pub struct MockGpu {
    state: Mutex<GpuState>,
    completed: Condvar,
}

impl MockGpu {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn live_fences(&self) -> usize {
        self.state.lock().fences.len()
    }

    pub fn live_semaphores(&self) -> usize {
        self.state.lock().semaphores.len()
    }

    pub fn live_command_pools(&self) -> usize {
        self.state.lock().command_pools.len()
    }

    pub fn live_render_passes(&self) -> usize {
        self.state.lock().render_passes.len()
    }

    pub fn live_views(&self) -> usize {
        self.state.lock().views.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.lock().framebuffers.len()
    }

    pub fn fail_next_creation(&self, result: vk::Result) {
        self.fail_creation_after(0, result);
    }

    /// Let `successes` object creations through, then fail one
    pub fn fail_creation_after(&self, successes: u32, result: vk::Result) {
        self.state.lock().fail_creation = Some((successes, result));
    }

    pub fn fail_next_submit(&self, result: vk::Result) {
        self.state.lock().fail_submit = Some(result);
    }

    /// Stop retiring work on fence waits; waiters block until `release`
    pub fn defer_completion(&self) {
        self.state.lock().defer_completion = true;
    }

    pub fn release(&self) {
        let mut state = self.state.lock();
        state.defer_completion = false;
        state.complete_all();
        self.completed.notify_all();
    }

    pub fn blocked_waits(&self) -> usize {
        self.state.lock().blocked_waits
    }

    pub fn pending_submissions(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn submissions(&self) -> usize {
        self.state.lock().submissions
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    pub fn viewports(&self) -> Vec<vk::Viewport> {
        self.state.lock().viewports.clone()
    }

    pub fn scissors(&self) -> Vec<vk::Rect2D> {
        self.state.lock().scissors.clone()
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }

    fn next_handle<H: Handle>(&self) -> H {
        self.state.lock().handle()
    }

    fn signal_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state.lock();
        let signaled = state
            .semaphores
            .get_mut(&semaphore)
            .unwrap_or_else(|| panic!("signal on unknown semaphore {:?}", semaphore));
        assert!(!*signaled, "semaphore {:?} signaled twice without a wait", semaphore);
        *signaled = true;
    }

    fn consume_semaphore(&self, semaphore: vk::Semaphore, must_be_signaled: bool) {
        let mut state = self.state.lock();
        let signaled = state
            .semaphores
            .get_mut(&semaphore)
            .unwrap_or_else(|| panic!("wait on unknown semaphore {:?}", semaphore));
        assert!(
            *signaled || !must_be_signaled,
            "wait on semaphore {:?} that nothing signals",
            semaphore
        );
        *signaled = false;
    }
}

impl GpuDevice for MockGpu {
    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut state = self.state.lock();
        state.creation()?;
        let semaphore = state.handle();
        state.semaphores.insert(semaphore, false);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state.lock();
        assert!(
            state.semaphores.remove(&semaphore).is_some(),
            "double destroy of semaphore {:?}",
            semaphore
        );
        state.calls.push(Call::DestroySemaphore(semaphore));
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state.lock();
        state.creation()?;
        let fence = state.handle();
        state.fences.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        assert!(
            !state.is_pending_fence(fence),
            "fence {:?} destroyed while its submission is pending",
            fence
        );
        assert!(
            state.fences.remove(&fence).is_some(),
            "double destroy of fence {:?}",
            fence
        );
        state.calls.push(Call::DestroyFence(fence));
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::WaitFence(fence));

        let signaled = *state
            .fences
            .get(&fence)
            .unwrap_or_else(|| panic!("wait on unknown fence {:?}", fence));
        if signaled {
            return Ok(());
        }
        assert!(
            state.is_pending_fence(fence),
            "wait on fence {:?} that no submission will signal",
            fence
        );

        if state.defer_completion {
            state.blocked_waits += 1;
            while !state.fences.get(&fence).copied().unwrap_or(true) {
                self.completed.wait(&mut state);
            }
        } else {
            state.complete_through(fence);
        }
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::ResetFence(fence));
        assert!(
            !state.is_pending_fence(fence),
            "reset of fence {:?} while its submission is pending",
            fence
        );
        state.fences.insert(fence, false);
        Ok(())
    }

    fn fence_signaled(&self, fence: vk::Fence) -> VkResult<bool> {
        Ok(self.state.lock().fences.get(&fence).copied().unwrap_or(false))
    }

    fn create_command_pool(&self) -> VkResult<vk::CommandPool> {
        let mut state = self.state.lock();
        state.creation()?;
        let pool = state.handle();
        state.command_pools.push(pool);
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.state.lock().command_pools.retain(|p| *p != pool);
    }

    fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        state.creation()?;
        Ok((0..count).map(|_| state.handle()).collect())
    }

    fn create_render_pass(&self, _format: vk::Format) -> VkResult<vk::RenderPass> {
        let mut state = self.state.lock();
        state.creation()?;
        let render_pass = state.handle();
        state.render_passes.push(render_pass);
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state.lock().render_passes.retain(|r| *r != render_pass);
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> VkResult<vk::ImageView> {
        let mut state = self.state.lock();
        state.creation()?;
        let view = state.handle();
        state.views.push(view);
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.lock().views.retain(|v| *v != view);
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let mut state = self.state.lock();
        state.creation()?;
        let framebuffer = state.handle();
        state.framebuffers.push(framebuffer);
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state.lock().framebuffers.retain(|f| *f != framebuffer);
    }

    fn begin_commands(&self, commands: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.state.lock();
        assert!(
            !state.pending.iter().any(|s| s.commands == commands),
            "command buffer {:?} re-recorded while the GPU still reads it",
            commands
        );
        state.calls.push(Call::BeginCommands(commands));
        Ok(())
    }

    fn begin_render_pass(&self, _commands: vk::CommandBuffer, pass: &RenderPassBegin) {
        self.record(Call::BeginRenderPass(pass.framebuffer));
    }

    fn set_viewport(&self, _commands: vk::CommandBuffer, viewport: vk::Viewport) {
        self.state.lock().viewports.push(viewport);
    }

    fn set_scissor(&self, _commands: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.state.lock().scissors.push(scissor);
    }

    fn clear_rect(&self, _commands: vk::CommandBuffer, _rect: vk::Rect2D, _color: [f32; 4]) {
        self.record(Call::ClearRect);
    }

    fn end_render_pass(&self, _commands: vk::CommandBuffer) {
        self.record(Call::EndRenderPass);
    }

    fn end_commands(&self, commands: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::EndCommands(commands));
        Ok(())
    }

    fn submit(&self, submission: &FrameSubmission) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Submit(*submission));
        if let Some(result) = state.fail_submit.take() {
            return Err(result);
        }

        assert_eq!(
            state.fences.get(&submission.fence),
            Some(&false),
            "submission fence must exist and be reset"
        );
        assert!(!state.is_pending_fence(submission.fence));

        let wait = state
            .semaphores
            .get_mut(&submission.wait)
            .expect("submission waits on unknown semaphore");
        assert!(*wait, "submission waits on a semaphore nothing signaled");
        *wait = false;

        let signal = state
            .semaphores
            .get_mut(&submission.signal)
            .expect("submission signals unknown semaphore");
        assert!(!*signal, "present-ready semaphore signaled twice");
        *signal = true;

        state.pending.push_back(*submission);
        state.submissions += 1;
        state.max_in_flight = state.max_in_flight.max(state.pending.len());
        Ok(())
    }

    fn wait_idle(&self) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::WaitIdle);
        if state.defer_completion {
            state.blocked_waits += 1;
            while !state.pending.is_empty() {
                self.completed.wait(&mut state);
            }
        } else {
            state.complete_all();
        }
        Ok(())
    }
}

struct EngineState {
    support: SurfaceSupport,
    chains: Vec<(vk::SwapchainKHR, Vec<vk::Image>)>,
    created: Vec<ChainConfig>,
    acquire_script: VecDeque<VkResult<(u32, bool)>>,
    present_script: VecDeque<VkResult<bool>>,
    next_image: u32,
}

pub struct MockEngine {
    gpu: Arc<MockGpu>,
    state: Mutex<EngineState>,
}

impl MockEngine {
    /// Unbounded image count above a minimum of 2, sentinel extent, and a
    /// non-preferred format listed first.
    pub fn new(gpu: Arc<MockGpu>) -> Arc<Self> {
        let support = SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };

        Arc::new(Self {
            gpu,
            state: Mutex::new(EngineState {
                support,
                chains: Vec::new(),
                created: Vec::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                next_image: 0,
            }),
        })
    }

    pub fn update_capabilities(&self, update: impl FnOnce(&mut vk::SurfaceCapabilitiesKHR)) {
        update(&mut self.state.lock().support.capabilities);
    }

    /// Queue the result of a future acquire, overriding round-robin
    pub fn script_acquire(&self, result: VkResult<(u32, bool)>) {
        self.state.lock().acquire_script.push_back(result);
    }

    pub fn script_present(&self, result: VkResult<bool>) {
        self.state.lock().present_script.push_back(result);
    }

    pub fn created_chains(&self) -> Vec<ChainConfig> {
        self.state.lock().created.clone()
    }

    pub fn live_chains(&self) -> usize {
        self.state.lock().chains.len()
    }
}

impl PresentationEngine for MockEngine {
    fn capabilities(&self) -> VkResult<SurfaceSupport> {
        Ok(self.state.lock().support.clone())
    }

    fn create_chain(&self, config: &ChainConfig) -> VkResult<vk::SwapchainKHR> {
        let handle: vk::SwapchainKHR = self.gpu.next_handle();
        let images: Vec<vk::Image> = (0..config.image_count)
            .map(|_| self.gpu.next_handle())
            .collect();

        let mut state = self.state.lock();
        assert!(
            state.chains.is_empty(),
            "new chain created while the old one is alive"
        );
        state.chains.push((handle, images));
        state.created.push(*config);
        state.next_image = 0;
        drop(state);

        self.gpu.record(Call::CreateChain(*config));
        Ok(handle)
    }

    fn chain_images(&self, chain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.state
            .lock()
            .chains
            .iter()
            .find(|(handle, _)| *handle == chain)
            .map(|(_, images)| images.clone())
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)
    }

    fn destroy_chain(&self, chain: vk::SwapchainKHR) {
        self.state.lock().chains.retain(|(handle, _)| *handle != chain);
        self.gpu.record(Call::DestroyChain(chain));
    }

    fn acquire_next_image(
        &self,
        chain: vk::SwapchainKHR,
        _timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        self.gpu.record(Call::Acquire(signal));

        let mut state = self.state.lock();
        let count = state
            .chains
            .iter()
            .find(|(handle, _)| *handle == chain)
            .map(|(_, images)| images.len() as u32)
            .unwrap_or_else(|| panic!("acquire on dead chain {:?}", chain));
        let result = state.acquire_script.pop_front().unwrap_or_else(|| {
            let index = state.next_image % count;
            Ok((index, false))
        });
        if result.is_ok() {
            state.next_image += 1;
        }
        drop(state);

        // Suboptimal acquires still hand out an image and signal
        if result.is_ok() {
            self.gpu.signal_semaphore(signal);
        }
        result
    }

    fn present(
        &self,
        chain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        self.gpu.record(Call::Present(image_index));

        let mut state = self.state.lock();
        assert!(
            state.chains.iter().any(|(handle, _)| *handle == chain),
            "present on dead chain {:?}",
            chain
        );
        let result = state.present_script.pop_front().unwrap_or(Ok(false));
        drop(state);

        self.gpu.consume_semaphore(wait, result.is_ok());
        result
    }
}

/// Drawable size that tests can script frame by frame
pub struct MockSurface {
    size: Mutex<vk::Extent2D>,
    script: Mutex<VecDeque<vk::Extent2D>>,
    polls: AtomicUsize,
}

impl MockSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Mutex::new(vk::Extent2D { width, height }),
            script: Mutex::new(VecDeque::new()),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, width: u32, height: u32) {
        *self.size.lock() = vk::Extent2D { width, height };
    }

    /// Sizes returned by the next polls, in order. The last one sticks.
    /// Resets the poll counter.
    pub fn script(&self, sizes: &[vk::Extent2D]) {
        self.script.lock().extend(sizes.iter().copied());
        self.polls.store(0, Ordering::SeqCst);
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl DrawableSurface for MockSurface {
    fn drawable_size(&self) -> vk::Extent2D {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.lock().pop_front() {
            *self.size.lock() = next;
        }
        *self.size.lock()
    }
}
