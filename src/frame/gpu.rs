// Collaborator interfaces for the frame core
//
// The core never calls ash directly. It talks to the device, queue and
// presentation engine through these traits; `backend` implements them on top
// of Vulkan and `frame::mock` implements them for tests. Handles are plain
// `vk` handle values so both sides share one vocabulary.

use ash::prelude::VkResult;
use ash::vk;

/// Device-level operations: object creation, command recording and the
/// graphics queue.
pub trait GpuDevice {
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn fence_signaled(&self, fence: vk::Fence) -> VkResult<bool>;

    fn create_command_pool(&self) -> VkResult<vk::CommandPool>;
    /// Also frees every command buffer allocated from the pool
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>>;

    fn create_render_pass(&self, format: vk::Format) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    /// Reset the command buffer and open it for one-time submission
    fn begin_commands(&self, commands: vk::CommandBuffer) -> VkResult<()>;
    fn begin_render_pass(&self, commands: vk::CommandBuffer, pass: &RenderPassBegin);
    fn set_viewport(&self, commands: vk::CommandBuffer, viewport: vk::Viewport);
    fn set_scissor(&self, commands: vk::CommandBuffer, scissor: vk::Rect2D);
    /// Clear a region of the bound color attachment
    fn clear_rect(&self, commands: vk::CommandBuffer, rect: vk::Rect2D, color: [f32; 4]);
    fn end_render_pass(&self, commands: vk::CommandBuffer);
    fn end_commands(&self, commands: vk::CommandBuffer) -> VkResult<()>;

    fn submit(&self, submission: &FrameSubmission) -> VkResult<()>;
    fn wait_idle(&self) -> VkResult<()>;
}

/// The platform presentation engine bound to one drawable surface.
pub trait PresentationEngine {
    fn capabilities(&self) -> VkResult<SurfaceSupport>;
    fn create_chain(&self, config: &ChainConfig) -> VkResult<vk::SwapchainKHR>;
    /// Presentable images belong to the engine; they die with the chain
    fn chain_images(&self, chain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_chain(&self, chain: vk::SwapchainKHR);

    /// `Ok((index, suboptimal))`, as `vkAcquireNextImageKHR` reports it
    fn acquire_next_image(
        &self,
        chain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;

    /// `Ok(suboptimal)`, as `vkQueuePresentKHR` reports it
    fn present(
        &self,
        chain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;
}

/// Windowing-layer view of the drawable area, in physical pixels.
pub trait DrawableSurface {
    fn drawable_size(&self) -> vk::Extent2D;
}

/// Everything the engine reported about the surface
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Negotiated parameters for one chain generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    pub image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

/// One batch on the graphics queue: wait for the acquired image at
/// `wait_stage`, signal the image's present-ready semaphore, then the fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSubmission {
    pub commands: vk::CommandBuffer,
    pub wait: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal: vk::Semaphore,
    pub fence: vk::Fence,
}

/// Classified outcome of an acquire or present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus<T> {
    Ready(T),
    /// Out of date or suboptimal: rebuild, never abort
    Stale,
    Fatal(vk::Result),
}

impl ChainStatus<u32> {
    pub fn from_acquire(result: VkResult<(u32, bool)>) -> Self {
        match result {
            Ok((index, false)) => Self::Ready(index),
            Ok((_, true)) => Self::Stale,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => Self::Stale,
            Err(e) => Self::Fatal(e),
        }
    }
}

impl ChainStatus<()> {
    pub fn from_present(result: VkResult<bool>) -> Self {
        match result {
            Ok(false) => Self::Ready(()),
            Ok(true) => Self::Stale,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => Self::Stale,
            Err(e) => Self::Fatal(e),
        }
    }
}
