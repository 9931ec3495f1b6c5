// Presentation chain - the rebuildable set of presentable images
//
// One generation = engine chain handle + render pass + one view, framebuffer
// and present-ready semaphore per image. A rebuild throws the whole
// generation away and negotiates a new one from fresh surface capabilities;
// nothing is patched in place.

use ash::vk;
use std::sync::Arc;

use super::error::{FrameError, FrameResult};
use super::gpu::{ChainConfig, ChainStatus, GpuDevice, PresentationEngine, SurfaceSupport};
use super::sync::GpuSignal;

/// Engine reports this extent when the surface size is decided by the chain
pub const ANY_EXTENT: u32 = u32::MAX;

/// Ordered preferences for format and present mode negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPolicy {
    /// First match wins; an empty list or no match takes the engine's first format
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    /// First supported mode wins; FIFO is the guaranteed fallback
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl Default for ChainPolicy {
    fn default() -> Self {
        Self {
            surface_formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            // MAILBOX: no tearing, no vsync-locked cadence
            present_modes: vec![vk::PresentModeKHR::MAILBOX],
        }
    }
}

pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    policy: &ChainPolicy,
) -> FrameResult<vk::SurfaceFormatKHR> {
    policy
        .surface_formats
        .iter()
        .find(|wanted| formats.contains(wanted))
        .or_else(|| formats.first())
        .copied()
        .ok_or(FrameError::NoSurfaceFormat)
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    policy: &ChainPolicy,
) -> vk::PresentModeKHR {
    policy
        .present_modes
        .iter()
        .copied()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO) // FIFO is always supported
}

/// The engine's current extent is authoritative unless it is the sentinel
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, desired: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != ANY_EXTENT {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: desired
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: desired
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// Minimum + 1, clamped to the maximum when the engine has one (0 = no limit)
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

pub fn negotiate(
    support: &SurfaceSupport,
    policy: &ChainPolicy,
    desired: vk::Extent2D,
) -> FrameResult<ChainConfig> {
    Ok(ChainConfig {
        image_count: choose_image_count(&support.capabilities),
        surface_format: choose_surface_format(&support.formats, policy)?,
        present_mode: choose_present_mode(&support.present_modes, policy),
        extent: choose_extent(&support.capabilities, desired),
        pre_transform: support.capabilities.current_transform,
    })
}

/// One slot of the chain. The image belongs to the engine; the rest is ours.
#[derive(Debug, Clone, Copy)]
pub struct PresentableImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub target: vk::Framebuffer,
    /// Signaled by the frame's submission, waited on by present
    pub present_ready: GpuSignal,
}

struct Generation {
    handle: vk::SwapchainKHR,
    config: ChainConfig,
    render_pass: vk::RenderPass,
    images: Vec<PresentableImage>,
}

pub struct PresentationChain<D: GpuDevice, P: PresentationEngine> {
    device: Arc<D>,
    engine: Arc<P>,
    policy: ChainPolicy,
    // None only between a teardown and a successful rebuild
    generation: Option<Generation>,
    rebuilds: u64,
}

impl<D: GpuDevice, P: PresentationEngine> PresentationChain<D, P> {
    pub fn build(
        device: Arc<D>,
        engine: Arc<P>,
        policy: ChainPolicy,
        desired: vk::Extent2D,
    ) -> FrameResult<Self> {
        let mut chain = Self {
            device,
            engine,
            policy,
            generation: None,
            rebuilds: 0,
        };
        chain.create_generation(desired)?;
        Ok(chain)
    }

    /// Drop the current generation and negotiate a new one.
    ///
    /// Waits for the device to go idle first; every image of the old chain may
    /// still be referenced by in-flight work until then.
    pub fn rebuild(&mut self, desired: vk::Extent2D) -> FrameResult<()> {
        ensure_drawable(desired)?;

        self.device
            .wait_idle()
            .map_err(FrameError::device("device wait idle"))?;
        self.destroy_generation();
        self.create_generation(desired)?;
        self.rebuilds += 1;

        log::debug!("Presentation chain rebuilt ({} so far)", self.rebuilds);
        Ok(())
    }

    pub fn acquire_next(&self, signal: &GpuSignal) -> ChainStatus<u32> {
        let Some(generation) = &self.generation else {
            return ChainStatus::Stale;
        };
        ChainStatus::from_acquire(self.engine.acquire_next_image(
            generation.handle,
            u64::MAX,
            signal.handle(),
        ))
    }

    /// Present `image_index` once its present-ready signal fires
    pub fn present(&self, image_index: u32) -> ChainStatus<()> {
        let Some(generation) = &self.generation else {
            return ChainStatus::Stale;
        };
        let Some(image) = generation.images.get(image_index as usize) else {
            return ChainStatus::Fatal(vk::Result::ERROR_UNKNOWN);
        };
        ChainStatus::from_present(self.engine.present(
            generation.handle,
            image_index,
            image.present_ready.handle(),
        ))
    }

    pub fn is_valid(&self) -> bool {
        self.generation.is_some()
    }

    pub fn image(&self, index: u32) -> Option<&PresentableImage> {
        self.generation.as_ref()?.images.get(index as usize)
    }

    pub fn image_count(&self) -> usize {
        self.generation.as_ref().map_or(0, |g| g.images.len())
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.generation
            .as_ref()
            .map_or(vk::RenderPass::null(), |g| g.render_pass)
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.generation
            .as_ref()
            .map_or(vk::Extent2D::default(), |g| g.config.extent)
    }

    pub fn config(&self) -> Option<&ChainConfig> {
        self.generation.as_ref().map(|g| &g.config)
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    fn create_generation(&mut self, desired: vk::Extent2D) -> FrameResult<()> {
        ensure_drawable(desired)?;

        let support = self
            .engine
            .capabilities()
            .map_err(FrameError::device("query surface capabilities"))?;
        let config = negotiate(&support, &self.policy, desired)?;

        let handle = self
            .engine
            .create_chain(&config)
            .map_err(FrameError::device("create swapchain"))?;

        // Install immediately so a failure below is cleaned up by destroy_generation
        self.generation = Some(Generation {
            handle,
            config,
            render_pass: vk::RenderPass::null(),
            images: Vec::new(),
        });

        if let Err(e) = self.populate_generation() {
            self.destroy_generation();
            return Err(e);
        }

        log::info!(
            "Presentation chain: {}x{}, {} images, {:?} / {:?}, {:?}",
            config.extent.width,
            config.extent.height,
            self.image_count(),
            config.surface_format.format,
            config.surface_format.color_space,
            config.present_mode,
        );
        Ok(())
    }

    fn populate_generation(&mut self) -> FrameResult<()> {
        let device = self.device.clone();
        let Some(generation) = self.generation.as_mut() else {
            return Ok(());
        };
        let format = generation.config.surface_format.format;
        let extent = generation.config.extent;

        let images = self
            .engine
            .chain_images(generation.handle)
            .map_err(FrameError::device("get swapchain images"))?;

        generation.render_pass = device
            .create_render_pass(format)
            .map_err(FrameError::device("create render pass"))?;

        for image in images {
            let view = device
                .create_image_view(image, format)
                .map_err(FrameError::device("create image view"))?;
            let target = match device.create_framebuffer(generation.render_pass, view, extent) {
                Ok(target) => target,
                Err(e) => {
                    device.destroy_image_view(view);
                    return Err(FrameError::device("create framebuffer")(e));
                }
            };
            let present_ready = match GpuSignal::new(&*device) {
                Ok(signal) => signal,
                Err(e) => {
                    device.destroy_framebuffer(target);
                    device.destroy_image_view(view);
                    return Err(e);
                }
            };
            generation.images.push(PresentableImage {
                image,
                view,
                target,
                present_ready,
            });
        }
        Ok(())
    }

    /// Release the generation in reverse creation order. Caller has idled the device.
    fn destroy_generation(&mut self) {
        let Some(generation) = self.generation.take() else {
            return;
        };
        for image in generation.images.into_iter().rev() {
            image.present_ready.destroy(&*self.device);
            self.device.destroy_framebuffer(image.target);
            self.device.destroy_image_view(image.view);
        }
        if generation.render_pass != vk::RenderPass::null() {
            self.device.destroy_render_pass(generation.render_pass);
        }
        self.engine.destroy_chain(generation.handle);
    }
}

impl<D: GpuDevice, P: PresentationEngine> Drop for PresentationChain<D, P> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device idle wait failed before releasing presentation chain: {}", e);
        }
        self.destroy_generation();
    }
}

fn ensure_drawable(extent: vk::Extent2D) -> FrameResult<()> {
    if extent.width == 0 || extent.height == 0 {
        return Err(FrameError::ZeroExtent {
            width: extent.width,
            height: extent.height,
        });
    }
    Ok(())
}
