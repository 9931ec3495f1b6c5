// Swapchain - Window presentation
//
// `PresentationEngine` over VK_KHR_swapchain. Negotiation and image
// bookkeeping live in the frame core; this only forwards to the driver.

use anyhow::Result;
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;
use crate::frame::{ChainConfig, PresentationEngine, SurfaceSupport};

pub struct VulkanPresenter {
    swapchain_loader: khr::Swapchain,
    // Keeps the surface alive as long as any chain built from it
    device: Arc<VulkanDevice>,
}

impl VulkanPresenter {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Arc<Self>> {
        let swapchain_loader = khr::Swapchain::new(&device.instance, &device.device);
        Ok(Arc::new(Self {
            swapchain_loader,
            device,
        }))
    }
}

impl PresentationEngine for VulkanPresenter {
    fn capabilities(&self) -> VkResult<SurfaceSupport> {
        let loader = &self.device.surface_loader;
        let physical_device = self.device.physical_device;
        let surface = self.device.surface;

        unsafe {
            Ok(SurfaceSupport {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: loader.get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }

    fn create_chain(&self, config: &ChainConfig) -> VkResult<vk::SwapchainKHR> {
        let families = self.device.queue_families;
        let family_indices = families.unique();

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.device.surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true);

        // Images are written on one family and presented from another
        let create_info = if families.is_shared() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
    }

    fn chain_images(&self, chain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(chain) }
    }

    fn destroy_chain(&self, chain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(chain, None) }
    }

    fn acquire_next_image(
        &self,
        chain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(chain, timeout, signal, vk::Fence::null())
        }
    }

    fn present(
        &self,
        chain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [chain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue, &present_info)
        }
    }
}
