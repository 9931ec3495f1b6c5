// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Window surface creation
// - Physical device selection (prefer discrete GPU, must present to our surface)
// - Logical device + graphics/present queue creation
// - `GpuDevice` for the frame core

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::prelude::VkResult;
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{CStr, CString};
use std::sync::Arc;

use super::render_pass;
use crate::frame::{FrameSubmission, GpuDevice, RenderPassBegin};

/// Queue families we submit to. Often the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Vulkan handles (destroyed in Drop, not by field order)
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    _entry: Entry,

    // Presentation surface of the window
    pub surface: vk::SurfaceKHR,
    pub surface_loader: khr::Surface,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilies,

    // Debug utils (if validation enabled)
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    pub properties: vk::PhysicalDeviceProperties,
}

impl VulkanDevice {
    /// Create Vulkan device bound to one window surface
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Enable Vulkan validation layers (debug only)
    /// * `display`, `window` - Raw handles of the window we present to
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Create instance
        let instance = Self::create_instance(&entry, app_name, enable_validation, display)?;

        // Step 3: Setup debug messenger if validation enabled
        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        // Step 4: Create the window surface
        let surface_loader = khr::Surface::new(&entry, &instance);
        let surface = unsafe { ash_window::create_surface(&entry, &instance, display, window, None) }
            .context("Failed to create window surface")?;

        // Step 5: Pick physical device (GPU)
        let (physical_device, queue_families) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;

        // Step 6: Create logical device
        let (device, graphics_queue, present_queue) =
            Self::create_logical_device(&instance, physical_device, queue_families)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        if queue_families.is_shared() {
            log::info!("Graphics and present share queue family {}", queue_families.graphics);
        } else {
            log::info!(
                "Graphics queue family {}, present queue family {}",
                queue_families.graphics,
                queue_families.present
            );
        }

        Ok(Arc::new(Self {
            device,
            physical_device,
            instance,
            _entry: entry,
            surface,
            surface_loader,
            graphics_queue,
            present_queue,
            queue_families,
            debug_utils,
            properties,
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        display: RawDisplayHandle,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("frame-pacer")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        // Platform surface extensions for this display, plus debug utils
        let mut extensions = ash_window::enumerate_required_extensions(display)
            .context("Unsupported windowing platform")?
            .to_vec();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        // Validation layers
        let layer_names = if enable_validation {
            vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        // Score each device
        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };

            if !Self::supports_swapchain(instance, device)? {
                continue;
            }

            let Some(families) = Self::find_queue_families(instance, surface_loader, surface, device)?
            else {
                continue;
            };

            // Score device (prefer discrete GPU, then one queue family for both)
            let mut score = match props.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
                _ => 1,
            };
            if families.is_shared() {
                score += 10;
            }

            if score > best_score {
                best_score = score;
                best_device = Some((device, families));
            }
        }

        best_device.ok_or_else(|| anyhow::anyhow!("No GPU can present to this window"))
    }

    fn supports_swapchain(instance: &ash::Instance, device: vk::PhysicalDevice) -> Result<bool> {
        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }?;
        Ok(extensions.iter().any(|ext| {
            (unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }) == khr::Swapchain::name()
        }))
    }

    /// Prefer a family that can do both; otherwise the first of each
    fn find_queue_families(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> Result<Option<QueueFamilies>> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics = None;
        let mut present = None;
        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            let has_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let can_present = unsafe {
                surface_loader.get_physical_device_surface_support(device, index, surface)
            }?;

            if has_graphics && can_present {
                return Ok(Some(QueueFamilies {
                    graphics: index,
                    present: index,
                }));
            }
            if has_graphics && graphics.is_none() {
                graphics = Some(index);
            }
            if can_present && present.is_none() {
                present = Some(index);
            }
        }

        Ok(graphics
            .zip(present)
            .map(|(graphics, present)| QueueFamilies { graphics, present }))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        families: QueueFamilies,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        // Required device extensions
        let extensions = [khr::Swapchain::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };

        Ok((device, graphics_queue, present_queue))
    }
}

impl GpuDevice for VulkanDevice {
    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device.create_semaphore(&semaphore_info, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&fence_info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn fence_signaled(&self, fence: vk::Fence) -> VkResult<bool> {
        unsafe { self.device.get_fence_status(fence) }
    }

    fn create_command_pool(&self) -> VkResult<vk::CommandPool> {
        // Buffers are reset one at a time when their slot comes around
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.queue_families.graphics);
        unsafe { self.device.create_command_pool(&pool_info, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&alloc_info) }
    }

    fn create_render_pass(&self, format: vk::Format) -> VkResult<vk::RenderPass> {
        render_pass::create_render_pass(&self.device, format)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView> {
        render_pass::create_image_view(&self.device, image, format)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        render_pass::create_framebuffer(&self.device, render_pass, view, extent)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn begin_commands(&self, commands: vk::CommandBuffer) -> VkResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .reset_command_buffer(commands, vk::CommandBufferResetFlags::empty())?;
            self.device.begin_command_buffer(commands, &begin_info)
        }
    }

    fn begin_render_pass(&self, commands: vk::CommandBuffer, pass: &RenderPassBegin) {
        let clear_values = [render_pass::clear_value(pass.clear_color)];
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(pass.render_pass)
            .framebuffer(pass.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: pass.extent,
            })
            .clear_values(&clear_values);
        unsafe {
            self.device
                .cmd_begin_render_pass(commands, &begin_info, vk::SubpassContents::INLINE)
        }
    }

    fn set_viewport(&self, commands: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(commands, 0, &[viewport]) }
    }

    fn set_scissor(&self, commands: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(commands, 0, &[scissor]) }
    }

    fn clear_rect(&self, commands: vk::CommandBuffer, rect: vk::Rect2D, color: [f32; 4]) {
        // Zero-area clears are invalid usage
        if rect.extent.width == 0 || rect.extent.height == 0 {
            return;
        }
        let attachment = vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: render_pass::clear_value(color),
        };
        let clear_rect = vk::ClearRect {
            rect,
            base_array_layer: 0,
            layer_count: 1,
        };
        unsafe {
            self.device
                .cmd_clear_attachments(commands, &[attachment], &[clear_rect])
        }
    }

    fn end_render_pass(&self, commands: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(commands) }
    }

    fn end_commands(&self, commands: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(commands) }
    }

    fn submit(&self, submission: &FrameSubmission) -> VkResult<()> {
        let wait_semaphores = [submission.wait];
        let wait_stages = [submission.wait_stage];
        let command_buffers = [submission.commands];
        let signal_semaphores = [submission.signal];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], submission.fence)
        }
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            log::warn!("Device idle wait failed during teardown: {}", e);
        }

        // Cleanup in reverse order; the surface is instance-level
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
