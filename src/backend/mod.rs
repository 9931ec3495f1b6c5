// Backend module - Vulkan implementation of the frame core's traits
//
// Thin wrapper around ash: device and queues, the swapchain engine, and the
// per-generation render targets.

pub mod device;
pub mod render_pass;
pub mod swapchain;

pub use device::VulkanDevice;
pub use swapchain::VulkanPresenter;
