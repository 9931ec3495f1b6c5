// Synchronization primitives
//
// Semaphores for GPU-GPU ordering, fences for GPU-CPU completion.
// Neither type destroys itself: the owner destroys them after a device idle
// wait, because the GPU may still reference a signal the host has dropped.

use ash::vk;

use super::error::{FrameError, FrameResult};
use super::gpu::GpuDevice;

/// Queue-to-queue ordering signal. The host can neither poll nor wait on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuSignal(vk::Semaphore);

impl GpuSignal {
    pub fn new(device: &impl GpuDevice) -> FrameResult<Self> {
        device
            .create_semaphore()
            .map(Self)
            .map_err(FrameError::device("create semaphore"))
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.0
    }

    pub fn destroy(self, device: &impl GpuDevice) {
        device.destroy_semaphore(self.0);
    }
}

/// Queue-to-host completion signal.
///
/// Created signaled so the first throttle on a fresh slot returns at once.
/// Must be reset by the host before it is attached to another submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSignal(vk::Fence);

impl HostSignal {
    pub fn new(device: &impl GpuDevice) -> FrameResult<Self> {
        device
            .create_fence(true)
            .map(Self)
            .map_err(FrameError::device("create fence"))
    }

    pub fn handle(&self) -> vk::Fence {
        self.0
    }

    /// Block until signaled
    pub fn wait(&self, device: &impl GpuDevice, timeout: u64) -> FrameResult<()> {
        device
            .wait_for_fence(self.0, timeout)
            .map_err(FrameError::device("wait for fence"))
    }

    pub fn reset(&self, device: &impl GpuDevice) -> FrameResult<()> {
        device
            .reset_fence(self.0)
            .map_err(FrameError::device("reset fence"))
    }

    pub fn is_signaled(&self, device: &impl GpuDevice) -> FrameResult<bool> {
        device
            .fence_signaled(self.0)
            .map_err(FrameError::device("get fence status"))
    }

    pub fn destroy(self, device: &impl GpuDevice) {
        device.destroy_fence(self.0);
    }
}
