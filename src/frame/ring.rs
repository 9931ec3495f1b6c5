// Frame slot ring - bounds how far the CPU may run ahead of the GPU
//
// N slots, each with its own command buffer, image-acquired semaphore and
// in-flight fence. N is independent of the presentation image count.

use ash::vk;
use std::sync::Arc;

use super::error::{FrameError, FrameResult};
use super::gpu::GpuDevice;
use super::sync::{GpuSignal, HostSignal};

/// Per-frame resources, reused every N frames
#[derive(Debug)]
pub struct FrameSlot {
    pub commands: vk::CommandBuffer,
    pub image_acquired: GpuSignal,
    pub in_flight: HostSignal,
}

/// Which slot the next frame uses. Only advances after submit + present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCursor {
    index: usize,
    len: usize,
}

impl FrameCursor {
    pub fn new(len: usize) -> Self {
        Self { index: 0, len: len.max(1) }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.len;
    }
}

pub struct FrameSlotRing<D: GpuDevice> {
    device: Arc<D>,
    command_pool: vk::CommandPool,
    slots: Vec<FrameSlot>,
}

impl<D: GpuDevice> FrameSlotRing<D> {
    pub fn new(device: Arc<D>, frames_in_flight: usize) -> FrameResult<Self> {
        if frames_in_flight == 0 {
            return Err(FrameError::NoFrameSlots);
        }

        let command_pool = device
            .create_command_pool()
            .map_err(FrameError::device("create command pool"))?;

        // From here on Drop releases whatever was created if a later step fails
        let mut ring = Self {
            device,
            command_pool,
            slots: Vec::with_capacity(frames_in_flight),
        };

        let buffers = ring
            .device
            .allocate_command_buffers(command_pool, frames_in_flight as u32)
            .map_err(FrameError::device("allocate command buffers"))?;

        for commands in buffers {
            let image_acquired = GpuSignal::new(&*ring.device)?;
            let in_flight = match HostSignal::new(&*ring.device) {
                Ok(fence) => fence,
                Err(e) => {
                    image_acquired.destroy(&*ring.device);
                    return Err(e);
                }
            };
            ring.slots.push(FrameSlot {
                commands,
                image_acquired,
                in_flight,
            });
        }

        log::debug!("Created {} frame slots", frames_in_flight);
        Ok(ring)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Pure lookup, never blocks
    pub fn slot(&self, cursor: FrameCursor) -> &FrameSlot {
        &self.slots[cursor.index() % self.slots.len()]
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Swap the slot's image-acquired semaphore for a fresh one.
    ///
    /// A suboptimal acquire signals the semaphore even though the frame is
    /// abandoned; nothing will ever wait on that signal. Only call this after
    /// a device idle wait.
    pub fn renew_acquire_signal(&mut self, cursor: FrameCursor) -> FrameResult<()> {
        let fresh = GpuSignal::new(&*self.device)?;
        let index = cursor.index() % self.slots.len();
        let stale = std::mem::replace(&mut self.slots[index].image_acquired, fresh);
        stale.destroy(&*self.device);
        Ok(())
    }
}

impl<D: GpuDevice> Drop for FrameSlotRing<D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device idle wait failed before releasing frame slots: {}", e);
        }

        for slot in self.slots.drain(..).rev() {
            slot.in_flight.destroy(&*self.device);
            slot.image_acquired.destroy(&*self.device);
        }
        // Frees the command buffers too
        self.device.destroy_command_pool(self.command_pool);
    }
}
