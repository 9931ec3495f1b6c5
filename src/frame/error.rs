// Frame error taxonomy
//
// Staleness is not an error: it travels as `ChainStatus::Stale`.
// Everything here either stops the render loop or reports caller misuse.

use ash::vk;
use thiserror::Error;

use super::orchestrator::FrameState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Non-success result from the device, queue or presentation engine
    #[error("{operation} failed: {result}")]
    Device {
        operation: &'static str,
        result: vk::Result,
    },

    #[error("presentation engine offers no surface formats")]
    NoSurfaceFormat,

    /// A chain was asked to (re)build against a minimized surface
    #[error("drawable surface has zero extent ({width}x{height})")]
    ZeroExtent { width: u32, height: u32 },

    #[error("frame slot ring needs at least one slot")]
    NoFrameSlots,

    #[error("frame call out of order: expected {expected:?}, found {found:?}")]
    OutOfOrder {
        expected: FrameState,
        found: FrameState,
    },
}

impl FrameError {
    pub fn device(operation: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Device { operation, result }
    }

    /// Device failures cannot be retried without rebuilding every GPU object.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Device { .. } | Self::NoSurfaceFormat)
    }
}

pub type FrameResult<T> = std::result::Result<T, FrameError>;
