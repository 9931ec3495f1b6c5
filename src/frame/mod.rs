// Frame core - pacing, presentation chain lifecycle and frame protocol
//
// Backend-agnostic: everything here talks to the GPU through the traits in
// `gpu`, so the whole protocol runs against `mock` in tests.

pub mod chain;
pub mod error;
pub mod gpu;
pub mod orchestrator;
pub mod renderer;
pub mod ring;
pub mod sync;
pub mod viewport;

#[cfg(test)]
pub(crate) mod mock;

pub use chain::ChainPolicy;
pub use gpu::{
    ChainConfig, DrawableSurface, FrameSubmission, GpuDevice, PresentationEngine, RenderPassBegin,
    SurfaceSupport,
};
pub use renderer::{FrameOutcome, FrameSettings, Renderer};
