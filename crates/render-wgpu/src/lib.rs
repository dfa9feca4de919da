//! wgpu backend for spincube.
//!
//! [`WgpuBackend`] implements the GL-shaped `GraphicsBackend` contract on top
//! of wgpu: programs become pipeline layouts, uniforms become bind groups, and
//! draws are queued until `present` encodes the frame.
//!
//! # Invariants
//! - A draw sees the uniform values current when it was issued.
//! - `clear` discards draws queued earlier in the same frame.
//! - Released handles are never reused.

mod context;
mod gpu;

pub use context::{GpuContext, SurfaceErrorAction};
pub use gpu::WgpuBackend;
