//! Rendering adapter: a GL-shaped backend interface and everything built on
//! top of it.
//!
//! # Invariants
//! - Objects own their backend handles and give them back on release.
//! - A failed setup step releases whatever the setup acquired before it.
//! - Draw extents come from the CPU-side vertex buffer, never from a constant.
//!
//! Two backends implement [`GraphicsBackend`]: [`RecordingBackend`] here,
//! which compiles shaders for real but records calls instead of drawing, and
//! the wgpu backend in `spincube-render-wgpu`.

pub mod backend;
mod error;
pub mod object;
pub mod recording;
mod scene;
pub mod shader;
pub mod shaders;

pub use backend::{
    Filter, GraphicsBackend, ProgramId, Resource, ShaderId, Slots, TextureId, TextureSampling,
    UniformLocation, VertexAttribute, VertexLayout, VertexStoreId, Wrap,
};
pub use error::RenderError;
pub use object::{Acquisitions, RenderableObject, Uniforms, build_program, render, setup_object};
pub use recording::{Call, RecordingBackend};
pub use scene::{CLEAR_COLOR, Scene, SceneObject, ShaderSources};
pub use shader::{CompiledShader, LinkedProgram, ShaderStage};

pub fn crate_info() -> &'static str {
    "spincube-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
