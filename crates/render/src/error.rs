use crate::shader::ShaderStage;
use spincube_scene::MeshError;

/// Errors from graphics setup and submission.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("graphics context creation failed: {0}")]
    ContextCreationFailed(String),
    #[error("{stage} shader compile failed: {log}")]
    ShaderCompileFailed { stage: ShaderStage, log: String },
    #[error("program link failed: {0}")]
    ProgramLinkFailed(String),
    #[error("uniform `{0}` not found in program")]
    UniformNotFound(String),
    #[error("vertex attribute `{0}` not found in program")]
    AttributeNotFound(String),
    #[error("invalid vertex data: {0}")]
    InvalidVertexData(#[from] MeshError),
    #[error("invalid vertex layout: {0}")]
    InvalidVertexLayout(String),
    #[error("invalid texture: {0}")]
    InvalidTexture(String),
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u32 },
    #[error("surface error: {0}")]
    Surface(String),
}
