use std::sync::Arc;

/// Scalars per interleaved vertex: x, y, z, u, v.
pub const FLOATS_PER_VERTEX: usize = 5;

/// Unit cube spanning [-1, 1] on every axis as a 36-vertex triangle list.
#[rustfmt::skip]
pub const CUBE_VERTICES: [f32; 180] = [
    //  X,    Y,    Z,   U,   V
    // +Z face
    -1.0, -1.0,  1.0, 1.0, 0.0,
     1.0, -1.0,  1.0, 0.0, 0.0,
    -1.0,  1.0,  1.0, 1.0, 1.0,
     1.0, -1.0,  1.0, 0.0, 0.0,
     1.0,  1.0,  1.0, 0.0, 1.0,
    -1.0,  1.0,  1.0, 1.0, 1.0,
    // -Z face
    -1.0, -1.0, -1.0, 0.0, 0.0,
    -1.0,  1.0, -1.0, 0.0, 1.0,
     1.0, -1.0, -1.0, 1.0, 0.0,
     1.0, -1.0, -1.0, 1.0, 0.0,
    -1.0,  1.0, -1.0, 0.0, 1.0,
     1.0,  1.0, -1.0, 1.0, 1.0,
    // -X face
    -1.0, -1.0,  1.0, 0.0, 1.0,
    -1.0,  1.0, -1.0, 1.0, 0.0,
    -1.0, -1.0, -1.0, 0.0, 0.0,
    -1.0, -1.0,  1.0, 0.0, 1.0,
    -1.0,  1.0,  1.0, 1.0, 1.0,
    -1.0,  1.0, -1.0, 1.0, 0.0,
    // +X face
     1.0, -1.0,  1.0, 1.0, 1.0,
     1.0, -1.0, -1.0, 1.0, 0.0,
     1.0,  1.0, -1.0, 0.0, 0.0,
     1.0, -1.0,  1.0, 1.0, 1.0,
     1.0,  1.0, -1.0, 0.0, 0.0,
     1.0,  1.0,  1.0, 0.0, 1.0,
    // -Y face
    -1.0, -1.0, -1.0, 0.0, 0.0,
     1.0, -1.0, -1.0, 1.0, 0.0,
    -1.0, -1.0,  1.0, 0.0, 1.0,
     1.0, -1.0, -1.0, 1.0, 0.0,
     1.0, -1.0,  1.0, 1.0, 1.0,
    -1.0, -1.0,  1.0, 0.0, 1.0,
    // +Y face
    -1.0,  1.0, -1.0, 0.0, 0.0,
    -1.0,  1.0,  1.0, 0.0, 1.0,
     1.0,  1.0, -1.0, 1.0, 0.0,
     1.0,  1.0, -1.0, 1.0, 0.0,
    -1.0,  1.0,  1.0, 0.0, 1.0,
     1.0,  1.0,  1.0, 1.0, 1.0,
];

/// Errors from wrapping a flat vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MeshError {
    #[error("vertex buffer is empty")]
    Empty,
    #[error("vertex buffer length {len} is not a multiple of 5")]
    RaggedBuffer { len: usize },
}

/// Interleaved `(x, y, z, u, v)` vertex data.
///
/// Cloning shares the underlying buffer; every GPU upload still gets its own
/// copy on the device side.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexData {
    floats: Arc<[f32]>,
}

impl VertexData {
    pub fn new(floats: impl Into<Arc<[f32]>>) -> Result<Self, MeshError> {
        let floats = floats.into();
        if floats.is_empty() {
            return Err(MeshError::Empty);
        }
        if floats.len() % FLOATS_PER_VERTEX != 0 {
            return Err(MeshError::RaggedBuffer { len: floats.len() });
        }
        Ok(Self { floats })
    }

    pub fn cube() -> Self {
        Self {
            floats: Arc::from(&CUBE_VERTICES[..]),
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.floats
    }

    pub fn len(&self) -> usize {
        self.floats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.floats.is_empty()
    }

    /// Number of vertices, always derived from the buffer length.
    pub fn vertex_count(&self) -> usize {
        self.floats.len() / FLOATS_PER_VERTEX
    }
}
