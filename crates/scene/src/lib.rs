//! Scene data for the spinning cube demo: the viewpoint, the cube mesh and the
//! per-frame update state.
//!
//! # Invariants
//! - Viewpoint matrices are pure functions of the viewpoint inputs.
//! - Frame updates take the previous state by value and return the next one;
//!   nothing here touches a graphics context.

pub mod frame;
pub mod mesh;
pub mod viewpoint;

pub use frame::{FrameClock, FrameLoopState, LoopPhase, PhaseError, Spin, SpinError};
pub use mesh::{CUBE_VERTICES, FLOATS_PER_VERTEX, MeshError, VertexData};
pub use viewpoint::{Viewpoint, ViewpointError, ViewpointSettings};
