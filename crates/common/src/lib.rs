//! Shared value types used across the spincube crates.

mod types;

pub use types::{ImageLayoutError, Rgba8Image, BYTES_PER_PIXEL};
