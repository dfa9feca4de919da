//! Asset lookup and texture decoding.
//!
//! Assets are looked up by file name in an ordered list of root directories.
//! Textures are decoded with the `image` crate and handed to the renderer as
//! tightly packed RGBA8 only.
//!
//! # Layout
//! Without an explicit root the search order is `./assets`, then `assets/`
//! next to the running executable.

use image::DynamicImage;
use image::flat::SampleLayout;
use spincube_common::{ImageLayoutError, Rgba8Image};
use std::path::{Path, PathBuf};

/// Errors from asset operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to decode image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    UnsupportedImageLayout(#[from] ImageLayoutError),
}

/// Ordered set of directories that assets are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaths {
    roots: Vec<PathBuf>,
}

impl AssetPaths {
    /// An explicit directory replaces the default search order entirely.
    pub fn new(explicit: Option<PathBuf>) -> Self {
        match explicit {
            Some(dir) => Self::from_roots(vec![dir]),
            None => Self::from_roots(Self::default_roots()),
        }
    }

    pub fn from_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    fn default_roots() -> Vec<PathBuf> {
        let mut roots = vec![PathBuf::from("assets")];
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            roots.push(exe_dir.join("assets"));
        }
        roots
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// First existing file called `name` under the roots, in order.
    pub fn resolve(&self, name: impl AsRef<Path>) -> Result<PathBuf, AssetError> {
        let name = name.as_ref();
        for root in &self.roots {
            let candidate = root.join(name);
            if candidate.is_file() {
                tracing::debug!("resolved asset {} -> {}", name.display(), candidate.display());
                return Ok(candidate);
            }
        }
        Err(AssetError::NotFound(name.to_path_buf()))
    }

    /// Resolve and decode a texture in one step.
    pub fn load_texture(&self, name: impl AsRef<Path>) -> Result<Rgba8Image, AssetError> {
        let path = self.resolve(name)?;
        decode_texture(path)
    }
}

/// Decode an image file into packed RGBA8.
pub fn decode_texture(path: impl AsRef<Path>) -> Result<Rgba8Image, AssetError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(AssetError::NotFound(path.to_path_buf()));
    }
    let image = image::open(path).map_err(|source| AssetError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let rgba = rgba_from_dynamic(&image)?;
    tracing::info!(
        "decoded texture {} ({}x{})",
        path.display(),
        rgba.width(),
        rgba.height()
    );
    Ok(rgba)
}

/// Convert any decoded pixel format to RGBA8.
pub fn rgba_from_dynamic(image: &DynamicImage) -> Result<Rgba8Image, AssetError> {
    let rgba = image.to_rgba8();
    let layout = rgba.sample_layout();
    rgba_from_layout(layout, rgba.into_raw())
}

/// Accept raw RGBA8 samples only when rows are tightly packed.
pub fn rgba_from_layout(layout: SampleLayout, samples: Vec<u8>) -> Result<Rgba8Image, AssetError> {
    let image = Rgba8Image::from_raw(layout.width, layout.height, layout.height_stride, samples)?;
    Ok(image)
}

pub fn crate_info() -> &'static str {
    "spincube-assets v0.1.0"
}
