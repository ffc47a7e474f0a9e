//! Dynamic glyph-atlas text rendering for the Nib UI toolkit
//!
//! This crate turns Unicode text into drawable geometry:
//! - Lazy glyph rasterization (swash) from a primary face, falling back to
//!   a process-wide chain of bundled and discovered system fonts
//! - A shelf-packed texture atlas that transparently rebuilds itself when
//!   it runs out of room mid-session
//! - A per-font glyph metrics cache
//! - Batched vertex/texcoord output so many strings cost one draw call
//! - Greedy word wrapping over the same advance metrics

pub mod atlas;
pub mod fallback;
pub mod font;
pub mod geometry;
pub mod gpu;
pub mod packer;
pub mod raster;
pub mod wrap;

#[cfg(test)]
pub(crate) mod testing;

pub use atlas::{AtlasConfig, AtlasStore};
pub use fallback::{FallbackRegistry, FontSource};
pub use font::{Font, FontOptions, GlyphMetrics, UNKNOWN_CHAR};
pub use geometry::{GeometryBatch, Topology, Vertex};
pub use gpu::{MeshHandle, RenderDevice, TextureHandle};
pub use raster::{Face, FaceMetrics, RasterBackend, RasterizedGlyph, SwashBackend};
pub use wrap::wrap_text;

use thiserror::Error;

/// Text rendering errors
#[derive(Error, Debug)]
pub enum TextError {
    #[error("Failed to load font: {0}")]
    FaceLoad(String),

    #[error("Failed to parse font: {0}")]
    FaceParse(String),

    #[error("Failed to rasterize glyph: {0}")]
    Rasterize(String),

    #[error("Atlas exhausted: {needed} px of glyph area cannot fit a {max}x{max} atlas")]
    AtlasExhausted { needed: usize, max: u32 },
}

pub type Result<T> = std::result::Result<T, TextError>;
