//! Outline rasterization interface and its swash-backed implementation.
//!
//! The engine consumes the rasterization library through the [`RasterBackend`]
//! and [`Face`] traits; everything above this module is backend-agnostic.
//! The production backend pairs ttf-parser (parsing, charmap, face metrics)
//! with swash (outline scaling and rendering).

use std::sync::Arc;

use swash::scale::{Render, ScaleContext, Source, StrikeWith};
use swash::zeno::Format;

use crate::{Result, TextError};

/// Bitmap and metrics for one rasterized glyph.
///
/// `bitmap` holds `width * rows` single-channel coverage bytes. A glyph with
/// no visible pixels (space) has an empty bitmap but still carries a valid
/// advance.
#[derive(Debug, Clone, Default)]
pub struct RasterizedGlyph {
    pub bitmap: Vec<u8>,
    pub width: u32,
    pub rows: u32,
    /// Horizontal offset from the pen origin to the bitmap's left edge.
    pub left: i32,
    /// Vertical offset from the baseline to the bitmap's top edge.
    pub top: i32,
    /// Pen movement after this glyph, in pixels.
    pub advance: f32,
}

/// Face-level metrics in font units.
#[derive(Debug, Clone)]
pub struct FaceMetrics {
    pub units_per_em: u16,
    pub ascender: i16,
    pub descender: i16,
    pub line_gap: i16,
    pub glyph_count: u16,
    pub family_name: String,
}

/// One opened font face.
///
/// The character size is face state, not call state: it must be applied with
/// [`Face::set_char_size`] before rasterizing, and re-applied whenever
/// another user may have changed it in between (shared fallback faces).
pub trait Face: Send {
    /// Apply a character size. `size` is a point size; the effective pixel
    /// size is scaled by `dpi / 72`.
    fn set_char_size(&mut self, size: u32, dpi: u32);

    /// Glyph index for a codepoint; 0 means this face does not cover it.
    fn glyph_index(&self, codepoint: char) -> u32;

    /// Load and rasterize one glyph at the current character size.
    ///
    /// With `antialias` off, coverage is thresholded to fully-on/fully-off.
    fn load_and_rasterize(&mut self, glyph_index: u32, antialias: bool) -> Result<RasterizedGlyph>;

    fn metrics(&self) -> &FaceMetrics;
}

/// Opens faces from raw font bytes.
pub trait RasterBackend: Send + Sync {
    fn open_face(&self, data: Arc<Vec<u8>>) -> Result<Box<dyn Face>>;
}

/// Production backend: ttf-parser for face queries, swash for rasterization.
#[derive(Debug, Default)]
pub struct SwashBackend;

impl SwashBackend {
    pub fn new() -> Self {
        Self
    }
}

impl RasterBackend for SwashBackend {
    fn open_face(&self, data: Arc<Vec<u8>>) -> Result<Box<dyn Face>> {
        let metrics = {
            let face = ttf_parser::Face::parse(&data, 0)
                .map_err(|e| TextError::FaceParse(format!("{e}")))?;

            let family_name = face
                .names()
                .into_iter()
                .find(|n| n.name_id == ttf_parser::name_id::FAMILY)
                .and_then(|n| n.to_string())
                .unwrap_or_else(|| "Unknown".to_string());

            FaceMetrics {
                units_per_em: face.units_per_em(),
                ascender: face.ascender(),
                descender: face.descender(),
                line_gap: face.line_gap(),
                glyph_count: face.number_of_glyphs(),
                family_name,
            }
        };

        // Reject data swash cannot scale before handing the face out.
        if swash::FontRef::from_index(&data, 0).is_none() {
            return Err(TextError::FaceParse("font data not scalable".to_string()));
        }

        Ok(Box::new(SwashFace {
            data,
            metrics,
            context: ScaleContext::new(),
            pixel_size: 0.0,
        }))
    }
}

/// A face opened by [`SwashBackend`].
struct SwashFace {
    /// Raw font file bytes (kept alive for ttf-parser and swash borrowing).
    data: Arc<Vec<u8>>,
    metrics: FaceMetrics,
    /// Swash scale context (caches scaling state per face).
    context: ScaleContext,
    /// Effective pixel size from the last `set_char_size`.
    pixel_size: f32,
}

impl Face for SwashFace {
    fn set_char_size(&mut self, size: u32, dpi: u32) {
        self.pixel_size = size as f32 * dpi as f32 / 72.0;
    }

    fn glyph_index(&self, codepoint: char) -> u32 {
        // Re-parsing reads only the table directory; glyph lookups are not
        // hot enough here to justify caching a self-referential face.
        ttf_parser::Face::parse(&self.data, 0)
            .ok()
            .and_then(|face| face.glyph_index(codepoint))
            .map_or(0, |id| u32::from(id.0))
    }

    fn load_and_rasterize(&mut self, glyph_index: u32, antialias: bool) -> Result<RasterizedGlyph> {
        debug_assert!(self.pixel_size > 0.0, "set_char_size must run before rasterizing");

        let font = swash::FontRef::from_index(&self.data, 0)
            .ok_or_else(|| TextError::Rasterize("font data not scalable".to_string()))?;
        let glyph_id = glyph_index as u16;

        // Advance comes from the font's own metrics, scaled to pixels.
        let metrics = font.metrics(&[]);
        let glyph_metrics = font.glyph_metrics(&[]);
        let scale = self.pixel_size / metrics.units_per_em as f32;
        let advance = glyph_metrics.advance_width(glyph_id) * scale;

        let mut scaler = self
            .context
            .builder(font)
            .size(self.pixel_size)
            .hint(true)
            .build();

        let mut render = Render::new(&[
            Source::ColorOutline(0),
            Source::ColorBitmap(StrikeWith::BestFit),
            Source::Outline,
        ]);
        render.format(Format::Alpha);

        match render.render(&mut scaler, glyph_id) {
            Some(image) => {
                let mut bitmap = image.data;
                if !antialias {
                    for coverage in &mut bitmap {
                        *coverage = if *coverage >= 128 { 255 } else { 0 };
                    }
                }
                Ok(RasterizedGlyph {
                    bitmap,
                    width: image.placement.width,
                    rows: image.placement.height,
                    left: image.placement.left,
                    top: image.placement.top,
                    advance,
                })
            }
            // No image means an empty glyph (space): advance only.
            None => Ok(RasterizedGlyph {
                advance,
                ..RasterizedGlyph::default()
            }),
        }
    }

    fn metrics(&self) -> &FaceMetrics {
        &self.metrics
    }
}
