//! Font instance: the public-facing glyph cache and draw orchestrator.
//!
//! A `Font` owns a primary face, one atlas, and a metrics cache keyed by
//! codepoint. Metrics are created lazily: the first request for a codepoint
//! resolves it against the primary face and then the shared fallback chain,
//! rasterizes it, and packs the bitmap into the atlas. When the atlas runs
//! out of room the glyph keeps usable metrics, joins the pending queue, and
//! the whole atlas is rebuilt just before the next geometry build.
//!
//! A `Font` is owned by the render thread; nothing here is synchronized
//! except the shared fallback faces, which carry their own locks.

use std::path::Path;
use std::sync::{Arc, PoisonError};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::atlas::{AtlasConfig, AtlasStore};
use crate::fallback::FallbackRegistry;
use crate::geometry::GeometryBatch;
use crate::gpu::{RenderDevice, TextureHandle};
use crate::raster::{Face, RasterBackend, RasterizedGlyph};
use crate::wrap::wrap_text;
use crate::{Result, TextError};

/// Codepoint substituted whenever no face covers a requested character.
pub const UNKNOWN_CHAR: char = '?';

/// Cached metrics for one (font, codepoint) pair.
///
/// Everything is fixed at resolution time except the atlas position, which
/// is rewritten when the atlas is rebuilt. `atlas_w == 0` means the glyph
/// has no atlas placement: either it has no visible pixels, or its pack is
/// still pending a rebuild.
#[derive(Debug, Clone, Copy)]
pub struct GlyphMetrics {
    pub codepoint: char,
    /// Atlas texel position, valid only while `atlas_w > 0`.
    pub atlas_x: u32,
    pub atlas_y: u32,
    /// Atlas texel size; zero when the glyph is not packed.
    pub atlas_w: u32,
    pub atlas_h: u32,
    /// Horizontal offset from the pen origin to the bitmap's left edge.
    pub left: i32,
    /// Vertical offset from the baseline to the bitmap's top edge.
    pub top: i32,
    /// Bitmap size in pixels.
    pub width: u32,
    pub rows: u32,
    /// Pen movement after this glyph, in pixels.
    pub advance: f32,
    /// Which face produced the glyph: 0 = primary, n = n-th fallback.
    pub font_index: usize,
}

/// Construction parameters for a [`Font`].
#[derive(Debug, Clone)]
pub struct FontOptions {
    /// Point size.
    pub size: u32,
    pub dpi: u32,
    pub antialias: bool,
    /// Strings longer than this (in characters) draw as nothing.
    pub max_draw_chars: usize,
    pub atlas: AtlasConfig,
}

impl Default for FontOptions {
    fn default() -> Self {
        Self {
            size: 16,
            dpi: 96,
            antialias: true,
            max_draw_chars: 65536,
            atlas: AtlasConfig::default(),
        }
    }
}

/// A sized, cached, atlas-backed font.
pub struct Font {
    options: FontOptions,
    primary: Box<dyn Face>,
    fallbacks: Arc<FallbackRegistry>,
    atlas: AtlasStore,
    metrics: FxHashMap<char, GlyphMetrics>,
    /// Codepoints no face covers; cached so the fallback chain is searched
    /// at most once per codepoint.
    missing: FxHashSet<char>,
    /// Codepoints rasterized but not yet packed (atlas was full).
    pending: Vec<char>,
    rebuild_needed: bool,
    /// Last-resort metrics if even the unknown glyph failed to load.
    error_glyph: GlyphMetrics,
    /// Max ascent over the preloaded ASCII range, precomputed.
    height: f32,
    batch: GeometryBatch,
}

impl Font {
    /// Open a font from raw file bytes, preloading printable ASCII.
    pub fn new(
        backend: &dyn RasterBackend,
        fallbacks: Arc<FallbackRegistry>,
        data: Arc<Vec<u8>>,
        options: FontOptions,
    ) -> Result<Self> {
        Self::with_charset(backend, fallbacks, data, options, (' '..='~').collect())
    }

    /// Open a font from a file path, preloading printable ASCII.
    pub fn from_file(
        backend: &dyn RasterBackend,
        fallbacks: Arc<FallbackRegistry>,
        path: &Path,
        options: FontOptions,
    ) -> Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| TextError::FaceLoad(format!("{}: {}", path.display(), e)))?;
        Self::new(backend, fallbacks, Arc::new(data), options)
    }

    /// Open a font and eagerly load `charset` (plus the unknown glyph).
    ///
    /// Failures here are not recoverable: a font that cannot open its
    /// primary face, or whose initial glyph set overflows even a
    /// maximum-sized atlas, never comes into existence.
    pub fn with_charset(
        backend: &dyn RasterBackend,
        fallbacks: Arc<FallbackRegistry>,
        data: Arc<Vec<u8>>,
        options: FontOptions,
        mut charset: Vec<char>,
    ) -> Result<Self> {
        let mut primary = backend.open_face(data)?;
        primary.set_char_size(options.size, options.dpi);

        // Matches the unknown glyph's shape closely enough that layout stays
        // sane even if '?' itself cannot be loaded from any face.
        let error_glyph = GlyphMetrics {
            codepoint: UNKNOWN_CHAR,
            atlas_x: 0,
            atlas_y: 0,
            atlas_w: 0,
            atlas_h: 0,
            left: 0,
            top: 10,
            width: 10,
            rows: 0,
            advance: 10.0,
            font_index: 0,
        };

        let (atlas, _) = AtlasStore::create(&options.atlas, &[])?;
        let mut font = Self {
            options,
            primary,
            fallbacks,
            atlas,
            metrics: FxHashMap::default(),
            missing: FxHashSet::default(),
            pending: Vec::new(),
            rebuild_needed: false,
            error_glyph,
            height: 1.0,
            batch: GeometryBatch::default(),
        };

        charset.push(UNKNOWN_CHAR);
        charset.sort_unstable();
        charset.dedup();
        for ch in charset {
            font.glyph_metrics(ch);
        }
        // The preload started from a minimum-sized atlas; rebuild now so the
        // initial set is packed into one sized for it. Failure here is an
        // initialization failure, unlike the absorbed rebuilds during use.
        if font.rebuild_needed {
            font.rebuild_atlas()?;
        }

        font.height = font
            .metrics
            .values()
            .filter(|m| m.codepoint.is_ascii())
            .map(|m| m.top)
            .max()
            .unwrap_or(1)
            .max(1) as f32;

        Ok(font)
    }

    /// Metrics for one codepoint, loading the glyph on first reference.
    ///
    /// Never fails: codepoints no face covers resolve to the reserved
    /// unknown-glyph entry.
    pub fn glyph_metrics(&mut self, codepoint: char) -> GlyphMetrics {
        if let Some(metrics) = self.metrics.get(&codepoint) {
            return *metrics;
        }
        if self.missing.contains(&codepoint) {
            return self.unknown_metrics();
        }

        match self.rasterize_codepoint(codepoint) {
            Some((font_index, glyph)) => {
                let metrics = self.place_glyph(codepoint, font_index, &glyph);
                self.metrics.insert(codepoint, metrics);
                metrics
            }
            None => {
                self.missing.insert(codepoint);
                self.unknown_metrics()
            }
        }
    }

    /// Whether some face (primary or fallback) covers `codepoint`.
    pub fn has_glyph(&mut self, codepoint: char) -> bool {
        self.glyph_metrics(codepoint);
        self.metrics.contains_key(&codepoint)
    }

    /// Sum of advances; missing codepoints measure as the unknown glyph.
    pub fn measure_width(&mut self, text: &str) -> f32 {
        text.chars().map(|ch| self.glyph_metrics(ch).advance).sum()
    }

    /// Sum of glyph ascents over `text`.
    pub fn measure_height(&mut self, text: &str) -> f32 {
        text.chars()
            .map(|ch| self.glyph_metrics(ch).top as f32)
            .sum()
    }

    /// Split `text` into lines no wider than `max_width` (see
    /// [`crate::wrap::wrap_text`]).
    pub fn wrap(&mut self, text: &str, max_width: f32) -> Vec<String> {
        wrap_text(text, max_width, |ch| self.glyph_metrics(ch).advance)
    }

    /// Draw one string at `position` (pen origin on the baseline).
    ///
    /// Shorthand for a one-entry batch; any entries queued via
    /// [`Self::add_to_batch`] and not yet flushed are discarded.
    pub fn draw_string(
        &mut self,
        device: &mut dyn RenderDevice,
        text: &str,
        position: [f32; 2],
        color: [f32; 4],
    ) {
        self.begin_batch();
        self.add_to_batch(text, position, color);
        self.flush_batch(device);
    }

    /// Start a fresh batch, discarding any queued entries.
    pub fn begin_batch(&mut self) {
        self.batch.begin();
    }

    /// Queue one string for the next [`Self::flush_batch`].
    pub fn add_to_batch(&mut self, text: &str, position: [f32; 2], color: [f32; 4]) {
        self.batch.add(text, position, color);
    }

    /// Build geometry for every queued entry and issue a single draw call.
    pub fn flush_batch(&mut self, device: &mut dyn RenderDevice) {
        let mut batch = std::mem::take(&mut self.batch);
        batch.flush(self, device);
        self.batch = batch;
    }

    /// Precomputed height: the tallest ascent in the preloaded ASCII range.
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Family name of the primary face.
    pub fn family_name(&self) -> &str {
        &self.primary.metrics().family_name
    }

    /// Line height in pixels, from the primary face's design metrics.
    pub fn line_height(&self) -> f32 {
        let metrics = self.primary.metrics();
        let pixel_size = self.options.size as f32 * self.options.dpi as f32 / 72.0;
        let scale = pixel_size / metrics.units_per_em as f32;
        (metrics.ascender as f32 - metrics.descender as f32 + metrics.line_gap as f32) * scale
    }

    pub fn size(&self) -> u32 {
        self.options.size
    }

    pub fn dpi(&self) -> u32 {
        self.options.dpi
    }

    pub fn options(&self) -> &FontOptions {
        &self.options
    }

    pub fn atlas(&self) -> &AtlasStore {
        &self.atlas
    }

    pub(crate) fn sync_atlas(&mut self, device: &mut dyn RenderDevice) -> TextureHandle {
        self.atlas.sync(device)
    }

    /// Run the scheduled atlas rebuild, if any. Called right before
    /// geometry is built; a failed rebuild keeps the old atlas (and the
    /// still-valid coordinates into it) and retries on the next build.
    pub(crate) fn rebuild_if_needed(&mut self) {
        if !self.rebuild_needed {
            return;
        }
        if let Err(err) = self.rebuild_atlas() {
            tracing::error!("atlas rebuild failed, keeping previous atlas: {}", err);
        }
    }

    fn unknown_metrics(&self) -> GlyphMetrics {
        self.metrics
            .get(&UNKNOWN_CHAR)
            .copied()
            .unwrap_or(self.error_glyph)
    }

    /// Search the primary face, then the fallback chain in registry order,
    /// and rasterize from the first face that covers the codepoint.
    ///
    /// `None` covers both "no face has it" and "the owning face failed to
    /// rasterize it"; either way the codepoint is missing, and other glyphs
    /// are unaffected.
    fn rasterize_codepoint(&mut self, codepoint: char) -> Option<(usize, RasterizedGlyph)> {
        let glyph_index = self.primary.glyph_index(codepoint);
        if glyph_index != 0 {
            self.primary.set_char_size(self.options.size, self.options.dpi);
            match self
                .primary
                .load_and_rasterize(glyph_index, self.options.antialias)
            {
                Ok(glyph) => return Some((0, glyph)),
                Err(err) => {
                    tracing::debug!(
                        "failed to rasterize U+{:04X} from primary face: {}",
                        codepoint as u32,
                        err
                    );
                    return None;
                }
            }
        }

        for (index, fallback) in self.fallbacks.faces().iter().enumerate() {
            let mut face = fallback
                .face
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let glyph_index = face.glyph_index(codepoint);
            if glyph_index == 0 {
                continue;
            }
            // Shared face: the size is re-applied under the lock every
            // time, since another font instance may have changed it.
            face.set_char_size(self.options.size, self.options.dpi);
            return match face.load_and_rasterize(glyph_index, self.options.antialias) {
                Ok(glyph) => Some((index + 1, glyph)),
                Err(err) => {
                    tracing::debug!(
                        "failed to rasterize U+{:04X} from fallback {:?}: {}",
                        codepoint as u32,
                        fallback.source,
                        err
                    );
                    None
                }
            };
        }

        None
    }

    /// Record metrics for a freshly rasterized glyph and try to pack its
    /// bitmap. A full atlas is not an error: the glyph keeps its metrics,
    /// joins the pending queue, and a rebuild is scheduled.
    fn place_glyph(
        &mut self,
        codepoint: char,
        font_index: usize,
        glyph: &RasterizedGlyph,
    ) -> GlyphMetrics {
        let mut metrics = GlyphMetrics {
            codepoint,
            atlas_x: 0,
            atlas_y: 0,
            atlas_w: 0,
            atlas_h: 0,
            left: glyph.left,
            top: glyph.top,
            width: glyph.width,
            rows: glyph.rows,
            advance: glyph.advance,
            font_index,
        };

        // Zero-area glyphs (space) have an advance but nothing to pack.
        if glyph.width > 0 && glyph.rows > 0 {
            match self.atlas.try_pack(glyph.width, glyph.rows) {
                Some((x, y)) => {
                    self.atlas
                        .blit(x, y, glyph.width, glyph.rows, &glyph.bitmap, false, false);
                    metrics.atlas_x = x;
                    metrics.atlas_y = y;
                    metrics.atlas_w = glyph.width;
                    metrics.atlas_h = glyph.rows;
                }
                None => {
                    self.pending.push(codepoint);
                    self.rebuild_needed = true;
                }
            }
        }

        metrics
    }

    /// Rebuild the atlas from scratch: every glyph that has a bitmap, plus
    /// everything pending, is re-rasterized through the regular resolution
    /// pipeline and packed into a freshly sized store. All cached atlas
    /// coordinates are rewritten in one pass; the old store stays valid
    /// until the swap at the end, so an interrupted rebuild leaves only
    /// stale-but-consistent state behind.
    fn rebuild_atlas(&mut self) -> Result<()> {
        let mut codepoints: Vec<char> = self
            .metrics
            .values()
            .filter(|m| m.width > 0 && m.rows > 0)
            .map(|m| m.codepoint)
            .collect();
        codepoints.extend(self.pending.iter().copied());
        codepoints.sort_unstable();
        codepoints.dedup();

        tracing::debug!("rebuilding atlas for {} glyphs", codepoints.len());

        let mut glyphs = Vec::with_capacity(codepoints.len());
        for codepoint in codepoints {
            match self.rasterize_codepoint(codepoint) {
                Some((font_index, glyph)) => glyphs.push((codepoint, font_index, glyph)),
                None => {
                    // A glyph that resolved before but no longer does (face
                    // gone bad mid-session): downgrade it to missing.
                    self.metrics.remove(&codepoint);
                    self.missing.insert(codepoint);
                }
            }
        }

        let rects: Vec<(u32, u32)> = glyphs
            .iter()
            .filter(|(_, _, g)| g.width > 0 && g.rows > 0)
            .map(|(_, _, g)| (g.width, g.rows))
            .collect();
        let (mut store, positions) = AtlasStore::create(&self.options.atlas, &rects)?;

        let mut positions = positions.into_iter();
        for (codepoint, font_index, glyph) in &glyphs {
            let mut metrics = GlyphMetrics {
                codepoint: *codepoint,
                atlas_x: 0,
                atlas_y: 0,
                atlas_w: 0,
                atlas_h: 0,
                left: glyph.left,
                top: glyph.top,
                width: glyph.width,
                rows: glyph.rows,
                advance: glyph.advance,
                font_index: *font_index,
            };
            if glyph.width > 0 && glyph.rows > 0 {
                if let Some((x, y)) = positions.next() {
                    store.blit(x, y, glyph.width, glyph.rows, &glyph.bitmap, false, false);
                    metrics.atlas_x = x;
                    metrics.atlas_y = y;
                    metrics.atlas_w = glyph.width;
                    metrics.atlas_h = glyph.rows;
                }
            }
            self.metrics.insert(*codepoint, metrics);
        }

        self.atlas = store;
        self.pending.clear();
        self.rebuild_needed = false;
        Ok(())
    }
}

impl std::fmt::Debug for Font {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Font")
            .field("size", &self.options.size)
            .field("dpi", &self.options.dpi)
            .field("glyphs", &self.metrics.len())
            .field("pending", &self.pending.len())
            .field("atlas", &self.atlas)
            .finish()
    }
}
