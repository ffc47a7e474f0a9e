//! Shared test doubles: a synthetic raster backend and a recording render
//! device. Test-only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::geometry::{Topology, Vertex};
use crate::gpu::{MeshHandle, RenderDevice, TextureHandle};
use crate::raster::{Face, FaceMetrics, RasterBackend, RasterizedGlyph};
use crate::{Result, TextError};

const MAGIC: &[u8; 4] = b"NIBF";

/// Synthetic font data: a magic header followed by the UTF-8 characters the
/// face covers.
pub(crate) fn coverage_font(covered: &str) -> Vec<u8> {
    let mut data = MAGIC.to_vec();
    data.extend_from_slice(covered.as_bytes());
    data
}

/// Raster backend whose faces cover exactly the characters named in their
/// font data. Glyph bitmaps are 8x8 solid coverage; the space character is
/// zero-area; every advance is 10.0.
#[derive(Debug, Default)]
pub(crate) struct MockBackend {
    faces_opened: AtomicUsize,
    rasterize_calls: Arc<AtomicUsize>,
}

impl MockBackend {
    pub(crate) fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Total `open_face` calls across the backend.
    pub(crate) fn faces_opened(&self) -> usize {
        self.faces_opened.load(Ordering::SeqCst)
    }

    /// Total `load_and_rasterize` calls across every face this backend
    /// opened.
    pub(crate) fn rasterize_calls(&self) -> usize {
        self.rasterize_calls.load(Ordering::SeqCst)
    }
}

impl RasterBackend for MockBackend {
    fn open_face(&self, data: Arc<Vec<u8>>) -> Result<Box<dyn Face>> {
        let covered = data
            .strip_prefix(MAGIC.as_slice())
            .and_then(|rest| std::str::from_utf8(rest).ok())
            .ok_or_else(|| TextError::FaceParse("unrecognized font data".to_string()))?;

        self.faces_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockFace {
            covered: covered.chars().collect(),
            rasterize_calls: Arc::clone(&self.rasterize_calls),
            size: 0,
            dpi: 0,
        }))
    }
}

struct MockFace {
    covered: Vec<char>,
    rasterize_calls: Arc<AtomicUsize>,
    size: u32,
    dpi: u32,
}

impl Face for MockFace {
    fn set_char_size(&mut self, size: u32, dpi: u32) {
        self.size = size;
        self.dpi = dpi;
    }

    fn glyph_index(&self, codepoint: char) -> u32 {
        if self.covered.contains(&codepoint) {
            codepoint as u32
        } else {
            0
        }
    }

    fn load_and_rasterize(&mut self, glyph_index: u32, _antialias: bool) -> Result<RasterizedGlyph> {
        self.rasterize_calls.fetch_add(1, Ordering::SeqCst);
        assert!(
            self.size > 0 && self.dpi > 0,
            "size must be applied before rasterizing"
        );

        let codepoint = char::from_u32(glyph_index)
            .ok_or_else(|| TextError::Rasterize(format!("bad glyph index {glyph_index}")))?;

        if codepoint == ' ' {
            return Ok(RasterizedGlyph {
                advance: 10.0,
                ..RasterizedGlyph::default()
            });
        }

        Ok(RasterizedGlyph {
            bitmap: vec![255; 64],
            width: 8,
            rows: 8,
            left: 1,
            top: 8,
            advance: 10.0,
        })
    }

    fn metrics(&self) -> &FaceMetrics {
        static METRICS: std::sync::OnceLock<FaceMetrics> = std::sync::OnceLock::new();
        METRICS.get_or_init(|| FaceMetrics {
            units_per_em: 1000,
            ascender: 800,
            descender: -200,
            line_gap: 0,
            glyph_count: 1,
            family_name: "Mock".to_string(),
        })
    }
}

/// Render device that records every call for assertions.
#[derive(Debug)]
pub(crate) struct RecordingDevice {
    topology: Topology,
    next_handle: u64,
    /// Dimensions of each created texture.
    pub(crate) textures: Vec<(u32, u32)>,
    /// (texture, x, y, width, height, pixel count) per upload.
    pub(crate) uploads: Vec<(TextureHandle, u32, u32, u32, u32, usize)>,
    /// Topology of each created mesh.
    pub(crate) meshes: Vec<Topology>,
    /// (mesh, texture, vertices) per draw call.
    pub(crate) draws: Vec<(MeshHandle, TextureHandle, Vec<Vertex>)>,
}

impl RecordingDevice {
    pub(crate) fn new(topology: Topology) -> Self {
        Self {
            topology,
            next_handle: 1,
            textures: Vec::new(),
            uploads: Vec::new(),
            meshes: Vec::new(),
            draws: Vec::new(),
        }
    }
}

impl RenderDevice for RecordingDevice {
    fn topology(&self) -> Topology {
        self.topology
    }

    fn create_texture(&mut self, width: u32, height: u32) -> TextureHandle {
        self.textures.push((width, height));
        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn upload_region(
        &mut self,
        texture: TextureHandle,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) {
        self.uploads
            .push((texture, x, y, width, height, pixels.len()));
    }

    fn create_mesh(&mut self, topology: Topology) -> MeshHandle {
        self.meshes.push(topology);
        let handle = MeshHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn draw_mesh(&mut self, mesh: MeshHandle, texture: TextureHandle, vertices: &[Vertex]) {
        self.draws.push((mesh, texture, vertices.to_vec()));
    }
}
