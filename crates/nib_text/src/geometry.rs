//! Vertex/texcoord geometry batching for atlas-backed text.
//!
//! Strings become one textured quad per visible glyph, pen-advanced left to
//! right from each entry's origin. The output topology is whatever the
//! render device assembles; the vertex buffer is sized exactly before
//! writing and its allocation is kept across flushes.

use bytemuck::{Pod, Zeroable};

use crate::font::Font;
use crate::gpu::{MeshHandle, RenderDevice};

/// How the device assembles glyph quads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Two triangles per glyph, six vertices.
    Triangles,
    /// One quad per glyph, four vertices; the device assembles the quad.
    Quads,
}

impl Topology {
    pub fn vertices_per_glyph(self) -> usize {
        match self {
            Self::Triangles => 6,
            Self::Quads => 4,
        }
    }
}

/// One text vertex, laid out for direct GPU upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub tex_coord: [f32; 2],
    pub color: [f32; 4],
}

#[derive(Debug)]
struct BatchEntry {
    text: String,
    position: [f32; 2],
    color: [f32; 4],
}

/// Accumulates (string, position, color) entries and flushes them as a
/// single mesh draw.
#[derive(Debug, Default)]
pub struct GeometryBatch {
    entries: Vec<BatchEntry>,
    vertices: Vec<Vertex>,
    mesh: Option<(MeshHandle, Topology)>,
}

impl GeometryBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any queued entries and start over.
    pub fn begin(&mut self) {
        self.entries.clear();
    }

    /// Queue one string. `position` is the pen origin on the baseline.
    pub fn add(&mut self, text: &str, position: [f32; 2], color: [f32; 4]) {
        self.entries.push(BatchEntry {
            text: text.to_string(),
            position,
            color,
        });
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vertices written by the last flush. Valid until the next flush.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Build geometry for every queued entry and issue one draw call.
    ///
    /// Degenerate entries (empty, or longer than the font's configured
    /// maximum) contribute no geometry. Entries are consumed; the vertex
    /// allocation is kept.
    pub fn flush(&mut self, font: &mut Font, device: &mut dyn RenderDevice) {
        let max_chars = font.options().max_draw_chars;

        // Resolve every glyph first. This is what can schedule an atlas
        // rebuild, and the rebuild must finish before any atlas coordinate
        // below is read.
        for entry in &self.entries {
            let len = entry.text.chars().count();
            if len > max_chars {
                tracing::warn!("skipping {}-char batch entry (limit {})", len, max_chars);
                continue;
            }
            for ch in entry.text.chars() {
                font.glyph_metrics(ch);
            }
        }
        font.rebuild_if_needed();

        let topology = device.topology();
        let verts_per_glyph = topology.vertices_per_glyph();

        // Size the scratch buffer to the exact vertex total up front so it
        // never reallocates mid-build.
        let mut visible = 0usize;
        for entry in &self.entries {
            if entry_len(entry, max_chars) == 0 {
                continue;
            }
            for ch in entry.text.chars() {
                let m = font.glyph_metrics(ch);
                if m.atlas_w > 0 && m.atlas_h > 0 {
                    visible += 1;
                }
            }
        }
        self.vertices.clear();
        self.vertices.reserve_exact(visible * verts_per_glyph);

        let atlas_width = font.atlas().width() as f32;
        let atlas_height = font.atlas().height() as f32;

        for entry in &self.entries {
            if entry_len(entry, max_chars) == 0 {
                continue;
            }
            let mut pen_x = entry.position[0];
            let baseline = entry.position[1];
            for ch in entry.text.chars() {
                let m = font.glyph_metrics(ch);
                if m.atlas_w > 0 && m.atlas_h > 0 {
                    emit_quad(
                        &mut self.vertices,
                        topology,
                        &m,
                        pen_x,
                        baseline,
                        entry.color,
                        atlas_width,
                        atlas_height,
                    );
                }
                pen_x += m.advance;
            }
        }

        self.entries.clear();

        if self.vertices.is_empty() {
            return;
        }

        let texture = font.sync_atlas(device);
        let (mesh, mesh_topology) = *self
            .mesh
            .get_or_insert_with(|| (device.create_mesh(topology), topology));
        debug_assert_eq!(
            mesh_topology, topology,
            "a batch's mesh is bound to one device topology"
        );
        device.draw_mesh(mesh, texture, &self.vertices);
    }
}

/// Character count of an entry, with degenerate entries mapped to zero.
fn entry_len(entry: &BatchEntry, max_chars: usize) -> usize {
    let len = entry.text.chars().count();
    if len > max_chars {
        return 0;
    }
    len
}

#[allow(clippy::too_many_arguments)]
fn emit_quad(
    vertices: &mut Vec<Vertex>,
    topology: Topology,
    m: &crate::font::GlyphMetrics,
    pen_x: f32,
    baseline: f32,
    color: [f32; 4],
    atlas_width: f32,
    atlas_height: f32,
) {
    let x = pen_x + m.left as f32;
    let y = baseline - m.top as f32;
    let w = m.width as f32;
    let h = m.rows as f32;

    let u0 = m.atlas_x as f32 / atlas_width;
    let v0 = m.atlas_y as f32 / atlas_height;
    let u1 = (m.atlas_x + m.atlas_w) as f32 / atlas_width;
    let v1 = (m.atlas_y + m.atlas_h) as f32 / atlas_height;

    let top_left = Vertex {
        position: [x, y],
        tex_coord: [u0, v0],
        color,
    };
    let top_right = Vertex {
        position: [x + w, y],
        tex_coord: [u1, v0],
        color,
    };
    let bottom_right = Vertex {
        position: [x + w, y + h],
        tex_coord: [u1, v1],
        color,
    };
    let bottom_left = Vertex {
        position: [x, y + h],
        tex_coord: [u0, v1],
        color,
    };

    match topology {
        Topology::Quads => vertices.extend([top_left, top_right, bottom_right, bottom_left]),
        Topology::Triangles => vertices.extend([
            top_left,
            top_right,
            bottom_right,
            bottom_right,
            bottom_left,
            top_left,
        ]),
    }
}
