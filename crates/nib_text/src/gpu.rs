//! Interface to the GPU resource manager.
//!
//! The engine never talks to a graphics API directly: it fills CPU-side
//! buffers and hands them to a [`RenderDevice`] implementation owned by the
//! renderer. Handles are opaque tokens minted by the device.

use crate::geometry::{Topology, Vertex};

/// Opaque handle to a device texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Opaque handle to a device mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

/// GPU resource manager consumed by the text engine.
pub trait RenderDevice {
    /// Vertex topology this device assembles. Fixed for the lifetime of the
    /// device; the batcher picks it up once and never re-queries per call.
    fn topology(&self) -> Topology;

    /// Create a single-channel (8-bit coverage) texture.
    fn create_texture(&mut self, width: u32, height: u32) -> TextureHandle;

    /// Upload a pixel region into an existing texture.
    fn upload_region(
        &mut self,
        texture: TextureHandle,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        pixels: &[u8],
    );

    /// Create a mesh that will be drawn with the given topology.
    fn create_mesh(&mut self, topology: Topology) -> MeshHandle;

    /// Draw `vertices` as `mesh`, sampling `texture`.
    fn draw_mesh(&mut self, mesh: MeshHandle, texture: TextureHandle, vertices: &[Vertex]);
}
