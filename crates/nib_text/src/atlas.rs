//! Texture atlas store: one CPU pixel buffer mirrored to a GPU texture.
//!
//! The store owns a single-channel (8-bit coverage) pixel buffer and the
//! shelf packer that assigns positions inside it. It never grows in place:
//! when [`AtlasStore::try_pack`] reports "full", the owner builds a fresh
//! store sized for the whole glyph set and swaps it in.

use crate::gpu::{RenderDevice, TextureHandle};
use crate::packer::ShelfPacker;
use crate::{Result, TextError};

/// Sizing parameters for atlas creation.
#[derive(Debug, Clone)]
pub struct AtlasConfig {
    /// Fraction of the atlas area the initial rectangle set should fill.
    pub target_occupancy: f32,
    /// Smallest allowed atlas dimension (power of two).
    pub min_size: u32,
    /// Largest allowed atlas dimension (power of two).
    pub max_size: u32,
    /// Pixels separating packed rectangles from edges and neighbors.
    pub padding: u32,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            target_occupancy: 0.75,
            min_size: 256,
            max_size: 4096,
            padding: 1,
        }
    }
}

/// Square pixel atlas with a CPU buffer and a lazily created GPU mirror.
pub struct AtlasStore {
    width: u32,
    height: u32,
    packer: ShelfPacker,
    pixels: Vec<u8>,
    dirty: bool,
    texture: Option<TextureHandle>,
}

impl AtlasStore {
    /// Create a store sized so that the summed (padded) area of `rects` is
    /// roughly `config.target_occupancy` of the atlas, clamped to
    /// `[min_size, max_size]` and rounded up to a power of two, then pack
    /// all of `rects` into it.
    ///
    /// If the computed size cannot hold the set, the size doubles until it
    /// does; failure at `max_size` is not recoverable for this store.
    /// Returns the store plus one position per input rectangle, in order.
    pub fn create(config: &AtlasConfig, rects: &[(u32, u32)]) -> Result<(Self, Vec<(u32, u32)>)> {
        let needed: usize = rects
            .iter()
            .map(|&(w, h)| ((w + config.padding) * (h + config.padding)) as usize)
            .sum();

        let mut size = optimal_size(config, needed);
        loop {
            let mut packer = ShelfPacker::new(size, size, config.padding);
            if let Some(positions) = packer.pack_all(rects) {
                tracing::debug!("created {}x{} atlas for {} rects", size, size, rects.len());
                let store = Self {
                    width: size,
                    height: size,
                    packer,
                    pixels: vec![0; (size as usize) * (size as usize)],
                    dirty: true,
                    texture: None,
                };
                return Ok((store, positions));
            }
            if size >= config.max_size {
                tracing::error!(
                    "atlas exhausted: {} rects ({} px) overflow a {}x{} atlas",
                    rects.len(),
                    needed,
                    config.max_size,
                    config.max_size
                );
                return Err(TextError::AtlasExhausted {
                    needed,
                    max: config.max_size,
                });
            }
            size = (size * 2).min(config.max_size);
        }
    }

    /// Try to reserve space for one rectangle.
    ///
    /// `None` is the ordinary "atlas is full" outcome, not an error; the
    /// caller schedules a rebuild. The store never grows in place.
    pub fn try_pack(&mut self, width: u32, height: u32) -> Option<(u32, u32)> {
        self.packer.pack(width, height)
    }

    /// Copy a rasterized bitmap into the CPU buffer at `(x, y)`.
    ///
    /// `pixels` holds `width * height` coverage bytes; nothing outside that
    /// range is read. The GPU mirror is marked stale.
    pub fn blit(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        pixels: &[u8],
        flip_horizontal: bool,
        flip_vertical: bool,
    ) {
        if width == 0 || height == 0 {
            return;
        }
        debug_assert!(pixels.len() >= (width * height) as usize);
        debug_assert!(x + width <= self.width && y + height <= self.height);

        for row in 0..height {
            let src_row = if flip_vertical { height - row - 1 } else { row };
            let dst = ((y + row) * self.width + x) as usize;
            if flip_horizontal {
                for col in 0..width {
                    let src_col = width - col - 1;
                    self.pixels[dst + col as usize] = pixels[(src_row * width + src_col) as usize];
                }
            } else {
                let src = (src_row * width) as usize;
                self.pixels[dst..dst + width as usize]
                    .copy_from_slice(&pixels[src..src + width as usize]);
            }
        }
        self.dirty = true;
    }

    /// Create the GPU texture on first use and upload the CPU buffer if it
    /// changed since the last sync.
    pub fn sync(&mut self, device: &mut dyn RenderDevice) -> TextureHandle {
        let texture = *self
            .texture
            .get_or_insert_with(|| device.create_texture(self.width, self.height));
        if self.dirty {
            device.upload_region(texture, 0, 0, self.width, self.height, &self.pixels);
            self.dirty = false;
        }
        texture
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw coverage pixels, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Whether the CPU buffer has changed since the last [`Self::sync`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Fraction of the atlas height consumed by packed rows.
    pub fn occupancy(&self) -> f32 {
        self.packer.used_height() as f32 / self.height as f32
    }
}

impl std::fmt::Debug for AtlasStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasStore")
            .field("dimensions", &(self.width, self.height))
            .field("occupancy", &format!("{:.1}%", self.occupancy() * 100.0))
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Smallest power-of-two size in `[min_size, max_size]` whose area covers
/// `needed / target_occupancy`.
fn optimal_size(config: &AtlasConfig, needed: usize) -> u32 {
    let target = (needed as f32 / config.target_occupancy).sqrt().ceil() as u32;
    let mut size = config.min_size.max(1);
    while size < target && size < config.max_size {
        size *= 2;
    }
    size.min(config.max_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Topology;
    use crate::testing::RecordingDevice;

    fn small_config() -> AtlasConfig {
        AtlasConfig {
            target_occupancy: 0.75,
            min_size: 16,
            max_size: 64,
            padding: 1,
        }
    }

    #[test]
    fn sizes_from_occupancy_target() {
        // 60 rects of 16x16 pack into ~17k padded px; at 0.75 occupancy the
        // side target is ~153, which rounds up to 256.
        let config = AtlasConfig::default();
        let rects = vec![(16, 16); 60];
        let (store, positions) = AtlasStore::create(&config, &rects).unwrap();
        assert_eq!(positions.len(), 60);
        assert_eq!(store.width(), 256);
        assert_eq!(store.height(), 256);
    }

    #[test]
    fn create_escalates_until_the_set_fits() {
        // Shelf packing wastes space under mixed heights, so the occupancy
        // estimate (32 here) comes up short; create() keeps doubling until
        // pack_all succeeds.
        let config = AtlasConfig {
            target_occupancy: 1.0,
            ..small_config()
        };
        let rects = [(20, 4), (4, 20), (20, 4), (4, 20)];
        let (store, positions) = AtlasStore::create(&config, &rects).unwrap();
        assert_eq!(positions.len(), 4);
        assert_eq!(store.width(), 64);
    }

    #[test]
    fn create_fails_loudly_at_max_size() {
        let config = small_config();
        let rects = vec![(40, 40); 8];
        match AtlasStore::create(&config, &rects) {
            Err(TextError::AtlasExhausted { max, .. }) => assert_eq!(max, 64),
            other => panic!("expected AtlasExhausted, got {other:?}"),
        }
    }

    #[test]
    fn empty_initial_set_yields_min_size() {
        let (store, positions) = AtlasStore::create(&small_config(), &[]).unwrap();
        assert!(positions.is_empty());
        assert_eq!(store.width(), 16);
    }

    #[test]
    fn blit_copies_rows() {
        let (mut store, _) = AtlasStore::create(&small_config(), &[]).unwrap();
        let bitmap = [1, 2, 3, 4, 5, 6];
        store.blit(2, 3, 3, 2, &bitmap, false, false);
        let w = store.width() as usize;
        assert_eq!(&store.pixels()[3 * w + 2..3 * w + 5], &[1, 2, 3]);
        assert_eq!(&store.pixels()[4 * w + 2..4 * w + 5], &[4, 5, 6]);
    }

    #[test]
    fn blit_respects_flips() {
        let (mut store, _) = AtlasStore::create(&small_config(), &[]).unwrap();
        let bitmap = [1, 2, 3, 4, 5, 6];
        store.blit(0, 0, 3, 2, &bitmap, true, true);
        let w = store.width() as usize;
        assert_eq!(&store.pixels()[0..3], &[6, 5, 4]);
        assert_eq!(&store.pixels()[w..w + 3], &[3, 2, 1]);
    }

    #[test]
    fn sync_uploads_once_per_change() {
        let (mut store, _) = AtlasStore::create(&small_config(), &[]).unwrap();
        let mut device = RecordingDevice::new(Topology::Triangles);

        assert!(store.is_dirty());
        let texture = store.sync(&mut device);
        assert!(!store.is_dirty());
        assert_eq!(device.textures.len(), 1);
        assert_eq!(device.uploads.len(), 1);

        // Clean store: no further uploads, same texture handle.
        assert_eq!(store.sync(&mut device), texture);
        assert_eq!(device.uploads.len(), 1);

        store.blit(0, 0, 1, 1, &[255], false, false);
        store.sync(&mut device);
        assert_eq!(device.uploads.len(), 2);
    }
}
