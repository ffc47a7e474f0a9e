//! Shelf/row rectangle packing for the glyph atlas.
//!
//! Rectangles are placed left-to-right along the current row; when one would
//! cross the right edge, the cursor drops below the tallest rectangle of the
//! row and a new row starts. Freed space is never reclaimed: compaction
//! happens by rebuilding the whole atlas (see [`crate::font::Font`]).

/// Cursor-based shelf packer over a fixed `width` x `height` area.
///
/// Every placed rectangle is separated from the area's edges and from its
/// neighbors by at least `padding` pixels.
#[derive(Debug, Clone)]
pub struct ShelfPacker {
    width: u32,
    height: u32,
    padding: u32,
    cursor_x: u32,
    cursor_y: u32,
    row_height: u32,
}

impl ShelfPacker {
    pub fn new(width: u32, height: u32, padding: u32) -> Self {
        Self {
            width,
            height,
            padding,
            cursor_x: padding,
            cursor_y: padding,
            row_height: 0,
        }
    }

    /// Widest rectangle this packer can ever accept. A request beyond this
    /// means the atlas itself must grow, not that packing should be retried.
    pub fn max_rect_width(&self) -> u32 {
        self.width.saturating_sub(self.padding * 2)
    }

    /// Place one rectangle, returning its top-left position.
    ///
    /// `None` means the rectangle does not fit in the remaining space. The
    /// packer state is unchanged in that case except for a possible row
    /// advance, which only skips space that could not have held this
    /// rectangle anyway.
    pub fn pack(&mut self, width: u32, height: u32) -> Option<(u32, u32)> {
        debug_assert!(width > 0 && height > 0, "zero-area rectangles never reach the packer");

        if width > self.max_rect_width() {
            return None;
        }

        if self.cursor_x + width + self.padding > self.width {
            self.cursor_x = self.padding;
            self.cursor_y += self.row_height + self.padding;
            self.row_height = 0;
        }

        if self.cursor_y + height + self.padding > self.height {
            return None;
        }

        let position = (self.cursor_x, self.cursor_y);
        self.row_height = self.row_height.max(height);
        self.cursor_x += width + self.padding;
        Some(position)
    }

    /// Place a batch of rectangles, all or nothing.
    ///
    /// On failure the packer is left exactly as it was: the batch runs
    /// against a scratch copy that is committed only when every rectangle
    /// found a position.
    pub fn pack_all(&mut self, rects: &[(u32, u32)]) -> Option<Vec<(u32, u32)>> {
        let mut scratch = self.clone();
        let mut positions = Vec::with_capacity(rects.len());
        for &(width, height) in rects {
            positions.push(scratch.pack(width, height)?);
        }
        *self = scratch;
        Some(positions)
    }

    /// Vertical extent consumed so far, including the current row.
    pub fn used_height(&self) -> u32 {
        if self.cursor_x == self.padding && self.row_height == 0 {
            self.cursor_y.saturating_sub(self.padding)
        } else {
            self.cursor_y + self.row_height
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_left_to_right_with_padding() {
        let mut packer = ShelfPacker::new(64, 64, 2);
        assert_eq!(packer.pack(10, 10), Some((2, 2)));
        assert_eq!(packer.pack(10, 10), Some((14, 2)));
        assert_eq!(packer.pack(10, 10), Some((26, 2)));
    }

    #[test]
    fn starts_new_row_below_tallest_rectangle() {
        let mut packer = ShelfPacker::new(32, 64, 1);
        assert_eq!(packer.pack(12, 20), Some((1, 1)));
        assert_eq!(packer.pack(12, 8), Some((14, 1)));
        // 27 + 12 + 1 exceeds 32: the next placement drops below the
        // 20-tall rectangle, not the 8-tall one.
        assert_eq!(packer.pack(12, 8), Some((1, 22)));
    }

    #[test]
    fn rejects_rectangle_wider_than_usable_width() {
        let mut packer = ShelfPacker::new(32, 32, 2);
        assert_eq!(packer.pack(29, 4), None);
        // Narrower request still succeeds afterwards.
        assert_eq!(packer.pack(28, 4), Some((2, 2)));
    }

    #[test]
    fn fails_when_out_of_height() {
        let mut packer = ShelfPacker::new(32, 16, 1);
        assert!(packer.pack(10, 10).is_some());
        assert!(packer.pack(10, 10).is_some());
        // Third rectangle needs a new row starting at y = 12; 12 + 10 + 1
        // exceeds 16.
        assert_eq!(packer.pack(10, 10), None);
    }

    #[test]
    fn pack_all_is_all_or_nothing() {
        let mut packer = ShelfPacker::new(32, 16, 1);
        assert!(packer.pack_all(&[(10, 10), (10, 10), (10, 10)]).is_none());
        // The failed batch must not have consumed any space.
        let positions = packer.pack_all(&[(10, 10), (10, 10)]).unwrap();
        assert_eq!(positions, vec![(1, 1), (12, 1)]);
    }

    #[test]
    fn used_height_tracks_current_row() {
        let mut packer = ShelfPacker::new(64, 64, 1);
        assert_eq!(packer.used_height(), 0);
        packer.pack(10, 12).unwrap();
        assert_eq!(packer.used_height(), 13);
    }
}
