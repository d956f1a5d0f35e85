//! Line descriptors and the grid they hang off.
//!
//! `write_blocks` is the single primitive all drawing funnels through. Its
//! five cases (off-screen, empty line, append past end, prepend before
//! start, overlap) each rewrite the destination line without breaking the
//! block invariants. Incoming runs are clamped to the grid width; clipped
//! trailing cells become spaces carrying the attribute of the first block
//! that did not fit, so background color survives clipping.

use core_attr::{Attr, AttrMap};

use crate::block::{self, Blocks};
use crate::varint;

/// One line of a grid: a growable block run plus its placement.
///
/// Columns `[0, start)` and `[start + width, grid_width)` are implicitly
/// blank and composed as default-attribute spaces.
#[derive(Debug, Default, Clone)]
pub struct LineData {
    data: Vec<u8>,
    /// Column of the leftmost block, relative to the grid's left edge.
    pub start: i32,
    /// Cells spanned by the stored blocks.
    pub width: i32,
}

impl LineData {
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn blocks(&self) -> Blocks<'_> {
        Blocks::new(&self.data)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.start = 0;
        self.width = 0;
    }
}

#[derive(Debug, Clone, Copy)]
struct PosCache {
    line: i32,
    byte: usize,
    width: i32,
}

const CACHE_INVALID: PosCache = PosCache {
    line: -1,
    byte: 0,
    width: 0,
};

/// A rectangular drawing target: per-line block storage, a painting cursor,
/// and the default attributes painted into implicit blanks.
///
/// An *unbacked* grid has no line storage; it exists only to position and
/// clip other grids, and drawing into it fails.
#[derive(Debug)]
pub struct Grid {
    pub width: i32,
    pub height: i32,
    pub paint_x: i32,
    pub paint_y: i32,
    pub default_attrs: Attr,
    lines: Option<Vec<LineData>>,
    cache: PosCache,
}

impl Grid {
    pub fn backed(height: i32, width: i32) -> Grid {
        let mut lines = Vec::new();
        lines.resize_with(height.max(0) as usize, LineData::default);
        Grid {
            width,
            height,
            paint_x: 0,
            paint_y: 0,
            default_attrs: Attr::empty(),
            lines: Some(lines),
            cache: CACHE_INVALID,
        }
    }

    pub fn unbacked(height: i32, width: i32) -> Grid {
        Grid {
            width,
            height,
            paint_x: 0,
            paint_y: 0,
            default_attrs: Attr::empty(),
            lines: None,
            cache: CACHE_INVALID,
        }
    }

    pub fn is_backed(&self) -> bool {
        self.lines.is_some()
    }

    pub fn line(&self, y: i32) -> Option<&LineData> {
        self.lines.as_ref()?.get(usize::try_from(y).ok()?)
    }

    pub fn line_mut(&mut self, y: i32) -> Option<&mut LineData> {
        self.cache = CACHE_INVALID;
        self.lines.as_mut()?.get_mut(usize::try_from(y).ok()?)
    }

    /// Move the painting cursor; negative coordinates clamp to zero.
    pub fn set_paint(&mut self, y: i32, x: i32) {
        self.paint_x = x.max(0);
        self.paint_y = y.max(0);
    }

    /// Write a prebuilt block run at the painting cursor.
    ///
    /// Returns `false` only for unbacked grids; painting outside the grid is
    /// silently clipped and reported as success.
    pub fn write_blocks(&mut self, attrs: &mut AttrMap, blocks: &[u8]) -> bool {
        if self.lines.is_none() {
            return false;
        }
        if self.paint_y >= self.height || self.paint_x >= self.width || blocks.is_empty() {
            return true;
        }

        // Clamp the incoming run to the grid width; remember the attribute
        // of the first block that does not fit.
        let mut width = 0i32;
        let mut taken = 0usize;
        while let Some(b) = block::parse(blocks, taken) {
            if self.paint_x + width + b.width > self.width {
                break;
            }
            width += b.width;
            taken = b.end;
        }
        let clipped = block::parse(blocks, taken);
        let extra_spaces = clipped.map(|_| self.width - self.paint_x - width).unwrap_or(0);
        let extra_attr = clipped.map(|b| b.attr_idx).unwrap_or(0);
        let blocks = &blocks[..taken];

        if self.cache.line != self.paint_y || self.cache.width > self.paint_x {
            self.cache = PosCache {
                line: self.paint_y,
                byte: 0,
                width: self.line_start(self.paint_y),
            };
        }

        let paint_x = self.paint_x;
        let default_idx = attrs.index_of(self.default_attrs);
        let y = self.paint_y as usize;
        let cache = &mut self.cache;
        let Some(line) = self.lines.as_mut().and_then(|l| l.get_mut(y)) else {
            return false;
        };

        if line.data.is_empty() {
            line.start = paint_x;
            line.data.extend_from_slice(blocks);
            line.width = width;
            *cache = CACHE_INVALID;
        } else if line.start + line.width <= paint_x {
            // Append after the existing blocks, padding the gap.
            let gap = paint_x - (line.start + line.width);
            let space = block::space_block(default_idx);
            line.data.reserve(blocks.len() + gap as usize * space.len());
            for _ in 0..gap {
                line.data.extend_from_slice(&space);
            }
            line.data.extend_from_slice(blocks);
            line.width += width + gap;
        } else if paint_x + width <= line.start {
            // Prepend before the existing blocks, padding the gap.
            let gap = line.start - (paint_x + width);
            let space = block::space_block(default_idx);
            let mut fresh =
                Vec::with_capacity(blocks.len() + gap as usize * space.len() + line.data.len());
            fresh.extend_from_slice(blocks);
            for _ in 0..gap {
                fresh.extend_from_slice(&space);
            }
            fresh.extend_from_slice(&line.data);
            line.data = fresh;
            line.width += width + gap;
            line.start = paint_x;
            *cache = CACHE_INVALID;
        } else {
            // Overlap with existing blocks.
            let mut pos_width = cache.width;
            let mut at = cache.byte;
            let mut first = None;
            while let Some(b) = block::parse(&line.data, at) {
                if pos_width + b.width > paint_x {
                    first = Some(b);
                    break;
                }
                pos_width += b.width;
                at = b.end;
            }
            let Some(first) = first else {
                return true;
            };
            cache.byte = at;
            cache.width = pos_width;

            let start_replace = first.start;
            let start_space_attr = first.attr_idx;
            // A partially overlapped double-width block leaves its left half
            // as spaces with the old block's attribute.
            let start_spaces = if paint_x >= line.start {
                paint_x - pos_width
            } else {
                0
            };

            pos_width += first.width;
            let mut at = first.end;
            let target = paint_x + width;
            let (end_space_attr, end_replace) = if pos_width >= target {
                (start_space_attr, at)
            } else {
                let mut attr = start_space_attr;
                while let Some(b) = block::parse(&line.data, at) {
                    pos_width += b.width;
                    attr = b.attr_idx;
                    at = b.end;
                    if pos_width >= target {
                        break;
                    }
                }
                (attr, at)
            };
            let end_spaces = (pos_width - target).max(0);

            let start_space = block::space_block(start_space_attr);
            let end_space = block::space_block(end_space_attr);
            let mut middle = Vec::with_capacity(
                blocks.len()
                    + start_spaces as usize * start_space.len()
                    + end_spaces as usize * end_space.len(),
            );
            for _ in 0..start_spaces {
                middle.extend_from_slice(&start_space);
            }
            middle.extend_from_slice(blocks);
            for _ in 0..end_spaces {
                middle.extend_from_slice(&end_space);
            }
            line.data.splice(start_replace..end_replace, middle);

            if line.start + line.width < width + paint_x {
                line.width = width + paint_x - line.start;
            }
            if line.start > paint_x {
                line.width += line.start - paint_x;
                line.start = paint_x;
                *cache = CACHE_INVALID;
            }
        }
        self.paint_x += width;

        let mut result = true;
        if extra_spaces > 0 {
            let space = block::space_block(extra_attr);
            for _ in 0..extra_spaces {
                result &= self.write_blocks(attrs, &space);
            }
        }
        result
    }

    /// Attach a zero-width codepoint to the block whose right edge is at the
    /// painting cursor. Dropped silently when there is no adjacent base
    /// block or the position falls inside a double-width block.
    pub fn add_zerowidth(&mut self, bytes: &[u8]) -> bool {
        if self.lines.is_none() {
            return false;
        }
        if self.paint_y >= self.height {
            return true;
        }
        // Combining codepoints may attach at the right edge of the grid.
        if self.paint_x > self.width {
            return true;
        }
        let paint_x = self.paint_x;
        let y = self.paint_y as usize;
        let paint_y = self.paint_y;
        let cache = &mut self.cache;
        let Some(line) = self.lines.as_mut().and_then(|l| l.get_mut(y)) else {
            return true;
        };
        if line.data.is_empty() || paint_x <= line.start || paint_x > line.start + line.width {
            return true;
        }

        if cache.line != paint_y || cache.width >= paint_x {
            *cache = PosCache {
                line: paint_y,
                byte: 0,
                width: line.start,
            };
        }

        let mut pos_width = cache.width;
        let mut at = cache.byte;
        let mut found = None;
        while let Some(b) = block::parse(&line.data, at) {
            pos_width += b.width;
            if pos_width >= paint_x {
                found = Some(b);
                break;
            }
            at = b.end;
        }
        let Some(found) = found else {
            return true;
        };
        // Inside a double-width block's right half: ignore.
        if pos_width > paint_x {
            return true;
        }

        let found_start = found.start;
        let (header, header_len) = varint::get(&line.data[found_start..]);
        let payload = (header >> 1) as usize;
        let wide = header & 1;
        let new_header_value = (((payload + bytes.len()) as u32) << 1) | wide;

        let insert_at = found_start + header_len + payload;
        line.data.splice(insert_at..insert_at, bytes.iter().copied());
        let mut new_header = Vec::with_capacity(5);
        varint::put(new_header_value, &mut new_header);
        line.data
            .splice(found_start..found_start + header_len, new_header);
        *cache = CACHE_INVALID;
        true
    }

    /// Clear from the painting cursor to the end of the line.
    pub fn clear_to_eol(&mut self, attrs: &mut AttrMap) {
        if self.lines.is_none() || self.paint_y >= self.height {
            return;
        }
        let paint_x = self.paint_x;
        let y = self.paint_y as usize;
        let Some(line) = self.lines.as_mut().and_then(|l| l.get_mut(y)) else {
            return;
        };
        if paint_x <= line.start {
            line.clear();
            self.cache = CACHE_INVALID;
        } else if paint_x < line.start + line.width {
            let mut sumwidth = line.start;
            let mut at = 0usize;
            while let Some(b) = block::parse(&line.data, at) {
                if sumwidth + b.width > paint_x {
                    break;
                }
                sumwidth += b.width;
                at = b.end;
            }
            line.data.truncate(at);
            line.width = sumwidth - line.start;
            self.cache = CACHE_INVALID;
            if sumwidth < paint_x {
                // The cursor splits a double-width block: pad with spaces.
                let spaces = paint_x - sumwidth;
                self.paint_x = sumwidth;
                let space = block::space_block(attrs.index_of(self.default_attrs));
                for _ in 0..spaces {
                    self.write_blocks(attrs, &space);
                }
            }
        }
    }

    /// Clear to end of line, then blank every line below the cursor.
    pub fn clear_to_bottom(&mut self, attrs: &mut AttrMap) {
        if self.lines.is_none() {
            return;
        }
        self.clear_to_eol(attrs);
        self.paint_y += 1;
        while self.paint_y < self.height {
            let y = self.paint_y as usize;
            if let Some(line) = self.lines.as_mut().and_then(|l| l.get_mut(y)) {
                line.clear();
            }
            self.paint_y += 1;
        }
        self.cache = CACHE_INVALID;
    }

    /// Change the grid size. Content right of a narrowed width is chopped;
    /// cells at or beyond the old width in a widened grid are implicitly
    /// blank with the default attributes.
    pub fn resize(&mut self, attrs: &mut AttrMap, height: i32, width: i32) -> bool {
        if height <= 0 || width <= 0 {
            return false;
        }
        if let Some(lines) = self.lines.as_mut() {
            lines.resize_with(height as usize, LineData::default);
        }
        if width < self.width {
            let (saved_x, saved_y) = (self.paint_x, self.paint_y);
            let saved_height = self.height;
            self.height = height;
            for y in 0..height {
                self.set_paint(y, width);
                self.clear_to_eol(attrs);
            }
            self.height = saved_height;
            self.paint_x = saved_x;
            self.paint_y = saved_y;
        }
        self.height = height;
        self.width = width;
        self.cache = CACHE_INVALID;
        true
    }

    fn line_start(&self, y: i32) -> i32 {
        self.lines
            .as_ref()
            .and_then(|l| l.get(y as usize))
            .map(|l| l.start)
            .unwrap_or(0)
    }
}
