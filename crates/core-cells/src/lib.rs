//! Cell-block line storage and the character classification oracle.
//!
//! A line is a packed byte run of *blocks*, each block one grapheme cluster
//! occupying one or two screen cells (header varint: payload length + width
//! bit, then the interned attribute index, then the UTF-8 payload). All
//! drawing funnels through [`Grid::write_blocks`], which preserves the
//! line invariants:
//! * blocks are stored left to right, the first at column `start`,
//! * the block widths sum to the line `width`,
//! * a double-width block is atomic: overwriting either half replaces the
//!   whole block with spaces carrying its attribute,
//! * a zero-width codepoint never forms its own block.

pub mod block;
pub mod charinfo;
mod line;
pub mod varint;

pub use charinfo::{char_info, str_width, width_with_join, Category, CharInfo, JamoState,
                   UnicodeVersion};
pub use line::{Grid, LineData};
