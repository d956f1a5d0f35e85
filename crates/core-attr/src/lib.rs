//! Display attributes and the attribute interner.
//!
//! The bit layout of [`Attr`] is public API and must stay stable:
//! * bits 0..8: boolean flags (user callback, underline, bold, reverse,
//!   blink, dim, ACS, fallback ACS),
//! * bits 8..17: foreground color field (0 = unspecified, 1..=256 = color
//!   N-1, 257 = explicit default),
//! * bits 17..26: background color field, same encoding.
//!
//! Cell blocks do not store the attribute word itself; they store a small
//! index handed out by [`AttrMap`] so block headers stay short. Indices are
//! never recycled; the map only grows.

use bitflags::bitflags;

bitflags! {
    /// Terminal display attributes plus two 9-bit color fields.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Attr: u32 {
        /// Dispatch this cell to the user callback instead of writing it.
        const USER = 1 << 0;
        const UNDERLINE = 1 << 1;
        const BOLD = 1 << 2;
        const REVERSE = 1 << 3;
        const BLINK = 1 << 4;
        const DIM = 1 << 5;
        /// Interpret the cell payload via the alternate character set.
        const ACS = 1 << 6;
        /// ACS requested but unavailable; payload comes from the fallback table.
        const FALLBACK_ACS = 1 << 7;
        // Color fields occupy bits 8..26; keep them representable.
        const _ = !0;
    }
}

/// Bit offset of the foreground color field.
pub const FG_SHIFT: u32 = 8;
/// Bit offset of the background color field.
pub const BG_SHIFT: u32 = 17;
/// Mask of the foreground color field.
pub const FG_MASK: u32 = 0x1ff << FG_SHIFT;
/// Mask of the background color field.
pub const BG_MASK: u32 = 0x1ff << BG_SHIFT;

/// Field value meaning "explicitly the terminal default color".
pub const COLOR_DEFAULT: u32 = 257;

impl Attr {
    /// Explicit default foreground.
    pub const FG_DEFAULT: Attr = Attr::from_bits_retain(COLOR_DEFAULT << FG_SHIFT);
    /// Explicit default background.
    pub const BG_DEFAULT: Attr = Attr::from_bits_retain(COLOR_DEFAULT << BG_SHIFT);

    /// Foreground color attribute for palette index `n` (0..=255).
    pub const fn fg(n: u16) -> Attr {
        Attr::from_bits_retain((((n as u32) & 0xff) + 1) << FG_SHIFT)
    }

    /// Background color attribute for palette index `n` (0..=255).
    pub const fn bg(n: u16) -> Attr {
        Attr::from_bits_retain((((n as u32) & 0xff) + 1) << BG_SHIFT)
    }

    /// Raw foreground field (0 = unspecified, 1..=256 = color, 257 = default).
    pub const fn fg_field(self) -> u32 {
        (self.bits() & FG_MASK) >> FG_SHIFT
    }

    /// Raw background field, same encoding as [`Attr::fg_field`].
    pub const fn bg_field(self) -> u32 {
        (self.bits() & BG_MASK) >> BG_SHIFT
    }

    /// Strip both color fields.
    pub const fn without_colors(self) -> Attr {
        Attr::from_bits_retain(self.bits() & !(FG_MASK | BG_MASK))
    }

    pub const fn fg_part(self) -> Attr {
        Attr::from_bits_retain(self.bits() & FG_MASK)
    }

    pub const fn bg_part(self) -> Attr {
        Attr::from_bits_retain(self.bits() & BG_MASK)
    }
}

/// The attributes that have dedicated enter/exit capabilities, as opposed to
/// the color fields.
pub const BASIC_ATTRS: Attr = Attr::UNDERLINE
    .union(Attr::BOLD)
    .union(Attr::REVERSE)
    .union(Attr::BLINK)
    .union(Attr::DIM)
    .union(Attr::ACS);

/// Combine two attribute sets, `a` taking priority.
///
/// Flags accumulate; a color specified in `a` replaces the corresponding
/// color of `b`. Whenever `a` carries a color, the terminal's non-color-video
/// set `ncv` is masked out of the result, since those attributes cannot be
/// trusted next to color on such terminals.
pub fn combine(a: Attr, b: Attr, ncv: Attr) -> Attr {
    let mut result = b.union(a.without_colors());
    if a.fg_field() != 0 {
        result = Attr::from_bits_retain((result.bits() & !FG_MASK) | (a.bits() & FG_MASK))
            .difference(ncv);
    }
    if a.bg_field() != 0 {
        result = Attr::from_bits_retain((result.bits() & !BG_MASK) | (a.bits() & BG_MASK))
            .difference(ncv);
    }
    result
}

const BUCKET_COUNT: usize = 337;

/// Bidirectional map between attribute words and small dense indices.
///
/// Open chaining over a fixed bucket array; an attribute keeps its index for
/// the life of the map. Index 0 is always the empty attribute set, which lets
/// callers use 0 for implicitly blank cells without a lookup.
pub struct AttrMap {
    entries: Vec<Entry>,
    buckets: [i32; BUCKET_COUNT],
}

struct Entry {
    attr: Attr,
    next: i32,
}

impl Default for AttrMap {
    fn default() -> Self {
        Self::new()
    }
}

impl AttrMap {
    pub fn new() -> Self {
        let mut map = AttrMap {
            entries: Vec::with_capacity(32),
            buckets: [-1; BUCKET_COUNT],
        };
        map.index_of(Attr::empty());
        map
    }

    /// Index for `attr`, interning it on first sight.
    pub fn index_of(&mut self, attr: Attr) -> u32 {
        let bucket = (attr.bits() as usize) % BUCKET_COUNT;
        let mut ptr = self.buckets[bucket];
        while ptr != -1 {
            let entry = &self.entries[ptr as usize];
            if entry.attr == attr {
                return ptr as u32;
            }
            ptr = entry.next;
        }
        let idx = self.entries.len() as u32;
        self.entries.push(Entry {
            attr,
            next: self.buckets[bucket],
        });
        self.buckets[bucket] = idx as i32;
        idx
    }

    /// Attribute word for a previously interned index. Unknown indices
    /// resolve to the empty set rather than panicking.
    pub fn get(&self, idx: u32) -> Attr {
        self.entries
            .get(idx as usize)
            .map(|e| e.attr)
            .unwrap_or_else(Attr::empty)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_attr_is_index_zero() {
        let mut map = AttrMap::new();
        assert_eq!(map.index_of(Attr::empty()), 0);
        assert_eq!(map.get(0), Attr::empty());
    }

    #[test]
    fn indices_are_stable() {
        let mut map = AttrMap::new();
        let a = map.index_of(Attr::BOLD | Attr::fg(1));
        let b = map.index_of(Attr::UNDERLINE);
        assert_ne!(a, b);
        assert_eq!(map.index_of(Attr::BOLD | Attr::fg(1)), a);
        assert_eq!(map.get(a), Attr::BOLD | Attr::fg(1));
        assert_eq!(map.get(b), Attr::UNDERLINE);
    }

    #[test]
    fn colliding_attrs_chain() {
        // Two words that land in the same bucket must still intern separately.
        let mut map = AttrMap::new();
        let a = Attr::from_bits_retain(BUCKET_COUNT as u32);
        let b = Attr::from_bits_retain(2 * BUCKET_COUNT as u32);
        let ia = map.index_of(a);
        let ib = map.index_of(b);
        assert_ne!(ia, ib);
        assert_eq!(map.get(ia), a);
        assert_eq!(map.get(ib), b);
    }

    #[test]
    fn unknown_index_resolves_to_empty() {
        let map = AttrMap::new();
        assert_eq!(map.get(9999), Attr::empty());
    }

    #[test]
    fn color_fields_round_trip() {
        let attr = Attr::fg(7) | Attr::bg(0);
        assert_eq!(attr.fg_field(), 8);
        assert_eq!(attr.bg_field(), 1);
        assert_eq!(Attr::FG_DEFAULT.fg_field(), COLOR_DEFAULT);
    }

    #[test]
    fn combine_priority_color_wins() {
        let a = Attr::fg(1) | Attr::BOLD;
        let b = Attr::fg(2) | Attr::bg(3) | Attr::UNDERLINE;
        let result = combine(a, b, Attr::empty());
        assert_eq!(result.fg_field(), Attr::fg(1).fg_field());
        assert_eq!(result.bg_field(), Attr::bg(3).bg_field());
        assert!(result.contains(Attr::BOLD | Attr::UNDERLINE));
    }

    #[test]
    fn combine_masks_ncv_when_colored() {
        let ncv = Attr::UNDERLINE;
        let result = combine(Attr::fg(1), Attr::UNDERLINE, ncv);
        assert!(!result.contains(Attr::UNDERLINE));
        // Without a color in `a` the ncv mask does not apply.
        let result = combine(Attr::BOLD, Attr::UNDERLINE, ncv);
        assert!(result.contains(Attr::UNDERLINE));
    }
}
