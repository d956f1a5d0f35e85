//! Overlapping window stack over a cell grid.
//!
//! Windows live in an arena and are linked into depth-sorted sibling lists:
//! one list of top-level windows plus one child list per parent. Lower depth
//! draws on top; among equal depths the most recently inserted window wins.
//! Ownership is strictly parent to child; sibling links are adjacency, not
//! ownership, so the arena plus id links represent the "cyclic-looking"
//! structure without actual cycles.
//!
//! The [`Screen`] bundles the arena, the attribute interner, and the two
//! terminal-sized shadow grids (current and scratch). Every public call
//! takes it by reference; there is no global state.

pub mod anchor;
mod compose;
mod paint;

use core_attr::{Attr, AttrMap};
use core_cells::{Grid, LineData};
use thiserror::Error;

use anchor::{AnchorPoint, Relation};

pub use compose::window_at;
pub use paint::{acs, sanitize_attrs};

/// Stable handle to a window in a [`Screen`].
///
/// Plain index into the arena; slots are reused after deletion, so holding a
/// handle across a delete of the same window is a caller bug. A generational
/// id would catch that, worth doing if window churn ever becomes dynamic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(u32);

impl WindowId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DrawError {
    /// Input contained a non-printable codepoint; the rest was drawn.
    #[error("non-printable character passed for display")]
    Nonprint,
    #[error("bad argument")]
    BadArg,
}

#[derive(Debug)]
pub(crate) struct Window {
    pub x: i32,
    pub y: i32,
    pub depth: i32,
    pub relation: Relation,
    pub shown: bool,
    pub grid: Grid,
    /// Clip parent; also owns this window in its child list.
    pub parent: Option<WindowId>,
    /// Window the relation positions against.
    pub anchor: Option<WindowId>,
    /// Secondary clip rectangle.
    pub clamp: Option<WindowId>,
    pub prev: Option<WindowId>,
    pub next: Option<WindowId>,
    pub head: Option<WindowId>,
    pub tail: Option<WindowId>,
}

/// Window arena, attribute interner and the shadow pair.
pub struct Screen {
    wins: Vec<Option<Window>>,
    free: Vec<u32>,
    head: Option<WindowId>,
    tail: Option<WindowId>,
    pub attrs: AttrMap,
    /// What the terminal is believed to display.
    pub(crate) shadow: Grid,
    /// The freshly composed next state.
    pub(crate) scratch: Grid,
    /// Whether ACS fallback glyphs may use precomposed UTF-8.
    pub acs_utf8: bool,
}

impl Screen {
    pub fn new(height: i32, width: i32) -> Screen {
        Screen {
            wins: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            attrs: AttrMap::new(),
            shadow: Grid::backed(height, width),
            scratch: Grid::backed(height, width),
            acs_utf8: false,
        }
    }

    pub fn term_size(&self) -> (i32, i32) {
        (self.shadow.height, self.shadow.width)
    }

    /// Default attributes painted on terminal cells no window covers.
    pub fn set_term_default_attrs(&mut self, attr: Attr) {
        self.shadow.default_attrs = attr;
        self.scratch.default_attrs = attr;
    }

    /// Interned index of the terminal default attributes, the attribute an
    /// implicitly blank shadow cell carries.
    pub fn blank_index(&mut self) -> u32 {
        let attr = self.shadow.default_attrs;
        self.attrs.index_of(attr)
    }

    pub fn term_default_attrs(&self) -> Attr {
        self.shadow.default_attrs
    }

    /// Resize both shadow grids after the terminal changed size.
    pub fn resize_term(&mut self, height: i32, width: i32) -> bool {
        let Screen {
            shadow,
            scratch,
            attrs,
            ..
        } = self;
        shadow.resize(attrs, height, width) && scratch.resize(attrs, height, width)
    }

    /// Forget the believed terminal contents, forcing a full repaint.
    pub fn clear_shadow(&mut self) {
        let Screen { shadow, attrs, .. } = self;
        shadow.set_paint(0, 0);
        shadow.clear_to_bottom(attrs);
    }

    /// Previous and freshly composed state of one terminal row.
    pub fn diff_lines(&self, line: i32) -> Option<(&LineData, &LineData)> {
        Some((self.shadow.line(line)?, self.scratch.line(line)?))
    }

    /// Adopt the composed row as the believed terminal contents.
    pub fn promote_line(&mut self, line: i32) {
        let Screen {
            shadow, scratch, ..
        } = self;
        if let (Some(old), Some(new)) = (shadow.line_mut(line), scratch.line_mut(line)) {
            std::mem::swap(old, new);
        }
    }

    // ---- arena ----------------------------------------------------------

    pub(crate) fn node(&self, id: WindowId) -> Option<&Window> {
        self.wins.get(id.0 as usize)?.as_ref()
    }

    pub(crate) fn node_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.wins.get_mut(id.0 as usize)?.as_mut()
    }

    fn alloc(&mut self, win: Window) -> WindowId {
        match self.free.pop() {
            Some(slot) => {
                self.wins[slot as usize] = Some(win);
                WindowId(slot)
            }
            None => {
                self.wins.push(Some(win));
                WindowId(self.wins.len() as u32 - 1)
            }
        }
    }

    // ---- window lifecycle -----------------------------------------------

    /// Create a window. With a parent, the window is clipped by it, joins
    /// its child list, and is anchored to its top-left corner; without one
    /// it is positioned absolutely among the top-level windows.
    pub fn new_window(
        &mut self,
        parent: Option<WindowId>,
        height: i32,
        width: i32,
        y: i32,
        x: i32,
        depth: i32,
    ) -> Result<WindowId, DrawError> {
        self.create(parent, Grid::backed(height, width), y, x, depth)
    }

    /// Create a window without line storage: it only positions and clips
    /// descendants, and drawing into it fails.
    pub fn new_unbacked(
        &mut self,
        parent: Option<WindowId>,
        height: i32,
        width: i32,
        y: i32,
        x: i32,
        depth: i32,
    ) -> Result<WindowId, DrawError> {
        self.create(parent, Grid::unbacked(height, width), y, x, depth)
    }

    fn create(
        &mut self,
        parent: Option<WindowId>,
        grid: Grid,
        y: i32,
        x: i32,
        depth: i32,
    ) -> Result<WindowId, DrawError> {
        if grid.height <= 0 || grid.width <= 0 {
            return Err(DrawError::BadArg);
        }
        if let Some(p) = parent {
            if self.node(p).is_none() {
                return Err(DrawError::BadArg);
            }
        }
        let relation = if parent.is_some() {
            Relation::new(AnchorPoint::TopLeft, AnchorPoint::TopLeft)
        } else {
            Relation::ABSOLUTE
        };
        let id = self.alloc(Window {
            x,
            y,
            depth,
            relation,
            shown: false,
            grid,
            parent,
            anchor: parent,
            clamp: None,
            prev: None,
            next: None,
            head: None,
            tail: None,
        });
        self.insert_sorted(id);
        Ok(id)
    }

    /// Destroy a window and, recursively, all of its children.
    pub fn del_window(&mut self, id: WindowId) {
        let Some(win) = self.node(id) else { return };
        let mut child = win.head;
        while let Some(c) = child {
            let next = self.node(c).and_then(|w| w.next);
            self.del_window(c);
            child = next;
        }
        self.remove_from_list(id);
        // Detach dangling anchor/clamp references to this window.
        for slot in self.wins.iter_mut().flatten() {
            if slot.anchor == Some(id) {
                slot.anchor = None;
                slot.relation = Relation::ABSOLUTE;
            }
            if slot.clamp == Some(id) {
                slot.clamp = None;
            }
        }
        self.wins[id.0 as usize] = None;
        self.free.push(id.0);
    }

    // ---- depth lists -----------------------------------------------------

    fn head_of(&self, parent: Option<WindowId>) -> Option<WindowId> {
        match parent {
            None => self.head,
            Some(p) => self.node(p).and_then(|w| w.head),
        }
    }

    fn tail_of(&self, parent: Option<WindowId>) -> Option<WindowId> {
        match parent {
            None => self.tail,
            Some(p) => self.node(p).and_then(|w| w.tail),
        }
    }

    fn set_head_of(&mut self, parent: Option<WindowId>, value: Option<WindowId>) {
        match parent {
            None => self.head = value,
            Some(p) => {
                if let Some(w) = self.node_mut(p) {
                    w.head = value;
                }
            }
        }
    }

    fn set_tail_of(&mut self, parent: Option<WindowId>, value: Option<WindowId>) {
        match parent {
            None => self.tail = value,
            Some(p) => {
                if let Some(w) = self.node_mut(p) {
                    w.tail = value;
                }
            }
        }
    }

    /// Splice into the sibling list before the first deeper-or-equal window,
    /// so a new window paints above existing windows of the same depth.
    fn insert_sorted(&mut self, id: WindowId) {
        let Some(win) = self.node(id) else { return };
        let parent = win.parent;
        let depth = win.depth;

        let mut at = self.head_of(parent);
        while let Some(p) = at {
            match self.node(p) {
                Some(w) if w.depth < depth => at = w.next,
                _ => break,
            }
        }
        match at {
            None => {
                let old_tail = self.tail_of(parent);
                if let Some(w) = self.node_mut(id) {
                    w.prev = old_tail;
                    w.next = None;
                }
                match old_tail {
                    Some(t) => {
                        if let Some(w) = self.node_mut(t) {
                            w.next = Some(id);
                        }
                    }
                    None => self.set_head_of(parent, Some(id)),
                }
                self.set_tail_of(parent, Some(id));
            }
            Some(next) => {
                let prev = self.node(next).and_then(|w| w.prev);
                if let Some(w) = self.node_mut(id) {
                    w.prev = prev;
                    w.next = Some(next);
                }
                if let Some(w) = self.node_mut(next) {
                    w.prev = Some(id);
                }
                match prev {
                    Some(p) => {
                        if let Some(w) = self.node_mut(p) {
                            w.next = Some(id);
                        }
                    }
                    None => self.set_head_of(parent, Some(id)),
                }
            }
        }
    }

    fn remove_from_list(&mut self, id: WindowId) {
        let Some(win) = self.node(id) else { return };
        let (parent, prev, next) = (win.parent, win.prev, win.next);
        match next {
            Some(n) => {
                if let Some(w) = self.node_mut(n) {
                    w.prev = prev;
                }
            }
            None => self.set_tail_of(parent, prev),
        }
        match prev {
            Some(p) => {
                if let Some(w) = self.node_mut(p) {
                    w.next = next;
                }
            }
            None => self.set_head_of(parent, next),
        }
        if let Some(w) = self.node_mut(id) {
            w.prev = None;
            w.next = None;
        }
    }

    // ---- attributes of a window -----------------------------------------

    pub fn set_depth(&mut self, id: WindowId, depth: i32) {
        self.remove_from_list(id);
        if let Some(w) = self.node_mut(id) {
            w.depth = depth;
        }
        self.insert_sorted(id);
    }

    /// Re-parent a window; it moves to the new parent's child list (or the
    /// top-level list) keeping its depth discipline.
    pub fn set_parent(&mut self, id: WindowId, parent: Option<WindowId>) -> Result<(), DrawError> {
        if let Some(p) = parent {
            if self.node(p).is_none() || p == id {
                return Err(DrawError::BadArg);
            }
        }
        self.remove_from_list(id);
        let Some(w) = self.node_mut(id) else {
            return Err(DrawError::BadArg);
        };
        w.parent = parent;
        if w.anchor.is_none() {
            w.anchor = parent;
        }
        self.insert_sorted(id);
        Ok(())
    }

    /// Anchor `id` to a corner of `anchor`; `None` requires an absolute
    /// relation.
    pub fn set_anchor(
        &mut self,
        id: WindowId,
        anchor: Option<WindowId>,
        relation: Relation,
    ) -> Result<(), DrawError> {
        if anchor.is_none() && relation.parent_point() != AnchorPoint::Absolute {
            return Err(DrawError::BadArg);
        }
        if let Some(a) = anchor {
            if self.node(a).is_none() {
                return Err(DrawError::BadArg);
            }
        }
        let Some(w) = self.node_mut(id) else {
            return Err(DrawError::BadArg);
        };
        w.anchor = anchor;
        w.relation = relation;
        Ok(())
    }

    /// Restrict the window's visible region to another window's rectangle.
    pub fn set_restrict(&mut self, id: WindowId, clamp: Option<WindowId>) -> Result<(), DrawError> {
        if let Some(c) = clamp {
            if self.node(c).is_none() {
                return Err(DrawError::BadArg);
            }
        }
        let Some(w) = self.node_mut(id) else {
            return Err(DrawError::BadArg);
        };
        w.clamp = clamp;
        Ok(())
    }

    pub fn set_default_attrs(&mut self, id: WindowId, attr: Attr) {
        if let Some(w) = self.node_mut(id) {
            w.grid.default_attrs = attr;
        }
    }

    pub fn show(&mut self, id: WindowId) {
        if let Some(w) = self.node_mut(id) {
            w.shown = true;
        }
    }

    pub fn hide(&mut self, id: WindowId) {
        if let Some(w) = self.node_mut(id) {
            w.shown = false;
        }
    }

    pub fn is_shown(&self, id: WindowId) -> bool {
        self.node(id).map(|w| w.shown).unwrap_or(false)
    }

    pub fn move_to(&mut self, id: WindowId, y: i32, x: i32) {
        if let Some(w) = self.node_mut(id) {
            w.y = y;
            w.x = x;
        }
    }

    pub fn resize(&mut self, id: WindowId, height: i32, width: i32) -> Result<(), DrawError> {
        let Screen { wins, attrs, .. } = self;
        let Some(w) = wins.get_mut(id.0 as usize).and_then(Option::as_mut) else {
            return Err(DrawError::BadArg);
        };
        if w.grid.resize(attrs, height, width) {
            Ok(())
        } else {
            Err(DrawError::BadArg)
        }
    }

    pub fn width(&self, id: WindowId) -> i32 {
        self.node(id).map(|w| w.grid.width).unwrap_or(0)
    }

    pub fn height(&self, id: WindowId) -> i32 {
        self.node(id).map(|w| w.grid.height).unwrap_or(0)
    }

    pub fn pos(&self, id: WindowId) -> (i32, i32) {
        self.node(id).map(|w| (w.y, w.x)).unwrap_or((0, 0))
    }

    pub fn depth(&self, id: WindowId) -> i32 {
        self.node(id).map(|w| w.depth).unwrap_or(0)
    }

    pub fn parent(&self, id: WindowId) -> Option<WindowId> {
        self.node(id).and_then(|w| w.parent)
    }

    pub fn relation(&self, id: WindowId) -> (Option<WindowId>, Relation) {
        self.node(id)
            .map(|w| (w.anchor, w.relation))
            .unwrap_or((None, Relation::ABSOLUTE))
    }

    /// Absolute column of the window's left edge, composed along the anchor
    /// chain.
    pub fn abs_x(&self, id: WindowId) -> i32 {
        compose::abs_x(&self.wins, id)
    }

    /// Absolute row of the window's top edge.
    pub fn abs_y(&self, id: WindowId) -> i32 {
        compose::abs_y(&self.wins, id)
    }

    pub(crate) fn top_tail(&self) -> Option<WindowId> {
        self.tail
    }

    pub(crate) fn wins_slice(&self) -> &[Option<Window>] {
        &self.wins
    }
}

#[cfg(test)]
mod tests {
    use super::anchor::{AnchorPoint, Relation};
    use super::*;

    #[test]
    fn depth_list_orders_shallow_to_deep() {
        let mut s = Screen::new(10, 10);
        let deep = s.new_window(None, 1, 1, 0, 0, 5).unwrap();
        let shallow = s.new_window(None, 1, 1, 0, 0, 1).unwrap();
        let middle = s.new_window(None, 1, 1, 0, 0, 3).unwrap();
        let mut order = Vec::new();
        let mut at = s.head;
        while let Some(id) = at {
            order.push(id);
            at = s.node(id).unwrap().next;
        }
        assert_eq!(order, vec![shallow, middle, deep]);
    }

    #[test]
    fn equal_depth_inserts_before_existing() {
        let mut s = Screen::new(10, 10);
        let first = s.new_window(None, 1, 1, 0, 0, 0).unwrap();
        let second = s.new_window(None, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(s.head, Some(second));
        assert_eq!(s.tail, Some(first));
    }

    #[test]
    fn set_depth_reorders() {
        let mut s = Screen::new(10, 10);
        let a = s.new_window(None, 1, 1, 0, 0, 0).unwrap();
        let b = s.new_window(None, 1, 1, 0, 0, 1).unwrap();
        s.set_depth(a, 2);
        assert_eq!(s.head, Some(b));
        assert_eq!(s.tail, Some(a));
    }

    #[test]
    fn children_live_on_parent_list() {
        let mut s = Screen::new(10, 10);
        let parent = s.new_window(None, 4, 4, 0, 0, 0).unwrap();
        let child = s.new_window(Some(parent), 2, 2, 0, 0, 0).unwrap();
        assert_eq!(s.head, Some(parent));
        assert_eq!(s.node(parent).unwrap().head, Some(child));
        assert_eq!(s.parent(child), Some(parent));
    }

    #[test]
    fn delete_removes_children_and_links() {
        let mut s = Screen::new(10, 10);
        let parent = s.new_window(None, 4, 4, 0, 0, 0).unwrap();
        let child = s.new_window(Some(parent), 2, 2, 0, 0, 0).unwrap();
        let other = s.new_window(None, 2, 2, 0, 0, 1).unwrap();
        s.set_anchor(other, Some(child), Relation::new(AnchorPoint::TopRight, AnchorPoint::TopLeft))
            .unwrap();
        s.del_window(parent);
        assert!(s.node(parent).is_none());
        assert!(s.node(child).is_none());
        // The anchor link to the destroyed window is dropped.
        assert_eq!(s.relation(other), (None, Relation::ABSOLUTE));
        assert_eq!(s.head, Some(other));
    }

    #[test]
    fn anchor_arithmetic() {
        let mut s = Screen::new(24, 80);
        let base = s.new_window(None, 10, 20, 2, 5, 0).unwrap();
        let right = s.new_window(None, 4, 6, 0, 0, 0).unwrap();
        s.set_anchor(
            right,
            Some(base),
            Relation::new(AnchorPoint::TopRight, AnchorPoint::TopLeft),
        )
        .unwrap();
        assert_eq!(s.abs_x(right), 5 + 20);
        assert_eq!(s.abs_y(right), 2);

        // Anchor own bottom-right to base's bottom-right: flush inside.
        s.set_anchor(
            right,
            Some(base),
            Relation::new(AnchorPoint::BottomRight, AnchorPoint::BottomRight),
        )
        .unwrap();
        assert_eq!(s.abs_x(right), 5 + 20 - 6);
        assert_eq!(s.abs_y(right), 2 + 10 - 4);
    }

    #[test]
    fn negative_offset_from_right_anchor() {
        let mut s = Screen::new(24, 80);
        let base = s.new_window(None, 10, 20, 0, 10, 0).unwrap();
        let w = s.new_window(None, 1, 4, 0, -4, 0).unwrap();
        s.set_anchor(
            w,
            Some(base),
            Relation::new(AnchorPoint::TopRight, AnchorPoint::TopLeft),
        )
        .unwrap();
        // Anchored to the right edge, shifted back by its own width.
        assert_eq!(s.abs_x(w), 10 + 20 - 4);
    }

    #[test]
    fn anchor_without_window_must_be_absolute() {
        let mut s = Screen::new(10, 10);
        let w = s.new_window(None, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            s.set_anchor(w, None, Relation::new(AnchorPoint::TopRight, AnchorPoint::TopLeft)),
            Err(DrawError::BadArg)
        );
        assert!(s.set_anchor(w, None, Relation::ABSOLUTE).is_ok());
    }

    #[test]
    fn zero_sized_window_is_rejected() {
        let mut s = Screen::new(10, 10);
        assert_eq!(s.new_window(None, 0, 5, 0, 0, 0), Err(DrawError::BadArg));
        assert_eq!(s.new_window(None, 5, -1, 0, 0, 0), Err(DrawError::BadArg));
    }
}
