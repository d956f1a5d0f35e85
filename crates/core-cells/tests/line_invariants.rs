//! Property tests for the line-buffer invariants: after any sequence of
//! writes and clears, `start >= 0`, `start + width <= grid width`, the block
//! widths sum to the line width, and every block header matches its payload.

use core_attr::{Attr, AttrMap};
use core_cells::{block, char_info, varint, Grid};
use proptest::prelude::*;

const GRID_W: i32 = 20;

#[derive(Debug, Clone)]
enum Op {
    Write { x: i32, text: String, attr: u8 },
    ClearToEol { x: i32 },
    Zerowidth { x: i32 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let narrow = prop::sample::select(vec!["a", "b", "xyz", "Ｑ", "aＱb", "ＷＷ", " ", "e"]);
    prop_oneof![
        (0..GRID_W + 2, narrow, 0u8..4).prop_map(|(x, text, attr)| Op::Write {
            x,
            text: text.to_string(),
            attr,
        }),
        (0..GRID_W + 2).prop_map(|x| Op::ClearToEol { x }),
        (0..GRID_W + 2).prop_map(|x| Op::Zerowidth { x }),
    ]
}

fn apply(grid: &mut Grid, attrs: &mut AttrMap, op: &Op) {
    match op {
        Op::Write { x, text, attr } => {
            grid.set_paint(0, *x);
            let idx = attrs.index_of(match attr {
                0 => Attr::empty(),
                1 => Attr::BOLD,
                2 => Attr::REVERSE | Attr::fg(1),
                _ => Attr::UNDERLINE | Attr::bg(4),
            });
            let mut run = Vec::new();
            for c in text.chars() {
                let mut buf = [0u8; 4];
                block::push(&mut run, idx, c.encode_utf8(&mut buf), char_info(c).width == 2);
            }
            grid.write_blocks(attrs, &run);
        }
        Op::ClearToEol { x } => {
            grid.set_paint(0, *x);
            grid.clear_to_eol(attrs);
        }
        Op::Zerowidth { x } => {
            grid.set_paint(0, *x);
            grid.add_zerowidth("\u{301}".as_bytes());
        }
    }
}

fn check_invariants(grid: &Grid) {
    let line = grid.line(0).expect("backed grid");
    assert!(line.start >= 0);
    assert!(line.start + line.width <= GRID_W);
    let mut sum = 0;
    for b in line.blocks() {
        sum += b.width;
        assert!(b.width == 1 || b.width == 2);
        // Header payload count == attr varint + text bytes.
        let encoded = &line.bytes()[b.start..b.end];
        let (header, header_len) = varint::get(encoded);
        assert_eq!((header >> 1) as usize, encoded.len() - header_len);
        assert!(std::str::from_utf8(b.text).is_ok());
    }
    assert_eq!(sum, line.width);
}

proptest! {
    #[test]
    fn line_invariants_hold(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut grid = Grid::backed(1, GRID_W);
        let mut attrs = AttrMap::new();
        for op in &ops {
            apply(&mut grid, &mut attrs, op);
            check_invariants(&grid);
        }
    }

    #[test]
    fn repeated_clear_matches_single_clear(x1 in 0..GRID_W, x2 in 0..GRID_W) {
        let (lo, hi) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let mut a = Grid::backed(1, GRID_W);
        let mut b = Grid::backed(1, GRID_W);
        let mut attrs = AttrMap::new();
        for grid in [&mut a, &mut b] {
            apply(grid, &mut attrs, &Op::Write { x: 0, text: "abcdefghij".into(), attr: 0 });
        }
        // clrtoeol at hi then at lo equals a single clrtoeol at lo.
        apply(&mut a, &mut attrs, &Op::ClearToEol { x: hi });
        apply(&mut a, &mut attrs, &Op::ClearToEol { x: lo });
        apply(&mut b, &mut attrs, &Op::ClearToEol { x: lo });
        let la = a.line(0).unwrap();
        let lb = b.line(0).unwrap();
        prop_assert_eq!(la.bytes(), lb.bytes());
        prop_assert_eq!((la.start, la.width), (lb.start, lb.width));
    }
}
