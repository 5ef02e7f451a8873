//! Property-style checks over generated inputs.

use std::collections::HashMap;

use crate::counted::{Lcg, Counted};
use tessera_core::{Format, Overlap, Rect, Region};
use tessera_graph::{Cache, Graph, GraphTraversal, INVALIDATE_ALIGN, NodeId, VALID_MIPMAPS};

fn random_region(rng: &mut Lcg, span: i32) -> Region {
    let mut region = Region::new();
    for _ in 0..1 + rng.below(6) {
        region.union_with_rect(&rng.rect(span));
    }
    region
}

fn union_all(rects: &[Rect]) -> Region {
    let mut region = Region::new();
    for r in rects {
        region.union_with_rect(r);
    }
    region
}

/// Region of every pixel in `rect` that `region` holds, by brute force.
fn pixels(region: &Region, span: i32) -> Vec<(i32, i32)> {
    Rect::new(0, 0, span, span)
        .iter_coords()
        .filter(|&(x, y)| region.point_in(x, y))
        .collect()
}

#[test]
fn test_region_normalization() {
    let mut rng = Lcg::new(7);
    for _ in 0..200 {
        let mut a = random_region(&mut rng, 40);
        let b = random_region(&mut rng, 40);
        match rng.below(3) {
            0 => a.union(&b),
            1 => a.subtract(&b),
            _ => a.intersect(&b),
        }

        let rects = a.rectangles();
        assert_eq!(union_all(&rects), a);

        // Spans of one band never touch.
        for (i, r) in rects.iter().enumerate() {
            for s in &rects[i + 1..] {
                if r.y == s.y && r.height == s.height {
                    assert!(r.right() < s.x || s.right() < r.x, "{r} touches {s}");
                }
            }
        }

        // Vertically adjacent bands differ in their spans.
        let mut bands: Vec<(i32, i32, Vec<(i32, i32)>)> = Vec::new();
        for r in &rects {
            match bands.last_mut() {
                Some((y, h, spans)) if *y == r.y && *h == r.height => spans.push((r.x, r.width)),
                _ => bands.push((r.y, r.height, vec![(r.x, r.width)])),
            }
        }
        for pair in bands.windows(2) {
            if pair[0].0 + pair[0].1 == pair[1].0 {
                assert_ne!(pair[0].2, pair[1].2, "unmerged bands at y={}", pair[1].0);
            }
        }
    }
}

#[test]
fn test_region_algebra_laws() {
    let mut rng = Lcg::new(11);
    for _ in 0..100 {
        let a = random_region(&mut rng, 32);
        let b = random_region(&mut rng, 32);

        let mut u = a.clone();
        u.union(&b);
        u.subtract(&b);
        for (x, y) in pixels(&u, 32) {
            assert!(a.point_in(x, y) && !b.point_in(x, y));
        }

        let mut ab = a.clone();
        ab.intersect(&b);
        let mut ba = b.clone();
        ba.intersect(&a);
        assert_eq!(ab, ba);

        let mut x = a.clone();
        x.xor(&b);
        let mut expected = a.clone();
        expected.union(&b);
        expected.subtract(&ab);
        assert_eq!(x, expected);
    }
}

#[test]
fn test_rect_in_matches_algebra() {
    let mut rng = Lcg::new(23);
    for _ in 0..300 {
        let g = random_region(&mut rng, 48);
        let r = rng.rect(48);

        let mut outside = Region::from_rect(&r);
        outside.subtract(&g);
        let mut inside = Region::from_rect(&r);
        inside.intersect(&g);

        let expected = if outside.is_empty() {
            Overlap::In
        } else if inside.is_empty() {
            Overlap::Out
        } else {
            Overlap::Part
        };
        assert_eq!(g.rect_in(&r), expected, "rect {r}");
    }
}

#[test]
fn test_cache_round_trip() {
    let mut rng = Lcg::new(5);
    for _ in 0..50 {
        let cache = Cache::new(Rect::new(0, 0, 256, 256), Format::RGBA_F32, 64);
        let r = rng.rect(24);
        let aligned = Rect::new(
            r.x * INVALIDATE_ALIGN,
            r.y * INVALIDATE_ALIGN,
            r.width * INVALIDATE_ALIGN,
            r.height * INVALIDATE_ALIGN,
        );
        for level in 0..VALID_MIPMAPS as u32 {
            cache.computed(&aligned, level);
            assert_eq!(cache.rect_in(&aligned, level), Overlap::In);
        }
        cache.invalidate(Some(&aligned));
        for level in 0..VALID_MIPMAPS as u32 {
            assert_eq!(cache.rect_in(&aligned, level), Overlap::Out);
        }
    }
}

#[test]
fn test_traversal_dependency_order() {
    let mut rng = Lcg::new(99);
    for _ in 0..40 {
        let mut g = Graph::new();
        let mut nodes: Vec<NodeId> = Vec::new();
        let count = 2 + rng.below(12) as usize;
        for i in 0..count {
            if i < 2 {
                nodes.push(g.add_node(Counted::source(Rect::new(0, 0, 16, 16))));
                continue;
            }
            let id = g.add_node(Counted::composer());
            let input = nodes[rng.below(i as u32) as usize];
            g.link(input, id).unwrap();
            if rng.below(2) == 1 {
                let aux = nodes[rng.below(i as u32) as usize];
                g.connect(aux, "output", id, "aux").unwrap();
            }
            nodes.push(id);
        }

        let terminal = *nodes.last().unwrap();
        let t = GraphTraversal::build(&g, terminal);
        let index: HashMap<NodeId, usize> =
            t.dfs_path().iter().enumerate().map(|(i, id)| (*id, i)).collect();
        assert_eq!(index.len(), t.dfs_path().len(), "node visited twice");
        assert_eq!(t.dfs_path().last(), Some(&terminal));

        for &sink in t.dfs_path() {
            for pad in ["input", "aux"] {
                if let Some(src) = g.producer(sink, pad) {
                    let s = index.get(&src.node).expect("producer missing from path");
                    assert!(*s < index[&sink]);
                }
            }
        }
    }
}
