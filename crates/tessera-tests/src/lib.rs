//! Integration tests for the tessera crates.
//!
//! Scenario tests drive the engine with the instrumented [`counted::Counted`]
//! operation and check what was computed, and how often. Pipeline tests run
//! the reference operations from `tessera-ops` end to end.

pub mod counted;

#[cfg(test)]
mod properties;

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::counted::{Counted, add_counted};
    use tessera_core::Overlap;
    use tessera_graph::prelude::*;
    use tessera_graph::{EngineConfig, GraphTraversal};

    /// Two-node pipeline: no expansion, one call per node.
    #[test]
    fn test_two_node_pipeline() {
        let mut g = Graph::new();
        let (src, src_log) = add_counted(&mut g, Counted::source(Rect::new(0, 0, 100, 100)));
        let (flt, flt_log) = add_counted(&mut g, Counted::point());
        g.link(src, flt).unwrap();

        let roi = Rect::new(10, 10, 20, 20);
        let mut t = GraphTraversal::build(&g, flt);
        t.prepare(&g);
        t.prepare_request(&g, &roi, 0);
        assert_eq!(t.context(flt).unwrap().result_rect(), roi);
        assert_eq!(t.context(src).unwrap().result_rect(), roi);

        let out = t.process(&g, 0).unwrap();
        assert_eq!(src_log.calls(), 1);
        assert_eq!(flt_log.calls(), 1);
        assert_eq!(flt_log.rects(), vec![roi]);
        assert_eq!(out.read(&roi, 0).unwrap(), vec![2.0; 400]);
        assert_eq!(t.stats().calls(), 2);
    }

    /// Area operation widens the source's need rectangle.
    #[test]
    fn test_area_expansion() {
        let mut g = Graph::new();
        let (src, _) = add_counted(&mut g, Counted::source(Rect::new(0, 0, 200, 200)));
        let (blur, _) = add_counted(&mut g, Counted::area(5));
        g.link(src, blur).unwrap();

        let mut t = GraphTraversal::build(&g, blur);
        t.prepare(&g);
        t.prepare_request(&g, &Rect::new(50, 50, 10, 10), 0);
        assert_eq!(t.context(src).unwrap().need_rect(), Rect::new(45, 45, 20, 20));

        // Near the edge the need is clipped to the source's bounding box.
        t.prepare_request(&g, &Rect::new(0, 0, 10, 10), 0);
        assert_eq!(t.context(src).unwrap().need_rect(), Rect::new(0, 0, 15, 15));
    }

    /// Invalidating a node touches it and its consumers, never its producers.
    #[test]
    fn test_invalidation_downstream_only() {
        let mut g = Graph::new();
        let (up, up_log) = add_counted(&mut g, Counted::source(Rect::new(0, 0, 64, 64)));
        let (a, a_log) = add_counted(&mut g, Counted::point());
        let (b, _) = add_counted(&mut g, Counted::area(2));
        let (c, _) = add_counted(&mut g, Counted::point());
        g.link_many(&[up, a, b, c]).unwrap();

        let roi = Rect::new(0, 0, 32, 32);
        g.apply(c, &roi, 0).unwrap();

        let seen: Arc<Mutex<Vec<(char, Rect)>>> = Arc::default();
        for (tag, id) in [('u', up), ('a', a), ('b', b), ('c', c)] {
            let seen = Arc::clone(&seen);
            g.add_invalidation_listener(id, move |r| {
                seen.lock().unwrap().push((tag, *r));
                true
            })
            .unwrap();
        }

        let dirty = Rect::new(8, 8, 8, 8);
        g.invalidate(a, Some(&dirty), false);

        let seen = seen.lock().unwrap().clone();
        assert!(seen.iter().all(|(tag, _)| *tag != 'u'));
        assert!(seen.contains(&('a', dirty)));
        assert!(seen.contains(&('b', Rect::new(6, 6, 12, 12))));
        assert!(seen.contains(&('c', Rect::new(6, 6, 12, 12))));

        let up_cache = g.cache(up).unwrap();
        assert_eq!(up_cache.rect_in(&Rect::new(0, 0, 34, 34), 0), Overlap::In);
        for id in [a, b, c] {
            assert_eq!(g.cache(id).unwrap().rect_in(&dirty, 0), Overlap::Out);
        }

        g.apply(c, &roi, 0).unwrap();
        assert_eq!(up_log.calls(), 1);
        assert_eq!(a_log.calls(), 2);
    }

    /// Chunked rendering never exceeds the chunk area and covers the request.
    #[test]
    fn test_processor_chunking() {
        let mut g = Graph::new();
        let (src, _) = add_counted(&mut g, Counted::source(Rect::new(0, 0, 30, 30)));
        let (flt, flt_log) = add_counted(&mut g, Counted::point());
        g.link(src, flt).unwrap();

        let mut p = Processor::new(&g, flt, None).unwrap().with_chunk_size(100);
        assert_eq!(flt_log.calls(), 0);
        let mut steps = 0;
        while p.work(&g, None).unwrap() {
            steps += 1;
            assert!(steps < 10_000, "processor never finished");
        }

        let rects = flt_log.rects();
        assert!(rects.len() >= 9);
        assert!(rects.iter().all(|r| r.area() <= 100));
        assert_eq!(rects.iter().map(Rect::area).sum::<u64>(), 900);
        assert_eq!(
            g.cache(flt).unwrap().rect_in(&Rect::new(0, 0, 30, 30), 0),
            Overlap::In
        );
        approx::assert_relative_eq!(p.progress(&g), 1.0);
    }

    /// Rendering the same request twice computes nothing the second time.
    #[test]
    fn test_idempotent_rerender() {
        let mut g = Graph::new();
        let (src, src_log) = add_counted(&mut g, Counted::source(Rect::new(0, 0, 128, 128)));
        let (blur, blur_log) = add_counted(&mut g, Counted::area(3));
        let (pt, pt_log) = add_counted(&mut g, Counted::point());
        g.link_many(&[src, blur, pt]).unwrap();

        let roi = Rect::new(20, 20, 40, 40);
        let first = g.apply(pt, &roi, 0).unwrap().read(&roi, 0).unwrap();
        let calls = (src_log.calls(), blur_log.calls(), pt_log.calls());
        assert_eq!(calls, (1, 1, 1));

        let second = g.apply(pt, &roi, 0).unwrap().read(&roi, 0).unwrap();
        assert_eq!((src_log.calls(), blur_log.calls(), pt_log.calls()), calls);
        assert_eq!(first, second);

        let mut dst = vec![0.0f32; roi.area() as usize];
        g.blit(pt, 1.0, &roi, Format::Y_F32, Some(&mut dst), roi.width as usize, BlitFlags::empty())
            .unwrap();
        assert_eq!((src_log.calls(), blur_log.calls(), pt_log.calls()), calls);
        assert_eq!(dst, first);
    }

    /// Re-rendering through a cacheless nop runs no operation.
    #[test]
    fn test_idempotent_rerender_through_nop() {
        let mut g = Graph::new();
        let (src, src_log) = add_counted(&mut g, Counted::source(Rect::new(0, 0, 64, 64)));
        let tail = g.add_node(tessera_graph::Nop);
        g.link(src, tail).unwrap();

        let roi = Rect::new(8, 8, 16, 16);
        let first = g.apply(tail, &roi, 0).unwrap().read(&roi, 0).unwrap();
        assert_eq!(src_log.calls(), 1);

        let mut t = GraphTraversal::build(&g, tail);
        t.prepare(&g);
        t.prepare_request(&g, &roi, 0);
        let second = t.process(&g, 0).unwrap().read(&roi, 0).unwrap();
        assert_eq!(t.stats().calls(), 0);
        assert_eq!(src_log.calls(), 1);
        assert_eq!(first, second);
    }

    /// A failing node yields an empty buffer; downstream keeps working.
    #[test]
    fn test_failure_becomes_empty() {
        let mut g = Graph::new();
        let (src, _) = add_counted(&mut g, Counted::source(Rect::new(0, 0, 16, 16)));
        let (bad, bad_log) = add_counted(&mut g, Counted::point().failing());
        let (last, _) = add_counted(&mut g, Counted::point());
        g.link_many(&[src, bad, last]).unwrap();

        let roi = Rect::new(0, 0, 4, 4);
        let out = g.apply(last, &roi, 0).unwrap();
        assert_eq!(bad_log.calls(), 1);
        assert_eq!(out.read(&roi, 0).unwrap(), vec![1.0; 16]);
    }

    /// Cached-only blits return what is there without computing.
    #[test]
    fn test_blit_cache_only() {
        let mut g = Graph::new();
        let (src, src_log) = add_counted(&mut g, Counted::source(Rect::new(0, 0, 8, 8)));
        let roi = Rect::new(0, 0, 8, 8);
        let mut dst = vec![-1.0f32; 64];
        let flags = BlitFlags::CACHE | BlitFlags::DIRTY;
        g.blit(src, 1.0, &roi, Format::Y_F32, Some(&mut dst), 8, flags).unwrap();
        assert_eq!(src_log.calls(), 0);
        assert!(dst.iter().all(|v| *v == 0.0));

        g.blit(src, 1.0, &roi, Format::Y_F32, Some(&mut dst), 8, BlitFlags::CACHE)
            .unwrap();
        assert_eq!(src_log.calls(), 1);
        assert!(dst.iter().all(|v| *v == 1.0));
    }

    /// Worker bands produce the same pixels as one evaluation.
    #[test]
    fn test_bands_match_single_thread() {
        use tessera_ops::{BoxBlur, Checkerboard};

        let render = |threads: usize| {
            let config = EngineConfig::builder()
                .threads(threads)
                .min_band_area(16)
                .build();
            let mut g = Graph::with_config(config);
            let src = g.add_node(Checkerboard::new(3));
            let blur = g.add_node(BoxBlur::new(2));
            g.link(src, blur).unwrap();
            let roi = Rect::new(-7, 5, 40, 24);
            let mut dst = vec![0.0f32; roi.area() as usize * 4];
            g.blit(blur, 1.0, &roi, Format::RGBA_F32, Some(&mut dst), 160, BlitFlags::empty())
                .unwrap();
            dst
        };
        let single = render(1);
        let banded = render(4);
        for (a, b) in single.iter().zip(&banded) {
            approx::assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }
}
