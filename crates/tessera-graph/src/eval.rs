//! Reusable evaluation of one node.
//!
//! An [`EvalManager`] keeps the [`GraphTraversal`] of its node between
//! requests. It subscribes to the node's invalidations; any change upstream
//! (parameters, wiring, passthrough) flags the traversal for a rebuild and a
//! new prepare pass before the next request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tessera_core::{Buffer, Rect};
use tracing::{trace, warn};

use crate::graph::Graph;
use crate::node::NodeId;
use crate::traversal::GraphTraversal;

/// Cached traversal plus its staleness flag.
#[derive(Debug)]
pub struct EvalManager {
    node: NodeId,
    traversal: Option<GraphTraversal>,
    needs_prepare: Arc<AtomicBool>,
}

impl EvalManager {
    /// Creates a manager for `node` and subscribes it to invalidations.
    ///
    /// The subscription ends when the manager is dropped.
    pub fn new(graph: &Graph, node: NodeId) -> Self {
        let needs_prepare = Arc::new(AtomicBool::new(true));
        let weak = Arc::downgrade(&needs_prepare);
        let subscribed = graph.add_invalidation_listener(node, move |_rect| match weak.upgrade() {
            Some(flag) => {
                flag.store(true, Ordering::Release);
                true
            }
            None => false,
        });
        if let Err(err) = subscribed {
            warn!(%node, %err, "evaluation of a missing node");
        }
        Self {
            node,
            traversal: None,
            needs_prepare,
        }
    }

    /// Node being evaluated.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Traversal of the last request, if any.
    pub fn traversal(&self) -> Option<&GraphTraversal> {
        self.traversal.as_ref()
    }

    /// Returns `true` if the next request rebuilds the traversal.
    pub fn needs_prepare(&self) -> bool {
        self.needs_prepare.load(Ordering::Acquire)
    }

    fn ready(&mut self, graph: &Graph) -> &mut GraphTraversal {
        let stale = self.needs_prepare.swap(false, Ordering::AcqRel);
        let node = self.node;
        let fresh = self.traversal.is_none();
        let traversal = self
            .traversal
            .get_or_insert_with(|| GraphTraversal::build(graph, node));
        if stale || fresh {
            trace!(%node, "preparing traversal");
            if !fresh {
                traversal.rebuild(graph, node);
            }
            traversal.prepare(graph);
        }
        traversal
    }

    /// Evaluates `roi` (level-0 coordinates) at `level`.
    ///
    /// Returns the output buffer, or `None` for a node without output.
    pub fn apply(&mut self, graph: &Graph, roi: &Rect, level: u32) -> Option<Buffer> {
        let traversal = self.ready(graph);
        traversal.prepare_request(graph, roi, level);
        traversal.process(graph, level)
    }

    /// Bounding box of the node after a prepare pass.
    pub fn bounding_box(&mut self, graph: &Graph) -> Rect {
        self.ready(graph).bounding_box(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ProcessContext;
    use crate::error::OperationError;
    use crate::operation::{NodeView, Nop, Operation, OperationKind};
    use std::any::Any;
    use tessera_core::Format;

    #[derive(Debug)]
    struct Fill {
        value: f32,
        extent: Rect,
    }

    impl Operation for Fill {
        fn name(&self) -> &str {
            "test:fill"
        }
        fn kind(&self) -> OperationKind {
            OperationKind::Source
        }
        fn bounding_box(&self, _node: &NodeView<'_>) -> Rect {
            self.extent
        }
        fn process(
            &self,
            ctx: &mut ProcessContext<'_>,
            pad: &str,
            result: &Rect,
            _level: u32,
        ) -> Result<(), OperationError> {
            let out = ctx.output_target(result);
            let n = ctx.level_rect(result).area() as usize;
            ctx.write_output(&out, result, Format::Y_F32, &vec![self.value; n])?;
            ctx.set_output(pad, out);
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_configure_flags_prepare() {
        let mut g = Graph::new();
        let src = g.add_node(Fill {
            value: 0.25,
            extent: Rect::new(0, 0, 8, 8),
        });
        let out = g.add_node(Nop);
        g.link(src, out).unwrap();

        let mut em = EvalManager::new(&g, out);
        assert!(em.needs_prepare());
        let roi = Rect::new(0, 0, 2, 2);
        let buf = em.apply(&g, &roi, 0).unwrap();
        assert!(!em.needs_prepare());
        let px = buf.read(&roi, 0).unwrap();
        approx::assert_relative_eq!(px[0], 0.25);

        g.configure::<Fill, _>(src, |f| {
            f.value = 0.5;
            f.extent = Rect::new(0, 0, 16, 16);
        })
        .unwrap();
        assert!(em.needs_prepare());
        assert_eq!(em.bounding_box(&g), Rect::new(0, 0, 16, 16));
        let buf = em.apply(&g, &roi, 0).unwrap();
        let px = buf.read(&roi, 0).unwrap();
        approx::assert_relative_eq!(px[4], 0.5);
    }

    #[test]
    fn test_listener_dropped_with_manager() {
        let mut g = Graph::new();
        let src = g.add_node(Fill {
            value: 1.0,
            extent: Rect::new(0, 0, 4, 4),
        });
        let em = EvalManager::new(&g, src);
        drop(em);
        g.invalidate(src, None, false);
        let node = g.node(src).unwrap();
        assert!(tessera_core::sync::lock(&node.listeners).is_empty());
    }
}
