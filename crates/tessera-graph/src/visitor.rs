//! Generic dependency-graph traversal.
//!
//! Anything that can list the upstream vertices of a vertex implements
//! [`Visitable`]; a [`Visitor`] receives vertices in the chosen order.
//!
//! - [`dfs_traverse`] visits dependencies before dependents (post-order).
//! - [`bfs_traverse`] visits, starting from the terminal, every vertex only
//!   after all of its consumers, which is what need propagation requires.
//!
//! Both walks are iterative. A cycle is a wiring bug: the back edge is
//! logged and skipped, so the walk always terminates.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

use tracing::error;

/// A graph whose vertices can be walked.
pub trait Visitable {
    /// Vertex handle.
    type Vertex: Copy + Eq + Hash + Debug;

    /// Direct upstream vertices of `vertex`, without duplicates.
    fn depends_on(&self, vertex: Self::Vertex) -> Vec<Self::Vertex>;

    /// Hands `vertex` to `visitor`.
    fn accept(&self, vertex: Self::Vertex, visitor: &mut dyn Visitor<Self::Vertex>) {
        visitor.visit(vertex);
    }
}

/// Receives vertices during a walk.
pub trait Visitor<V> {
    /// Called once per reachable vertex.
    fn visit(&mut self, vertex: V);
}

/// Visitor that records the visiting order.
#[derive(Debug, Clone, Default)]
pub struct PathCollector<V> {
    /// Vertices in visiting order.
    pub path: Vec<V>,
}

impl<V> Visitor<V> for PathCollector<V> {
    fn visit(&mut self, vertex: V) {
        self.path.push(vertex);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Grey,
    Black,
}

/// Depth-first post-order walk from `start`: every vertex is visited after
/// all vertices it depends on.
pub fn dfs_traverse<G>(graph: &G, start: G::Vertex, visitor: &mut dyn Visitor<G::Vertex>)
where
    G: Visitable + ?Sized,
{
    let mut marks: HashMap<G::Vertex, Mark> = HashMap::new();
    let mut stack: Vec<(G::Vertex, Vec<G::Vertex>, usize)> = Vec::new();
    marks.insert(start, Mark::Grey);
    stack.push((start, graph.depends_on(start), 0));

    while let Some((vertex, deps, next)) = stack.last_mut() {
        if let Some(&dep) = deps.get(*next) {
            *next += 1;
            match marks.entry(dep) {
                Entry::Vacant(slot) => {
                    slot.insert(Mark::Grey);
                    let dep_deps = graph.depends_on(dep);
                    stack.push((dep, dep_deps, 0));
                }
                Entry::Occupied(slot) if *slot.get() == Mark::Grey => {
                    error!(from = ?vertex, to = ?dep, "cycle detected during traversal; edge skipped");
                }
                Entry::Occupied(_) => {}
            }
        } else {
            let vertex = *vertex;
            stack.pop();
            marks.insert(vertex, Mark::Black);
            graph.accept(vertex, visitor);
        }
    }
}

/// Consumer-first walk from `start`: a vertex is visited once every
/// reachable vertex that depends on it has been visited.
pub fn bfs_traverse<G>(graph: &G, start: G::Vertex, visitor: &mut dyn Visitor<G::Vertex>)
where
    G: Visitable + ?Sized,
{
    let reachable = dfs_path(graph, start);
    let mut pending: HashMap<G::Vertex, usize> = reachable.iter().map(|v| (*v, 0)).collect();
    let deps: HashMap<G::Vertex, Vec<G::Vertex>> = reachable
        .iter()
        .map(|v| (*v, graph.depends_on(*v)))
        .collect();
    for list in deps.values() {
        for dep in list {
            if let Some(count) = pending.get_mut(dep) {
                *count += 1;
            }
        }
    }

    let mut visited: HashSet<G::Vertex> = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(vertex) = queue.pop_front() {
        if !visited.insert(vertex) {
            continue;
        }
        graph.accept(vertex, visitor);
        for dep in deps.get(&vertex).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dep) {
                if *count > 0 {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(*dep);
                    }
                }
            }
        }
    }
}

/// Dependency-first order of everything reachable from `start`.
pub fn dfs_path<G>(graph: &G, start: G::Vertex) -> Vec<G::Vertex>
where
    G: Visitable + ?Sized,
{
    let mut collector = PathCollector { path: Vec::new() };
    dfs_traverse(graph, start, &mut collector);
    collector.path
}

/// Consumer-first order of everything reachable from `start`.
pub fn bfs_path<G>(graph: &G, start: G::Vertex) -> Vec<G::Vertex>
where
    G: Visitable + ?Sized,
{
    let mut collector = PathCollector { path: Vec::new() };
    bfs_traverse(graph, start, &mut collector);
    collector.path
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Adjacency(HashMap<u32, Vec<u32>>);

    impl Visitable for Adjacency {
        type Vertex = u32;

        fn depends_on(&self, vertex: u32) -> Vec<u32> {
            self.0.get(&vertex).cloned().unwrap_or_default()
        }
    }

    fn graph(edges: &[(u32, &[u32])]) -> Adjacency {
        Adjacency(edges.iter().map(|(v, d)| (*v, d.to_vec())).collect())
    }

    fn index(path: &[u32], v: u32) -> usize {
        path.iter().position(|x| *x == v).unwrap()
    }

    #[test]
    fn test_dfs_diamond() {
        // 4 <- {2, 3}, 2 <- 1, 3 <- 1
        let g = graph(&[(4, &[2, 3]), (2, &[1]), (3, &[1])]);
        let path = dfs_path(&g, 4);
        assert_eq!(path.len(), 4);
        assert_eq!(path[0], 1);
        assert_eq!(*path.last().unwrap(), 4);
    }

    #[test]
    fn test_bfs_waits_for_all_consumers() {
        // 5 <- {4, 1}, 4 <- 3, 3 <- 1
        let g = graph(&[(5, &[4, 1]), (4, &[3]), (3, &[1])]);
        let path = bfs_path(&g, 5);
        assert_eq!(path, vec![5, 4, 3, 1]);
    }

    #[test]
    fn test_cycle_terminates() {
        let g = graph(&[(1, &[2]), (2, &[3]), (3, &[1])]);
        let path = dfs_path(&g, 1);
        assert_eq!(path, vec![3, 2, 1]);
        let bfs = bfs_path(&g, 1);
        assert!(bfs.len() <= 3);
    }

    #[test]
    fn test_random_dags_respect_edges() {
        let mut seed: u64 = 0x5eed;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as u32
        };
        for _ in 0..50 {
            let n = 2 + next() % 20;
            let mut edges: HashMap<u32, Vec<u32>> = HashMap::new();
            for v in 1..n {
                let mut deps: Vec<u32> = (0..v).filter(|_| next() % 3 == 0).collect();
                deps.dedup();
                edges.insert(v, deps);
            }
            let g = Adjacency(edges);
            let terminal = n - 1;
            let dfs = dfs_path(&g, terminal);
            let bfs = bfs_path(&g, terminal);
            assert_eq!(dfs.len(), bfs.len());
            for &v in &dfs {
                for d in g.depends_on(v) {
                    assert!(index(&dfs, d) < index(&dfs, v));
                    assert!(index(&bfs, d) > index(&bfs, v));
                }
            }
        }
    }

    #[test]
    fn test_collector_visitor() {
        let g = graph(&[(2, &[1])]);
        let mut collector = PathCollector::default();
        dfs_traverse(&g, 2, &mut collector);
        assert_eq!(collector.path, vec![1, 2]);
        assert_eq!(bfs_path(&g, 2), vec![2, 1]);
    }
}
