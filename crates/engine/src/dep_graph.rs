//! Dependency graph between cells.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B depends on A"  (A is a precedent of B)
//! ```
//!
//! This makes "what breaks if I change X?" trivial: follow outgoing edges.
//!
//! # Storage
//!
//! Nodes live in an arena indexed by `NodeIx`, with an address → index map in
//! front. Each node keeps both adjacency lists (precedents and successors) as
//! index vectors, so rewiring a cell and walking the graph never chase
//! pointers. Freed slots are recycled through a free list.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::address::CellAddress;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct NodeIx(u32);

impl NodeIx {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct Node {
    addr: CellAddress,
    /// Cells this node reads.
    preds: Vec<NodeIx>,
    /// Cells that read this node.
    succs: Vec<NodeIx>,
}

/// Persistent dependency graph.
///
/// # Invariants
///
/// 1. **Bidirectional consistency:** If A ∈ preds[B] then B ∈ succs[A], and vice versa.
/// 2. **No isolated nodes:** A node with no edges is released, not stored.
/// 3. **No duplicate edges:** `set_dependencies` dedups its input.
/// 4. **Atomic updates:** `set_dependencies` swaps a cell's whole inbound edge set in one call.
#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    index: FxHashMap<CellAddress, NodeIx>,
    nodes: Vec<Option<Node>>,
    free: Vec<NodeIx>,
    edge_count: usize,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, addr: CellAddress) -> bool {
        self.index.contains_key(&addr)
    }

    /// Number of cells with at least one edge.
    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Direct dependents of `addr` (cells whose formulas read it), sorted.
    pub fn successors(&self, addr: CellAddress) -> Vec<CellAddress> {
        self.neighbours(addr, |node| &node.succs)
    }

    /// Cells `addr` reads, sorted.
    pub fn precedents(&self, addr: CellAddress) -> Vec<CellAddress> {
        self.neighbours(addr, |node| &node.preds)
    }

    /// True if `addr` reads at least one cell.
    pub fn has_precedents(&self, addr: CellAddress) -> bool {
        self.lookup(addr).map_or(false, |node| !node.preds.is_empty())
    }

    /// Replace every inbound edge of `addr` with `deps → addr`.
    ///
    /// Duplicates in `deps` are ignored. Pass an empty slice to drop all of the
    /// cell's precedents; the node itself stays while other cells still read it.
    pub fn set_dependencies(&mut self, addr: CellAddress, deps: &[CellAddress]) {
        let mut deps = deps.to_vec();
        deps.sort();
        deps.dedup();

        if deps.is_empty() && !self.contains(addr) {
            return;
        }

        let ix = self.intern(addr);
        let old_preds = match self.node_mut(ix) {
            Some(node) => std::mem::take(&mut node.preds),
            None => Vec::new(),
        };

        // Step 1: Remove old edges
        for &pred in &old_preds {
            if let Some(node) = self.node_mut(pred) {
                node.succs.retain(|&s| s != ix);
            }
        }
        self.edge_count -= old_preds.len();

        // Step 2: Add new edges
        let mut new_preds = Vec::with_capacity(deps.len());
        for dep in deps {
            let pred = self.intern(dep);
            if let Some(node) = self.node_mut(pred) {
                node.succs.push(ix);
            }
            new_preds.push(pred);
        }
        self.edge_count += new_preds.len();
        if let Some(node) = self.node_mut(ix) {
            node.preds = new_preds;
        }

        // Step 3: Release nodes left without edges
        for pred in old_preds {
            self.release_if_isolated(pred);
        }
        self.release_if_isolated(ix);
    }

    /// Delete `addr` and every edge touching it. Returns false if it was not in the graph.
    pub fn remove_node(&mut self, addr: CellAddress) -> bool {
        let Some(ix) = self.index.remove(&addr) else {
            return false;
        };
        let Some(node) = self.nodes[ix.index()].take() else {
            return false;
        };
        self.free.push(ix);

        for pred in node.preds {
            self.edge_count -= 1;
            if pred == ix {
                continue;
            }
            if let Some(n) = self.node_mut(pred) {
                n.succs.retain(|&s| s != ix);
            }
            self.release_if_isolated(pred);
        }
        for succ in node.succs {
            if succ == ix {
                continue;
            }
            self.edge_count -= 1;
            if let Some(n) = self.node_mut(succ) {
                n.preds.retain(|&p| p != ix);
            }
            self.release_if_isolated(succ);
        }
        true
    }

    /// Would giving `addr` the precedents `proposed` create a cycle?
    pub fn would_cycle(&self, addr: CellAddress, proposed: &[CellAddress]) -> bool {
        self.find_cycle_path(addr, proposed).is_some()
    }

    /// The cycle `addr` would join if it read `proposed`, in feed order,
    /// starting and ending at `addr` (e.g. `[A1, B1, A1]`).
    ///
    /// Breadth-first from `addr` along successor edges: a cycle exists iff one
    /// of the proposed precedents is already downstream of `addr`. The graph is
    /// not modified.
    pub fn find_cycle_path(&self, addr: CellAddress, proposed: &[CellAddress]) -> Option<Vec<CellAddress>> {
        if proposed.contains(&addr) {
            return Some(vec![addr, addr]);
        }

        let start = *self.index.get(&addr)?;
        let targets: FxHashSet<NodeIx> = proposed
            .iter()
            .filter_map(|p| self.index.get(p).copied())
            .collect();
        if targets.is_empty() {
            return None;
        }

        let mut visited = vec![false; self.nodes.len()];
        let mut parent: FxHashMap<NodeIx, NodeIx> = FxHashMap::default();
        let mut queue = VecDeque::from([start]);
        visited[start.index()] = true;

        while let Some(current) = queue.pop_front() {
            let Some(node) = self.node(current) else {
                continue;
            };
            for &next in &node.succs {
                if visited[next.index()] {
                    continue;
                }
                visited[next.index()] = true;
                parent.insert(next, current);

                if targets.contains(&next) {
                    let mut path = vec![next];
                    let mut at = next;
                    while let Some(&p) = parent.get(&at) {
                        path.push(p);
                        at = p;
                    }
                    path.reverse();
                    let mut cells: Vec<CellAddress> =
                        path.into_iter().filter_map(|ix| self.node(ix).map(|n| n.addr)).collect();
                    cells.push(addr);
                    return Some(cells);
                }
                queue.push_back(next);
            }
        }

        None
    }

    // =========================================================================
    // Cycle Membership (Tarjan's SCC)
    // =========================================================================

    /// Cells of `within` that sit on a cycle made only of cells in `within`
    /// (SCC size > 1 or self-loop). Sorted.
    ///
    /// Iterative Tarjan over precedent edges, roots visited in address order
    /// so the result is deterministic.
    pub fn cycle_members(&self, within: &FxHashSet<CellAddress>) -> Vec<CellAddress> {
        let mut roots: Vec<NodeIx> = within.iter().filter_map(|a| self.index.get(a).copied()).collect();
        if roots.is_empty() {
            return Vec::new();
        }
        roots.sort_by_key(|&ix| self.node(ix).map(|n| n.addr));

        let in_scope = |ix: NodeIx| self.node(ix).map_or(false, |n| within.contains(&n.addr));
        let sorted_neighbours = |ix: NodeIx| -> Vec<NodeIx> {
            let mut out: Vec<NodeIx> = self
                .node(ix)
                .map(|n| n.preds.iter().copied().filter(|&p| in_scope(p)).collect())
                .unwrap_or_default();
            out.sort_by_key(|&p| self.node(p).map(|n| n.addr));
            out
        };

        struct DfsFrame {
            node: NodeIx,
            neighbours: Vec<NodeIx>,
            next_idx: usize,
        }

        let slots = self.nodes.len();
        let mut index_counter: u32 = 0;
        let mut indices: Vec<Option<u32>> = vec![None; slots];
        let mut lowlinks: Vec<u32> = vec![0; slots];
        let mut on_stack: Vec<bool> = vec![false; slots];
        let mut stack: Vec<NodeIx> = Vec::new();
        let mut members: Vec<CellAddress> = Vec::new();

        for root in roots {
            if indices[root.index()].is_some() {
                continue;
            }

            indices[root.index()] = Some(index_counter);
            lowlinks[root.index()] = index_counter;
            index_counter += 1;
            stack.push(root);
            on_stack[root.index()] = true;
            let mut dfs_stack = vec![DfsFrame {
                node: root,
                neighbours: sorted_neighbours(root),
                next_idx: 0,
            }];

            while let Some(frame) = dfs_stack.last_mut() {
                if frame.next_idx < frame.neighbours.len() {
                    let w = frame.neighbours[frame.next_idx];
                    frame.next_idx += 1;
                    let v = frame.node;

                    match indices[w.index()] {
                        None => {
                            indices[w.index()] = Some(index_counter);
                            lowlinks[w.index()] = index_counter;
                            index_counter += 1;
                            stack.push(w);
                            on_stack[w.index()] = true;
                            dfs_stack.push(DfsFrame {
                                node: w,
                                neighbours: sorted_neighbours(w),
                                next_idx: 0,
                            });
                        }
                        Some(w_idx) if on_stack[w.index()] => {
                            lowlinks[v.index()] = lowlinks[v.index()].min(w_idx);
                        }
                        Some(_) => {}
                    }
                    continue;
                }

                // All neighbours explored: pop and propagate lowlink
                let v = frame.node;
                dfs_stack.pop();
                if let Some(parent) = dfs_stack.last() {
                    let p = parent.node.index();
                    lowlinks[p] = lowlinks[p].min(lowlinks[v.index()]);
                }

                if Some(lowlinks[v.index()]) != indices[v.index()] {
                    continue;
                }

                // v is an SCC root
                let mut scc = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w.index()] = false;
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }
                let self_loop = scc.len() == 1
                    && self.node(v).map_or(false, |n| n.preds.contains(&v));
                if scc.len() > 1 || self_loop {
                    members.extend(scc.into_iter().filter_map(|ix| self.node(ix).map(|n| n.addr)));
                }
            }
        }

        members.sort();
        members
    }

    /// Drop every node and edge.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn neighbours(&self, addr: CellAddress, side: impl Fn(&Node) -> &Vec<NodeIx>) -> Vec<CellAddress> {
        let Some(node) = self.lookup(addr) else {
            return Vec::new();
        };
        let mut cells: Vec<CellAddress> = side(node)
            .iter()
            .filter_map(|&ix| self.node(ix).map(|n| n.addr))
            .collect();
        cells.sort();
        cells
    }

    fn lookup(&self, addr: CellAddress) -> Option<&Node> {
        self.index.get(&addr).and_then(|&ix| self.node(ix))
    }

    fn node(&self, ix: NodeIx) -> Option<&Node> {
        self.nodes.get(ix.index()).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, ix: NodeIx) -> Option<&mut Node> {
        self.nodes.get_mut(ix.index()).and_then(Option::as_mut)
    }

    fn intern(&mut self, addr: CellAddress) -> NodeIx {
        if let Some(&ix) = self.index.get(&addr) {
            return ix;
        }
        let node = Node {
            addr,
            preds: Vec::new(),
            succs: Vec::new(),
        };
        let ix = match self.free.pop() {
            Some(ix) => {
                self.nodes[ix.index()] = Some(node);
                ix
            }
            None => {
                self.nodes.push(Some(node));
                NodeIx((self.nodes.len() - 1) as u32)
            }
        };
        self.index.insert(addr, ix);
        ix
    }

    fn release_if_isolated(&mut self, ix: NodeIx) {
        let addr = match self.node(ix) {
            Some(node) if node.preds.is_empty() && node.succs.is_empty() => node.addr,
            _ => return,
        };
        self.index.remove(&addr);
        self.nodes[ix.index()] = None;
        self.free.push(ix);
    }

    /// Check all invariants. Panics if any are violated.
    ///
    /// Only available in test builds.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        let mut edges = 0;
        for (&addr, &ix) in &self.index {
            let node = self.node(ix).unwrap_or_else(|| panic!("{} maps to a free slot", addr));
            assert_eq!(node.addr, addr, "index entry points at the wrong node");
            assert!(
                !node.preds.is_empty() || !node.succs.is_empty(),
                "isolated node stored for {}",
                addr
            );

            let unique: FxHashSet<NodeIx> = node.preds.iter().copied().collect();
            assert_eq!(unique.len(), node.preds.len(), "duplicate precedent on {}", addr);

            for &pred in &node.preds {
                let p = self.node(pred).unwrap_or_else(|| panic!("dangling pred on {}", addr));
                assert!(
                    p.succs.contains(&ix),
                    "Missing succ edge: {} should have {} in dependents",
                    p.addr,
                    addr
                );
            }
            for &succ in &node.succs {
                let s = self.node(succ).unwrap_or_else(|| panic!("dangling succ on {}", addr));
                assert!(
                    s.preds.contains(&ix),
                    "Missing pred edge: {} should have {} in precedents",
                    s.addr,
                    addr
                );
            }
            edges += node.preds.len();
        }
        assert_eq!(edges, self.edge_count, "edge count drifted");

        let live = self.nodes.iter().filter(|n| n.is_some()).count();
        assert_eq!(live, self.index.len(), "live slots not indexed");
        for ix in &self.free {
            assert!(self.nodes[ix.index()].is_none(), "free list holds a live slot");
        }
    }
}
