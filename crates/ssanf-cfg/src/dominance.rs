//! Dominator trees and dominance frontiers.
//!
//! Immediate dominators are computed with the iterative Cooper–Harvey–Kennedy
//! algorithm over reverse postorder. The traversal is rooted at a synthetic
//! node with a single edge into the entry block, so an entry block that is the
//! target of loop back-edges is treated as an ordinary join point. The
//! synthetic node never appears in any result.

use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

use crate::cfg::{BlockId, Cfg};

/// Index of the synthetic root in the dense numbering
const ROOT: usize = 0;

/// Dominance frontier of every reachable block
pub type Frontiers = BTreeMap<BlockId, BTreeSet<BlockId>>;

// ============================================================================
// Block Graph
// ============================================================================

/// A directed graph of block ids with a designated entry
#[derive(Debug, Clone)]
pub struct BlockGraph {
    entry: BlockId,
    nodes: Vec<BlockId>,
    succs: FxHashMap<BlockId, Vec<BlockId>>,
    preds: FxHashMap<BlockId, Vec<BlockId>>,
}

impl BlockGraph {
    pub fn new(entry: BlockId) -> Self {
        let mut graph = Self {
            entry,
            nodes: Vec::new(),
            succs: FxHashMap::default(),
            preds: FxHashMap::default(),
        };
        graph.add_node(entry);
        graph
    }

    /// Graph of one scope, edges taken from block exits
    pub fn from_cfg(cfg: &Cfg) -> Self {
        let mut graph = Self::new(cfg.entry);
        for block in &cfg.blocks {
            graph.add_node(block.id);
        }
        for block in &cfg.blocks {
            for exit in &block.exits {
                graph.add_edge(block.id, *exit);
            }
        }
        graph
    }

    pub fn add_node(&mut self, id: BlockId) {
        if !self.succs.contains_key(&id) {
            self.nodes.push(id);
            self.succs.insert(id, Vec::new());
            self.preds.insert(id, Vec::new());
        }
    }

    /// Add an edge; parallel edges are stored once
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.add_node(from);
        self.add_node(to);
        let succs = self.succs.entry(from).or_default();
        if !succs.contains(&to) {
            succs.push(to);
            self.preds.entry(to).or_default().push(from);
        }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[BlockId] {
        &self.nodes
    }

    pub fn successors(&self, id: BlockId) -> &[BlockId] {
        self.succs.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, id: BlockId) -> &[BlockId] {
        self.preds.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Dense numbering of a graph with the synthetic root at index 0
struct Indexed {
    blocks: Vec<BlockId>,
    index: FxHashMap<BlockId, usize>,
    succs: Vec<Vec<usize>>,
    preds: Vec<Vec<usize>>,
}

impl Indexed {
    fn new(graph: &BlockGraph) -> Self {
        let mut blocks = vec![graph.entry];
        let mut index = FxHashMap::default();
        for (i, id) in graph.nodes.iter().enumerate() {
            index.insert(*id, i + 1);
            blocks.push(*id);
        }
        let count = blocks.len();
        let mut succs = vec![Vec::new(); count];
        let mut preds = vec![Vec::new(); count];
        if let Some(&entry) = index.get(&graph.entry) {
            succs[ROOT].push(entry);
            preds[entry].push(ROOT);
        }
        for id in &graph.nodes {
            let from = index[id];
            for to in graph.successors(*id) {
                let to = index[to];
                succs[from].push(to);
                preds[to].push(from);
            }
        }
        Self {
            blocks,
            index,
            succs,
            preds,
        }
    }

    /// Postorder of the nodes reachable from the root
    fn postorder(&self) -> Vec<usize> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut stack = vec![(ROOT, 0usize)];
        visited[ROOT] = true;
        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            if next < self.succs[node].len() {
                top.1 += 1;
                let succ = self.succs[node][next];
                if !visited[succ] {
                    visited[succ] = true;
                    stack.push((succ, 0));
                }
            } else {
                order.push(node);
                stack.pop();
            }
        }
        order
    }
}

// ============================================================================
// Dominator Tree
// ============================================================================

/// Immediate dominators of every block reachable from the entry
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: BlockId,
    /// Immediate dominator per block; the entry block has none
    idom: FxHashMap<BlockId, BlockId>,
    /// Reachable blocks in reverse postorder
    rpo: Vec<BlockId>,
    children: FxHashMap<BlockId, Vec<BlockId>>,
}

impl DominatorTree {
    pub fn compute(graph: &BlockGraph) -> Self {
        let indexed = Indexed::new(graph);
        let postorder = indexed.postorder();
        let mut postnum = vec![usize::MAX; indexed.blocks.len()];
        for (n, node) in postorder.iter().enumerate() {
            postnum[*node] = n;
        }

        let mut idom: Vec<Option<usize>> = vec![None; indexed.blocks.len()];
        idom[ROOT] = Some(ROOT);
        let intersect = |idom: &[Option<usize>], mut a: usize, mut b: usize| {
            while a != b {
                while postnum[a] < postnum[b] {
                    a = idom[a].unwrap_or(ROOT);
                }
                while postnum[b] < postnum[a] {
                    b = idom[b].unwrap_or(ROOT);
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &node in postorder.iter().rev() {
                if node == ROOT {
                    continue;
                }
                let mut new_idom = None;
                for &pred in &indexed.preds[node] {
                    if idom[pred].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, pred, current),
                    });
                }
                if new_idom.is_some() && idom[node] != new_idom {
                    idom[node] = new_idom;
                    changed = true;
                }
            }
        }

        let mut tree = Self {
            entry: graph.entry,
            idom: FxHashMap::default(),
            rpo: Vec::with_capacity(postorder.len()),
            children: FxHashMap::default(),
        };
        for &node in postorder.iter().rev() {
            if node != ROOT {
                tree.rpo.push(indexed.blocks[node]);
            }
        }
        for id in graph.nodes() {
            let node = indexed.index[id];
            if let Some(parent) = idom[node] {
                if parent != ROOT {
                    let parent = indexed.blocks[parent];
                    tree.idom.insert(*id, parent);
                    tree.children.entry(parent).or_default().push(*id);
                }
            }
        }
        tracing::trace!(blocks = tree.rpo.len(), "computed dominator tree");
        tree
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Immediate dominator, or `None` for the entry and unreachable blocks
    pub fn immediate_dominator(&self, id: BlockId) -> Option<BlockId> {
        self.idom.get(&id).copied()
    }

    pub fn is_reachable(&self, id: BlockId) -> bool {
        id == self.entry || self.idom.contains_key(&id)
    }

    /// Whether `a` dominates `b`. A block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(b) {
            return false;
        }
        let mut current = Some(b);
        while let Some(node) = current {
            if node == a {
                return true;
            }
            current = self.immediate_dominator(node);
        }
        false
    }

    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Blocks immediately dominated by `id`, in graph insertion order
    pub fn children(&self, id: BlockId) -> &[BlockId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reachable blocks in reverse postorder
    pub fn reverse_postorder(&self) -> &[BlockId] {
        &self.rpo
    }
}

/// Dominance frontier of every reachable block.
///
/// A block `f` is in the frontier of `b` when `b` dominates a predecessor of
/// `f` but does not strictly dominate `f`. The entry block counts the
/// synthetic root as one of its predecessors.
pub fn dominance_frontiers(graph: &BlockGraph, tree: &DominatorTree) -> Frontiers {
    let mut frontiers = Frontiers::new();
    for id in tree.reverse_postorder() {
        frontiers.insert(*id, BTreeSet::new());
    }
    for &node in tree.reverse_postorder() {
        // `None` stands for the synthetic root
        let mut preds: Vec<Option<BlockId>> = Vec::new();
        if node == tree.entry() {
            preds.push(None);
        }
        preds.extend(
            graph
                .predecessors(node)
                .iter()
                .filter(|p| tree.is_reachable(**p))
                .map(|p| Some(*p)),
        );
        if preds.len() < 2 {
            continue;
        }
        let stop = tree.immediate_dominator(node);
        for pred in preds {
            let mut runner = pred;
            while runner != stop {
                match runner {
                    Some(r) => {
                        if let Some(set) = frontiers.get_mut(&r) {
                            set.insert(node);
                        }
                        runner = tree.immediate_dominator(r);
                    }
                    None => break,
                }
            }
        }
    }
    frontiers
}
