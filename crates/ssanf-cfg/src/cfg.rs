//! Blocks, scopes and nested procedure graphs.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::VecDeque;
use std::fmt;

use crate::stmt::Stmt;
use crate::{CfgError, Result};

// ============================================================================
// Identifiers
// ============================================================================

/// Basic block identifier, unique within one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

// ============================================================================
// Graph Structure
// ============================================================================

/// One basic block: a straight-line statement list plus its successor edges.
///
/// For a block ending in an `If` statement, `exits[0]` is the then-target and
/// `exits[1]` the else-target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    #[serde(default)]
    pub statements: Vec<Stmt>,
    #[serde(default)]
    pub exits: Vec<BlockId>,
}

impl Block {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            statements: Vec::new(),
            exits: Vec::new(),
        }
    }
}

/// A nested procedure: declared parameters and its own graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCfg {
    #[serde(default)]
    pub params: Vec<SmolStr>,
    pub cfg: Cfg,
}

/// The control-flow graph of one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cfg {
    pub name: SmolStr,
    pub entry: BlockId,
    pub blocks: Vec<Block>,
    /// Procedures defined in this scope, in definition order
    #[serde(default)]
    pub functions: IndexMap<SmolStr, FunctionCfg>,
}

impl Cfg {
    pub fn new(name: impl Into<SmolStr>, entry: BlockId) -> Self {
        Self {
            name: name.into(),
            entry,
            blocks: Vec::new(),
            functions: IndexMap::new(),
        }
    }

    /// Look up a block by id
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    /// Predecessors of `id`, in block declaration order
    pub fn predecessors(&self, id: BlockId) -> Vec<BlockId> {
        let mut preds = Vec::new();
        for block in &self.blocks {
            if block.exits.contains(&id) && !preds.contains(&block.id) {
                preds.push(block.id);
            }
        }
        preds
    }

    /// Validate block ids and edges of this scope and every nested one.
    pub fn link(&mut self) -> Result<()> {
        let mut seen = FxHashSet::default();
        for block in &self.blocks {
            if !seen.insert(block.id) {
                return Err(CfgError::DuplicateBlock {
                    scope: self.name.to_string(),
                    id: block.id,
                });
            }
        }
        if !self.blocks.is_empty() && !seen.contains(&self.entry) {
            return Err(CfgError::MissingEntry {
                scope: self.name.to_string(),
                entry: self.entry,
            });
        }
        for block in &self.blocks {
            for target in &block.exits {
                if !seen.contains(target) {
                    return Err(CfgError::UnknownBlock {
                        scope: self.name.to_string(),
                        from: block.id,
                        target: *target,
                    });
                }
            }
        }
        for function in self.functions.values_mut() {
            function.cfg.link()?;
        }
        tracing::trace!(scope = %self.name, blocks = self.blocks.len(), "linked cfg");
        Ok(())
    }

    /// Stable traversal order: breadth-first from the entry block, followed by
    /// unreachable blocks in declaration order.
    pub fn traversal_order(&self) -> Vec<BlockId> {
        let mut order = Vec::with_capacity(self.blocks.len());
        if self.blocks.is_empty() {
            return order;
        }
        let index: FxHashMap<BlockId, &Block> = self.blocks.iter().map(|b| (b.id, b)).collect();
        let mut visited = FxHashSet::default();
        let mut queue = VecDeque::new();
        if index.contains_key(&self.entry) {
            visited.insert(self.entry);
            queue.push_back(self.entry);
        }
        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(block) = index.get(&id) {
                for exit in &block.exits {
                    if visited.insert(*exit) {
                        queue.push_back(*exit);
                    }
                }
            }
        }
        for block in &self.blocks {
            if visited.insert(block.id) {
                order.push(block.id);
            }
        }
        order
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Incremental construction of a [`Cfg`]. The first block created is the entry.
pub struct CfgBuilder {
    cfg: Cfg,
    next_id: u32,
}

impl CfgBuilder {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self::starting_at(name, 1)
    }

    /// Builder whose block ids start at `first_id`
    pub fn starting_at(name: impl Into<SmolStr>, first_id: u32) -> Self {
        Self {
            cfg: Cfg::new(name, BlockId(first_id)),
            next_id: first_id,
        }
    }

    /// Create a fresh empty block
    pub fn block(&mut self) -> BlockId {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        self.cfg.blocks.push(Block::new(id));
        id
    }

    pub fn push(&mut self, block: BlockId, stmt: Stmt) -> &mut Self {
        if let Some(b) = self.cfg.blocks.iter_mut().find(|b| b.id == block) {
            b.statements.push(stmt);
        }
        self
    }

    pub fn edge(&mut self, from: BlockId, to: BlockId) -> &mut Self {
        if let Some(b) = self.cfg.blocks.iter_mut().find(|b| b.id == from) {
            b.exits.push(to);
        }
        self
    }

    /// Register a nested procedure defined in this scope
    pub fn function<I, S>(&mut self, name: impl Into<SmolStr>, params: I, cfg: Cfg) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        let params = params.into_iter().map(Into::into).collect();
        self.cfg.functions.insert(name.into(), FunctionCfg { params, cfg });
        self
    }

    pub fn build(mut self) -> Result<Cfg> {
        self.cfg.link()?;
        Ok(self.cfg)
    }
}
