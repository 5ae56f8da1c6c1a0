//! Control-flow graph model for the ssanf pipeline.
//!
//! This crate is the boundary between the pipeline and whatever front end
//! builds control-flow graphs. It provides:
//!
//! - **Blocks and statements**: the abstract statement shapes the SSA builder
//!   reads, never mutates
//! - **Variable usage extraction**: the [`VarUsage`] hook that reports stored
//!   and loaded names per statement
//! - **Dominance**: immediate dominators and dominance frontiers for any
//!   block graph, rooted at a synthetic node in front of the entry block
//!
//! # Architecture
//!
//! ```text
//! front end → Cfg (JSON or CfgBuilder) → [dominance] → SSA builder
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ssanf_cfg::{CfgBuilder, Expr, Stmt};
//!
//! let mut builder = CfgBuilder::new("main");
//! let entry = builder.block();
//! builder.push(entry, Stmt::assign("a", Expr::int(1)));
//! let cfg = builder.build()?;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

pub mod cfg;
pub mod dominance;
pub mod stmt;
pub mod usage;

pub use cfg::{Block, BlockId, Cfg, CfgBuilder, FunctionCfg};
pub use dominance::{dominance_frontiers, BlockGraph, DominatorTree, Frontiers};
pub use stmt::{Expr, Keyword, Literal, Stmt, StmtKind};
pub use usage::{DefaultUsage, StmtUsage, VarUsage};

/// Byte range into the original source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

impl From<Span> for Range<usize> {
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Errors raised while assembling or loading a control-flow graph
#[derive(Error, Debug)]
pub enum CfgError {
    #[error("block {target} referenced from block {from} in `{scope}` does not exist")]
    UnknownBlock {
        scope: String,
        from: BlockId,
        target: BlockId,
    },

    #[error("block {id} is defined twice in `{scope}`")]
    DuplicateBlock { scope: String, id: BlockId },

    #[error("entry block {entry} of `{scope}` does not exist")]
    MissingEntry { scope: String, entry: BlockId },

    #[error("invalid control-flow graph JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for CFG operations
pub type Result<T> = std::result::Result<T, CfgError>;

/// Load a control-flow graph from its JSON description and link it.
pub fn from_json(source: &str) -> Result<Cfg> {
    let mut cfg: Cfg = serde_json::from_str(source)?;
    cfg.link()?;
    Ok(cfg)
}
