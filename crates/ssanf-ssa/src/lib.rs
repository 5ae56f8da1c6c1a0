//! Static single assignment construction for the ssanf pipeline.
//!
//! The builder takes a control-flow graph from [`ssanf_cfg`] and produces an
//! [`SsaProgram`]:
//!
//! - **Phi placement**: at the iterated dominance frontier of every store
//! - **Versioned renaming**: every definition gets its own `name_<k>`, every
//!   load the version that reaches it
//! - **Global unique naming**: bare names never repeat across procedures
//! - **Flattening**: nested procedures at any depth end up side by side in
//!   [`SsaProgram::procedures`]
//!
//! # Architecture
//!
//! ```text
//! Cfg → [usage] → [phi placement] → [numbering] → [resolution] → SsaProgram
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ssanf_ssa::{build_ssa, pretty_print, PrintStyle};
//!
//! let cfg = ssanf_cfg::from_json(&source)?;
//! let program = build_ssa(&cfg)?;
//! println!("{}", pretty_print(&program, PrintStyle::Symbolic));
//! ```

use ssanf_cfg::{BlockId, Cfg, CfgError, DefaultUsage, VarUsage};
use thiserror::Error;

mod builder;
pub mod context;
mod pretty;
pub mod ssa;

pub use builder::SsaBuilder;
pub use context::TransformContext;
pub use pretty::{pretty_print, pretty_print_block, PrintStyle};
pub use ssa::{
    // Identifiers
    Label,
    SsaVar,

    // Values
    Call,
    Value,

    // Statements
    Stmt,
    StmtKind,

    // Program structure
    Block,
    Procedure,
    SsaProgram,

    // Diagnostics
    Diagnostic,
    DiagnosticKind,
};

/// Errors that can occur during SSA construction
#[derive(Error, Debug)]
pub enum SsaError {
    #[error(transparent)]
    InvalidCfg(#[from] CfgError),

    #[error("block {block} of `{scope}` ends in a branch with {exits} exits")]
    BranchArity {
        scope: String,
        block: BlockId,
        exits: usize,
    },
}

/// Result type for SSA construction
pub type Result<T> = std::result::Result<T, SsaError>;

/// Build SSA form for a graph and all of its nested procedures.
///
/// Uses [`DefaultUsage`] to find the names each statement stores and loads.
pub fn build_ssa(cfg: &Cfg) -> Result<SsaProgram> {
    build_ssa_with(cfg, &DefaultUsage)
}

/// Build SSA form with a custom usage extractor.
///
/// A fresh [`TransformContext`] is created for the run, so concurrent calls
/// never observe each other's names.
pub fn build_ssa_with<U: VarUsage>(cfg: &Cfg, usage: &U) -> Result<SsaProgram> {
    let mut ctx = TransformContext::new();
    let program = SsaBuilder::new(usage, &mut ctx).build_program(cfg)?;
    tracing::debug!(
        procedures = program.procedures.len(),
        blocks = program.blocks.len(),
        diagnostics = program.diagnostics.len(),
        "built SSA program"
    );
    Ok(program)
}
