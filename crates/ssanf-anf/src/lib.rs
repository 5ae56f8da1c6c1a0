//! A-normal form for the ssanf pipeline.
//!
//! This crate owns the functional half of the pipeline:
//!
//! - **IR**: [`Expr`] and [`Value`] with per-node [`Provenance`]
//! - **Lowering**: [`LoweringContext`] turns an [`SsaProgram`] into one
//!   expression, blocks becoming `letrec` functions over their phi variables
//! - **Printing**: plain indented text, or text with a `#` metadata channel
//!   that a parser can read back losslessly
//! - **Reconstruction**: [`reconstruct`] rebuilds SSA, phis included, from a
//!   lowered or parsed expression
//!
//! # Example
//!
//! ```ignore
//! use ssanf_anf::{lower, pretty_print_with_provenance, reconstruct, LowerOptions, PrintStyle};
//!
//! let anf = lower(&program, LowerOptions::default())?;
//! println!("{}", pretty_print_with_provenance(&anf, PrintStyle::Symbolic));
//! assert_eq!(reconstruct(&anf)?.blocks, program.blocks);
//! ```

use smol_str::SmolStr;
use ssanf_ssa::{Label, SsaProgram};
use thiserror::Error;

pub mod anf;
mod lower;
mod pretty;
mod reconstruct;
pub mod tag;

pub use anf::{Expr, ExprKind, Hint, Provenance, Value, ValueKind, DISCARD};
pub use lower::{LowerOptions, LoweringContext};
pub use pretty::{
    escape_name, normalize_whitespace, pretty_print, pretty_print_with_provenance, KEYWORDS,
    META_MARKER, RET_MARKER, TAG_SEPARATOR,
};
pub use reconstruct::reconstruct;
pub use ssanf_ssa::PrintStyle;
pub use tag::{HeadTag, TokenTag, ValueTag};

/// Errors that can occur while lowering or reconstructing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnfError {
    #[error("jump to {label} in `{scope}` has no matching block")]
    UnresolvedLabel { label: Label, scope: SmolStr },

    #[error("malformed ANF: {message}")]
    MalformedTree { message: String },

    #[error("block {label} is defined twice in `{scope}`")]
    DuplicateLabel { label: Label, scope: SmolStr },
}

/// Result type for ANF operations
pub type Result<T> = std::result::Result<T, AnfError>;

/// Lower a program with a fresh context
pub fn lower(program: &SsaProgram, options: LowerOptions) -> Result<Expr> {
    LoweringContext::new(options).lower_program(program)
}
