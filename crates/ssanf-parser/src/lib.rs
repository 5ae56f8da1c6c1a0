//! Reader for provenance-annotated ANF text.
//!
//! Input is the output of [`ssanf_anf::pretty_print_with_provenance`]: one
//! code line and its metadata per physical line, separated by `#`. The reader
//! works in three steps:
//!
//! 1. split each line at its last marker and read the metadata (tags, span,
//!    `RET`)
//! 2. lex the code half with [`logos`] and pair every word with its tag
//! 3. rebuild the tree by recursive descent on the keywords
//!
//! Errors are positional and fail fast: no partial tree is returned.
//!
//! # Example
//!
//! ```ignore
//! use ssanf_anf::{pretty_print_with_provenance, PrintStyle};
//!
//! let text = pretty_print_with_provenance(&anf, PrintStyle::Symbolic);
//! assert_eq!(ssanf_parser::parse(&text)?, anf);
//! ```

use ssanf_anf::Expr;
use ssanf_cfg::Span;
use thiserror::Error;

pub mod lexer;
pub mod metadata;
mod parser;

pub use lexer::{Token, TokenKind};
pub use metadata::LineMeta;
pub use parser::Parser;

/// Parse errors, each located by line and byte range
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("line {line}: unrecognized text")]
    Lex { line: usize, span: Span },

    #[error("line {line}: missing `#` metadata marker")]
    MissingMarker { line: usize, span: Span },

    #[error("line {line}: {tokens} tokens but {tags} tags")]
    TagCountMismatch {
        line: usize,
        span: Span,
        tokens: usize,
        tags: usize,
    },

    #[error("line {line}: `{keyword}` has no matching `in`")]
    UnbalancedLet {
        line: usize,
        span: Span,
        keyword: &'static str,
    },

    #[error("line {line}: expected {expected}, found `{found}`")]
    UnexpectedToken {
        line: usize,
        span: Span,
        expected: String,
        found: String,
    },

    #[error("line {line}: input ends before {expected}")]
    UnexpectedEnd {
        line: usize,
        span: Span,
        expected: String,
    },

    #[error("line {line}: application of `{head}` has no head tag")]
    MissingHeadTag { line: usize, span: Span, head: String },

    #[error("line {line}: bad tag `{tag}`")]
    BadTag { line: usize, span: Span, tag: String },

    #[error("line {line}: `{text}` is not a literal")]
    BadLiteral { line: usize, span: Span, text: String },

    #[error("line {line}: malformed span `{text}`")]
    BadSpan { line: usize, span: Span, text: String },
}

impl ParseError {
    /// 1-based line of the error
    pub fn line(&self) -> usize {
        match self {
            ParseError::Lex { line, .. }
            | ParseError::MissingMarker { line, .. }
            | ParseError::TagCountMismatch { line, .. }
            | ParseError::UnbalancedLet { line, .. }
            | ParseError::UnexpectedToken { line, .. }
            | ParseError::UnexpectedEnd { line, .. }
            | ParseError::MissingHeadTag { line, .. }
            | ParseError::BadTag { line, .. }
            | ParseError::BadLiteral { line, .. }
            | ParseError::BadSpan { line, .. } => *line,
        }
    }

    /// Byte range of the error in the parsed text
    pub fn span(&self) -> Span {
        match self {
            ParseError::Lex { span, .. }
            | ParseError::MissingMarker { span, .. }
            | ParseError::TagCountMismatch { span, .. }
            | ParseError::UnbalancedLet { span, .. }
            | ParseError::UnexpectedToken { span, .. }
            | ParseError::UnexpectedEnd { span, .. }
            | ParseError::MissingHeadTag { span, .. }
            | ParseError::BadTag { span, .. }
            | ParseError::BadLiteral { span, .. }
            | ParseError::BadSpan { span, .. } => *span,
        }
    }
}

/// Result type for parsing
pub type Result<T> = std::result::Result<T, ParseError>;

/// Parse provenance-annotated ANF text
pub fn parse(text: &str) -> Result<Expr> {
    let expr = Parser::new(text)?.parse()?;
    tracing::debug!(bytes = text.len(), "parsed ANF text");
    Ok(expr)
}
