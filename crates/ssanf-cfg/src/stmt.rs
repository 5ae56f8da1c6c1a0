//! Abstract statements and expressions owned by the front end.
//!
//! The shapes here are deliberately small: compound operators arrive already
//! desugared into calls (`Add(a, b)`, `Eq(a, 1)`), and loops arrive as
//! branching blocks.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

use crate::Span;

/// A statement with its source position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    #[serde(default)]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// `target = value`
    Assign { target: SmolStr, value: Expr },
    /// An expression evaluated for its effect
    Expr(Expr),
    /// Two-way branch on `test`; targets are the block's exits
    If { test: Expr },
    Return(Option<Expr>),
    /// Definition of a nested procedure named `name`
    FunctionDef { name: SmolStr },
    Comment(SmolStr),
    Pass,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, span: None }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn assign(target: impl Into<SmolStr>, value: Expr) -> Self {
        Self::new(StmtKind::Assign {
            target: target.into(),
            value,
        })
    }

    pub fn expr(value: Expr) -> Self {
        Self::new(StmtKind::Expr(value))
    }

    pub fn branch(test: Expr) -> Self {
        Self::new(StmtKind::If { test })
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Self::new(StmtKind::Return(value))
    }

    pub fn def(name: impl Into<SmolStr>) -> Self {
        Self::new(StmtKind::FunctionDef { name: name.into() })
    }

    pub fn comment(text: impl Into<SmolStr>) -> Self {
        Self::new(StmtKind::Comment(text.into()))
    }

    /// Statements after which the rest of the block is unreachable
    pub fn is_terminator(&self) -> bool {
        matches!(self.kind, StmtKind::If { .. } | StmtKind::Return(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Name(SmolStr),
    Const(Literal),
    Call {
        func: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        keywords: Vec<Keyword>,
    },
}

/// A `name=value` call argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub name: SmolStr,
    pub value: Expr,
}

impl Expr {
    pub fn name(name: impl Into<SmolStr>) -> Self {
        Expr::Name(name.into())
    }

    pub fn int(value: i64) -> Self {
        Expr::Const(Literal::Int(value))
    }

    pub fn str(value: impl Into<SmolStr>) -> Self {
        Expr::Const(Literal::Str(value.into()))
    }

    /// Call of a named function with positional arguments
    pub fn call(func: impl Into<SmolStr>, args: Vec<Expr>) -> Self {
        Expr::Call {
            func: Box::new(Expr::name(func)),
            args,
            keywords: Vec::new(),
        }
    }

    /// Add keyword arguments to a call; other expressions are returned as is
    pub fn with_keywords(self, extra: Vec<(&str, Expr)>) -> Self {
        match self {
            Expr::Call {
                func,
                args,
                mut keywords,
            } => {
                keywords.extend(extra.into_iter().map(|(name, value)| Keyword {
                    name: name.into(),
                    value,
                }));
                Expr::Call {
                    func,
                    args,
                    keywords,
                }
            }
            other => other,
        }
    }

    /// Binary operator desugared to a call, e.g. `binop("Add", a, b)`
    pub fn binop(op: &str, lhs: Expr, rhs: Expr) -> Self {
        Expr::call(op, vec![lhs, rhs])
    }
}

// ============================================================================
// Literals
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(SmolStr),
    Bool(bool),
    None,
}

impl Literal {
    /// Parse the textual form produced by `Display`
    pub fn parse(text: &str) -> Option<Literal> {
        if let Some(body) = text.strip_prefix('\'') {
            let body = body.strip_suffix('\'')?;
            return unescape(body).map(|s| Literal::Str(s.into()));
        }
        match text {
            "True" => return Some(Literal::Bool(true)),
            "False" => return Some(Literal::Bool(false)),
            "None" => return Some(Literal::None),
            _ => {}
        }
        if let Ok(value) = text.parse::<i64>() {
            return Some(Literal::Int(value));
        }
        text.parse::<f64>().ok().map(Literal::Float)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            // Debug keeps the decimal point so the value reads back as a float
            Literal::Float(v) => write!(f, "{:?}", v),
            Literal::Str(s) => {
                f.write_str("'")?;
                for c in s.chars() {
                    match c {
                        '\'' => f.write_str("\\'")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("'")
            }
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
            Literal::None => f.write_str("None"),
        }
    }
}

fn unescape(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                other => out.push(other),
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}
