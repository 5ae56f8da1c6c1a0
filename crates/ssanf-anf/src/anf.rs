//! A-normal form data structures.
//!
//! Every application takes atomic arguments only: constants, variables or
//! `unit`. Each node carries a [`Provenance`] record so that a program can be
//! printed, read back and lowered into SSA again without losing block labels,
//! return positions, keyword names or source spans.

use smol_str::SmolStr;
use ssanf_cfg::{Literal, Span};
use ssanf_ssa::{Label, SsaVar};
use std::collections::BTreeSet;

// ============================================================================
// Provenance
// ============================================================================

/// Structural hint attached to a node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Hint {
    /// The value names a block entry
    BlockLabel,
    /// The variable was minted to flatten a nested call
    BufferVariable,
    /// The node is the value returned by its procedure
    ReturnValue,
    /// Trailing arguments of the application are keyword arguments
    NamedArguments(Vec<SmolStr>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub span: Option<Span>,
    pub hints: BTreeSet<Hint>,
}

impl Provenance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    pub fn with_hint(mut self, hint: Hint) -> Self {
        self.hints.insert(hint);
        self
    }

    pub fn has(&self, hint: &Hint) -> bool {
        self.hints.contains(hint)
    }

    pub fn is_return(&self) -> bool {
        self.has(&Hint::ReturnValue)
    }

    /// Keyword names of an application, if any
    pub fn named_arguments(&self) -> Option<&[SmolStr]> {
        self.hints.iter().find_map(|h| match h {
            Hint::NamedArguments(names) => Some(names.as_slice()),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_none() && self.hints.is_empty()
    }
}

// ============================================================================
// Values
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Const(Literal),
    Var(SsaVar),
    Unit,
}

/// An atomic operand
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub kind: ValueKind,
    pub prov: Provenance,
}

/// Name bound by standalone calls whose result is discarded
pub const DISCARD: &str = "_";

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            prov: Provenance::new(),
        }
    }

    pub fn constant(lit: Literal) -> Self {
        Self::new(ValueKind::Const(lit))
    }

    pub fn var(var: SsaVar) -> Self {
        Self::new(ValueKind::Var(var))
    }

    pub fn unit() -> Self {
        Self::new(ValueKind::Unit)
    }

    /// Reference to a block entry
    pub fn label(label: Label) -> Self {
        Self::var(SsaVar::free(label.to_string())).with_hint(Hint::BlockLabel)
    }

    /// Buffer variable number `n`
    pub fn buffer(n: u32) -> Self {
        Self::var(SsaVar::free(format!("$buf{}", n))).with_hint(Hint::BufferVariable)
    }

    pub fn discard() -> Self {
        Self::var(SsaVar::free(DISCARD))
    }

    pub fn with_hint(mut self, hint: Hint) -> Self {
        self.prov.hints.insert(hint);
        self
    }

    pub fn as_var(&self) -> Option<&SsaVar> {
        match &self.kind {
            ValueKind::Var(var) => Some(var),
            _ => None,
        }
    }

    /// The block id spelled by this value's name, if it has the `L<id>` form.
    ///
    /// A free function may be named like a block; only [`Value::is_label`]
    /// says the value actually refers to one.
    pub fn as_label(&self) -> Option<Label> {
        let var = self.as_var()?;
        if var.is_versioned() {
            return None;
        }
        Label::parse(&var.name)
    }

    /// Whether the value is tagged as a block reference
    pub fn is_label(&self) -> bool {
        self.prov.has(&Hint::BlockLabel)
    }

    pub fn is_buffer(&self) -> bool {
        self.prov.has(&Hint::BufferVariable)
    }

    pub fn is_discard(&self) -> bool {
        matches!(self.as_var(), Some(v) if !v.is_versioned() && v.name == DISCARD)
    }
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub prov: Provenance,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Value(Value),
    /// `callee args...`; all operands are atomic
    App { args: Vec<Value>, callee: Value },
    Let {
        var: Value,
        bound: Box<Expr>,
        body: Box<Expr>,
    },
    /// Mutually recursive bindings with an optional continuation
    LetRec {
        bindings: Vec<(Value, Expr)>,
        body: Option<Box<Expr>>,
    },
    If {
        test: Value,
        then_: Box<Expr>,
        else_: Box<Expr>,
    },
    /// One curried parameter, or none for a zero-arity function
    Func {
        param: Option<Value>,
        body: Box<Expr>,
    },
    Comment { text: SmolStr, body: Box<Expr> },
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            prov: Provenance::new(),
        }
    }

    pub fn value(value: Value) -> Self {
        Self::new(ExprKind::Value(value))
    }

    pub fn unit() -> Self {
        Self::value(Value::unit())
    }

    pub fn app(callee: Value, args: Vec<Value>) -> Self {
        Self::new(ExprKind::App { args, callee })
    }

    pub fn let_(var: Value, bound: Expr, body: Expr) -> Self {
        Self::new(ExprKind::Let {
            var,
            bound: Box::new(bound),
            body: Box::new(body),
        })
    }

    pub fn letrec(bindings: Vec<(Value, Expr)>, body: Option<Expr>) -> Self {
        Self::new(ExprKind::LetRec {
            bindings,
            body: body.map(Box::new),
        })
    }

    pub fn if_(test: Value, then_: Expr, else_: Expr) -> Self {
        Self::new(ExprKind::If {
            test,
            then_: Box::new(then_),
            else_: Box::new(else_),
        })
    }

    pub fn func(param: Option<Value>, body: Expr) -> Self {
        Self::new(ExprKind::Func {
            param,
            body: Box::new(body),
        })
    }

    /// Curried function over `params`, outermost first; `λ .` when empty
    pub fn func_chain(params: Vec<Value>, body: Expr) -> Self {
        if params.is_empty() {
            return Self::func(None, body);
        }
        params
            .into_iter()
            .rev()
            .fold(body, |body, param| Self::func(Some(param), body))
    }

    pub fn comment(text: impl Into<SmolStr>, body: Expr) -> Self {
        Self::new(ExprKind::Comment {
            text: text.into(),
            body: Box::new(body),
        })
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.prov.span = span;
        self
    }

    pub fn with_hint(mut self, hint: Hint) -> Self {
        self.prov.hints.insert(hint);
        self
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, ExprKind::Value(_))
    }

    /// Parameters of a curried function chain and its innermost body
    pub fn unwrap_func_chain(&self) -> Option<(Vec<&Value>, &Expr)> {
        let mut params = Vec::new();
        let mut current = self;
        let mut seen = false;
        while let ExprKind::Func { param, body } = &current.kind {
            seen = true;
            params.extend(param.iter());
            current = body;
            if param.is_none() {
                break;
            }
        }
        seen.then_some((params, current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_func_chain_curries_in_order() {
        let params = vec![
            Value::var(SsaVar::versioned("a", 1)),
            Value::var(SsaVar::versioned("b", 1)),
        ];
        let chain = Expr::func_chain(params.clone(), Expr::unit());
        let (found, body) = chain.unwrap_func_chain().unwrap();
        assert_eq!(found, vec![&params[0], &params[1]]);
        assert_eq!(body, &Expr::unit());
    }

    #[test]
    fn test_zero_arity_func() {
        let chain = Expr::func_chain(vec![], Expr::unit());
        assert_eq!(chain, Expr::func(None, Expr::unit()));
        let (params, _) = chain.unwrap_func_chain().unwrap();
        assert!(params.is_empty());
        assert!(Expr::unit().unwrap_func_chain().is_none());
    }

    #[test]
    fn test_label_value() {
        let label = Value::label(Label(4));
        assert_eq!(label.as_label(), Some(Label(4)));
        assert!(label.is_label());
        // A free name spelled like a label is not tagged as one
        let named = Value::var(SsaVar::free("L9"));
        assert_eq!(named.as_label(), Some(Label(9)));
        assert!(!named.is_label());
        assert_eq!(Value::var(SsaVar::versioned("L9", 0)).as_label(), None);
    }

    #[test]
    fn test_named_arguments_hint() {
        let app = Expr::app(Value::var(SsaVar::free("print")), vec![])
            .with_hint(Hint::NamedArguments(vec!["sep".into()]));
        assert_eq!(app.prov.named_arguments(), Some(&[SmolStr::new("sep")][..]));
        assert!(Expr::unit().prov.named_arguments().is_none());
    }

    #[test]
    fn test_buffer_and_discard() {
        let buf = Value::buffer(3);
        assert!(buf.is_buffer());
        assert_eq!(buf.as_var().unwrap().name, "$buf3");
        assert!(Value::discard().is_discard());
    }
}
