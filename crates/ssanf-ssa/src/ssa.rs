//! SSA data structures.
//!
//! Every definition site produces a distinct `(name, version)` pair within its
//! scope. Merges at join blocks are explicit [`StmtKind::Phi`] statements at
//! the head of the block.

use smol_str::SmolStr;
use ssanf_cfg::{BlockId, Literal, Span};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Block label, rendered `L<id>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl Label {
    /// Parse the `L<digits>` naming convention
    pub fn parse(text: &str) -> Option<Label> {
        let digits = text.strip_prefix('L')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Label)
    }

    pub fn block_id(self) -> BlockId {
        BlockId(self.0)
    }
}

impl From<BlockId> for Label {
    fn from(id: BlockId) -> Self {
        Label(id.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A variable, versioned when it is defined in the current scope.
///
/// Unversioned variables are free in the scope: builtins, procedure names,
/// names read before any definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SsaVar {
    pub name: SmolStr,
    pub version: Option<u32>,
}

impl SsaVar {
    pub fn versioned(name: impl Into<SmolStr>, version: u32) -> Self {
        Self {
            name: name.into(),
            version: Some(version),
        }
    }

    pub fn free(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Split `name_<version>` at its last underscore
    pub fn parse_versioned(text: &str) -> Option<SsaVar> {
        let (name, version) = text.rsplit_once('_')?;
        if name.is_empty() || version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        version.parse().ok().map(|v| SsaVar::versioned(name, v))
    }

    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }
}

impl fmt::Display for SsaVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{}_{}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}

// ============================================================================
// Values
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Const(Literal),
    Var(SsaVar),
    Call(Call),
}

impl Value {
    /// Constants and variables; calls are not atomic
    pub fn is_atomic(&self) -> bool {
        !matches!(self, Value::Call(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(lit) => write!(f, "{}", lit),
            Value::Var(var) => write!(f, "{}", var),
            Value::Call(call) => write!(f, "{}", call),
        }
    }
}

/// Function call with positional then keyword arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub func: Box<Value>,
    pub args: Vec<Value>,
    pub keywords: Vec<(SmolStr, Value)>,
}

impl Call {
    pub fn new(func: Value, args: Vec<Value>) -> Self {
        Self {
            func: Box::new(func),
            args,
            keywords: Vec::new(),
        }
    }

    /// No argument (and no callee) is itself a call
    pub fn is_flat(&self) -> bool {
        self.func.is_atomic()
            && self.args.iter().all(Value::is_atomic)
            && self.keywords.iter().all(|(_, v)| v.is_atomic())
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.func)?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}", arg)?;
        }
        for (name, value) in &self.keywords {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}={}", name, value)?;
        }
        f.write_str(")")
    }
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign { var: SsaVar, value: Value },
    /// Merge of the versions live on each incoming edge
    Phi { var: SsaVar, incoming: Vec<SsaVar> },
    Goto(Label),
    If {
        test: Value,
        then_branch: Box<Stmt>,
        else_branch: Box<Stmt>,
    },
    Return(Option<Value>),
    /// Call evaluated for its effect
    Call(Call),
    Comment(SmolStr),
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, span: None }
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::Goto(_) | StmtKind::If { .. } | StmtKind::Return(_)
        )
    }

    /// Labels this statement can jump to, in branch order
    pub fn targets(&self) -> Vec<Label> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(stmt) = stack.pop() {
            match &stmt.kind {
                StmtKind::Goto(label) => out.push(*label),
                StmtKind::If {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    stack.push(else_branch);
                    stack.push(then_branch);
                }
                _ => {}
            }
        }
        out
    }

    /// The variable this statement defines, if any
    pub fn defined_var(&self) -> Option<&SsaVar> {
        match &self.kind {
            StmtKind::Assign { var, .. } | StmtKind::Phi { var, .. } => Some(var),
            _ => None,
        }
    }
}

// ============================================================================
// Program Structure
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: Label,
    pub stmts: Vec<Stmt>,
    /// First block of its procedure (or of the main program)
    pub is_entry: bool,
}

impl Block {
    pub fn new(label: Label, is_entry: bool) -> Self {
        Self {
            label,
            stmts: Vec::new(),
            is_entry,
        }
    }

    /// Phi variables in statement order
    pub fn phi_vars(&self) -> Vec<&SsaVar> {
        self.stmts
            .iter()
            .filter_map(|s| match &s.kind {
                StmtKind::Phi { var, .. } => Some(var),
                _ => None,
            })
            .collect()
    }

    /// Distinct jump targets of this block, in statement order
    pub fn successors(&self) -> Vec<Label> {
        let mut out: Vec<Label> = Vec::new();
        for stmt in &self.stmts {
            for target in stmt.targets() {
                if !out.contains(&target) {
                    out.push(target);
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub name: SmolStr,
    pub params: Vec<SsaVar>,
    pub blocks: Vec<Block>,
}

/// A program in SSA form: flattened procedures plus the main block list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SsaProgram {
    pub procedures: Vec<Procedure>,
    pub blocks: Vec<Block>,
    /// Degenerate dataflow found while renaming
    pub diagnostics: Vec<Diagnostic>,
}

impl SsaProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.iter().find(|p| p.name == name)
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Read of a name never defined in the scope (a builtin or outer variable)
    FreeName,
    /// Read of a scope-local name with no definition on some path to the use
    UndefinedName,
    /// Several definitions reach a use without a phi; the lowest was taken
    AmbiguousReach { versions: Vec<u32> },
}

/// A use whose reaching-definition set is empty or ambiguous
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub scope: SmolStr,
    pub block: Label,
    pub name: SmolStr,
    pub span: Option<Span>,
}

impl Diagnostic {
    /// Whether the diagnostic points at a probable defect in the input
    pub fn is_defect(&self) -> bool {
        !matches!(self.kind, DiagnosticKind::FreeName)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::FreeName => write!(
                f,
                "`{}` is not defined in `{}` and is read as a free name in {}",
                self.name, self.scope, self.block
            ),
            DiagnosticKind::UndefinedName => write!(
                f,
                "`{}` is read in {} of `{}` before any definition reaches it",
                self.name, self.block, self.scope
            ),
            DiagnosticKind::AmbiguousReach { versions } => write!(
                f,
                "versions {:?} of `{}` reach {} of `{}` without a phi",
                versions, self.name, self.block, self.scope
            ),
        }
    }
}
