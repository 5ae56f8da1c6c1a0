//! Variable usage extraction.
//!
//! The SSA builder treats this as a black box: given one statement it wants
//! the names written and the names read, nothing else.

use smol_str::SmolStr;

use crate::stmt::{Expr, Stmt, StmtKind};

/// Names stored and loaded by one statement, each in first-occurrence order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StmtUsage {
    pub stores: Vec<SmolStr>,
    pub loads: Vec<SmolStr>,
}

impl StmtUsage {
    fn load(&mut self, name: &SmolStr) {
        if !self.loads.contains(name) {
            self.loads.push(name.clone());
        }
    }

    fn store(&mut self, name: &SmolStr) {
        if !self.stores.contains(name) {
            self.stores.push(name.clone());
        }
    }
}

/// Statement-shape-aware extraction of stored and loaded names
pub trait VarUsage {
    fn usage(&self, stmt: &Stmt) -> StmtUsage;
}

/// Extractor for the statement shapes defined in [`crate::stmt`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultUsage;

impl VarUsage for DefaultUsage {
    fn usage(&self, stmt: &Stmt) -> StmtUsage {
        let mut usage = StmtUsage::default();
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                collect_loads(value, &mut usage);
                usage.store(target);
            }
            StmtKind::Expr(value) | StmtKind::If { test: value } => collect_loads(value, &mut usage),
            StmtKind::Return(Some(value)) => collect_loads(value, &mut usage),
            StmtKind::FunctionDef { name } => usage.store(name),
            StmtKind::Return(None) | StmtKind::Comment(_) | StmtKind::Pass => {}
        }
        usage
    }
}

fn collect_loads(expr: &Expr, usage: &mut StmtUsage) {
    let mut stack = vec![expr];
    while let Some(expr) = stack.pop() {
        match expr {
            Expr::Name(name) => usage.load(name),
            Expr::Const(_) => {}
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                // Pushed in reverse so names pop in source order
                for kw in keywords.iter().rev() {
                    stack.push(&kw.value);
                }
                for arg in args.iter().rev() {
                    stack.push(arg);
                }
                stack.push(func);
            }
        }
    }
}
