//! SSA to ANF lowering.
//!
//! Procedures become a chain of single-binding `letrec` groups around the
//! main program. Inside a scope every block becomes a `letrec` entry bound
//! to a curried function over its phi variables; the scope body jumps into
//! the entry block. Jumps pass, for every phi variable of the destination,
//! the version live at the end of the jumping block.

use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use ssanf_cfg::{BlockGraph, BlockId, DominatorTree, Span};
use ssanf_ssa::{self as ssa, Label, SsaProgram, SsaVar};
use std::collections::BTreeSet;

use crate::anf::*;
use crate::{AnfError, Result};

/// Lowering switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowerOptions {
    /// Nest each block's group inside the block that immediately dominates it
    pub nest_blocks: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self { nest_blocks: true }
    }
}

/// Context for lowering SSA to ANF
pub struct LoweringContext {
    options: LowerOptions,
    /// Next buffer variable number
    next_buffer: u32,
}

impl LoweringContext {
    pub fn new(options: LowerOptions) -> Self {
        Self {
            options,
            next_buffer: 0,
        }
    }

    /// Lower a whole program into one expression
    pub fn lower_program(&mut self, program: &SsaProgram) -> Result<Expr> {
        let mut groups = Vec::with_capacity(program.procedures.len());
        for proc in &program.procedures {
            let body = self.lower_scope(&proc.name, &proc.blocks, &proc.params)?;
            let params = proc.params.iter().cloned().map(Value::var).collect();
            let name = Value::var(SsaVar::free(proc.name.clone()));
            groups.push((name, Expr::func_chain(params, body)));
        }
        let main = self.lower_scope("main", &program.blocks, &[])?;

        let expr = groups
            .into_iter()
            .rev()
            .fold(main, |inner, binding| Expr::letrec(vec![binding], Some(inner)));
        tracing::debug!(
            procedures = program.procedures.len(),
            buffers = self.next_buffer,
            "lowered program to ANF"
        );
        Ok(expr)
    }

    fn lower_scope(&mut self, scope: &str, blocks: &[ssa::Block], params: &[SsaVar]) -> Result<Expr> {
        if blocks.is_empty() {
            return Ok(Expr::unit());
        }
        let mut flow = ScopeFlow::new(scope, blocks, params)?;

        let bindings = if self.options.nest_blocks {
            self.nested_bindings(&mut flow, blocks)?
        } else {
            let mut bindings = Vec::with_capacity(blocks.len());
            for block in blocks {
                bindings.push(self.lower_block(&mut flow, block, Vec::new())?);
            }
            bindings
        };

        let start = Expr::app(Value::label(flow.entry), flow.entry_args()?);
        Ok(Expr::letrec(bindings, Some(start)))
    }

    /// Bindings nested along the dominator tree, lowered in print order
    fn nested_bindings(
        &mut self,
        flow: &mut ScopeFlow<'_>,
        blocks: &[ssa::Block],
    ) -> Result<Vec<(Value, Expr)>> {
        let tree = DominatorTree::compute(&flow.graph());
        let children = |id: BlockId| -> Vec<BlockId> {
            let mut kids = tree.children(id).to_vec();
            kids.sort();
            kids
        };

        let mut built: FxHashMap<BlockId, (Value, Expr)> = FxHashMap::default();
        let mut stack = vec![(flow.entry.block_id(), false)];
        while let Some((id, expanded)) = stack.pop() {
            if !expanded {
                stack.push((id, true));
                stack.extend(children(id).into_iter().rev().map(|kid| (kid, false)));
                continue;
            }
            let nested = children(id)
                .into_iter()
                .filter_map(|kid| built.remove(&kid))
                .collect();
            let block = flow.block(Label::from(id))?;
            let binding = self.lower_block(flow, block, nested)?;
            built.insert(id, binding);
        }

        let mut bindings = Vec::new();
        for block in blocks {
            let id = block.label.block_id();
            if let Some(binding) = built.remove(&id) {
                bindings.push(binding);
            } else if !tree.is_reachable(id) {
                bindings.push(self.lower_block(flow, block, Vec::new())?);
            }
        }
        Ok(bindings)
    }

    fn lower_block(
        &mut self,
        flow: &mut ScopeFlow<'_>,
        block: &ssa::Block,
        children: Vec<(Value, Expr)>,
    ) -> Result<(Value, Expr)> {
        let params = block.phi_vars().into_iter().cloned().map(Value::var).collect();

        let mut lowered = Vec::with_capacity(block.stmts.len());
        for stmt in &block.stmts {
            lowered.push(self.lower_stmt(flow, block.label, stmt)?);
        }
        let stmts = fold_stmts(lowered, Expr::unit());

        let body = if children.is_empty() {
            stmts
        } else {
            Expr::letrec(children, Some(stmts))
        };
        Ok((Value::label(block.label), Expr::func_chain(params, body)))
    }

    /// Lower one statement. Buffer variables are minted here, left to right,
    /// so their numbers follow evaluation order.
    fn lower_stmt(&mut self, flow: &mut ScopeFlow<'_>, from: Label, stmt: &ssa::Stmt) -> Result<Lowered> {
        let span = stmt.span;
        let lowered = match &stmt.kind {
            ssa::StmtKind::Assign { var, value } => {
                let mut lets = Vec::new();
                let bound = self.lower_operand(value, &mut lets);
                Lowered::Bind {
                    lets,
                    var: Value::var(var.clone()),
                    bound,
                    span,
                }
            }
            ssa::StmtKind::Phi { .. } => Lowered::Skip,
            ssa::StmtKind::Goto(target) => {
                let args = flow.jump_args(from, *target)?;
                Lowered::Tail {
                    lets: Vec::new(),
                    expr: Expr::app(Value::label(*target), args).with_span(span),
                }
            }
            ssa::StmtKind::Return(Some(value)) => {
                let mut lets = Vec::new();
                let expr = self
                    .lower_operand(value, &mut lets)
                    .with_hint(Hint::ReturnValue)
                    .with_span(span);
                Lowered::Tail { lets, expr }
            }
            ssa::StmtKind::Return(None) => Lowered::Tail {
                lets: Vec::new(),
                expr: Expr::unit().with_hint(Hint::ReturnValue).with_span(span),
            },
            ssa::StmtKind::If {
                test,
                then_branch,
                else_branch,
            } => {
                let mut lets = Vec::new();
                let test = self.atomize(test, &mut lets);
                let then_ = self.lower_branch(flow, from, then_branch)?;
                let else_ = self.lower_branch(flow, from, else_branch)?;
                Lowered::Tail {
                    lets,
                    expr: Expr::if_(test, then_, else_).with_span(span),
                }
            }
            ssa::StmtKind::Call(call) => {
                let mut lets = Vec::new();
                let bound = self.flatten_into(call, &mut lets);
                Lowered::Bind {
                    lets,
                    var: Value::discard(),
                    bound,
                    span,
                }
            }
            ssa::StmtKind::Comment(text) => Lowered::Comment {
                text: text.clone(),
                span,
            },
        };
        Ok(lowered)
    }

    fn lower_branch(&mut self, flow: &mut ScopeFlow<'_>, from: Label, stmt: &ssa::Stmt) -> Result<Expr> {
        let lowered = self.lower_stmt(flow, from, stmt)?;
        Ok(fold_stmts(vec![lowered], Expr::unit()))
    }

    /// An operand in bound position: atoms stay atoms, calls are flattened
    fn lower_operand(&mut self, value: &ssa::Value, lets: &mut Vec<(Value, Expr)>) -> Expr {
        match value {
            ssa::Value::Call(call) => self.flatten_into(call, lets),
            other => Expr::value(self.atomize(other, lets)),
        }
    }

    /// Flatten a call so that every operand is atomic.
    ///
    /// Nested calls are named by buffer variables in post-order (callee, then
    /// positional arguments, then keyword arguments); the bindings for them are
    /// appended to `lets` innermost first. A call that is already flat adds no
    /// bindings.
    pub fn flatten_call(&mut self, call: &ssa::Call) -> (Vec<(Value, Expr)>, Expr) {
        let mut lets = Vec::new();
        let app = self.flatten_into(call, &mut lets);
        (lets, app)
    }

    fn flatten_into(&mut self, call: &ssa::Call, lets: &mut Vec<(Value, Expr)>) -> Expr {
        let callee = self.atomize(&call.func, lets);
        let mut args = Vec::with_capacity(call.args.len() + call.keywords.len());
        for arg in &call.args {
            args.push(self.atomize(arg, lets));
        }
        let mut names = Vec::with_capacity(call.keywords.len());
        for (name, value) in &call.keywords {
            args.push(self.atomize(value, lets));
            names.push(name.clone());
        }
        let app = Expr::app(callee, args);
        if names.is_empty() {
            app
        } else {
            app.with_hint(Hint::NamedArguments(names))
        }
    }

    fn atomize(&mut self, value: &ssa::Value, lets: &mut Vec<(Value, Expr)>) -> Value {
        match value {
            ssa::Value::Const(lit) => Value::constant(lit.clone()),
            ssa::Value::Var(var) => Value::var(var.clone()),
            ssa::Value::Call(call) => {
                let app = self.flatten_into(call, lets);
                let buffer = self.fresh_buffer();
                lets.push((buffer.clone(), app));
                buffer
            }
        }
    }

    fn fresh_buffer(&mut self) -> Value {
        let n = self.next_buffer;
        self.next_buffer += 1;
        tracing::trace!(buffer = n, "minted buffer variable");
        Value::buffer(n)
    }
}

/// A statement lowered up to its continuation
enum Lowered {
    /// `let var = bound in <rest>`, preceded by buffer bindings
    Bind {
        lets: Vec<(Value, Expr)>,
        var: Value,
        bound: Expr,
        span: Option<Span>,
    },
    Comment {
        text: SmolStr,
        span: Option<Span>,
    },
    /// Ends the block; whatever follows is dropped
    Tail { lets: Vec<(Value, Expr)>, expr: Expr },
    Skip,
}

/// Right-to-left fold of lowered statements around `rest`
fn fold_stmts(lowered: Vec<Lowered>, mut rest: Expr) -> Expr {
    for stmt in lowered.into_iter().rev() {
        rest = match stmt {
            Lowered::Bind {
                lets,
                var,
                bound,
                span,
            } => wrap_lets(lets, Expr::let_(var, bound, rest).with_span(span)),
            Lowered::Comment { text, span } => Expr::comment(text, rest).with_span(span),
            Lowered::Tail { lets, expr } => wrap_lets(lets, expr),
            Lowered::Skip => rest,
        };
    }
    rest
}

fn wrap_lets(lets: Vec<(Value, Expr)>, body: Expr) -> Expr {
    lets.into_iter()
        .rev()
        .fold(body, |body, (var, bound)| Expr::let_(var, bound, body))
}

// ============================================================================
// Scope Dataflow
// ============================================================================

/// Block graph and reaching definitions of one SSA scope
struct ScopeFlow<'p> {
    scope: SmolStr,
    entry: Label,
    blocks: FxHashMap<Label, &'p ssa::Block>,
    order: Vec<Label>,
    preds: FxHashMap<Label, Vec<Label>>,
    /// Parameters by bare name, all at version 0
    params: FxHashMap<SmolStr, SsaVar>,
    /// Last version of each name defined in a block
    latest: FxHashMap<Label, FxHashMap<SmolStr, u32>>,
    live_in_cache: FxHashMap<(Label, SmolStr), BTreeSet<u32>>,
}

impl<'p> ScopeFlow<'p> {
    fn new(scope: &str, blocks: &'p [ssa::Block], params: &[SsaVar]) -> Result<Self> {
        let mut index = FxHashMap::default();
        let mut order = Vec::with_capacity(blocks.len());
        for block in blocks {
            if index.insert(block.label, block).is_some() {
                return Err(AnfError::DuplicateLabel {
                    label: block.label,
                    scope: scope.into(),
                });
            }
            order.push(block.label);
        }
        let entry = blocks
            .iter()
            .find(|b| b.is_entry)
            .or_else(|| blocks.first())
            .map(|b| b.label)
            .ok_or_else(|| AnfError::MalformedTree {
                message: format!("scope `{}` has no blocks", scope),
            })?;

        let mut preds: FxHashMap<Label, Vec<Label>> = FxHashMap::default();
        let mut latest: FxHashMap<Label, FxHashMap<SmolStr, u32>> = FxHashMap::default();
        for block in blocks {
            for target in block.successors() {
                if !index.contains_key(&target) {
                    return Err(AnfError::UnresolvedLabel {
                        label: target,
                        scope: scope.into(),
                    });
                }
                let list = preds.entry(target).or_default();
                if !list.contains(&block.label) {
                    list.push(block.label);
                }
            }
            let defs = latest.entry(block.label).or_default();
            for stmt in &block.stmts {
                if let Some(SsaVar {
                    name,
                    version: Some(v),
                }) = stmt.defined_var()
                {
                    defs.insert(name.clone(), *v);
                }
            }
        }

        Ok(Self {
            scope: scope.into(),
            entry,
            blocks: index,
            order,
            preds,
            params: params
                .iter()
                .map(|p| (p.name.clone(), SsaVar::versioned(p.name.clone(), 0)))
                .collect(),
            latest,
            live_in_cache: FxHashMap::default(),
        })
    }

    fn block(&self, label: Label) -> Result<&'p ssa::Block> {
        self.blocks
            .get(&label)
            .copied()
            .ok_or_else(|| AnfError::UnresolvedLabel {
                label,
                scope: self.scope.clone(),
            })
    }

    fn graph(&self) -> BlockGraph {
        let mut graph = BlockGraph::new(self.entry.block_id());
        for label in &self.order {
            graph.add_node(label.block_id());
        }
        for label in &self.order {
            if let Some(block) = self.blocks.get(label) {
                for target in block.successors() {
                    graph.add_edge(label.block_id(), target.block_id());
                }
            }
        }
        graph
    }

    /// Arguments of the initial jump into the entry block
    fn entry_args(&self) -> Result<Vec<Value>> {
        let entry = self.block(self.entry)?;
        Ok(entry
            .phi_vars()
            .into_iter()
            .map(|var| match self.params.get(&var.name) {
                Some(param) => Value::var(param.clone()),
                None => Value::var(SsaVar::free(var.name.clone())),
            })
            .collect())
    }

    /// Arguments for a jump from `from` to `to`, one per phi of `to`
    fn jump_args(&mut self, from: Label, to: Label) -> Result<Vec<Value>> {
        let target = self.block(to)?;
        let mut args = Vec::new();
        for stmt in &target.stmts {
            let ssa::StmtKind::Phi { var, incoming } = &stmt.kind else {
                continue;
            };
            let name = &var.name;
            let local = self.latest.get(&from).and_then(|defs| defs.get(name)).copied();
            let version = match local {
                Some(v) => Some(v),
                None => {
                    let found = self.live_in(from, name);
                    let candidates: BTreeSet<u32> =
                        incoming.iter().filter_map(|v| v.version).collect();
                    found
                        .intersection(&candidates)
                        .next()
                        .or_else(|| found.first())
                        .copied()
                }
            };
            args.push(match version {
                Some(v) => Value::var(SsaVar::versioned(name.clone(), v)),
                None => Value::var(SsaVar::free(name.clone())),
            });
        }
        Ok(args)
    }

    /// Versions reaching the start of `block` through its predecessors
    fn live_in(&mut self, block: Label, name: &SmolStr) -> BTreeSet<u32> {
        let key = (block, name.clone());
        if let Some(found) = self.live_in_cache.get(&key) {
            return found.clone();
        }
        let mut found = BTreeSet::new();
        let mut visited: FxHashSet<Label> = FxHashSet::default();
        let mut stack = Vec::new();
        self.enter(block, name, &mut found, &mut stack);
        while let Some(pred) = stack.pop() {
            if !visited.insert(pred) {
                continue;
            }
            match self.latest.get(&pred).and_then(|defs| defs.get(name)) {
                Some(v) => {
                    found.insert(*v);
                }
                None => self.enter(pred, name, &mut found, &mut stack),
            }
        }
        self.live_in_cache.insert(key, found.clone());
        found
    }

    fn enter(&self, block: Label, name: &SmolStr, found: &mut BTreeSet<u32>, stack: &mut Vec<Label>) {
        if block == self.entry && self.params.contains_key(name) {
            found.insert(0);
        }
        if let Some(preds) = self.preds.get(&block) {
            stack.extend(preds.iter().rev());
        }
    }
}
