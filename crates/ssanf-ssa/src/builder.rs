//! SSA construction: phi placement and versioned renaming.
//!
//! Each scope goes through four steps:
//!
//! 1. usage extraction per statement (delegated to a [`VarUsage`])
//! 2. phi placement at the iterated dominance frontier of every definition
//! 3. version numbering of phis and stores in traversal order
//! 4. resolution of loads and phi incoming lists once every block is numbered

use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use ssanf_cfg::{
    dominance_frontiers, BlockGraph, BlockId, Cfg, CfgError, DominatorTree, Expr, FunctionCfg,
    Stmt as CfgStmt, StmtKind as CfgStmtKind, StmtUsage, VarUsage,
};
use std::collections::{BTreeMap, BTreeSet};

use crate::context::TransformContext;
use crate::ssa::*;
use crate::{Result, SsaError};

/// Builds an [`SsaProgram`] from a main graph and its nested procedures
pub struct SsaBuilder<'a, U: VarUsage> {
    usage: &'a U,
    ctx: &'a mut TransformContext,
}

/// Result of renaming one scope
struct ScopeOutput<'c> {
    blocks: Vec<Block>,
    params: Vec<SsaVar>,
    /// Procedures defined in the scope, under their renamed names
    nested: Vec<(SmolStr, &'c FunctionCfg)>,
}

impl<'a, U: VarUsage> SsaBuilder<'a, U> {
    pub fn new(usage: &'a U, ctx: &'a mut TransformContext) -> Self {
        Self { usage, ctx }
    }

    /// Rename the main scope, then every nested procedure depth-first
    pub fn build_program(&mut self, cfg: &Cfg) -> Result<SsaProgram> {
        let mut program = SsaProgram::new();
        let main = self.build_scope(cfg, &[])?;
        program.blocks = main.blocks;

        let mut stack: Vec<(SmolStr, &FunctionCfg)> = main.nested.into_iter().rev().collect();
        while let Some((name, function)) = stack.pop() {
            let scope = self.build_scope(&function.cfg, &function.params)?;
            tracing::debug!(procedure = %name, blocks = scope.blocks.len(), "renamed procedure");
            program.procedures.push(Procedure {
                name,
                params: scope.params,
                blocks: scope.blocks,
            });
            stack.extend(scope.nested.into_iter().rev());
        }

        program.diagnostics = self.ctx.take_diagnostics();
        for diagnostic in program.diagnostics.iter().filter(|d| d.is_defect()) {
            tracing::warn!("{}", diagnostic);
        }
        Ok(program)
    }

    fn build_scope<'c>(&mut self, cfg: &'c Cfg, params: &[SmolStr]) -> Result<ScopeOutput<'c>> {
        let mut scope = ScopeRenamer::new(cfg, self.usage, params)?;
        scope.rename_names(self.ctx);
        scope.place_phis();
        scope.number_definitions();
        let blocks = scope.emit_blocks(self.ctx)?;

        let params = params
            .iter()
            .map(|p| SsaVar::versioned(scope.renamed(p), 0))
            .collect();
        let nested = cfg
            .functions
            .iter()
            .map(|(name, function)| (scope.renamed(name), function))
            .collect();
        Ok(ScopeOutput {
            blocks,
            params,
            nested,
        })
    }
}

// ============================================================================
// Per-scope state
// ============================================================================

/// Versions assigned inside one block
#[derive(Debug, Default)]
struct BlockVersions {
    phis: Vec<(SmolStr, u32)>,
    /// Versions stored by each statement
    stores: Vec<Vec<(SmolStr, u32)>>,
    /// Last version of each name defined in the block
    latest: FxHashMap<SmolStr, u32>,
}

impl BlockVersions {
    /// Version live just before statement `index`, from this block alone
    fn live_before(&self, index: usize, name: &SmolStr) -> Option<u32> {
        for stores in self.stores[..index].iter().rev() {
            if let Some((_, v)) = stores.iter().find(|(n, _)| n == name) {
                return Some(*v);
            }
        }
        self.phis.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    fn stored(&self, index: usize, name: &SmolStr) -> Option<u32> {
        self.stores[index]
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

struct ScopeRenamer<'c, U: VarUsage> {
    cfg: &'c Cfg,
    usage: &'c U,
    graph: BlockGraph,
    order: Vec<BlockId>,
    /// Statements up to and including the first terminator
    live_stmts: FxHashMap<BlockId, &'c [CfgStmt]>,
    exits: FxHashMap<BlockId, &'c [BlockId]>,
    usages: FxHashMap<BlockId, Vec<StmtUsage>>,
    params: Vec<SmolStr>,
    /// Names defined in this scope (parameters and stores), first occurrence first
    locals: Vec<SmolStr>,
    renames: FxHashMap<SmolStr, SmolStr>,
    phi_table: FxHashMap<BlockId, BTreeSet<SmolStr>>,
    versions: FxHashMap<BlockId, BlockVersions>,
    live_in_cache: FxHashMap<(BlockId, SmolStr), BTreeSet<u32>>,
    /// Block holding the phi that defines each `(name, version)`
    phi_sites: FxHashMap<(SmolStr, u32), BlockId>,
    reported_free: FxHashSet<SmolStr>,
    reported_partial: FxHashSet<(BlockId, SmolStr)>,
}

impl<'c, U: VarUsage> ScopeRenamer<'c, U> {
    fn new(cfg: &'c Cfg, usage: &'c U, params: &[SmolStr]) -> Result<Self> {
        let mut live_stmts = FxHashMap::default();
        let mut exits = FxHashMap::default();
        for block in &cfg.blocks {
            let cut = block
                .statements
                .iter()
                .position(CfgStmt::is_terminator)
                .map_or(block.statements.len(), |i| i + 1);
            if cut < block.statements.len() {
                tracing::trace!(block = %block.id, dropped = block.statements.len() - cut, "unreachable statements after terminator");
            }
            live_stmts.insert(block.id, &block.statements[..cut]);
            exits.insert(block.id, block.exits.as_slice());
        }
        if !cfg.blocks.is_empty() && !exits.contains_key(&cfg.entry) {
            return Err(SsaError::InvalidCfg(CfgError::MissingEntry {
                scope: cfg.name.to_string(),
                entry: cfg.entry,
            }));
        }
        for block in &cfg.blocks {
            for target in &block.exits {
                if !exits.contains_key(target) {
                    return Err(SsaError::InvalidCfg(CfgError::UnknownBlock {
                        scope: cfg.name.to_string(),
                        from: block.id,
                        target: *target,
                    }));
                }
            }
        }

        Ok(Self {
            cfg,
            usage,
            graph: BlockGraph::from_cfg(cfg),
            order: cfg.traversal_order(),
            live_stmts,
            exits,
            usages: FxHashMap::default(),
            params: params.to_vec(),
            locals: Vec::new(),
            renames: FxHashMap::default(),
            phi_table: FxHashMap::default(),
            versions: FxHashMap::default(),
            live_in_cache: FxHashMap::default(),
            phi_sites: FxHashMap::default(),
            reported_free: FxHashSet::default(),
            reported_partial: FxHashSet::default(),
        })
    }

    fn renamed(&self, name: &SmolStr) -> SmolStr {
        self.renames.get(name).cloned().unwrap_or_else(|| name.clone())
    }

    fn is_local(&self, name: &SmolStr) -> bool {
        self.renames.contains_key(name)
    }

    /// Extract usages and give every local name a globally unique bare name
    fn rename_names(&mut self, ctx: &mut TransformContext) {
        let mut locals: Vec<SmolStr> = Vec::new();
        let mut seen = FxHashSet::default();
        for p in &self.params {
            if seen.insert(p.clone()) {
                locals.push(p.clone());
            }
        }
        for id in &self.order {
            let stmts = self.live_stmts.get(id).copied().unwrap_or(&[]);
            let usages: Vec<StmtUsage> = stmts.iter().map(|s| self.usage.usage(s)).collect();
            for usage in &usages {
                for name in &usage.stores {
                    if seen.insert(name.clone()) {
                        locals.push(name.clone());
                    }
                }
            }
            self.usages.insert(*id, usages);
        }

        // Names that do not collide keep their spelling and block the suffixes
        let mut taken: FxHashSet<SmolStr> = locals
            .iter()
            .filter(|n| !ctx.is_used(n))
            .cloned()
            .collect();
        for name in &locals {
            let unique = if ctx.is_used(name) {
                let unique = ctx.unique_name_avoiding(name, &taken);
                tracing::debug!(scope = %self.cfg.name, from = %name, to = %unique, "renamed colliding name");
                unique
            } else {
                name.clone()
            };
            taken.insert(unique.clone());
            self.renames.insert(name.clone(), unique);
        }
        ctx.reserve(self.renames.values().cloned());
        self.locals = locals;
    }

    /// Phi placement at the iterated dominance frontier of each name's stores.
    ///
    /// Phi blocks count as definitions and are fed back until nothing
    /// changes, so the result is a superset of a single frontier pass.
    fn place_phis(&mut self) {
        if self.cfg.blocks.is_empty() {
            return;
        }
        let tree = DominatorTree::compute(&self.graph);
        let frontiers = dominance_frontiers(&self.graph, &tree);

        let mut def_sites: BTreeMap<SmolStr, Vec<BlockId>> = BTreeMap::new();
        for id in &self.order {
            for usage in self.usages.get(id).map(Vec::as_slice).unwrap_or(&[]) {
                for name in &usage.stores {
                    let sites = def_sites.entry(name.clone()).or_default();
                    if !sites.contains(id) {
                        sites.push(*id);
                    }
                }
            }
        }

        let mut placed = 0usize;
        for (name, sites) in def_sites {
            let mut queued: FxHashSet<BlockId> = sites.iter().copied().collect();
            let mut has_phi: FxHashSet<BlockId> = FxHashSet::default();
            let mut worklist = sites;
            while let Some(block) = worklist.pop() {
                let Some(frontier) = frontiers.get(&block) else {
                    continue;
                };
                for &join in frontier {
                    if has_phi.insert(join) {
                        self.phi_table.entry(join).or_default().insert(name.clone());
                        placed += 1;
                        // A phi is itself a definition of the name
                        if queued.insert(join) {
                            worklist.push(join);
                        }
                    }
                }
            }
        }
        tracing::debug!(scope = %self.cfg.name, phis = placed, "placed phi nodes");
    }

    /// Reserve phi versions, then number stores in textual order
    fn number_definitions(&mut self) {
        let mut counters: FxHashMap<SmolStr, u32> = FxHashMap::default();
        for p in &self.params {
            counters.insert(p.clone(), 1);
        }
        let mut next = |name: &SmolStr| {
            let counter = counters.entry(name.clone()).or_insert(0);
            let version = *counter;
            *counter += 1;
            version
        };

        for id in &self.order {
            let mut versions = BlockVersions::default();
            if let Some(names) = self.phi_table.get(id) {
                for name in names {
                    let v = next(name);
                    self.phi_sites.insert((name.clone(), v), *id);
                    versions.phis.push((name.clone(), v));
                    versions.latest.insert(name.clone(), v);
                }
            }
            for usage in self.usages.get(id).map(Vec::as_slice).unwrap_or(&[]) {
                let mut stores = Vec::with_capacity(usage.stores.len());
                for name in &usage.stores {
                    let v = next(name);
                    stores.push((name.clone(), v));
                    versions.latest.insert(name.clone(), v);
                }
                versions.stores.push(stores);
            }
            self.versions.insert(*id, versions);
        }
    }

    fn param_version(&self, name: &SmolStr) -> Option<u32> {
        self.params.contains(name).then_some(0)
    }

    /// Versions live on entry to `block` through its predecessors.
    ///
    /// Walks predecessors until each path hits a definition; the entry block
    /// also receives the parameters from the synthetic root.
    fn live_in(&mut self, block: BlockId, name: &SmolStr) -> BTreeSet<u32> {
        let key = (block, name.clone());
        if let Some(found) = self.live_in_cache.get(&key) {
            return found.clone();
        }
        let mut found = BTreeSet::new();
        let mut visited = FxHashSet::default();
        let mut stack: Vec<BlockId> = Vec::new();
        self.enter(block, name, &mut found, &mut stack);
        while let Some(pred) = stack.pop() {
            if !visited.insert(pred) {
                continue;
            }
            match self.versions.get(&pred).and_then(|v| v.latest.get(name)) {
                Some(v) => {
                    found.insert(*v);
                }
                None => self.enter(pred, name, &mut found, &mut stack),
            }
        }
        self.live_in_cache.insert(key, found.clone());
        found
    }

    fn enter(&self, block: BlockId, name: &SmolStr, found: &mut BTreeSet<u32>, stack: &mut Vec<BlockId>) {
        if block == self.cfg.entry {
            if let Some(v) = self.param_version(name) {
                found.insert(v);
            }
        }
        stack.extend(self.graph.predecessors(block).iter().rev());
    }

    /// Versions live at the end of `block`
    fn live_out(&mut self, block: BlockId, name: &SmolStr) -> BTreeSet<u32> {
        match self.versions.get(&block).and_then(|v| v.latest.get(name)) {
            Some(v) => BTreeSet::from([*v]),
            None => self.live_in(block, name),
        }
    }

    fn phi_incoming(&mut self, block: BlockId, name: &SmolStr) -> BTreeSet<u32> {
        let mut incoming = BTreeSet::new();
        if block == self.cfg.entry {
            if let Some(v) = self.param_version(name) {
                incoming.insert(v);
            }
        }
        let preds = self.graph.predecessors(block).to_vec();
        for pred in preds {
            incoming.extend(self.live_out(pred, name));
        }
        incoming
    }

    /// Version read by statement `index` of `block`
    fn resolve_load(
        &mut self,
        ctx: &mut TransformContext,
        block: BlockId,
        index: usize,
        name: &SmolStr,
        span: Option<ssanf_cfg::Span>,
    ) -> Option<u32> {
        if !self.is_local(name) {
            if self.reported_free.insert(name.clone()) {
                ctx.report(self.diagnostic(DiagnosticKind::FreeName, block, name, span));
            }
            return None;
        }
        let local = self.versions.get(&block).and_then(|v| v.live_before(index, name));
        let version = match local {
            Some(v) => Some(v),
            None => self.resolve_live_in(ctx, block, name, span),
        };
        if let Some(v) = version {
            self.check_phi_paths(ctx, block, name, v, span);
        }
        version
    }

    fn resolve_live_in(
        &mut self,
        ctx: &mut TransformContext,
        block: BlockId,
        name: &SmolStr,
        span: Option<ssanf_cfg::Span>,
    ) -> Option<u32> {
        let found = self.live_in(block, name);
        match found.len() {
            0 => {
                ctx.report(self.diagnostic(DiagnosticKind::UndefinedName, block, name, span));
                None
            }
            1 => found.first().copied(),
            _ => {
                let versions: Vec<u32> = found.iter().copied().collect();
                ctx.report(self.diagnostic(
                    DiagnosticKind::AmbiguousReach {
                        versions: versions.clone(),
                    },
                    block,
                    name,
                    span,
                ));
                versions.first().copied()
            }
        }
    }

    /// Report a read of a phi that some incoming path reaches undefined.
    ///
    /// Unread phis stay silent: placement is not pruned by liveness.
    fn check_phi_paths(
        &mut self,
        ctx: &mut TransformContext,
        block: BlockId,
        name: &SmolStr,
        version: u32,
        span: Option<ssanf_cfg::Span>,
    ) {
        let Some(&site) = self.phi_sites.get(&(name.clone(), version)) else {
            return;
        };
        if self.reported_partial.contains(&(site, name.clone())) {
            return;
        }
        let mut undefined = site == self.cfg.entry && self.param_version(name).is_none();
        let preds = self.graph.predecessors(site).to_vec();
        for pred in preds {
            if undefined {
                break;
            }
            undefined = self.live_out(pred, name).is_empty();
        }
        if undefined {
            self.reported_partial.insert((site, name.clone()));
            ctx.report(self.diagnostic(DiagnosticKind::UndefinedName, block, name, span));
        }
    }

    fn diagnostic(
        &self,
        kind: DiagnosticKind,
        block: BlockId,
        name: &SmolStr,
        span: Option<ssanf_cfg::Span>,
    ) -> Diagnostic {
        Diagnostic {
            kind,
            scope: self.cfg.name.clone(),
            block: block.into(),
            name: self.renamed(name),
            span,
        }
    }

    // ========================================================================
    // Emission
    // ========================================================================

    /// Entry block first, then the rest by label
    fn emit_blocks(&mut self, ctx: &mut TransformContext) -> Result<Vec<Block>> {
        let mut ids: Vec<BlockId> = self.cfg.blocks.iter().map(|b| b.id).collect();
        ids.sort_by_key(|id| (*id != self.cfg.entry, *id));

        let mut blocks = Vec::with_capacity(ids.len());
        for id in ids {
            blocks.push(self.emit_block(ctx, id)?);
        }
        Ok(blocks)
    }

    fn emit_block(&mut self, ctx: &mut TransformContext, id: BlockId) -> Result<Block> {
        let mut block = Block::new(id.into(), id == self.cfg.entry);

        let phis = self
            .versions
            .get(&id)
            .map(|v| v.phis.clone())
            .unwrap_or_default();
        for (name, version) in phis {
            let renamed = self.renamed(&name);
            let incoming = self
                .phi_incoming(id, &name)
                .into_iter()
                .map(|v| SsaVar::versioned(renamed.clone(), v))
                .collect();
            block.stmts.push(Stmt::new(StmtKind::Phi {
                var: SsaVar::versioned(renamed, version),
                incoming,
            }));
        }

        let stmts = self.live_stmts.get(&id).copied().unwrap_or(&[]);
        for (index, stmt) in stmts.iter().enumerate() {
            if let Some(converted) = self.emit_stmt(ctx, id, index, stmt)? {
                block.stmts.push(converted);
            }
        }

        let exits = self.exits.get(&id).copied().unwrap_or(&[]);
        let terminated = block.stmts.last().is_some_and(Stmt::is_terminator);
        if !terminated {
            match exits {
                [] => {}
                [next] => block.stmts.push(Stmt::new(StmtKind::Goto((*next).into()))),
                _ => {
                    return Err(SsaError::BranchArity {
                        scope: self.cfg.name.to_string(),
                        block: id,
                        exits: exits.len(),
                    })
                }
            }
        }
        Ok(block)
    }

    fn emit_stmt(
        &mut self,
        ctx: &mut TransformContext,
        block: BlockId,
        index: usize,
        stmt: &CfgStmt,
    ) -> Result<Option<Stmt>> {
        let usage = self
            .usages
            .get(&block)
            .and_then(|u| u.get(index))
            .cloned()
            .unwrap_or_default();
        let mut loads: FxHashMap<SmolStr, Option<u32>> = FxHashMap::default();
        for name in &usage.loads {
            let version = self.resolve_load(ctx, block, index, name, stmt.span);
            loads.insert(name.clone(), version);
        }

        let kind = match &stmt.kind {
            CfgStmtKind::Assign { target, value } => StmtKind::Assign {
                var: self.stored_var(block, index, target),
                value: self.emit_expr(value, &loads),
            },
            CfgStmtKind::Expr(value @ Expr::Call { .. }) => match self.emit_expr(value, &loads) {
                Value::Call(call) => StmtKind::Call(call),
                _ => return Ok(None),
            },
            CfgStmtKind::Expr(_) => {
                tracing::trace!(block = %block, "dropped expression statement without effect");
                return Ok(None);
            }
            CfgStmtKind::If { test } => {
                let exits = self.exits.get(&block).copied().unwrap_or(&[]);
                let branch = |target: Option<&BlockId>| match target {
                    Some(t) => Stmt::new(StmtKind::Goto((*t).into())),
                    None => Stmt::new(StmtKind::Return(None)),
                };
                if exits.is_empty() || exits.len() > 2 {
                    return Err(SsaError::BranchArity {
                        scope: self.cfg.name.to_string(),
                        block,
                        exits: exits.len(),
                    });
                }
                StmtKind::If {
                    test: self.emit_expr(test, &loads),
                    then_branch: Box::new(branch(exits.first())),
                    else_branch: Box::new(branch(exits.get(1))),
                }
            }
            CfgStmtKind::Return(value) => {
                StmtKind::Return(value.as_ref().map(|v| self.emit_expr(v, &loads)))
            }
            CfgStmtKind::FunctionDef { name } => StmtKind::Assign {
                var: self.stored_var(block, index, name),
                value: Value::Var(SsaVar::free(self.renamed(name))),
            },
            CfgStmtKind::Comment(text) => StmtKind::Comment(text.clone()),
            CfgStmtKind::Pass => return Ok(None),
        };
        Ok(Some(Stmt::new(kind).with_span(stmt.span)))
    }

    fn stored_var(&self, block: BlockId, index: usize, name: &SmolStr) -> SsaVar {
        let version = self.versions.get(&block).and_then(|v| v.stored(index, name));
        SsaVar {
            name: self.renamed(name),
            version,
        }
    }

    fn emit_expr(&self, expr: &Expr, loads: &FxHashMap<SmolStr, Option<u32>>) -> Value {
        match expr {
            Expr::Name(name) => {
                if self.is_local(name) {
                    Value::Var(SsaVar {
                        name: self.renamed(name),
                        version: loads.get(name).copied().flatten(),
                    })
                } else {
                    Value::Var(SsaVar::free(name.clone()))
                }
            }
            Expr::Const(lit) => Value::Const(lit.clone()),
            Expr::Call {
                func,
                args,
                keywords,
            } => Value::Call(Call {
                func: Box::new(self.emit_expr(func, loads)),
                args: args.iter().map(|a| self.emit_expr(a, loads)).collect(),
                keywords: keywords
                    .iter()
                    .map(|kw| (kw.name.clone(), self.emit_expr(&kw.value, loads)))
                    .collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ssanf_cfg::{CfgBuilder, DefaultUsage, Literal, Stmt as S};

    fn build(cfg: &Cfg) -> SsaProgram {
        let mut ctx = TransformContext::new();
        SsaBuilder::new(&DefaultUsage, &mut ctx)
            .build_program(cfg)
            .unwrap()
    }

    fn block(program: &SsaProgram, id: u32) -> &Block {
        program
            .blocks
            .iter()
            .find(|b| b.label == Label(id))
            .unwrap()
    }

    fn v(name: &str, version: u32) -> SsaVar {
        SsaVar::versioned(name, version)
    }

    #[test]
    fn test_straight_line_versions() {
        let mut b = CfgBuilder::new("main");
        let entry = b.block();
        b.push(entry, S::assign("a", Expr::int(1)));
        b.push(entry, S::assign("a", Expr::binop("Add", Expr::name("a"), Expr::int(1))));
        let program = build(&b.build().unwrap());

        let stmts = &block(&program, 1).stmts;
        assert_eq!(stmts.len(), 2);
        match &stmts[1].kind {
            StmtKind::Assign { var, value } => {
                assert_eq!(var, &v("a", 1));
                assert_eq!(value.to_string(), "Add(a_0, 1)");
            }
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_loop_phi_has_two_incoming() {
        // 1: i = 0 -> 2: if Lt(i, 3) -> 3: i = Add(i, 1) -> 2 ; 2 -> 4
        let mut b = CfgBuilder::new("main");
        let entry = b.block();
        let header = b.block();
        let body = b.block();
        let exit = b.block();
        b.push(entry, S::assign("i", Expr::int(0)));
        b.push(header, S::branch(Expr::binop("Lt", Expr::name("i"), Expr::int(3))));
        b.push(body, S::assign("i", Expr::binop("Add", Expr::name("i"), Expr::int(1))));
        b.edge(entry, header).edge(header, body).edge(header, exit).edge(body, header);
        let program = build(&b.build().unwrap());

        let header = block(&program, 2);
        match &header.stmts[0].kind {
            StmtKind::Phi { var, incoming } => {
                assert_eq!(var, &v("i", 1));
                assert_eq!(incoming, &vec![v("i", 0), v("i", 2)]);
            }
            other => panic!("expected phi, got {:?}", other),
        }
        match &block(&program, 3).stmts[0].kind {
            StmtKind::Assign { value, .. } => assert_eq!(value.to_string(), "Add(i_1, 1)"),
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_branch_stmt_uses_exits() {
        let mut b = CfgBuilder::new("main");
        let entry = b.block();
        let then_b = b.block();
        let else_b = b.block();
        b.push(entry, S::assign("c", Expr::Const(Literal::Bool(true))));
        b.push(entry, S::branch(Expr::name("c")));
        b.edge(entry, then_b).edge(entry, else_b);
        let program = build(&b.build().unwrap());

        let last = block(&program, 1).stmts.last().unwrap();
        assert_eq!(last.targets(), vec![Label(2), Label(3)]);
        assert_eq!(block(&program, 1).stmts.len(), 2);
    }

    #[test]
    fn test_statements_after_return_are_dropped() {
        let mut b = CfgBuilder::new("main");
        let entry = b.block();
        b.push(entry, S::ret(Some(Expr::int(1))));
        b.push(entry, S::assign("dead", Expr::int(2)));
        let program = build(&b.build().unwrap());
        assert_eq!(block(&program, 1).stmts.len(), 1);
    }

    #[test]
    fn test_free_names_are_reported_once() {
        let mut b = CfgBuilder::new("main");
        let entry = b.block();
        b.push(entry, S::expr(Expr::call("print", vec![Expr::int(1)])));
        b.push(entry, S::expr(Expr::call("print", vec![Expr::int(2)])));
        let program = build(&b.build().unwrap());
        assert_eq!(program.diagnostics.len(), 1);
        assert_eq!(program.diagnostics[0].kind, DiagnosticKind::FreeName);
        assert!(!program.diagnostics[0].is_defect());
    }

    #[test]
    fn test_use_before_definition_is_diagnosed() {
        // 1 -> 2 | 3 ; 2 defines x ; both -> 4 which reads x only on one path
        let mut b = CfgBuilder::new("main");
        let entry = b.block();
        let reads = b.block();
        let defines = b.block();
        b.push(entry, S::branch(Expr::name("flag")));
        b.push(reads, S::expr(Expr::call("print", vec![Expr::name("x")])));
        b.push(defines, S::assign("x", Expr::int(1)));
        b.edge(entry, reads).edge(entry, defines);
        let program = build(&b.build().unwrap());

        let undefined: Vec<&Diagnostic> = program
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::UndefinedName)
            .collect();
        assert_eq!(undefined.len(), 1);
        assert_eq!(undefined[0].name, "x");
        assert_eq!(undefined[0].block, Label(2));
        match &block(&program, 2).stmts[0].kind {
            StmtKind::Call(call) => assert_eq!(call.to_string(), "print(x)"),
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_read_through_entry_loop_phi_is_diagnosed() {
        // 1: print(x); if c -> 2 | 3 ; 2: x = 1 -> 1
        let mut b = CfgBuilder::new("main");
        let entry = b.block();
        let body = b.block();
        let exit = b.block();
        b.push(entry, S::expr(Expr::call("print", vec![Expr::name("x")])));
        b.push(entry, S::branch(Expr::name("c")));
        b.push(body, S::assign("x", Expr::int(1)));
        b.edge(entry, body).edge(entry, exit).edge(body, entry);
        let program = build(&b.build().unwrap());

        let undefined: Vec<&Diagnostic> = program
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::UndefinedName)
            .collect();
        assert_eq!(undefined.len(), 1);
        assert_eq!(undefined[0].name, "x");
        assert_eq!(undefined[0].block, Label(1));
        match &block(&program, 1).stmts[1].kind {
            StmtKind::Call(call) => assert_eq!(call.to_string(), "print(x_0)"),
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_unread_partial_phi_is_silent() {
        // 1 -> 2 | 3 ; only 2 defines x ; 4 joins and never reads it
        let mut b = CfgBuilder::new("main");
        let entry = b.block();
        let defines = b.block();
        let skips = b.block();
        let join = b.block();
        b.push(entry, S::branch(Expr::name("flag")));
        b.push(defines, S::assign("x", Expr::int(1)));
        b.push(join, S::ret(None));
        b.edge(entry, defines).edge(entry, skips);
        b.edge(defines, join).edge(skips, join);
        let program = build(&b.build().unwrap());

        assert_eq!(block(&program, 4).phi_vars(), vec![&v("x", 1)]);
        assert!(program.diagnostics.iter().all(|d| !d.is_defect()));
    }

    #[test]
    fn test_function_def_binds_procedure_name() {
        let mut inner = CfgBuilder::starting_at("f", 10);
        let body = inner.block();
        inner.push(body, S::ret(Some(Expr::name("x"))));
        let inner = inner.build().unwrap();

        let mut b = CfgBuilder::new("main");
        let entry = b.block();
        b.push(entry, S::def("f"));
        b.push(entry, S::assign("y", Expr::call("f", vec![Expr::int(1)])));
        b.function("f", ["x"], inner);
        let program = build(&b.build().unwrap());

        let stmts = &block(&program, 1).stmts;
        match &stmts[0].kind {
            StmtKind::Assign { var, value } => {
                assert_eq!(var, &v("f", 0));
                assert_eq!(value, &Value::Var(SsaVar::free("f")));
            }
            other => panic!("expected assign, got {:?}", other),
        }
        let proc = program.procedure("f").unwrap();
        assert_eq!(proc.params, vec![v("x", 0)]);
        match &proc.blocks[0].stmts[0].kind {
            StmtKind::Return(Some(value)) => assert_eq!(value.to_string(), "x_0"),
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_branch_without_two_exits_is_rejected() {
        let mut b = CfgBuilder::new("main");
        let entry = b.block();
        let a = b.block();
        let c = b.block();
        let d = b.block();
        b.edge(entry, a).edge(entry, c).edge(entry, d);
        let err = {
            let cfg = b.build().unwrap();
            let mut ctx = TransformContext::new();
            SsaBuilder::new(&DefaultUsage, &mut ctx)
                .build_program(&cfg)
                .unwrap_err()
        };
        assert!(matches!(err, SsaError::BranchArity { exits: 3, .. }));
    }
}
