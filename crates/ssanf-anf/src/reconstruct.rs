//! ANF to SSA reconstruction.
//!
//! Inverts lowering: the outer `letrec` chain yields procedures, block groups
//! yield blocks, and phi statements are rebuilt from the arguments every jump
//! passes to a block's parameters.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use ssanf_ssa::{self as ssa, Label, Procedure, SsaProgram, SsaVar};
use std::collections::BTreeSet;

use crate::anf::*;
use crate::{AnfError, Result};

/// Rebuild an SSA program from a lowered (or parsed) expression
pub fn reconstruct(expr: &Expr) -> Result<SsaProgram> {
    let labels = LabelRule::for_tree(expr);
    let mut program = SsaProgram::new();
    let mut current = expr;
    loop {
        match &current.kind {
            ExprKind::LetRec {
                bindings,
                body: Some(body),
            } if !labels.is_block_group(bindings) => {
                for (name, func) in bindings {
                    program.procedures.push(reconstruct_procedure(name, func, labels)?);
                }
                current = body;
            }
            _ => break,
        }
    }
    program.blocks = ScopeBuilder::new("main", &[], labels).build(current)?;
    tracing::debug!(
        procedures = program.procedures.len(),
        blocks = program.blocks.len(),
        "reconstructed SSA program"
    );
    Ok(program)
}

/// How block references are told apart from ordinary names.
///
/// Lowered and parsed trees tag every block reference, and then the tag is
/// the only thing that counts: a procedure may well be called `L9`. Trees
/// built without any tags fall back to the `L<id>` naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelRule {
    Tagged,
    ByName,
}

impl LabelRule {
    fn for_tree(expr: &Expr) -> Self {
        if carries_label_tags(expr) {
            LabelRule::Tagged
        } else {
            LabelRule::ByName
        }
    }

    fn label(self, value: &Value) -> Option<Label> {
        match self {
            LabelRule::Tagged if !value.is_label() => None,
            _ => value.as_label(),
        }
    }

    fn is_block_group(self, bindings: &[(Value, Expr)]) -> bool {
        bindings.iter().all(|(name, _)| self.label(name).is_some())
    }
}

fn carries_label_tags(expr: &Expr) -> bool {
    let mut stack = vec![expr];
    while let Some(expr) = stack.pop() {
        match &expr.kind {
            ExprKind::Value(value) => {
                if value.is_label() {
                    return true;
                }
            }
            ExprKind::App { args, callee } => {
                if callee.is_label() || args.iter().any(Value::is_label) {
                    return true;
                }
            }
            ExprKind::Let { bound, body, .. } => {
                stack.push(bound);
                stack.push(body);
            }
            ExprKind::LetRec { bindings, body } => {
                if bindings.iter().any(|(name, _)| name.is_label()) {
                    return true;
                }
                stack.extend(bindings.iter().map(|(_, func)| func));
                stack.extend(body.as_deref());
            }
            ExprKind::If { then_, else_, .. } => {
                stack.push(then_);
                stack.push(else_);
            }
            ExprKind::Func { body, .. } | ExprKind::Comment { body, .. } => stack.push(body),
        }
    }
    false
}

fn malformed(message: impl Into<String>) -> AnfError {
    AnfError::MalformedTree {
        message: message.into(),
    }
}

fn reconstruct_procedure(name: &Value, func: &Expr, labels: LabelRule) -> Result<Procedure> {
    let name = match name.as_var() {
        Some(var) if !var.is_versioned() => var.name.clone(),
        _ => return Err(malformed("procedure binding is not a plain name")),
    };
    let (params, body) = func
        .unwrap_func_chain()
        .ok_or_else(|| malformed(format!("procedure `{}` is not bound to a function", name)))?;
    let params = params
        .into_iter()
        .map(|p| p.as_var().cloned())
        .collect::<Option<Vec<SsaVar>>>()
        .ok_or_else(|| malformed(format!("parameter of `{}` is not a variable", name)))?;
    let blocks = ScopeBuilder::new(&name, &params, labels).build(body)?;
    Ok(Procedure {
        name,
        params,
        blocks,
    })
}

/// A jump found while reading a block body
struct Jump {
    to: Label,
    args: Vec<ssa::Value>,
}

struct ScopeBuilder<'a> {
    scope: SmolStr,
    params: &'a [SsaVar],
    labels: LabelRule,
}

impl<'a> ScopeBuilder<'a> {
    fn new(scope: &str, params: &'a [SsaVar], labels: LabelRule) -> Self {
        Self {
            scope: scope.into(),
            params,
            labels,
        }
    }

    fn build(&self, expr: &Expr) -> Result<Vec<ssa::Block>> {
        let (bindings, start) = match &expr.kind {
            ExprKind::Value(value) if value.kind == ValueKind::Unit && !expr.prov.is_return() => {
                return Ok(Vec::new());
            }
            ExprKind::LetRec {
                bindings,
                body: Some(body),
            } if self.labels.is_block_group(bindings) => (bindings, body),
            _ => return Err(malformed(format!("scope `{}` is not a block group", self.scope))),
        };

        let (entry, entry_args) = match &start.kind {
            ExprKind::App { args, callee } => {
                let label = self
                    .labels
                    .label(callee)
                    .ok_or_else(|| malformed(format!("scope `{}` does not start with a jump", self.scope)))?;
                (label, self.operands(args, &FxHashMap::default())?)
            }
            _ => return Err(malformed(format!("scope `{}` does not start with a jump", self.scope))),
        };

        let mut blocks: FxHashMap<Label, ssa::Block> = FxHashMap::default();
        let mut params: FxHashMap<Label, Vec<SsaVar>> = FxHashMap::default();
        let mut jumps = vec![Jump {
            to: entry,
            args: entry_args,
        }];

        let mut pending: Vec<&(Value, Expr)> = bindings.iter().rev().collect();
        while let Some((name, func)) = pending.pop() {
            let label = self
                .labels
                .label(name)
                .ok_or_else(|| malformed(format!("block name `{:?}` is not a label", name.kind)))?;
            let (phis, body) = func
                .unwrap_func_chain()
                .ok_or_else(|| malformed(format!("block {} is not bound to a function", label)))?;
            let phis = phis
                .into_iter()
                .map(|p| p.as_var().cloned())
                .collect::<Option<Vec<SsaVar>>>()
                .ok_or_else(|| malformed(format!("parameter of block {} is not a variable", label)))?;

            let body = match &body.kind {
                ExprKind::LetRec {
                    bindings: nested,
                    body: Some(inner),
                } if self.labels.is_block_group(nested) && !nested.is_empty() => {
                    pending.extend(nested.iter().rev());
                    inner.as_ref()
                }
                _ => body,
            };

            let mut block = ssa::Block::new(label, label == entry);
            block.stmts = self.read_stmts(body, &mut jumps)?;
            if blocks.insert(label, block).is_some() {
                return Err(AnfError::DuplicateLabel {
                    label,
                    scope: self.scope.clone(),
                });
            }
            params.insert(label, phis);
        }

        // Phi incoming lists from the arguments of every jump
        let mut incoming: FxHashMap<Label, Vec<BTreeSet<SsaVar>>> = FxHashMap::default();
        for jump in &jumps {
            let phis = params.get(&jump.to).ok_or_else(|| AnfError::UnresolvedLabel {
                label: jump.to,
                scope: self.scope.clone(),
            })?;
            if phis.len() != jump.args.len() {
                return Err(malformed(format!(
                    "jump to {} passes {} arguments for {} parameters",
                    jump.to,
                    jump.args.len(),
                    phis.len()
                )));
            }
            let sets = incoming
                .entry(jump.to)
                .or_insert_with(|| vec![BTreeSet::new(); phis.len()]);
            for (set, arg) in sets.iter_mut().zip(&jump.args) {
                if let ssa::Value::Var(var) = arg {
                    if var.is_versioned() {
                        set.insert(var.clone());
                    }
                }
            }
        }

        let mut labels: Vec<Label> = blocks.keys().copied().collect();
        labels.sort_by_key(|l| (*l != entry, *l));
        let mut out = Vec::with_capacity(labels.len());
        for label in labels {
            let Some(mut block) = blocks.remove(&label) else {
                continue;
            };
            let phis = params.remove(&label).unwrap_or_default();
            let sets = incoming.remove(&label).unwrap_or_default();
            let mut stmts: Vec<ssa::Stmt> = phis
                .into_iter()
                .enumerate()
                .map(|(i, var)| {
                    let incoming = sets.get(i).map(|s| s.iter().cloned().collect()).unwrap_or_default();
                    ssa::Stmt::new(ssa::StmtKind::Phi { var, incoming })
                })
                .collect();
            stmts.append(&mut block.stmts);
            block.stmts = stmts;
            out.push(block);
        }
        if !out.iter().any(|b| b.label == entry) {
            return Err(AnfError::UnresolvedLabel {
                label: entry,
                scope: self.scope.clone(),
            });
        }
        tracing::trace!(scope = %self.scope, blocks = out.len(), params = self.params.len(), "reconstructed scope");
        Ok(out)
    }

    /// Statements of one block body; jumps are recorded in `jumps`
    fn read_stmts(&self, expr: &Expr, jumps: &mut Vec<Jump>) -> Result<Vec<ssa::Stmt>> {
        let mut stmts = Vec::new();
        let mut buffers: FxHashMap<SmolStr, ssa::Value> = FxHashMap::default();
        let mut current = expr;
        loop {
            let span = current.prov.span;
            match &current.kind {
                ExprKind::Let { var, bound, body } => {
                    let value = self.bound_value(bound, &buffers)?;
                    if var.is_buffer() {
                        let name = var
                            .as_var()
                            .map(|v| v.name.clone())
                            .ok_or_else(|| malformed("buffer binding is not a variable"))?;
                        buffers.insert(name, value);
                    } else if var.is_discard() {
                        match value {
                            ssa::Value::Call(call) => {
                                stmts.push(ssa::Stmt::new(ssa::StmtKind::Call(call)).with_span(span))
                            }
                            _ => return Err(malformed("discarded binding is not a call")),
                        }
                    } else {
                        let var = var
                            .as_var()
                            .cloned()
                            .ok_or_else(|| malformed("let binds a non-variable"))?;
                        stmts.push(ssa::Stmt::new(ssa::StmtKind::Assign { var, value }).with_span(span));
                    }
                    current = body;
                }
                ExprKind::Comment { text, body } => {
                    stmts.push(ssa::Stmt::new(ssa::StmtKind::Comment(text.clone())).with_span(span));
                    current = body;
                }
                ExprKind::If { test, then_, else_ } => {
                    let test = self.operand(test, &buffers)?;
                    let then_branch = self.read_branch(then_, jumps)?;
                    let else_branch = self.read_branch(else_, jumps)?;
                    stmts.push(
                        ssa::Stmt::new(ssa::StmtKind::If {
                            test,
                            then_branch: Box::new(then_branch),
                            else_branch: Box::new(else_branch),
                        })
                        .with_span(span),
                    );
                    break;
                }
                ExprKind::App { callee, args } if self.labels.label(callee).is_some() => {
                    let to = self
                        .labels
                        .label(callee)
                        .ok_or_else(|| malformed("jump target is not a block label"))?;
                    let args = self.operands(args, &buffers)?;
                    jumps.push(Jump { to, args });
                    stmts.push(ssa::Stmt::new(ssa::StmtKind::Goto(to)).with_span(span));
                    break;
                }
                ExprKind::App { .. } => {
                    let call = self.call(current, &buffers)?;
                    let kind = if current.prov.is_return() {
                        ssa::StmtKind::Return(Some(ssa::Value::Call(call)))
                    } else {
                        ssa::StmtKind::Call(call)
                    };
                    stmts.push(ssa::Stmt::new(kind).with_span(span));
                    break;
                }
                ExprKind::Value(value) => {
                    if current.prov.is_return() {
                        let value = match value.kind {
                            ValueKind::Unit => None,
                            _ => Some(self.operand(value, &buffers)?),
                        };
                        stmts.push(ssa::Stmt::new(ssa::StmtKind::Return(value)).with_span(span));
                    } else if value.kind != ValueKind::Unit {
                        return Err(malformed("block ends in a value that is not returned"));
                    }
                    break;
                }
                ExprKind::LetRec { .. } | ExprKind::Func { .. } => {
                    return Err(malformed("unexpected function inside a block body"));
                }
            }
        }
        Ok(stmts)
    }

    /// The single statement of an `if` branch
    fn read_branch(&self, expr: &Expr, jumps: &mut Vec<Jump>) -> Result<ssa::Stmt> {
        let mut stmts = self.read_stmts(expr, jumps)?;
        match (stmts.pop(), stmts.is_empty()) {
            (Some(stmt), true) => Ok(stmt),
            _ => Err(malformed("branch does not hold exactly one statement")),
        }
    }

    fn bound_value(&self, bound: &Expr, buffers: &FxHashMap<SmolStr, ssa::Value>) -> Result<ssa::Value> {
        match &bound.kind {
            ExprKind::Value(value) => self.operand(value, buffers),
            ExprKind::App { .. } => self.call(bound, buffers).map(ssa::Value::Call),
            _ => Err(malformed("let binds something other than a value or an application")),
        }
    }

    fn call(&self, app: &Expr, buffers: &FxHashMap<SmolStr, ssa::Value>) -> Result<ssa::Call> {
        let ExprKind::App { args, callee } = &app.kind else {
            return Err(malformed("expected an application"));
        };
        let names = app.prov.named_arguments().unwrap_or(&[]);
        if names.len() > args.len() {
            return Err(malformed("more keyword names than arguments"));
        }
        let split = args.len() - names.len();
        let mut operands = self.operands(args, buffers)?;
        let keywords = operands.split_off(split);
        Ok(ssa::Call {
            func: Box::new(self.operand(callee, buffers)?),
            args: operands,
            keywords: names.iter().cloned().zip(keywords).collect(),
        })
    }

    fn operands(&self, values: &[Value], buffers: &FxHashMap<SmolStr, ssa::Value>) -> Result<Vec<ssa::Value>> {
        values.iter().map(|v| self.operand(v, buffers)).collect()
    }

    fn operand(&self, value: &Value, buffers: &FxHashMap<SmolStr, ssa::Value>) -> Result<ssa::Value> {
        match &value.kind {
            ValueKind::Const(lit) => Ok(ssa::Value::Const(lit.clone())),
            ValueKind::Var(var) if value.is_buffer() => buffers
                .get(&var.name)
                .cloned()
                .ok_or_else(|| malformed(format!("buffer variable `{}` is not bound", var.name))),
            ValueKind::Var(var) => Ok(ssa::Value::Var(var.clone())),
            ValueKind::Unit => Err(malformed("`unit` used as an operand")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ssanf_cfg::{Literal, Span};

    fn v(name: &str, version: u32) -> Value {
        Value::var(SsaVar::versioned(name, version))
    }

    fn g(name: &str) -> Value {
        Value::var(SsaVar::free(name))
    }

    /// `letrec L1 = λ . let a_0 = 1 in L2 a_0 and L2 = λ a_1 . a_1 RET in L1`
    fn two_blocks() -> Expr {
        let l1 = Expr::func(
            None,
            Expr::let_(
                v("a", 0),
                Expr::value(Value::constant(Literal::Int(1))),
                Expr::app(Value::label(Label(2)), vec![v("a", 0)]),
            )
            .with_span(Some(Span::new(0, 5))),
        );
        let l2 = Expr::func(
            Some(v("a", 1)),
            Expr::value(v("a", 1)).with_hint(Hint::ReturnValue),
        );
        Expr::letrec(
            vec![(Value::label(Label(1)), l1), (Value::label(Label(2)), l2)],
            Some(Expr::app(Value::label(Label(1)), vec![])),
        )
    }

    #[test]
    fn test_phis_come_from_jump_arguments() {
        let program = reconstruct(&two_blocks()).unwrap();
        assert_eq!(program.blocks.len(), 2);
        let l2 = &program.blocks[1];
        assert_eq!(l2.label, Label(2));
        assert_eq!(
            l2.stmts[0].kind,
            ssa::StmtKind::Phi {
                var: SsaVar::versioned("a", 1),
                incoming: vec![SsaVar::versioned("a", 0)],
            }
        );
        assert_eq!(program.blocks[0].stmts[0].span, Some(Span::new(0, 5)));
        assert!(program.blocks[0].is_entry);
    }

    #[test]
    fn test_buffers_are_substituted() {
        // let $buf0 = g x_0 in let _ = f $buf0 in unit
        let body = Expr::let_(
            Value::buffer(0),
            Expr::app(g("g"), vec![v("x", 0)]),
            Expr::let_(Value::discard(), Expr::app(g("f"), vec![Value::buffer(0)]), Expr::unit()),
        );
        let expr = Expr::letrec(
            vec![(Value::label(Label(1)), Expr::func(None, body))],
            Some(Expr::app(Value::label(Label(1)), vec![])),
        );
        let program = reconstruct(&expr).unwrap();
        let stmts = &program.blocks[0].stmts;
        assert_eq!(stmts.len(), 1);
        match &stmts[0].kind {
            ssa::StmtKind::Call(call) => assert_eq!(call.to_string(), "f(g(x_0))"),
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_keyword_arguments_are_split_off() {
        let app = Expr::app(g("print"), vec![v("a", 0), Value::constant(Literal::Str("-".into()))])
            .with_hint(Hint::NamedArguments(vec!["sep".into()]));
        let builder = ScopeBuilder::new("main", &[], LabelRule::Tagged);
        let call = builder.call(&app, &FxHashMap::default()).unwrap();
        assert_eq!(call.to_string(), "print(a_0, sep='-')");
    }

    #[test]
    fn test_jump_to_unknown_label() {
        let expr = Expr::letrec(
            vec![(
                Value::label(Label(1)),
                Expr::func(None, Expr::app(Value::label(Label(5)), vec![])),
            )],
            Some(Expr::app(Value::label(Label(1)), vec![])),
        );
        let err = reconstruct(&expr).unwrap_err();
        assert!(matches!(err, AnfError::UnresolvedLabel { label: Label(5), .. }));
    }

    #[test]
    fn test_procedures_unfold_outer_groups() {
        let proc_body = Expr::letrec(
            vec![(
                Value::label(Label(10)),
                Expr::func(None, Expr::value(v("n", 0)).with_hint(Hint::ReturnValue)),
            )],
            Some(Expr::app(Value::label(Label(10)), vec![])),
        );
        let expr = Expr::letrec(
            vec![(g("f"), Expr::func(Some(v("n", 0)), proc_body))],
            Some(Expr::unit()),
        );
        let program = reconstruct(&expr).unwrap();
        assert!(program.blocks.is_empty());
        let proc = program.procedure("f").unwrap();
        assert_eq!(proc.params, vec![SsaVar::versioned("n", 0)]);
        assert_eq!(proc.blocks.len(), 1);
    }

    #[test]
    fn test_tagged_tree_ignores_label_like_names() {
        // letrec L5 = λ n_0 . (letrec L10 = λ . L9 n_0 RET in L10) in unit
        let proc_body = Expr::letrec(
            vec![(
                Value::label(Label(10)),
                Expr::func(None, Expr::app(g("L9"), vec![v("n", 0)]).with_hint(Hint::ReturnValue)),
            )],
            Some(Expr::app(Value::label(Label(10)), vec![])),
        );
        let expr = Expr::letrec(
            vec![(g("L5"), Expr::func(Some(v("n", 0)), proc_body))],
            Some(Expr::unit()),
        );
        let program = reconstruct(&expr).unwrap();
        let proc = program.procedure("L5").unwrap();
        match &proc.blocks[0].stmts[0].kind {
            ssa::StmtKind::Return(Some(ssa::Value::Call(call))) => {
                assert_eq!(call.to_string(), "L9(n_0)")
            }
            other => panic!("expected a returned call, got {:?}", other),
        }
    }

    #[test]
    fn test_untagged_tree_reads_labels_by_name() {
        let l1 = Expr::func(None, Expr::app(g("L2"), vec![v("a", 0)]));
        let l2 = Expr::func(Some(v("a", 1)), Expr::unit());
        let expr = Expr::letrec(vec![(g("L1"), l1), (g("L2"), l2)], Some(Expr::app(g("L1"), vec![])));
        assert_eq!(LabelRule::for_tree(&expr), LabelRule::ByName);

        let program = reconstruct(&expr).unwrap();
        assert_eq!(program.blocks.len(), 2);
        assert_eq!(program.blocks[0].stmts[0].kind, ssa::StmtKind::Goto(Label(2)));
        assert_eq!(LabelRule::for_tree(&two_blocks()), LabelRule::Tagged);
    }

    #[test]
    fn test_malformed_scope() {
        let err = reconstruct(&Expr::app(g("f"), vec![])).unwrap_err();
        assert!(matches!(err, AnfError::MalformedTree { .. }));
    }
}
