//! End-to-end tests for SSA construction.
//!
//! Each test assembles a control-flow graph with `CfgBuilder`, runs the
//! builder and checks either the printed SSA or structural properties of the
//! result.

use pretty_assertions::assert_eq;
use rustc_hash::FxHashSet;
use ssanf_cfg::{Cfg, CfgBuilder, Expr, Stmt as CfgStmt};
use ssanf_ssa::{
    build_ssa, pretty_print, Block, DiagnosticKind, Label, PrintStyle, SsaProgram, SsaVar,
    StmtKind,
};

/// Build SSA, asserting success
fn assert_builds(cfg: &Cfg) -> SsaProgram {
    match build_ssa(cfg) {
        Ok(program) => program,
        Err(e) => panic!("Failed to build SSA for `{}`: {}", cfg.name, e),
    }
}

fn block(blocks: &[Block], id: u32) -> &Block {
    blocks
        .iter()
        .find(|b| b.label == Label(id))
        .unwrap_or_else(|| panic!("no block L{}", id))
}

fn phi(block: &Block, name: &str) -> (SsaVar, Vec<SsaVar>) {
    block
        .stmts
        .iter()
        .find_map(|s| match &s.kind {
            StmtKind::Phi { var, incoming } if var.name == name => {
                Some((var.clone(), incoming.clone()))
            }
            _ => None,
        })
        .unwrap_or_else(|| panic!("no phi for `{}` in {}", name, block.label))
}

/// `a = 1; if a: b = 2 else: b = 3; print(b)`
fn if_test() -> Cfg {
    let mut b = CfgBuilder::new("main");
    let entry = b.block();
    let then_b = b.block();
    let else_b = b.block();
    let join = b.block();
    b.push(entry, CfgStmt::assign("a", Expr::int(1)));
    b.push(entry, CfgStmt::branch(Expr::name("a")));
    b.push(then_b, CfgStmt::assign("b", Expr::int(2)));
    b.push(else_b, CfgStmt::assign("b", Expr::int(3)));
    b.push(join, CfgStmt::expr(Expr::call("print", vec![Expr::name("b")])));
    b.edge(entry, then_b).edge(entry, else_b);
    b.edge(then_b, join).edge(else_b, join);
    b.build().unwrap()
}

/// `total = 0; for i in range(n): if i: total = Add(total, i); print(total)`
fn nested_loop() -> Cfg {
    let mut b = CfgBuilder::new("main");
    let entry = b.block();
    let header = b.block();
    let test = b.block();
    let add = b.block();
    let exit = b.block();
    b.push(entry, CfgStmt::assign("total", Expr::int(0)));
    b.push(entry, CfgStmt::assign("i", Expr::int(0)));
    b.push(header, CfgStmt::branch(Expr::binop("Lt", Expr::name("i"), Expr::name("n"))));
    b.push(test, CfgStmt::assign("i", Expr::binop("Add", Expr::name("i"), Expr::int(1))));
    b.push(test, CfgStmt::branch(Expr::name("i")));
    b.push(
        add,
        CfgStmt::assign("total", Expr::binop("Add", Expr::name("total"), Expr::name("i"))),
    );
    b.push(exit, CfgStmt::expr(Expr::call("print", vec![Expr::name("total")])));
    b.edge(entry, header);
    b.edge(header, test).edge(header, exit);
    b.edge(test, add).edge(test, header);
    b.edge(add, header);
    b.build().unwrap()
}

/// Every scope defines each `(name, version)` pair at most once
fn assert_single_assignment(program: &SsaProgram) {
    let no_params: &[SsaVar] = &[];
    let mut scopes: Vec<(&str, &[Block], &[SsaVar])> =
        vec![("main", program.blocks.as_slice(), no_params)];
    for proc in &program.procedures {
        scopes.push((proc.name.as_str(), proc.blocks.as_slice(), proc.params.as_slice()));
    }
    for (name, blocks, params) in scopes {
        let mut seen: FxHashSet<SsaVar> = params.iter().cloned().collect();
        for block in blocks {
            for stmt in &block.stmts {
                if let Some(var) = stmt.defined_var() {
                    assert!(var.is_versioned(), "{} defines unversioned {}", name, var);
                    assert!(seen.insert(var.clone()), "{} defines {} twice", name, var);
                }
            }
        }
    }
}

/// Every phi incoming version is defined somewhere in its scope
fn assert_phis_complete(blocks: &[Block], params: &[SsaVar]) {
    let mut defined: FxHashSet<SsaVar> = params.iter().cloned().collect();
    for block in blocks {
        for stmt in &block.stmts {
            if let Some(var) = stmt.defined_var() {
                defined.insert(var.clone());
            }
        }
    }
    for block in blocks {
        for stmt in &block.stmts {
            if let StmtKind::Phi { var, incoming } = &stmt.kind {
                assert!(!incoming.is_empty(), "phi {} has no incoming", var);
                for v in incoming {
                    assert_eq!(v.name, var.name);
                    assert!(defined.contains(v), "phi {} reads undefined {}", var, v);
                }
            }
        }
    }
}

// ============================================================================
// Phi Placement
// ============================================================================

#[test]
fn test_if_join_prints_phi() {
    let program = assert_builds(&if_test());
    let expected = "\
L1:
  a_0 ← 1
  if a_0 then goto L2 else goto L3
L2:
  b_0 ← 2
  goto L4
L3:
  b_1 ← 3
  goto L4
L4:
  b_2 ← φ(b_0, b_1)
  print(b_2)
";
    assert_eq!(pretty_print(&program, PrintStyle::Symbolic), expected);
}

#[test]
fn test_loop_places_iterated_phis() {
    let program = assert_builds(&nested_loop());
    let header = block(&program.blocks, 2);

    let (total, total_in) = phi(header, "total");
    let (i, i_in) = phi(header, "i");
    assert_eq!(total, SsaVar::versioned("total", 1));
    assert_eq!(i, SsaVar::versioned("i", 1));
    // From the entry, from the loop test and from the `add` block
    assert_eq!(
        total_in,
        vec![
            SsaVar::versioned("total", 0),
            SsaVar::versioned("total", 1),
            SsaVar::versioned("total", 2),
        ]
    );
    assert_eq!(i_in, vec![SsaVar::versioned("i", 0), SsaVar::versioned("i", 2)]);

    assert_single_assignment(&program);
    assert_phis_complete(&program.blocks, &[]);
}

#[test]
fn test_loop_body_reads_header_versions() {
    let program = assert_builds(&nested_loop());
    let add = block(&program.blocks, 4);
    match &add.stmts[0].kind {
        StmtKind::Assign { var, value } => {
            assert_eq!(var, &SsaVar::versioned("total", 2));
            assert_eq!(value.to_string(), "Add(total_1, i_2)");
        }
        other => panic!("expected assign, got {:?}", other),
    }
    let exit = block(&program.blocks, 5);
    match &exit.stmts[0].kind {
        StmtKind::Call(call) => assert_eq!(call.to_string(), "print(total_1)"),
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_back_edge_into_entry_merges_parameter() {
    let mut f = CfgBuilder::starting_at("countdown", 10);
    let entry = f.block();
    let done = f.block();
    f.push(entry, CfgStmt::assign("n", Expr::binop("Sub", Expr::name("n"), Expr::int(1))));
    f.push(entry, CfgStmt::branch(Expr::name("n")));
    f.push(done, CfgStmt::ret(Some(Expr::name("n"))));
    f.edge(entry, entry).edge(entry, done);
    let f = f.build().unwrap();

    let mut main = CfgBuilder::new("main");
    let m = main.block();
    main.push(m, CfgStmt::def("countdown"));
    main.function("countdown", ["n"], f);
    let program = assert_builds(&main.build().unwrap());

    let proc = program.procedure("countdown").unwrap();
    assert_eq!(proc.params, vec![SsaVar::versioned("n", 0)]);
    let (n, incoming) = phi(block(&proc.blocks, 10), "n");
    assert_eq!(n, SsaVar::versioned("n", 1));
    assert_eq!(incoming, vec![SsaVar::versioned("n", 0), SsaVar::versioned("n", 2)]);
    match &block(&proc.blocks, 11).stmts[0].kind {
        StmtKind::Return(Some(v)) => assert_eq!(v.to_string(), "n_2"),
        other => panic!("expected return, got {:?}", other),
    }
    assert_phis_complete(&proc.blocks, &proc.params);
}

// ============================================================================
// Naming Across Scopes
// ============================================================================

fn straight_procedure(name: &str, first_id: u32, stores: &str, nested: Option<(&str, Cfg)>) -> Cfg {
    let mut b = CfgBuilder::starting_at(name, first_id);
    let entry = b.block();
    b.push(entry, CfgStmt::assign(stores, Expr::int(2)));
    if let Some((inner, cfg)) = nested {
        b.push(entry, CfgStmt::def(inner));
        b.function(inner, Vec::<&str>::new(), cfg);
    }
    b.push(entry, CfgStmt::ret(Some(Expr::name(stores))));
    b.build().unwrap()
}

#[test]
fn test_global_renaming_across_nesting() {
    let g = straight_procedure("g", 20, "x", None);
    let f = straight_procedure("f", 10, "x", Some(("g", g)));

    let mut main = CfgBuilder::new("main");
    let entry = main.block();
    main.push(entry, CfgStmt::assign("x", Expr::int(1)));
    main.push(entry, CfgStmt::def("f"));
    main.function("f", Vec::<&str>::new(), f);
    let program = assert_builds(&main.build().unwrap());

    let names: Vec<&str> = program.procedures.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["f", "g"]);

    let defined = |blocks: &[Block]| -> Vec<String> {
        blocks
            .iter()
            .flat_map(|b| b.stmts.iter())
            .filter_map(|s| s.defined_var().map(ToString::to_string))
            .collect()
    };
    assert_eq!(defined(&program.blocks), vec!["x_0", "f_0"]);
    assert_eq!(defined(&program.procedures[0].blocks), vec!["x_2_0", "g_0"]);
    assert_eq!(defined(&program.procedures[1].blocks), vec!["x_3_0"]);
}

#[test]
fn test_procedures_flatten_depth_first() {
    let g = straight_procedure("g", 30, "c", None);
    let f = straight_procedure("f", 10, "a", Some(("g", g)));
    let h = straight_procedure("h", 20, "b", None);

    let mut main = CfgBuilder::new("main");
    let entry = main.block();
    main.push(entry, CfgStmt::def("f"));
    main.push(entry, CfgStmt::def("h"));
    main.function("f", Vec::<&str>::new(), f);
    main.function("h", Vec::<&str>::new(), h);
    let program = assert_builds(&main.build().unwrap());

    let names: Vec<&str> = program.procedures.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["f", "g", "h"]);
    assert_single_assignment(&program);
}

#[test]
fn test_outer_variable_is_read_free() {
    let mut f = CfgBuilder::starting_at("f", 10);
    let entry = f.block();
    f.push(entry, CfgStmt::ret(Some(Expr::name("limit"))));
    let f = f.build().unwrap();

    let mut main = CfgBuilder::new("main");
    let entry = main.block();
    main.push(entry, CfgStmt::assign("limit", Expr::int(10)));
    main.push(entry, CfgStmt::def("f"));
    main.function("f", Vec::<&str>::new(), f);
    let program = assert_builds(&main.build().unwrap());

    let proc = program.procedure("f").unwrap();
    match &proc.blocks[0].stmts[0].kind {
        StmtKind::Return(Some(v)) => assert_eq!(v.to_string(), "limit"),
        other => panic!("expected return, got {:?}", other),
    }
    assert!(program
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::FreeName && d.name == "limit" && d.scope == "f"));
}

// ============================================================================
// Degenerate Dataflow
// ============================================================================

#[test]
fn test_unreachable_block_is_kept_last() {
    let mut b = CfgBuilder::new("main");
    let entry = b.block();
    let orphan = b.block();
    b.push(entry, CfgStmt::assign("a", Expr::int(1)));
    b.push(orphan, CfgStmt::assign("a", Expr::int(2)));
    let program = assert_builds(&b.build().unwrap());

    let labels: Vec<Label> = program.blocks.iter().map(|b| b.label).collect();
    assert_eq!(labels, vec![Label(1), Label(2)]);
    assert_single_assignment(&program);
}

#[test]
fn test_entry_block_sorts_first() {
    let mut b = CfgBuilder::starting_at("main", 5);
    let entry = b.block();
    let next = b.block();
    b.edge(entry, next);
    let mut cfg = b.build().unwrap();
    // Relabel so the entry has the larger id
    cfg.blocks.reverse();
    cfg.blocks[0].id = ssanf_cfg::BlockId(1);
    cfg.blocks[1].exits = vec![ssanf_cfg::BlockId(1)];
    let program = assert_builds(&cfg);

    assert_eq!(program.blocks[0].label, Label(5));
    assert!(program.blocks[0].is_entry);
    assert_eq!(program.blocks[1].label, Label(1));
}
