/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use petgraph::graph::NodeIndex;
use spire::context::AnalysisContext;
use spire::driver::Analyzer;
use spire::driver::FunctionOutcome;
use spire::error::AnalysisResult;
use spire::fixpoint_iter::TransferFunction;
use spire::graph::BlockRole;
use spire::graph::FlowGraph;
use spire::numeric::LinearConstraint;
use spire::numeric::LinearExpr;
use spire::numeric::LinearManager;
use spire::numeric::LinearValue;
use spire::options::AnalysisOptions;
use spire::value::AbstractValue;
use spire::value::Symbol;
use spire::value::VariableKind;
use spire::value::VariableKindClassifier;

#[derive(Clone, Debug)]
pub enum Stmt {
    Assign(Symbol, LinearExpr),
    Havoc(Symbol),
}

#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    pub stmts: Vec<Stmt>,
}

/// Edges carry the guards that must hold to take them.
pub type Cfg = FlowGraph<BasicBlock, Vec<LinearConstraint>>;

/// A toy procedure over integer variables.
pub struct Procedure {
    pub name: String,
    pub cfg: Cfg,
    vars: Vec<Symbol>,
}

impl Procedure {
    pub fn new(name: &str, vars: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            cfg: FlowGraph::new(BasicBlock::default()),
            vars: vars.iter().map(|&v| Symbol::from(v)).collect(),
        }
    }

    pub fn entry(&self) -> NodeIndex {
        self.cfg.entry_block()
    }

    pub fn block(&mut self, stmts: Vec<Stmt>) -> NodeIndex {
        self.cfg.add_block(BasicBlock { stmts })
    }

    pub fn set_stmts(&mut self, n: NodeIndex, stmts: Vec<Stmt>) {
        self.cfg.block_mut(n).stmts = stmts;
    }

    pub fn edge(&mut self, from: NodeIndex, to: NodeIndex, guards: Vec<LinearConstraint>) {
        self.cfg.add_edge(from, to, guards);
    }

    pub fn set_role(&mut self, n: NodeIndex, role: BlockRole) {
        self.cfg.set_role(n, role);
    }
}

impl VariableKindClassifier for Procedure {
    fn kind_of(&self, symbol: &Symbol) -> VariableKind {
        if self.vars.contains(symbol) {
            VariableKind::Int
        } else {
            VariableKind::Untracked
        }
    }
}

impl TransferFunction<Cfg, LinearValue> for Procedure {
    fn live_variables(&self, _n: NodeIndex) -> Vec<Symbol> {
        self.vars.clone()
    }

    fn analyze_node(&self, n: NodeIndex, state: &mut LinearValue) {
        for stmt in self.cfg.block(n).stmts.iter() {
            match stmt {
                Stmt::Assign(s, e) => state.assign(s, e),
                Stmt::Havoc(s) => state.forget(s),
            }
        }
    }

    fn analyze_edge(&self, from: NodeIndex, to: NodeIndex, state: &mut LinearValue) {
        if let Some(guards) = self.cfg.edge(from, to) {
            state.meet_constraints(guards);
        }
    }

    fn edge_thresholds(&self, from: NodeIndex, to: NodeIndex) -> Vec<LinearConstraint> {
        self.cfg.edge(from, to).cloned().unwrap_or_default()
    }
}

pub fn var(s: &str) -> LinearExpr {
    LinearExpr::var(s)
}

pub fn c(k: i64) -> LinearExpr {
    LinearExpr::constant(k)
}

pub fn assign(s: &str, e: LinearExpr) -> Stmt {
    Stmt::Assign(Symbol::from(s), e)
}

pub fn lt(lhs: LinearExpr, rhs: LinearExpr) -> LinearConstraint {
    LinearConstraint::lt(lhs, rhs)
}

pub fn le(lhs: LinearExpr, rhs: LinearExpr) -> LinearConstraint {
    LinearConstraint::le(lhs, rhs)
}

pub fn ge(lhs: LinearExpr, rhs: LinearExpr) -> LinearConstraint {
    LinearConstraint::at_least(lhs, rhs)
}

pub fn eq(lhs: LinearExpr, rhs: LinearExpr) -> LinearConstraint {
    LinearConstraint::equal(lhs, rhs)
}

/// Options used by the scenario tests: no deadline, so slow CI machines
/// do not turn results into unknowns.
pub fn options(options: AnalysisOptions) -> AnalysisOptions {
    options.with_timeout(None)
}

pub fn analyze(
    procedure: &Procedure,
    options: AnalysisOptions,
) -> AnalysisResult<FunctionOutcome<NodeIndex, LinearValue>> {
    let mut context = AnalysisContext::build(&procedure.cfg);
    analyze_in(procedure, options, &mut context)
}

pub fn analyze_in(
    procedure: &Procedure,
    options: AnalysisOptions,
    context: &mut AnalysisContext<NodeIndex, LinearValue>,
) -> AnalysisResult<FunctionOutcome<NodeIndex, LinearValue>> {
    let manager = LinearManager::new(options.domain);
    let analyzer = Analyzer::new(&manager, options);
    analyzer.analyze_function(&procedure.name, &procedure.cfg, procedure, context)
}

/// `x = 2; y = x + 50; return`.
pub struct StraightLine {
    pub procedure: Procedure,
    pub ret: NodeIndex,
}

pub fn straight_line() -> StraightLine {
    let mut p = Procedure::new("straight_line", &["x", "y"]);
    let entry = p.entry();
    p.set_stmts(entry, vec![assign("x", c(2)), assign("y", var("x") + c(50))]);
    let ret = p.block(vec![]);
    p.edge(entry, ret, vec![]);
    StraightLine { procedure: p, ret }
}

/// ```text
/// i = 0; x = 0;
/// while (i < 50) { x = x + 2; i = i + 1; }
/// return;
/// ```
pub struct CountingLoop {
    pub procedure: Procedure,
    pub header: NodeIndex,
    pub body: NodeIndex,
    pub exit: NodeIndex,
}

pub fn counting_loop() -> CountingLoop {
    counting_loop_to(50)
}

/// The same loop with `bound` in place of 50.
pub fn counting_loop_to(bound: i64) -> CountingLoop {
    let mut p = Procedure::new("counting_loop", &["i", "x"]);
    let entry = p.entry();
    p.set_stmts(entry, vec![assign("i", c(0)), assign("x", c(0))]);
    let header = p.block(vec![]);
    let body = p.block(vec![
        assign("x", var("x") + c(2)),
        assign("i", var("i") + c(1)),
    ]);
    let exit = p.block(vec![]);
    p.edge(entry, header, vec![]);
    p.edge(header, body, vec![lt(var("i"), c(bound))]);
    p.edge(body, header, vec![]);
    p.edge(header, exit, vec![ge(var("i"), c(bound))]);
    CountingLoop {
        procedure: p,
        header,
        body,
        exit,
    }
}

/// ```text
/// i = 0;
/// while (i < 49) i = i + 1;
/// if (z == 0) x = i + 1; else x = 61;
/// return;
/// ```
pub struct LoopThenBranch {
    pub procedure: Procedure,
    pub header: NodeIndex,
    pub ret: NodeIndex,
}

pub fn loop_then_branch() -> LoopThenBranch {
    let mut p = Procedure::new("loop_then_branch", &["i", "x", "z"]);
    let entry = p.entry();
    p.set_stmts(entry, vec![assign("i", c(0))]);
    let header = p.block(vec![]);
    let body = p.block(vec![assign("i", var("i") + c(1))]);
    let after = p.block(vec![]);
    let then = p.block(vec![assign("x", var("i") + c(1))]);
    let other = p.block(vec![assign("x", c(61))]);
    let negative = p.block(vec![]);
    let join = p.block(vec![]);
    let ret = p.block(vec![]);
    p.edge(entry, header, vec![]);
    p.edge(header, body, vec![lt(var("i"), c(49))]);
    p.edge(body, header, vec![]);
    p.edge(header, after, vec![ge(var("i"), c(49))]);
    p.edge(after, then, vec![eq(var("z"), c(0))]);
    // z != 0 is not convex: one edge per half.
    p.edge(after, other, vec![ge(var("z"), c(1))]);
    p.edge(after, negative, vec![le(var("z"), c(-1))]);
    p.edge(negative, other, vec![]);
    p.edge(then, join, vec![]);
    p.edge(other, join, vec![]);
    p.edge(join, ret, vec![]);
    LoopThenBranch {
        procedure: p,
        header,
        ret,
    }
}

/// Three branches producing `(x, z)` = `(0, 0)`, `(10, 1)` and `(20, 2)`,
/// merged before the return.
pub struct ThreeWayJoin {
    pub procedure: Procedure,
    pub join: NodeIndex,
    pub ret: NodeIndex,
}

pub fn three_way_join() -> ThreeWayJoin {
    let mut p = Procedure::new("three_way_join", &["x", "z"]);
    let entry = p.entry();
    let join = p.block(vec![]);
    let ret = p.block(vec![]);
    for k in 0..3 {
        let arm = p.block(vec![assign("x", c(10 * k)), assign("z", c(k))]);
        p.edge(entry, arm, vec![]);
        p.edge(arm, join, vec![]);
    }
    p.edge(join, ret, vec![]);
    ThreeWayJoin {
        procedure: p,
        join,
        ret,
    }
}
