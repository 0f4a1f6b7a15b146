/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Per-function and per-module entry points.
//!
//! A function whose analysis runs out of time, or hits an oracle that
//! cannot decide a query, is reported as unknown and the module run
//! goes on with the next function. Any other error aborts the run.

use std::collections::BTreeSet;
use std::time::Duration;
use std::time::Instant;

use log::info;
use log::warn;

use crate::context::AnalysisContext;
use crate::error::AnalysisError;
use crate::error::AnalysisResult;
use crate::fixpoint_iter::FixpointEngine;
use crate::fixpoint_iter::IterationStats;
use crate::fixpoint_iter::TransferFunction;
use crate::graph::BlockRole;
use crate::graph::ControlFlowGraph;
use crate::node::Technique;
use crate::node::TechniqueKey;
use crate::options::AnalysisOptions;
use crate::oracle::AbstractPathOracle;
use crate::oracle::PathOracle;
use crate::strategy::run_technique;
use crate::value::AbstractValue;
use crate::value::DomainManager;

/// Final invariant of one block.
#[derive(Clone, Debug)]
pub struct NodeInvariant<N, V> {
    pub block: N,
    /// Live disjuncts of `X_s`. Single-value techniques report at most
    /// one.
    pub disjuncts: Vec<V>,
    pub is_bottom: bool,
    pub is_reduction_point: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SiteVerdict {
    /// The site is unreachable.
    Proved,
    Unproved,
}

/// Verdict on an assertion-failure or undefined-behaviour block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SiteReport<N> {
    pub block: N,
    pub role: BlockRole,
    pub verdict: SiteVerdict,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FunctionStatus {
    Completed,
    /// Abandoned; the invariants were discarded.
    Unknown(AnalysisError),
}

#[derive(Clone, Debug)]
pub struct FunctionOutcome<N, V> {
    pub name: String,
    pub key: TechniqueKey,
    pub status: FunctionStatus,
    pub invariants: Vec<NodeInvariant<N, V>>,
    pub sites: Vec<SiteReport<N>>,
    pub stats: IterationStats,
    pub elapsed: Duration,
    pub precision_degraded: bool,
}

impl<N: PartialEq, V: AbstractValue> FunctionOutcome<N, V> {
    pub fn is_completed(&self) -> bool {
        self.status == FunctionStatus::Completed
    }

    pub fn invariant(&self, block: N) -> Option<&NodeInvariant<N, V>> {
        self.invariants.iter().find(|inv| inv.block == block)
    }

    /// Join of the disjuncts of `block`, `None` when it is bottom or was
    /// not analyzed.
    pub fn hull(&self, block: N) -> Option<V> {
        let inv = self.invariant(block)?;
        let (first, rest) = inv.disjuncts.split_first()?;
        let mut hull = first.clone();
        let env = rest
            .iter()
            .fold(hull.environment().clone(), |env, d| env.union(d.environment()));
        hull.join_array(&env, rest.to_vec());
        Some(hull)
    }
}

/// One function handed to [`Analyzer::analyze_module`].
pub struct FunctionUnit<'f, G: ControlFlowGraph, V: AbstractValue> {
    pub name: String,
    pub graph: &'f G,
    pub transfer: &'f dyn TransferFunction<G, V>,
}

#[derive(Clone, Debug)]
pub struct AnalysisReport<N, V> {
    pub functions: Vec<FunctionOutcome<N, V>>,
    ignored: BTreeSet<String>,
}

impl<N, V> Default for AnalysisReport<N, V> {
    fn default() -> Self {
        Self {
            functions: Vec::new(),
            ignored: BTreeSet::new(),
        }
    }
}

impl<N, V> AnalysisReport<N, V> {
    /// Functions whose analysis was abandoned.
    pub fn ignored(&self) -> &BTreeSet<String> {
        &self.ignored
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored.contains(name)
    }

    pub fn outcome(&self, name: &str) -> Option<&FunctionOutcome<N, V>> {
        self.functions.iter().find(|o| o.name == name)
    }

    fn record(&mut self, outcome: FunctionOutcome<N, V>) {
        if !matches!(outcome.status, FunctionStatus::Completed) {
            self.ignored.insert(outcome.name.clone());
        }
        self.functions.push(outcome);
    }
}

pub struct Analyzer<'m, V: AbstractValue> {
    manager: &'m dyn DomainManager<Value = V>,
    options: AnalysisOptions,
}

impl<'m, V: AbstractValue> Analyzer<'m, V> {
    pub fn new(manager: &'m dyn DomainManager<Value = V>, options: AnalysisOptions) -> Self {
        Self { manager, options }
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Analyzes one function with the built-in [`AbstractPathOracle`].
    ///
    /// `context` must have been built from `graph`. It keeps the slots
    /// of this run, so a later run on the same context can use them as
    /// known properties.
    pub fn analyze_function<G>(
        &self,
        name: &str,
        graph: &G,
        transfer: &dyn TransferFunction<G, V>,
        context: &mut AnalysisContext<G::NodeId, V>,
    ) -> AnalysisResult<FunctionOutcome<G::NodeId, V>>
    where
        G: ControlFlowGraph,
    {
        let mut oracle = AbstractPathOracle::new(graph, transfer);
        self.analyze_function_with_oracle(name, graph, transfer, &mut oracle, context)
    }

    pub fn analyze_function_with_oracle<G>(
        &self,
        name: &str,
        graph: &G,
        transfer: &dyn TransferFunction<G, V>,
        oracle: &mut dyn PathOracle<G::NodeId, V>,
        context: &mut AnalysisContext<G::NodeId, V>,
    ) -> AnalysisResult<FunctionOutcome<G::NodeId, V>>
    where
        G: ControlFlowGraph,
    {
        let key = self.options.technique_key();
        info!("analyzing {} with {}", name, key);
        let started = Instant::now();

        let mut engine = FixpointEngine::new(graph, self.manager, transfer, oracle, &self.options, context);
        let result = run_technique(&mut engine);
        let stats = *engine.stats();
        drop(engine);
        let elapsed = started.elapsed();

        let (status, precision_degraded) = match result {
            Ok(degraded) => (FunctionStatus::Completed, degraded),
            Err(e) if e.is_recoverable() => {
                warn!("giving up on {}: {}", name, e);
                (FunctionStatus::Unknown(e), false)
            }
            Err(e) => return Err(e),
        };

        let (invariants, sites) = if status == FunctionStatus::Completed {
            collect_invariants(context, key)?
        } else {
            (Vec::new(), Vec::new())
        };
        info!(
            "{}: {:?} after {} ascending and {} descending steps in {:?}",
            name, status, stats.ascending_steps, stats.descending_steps, elapsed
        );
        Ok(FunctionOutcome {
            name: name.to_string(),
            key,
            status,
            invariants,
            sites,
            stats,
            elapsed,
            precision_degraded,
        })
    }

    /// Analyzes every function in order, each on a fresh context.
    pub fn analyze_module<'f, G, I>(&self, functions: I) -> AnalysisResult<AnalysisReport<G::NodeId, V>>
    where
        G: ControlFlowGraph + 'f,
        V: 'f,
        I: IntoIterator<Item = FunctionUnit<'f, G, V>>,
    {
        let mut report = AnalysisReport::default();
        for unit in functions {
            let mut context = AnalysisContext::build(unit.graph);
            let outcome = self.analyze_function(&unit.name, unit.graph, unit.transfer, &mut context)?;
            report.record(outcome);
        }
        info!(
            "module done: {} functions, {} ignored",
            report.functions.len(),
            report.ignored.len()
        );
        Ok(report)
    }
}

type Collected<N, V> = (Vec<NodeInvariant<N, V>>, Vec<SiteReport<N>>);

fn collect_invariants<N, V>(context: &AnalysisContext<N, V>, key: TechniqueKey) -> AnalysisResult<Collected<N, V>>
where
    N: Copy + std::hash::Hash + Eq + std::fmt::Debug,
    V: AbstractValue,
{
    let single = key.technique != Technique::PathFocusingDisjunctive;
    let mut invariants = Vec::with_capacity(context.len());
    let mut sites = Vec::new();
    for n in 0..context.len() {
        let block = context.block(n)?;
        let stable = &context.slots(n, &key)?.x_s;
        let disjuncts: Vec<V> = stable
            .iter()
            .take(if single { 1 } else { stable.len() })
            .filter(|d| !d.is_bottom())
            .cloned()
            .collect();
        let is_bottom = disjuncts.is_empty();
        let role = context.reduction().role(n);
        if matches!(role, BlockRole::AssertionFailure | BlockRole::UndefinedBehavior) {
            sites.push(SiteReport {
                block,
                role,
                verdict: if is_bottom {
                    SiteVerdict::Proved
                } else {
                    SiteVerdict::Unproved
                },
            });
        }
        invariants.push(NodeInvariant {
            block,
            disjuncts,
            is_bottom,
            is_reduction_point: context.reduction().in_pr(n),
        });
    }
    Ok((invariants, sites))
}
