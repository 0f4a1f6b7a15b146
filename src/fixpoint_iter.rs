/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::cmp::Reverse;
use std::collections::BTreeSet;

use log::debug;
use log::trace;

use crate::context::AnalysisContext;
use crate::datatype::DisjunctiveValue;
use crate::deadline::Deadline;
use crate::error::AnalysisError;
use crate::error::AnalysisResult;
use crate::graph::ControlFlowGraph;
use crate::node::NodeSlots;
use crate::node::SlotKind;
use crate::node::Technique;
use crate::node::TechniqueKey;
use crate::node::ThresholdPolicy;
use crate::options::AnalysisOptions;
use crate::oracle::OracleAnswer;
use crate::oracle::PathOracle;
use crate::oracle::PathQuery;
use crate::path::Path;
use crate::path::PathFilter;
use crate::strategy::PathSelectionStrategy;
use crate::value::AbstractValue;
use crate::value::DomainManager;
use crate::value::Environment;
use crate::value::Symbol;
use crate::value::VariableKindClassifier;

/// The client side of the analysis: what blocks and edges do to an
/// abstract value.
///
/// The value flowing into `analyze_node` is the state at the start of
/// the block; `analyze_edge` refines the state at the end of `from` by
/// the branch condition leading to `to`. Both update in place and may
/// extend the value's environment.
pub trait TransferFunction<G: ControlFlowGraph, V: AbstractValue>: VariableKindClassifier {
    /// Variables that must be tracked at the start of `n`.
    fn live_variables(&self, n: G::NodeId) -> Vec<Symbol>;

    fn analyze_node(&self, n: G::NodeId, state: &mut V);

    fn analyze_edge(&self, from: G::NodeId, to: G::NodeId, state: &mut V);

    /// Constraints guarding the edge, used as widening thresholds.
    fn edge_thresholds(&self, from: G::NodeId, to: G::NodeId) -> Vec<V::Constraint>;
}

/// Applies every step of `path` to `value`: the body of each block but
/// the last, then the edge leaving it. Guard constraints met on the way
/// are added to `thresholds` when given.
pub fn compute_transform<G, V>(
    transfer: &dyn TransferFunction<G, V>,
    path: &Path<G::NodeId>,
    value: &mut V,
    mut thresholds: Option<&mut Vec<V::Constraint>>,
) where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    for (from, to) in path.steps() {
        transfer.analyze_node(from, value);
        transfer.analyze_edge(from, to, value);
        if let Some(ths) = thresholds.as_mut() {
            for c in transfer.edge_thresholds(from, to) {
                if !ths.contains(&c) {
                    ths.push(c);
                }
            }
        }
    }
}

/// Nodes waiting to be computed. Lower SCC labels come first, ties go to
/// the higher arena index.
#[derive(Clone, Debug, Default)]
pub struct Worklist {
    queue: BTreeSet<(usize, Reverse<usize>)>,
}

impl Worklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, n: usize, scc: usize) {
        self.queue.insert((scc, Reverse(n)));
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.queue.pop_first().map(|(_, Reverse(n))| n)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IterationStats {
    pub ascending_steps: u64,
    pub descending_steps: u64,
    pub widenings: u64,
    pub oracle_queries: u64,
    pub rounds: u64,
}

/// State of one technique running on one function.
///
/// The engine owns the iteration bookkeeping (worklist, computed marks,
/// thresholds, deadline) and the operations every strategy shares; the
/// [`PathSelectionStrategy`] decides what computing a node means.
/// Nodes are addressed by arena index, the entry is index 0.
pub struct FixpointEngine<'a, G: ControlFlowGraph, V: AbstractValue> {
    graph: &'a G,
    manager: &'a dyn DomainManager<Value = V>,
    transfer: &'a dyn TransferFunction<G, V>,
    oracle: &'a mut dyn PathOracle<G::NodeId, V>,
    options: &'a AnalysisOptions,
    context: &'a mut AnalysisContext<G::NodeId, V>,
    key: TechniqueKey,
    pub worklist: Worklist,
    pub is_computed: Vec<bool>,
    thresholds: Vec<V::Constraint>,
    use_thresholds: bool,
    deadline: Deadline,
    stats: IterationStats,
    unknown: bool,
}

pub const ENTRY: usize = 0;

impl<'a, G, V> FixpointEngine<'a, G, V>
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    pub fn new(
        graph: &'a G,
        manager: &'a dyn DomainManager<Value = V>,
        transfer: &'a dyn TransferFunction<G, V>,
        oracle: &'a mut dyn PathOracle<G::NodeId, V>,
        options: &'a AnalysisOptions,
        context: &'a mut AnalysisContext<G::NodeId, V>,
    ) -> Self {
        let size = context.len();
        Self {
            graph,
            manager,
            transfer,
            oracle,
            options,
            context,
            key: options.technique_key(),
            worklist: Worklist::new(),
            is_computed: vec![false; size],
            thresholds: Vec::new(),
            use_thresholds: options.threshold == ThresholdPolicy::Enabled,
            deadline: Deadline::start(options.timeout),
            stats: IterationStats::default(),
            unknown: false,
        }
    }

    pub fn key(&self) -> TechniqueKey {
        self.key
    }

    pub fn technique(&self) -> Technique {
        self.key.technique
    }

    pub fn options(&self) -> &AnalysisOptions {
        self.options
    }

    pub fn graph(&self) -> &G {
        self.graph
    }

    pub fn context(&self) -> &AnalysisContext<G::NodeId, V> {
        self.context
    }

    pub fn stats(&self) -> &IterationStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut IterationStats {
        &mut self.stats
    }

    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }

    pub fn is_unknown(&self) -> bool {
        self.unknown
    }

    pub fn node_count(&self) -> usize {
        self.context.len()
    }

    pub fn in_pw(&self, n: usize) -> bool {
        self.context.reduction().in_pw(n)
    }

    pub fn in_pr(&self, n: usize) -> bool {
        self.context.reduction().in_pr(n)
    }

    pub fn successors(&self, n: usize) -> Vec<usize> {
        self.context.successors(n).to_vec()
    }

    pub fn pr_successors(&self, n: usize) -> Vec<usize> {
        self.context.reduction().pr_successors(n).to_vec()
    }

    pub fn block(&self, n: usize) -> AnalysisResult<G::NodeId> {
        self.context.block(n)
    }

    pub fn env(&self, n: usize) -> AnalysisResult<Environment> {
        Ok(self.context.node(n)?.env().clone())
    }

    pub fn top(&self, n: usize) -> AnalysisResult<V> {
        Ok(self.manager.top(self.context.node(n)?.env()))
    }

    pub fn bottom(&self, n: usize) -> AnalysisResult<V> {
        Ok(self.manager.bottom(self.context.node(n)?.env()))
    }

    pub fn slot(&self, n: usize, kind: SlotKind) -> AnalysisResult<&DisjunctiveValue<V>> {
        Ok(self.context.slots(n, &self.key)?.get(kind))
    }

    pub fn slot_mut(&mut self, n: usize, kind: SlotKind) -> AnalysisResult<&mut DisjunctiveValue<V>> {
        let key = self.key;
        Ok(self.context.slots_mut(n, &key)?.get_mut(kind))
    }

    /// Disjunct 0 of a slot, the whole value for single-value techniques.
    pub fn value(&self, n: usize, kind: SlotKind) -> AnalysisResult<V> {
        self.slot(n, kind)?
            .get(0)
            .cloned()
            .ok_or_else(|| AnalysisError::invariant(format!("empty {:?} slot at node {}", kind, n)))
    }

    pub fn set_value(&mut self, n: usize, kind: SlotKind, value: V) -> AnalysisResult<()> {
        self.slot_mut(n, kind)?.set_disjunct(0, value);
        Ok(())
    }

    pub fn thresholds(&self) -> &[V::Constraint] {
        &self.thresholds
    }

    pub fn uses_thresholds(&self) -> bool {
        self.use_thresholds
    }

    /// Builds node environments and fresh slots for this technique. The
    /// entry starts at top, everything else at bottom. `X_f` receives the
    /// invariants of the known-properties technique when it has run.
    pub fn initialize(&mut self) -> AnalysisResult<()> {
        let key = self.key;
        for n in 0..self.context.len() {
            let block = self.context.block(n)?;
            let vars = self.transfer.live_variables(block);
            let transfer = self.transfer;
            let node = self.context.node_mut(n)?;
            for v in vars {
                node.add_variable(v, transfer);
            }
            let bottom = DisjunctiveValue::new(self.manager.bottom(node.env()));
            node.init_slots(key, NodeSlots::filled(bottom));
        }
        if !self.context.is_empty() {
            let top = DisjunctiveValue::new(self.top(ENTRY)?);
            let slots = self.context.slots_mut(ENTRY, &key)?;
            slots.x_s = top.clone();
            slots.x_d = top.clone();
            slots.x_i = top;
        }

        if let Some(known) = self.options.known_properties.filter(|k| *k != key) {
            if self.context.has_technique(&known) {
                debug!("intersecting with the invariants of {}", known);
                for n in 0..self.context.len() {
                    let env = self.env(n)?;
                    let mut hull = self.context.slots(n, &known)?.x_s.hull();
                    hull.change_environment(&env);
                    self.context.slots_mut(n, &key)?.x_f = DisjunctiveValue::new(hull);
                }
            }
        }

        self.worklist.clear();
        self.is_computed = vec![false; self.context.len()];
        Ok(())
    }

    pub fn check_deadline(&mut self) -> AnalysisResult<()> {
        let checked = self.deadline.check();
        if checked.is_err() {
            self.unknown = true;
        }
        checked
    }

    pub fn mark_unknown(&mut self) {
        self.unknown = true;
    }

    pub fn push(&mut self, n: usize) {
        let scc = self.context.scc(n);
        self.worklist.push(n, scc);
    }

    /// Applies the transformation of the arena path `path` to `value`.
    pub fn transform(&mut self, path: &[usize], value: &mut V) -> AnalysisResult<()> {
        let blocks = path
            .iter()
            .map(|&n| self.context.block(n))
            .collect::<AnalysisResult<Vec<_>>>()?;
        self.transform_path(&Path::new(blocks), value)
    }

    pub fn transform_path(&mut self, path: &Path<G::NodeId>, value: &mut V) -> AnalysisResult<()> {
        trace!("before {}: {}", path, value);
        compute_transform(self.transfer, path, value, Some(&mut self.thresholds));
        trace!("after {}: {}", path, value);
        self.check_deadline()
    }

    /// `previous ∇ next`, with thresholds when they are enabled or seeds
    /// were found.
    pub fn widen(&mut self, previous: &V, next: &V) -> AnalysisResult<V> {
        let mut widened = previous.clone();
        if self.use_thresholds {
            widened.widen_with_thresholds(next, &self.thresholds);
        } else {
            widened.widen_with(next);
        }
        self.stats.widenings += 1;
        debug!("widening gives {}", widened);
        self.check_deadline()?;
        Ok(widened)
    }

    /// `previous ∇ next` with the collected thresholds, whatever the
    /// policy.
    pub fn widen_with_thresholds(&mut self, previous: &V, next: &V) -> AnalysisResult<V> {
        let mut widened = previous.clone();
        widened.widen_with_thresholds(next, &self.thresholds);
        self.stats.widenings += 1;
        self.check_deadline()?;
        Ok(widened)
    }

    /// Meets `value` with the known property of `n`, if there is one.
    pub fn meet_known(&self, n: usize, value: &mut V) -> AnalysisResult<()> {
        if let Some(known) = self.slot(n, SlotKind::Known)?.get(0) {
            if !known.is_bottom() {
                value.meet_with(known);
            }
        }
        Ok(())
    }

    /// Pops nodes until the worklist is empty, computing each one that is
    /// not marked computed. The entry is pushed first when `seed_entry`.
    pub fn ascending_iter<S>(&mut self, strategy: &mut S, seed_entry: bool) -> AnalysisResult<()>
    where
        S: PathSelectionStrategy<G, V> + ?Sized,
    {
        if seed_entry {
            self.push(ENTRY);
        }
        while let Some(n) = self.worklist.pop() {
            if !self.is_computed[n] {
                strategy.compute_node(self, n)?;
            }
        }
        Ok(())
    }

    /// One descending pass: `X_d` is reset to bottom except at the entry,
    /// which keeps `X_s`, then every node is narrowed from the entry on.
    pub fn narrowing_iter<S>(&mut self, strategy: &mut S) -> AnalysisResult<()>
    where
        S: PathSelectionStrategy<G, V> + ?Sized,
    {
        self.is_computed.fill(false);
        self.worklist.clear();
        for n in 0..self.context.len() {
            let reset = if n == ENTRY {
                self.slot(n, SlotKind::Stable)?.clone()
            } else {
                DisjunctiveValue::new(self.bottom(n)?)
            };
            *self.slot_mut(n, SlotKind::Descending)? = reset;
        }
        self.push(ENTRY);
        while let Some(n) = self.worklist.pop() {
            if !self.is_computed[n] {
                strategy.narrow_node(self, n)?;
            }
        }
        Ok(())
    }

    /// A narrowing pass followed by at most `rounds + 1` more while
    /// copying `X_d` into `X_s` still changes something.
    pub fn narrowing_rounds<S>(&mut self, strategy: &mut S, rounds: usize) -> AnalysisResult<()>
    where
        S: PathSelectionStrategy<G, V> + ?Sized,
    {
        self.narrowing_iter(strategy)?;
        let mut step = 0;
        while self.copy_xd_to_xs()? && step <= rounds {
            self.narrowing_iter(strategy)?;
            self.check_deadline()?;
            step += 1;
        }
        Ok(())
    }

    /// Replaces `X_s` by `X_d` wherever they differ. Returns whether any
    /// node changed.
    ///
    /// For single values `X_d` is first met with `X_s`, so the stable
    /// value never grows; under lookahead widening the pilot follows the
    /// narrowed main value. Unions are replaced as a whole.
    pub fn copy_xd_to_xs(&mut self) -> AnalysisResult<bool> {
        let disjunctive = self.key.technique == Technique::PathFocusingDisjunctive;
        let mirror_pilot = self.key.technique == Technique::LookaheadWidening;
        let mut changed = false;
        for n in 0..self.context.len() {
            let slots = self.context.slots_mut(n, &self.key)?;
            if disjunctive {
                if !slots.x_s.same_as(&slots.x_d) {
                    slots.x_s = slots.x_d.clone();
                    changed = true;
                }
                continue;
            }
            let (stable, descending) = match (slots.x_s.get(0), slots.x_d.get(0)) {
                (Some(s), Some(d)) => (s.clone(), d.clone()),
                _ => continue,
            };
            let mut narrowed = descending;
            if !narrowed.leq(&stable) {
                narrowed.meet_with(&stable);
            }
            if !stable.leq(&narrowed) {
                if mirror_pilot {
                    slots.x_s.set_disjunct(1, narrowed.clone());
                }
                slots.x_s.set_disjunct(0, narrowed);
                changed = true;
            }
        }
        debug!("copy X_d to X_s: {}", if changed { "changed" } else { "stable" });
        Ok(changed)
    }

    pub fn copy_xs_to_xf(&mut self) -> AnalysisResult<()> {
        for n in 0..self.context.len() {
            let slots = self.context.slots_mut(n, &self.key)?;
            slots.x_f = slots.x_s.clone();
        }
        Ok(())
    }

    pub fn copy_xf_to_xs(&mut self) -> AnalysisResult<()> {
        for n in 0..self.context.len() {
            let slots = self.context.slots_mut(n, &self.key)?;
            slots.x_s = slots.x_f.clone();
        }
        Ok(())
    }

    /// Looks for widening seeds: constraints of a widening point's
    /// initial value `X_i` that its stable value no longer implies.
    ///
    /// `X_d` is reset to bottom except at the entry; each widening point
    /// with seeds gets its `X_i` in `X_d` and the seeds join the
    /// thresholds, which are then used by every later widening. Returns
    /// whether a seed was found.
    pub fn compute_widening_seed(&mut self) -> AnalysisResult<bool> {
        for n in (0..self.context.len()).filter(|&n| n != ENTRY) {
            let bottom = DisjunctiveValue::new(self.bottom(n)?);
            *self.slot_mut(n, SlotKind::Descending)? = bottom;
        }
        let mut found = false;
        let widening_points: Vec<usize> = self.context.reduction().pw_nodes().collect();
        for n in widening_points {
            let initial = self.value(n, SlotKind::Initial)?;
            if initial.is_bottom() {
                continue;
            }
            let stable = self.value(n, SlotKind::Stable)?;
            let seeds: Vec<V::Constraint> = initial
                .to_constraints()
                .into_iter()
                .filter(|c| !stable.satisfies(c))
                .collect();
            if seeds.is_empty() {
                continue;
            }
            debug!(
                "node {}: seeds {}",
                n,
                itertools::join(seeds.iter(), ", ")
            );
            found = true;
            self.set_value(n, SlotKind::Descending, initial)?;
            for c in seeds {
                if !self.thresholds.contains(&c) {
                    self.thresholds.push(c);
                }
            }
        }
        if found {
            self.use_thresholds = true;
        }
        Ok(found)
    }

    /// Asks the oracle for a path leaving `n`.
    ///
    /// Returns the path as arena indices together with the start
    /// disjunct, or `None` when every feasible path is already covered.
    /// The answer is checked against the graph: it must start at `n` and
    /// follow CFG edges.
    pub fn query(
        &mut self,
        n: usize,
        descending: bool,
        filter: PathFilter<'_, G::NodeId>,
    ) -> AnalysisResult<Option<(Path<G::NodeId>, usize)>> {
        let start = self.context.block(n)?;
        let query = PathQuery {
            start,
            descending,
            filter,
        };
        self.oracle.push();
        let answer = {
            let view = self.context.view(self.key);
            self.oracle.query(&query, &view)
        };
        self.oracle.pop()?;
        let answer = answer?;
        self.stats.oracle_queries += 1;
        self.check_deadline()?;

        match answer {
            OracleAnswer::Unsat => Ok(None),
            OracleAnswer::Unknown => {
                self.unknown = true;
                Err(AnalysisError::OracleUnknown)
            }
            OracleAnswer::Sat { path, disjunct } => {
                if path.source() != Some(start) {
                    return Err(AnalysisError::invariant(format!(
                        "oracle path {} does not start at {:?}",
                        path, start
                    )));
                }
                if let Some((from, to)) = path.steps().find(|&(a, b)| !self.graph.has_edge(a, b)) {
                    return Err(AnalysisError::invariant(format!(
                        "oracle path {} takes {:?} -> {:?}, which is not an edge",
                        path, from, to
                    )));
                }
                if path.nodes().iter().any(|b| self.context.index_of(*b).is_none()) {
                    return Err(AnalysisError::invariant(format!(
                        "oracle path {} leaves the analyzed function",
                        path
                    )));
                }
                Ok(Some((path, disjunct)))
            }
        }
    }

    /// Arena index of `block`.
    pub fn index_of(&self, block: G::NodeId) -> AnalysisResult<usize> {
        self.context
            .index_of(block)
            .ok_or_else(|| AnalysisError::invariant(format!("block {:?} is not in the arena", block)))
    }

    /// Arena index of the last block of `path`.
    pub fn destination_of(&self, path: &Path<G::NodeId>) -> AnalysisResult<usize> {
        let last = path
            .destination()
            .ok_or_else(|| AnalysisError::invariant("empty oracle path"))?;
        self.index_of(last)
    }

    /// Runs `strategy` on this engine's function.
    pub fn run<S>(&mut self, strategy: &mut S) -> AnalysisResult<()>
    where
        S: PathSelectionStrategy<G, V> + ?Sized,
    {
        self.initialize()?;
        strategy.compute_function(self)
    }
}
