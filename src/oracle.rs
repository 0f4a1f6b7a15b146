/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;
use std::hash::Hash;

use log::debug;
use log::trace;

use crate::error::AnalysisError;
use crate::error::AnalysisResult;
use crate::fixpoint_iter::compute_transform;
use crate::fixpoint_iter::TransferFunction;
use crate::graph::ControlFlowGraph;
use crate::node::SlotKind;
use crate::path::Path;
use crate::path::PathFilter;
use crate::value::AbstractValue;
use crate::value::Environment;

/// "Is there a feasible path from `start` to another reduction point
/// whose image is not yet covered by the destination's invariant?"
///
/// Ascending queries compare against `X_s`, descending ones against
/// `X_d`. The source is always the `X_s` of `start`.
#[derive(Clone, Copy, Debug)]
pub struct PathQuery<'a, N: Clone + Hash + Eq> {
    pub start: N,
    pub descending: bool,
    pub filter: PathFilter<'a, N>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OracleAnswer<N> {
    Unsat,
    /// A witness path from the queried node, and the disjunct of the
    /// start node's value it departs from.
    Sat { path: Path<N>, disjunct: usize },
    Unknown,
}

/// Read-only access to the invariants of one analysis run, the way an
/// oracle needs them to build its query.
pub trait StateView<N, V: AbstractValue> {
    fn disjunct_count(&self, node: N, slot: SlotKind) -> usize;

    fn disjunct(&self, node: N, slot: SlotKind, index: usize) -> Option<&V>;

    fn is_reduction_point(&self, node: N) -> bool;

    fn environment(&self, node: N) -> Option<&Environment>;
}

/// Decides feasibility of paths between reduction points.
///
/// Queries are bracketed by `push` and `pop`, which must nest strictly.
pub trait PathOracle<N: Clone + Hash + Eq, V: AbstractValue> {
    fn push(&mut self);

    fn pop(&mut self) -> AnalysisResult<()>;

    fn query(
        &mut self,
        query: &PathQuery<'_, N>,
        state: &dyn StateView<N, V>,
    ) -> AnalysisResult<OracleAnswer<N>>;
}

/// An oracle without a solver: it enumerates the paths between
/// reduction points explicitly and decides feasibility and novelty in
/// the abstract domain itself.
///
/// A path is returned when the image of some live disjunct of the
/// start value, met with the destination's known properties, is not
/// below any disjunct of the destination's target slot. Since every
/// cycle goes through a widening point, the enumeration is finite.
pub struct AbstractPathOracle<'g, G: ControlFlowGraph, V: AbstractValue> {
    graph: &'g G,
    transfer: &'g dyn TransferFunction<G, V>,
    paths: HashMap<G::NodeId, Vec<Path<G::NodeId>>>,
    depth: usize,
}

impl<'g, G, V> AbstractPathOracle<'g, G, V>
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    pub fn new(graph: &'g G, transfer: &'g dyn TransferFunction<G, V>) -> Self {
        Self {
            graph,
            transfer,
            paths: HashMap::new(),
            depth: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn enumerate(
        graph: &G,
        start: G::NodeId,
        state: &dyn StateView<G::NodeId, V>,
    ) -> Vec<Path<G::NodeId>> {
        let mut found = Vec::new();
        // (path so far, index of the next successor of its last node)
        let mut stack: Vec<(Vec<G::NodeId>, usize)> = vec![(vec![start], 0)];
        while let Some((nodes, pos)) = stack.pop() {
            let last = nodes[nodes.len() - 1];
            let succs = graph.successors(last);
            if pos >= succs.len() {
                continue;
            }
            let next = succs[pos];
            stack.push((nodes.clone(), pos + 1));
            let mut extended = nodes;
            extended.push(next);
            if state.is_reduction_point(next) {
                found.push(Path::new(extended));
            } else if !extended[..extended.len() - 1].contains(&next) {
                stack.push((extended, 0));
            }
        }
        found
    }

    /// The known property of `node`, if it is a single live value.
    fn known_property<'s>(state: &'s dyn StateView<G::NodeId, V>, node: G::NodeId) -> Option<&'s V> {
        let mut live = (0..state.disjunct_count(node, SlotKind::Known))
            .filter_map(|i| state.disjunct(node, SlotKind::Known, i))
            .filter(|d| !d.is_bottom());
        match (live.next(), live.next()) {
            (Some(one), None) => Some(one),
            _ => None,
        }
    }
}

impl<'g, G, V> PathOracle<G::NodeId, V> for AbstractPathOracle<'g, G, V>
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    fn push(&mut self) {
        self.depth += 1;
    }

    fn pop(&mut self) -> AnalysisResult<()> {
        if self.depth == 0 {
            return Err(AnalysisError::invariant("oracle context popped more than pushed"));
        }
        self.depth -= 1;
        Ok(())
    }

    fn query(
        &mut self,
        query: &PathQuery<'_, G::NodeId>,
        state: &dyn StateView<G::NodeId, V>,
    ) -> AnalysisResult<OracleAnswer<G::NodeId>> {
        let target = if query.descending {
            SlotKind::Descending
        } else {
            SlotKind::Stable
        };
        let graph = self.graph;
        let paths = self
            .paths
            .entry(query.start)
            .or_insert_with(|| Self::enumerate(graph, query.start, state));

        for index in 0..state.disjunct_count(query.start, SlotKind::Stable) {
            let source = match state.disjunct(query.start, SlotKind::Stable, index) {
                Some(source) if !source.is_bottom() => source,
                _ => continue,
            };
            for path in paths.iter().filter(|p| query.filter.admits(p)) {
                let dest = match path.destination() {
                    Some(dest) => dest,
                    None => continue,
                };
                let mut image = source.clone();
                compute_transform(self.transfer, path, &mut image, None);
                if let Some(env) = state.environment(dest) {
                    image.change_environment(env);
                }
                if image.is_bottom() {
                    continue;
                }
                if let Some(known) = Self::known_property(state, dest) {
                    image.meet_with(known);
                    if image.is_bottom() {
                        continue;
                    }
                }
                let covered = (0..state.disjunct_count(dest, target))
                    .filter_map(|i| state.disjunct(dest, target, i))
                    .any(|d| image.leq(d));
                if !covered {
                    debug!("oracle: sat along {} from disjunct {}", path, index);
                    trace!("image {}", image);
                    return Ok(OracleAnswer::Sat {
                        path: path.clone(),
                        disjunct: index,
                    });
                }
            }
        }
        debug!("oracle: unsat from {:?}", query.start);
        Ok(OracleAnswer::Unsat)
    }
}
