/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::hash::Hash;

use log::debug;

use super::loop_iteration;
use super::PathSelectionStrategy;
use crate::error::AnalysisResult;
use crate::fixpoint_iter::FixpointEngine;
use crate::graph::ControlFlowGraph;
use crate::node::SlotKind;
use crate::node::Technique;
use crate::path::Path;
use crate::path::PathFilter;
use crate::path::PathSet;
use crate::value::AbstractValue;

/// Path focusing: invariants live only at reduction points, and the
/// oracle hands out one feasible, not yet covered path between two of
/// them at a time.
#[derive(Debug)]
pub struct PathFocusingStrategy<N: Clone + Hash + Eq> {
    /// Self-loop paths sighted once during the current node computation.
    seen: PathSet<N>,
}

impl<N: Clone + Hash + Eq> Default for PathFocusingStrategy<N> {
    fn default() -> Self {
        Self {
            seen: PathSet::new(),
        }
    }
}

impl<N: Clone + Hash + Eq> PathFocusingStrategy<N> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Reduction points that can start a path: they have a reduction-point
/// successor and are not error sites.
pub(super) fn starts_paths<G, V>(engine: &FixpointEngine<'_, G, V>, n: usize) -> bool
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    let reduction = engine.context().reduction();
    reduction.in_pr(n) && !reduction.is_error_site(n) && !reduction.pr_successors(n).is_empty()
}

impl<G, V> PathSelectionStrategy<G, V> for PathFocusingStrategy<G::NodeId>
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    fn technique(&self) -> Technique {
        Technique::PathFocusing
    }

    fn compute_function(&mut self, engine: &mut FixpointEngine<'_, G, V>) -> AnalysisResult<()> {
        let rounds = engine.options().narrowing_rounds_for(Technique::PathFocusing);
        engine.ascending_iter(self, true)?;
        engine.narrowing_rounds(self, rounds)
    }

    fn compute_node(&mut self, engine: &mut FixpointEngine<'_, G, V>, n: usize) -> AnalysisResult<()> {
        if !starts_paths(engine, n) {
            engine.is_computed[n] = true;
            return Ok(());
        }
        debug!("computing node {}", n);
        self.seen.clear(false);
        let mut only_join = false;
        loop {
            engine.is_computed[n] = true;
            let path = match engine.query(n, false, PathFilter::Any)? {
                Some((path, _)) if path.len() > 1 => path,
                _ => return Ok(()),
            };
            let succ = engine.destination_of(&path)?;
            propagate(engine, n, succ, &path, &mut only_join, &mut self.seen)?;
        }
    }

    fn narrow_node(&mut self, engine: &mut FixpointEngine<'_, G, V>, n: usize) -> AnalysisResult<()> {
        if !starts_paths(engine, n) {
            engine.is_computed[n] = true;
            return Ok(());
        }
        loop {
            engine.is_computed[n] = true;
            let path = match engine.query(n, true, PathFilter::Any)? {
                Some((path, _)) if path.len() > 1 => path,
                _ => return Ok(()),
            };
            let succ = engine.destination_of(&path)?;
            engine.stats_mut().descending_steps += 1;

            let mut image = engine.value(n, SlotKind::Stable)?;
            engine.transform_path(&path, &mut image)?;
            image.change_environment(&engine.env(succ)?);
            self.intersect_with_known_properties(engine, succ, &mut image)?;
            super::classic::join_descending(engine, succ, image)?;
            engine.push(succ);
            engine.is_computed[succ] = false;
        }
    }

    fn intersect_with_known_properties(
        &self,
        engine: &FixpointEngine<'_, G, V>,
        n: usize,
        value: &mut V,
    ) -> AnalysisResult<()> {
        engine.meet_known(n, value)
    }

    fn precision_degraded(&self) -> bool {
        false
    }
}

/// Propagates `X_s(n)` along `path` into its destination `succ`.
fn propagate<G, V>(
    engine: &mut FixpointEngine<'_, G, V>,
    n: usize,
    succ: usize,
    path: &Path<G::NodeId>,
    only_join: &mut bool,
    seen: &mut PathSet<G::NodeId>,
) -> AnalysisResult<()>
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    engine.stats_mut().ascending_steps += 1;
    let env = engine.env(succ)?;
    let mut image = engine.value(n, SlotKind::Stable)?;
    engine.transform_path(path, &mut image)?;
    image.change_environment(&env);
    if succ == n {
        loop_iteration(engine, n, 0, 0, path, &mut image, only_join, seen)?;
    }

    let previous = engine.value(succ, SlotKind::Stable)?;
    let mut joined = previous.clone();
    joined.join_array(&env, vec![image]);
    let mut next = if engine.in_pw(succ) && (succ != n || !*only_join) {
        engine.widen(&previous, &joined)?
    } else {
        joined
    };
    if previous.is_bottom() {
        engine.set_value(succ, SlotKind::Initial, next.clone())?;
    }
    engine.meet_known(succ, &mut next)?;
    engine.set_value(succ, SlotKind::Stable, next)?;
    engine.push(succ);
    engine.is_computed[succ] = false;
    Ok(())
}
