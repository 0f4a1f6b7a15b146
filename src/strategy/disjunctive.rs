/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use log::debug;

use super::disjunct;
use super::loop_iteration;
use super::path_focusing::starts_paths;
use super::PathSelectionStrategy;
use crate::error::AnalysisResult;
use crate::fixpoint_iter::FixpointEngine;
use crate::fixpoint_iter::Worklist;
use crate::fixpoint_iter::ENTRY;
use crate::graph::ControlFlowGraph;
use crate::node::SlotKind;
use crate::node::Technique;
use crate::path::PathFilter;
use crate::path::PathSet;
use crate::sigma::Sigma;
use crate::value::AbstractValue;

/// Disjunctive path focusing.
///
/// Invariants at reduction points are unions of at most `max_disjuncts`
/// values. A path leaving disjunct `i` of its source is merged into the
/// disjunct of its destination picked by [`Sigma`].
///
/// The analysis runs in rounds. A round first discovers, from the nodes
/// that changed, the paths whose image is not covered yet and records
/// them in the node's path tree; the ascending and descending phases
/// that follow only ever take recorded paths. The analysis ends when no
/// node changed during a round.
#[derive(Debug)]
pub struct DisjunctiveStrategy<N: Copy + Hash + Eq> {
    pathtree: HashMap<usize, PathSet<N>>,
    /// Nodes whose invariant changed in the current round.
    a_prime: Worklist,
    sigma: Sigma<N>,
    /// Self-loop paths sighted once, per start disjunct.
    seen: HashMap<usize, PathSet<N>>,
}

impl<N: Copy + Hash + Eq + Debug> DisjunctiveStrategy<N> {
    pub fn new(max_disjuncts: usize) -> Self {
        Self {
            pathtree: HashMap::new(),
            a_prime: Worklist::new(),
            sigma: Sigma::new(max_disjuncts),
            seen: HashMap::new(),
        }
    }

    fn mark_changed<G, V>(&mut self, engine: &FixpointEngine<'_, G, V>, n: usize)
    where
        G: ControlFlowGraph<NodeId = N>,
        V: AbstractValue,
    {
        self.a_prime.push(n, engine.context().scc(n));
    }

    /// Records in the path tree of `n` every path whose image is not
    /// covered by the current invariant of its destination. `X_d` of the
    /// successors serves as scratch space.
    fn compute_new_paths<G, V>(&mut self, engine: &mut FixpointEngine<'_, G, V>, n: usize) -> AnalysisResult<()>
    where
        G: ControlFlowGraph<NodeId = N>,
        V: AbstractValue,
    {
        if !starts_paths(engine, n) {
            return Ok(());
        }
        for s in engine.pr_successors(n) {
            let stable = engine.slot(s, SlotKind::Stable)?.clone();
            *engine.slot_mut(s, SlotKind::Descending)? = stable;
        }
        loop {
            let (path, index) = match engine.query(n, true, PathFilter::Any)? {
                Some((path, index)) if path.len() > 1 => (path, index),
                _ => return Ok(()),
            };
            let succ = engine.destination_of(&path)?;
            let env = engine.env(succ)?;
            let mut image = disjunct(engine, n, SlotKind::Stable, index)?;
            engine.transform_path(&path, &mut image)?;
            image.change_environment(&env);

            let target = engine.slot(succ, SlotKind::Descending)?.clone();
            let chosen = self.sigma.assign(&path, index, &image, &target);
            debug!("new path {} into disjunct {}", path, chosen);
            engine
                .slot_mut(succ, SlotKind::Descending)?
                .join_array(&env, vec![image], chosen);
            self.pathtree.entry(n).or_default().insert(path, true);
            engine.push(n);
        }
    }
}

impl<G, V> PathSelectionStrategy<G, V> for DisjunctiveStrategy<G::NodeId>
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    fn technique(&self) -> Technique {
        Technique::PathFocusingDisjunctive
    }

    fn compute_function(&mut self, engine: &mut FixpointEngine<'_, G, V>) -> AnalysisResult<()> {
        let rounds = engine
            .options()
            .narrowing_rounds_for(Technique::PathFocusingDisjunctive);
        self.pathtree = (0..engine.node_count()).map(|n| (n, PathSet::new())).collect();
        self.a_prime.clear();
        self.sigma.clear();
        self.mark_changed(engine, ENTRY);

        while !self.a_prime.is_empty() {
            engine.stats_mut().rounds += 1;
            for set in self.pathtree.values_mut() {
                set.clear(true);
            }
            engine.is_computed.fill(false);
            engine.worklist.clear();
            while let Some(n) = self.a_prime.pop() {
                self.compute_new_paths(engine, n)?;
            }
            for set in self.pathtree.values_mut() {
                set.merge();
            }

            engine.is_computed.fill(false);
            engine.ascending_iter(self, false)?;

            engine.narrowing_iter(self)?;
            let mut step = 0;
            while engine.copy_xd_to_xs()? && step < rounds {
                engine.narrowing_iter(self)?;
                step += 1;
            }
            engine.check_deadline()?;
        }
        Ok(())
    }

    fn compute_node(&mut self, engine: &mut FixpointEngine<'_, G, V>, n: usize) -> AnalysisResult<()> {
        engine.is_computed[n] = true;
        if !starts_paths(engine, n) {
            return Ok(());
        }
        debug!("computing node {}", n);
        self.seen.clear();

        loop {
            let found = match self.pathtree.get(&n) {
                Some(tree) => engine.query(n, false, PathFilter::Within(tree))?,
                None => None,
            };
            let (path, index) = match found {
                Some((path, index)) if path.len() > 1 => (path, index),
                _ => return Ok(()),
            };
            engine.stats_mut().ascending_steps += 1;
            let succ = engine.destination_of(&path)?;
            let env = engine.env(succ)?;
            let mut image = disjunct(engine, n, SlotKind::Stable, index)?;
            engine.transform_path(&path, &mut image)?;
            image.change_environment(&env);

            let target = engine.slot(succ, SlotKind::Stable)?.clone();
            let chosen = self.sigma.assign(&path, index, &image, &target);
            let seen = self.seen.entry(index).or_default();
            let mut only_join = !seen.exist(&path, false);
            if succ == n {
                loop_iteration(engine, n, index, chosen, &path, &mut image, &mut only_join, seen)?;
            }

            let previous = disjunct(engine, succ, SlotKind::Stable, chosen)?;
            let mut joined = previous.clone();
            joined.join_array(&env, vec![image]);
            let mut next = if engine.in_pw(succ) && (succ != n || !only_join) {
                engine.widen_with_thresholds(&previous, &joined)?
            } else {
                joined
            };
            self.intersect_with_known_properties(engine, succ, &mut next)?;
            if previous.is_bottom() {
                engine
                    .slot_mut(succ, SlotKind::Initial)?
                    .set_disjunct(chosen, next.clone());
            }
            engine
                .slot_mut(succ, SlotKind::Stable)?
                .set_disjunct(chosen, next);
            engine.push(succ);
            engine.is_computed[succ] = false;
            self.mark_changed(engine, succ);
        }
    }

    fn narrow_node(&mut self, engine: &mut FixpointEngine<'_, G, V>, n: usize) -> AnalysisResult<()> {
        engine.is_computed[n] = true;
        if !starts_paths(engine, n) {
            return Ok(());
        }
        loop {
            let found = match self.pathtree.get(&n) {
                Some(tree) => engine.query(n, true, PathFilter::Within(tree))?,
                None => None,
            };
            let (path, index) = match found {
                Some((path, index)) if path.len() > 1 => (path, index),
                _ => return Ok(()),
            };
            engine.stats_mut().descending_steps += 1;
            let succ = engine.destination_of(&path)?;
            let env = engine.env(succ)?;
            let mut image = disjunct(engine, n, SlotKind::Stable, index)?;
            engine.transform_path(&path, &mut image)?;
            image.change_environment(&env);

            let target = engine.slot(succ, SlotKind::Descending)?.clone();
            let chosen = self.sigma.assign(&path, index, &image, &target);
            self.intersect_with_known_properties(engine, succ, &mut image)?;
            let slot = engine.slot_mut(succ, SlotKind::Descending)?;
            if slot.is_bottom_at(chosen) {
                slot.set_disjunct(chosen, image);
            } else {
                slot.join_array(&env, vec![image], chosen);
            }
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
        self.sigma.is_degraded()
    }
}
