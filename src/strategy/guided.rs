/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::BTreeSet;
use std::collections::HashMap;

use log::debug;

use super::classic::join_descending;
use super::PathSelectionStrategy;
use crate::error::AnalysisResult;
use crate::fixpoint_iter::FixpointEngine;
use crate::fixpoint_iter::Worklist;
use crate::fixpoint_iter::ENTRY;
use crate::graph::ControlFlowGraph;
use crate::node::SlotKind;
use crate::node::Technique;
use crate::value::AbstractValue;

/// Guided static analysis: the iteration is restricted to the edges
/// found feasible so far.
///
/// Each round first discovers new feasible edges from the nodes that
/// changed (joining without widening), then runs an ordinary ascending
/// and descending phase over the feasible edges only. The analysis ends
/// when a round discovers nothing new.
#[derive(Debug, Default)]
pub struct GuidedStrategy {
    feasible: HashMap<usize, BTreeSet<usize>>,
    changed: Worklist,
}

impl GuidedStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_feasible(&self, from: usize, to: usize) -> bool {
        self.feasible.get(&from).map_or(false, |s| s.contains(&to))
    }

    fn mark_changed<G, V>(&mut self, engine: &FixpointEngine<'_, G, V>, n: usize)
    where
        G: ControlFlowGraph,
        V: AbstractValue,
    {
        self.changed.push(n, engine.context().scc(n));
    }

    fn compute_new_paths<G, V>(&mut self, engine: &mut FixpointEngine<'_, G, V>, n: usize) -> AnalysisResult<()>
    where
        G: ControlFlowGraph,
        V: AbstractValue,
    {
        if engine.is_computed[n] {
            return Ok(());
        }
        engine.is_computed[n] = true;
        let start = engine.value(n, SlotKind::Stable)?;
        if start.is_bottom() {
            return Ok(());
        }
        for succ in engine.successors(n) {
            if self.is_feasible(n, succ) {
                continue;
            }
            engine.stats_mut().ascending_steps += 1;
            let mut image = start.clone();
            engine.transform(&[n, succ], &mut image)?;
            image.change_environment(&engine.env(succ)?);

            if image.is_bottom() {
                continue;
            }
            debug!("edge {} -> {} is feasible", n, succ);
            self.feasible.entry(n).or_default().insert(succ);
            engine.push(n);

            let previous = engine.value(succ, SlotKind::Stable)?;
            let mut next = image;
            next.join_with(&previous);
            if !next.leq(&previous) {
                if previous.is_bottom() {
                    engine.set_value(succ, SlotKind::Initial, next.clone())?;
                }
                engine.set_value(succ, SlotKind::Stable, next)?;
                self.mark_changed(engine, succ);
                engine.push(succ);
                engine.is_computed[succ] = false;
            }
        }
        Ok(())
    }
}

impl<G, V> PathSelectionStrategy<G, V> for GuidedStrategy
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    fn technique(&self) -> Technique {
        Technique::Guided
    }

    fn compute_function(&mut self, engine: &mut FixpointEngine<'_, G, V>) -> AnalysisResult<()> {
        let rounds = engine.options().narrowing_rounds_for(Technique::Guided);
        self.feasible.clear();
        self.changed.clear();
        self.mark_changed(engine, ENTRY);

        while !self.changed.is_empty() {
            engine.stats_mut().rounds += 1;
            engine.is_computed.fill(false);
            while let Some(n) = self.changed.pop() {
                self.compute_new_paths(engine, n)?;
            }

            engine.is_computed.fill(false);
            engine.ascending_iter(self, false)?;
            engine.narrowing_rounds(self, rounds)?;
            engine.check_deadline()?;
        }
        Ok(())
    }

    fn compute_node(&mut self, engine: &mut FixpointEngine<'_, G, V>, n: usize) -> AnalysisResult<()> {
        engine.is_computed[n] = true;
        let start = engine.value(n, SlotKind::Stable)?;
        if start.is_bottom() {
            return Ok(());
        }
        debug!("computing node {}", n);

        for succ in engine.successors(n) {
            if !self.is_feasible(n, succ) {
                continue;
            }
            engine.stats_mut().ascending_steps += 1;
            let mut image = start.clone();
            engine.transform(&[n, succ], &mut image)?;
            image.change_environment(&engine.env(succ)?);

            let previous = engine.value(succ, SlotKind::Stable)?;
            let mut next = if engine.in_pw(succ) {
                engine.widen(&previous, &image)?
            } else {
                let mut joined = image;
                joined.join_with(&previous);
                joined
            };
            self.intersect_with_known_properties(engine, succ, &mut next)?;

            if !next.leq(&previous) {
                if previous.is_bottom() {
                    engine.set_value(succ, SlotKind::Initial, next.clone())?;
                }
                engine.set_value(succ, SlotKind::Stable, next)?;
                engine.push(succ);
                self.mark_changed(engine, succ);
                engine.is_computed[succ] = false;
            }
        }
        Ok(())
    }

    fn narrow_node(&mut self, engine: &mut FixpointEngine<'_, G, V>, n: usize) -> AnalysisResult<()> {
        engine.is_computed[n] = true;
        let start = engine.value(n, SlotKind::Stable)?;
        for succ in engine.successors(n) {
            if !self.is_feasible(n, succ) {
                continue;
            }
            engine.stats_mut().descending_steps += 1;
            let mut image = start.clone();
            engine.transform(&[n, succ], &mut image)?;
            image.change_environment(&engine.env(succ)?);
            join_descending(engine, succ, image)?;
            engine.push(succ);
        }
        Ok(())
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
