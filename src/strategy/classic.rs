/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use log::debug;

use super::seeded_round;
use super::PathSelectionStrategy;
use crate::error::AnalysisResult;
use crate::fixpoint_iter::FixpointEngine;
use crate::graph::ControlFlowGraph;
use crate::node::NarrowingPolicy;
use crate::node::SlotKind;
use crate::node::Technique;
use crate::value::AbstractValue;

/// Chaotic iteration over CFG edges: join into every successor, widen at
/// widening points.
#[derive(Debug, Default)]
pub struct ClassicStrategy;

impl ClassicStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl<G, V> PathSelectionStrategy<G, V> for ClassicStrategy
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    fn technique(&self) -> Technique {
        Technique::Classic
    }

    fn compute_function(&mut self, engine: &mut FixpointEngine<'_, G, V>) -> AnalysisResult<()> {
        let rounds = engine.options().narrowing_rounds_for(Technique::Classic);
        engine.ascending_iter(self, true)?;
        engine.narrowing_rounds(self, rounds)?;
        if engine.key().narrowing == NarrowingPolicy::Seeded {
            seeded_round(engine, self, rounds)?;
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
                engine.is_computed[succ] = false;
            }
        }
        Ok(())
    }

    fn narrow_node(&mut self, engine: &mut FixpointEngine<'_, G, V>, n: usize) -> AnalysisResult<()> {
        engine.is_computed[n] = true;
        let start = engine.value(n, SlotKind::Stable)?;
        for succ in engine.successors(n) {
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

/// `X_d(n) := X_d(n) ⊔ image`, disjunct 0.
pub(super) fn join_descending<G, V>(
    engine: &mut FixpointEngine<'_, G, V>,
    n: usize,
    image: V,
) -> AnalysisResult<()>
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    let mut descending = engine.value(n, SlotKind::Descending)?;
    if descending.is_bottom() {
        descending = image;
    } else {
        descending.join_with(&image);
    }
    engine.set_value(n, SlotKind::Descending, descending)
}
