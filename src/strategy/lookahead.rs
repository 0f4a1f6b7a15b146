/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use log::debug;

use super::disjunct;
use super::seeded_round;
use super::PathSelectionStrategy;
use crate::error::AnalysisResult;
use crate::fixpoint_iter::FixpointEngine;
use crate::fixpoint_iter::ENTRY;
use crate::graph::ControlFlowGraph;
use crate::node::NarrowingPolicy;
use crate::node::SlotKind;
use crate::node::Technique;
use crate::value::AbstractValue;

const MAIN: usize = 0;
const PILOT: usize = 1;

/// Lookahead widening: every slot carries a main value (disjunct 0) and
/// a pilot (disjunct 1).
///
/// Only edges the main value can take are followed. The pilot is widened
/// at widening points while the main value accumulates by join; once the
/// pilot stops growing it is promoted to main. Branches that the main
/// value has not reached yet thus cannot pollute the widening of a loop.
#[derive(Debug, Default)]
pub struct LookaheadStrategy;

impl LookaheadStrategy {
    pub fn new() -> Self {
        Self
    }
}

fn component<G, V>(engine: &FixpointEngine<'_, G, V>, n: usize, index: usize) -> AnalysisResult<V>
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    disjunct(engine, n, SlotKind::Stable, index)
}

impl<G, V> PathSelectionStrategy<G, V> for LookaheadStrategy
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    fn technique(&self) -> Technique {
        Technique::LookaheadWidening
    }

    fn compute_function(&mut self, engine: &mut FixpointEngine<'_, G, V>) -> AnalysisResult<()> {
        let top = engine.top(ENTRY)?;
        engine
            .slot_mut(ENTRY, SlotKind::Stable)?
            .set_disjunct(PILOT, top);

        let rounds = engine.options().narrowing_rounds_for(Technique::LookaheadWidening);
        engine.ascending_iter(self, true)?;
        engine.narrowing_rounds(self, rounds)?;
        if engine.key().narrowing == NarrowingPolicy::Seeded {
            seeded_round(engine, self, rounds)?;
        }
        Ok(())
    }

    fn compute_node(&mut self, engine: &mut FixpointEngine<'_, G, V>, n: usize) -> AnalysisResult<()> {
        engine.is_computed[n] = true;
        let main = component(engine, n, MAIN)?;
        if main.is_bottom() {
            return Ok(());
        }
        let pilot = component(engine, n, PILOT)?;
        debug!("computing node {}", n);

        for succ in engine.successors(n) {
            engine.stats_mut().ascending_steps += 1;
            let env = engine.env(succ)?;
            let mut main_image = main.clone();
            engine.transform(&[n, succ], &mut main_image)?;
            main_image.change_environment(&env);
            if main_image.is_bottom() {
                continue;
            }
            let mut pilot_image = pilot.clone();
            engine.transform(&[n, succ], &mut pilot_image)?;
            pilot_image.change_environment(&env);

            let old_main = component(engine, succ, MAIN)?;
            let old_pilot = component(engine, succ, PILOT)?;
            let (mut next_main, mut next_pilot) = if engine.in_pw(succ) {
                if !old_pilot.is_bottom() && pilot_image.leq(&old_pilot) {
                    debug!("pilot stable at node {}, promoted", succ);
                    (old_pilot.clone(), old_pilot.clone())
                } else {
                    let mut joined = old_main.clone();
                    joined.join_with(&main_image);
                    let widened = engine.widen(&old_pilot, &pilot_image)?;
                    (joined, widened)
                }
            } else {
                let mut joined_main = old_main.clone();
                joined_main.join_with(&main_image);
                let mut joined_pilot = old_pilot.clone();
                joined_pilot.join_with(&pilot_image);
                (joined_main, joined_pilot)
            };
            self.intersect_with_known_properties(engine, succ, &mut next_main)?;
            self.intersect_with_known_properties(engine, succ, &mut next_pilot)?;

            if !next_main.leq(&old_main) || !next_pilot.leq(&old_pilot) {
                if old_main.is_bottom() {
                    engine.set_value(succ, SlotKind::Initial, next_main.clone())?;
                }
                let slot = engine.slot_mut(succ, SlotKind::Stable)?;
                slot.set_disjunct(MAIN, next_main);
                slot.set_disjunct(PILOT, next_pilot);
                engine.push(succ);
                engine.is_computed[succ] = false;
            }
        }
        Ok(())
    }

    fn narrow_node(&mut self, engine: &mut FixpointEngine<'_, G, V>, n: usize) -> AnalysisResult<()> {
        engine.is_computed[n] = true;
        let main = component(engine, n, MAIN)?;
        for succ in engine.successors(n) {
            engine.stats_mut().descending_steps += 1;
            let mut image = main.clone();
            engine.transform(&[n, succ], &mut image)?;
            image.change_environment(&engine.env(succ)?);
            super::classic::join_descending(engine, succ, image)?;
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
