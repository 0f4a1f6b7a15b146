/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The path-selection strategies. Each one decides how the successors of
//! a computed node are reached and where widening applies; the shared
//! iteration skeleton lives in [`crate::fixpoint_iter::FixpointEngine`].

mod classic;
mod disjunctive;
mod guided;
mod lookahead;
mod path_focusing;

pub use classic::ClassicStrategy;
pub use disjunctive::DisjunctiveStrategy;
pub use guided::GuidedStrategy;
pub use lookahead::LookaheadStrategy;
pub use path_focusing::PathFocusingStrategy;

use log::debug;

use crate::error::AnalysisResult;
use crate::fixpoint_iter::FixpointEngine;
use crate::graph::ControlFlowGraph;
use crate::node::SlotKind;
use crate::node::Technique;
use crate::path::Path;
use crate::path::PathSet;
use crate::value::AbstractValue;

pub trait PathSelectionStrategy<G: ControlFlowGraph, V: AbstractValue> {
    fn technique(&self) -> Technique;

    /// The whole analysis of the engine's function, from initialized
    /// slots to final invariants.
    fn compute_function(&mut self, engine: &mut FixpointEngine<'_, G, V>) -> AnalysisResult<()>;

    /// One ascending step from node `n`: propagate into the successors
    /// and push those that changed.
    fn compute_node(&mut self, engine: &mut FixpointEngine<'_, G, V>, n: usize) -> AnalysisResult<()>;

    /// One descending step from node `n` into the `X_d` of its
    /// successors.
    fn narrow_node(&mut self, engine: &mut FixpointEngine<'_, G, V>, n: usize) -> AnalysisResult<()>;

    fn intersect_with_known_properties(
        &self,
        engine: &FixpointEngine<'_, G, V>,
        n: usize,
        value: &mut V,
    ) -> AnalysisResult<()>;

    /// Whether a contribution had to be merged into a disjunct it does not
    /// fit precisely.
    fn precision_degraded(&self) -> bool;
}

/// Runs the strategy of the engine's technique. Returns whether
/// precision was degraded.
pub fn run_technique<G, V>(engine: &mut FixpointEngine<'_, G, V>) -> AnalysisResult<bool>
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    match engine.technique() {
        Technique::Classic => run_with(engine, &mut ClassicStrategy::new()),
        Technique::LookaheadWidening => run_with(engine, &mut LookaheadStrategy::new()),
        Technique::Guided => run_with(engine, &mut GuidedStrategy::new()),
        Technique::PathFocusing => run_with(engine, &mut PathFocusingStrategy::<G::NodeId>::new()),
        Technique::PathFocusingDisjunctive => {
            let max = engine.options().max_disjuncts;
            run_with(engine, &mut DisjunctiveStrategy::<G::NodeId>::new(max))
        }
    }
}

fn run_with<G, V, S>(engine: &mut FixpointEngine<'_, G, V>, strategy: &mut S) -> AnalysisResult<bool>
where
    G: ControlFlowGraph,
    V: AbstractValue,
    S: PathSelectionStrategy<G, V>,
{
    engine.run(strategy)?;
    Ok(strategy.precision_degraded())
}

/// Disjunct `index` of a slot of `n`; bottom when the union is shorter.
pub(crate) fn disjunct<G, V>(
    engine: &FixpointEngine<'_, G, V>,
    n: usize,
    kind: SlotKind,
    index: usize,
) -> AnalysisResult<V>
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    match engine.slot(n, kind)?.get(index) {
        Some(v) => Ok(v.clone()),
        None => engine.bottom(n),
    }
}

/// Restarts the analysis from the widening seeds of the first result,
/// keeping that result as a known property.
pub(crate) fn seeded_round<G, V, S>(
    engine: &mut FixpointEngine<'_, G, V>,
    strategy: &mut S,
    rounds: usize,
) -> AnalysisResult<()>
where
    G: ControlFlowGraph,
    V: AbstractValue,
    S: PathSelectionStrategy<G, V>,
{
    engine.copy_xs_to_xf()?;
    if !engine.compute_widening_seed()? {
        debug!("no widening seeds");
        return engine.copy_xf_to_xs();
    }
    engine.copy_xd_to_xs()?;

    engine.is_computed.fill(false);
    engine.worklist.clear();
    for n in 0..engine.node_count() {
        if !engine.slot(n, SlotKind::Stable)?.is_bottom() {
            engine.push(n);
        }
    }
    engine.ascending_iter(strategy, false)?;
    engine.narrowing_rounds(strategy, rounds)
}

/// Mini-widening on a self-loop path, shared by both path-focusing
/// strategies.
///
/// The first sighting of `path` only records it. The second widens
/// disjunct `target` of `n` with `image`, replaces `image` by the image
/// of the widened value, restores disjunct `source` as it was and
/// switches the caller to join-only.
#[allow(clippy::too_many_arguments)]
pub(crate) fn loop_iteration<G, V>(
    engine: &mut FixpointEngine<'_, G, V>,
    n: usize,
    source: usize,
    target: usize,
    path: &Path<G::NodeId>,
    image: &mut V,
    only_join: &mut bool,
    seen: &mut PathSet<G::NodeId>,
) -> AnalysisResult<()>
where
    G: ControlFlowGraph,
    V: AbstractValue,
{
    if !seen.exist(path, false) {
        seen.insert(path.clone(), false);
        return Ok(());
    }
    let env = engine.env(n)?;
    let bottom = engine.bottom(n)?;
    let stable = engine.slot(n, SlotKind::Stable)?;
    let backup = stable.get(source).cloned().unwrap_or_else(|| bottom.clone());
    let previous = stable.get(target).cloned().unwrap_or(bottom);

    let mut joined = previous.clone();
    joined.join_array(&env, vec![image.clone()]);
    let widened = engine.widen_with_thresholds(&previous, &joined)?;
    debug!("loop iteration at node {} widens to {}", n, widened);
    engine
        .slot_mut(n, SlotKind::Stable)?
        .set_disjunct(target, widened.clone());

    let mut next = widened;
    engine.transform_path(path, &mut next)?;
    next.change_environment(&env);
    *image = next;

    engine.slot_mut(n, SlotKind::Stable)?.set_disjunct(source, backup);
    *only_join = true;
    seen.remove(path, false);
    Ok(())
}
