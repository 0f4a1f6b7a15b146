/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::datatype::DisjunctiveValue;
use crate::error::AnalysisError;
use crate::error::AnalysisResult;
use crate::graph::BlockRole;
use crate::graph::ControlFlowGraph;
use crate::node::ControlFlowNode;
use crate::node::NodeSlots;
use crate::node::SlotKind;
use crate::node::TechniqueKey;
use crate::oracle::StateView;
use crate::reduction::ReductionPoints;
use crate::scc::strongly_connected_components;
use crate::value::AbstractValue;
use crate::value::Environment;

pub type AnalysisNode<N, V> = ControlFlowNode<N, DisjunctiveValue<V>>;

/// Everything the engine knows about one function: an arena of nodes
/// reachable from the entry (the entry has index 0, the others follow
/// in discovery order), adjacency by arena index, SCC labels and the
/// reduction points.
///
/// Slots are keyed by [`TechniqueKey`], so several techniques can be
/// run on the same context and read each other's results.
#[derive(Clone, Debug)]
pub struct AnalysisContext<N, V: AbstractValue> {
    nodes: Vec<AnalysisNode<N, V>>,
    index: HashMap<N, usize>,
    succs: Vec<Vec<usize>>,
    preds: Vec<Vec<usize>>,
    scc: Vec<usize>,
    reduction: ReductionPoints,
}

impl<N, V> AnalysisContext<N, V>
where
    N: Copy + Hash + Eq + Debug,
    V: AbstractValue,
{
    pub fn build<G>(graph: &G) -> Self
    where
        G: ControlFlowGraph<NodeId = N>,
    {
        let entry = graph.entry();
        let mut blocks = vec![entry];
        let mut index = HashMap::from([(entry, 0)]);
        let mut stack = vec![entry];
        while let Some(b) = stack.pop() {
            let mut discovered = Vec::new();
            for s in graph.successors(b) {
                if !index.contains_key(&s) {
                    index.insert(s, blocks.len());
                    blocks.push(s);
                    discovered.push(s);
                }
            }
            // The first successor is expanded first.
            stack.extend(discovered.into_iter().rev());
        }

        let succs: Vec<Vec<usize>> = blocks
            .iter()
            .map(|&b| graph.successors(b).iter().map(|s| index[s]).collect())
            .collect();
        let mut preds = vec![Vec::new(); blocks.len()];
        for (i, ss) in succs.iter().enumerate() {
            for &s in ss {
                preds[s].push(i);
            }
        }
        let roles: Vec<BlockRole> = blocks.iter().map(|&b| graph.role(b)).collect();
        let headers: Vec<bool> = blocks.iter().map(|&b| graph.is_loop_header(b)).collect();
        let scc = strongly_connected_components(&succs, 0);
        let reduction = ReductionPoints::compute(&succs, &roles, &headers, 0);
        let nodes = blocks
            .iter()
            .enumerate()
            .map(|(i, &b)| ControlFlowNode::new(i, b))
            .collect();

        Self {
            nodes,
            index,
            succs,
            preds,
            scc,
            reduction,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index_of(&self, block: N) -> Option<usize> {
        self.index.get(&block).copied()
    }

    pub fn block(&self, n: usize) -> AnalysisResult<N> {
        self.node(n).map(|node| node.block)
    }

    pub fn node(&self, n: usize) -> AnalysisResult<&AnalysisNode<N, V>> {
        self.nodes
            .get(n)
            .ok_or_else(|| AnalysisError::invariant(format!("no node {} in the arena", n)))
    }

    pub fn node_mut(&mut self, n: usize) -> AnalysisResult<&mut AnalysisNode<N, V>> {
        self.nodes
            .get_mut(n)
            .ok_or_else(|| AnalysisError::invariant(format!("no node {} in the arena", n)))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &AnalysisNode<N, V>> {
        self.nodes.iter()
    }

    pub fn successors(&self, n: usize) -> &[usize] {
        self.succs.get(n).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, n: usize) -> &[usize] {
        self.preds.get(n).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn scc(&self, n: usize) -> usize {
        self.scc.get(n).copied().unwrap_or(0)
    }

    pub fn reduction(&self) -> &ReductionPoints {
        &self.reduction
    }

    pub fn slots(&self, n: usize, key: &TechniqueKey) -> AnalysisResult<&NodeSlots<DisjunctiveValue<V>>> {
        self.node(n)?.slots(key).ok_or_else(|| {
            AnalysisError::invariant(format!("node {} has no slots for {}", n, key))
        })
    }

    pub fn slots_mut(
        &mut self,
        n: usize,
        key: &TechniqueKey,
    ) -> AnalysisResult<&mut NodeSlots<DisjunctiveValue<V>>> {
        self.node_mut(n)?.slots_mut(key).ok_or_else(|| {
            AnalysisError::invariant(format!("node {} has no slots for {}", n, key))
        })
    }

    /// Whether `key` has been run (or is running) on this context.
    pub fn has_technique(&self, key: &TechniqueKey) -> bool {
        self.nodes.first().map_or(false, |n| n.has_slots(key))
    }

    pub fn view(&self, key: TechniqueKey) -> TechniqueView<'_, N, V> {
        TechniqueView { context: self, key }
    }
}

/// The slots of one technique, seen through block ids.
pub struct TechniqueView<'c, N, V: AbstractValue> {
    context: &'c AnalysisContext<N, V>,
    key: TechniqueKey,
}

impl<'c, N, V> TechniqueView<'c, N, V>
where
    N: Copy + Hash + Eq + Debug,
    V: AbstractValue,
{
    fn slot(&self, node: N, slot: SlotKind) -> Option<&'c DisjunctiveValue<V>> {
        let n = self.context.index_of(node)?;
        let slots = self.context.nodes.get(n)?.slots(&self.key)?;
        Some(slots.get(slot))
    }
}

impl<'c, N, V> StateView<N, V> for TechniqueView<'c, N, V>
where
    N: Copy + Hash + Eq + Debug,
    V: AbstractValue,
{
    fn disjunct_count(&self, node: N, slot: SlotKind) -> usize {
        self.slot(node, slot).map_or(0, |s| s.len())
    }

    fn disjunct(&self, node: N, slot: SlotKind, index: usize) -> Option<&V> {
        self.slot(node, slot)?.get(index)
    }

    fn is_reduction_point(&self, node: N) -> bool {
        self.context
            .index_of(node)
            .map_or(false, |n| self.context.reduction.in_pr(n))
    }

    fn environment(&self, node: N) -> Option<&Environment> {
        let n = self.context.index_of(node)?;
        self.context.nodes.get(n).map(|node| node.env())
    }
}
