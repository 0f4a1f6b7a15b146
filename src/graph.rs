/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::cell::OnceCell;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

use petgraph::algo::dominators;
use petgraph::graph::DiGraph;
use petgraph::graph::EdgeIndex;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use smallvec::SmallVec;

pub const DEFAULT_GRAPH_SUCCS_NUM: usize = 4;

/// What a block stands for, as far as the choice of reduction points
/// goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockRole {
    Plain,
    /// Leaves the function.
    Return,
    /// Reached only when an assertion fails.
    AssertionFailure,
    /// Reached only through undefined behaviour.
    UndefinedBehavior,
}

/// The control-flow graph of one function, as the fixpoint engine sees
/// it.
///
/// Clients can either maintain their own structure and implement
/// this trait, or use [`FlowGraph`].
/// The constant generic parameter S is an estimated number of successor
/// nodes that is just enough for most nodes. A larger/smaller
/// value will not cause incorrect result, it only affects
/// performance.
// NOTE: due to the status of Rust const generics, we can not define
// S as an associated constant since it is part of the return type for
// method predecessors and successors.
pub trait ControlFlowGraph<const S: usize = DEFAULT_GRAPH_SUCCS_NUM> {
    type NodeId: Copy + Hash + Eq + Ord + Debug;

    /// Entry block.
    fn entry(&self) -> Self::NodeId;

    /// Successors of n, in a stable order and without duplicates.
    fn successors(&self, n: Self::NodeId) -> SmallVec<[Self::NodeId; S]>;

    /// Predecessors of n.
    fn predecessors(&self, n: Self::NodeId) -> SmallVec<[Self::NodeId; S]>;

    fn is_loop_header(&self, n: Self::NodeId) -> bool;

    fn role(&self, n: Self::NodeId) -> BlockRole;

    fn has_edge(&self, from: Self::NodeId, to: Self::NodeId) -> bool {
        self.successors(from).contains(&to)
    }
}

/// A CFG over a petgraph `DiGraph`, with block payloads `B` and edge
/// payloads `E` (typically the branch condition).
///
/// Loop headers are the targets of edges whose target dominates their
/// source. They are computed on first use and invalidated by any
/// mutation.
#[derive(Clone, Debug)]
pub struct FlowGraph<B, E = ()> {
    graph: DiGraph<B, E>,
    entry: NodeIndex,
    roles: HashMap<NodeIndex, BlockRole>,
    loop_headers: OnceCell<HashSet<NodeIndex>>,
}

impl<B, E> FlowGraph<B, E> {
    pub fn new(entry: B) -> Self {
        let mut graph = DiGraph::new();
        let entry = graph.add_node(entry);
        Self {
            graph,
            entry,
            roles: HashMap::new(),
            loop_headers: OnceCell::new(),
        }
    }

    pub fn entry_block(&self) -> NodeIndex {
        self.entry
    }

    pub fn add_block(&mut self, block: B) -> NodeIndex {
        self.loop_headers = OnceCell::new();
        self.graph.add_node(block)
    }

    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, payload: E) -> EdgeIndex {
        self.loop_headers = OnceCell::new();
        self.graph.add_edge(from, to, payload)
    }

    pub fn set_role(&mut self, n: NodeIndex, role: BlockRole) {
        self.roles.insert(n, role);
    }

    pub fn block(&self, n: NodeIndex) -> &B {
        &self.graph[n]
    }

    pub fn block_mut(&mut self, n: NodeIndex) -> &mut B {
        &mut self.graph[n]
    }

    /// Payload of the first edge from `from` to `to`.
    pub fn edge(&self, from: NodeIndex, to: NodeIndex) -> Option<&E> {
        self.graph
            .find_edge(from, to)
            .and_then(|e| self.graph.edge_weight(e))
    }

    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn blocks(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    fn neighbors(&self, n: NodeIndex, dir: Direction) -> SmallVec<[NodeIndex; DEFAULT_GRAPH_SUCCS_NUM]> {
        let mut edges: SmallVec<[(EdgeIndex, NodeIndex); DEFAULT_GRAPH_SUCCS_NUM]> = self
            .graph
            .edges_directed(n, dir)
            .map(|e| {
                let other = match dir {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (e.id(), other)
            })
            .collect();
        // petgraph walks adjacency lists newest first; report insertion order.
        edges.sort();
        let mut out: SmallVec<[NodeIndex; DEFAULT_GRAPH_SUCCS_NUM]> = SmallVec::new();
        for (_, m) in edges {
            if !out.contains(&m) {
                out.push(m);
            }
        }
        out
    }

    fn loop_headers(&self) -> &HashSet<NodeIndex> {
        self.loop_headers.get_or_init(|| {
            let doms = dominators::simple_fast(&self.graph, self.entry);
            let mut headers = HashSet::new();
            for e in self.graph.edge_references() {
                if let Some(mut dominating) = doms.dominators(e.source()) {
                    if dominating.any(|d| d == e.target()) {
                        headers.insert(e.target());
                    }
                }
            }
            headers
        })
    }
}

impl<B, E> ControlFlowGraph for FlowGraph<B, E> {
    type NodeId = NodeIndex;

    fn entry(&self) -> NodeIndex {
        self.entry
    }

    fn successors(&self, n: NodeIndex) -> SmallVec<[NodeIndex; DEFAULT_GRAPH_SUCCS_NUM]> {
        self.neighbors(n, Direction::Outgoing)
    }

    fn predecessors(&self, n: NodeIndex) -> SmallVec<[NodeIndex; DEFAULT_GRAPH_SUCCS_NUM]> {
        self.neighbors(n, Direction::Incoming)
    }

    fn is_loop_header(&self, n: NodeIndex) -> bool {
        self.loop_headers().contains(&n)
    }

    fn role(&self, n: NodeIndex) -> BlockRole {
        match self.roles.get(&n) {
            Some(role) => *role,
            None if self.graph.edges_directed(n, Direction::Outgoing).next().is_none() => {
                BlockRole::Return
            }
            None => BlockRole::Plain,
        }
    }

    fn has_edge(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.graph.find_edge(from, to).is_some()
    }
}
