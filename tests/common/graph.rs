/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use petgraph::graph::NodeIndex;
use spire::graph::FlowGraph;

// A bare CFG for testing: block `i` of the edge list is `blocks[i]`,
// block 0 is the entry.
pub struct SimpleGraph {
    pub graph: FlowGraph<u32>,
    pub blocks: Vec<NodeIndex>,
}

impl SimpleGraph {
    pub fn new(size: u32) -> Self {
        let mut graph = FlowGraph::new(0);
        let mut blocks = vec![graph.entry_block()];
        for i in 1..size {
            blocks.push(graph.add_block(i));
        }
        Self { graph, blocks }
    }

    pub fn with_edges(size: u32, edges: &[(usize, usize)]) -> Self {
        let mut g = Self::new(size);
        for &(from, to) in edges {
            g.add_edge(from, to);
        }
        g
    }

    pub fn add_edge(&mut self, from: usize, to: usize) {
        // Duplicate edges are kept by the underlying graph.
        self.graph.add_edge(self.blocks[from], self.blocks[to], ());
    }

    pub fn block(&self, i: usize) -> NodeIndex {
        self.blocks[i]
    }
}
