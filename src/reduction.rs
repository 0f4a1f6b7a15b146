/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::graph::BlockRole;

/// The control points with explicit invariants.
///
/// `Pw` (widening points) holds the loop headers the CFG reports plus
/// the target of every DFS back edge, so that every cycle goes through
/// at least one of them even when the graph is irreducible. `Pr` is
/// `Pw`, the entry, and the return, assertion-failure and
/// undefined-behaviour blocks. Since every cycle meets `Pw`, the paths
/// between two consecutive `Pr` nodes are finite in number.
#[derive(Clone, Debug, Default)]
pub struct ReductionPoints {
    pr: Vec<bool>,
    pw: Vec<bool>,
    roles: Vec<BlockRole>,
    pr_succs: Vec<Vec<usize>>,
    pr_preds: Vec<Vec<usize>>,
}

fn back_edge_targets(succs: &[Vec<usize>], root: usize) -> Vec<bool> {
    let n = succs.len();
    let mut targets = vec![false; n];
    if root >= n {
        return targets;
    }
    // 0 = unvisited, 1 = on the DFS path, 2 = done
    let mut state = vec![0u8; n];
    let mut calls: Vec<(usize, usize)> = vec![(root, 0)];
    state[root] = 1;
    while let Some(&(v, pos)) = calls.last() {
        if pos < succs[v].len() {
            if let Some(top) = calls.last_mut() {
                top.1 += 1;
            }
            let w = succs[v][pos];
            match state[w] {
                0 => {
                    state[w] = 1;
                    calls.push((w, 0));
                }
                1 => targets[w] = true,
                _ => {}
            }
        } else {
            state[v] = 2;
            calls.pop();
        }
    }
    targets
}

impl ReductionPoints {
    pub fn compute(
        succs: &[Vec<usize>],
        roles: &[BlockRole],
        loop_headers: &[bool],
        entry: usize,
    ) -> Self {
        let n = succs.len();
        let back = back_edge_targets(succs, entry);
        let pw: Vec<bool> = (0..n).map(|i| loop_headers[i] || back[i]).collect();
        let pr: Vec<bool> = (0..n)
            .map(|i| pw[i] || i == entry || roles[i] != BlockRole::Plain)
            .collect();

        let mut pr_succs = vec![Vec::new(); n];
        let mut pr_preds = vec![Vec::new(); n];
        for p in (0..n).filter(|&p| pr[p]) {
            let mut reached = vec![false; n];
            let mut seen = vec![false; n];
            let mut todo: Vec<usize> = succs[p].clone();
            while let Some(v) = todo.pop() {
                if seen[v] {
                    continue;
                }
                seen[v] = true;
                if pr[v] {
                    reached[v] = true;
                } else {
                    todo.extend(succs[v].iter().copied());
                }
            }
            for q in (0..n).filter(|&q| reached[q]) {
                pr_succs[p].push(q);
                pr_preds[q].push(p);
            }
        }

        Self {
            pr,
            pw,
            roles: roles.to_vec(),
            pr_succs,
            pr_preds,
        }
    }

    pub fn in_pr(&self, n: usize) -> bool {
        self.pr.get(n).copied().unwrap_or(false)
    }

    pub fn in_pw(&self, n: usize) -> bool {
        self.pw.get(n).copied().unwrap_or(false)
    }

    pub fn role(&self, n: usize) -> BlockRole {
        self.roles.get(n).copied().unwrap_or(BlockRole::Plain)
    }

    /// Assertion-failure or undefined-behaviour site.
    pub fn is_error_site(&self, n: usize) -> bool {
        matches!(
            self.role(n),
            BlockRole::AssertionFailure | BlockRole::UndefinedBehavior
        )
    }

    /// `Pr` nodes reachable from `n` without crossing another `Pr` node.
    pub fn pr_successors(&self, n: usize) -> &[usize] {
        self.pr_succs.get(n).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pr_predecessors(&self, n: usize) -> &[usize] {
        self.pr_preds.get(n).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pr_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.pr.iter().enumerate().filter(|(_, &p)| p).map(|(i, _)| i)
    }

    pub fn pw_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.pw.iter().enumerate().filter(|(_, &p)| p).map(|(i, _)| i)
    }
}
