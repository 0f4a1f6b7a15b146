/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Tarjan's strongly connected components over an arena-indexed graph,
//! with an explicit call stack.

/// Labels every node reachable from `root` with the DFS index of the
/// root of its component. The first visited node gets index 1; nodes
/// not reachable from `root` keep 0.
///
/// Components are discovered in DFS order, so sorting by label visits
/// outer code before the loops nested in it.
pub fn strongly_connected_components(succs: &[Vec<usize>], root: usize) -> Vec<usize> {
    let n = succs.len();
    let mut index = vec![0usize; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut component = vec![0usize; n];
    if root >= n {
        return component;
    }

    let mut stack: Vec<usize> = Vec::new();
    // (node, position of the next successor to visit)
    let mut calls: Vec<(usize, usize)> = Vec::new();
    let mut next_index = 1;

    let mut visit = |v: usize,
                     index: &mut Vec<usize>,
                     lowlink: &mut Vec<usize>,
                     on_stack: &mut Vec<bool>,
                     stack: &mut Vec<usize>| {
        index[v] = next_index;
        lowlink[v] = next_index;
        next_index += 1;
        stack.push(v);
        on_stack[v] = true;
    };

    visit(root, &mut index, &mut lowlink, &mut on_stack, &mut stack);
    calls.push((root, 0));

    while let Some(&(v, pos)) = calls.last() {
        if pos < succs[v].len() {
            if let Some(top) = calls.last_mut() {
                top.1 += 1;
            }
            let w = succs[v][pos];
            if index[w] == 0 {
                visit(w, &mut index, &mut lowlink, &mut on_stack, &mut stack);
                calls.push((w, 0));
            } else if on_stack[w] {
                lowlink[v] = lowlink[v].min(index[w]);
            }
            continue;
        }

        calls.pop();
        if let Some(&(u, _)) = calls.last() {
            lowlink[u] = lowlink[u].min(lowlink[v]);
        }
        if lowlink[v] == index[v] {
            while let Some(w) = stack.pop() {
                on_stack[w] = false;
                component[w] = index[v];
                if w == v {
                    break;
                }
            }
        }
    }
    component
}
