/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;
use std::hash::Hash;

use im::HashSet;

/// A sequence of blocks `n_0 -> n_1 -> ... -> n_k`, the unit the
/// transfer function is applied along.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Path<N> {
    nodes: Vec<N>,
}

impl<N: Copy + Eq> Path<N> {
    pub fn new(nodes: Vec<N>) -> Self {
        Self { nodes }
    }

    pub fn edge(from: N, to: N) -> Self {
        Self::new(vec![from, to])
    }

    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn source(&self) -> Option<N> {
        self.nodes.first().copied()
    }

    pub fn destination(&self) -> Option<N> {
        self.nodes.last().copied()
    }

    /// Consecutive `(from, to)` pairs.
    pub fn steps(&self) -> impl Iterator<Item = (N, N)> + '_ {
        self.nodes.windows(2).map(|w| (w[0], w[1]))
    }

    /// Path from a node back to itself.
    pub fn is_cycle(&self) -> bool {
        self.len() > 1 && self.source() == self.destination()
    }

    pub fn map<M: Copy + Eq>(&self, f: impl Fn(N) -> M) -> Path<M> {
        Path::new(self.nodes.iter().map(|&n| f(n)).collect())
    }
}

impl<N: fmt::Debug> fmt::Display for Path<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            itertools::join(self.nodes.iter().map(|n| format!("{:?}", n)), " -> ")
        )
    }
}

/// Paths already explored, double-buffered: a committed set `P` and a
/// pending set `P'` that the current round fills and [`PathSet::merge`]
/// folds into `P`.
#[derive(Clone, Debug)]
pub struct PathSet<N: Clone + Hash + Eq> {
    committed: HashSet<Path<N>>,
    pending: HashSet<Path<N>>,
}

impl<N: Clone + Hash + Eq> Default for PathSet<N> {
    fn default() -> Self {
        Self {
            committed: HashSet::new(),
            pending: HashSet::new(),
        }
    }
}

impl<N: Clone + Hash + Eq> PathSet<N> {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&self, primed: bool) -> &HashSet<Path<N>> {
        if primed {
            &self.pending
        } else {
            &self.committed
        }
    }

    fn buffer_mut(&mut self, primed: bool) -> &mut HashSet<Path<N>> {
        if primed {
            &mut self.pending
        } else {
            &mut self.committed
        }
    }

    pub fn insert(&mut self, path: Path<N>, primed: bool) {
        self.buffer_mut(primed).insert(path);
    }

    pub fn exist(&self, path: &Path<N>, primed: bool) -> bool {
        self.buffer(primed).contains(path)
    }

    pub fn remove(&mut self, path: &Path<N>, primed: bool) {
        self.buffer_mut(primed).remove(path);
    }

    pub fn clear(&mut self, primed: bool) {
        self.buffer_mut(primed).clear();
    }

    /// `P := P ∪ P'`, then `P' := ∅`.
    pub fn merge(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.committed = std::mem::take(&mut self.committed).union(pending);
    }

    pub fn is_empty(&self, primed: bool) -> bool {
        self.buffer(primed).is_empty()
    }

    pub fn len(&self, primed: bool) -> usize {
        self.buffer(primed).len()
    }
}

/// Restricts the paths an oracle query may return, by membership in
/// the committed half of a [`PathSet`].
#[derive(Clone, Copy, Debug)]
pub enum PathFilter<'a, N: Clone + Hash + Eq> {
    Any,
    Within(&'a PathSet<N>),
    NotWithin(&'a PathSet<N>),
}

impl<'a, N: Clone + Hash + Eq> PathFilter<'a, N> {
    pub fn admits(&self, path: &Path<N>) -> bool {
        match self {
            PathFilter::Any => true,
            PathFilter::Within(set) => set.exist(path, false),
            PathFilter::NotWithin(set) => !set.exist(path, false),
        }
    }
}
