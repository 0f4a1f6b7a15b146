/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;

use crate::value::AbstractValue;
use crate::value::Environment;

/// A finite union of abstract values, addressed by disjunct index.
///
/// Lattice operations exist only in index-qualified form: the union as a
/// whole has no join or widening, the caller decides which disjunct a
/// contribution goes to. Addressing an index past the end grows the
/// vector with bottom disjuncts. Disjunct 0 always exists.
#[derive(Clone, Debug)]
pub struct DisjunctiveValue<V: AbstractValue> {
    disjuncts: Vec<V>,
}

impl<V: AbstractValue> DisjunctiveValue<V> {
    pub fn new(first: V) -> Self {
        Self {
            disjuncts: vec![first],
        }
    }

    /// `count` bottom disjuncts over `env` (at least one).
    pub fn bottom_like(template: &V, env: &Environment, count: usize) -> Self {
        let mut bottom = template.clone();
        bottom.set_bottom(env);
        Self {
            disjuncts: vec![bottom; count.max(1)],
        }
    }

    pub fn len(&self) -> usize {
        self.disjuncts.len()
    }

    /// Number of disjuncts that are not bottom.
    pub fn live_count(&self) -> usize {
        self.disjuncts.iter().filter(|d| !d.is_bottom()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &V> {
        self.disjuncts.iter()
    }

    pub fn get(&self, index: usize) -> Option<&V> {
        self.disjuncts.get(index)
    }

    fn ensure(&mut self, index: usize) -> &mut V {
        if index >= self.disjuncts.len() {
            let mut bottom = self.disjuncts[0].clone();
            let env = bottom.environment().clone();
            bottom.set_bottom(&env);
            self.disjuncts.resize(index + 1, bottom);
        }
        &mut self.disjuncts[index]
    }

    pub fn set_disjunct(&mut self, index: usize, value: V) {
        *self.ensure(index) = value;
    }

    pub fn set_top(&mut self, env: &Environment, index: usize) {
        self.ensure(index).set_top(env);
    }

    pub fn set_bottom(&mut self, env: &Environment, index: usize) {
        self.ensure(index).set_bottom(env);
    }

    pub fn join_array(&mut self, env: &Environment, values: Vec<V>, index: usize) {
        self.ensure(index).join_array(env, values);
    }

    pub fn meet_with(&mut self, other: &V, index: usize) {
        self.ensure(index).meet_with(other);
    }

    pub fn widen_with(&mut self, next: &V, index: usize) {
        self.ensure(index).widen_with(next);
    }

    pub fn widen_with_thresholds(&mut self, next: &V, thresholds: &[V::Constraint], index: usize) {
        self.ensure(index).widen_with_thresholds(next, thresholds);
    }

    pub fn narrow_with(&mut self, next: &V, index: usize) {
        self.ensure(index).narrow_with(next);
    }

    /// Compares disjunct `index` of both unions; a missing disjunct is
    /// bottom.
    pub fn leq_at(&self, other: &Self, index: usize) -> bool {
        match (self.get(index), other.get(index)) {
            (None, _) => true,
            (Some(mine), None) => mine.is_bottom(),
            (Some(mine), Some(theirs)) => mine.leq(theirs),
        }
    }

    pub fn is_bottom_at(&self, index: usize) -> bool {
        self.get(index).map_or(true, |d| d.is_bottom())
    }

    /// Holds iff every disjunct is bottom.
    pub fn is_bottom(&self) -> bool {
        self.disjuncts.iter().all(|d| d.is_bottom())
    }

    /// Holds iff some disjunct is top.
    pub fn is_top(&self) -> bool {
        self.disjuncts.iter().any(|d| d.is_top())
    }

    pub fn change_environment(&mut self, env: &Environment) {
        for d in self.disjuncts.iter_mut() {
            d.change_environment(env);
        }
    }

    /// Disjunct-wise equality; a missing disjunct is bottom.
    pub fn same_as(&self, other: &Self) -> bool {
        let len = self.len().max(other.len());
        (0..len).all(|i| self.leq_at(other, i) && other.leq_at(self, i))
    }

    /// Convex hull of all disjuncts, the representative used when the
    /// union has to be exported as a single constraint system.
    pub fn hull(&self) -> V {
        let mut hull = self.disjuncts[0].clone();
        let env = self
            .disjuncts
            .iter()
            .fold(hull.environment().clone(), |env, d| env.union(d.environment()));
        hull.join_array(&env, self.disjuncts[1..].to_vec());
        hull
    }
}

impl<V: AbstractValue> fmt::Display for DisjunctiveValue<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let live: Vec<String> = self
            .disjuncts
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.is_bottom())
            .map(|(i, d)| format!("#{}: {}", i, d))
            .collect();
        if live.is_empty() {
            write!(f, "_|_")
        } else {
            write!(f, "{}", live.join(" \\/ "))
        }
    }
}
