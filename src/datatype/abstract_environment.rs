/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::borrow::Cow;
use std::fmt;

use im::OrdMap;

use crate::datatype::AbstractDomain;

/*
 * An abstract environment maps program variables to elements of a common
 * non-relational domain, e.g. a box of intervals:
 *
 *   {"i" -> [0, 50], "x" -> [0, 100], ...}
 *
 * Variables without a binding are implicitly top. If any binding is _|_, no
 * concrete state is represented, so setting a variable to _|_ collapses the
 * whole environment to _|_.
 *
 * The bindings live in a persistent ordered map: cloning is O(1), which the
 * fixpoint engine relies on since every node slot holds its own copy, and
 * iteration order is deterministic.
 */
#[derive(Clone, PartialEq, Eq)]
pub enum OrdMapAbstractEnvironment<V: Clone + Ord, D: AbstractDomain> {
    Value(OrdMap<V, D>),
    Bottom,
}

impl<V, D> OrdMapAbstractEnvironment<V, D>
where
    V: Clone + Ord,
    D: AbstractDomain,
{
    pub fn bindings(&self) -> Option<&OrdMap<V, D>> {
        match self {
            Self::Value(map) => Some(map),
            Self::Bottom => None,
        }
    }

    /// Number of explicit (non-top) bindings.
    pub fn len(&self) -> usize {
        self.bindings().map_or(0, OrdMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, variable: &V) -> Cow<'_, D> {
        let map = match self {
            Self::Value(map) => map,
            Self::Bottom => return Cow::Owned(D::bottom()),
        };

        match map.get(variable) {
            Some(domain) => Cow::Borrowed(domain),
            None => Cow::Owned(D::top()),
        }
    }

    pub fn set(&mut self, variable: V, domain: D) {
        if let Self::Value(map) = self {
            if domain.is_top() {
                map.remove(&variable);
            } else if domain.is_bottom() {
                *self = Self::Bottom;
            } else {
                map.insert(variable, domain);
            }
        }
    }

    /// Drops the binding of `variable`, making it top.
    pub fn forget(&mut self, variable: &V) {
        if let Self::Value(map) = self {
            map.remove(variable);
        }
    }

    pub fn update(&mut self, variable: &V, op: impl FnOnce(&mut D)) {
        let mut domain = self.get(variable).into_owned();
        if self.is_bottom() {
            return;
        }
        op(&mut domain);
        self.set(variable.clone(), domain);
    }

    /// Keeps only the bindings whose variable satisfies `keep`.
    pub fn retain(&mut self, keep: impl Fn(&V) -> bool) {
        if let Self::Value(map) = self {
            *map = map
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }
    }

    pub fn join_like_operation(lhs: &mut Self, rhs: Self, operation: impl Fn(&mut D, D)) {
        match (&mut *lhs, rhs) {
            (Self::Value(l_map), Self::Value(r_map)) => {
                let mut joined = OrdMap::new();
                for (k, r_v) in r_map.into_iter() {
                    if let Some(mut l_v) = l_map.remove(&k) {
                        operation(&mut l_v, r_v);
                        if !l_v.is_top() {
                            joined.insert(k, l_v);
                        }
                    }
                }
                // Keys bound on one side only are top on the other.
                *l_map = joined;
            }
            (Self::Bottom, rhs) => *lhs = rhs,
            (_, Self::Bottom) => {}
        }
    }

    pub fn meet_like_operation(lhs: &mut Self, rhs: Self, operation: impl Fn(&mut D, D)) {
        if lhs.is_bottom() {
            return;
        }
        let r_map = match rhs {
            Self::Value(r_map) => r_map,
            Self::Bottom => {
                *lhs = Self::Bottom;
                return;
            }
        };
        if let Self::Value(l_map) = lhs {
            for (r_k, r_v) in r_map.into_iter() {
                match l_map.get_mut(&r_k) {
                    Some(l_v) => {
                        operation(l_v, r_v);
                        if l_v.is_bottom() {
                            *lhs = Self::Bottom;
                            return;
                        }
                    }
                    None => {
                        // Top is the identity of meet-like operations.
                        l_map.insert(r_k, r_v);
                    }
                }
            }
        }
    }
}

impl<V, D> AbstractDomain for OrdMapAbstractEnvironment<V, D>
where
    V: Clone + Ord,
    D: AbstractDomain,
{
    fn bottom() -> Self {
        Self::Bottom
    }

    fn top() -> Self {
        Self::Value(OrdMap::new())
    }

    fn is_bottom(&self) -> bool {
        matches!(self, Self::Bottom)
    }

    fn is_top(&self) -> bool {
        match self {
            Self::Value(map) => map.is_empty(),
            Self::Bottom => false,
        }
    }

    fn leq(&self, rhs: &Self) -> bool {
        match (self, rhs) {
            (Self::Bottom, _) => true,
            (_, Self::Bottom) => false,
            (Self::Value(l_map), Self::Value(r_map)) => {
                r_map.iter().all(|(r_k, r_v)| match l_map.get(r_k) {
                    Some(l_v) => l_v.leq(r_v),
                    None => false,
                })
            }
        }
    }

    fn join_with(&mut self, rhs: Self) {
        Self::join_like_operation(self, rhs, |d1, d2| d1.join_with(d2));
    }

    fn meet_with(&mut self, rhs: Self) {
        Self::meet_like_operation(self, rhs, |d1, d2| d1.meet_with(d2));
    }

    fn widen_with(&mut self, rhs: Self) {
        Self::join_like_operation(self, rhs, |d1, d2| d1.widen_with(d2));
    }

    fn narrow_with(&mut self, rhs: Self) {
        Self::meet_like_operation(self, rhs, |d1, d2| d1.narrow_with(d2));
    }
}

impl<V, D> fmt::Debug for OrdMapAbstractEnvironment<V, D>
where
    V: Clone + Ord + fmt::Display,
    D: AbstractDomain + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<V, D> fmt::Display for OrdMapAbstractEnvironment<V, D>
where
    V: Clone + Ord + fmt::Display,
    D: AbstractDomain + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bottom => write!(f, "_|_"),
            Self::Value(map) => write!(
                f,
                "{{{}}}",
                itertools::join(map.iter().map(|(k, v)| format!("{} -> {}", k, v)), ", ")
            ),
        }
    }
}
