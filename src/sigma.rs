/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;
use std::hash::Hash;

use log::warn;

use crate::datatype::DisjunctiveValue;
use crate::path::Path;
use crate::value::AbstractValue;

/// Decides which disjunct of its destination a path's contribution is
/// merged into.
///
/// A `(path, starting disjunct)` pair keeps the index it was first given.
/// A new pair goes to the first disjunct it joins with precisely, then to
/// a fresh disjunct, and once `max_disjuncts` are in use to the last one.
/// The last case loses precision and is recorded.
#[derive(Clone, Debug)]
pub struct Sigma<N: Hash + Eq> {
    assigned: HashMap<(Path<N>, usize), usize>,
    max_disjuncts: usize,
    degraded: bool,
}

impl<N: Copy + Hash + Eq> Sigma<N> {
    pub fn new(max_disjuncts: usize) -> Self {
        Self {
            assigned: HashMap::new(),
            max_disjuncts: max_disjuncts.max(1),
            degraded: false,
        }
    }

    pub fn assign<V: AbstractValue>(
        &mut self,
        path: &Path<N>,
        start: usize,
        contribution: &V,
        target: &DisjunctiveValue<V>,
    ) -> usize {
        let key = (path.clone(), start);
        if let Some(&index) = self.assigned.get(&key) {
            return index;
        }
        let limit = target.len().min(self.max_disjuncts);
        let precise = (0..limit).find(|&i| {
            target
                .get(i)
                .map_or(true, |d| d.can_join_precisely(contribution))
        });
        let index = match precise {
            Some(i) => i,
            None if target.len() < self.max_disjuncts => target.len(),
            None => {
                warn!(
                    "all {} disjuncts in use, merging into the last one",
                    self.max_disjuncts
                );
                self.degraded = true;
                self.max_disjuncts - 1
            }
        };
        self.assigned.insert(key, index);
        index
    }

    /// Whether some contribution had to be merged imprecisely.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    pub fn clear(&mut self) {
        self.assigned.clear();
        self.degraded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::LinearExpr;
    use crate::numeric::LinearValue;
    use crate::value::DomainKind;
    use crate::value::Environment;

    fn point(x: i64, z: i64) -> LinearValue {
        let env = Environment::from_ints(["x", "z"]);
        let mut v = LinearValue::top(DomainKind::IntervalEqualities, &env);
        v.assign(&"x".into(), &LinearExpr::constant(x));
        v.assign(&"z".into(), &LinearExpr::constant(z));
        v
    }

    #[test]
    fn test_bound_is_respected() {
        let env = Environment::from_ints(["x", "z"]);
        let bottom = LinearValue::bottom(DomainKind::IntervalEqualities, &env);
        let mut target = DisjunctiveValue::new(bottom);
        let mut sigma: Sigma<u32> = Sigma::new(2);

        let paths = [Path::new(vec![0, 1]), Path::new(vec![0, 2, 1]), Path::new(vec![0, 3, 1])];
        let values = [point(0, 0), point(10, 1), point(20, 2)];
        let mut chosen = vec![];
        for (p, v) in paths.iter().zip(values.iter()) {
            let i = sigma.assign(p, 0, v, &target);
            let env = target.get(0).map(|d| d.environment().clone()).unwrap_or_default();
            target.join_array(&env, vec![v.clone()], i);
            chosen.push(i);
        }
        assert_eq!(chosen, vec![0, 1, 1]);
        assert_eq!(target.len(), 2);
        assert!(sigma.is_degraded());
        // Memoized.
        assert_eq!(sigma.assign(&paths[0], 0, &values[2], &target), 0);
        assert_eq!(sigma.len(), 3);
    }

    #[test]
    fn test_precise_join_reuses_disjunct() {
        let mut target = DisjunctiveValue::new(point(0, 0));
        let mut sigma: Sigma<u32> = Sigma::new(3);
        let i = sigma.assign(&Path::new(vec![0, 1]), 0, &point(1, 0), &target);
        assert_eq!(i, 0);
        target.set_disjunct(1, point(50, 7));
        let j = sigma.assign(&Path::new(vec![0, 2, 1]), 0, &point(50, 7), &target);
        assert_eq!(j, 1);
        assert!(!sigma.is_degraded());
    }
}
