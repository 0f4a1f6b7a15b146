/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::BTreeSet;
use std::fmt;

use im::OrdMap;
use num_bigint::BigInt;
use num_traits::One;
use num_traits::Signed;
use num_traits::Zero;

use crate::datatype::AbstractDomain;
use crate::datatype::Interval;
use crate::datatype::OrdMapAbstractEnvironment;
use crate::numeric::AffineEqualities;
use crate::numeric::ConstraintKind;
use crate::numeric::LinearConstraint;
use crate::numeric::LinearExpr;
use crate::value::AbstractValue;
use crate::value::DomainKind;
use crate::value::DomainManager;
use crate::value::Environment;
use crate::value::Symbol;
use crate::value::VariableKind;

type Bounds = OrdMapAbstractEnvironment<Symbol, Interval>;

/// Reduced product of a box of intervals and a system of affine
/// equalities, over exact integers.
///
/// Reduction (equalities tighten the box, singleton ranges become
/// equalities) runs after guards, assignments and meets. It never runs
/// after a join or a widening, so the ascending sequence stays
/// stationary once it stops growing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinearValue {
    kind: DomainKind,
    env: Environment,
    bounds: Bounds,
    eqs: AffineEqualities,
}

impl LinearValue {
    pub fn top(kind: DomainKind, env: &Environment) -> Self {
        Self {
            kind,
            env: env.clone(),
            bounds: Bounds::top(),
            eqs: AffineEqualities::new(),
        }
    }

    pub fn bottom(kind: DomainKind, env: &Environment) -> Self {
        Self {
            kind,
            env: env.clone(),
            bounds: Bounds::bottom(),
            eqs: AffineEqualities::new(),
        }
    }

    pub fn kind(&self) -> DomainKind {
        self.kind
    }

    fn tracks_equalities(&self) -> bool {
        self.kind == DomainKind::IntervalEqualities
    }

    pub fn interval_of(&self, symbol: &Symbol) -> Interval {
        self.bounds.get(symbol).into_owned()
    }

    pub fn equalities(&self) -> &AffineEqualities {
        &self.eqs
    }

    fn collapse(&mut self) {
        self.bounds = Bounds::bottom();
        self.eqs = AffineEqualities::new();
    }

    fn is_integral(&self, symbol: &Symbol) -> bool {
        self.env.kind_of(symbol) != Some(VariableKind::Real)
    }

    fn ensure_tracked(&mut self, expr: &LinearExpr) {
        for s in expr.variables() {
            if !self.env.contains(s) {
                self.env.add(s.clone(), VariableKind::Int);
            }
        }
    }

    /// Range of `expr` over the box.
    pub fn eval(&self, expr: &LinearExpr) -> Interval {
        expr.terms().fold(
            Interval::point(expr.constant_term().clone()),
            |acc, (s, c)| acc.add(&self.interval_of(s).scale(c)),
        )
    }

    /// `symbol := expr`. Symbols not yet in the environment are added as
    /// integers.
    pub fn assign(&mut self, symbol: &Symbol, expr: &LinearExpr) {
        self.ensure_tracked(&(expr.clone() + LinearExpr::var(symbol.clone())));
        if self.bounds.is_bottom() {
            return;
        }
        let range = self.eval(expr);
        if self.tracks_equalities() {
            if expr.mentions(symbol) {
                self.eqs.substitute_invertible(symbol, expr);
            } else {
                self.eqs.project_out(symbol);
                self.eqs.add(LinearExpr::var(symbol.clone()) - expr.clone());
            }
        }
        self.bounds.forget(symbol);
        self.bounds.set(symbol.clone(), range);
        self.reduce();
    }

    /// Forgets everything known about `symbol`.
    pub fn forget(&mut self, symbol: &Symbol) {
        self.bounds.forget(symbol);
        self.eqs.project_out(symbol);
    }

    /// Conjoins a guard.
    pub fn add_constraint(&mut self, constraint: &LinearConstraint) {
        self.ensure_tracked(&constraint.expr);
        if self.bounds.is_bottom() {
            return;
        }
        let c = if constraint.expr.variables().all(|s| self.is_integral(s)) {
            constraint.tightened_for_ints()
        } else {
            constraint.clone()
        };
        if let Some(holds) = c.constant_truth() {
            if !holds {
                self.collapse();
            }
            return;
        }
        if c.kind == ConstraintKind::Eq && self.tracks_equalities() {
            self.eqs.add(c.expr.clone());
        }
        self.propagate(&c.expr, c.kind);
        self.reduce();
    }

    /// Tightens the box with `expr (kind) 0`, one variable at a time.
    fn propagate(&mut self, expr: &LinearExpr, kind: ConstraintKind) {
        let terms: Vec<(Symbol, BigInt)> =
            expr.terms().map(|(s, c)| (s.clone(), c.clone())).collect();
        for (s, a) in terms {
            if self.bounds.is_bottom() {
                return;
            }
            // a*s = -rest
            let minus_rest = self.eval(&expr.without(&s)).scale(&-BigInt::one());
            let target = match kind {
                ConstraintKind::Eq => minus_rest,
                ConstraintKind::Ge | ConstraintKind::Gt => match minus_rest.lo() {
                    Some(lo) => Interval::at_least(lo.clone()),
                    None => continue,
                },
            };
            let range = target.divide(&a, self.is_integral(&s));
            self.bounds.update(&s, |i| i.meet_with(range));
        }
    }

    fn singleton_rows(&self) -> Vec<LinearExpr> {
        match self.bounds.bindings() {
            Some(map) => map
                .iter()
                .filter_map(|(s, i)| {
                    i.singleton()
                        .map(|c| LinearExpr::var(s.clone()) - LinearExpr::constant(c.clone()))
                })
                .collect(),
            None => vec![],
        }
    }

    /// The equalities together with the variables the box pins down.
    fn augmented_equalities(&self) -> AffineEqualities {
        let mut eqs = self.eqs.clone();
        let singles = self.singleton_rows();
        if !singles.is_empty() {
            eqs.extend(singles);
        }
        eqs
    }

    fn reduce(&mut self) {
        if self.bounds.is_bottom() {
            self.collapse();
            return;
        }
        if !self.tracks_equalities() {
            return;
        }
        self.eqs = self.augmented_equalities();
        if self.eqs.is_unsatisfiable() {
            self.collapse();
            return;
        }
        let rows = self.eqs.rows().to_vec();
        for row in rows.iter() {
            self.propagate(row, ConstraintKind::Eq);
        }
        if self.bounds.is_bottom() {
            self.collapse();
        }
    }

    /// Lower and upper bound candidates for `symbol` among the
    /// single-variable thresholds.
    fn candidates(
        &self,
        symbol: &Symbol,
        thresholds: &[LinearConstraint],
    ) -> (Vec<BigInt>, Vec<BigInt>) {
        let mut lower = Vec::new();
        let mut upper = Vec::new();
        for t in thresholds {
            let mut vars = t.expr.variables();
            if vars.next() != Some(symbol) || vars.next().is_some() {
                continue;
            }
            let integral = self.is_integral(symbol);
            let t = if integral {
                t.tightened_for_ints()
            } else {
                t.clone()
            };
            let a = t.expr.coeff(symbol);
            if a.is_zero() {
                continue;
            }
            let minus_c = -t.expr.constant_term().clone();
            let target = match t.kind {
                ConstraintKind::Eq => Interval::point(minus_c),
                _ => Interval::at_least(minus_c),
            };
            let range = target.divide(&a, integral);
            if let Some(lo) = range.lo() {
                lower.push(lo.clone());
            }
            if let Some(hi) = range.hi() {
                upper.push(hi.clone());
            }
        }
        (lower, upper)
    }

    fn aligned(&mut self, other: &Self) -> Self {
        let env = self.env.union(&other.env);
        if env != self.env {
            self.change_environment(&env);
        }
        let mut other = other.clone();
        if other.env != env {
            other.change_environment(&env);
        }
        other
    }

    fn join_aligned(&mut self, other: Self) {
        if other.bounds.is_bottom() {
            return;
        }
        if self.bounds.is_bottom() {
            self.bounds = other.bounds;
            self.eqs = other.eqs;
            return;
        }
        if self.tracks_equalities() {
            self.eqs = self
                .augmented_equalities()
                .join(&other.augmented_equalities());
        }
        self.bounds.join_with(other.bounds);
    }

    fn widen_aligned(&mut self, next: Self, thresholds: &[LinearConstraint]) {
        if next.bounds.is_bottom() {
            return;
        }
        if self.bounds.is_bottom() {
            self.bounds = next.bounds;
            self.eqs = next.eqs;
            return;
        }
        if self.tracks_equalities() {
            self.eqs = self
                .augmented_equalities()
                .join(&next.augmented_equalities());
        }
        let joined = self.bounds.clone().join(next.bounds);
        let (old, new) = match (self.bounds.bindings(), joined.bindings()) {
            (Some(old), Some(new)) => (old.clone(), new.clone()),
            _ => return,
        };
        let mut widened = OrdMap::new();
        for (s, old_i) in old.into_iter() {
            if let Some(new_i) = new.get(&s) {
                let (lower, upper) = self.candidates(&s, thresholds);
                let mut w = old_i;
                w.widen_with_candidates(new_i.clone(), &lower, &upper);
                if !w.is_top() {
                    widened.insert(s, w);
                }
            }
        }
        self.bounds = Bounds::Value(widened);
    }

    /// Rows of `self` that the equalities do not tie to another variable:
    /// `symbol` is constrained by its range only.
    fn equalities_without(&self, symbol: &Symbol) -> Option<AffineEqualities> {
        let mut projected = self.eqs.clone();
        projected.project_out(symbol);
        let mut check = projected.clone();
        if let Some(c) = self.interval_of(symbol).singleton() {
            check.add(LinearExpr::var(symbol.clone()) - LinearExpr::constant(c.clone()));
        }
        (check == self.eqs).then_some(projected)
    }

    fn touching(&self, a: &Interval, b: &Interval, integral: bool) -> bool {
        let gap = if integral { BigInt::one() } else { BigInt::zero() };
        let apart = |x: &Interval, y: &Interval| match (x.hi(), y.lo()) {
            (Some(hi), Some(lo)) => hi + &gap < *lo,
            _ => false,
        };
        !apart(a, b) && !apart(b, a)
    }
}

impl AbstractValue for LinearValue {
    type Constraint = LinearConstraint;

    fn environment(&self) -> &Environment {
        &self.env
    }

    fn set_top(&mut self, env: &Environment) {
        *self = Self::top(self.kind, env);
    }

    fn set_bottom(&mut self, env: &Environment) {
        *self = Self::bottom(self.kind, env);
    }

    fn change_environment(&mut self, env: &Environment) {
        for s in self.env.variables() {
            if !env.contains(&s) {
                self.forget(&s);
            }
        }
        self.env = env.clone();
    }

    fn join_array(&mut self, env: &Environment, values: Vec<Self>) {
        self.change_environment(env);
        for mut v in values {
            v.change_environment(env);
            self.join_aligned(v);
        }
    }

    fn meet_with(&mut self, other: &Self) {
        let other = self.aligned(other);
        if self.bounds.is_bottom() {
            return;
        }
        self.bounds.meet_with(other.bounds);
        self.eqs = self.eqs.meet(&other.eqs);
        self.reduce();
    }

    fn widen_with(&mut self, next: &Self) {
        let next = self.aligned(next);
        self.widen_aligned(next, &[]);
    }

    fn widen_with_thresholds(&mut self, next: &Self, thresholds: &[LinearConstraint]) {
        let next = self.aligned(next);
        self.widen_aligned(next, thresholds);
    }

    fn narrow_with(&mut self, next: &Self) {
        let next = self.aligned(next);
        if self.bounds.is_bottom() {
            return;
        }
        if next.bounds.is_bottom() {
            self.collapse();
            return;
        }
        self.bounds.narrow_with(next.bounds);
        self.eqs = self.eqs.meet(&next.eqs);
        self.reduce();
    }

    fn leq(&self, other: &Self) -> bool {
        if self.bounds.is_bottom() {
            return true;
        }
        if other.bounds.is_bottom() {
            return false;
        }
        if !self.bounds.leq(&other.bounds) {
            return false;
        }
        if other.eqs.is_empty() {
            return true;
        }
        let mine = self.augmented_equalities();
        other.eqs.rows().iter().all(|row| mine.implies(row))
    }

    fn is_bottom(&self) -> bool {
        self.bounds.is_bottom()
    }

    fn is_top(&self) -> bool {
        self.bounds.is_top() && self.eqs.is_empty()
    }

    fn to_constraints(&self) -> Vec<LinearConstraint> {
        if self.bounds.is_bottom() {
            return vec![LinearConstraint::ge(LinearExpr::constant(-1))];
        }
        let mut out: Vec<LinearConstraint> = self
            .eqs
            .rows()
            .iter()
            .map(|row| LinearConstraint::eq(row.clone()))
            .collect();
        for s in self.env.variables() {
            let i = self.interval_of(&s);
            let x = LinearExpr::var(s.clone());
            if let Some(c) = i.singleton() {
                let c = LinearConstraint::eq(x - LinearExpr::constant(c.clone()));
                if !out.contains(&c) {
                    out.push(c);
                }
                continue;
            }
            if let Some(lo) = i.lo() {
                out.push(LinearConstraint::ge(x.clone() - LinearExpr::constant(lo.clone())));
            }
            if let Some(hi) = i.hi() {
                out.push(LinearConstraint::ge(LinearExpr::constant(hi.clone()) - x));
            }
        }
        out
    }

    fn meet_constraints(&mut self, constraints: &[LinearConstraint]) {
        for c in constraints {
            self.add_constraint(c);
        }
    }

    fn satisfies(&self, constraint: &LinearConstraint) -> bool {
        if self.bounds.is_bottom() {
            return true;
        }
        let c = if constraint.expr.variables().all(|s| self.is_integral(s)) {
            constraint.tightened_for_ints()
        } else {
            constraint.clone()
        };
        let eqs = self.augmented_equalities();
        if c.kind == ConstraintKind::Eq && eqs.implies(&c.expr) {
            return true;
        }
        [c.expr.clone(), eqs.reduce(&c.expr)].iter().any(|e| {
            let range = self.eval(e);
            match c.kind {
                ConstraintKind::Ge => range.lo().map_or(false, |lo| !lo.is_negative()),
                ConstraintKind::Gt => range.lo().map_or(false, |lo| lo.is_positive()),
                ConstraintKind::Eq => range.singleton().map_or(false, |v| v.is_zero()),
            }
        })
    }

    fn can_join_precisely(&self, other: &Self) -> bool {
        if self.bounds.is_bottom() || other.bounds.is_bottom() {
            return true;
        }
        if self.leq(other) || other.leq(self) {
            return true;
        }
        let (mine, theirs) = match (self.bounds.bindings(), other.bounds.bindings()) {
            (Some(m), Some(t)) => (m, t),
            _ => return true,
        };
        let differing: Vec<Symbol> = mine
            .keys()
            .chain(theirs.keys())
            .filter(|s| self.interval_of(s) != other.interval_of(s))
            .cloned()
            .collect::<BTreeSet<Symbol>>()
            .into_iter()
            .collect();
        match differing.as_slice() {
            [] => self.eqs == other.eqs,
            [s] => {
                let same_relations = match (self.equalities_without(s), other.equalities_without(s)) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                };
                same_relations
                    && self.touching(
                        &self.interval_of(s),
                        &other.interval_of(s),
                        self.is_integral(s),
                    )
            }
            _ => false,
        }
    }
}

impl fmt::Display for LinearValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bounds.is_bottom() {
            write!(f, "_|_")
        } else if self.is_top() {
            write!(f, "T")
        } else {
            write!(f, "{{{}}}", itertools::join(self.to_constraints(), ", "))
        }
    }
}

/// Creates [`LinearValue`]s of one [`DomainKind`].
#[derive(Clone, Copy, Debug)]
pub struct LinearManager {
    kind: DomainKind,
}

impl LinearManager {
    pub fn new(kind: DomainKind) -> Self {
        Self { kind }
    }
}

impl DomainManager for LinearManager {
    type Value = LinearValue;

    fn kind(&self) -> DomainKind {
        self.kind
    }

    fn top(&self, env: &Environment) -> LinearValue {
        LinearValue::top(self.kind, env)
    }

    fn bottom(&self, env: &Environment) -> LinearValue {
        LinearValue::bottom(self.kind, env)
    }
}
