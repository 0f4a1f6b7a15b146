/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;
use std::sync::Arc;

use im::OrdSet;

/// A program variable tracked by the numerical domains.
pub type Symbol = Arc<str>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Int,
    Real,
    /// Pointers, aggregates and anything else the domains cannot represent.
    Untracked,
}

/// Decides the numeric kind of a host-IR value.
pub trait VariableKindClassifier {
    fn kind_of(&self, symbol: &Symbol) -> VariableKind;
}

/// The set of variables an abstract value is expressed over.
///
/// Both halves are persistent sets, so cloning an environment (which
/// every node and every abstract value does) is cheap.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Environment {
    ints: OrdSet<Symbol>,
    reals: OrdSet<Symbol>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ints<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let mut env = Self::new();
        for s in symbols {
            env.add(s.into(), VariableKind::Int);
        }
        env
    }

    /// Adds `symbol` with the given kind. Untracked symbols are skipped.
    /// Returns whether the environment grew.
    pub fn add(&mut self, symbol: Symbol, kind: VariableKind) -> bool {
        match kind {
            VariableKind::Int => {
                assert!(
                    !self.reals.contains(&symbol),
                    "{} is already tracked as a real",
                    symbol
                );
                self.ints.insert(symbol).is_none()
            }
            VariableKind::Real => {
                assert!(
                    !self.ints.contains(&symbol),
                    "{} is already tracked as an int",
                    symbol
                );
                self.reals.insert(symbol).is_none()
            }
            VariableKind::Untracked => false,
        }
    }

    pub fn with(mut self, symbol: impl Into<Symbol>, kind: VariableKind) -> Self {
        self.add(symbol.into(), kind);
        self
    }

    pub fn remove(&mut self, symbol: &Symbol) {
        self.ints.remove(symbol);
        self.reals.remove(symbol);
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.ints.contains(symbol) || self.reals.contains(symbol)
    }

    pub fn kind_of(&self, symbol: &Symbol) -> Option<VariableKind> {
        if self.ints.contains(symbol) {
            Some(VariableKind::Int)
        } else if self.reals.contains(symbol) {
            Some(VariableKind::Real)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.ints.len() + self.reals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.reals.is_empty()
    }

    pub fn ints(&self) -> impl Iterator<Item = &Symbol> {
        self.ints.iter()
    }

    pub fn reals(&self) -> impl Iterator<Item = &Symbol> {
        self.reals.iter()
    }

    /// All variables in symbol order, ints and reals merged.
    pub fn variables(&self) -> Vec<Symbol> {
        let mut vars: Vec<Symbol> = self.ints.iter().chain(self.reals.iter()).cloned().collect();
        vars.sort();
        vars
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.ints.is_subset(&other.ints) && self.reals.is_subset(&other.reals)
    }

    /// Least common environment. Panics if a symbol has different kinds
    /// on the two sides.
    pub fn union(&self, other: &Self) -> Self {
        let mut env = self.clone();
        for s in other.ints.iter() {
            env.add(s.clone(), VariableKind::Int);
        }
        for s in other.reals.iter() {
            env.add(s.clone(), VariableKind::Real);
        }
        env
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", itertools::join(self.variables(), ", "))
    }
}

/// Identifies the concrete numerical domain behind a manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DomainKind {
    /// Non-relational intervals.
    Interval,
    /// Intervals reduced with affine equalities between variables.
    IntervalEqualities,
}

/// The capability the fixpoint engine needs from a numerical domain.
///
/// Binary operations expect operands over compatible environments;
/// violating that is a programming error, not a recoverable failure.
pub trait AbstractValue: Clone + fmt::Debug + fmt::Display {
    type Constraint: Clone + fmt::Debug + fmt::Display + PartialEq;

    fn environment(&self) -> &Environment;

    fn set_top(&mut self, env: &Environment);

    fn set_bottom(&mut self, env: &Environment);

    /// Re-expresses the value over `env`. New variables are unconstrained,
    /// variables missing from `env` are projected out.
    fn change_environment(&mut self, env: &Environment);

    /// `self := self ⊔ values[0] ⊔ ...`, expressed over `env`.
    fn join_array(&mut self, env: &Environment, values: Vec<Self>);

    fn join_with(&mut self, other: &Self) {
        let env = self.environment().union(other.environment());
        self.join_array(&env, vec![other.clone()]);
    }

    fn meet_with(&mut self, other: &Self);

    /// `self := self ∇ next`, where `self` is the previous iterate.
    fn widen_with(&mut self, next: &Self);

    /// Widening that stops at the tightest threshold constraint still
    /// satisfied by both iterates.
    fn widen_with_thresholds(&mut self, next: &Self, thresholds: &[Self::Constraint]);

    fn narrow_with(&mut self, next: &Self);

    fn leq(&self, other: &Self) -> bool;

    fn equals(&self, other: &Self) -> bool {
        self.leq(other) && other.leq(self)
    }

    fn is_bottom(&self) -> bool;

    fn is_top(&self) -> bool;

    fn to_constraints(&self) -> Vec<Self::Constraint>;

    fn meet_constraints(&mut self, constraints: &[Self::Constraint]);

    fn satisfies(&self, constraint: &Self::Constraint) -> bool;

    /// Whether joining `other` into `self` loses no concrete state, i.e.
    /// the join is the exact union.
    fn can_join_precisely(&self, other: &Self) -> bool;
}

/// Factory for abstract values of one domain kind.
pub trait DomainManager {
    type Value: AbstractValue;

    fn kind(&self) -> DomainKind;

    fn top(&self, env: &Environment) -> Self::Value;

    fn bottom(&self, env: &Environment) -> Self::Value;

    fn new_abstract(&self, source: &Self::Value) -> Self::Value {
        source.clone()
    }
}
