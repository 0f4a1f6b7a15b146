/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Add;
use std::ops::Neg;
use std::ops::Sub;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::One;
use num_traits::Signed;
use num_traits::Zero;

use crate::value::Symbol;

/// `Σ a_i * x_i + c` with exact integer coefficients. Zero coefficients
/// are never stored, so structural equality is semantic equality.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LinearExpr {
    coeffs: BTreeMap<Symbol, BigInt>,
    constant: BigInt,
}

impl LinearExpr {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(c: impl Into<BigInt>) -> Self {
        Self {
            coeffs: BTreeMap::new(),
            constant: c.into(),
        }
    }

    pub fn var(symbol: impl Into<Symbol>) -> Self {
        Self::term(1, symbol)
    }

    pub fn term(coeff: impl Into<BigInt>, symbol: impl Into<Symbol>) -> Self {
        let mut e = Self::zero();
        e.add_term(coeff.into(), symbol.into());
        e
    }

    pub fn add_term(&mut self, coeff: BigInt, symbol: Symbol) {
        let entry = self.coeffs.entry(symbol).or_insert_with(BigInt::zero);
        *entry += coeff;
        if entry.is_zero() {
            self.coeffs.retain(|_, c| !c.is_zero());
        }
    }

    pub fn coeff(&self, symbol: &Symbol) -> BigInt {
        self.coeffs.get(symbol).cloned().unwrap_or_default()
    }

    pub fn constant_term(&self) -> &BigInt {
        &self.constant
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Symbol, &BigInt)> {
        self.coeffs.iter()
    }

    pub fn variables(&self) -> impl Iterator<Item = &Symbol> {
        self.coeffs.keys()
    }

    pub fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn mentions(&self, symbol: &Symbol) -> bool {
        self.coeffs.contains_key(symbol)
    }

    pub fn scale(&self, k: &BigInt) -> Self {
        if k.is_zero() {
            return Self::zero();
        }
        Self {
            coeffs: self.coeffs.iter().map(|(s, c)| (s.clone(), c * k)).collect(),
            constant: &self.constant * k,
        }
    }

    /// The expression without the `symbol` term.
    pub fn without(&self, symbol: &Symbol) -> Self {
        let mut e = self.clone();
        e.coeffs.remove(symbol);
        e
    }

    /// Replaces `symbol` by `replacement`.
    pub fn substitute(&self, symbol: &Symbol, replacement: &LinearExpr) -> Self {
        match self.coeffs.get(symbol) {
            None => self.clone(),
            Some(c) => self.without(symbol) + replacement.scale(c),
        }
    }

    /// Gcd of the variable coefficients, zero for a constant expression.
    pub fn content(&self) -> BigInt {
        self.coeffs
            .values()
            .fold(BigInt::zero(), |g, c| g.gcd(c))
    }
}

impl Add for LinearExpr {
    type Output = LinearExpr;

    fn add(mut self, rhs: LinearExpr) -> LinearExpr {
        for (s, c) in rhs.coeffs {
            self.add_term(c, s);
        }
        self.constant += rhs.constant;
        self
    }
}

impl Sub for LinearExpr {
    type Output = LinearExpr;

    fn sub(self, rhs: LinearExpr) -> LinearExpr {
        self + (-rhs)
    }
}

impl Neg for LinearExpr {
    type Output = LinearExpr;

    fn neg(self) -> LinearExpr {
        Self {
            coeffs: self.coeffs.into_iter().map(|(s, c)| (s, -c)).collect(),
            constant: -self.constant,
        }
    }
}

impl fmt::Display for LinearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (s, c) in self.coeffs.iter() {
            if c.is_negative() {
                write!(f, "-")?;
            } else if !first {
                write!(f, "+")?;
            }
            let abs = c.abs();
            if !abs.is_one() {
                write!(f, "{}", abs)?;
            }
            write!(f, "{}", s)?;
            first = false;
        }
        if first {
            write!(f, "{}", self.constant)
        } else if self.constant.is_negative() {
            write!(f, "{}", self.constant)
        } else if self.constant.is_positive() {
            write!(f, "+{}", self.constant)
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// `expr >= 0`
    Ge,
    /// `expr = 0`
    Eq,
    /// `expr > 0`
    Gt,
}

/// `expr (>= | = | >) 0`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LinearConstraint {
    pub expr: LinearExpr,
    pub kind: ConstraintKind,
}

impl LinearConstraint {
    pub fn new(expr: LinearExpr, kind: ConstraintKind) -> Self {
        Self { expr, kind }
    }

    pub fn ge(expr: LinearExpr) -> Self {
        Self::new(expr, ConstraintKind::Ge)
    }

    pub fn eq(expr: LinearExpr) -> Self {
        Self::new(expr, ConstraintKind::Eq)
    }

    pub fn gt(expr: LinearExpr) -> Self {
        Self::new(expr, ConstraintKind::Gt)
    }

    /// `lhs <= rhs`
    pub fn le(lhs: LinearExpr, rhs: LinearExpr) -> Self {
        Self::ge(rhs - lhs)
    }

    /// `lhs < rhs`
    pub fn lt(lhs: LinearExpr, rhs: LinearExpr) -> Self {
        Self::gt(rhs - lhs)
    }

    /// `lhs >= rhs`
    pub fn at_least(lhs: LinearExpr, rhs: LinearExpr) -> Self {
        Self::ge(lhs - rhs)
    }

    /// `lhs = rhs`
    pub fn equal(lhs: LinearExpr, rhs: LinearExpr) -> Self {
        Self::eq(lhs - rhs)
    }

    /// The convex complement, if there is one: `!(e >= 0)` is `-e > 0`
    /// and `!(e > 0)` is `-e >= 0`. Disequalities are not convex.
    pub fn negated(&self) -> Option<Self> {
        match self.kind {
            ConstraintKind::Ge => Some(Self::gt(-self.expr.clone())),
            ConstraintKind::Gt => Some(Self::ge(-self.expr.clone())),
            ConstraintKind::Eq => None,
        }
    }

    /// Tightens the constraint assuming every variable is an integer:
    /// strict inequalities become non-strict and the coefficients are
    /// divided by their gcd, flooring the constant.
    pub fn tightened_for_ints(&self) -> Self {
        let mut expr = self.expr.clone();
        let mut kind = self.kind;
        if kind == ConstraintKind::Gt {
            expr = expr - LinearExpr::constant(1);
            kind = ConstraintKind::Ge;
        }
        let g = expr.content();
        if g.is_zero() || g.is_one() {
            return Self::new(expr, kind);
        }
        match kind {
            ConstraintKind::Ge => {
                let constant = expr.constant.div_floor(&g);
                let coeffs = expr.coeffs.into_iter().map(|(s, c)| (s, c / &g)).collect();
                Self::new(LinearExpr { coeffs, constant }, kind)
            }
            _ => {
                if (&expr.constant % &g).is_zero() {
                    let constant = &expr.constant / &g;
                    let coeffs = expr.coeffs.into_iter().map(|(s, c)| (s, c / &g)).collect();
                    Self::new(LinearExpr { coeffs, constant }, kind)
                } else {
                    // No integer solution.
                    Self::ge(LinearExpr::constant(-1))
                }
            }
        }
    }

    /// Truth value of a constraint without variables.
    pub fn constant_truth(&self) -> Option<bool> {
        if !self.expr.is_constant() {
            return None;
        }
        let c = &self.expr.constant;
        Some(match self.kind {
            ConstraintKind::Ge => !c.is_negative(),
            ConstraintKind::Eq => c.is_zero(),
            ConstraintKind::Gt => c.is_positive(),
        })
    }
}

impl fmt::Display for LinearConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.kind {
            ConstraintKind::Ge => ">=",
            ConstraintKind::Eq => "=",
            ConstraintKind::Gt => ">",
        };
        write!(f, "{} {} 0", self.expr, op)
    }
}
