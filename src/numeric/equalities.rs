/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::BTreeSet;

use num_bigint::BigInt;
use num_traits::Zero;

use crate::numeric::matrix;
use crate::numeric::matrix::Row;
use crate::numeric::LinearExpr;
use crate::value::Symbol;

/// A conjunction of affine equalities `e = 0` (Karr's domain).
///
/// Rows are kept in reduced echelon form over the symbol order, so two
/// systems describe the same affine space iff their rows are equal. An
/// unsatisfiable system is represented by the single row `1 = 0`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AffineEqualities {
    rows: Vec<LinearExpr>,
}

fn columns<'a>(exprs: impl Iterator<Item = &'a LinearExpr>) -> Vec<Symbol> {
    let set: BTreeSet<Symbol> = exprs.flat_map(|e| e.variables().cloned()).collect();
    set.into_iter().collect()
}

fn to_row(expr: &LinearExpr, cols: &[Symbol]) -> Row {
    let mut row: Row = cols.iter().map(|s| expr.coeff(s)).collect();
    row.push(expr.constant_term().clone());
    row
}

fn from_row(row: &[BigInt], cols: &[Symbol]) -> LinearExpr {
    let mut e = LinearExpr::constant(row[cols.len()].clone());
    for (s, c) in cols.iter().zip(row.iter()) {
        if !c.is_zero() {
            e.add_term(c.clone(), s.clone());
        }
    }
    e
}

impl AffineEqualities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsatisfiable() -> Self {
        Self {
            rows: vec![LinearExpr::constant(1)],
        }
    }

    fn from_unreduced(rows: Vec<LinearExpr>, order: &[Symbol]) -> Self {
        let ncols = order.len() + 1;
        let matrix: Vec<Row> = rows.iter().map(|e| to_row(e, order)).collect();
        let (reduced, pivots) = matrix::row_echelon(matrix, ncols);
        if pivots.last() == Some(&order.len()) {
            return Self::unsatisfiable();
        }
        Self {
            rows: reduced.iter().map(|r| from_row(r, order)).collect(),
        }
    }

    fn canonical(rows: Vec<LinearExpr>) -> Self {
        let cols = columns(rows.iter());
        Self::from_unreduced(rows, &cols)
    }

    pub fn rows(&self) -> &[LinearExpr] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_unsatisfiable(&self) -> bool {
        self.rows.len() == 1 && self.rows[0].is_constant() && !self.rows[0].constant_term().is_zero()
    }

    /// Conjoins `expr = 0`.
    pub fn add(&mut self, expr: LinearExpr) {
        self.extend(std::iter::once(expr));
    }

    pub fn extend(&mut self, exprs: impl IntoIterator<Item = LinearExpr>) {
        let mut rows = std::mem::take(&mut self.rows);
        rows.extend(exprs);
        *self = Self::canonical(rows);
    }

    pub fn meet(&self, other: &Self) -> Self {
        let mut rows = self.rows.clone();
        rows.extend(other.rows.iter().cloned());
        Self::canonical(rows)
    }

    /// Affine hull of the two spaces.
    pub fn join(&self, other: &Self) -> Self {
        if self.is_unsatisfiable() {
            return other.clone();
        }
        if other.is_unsatisfiable() {
            return self.clone();
        }
        let cols = columns(self.rows.iter().chain(other.rows.iter()));
        let ncols = cols.len() + 1;
        let a = self.rows.iter().map(|e| to_row(e, &cols)).collect();
        let b = other.rows.iter().map(|e| to_row(e, &cols)).collect();
        let rows = matrix::intersect_row_spaces(a, b, ncols)
            .iter()
            .map(|r| from_row(r, &cols))
            .collect();
        Self::canonical(rows)
    }

    /// Existentially quantifies `symbol`.
    pub fn project_out(&mut self, symbol: &Symbol) {
        if !self.rows.iter().any(|e| e.mentions(symbol)) {
            return;
        }
        let mut order = vec![symbol.clone()];
        order.extend(columns(self.rows.iter()).into_iter().filter(|s| s != symbol));
        let eliminated = Self::from_unreduced(std::mem::take(&mut self.rows), &order);
        let kept = eliminated
            .rows
            .into_iter()
            .filter(|e| !e.mentions(symbol))
            .collect();
        *self = Self::canonical(kept);
    }

    /// Applies the invertible assignment `symbol := expr`, where `expr`
    /// mentions `symbol` with a non-zero coefficient.
    pub fn substitute_invertible(&mut self, symbol: &Symbol, expr: &LinearExpr) {
        let a = expr.coeff(symbol);
        assert!(!a.is_zero(), "assignment to {} is not invertible", symbol);
        // old = (new - rest) / a, so each row b*old + r becomes
        // a*r + b*new - b*rest.
        let rest = expr.without(symbol);
        let rows = std::mem::take(&mut self.rows)
            .into_iter()
            .map(|row| {
                let b = row.coeff(symbol);
                if b.is_zero() {
                    row
                } else {
                    row.without(symbol).scale(&a) + LinearExpr::term(b.clone(), symbol.clone())
                        - rest.scale(&b)
                }
            })
            .collect();
        *self = Self::canonical(rows);
    }

    /// Whether `expr = 0` holds in every point of the space.
    pub fn implies(&self, expr: &LinearExpr) -> bool {
        if self.is_unsatisfiable() {
            return true;
        }
        let cols = columns(self.rows.iter().chain(std::iter::once(expr)));
        let matrix: Vec<Row> = self.rows.iter().map(|e| to_row(e, &cols)).collect();
        let (reduced, pivots) = matrix::row_echelon(matrix, cols.len() + 1);
        matrix::in_row_space(&reduced, &pivots, &to_row(expr, &cols))
    }

    /// Rewrites `expr` into a positive multiple of an expression equal to
    /// it on the space, with the leading variable of every row removed.
    pub fn reduce(&self, expr: &LinearExpr) -> LinearExpr {
        let mut e = expr.clone();
        for row in self.rows.iter() {
            let (pivot, p) = match row.terms().next() {
                Some((s, c)) => (s.clone(), c.clone()),
                None => continue,
            };
            let b = e.coeff(&pivot);
            if !b.is_zero() {
                // p > 0 keeps the sign of e.
                e = e.scale(&p) - row.scale(&b);
            }
        }
        e
    }
}
