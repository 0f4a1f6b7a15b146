/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::Signed;
use num_traits::Zero;

use crate::datatype::AbstractDomain;

/// Integer interval with optional infinite bounds.
///
/// `None` as a lower bound is -oo, `None` as an upper bound is +oo. An
/// empty range is always normalized to `Bottom`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Interval {
    Bottom,
    Range {
        lo: Option<BigInt>,
        hi: Option<BigInt>,
    },
}

fn lower_le(a: &Option<BigInt>, b: &Option<BigInt>) -> bool {
    match (a, b) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(x), Some(y)) => x <= y,
    }
}

fn upper_le(a: &Option<BigInt>, b: &Option<BigInt>) -> bool {
    match (a, b) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(x), Some(y)) => x <= y,
    }
}

fn add_bounds(a: &Option<BigInt>, b: &Option<BigInt>) -> Option<BigInt> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x + y),
        _ => None,
    }
}

pub fn div_ceil(a: &BigInt, b: &BigInt) -> BigInt {
    -((-a).div_floor(b))
}

impl Interval {
    pub fn new(lo: Option<BigInt>, hi: Option<BigInt>) -> Self {
        if let (Some(l), Some(h)) = (&lo, &hi) {
            if l > h {
                return Interval::Bottom;
            }
        }
        Interval::Range { lo, hi }
    }

    pub fn point(value: impl Into<BigInt>) -> Self {
        let v = value.into();
        Interval::Range {
            lo: Some(v.clone()),
            hi: Some(v),
        }
    }

    pub fn closed(lo: impl Into<BigInt>, hi: impl Into<BigInt>) -> Self {
        Self::new(Some(lo.into()), Some(hi.into()))
    }

    pub fn at_least(lo: impl Into<BigInt>) -> Self {
        Self::new(Some(lo.into()), None)
    }

    pub fn at_most(hi: impl Into<BigInt>) -> Self {
        Self::new(None, Some(hi.into()))
    }

    pub fn lo(&self) -> Option<&BigInt> {
        match self {
            Interval::Range { lo, .. } => lo.as_ref(),
            Interval::Bottom => None,
        }
    }

    pub fn hi(&self) -> Option<&BigInt> {
        match self {
            Interval::Range { hi, .. } => hi.as_ref(),
            Interval::Bottom => None,
        }
    }

    pub fn singleton(&self) -> Option<&BigInt> {
        match self {
            Interval::Range {
                lo: Some(l),
                hi: Some(h),
            } if l == h => Some(l),
            _ => None,
        }
    }

    pub fn contains(&self, value: &BigInt) -> bool {
        match self {
            Interval::Bottom => false,
            Interval::Range { lo, hi } => {
                lo.as_ref().map_or(true, |l| l <= value) && hi.as_ref().map_or(true, |h| value <= h)
            }
        }
    }

    pub fn add(&self, rhs: &Interval) -> Interval {
        match (self, rhs) {
            (Interval::Range { lo: l1, hi: h1 }, Interval::Range { lo: l2, hi: h2 }) => {
                Interval::new(add_bounds(l1, l2), add_bounds(h1, h2))
            }
            _ => Interval::Bottom,
        }
    }

    pub fn scale(&self, k: &BigInt) -> Interval {
        match self {
            Interval::Bottom => Interval::Bottom,
            Interval::Range { lo, hi } => match k.sign() {
                num_bigint::Sign::NoSign => Interval::point(0),
                num_bigint::Sign::Plus => Interval::new(
                    lo.as_ref().map(|l| l * k),
                    hi.as_ref().map(|h| h * k),
                ),
                num_bigint::Sign::Minus => Interval::new(
                    hi.as_ref().map(|h| h * k),
                    lo.as_ref().map(|l| l * k),
                ),
            },
        }
    }

    /// Range of `x` such that `k * x` lies in `self`. Bounds are rounded
    /// inwards when `x` is an integer and outwards otherwise.
    pub fn divide(&self, k: &BigInt, integral: bool) -> Interval {
        assert!(!k.is_zero(), "division of an interval by zero");
        let (lo, hi) = match self {
            Interval::Bottom => return Interval::Bottom,
            Interval::Range { lo, hi } => {
                if k.is_negative() {
                    (hi.as_ref().map(|h| -h), lo.as_ref().map(|l| -l))
                } else {
                    (lo.clone(), hi.clone())
                }
            }
        };
        let k = k.abs();
        let lo = lo.map(|l| if integral { div_ceil(&l, &k) } else { l.div_floor(&k) });
        let hi = hi.map(|h| if integral { h.div_floor(&k) } else { div_ceil(&h, &k) });
        Interval::new(lo, hi)
    }

    /// Widening that lands on the closest candidate bound instead of
    /// jumping straight to infinity.
    pub fn widen_with_candidates(&mut self, rhs: Interval, lower: &[BigInt], upper: &[BigInt]) {
        let (old_lo, old_hi, new_lo, new_hi) = match (&*self, &rhs) {
            (Interval::Bottom, _) => {
                *self = rhs;
                return;
            }
            (_, Interval::Bottom) => return,
            (Interval::Range { lo: l1, hi: h1 }, Interval::Range { lo: l2, hi: h2 }) => {
                (l1.clone(), h1.clone(), l2.clone(), h2.clone())
            }
        };
        let lo = if lower_le(&old_lo, &new_lo) {
            old_lo
        } else {
            lower
                .iter()
                .filter(|c| new_lo.as_ref().map_or(false, |n| *c <= n))
                .max()
                .cloned()
        };
        let hi = if upper_le(&new_hi, &old_hi) {
            old_hi
        } else {
            upper
                .iter()
                .filter(|c| new_hi.as_ref().map_or(false, |n| *c >= n))
                .min()
                .cloned()
        };
        *self = Interval::new(lo, hi);
    }
}

impl AbstractDomain for Interval {
    fn bottom() -> Self {
        Interval::Bottom
    }

    fn top() -> Self {
        Interval::Range { lo: None, hi: None }
    }

    fn is_bottom(&self) -> bool {
        matches!(self, Interval::Bottom)
    }

    fn is_top(&self) -> bool {
        matches!(self, Interval::Range { lo: None, hi: None })
    }

    fn leq(&self, rhs: &Self) -> bool {
        match (self, rhs) {
            (Interval::Bottom, _) => true,
            (_, Interval::Bottom) => false,
            (Interval::Range { lo: l1, hi: h1 }, Interval::Range { lo: l2, hi: h2 }) => {
                lower_le(l2, l1) && upper_le(h1, h2)
            }
        }
    }

    fn join_with(&mut self, rhs: Self) {
        match (&mut *self, rhs) {
            (_, Interval::Bottom) => {}
            (Interval::Bottom, rhs) => *self = rhs,
            (Interval::Range { lo: l1, hi: h1 }, Interval::Range { lo: l2, hi: h2 }) => {
                if !lower_le(l1, &l2) {
                    *l1 = l2;
                }
                if !upper_le(&h2, h1) {
                    *h1 = h2;
                }
            }
        }
    }

    fn meet_with(&mut self, rhs: Self) {
        let (lo, hi) = match (&*self, rhs) {
            (Interval::Bottom, _) => return,
            (_, Interval::Bottom) => {
                *self = Interval::Bottom;
                return;
            }
            (Interval::Range { lo: l1, hi: h1 }, Interval::Range { lo: l2, hi: h2 }) => {
                let lo = if lower_le(l1, &l2) { l2 } else { l1.clone() };
                let hi = if upper_le(h1, &h2) { h1.clone() } else { h2 };
                (lo, hi)
            }
        };
        *self = Interval::new(lo, hi);
    }

    fn widen_with(&mut self, rhs: Self) {
        self.widen_with_candidates(rhs, &[], &[]);
    }

    fn narrow_with(&mut self, rhs: Self) {
        let (lo, hi) = match (&*self, rhs) {
            (Interval::Bottom, _) => return,
            (_, Interval::Bottom) => {
                *self = Interval::Bottom;
                return;
            }
            (Interval::Range { lo: l1, hi: h1 }, Interval::Range { lo: l2, hi: h2 }) => (
                if l1.is_none() { l2 } else { l1.clone() },
                if h1.is_none() { h2 } else { h1.clone() },
            ),
        };
        *self = Interval::new(lo, hi);
    }
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.leq(other), other.leq(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Bottom => write!(f, "_|_"),
            Interval::Range { lo, hi } => {
                match lo {
                    Some(l) => write!(f, "[{}, ", l)?,
                    None => write!(f, "[-oo, ")?,
                }
                match hi {
                    Some(h) => write!(f, "{}]", h),
                    None => write!(f, "+oo]"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_range_is_bottom() {
        assert!(Interval::closed(3, 2).is_bottom());
        assert_eq!(Interval::closed(2, 2).singleton(), Some(&BigInt::from(2)));
    }

    #[test]
    fn test_widening_drops_unstable_bounds() {
        let mut i = Interval::point(0);
        i.widen_with(Interval::closed(0, 1));
        assert_eq!(i, Interval::at_least(0));

        let mut j = Interval::closed(0, 10);
        j.widen_with(Interval::closed(-1, 5));
        assert_eq!(j, Interval::at_most(10));
    }

    #[test]
    fn test_widening_with_candidates() {
        let mut i = Interval::point(0);
        let up = [BigInt::from(49), BigInt::from(100)];
        i.widen_with_candidates(Interval::closed(0, 1), &[], &up);
        assert_eq!(i, Interval::closed(0, 49));
        i.widen_with_candidates(Interval::closed(0, 50), &[], &up);
        assert_eq!(i, Interval::closed(0, 100));
        i.widen_with_candidates(Interval::closed(0, 101), &[], &up);
        assert_eq!(i, Interval::at_least(0));
    }

    #[test]
    fn test_narrowing_refines_infinite_bounds_only() {
        let mut i = Interval::at_least(0);
        i.narrow_with(Interval::closed(1, 50));
        assert_eq!(i, Interval::closed(0, 50));
    }

    #[test]
    fn test_division_rounding() {
        let i = Interval::closed(-3, 7);
        assert_eq!(i.divide(&BigInt::from(2), true), Interval::closed(-1, 3));
        assert_eq!(i.divide(&BigInt::from(2), false), Interval::closed(-2, 4));
        assert_eq!(i.divide(&BigInt::from(-2), true), Interval::closed(-3, 1));
    }

    #[test]
    fn test_scale_negative_swaps_bounds() {
        let i = Interval::at_least(2);
        assert_eq!(i.scale(&BigInt::from(-3)), Interval::at_most(-6));
    }
}
