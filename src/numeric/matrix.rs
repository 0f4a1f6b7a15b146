/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Exact linear algebra over the integers.
//!
//! Rows are kept primitive (gcd 1) and eliminated fraction-free, so the
//! reduced form of a row space is canonical: two matrices span the same
//! rational row space iff their reduced forms are identical.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::One;
use num_traits::Signed;
use num_traits::Zero;

pub type Row = Vec<BigInt>;

fn make_primitive(row: &mut Row) {
    let g = row.iter().fold(BigInt::zero(), |g, x| g.gcd(x));
    if !g.is_zero() && !g.is_one() {
        for x in row.iter_mut() {
            *x = &*x / &g;
        }
    }
}

/// Reduced row echelon form. Every pivot is positive and is the only
/// non-zero entry of its column; zero rows are dropped. Returns the
/// reduced rows and the pivot column of each row.
pub fn row_echelon(rows: Vec<Row>, ncols: usize) -> (Vec<Row>, Vec<usize>) {
    let mut m = rows;
    let mut pivots = Vec::new();
    let mut r = 0;
    for c in 0..ncols {
        if r == m.len() {
            break;
        }
        let p = match (r..m.len()).find(|&p| !m[p][c].is_zero()) {
            Some(p) => p,
            None => continue,
        };
        m.swap(r, p);
        if m[r][c].is_negative() {
            for x in m[r].iter_mut() {
                *x = -&*x;
            }
        }
        make_primitive(&mut m[r]);
        let pivot_row = m[r].clone();
        let a = &pivot_row[c];
        for (i, row) in m.iter_mut().enumerate() {
            if i == r || row[c].is_zero() {
                continue;
            }
            let b = row[c].clone();
            for k in 0..ncols {
                row[k] = a * &row[k] - &b * &pivot_row[k];
            }
            make_primitive(row);
        }
        pivots.push(c);
        r += 1;
    }
    m.truncate(r);
    (m, pivots)
}

/// A basis of `{ v | rows * v = 0 }`, one vector per free column.
pub fn null_space(rows: Vec<Row>, ncols: usize) -> Vec<Row> {
    let (reduced, pivots) = row_echelon(rows, ncols);
    let mut basis = Vec::new();
    for f in (0..ncols).filter(|c| !pivots.contains(c)) {
        let mut l = BigInt::one();
        for (i, &pc) in pivots.iter().enumerate() {
            if !reduced[i][f].is_zero() {
                l = l.lcm(&reduced[i][pc]);
            }
        }
        let mut v = vec![BigInt::zero(); ncols];
        for (i, &pc) in pivots.iter().enumerate() {
            if !reduced[i][f].is_zero() {
                v[pc] = -(&reduced[i][f]) * (&l / &reduced[i][pc]);
            }
        }
        v[f] = l;
        make_primitive(&mut v);
        basis.push(v);
    }
    basis
}

/// Canonical basis of the intersection of two row spaces.
pub fn intersect_row_spaces(a: Vec<Row>, b: Vec<Row>, ncols: usize) -> Vec<Row> {
    let mut orthogonal = null_space(a, ncols);
    orthogonal.extend(null_space(b, ncols));
    let basis = null_space(orthogonal, ncols);
    row_echelon(basis, ncols).0
}

/// Whether `row` lies in the row space of `reduced`, which must be in
/// [`row_echelon`] form with the given pivots.
pub fn in_row_space(reduced: &[Row], pivots: &[usize], row: &[BigInt]) -> bool {
    let mut r: Row = row.to_vec();
    for (i, &pc) in pivots.iter().enumerate() {
        if r[pc].is_zero() {
            continue;
        }
        let a = &reduced[i][pc];
        let b = r[pc].clone();
        for k in 0..r.len() {
            r[k] = a * &r[k] - &b * &reduced[i][k];
        }
    }
    r.iter().all(Zero::is_zero)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(xs: &[i64]) -> Row {
        xs.iter().map(|&x| BigInt::from(x)).collect()
    }

    #[test]
    fn test_row_echelon_is_canonical() {
        let (a, pa) = row_echelon(vec![row(&[2, 4, 6]), row(&[1, 1, 1])], 3);
        let (b, pb) = row_echelon(vec![row(&[3, 3, 3]), row(&[0, -1, -2])], 3);
        assert_eq!(a, b);
        assert_eq!(pa, pb);
        assert_eq!(a, vec![row(&[1, 0, -1]), row(&[0, 1, 2])]);
    }

    #[test]
    fn test_null_space() {
        let basis = null_space(vec![row(&[1, -2, 0])], 3);
        assert_eq!(basis.len(), 2);
        for v in basis.iter() {
            assert_eq!(&v[0] - BigInt::from(2) * &v[1], BigInt::zero());
        }
        assert_eq!(null_space(vec![], 2), vec![row(&[1, 0]), row(&[0, 1])]);
    }

    #[test]
    fn test_intersection_of_points_is_the_line_through_them() {
        // Columns (i, x, 1). {i = 0, x = 0} and {i = 1, x = 2}.
        let a = vec![row(&[1, 0, 0]), row(&[0, 1, 0])];
        let b = vec![row(&[1, 0, -1]), row(&[0, 1, -2])];
        let joined = intersect_row_spaces(a, b, 3);
        // x - 2i = 0
        assert_eq!(joined, vec![row(&[2, -1, 0])]);
    }

    #[test]
    fn test_membership() {
        let (m, p) = row_echelon(vec![row(&[1, 0, -1]), row(&[0, 1, 2])], 3);
        assert!(in_row_space(&m, &p, &row(&[2, 3, 4])));
        assert!(!in_row_space(&m, &p, &row(&[0, 0, 1])));
    }
}
