// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Equidistant sample tables backing the TABLE family of functions.
//! Linear lookup works on the normalized position of the argument within
//! the declared range; the polynomial variant (TABPL) evaluates the
//! Newton form over precomputed divided-difference coefficients.

use crate::common::{approx, Result};
use crate::{model_err, parse_err};

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub data: Vec<f64>,
    /// Divided-difference coefficients a_j = f[x_0..x_j] over the
    /// normalized, equidistant sample points x_i = i/(n-1).
    a: Vec<f64>,
}

impl Table {
    pub fn new(data: Vec<f64>) -> Result<Table> {
        let n = data.len();
        if n < 2 {
            return parse_err!(TableTooSmall, "{} elements", n);
        }
        let step = 1.0 / (n - 1) as f64;
        // order-k divided differences, keeping the leading one per order
        let mut a = Vec::with_capacity(n);
        let mut dd = data.clone();
        a.push(dd[0]);
        for k in 1..n {
            for m in 0..n - k {
                dd[m] = (dd[m + 1] - dd[m]) / (k as f64 * step);
            }
            a.push(dd[0]);
        }
        Ok(Table { data, a })
    }

    /// The argument triple of a table call must describe exactly the
    /// sample count the table was declared with.
    pub fn check_bounds(&self, min: f64, max: f64, step: f64) -> Result<()> {
        let n = self.data.len();
        if !approx(max - min, (n - 1) as f64 * step) {
            return model_err!(
                WrongTableSize,
                "{} samples do not cover [{}, {}] at step {}",
                n,
                min,
                max,
                step
            );
        }
        Ok(())
    }

    /// Linear interpolation of `x` over `[min, max]`. Outside the range
    /// the boundary sample is returned, or the linear continuation of
    /// the boundary segment when `extrapolate` is set (TABXT).
    pub fn linear(&self, x: f64, min: f64, max: f64, extrapolate: bool) -> f64 {
        let n = self.data.len();
        let last = n - 1;
        let u = (x - min) / (max - min) * last as f64;
        let idx = u.floor() as isize;
        if idx < 0 {
            if extrapolate {
                self.data[0] + (self.data[1] - self.data[0]) * u
            } else {
                self.data[0]
            }
        } else if idx >= last as isize {
            if extrapolate {
                self.data[last] + (self.data[last] - self.data[last - 1]) * (u - last as f64)
            } else {
                self.data[last]
            }
        } else {
            let idx = idx as usize;
            let frac = u - idx as f64;
            self.data[idx] + (self.data[idx + 1] - self.data[idx]) * frac
        }
    }

    /// Newton polynomial interpolation at the normalized position
    /// `u` in `[0, 1]`.
    pub fn newton(&self, u: f64) -> f64 {
        let n = self.a.len();
        let step = 1.0 / (n - 1) as f64;
        let mut y = 0.0;
        let mut basis = 1.0;
        for (j, a_j) in self.a.iter().enumerate() {
            y += a_j * basis;
            basis *= u - j as f64 * step;
        }
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;

    const PNTS: [f64; 6] = [0.0, 2.8, 5.5, 8.0, 9.5, 10.0];

    #[test]
    fn test_too_small() {
        assert!(Table::new(vec![1.0])
            .unwrap_err()
            .is_a(ErrorCode::TableTooSmall));
        assert!(Table::new(vec![1.0, 2.0]).is_ok());
    }

    #[test]
    fn test_linear_hits_samples() {
        let tbl = Table::new(PNTS.to_vec()).unwrap();
        for (i, want) in PNTS.iter().enumerate() {
            let x = i as f64 * 0.2;
            let got = tbl.linear(x, 0.0, 1.0, false);
            assert!((got - want).abs() < 1e-9, "x={}: {} != {}", x, got, want);
        }
    }

    #[test]
    fn test_linear_midpoint() {
        let tbl = Table::new(vec![0.0, 10.0]).unwrap();
        assert!((tbl.linear(0.5, 0.0, 1.0, false) - 5.0).abs() < 1e-9);
        // range not starting at zero
        assert!((tbl.linear(15.0, 10.0, 20.0, false) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_clamps() {
        let tbl = Table::new(PNTS.to_vec()).unwrap();
        assert!((tbl.linear(-0.1, 0.0, 1.0, false) - 0.0).abs() < 1e-9);
        assert!((tbl.linear(1.5, 0.0, 1.0, false) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_extrapolates() {
        let tbl = Table::new(vec![0.0, 2.0, 4.0]).unwrap();
        // slope continues past both ends
        assert!((tbl.linear(-0.5, 0.0, 1.0, true) - -2.0).abs() < 1e-9);
        assert!((tbl.linear(1.5, 0.0, 1.0, true) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_newton_hits_samples() {
        let tbl = Table::new(PNTS.to_vec()).unwrap();
        for (i, want) in PNTS.iter().enumerate() {
            let u = i as f64 / 5.0;
            let got = tbl.newton(u);
            assert!((got - want).abs() < 1e-9, "u={}: {} != {}", u, got, want);
        }
    }

    #[test]
    fn test_check_bounds() {
        let tbl = Table::new(PNTS.to_vec()).unwrap();
        assert!(tbl.check_bounds(0.0, 1.0, 0.2).is_ok());
        assert!(tbl
            .check_bounds(0.0, 1.0, 0.5)
            .unwrap_err()
            .is_a(ErrorCode::WrongTableSize));
    }
}
