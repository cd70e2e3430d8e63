/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

/// Integer helpers shared by every per-format assembly rule.
///
/// Dimension sizes are signed: a negative size is the "unknown
/// extent" sentinel and must survive arithmetic unchanged, so none
/// of these helpers treat a negative operand as an error.
pub mod arith {
    use crate::shape::UNKNOWN_DIM;

    /// Ceiling division over dimension sizes.
    ///
    /// ```text
    /// division_ceiling(a, b) = 0           if b <= 0
    /// division_ceiling(a, b) = -1          if a < 0
    /// division_ceiling(a, b) = ⌈a / b⌉     otherwise
    /// ```
    ///
    /// # Examples
    ///
    /// ```rust
    /// use format_transfer::utils::arith::division_ceiling;
    ///
    /// assert_eq!(division_ceiling(512, 16), 32);
    /// assert_eq!(division_ceiling(17, 16), 2);
    /// assert_eq!(division_ceiling(-1, 16), -1);
    /// assert_eq!(division_ceiling(7, 0), 0);
    /// ```
    pub fn division_ceiling(a: i64, b: i64) -> i64 {
        if b <= 0 {
            return 0;
        }
        if a < 0 {
            return UNKNOWN_DIM;
        }
        // `a + b - 1` cannot overflow for the tile widths used here,
        // but a caller-provided `b` can be large.
        match a.checked_add(b - 1) {
            Some(sum) => sum / b,
            None => a / b + i64::from(a % b != 0),
        }
    }

    /// Rounds `a` up to the next multiple of `unit`. Unknown sizes
    /// stay unknown; a zero unit leaves `a` unchanged.
    pub fn align_up(a: i64, unit: i64) -> Option<i64> {
        if a < 0 {
            return Some(UNKNOWN_DIM);
        }
        if unit <= 0 {
            return Some(a);
        }
        division_ceiling(a, unit).checked_mul(unit)
    }

    /// Overflow-checked product of two dimension-derived quantities.
    ///
    /// Returns `None` on overflow; callers turn that into a
    /// transform failure. If either operand is unknown the product is
    /// unknown.
    pub fn checked_dim_mul(a: i64, b: i64) -> Option<i64> {
        if a < 0 || b < 0 {
            return Some(UNKNOWN_DIM);
        }
        a.checked_mul(b)
    }

    /// Overflow-checked product of all `dims`, with the same unknown
    /// propagation as [`checked_dim_mul`].
    pub fn checked_dim_product(dims: &[i64]) -> Option<i64> {
        dims.iter()
            .try_fold(1i64, |acc, &d| checked_dim_mul(acc, d))
    }

    /// Greatest common divisor of two non-negative integers.
    pub fn gcd(a: i64, b: i64) -> i64 {
        let (mut a, mut b) = (a.abs(), b.abs());
        while b != 0 {
            (a, b) = (b, a % b);
        }
        a
    }

    /// Least common multiple. Zero if either operand is zero.
    pub fn lcm(a: i64, b: i64) -> Option<i64> {
        if a == 0 || b == 0 {
            return Some(0);
        }
        (a / gcd(a, b)).checked_mul(b)
    }
}
