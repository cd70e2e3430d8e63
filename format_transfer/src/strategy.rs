/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Property-based generators for formats, shapes and reshape types.
//!
//! The main entry point is [`gen_origin_shape`], which generates a
//! low-rank shape in an origin layout together with a valid reshape
//! type naming its axes.
//!
//! This module is only included in test builds (`#[cfg(test)]`).

use proptest::prelude::*;

use crate::axis::axis_names;
use crate::format::PrimaryFormat;
use crate::shape::Shape;
use crate::shape::UNKNOWN_DIM;

/// Any origin layout, ND included.
pub fn gen_origin_format() -> impl Strategy<Value = PrimaryFormat> {
    prop::sample::select(
        PrimaryFormat::all()
            .filter(|format| format.is_origin())
            .collect::<Vec<_>>(),
    )
}

/// Any primary layout.
pub fn gen_format() -> impl Strategy<Value = PrimaryFormat> {
    prop::sample::select(PrimaryFormat::all().collect::<Vec<_>>())
}

/// A dimension size, occasionally unknown.
pub fn gen_dim() -> impl Strategy<Value = i64> {
    prop_oneof![
        9 => 1i64..=64,
        1 => Just(UNKNOWN_DIM),
    ]
}

/// A shape of `rank` dims drawn from [`gen_dim`].
pub fn gen_shape(rank: usize) -> impl Strategy<Value = Shape> {
    prop::collection::vec(gen_dim(), rank).prop_map(Shape::new)
}

/// A triple `(origin, shape, reshape_type)` where `shape` is below
/// the full rank of `origin` (and not scalar), and `reshape_type` is
/// a valid reshape type with one letter per dim.
pub fn gen_origin_shape() -> impl Strategy<Value = (PrimaryFormat, Shape, String)> {
    gen_origin_format().prop_flat_map(|origin| {
        let letters: Vec<char> = axis_names(origin)
            .unwrap_or_default()
            .iter()
            .filter_map(|axis| axis.letter())
            .collect();
        let full = letters.len();
        (1..full)
            .prop_flat_map(move |rank| {
                (
                    Just(origin),
                    gen_shape(rank),
                    prop::sample::subsequence(letters.clone(), rank),
                )
            })
            .prop_map(|(origin, shape, letters)| (origin, shape, letters.into_iter().collect()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::full_size;
    use crate::expand::is_valid_reshape_type;

    proptest! {
        #[test]
        fn test_gen_origin_shape((origin, shape, reshape_type) in gen_origin_shape()) {
            let full = full_size(origin).unwrap();
            prop_assert!(shape.rank() >= 1 && shape.rank() < full);
            prop_assert_eq!(reshape_type.len(), shape.rank());
            prop_assert!(is_valid_reshape_type(origin, &reshape_type));
        }
    }
}
