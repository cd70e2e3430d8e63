/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::axis::Axis;
use crate::axis::AxisValue;
use crate::axis::FormatIndex;
use crate::axis::format_index;
use crate::format::PrimaryFormat;
use crate::shape::ExtAxisValue;
use crate::shape::Shape;
use crate::utils::arith::division_ceiling;

mod sealed {
    // Implemented only by the readers in this module.
    pub trait Sealed {}
}

/// A reader of the semantic axis values that packed-layout assembly
/// rules consume.
///
/// Two readers exist. [`AxisValue`] stages every axis from a
/// full-rank shape through [`crate::axis::decode`]; [`FormatIndexed`]
/// reads them lazily out of a shape at the positions given by the
/// origin layout's [`FormatIndex`]. Assembly rules are generic over
/// this trait, so both readers produce the same packed shape for the
/// same logical tensor.
pub trait AxisSource: sealed::Sealed {
    fn n(&self) -> i64;
    fn c(&self) -> i64;
    fn h(&self) -> i64;
    fn w(&self) -> i64;

    /// Depth; 1 for 4D layouts.
    fn d(&self) -> i64;

    fn c0(&self) -> i64;

    /// `ceil(C, C0)`, or -1 when C is unknown.
    fn c1(&self) -> i64;

    fn co(&self) -> i64;

    /// Recurrent-network sizes.
    fn ext(&self) -> ExtAxisValue;

    /// The per-gate hidden size of an LSTM weight, N / 4.
    fn lstm_hidden(&self) -> i64 {
        let n = self.n();
        if n < 0 { -1 } else { n / 4 }
    }
}

impl sealed::Sealed for AxisValue {}

impl AxisSource for AxisValue {
    fn n(&self) -> i64 {
        self[Axis::N]
    }

    fn c(&self) -> i64 {
        self[Axis::C]
    }

    fn h(&self) -> i64 {
        self[Axis::H]
    }

    fn w(&self) -> i64 {
        self[Axis::W]
    }

    fn d(&self) -> i64 {
        self[Axis::D]
    }

    fn c0(&self) -> i64 {
        self[Axis::C0]
    }

    fn c1(&self) -> i64 {
        self[Axis::C1]
    }

    fn co(&self) -> i64 {
        self[Axis::Co]
    }

    fn ext(&self) -> ExtAxisValue {
        AxisValue::ext(self)
    }

    fn lstm_hidden(&self) -> i64 {
        let n = self[Axis::N];
        if n < 0 { -1 } else { n >> 2 }
    }
}

/// Axis values read straight out of a shape through a
/// [`FormatIndex`].
#[derive(Debug, Clone, Copy)]
pub struct FormatIndexed<'a> {
    shape: &'a Shape,
    index: FormatIndex,
    c0: i64,
    ext: ExtAxisValue,
}

impl<'a> FormatIndexed<'a> {
    /// A reader over `shape` laid out as `format`. Returns `None`
    /// when `format` is not an origin layout or `shape` is too short
    /// to hold every indexed axis.
    pub fn new(
        format: PrimaryFormat,
        shape: &'a Shape,
        c0: i64,
        ext: ExtAxisValue,
    ) -> Option<Self> {
        let index = format_index(format)?;
        let highest = [index.n, index.c, index.h, index.w]
            .into_iter()
            .chain(index.d)
            .max()?;
        (highest < shape.rank()).then_some(Self {
            shape,
            index,
            c0,
            ext,
        })
    }

    pub fn format_index(&self) -> FormatIndex {
        self.index
    }
}

impl sealed::Sealed for FormatIndexed<'_> {}

impl AxisSource for FormatIndexed<'_> {
    fn n(&self) -> i64 {
        self.shape[self.index.n]
    }

    fn c(&self) -> i64 {
        self.shape[self.index.c]
    }

    fn h(&self) -> i64 {
        self.shape[self.index.h]
    }

    fn w(&self) -> i64 {
        self.shape[self.index.w]
    }

    fn d(&self) -> i64 {
        self.index.d.map_or(1, |d| self.shape[d])
    }

    fn c0(&self) -> i64 {
        self.c0
    }

    fn c1(&self) -> i64 {
        division_ceiling(self.c(), self.c0)
    }

    fn co(&self) -> i64 {
        self.c0
    }

    fn ext(&self) -> ExtAxisValue {
        self.ext
    }
}
