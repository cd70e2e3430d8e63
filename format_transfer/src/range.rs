/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Range-valued transfer for dynamic shapes.
//!
//! A dynamic tensor carries a `(low, high)` pair per dimension. Its
//! packed ranges are the packed shapes of the vector of lows and of
//! the vector of highs, zipped back together. Bounds are not required
//! to be ordered.

use itertools::izip;
use serde::Deserialize;
use serde::Serialize;

use crate::expand::expand_dimension;
use crate::format::DataType;
use crate::format::Format;
use crate::format::PrimaryFormat;
use crate::shape::ExtAxisValue;
use crate::shape::Shape;
use crate::transfer::ShapeTransfer;
use crate::transfer::TransferError;

/// The inclusive extent of one dynamic dimension.
pub type DimRange = (i64, i64);

/// Errors that can occur while transferring ranges.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RangeError {
    #[error("expected at least {min} ranges, got {got}")]
    TooFewRanges { min: usize, got: usize },

    #[error("{lows} lower bounds but {highs} upper bounds")]
    BoundCountMismatch { lows: usize, highs: usize },

    #[error("shape {shape} has rank {rank}, but {ranges} ranges were given")]
    RankMismatch {
        shape: Shape,
        rank: usize,
        ranges: usize,
    },

    #[error("lower bounds became {lows} dims but upper bounds became {highs}")]
    DivergedBounds { lows: usize, highs: usize },

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Checks that `lows` and `highs` pair up and hold at least `min`
/// bounds each.
pub fn check_param_value(lows: &[i64], highs: &[i64], min: usize) -> Result<(), RangeError> {
    if lows.len() != highs.len() {
        return Err(RangeError::BoundCountMismatch {
            lows: lows.len(),
            highs: highs.len(),
        });
    }
    if lows.len() < min {
        return Err(RangeError::TooFewRanges {
            min,
            got: lows.len(),
        });
    }
    Ok(())
}

fn zip_bounds(lows: &Shape, highs: &Shape) -> Result<Vec<DimRange>, RangeError> {
    if lows.rank() != highs.rank() {
        return Err(RangeError::DivergedBounds {
            lows: lows.rank(),
            highs: highs.rank(),
        });
    }
    Ok(izip!(lows.dims(), highs.dims())
        .map(|(&low, &high)| (low, high))
        .collect())
}

fn unzip_bounds(ranges: &[DimRange]) -> (Shape, Shape) {
    let (lows, highs): (Vec<i64>, Vec<i64>) = ranges.iter().copied().unzip();
    (Shape::new(lows), Shape::new(highs))
}

/// Pads `ranges` the way [`expand_dimension`] pads a shape, bound by
/// bound. Padded positions get the range `(1, 1)`.
pub fn expand_range_dimension(
    origin: PrimaryFormat,
    dst: PrimaryFormat,
    reshape_type: &str,
    ranges: &[DimRange],
) -> Result<Vec<DimRange>, RangeError> {
    let (lows, highs) = unzip_bounds(ranges);
    zip_bounds(
        &expand_dimension(origin, dst, reshape_type, &lows),
        &expand_dimension(origin, dst, reshape_type, &highs),
    )
}

/// A dynamic tensor to transfer: its origin ranges in, its packed
/// ranges out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeAndFormat {
    pub shape: Shape,
    pub ranges: Vec<DimRange>,
    pub origin_format: Format,
    pub format: Format,
    pub dtype: DataType,
    #[serde(default)]
    pub ext: ExtAxisValue,
    #[serde(default)]
    pub reshape_type: Option<String>,
    /// The packed ranges; written only on success.
    #[serde(default)]
    pub new_ranges: Vec<DimRange>,
}

impl RangeAndFormat {
    pub fn new(
        shape: Shape,
        ranges: Vec<DimRange>,
        origin_format: Format,
        format: Format,
        dtype: DataType,
    ) -> Self {
        Self {
            shape,
            ranges,
            origin_format,
            format,
            dtype,
            ext: ExtAxisValue::default(),
            reshape_type: None,
            new_ranges: Vec::new(),
        }
    }
}

impl ShapeTransfer<'_> {
    /// Fills `info.new_ranges` with the packed form of `info.ranges`.
    ///
    /// An empty range list, or a shape of unknown rank, passes
    /// through unchanged.
    pub fn get_range_according_to_format(
        &self,
        info: &mut RangeAndFormat,
    ) -> Result<(), RangeError> {
        if info.ranges.is_empty() || info.shape.is_unknown_rank() {
            info.new_ranges = info.ranges.clone();
            return Ok(());
        }
        if info.ranges.len() != info.shape.rank() {
            return Err(RangeError::RankMismatch {
                shape: info.shape.clone(),
                rank: info.shape.rank(),
                ranges: info.ranges.len(),
            });
        }
        let (lows, highs) = unzip_bounds(&info.ranges);
        let transfer_bound = |bound: &Shape| {
            self.transfer_shape(
                info.origin_format,
                info.format,
                info.dtype,
                &info.ext,
                bound,
                info.reshape_type.as_deref(),
            )
        };
        let new_ranges = zip_bounds(&transfer_bound(&lows)?, &transfer_bound(&highs)?)?;
        tracing::debug!(
            "ranges {:?} of {} became {:?} in {}",
            info.ranges,
            info.origin_format,
            new_ranges,
            info.format
        );
        info.new_ranges = new_ranges;
        Ok(())
    }
}
