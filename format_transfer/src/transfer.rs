/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Logical-to-packed shape transfer.
//!
//! [`ShapeTransfer`] maps a shape in an origin layout to the shape of
//! the same tensor in a packed layout. Every call is classified into
//! one of four [`Strategy`] values:
//!
//! - `NdToNd`: same primary layout on both sides, identity;
//! - `NdToNz`: FRACTAL_NZ destinations, which tile the two trailing
//!   dims whatever the origin is;
//! - `FullSize`: the shape has the origin's full rank and its axes
//!   are staged in an [`AxisValue`];
//! - `NotFullSize`: the shape is padded up to full rank first and
//!   its axes are read in place through a [`FormatIndex`].
//!
//! The last two produce the same packed shape for the same logical
//! tensor: assembly rules are written once, generically over
//! [`AxisSource`].
//!
//! Situations where no transfer applies (no rule for the destination,
//! a recurrent weight whose K axis matches no decomposition, a scalar)
//! succeed and return the input unchanged.
//!
//! [`FormatIndex`]: crate::axis::FormatIndex
//! [`AxisSource`]: crate::layout::AxisSource

use serde::Deserialize;
use serde::Serialize;

use crate::axis::AxisError;
use crate::axis::AxisValue;
use crate::axis::decode;
use crate::expand::expand_dimension;
use crate::expand::full_size;
use crate::format::DataType;
use crate::format::Format;
use crate::format::FormatError;
use crate::format::PrimaryFormat;
use crate::layout::FormatIndexed;
use crate::shape::ExtAxisValue;
use crate::shape::Shape;
use crate::tiling;
use crate::tiling::TilingTable;

mod rules;

pub use rules::CUBE_TILE;
pub use rules::GroupEnlarge;
pub use rules::group_enlarge;

/// A dimension product left the `i64` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("dimension arithmetic overflow")]
pub struct DimOverflow;

/// Errors that can occur while transferring a shape.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransferError {
    #[error("cannot transfer from {origin} to {format}: {origin} is not an origin format")]
    UnsupportedFormatPair { origin: Format, format: Format },

    #[error("transferring {shape} to {format} overflows i64")]
    Overflow { shape: Shape, format: Format },

    #[error("{format} has full size {full_size}, but the shape has rank {rank}")]
    RankMismatch {
        format: PrimaryFormat,
        rank: usize,
        full_size: usize,
    },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Axis(#[from] AxisError),
}

/// How a shape is read on its way to a packed layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    NdToNd,
    NdToNz,
    FullSize,
    NotFullSize,
    Invalid,
}

impl Strategy {
    /// Classifies a transfer of a rank-`rank` shape from `origin` to
    /// `dst`.
    pub fn classify(origin: PrimaryFormat, dst: PrimaryFormat, rank: usize) -> Strategy {
        if origin == dst {
            return Strategy::NdToNd;
        }
        if dst.is_fractal_nz() {
            return Strategy::NdToNz;
        }
        match full_size(origin) {
            None => Strategy::Invalid,
            // Ranks above the full size are rejected by the caller.
            Some(full) if rank >= full => Strategy::FullSize,
            Some(_) => Strategy::NotFullSize,
        }
    }
}

/// Rejects shapes with more dims than `origin` has axes; their extra
/// dims would have no axis to land on.
fn check_full_rank(origin: PrimaryFormat, rank: usize) -> Result<(), TransferError> {
    match full_size(origin) {
        Some(full) if rank > full => Err(TransferError::RankMismatch {
            format: origin,
            rank,
            full_size: full,
        }),
        _ => Ok(()),
    }
}

/// Shape transfer against one tiling table.
///
/// ```
/// use format_transfer::DataType;
/// use format_transfer::ExtAxisValue;
/// use format_transfer::Format;
/// use format_transfer::PrimaryFormat;
/// use format_transfer::ShapeTransfer;
/// use format_transfer::TilingTable;
/// use format_transfer::dims;
///
/// let tiling = TilingTable::default();
/// let transfer = ShapeTransfer::new(&tiling);
/// let packed = transfer
///     .transfer_shape(
///         PrimaryFormat::Nchw.into(),
///         PrimaryFormat::Nc1hwc0.into(),
///         DataType::Float16,
///         &ExtAxisValue::default(),
///         &dims![8, 512, 5, 5],
///         None,
///     )
///     .unwrap();
/// assert_eq!(packed, dims![8, 32, 5, 5, 16]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ShapeTransfer<'a> {
    tiling: &'a TilingTable,
}

impl ShapeTransfer<'static> {
    /// A transfer against the process-wide tiling table.
    pub fn global() -> Self {
        Self::new(tiling::global())
    }
}

impl<'a> ShapeTransfer<'a> {
    pub fn new(tiling: &'a TilingTable) -> Self {
        Self { tiling }
    }

    pub fn tiling(&self) -> &'a TilingTable {
        self.tiling
    }

    /// The C0 used when packing into `format`: a width the format
    /// carries itself wins over the dtype's tiling.
    pub fn c0(&self, format: &Format, dtype: DataType) -> i64 {
        if let Some(c0) = format.explicit_c0() {
            return c0;
        }
        match format.primary() {
            PrimaryFormat::Nc1hwc0C04 => rules::C04,
            _ => self.tiling.c0(dtype),
        }
    }

    /// The M0 used for FRACTAL_NZ rows: the caller's, else the
    /// dtype's.
    pub fn m0(&self, dtype: DataType, ext: &ExtAxisValue) -> i64 {
        ext.m0().unwrap_or_else(|| self.tiling.m0(dtype))
    }

    pub fn n0(&self, dtype: DataType) -> i64 {
        self.tiling.n0(dtype)
    }

    /// Computes the shape of `shape`, laid out as `origin`, once
    /// packed as `format`.
    ///
    /// `reshape_type` names the axes held by a shape below the
    /// origin's full rank; the default for its rank is used when it
    /// is absent or invalid.
    pub fn transfer_shape(
        &self,
        origin: Format,
        format: Format,
        dtype: DataType,
        ext: &ExtAxisValue,
        shape: &Shape,
        reshape_type: Option<&str>,
    ) -> Result<Shape, TransferError> {
        if shape.is_unknown_rank() {
            return Ok(shape.clone());
        }
        let strategy = Strategy::classify(origin.primary(), format.primary(), shape.rank());
        if strategy == Strategy::Invalid {
            tracing::debug!("no transfer from {} to {}", origin, format);
            return Err(TransferError::UnsupportedFormatPair { origin, format });
        }
        if shape.is_scalar() {
            return Ok(shape.clone());
        }
        if strategy == Strategy::FullSize {
            check_full_rank(origin.primary(), shape.rank())?;
        }

        let c0 = self.c0(&format, dtype);
        let packed = match strategy {
            Strategy::NdToNd | Strategy::Invalid => Ok(None),
            Strategy::NdToNz => Ok(Some(rules::fractal_nz(shape, c0, self.m0(dtype, ext)))),
            Strategy::FullSize => {
                let mut axes = AxisValue::with_c0(c0);
                axes.set_ext(ext);
                decode(origin.primary(), shape, &mut axes)?;
                rules::assemble(&format, &axes, shape)
            }
            Strategy::NotFullSize => {
                let padded = expand_dimension(
                    origin.primary(),
                    format.primary(),
                    reshape_type.unwrap_or_default(),
                    shape,
                );
                match FormatIndexed::new(origin.primary(), &padded, c0, *ext) {
                    Some(axes) => rules::assemble(&format, &axes, &padded),
                    None => rules::assemble_trailing(&format, shape, c0, ext),
                }
            }
        }
        .map_err(|DimOverflow| TransferError::Overflow {
            shape: shape.clone(),
            format,
        })?;

        match packed {
            Some(dims) => Ok(Shape::new(dims)),
            None => {
                tracing::debug!(
                    "no {:?} rule from {} to {} for {}, shape unchanged",
                    strategy,
                    origin,
                    format,
                    shape
                );
                Ok(shape.clone())
            }
        }
    }

    /// [`Self::transfer_shape`] over raw wire values, which are
    /// validated first.
    pub fn transfer_shape_raw(
        &self,
        origin: i32,
        format: i32,
        dtype: i32,
        ext: &ExtAxisValue,
        shape: &Shape,
        reshape_type: Option<&str>,
    ) -> Result<Shape, TransferError> {
        let origin = Format::from_raw(origin)?;
        let format = Format::from_raw(format)?;
        let dtype = DataType::from_raw(dtype)?;
        self.transfer_shape(origin, format, dtype, ext, shape, reshape_type)
    }

    /// Like [`Self::transfer_shape`], replacing `shape` on success and
    /// leaving it untouched on failure.
    pub fn transfer_shape_in_place(
        &self,
        origin: Format,
        format: Format,
        dtype: DataType,
        ext: &ExtAxisValue,
        shape: &mut Shape,
        reshape_type: Option<&str>,
    ) -> Result<(), TransferError> {
        *shape = self.transfer_shape(origin, format, dtype, ext, shape, reshape_type)?;
        Ok(())
    }
}
