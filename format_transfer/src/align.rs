/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Alignment units and axis index mappings between an origin shape
//! and its packed form.

use serde::Deserialize;
use serde::Serialize;

use crate::axis::Axis;
use crate::axis::TileUnit;
use crate::axis::axis_names;
use crate::axis::dst_axis_sources;
use crate::axis::split_axes;
use crate::expand::placement_reshape_type;
use crate::format::DataType;
use crate::format::Format;
use crate::shape::ExtAxisValue;
use crate::shape::Shape;
use crate::transfer::ShapeTransfer;
use crate::transfer::Strategy;
use crate::transfer::TransferError;

/// Which destination axes each source axis feeds, and back.
///
/// An empty entry in `dst_to_src` marks a destination axis that no
/// source axis feeds (a constant tile dimension).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisIndexMapping {
    pub src_to_dst: Vec<Vec<usize>>,
    pub dst_to_src: Vec<Vec<usize>>,
}

impl AxisIndexMapping {
    fn identity(rank: usize) -> Self {
        let axes: Vec<Vec<usize>> = (0..rank).map(|i| vec![i]).collect();
        Self {
            src_to_dst: axes.clone(),
            dst_to_src: axes,
        }
    }

    fn with_ranks(src_rank: usize, dst_rank: usize) -> Self {
        Self {
            src_to_dst: vec![Vec::new(); src_rank],
            dst_to_src: vec![Vec::new(); dst_rank],
        }
    }

    fn link(&mut self, src: usize, dst: usize) {
        self.src_to_dst[src].push(dst);
        self.dst_to_src[dst].push(src);
    }
}

impl ShapeTransfer<'_> {
    /// The axes of `origin` a rank-`rank` shape holds, in order.
    fn source_axes(
        &self,
        origin: Format,
        format: Format,
        rank: usize,
        reshape_type: Option<&str>,
    ) -> Result<Vec<Axis>, TransferError> {
        let unsupported = || TransferError::UnsupportedFormatPair { origin, format };
        let axes = axis_names(origin.primary()).ok_or_else(unsupported)?;
        let full = axes.len();
        if rank > full {
            return Err(TransferError::RankMismatch {
                format: origin.primary(),
                rank,
                full_size: full,
            });
        }
        if rank == full {
            return Ok(axes.to_vec());
        }
        let letters = placement_reshape_type(origin.primary(), rank, reshape_type.unwrap_or_default())
            .ok_or_else(unsupported)?;
        Ok(letters.chars().filter_map(Axis::from_letter).collect())
    }

    /// The unit each axis of `shape` must be padded to once packed as
    /// `format`: the tile the destination splits it by, else 1. A
    /// shape of unknown rank comes back as is.
    pub fn get_aligned_shape(
        &self,
        origin: Format,
        format: Format,
        dtype: DataType,
        shape: &Shape,
        reshape_type: Option<&str>,
    ) -> Result<Shape, TransferError> {
        if shape.is_unknown_rank() {
            return Ok(shape.clone());
        }
        let rank = shape.rank();
        let units = match Strategy::classify(origin.primary(), format.primary(), rank) {
            Strategy::Invalid => {
                return Err(TransferError::UnsupportedFormatPair { origin, format });
            }
            Strategy::NdToNd => vec![1; rank],
            Strategy::NdToNz => {
                let mut units = vec![1; rank];
                if let Some(last) = units.last_mut() {
                    *last = self.c0(&format, dtype);
                }
                if rank >= 2 {
                    units[rank - 2] = self.m0(dtype, &ExtAxisValue::default());
                }
                units
            }
            Strategy::FullSize | Strategy::NotFullSize => {
                if shape.is_scalar() {
                    return Ok(Shape::scalar());
                }
                let splits = split_axes(format.primary());
                self.source_axes(origin, format, rank, reshape_type)?
                    .into_iter()
                    .map(|axis| {
                        match splits.iter().find(|split| split.axis == axis) {
                            Some(split) if split.unit == TileUnit::C0 => self.c0(&format, dtype),
                            Some(_) => self.n0(dtype),
                            None => 1,
                        }
                    })
                    .collect()
            }
        };
        Ok(Shape::new(units))
    }

    /// Maps every axis of `shape` to the axes of its packed form and
    /// back. A shape of unknown rank maps to nothing.
    pub fn transfer_dims(
        &self,
        origin: Format,
        format: Format,
        shape: &Shape,
        reshape_type: Option<&str>,
    ) -> Result<AxisIndexMapping, TransferError> {
        if shape.is_unknown_rank() {
            return Ok(AxisIndexMapping::default());
        }
        let rank = shape.rank();
        match Strategy::classify(origin.primary(), format.primary(), rank) {
            Strategy::Invalid => Err(TransferError::UnsupportedFormatPair { origin, format }),
            Strategy::NdToNd => Ok(AxisIndexMapping::identity(rank)),
            Strategy::NdToNz => {
                if rank == 0 {
                    return Ok(AxisIndexMapping::default());
                }
                // Rank 1 is promoted to [1, d] before tiling.
                let dst_rank = rank.max(2) + 2;
                let mut mapping = AxisIndexMapping::with_ranks(rank, dst_rank);
                for src in 0..rank.saturating_sub(2) {
                    mapping.link(src, src);
                }
                mapping.link(rank - 1, dst_rank - 4);
                if rank >= 2 {
                    mapping.link(rank - 2, dst_rank - 3);
                }
                Ok(mapping)
            }
            Strategy::FullSize | Strategy::NotFullSize => {
                if shape.is_scalar() {
                    return Ok(AxisIndexMapping::default());
                }
                let sources = dst_axis_sources(format.primary())
                    .ok_or(TransferError::UnsupportedFormatPair { origin, format })?;
                let axes = self.source_axes(origin, format, rank, reshape_type)?;
                let mut mapping = AxisIndexMapping::with_ranks(rank, sources.len());
                for (dst, feeding) in sources.iter().enumerate() {
                    for axis in *feeding {
                        if let Some(src) = axes.iter().position(|a| a == axis) {
                            mapping.link(src, dst);
                        }
                    }
                }
                Ok(mapping)
            }
        }
    }
}
