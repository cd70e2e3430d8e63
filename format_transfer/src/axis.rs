/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Semantic axes of origin layouts.
//!
//! An origin layout such as NCHW names the role of each position in
//! a logical shape. This module decodes shapes into an [`AxisValue`]
//! (one slot per semantic [`Axis`]), exposes the per-layout letter
//! tables that reshape types are written against, the fixed
//! [`FormatIndex`] permutation used to read axes straight out of a
//! shape, and the table describing how each packed layout splits and
//! merges origin axes.

use std::fmt;
use std::ops::Index;
use std::ops::IndexMut;

use serde::Deserialize;
use serde::Serialize;

use crate::format::PrimaryFormat;
use crate::shape::ExtAxisValue;
use crate::shape::Shape;
use crate::utils::arith::division_ceiling;

/// Errors produced while decoding a shape against an origin layout.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AxisError {
    #[error("{format} requires rank at least {min}, got {rank}")]
    RankTooSmall {
        format: PrimaryFormat,
        rank: usize,
        min: usize,
    },

    #[error("{format} is not an origin format")]
    NotOriginFormat { format: PrimaryFormat },
}

/// A semantic axis tag.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize
)]
pub enum Axis {
    N,
    C,
    H,
    W,
    C1,
    C0,
    Co,
    D,
    G,
    M0,
    InputSize,
    HiddenSize,
    StateSize,
}

const AXIS_COUNT: usize = 13;

impl Axis {
    /// The single-letter name used in reshape types, for the axes
    /// that can appear in an origin layout.
    pub fn letter(self) -> Option<char> {
        match self {
            Axis::N => Some('N'),
            Axis::C => Some('C'),
            Axis::H => Some('H'),
            Axis::W => Some('W'),
            Axis::D => Some('D'),
            _ => None,
        }
    }

    pub fn from_letter(letter: char) -> Option<Axis> {
        match letter {
            'N' => Some(Axis::N),
            'C' => Some(Axis::C),
            'H' => Some(Axis::H),
            'W' => Some(Axis::W),
            'D' => Some(Axis::D),
            _ => None,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.letter() {
            Some(letter) => write!(f, "{letter}"),
            None => write!(f, "{self:?}"),
        }
    }
}

/// Values for every semantic axis of one tensor. Unset slots read as
/// 1.
///
/// C0 (and, for recurrent layouts, the RNN slots) must be populated
/// before [`decode`] derives C1 and Co from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisValue([i64; AXIS_COUNT]);

impl Default for AxisValue {
    fn default() -> Self {
        Self([1; AXIS_COUNT])
    }
}

impl AxisValue {
    /// An axis value seeded with the tile width C0.
    pub fn with_c0(c0: i64) -> Self {
        let mut value = Self::default();
        value[Axis::C0] = c0;
        value
    }

    /// Seeds the recurrent-network slots.
    pub fn set_ext(&mut self, ext: &ExtAxisValue) {
        self[Axis::InputSize] = ext.input_size;
        self[Axis::HiddenSize] = ext.hidden_size;
        self[Axis::StateSize] = ext.effective_state_size();
        if let Some(m0) = ext.m0() {
            self[Axis::M0] = m0;
        }
    }

    /// The recurrent-network slots as an [`ExtAxisValue`].
    pub fn ext(&self) -> ExtAxisValue {
        ExtAxisValue {
            input_size: self[Axis::InputSize],
            hidden_size: self[Axis::HiddenSize],
            state_size: self[Axis::StateSize],
            m0: self[Axis::M0],
        }
    }
}

impl Index<Axis> for AxisValue {
    type Output = i64;

    fn index(&self, axis: Axis) -> &i64 {
        &self.0[axis.slot()]
    }
}

impl IndexMut<Axis> for AxisValue {
    fn index_mut(&mut self, axis: Axis) -> &mut i64 {
        &mut self.0[axis.slot()]
    }
}

const NCHW_AXES: &[Axis] = &[Axis::N, Axis::C, Axis::H, Axis::W];
const NHWC_AXES: &[Axis] = &[Axis::N, Axis::H, Axis::W, Axis::C];
const HWCN_AXES: &[Axis] = &[Axis::H, Axis::W, Axis::C, Axis::N];
const CHWN_AXES: &[Axis] = &[Axis::C, Axis::H, Axis::W, Axis::N];
const NDHWC_AXES: &[Axis] = &[Axis::N, Axis::D, Axis::H, Axis::W, Axis::C];
const NCDHW_AXES: &[Axis] = &[Axis::N, Axis::C, Axis::D, Axis::H, Axis::W];
const DHWCN_AXES: &[Axis] = &[Axis::D, Axis::H, Axis::W, Axis::C, Axis::N];
const DHWNC_AXES: &[Axis] = &[Axis::D, Axis::H, Axis::W, Axis::N, Axis::C];

/// The ordered axes of an origin layout. ND reads as NCHW.
pub fn axis_names(format: PrimaryFormat) -> Option<&'static [Axis]> {
    match format {
        PrimaryFormat::Nchw | PrimaryFormat::Nd => Some(NCHW_AXES),
        PrimaryFormat::Nhwc => Some(NHWC_AXES),
        PrimaryFormat::Hwcn => Some(HWCN_AXES),
        PrimaryFormat::Chwn => Some(CHWN_AXES),
        PrimaryFormat::Ndhwc => Some(NDHWC_AXES),
        PrimaryFormat::Ncdhw => Some(NCDHW_AXES),
        PrimaryFormat::Dhwcn => Some(DHWCN_AXES),
        PrimaryFormat::Dhwnc => Some(DHWNC_AXES),
        _ => None,
    }
}

/// The minimum rank an origin layout must have to be decoded by
/// position; also the rank ExpandDimension pads to.
pub fn origin_rank(format: PrimaryFormat) -> Option<usize> {
    axis_names(format).map(<[Axis]>::len)
}

/// The position of `axis` in `format`.
pub fn axis_index(format: PrimaryFormat, axis: Axis) -> Option<usize> {
    axis_names(format)?.iter().position(|&a| a == axis)
}

/// The position of `axis` among the axes a reshape type kept.
///
/// When a low-rank shape is described by a reshape type such as
/// `"CH"`, its dimensions are the kept axes in order, so the index
/// of `H` is 1 rather than its full-layout index 2. The reshape type
/// is trusted to have been validated against `format`.
pub fn axis_index_in(format: PrimaryFormat, axis: Axis, reshape_type: &str) -> Option<usize> {
    axis_index(format, axis)?;
    let letter = axis.letter()?;
    reshape_type.chars().position(|c| c == letter)
}

/// The fixed positions of N, C, H, W and D in an origin layout, used
/// to read axis values directly from a shape without staging them in
/// an [`AxisValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatIndex {
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
    /// Absent for 4D layouts, whose depth is 1.
    pub d: Option<usize>,
}

/// The [`FormatIndex`] of an origin layout.
pub fn format_index(format: PrimaryFormat) -> Option<FormatIndex> {
    let at = |axis| axis_index(format, axis);
    Some(FormatIndex {
        n: at(Axis::N)?,
        c: at(Axis::C)?,
        h: at(Axis::H)?,
        w: at(Axis::W)?,
        d: at(Axis::D),
    })
}

/// Decodes `shape`, laid out as `format`, into `axis_value`.
///
/// C0 must already be set on `axis_value`; C1 and Co are derived from
/// it. A scalar shape leaves `axis_value` untouched.
pub fn decode(
    format: PrimaryFormat,
    shape: &Shape,
    axis_value: &mut AxisValue,
) -> Result<(), AxisError> {
    if shape.is_scalar() {
        return Ok(());
    }
    let axes = axis_names(format).ok_or(AxisError::NotOriginFormat { format })?;
    if shape.rank() < axes.len() {
        return Err(AxisError::RankTooSmall {
            format,
            rank: shape.rank(),
            min: axes.len(),
        });
    }
    for (index, &axis) in axes.iter().enumerate() {
        axis_value[axis] = shape[index];
    }
    let c0 = axis_value[Axis::C0];
    axis_value[Axis::C1] = division_ceiling(axis_value[Axis::C], c0);
    axis_value[Axis::Co] = c0;
    Ok(())
}

/// Which tile constant an origin axis is split by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileUnit {
    /// The innermost reduction tile, C0.
    C0,
    /// The output-channel tile, N0.
    N0,
}

/// An origin axis a packed layout splits into an outer and an inner
/// (tile) dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SplitAxis {
    pub axis: Axis,
    pub unit: TileUnit,
}

const fn split(axis: Axis, unit: TileUnit) -> SplitAxis {
    SplitAxis { axis, unit }
}

/// The origin axes each destination dimension is built from, in
/// destination order. An empty entry is a constant tile dimension.
pub fn dst_axis_sources(dst: PrimaryFormat) -> Option<&'static [&'static [Axis]]> {
    use Axis::*;
    let sources: &'static [&'static [Axis]] = match dst {
        PrimaryFormat::Nc1hwc0 | PrimaryFormat::Nc1hwc0C04 => &[&[N], &[C], &[H], &[W], &[C]],
        PrimaryFormat::Ndc1hwc0 => &[&[N], &[D], &[C], &[H], &[W], &[C]],
        PrimaryFormat::C1hwc0 => &[&[N], &[H], &[W], &[N]],
        PrimaryFormat::C1hwncoc0 => &[&[C], &[H], &[W], &[N], &[C], &[C]],
        PrimaryFormat::FractalZ | PrimaryFormat::FractalZ3d => &[&[D, C, H, W], &[N], &[N], &[C]],
        PrimaryFormat::FractalZ3dTranspose => &[&[N, D, H, W], &[C], &[N], &[C]],
        PrimaryFormat::FractalZC04 => &[&[C, H, W], &[N], &[N], &[C]],
        PrimaryFormat::FractalZWino => &[&[C], &[N], &[], &[H, W], &[], &[C]],
        _ => return None,
    };
    Some(sources)
}

/// The origin axes `dst` splits, and by which tile.
pub fn split_axes(dst: PrimaryFormat) -> &'static [SplitAxis] {
    use Axis::C;
    use Axis::N;
    match dst {
        PrimaryFormat::Nc1hwc0 | PrimaryFormat::Nc1hwc0C04 | PrimaryFormat::Ndc1hwc0 => {
            const S: &[SplitAxis] = &[split(C, TileUnit::C0)];
            S
        }
        PrimaryFormat::C1hwc0 => {
            const S: &[SplitAxis] = &[split(N, TileUnit::C0)];
            S
        }
        PrimaryFormat::FractalZC04 => {
            const S: &[SplitAxis] = &[split(N, TileUnit::N0)];
            S
        }
        PrimaryFormat::C1hwncoc0
        | PrimaryFormat::FractalZ
        | PrimaryFormat::FractalZ3d
        | PrimaryFormat::FractalZ3dTranspose
        | PrimaryFormat::FractalZWino => {
            const S: &[SplitAxis] = &[split(C, TileUnit::C0), split(N, TileUnit::N0)];
            S
        }
        _ => &[],
    }
}
