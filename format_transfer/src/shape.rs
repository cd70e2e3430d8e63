/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::parse::ParserError;
use crate::parse::parse_dims;

/// A single dimension whose extent is unknown at compile time.
pub const UNKNOWN_DIM: i64 = -1;

/// Whole-shape marker: the rank itself is unknown. A shape whose only
/// dimension is this value passes through every transform untouched.
pub const UNKNOWN_RANK: i64 = -2;

/// An ordered sequence of signed dimension sizes.
///
/// Unlike a memory shape, sizes are signed so that dynamic tensors
/// can carry [`UNKNOWN_DIM`] in any position, or be entirely of
/// unknown rank (see [`Shape::unknown_rank`]).
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<i64>,
}

impl Shape {
    pub fn new(dims: Vec<i64>) -> Self {
        Self { dims }
    }

    /// The rank-0 shape.
    pub fn scalar() -> Self {
        Self { dims: vec![] }
    }

    /// A shape of unknown rank.
    pub fn unknown_rank() -> Self {
        Self {
            dims: vec![UNKNOWN_RANK],
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    pub fn dims_mut(&mut self) -> &mut Vec<i64> {
        &mut self.dims
    }

    pub fn into_dims(self) -> Vec<i64> {
        self.dims
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn is_unknown_rank(&self) -> bool {
        self.dims == [UNKNOWN_RANK]
    }
}

impl Index<usize> for Shape {
    type Output = i64;

    fn index(&self, index: usize) -> &i64 {
        &self.dims[index]
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape{}", self)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl FromStr for Shape {
    type Err = ParserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_dims(s).map(Shape::new)
    }
}

impl From<Vec<i64>> for Shape {
    fn from(dims: Vec<i64>) -> Self {
        Self::new(dims)
    }
}

impl From<&[i64]> for Shape {
    fn from(dims: &[i64]) -> Self {
        Self::new(dims.to_vec())
    }
}

impl<const N: usize> From<[i64; N]> for Shape {
    fn from(dims: [i64; N]) -> Self {
        Self::new(dims.to_vec())
    }
}

/// Construct a [`Shape`] from a list of dimension sizes.
///
/// ```
/// let s = format_transfer::dims![8, 512, 5, 5];
/// assert_eq!(s.rank(), 4);
/// assert_eq!(s.to_string(), "[8, 512, 5, 5]");
/// ```
#[macro_export]
macro_rules! dims {
    ( $( $size:expr_2021 ),* $(,)? ) => {
        $crate::shape::Shape::new(vec![ $( $size as i64 ),* ])
    };
}

/// Extra axis values for recurrent-network formats, carried outside
/// [`crate::AxisValue`] by callers.
///
/// A `state_size` of [`UNKNOWN_DIM`] means "not set": consumers fall
/// back to `hidden_size`. An `m0` of zero or less means "use the
/// tiling table".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtAxisValue {
    pub input_size: i64,
    pub hidden_size: i64,
    pub state_size: i64,
    pub m0: i64,
}

impl Default for ExtAxisValue {
    fn default() -> Self {
        Self {
            input_size: 0,
            hidden_size: 0,
            state_size: UNKNOWN_DIM,
            m0: 0,
        }
    }
}

impl ExtAxisValue {
    /// RNN sizes with state size unset and tiling-table M0.
    pub fn rnn(input_size: i64, hidden_size: i64) -> Self {
        Self {
            input_size,
            hidden_size,
            ..Self::default()
        }
    }

    /// Builds the value from its `[input, hidden, state, m0]` form.
    pub fn from_array([input_size, hidden_size, state_size, m0]: [i64; 4]) -> Self {
        Self {
            input_size,
            hidden_size,
            state_size,
            m0,
        }
    }

    pub fn to_array(&self) -> [i64; 4] {
        [self.input_size, self.hidden_size, self.state_size, self.m0]
    }

    /// The state size, or the hidden size when unset.
    pub fn effective_state_size(&self) -> i64 {
        if self.state_size == UNKNOWN_DIM {
            self.hidden_size
        } else {
            self.state_size
        }
    }

    /// The M0 carried by the caller, if any.
    pub fn m0(&self) -> Option<i64> {
        (self.m0 > 0).then_some(self.m0)
    }
}
