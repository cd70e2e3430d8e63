/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Record-style entry points for call sites that carry a tensor's
//! description as one value, with the recurrent-network sizes in
//! whatever container the call site has at hand.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::format::DataType;
use crate::format::Format;
use crate::shape::ExtAxisValue;
use crate::shape::Shape;
use crate::shape::UNKNOWN_DIM;
use crate::transfer::ShapeTransfer;
use crate::transfer::TransferError;

/// Operator attribute carrying the RNN input size.
pub const ATTR_INPUT_SIZE: &str = "input_size";
/// Operator attribute carrying the RNN hidden size.
pub const ATTR_HIDDEN_SIZE: &str = "hidden_size";
/// Operator attribute carrying the RNN state size.
pub const ATTR_STATE_SIZE: &str = "state_size";

/// A tensor to transfer: its origin description in, its packed shape
/// out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeAndFormat {
    pub origin_shape: Shape,
    pub origin_format: Format,
    pub format: Format,
    pub dtype: DataType,
    #[serde(default)]
    pub reshape_type: Option<String>,
    /// The packed shape; written only on success.
    #[serde(default)]
    pub shape: Shape,
}

impl ShapeAndFormat {
    pub fn new(origin_shape: Shape, origin_format: Format, format: Format, dtype: DataType) -> Self {
        Self {
            origin_shape,
            origin_format,
            format,
            dtype,
            reshape_type: None,
            shape: Shape::default(),
        }
    }

    pub fn with_reshape_type(mut self, reshape_type: impl Into<String>) -> Self {
        self.reshape_type = Some(reshape_type.into());
        self
    }
}

/// Read access to an operator's integer attributes.
pub trait AttrLookup {
    fn get_int(&self, name: &str) -> Option<i64>;
}

impl AttrLookup for HashMap<String, i64> {
    fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).copied()
    }
}

impl AttrLookup for BTreeMap<String, i64> {
    fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).copied()
    }
}

/// Builds the recurrent-network sizes from operator attributes.
/// Missing sizes read as 0, a missing state size as unset.
pub fn ext_from_attrs(attrs: &impl AttrLookup) -> ExtAxisValue {
    ExtAxisValue {
        input_size: attrs.get_int(ATTR_INPUT_SIZE).unwrap_or(0),
        hidden_size: attrs.get_int(ATTR_HIDDEN_SIZE).unwrap_or(0),
        state_size: attrs.get_int(ATTR_STATE_SIZE).unwrap_or(UNKNOWN_DIM),
        ..ExtAxisValue::default()
    }
}

impl ShapeTransfer<'_> {
    fn transfer_record(
        &self,
        info: &mut ShapeAndFormat,
        ext: &ExtAxisValue,
    ) -> Result<(), TransferError> {
        info.shape = self.transfer_shape(
            info.origin_format,
            info.format,
            info.dtype,
            ext,
            &info.origin_shape,
            info.reshape_type.as_deref(),
        )?;
        Ok(())
    }

    /// Fills `info.shape` with the packed form of `info.origin_shape`.
    pub fn get_shape_according_to_format(
        &self,
        info: &mut ShapeAndFormat,
    ) -> Result<(), TransferError> {
        self.transfer_record(info, &ExtAxisValue::default())
    }

    /// Like [`Self::get_shape_according_to_format`], with the
    /// recurrent sizes as `[input, hidden, state, m0]`.
    pub fn get_shape_according_to_format_ext(
        &self,
        info: &mut ShapeAndFormat,
        ext: [i64; 4],
    ) -> Result<(), TransferError> {
        self.transfer_record(info, &ExtAxisValue::from_array(ext))
    }

    /// Like [`Self::get_shape_according_to_format`], with the
    /// recurrent sizes read from operator attributes.
    pub fn transfer_shape_with_attrs(
        &self,
        info: &mut ShapeAndFormat,
        attrs: &impl AttrLookup,
    ) -> Result<(), TransferError> {
        self.transfer_record(info, &ext_from_attrs(attrs))
    }
}
