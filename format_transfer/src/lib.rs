/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Tensor layout transfer for NPU memory formats.
//!
//! Given a tensor shape in an origin layout (`NCHW`, `NHWC`, `ND`, ...)
//! and a destination layout (`NC1HWC0`, `FRACTAL_Z`, `FRACTAL_NZ`, ...),
//! [`ShapeTransfer`] computes the physical shape of the tensor once it
//! has been packed into the destination layout. Channel and matrix
//! axes are split into tiles whose sizes come from a [`TilingTable`],
//! keyed by element type.
//!
//! Shapes below the full rank of their origin layout are first padded
//! with ones according to a *reshape type* (see [`expand`]). Dynamic
//! shapes carry per-dimension ranges, transferred bound by bound (see
//! [`range`]).
//!
//! ```
//! use format_transfer::DataType;
//! use format_transfer::ExtAxisValue;
//! use format_transfer::PrimaryFormat;
//! use format_transfer::ShapeTransfer;
//! use format_transfer::TilingTable;
//! use format_transfer::dims;
//!
//! let tiling = TilingTable::default();
//! let packed = ShapeTransfer::new(&tiling)
//!     .transfer_shape(
//!         PrimaryFormat::Nchw.into(),
//!         PrimaryFormat::Nc1hwc0.into(),
//!         DataType::Float16,
//!         &ExtAxisValue::default(),
//!         &dims![8, 512, 5, 5],
//!         None,
//!     )
//!     .unwrap();
//! assert_eq!(packed, dims![8, 32, 5, 5, 16]);
//! ```

/// Per-axis alignment and source-axis mapping.
pub mod align;

/// Logical axes and where they sit in each layout.
pub mod axis;
pub use axis::Axis;
pub use axis::AxisError;
pub use axis::AxisValue;

/// Reshape types: padding low-rank shapes up to a layout's full rank.
pub mod expand;
pub use expand::ReshapeTypeError;

/// Record-style entry points.
pub mod facade;
pub use facade::ShapeAndFormat;

/// Layout, sub-format and element type descriptors.
pub mod format;
pub use format::DataType;
pub use format::Format;
pub use format::FormatError;
pub use format::PrimaryFormat;

/// Axis readers over shapes.
pub mod layout;

/// Small parsers for textual shapes and settings.
pub mod parse;

/// Range-valued transfer for dynamic shapes.
pub mod range;
pub use range::DimRange;
pub use range::RangeAndFormat;
pub use range::RangeError;

/// Tensor shapes with unknown dims and ranks.
pub mod shape;
pub use shape::ExtAxisValue;
pub use shape::Shape;

/// Property-based generators for randomized test input.
#[cfg(test)]
pub mod strategy;

/// Cube unit tile sizes, per element type.
pub mod tiling;
pub use tiling::CubeTiling;
pub use tiling::PlatformInfo;
pub use tiling::TilingTable;

/// The shape transfer engine.
pub mod transfer;
pub use transfer::ShapeTransfer;
pub use transfer::TransferError;

/// Utilities.
pub mod utils;
