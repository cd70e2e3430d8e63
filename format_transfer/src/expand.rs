/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Padding low-rank shapes up to an origin layout's full rank.
//!
//! A shape of rank 2 declared as NCHW does not say which two of the
//! four axes it holds. A *reshape type* names them: `"CH"` means the
//! dims are C and H, so `[c, h]` expands to `[1, c, h, 1]`. Letters
//! must appear in the layout's own order; a reshape type can drop
//! axes but never transpose them.
//!
//! The same information travels as a packed integer (see
//! [`reshape_type_to_mask`]): the low 56 bits flag every full-rank
//! position that is filled with 1 rather than with an original dim,
//! and the top byte stores the full rank so that stale masks can be
//! rejected.

use crate::axis::Axis;
use crate::axis::axis_index;
use crate::axis::axis_names;
use crate::axis::origin_rank;
use crate::format::PrimaryFormat;
use crate::shape::Shape;

/// Hint value that explicitly asks for the default reshape type.
pub const FORBIDDEN_RESHAPE_TYPE: &str = "FORBIDDEN";

const RANK_SHIFT: u32 = 56;
const FLAG_MASK: i64 = (1 << RANK_SHIFT) - 1;

/// Errors from decoding reshape types and their masks.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReshapeTypeError {
    #[error("{format} has no axis table")]
    NotOriginFormat { format: PrimaryFormat },

    #[error("reshape type `{reshape_type}` is not valid for {format}")]
    Invalid {
        reshape_type: String,
        format: PrimaryFormat,
    },

    #[error("mask {mask:#x} encodes full size {encoded}, but {format} has full size {expected}")]
    FullSizeMismatch {
        mask: i64,
        format: PrimaryFormat,
        encoded: usize,
        expected: usize,
    },

    #[error("mask {mask:#x} flags positions beyond full size {full_size}")]
    StrayBits { mask: i64, full_size: usize },

    #[error("mask {mask:#x} keeps {kept} dims but the shape has rank {rank}")]
    RankMismatch { mask: i64, kept: usize, rank: usize },
}

/// The rank `format` is padded to; ND pads like NCHW.
pub fn full_size(format: PrimaryFormat) -> Option<usize> {
    origin_rank(format)
}

/// The reshape type assumed when a caller supplies none, indexed by
/// the shape's rank.
pub fn default_reshape_type(format: PrimaryFormat, rank: usize) -> Option<&'static str> {
    let table: &[&str] = match format {
        PrimaryFormat::Nchw | PrimaryFormat::Nd => &["", "C", "CH", "CHW"],
        PrimaryFormat::Nhwc => &["", "C", "WC", "HWC"],
        PrimaryFormat::Hwcn => &["", "N", "CN", "WCN"],
        PrimaryFormat::Chwn => &["", "N", "WN", "HWN"],
        PrimaryFormat::Ndhwc => &["", "C", "WC", "HWC", "DHWC"],
        PrimaryFormat::Ncdhw => &["", "C", "CD", "CDH", "CDHW"],
        PrimaryFormat::Dhwcn => &["", "N", "CN", "WCN", "HWCN"],
        PrimaryFormat::Dhwnc => &["", "C", "NC", "WNC", "HWNC"],
        _ => return None,
    };
    table.get(rank).copied().filter(|t| !t.is_empty())
}

/// Maps each letter of `reshape_type` to its position in `format`,
/// requiring the positions to be strictly increasing.
fn reshape_positions(format: PrimaryFormat, reshape_type: &str) -> Option<Vec<usize>> {
    let full = full_size(format)?;
    if reshape_type.is_empty() || reshape_type.len() > full {
        return None;
    }
    let mut positions = Vec::with_capacity(reshape_type.len());
    for letter in reshape_type.chars() {
        let position = axis_index(format, Axis::from_letter(letter)?)?;
        if positions.last().is_some_and(|&last| last >= position) {
            return None;
        }
        positions.push(position);
    }
    Some(positions)
}

/// Whether `reshape_type` names axes of `format` in strictly
/// increasing order.
pub fn is_valid_reshape_type(format: PrimaryFormat, reshape_type: &str) -> bool {
    reshape_positions(format, reshape_type).is_some()
}

/// Destinations whose rules work on the trailing dims directly and
/// therefore never want padding.
fn never_expands(origin: PrimaryFormat, dst: PrimaryFormat) -> bool {
    dst.is_fractal_nz()
        || dst.is_rnn()
        || dst == PrimaryFormat::FractalZnLstm
        || (origin == PrimaryFormat::Nd && dst == PrimaryFormat::FractalZ)
}

/// Picks the reshape type that will place a rank-`rank` shape, or
/// `None` when the shape must be left as is.
fn resolve_reshape_type(
    origin: PrimaryFormat,
    dst: PrimaryFormat,
    rank: usize,
    hint: &str,
) -> Option<String> {
    let full = full_size(origin)?;
    if rank >= full || never_expands(origin, dst) {
        return None;
    }
    placement_reshape_type(origin, rank, hint)
}

/// The letters naming the axes a rank-`rank` shape holds: the hint
/// when it is valid, otherwise the default for `rank`. Longer reshape
/// types are used right-aligned.
pub(crate) fn placement_reshape_type(origin: PrimaryFormat, rank: usize, hint: &str) -> Option<String> {
    if rank == 0 {
        return None;
    }
    let explicit = !hint.is_empty() && hint != FORBIDDEN_RESHAPE_TYPE;
    let reshape_type = if explicit && is_valid_reshape_type(origin, hint) {
        hint
    } else {
        if explicit {
            tracing::debug!(
                "reshape type `{}` is not valid for {}, using the default",
                hint,
                origin
            );
        }
        let Some(default) = default_reshape_type(origin, rank) else {
            tracing::warn!(
                "no default reshape type for {} at rank {}, shape left unexpanded",
                origin,
                rank
            );
            return None;
        };
        default
    };
    let Some(kept) = trailing_letters(reshape_type, rank) else {
        tracing::warn!(
            "reshape type `{}` cannot place {} dims, shape left unexpanded",
            reshape_type,
            rank
        );
        return None;
    };
    Some(kept.to_string())
}

/// The last `rank` letters of `reshape_type`; `None` when it is
/// shorter than that or not made of axis letters.
fn trailing_letters(reshape_type: &str, rank: usize) -> Option<&str> {
    if !reshape_type.is_ascii() || rank > reshape_type.len() {
        return None;
    }
    Some(&reshape_type[reshape_type.len() - rank..])
}

/// Pads `shape` to the full rank of `origin`, placing its dims at
/// the axes named by `hint` (or by the default reshape type).
///
/// Always succeeds: when no padding applies the shape is returned
/// unchanged.
///
/// ```
/// use format_transfer::PrimaryFormat;
/// use format_transfer::dims;
/// use format_transfer::expand::expand_dimension;
///
/// let padded = expand_dimension(PrimaryFormat::Nchw, PrimaryFormat::Nc1hwc0, "CH", &dims![3, 4]);
/// assert_eq!(padded, dims![1, 3, 4, 1]);
/// ```
pub fn expand_dimension(origin: PrimaryFormat, dst: PrimaryFormat, hint: &str, shape: &Shape) -> Shape {
    if shape.is_unknown_rank() {
        return shape.clone();
    }
    let Some(reshape_type) = resolve_reshape_type(origin, dst, shape.rank(), hint) else {
        return shape.clone();
    };
    let (Some(positions), Some(full)) = (reshape_positions(origin, &reshape_type), full_size(origin))
    else {
        return shape.clone();
    };

    let mut dims = shape.dims().to_vec();
    dims.resize(full, 1);
    // Targets are strictly increasing and never left of their source,
    // so moving right to left never clobbers an unmoved dim.
    for (index, &target) in positions.iter().enumerate().rev() {
        if target != index {
            dims[target] = dims[index];
            dims[index] = 1;
        }
    }
    Shape::new(dims)
}

/// Encodes a (valid) reshape type for a rank-`rank` shape into its
/// mask form.
pub fn reshape_type_to_mask(
    origin: PrimaryFormat,
    rank: usize,
    reshape_type: &str,
) -> Result<i64, ReshapeTypeError> {
    let full = full_size(origin).ok_or(ReshapeTypeError::NotOriginFormat { format: origin })?;
    let invalid = || ReshapeTypeError::Invalid {
        reshape_type: reshape_type.to_string(),
        format: origin,
    };
    let kept = trailing_letters(reshape_type, rank).ok_or_else(invalid)?;
    let positions = if kept.is_empty() {
        Vec::new()
    } else {
        reshape_positions(origin, kept).ok_or_else(invalid)?
    };
    let flags = (0..full)
        .filter(|p| !positions.contains(p))
        .fold(0i64, |acc, p| acc | (1 << p));
    Ok(((full as i64) << RANK_SHIFT) | flags)
}

/// Computes the mask that [`expand_dimension`] would apply for these
/// arguments, or 0 if it would leave the shape unchanged.
pub fn generate_reshape_type(
    origin: PrimaryFormat,
    dst: PrimaryFormat,
    rank: usize,
    hint: &str,
) -> i64 {
    resolve_reshape_type(origin, dst, rank, hint)
        .and_then(|reshape_type| reshape_type_to_mask(origin, rank, &reshape_type).ok())
        .unwrap_or(0)
}

/// Decodes a mask back into its reshape type, validating it against
/// the current full size of `origin` and against `rank`.
pub fn reshape_type_from_mask(
    origin: PrimaryFormat,
    rank: usize,
    mask: i64,
) -> Result<String, ReshapeTypeError> {
    let axes = axis_names(origin).ok_or(ReshapeTypeError::NotOriginFormat { format: origin })?;
    let full = axes.len();
    let encoded = ((mask as u64) >> RANK_SHIFT) as usize;
    if encoded != full {
        return Err(ReshapeTypeError::FullSizeMismatch {
            mask,
            format: origin,
            encoded,
            expected: full,
        });
    }
    let flags = mask & FLAG_MASK;
    if flags >> full != 0 {
        return Err(ReshapeTypeError::StrayBits {
            mask,
            full_size: full,
        });
    }
    let kept = full - flags.count_ones() as usize;
    if kept != rank {
        return Err(ReshapeTypeError::RankMismatch { mask, kept, rank });
    }
    Ok(axes
        .iter()
        .enumerate()
        .filter(|(p, _)| flags & (1 << p) == 0)
        .filter_map(|(_, axis)| axis.letter())
        .collect())
}

/// Pads `shape` according to a mask produced by
/// [`generate_reshape_type`]. A zero mask, a shape already at full
/// rank, or a mask that does not fit the shape leave it unchanged.
pub fn expand_by_mask(mask: i64, shape: &Shape) -> Shape {
    let full = ((mask as u64) >> RANK_SHIFT) as usize;
    let flags = mask & FLAG_MASK;
    if mask == 0 || shape.is_unknown_rank() || shape.rank() >= full {
        return shape.clone();
    }
    if full > RANK_SHIFT as usize {
        tracing::warn!(
            "reshape mask {:#x} encodes full size {}, shape left unexpanded",
            mask,
            full
        );
        return shape.clone();
    }
    if flags >> full != 0 || full - flags.count_ones() as usize != shape.rank() {
        tracing::warn!(
            "reshape mask {:#x} does not fit shape {}, shape left unexpanded",
            mask,
            shape
        );
        return shape.clone();
    }
    let mut originals = shape.dims().iter();
    let dims = (0..full)
        .map(|p| {
            if flags & (1 << p) != 0 {
                1
            } else {
                originals.next().copied().unwrap_or(1)
            }
        })
        .collect();
    Shape::new(dims)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tracing_test::traced_test;

    use super::*;
    use crate::dims;
    use crate::strategy::gen_format;
    use crate::strategy::gen_origin_format;
    use crate::strategy::gen_shape;

    const NCHW: PrimaryFormat = PrimaryFormat::Nchw;
    const NC1HWC0: PrimaryFormat = PrimaryFormat::Nc1hwc0;

    #[test]
    fn test_full_rank_is_identity() {
        assert_eq!(
            expand_dimension(NCHW, NC1HWC0, "", &dims![5, 6, 7, 8]),
            dims![5, 6, 7, 8]
        );
    }

    #[test]
    fn test_invalid_hint_falls_back_to_default() {
        // "WN" transposes, so the NCHW rank-1 default "C" applies.
        assert_eq!(expand_dimension(NCHW, NC1HWC0, "WN", &dims![5]), dims![1, 5, 1, 1]);
        assert_eq!(
            expand_dimension(NCHW, NC1HWC0, FORBIDDEN_RESHAPE_TYPE, &dims![5]),
            dims![1, 5, 1, 1]
        );
    }

    #[test]
    fn test_hint_places_dims() {
        assert_eq!(expand_dimension(NCHW, NC1HWC0, "NW", &dims![2, 3]), dims![2, 1, 1, 3]);
        assert_eq!(
            expand_dimension(PrimaryFormat::Nhwc, NC1HWC0, "HW", &dims![2, 3]),
            dims![1, 2, 3, 1]
        );
        assert_eq!(
            expand_dimension(PrimaryFormat::Ncdhw, PrimaryFormat::Ndc1hwc0, "", &dims![4, 5]),
            dims![1, 4, 5, 1, 1]
        );
    }

    #[test]
    fn test_longer_hint_is_right_aligned() {
        assert_eq!(expand_dimension(NCHW, NC1HWC0, "CHW", &dims![3, 4]), dims![1, 1, 3, 4]);
    }

    #[test]
    fn test_no_expansion_cases() {
        // Packed destinations that read trailing dims.
        assert_eq!(
            expand_dimension(PrimaryFormat::Nd, PrimaryFormat::FractalNz, "", &dims![3, 4]),
            dims![3, 4]
        );
        assert_eq!(
            expand_dimension(PrimaryFormat::Nd, PrimaryFormat::FractalZ, "", &dims![3, 4]),
            dims![3, 4]
        );
        assert_eq!(
            expand_dimension(PrimaryFormat::Nd, PrimaryFormat::FractalZnRnn, "", &dims![3, 4]),
            dims![3, 4]
        );
        // Not an origin layout.
        assert_eq!(
            expand_dimension(NC1HWC0, PrimaryFormat::FractalZ, "", &dims![3]),
            dims![3]
        );
        assert_eq!(
            expand_dimension(NCHW, NC1HWC0, "", &Shape::unknown_rank()),
            Shape::unknown_rank()
        );
    }

    #[test]
    fn test_scalar_is_unchanged() {
        assert_eq!(expand_dimension(NCHW, NC1HWC0, "", &Shape::scalar()), Shape::scalar());
        assert_eq!(expand_dimension(NCHW, NC1HWC0, "C", &Shape::scalar()), Shape::scalar());
        assert_eq!(generate_reshape_type(NCHW, NC1HWC0, 0, "C"), 0);
    }

    #[traced_test]
    #[test]
    fn test_short_hint_cannot_place() {
        assert_eq!(
            expand_dimension(NCHW, NC1HWC0, "CH", &dims![2, 3, 4]),
            dims![2, 3, 4]
        );
        assert!(logs_contain("cannot place 3 dims"));
        assert_eq!(generate_reshape_type(NCHW, NC1HWC0, 3, "CH"), 0);
    }

    #[test]
    fn test_validation() {
        assert!(is_valid_reshape_type(NCHW, "CHW"));
        assert!(is_valid_reshape_type(NCHW, "NCHW"));
        assert!(!is_valid_reshape_type(NCHW, "HC"));
        assert!(!is_valid_reshape_type(NCHW, "CC"));
        assert!(!is_valid_reshape_type(NCHW, "CD"));
        assert!(!is_valid_reshape_type(NCHW, "NCHWN"));
        assert!(!is_valid_reshape_type(NCHW, ""));
        assert!(is_valid_reshape_type(PrimaryFormat::Dhwcn, "DCN"));
    }

    #[test]
    fn test_mask_encoding() {
        // "C" in NCHW keeps position 1: flags N, H, W.
        let mask = reshape_type_to_mask(NCHW, 1, "C").unwrap();
        assert_eq!(mask, (4 << 56) | 0b1101);
        assert_eq!(reshape_type_from_mask(NCHW, 1, mask).unwrap(), "C");
        assert_eq!(generate_reshape_type(NCHW, NC1HWC0, 1, ""), mask);
        assert_eq!(generate_reshape_type(NCHW, NC1HWC0, 4, ""), 0);
    }

    #[test]
    fn test_mask_decode_errors() {
        let mask = reshape_type_to_mask(NCHW, 2, "CH").unwrap();
        assert!(matches!(
            reshape_type_from_mask(PrimaryFormat::Ncdhw, 2, mask),
            Err(ReshapeTypeError::FullSizeMismatch {
                encoded: 4,
                expected: 5,
                ..
            })
        ));
        assert!(matches!(
            reshape_type_from_mask(NCHW, 3, mask),
            Err(ReshapeTypeError::RankMismatch { kept: 2, rank: 3, .. })
        ));
        assert!(matches!(
            reshape_type_from_mask(NCHW, 2, mask | (1 << 7)),
            Err(ReshapeTypeError::StrayBits { .. })
        ));
        let err = reshape_type_from_mask(NCHW, 2, 0).unwrap_err();
        assert!(err.to_string().contains("full size 0"));
    }

    #[test]
    fn test_expand_by_mask_matches_string_form() {
        let shape = dims![7, 9];
        let mask = generate_reshape_type(PrimaryFormat::Hwcn, NC1HWC0, 2, "");
        let reshape_type = reshape_type_from_mask(PrimaryFormat::Hwcn, 2, mask).unwrap();
        assert_eq!(reshape_type, "CN");
        assert_eq!(
            expand_by_mask(mask, &shape),
            expand_dimension(PrimaryFormat::Hwcn, NC1HWC0, &reshape_type, &shape)
        );
        assert_eq!(expand_by_mask(mask, &shape), dims![1, 1, 7, 9]);
    }

    #[test]
    fn test_expand_by_mask_noops() {
        assert_eq!(expand_by_mask(0, &dims![3]), dims![3]);
        let mask = reshape_type_to_mask(NCHW, 1, "C").unwrap();
        assert_eq!(expand_by_mask(mask, &dims![3, 4]), dims![3, 4]);
        assert_eq!(expand_by_mask(mask, &dims![1, 2, 3, 4]), dims![1, 2, 3, 4]);
    }

    #[traced_test]
    #[test]
    fn test_expand_by_mask_rejects_wide_full_size() {
        assert_eq!(expand_by_mask(64i64 << 56, &dims![3]), dims![3]);
        assert_eq!(expand_by_mask(-1, &dims![3, 4]), dims![3, 4]);
        assert_eq!(expand_by_mask((57i64 << 56) | 1, &dims![3]), dims![3]);
        assert!(logs_contain("encodes full size 64"));
    }

    #[test]
    fn test_non_ascii_reshape_type() {
        assert!(matches!(
            reshape_type_to_mask(NCHW, 1, "C\u{e9}"),
            Err(ReshapeTypeError::Invalid { .. })
        ));
        assert!(!is_valid_reshape_type(NCHW, "\u{e9}C"));
        assert_eq!(
            generate_reshape_type(NCHW, NC1HWC0, 1, "C\u{e9}"),
            generate_reshape_type(NCHW, NC1HWC0, 1, "")
        );
        assert_eq!(
            expand_dimension(NCHW, NC1HWC0, "\u{e9}", &dims![5]),
            dims![1, 5, 1, 1]
        );
    }

    proptest! {
        #[test]
        fn test_mask_round_trip(
            origin in gen_origin_format(),
            dst in gen_format(),
            (rank, shape) in (0usize..6).prop_flat_map(|rank| (Just(rank), gen_shape(rank))),
            hint in prop::sample::select(vec!["", "FORBIDDEN", "C", "HW", "NC", "CDH", "WN", "DHWC"]),
        ) {
            let mask = generate_reshape_type(origin, dst, rank, hint);
            if mask == 0 {
                prop_assert_eq!(expand_dimension(origin, dst, hint, &shape), shape);
            } else {
                let reshape_type = reshape_type_from_mask(origin, rank, mask).unwrap();
                prop_assert_eq!(reshape_type_to_mask(origin, rank, &reshape_type).unwrap(), mask);
                prop_assert_eq!(
                    expand_dimension(origin, dst, &reshape_type, &shape),
                    expand_by_mask(mask, &shape)
                );
                prop_assert_eq!(
                    expand_dimension(origin, dst, hint, &shape),
                    expand_by_mask(mask, &shape)
                );
            }
        }
    }
}
