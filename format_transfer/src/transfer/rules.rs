/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Per-destination assembly rules.
//!
//! Each rule returns `Ok(None)` when it does not apply to its input
//! (the caller then echoes the shape back) and `Err(DimOverflow)`
//! when a dimension product leaves the `i64` range.

use crate::format::Format;
use crate::format::PrimaryFormat;
use crate::layout::AxisSource;
use crate::shape::ExtAxisValue;
use crate::shape::Shape;
use crate::shape::UNKNOWN_DIM;
use crate::transfer::DimOverflow;
use crate::utils::arith::align_up;
use crate::utils::arith::checked_dim_mul;
use crate::utils::arith::checked_dim_product;
use crate::utils::arith::division_ceiling;
use crate::utils::arith::gcd;
use crate::utils::arith::lcm;

/// Edge of the cube tile along the output-channel and LSTM axes.
pub const CUBE_TILE: i64 = 16;

/// Lane count of the `_C04` layouts.
pub(crate) const C04: i64 = 4;

const WINO_TILE: i64 = 2;
const WINO_INNER: i64 = 8;
const NYUV_H_ALIGN: i64 = 16;
const NYUV_W_ALIGN: i64 = 64;

pub(crate) type Assembled = Result<Option<Vec<i64>>, DimOverflow>;

fn mul(a: i64, b: i64) -> Result<i64, DimOverflow> {
    checked_dim_mul(a, b).ok_or(DimOverflow)
}

fn product(dims: &[i64]) -> Result<i64, DimOverflow> {
    checked_dim_product(dims).ok_or(DimOverflow)
}

fn add(a: i64, b: i64) -> Result<i64, DimOverflow> {
    if a < 0 || b < 0 {
        return Ok(UNKNOWN_DIM);
    }
    a.checked_add(b).ok_or(DimOverflow)
}

fn align(a: i64, unit: i64) -> Result<i64, DimOverflow> {
    align_up(a, unit).ok_or(DimOverflow)
}

/// The channel rescaling applied to a grouped convolution weight so
/// that every group starts on a tile boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupEnlarge {
    /// How many groups are merged into one.
    pub enlarge: i64,
    /// Group count after merging, G'.
    pub groups: i64,
    /// Input channels per merged group, Cin'.
    pub cin: i64,
    /// Output channels per merged group, Cout'.
    pub cout: i64,
    /// `ceil(Cin', C0)`.
    pub c1: i64,
}

/// Computes the group enlargement for `group` groups of `cin` input
/// and `cout` output channels each.
///
/// `Ok(None)` means no enlargement applies: a channel count is zero
/// or the group count is not above one.
///
/// ```
/// use format_transfer::transfer::group_enlarge;
///
/// let e = group_enlarge(8, 16, 16, 4).unwrap().unwrap();
/// assert_eq!((e.enlarge, e.groups, e.cin, e.cout, e.c1), (2, 2, 16, 32, 1));
/// ```
pub fn group_enlarge(
    cin: i64,
    cout: i64,
    c0: i64,
    group: i64,
) -> Result<Option<GroupEnlarge>, DimOverflow> {
    if group <= 1 || cin == 0 || cout == 0 || c0 <= 0 {
        return Ok(None);
    }
    let factor = lcm(c0 / gcd(cin, c0), CUBE_TILE / gcd(cout, CUBE_TILE)).ok_or(DimOverflow)?;
    let enlarge = factor.min(group);
    if enlarge <= 0 {
        return Ok(None);
    }
    let cin = mul(cin, enlarge)?;
    Ok(Some(GroupEnlarge {
        enlarge,
        groups: division_ceiling(group, enlarge),
        cin,
        cout: mul(cout, enlarge)?,
        c1: division_ceiling(cin, c0),
    }))
}

/// `[.., ceil(d[-1], C0), ceil(d[-2], M0), M0, C0]`, promoting a
/// rank-1 shape to `[1, d]`.
pub(crate) fn fractal_nz(shape: &Shape, c0: i64, m0: i64) -> Vec<i64> {
    let mut dims = shape.dims().to_vec();
    if dims.len() == 1 {
        dims.insert(0, 1);
    }
    let rank = dims.len();
    let (rows, cols) = (dims[rank - 2], dims[rank - 1]);
    dims.truncate(rank - 2);
    dims.extend([
        division_ceiling(cols, c0),
        division_ceiling(rows, m0),
        m0,
        c0,
    ]);
    dims
}

/// Assembles `dst` from a full set of axis values. `shape` is the
/// (full-rank) shape the axes were read from; the recurrent rules
/// read its trailing dims directly.
pub(crate) fn assemble<S: AxisSource>(dst: &Format, axes: &S, shape: &Shape) -> Assembled {
    let (n, h, w, d, c0) = (axes.n(), axes.h(), axes.w(), axes.d(), axes.c0());
    let packed = match dst.primary() {
        PrimaryFormat::Nc1hwc0 | PrimaryFormat::Nc1hwc0C04 => vec![n, axes.c1(), h, w, c0],
        PrimaryFormat::C1hwc0 => vec![division_ceiling(n, c0), h, w, c0],
        PrimaryFormat::Ndc1hwc0 => vec![n, d, axes.c1(), h, w, c0],
        PrimaryFormat::C1hwncoc0 => vec![
            axes.c1(),
            h,
            w,
            division_ceiling(n, CUBE_TILE),
            axes.co(),
            c0,
        ],
        PrimaryFormat::FractalZ | PrimaryFormat::FractalZ3d => fractal_z(axes, dst.group())?,
        PrimaryFormat::FractalZ3dTranspose => vec![
            product(&[division_ceiling(n, CUBE_TILE), d, h, w])?,
            axes.c1(),
            CUBE_TILE,
            c0,
        ],
        PrimaryFormat::FractalZC04 => vec![
            division_ceiling(product(&[C04, h, w])?, c0),
            division_ceiling(n, CUBE_TILE),
            CUBE_TILE,
            c0,
        ],
        PrimaryFormat::FractalZnLstm => lstm(axes.lstm_hidden(), axes.c())?,
        PrimaryFormat::FractalZWino => vec![
            axes.c1(),
            division_ceiling(n, CUBE_TILE),
            WINO_TILE,
            mul(h, w)?,
            WINO_INNER,
            c0,
        ],
        PrimaryFormat::NyuvA => vec![
            n,
            align(h, NYUV_H_ALIGN)?,
            align(w, NYUV_W_ALIGN)?,
            axes.c(),
        ],
        PrimaryFormat::FractalZnRnn => return zn_rnn(shape, &axes.ext(), c0),
        PrimaryFormat::NdRnnBias => return rnn_bias(shape, &axes.ext(), c0),
        // FRACTAL_NZ is assembled from trailing dims before any axis
        // is read.
        PrimaryFormat::FractalNz
        | PrimaryFormat::FractalNzC0_2
        | PrimaryFormat::FractalNzC0_4
        | PrimaryFormat::FractalNzC0_8
        | PrimaryFormat::FractalNzC0_16
        | PrimaryFormat::FractalNzC0_32 => return Ok(None),
        PrimaryFormat::Nchw
        | PrimaryFormat::Nhwc
        | PrimaryFormat::Nd
        | PrimaryFormat::Chwn
        | PrimaryFormat::Hwcn
        | PrimaryFormat::Ndhwc
        | PrimaryFormat::Ncdhw
        | PrimaryFormat::Dhwcn
        | PrimaryFormat::Dhwnc
        | PrimaryFormat::Nyuv => return Ok(None),
    };
    Ok(Some(packed))
}

/// Assembles `dst` from a shape that stayed below its origin's full
/// rank: only the rules that read trailing dims apply.
pub(crate) fn assemble_trailing(
    dst: &Format,
    shape: &Shape,
    c0: i64,
    ext: &ExtAxisValue,
) -> Assembled {
    match (dst.primary(), shape.dims()) {
        (PrimaryFormat::FractalZ, &[rows, cols]) => Ok(Some(vec![
            division_ceiling(rows, c0),
            division_ceiling(cols, CUBE_TILE),
            CUBE_TILE,
            c0,
        ])),
        (PrimaryFormat::FractalZnLstm, &[n, c]) => {
            let hidden = if n < 0 { UNKNOWN_DIM } else { n / 4 };
            lstm(hidden, c).map(Some)
        }
        (PrimaryFormat::FractalZnRnn, _) => zn_rnn(shape, ext, c0),
        (PrimaryFormat::NdRnnBias, _) => rnn_bias(shape, ext, c0),
        _ => Ok(None),
    }
}

fn fractal_z<S: AxisSource>(axes: &S, group: i64) -> Result<Vec<i64>, DimOverflow> {
    let (n, c, h, w, d, c0) = (axes.n(), axes.c(), axes.h(), axes.w(), axes.d(), axes.c0());
    if group > 1 && n >= group {
        if let Some(e) = group_enlarge(c, n / group, c0, group)? {
            let first = if [c, h, w, d].iter().any(|&x| x < 0) {
                UNKNOWN_DIM
            } else {
                product(&[e.groups, e.c1, d, h, w])?
            };
            return Ok(vec![first, division_ceiling(e.cout, CUBE_TILE), CUBE_TILE, c0]);
        }
    }
    Ok(vec![
        product(&[axes.c1(), d, h, w])?,
        division_ceiling(n, CUBE_TILE),
        CUBE_TILE,
        c0,
    ])
}

/// Four gates of `hidden` outputs over `c = input + hidden` inputs.
fn lstm(hidden: i64, c: i64) -> Result<Vec<i64>, DimOverflow> {
    let input = if c < 0 || hidden < 0 {
        UNKNOWN_DIM
    } else {
        c - hidden
    };
    let hidden_tiles = division_ceiling(hidden, CUBE_TILE);
    Ok(vec![
        add(division_ceiling(input, CUBE_TILE), hidden_tiles)?,
        mul(hidden_tiles, 4)?,
        CUBE_TILE,
        CUBE_TILE,
    ])
}

/// Output tiles of a gate-stacked recurrent weight: `N / hidden`
/// gates of `ceil(hidden, C0)` tiles each.
fn gate_tiles(n: i64, hidden: i64, c0: i64) -> Result<i64, DimOverflow> {
    let gates = if n < 0 { UNKNOWN_DIM } else { n / hidden };
    mul(gates, division_ceiling(hidden, c0))
}

fn zn_rnn(shape: &Shape, ext: &ExtAxisValue, c0: i64) -> Assembled {
    let rank = shape.rank();
    let hidden = ext.hidden_size;
    if rank < 2 || hidden <= 0 {
        tracing::debug!(
            "FRACTAL_ZN_RNN needs rank >= 2 and a hidden size, got {} with hidden size {}",
            shape,
            hidden
        );
        return Ok(None);
    }
    let (input, state) = (ext.input_size, ext.effective_state_size());
    let (k, n) = (shape[rank - 2], shape[rank - 1]);
    let new_k = if Some(k) == input.checked_add(state) {
        add(
            division_ceiling(input, CUBE_TILE),
            division_ceiling(state, CUBE_TILE),
        )?
    } else if k == input || k == state {
        division_ceiling(k, CUBE_TILE)
    } else {
        tracing::debug!(
            "FRACTAL_ZN_RNN K axis {} matches neither input size {} nor state size {}",
            k,
            input,
            state
        );
        return Ok(None);
    };
    let mut dims = shape.dims()[..rank - 2].to_vec();
    dims.extend([new_k, gate_tiles(n, hidden, c0)?, CUBE_TILE, c0]);
    Ok(Some(dims))
}

fn rnn_bias(shape: &Shape, ext: &ExtAxisValue, c0: i64) -> Assembled {
    let hidden = ext.hidden_size;
    let Some(&n) = shape.dims().last() else {
        return Ok(None);
    };
    if hidden <= 0 {
        return Ok(None);
    }
    let mut dims = shape.dims().to_vec();
    let last = dims.len() - 1;
    dims[last] = mul(gate_tiles(n, hidden, c0)?, c0)?;
    Ok(Some(dims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisValue;
    use crate::axis::decode;
    use crate::dims;

    fn axes(format: PrimaryFormat, shape: &Shape, c0: i64) -> AxisValue {
        let mut value = AxisValue::with_c0(c0);
        decode(format, shape, &mut value).unwrap();
        value
    }

    #[test]
    fn test_group_enlarge_chain() {
        let e = group_enlarge(8, 16, 16, 4).unwrap().unwrap();
        assert_eq!(e.enlarge, 2);
        assert_eq!(e.groups, 2);
        assert_eq!(e.cin, 16);
        assert_eq!(e.cout, 32);
        assert_eq!(e.c1, 1);
    }

    #[test]
    fn test_group_enlarge_not_applicable() {
        assert_eq!(group_enlarge(0, 16, 16, 4).unwrap(), None);
        assert_eq!(group_enlarge(8, 0, 16, 4).unwrap(), None);
        assert_eq!(group_enlarge(8, 16, 16, 1).unwrap(), None);
        // Capped by the group count.
        let e = group_enlarge(1, 1, 16, 3).unwrap().unwrap();
        assert_eq!((e.enlarge, e.groups), (3, 1));
    }

    #[test]
    fn test_group_enlarge_overflow() {
        assert_eq!(group_enlarge(i64::MAX, 16, 16, 4), Err(DimOverflow));
    }

    #[test]
    fn test_fractal_z_grouped() {
        let value = axes(PrimaryFormat::Nchw, &dims![64, 8, 3, 3], 16);
        let dst = Format::with_group(PrimaryFormat::FractalZ, 4);
        assert_eq!(
            assemble(&dst, &value, &dims![64, 8, 3, 3]).unwrap(),
            Some(vec![18, 2, 16, 16])
        );
        // Fewer output channels than groups: no enlargement.
        let value = axes(PrimaryFormat::Nchw, &dims![2, 8, 3, 3], 16);
        assert_eq!(
            assemble(&dst, &value, &dims![2, 8, 3, 3]).unwrap(),
            Some(vec![9, 1, 16, 16])
        );
    }

    #[test]
    fn test_fractal_z_unknown_spatial() {
        let shape = dims![64, 8, -1, 3];
        let value = axes(PrimaryFormat::Nchw, &shape, 16);
        let dst = Format::with_group(PrimaryFormat::FractalZ, 4);
        assert_eq!(assemble(&dst, &value, &shape).unwrap(), Some(vec![-1, 2, 16, 16]));
        let dst = Format::new(PrimaryFormat::FractalZ);
        assert_eq!(assemble(&dst, &value, &shape).unwrap(), Some(vec![-1, 4, 16, 16]));
    }

    #[test]
    fn test_fixed_rules() {
        let shape = dims![33, 20, 5, 7];
        let value = axes(PrimaryFormat::Nchw, &shape, 16);
        let cases = [
            (PrimaryFormat::C1hwc0, vec![3, 5, 7, 16]),
            (PrimaryFormat::C1hwncoc0, vec![2, 5, 7, 3, 16, 16]),
            (PrimaryFormat::FractalZ3dTranspose, vec![105, 2, 16, 16]),
            (PrimaryFormat::FractalZC04, vec![9, 3, 16, 16]),
            (PrimaryFormat::FractalZWino, vec![2, 3, 2, 35, 8, 16]),
            (PrimaryFormat::NyuvA, vec![33, 16, 64, 20]),
            (PrimaryFormat::Nyuv, vec![]),
        ];
        for (dst, expected) in cases {
            let packed = assemble(&Format::new(dst), &value, &shape).unwrap();
            if expected.is_empty() {
                assert_eq!(packed, None, "{dst}");
            } else {
                assert_eq!(packed, Some(expected), "{dst}");
            }
        }
    }

    #[test]
    fn test_lstm() {
        // Four gates of 32 over 16 inputs.
        let shape = dims![128, 48, 1, 1];
        let value = axes(PrimaryFormat::Nchw, &shape, 16);
        let dst = Format::new(PrimaryFormat::FractalZnLstm);
        assert_eq!(assemble(&dst, &value, &shape).unwrap(), Some(vec![3, 8, 16, 16]));
        assert_eq!(
            assemble_trailing(&dst, &dims![128, 48], 16, &ExtAxisValue::default()).unwrap(),
            Some(vec![3, 8, 16, 16])
        );
    }

    #[test]
    fn test_fractal_nz() {
        assert_eq!(fractal_nz(&dims![18, 34], 16, 16), vec![3, 2, 16, 16]);
        assert_eq!(fractal_nz(&dims![4, 18, 34], 32, 16), vec![4, 2, 2, 16, 32]);
        assert_eq!(fractal_nz(&dims![34], 16, 16), vec![3, 1, 16, 16]);
        assert_eq!(fractal_nz(&dims![-1, 34], 16, 16), vec![3, -1, 16, 16]);
    }

    #[test]
    fn test_zn_rnn() {
        let c0 = 16;
        let ext = ExtAxisValue::rnn(20, 30);
        // K = input + hidden.
        assert_eq!(
            zn_rnn(&dims![50, 120], &ext, c0).unwrap(),
            Some(vec![4, 8, 16, 16])
        );
        // K = input only.
        assert_eq!(
            zn_rnn(&dims![2, 20, 120], &ext, c0).unwrap(),
            Some(vec![2, 2, 8, 16, 16])
        );
        // K matches nothing.
        assert_eq!(zn_rnn(&dims![49, 120], &ext, c0).unwrap(), None);
        // No hidden size.
        assert_eq!(
            zn_rnn(&dims![50, 120], &ExtAxisValue::default(), c0).unwrap(),
            None
        );
        // State size overrides hidden size for K.
        let ext = ExtAxisValue::from_array([20, 30, 10, 0]);
        assert_eq!(
            zn_rnn(&dims![30, 120], &ext, c0).unwrap(),
            Some(vec![3, 8, 16, 16])
        );
    }

    #[test]
    fn test_rnn_bias() {
        let ext = ExtAxisValue::rnn(20, 30);
        assert_eq!(rnn_bias(&dims![120], &ext, 16).unwrap(), Some(vec![128]));
        assert_eq!(rnn_bias(&dims![-1], &ext, 16).unwrap(), Some(vec![-1]));
        assert_eq!(
            rnn_bias(&dims![120], &ExtAxisValue::default(), 16).unwrap(),
            None
        );
        assert_eq!(rnn_bias(&Shape::scalar(), &ext, 16).unwrap(), None);
    }

    #[test]
    fn test_overflow() {
        let shape = dims![1, 16, i64::MAX, 3];
        let value = axes(PrimaryFormat::Nchw, &shape, 16);
        assert_eq!(
            assemble(&Format::new(PrimaryFormat::FractalZ), &value, &shape),
            Err(DimOverflow)
        );
    }
}
