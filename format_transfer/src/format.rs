/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Tensor layouts and element types.
//!
//! A [`Format`] is the structured form of the packed integer used on
//! the wire: the low byte names the [`PrimaryFormat`], bits 8..24
//! carry a sub value (the convolution group count of grouped
//! FRACTAL_Z weights) and bits 24..28 an optional explicit C0 code.
//! Raw values are decoded once at the API boundary with
//! [`Format::from_raw`]; everything below works on the structured
//! form.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::parse::Parser;
use crate::parse::ParserError;

/// Errors that can occur while decoding formats and data types.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FormatError {
    #[error("unknown primary format tag {tag} in raw format {raw:#x}")]
    UnknownPrimary { tag: u8, raw: i32 },

    #[error("unknown format name `{name}`")]
    UnknownName { name: String },

    #[error("raw format {raw:#x} has bits set above the c0 field")]
    ReservedBits { raw: i32 },

    #[error("c0 {c0} is not a power of two in 1..=16384")]
    InvalidC0 { c0: i64 },

    #[error("c0 code {code} is above the largest code 15")]
    InvalidC0Code { code: u8 },

    #[error("data type {raw} is outside the valid range")]
    InvalidDataType { raw: i32 },

    #[error("unknown data type name `{name}`")]
    UnknownDataTypeName { name: String },

    #[error(transparent)]
    Parse(#[from] ParserError),
}

/// The primary component of a tensor layout.
///
/// Origin (user-facing) layouts and packed (hardware) layouts share
/// one closed enum so that every dispatch over destination layouts is
/// an exhaustive `match`.
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
#[allow(non_camel_case_types)]
pub enum PrimaryFormat {
    #[serde(rename = "NCHW")]
    Nchw,
    #[serde(rename = "NHWC")]
    Nhwc,
    #[serde(rename = "ND")]
    Nd,
    #[serde(rename = "NC1HWC0")]
    Nc1hwc0,
    #[serde(rename = "FRACTAL_Z")]
    FractalZ,
    #[serde(rename = "NC1HWC0_C04")]
    Nc1hwc0C04,
    #[serde(rename = "FRACTAL_Z_C04")]
    FractalZC04,
    #[serde(rename = "CHWN")]
    Chwn,
    #[serde(rename = "HWCN")]
    Hwcn,
    #[serde(rename = "C1HWNCoC0")]
    C1hwncoc0,
    #[serde(rename = "NDHWC")]
    Ndhwc,
    #[serde(rename = "FRACTAL_NZ")]
    FractalNz,
    #[serde(rename = "NCDHW")]
    Ncdhw,
    #[serde(rename = "DHWCN")]
    Dhwcn,
    #[serde(rename = "NDC1HWC0")]
    Ndc1hwc0,
    #[serde(rename = "FRACTAL_Z_3D")]
    FractalZ3d,
    #[serde(rename = "DHWNC")]
    Dhwnc,
    #[serde(rename = "FRACTAL_Z_3D_TRANSPOSE")]
    FractalZ3dTranspose,
    #[serde(rename = "FRACTAL_ZN_LSTM")]
    FractalZnLstm,
    #[serde(rename = "ND_RNN_BIAS")]
    NdRnnBias,
    #[serde(rename = "FRACTAL_ZN_RNN")]
    FractalZnRnn,
    #[serde(rename = "NYUV")]
    Nyuv,
    #[serde(rename = "NYUV_A")]
    NyuvA,
    #[serde(rename = "FRACTAL_Z_WINO")]
    FractalZWino,
    #[serde(rename = "C1HWC0")]
    C1hwc0,
    #[serde(rename = "FRACTAL_NZ_C0_16")]
    FractalNzC0_16,
    #[serde(rename = "FRACTAL_NZ_C0_32")]
    FractalNzC0_32,
    #[serde(rename = "FRACTAL_NZ_C0_2")]
    FractalNzC0_2,
    #[serde(rename = "FRACTAL_NZ_C0_4")]
    FractalNzC0_4,
    #[serde(rename = "FRACTAL_NZ_C0_8")]
    FractalNzC0_8,
}

// (format, wire tag, canonical name)
const PRIMARY_TABLE: &[(PrimaryFormat, u8, &str)] = &[
    (PrimaryFormat::Nchw, 0, "NCHW"),
    (PrimaryFormat::Nhwc, 1, "NHWC"),
    (PrimaryFormat::Nd, 2, "ND"),
    (PrimaryFormat::Nc1hwc0, 3, "NC1HWC0"),
    (PrimaryFormat::FractalZ, 4, "FRACTAL_Z"),
    (PrimaryFormat::Nc1hwc0C04, 12, "NC1HWC0_C04"),
    (PrimaryFormat::FractalZC04, 13, "FRACTAL_Z_C04"),
    (PrimaryFormat::Chwn, 14, "CHWN"),
    (PrimaryFormat::Hwcn, 16, "HWCN"),
    (PrimaryFormat::C1hwncoc0, 25, "C1HWNCoC0"),
    (PrimaryFormat::Ndhwc, 27, "NDHWC"),
    (PrimaryFormat::FractalNz, 29, "FRACTAL_NZ"),
    (PrimaryFormat::Ncdhw, 30, "NCDHW"),
    (PrimaryFormat::Dhwcn, 31, "DHWCN"),
    (PrimaryFormat::Ndc1hwc0, 32, "NDC1HWC0"),
    (PrimaryFormat::FractalZ3d, 33, "FRACTAL_Z_3D"),
    (PrimaryFormat::Dhwnc, 36, "DHWNC"),
    (PrimaryFormat::FractalZ3dTranspose, 37, "FRACTAL_Z_3D_TRANSPOSE"),
    (PrimaryFormat::FractalZnLstm, 38, "FRACTAL_ZN_LSTM"),
    (PrimaryFormat::NdRnnBias, 43, "ND_RNN_BIAS"),
    (PrimaryFormat::FractalZnRnn, 44, "FRACTAL_ZN_RNN"),
    (PrimaryFormat::Nyuv, 45, "NYUV"),
    (PrimaryFormat::NyuvA, 46, "NYUV_A"),
    (PrimaryFormat::FractalZWino, 48, "FRACTAL_Z_WINO"),
    (PrimaryFormat::C1hwc0, 49, "C1HWC0"),
    (PrimaryFormat::FractalNzC0_16, 50, "FRACTAL_NZ_C0_16"),
    (PrimaryFormat::FractalNzC0_32, 51, "FRACTAL_NZ_C0_32"),
    (PrimaryFormat::FractalNzC0_2, 52, "FRACTAL_NZ_C0_2"),
    (PrimaryFormat::FractalNzC0_4, 53, "FRACTAL_NZ_C0_4"),
    (PrimaryFormat::FractalNzC0_8, 54, "FRACTAL_NZ_C0_8"),
];

impl PrimaryFormat {
    /// The wire tag stored in the low byte of a raw format.
    pub fn code(self) -> u8 {
        PRIMARY_TABLE
            .iter()
            .find(|(f, _, _)| *f == self)
            .map(|(_, code, _)| *code)
            .unwrap_or_default()
    }

    /// Looks up a primary format by its wire tag.
    pub fn from_code(code: u8) -> Option<Self> {
        PRIMARY_TABLE
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(f, _, _)| *f)
    }

    /// The canonical upper-case name, e.g. `FRACTAL_Z_3D`.
    pub fn name(self) -> &'static str {
        PRIMARY_TABLE
            .iter()
            .find(|(f, _, _)| *f == self)
            .map(|(_, _, name)| *name)
            .unwrap_or("UNKNOWN")
    }

    /// Every primary format, in wire-tag order.
    pub fn all() -> impl Iterator<Item = PrimaryFormat> {
        PRIMARY_TABLE.iter().map(|(f, _, _)| *f)
    }

    /// Whether this is FRACTAL_NZ or one of its tile-width variants.
    pub fn is_fractal_nz(self) -> bool {
        matches!(
            self,
            PrimaryFormat::FractalNz
                | PrimaryFormat::FractalNzC0_2
                | PrimaryFormat::FractalNzC0_4
                | PrimaryFormat::FractalNzC0_8
                | PrimaryFormat::FractalNzC0_16
                | PrimaryFormat::FractalNzC0_32
        )
    }

    /// The C0 hard-coded by a FRACTAL_NZ tile-width variant.
    pub fn nz_c0(self) -> Option<i64> {
        match self {
            PrimaryFormat::FractalNzC0_2 => Some(2),
            PrimaryFormat::FractalNzC0_4 => Some(4),
            PrimaryFormat::FractalNzC0_8 => Some(8),
            PrimaryFormat::FractalNzC0_16 => Some(16),
            PrimaryFormat::FractalNzC0_32 => Some(32),
            _ => None,
        }
    }

    /// Whether this is one of the recurrent-network weight layouts
    /// whose math depends on [`crate::ExtAxisValue`].
    pub fn is_rnn(self) -> bool {
        matches!(self, PrimaryFormat::FractalZnRnn | PrimaryFormat::NdRnnBias)
    }

    /// Whether this layout can describe a logical (origin) shape.
    pub fn is_origin(self) -> bool {
        matches!(
            self,
            PrimaryFormat::Nchw
                | PrimaryFormat::Nhwc
                | PrimaryFormat::Hwcn
                | PrimaryFormat::Chwn
                | PrimaryFormat::Nd
                | PrimaryFormat::Ndhwc
                | PrimaryFormat::Ncdhw
                | PrimaryFormat::Dhwcn
                | PrimaryFormat::Dhwnc
        )
    }
}

impl fmt::Display for PrimaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PrimaryFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PRIMARY_TABLE
            .iter()
            .find(|(_, _, name)| name.eq_ignore_ascii_case(s.trim()))
            .map(|(f, _, _)| *f)
            .ok_or_else(|| FormatError::UnknownName {
                name: s.to_string(),
            })
    }
}

const PRIMARY_MASK: i32 = 0xff;
const SUB_SHIFT: u32 = 8;
const SUB_MASK: i32 = 0xffff;
const C0_SHIFT: u32 = 24;
const C0_MASK: i32 = 0xf;
const MAX_C0_CODE: u8 = 15;

/// A tensor layout: a primary format plus its sub components.
///
/// ```
/// use format_transfer::Format;
/// use format_transfer::PrimaryFormat;
///
/// let f = Format::with_group(PrimaryFormat::FractalZ, 4);
/// assert_eq!(f.to_raw(), (4 << 8) | 4);
/// assert_eq!(Format::from_raw(f.to_raw()).unwrap(), f);
/// assert_eq!(f.to_string(), "FRACTAL_Z:4");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "FormatFields")]
pub struct Format {
    primary: PrimaryFormat,
    /// Group count for grouped convolution weights; 0 when unset.
    sub: u16,
    /// Explicit C0 code `k` (C0 = 2^(k-1)); 0 when unset.
    c0_code: u8,
}

/// The serialized fields of a [`Format`], checked before use.
#[derive(Deserialize)]
struct FormatFields {
    primary: PrimaryFormat,
    #[serde(default)]
    sub: u16,
    #[serde(default)]
    c0_code: u8,
}

impl TryFrom<FormatFields> for Format {
    type Error = FormatError;

    fn try_from(fields: FormatFields) -> Result<Self, Self::Error> {
        if fields.c0_code > MAX_C0_CODE {
            return Err(FormatError::InvalidC0Code {
                code: fields.c0_code,
            });
        }
        Ok(Self {
            primary: fields.primary,
            sub: fields.sub,
            c0_code: fields.c0_code,
        })
    }
}

impl Format {
    /// A format with no sub components.
    pub const fn new(primary: PrimaryFormat) -> Self {
        Self {
            primary,
            sub: 0,
            c0_code: 0,
        }
    }

    /// A format carrying a convolution group count.
    pub const fn with_group(primary: PrimaryFormat, group: u16) -> Self {
        Self {
            primary,
            sub: group,
            c0_code: 0,
        }
    }

    /// Returns this format with an explicit C0, which overrides the
    /// per-dtype tiling constant.
    pub fn with_c0(self, c0: i64) -> Result<Self, FormatError> {
        if c0 <= 0 || c0.count_ones() != 1 {
            return Err(FormatError::InvalidC0 { c0 });
        }
        let code = c0.trailing_zeros() + 1;
        if code > u32::from(MAX_C0_CODE) {
            return Err(FormatError::InvalidC0 { c0 });
        }
        Ok(Self {
            c0_code: code as u8,
            ..self
        })
    }

    /// Decodes a raw wire format.
    pub fn from_raw(raw: i32) -> Result<Self, FormatError> {
        if raw < 0 || (raw >> (C0_SHIFT + 4)) != 0 {
            return Err(FormatError::ReservedBits { raw });
        }
        let tag = (raw & PRIMARY_MASK) as u8;
        let primary =
            PrimaryFormat::from_code(tag).ok_or(FormatError::UnknownPrimary { tag, raw })?;
        Ok(Self {
            primary,
            sub: ((raw >> SUB_SHIFT) & SUB_MASK) as u16,
            c0_code: ((raw >> C0_SHIFT) & C0_MASK) as u8,
        })
    }

    /// Encodes this format into its raw wire form.
    pub fn to_raw(&self) -> i32 {
        i32::from(self.primary.code())
            | (i32::from(self.sub) << SUB_SHIFT)
            | (i32::from(self.c0_code) << C0_SHIFT)
    }

    pub fn primary(&self) -> PrimaryFormat {
        self.primary
    }

    /// The raw sub value; 0 when absent.
    pub fn sub(&self) -> u16 {
        self.sub
    }

    /// The convolution group count, 1 when absent.
    pub fn group(&self) -> i64 {
        i64::from(self.sub.max(1))
    }

    /// The C0 requested by the format itself, if any. FRACTAL_NZ
    /// tile-width variants always carry one.
    pub fn explicit_c0(&self) -> Option<i64> {
        if let Some(c0) = self.primary.nz_c0() {
            return Some(c0);
        }
        (self.c0_code > 0).then(|| 1i64 << (self.c0_code - 1))
    }
}

impl From<PrimaryFormat> for Format {
    fn from(primary: PrimaryFormat) -> Self {
        Format::new(primary)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if self.sub != 0 {
            write!(f, ":{}", self.sub)?;
        }
        if self.c0_code != 0 {
            write!(f, "@{}", 1i64 << (self.c0_code - 1))?;
        }
        Ok(())
    }
}

/// Parses `NAME`, `NAME:GROUP`, `NAME@C0` or `NAME:GROUP@C0`.
impl FromStr for Format {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser::new(s, &[":", "@"]);
        let name = parser.next_or_err("format name")?;
        let mut format = Format::new(name.parse()?);
        if parser.peek() == Some(":") {
            parser.expect(":")?;
            format.sub = parser.try_parse::<u16>()?;
        }
        if parser.peek() == Some("@") {
            parser.expect("@")?;
            format = format.with_c0(parser.try_parse::<i64>()?)?;
        }
        parser.finish("end of input")?;
        Ok(format)
    }
}

/// Element data types. Only used to look up tiling constants.
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Float,
    Float16,
    Int8,
    Int32,
    Uint8,
    Int16,
    Uint16,
    Uint32,
    Int64,
    Uint64,
    Double,
    Bool,
    Complex64,
    Complex128,
    Bf16,
    Int4,
    Hifloat8,
    Float8E5m2,
    Float8E4m3fn,
}

// (dtype, wire code, bit width, canonical name)
const DTYPE_TABLE: &[(DataType, i32, u32, &str)] = &[
    (DataType::Float, 0, 32, "FLOAT"),
    (DataType::Float16, 1, 16, "FLOAT16"),
    (DataType::Int8, 2, 8, "INT8"),
    (DataType::Int32, 3, 32, "INT32"),
    (DataType::Uint8, 4, 8, "UINT8"),
    (DataType::Int16, 6, 16, "INT16"),
    (DataType::Uint16, 7, 16, "UINT16"),
    (DataType::Uint32, 8, 32, "UINT32"),
    (DataType::Int64, 9, 64, "INT64"),
    (DataType::Uint64, 10, 64, "UINT64"),
    (DataType::Double, 11, 64, "DOUBLE"),
    (DataType::Bool, 12, 8, "BOOL"),
    (DataType::Complex64, 16, 64, "COMPLEX64"),
    (DataType::Complex128, 17, 128, "COMPLEX128"),
    (DataType::Bf16, 27, 16, "BF16"),
    (DataType::Int4, 29, 4, "INT4"),
    (DataType::Hifloat8, 34, 8, "HIFLOAT8"),
    (DataType::Float8E5m2, 35, 8, "FLOAT8_E5M2"),
    (DataType::Float8E4m3fn, 36, 8, "FLOAT8_E4M3FN"),
];

/// Raw code of the "undefined" sentinel; never a valid data type.
pub const DT_UNDEFINED: i32 = 28;
/// Raw upper bound (exclusive) of valid data type codes.
pub const DT_MAX: i32 = 40;

impl DataType {
    /// Decodes a raw wire data type, rejecting the `UNDEFINED`/`MAX`
    /// sentinels and anything outside the valid range.
    pub fn from_raw(raw: i32) -> Result<Self, FormatError> {
        if !(0..DT_MAX).contains(&raw) || raw == DT_UNDEFINED {
            return Err(FormatError::InvalidDataType { raw });
        }
        DTYPE_TABLE
            .iter()
            .find(|(_, code, _, _)| *code == raw)
            .map(|(dt, _, _, _)| *dt)
            .ok_or(FormatError::InvalidDataType { raw })
    }

    pub fn to_raw(self) -> i32 {
        self.entry().1
    }

    /// Width of one element in bits.
    pub fn bit_width(self) -> u32 {
        self.entry().2
    }

    pub fn name(self) -> &'static str {
        self.entry().3
    }

    /// Every data type, in wire-code order.
    pub fn all() -> impl Iterator<Item = DataType> {
        DTYPE_TABLE.iter().map(|(dt, _, _, _)| *dt)
    }

    fn entry(self) -> &'static (DataType, i32, u32, &'static str) {
        // Every variant has exactly one table row.
        DTYPE_TABLE
            .iter()
            .find(|(dt, _, _, _)| *dt == self)
            .unwrap_or(&DTYPE_TABLE[0])
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("DT_").unwrap_or(s);
        DTYPE_TABLE
            .iter()
            .find(|(_, _, _, name)| name.eq_ignore_ascii_case(s))
            .map(|(dt, _, _, _)| *dt)
            .ok_or_else(|| FormatError::UnknownDataTypeName {
                name: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_table_is_consistent() {
        for format in PrimaryFormat::all() {
            assert_eq!(PrimaryFormat::from_code(format.code()), Some(format));
            assert_eq!(format.name().parse::<PrimaryFormat>().unwrap(), format);
        }
        assert_eq!(PrimaryFormat::from_code(0xfe), None);
    }

    #[test]
    fn test_raw_round_trip() {
        let formats = [
            Format::new(PrimaryFormat::Nchw),
            Format::new(PrimaryFormat::FractalNzC0_32),
            Format::with_group(PrimaryFormat::FractalZ, 4),
            Format::with_group(PrimaryFormat::FractalZ3d, 0xffff),
            Format::new(PrimaryFormat::Nc1hwc0).with_c0(8).unwrap(),
        ];
        for f in formats {
            assert_eq!(Format::from_raw(f.to_raw()).unwrap(), f);
        }
    }

    #[test]
    fn test_raw_layout() {
        let f = Format::with_group(PrimaryFormat::FractalZ, 2)
            .with_c0(16)
            .unwrap();
        assert_eq!(f.to_raw() & 0xff, 4);
        assert_eq!((f.to_raw() >> 8) & 0xffff, 2);
        assert_eq!((f.to_raw() >> 24) & 0xf, 5);
        assert_eq!(f.explicit_c0(), Some(16));
        assert_eq!(f.group(), 2);
    }

    #[test]
    fn test_from_raw_rejects_bad_values() {
        assert!(matches!(
            Format::from_raw(0xfe),
            Err(FormatError::UnknownPrimary { tag: 0xfe, .. })
        ));
        assert!(matches!(
            Format::from_raw(-1),
            Err(FormatError::ReservedBits { .. })
        ));
        assert!(matches!(
            Format::from_raw(1 << 29),
            Err(FormatError::ReservedBits { .. })
        ));
    }

    #[test]
    fn test_explicit_c0() {
        assert_eq!(Format::new(PrimaryFormat::Nchw).explicit_c0(), None);
        assert_eq!(
            Format::new(PrimaryFormat::FractalNzC0_4).explicit_c0(),
            Some(4)
        );
        assert!(Format::new(PrimaryFormat::Nchw).with_c0(12).is_err());
        assert!(Format::new(PrimaryFormat::Nchw).with_c0(0).is_err());
        assert_eq!(
            Format::new(PrimaryFormat::Nchw)
                .with_c0(1)
                .unwrap()
                .explicit_c0(),
            Some(1)
        );
    }

    #[test]
    fn test_format_text() {
        assert_eq!(
            "FRACTAL_Z:4".parse::<Format>().unwrap(),
            Format::with_group(PrimaryFormat::FractalZ, 4)
        );
        assert_eq!(
            "nc1hwc0@8".parse::<Format>().unwrap(),
            Format::new(PrimaryFormat::Nc1hwc0).with_c0(8).unwrap()
        );
        let f = "FRACTAL_Z_3D:2@32".parse::<Format>().unwrap();
        assert_eq!(f.to_string(), "FRACTAL_Z_3D:2@32");
        assert!("FRACTAL_Q".parse::<Format>().is_err());
        assert!("NCHW:x".parse::<Format>().is_err());
        assert!("NCHW:1:2".parse::<Format>().is_err());
    }

    #[test]
    fn test_data_type_range() {
        assert_eq!(DataType::from_raw(1).unwrap(), DataType::Float16);
        assert!(DataType::from_raw(DT_UNDEFINED).is_err());
        assert!(DataType::from_raw(DT_MAX).is_err());
        assert!(DataType::from_raw(-3).is_err());
        // Reserved hole in the numbering.
        assert!(DataType::from_raw(5).is_err());
        for dt in DataType::all() {
            assert_eq!(DataType::from_raw(dt.to_raw()).unwrap(), dt);
            assert_eq!(dt.name().parse::<DataType>().unwrap(), dt);
        }
        assert_eq!("DT_INT8".parse::<DataType>().unwrap(), DataType::Int8);
    }

    #[test]
    fn test_serde_names() {
        let yaml = serde_yaml::to_string(&DataType::Float8E4m3fn).unwrap();
        assert_eq!(yaml.trim(), "FLOAT8_E4M3FN");
        let f: PrimaryFormat = serde_yaml::from_str("FRACTAL_NZ_C0_16").unwrap();
        assert_eq!(f, PrimaryFormat::FractalNzC0_16);
    }

    #[test]
    fn test_format_serde_checks_c0_code() {
        let f: Format = serde_yaml::from_str("primary: NCHW\nc0_code: 5").unwrap();
        assert_eq!(f.explicit_c0(), Some(16));
        let f: Format = serde_yaml::from_str("primary: FRACTAL_Z\nsub: 4").unwrap();
        assert_eq!(f, Format::with_group(PrimaryFormat::FractalZ, 4));

        let err = serde_yaml::from_str::<Format>("primary: NCHW\nc0_code: 100").unwrap_err();
        assert!(err.to_string().contains("c0 code 100"));
        assert!(serde_yaml::from_str::<Format>("primary: NCHW\nc0_code: 16").is_err());

        let f = Format::new(PrimaryFormat::Nc1hwc0).with_c0(8).unwrap();
        let yaml = serde_yaml::to_string(&f).unwrap();
        assert_eq!(serde_yaml::from_str::<Format>(&yaml).unwrap(), f);
    }
}
