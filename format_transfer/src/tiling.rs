/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Per-dtype cube tiling constants (C0, M0, N0).
//!
//! The constants come from the platform the graph is compiled for.
//! A [`TilingTable`] is built once from a [`PlatformInfo`] provider
//! (or from YAML) and then passed by reference into every transform.
//! [`global`] offers a process-wide table for callers that have no
//! natural place to keep one.
//!
//! Entries can be overridden at startup through the
//! `FORMAT_TRANSFER_TILING` environment variable, e.g.
//! `FLOAT16:16/16/16,INT8:32/16/16` (`C0/M0/N0` per dtype).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use serde::Deserialize;
use serde::Serialize;

use crate::format::DataType;
use crate::parse::Parser;
use crate::parse::ParserError;

/// Environment variable holding tiling overrides.
pub const TILING_ENV: &str = "FORMAT_TRANSFER_TILING";

/// The tile edge used when the platform cannot say otherwise.
pub const DEFAULT_TILE: i64 = 16;

/// Tile constants of the cube unit for one data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CubeTiling {
    /// Reduction-axis tile width.
    pub c0: i64,
    /// Row tile height.
    pub m0: i64,
    /// Output-channel tile width.
    pub n0: i64,
}

impl Default for CubeTiling {
    fn default() -> Self {
        Self {
            c0: DEFAULT_TILE,
            m0: DEFAULT_TILE,
            n0: DEFAULT_TILE,
        }
    }
}

impl CubeTiling {
    pub const fn new(c0: i64, m0: i64, n0: i64) -> Self {
        Self { c0, m0, n0 }
    }

    fn is_valid(&self) -> bool {
        self.c0 > 0 && self.m0 > 0 && self.n0 > 0
    }
}

/// A source of platform tiling constants.
pub trait PlatformInfo {
    /// The tiling for `dtype` on this platform.
    fn cube_tiling(&self, dtype: DataType) -> anyhow::Result<CubeTiling>;
}

/// A cube unit described by the byte width of its reduction axis.
///
/// C0 is the number of elements of a dtype that fit in `k_bytes`;
/// 32-bit elements only use the full width when the cube supports
/// fp32 operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CubeProfile {
    pub k_bytes: i64,
    pub m0: i64,
    pub n0: i64,
    pub fp32_cube: bool,
}

impl Default for CubeProfile {
    fn default() -> Self {
        Self {
            k_bytes: 32,
            m0: DEFAULT_TILE,
            n0: DEFAULT_TILE,
            fp32_cube: false,
        }
    }
}

impl PlatformInfo for CubeProfile {
    fn cube_tiling(&self, dtype: DataType) -> anyhow::Result<CubeTiling> {
        if self.k_bytes <= 0 {
            anyhow::bail!("cube K width must be positive, got {} bytes", self.k_bytes);
        }
        let bits = i64::from(dtype.bit_width());
        let c0 = match bits {
            32 if !self.fp32_cube => DEFAULT_TILE,
            4 | 8 | 16 | 32 => self.k_bytes * 8 / bits,
            _ => DEFAULT_TILE,
        };
        Ok(CubeTiling::new(c0, self.m0, self.n0))
    }
}

/// Cube tiling for every data type: a default plus per-dtype entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilingTable {
    #[serde(default)]
    pub default: CubeTiling,
    #[serde(default)]
    pub dtypes: BTreeMap<DataType, CubeTiling>,
}

impl TilingTable {
    /// A table holding `default` for every dtype.
    pub fn uniform(default: CubeTiling) -> Self {
        Self {
            default,
            dtypes: BTreeMap::new(),
        }
    }

    /// Queries `platform` for every dtype. Dtypes the provider fails
    /// on, or answers with a non-positive tile, keep the default.
    pub fn from_platform(platform: &dyn PlatformInfo) -> Self {
        let mut table = Self::default();
        for dtype in DataType::all() {
            match platform.cube_tiling(dtype) {
                Ok(tiling) if tiling.is_valid() => {
                    table.dtypes.insert(dtype, tiling);
                }
                Ok(tiling) => {
                    tracing::error!(
                        "platform reported invalid tiling {:?} for {}, using the default",
                        tiling,
                        dtype
                    );
                }
                Err(err) => {
                    tracing::error!(
                        "failed to query tiling for {}: {:#}; using the default",
                        dtype,
                        err
                    );
                }
            }
        }
        table
    }

    pub fn set(&mut self, dtype: DataType, tiling: CubeTiling) {
        self.dtypes.insert(dtype, tiling);
    }

    pub fn get(&self, dtype: DataType) -> CubeTiling {
        self.dtypes.get(&dtype).copied().unwrap_or(self.default)
    }

    pub fn c0(&self, dtype: DataType) -> i64 {
        self.get(dtype).c0
    }

    pub fn m0(&self, dtype: DataType) -> i64 {
        self.get(dtype).m0
    }

    pub fn n0(&self, dtype: DataType) -> i64 {
        self.get(dtype).n0
    }

    /// Applies overrides written as `DTYPE:C0/M0/N0[,...]`. Malformed
    /// entries are logged and skipped.
    pub fn with_overrides(mut self, overrides: &str) -> Self {
        for entry in overrides.split(',').filter(|e| !e.trim().is_empty()) {
            match parse_override(entry) {
                Ok((dtype, tiling)) => {
                    tracing::debug!("tiling override {}: {:?}", dtype, tiling);
                    self.set(dtype, tiling);
                }
                Err(err) => {
                    tracing::warn!("ignoring tiling override `{}`: {}", entry.trim(), err);
                }
            }
        }
        self
    }

    /// Applies the overrides in [`TILING_ENV`], if set.
    pub fn with_env_overrides(self) -> Self {
        match std::env::var(TILING_ENV) {
            Ok(overrides) => self.with_overrides(&overrides),
            Err(_) => self,
        }
    }

    /// Parses a table from YAML. Every tile size must be positive.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, anyhow::Error> {
        let table: Self = serde_yaml::from_str(yaml)?;
        if !table.default.is_valid() {
            anyhow::bail!("default tile sizes must be positive, got {:?}", table.default);
        }
        if let Some((dtype, tiling)) = table.dtypes.iter().find(|(_, t)| !t.is_valid()) {
            anyhow::bail!("tile sizes for {} must be positive, got {:?}", dtype, tiling);
        }
        Ok(table)
    }

    /// Load a table from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_yaml_str(&contents)
    }

    /// Save the table to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum OverrideError {
    #[error(transparent)]
    Parse(#[from] ParserError),

    #[error(transparent)]
    DataType(#[from] crate::format::FormatError),

    #[error("tile sizes must be positive")]
    NonPositive,
}

fn parse_override(entry: &str) -> Result<(DataType, CubeTiling), OverrideError> {
    let mut parser = Parser::new(entry, &[":", "/"]);
    let dtype: DataType = parser.next_or_err("a data type")?.parse()?;
    parser.expect(":")?;
    let c0 = parser.next_i64()?;
    parser.expect("/")?;
    let m0 = parser.next_i64()?;
    parser.expect("/")?;
    let n0 = parser.next_i64()?;
    parser.finish("end of entry")?;
    let tiling = CubeTiling::new(c0, m0, n0);
    if !tiling.is_valid() {
        return Err(OverrideError::NonPositive);
    }
    Ok((dtype, tiling))
}

static GLOBAL: OnceLock<TilingTable> = OnceLock::new();

/// Initializes the process-wide table from `platform`, then applies
/// the environment overrides. Only the first initialization takes
/// effect; later calls return the table already in place.
pub fn init_global(platform: &dyn PlatformInfo) -> &'static TilingTable {
    let mut initialized = false;
    let table = GLOBAL.get_or_init(|| {
        initialized = true;
        TilingTable::from_platform(platform).with_env_overrides()
    });
    if initialized {
        tracing::info!("tiling table initialized for {} dtypes", table.dtypes.len());
    } else {
        tracing::debug!("tiling table already initialized");
    }
    table
}

/// The process-wide table. Defaults (plus environment overrides) are
/// installed if [`init_global`] has not run.
pub fn global() -> &'static TilingTable {
    GLOBAL.get_or_init(|| {
        tracing::info!("tiling table initialized with defaults");
        TilingTable::default().with_env_overrides()
    })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use tracing_test::traced_test;

    use super::*;

    struct FailingPlatform;

    impl PlatformInfo for FailingPlatform {
        fn cube_tiling(&self, dtype: DataType) -> anyhow::Result<CubeTiling> {
            if dtype == DataType::Int8 {
                anyhow::bail!("no cube for int8");
            }
            Ok(CubeTiling::new(8, 4, 4))
        }
    }

    #[test]
    fn test_cube_profile() {
        let profile = CubeProfile::default();
        let table = TilingTable::from_platform(&profile);
        assert_eq!(table.c0(DataType::Float16), 16);
        assert_eq!(table.c0(DataType::Bf16), 16);
        assert_eq!(table.c0(DataType::Int8), 32);
        assert_eq!(table.c0(DataType::Int4), 64);
        assert_eq!(table.c0(DataType::Float), 16);
        assert_eq!(table.m0(DataType::Int8), 16);

        let profile = CubeProfile {
            fp32_cube: true,
            ..CubeProfile::default()
        };
        assert_eq!(profile.cube_tiling(DataType::Float).unwrap().c0, 8);
        assert_eq!(profile.cube_tiling(DataType::Int64).unwrap().c0, 16);
    }

    #[traced_test]
    #[test]
    fn test_failing_platform_falls_back() {
        let table = TilingTable::from_platform(&FailingPlatform);
        assert_eq!(table.get(DataType::Float16), CubeTiling::new(8, 4, 4));
        assert_eq!(table.get(DataType::Int8), CubeTiling::default());
        assert!(logs_contain("no cube for int8"));
    }

    #[traced_test]
    #[test]
    fn test_overrides() {
        let table = TilingTable::default()
            .with_overrides("FLOAT16:32/16/16, DT_INT8 : 64/8/8,BOGUS:1/1/1,FLOAT:0/1/1,INT32:4/4");
        assert_eq!(table.get(DataType::Float16), CubeTiling::new(32, 16, 16));
        assert_eq!(table.get(DataType::Int8), CubeTiling::new(64, 8, 8));
        assert_eq!(table.get(DataType::Float), CubeTiling::default());
        assert_eq!(table.get(DataType::Int32), CubeTiling::default());
        assert!(logs_contain("ignoring tiling override `BOGUS:1/1/1`"));
        assert!(logs_contain("tile sizes must be positive"));
    }

    #[test]
    fn test_from_yaml_str() {
        let yaml = indoc! {"
            default:
              c0: 16
              m0: 16
              n0: 16
            dtypes:
              INT8:
                c0: 32
                m0: 16
                n0: 16
        "};
        let table = TilingTable::from_yaml_str(yaml).unwrap();
        assert_eq!(table.c0(DataType::Int8), 32);
        assert_eq!(table.c0(DataType::Float16), 16);

        let table = TilingTable::from_yaml_str("dtypes: {}").unwrap();
        assert_eq!(table, TilingTable::default());
    }

    #[test]
    fn test_from_yaml_str_rejects_non_positive_tiles() {
        let yaml = indoc! {"
            dtypes:
              INT8:
                c0: 0
                m0: 16
                n0: 16
        "};
        let err = TilingTable::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("INT8"));

        let yaml = indoc! {"
            default:
              c0: 16
              m0: -16
              n0: 16
        "};
        assert!(TilingTable::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_yaml_file_round_trip() {
        let mut table = TilingTable::uniform(CubeTiling::new(16, 16, 16));
        table.set(DataType::Int4, CubeTiling::new(64, 16, 16));
        let path = std::env::temp_dir().join(format!(
            "format_transfer_tiling_{}.yaml",
            std::process::id()
        ));
        table.to_yaml(&path).unwrap();
        let loaded = TilingTable::from_yaml(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_global_is_initialized_once() {
        let first = global();
        let second = init_global(&FailingPlatform);
        assert!(std::ptr::eq(first, second));
    }
}
