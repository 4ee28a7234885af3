//! Kernel tuning knobs.
//!
//! The kernels read their tile sizes from preprocessor macros. Instead of a
//! hand-edited header, those macros are rendered from [`KernelConfig`] and
//! prepended to the kernel source at build time.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ClError;

/// Compile-time configuration for the GEMM and prefix-sum kernels.
///
/// Deserializes from JSON; absent fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Work-group tile edge (`TS`). Power of two, at most 64.
    pub tile_size: usize,
    /// Outputs computed per work-item (`WPT`); must divide `tile_size`.
    pub work_per_thread: usize,
    /// Vector width in floats (`WIDTH`).
    pub vector_width: usize,
    /// Tile size along K (`TSDK`).
    pub tile_k: usize,
    /// Transpose helper tile (`TRANSPOSEX`, `TRANSPOSEY`).
    pub transpose_tile: (usize, usize),
    /// Padding helper tile (`PADDINGX`, `PADDINGY`).
    pub padding_tile: (usize, usize),
    /// Global work size of the prefix-sum dispatch.
    pub scan_work_size: usize,
    /// Extra options passed to the OpenCL compiler, e.g. `-cl-fast-relaxed-math`.
    pub compiler_options: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            tile_size: 16,
            work_per_thread: 8,
            vector_width: 4,
            tile_k: 16,
            transpose_tile: (16, 16),
            padding_tile: (16, 16),
            scan_work_size: 256,
            compiler_options: String::new(),
        }
    }
}

impl KernelConfig {
    /// Load a config from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ClError> {
        let text = std::fs::read_to_string(path).map_err(|e| ClError::file_access(path, e))?;
        let config: KernelConfig = serde_json::from_str(&text)
            .map_err(|e| ClError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reduced tile size (`RTS = TS / WPT`), or 0 when `WPT` is 0.
    pub fn reduced_tile(&self) -> usize {
        self.tile_size.checked_div(self.work_per_thread).unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), ClError> {
        let ts = self.tile_size;
        if ts == 0 || !ts.is_power_of_two() || ts > 64 {
            return Err(ClError::InvalidConfig(format!(
                "tile_size must be a power of two in 1..=64, got {}",
                ts
            )));
        }
        if self.work_per_thread == 0 || ts % self.work_per_thread != 0 {
            return Err(ClError::InvalidConfig(format!(
                "work_per_thread {} must divide tile_size {}",
                self.work_per_thread, ts
            )));
        }
        if ![1, 2, 4, 8, 16].contains(&self.vector_width) {
            return Err(ClError::InvalidConfig(format!(
                "vector_width must be one of 1, 2, 4, 8, 16; got {}",
                self.vector_width
            )));
        }
        if self.tile_k == 0 {
            return Err(ClError::InvalidConfig("tile_k must be positive".into()));
        }
        let tiles = [self.transpose_tile, self.padding_tile];
        if tiles.iter().any(|&(x, y)| x == 0 || y == 0) {
            return Err(ClError::InvalidConfig("helper tiles must be positive".into()));
        }
        if self.scan_work_size == 0 {
            return Err(ClError::InvalidConfig("scan_work_size must be positive".into()));
        }
        Ok(())
    }

    /// Render the configuration as kernel preprocessor definitions.
    pub fn render_header(&self) -> String {
        let mut h = String::new();
        let _ = writeln!(h, "// Generated by clmark from KernelConfig");
        let _ = writeln!(h, "#define TS {}", self.tile_size);
        let _ = writeln!(h, "#define WPT {}", self.work_per_thread);
        let _ = writeln!(h, "#define RTS (TS/WPT)");
        let _ = writeln!(h, "#define WIDTH {}", self.vector_width);
        let _ = writeln!(h, "#define TSDK {}", self.tile_k);
        let _ = writeln!(h, "#define LPT ((TSDK*WPT)/(TS))");
        let _ = writeln!(h, "#define TRANSPOSEX {}", self.transpose_tile.0);
        let _ = writeln!(h, "#define TRANSPOSEY {}", self.transpose_tile.1);
        let _ = writeln!(h, "#define PADDINGX {}", self.padding_tile.0);
        let _ = writeln!(h, "#define PADDINGY {}", self.padding_tile.1);
        h.push_str(HELPER_MACROS);
        h
    }
}

const HELPER_MACROS: &str = "\
#define MIN(a,b) (((a) > (b)) ? (b) : (a))
#define MAX(a,b) (((a) > (b)) ? (a) : (b))
#define CEIL_DIV(x,y) (((x) + (y) - 1) / (y))
#define MOD2(x,y) ((x) % (y))
#define DIV2(x,y) ((x) / (y))
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = KernelConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.reduced_tile(), 2);
    }

    #[test]
    fn test_reduced_tile_zero_wpt() {
        let cfg = KernelConfig { work_per_thread: 0, ..Default::default() };
        assert_eq!(cfg.reduced_tile(), 0);
        assert!(matches!(cfg.validate(), Err(ClError::InvalidConfig(_))));
    }

    #[test]
    fn test_render_header() {
        let cfg = KernelConfig { tile_size: 32, work_per_thread: 4, ..Default::default() };
        let h = cfg.render_header();
        assert!(h.contains("#define TS 32\n"));
        assert!(h.contains("#define WPT 4\n"));
        assert!(h.contains("#define RTS (TS/WPT)\n"));
        assert!(h.contains("#define CEIL_DIV(x,y)"));
        assert!(h.ends_with('\n'));
    }

    #[test]
    fn test_validate_rejects_bad_tiles() {
        let bad_ts = KernelConfig { tile_size: 24, ..Default::default() };
        assert!(matches!(bad_ts.validate(), Err(ClError::InvalidConfig(_))));

        let too_big = KernelConfig { tile_size: 128, ..Default::default() };
        assert!(too_big.validate().is_err());

        let bad_wpt = KernelConfig { tile_size: 16, work_per_thread: 3, ..Default::default() };
        assert!(bad_wpt.validate().is_err());

        let bad_width = KernelConfig { vector_width: 3, ..Default::default() };
        assert!(bad_width.validate().is_err());

        let no_scan = KernelConfig { scan_work_size: 0, ..Default::default() };
        assert!(no_scan.validate().is_err());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let cfg: KernelConfig =
            serde_json::from_str(r#"{"tile_size": 8, "work_per_thread": 4}"#).unwrap();
        assert_eq!(cfg.tile_size, 8);
        assert_eq!(cfg.work_per_thread, 4);
        assert_eq!(cfg.scan_work_size, 256);
        assert_eq!(cfg.vector_width, 4);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning.json");
        let json = r#"{"tile_size": 32, "compiler_options": "-cl-mad-enable"}"#;
        std::fs::write(&path, json).unwrap();
        let cfg = KernelConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.tile_size, 32);
        assert_eq!(cfg.compiler_options, "-cl-mad-enable");

        std::fs::write(&path, r#"{"tile_size": 33}"#).unwrap();
        assert!(matches!(KernelConfig::from_json_file(&path), Err(ClError::InvalidConfig(_))));

        let missing = dir.path().join("nope.json");
        assert!(matches!(KernelConfig::from_json_file(&missing), Err(ClError::FileAccess { .. })));
    }
}
