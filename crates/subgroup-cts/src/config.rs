use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

/// Environment variable naming a JSON [`HarnessConfig`] file.
pub const CONFIG_ENV: &str = "SUBGROUP_CTS_CONFIG";

/// Largest accepted `max_width`.
pub const MAX_WIDTH: u32 = 1 << 16;

/// Largest number of invocations in one compute dispatch.
pub const MAX_DISPATCH_INVOCATIONS: u32 = 1 << 24;

/// Accepted difference for float results whose evaluation order is
/// unspecified (`add` and `mul`).
///
/// A value passes if it is within `absolute` of the reference, or within
/// `relative` times the larger magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Epsilon {
    pub absolute: f64,
    pub relative: f64,
}

impl Epsilon {
    pub fn accepts(self, expected: f64, actual: f64) -> bool {
        let diff = (expected - actual).abs();
        diff <= self.absolute || diff <= self.relative * expected.abs().max(actual.abs())
    }
}

/// Float tolerances per precision. These values are provisional and not
/// derived from an error bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    pub f32: Epsilon,
    pub f64: Epsilon,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            f32: Epsilon {
                absolute: 1e-5,
                relative: 1e-4,
            },
            f64: Epsilon {
                absolute: 1e-5,
                relative: 1e-9,
            },
        }
    }
}

/// Knobs of a test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Seed of the input data generator.
    pub seed: u64,
    /// Graphics runs draw `1, 2, .., 128, 256, ..` invocations while the
    /// count stays below this.
    pub max_width: u32,
    /// Workgroup count of every compute dispatch.
    pub workgroups: [u32; 3],
    /// Compute local sizes to try; a `0` stands for the device subgroup size.
    /// Sizes beyond the device limits are skipped.
    pub local_sizes: Vec<[u32; 3]>,
    pub tolerance: Tolerance,
    /// Where the runner writes its JSON report.
    pub report_path: Option<PathBuf>,
    /// Directory receiving every generated shader, for triage.
    pub dump_shaders: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            max_width: 1024,
            workgroups: [4, 2, 2],
            local_sizes: vec![
                [1, 1, 1],
                [32, 4, 1],
                [32, 1, 4],
                [1, 32, 4],
                [1, 4, 32],
                [4, 1, 32],
                [4, 32, 1],
                [0, 1, 1],
                [1, 0, 1],
                [1, 1, 0],
                [3, 5, 7],
                [128, 1, 1],
                [1, 128, 1],
                [1, 1, 64],
            ],
            tolerance: Tolerance::default(),
            report_path: None,
            dump_shaders: None,
        }
    }
}

impl HarnessConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file named by [`CONFIG_ENV`], or the defaults when unset.
    pub fn from_env() -> Result<Self> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_width < 2 {
            return Err(Error::Config(format!(
                "max_width must be at least 2, got {}",
                self.max_width
            )));
        }
        if self.workgroups.contains(&0) {
            return Err(Error::Config(format!(
                "workgroup counts must be non-zero, got {:?}",
                self.workgroups
            )));
        }
        if self.max_width > MAX_WIDTH {
            return Err(Error::Config(format!(
                "max_width must be at most {MAX_WIDTH}, got {}",
                self.max_width
            )));
        }
        if self.local_sizes.is_empty() {
            return Err(Error::Config("at least one local size is required".into()));
        }
        for local_size in self.resolved_local_sizes(crate::MAX_SUBGROUP_SIZE) {
            if self.dispatch_invocations(local_size).is_none() {
                return Err(Error::Config(format!(
                    "local size {local_size:?} with {:?} workgroups exceeds {MAX_DISPATCH_INVOCATIONS} invocations",
                    self.workgroups
                )));
            }
        }
        Ok(())
    }

    /// Invocations of one dispatch at `local_size`, or `None` past
    /// [`MAX_DISPATCH_INVOCATIONS`].
    pub fn dispatch_invocations(&self, local_size: [u32; 3]) -> Option<u32> {
        local_size
            .iter()
            .chain(&self.workgroups)
            .try_fold(1u32, |acc, &n| acc.checked_mul(n))
            .filter(|&n| n <= MAX_DISPATCH_INVOCATIONS)
    }

    /// Local sizes with the subgroup-size placeholder resolved.
    pub fn resolved_local_sizes(&self, subgroup_size: u32) -> Vec<[u32; 3]> {
        self.local_sizes
            .iter()
            .map(|size| size.map(|n| if n == 0 { subgroup_size } else { n }))
            .collect()
    }

    /// Invocation counts of the graphics runs.
    pub fn widths(&self) -> impl Iterator<Item = u32> + '_ {
        std::iter::successors(Some(1u32), |&w| if w < 128 { Some(w + 1) } else { w.checked_mul(2) })
            .take_while(|&w| w < self.max_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn widths_step_by_one_then_double() {
        let config = HarnessConfig {
            max_width: 1024,
            ..Default::default()
        };
        let widths: Vec<_> = config.widths().collect();
        assert_eq!(widths[..3], [1, 2, 3]);
        assert_eq!(widths[widths.len() - 3..], [128, 256, 512]);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        write!(file, r#"{{ "seed": 3, "max_width": 16 }}"#).expect("Failed to write config");
        let config = HarnessConfig::from_path(file.path()).expect("Failed to load config");
        assert_eq!(config.seed, 3);
        assert_eq!(config.max_width, 16);
        assert_eq!(config.workgroups, [4, 2, 2]);
        assert_eq!(config.tolerance, Tolerance::default());
    }

    #[test]
    fn rejects_zero_workgroups() {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        write!(file, r#"{{ "workgroups": [1, 0, 1] }}"#).expect("Failed to write config");
        assert!(matches!(
            HarnessConfig::from_path(file.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn rejects_oversized_runs() {
        let wide = HarnessConfig {
            max_width: u32::MAX,
            ..Default::default()
        };
        assert!(matches!(wide.validate(), Err(Error::Config(_))));
        assert_eq!(wide.widths().last(), Some(1 << 31));

        let huge = HarnessConfig {
            workgroups: [65535, 65535, 1],
            ..Default::default()
        };
        assert!(matches!(huge.validate(), Err(Error::Config(_))));
        assert_eq!(huge.dispatch_invocations([1, 1, 1]), None);

        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch_invocations([3, 5, 7]), Some(105 * 16));
    }

    #[test]
    fn subgroup_size_placeholder() {
        let config = HarnessConfig {
            local_sizes: vec![[0, 1, 1], [3, 5, 7]],
            ..Default::default()
        };
        assert_eq!(config.resolved_local_sizes(32), [[32, 1, 1], [3, 5, 7]]);
    }

    #[test]
    fn epsilon_is_absolute_or_relative() {
        let eps = Tolerance::default().f32;
        assert!(eps.accepts(0.0, 5e-6));
        assert!(eps.accepts(64.0, 64.001));
        assert!(!eps.accepts(1.0, 1.01));
    }
}
