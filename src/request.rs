use std::path::PathBuf;

use crate::error::OptimizeError;

/// JPEG/WebP quality, always within `MIN..=MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: u8 = 30;
    pub const MAX: u8 = 100;
    pub const DEFAULT: Quality = Quality(85);

    pub fn new(value: u8) -> Result<Self, OptimizeError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(OptimizeError::InvalidQuality(value))
        }
    }

    /// Pulls an out-of-range value back to the nearest bound.
    pub fn clamped(value: u8) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Quality {
    type Error = OptimizeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Encoding knobs shared by every file of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptimizeOptions {
    pub quality: Quality,
    /// Quantize PNG sources to an adaptive palette.
    pub optimize_palette: bool,
    /// Re-encode everything as JPEG, dropping alpha.
    pub force_jpeg: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            quality: Quality::DEFAULT,
            optimize_palette: true,
            force_jpeg: false,
        }
    }
}

/// One input file and where its optimized copy should go.
///
/// `output_path` is nominal: with `force_jpeg` the written file gets a
/// `.jpg` extension instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub options: OptimizeOptions,
}

impl OptimizationRequest {
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        options: OptimizeOptions,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            options,
        }
    }

    /// Path the optimizer will actually write.
    pub fn resolved_output(&self) -> PathBuf {
        if self.options.force_jpeg {
            self.output_path.with_extension("jpg")
        } else {
            self.output_path.clone()
        }
    }
}
