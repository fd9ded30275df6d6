use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BdfError, Result};

/// Tuning of the writer. Every field has a default, so a partial JSON
/// document is enough to override a single value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Samples summarized by one pair of the first envelope curve.
    pub reduction_factor: u32,
    /// Upper bound on the number of envelope curves per block.
    pub max_reductions: u32,
    /// Bytes buffered per stream before a data fragment is written.
    pub transfer_size: usize,
    /// fsync the container and its directory around promotion.
    pub sync_on_close: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            reduction_factor: 64,
            max_reductions: 6,
            transfer_size: 1 << 20,
            sync_on_close: true,
        }
    }
}

impl WriterOptions {
    pub const MAX_REDUCTIONS: u32 = 16;

    pub fn validate(&self) -> Result<()> {
        if self.reduction_factor < 2 {
            return Err(BdfError::Config(format!(
                "reduction_factor must be at least 2, got {}",
                self.reduction_factor
            )));
        }
        if self.max_reductions > Self::MAX_REDUCTIONS {
            return Err(BdfError::Config(format!(
                "max_reductions must not exceed {}, got {}",
                Self::MAX_REDUCTIONS,
                self.max_reductions
            )));
        }
        if self.transfer_size == 0 {
            return Err(BdfError::Config("transfer_size must be positive".into()));
        }
        Ok(())
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let options: WriterOptions =
            serde_json::from_str(text).map_err(|e| BdfError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
