//! Optional YAML config file; CLI flags override its values

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::dates::DateFormat;
use crate::core::lookup::DEFAULT_NOT_FOUND;
use crate::error::{SheetError, SheetResult};
use crate::excel::{OutputMode, StyleConfig};
use crate::runner::DEFAULT_BATCH_SIZE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SheetkitConfig {
    /// Sheet-name token, e.g. `YYYY-MM-DD` or `YYYY年MM月DD日`
    pub date_format: String,
    pub keep_key_column: bool,
    /// Identity columns for merging; `[]` merges every row of a date
    pub merge_on: Option<Vec<String>>,
    pub keep_original: bool,
    pub not_found: String,
    pub mode: OutputMode,
    pub batch_size: usize,
    pub style: StyleConfig,
}

impl Default for SheetkitConfig {
    fn default() -> Self {
        Self {
            date_format: DateFormat::default().token().to_string(),
            keep_key_column: false,
            merge_on: None,
            keep_original: true,
            not_found: DEFAULT_NOT_FOUND.to_string(),
            mode: OutputMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            style: StyleConfig::default(),
        }
    }
}

impl SheetkitConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> SheetResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| SheetError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_yaml(&content).map_err(|e| match e {
            SheetError::Config(msg) => SheetError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Defaults when no config file was given
    pub fn load_or_default(path: Option<&Path>) -> SheetResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml(content: &str) -> SheetResult<Self> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| SheetError::Config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SheetResult<()> {
        if self.batch_size == 0 {
            return Err(SheetError::Config("batch_size must be at least 1".to_string()));
        }
        if self.style.row_height <= 0.0 || !self.style.row_height.is_finite() {
            return Err(SheetError::Config(format!(
                "style.row_height must be positive, got {}",
                self.style.row_height
            )));
        }
        if self.style.column_width <= 0.0 || !self.style.column_width.is_finite() {
            return Err(SheetError::Config(format!(
                "style.column_width must be positive, got {}",
                self.style.column_width
            )));
        }
        let known = DateFormat::ALL.iter().any(|f| f.token() == self.date_format.trim());
        if !known {
            tracing::warn!(
                date_format = %self.date_format,
                "unknown date format token, using {}",
                DateFormat::default().token()
            );
        }
        Ok(())
    }

    pub fn date_format(&self) -> DateFormat {
        DateFormat::from_token(&self.date_format)
    }
}
