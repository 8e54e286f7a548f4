//! Optional YAML settings file
//!
//! ```yaml
//! text_max_rows: 1000
//! markup_max_rows: 12
//! default_style: ggplot
//! disabled_backends: [grib]
//! formats:
//!   .zarr: [netcdf, zarr]
//! ```
//!
//! Every key is optional; a missing file means built-in defaults.

use crate::repr::ReprLimits;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Rows per section in text summaries
    pub text_max_rows: usize,
    /// Rows per section in HTML summaries
    pub markup_max_rows: usize,
    pub default_style: String,
    /// Backend dependencies treated as unavailable
    pub disabled_backends: Vec<String>,
    /// Extension → backend priority override
    pub formats: BTreeMap<String, Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        let limits = ReprLimits::default();
        Self {
            text_max_rows: limits.text_max_rows,
            markup_max_rows: limits.markup_max_rows,
            default_style: crate::plot::style::DEFAULT_STYLE.to_string(),
            disabled_backends: Vec::new(),
            formats: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn from_yaml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        // an empty document deserializes to unit, not to a map
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_yaml_str(&text, path)?;
        info!(path = %path.display(), "loaded settings");
        debug!(?settings, "effective settings");
        Ok(settings)
    }

    /// Settings from `path` when given, defaults otherwise.
    pub fn load_optional(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn repr_limits(&self) -> ReprLimits {
        ReprLimits {
            text_max_rows: self.text_max_rows,
            markup_max_rows: self.markup_max_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = Settings::from_yaml_str("markup_max_rows: 3\n", Path::new("x.yaml")).unwrap();
        assert_eq!(settings.markup_max_rows, 3);
        assert_eq!(settings.text_max_rows, 1000);
        assert_eq!(settings.default_style, "default");
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Settings::from_yaml_str("  \n", Path::new("x.yaml")).unwrap(), Settings::default());
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "disabled_backends: [grib]\nformats:\n  .zarr: [netcdf, zarr]").unwrap();
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.disabled_backends, vec!["grib"]);
        assert_eq!(settings.formats[".zarr"], vec!["netcdf", "zarr"]);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = Settings::from_yaml_str("colour: red\n", Path::new("bad.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(Settings::load(Path::new("/definitely/missing.yaml")).is_err());
    }
}
