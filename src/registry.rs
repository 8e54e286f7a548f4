//! Format registry: file extension to ordered backend candidates
//!
//! The table is plain data. Priority order can be overridden per extension
//! from the settings file; nothing here inspects file contents.

use crate::capability::CapabilityProbe;
use crate::data_source::OpenOptions;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// One backend that may be able to read a given extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendCandidate {
    pub id: String,
    pub required_dependency: String,
    pub open_options: OpenOptions,
    /// Skip the tree attempt and go straight to per-group flat opens
    pub forces_flat_open: bool,
}

impl BackendCandidate {
    /// Default candidate settings for a backend id.
    pub fn for_backend(id: &str) -> Self {
        let mut open_options = OpenOptions::new();
        let mut forces_flat_open = false;
        match id {
            "grib" => {
                open_options.insert("decode_cf".to_string(), "false".to_string());
                open_options.insert("index_path".to_string(), String::new());
                forces_flat_open = true;
            }
            "geotiff" => {
                open_options.insert("mask_and_scale".to_string(), "false".to_string());
                forces_flat_open = true;
            }
            _ => {
                open_options.insert("decode_cf".to_string(), "false".to_string());
            }
        }
        Self {
            id: id.to_string(),
            required_dependency: id.to_string(),
            open_options,
            forces_flat_open,
        }
    }

    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.open_options.insert(key.to_string(), value.to_string());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.open_options.get(key).map(String::as_str)
    }
}

/// Result of resolving a path against the registry and the prober.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatInfo {
    pub extension: String,
    pub display_name: String,
    /// Ids of the available candidates, in priority order
    pub available_backends: Vec<String>,
    pub missing_dependencies: Vec<String>,
    #[serde(skip)]
    pub candidates: Vec<BackendCandidate>,
    #[serde(skip)]
    pub registered: bool,
}

impl FormatInfo {
    pub fn is_supported(&self) -> bool {
        !self.candidates.is_empty()
    }
}

#[derive(Debug, Clone)]
struct FormatEntry {
    display_name: String,
    candidates: Vec<BackendCandidate>,
}

/// Extension → display name + ordered candidates.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: BTreeMap<String, FormatEntry>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FormatRegistry {
    pub fn empty() -> Self {
        Self {
            formats: BTreeMap::new(),
        }
    }

    /// The built-in format table.
    pub fn builtin() -> Self {
        let netcdf = || vec![BackendCandidate::for_backend("netcdf")];
        let mut registry = Self::empty();
        registry.register(".nc", "NetCDF", netcdf());
        registry.register(".netcdf", "NetCDF", netcdf());
        registry.register(".nc4", "NetCDF4", netcdf());
        registry.register(".cdf", "CDF/NetCDF", netcdf());
        registry.register(
            ".zarr",
            "Zarr",
            vec![
                BackendCandidate::for_backend("zarr"),
                BackendCandidate::for_backend("netcdf").with_option("mode", "zarr"),
            ],
        );
        registry.register(".h5", "HDF5", netcdf());
        registry.register(".hdf5", "HDF5", netcdf());
        let grib = || vec![BackendCandidate::for_backend("grib")];
        registry.register(".grib", "GRIB", grib());
        registry.register(".grb", "GRIB", grib());
        registry.register(".grib2", "GRIB2", grib());
        let geotiff = || vec![BackendCandidate::for_backend("geotiff")];
        registry.register(".tif", "GeoTIFF", geotiff());
        registry.register(".tiff", "GeoTIFF", geotiff());
        registry.register(".geotiff", "GeoTIFF", geotiff());
        registry.register(".jp2", "JPEG-2000", geotiff());
        registry.register(".jpeg2000", "JPEG-2000", geotiff());
        registry
    }

    /// Add or replace the entry for an extension (lowercase, leading dot).
    pub fn register(&mut self, extension: &str, display_name: &str, candidates: Vec<BackendCandidate>) {
        self.formats.insert(
            extension.to_lowercase(),
            FormatEntry {
                display_name: display_name.to_string(),
                candidates,
            },
        );
    }

    /// Replace the priority order of registered extensions.
    ///
    /// Ids keep their built-in candidate options when the extension already
    /// listed them; other ids get the default options of that backend.
    pub fn apply_priorities(&mut self, priorities: &BTreeMap<String, Vec<String>>) {
        for (extension, ids) in priorities {
            let extension = normalize_extension(extension);
            let Some(entry) = self.formats.get_mut(&extension) else {
                warn!(%extension, "priority override for unregistered extension ignored");
                continue;
            };
            let reordered = ids
                .iter()
                .map(|id| {
                    entry
                        .candidates
                        .iter()
                        .find(|c| &c.id == id)
                        .cloned()
                        .unwrap_or_else(|| BackendCandidate::for_backend(id))
                })
                .collect();
            debug!(%extension, ?ids, "backend priority overridden");
            entry.candidates = reordered;
        }
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }

    pub fn candidates(&self, extension: &str) -> &[BackendCandidate] {
        self.formats
            .get(extension)
            .map(|entry| entry.candidates.as_slice())
            .unwrap_or(&[])
    }

    pub fn display_name(&self, extension: &str) -> &str {
        self.formats
            .get(extension)
            .map(|entry| entry.display_name.as_str())
            .unwrap_or("Unknown")
    }

    /// Derive the [`FormatInfo`] of a path. Never fails and never opens it.
    pub fn resolve_format(&self, path: &Path, probe: &dyn CapabilityProbe) -> FormatInfo {
        let extension = extension_of(path);
        let registered = self.candidates(&extension);

        let mut candidates = Vec::new();
        let mut missing_dependencies: Vec<String> = Vec::new();
        for candidate in registered {
            if probe.is_available(&candidate.required_dependency) {
                candidates.push(candidate.clone());
            } else if !missing_dependencies.contains(&candidate.required_dependency) {
                missing_dependencies.push(candidate.required_dependency.clone());
            }
        }

        let info = FormatInfo {
            display_name: self.display_name(&extension).to_string(),
            available_backends: candidates.iter().map(|c| c.id.clone()).collect(),
            missing_dependencies,
            candidates,
            registered: !registered.is_empty(),
            extension,
        };
        info!(
            extension = %info.extension,
            format = %info.display_name,
            available = ?info.available_backends,
            missing = ?info.missing_dependencies,
            "resolved file format"
        );
        info
    }
}

/// Lowercase final suffix of a path, dot included; empty when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn normalize_extension(extension: &str) -> String {
    let lower = extension.to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}
