//! Capability probing
//!
//! Decides whether the dependency a backend candidate needs is usable, without
//! touching the backend itself. In a compiled binary that means "was the
//! Cargo feature enabled", optionally narrowed by the settings file.

use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Every backend dependency this crate knows about, in registry order.
pub const KNOWN_DEPENDENCIES: &[&str] = &["netcdf", "zarr", "grib", "geotiff"];

/// Answers "is this dependency available?".
pub trait CapabilityProbe {
    /// Raw probe. An `Err` means the probe itself could not decide.
    fn check(&self, dependency: &str) -> Result<bool, String>;

    /// Probe result with failures folded into "not available".
    fn is_available(&self, dependency: &str) -> bool {
        match self.check(dependency) {
            Ok(available) => {
                debug!(dependency, available, "probed dependency");
                available
            }
            Err(reason) => {
                warn!(dependency, %reason, "dependency probe failed, treating as unavailable");
                false
            }
        }
    }
}

impl<P: CapabilityProbe + ?Sized> CapabilityProbe for &P {
    fn check(&self, dependency: &str) -> Result<bool, String> {
        (**self).check(dependency)
    }
}

impl<P: CapabilityProbe + ?Sized> CapabilityProbe for Box<P> {
    fn check(&self, dependency: &str) -> Result<bool, String> {
        (**self).check(dependency)
    }
}

/// Reports the backend features compiled into this binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompiledFeatures;

impl CapabilityProbe for CompiledFeatures {
    fn check(&self, dependency: &str) -> Result<bool, String> {
        Ok(match dependency {
            "netcdf" => cfg!(feature = "netcdf"),
            "zarr" => cfg!(feature = "zarr"),
            "grib" => cfg!(feature = "grib"),
            "geotiff" => cfg!(feature = "geotiff"),
            _ => false,
        })
    }
}

/// Compiled-in backend dependencies.
pub fn compiled_backends() -> Vec<&'static str> {
    KNOWN_DEPENDENCIES
        .iter()
        .copied()
        .filter(|dep| CompiledFeatures.check(dep).unwrap_or(false))
        .collect()
}

/// Wraps another probe and masks out dependencies disabled by configuration.
#[derive(Debug, Clone)]
pub struct ConfiguredProbe<P> {
    inner: P,
    disabled: BTreeSet<String>,
}

impl<P: CapabilityProbe> ConfiguredProbe<P> {
    pub fn new(inner: P, disabled: impl IntoIterator<Item = String>) -> Self {
        Self {
            inner,
            disabled: disabled.into_iter().collect(),
        }
    }
}

impl<P: CapabilityProbe> CapabilityProbe for ConfiguredProbe<P> {
    fn check(&self, dependency: &str) -> Result<bool, String> {
        if self.disabled.contains(dependency) {
            return Ok(false);
        }
        self.inner.check(dependency)
    }
}

/// Fixed set of available dependencies, handy for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    available: BTreeSet<String>,
}

impl StaticProbe {
    pub fn new<I, S>(available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: available.into_iter().map(Into::into).collect(),
        }
    }
}

impl CapabilityProbe for StaticProbe {
    fn check(&self, dependency: &str) -> Result<bool, String> {
        Ok(self.available.contains(dependency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenProbe;

    impl CapabilityProbe for BrokenProbe {
        fn check(&self, _dependency: &str) -> Result<bool, String> {
            Err("registry unreadable".to_string())
        }
    }

    #[test]
    fn test_probe_failure_means_unavailable() {
        assert!(!BrokenProbe.is_available("netcdf"));
    }

    #[test]
    fn test_configured_probe_masks_disabled() {
        let probe = ConfiguredProbe::new(
            StaticProbe::new(["netcdf", "zarr"]),
            vec!["zarr".to_string()],
        );
        assert!(probe.is_available("netcdf"));
        assert!(!probe.is_available("zarr"));
        assert!(!probe.is_available("grib"));
    }

    #[test]
    fn test_compiled_features_match_cfg() {
        assert_eq!(CompiledFeatures.is_available("zarr"), cfg!(feature = "zarr"));
        assert!(!CompiledFeatures.is_available("cfgrib"));
        for dep in compiled_backends() {
            assert!(KNOWN_DEPENDENCIES.contains(&dep));
        }
    }
}
