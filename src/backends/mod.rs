//! Decoding backend adapters
//!
//! Every adapter is compiled behind the Cargo feature of the same name. The
//! adapters only translate a file into [`GroupTable`]s; which adapter gets
//! tried, and in which order, is decided by the registry and the resolver.
//!
//! [`GroupTable`]: crate::data_source::GroupTable

#[cfg(feature = "geotiff")]
pub mod geotiff;
#[cfg(feature = "grib")]
pub mod grib;
#[cfg(feature = "netcdf")]
pub mod netcdf;
#[cfg(feature = "zarr")]
pub mod zarr;

use crate::data_source::Backend;
use std::fmt;
use tracing::debug;

/// The set of backend adapters a request can use, looked up by id.
#[derive(Default)]
pub struct BackendSet {
    backends: Vec<Box<dyn Backend>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// All adapters compiled into this binary.
    pub fn builtin() -> Self {
        #[allow(unused_mut)]
        let mut set = Self::new();
        #[cfg(feature = "zarr")]
        set.register(Box::new(zarr::ZarrBackend));
        #[cfg(feature = "netcdf")]
        set.register(Box::new(netcdf::NetcdfBackend));
        #[cfg(feature = "grib")]
        set.register(Box::new(grib::GribBackend));
        #[cfg(feature = "geotiff")]
        set.register(Box::new(geotiff::GeoTiffBackend));
        set
    }

    /// Add an adapter; a later adapter with the same id replaces the earlier one.
    pub fn register(&mut self, backend: Box<dyn Backend>) {
        debug!(backend = backend.id(), "registering backend");
        self.backends.retain(|b| b.id() != backend.id());
        self.backends.push(backend);
    }

    pub fn with(mut self, backend: Box<dyn Backend>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, id: &str) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.id() == id)
            .map(|b| b.as_ref())
    }

    pub fn ids(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.id()).collect()
    }
}

impl fmt::Debug for BackendSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSet").field("backends", &self.ids()).finish()
    }
}
