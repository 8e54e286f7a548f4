//! sci-data-viewer: format resolution, hierarchy normalization, metadata
//! extraction and quick-look plots for scientific array files
//!
//! Given a path, the library picks the decoding backends registered for its
//! extension, tries them in priority order with a flat-open fallback, and
//! turns whatever comes back into one ordered map of groups. From there it
//! produces JSON-ready metadata and text/HTML summaries, or renders one
//! variable as a PNG with a layout chosen from the variable's shape.
//!
//! ## Module Organization
//!
//! - [`registry`] and [`capability`]: extension table and dependency probing
//! - [`backends`]: NetCDF/HDF5, Zarr, GRIB and GeoTIFF/JPEG-2000 adapters behind [`data_source::Backend`]
//! - [`resolver`]: the trial-and-fallback loop
//! - [`hierarchy`], [`metadata`], [`repr`]: canonical tree, descriptors and summaries
//! - [`plot`]: strategy selection, styles and the raster renderer
//! - [`service`]: the `info`/`plot` entry points returning [`envelope::Envelope`]s
//! - [`config`], [`diagnostics`], [`errors`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sci_data_viewer::prelude::*;
//! use std::path::Path;
//!
//! let inspector = Inspector::new(Settings::default());
//! let info = inspector.file_info(Path::new("data.nc"));
//! println!("{}", info.to_json());
//!
//! let plot = inspector.create_plot(Path::new("data.nc"), "/temperature", "auto", None);
//! if let Envelope::Result(result) = plot {
//!     println!("{}", result.strategy.name());
//! }
//! ```

// Core modules
pub mod backends;
pub mod capability;
pub mod data_source;
pub mod errors;
pub mod hierarchy;
pub mod metadata;
pub mod registry;
pub mod repr;
pub mod resolver;
pub mod types;

// Outputs
pub mod envelope;
pub mod plot;

// Request layer
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod service;

pub use errors::{BackendError, BackendResult, ErrorKind, Result, SdvError};

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::capability::{CapabilityProbe, CompiledFeatures, StaticProbe};
    pub use crate::config::Settings;
    pub use crate::data_source::{ArrayEntry, Backend, GroupTable, OpenedDataset, TreeHandle};
    pub use crate::envelope::{Envelope, InfoEnvelope, PlotEnvelope};
    pub use crate::errors::{ErrorKind, Result, SdvError};
    pub use crate::hierarchy::{normalize, CanonicalTree};
    pub use crate::metadata::{extract, GroupMetadata, VariableDescriptor};
    pub use crate::plot::{select_strategy, PlotStrategy, PlotStyle};
    pub use crate::registry::{FormatInfo, FormatRegistry};
    pub use crate::resolver::Resolver;
    pub use crate::service::Inspector;
    pub use crate::types::{AttributeValue, ElementType};
}
