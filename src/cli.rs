//! Defines command-line interface options using `clap` for sci-data-viewer.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect and plot scientific array files
#[derive(Parser, Debug)]
#[command(
    version,
    name = "sci-data-viewer",
    about = "Inspect NetCDF, Zarr, HDF5, GRIB, GeoTIFF and JPEG-2000 files and plot their variables"
)]
pub struct Args {
    /// YAML settings file
    #[arg(long, global = true, env = "SDV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter written to stderr, e.g. `info` or `sci_data_viewer=debug`
    #[arg(long, global = true, env = "SDV_LOG", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the structure and metadata of every group as JSON
    Info {
        /// Path to the data file or directory store
        file: PathBuf,
    },

    /// Render one variable and print it as a base64 PNG in JSON
    Plot {
        /// Path to the data file or directory store
        file: PathBuf,

        /// Variable path, e.g. `/temperature` or `/group1/temperature`
        variable: String,

        /// Plot type; only `auto` is supported
        #[arg(default_value = "auto")]
        plot_type: String,

        /// Plot style name; unknown names fall back to the default
        #[arg(long)]
        style: Option<String>,
    },

    /// Print build and environment information
    Versions,
}
