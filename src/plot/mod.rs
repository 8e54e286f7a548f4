//! Plotting: strategy selection, styles and the raster renderer

pub mod colormap;
pub mod render;
pub mod strategy;
pub mod style;

pub use colormap::Colormap;
pub use render::{RasterRenderer, RenderError, RenderRequest, Renderer};
pub use strategy::{select_strategy, FacetAxis, PlotStrategy};
pub use style::PlotStyle;
