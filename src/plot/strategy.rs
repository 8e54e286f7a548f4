//! Plot strategy selection
//!
//! The choice depends on the variable's shape alone. Dimension names only
//! label the facets and feed a debug line about spatial axes.

use crate::metadata::VariableDescriptor;
use serde::Serialize;
use tracing::debug;

/// Most facet columns per row before wrapping.
pub const MAX_FACET_COLUMNS: usize = 4;

const SPATIAL_NAMES: [&str; 10] = [
    "lat", "latitude", "lon", "longitude", "x", "y", "rlat", "rlon", "nav_lat", "nav_lon",
];

/// A facetted axis of the variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetAxis {
    pub axis: usize,
    pub dimension: String,
    pub extent: usize,
}

/// How a variable is laid out on the canvas
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PlotStrategy {
    /// One 2-D panel; `drop_leading` names a unit-length axis 0 that is
    /// index-selected away first.
    Single {
        #[serde(rename = "dropLeading", skip_serializing_if = "Option::is_none")]
        drop_leading: Option<String>,
    },
    FacetOneAxis {
        col: FacetAxis,
        #[serde(rename = "colWrap")]
        col_wrap: usize,
    },
    FacetTwoAxis { row: FacetAxis, col: FacetAxis },
    Fallback,
}

impl PlotStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            PlotStrategy::Single { .. } => "single",
            PlotStrategy::FacetOneAxis { .. } => "facet-one-axis",
            PlotStrategy::FacetTwoAxis { .. } => "facet-two-axis",
            PlotStrategy::Fallback => "fallback",
        }
    }
}

/// Whether a dimension name looks like a horizontal coordinate.
pub fn is_spatial_dimension(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SPATIAL_NAMES.contains(&lower.as_str())
}

fn facet_axis(descriptor: &VariableDescriptor, axis: usize) -> FacetAxis {
    FacetAxis {
        axis,
        dimension: descriptor
            .dimension_names
            .get(axis)
            .cloned()
            .unwrap_or_else(|| format!("dim_{}", axis)),
        extent: descriptor.shape[axis],
    }
}

/// Pick the layout for `descriptor` from its rank and shape.
pub fn select_strategy(descriptor: &VariableDescriptor) -> PlotStrategy {
    let shape = &descriptor.shape;
    let strategy = match shape.len() {
        2 => PlotStrategy::Single { drop_leading: None },
        3 if shape[0] == 1 => PlotStrategy::Single {
            drop_leading: Some(facet_axis(descriptor, 0).dimension),
        },
        3 => PlotStrategy::FacetOneAxis {
            col: facet_axis(descriptor, 0),
            col_wrap: shape[0].clamp(1, MAX_FACET_COLUMNS),
        },
        4 => PlotStrategy::FacetTwoAxis {
            row: facet_axis(descriptor, 0),
            col: facet_axis(descriptor, 1),
        },
        _ => PlotStrategy::Fallback,
    };

    let trailing = &descriptor.dimension_names[descriptor.dimension_names.len().saturating_sub(2)..];
    debug!(
        variable = %descriptor.name,
        shape = ?shape,
        strategy = strategy.name(),
        spatial = trailing.iter().all(|d| is_spatial_dimension(d)),
        "selected plot strategy"
    );
    strategy
}
