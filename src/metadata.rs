//! Metadata extraction from a canonical tree
//!
//! Pure translation of group tables into serializable descriptors: no I/O,
//! no value reads.

use crate::data_source::{ArrayEntry, GroupTable};
use crate::hierarchy::CanonicalTree;
use crate::types::{AttributeValue, ElementType};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Structured metadata for one variable or coordinate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDescriptor {
    pub name: String,
    pub element_type: ElementType,
    pub shape: Vec<usize>,
    pub dimension_names: Vec<String>,
    pub size_bytes: usize,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl VariableDescriptor {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

impl From<&ArrayEntry> for VariableDescriptor {
    fn from(entry: &ArrayEntry) -> Self {
        Self {
            name: entry.name.clone(),
            element_type: entry.element_type.clone(),
            shape: entry.shape.clone(),
            dimension_names: entry.dimensions.clone(),
            size_bytes: entry.size_bytes(),
            attributes: entry.attributes.clone(),
        }
    }
}

/// Everything reported about one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMetadata {
    pub dimensions: BTreeMap<String, usize>,
    pub variables: Vec<VariableDescriptor>,
    pub coordinates: Vec<VariableDescriptor>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl From<&GroupTable> for GroupMetadata {
    fn from(table: &GroupTable) -> Self {
        Self {
            dimensions: table.dimensions().clone(),
            variables: table.data_vars().iter().map(VariableDescriptor::from).collect(),
            coordinates: table.coordinates().iter().map(VariableDescriptor::from).collect(),
            attributes: table.attributes().clone(),
        }
    }
}

/// Per-group metadata in path order.
pub fn extract(tree: &CanonicalTree) -> BTreeMap<String, GroupMetadata> {
    tree.groups()
        .map(|(path, table)| {
            let metadata = GroupMetadata::from(table);
            debug!(
                group = %path,
                variables = metadata.variables.len(),
                coordinates = metadata.coordinates.len(),
                "extracted group metadata"
            );
            (path.to_string(), metadata)
        })
        .collect()
}
