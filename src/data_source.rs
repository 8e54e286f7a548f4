//! Data source abstraction shared by every decoding backend
//!
//! A backend can hand back one of three shapes: a native tree it can walk
//! itself, a set of independently opened flat tables keyed by group path, or a
//! single flat table. All three are expressed through the traits below so the
//! resolver and the hierarchy normalizer never see backend-specific types.

use crate::errors::{BackendError, BackendResult};
use crate::types::{AttributeValue, ElementType};
use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Backend-specific open options, e.g. `decode_cf=false`
pub type OpenOptions = BTreeMap<String, String>;

/// Metadata for one array variable of a group
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayEntry {
    pub name: String,
    pub element_type: ElementType,
    pub shape: Vec<usize>,
    pub dimensions: Vec<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl ArrayEntry {
    pub fn new(
        name: impl Into<String>,
        element_type: ElementType,
        dimensions: Vec<(String, usize)>,
    ) -> Self {
        let (dimensions, shape) = dimensions.into_iter().unzip();
        Self {
            name: name.into(),
            element_type,
            shape,
            dimensions,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements, saturating on overflow.
    pub fn element_count(&self) -> usize {
        self.shape
            .iter()
            .fold(1usize, |acc, &len| acc.saturating_mul(len))
    }

    /// Storage size in bytes, saturating on overflow.
    pub fn size_bytes(&self) -> usize {
        self.element_count()
            .saturating_mul(self.element_type.width())
    }

    /// True for a 1-D variable indexed by the dimension of the same name.
    pub fn is_dimension_coordinate(&self) -> bool {
        self.dimensions.len() == 1 && self.dimensions[0] == self.name
    }
}

/// Reads variable values out of an open backend handle.
///
/// Each flat table owns one reader. Dropping the reader releases whatever the
/// backend holds open; `close` exists so the happy path can release eagerly.
pub trait ArrayReader {
    /// Read the whole variable as `f64` values in its own shape.
    fn read(&self, entry: &ArrayEntry) -> BackendResult<ArrayD<f64>>;

    fn close(&mut self) {}
}

/// Reader for tables that carry metadata only.
#[derive(Debug, Default)]
pub struct NoValues;

impl ArrayReader for NoValues {
    fn read(&self, entry: &ArrayEntry) -> BackendResult<ArrayD<f64>> {
        Err(BackendError::NotFound(format!(
            "values of '{}' (metadata-only table)",
            entry.name
        )))
    }
}

/// One flat table: dimensions, coordinates, data variables and attributes of
/// a single group, plus the reader that can load its values.
pub struct GroupTable {
    dimensions: BTreeMap<String, usize>,
    coordinates: Vec<ArrayEntry>,
    data_vars: Vec<ArrayEntry>,
    attributes: BTreeMap<String, AttributeValue>,
    reader: Box<dyn ArrayReader>,
    closed: bool,
}

impl GroupTable {
    pub fn builder() -> GroupTableBuilder {
        GroupTableBuilder::default()
    }

    pub fn dimensions(&self) -> &BTreeMap<String, usize> {
        &self.dimensions
    }

    pub fn coordinates(&self) -> &[ArrayEntry] {
        &self.coordinates
    }

    pub fn data_vars(&self) -> &[ArrayEntry] {
        &self.data_vars
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    /// Look up a variable by name, data variables first, then coordinates.
    pub fn variable(&self, name: &str) -> Option<&ArrayEntry> {
        self.data_vars
            .iter()
            .chain(self.coordinates.iter())
            .find(|entry| entry.name == name)
    }

    /// Read the values of one of this table's variables.
    pub fn read(&self, entry: &ArrayEntry) -> BackendResult<ArrayD<f64>> {
        if self.closed {
            return Err(BackendError::decode("table is already closed"));
        }
        let values = self.reader.read(entry)?;
        if values.shape() != entry.shape.as_slice() {
            return Err(BackendError::decode(format!(
                "variable '{}' decoded with shape {:?}, expected {:?}",
                entry.name,
                values.shape(),
                entry.shape
            )));
        }
        Ok(values)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the backend resources held by this table.
    pub fn close(&mut self) {
        if !self.closed {
            self.reader.close();
            self.closed = true;
        }
    }
}

impl Drop for GroupTable {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for GroupTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupTable")
            .field("dimensions", &self.dimensions)
            .field("coordinates", &self.coordinates)
            .field("data_vars", &self.data_vars)
            .field("attributes", &self.attributes)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Collects the pieces of a [`GroupTable`], checking dimension consistency.
#[derive(Debug, Default)]
pub struct GroupTableBuilder {
    dimensions: BTreeMap<String, usize>,
    variables: Vec<ArrayEntry>,
    attributes: BTreeMap<String, AttributeValue>,
}

impl GroupTableBuilder {
    /// Register a dimension; a second registration must agree on the extent.
    pub fn dimension(&mut self, name: &str, len: usize) -> BackendResult<&mut Self> {
        match self.dimensions.get(name) {
            Some(&existing) if existing != len => Err(BackendError::DimensionConflict {
                dim: name.to_string(),
                existing,
                found: len,
            }),
            Some(_) => Ok(self),
            None => {
                self.dimensions.insert(name.to_string(), len);
                Ok(self)
            }
        }
    }

    pub fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dimensions.get(name).copied()
    }

    /// Add a variable and register every dimension it uses.
    pub fn variable(&mut self, entry: ArrayEntry) -> BackendResult<&mut Self> {
        if entry.dimensions.len() != entry.shape.len() {
            return Err(BackendError::RankMismatch {
                var: entry.name.clone(),
                names: entry.dimensions.len(),
                axes: entry.shape.len(),
            });
        }
        for (dim, &len) in entry.dimensions.iter().zip(entry.shape.iter()) {
            self.dimension(dim, len)?;
        }
        self.variables.push(entry);
        Ok(self)
    }

    pub fn attribute(&mut self, key: impl Into<String>, value: AttributeValue) -> &mut Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Finish the table, handing it the reader for its values.
    pub fn build(self, reader: Box<dyn ArrayReader>) -> GroupTable {
        let (coordinates, data_vars): (Vec<_>, Vec<_>) = self
            .variables
            .into_iter()
            .partition(ArrayEntry::is_dimension_coordinate);
        debug!(
            dims = self.dimensions.len(),
            coords = coordinates.len(),
            data_vars = data_vars.len(),
            "built group table"
        );
        GroupTable {
            dimensions: self.dimensions,
            coordinates,
            data_vars,
            attributes: self.attributes,
            reader,
            closed: false,
        }
    }
}

/// A backend's native hierarchical handle.
pub trait TreeHandle {
    /// Every node path in the tree, `"/"` included.
    fn group_paths(&self) -> BackendResult<Vec<String>>;

    /// Build the flat table of one node.
    fn group_table(&self, path: &str) -> BackendResult<GroupTable>;

    fn close(&mut self) {}
}

/// A decoding backend adapter.
pub trait Backend {
    /// Identifier used by the format registry (`netcdf`, `zarr`, ...)
    fn id(&self) -> &str;

    /// Open the file as a native tree. Backends that cannot produce one keep
    /// the default, which signals [`BackendError::NotImplemented`].
    fn open_tree(&self, _path: &Path, _options: &OpenOptions) -> BackendResult<Box<dyn TreeHandle>> {
        Err(BackendError::NotImplemented(format!(
            "{} cannot open hierarchical trees",
            self.id()
        )))
    }

    /// Open one group (`"/"` for the root) as a flat table.
    fn open_flat(&self, path: &Path, group: &str, options: &OpenOptions) -> BackendResult<GroupTable>;

    /// Auxiliary group enumeration, for backends that offer one.
    fn list_groups(&self, _path: &Path, _options: &OpenOptions) -> Option<BackendResult<Vec<String>>> {
        None
    }
}

/// Whatever a successful resolver attempt produced
pub enum OpenedDataset {
    Tree(Box<dyn TreeHandle>),
    Grouped(BTreeMap<String, GroupTable>),
    Flat(GroupTable),
}

impl OpenedDataset {
    pub fn shape_name(&self) -> &'static str {
        match self {
            OpenedDataset::Tree(_) => "tree",
            OpenedDataset::Grouped(_) => "grouped",
            OpenedDataset::Flat(_) => "flat",
        }
    }
}

impl fmt::Debug for OpenedDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenedDataset::Tree(_) => f.write_str("OpenedDataset::Tree"),
            OpenedDataset::Grouped(tables) => f
                .debug_tuple("OpenedDataset::Grouped")
                .field(&tables.keys().collect::<Vec<_>>())
                .finish(),
            OpenedDataset::Flat(table) => f.debug_tuple("OpenedDataset::Flat").field(table).finish(),
        }
    }
}

/// Normalize a group path to the `"/a/b"` form; empty means the root.
pub fn normalize_group_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Join a child group name onto a parent path.
pub fn join_group_path(parent: &str, child: &str) -> String {
    if parent == "/" || parent.is_empty() {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, dims: &[(&str, usize)]) -> ArrayEntry {
        ArrayEntry::new(
            name,
            ElementType::Float32,
            dims.iter().map(|(d, n)| (d.to_string(), *n)).collect(),
        )
    }

    #[test]
    fn test_builder_classifies_dimension_coordinates() {
        let mut builder = GroupTable::builder();
        builder.variable(entry("lat", &[("lat", 3)])).unwrap();
        builder.variable(entry("temp", &[("lat", 3), ("lon", 4)])).unwrap();
        let table = builder.build(Box::new(NoValues));

        assert_eq!(table.coordinates().len(), 1);
        assert_eq!(table.coordinates()[0].name, "lat");
        assert_eq!(table.data_vars()[0].name, "temp");
        assert_eq!(table.dimensions().get("lon"), Some(&4));
    }

    #[test]
    fn test_builder_rejects_conflicting_extents() {
        let mut builder = GroupTable::builder();
        builder.variable(entry("a", &[("x", 3)])).unwrap();
        let err = builder.variable(entry("b", &[("x", 5)])).unwrap_err();
        assert!(matches!(err, BackendError::DimensionConflict { found: 5, .. }));
    }

    #[test]
    fn test_size_bytes_saturates() {
        let big = entry("big", &[("a", usize::MAX), ("b", 4)]);
        assert_eq!(big.size_bytes(), usize::MAX);
        assert_eq!(entry("t", &[("x", 2), ("y", 3)]).size_bytes(), 24);
    }

    #[test]
    fn test_group_path_helpers() {
        assert_eq!(normalize_group_path(""), "/");
        assert_eq!(normalize_group_path("a/b/"), "/a/b");
        assert_eq!(join_group_path("/", "g"), "/g");
        assert_eq!(join_group_path("/a", "b"), "/a/b");
    }
}
