//! Zarr directory store backend
//!
//! Reads local Zarr v2 stores (optionally consolidated through `.zmetadata`)
//! and Zarr v3 stores (`zarr.json`). The node hierarchy is discovered from
//! the metadata documents; array values are decoded by `zarrs`, so every
//! codec it ships is readable, blosc included.

use crate::data_source::{
    normalize_group_path, ArrayEntry, ArrayReader, Backend, GroupTable, GroupTableBuilder,
    OpenOptions, TreeHandle,
};
use crate::errors::{BackendError, BackendResult};
use crate::types::{AttributeValue, ElementType};
use ndarray::{ArrayD, IxDyn};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zarrs::array::Array;
use zarrs_filesystem::FilesystemStore;

/// Backend id and Cargo feature name
pub const ID: &str = "zarr";

/// Attribute carrying xarray's dimension names in Zarr v2 stores
const ARRAY_DIMENSIONS: &str = "_ARRAY_DIMENSIONS";

#[derive(Debug, Clone, Copy, Default)]
pub struct ZarrBackend;

impl Backend for ZarrBackend {
    fn id(&self) -> &str {
        ID
    }

    fn open_tree(&self, path: &Path, _options: &OpenOptions) -> BackendResult<Box<dyn TreeHandle>> {
        let store = ZarrStore::open(path)?;
        info!(
            path = %path.display(),
            groups = store.group_paths().len(),
            "opened Zarr store as a group tree"
        );
        Ok(Box::new(ZarrTree {
            store: Rc::new(store),
        }))
    }

    fn open_flat(&self, path: &Path, group: &str, _options: &OpenOptions) -> BackendResult<GroupTable> {
        let store = Rc::new(ZarrStore::open(path)?);
        store_table(&store, &normalize_group_path(group))
    }

    fn list_groups(&self, path: &Path, _options: &OpenOptions) -> Option<BackendResult<Vec<String>>> {
        Some(ZarrStore::open(path).map(|store| {
            store
                .group_paths()
                .into_iter()
                .filter(|p| p != "/")
                .collect()
        }))
    }
}

struct ZarrTree {
    store: Rc<ZarrStore>,
}

impl TreeHandle for ZarrTree {
    fn group_paths(&self) -> BackendResult<Vec<String>> {
        Ok(self.store.group_paths())
    }

    fn group_table(&self, path: &str) -> BackendResult<GroupTable> {
        store_table(&self.store, path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZarrFormat {
    V2,
    V3,
}

/// What a group table needs to know about one array node
#[derive(Debug, Clone)]
struct ArrayMeta {
    name: String,
    /// Store key of the node, e.g. `/group1/pressure`
    node_path: String,
    shape: Vec<usize>,
    element: ElementType,
    dimension_names: Option<Vec<String>>,
    attributes: BTreeMap<String, AttributeValue>,
}

#[derive(Debug, Clone)]
enum StoreNode {
    Group(BTreeMap<String, AttributeValue>),
    Array(ArrayMeta),
}

/// A local Zarr store with every node's metadata loaded up front
struct ZarrStore {
    storage: Arc<FilesystemStore>,
    nodes: BTreeMap<String, StoreNode>,
}

impl ZarrStore {
    fn open(root: &Path) -> BackendResult<Self> {
        if !root.exists() {
            return Err(BackendError::NotFound(format!(
                "Zarr store path {}",
                root.display()
            )));
        }
        if !root.is_dir() {
            return Err(BackendError::decode(format!(
                "Zarr store path is not a directory: {}",
                root.display()
            )));
        }

        let nodes = if root.join("zarr.json").is_file() {
            Self::scan(root, ZarrFormat::V3)?
        } else if root.join(".zmetadata").is_file() {
            Self::load_consolidated(root)?
        } else if root.join(".zgroup").is_file() {
            Self::scan(root, ZarrFormat::V2)?
        } else {
            return Err(BackendError::decode(format!(
                "{} is not a Zarr store (no zarr.json, .zgroup or .zmetadata)",
                root.display()
            )));
        };

        if !matches!(nodes.get("/"), Some(StoreNode::Group(_))) {
            return Err(BackendError::decode("Zarr store root is not a group"));
        }
        let storage = FilesystemStore::new(root).map_err(|e| zarrs_error(&root.display(), e))?;
        Ok(Self {
            storage: Arc::new(storage),
            nodes,
        })
    }

    /// Walk the directory tree, stopping at array directories.
    fn scan(root: &Path, format: ZarrFormat) -> BackendResult<BTreeMap<String, StoreNode>> {
        let mut nodes = BTreeMap::new();
        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || (entry.file_type().is_dir()
                        && !entry.file_name().to_string_lossy().starts_with('.')
                        && !entry
                            .path()
                            .parent()
                            .map(|parent| is_array_dir(parent, format))
                            .unwrap_or(false))
            });

        for entry in walker {
            let entry = entry.map_err(|e| BackendError::decode(e.to_string()))?;
            let dir = entry.path();
            let relative = dir.strip_prefix(root).unwrap_or(dir);
            let node_path = normalize_group_path(&relative.to_string_lossy().replace('\\', "/"));
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let node = match format {
                ZarrFormat::V2 => {
                    let attrs = read_json(&dir.join(".zattrs"))?;
                    if let Some(zarray) = read_json(&dir.join(".zarray"))? {
                        let meta = parse_v2_array(&name, &node_path, &zarray, attrs.as_ref())?;
                        Some(StoreNode::Array(meta))
                    } else if dir.join(".zgroup").is_file() {
                        Some(StoreNode::Group(json_attributes(attrs.as_ref())))
                    } else {
                        None
                    }
                }
                ZarrFormat::V3 => match read_json(&dir.join("zarr.json"))? {
                    Some(meta) => Some(parse_v3_node(&name, &node_path, &meta)?),
                    None => None,
                },
            };
            if let Some(node) = node {
                nodes.insert(node_path, node);
            }
        }
        debug!(nodes = nodes.len(), ?format, "scanned Zarr store");
        Ok(nodes)
    }

    /// Load every node from the consolidated `.zmetadata` document.
    fn load_consolidated(root: &Path) -> BackendResult<BTreeMap<String, StoreNode>> {
        let document = read_json(&root.join(".zmetadata"))?
            .ok_or_else(|| BackendError::decode("missing .zmetadata"))?;
        let metadata = document
            .get("metadata")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| BackendError::decode(".zmetadata has no 'metadata' object"))?;

        let mut nodes = BTreeMap::new();
        for (key, value) in metadata {
            let (prefix, file) = match key.rsplit_once('/') {
                Some((prefix, file)) => (prefix, file),
                None => ("", key.as_str()),
            };
            let node_path = normalize_group_path(prefix);
            let attrs = metadata.get(&attributes_key(prefix));
            match file {
                ".zarray" => {
                    let name = prefix.rsplit('/').next().unwrap_or(prefix);
                    let meta = parse_v2_array(name, &node_path, value, attrs)?;
                    nodes.insert(node_path, StoreNode::Array(meta));
                }
                ".zgroup" => {
                    nodes.insert(node_path, StoreNode::Group(json_attributes(attrs)));
                }
                _ => {}
            }
        }
        debug!(nodes = nodes.len(), "loaded consolidated Zarr metadata");
        Ok(nodes)
    }

    fn group_paths(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| matches!(node, StoreNode::Group(_)))
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn group_attributes(&self, path: &str) -> BackendResult<&BTreeMap<String, AttributeValue>> {
        match self.nodes.get(path) {
            Some(StoreNode::Group(attrs)) => Ok(attrs),
            _ => Err(BackendError::NotFound(format!("group '{}'", path))),
        }
    }

    /// Arrays whose parent is `group`, in name order.
    fn arrays_in(&self, group: &str) -> Vec<&ArrayMeta> {
        self.nodes
            .iter()
            .filter_map(|(path, node)| match node {
                StoreNode::Array(meta) if parent_of(path) == group => Some(meta),
                _ => None,
            })
            .collect()
    }

    /// Decode a whole array through `zarrs`. Missing chunks read back as
    /// the array's fill value.
    fn read_array(&self, meta: &ArrayMeta) -> BackendResult<ArrayD<f64>> {
        let array = Array::open(Arc::clone(&self.storage), &meta.node_path)
            .map_err(|e| zarrs_error(&meta.name, e))?;
        let subset = array.subset_all();

        macro_rules! elements {
            ($t:ty) => {
                array
                    .retrieve_array_subset_elements::<$t>(&subset)
                    .map_err(|e| zarrs_error(&meta.name, e))?
                    .into_iter()
                    .map(|v| v as f64)
                    .collect::<Vec<f64>>()
            };
        }

        let values = match &meta.element {
            ElementType::Bool => array
                .retrieve_array_subset_elements::<bool>(&subset)
                .map_err(|e| zarrs_error(&meta.name, e))?
                .into_iter()
                .map(|v| if v { 1.0 } else { 0.0 })
                .collect(),
            ElementType::Int8 => elements!(i8),
            ElementType::Int16 => elements!(i16),
            ElementType::Int32 => elements!(i32),
            ElementType::Int64 => elements!(i64),
            ElementType::UInt8 => elements!(u8),
            ElementType::UInt16 => elements!(u16),
            ElementType::UInt32 => elements!(u32),
            ElementType::UInt64 => elements!(u64),
            ElementType::Float32 => elements!(f32),
            ElementType::Float64 => elements!(f64),
            other => {
                return Err(BackendError::decode(format!(
                    "array '{}' has element type {} which cannot be plotted",
                    meta.name,
                    other.tag()
                )))
            }
        };

        let shape: Vec<usize> = array.shape().iter().map(|&n| n as usize).collect();
        debug!(array = %meta.name, ?shape, "read Zarr array");
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
    }
}

fn zarrs_error(subject: &dyn Display, err: impl Display) -> BackendError {
    BackendError::decode(format!("Zarr '{}': {}", subject, err))
}

fn attributes_key(prefix: &str) -> String {
    if prefix.is_empty() {
        ".zattrs".to_string()
    } else {
        format!("{}/.zattrs", prefix)
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn is_array_dir(dir: &Path, format: ZarrFormat) -> bool {
    match format {
        ZarrFormat::V2 => dir.join(".zarray").is_file(),
        ZarrFormat::V3 => matches!(
            read_json(&dir.join("zarr.json")),
            Ok(Some(meta)) if meta.get("node_type").and_then(JsonValue::as_str) == Some("array")
        ),
    }
}

fn read_json(path: &Path) -> BackendResult<Option<JsonValue>> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn json_attributes(attrs: Option<&JsonValue>) -> BTreeMap<String, AttributeValue> {
    attrs
        .and_then(JsonValue::as_object)
        .map(|map| {
            map.iter()
                .filter(|(key, _)| key.as_str() != ARRAY_DIMENSIONS)
                .map(|(key, value)| (key.clone(), AttributeValue::from_json(value)))
                .collect()
        })
        .unwrap_or_default()
}

fn shape_of(value: Option<&JsonValue>, array: &str) -> BackendResult<Vec<usize>> {
    value
        .and_then(JsonValue::as_array)
        .ok_or_else(|| BackendError::decode(format!("array '{}' has no shape in metadata", array)))?
        .iter()
        .map(|v| {
            v.as_u64().map(|n| n as usize).ok_or_else(|| {
                BackendError::decode(format!("array '{}' has a non-integer shape entry", array))
            })
        })
        .collect()
}

fn string_list(value: Option<&JsonValue>) -> Option<Vec<String>> {
    value.and_then(JsonValue::as_array).and_then(|items| {
        items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

fn parse_v2_array(
    name: &str,
    node_path: &str,
    zarray: &JsonValue,
    attrs: Option<&JsonValue>,
) -> BackendResult<ArrayMeta> {
    let typestr = zarray
        .get("dtype")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| BackendError::decode(format!("array '{}' has a structured or missing dtype", name)))?;
    let (element, _) = ElementType::from_typestr(typestr)
        .ok_or_else(|| BackendError::decode(format!("array '{}' has unknown dtype '{}'", name, typestr)))?;

    Ok(ArrayMeta {
        name: name.to_string(),
        node_path: node_path.to_string(),
        shape: shape_of(zarray.get("shape"), name)?,
        element,
        dimension_names: attrs.and_then(|a| string_list(a.get(ARRAY_DIMENSIONS))),
        attributes: json_attributes(attrs),
    })
}

fn parse_v3_node(name: &str, node_path: &str, meta: &JsonValue) -> BackendResult<StoreNode> {
    let attrs = meta.get("attributes");
    match meta.get("node_type").and_then(JsonValue::as_str) {
        Some("group") => return Ok(StoreNode::Group(json_attributes(attrs))),
        Some("array") => {}
        other => {
            return Err(BackendError::decode(format!(
                "node '{}' has unknown node_type {:?}",
                name, other
            )))
        }
    }

    let type_name = meta
        .get("data_type")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| BackendError::decode(format!("array '{}' has no data_type", name)))?;
    let element = ElementType::from_name(type_name)
        .ok_or_else(|| BackendError::decode(format!("array '{}' has unknown data_type '{}'", name, type_name)))?;

    Ok(StoreNode::Array(ArrayMeta {
        name: name.to_string(),
        node_path: node_path.to_string(),
        shape: shape_of(meta.get("shape"), name)?,
        element,
        dimension_names: string_list(meta.get("dimension_names")),
        attributes: json_attributes(attrs),
    }))
}

fn store_table(store: &Rc<ZarrStore>, group: &str) -> BackendResult<GroupTable> {
    let mut builder = GroupTable::builder();
    for (key, value) in store.group_attributes(group)? {
        builder.attribute(key.clone(), value.clone());
    }

    let mut arrays = BTreeMap::new();
    for meta in store.arrays_in(group) {
        let dimensions = match &meta.dimension_names {
            Some(names) if names.len() == meta.shape.len() => names.clone(),
            Some(names) => {
                return Err(BackendError::RankMismatch {
                    var: meta.name.clone(),
                    names: names.len(),
                    axes: meta.shape.len(),
                })
            }
            None => synthetic_dimensions(&builder, meta),
        };
        let mut entry = ArrayEntry::new(
            meta.name.clone(),
            meta.element.clone(),
            dimensions.into_iter().zip(meta.shape.iter().copied()).collect(),
        );
        entry.attributes = meta.attributes.clone();
        builder.variable(entry)?;
        arrays.insert(meta.name.clone(), meta.clone());
    }

    Ok(builder.build(Box::new(ZarrArrayReader {
        arrays,
        store: Some(Rc::clone(store)),
    })))
}

/// Names for arrays stored without dimension names: `dim_N`, or
/// `<array>_dim_N` when `dim_N` is already taken with another extent.
fn synthetic_dimensions(builder: &GroupTableBuilder, meta: &ArrayMeta) -> Vec<String> {
    warn!(array = %meta.name, "array has no dimension names, synthesizing them");
    meta.shape
        .iter()
        .enumerate()
        .map(|(axis, &len)| {
            let shared = format!("dim_{}", axis);
            match builder.dimension_len(&shared) {
                Some(existing) if existing != len => format!("{}_dim_{}", meta.name, axis),
                _ => shared,
            }
        })
        .collect()
}

struct ZarrArrayReader {
    arrays: BTreeMap<String, ArrayMeta>,
    store: Option<Rc<ZarrStore>>,
}

impl ArrayReader for ZarrArrayReader {
    fn read(&self, entry: &ArrayEntry) -> BackendResult<ArrayD<f64>> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| BackendError::decode("Zarr store already closed"))?;
        let meta = self
            .arrays
            .get(&entry.name)
            .ok_or_else(|| BackendError::NotFound(format!("array '{}'", entry.name)))?;
        store.read_array(meta)
    }

    fn close(&mut self) {
        self.store.take();
    }
}
