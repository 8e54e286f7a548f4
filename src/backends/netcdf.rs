//! NetCDF / HDF5 backend built on the `netcdf` crate
//!
//! netCDF-4 (and therefore most HDF5) files expose a group tree. Classic
//! netCDF-3 files have no root group, in which case tree opening reports
//! "not implemented" and the resolver falls back to a flat open.

use crate::data_source::{
    join_group_path, normalize_group_path, ArrayEntry, ArrayReader, Backend, GroupTable,
    OpenOptions, TreeHandle,
};
use crate::errors::{BackendError, BackendResult};
use crate::types::{AttributeValue, ElementType};
use ndarray::{ArrayD, IxDyn};
use netcdf::{Attribute, File, Group, Variable};
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info};

/// Backend id and Cargo feature name
pub const ID: &str = "netcdf";

#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfBackend;

impl NetcdfBackend {
    fn open_file(path: &Path, options: &OpenOptions) -> BackendResult<File> {
        for key in options.keys() {
            if !matches!(key.as_str(), "decode_cf" | "mode") {
                debug!(option = %key, "ignoring unknown netcdf open option");
            }
        }
        let file = match options.get("mode") {
            // NCZarr stores are addressed through a URL with a mode fragment
            Some(mode) => {
                let absolute = std::fs::canonicalize(path)?;
                let url = format!("file://{}#mode={},file", absolute.display(), mode);
                debug!(%url, "opening through netCDF URL");
                netcdf::open(url)?
            }
            None => netcdf::open(path)?,
        };
        Ok(file)
    }
}

impl Backend for NetcdfBackend {
    fn id(&self) -> &str {
        ID
    }

    fn open_tree(&self, path: &Path, options: &OpenOptions) -> BackendResult<Box<dyn TreeHandle>> {
        let file = Self::open_file(path, options)?;
        if file.root().is_none() {
            return Err(BackendError::NotImplemented(
                "classic netCDF files have no group hierarchy".to_string(),
            ));
        }
        info!(path = %path.display(), "opened netCDF file as a group tree");
        Ok(Box::new(NetcdfTree {
            file: Rc::new(file),
        }))
    }

    fn open_flat(&self, path: &Path, group: &str, options: &OpenOptions) -> BackendResult<GroupTable> {
        let file = Rc::new(Self::open_file(path, options)?);
        build_table(&file, &normalize_group_path(group))
    }

    fn list_groups(&self, path: &Path, options: &OpenOptions) -> Option<BackendResult<Vec<String>>> {
        let listing = Self::open_file(path, options).map(|file| {
            let mut paths = Vec::new();
            if let Some(root) = file.root() {
                collect_group_paths(&root, "/", &mut paths);
            }
            paths
        });
        Some(listing)
    }
}

/// netCDF-4 file opened as a tree; every node table shares the file handle.
pub struct NetcdfTree {
    file: Rc<File>,
}

impl TreeHandle for NetcdfTree {
    fn group_paths(&self) -> BackendResult<Vec<String>> {
        let mut paths = vec!["/".to_string()];
        if let Some(root) = self.file.root() {
            collect_group_paths(&root, "/", &mut paths);
        }
        Ok(paths)
    }

    fn group_table(&self, path: &str) -> BackendResult<GroupTable> {
        build_table(&self.file, path)
    }
}

fn collect_group_paths(group: &Group<'_>, prefix: &str, paths: &mut Vec<String>) {
    for child in group.groups() {
        let path = join_group_path(prefix, &child.name());
        paths.push(path.clone());
        collect_group_paths(&child, &path, paths);
    }
}

/// A located node: the file itself for `"/"`, a group otherwise.
enum Node<'f> {
    Root(&'f File),
    Group(Group<'f>),
}

impl<'f> Node<'f> {
    fn locate(file: &'f File, path: &str) -> BackendResult<Node<'f>> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Ok(Node::Root(file));
        }
        let mut current = file
            .root()
            .ok_or_else(|| BackendError::NotFound(format!("group '{}'", path)))?;
        for segment in segments {
            let next = current
                .groups()
                .find(|g| g.name() == segment)
                .ok_or_else(|| BackendError::NotFound(format!("group '{}'", path)))?;
            current = next;
        }
        Ok(Node::Group(current))
    }

    fn variables(&self) -> Vec<Variable<'f>> {
        match self {
            Node::Root(file) => file.variables().collect(),
            Node::Group(group) => group.variables().collect(),
        }
    }

    fn variable(&self, name: &str) -> Option<Variable<'f>> {
        self.variables().into_iter().find(|v| v.name() == name)
    }

    fn dimensions(&self) -> Vec<(String, usize)> {
        match self {
            Node::Root(file) => file.dimensions().map(|d| (d.name(), d.len())).collect(),
            Node::Group(group) => group.dimensions().map(|d| (d.name(), d.len())).collect(),
        }
    }

    fn attributes(&self) -> BackendResult<Vec<(String, AttributeValue)>> {
        match self {
            Node::Root(file) => file.attributes().map(|a| convert_attribute(&a)).collect(),
            Node::Group(group) => group.attributes().map(|a| convert_attribute(&a)).collect(),
        }
    }
}

fn build_table(file: &Rc<File>, path: &str) -> BackendResult<GroupTable> {
    let node = Node::locate(file, path)?;
    let mut builder = GroupTable::builder();
    for (name, len) in node.dimensions() {
        builder.dimension(&name, len)?;
    }
    for (key, value) in node.attributes()? {
        builder.attribute(key, value);
    }
    for var in node.variables() {
        builder.variable(describe_variable(&var)?)?;
    }
    debug!(group = %path, "built netCDF group table");
    Ok(builder.build(Box::new(NetcdfReader {
        file: Some(Rc::clone(file)),
        group: path.to_string(),
    })))
}

fn describe_variable(var: &Variable<'_>) -> BackendResult<ArrayEntry> {
    let dims = var
        .dimensions()
        .iter()
        .map(|d| (d.name(), d.len()))
        .collect();
    let mut entry = ArrayEntry::new(var.name(), element_type_of(var), dims);
    for attr in var.attributes() {
        let (key, value) = convert_attribute(&attr)?;
        entry.attributes.insert(key, value);
    }
    Ok(entry)
}

/// Map the netCDF external type onto an [`ElementType`].
fn element_type_of(var: &Variable<'_>) -> ElementType {
    element_type_from_debug(&format!("{:?}", var.vartype()))
}

fn element_type_from_debug(debug: &str) -> ElementType {
    let key: String = debug
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    let ends = |suffix: &str| key.ends_with(suffix);
    if ends("u8") {
        ElementType::UInt8
    } else if ends("i8") {
        ElementType::Int8
    } else if ends("u16") {
        ElementType::UInt16
    } else if ends("i16") {
        ElementType::Int16
    } else if ends("u32") {
        ElementType::UInt32
    } else if ends("i32") {
        ElementType::Int32
    } else if ends("u64") {
        ElementType::UInt64
    } else if ends("i64") {
        ElementType::Int64
    } else if ends("f32") {
        ElementType::Float32
    } else if ends("f64") {
        ElementType::Float64
    } else if key == "char" {
        ElementType::Bytes(1)
    } else {
        ElementType::Object
    }
}

fn convert_attribute(attr: &Attribute<'_>) -> BackendResult<(String, AttributeValue)> {
    use netcdf::AttributeValue as Nc;
    let value = match attr.value()? {
        Nc::Uchar(v) => AttributeValue::UInt(v as u64),
        Nc::Schar(v) => AttributeValue::Int(v as i64),
        Nc::Ushort(v) => AttributeValue::UInt(v as u64),
        Nc::Short(v) => AttributeValue::Int(v as i64),
        Nc::Uint(v) => AttributeValue::UInt(v as u64),
        Nc::Int(v) => AttributeValue::Int(v as i64),
        Nc::Ulonglong(v) => AttributeValue::UInt(v),
        Nc::Longlong(v) => AttributeValue::Int(v),
        Nc::Float(v) => AttributeValue::Float(v as f64),
        Nc::Double(v) => AttributeValue::Float(v),
        Nc::Str(v) => AttributeValue::Str(v),
        Nc::Uchars(v) => array(v.into_iter().map(|x| AttributeValue::UInt(x as u64))),
        Nc::Schars(v) => array(v.into_iter().map(|x| AttributeValue::Int(x as i64))),
        Nc::Ushorts(v) => array(v.into_iter().map(|x| AttributeValue::UInt(x as u64))),
        Nc::Shorts(v) => array(v.into_iter().map(|x| AttributeValue::Int(x as i64))),
        Nc::Uints(v) => array(v.into_iter().map(|x| AttributeValue::UInt(x as u64))),
        Nc::Ints(v) => array(v.into_iter().map(|x| AttributeValue::Int(x as i64))),
        Nc::Ulonglongs(v) => array(v.into_iter().map(AttributeValue::UInt)),
        Nc::Longlongs(v) => array(v.into_iter().map(AttributeValue::Int)),
        Nc::Floats(v) => array(v.into_iter().map(|x| AttributeValue::Float(x as f64))),
        Nc::Doubles(v) => array(v.into_iter().map(AttributeValue::Float)),
        Nc::Strs(v) => array(v.into_iter().map(AttributeValue::Str)),
        #[allow(unreachable_patterns)]
        other => AttributeValue::Opaque(format!("{:?}", other)),
    };
    Ok((attr.name().to_string(), value))
}

fn array(values: impl Iterator<Item = AttributeValue>) -> AttributeValue {
    AttributeValue::Array(values.collect())
}

/// Reads variable values of one group through the shared file handle.
struct NetcdfReader {
    file: Option<Rc<File>>,
    group: String,
}

impl ArrayReader for NetcdfReader {
    fn read(&self, entry: &ArrayEntry) -> BackendResult<ArrayD<f64>> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| BackendError::decode("netCDF handle already closed"))?;
        let node = Node::locate(file, &self.group)?;
        let var = node
            .variable(&entry.name)
            .ok_or_else(|| BackendError::NotFound(format!("variable '{}'", entry.name)))?;
        let values: Vec<f64> = var.get_values::<f64, _>(..)?;
        Ok(ArrayD::from_shape_vec(IxDyn(&entry.shape), values)?)
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(group = %self.group, "released netCDF group handle");
        }
    }
}
