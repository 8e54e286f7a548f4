//! GRIB2 backend built on the `grib` crate
//!
//! GRIB files are flat collections of submessages; there is no group tree,
//! so only the root table exists. Each submessage becomes one `(y, x)`
//! variable named after its discipline, category and parameter numbers.

use crate::data_source::{
    normalize_group_path, ArrayEntry, ArrayReader, Backend, GroupTable, OpenOptions,
};
use crate::errors::{BackendError, BackendResult};
use crate::types::{AttributeValue, ElementType};
use ndarray::{ArrayD, IxDyn};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Backend id and Cargo feature name
pub const ID: &str = "grib";

#[derive(Debug, Clone, Copy, Default)]
pub struct GribBackend;

impl Backend for GribBackend {
    fn id(&self) -> &str {
        ID
    }

    fn open_flat(&self, path: &Path, group: &str, options: &OpenOptions) -> BackendResult<GroupTable> {
        if normalize_group_path(group) != "/" {
            return Err(BackendError::NotFound(format!("group '{}' in GRIB file", group)));
        }
        // No side index files are ever written, whatever `index_path` says
        if let Some(index_path) = options.get("index_path") {
            debug!(%index_path, "GRIB index files disabled");
        }

        let grib = open_grib(path)?;
        let mut builder = GroupTable::builder();
        let mut messages = BTreeMap::new();
        let mut grids: Vec<(usize, usize)> = Vec::new();

        for (position, ((message, submessage), submsg)) in grib.iter().enumerate() {
            let (ni, nj) = submsg.grid_shape().map_err(grib_error)?;
            let discipline = submsg.indicator().discipline;
            let prod_def = submsg.prod_def();
            let category = prod_def.parameter_category();
            let number = prod_def.parameter_number();

            let grid = match grids.iter().position(|g| *g == (ni, nj)) {
                Some(idx) => idx,
                None => {
                    grids.push((ni, nj));
                    grids.len() - 1
                }
            };
            let (y, x) = if grid == 0 {
                ("y".to_string(), "x".to_string())
            } else {
                (format!("y{}", grid), format!("x{}", grid))
            };

            let base = match (category, number) {
                (Some(c), Some(n)) => format!("param_{}_{}_{}", discipline, c, n),
                _ => format!("message_{}_{}", message, submessage),
            };
            let mut name = base.clone();
            let mut suffix = 1;
            while messages.contains_key(&name) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }

            let mut entry = ArrayEntry::new(
                name.clone(),
                ElementType::Float32,
                vec![(y, nj), (x, ni)],
            )
            .with_attribute("GRIB_discipline", discipline as i64)
            .with_attribute("GRIB_gridTemplateNumber", submsg.grid_def().grid_tmpl_num() as i64)
            .with_attribute("GRIB_productTemplateNumber", prod_def.prod_tmpl_num() as i64);
            if let Some(c) = category {
                entry = entry.with_attribute("GRIB_parameterCategory", c as i64);
            }
            if let Some(n) = number {
                entry = entry.with_attribute("GRIB_parameterNumber", n as i64);
            }
            builder.variable(entry)?;
            messages.insert(name, position);
        }

        builder
            .attribute("GRIB_edition", AttributeValue::Int(2))
            .attribute("GRIB_submessages", AttributeValue::UInt(messages.len() as u64));
        info!(path = %path.display(), submessages = messages.len(), "opened GRIB file");

        Ok(builder.build(Box::new(GribReader {
            path: Some(path.to_path_buf()),
            messages,
        })))
    }
}

fn open_grib(path: &Path) -> BackendResult<grib::Grib2<grib::SeekableGrib2Reader<BufReader<File>>>> {
    let f = BufReader::new(File::open(path)?);
    grib::from_reader(f).map_err(grib_error)
}

fn grib_error(e: grib::GribError) -> BackendError {
    BackendError::decode(format!("GRIB decoding failed: {}", e))
}

/// Re-reads the file and decodes one submessage per request.
struct GribReader {
    path: Option<PathBuf>,
    messages: BTreeMap<String, usize>,
}

impl ArrayReader for GribReader {
    fn read(&self, entry: &ArrayEntry) -> BackendResult<ArrayD<f64>> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| BackendError::decode("GRIB file already closed"))?;
        let position = *self
            .messages
            .get(&entry.name)
            .ok_or_else(|| BackendError::NotFound(format!("variable '{}'", entry.name)))?;

        let grib = open_grib(path)?;
        let (_, submsg) = grib
            .iter()
            .nth(position)
            .ok_or_else(|| BackendError::decode(format!("submessage {} disappeared", position)))?;
        let decoder = grib::Grib2SubmessageDecoder::from(submsg).map_err(grib_error)?;
        let values: Vec<f64> = decoder
            .dispatch()
            .map_err(grib_error)?
            .map(|v| v as f64)
            .collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&entry.shape), values)?)
    }

    fn close(&mut self) {
        self.path.take();
    }
}
