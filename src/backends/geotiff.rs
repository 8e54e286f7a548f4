//! GeoTIFF raster backend built on the `tiff` decoder
//!
//! The raster becomes a single `band_data(band, y, x)` variable with `band`,
//! `y` and `x` coordinates. Any sample format the decoder produces is
//! accepted: unsigned, signed and floating point, one or many samples per
//! pixel. When the file carries `ModelPixelScale` and `ModelTiepoint` tags
//! the `x`/`y` coordinates are pixel centres in model space, otherwise they
//! are pixel-centre indices. Samples are never masked or scaled; a GDAL
//! nodata value is reported as the `nodata` attribute.
//!
//! The same adapter is the raster candidate for `.jp2` files. JPEG-2000
//! codestreams are recognised by their signature and rejected with a
//! decode failure, since no JPEG-2000 codec is linked in.

use crate::data_source::{
    normalize_group_path, ArrayEntry, ArrayReader, Backend, GroupTable, OpenOptions,
};
use crate::errors::{BackendError, BackendResult};
use crate::types::{AttributeValue, ElementType};
use ndarray::{Array1, Array3, ArrayD, IxDyn};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::{debug, info};

/// Backend id and Cargo feature name
pub const ID: &str = "geotiff";

const BAND_DATA: &str = "band_data";

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GDAL_NODATA: u16 = 42113;

/// Leading bytes of a JP2 container and of a raw J2K codestream
const JP2_SIGNATURE: [u8; 12] = [0, 0, 0, 0x0c, b'j', b'P', b' ', b' ', 0x0d, 0x0a, 0x87, 0x0a];
const J2K_SIGNATURE: [u8; 4] = [0xff, 0x4f, 0xff, 0x51];

#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffBackend;

impl Backend for GeoTiffBackend {
    fn id(&self) -> &str {
        ID
    }

    fn open_flat(&self, path: &Path, group: &str, options: &OpenOptions) -> BackendResult<GroupTable> {
        if normalize_group_path(group) != "/" {
            return Err(BackendError::NotFound(format!("group '{}' in GeoTIFF file", group)));
        }
        if options.get("mask_and_scale").map(String::as_str) != Some("false") {
            debug!("GeoTIFF samples are never masked or scaled");
        }
        reject_jpeg2000(path)?;

        let mut decoder = open_decoder(path)?;
        let layout = RasterLayout::read(&mut decoder)?;
        let RasterLayout {
            width,
            height,
            bands,
            ..
        } = layout;

        let mut builder = GroupTable::builder();
        builder.variable(ArrayEntry::new("band", ElementType::Int64, vec![("band".to_string(), bands)]))?;
        builder.variable(ArrayEntry::new("y", ElementType::Float64, vec![("y".to_string(), height)]))?;
        builder.variable(ArrayEntry::new("x", ElementType::Float64, vec![("x".to_string(), width)]))?;
        let mut data = ArrayEntry::new(
            BAND_DATA,
            layout.element.clone(),
            vec![
                ("band".to_string(), bands),
                ("y".to_string(), height),
                ("x".to_string(), width),
            ],
        );
        if let Some(nodata) = &layout.nodata {
            data.attributes.insert("nodata".to_string(), nodata.clone());
        }
        builder.variable(data)?;
        builder.attribute("georeferenced", AttributeValue::Bool(layout.transform.is_some()));
        info!(
            path = %path.display(),
            width,
            height,
            bands,
            georeferenced = layout.transform.is_some(),
            "opened GeoTIFF raster"
        );

        Ok(builder.build(Box::new(GeoTiffReader {
            path: Some(path.to_path_buf()),
            layout,
        })))
    }
}

fn open_decoder(path: &Path) -> BackendResult<Decoder<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(Decoder::new(BufReader::new(file))?)
}

fn reject_jpeg2000(path: &Path) -> BackendResult<()> {
    let mut head = [0u8; 12];
    let read = File::open(path)?.read(&mut head)?;
    if head[..read].starts_with(&JP2_SIGNATURE) || head[..read].starts_with(&J2K_SIGNATURE) {
        return Err(BackendError::decode(format!(
            "{} is a JPEG-2000 codestream, which this build cannot decode",
            path.display()
        )));
    }
    Ok(())
}

/// Affine placement of pixel `(0, 0)` in model space
#[derive(Debug, Clone, Copy, PartialEq)]
struct GeoTransform {
    origin_x: f64,
    origin_y: f64,
    scale_x: f64,
    scale_y: f64,
}

impl GeoTransform {
    /// Combine the first tiepoint `(i, j, k, x, y, z)` with the pixel scale.
    fn from_tags(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            return None;
        }
        Some(Self {
            origin_x: tiepoint[3] - tiepoint[0] * scale[0],
            origin_y: tiepoint[4] + tiepoint[1] * scale[1],
            scale_x: scale[0],
            scale_y: scale[1],
        })
    }

    fn x_centres(&self, width: usize) -> Array1<f64> {
        Array1::from_shape_fn(width, |i| self.origin_x + (i as f64 + 0.5) * self.scale_x)
    }

    /// Rows run from north to south.
    fn y_centres(&self, height: usize) -> Array1<f64> {
        Array1::from_shape_fn(height, |j| self.origin_y - (j as f64 + 0.5) * self.scale_y)
    }
}

#[derive(Debug, Clone)]
struct RasterLayout {
    width: usize,
    height: usize,
    bands: usize,
    element: ElementType,
    transform: Option<GeoTransform>,
    nodata: Option<AttributeValue>,
}

impl RasterLayout {
    fn read(decoder: &mut Decoder<BufReader<File>>) -> BackendResult<Self> {
        let (width, height) = decoder.dimensions()?;
        let bands = first_u32(decoder, Tag::SamplesPerPixel)?.unwrap_or(1) as usize;
        let bits = first_u32(decoder, Tag::BitsPerSample)?.unwrap_or(1);
        // 1 unsigned, 2 signed, 3 floating point
        let format = first_u32(decoder, Tag::SampleFormat)?.unwrap_or(1);
        let element = match (format, bits) {
            (1, 1..=8) => ElementType::UInt8,
            (1, 16) => ElementType::UInt16,
            (1, 32) => ElementType::UInt32,
            (1, 64) => ElementType::UInt64,
            (2, 8) => ElementType::Int8,
            (2, 16) => ElementType::Int16,
            (2, 32) => ElementType::Int32,
            (2, 64) => ElementType::Int64,
            (3, 32) => ElementType::Float32,
            (3, 64) => ElementType::Float64,
            (format, bits) => {
                return Err(BackendError::decode(format!(
                    "unsupported TIFF sample format {} with {} bits per sample",
                    format, bits
                )))
            }
        };

        let scale = f64_tag(decoder, MODEL_PIXEL_SCALE)?;
        let tiepoint = f64_tag(decoder, MODEL_TIEPOINT)?;
        let transform = match (scale, tiepoint) {
            (Some(scale), Some(tiepoint)) => GeoTransform::from_tags(&scale, &tiepoint),
            _ => None,
        };
        let nodata = match decoder.find_tag(Tag::from_u16_exhaustive(GDAL_NODATA))? {
            Some(value) => {
                let text = value.into_string()?;
                let text = text.trim_end_matches('\0').trim();
                Some(match text.parse::<f64>() {
                    Ok(number) => AttributeValue::Float(number),
                    Err(_) => AttributeValue::Str(text.to_string()),
                })
            }
            None => None,
        };

        Ok(Self {
            width: width as usize,
            height: height as usize,
            bands,
            element,
            transform,
            nodata,
        })
    }
}

fn first_u32(decoder: &mut Decoder<BufReader<File>>, tag: Tag) -> BackendResult<Option<u32>> {
    match decoder.find_tag(tag)? {
        Some(value) => Ok(value.into_u32_vec()?.first().copied()),
        None => Ok(None),
    }
}

fn f64_tag(decoder: &mut Decoder<BufReader<File>>, code: u16) -> BackendResult<Option<Vec<f64>>> {
    match decoder.find_tag(Tag::from_u16_exhaustive(code))? {
        Some(value) => Ok(Some(value.into_f64_vec()?)),
        None => Ok(None),
    }
}

/// Decoded samples as `f64`, pixel-interleaved.
fn samples(image: DecodingResult) -> Vec<f64> {
    macro_rules! widen {
        ($values:expr) => {
            $values.into_iter().map(|v| v as f64).collect()
        };
    }
    match image {
        DecodingResult::U8(v) => widen!(v),
        DecodingResult::U16(v) => widen!(v),
        DecodingResult::U32(v) => widen!(v),
        DecodingResult::U64(v) => widen!(v),
        DecodingResult::I8(v) => widen!(v),
        DecodingResult::I16(v) => widen!(v),
        DecodingResult::I32(v) => widen!(v),
        DecodingResult::I64(v) => widen!(v),
        DecodingResult::F32(v) => widen!(v),
        DecodingResult::F64(v) => v,
    }
}

struct GeoTiffReader {
    path: Option<PathBuf>,
    layout: RasterLayout,
}

impl GeoTiffReader {
    fn band_data(&self, path: &Path) -> BackendResult<ArrayD<f64>> {
        let RasterLayout {
            width,
            height,
            bands,
            ..
        } = self.layout;
        let mut decoder = open_decoder(path)?;
        let values = samples(decoder.read_image()?);
        if values.len() != width * height * bands {
            return Err(BackendError::decode(format!(
                "TIFF image holds {} samples, expected {} x {} x {}",
                values.len(),
                bands,
                height,
                width
            )));
        }
        let interleaved = Array3::from_shape_vec((height, width, bands), values)?;
        let planar = interleaved.permuted_axes([2, 0, 1]);
        debug!(bands, height, width, "decoded GeoTIFF samples");
        Ok(planar.as_standard_layout().to_owned().into_dyn())
    }
}

impl ArrayReader for GeoTiffReader {
    fn read(&self, entry: &ArrayEntry) -> BackendResult<ArrayD<f64>> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| BackendError::decode("GeoTIFF file already closed"))?;
        let transform = self.layout.transform;
        match entry.name.as_str() {
            "band" => Ok(ArrayD::from_shape_fn(IxDyn(&entry.shape), |idx| (idx[0] + 1) as f64)),
            "x" => Ok(match transform {
                Some(t) => t.x_centres(self.layout.width).into_dyn(),
                None => ArrayD::from_shape_fn(IxDyn(&entry.shape), |idx| idx[0] as f64 + 0.5),
            }),
            "y" => Ok(match transform {
                Some(t) => t.y_centres(self.layout.height).into_dyn(),
                None => ArrayD::from_shape_fn(IxDyn(&entry.shape), |idx| idx[0] as f64 + 0.5),
            }),
            BAND_DATA => self.band_data(path),
            other => Err(BackendError::NotFound(format!("variable '{}'", other))),
        }
    }

    fn close(&mut self) {
        self.path.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_from_tags() {
        // 0.25 degree pixels, pixel (0, 0) corner at 10E 50N
        let t = GeoTransform::from_tags(&[0.25, 0.25, 0.0], &[0.0, 0.0, 0.0, 10.0, 50.0, 0.0]).unwrap();
        assert_eq!(t.x_centres(2).to_vec(), vec![10.125, 10.375]);
        assert_eq!(t.y_centres(2).to_vec(), vec![49.875, 49.625]);

        // tiepoint on another pixel lands on the same grid
        let shifted = GeoTransform::from_tags(&[0.25, 0.25], &[4.0, 2.0, 0.0, 11.0, 49.5, 0.0]).unwrap();
        assert_eq!(shifted, t);

        assert!(GeoTransform::from_tags(&[0.25], &[0.0; 6]).is_none());
    }

    #[test]
    fn test_samples_widen_every_format() {
        assert_eq!(samples(DecodingResult::I16(vec![-3, 7])), vec![-3.0, 7.0]);
        assert_eq!(samples(DecodingResult::F32(vec![0.5])), vec![0.5]);
        assert_eq!(samples(DecodingResult::U8(vec![255])), vec![255.0]);
    }
}
