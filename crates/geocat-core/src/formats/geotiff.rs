//! GeoTIFF metadata reader
//!
//! Only the first image file directory is decoded: its size, band count and
//! the GeoTIFF tags that georeference it. Pixel data is never read; a raster
//! is registered in place and served by the file store.

use async_trait::async_trait;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{ImportError, Result};
use crate::formats::validation::FormatValidator;
use crate::formats::{
    prj_crs, read_prefix, BoundsHint, Confidence, Format, FormatReader, FormatValidation,
    SourceContent, SourceMetadata,
};
use crate::models::{BoundingBox, CoverageParams, Crs, DataKind, SourceUnit};

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;
const USER_DEFINED: u16 = 32767;

/// GeoTIFF format reader
pub struct GeoTiffReader;

pub(crate) fn confidence(unit: &SourceUnit) -> Confidence {
    let magic = unit.primary_path().and_then(|p| read_prefix(p, 4)).unwrap_or_default();
    if magic == b"II*\0" || magic == b"MM\0*" {
        Confidence::Content
    } else if Format::GeoTiff.has_extension(unit) {
        Confidence::Extension
    } else {
        Confidence::None
    }
}

/// Georeferencing information decoded from the first IFD
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TiffInfo {
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u32,
    pub pixel_scale: Option<[f64; 2]>,
    /// Raster point (i, j) and model point (x, y) of the first tiepoint
    pub tiepoint: Option<[f64; 4]>,
    pub epsg: Option<u32>,
}

impl TiffInfo {
    pub fn read(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut header = [0u8; 8];
        file.read_exact(&mut header).map_err(|_| tiff_error("File too short for a TIFF header"))?;

        let little_endian = match &header[..2] {
            b"II" => true,
            b"MM" => false,
            _ => return Err(tiff_error("Missing TIFF byte order mark")),
        };
        let mut tiff = TiffFile { file, len, little_endian };

        match tiff.u16_at(&header[2..4]) {
            42 => {}
            43 => return Err(tiff_error("BigTIFF files are not supported")),
            other => return Err(tiff_error(&format!("Unexpected TIFF version {}", other))),
        }
        let ifd_offset = tiff.u32_at(&header[4..8]) as u64;
        let entries = tiff.entries(ifd_offset)?;

        let mut info = TiffInfo { samples_per_pixel: 1, ..Default::default() };
        let mut geo_keys: Vec<u16> = Vec::new();
        for entry in &entries {
            match entry.tag {
                TAG_IMAGE_WIDTH => info.width = tiff.first_uint(entry)?,
                TAG_IMAGE_LENGTH => info.height = tiff.first_uint(entry)?,
                TAG_SAMPLES_PER_PIXEL => info.samples_per_pixel = tiff.first_uint(entry)?,
                TAG_MODEL_PIXEL_SCALE => {
                    let v = tiff.doubles(entry)?;
                    if v.len() >= 2 {
                        info.pixel_scale = Some([v[0], v[1]]);
                    }
                }
                TAG_MODEL_TIEPOINT => {
                    let v = tiff.doubles(entry)?;
                    if v.len() >= 6 {
                        info.tiepoint = Some([v[0], v[1], v[3], v[4]]);
                    }
                }
                TAG_GEO_KEY_DIRECTORY => geo_keys = tiff.shorts(entry)?,
                _ => {}
            }
        }
        info.epsg = epsg_from_geo_keys(&geo_keys);

        if info.width == 0 || info.height == 0 {
            return Err(tiff_error("Image has no size"));
        }
        Ok(info)
    }

    /// Extent from the tiepoint and pixel scale tags
    pub fn bbox(&self) -> Option<BoundingBox> {
        let [sx, sy] = self.pixel_scale?;
        let [i, j, x, y] = self.tiepoint?;
        let min_x = x - i * sx;
        let max_y = y + j * sy;
        Some(BoundingBox::new(
            min_x,
            max_y - self.height as f64 * sy,
            min_x + self.width as f64 * sx,
            max_y,
            None,
        ))
    }
}

/// EPSG code of the projected or geographic CRS declared in the GeoKey directory
fn epsg_from_geo_keys(keys: &[u16]) -> Option<u32> {
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;
    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(count) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match key {
            KEY_PROJECTED_CS_TYPE => return Some(value as u32),
            KEY_GEOGRAPHIC_TYPE => geographic = Some(value as u32),
            _ => {}
        }
    }
    geographic
}

/// Extent from an ESRI world file (`.tfw`/`.tifw`); rotation terms are ignored
fn world_file_bbox(unit: &SourceUnit, width: u32, height: u32) -> Option<BoundingBox> {
    let path = unit.sidecar("tfw").or_else(|| unit.sidecar("tifw"))?;
    let content = std::fs::read_to_string(path).ok()?;
    let values: Vec<f64> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    let [a, _d, _b, e, c, f] = <[f64; 6]>::try_from(values.get(..6)?).ok()?;

    // C/F locate the center of the upper-left pixel
    let min_x = c - a / 2.0;
    let max_y = f - e / 2.0;
    let max_x = min_x + width as f64 * a;
    let min_y = max_y + height as f64 * e;
    Some(BoundingBox::new(min_x.min(max_x), min_y.min(max_y), min_x.max(max_x), min_y.max(max_y), None))
}

fn tiff_error(message: &str) -> ImportError {
    ImportError::FormatError { format: Format::GeoTiff.name().to_string(), message: message.to_string() }
}

struct IfdEntry {
    tag: u16,
    field_type: u16,
    count: u32,
    value: [u8; 4],
}

struct TiffFile {
    file: File,
    len: u64,
    little_endian: bool,
}

impl TiffFile {
    fn u16_at(&self, b: &[u8]) -> u16 {
        let bytes = [b[0], b[1]];
        if self.little_endian { u16::from_le_bytes(bytes) } else { u16::from_be_bytes(bytes) }
    }

    fn u32_at(&self, b: &[u8]) -> u32 {
        let bytes = [b[0], b[1], b[2], b[3]];
        if self.little_endian { u32::from_le_bytes(bytes) } else { u32::from_be_bytes(bytes) }
    }

    fn f64_at(&self, b: &[u8]) -> f64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&b[..8]);
        if self.little_endian { f64::from_le_bytes(bytes) } else { f64::from_be_bytes(bytes) }
    }

    /// `len` bytes at `offset`; ranges past the end of the file are refused before allocating
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let end = offset.checked_add(len as u64).ok_or_else(|| tiff_error("Truncated TIFF directory"))?;
        if end > self.len {
            return Err(tiff_error("Truncated TIFF directory"));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf).map_err(|_| tiff_error("Truncated TIFF directory"))?;
        Ok(buf)
    }

    fn entries(&mut self, offset: u64) -> Result<Vec<IfdEntry>> {
        let count_bytes = self.read_at(offset, 2)?;
        let count = self.u16_at(&count_bytes) as usize;
        let raw = self.read_at(offset + 2, count * 12)?;

        Ok(raw
            .chunks_exact(12)
            .map(|e| IfdEntry {
                tag: self.u16_at(&e[0..2]),
                field_type: self.u16_at(&e[2..4]),
                count: self.u32_at(&e[4..8]),
                value: [e[8], e[9], e[10], e[11]],
            })
            .collect())
    }

    /// Raw bytes of an entry's values, inline or at the offset it points to
    fn payload(&mut self, entry: &IfdEntry, size: usize) -> Result<Vec<u8>> {
        let len = size
            .checked_mul(entry.count as usize)
            .ok_or_else(|| tiff_error("Truncated TIFF directory"))?;
        if len <= 4 {
            Ok(entry.value[..len].to_vec())
        } else {
            let offset = self.u32_at(&entry.value) as u64;
            self.read_at(offset, len)
        }
    }

    fn shorts(&mut self, entry: &IfdEntry) -> Result<Vec<u16>> {
        let bytes = self.payload(entry, 2)?;
        Ok(bytes.chunks_exact(2).map(|b| self.u16_at(b)).collect())
    }

    fn first_uint(&mut self, entry: &IfdEntry) -> Result<u32> {
        match entry.field_type {
            3 => Ok(self.u16_at(&entry.value) as u32),
            4 => Ok(self.u32_at(&entry.value)),
            other => Err(tiff_error(&format!("Tag {} has unexpected type {}", entry.tag, other))),
        }
    }

    fn doubles(&mut self, entry: &IfdEntry) -> Result<Vec<f64>> {
        if entry.field_type != 12 {
            return Err(tiff_error(&format!("Tag {} is not stored as doubles", entry.tag)));
        }
        let bytes = self.payload(entry, 8)?;
        Ok(bytes.chunks_exact(8).map(|b| self.f64_at(b)).collect())
    }
}

#[async_trait]
impl FormatReader for GeoTiffReader {
    fn format(&self) -> Format {
        Format::GeoTiff
    }

    async fn inspect(&self, unit: &SourceUnit) -> Result<SourceMetadata> {
        let path = unit.primary_path().ok_or_else(|| tiff_error("GeoTIFF can only be read from files"))?;
        let info = TiffInfo::read(path)?;

        let crs = info.epsg.map(Crs::from_epsg).or_else(|| prj_crs(unit));
        let bounds = match info.bbox().or_else(|| world_file_bbox(unit, info.width, info.height)) {
            Some(bbox) if bbox.is_valid() => BoundsHint::Known(bbox.with_crs(crs.clone())),
            _ => BoundsHint::Unavailable,
        };

        Ok(SourceMetadata {
            kind: DataKind::Raster,
            crs,
            bounds,
            attributes: Vec::new(),
            geometry_type: None,
            feature_count: None,
            coverage: Some(CoverageParams::new(info.width, info.height, info.samples_per_pixel)),
        })
    }

    async fn read(&self, unit: &SourceUnit) -> Result<SourceContent> {
        let path = unit.primary_path().ok_or_else(|| tiff_error("GeoTIFF can only be read from files"))?;
        let info = TiffInfo::read(path)?;
        Ok(SourceContent::Coverage(CoverageParams::new(info.width, info.height, info.samples_per_pixel)))
    }

    async fn validate(&self, unit: &SourceUnit) -> Result<FormatValidation> {
        let Some(path) = unit.primary_path() else {
            return Ok(FormatValidation { errors: vec!["Not a file".to_string()], warnings: vec![] });
        };
        let mut validation = FormatValidator::validate_file_exists(path);
        if validation.is_valid() {
            if let Err(e) = TiffInfo::read(path) {
                validation.errors.push(e.to_string());
            }
        }
        Ok(validation)
    }
}
