// src/io/reader.rs
//! Single-band GeoTIFF reading.
//!
//! The native reader understands the ModelPixelScale / ModelTiepoint pair and
//! the GDAL nodata tag. Build with the `gdal` feature to read through GDAL.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use log::debug;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use crate::error::{Error, Result};
use crate::raster::{is_nodata, BandBuffer, GridSpec, NODATA};

/// Read band 1 of a GeoTIFF. Nodata and NaN samples come back as `NODATA`.
#[cfg(not(feature = "gdal"))]
pub fn read_band(path: &Path) -> Result<(GridSpec, BandBuffer)> {
    read_band_native(path)
}

/// Read band 1 of a raster through GDAL. Nodata and NaN samples come back as `NODATA`.
#[cfg(feature = "gdal")]
pub fn read_band(path: &Path) -> Result<(GridSpec, BandBuffer)> {
    gdal_backend::read_band(path)
        .map_err(|e| Error::source_unavailable(format!("reading {}", path.display()), e))
}

pub fn read_band_native(path: &Path) -> Result<(GridSpec, BandBuffer)> {
    let context = || format!("reading {}", path.display());
    let file = File::open(path).map_err(|e| Error::source_unavailable(context(), e))?;
    let result = decode_band(BufReader::new(file))
        .map_err(|e| Error::source_unavailable(context(), e))?;
    debug!("Read {} ({})", path.display(), result.0);
    Ok(result)
}

fn decode_band<R: Read + Seek>(reader: R) -> tiff::TiffResult<(GridSpec, BandBuffer)> {
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|text| text.trim_end_matches('\0').trim().parse::<f64>().ok());
    let geo_transform = read_geo_transform(&mut decoder)
        .unwrap_or([0.0, 1.0, 0.0, height as f64, 0.0, -1.0]);

    let samples: Vec<f64> = match decoder.read_image()? {
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => {
            return Err(tiff::TiffError::UnsupportedError(
                tiff::TiffUnsupportedError::UnknownInterpretation,
            ))
        }
    };

    // Interleaved files carry more samples than pixels; keep the first channel
    let channels = (samples.len() / (width * height).max(1)).max(1);
    let data = samples
        .into_iter()
        .step_by(channels)
        .take(width * height)
        .map(|value| match nodata {
            Some(sentinel) if value == sentinel => NODATA,
            _ => to_sample(value),
        })
        .collect::<Vec<_>>();

    if data.len() != width * height {
        return Err(tiff::TiffError::FormatError(
            tiff::TiffFormatError::InconsistentSizesEncountered,
        ));
    }

    Ok((
        GridSpec {
            width,
            height,
            geo_transform,
        },
        BandBuffer::new((width, height), data),
    ))
}

fn to_sample(value: f64) -> f32 {
    let value = value as f32;
    if is_nodata(value) {
        NODATA
    } else {
        value
    }
}

/// North-up transform from ModelPixelScale + ModelTiepoint.
fn read_geo_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<[f64; 6]> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some([origin_x, scale[0], 0.0, origin_y, 0.0, -scale[1]])
}

#[cfg(feature = "gdal")]
mod gdal_backend {
    use std::path::Path;

    use gdal::Dataset;

    use crate::raster::{BandBuffer, GridSpec, NODATA};

    pub fn read_band(path: &Path) -> gdal::errors::Result<(GridSpec, BandBuffer)> {
        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        let geo_transform = dataset.geo_transform()?;
        let band = dataset.rasterband(1)?;
        let nodata = band.no_data_value();

        let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
        let (_, samples) = buffer.into_shape_and_vec();
        let data = samples
            .into_iter()
            .map(|value| match nodata {
                Some(sentinel) if value as f64 == sentinel => NODATA,
                _ if !value.is_finite() => NODATA,
                _ => value,
            })
            .collect();

        Ok((
            GridSpec {
                width,
                height,
                geo_transform,
            },
            BandBuffer::new((width, height), data),
        ))
    }
}
