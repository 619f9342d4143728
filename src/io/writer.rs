// src/io/writer.rs
//! Uncompressed GeoTIFF writing with WGS84 geokeys.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use tiff::encoder::colortype::{Gray32Float, GrayI16, RGBA8};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

use crate::error::{Error, Result};
use crate::processing::visualize::RgbaImage;
use crate::raster::{BandBuffer, GridSpec, NODATA};
use crate::utils::fixed_point::{to_fixed_point, FIXED_POINT_NODATA};

/// Sample encoding of an analytical raster on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterEncoding {
    Float32,
    /// int16 holding `round(value * scale_factor)`
    FixedPoint { scale_factor: i32 },
}

/// Write one band as a GeoTIFF.
#[cfg(not(feature = "gdal"))]
pub fn write_raster(path: &Path, grid: &GridSpec, band: &BandBuffer, encoding: RasterEncoding) -> Result<()> {
    write_raster_native(path, grid, band, encoding)
}

/// Write one band as a GeoTIFF through GDAL.
#[cfg(feature = "gdal")]
pub fn write_raster(path: &Path, grid: &GridSpec, band: &BandBuffer, encoding: RasterEncoding) -> Result<()> {
    gdal_backend::write_raster(path, grid, band, encoding)
        .map_err(|e| Error::sink_unavailable(format!("writing {}", path.display()), e))
}

pub fn write_raster_native(
    path: &Path,
    grid: &GridSpec,
    band: &BandBuffer,
    encoding: RasterEncoding,
) -> Result<()> {
    check_shape(path, grid, band.shape())?;
    let context = || format!("writing {}", path.display());
    let file = File::create(path).map_err(|e| Error::sink_unavailable(context(), e))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))
        .map_err(|e| Error::sink_unavailable(context(), e))?;

    let (width, height) = (grid.width as u32, grid.height as u32);
    let written = match encoding {
        RasterEncoding::Float32 => encoder
            .new_image::<Gray32Float>(width, height)
            .and_then(|mut image| {
                write_geo_tags(image.encoder(), grid, Some(NODATA.to_string().as_str()))?;
                image.write_data(band.data())
            }),
        RasterEncoding::FixedPoint { scale_factor } => {
            let fixed = to_fixed_point(band.data(), scale_factor, FIXED_POINT_NODATA);
            encoder
                .new_image::<GrayI16>(width, height)
                .and_then(|mut image| {
                    write_geo_tags(image.encoder(), grid, Some(FIXED_POINT_NODATA.to_string().as_str()))?;
                    image.write_data(&fixed)
                })
        }
    };
    written.map_err(|e| Error::sink_unavailable(context(), e))
}

/// Write an 8-bit RGBA rendering; transparency marks no data.
pub fn write_rgba(path: &Path, image: &RgbaImage) -> Result<()> {
    let context = || format!("writing {}", path.display());
    let grid = &image.grid;
    if image.pixels.len() != grid.width * grid.height * 4 {
        return Err(Error::sink_unavailable(
            context(),
            format!("{} bytes cannot hold a {}x{} RGBA image", image.pixels.len(), grid.width, grid.height),
        ));
    }

    let file = File::create(path).map_err(|e| Error::sink_unavailable(context(), e))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))
        .map_err(|e| Error::sink_unavailable(context(), e))?;
    encoder
        .new_image::<RGBA8>(grid.width as u32, grid.height as u32)
        .and_then(|mut tiff| {
            write_geo_tags(tiff.encoder(), grid, None)?;
            tiff.write_data(&image.pixels)
        })
        .map_err(|e| Error::sink_unavailable(context(), e))
}

fn check_shape(path: &Path, grid: &GridSpec, shape: (usize, usize)) -> Result<()> {
    if shape != (grid.width, grid.height) {
        return Err(Error::sink_unavailable(
            format!("writing {}", path.display()),
            format!("band of {}x{} does not fit grid {}", shape.0, shape.1, grid),
        ));
    }
    Ok(())
}

/// Pixel scale, tiepoint, geographic WGS84 geokeys and the optional GDAL nodata tag.
fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    directory: &mut DirectoryEncoder<'_, W, K>,
    grid: &GridSpec,
    nodata: Option<&str>,
) -> tiff::TiffResult<()> {
    let gt = grid.geo_transform;
    directory.write_tag(Tag::ModelPixelScaleTag, &[gt[1], gt[5].abs(), 0.0][..])?;
    directory.write_tag(Tag::ModelTiepointTag, &[0.0, 0.0, 0.0, gt[0], gt[3], 0.0][..])?;

    let geokeys: [u16; 16] = [
        1, 1, 0, 3, // Version 1.1.0, 3 keys
        1024, 0, 1, 2, // GTModelTypeGeoKey = ModelTypeGeographic
        1025, 0, 1, 1, // GTRasterTypeGeoKey = RasterPixelIsArea
        2048, 0, 1, 4326, // GeographicTypeGeoKey = WGS 84
    ];
    directory.write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;

    if let Some(nodata) = nodata {
        directory.write_tag(Tag::GdalNodata, nodata)?;
    }
    Ok(())
}

#[cfg(feature = "gdal")]
mod gdal_backend {
    use std::path::Path;

    use gdal::raster::{Buffer, RasterCreationOptions};
    use gdal::spatial_ref::SpatialRef;
    use gdal::{DriverManager, Metadata};

    use super::RasterEncoding;
    use crate::raster::{BandBuffer, GridSpec, NODATA};
    use crate::utils::fixed_point::{to_fixed_point, FIXED_POINT_NODATA};

    pub fn write_raster(
        path: &Path,
        grid: &GridSpec,
        band: &BandBuffer,
        encoding: RasterEncoding,
    ) -> gdal::errors::Result<()> {
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let creation_options = RasterCreationOptions::from_iter(["COMPRESS=NONE"]);
        let projection = SpatialRef::from_epsg(4326)?.to_wkt()?;
        let size = (grid.width, grid.height);

        match encoding {
            RasterEncoding::Float32 => {
                let mut out_ds = driver.create_with_band_type_with_options::<f32, _>(
                    path,
                    grid.width,
                    grid.height,
                    1,
                    &creation_options,
                )?;
                out_ds.set_projection(&projection)?;
                out_ds.set_geo_transform(&grid.geo_transform)?;

                let mut out_band = out_ds.rasterband(1)?;
                out_band.set_no_data_value(Some(NODATA as f64))?;
                let mut buffer = Buffer::new(size, band.data().to_vec());
                out_band.write((0, 0), size, &mut buffer)?;
                out_ds.flush_cache()?;
            }
            RasterEncoding::FixedPoint { scale_factor } => {
                let mut out_ds = driver.create_with_band_type_with_options::<i16, _>(
                    path,
                    grid.width,
                    grid.height,
                    1,
                    &creation_options,
                )?;
                out_ds.set_projection(&projection)?;
                out_ds.set_geo_transform(&grid.geo_transform)?;

                let mut out_band = out_ds.rasterband(1)?;
                out_band.set_no_data_value(Some(FIXED_POINT_NODATA as f64))?;
                out_band.set_metadata_item("SCALE", &format!("{}", 1.0 / scale_factor as f64), "")?;
                out_band.set_metadata_item("OFFSET", "0", "")?;

                let fixed = to_fixed_point(band.data(), scale_factor, FIXED_POINT_NODATA);
                let mut buffer = Buffer::new(size, fixed);
                out_band.write((0, 0), size, &mut buffer)?;
                out_ds.flush_cache()?;
            }
        }
        Ok(())
    }
}
