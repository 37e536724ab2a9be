//! GeoTIFF reading and writing for single-band rasters.
//!
//! Georeferencing is taken from `ModelPixelScaleTag` and `ModelTiepointTag`
//! (the common north-up case); no-data comes from the GDAL ASCII tag 42113.
//! Only the first band of multi-sample images is kept.

use std::io::Cursor;
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::{debug, instrument};

use crate::{GeoTransform, RasterError, RasterGrid, RasterResult};

/// GDAL's private no-data tag.
const GDAL_NODATA_TAG: u16 = 42113;

/// Decode a GeoTIFF held in memory.
#[instrument(skip(bytes), fields(size = bytes.len()))]
pub fn read_geotiff(bytes: &[u8]) -> RasterResult<RasterGrid> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| RasterError::MissingGeoreference("ModelPixelScaleTag"))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| RasterError::MissingGeoreference("ModelTiepointTag"))?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(RasterError::MissingGeoreference("ModelTiepointTag"));
    }

    // Tiepoint maps raster (i, j) to model (x, y); shift back to pixel (0, 0).
    let transform = GeoTransform::new(
        tiepoint[3] - tiepoint[0] * scale[0],
        tiepoint[4] + tiepoint[1] * scale[1],
        scale[0],
        -scale[1],
    );

    let nodata = decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA_TAG))
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse::<f32>().ok());

    let values = decoding_result_to_f32(decoder.read_image()?)?;
    let pixels = width * height;
    if pixels == 0 || values.len() < pixels || values.len() % pixels != 0 {
        return Err(RasterError::DimensionMismatch {
            width,
            height,
            actual: values.len(),
        });
    }

    let samples = values.len() / pixels;
    let data = if samples == 1 {
        values
    } else {
        values.into_iter().step_by(samples).collect()
    };

    debug!(width, height, samples, ?nodata, "Decoded GeoTIFF");

    Ok(RasterGrid::new(width, height, data, transform)?.with_nodata(nodata))
}

/// Read a GeoTIFF from disk.
pub fn read_geotiff_path(path: impl AsRef<Path>) -> RasterResult<RasterGrid> {
    let bytes = std::fs::read(path)?;
    read_geotiff(&bytes)
}

fn decoding_result_to_f32(result: DecodingResult) -> RasterResult<Vec<f32>> {
    let values = match result {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        #[allow(unreachable_patterns)]
        _ => {
            return Err(RasterError::UnsupportedSampleFormat(
                "unrecognised TIFF sample type".to_string(),
            ))
        }
    };
    Ok(values)
}

/// Encode a grid as a single-band float32 GeoTIFF.
pub fn write_geotiff(grid: &RasterGrid) -> RasterResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buf)?;
        let mut image =
            encoder.new_image::<colortype::Gray32Float>(grid.width as u32, grid.height as u32)?;

        let t = &grid.transform;
        let scale = [t.pixel_width, -t.pixel_height, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
        image
            .encoder()
            .write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
        image
            .encoder()
            .write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
        if let Some(nodata) = grid.nodata {
            let text = nodata.to_string();
            image
                .encoder()
                .write_tag(Tag::from_u16_exhaustive(GDAL_NODATA_TAG), text.as_str())?;
        }

        image.write_data(&grid.data)?;
    }
    Ok(buf.into_inner())
}
