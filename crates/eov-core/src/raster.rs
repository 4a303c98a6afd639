use serde::{Deserialize, Serialize};

use crate::coords::Crs;
use crate::error::{Result, SamplingError};

/// Affine pixel-to-map transform, GDAL ordering:
/// `x = origin_x + col * pixel_width + row * row_rotation`,
/// `y = origin_y + col * col_rotation + row * pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    /// Negative for north-up rasters.
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation terms.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height,
        }
    }

    /// Unit pixels with the origin at the top-left corner; map y equals row.
    pub fn identity() -> Self {
        Self::north_up(0.0, 0.0, 1.0, 1.0)
    }

    /// Map coordinates of an arbitrary (fractional) pixel position.
    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Map coordinates of the centre of pixel (row, col).
    #[inline]
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }
}

/// A banded grid of integer class labels, band-sequential and row-major.
/// Row 0 is the first stored row (north edge for north-up rasters).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawRaster")]
pub struct CategoricalRaster {
    data: Vec<i32>,
    width: usize,
    height: usize,
    bands: usize,
    pub nodata: Option<i32>,
    pub crs: Crs,
    pub transform: GeoTransform,
}

/// Wire form of a raster; deserialization goes through `CategoricalRaster::new`
/// so the buffer length is always checked.
#[derive(Deserialize)]
struct RawRaster {
    data: Vec<i32>,
    width: usize,
    height: usize,
    bands: usize,
    #[serde(default)]
    nodata: Option<i32>,
    crs: Crs,
    transform: GeoTransform,
}

impl TryFrom<RawRaster> for CategoricalRaster {
    type Error = SamplingError;

    fn try_from(raw: RawRaster) -> Result<Self> {
        let mut raster = Self::new(raw.data, raw.width, raw.height, raw.bands, raw.crs, raw.transform)?;
        raster.nodata = raw.nodata;
        Ok(raster)
    }
}

/// One valid pixel of a flattened band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledPixel {
    /// Row-major index within the band; keeps scan order recoverable.
    pub index: usize,
    pub x: f64,
    pub y: f64,
    pub label: i32,
}

/// Valid pixels of one band with the CRS their coordinates are expressed in.
#[derive(Debug, Clone)]
pub struct FlatRaster {
    pub pixels: Vec<LabeledPixel>,
    pub crs: Crs,
}

impl CategoricalRaster {
    /// Wrap a band-sequential label buffer. Fails when the buffer length does
    /// not match `width * height * bands`.
    pub fn new(
        data: Vec<i32>,
        width: usize,
        height: usize,
        bands: usize,
        crs: Crs,
        transform: GeoTransform,
    ) -> Result<Self> {
        if width == 0 || height == 0 || bands == 0 {
            return Err(SamplingError::InvalidRaster(format!(
                "degenerate dimensions {width}x{height}x{bands}"
            )));
        }
        if data.len() != width * height * bands {
            return Err(SamplingError::InvalidRaster(format!(
                "buffer holds {} values, expected {width}x{height}x{bands} = {}",
                data.len(),
                width * height * bands
            )));
        }
        Ok(Self { data, width, height, bands, nodata: None, crs, transform })
    }

    /// Single-band raster with unit pixels and no CRS; handy for tests and
    /// rasters whose georeferencing is applied later.
    pub fn from_labels(data: Vec<i32>, width: usize, height: usize) -> Result<Self> {
        Self::new(data, width, height, 1, Crs::Unspecified, GeoTransform::identity())
    }

    pub fn with_nodata(mut self, nodata: i32) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    #[inline]
    pub fn get(&self, band: usize, row: usize, col: usize) -> i32 {
        self.data[band * self.width * self.height + row * self.width + col]
    }

    pub fn band(&self, band: usize) -> Result<&[i32]> {
        if band >= self.bands {
            return Err(SamplingError::InvalidRaster(format!(
                "band {band} requested but raster has {} band(s)",
                self.bands
            )));
        }
        let len = self.width * self.height;
        Ok(&self.data[band * len..(band + 1) * len])
    }

    /// A label is valid when it is not nodata, is non-negative and, when a
    /// ceiling is given, lies below it.
    #[inline]
    pub fn is_valid(&self, label: i32, label_ceiling: Option<i32>) -> bool {
        Some(label) != self.nodata && label >= 0 && label_ceiling.map_or(true, |c| label < c)
    }

    /// Flatten one band into its valid pixels in scan order, with pixel-centre
    /// coordinates converted to EPSG:4326 when the raster CRS allows it.
    /// Rasters in other CRSs keep their native coordinates.
    pub fn flatten(&self, band: usize, label_ceiling: Option<i32>) -> Result<FlatRaster> {
        let values = self.band(band)?;
        let valid: Vec<(usize, i32)> = values
            .iter()
            .enumerate()
            .filter(|&(_, &v)| self.is_valid(v, label_ceiling))
            .map(|(i, &v)| (i, v))
            .collect();

        let reproject = self.crs.converts_to_wgs84();
        let out_crs = if reproject { Crs::wgs84() } else { self.crs };
        if !reproject {
            log::debug!("raster CRS {} has no EPSG:4326 conversion; keeping native coordinates", self.crs);
        }

        let locate = |&(index, label): &(usize, i32)| {
            let (x, y) = self.transform.pixel_center(index / self.width, index % self.width);
            let (x, y) = if reproject {
                // converts_to_wgs84() guarantees Some here.
                self.crs.to_wgs84(x, y).map(|ll| (ll.lon, ll.lat)).unwrap_or((x, y))
            } else {
                (x, y)
            };
            LabeledPixel { index, x, y, label }
        };

        #[cfg(feature = "threading")]
        let pixels = {
            use rayon::prelude::*;
            valid.par_iter().map(locate).collect()
        };
        #[cfg(not(feature = "threading"))]
        let pixels = valid.iter().map(locate).collect();

        Ok(FlatRaster { pixels, crs: out_crs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn new_rejects_mismatched_buffer() {
        let err = CategoricalRaster::from_labels(vec![0; 5], 2, 3).unwrap_err();
        assert!(matches!(err, SamplingError::InvalidRaster(_)));
    }

    #[test]
    fn pixel_center_north_up() {
        let t = GeoTransform::north_up(10.0, 50.0, 0.5, -0.25);
        let (x, y) = t.pixel_center(0, 0);
        assert_abs_diff_eq!(x, 10.25, epsilon = 1e-12);
        assert_abs_diff_eq!(y, 49.875, epsilon = 1e-12);
        let (x, y) = t.pixel_center(3, 2);
        assert_abs_diff_eq!(x, 11.25, epsilon = 1e-12);
        assert_abs_diff_eq!(y, 49.125, epsilon = 1e-12);
    }

    #[test]
    fn flatten_drops_nodata_and_out_of_range() {
        let r = CategoricalRaster::from_labels(vec![0, 1, -1, 255, 7, 2], 3, 2)
            .unwrap()
            .with_nodata(7);
        let flat = r.flatten(0, Some(255)).unwrap();
        let labels: Vec<i32> = flat.pixels.iter().map(|p| p.label).collect();
        assert_eq!(labels, vec![0, 1, 2]);
        let idx: Vec<usize> = flat.pixels.iter().map(|p| p.index).collect();
        assert_eq!(idx, vec![0, 1, 5]);
    }

    #[test]
    fn flatten_geographic_keeps_lon_lat() {
        let r = CategoricalRaster::new(
            vec![1, 1, 1, 1],
            2,
            2,
            1,
            Crs::wgs84(),
            GeoTransform::north_up(-14.0, 14.0, 0.1, -0.1),
        )
        .unwrap();
        let flat = r.flatten(0, Some(255)).unwrap();
        assert_eq!(flat.crs, Crs::wgs84());
        assert_abs_diff_eq!(flat.pixels[3].x, -13.85, epsilon = 1e-9);
        assert_abs_diff_eq!(flat.pixels[3].y, 13.85, epsilon = 1e-9);
    }

    #[test]
    fn flatten_web_mercator_reprojects() {
        let r = CategoricalRaster::new(
            vec![0],
            1,
            1,
            1,
            Crs::Epsg(crate::coords::EPSG_WEB_MERCATOR),
            GeoTransform::north_up(-1.0, 1.0, 2.0, -2.0),
        )
        .unwrap();
        let flat = r.flatten(0, Some(255)).unwrap();
        assert_eq!(flat.crs, Crs::wgs84());
        assert_abs_diff_eq!(flat.pixels[0].x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(flat.pixels[0].y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn flatten_unknown_crs_keeps_native() {
        let r = CategoricalRaster::new(
            vec![3],
            1,
            1,
            1,
            Crs::Epsg(32628),
            GeoTransform::north_up(500_000.0, 1_600_000.0, 30.0, -30.0),
        )
        .unwrap();
        let flat = r.flatten(0, Some(255)).unwrap();
        assert_eq!(flat.crs, Crs::Epsg(32628));
        assert_abs_diff_eq!(flat.pixels[0].x, 500_015.0, epsilon = 1e-9);
    }

    #[test]
    fn flatten_without_ceiling_keeps_high_labels() {
        let r = CategoricalRaster::from_labels(vec![0, 255, 300, -1], 2, 2).unwrap();
        let labels: Vec<i32> = r.flatten(0, None).unwrap().pixels.iter().map(|p| p.label).collect();
        assert_eq!(labels, vec![0, 255, 300]);
    }

    #[test]
    fn deserialize_rejects_mismatched_buffer() {
        let json = r#"{
            "data": [0, 1], "width": 5, "height": 5, "bands": 1,
            "nodata": null, "crs": "Unspecified",
            "transform": {"origin_x": 0.0, "pixel_width": 1.0, "row_rotation": 0.0,
                          "origin_y": 0.0, "col_rotation": 0.0, "pixel_height": 1.0}
        }"#;
        let err = serde_json::from_str::<CategoricalRaster>(json).unwrap_err();
        assert!(err.to_string().contains("buffer holds 2 values"), "{err}");
    }

    #[test]
    fn serialized_raster_reads_back() {
        let r = CategoricalRaster::from_labels(vec![1, 2, 3, 4], 2, 2).unwrap().with_nodata(4);
        let back: CategoricalRaster = serde_json::from_str(&serde_json::to_string(&r).unwrap()).unwrap();
        assert_eq!(back.band(0).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(back.nodata, Some(4));
        assert_eq!(back.transform, GeoTransform::identity());
    }

    #[test]
    fn band_out_of_range_is_invalid() {
        let r = CategoricalRaster::from_labels(vec![0; 4], 2, 2).unwrap();
        assert!(matches!(r.flatten(1, Some(255)), Err(SamplingError::InvalidRaster(_))));
    }

    #[test]
    fn second_band_is_addressed() {
        let data = vec![0, 0, 0, 0, 5, 6, 7, 8];
        let r = CategoricalRaster::new(data, 2, 2, 2, Crs::Unspecified, GeoTransform::identity()).unwrap();
        assert_eq!(r.get(1, 1, 0), 7);
        assert_eq!(r.band(1).unwrap(), &[5, 6, 7, 8]);
    }
}
