mod polygonize;

pub use polygonize::{polygonize, RASTER_VALUE};

use anyhow::{bail, Result};
use ndarray::Array2;

use crate::crs::Crs;

/// Affine geotransform mapping (col, row) grid indices to world
/// coordinates. Parameter order follows the GDAL geotransform
/// convention; cell corners sit at integer indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub origin_x: f64,
    pub pixel_w: f64,
    pub rot_x: f64,
    pub origin_y: f64,
    pub rot_y: f64,
    pub pixel_h: f64,
}

impl AffineTransform {
    pub fn new(origin_x: f64, pixel_w: f64, rot_x: f64, origin_y: f64, rot_y: f64, pixel_h: f64) -> Self {
        Self { origin_x, pixel_w, rot_x, origin_y, rot_y, pixel_h }
    }

    /// North-up grid with square cells: no rotation, rows descending.
    pub fn north_up(origin_x: f64, origin_y: f64, cell_size: f64) -> Self {
        Self::new(origin_x, cell_size, 0.0, origin_y, 0.0, -cell_size)
    }

    /// World coordinates of grid position (col, row).
    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_w + row * self.rot_x,
            self.origin_y + col * self.rot_y + row * self.pixel_h,
        )
    }
}

/// A single-band raster: cell values, nodata sentinel, geotransform and
/// CRS. Immutable once loaded; consumed exactly once by the polygonizer.
#[derive(Debug, Clone)]
pub struct RasterGrid {
    data: Array2<f64>,
    nodata: f64,
    transform: AffineTransform,
    crs: Crs,
}

impl RasterGrid {
    pub fn new(data: Array2<f64>, nodata: f64, transform: AffineTransform, crs: Crs) -> Self {
        Self { data, nodata, transform, crs }
    }

    /// Build from a row-major value buffer.
    pub fn from_shape_vec(
        rows: usize,
        cols: usize,
        values: Vec<f64>,
        nodata: f64,
        transform: AffineTransform,
        crs: Crs,
    ) -> Result<Self> {
        if values.len() != rows * cols {
            bail!("expected {} values for a {rows}x{cols} grid, got {}", rows * cols, values.len());
        }
        let data = Array2::from_shape_vec((rows, cols), values)?;
        Ok(Self::new(data, nodata, transform, crs))
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[(row, col)]
    }

    /// Nodata test; NaN sentinels compare equal to NaN cells.
    #[inline]
    pub fn is_nodata(&self, value: f64) -> bool {
        value == self.nodata || (value.is_nan() && self.nodata.is_nan())
    }

    #[inline]
    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    #[inline]
    pub fn transform(&self) -> &AffineTransform {
        &self.transform
    }

    #[inline]
    pub fn crs(&self) -> Crs {
        self.crs
    }

    #[inline]
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }
}
