//! Raster grid artifact reading and writing.
//!
//! The fetch collaborator converts each day's GeoTIFF into this minimal
//! single-band container before the core ever sees it: a fixed header
//! (magic, version, shape, EPSG, nodata, geotransform) followed by
//! row-major little-endian f64 cell values.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::crs::Crs;
use crate::raster::{AffineTransform, RasterGrid};

/// Magic bytes for the grid file format: "HGRD" (HeatGrid Raster Data)
const MAGIC: &[u8] = b"HGRD";
/// Format version (currently 1)
const VERSION: u8 = 1;

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f64(reader: &mut impl Read) -> Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

/// Read a raster grid artifact from `path`.
pub fn read_raster(path: &Path) -> Result<RasterGrid> {
    let file = File::open(path)
        .with_context(|| format!("failed to open raster grid: {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        bail!("{} is not a raster grid artifact (bad magic)", path.display());
    }
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != VERSION {
        bail!("unsupported raster grid version {}", version[0]);
    }

    let rows = read_u32(&mut reader)? as usize;
    let cols = read_u32(&mut reader)? as usize;
    let epsg = read_u32(&mut reader)?;
    let nodata = read_f64(&mut reader)?;
    let transform = AffineTransform::new(
        read_f64(&mut reader)?,
        read_f64(&mut reader)?,
        read_f64(&mut reader)?,
        read_f64(&mut reader)?,
        read_f64(&mut reader)?,
        read_f64(&mut reader)?,
    );

    let mut values = vec![0.0f64; rows * cols];
    for value in &mut values {
        *value = read_f64(&mut reader)?;
    }

    RasterGrid::from_shape_vec(rows, cols, values, nodata, transform, Crs::from_epsg(epsg))
}

/// Write a raster grid artifact to `path`. Used by the fetch collaborator
/// and by test fixtures.
pub fn write_raster(grid: &RasterGrid, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create raster grid: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    writer.write_all(MAGIC)?;
    writer.write_all(&[VERSION])?;
    writer.write_all(&(grid.rows() as u32).to_le_bytes())?;
    writer.write_all(&(grid.cols() as u32).to_le_bytes())?;
    writer.write_all(&grid.crs().epsg().to_le_bytes())?;
    writer.write_all(&grid.nodata().to_le_bytes())?;

    let t = grid.transform();
    for value in [t.origin_x, t.pixel_w, t.rot_x, t.origin_y, t.rot_y, t.pixel_h] {
        writer.write_all(&value.to_le_bytes())?;
    }
    for row in 0..grid.rows() {
        for col in 0..grid.cols() {
            writer.write_all(&grid.get(row, col).to_le_bytes())?;
        }
    }
    Ok(())
}
