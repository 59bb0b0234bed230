//! Composed layer output.
//!
//! Each day's composed layer is written as a Parquet table with one row
//! per grid cell: a `geometry_wkb` column (hex-encoded little-endian WKB
//! multipolygon) followed by the attribute columns in schema order.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use geo::MultiPolygon;
use polars::frame::DataFrame;
use polars::prelude::{IntoColumn, NamedFrom, ParquetWriter, PlSmallStr, Series};

use crate::layer::Layer;
use crate::types::{AttrKind, AttrValue};

/// Name of the geometry column in written tables.
pub const GEOMETRY_WKB: &str = "geometry_wkb";

const WKB_POLYGON: u32 = 3;
const WKB_MULTI_POLYGON: u32 = 6;

/// Serialize a multipolygon as little-endian WKB.
pub fn multipolygon_to_wkb(geom: &MultiPolygon<f64>) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(1); // little-endian
    buf.extend_from_slice(&WKB_MULTI_POLYGON.to_le_bytes());
    buf.extend_from_slice(&(geom.0.len() as u32).to_le_bytes());

    for poly in &geom.0 {
        buf.push(1);
        buf.extend_from_slice(&WKB_POLYGON.to_le_bytes());
        let rings = 1 + poly.interiors().len();
        buf.extend_from_slice(&(rings as u32).to_le_bytes());
        for ring in std::iter::once(poly.exterior()).chain(poly.interiors()) {
            buf.extend_from_slice(&(ring.0.len() as u32).to_le_bytes());
            for coord in &ring.0 {
                buf.extend_from_slice(&coord.x.to_le_bytes());
                buf.extend_from_slice(&coord.y.to_le_bytes());
            }
        }
    }
    buf
}

/// Turn a layer into a DataFrame: geometry first, then attribute columns
/// typed per schema field kind.
pub fn layer_to_dataframe(layer: &Layer) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(1 + layer.schema().len());

    let wkb: Vec<String> =
        layer.geoms().iter().map(|g| hex::encode(multipolygon_to_wkb(g))).collect();
    columns.push(Series::new(PlSmallStr::from_str(GEOMETRY_WKB), wkb).into_column());

    for (col, field) in layer.schema().fields().iter().enumerate() {
        let name = PlSmallStr::from_str(&field.name);
        let series = match field.kind {
            AttrKind::Numeric => {
                let values: Vec<Option<f64>> =
                    (0..layer.len()).map(|i| layer.value(i, col).as_num()).collect();
                Series::new(name, values)
            }
            AttrKind::Categorical => {
                let values: Vec<Option<String>> = (0..layer.len())
                    .map(|i| layer.value(i, col).as_cat().map(str::to_string))
                    .collect();
                Series::new(name, values)
            }
            AttrKind::Boolean => {
                let values: Vec<Option<bool>> = (0..layer.len())
                    .map(|i| match layer.value(i, col) {
                        AttrValue::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect();
                Series::new(name, values)
            }
        };
        columns.push(series.into_column());
    }

    DataFrame::new(columns).context("failed to assemble output table")
}

/// Write the layer to `path` as Parquet.
pub fn write_layer_parquet(layer: &Layer, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create output file: {}", path.display()))?;
    let mut df = layer_to_dataframe(layer)?;
    ParquetWriter::new(BufWriter::new(file)).finish(&mut df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::types::{Field, Schema};
    use geo::polygon;
    use polars::io::SerReader;
    use polars::prelude::ParquetReader;

    fn sample_layer() -> Layer {
        let schema = Schema::new(vec![
            Field::numeric("weighted_POP"),
            Field::categorical("mode_NAME"),
            Field::boolean("highlight"),
        ]);
        let mut layer = Layer::new(Crs::Wgs84, schema);
        let geom: MultiPolygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]
        .into();
        layer
            .push(
                geom.clone(),
                vec![
                    AttrValue::Num(41.5),
                    AttrValue::Cat("west".into()),
                    AttrValue::Bool(true),
                ],
            )
            .unwrap();
        layer
            .push(geom, vec![AttrValue::Null, AttrValue::Null, AttrValue::Bool(false)])
            .unwrap();
        layer
    }

    #[test]
    fn wkb_header_is_little_endian_multipolygon() {
        let layer = sample_layer();
        let wkb = multipolygon_to_wkb(layer.geom(0));
        assert_eq!(wkb[0], 1);
        assert_eq!(u32::from_le_bytes(wkb[1..5].try_into().unwrap()), WKB_MULTI_POLYGON);
        assert_eq!(u32::from_le_bytes(wkb[5..9].try_into().unwrap()), 1);
        // one polygon, one ring of five points
        let expected = 9 + (1 + 4 + 4) + (4 + 5 * 16);
        assert_eq!(wkb.len(), expected);
    }

    #[test]
    fn parquet_round_trips_columns_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("composed.parquet");
        write_layer_parquet(&sample_layer(), &path).unwrap();

        let df = ParquetReader::new(File::open(&path).unwrap()).finish().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            df.get_column_names_str(),
            vec![GEOMETRY_WKB, "weighted_POP", "mode_NAME", "highlight"]
        );
        let pop = df.column("weighted_POP").unwrap().f64().unwrap();
        assert_eq!(pop.get(0), Some(41.5));
        assert_eq!(pop.get(1), None);
        let hl = df.column("highlight").unwrap().bool().unwrap();
        assert_eq!(hl.get(0), Some(true));
        assert_eq!(hl.get(1), Some(false));
    }
}
