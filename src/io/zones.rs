//! Vulnerability zone layer loading.
//!
//! The zone boundaries arrive as a shapefile; their health attributes
//! arrive separately as a tabular CSV keyed by zone code. Both are joined
//! here, outside the core, so the pipeline only ever sees one attributed
//! layer.

use std::path::Path;

use ahash::AHashMap;
use anyhow::{anyhow, bail, Context, Result};
use polars::frame::DataFrame;
use polars::io::SerReader;
use polars::prelude::{AnyValue, CsvReader, DataType};
use shapefile::{dbase::FieldValue, Shape};
use tracing::{debug, warn};

use crate::crs::Crs;
use crate::layer::Layer;
use crate::types::{AttrKind, AttrValue, Field, Schema};

/// Read the zone boundary shapefile into a layer. The caller supplies the
/// EPSG code of the file's CRS; .prj parsing is out of scope.
///
/// Non-polygon shapes are skipped with a warning. The attribute schema is
/// inferred once from the first record and applied to every row.
pub fn read_zone_shapefile(path: &Path, epsg: u32) -> Result<Layer> {
    let mut reader = shapefile::Reader::from_path(path)
        .with_context(|| format!("failed to open shapefile: {}", path.display()))?;

    let mut schema: Option<Schema> = None;
    let mut features = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.context("error reading shape+record")?;
        let geom = match shape {
            Shape::Polygon(p) => polygon_rings_to_geo(&p),
            other => {
                warn!(kind = ?other.shapetype(), "skipping non-polygon shape in zone layer");
                continue;
            }
        };

        let schema = schema.get_or_insert_with(|| infer_record_schema(&record));
        let mut row = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let value = record
                .get(&field.name)
                .ok_or_else(|| anyhow!("record missing field `{}`", field.name))?;
            row.push(field_to_attr(value));
        }
        features.push((geom, row));
    }

    let mut layer = Layer::new(Crs::from_epsg(epsg), schema.unwrap_or_default());
    for (geom, row) in features {
        layer.push(geom, row)?;
    }
    debug!(zones = layer.len(), "loaded zone boundaries");
    Ok(layer)
}

fn infer_record_schema(record: &shapefile::dbase::Record) -> Schema {
    let mut fields = Vec::new();
    for (name, value) in record.clone() {
        // Logical fields load as categorical so they aggregate as
        // mode_* like every other non-numeric column.
        let kind = match value {
            FieldValue::Numeric(_)
            | FieldValue::Float(_)
            | FieldValue::Integer(_)
            | FieldValue::Currency(_)
            | FieldValue::Double(_) => AttrKind::Numeric,
            _ => AttrKind::Categorical,
        };
        fields.push(Field { name, kind });
    }
    Schema::new(fields)
}

fn field_to_attr(value: &FieldValue) -> AttrValue {
    match value {
        FieldValue::Numeric(Some(v)) => AttrValue::Num(*v),
        FieldValue::Float(Some(v)) => AttrValue::Num(*v as f64),
        FieldValue::Integer(v) => AttrValue::Num(*v as f64),
        FieldValue::Currency(v) | FieldValue::Double(v) => AttrValue::Num(*v),
        FieldValue::Logical(Some(v)) => AttrValue::Cat(v.to_string()),
        FieldValue::Character(Some(v)) => AttrValue::Cat(v.trim().to_string()),
        FieldValue::Memo(v) => AttrValue::Cat(v.clone()),
        FieldValue::Date(Some(v)) => AttrValue::Cat(v.to_string()),
        _ => AttrValue::Null,
    }
}

/// Convert a shapefile polygon to geo. Shapefile rings are CW-exterior
/// with each exterior followed by its holes; geo wants explicit
/// exterior/interior grouping.
fn polygon_rings_to_geo(p: &shapefile::Polygon) -> geo::MultiPolygon<f64> {
    fn signed_area(pts: &[geo::Coord<f64>]) -> f64 {
        let mut a = 0.0;
        for w in pts.windows(2) {
            a += w[0].x * w[1].y - w[1].x * w[0].y;
        }
        a / 2.0
    }

    let mut polys: Vec<geo::Polygon<f64>> = Vec::new();
    let mut exterior: Option<geo::LineString<f64>> = None;
    let mut holes: Vec<geo::LineString<f64>> = Vec::new();

    for ring in p.rings() {
        let mut coords: Vec<geo::Coord<f64>> =
            ring.points().iter().map(|pt| geo::Coord { x: pt.x, y: pt.y }).collect();
        if !coords.is_empty() && coords[0] != coords[coords.len() - 1] {
            coords.push(coords[0]);
        }
        // CW (negative signed area) marks an exterior in shapefiles.
        let is_exterior = signed_area(&coords) < 0.0;
        let ls = geo::LineString(coords);

        if is_exterior {
            if let Some(ext) = exterior.take() {
                polys.push(geo::Polygon::new(ext, std::mem::take(&mut holes)));
            }
            exterior = Some(ls);
        } else {
            holes.push(ls);
        }
    }
    if let Some(ext) = exterior {
        polys.push(geo::Polygon::new(ext, holes));
    }

    geo::MultiPolygon(polys)
}

/// Read the tabular zone attributes (CSV) into a DataFrame.
pub fn read_attribute_table(path: &Path) -> Result<DataFrame> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open attribute table: {}", path.display()))?;
    let df = CsvReader::new(file).finish()?;
    Ok(df)
}

/// Inner-join the attribute table onto the zone layer by zone code,
/// mirroring the upstream data preparation: zones without a matching
/// attribute row are dropped. The joined columns are appended after the
/// shapefile's own attributes.
pub fn join_attributes(
    zones: &Layer,
    table: &DataFrame,
    zone_key: &str,
    table_key: &str,
) -> Result<Layer> {
    let key_col = zones
        .schema()
        .position(zone_key)
        .ok_or_else(|| anyhow!("zone layer has no `{zone_key}` column"))?;

    let keys = table
        .column(table_key)
        .with_context(|| format!("attribute table has no `{table_key}` column"))?
        .cast(&DataType::String)?;
    let keys = keys.str()?;
    let mut index: AHashMap<String, usize> = AHashMap::with_capacity(keys.len());
    for (i, key) in keys.into_iter().enumerate() {
        if let Some(key) = key {
            index.entry(key.to_string()).or_insert(i);
        }
    }

    // Columns to carry over, with their aggregation kinds.
    let mut columns = Vec::new();
    for column in table.get_columns() {
        let name = column.name().as_str();
        if name == table_key {
            continue;
        }
        let kind = match column.dtype() {
            DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8 => AttrKind::Numeric,
            DataType::Boolean | DataType::String => AttrKind::Categorical,
            other => {
                warn!(column = name, dtype = ?other, "skipping attribute column with unsupported dtype");
                continue;
            }
        };
        columns.push((column, Field { name: name.to_string(), kind }));
    }

    let mut fields = zones.schema().fields().to_vec();
    fields.extend(columns.iter().map(|(_, f)| f.clone()));
    let mut joined = Layer::new(zones.crs(), Schema::new(fields));

    let mut matched = 0usize;
    for i in 0..zones.len() {
        let key = match zones.value(i, key_col) {
            AttrValue::Cat(s) => s.clone(),
            AttrValue::Num(v) if v.fract() == 0.0 => format!("{}", *v as i64),
            AttrValue::Num(v) => v.to_string(),
            _ => continue,
        };
        let Some(&table_row) = index.get(&key) else {
            continue;
        };

        let mut row = zones.row(i).to_vec();
        for (column, _) in &columns {
            row.push(any_to_attr(column.get(table_row)?)?);
        }
        joined.push(zones.geom(i).clone(), row)?;
        matched += 1;
    }

    debug!(zones = zones.len(), matched, "joined zone attributes");
    Ok(joined)
}

fn any_to_attr(value: AnyValue) -> Result<AttrValue> {
    Ok(match value {
        AnyValue::Null => AttrValue::Null,
        AnyValue::String(s) => AttrValue::Cat(s.to_string()),
        AnyValue::StringOwned(s) => AttrValue::Cat(s.to_string()),
        AnyValue::Boolean(b) => AttrValue::Cat(b.to_string()),
        AnyValue::Float64(v) => AttrValue::Num(v),
        AnyValue::Float32(v) => AttrValue::Num(v as f64),
        AnyValue::Int64(v) => AttrValue::Num(v as f64),
        AnyValue::Int32(v) => AttrValue::Num(v as f64),
        AnyValue::Int16(v) => AttrValue::Num(v as f64),
        AnyValue::Int8(v) => AttrValue::Num(v as f64),
        AnyValue::UInt64(v) => AttrValue::Num(v as f64),
        AnyValue::UInt32(v) => AttrValue::Num(v as f64),
        AnyValue::UInt16(v) => AttrValue::Num(v as f64),
        AnyValue::UInt8(v) => AttrValue::Num(v as f64),
        other => bail!("unsupported attribute value: {other:?}"),
    })
}
