use anyhow::{bail, Result};

use crate::layer::Layer;
use crate::overlay::aggregate::{AggregateSchema, AggregatedRow, MODE_PREFIX, WEIGHTED_PREFIX};
use crate::raster::RASTER_VALUE;
use crate::types::{AttrValue, Field, Schema};

/// Name of the classifier flag column on the composed layer.
pub const HIGHLIGHT: &str = "highlight";

/// Build the schema of the composed output layer for a given zone
/// aggregate schema: `raster_value`, then `weighted_*`, `mode_*`,
/// `highlight`.
pub fn composed_schema(schema: &AggregateSchema) -> Schema {
    let mut fields = vec![Field::numeric(RASTER_VALUE)];
    for (_, name) in &schema.numeric {
        fields.push(Field::numeric(format!("{WEIGHTED_PREFIX}{name}")));
    }
    for (_, name) in &schema.categorical {
        fields.push(Field::categorical(format!("{MODE_PREFIX}{name}")));
    }
    fields.push(Field::boolean(HIGHLIGHT));
    Schema::new(fields)
}

/// Merge aggregated rows back onto the original grid-cell geometries.
///
/// Left join keyed on cell id: every grid polygon appears exactly once in
/// the output with its geometry untouched, whatever its overlap status.
/// Rows must cover the grid exactly (the aggregator emits one per cell).
pub fn compose(grid: &Layer, schema: &AggregateSchema, rows: &[AggregatedRow]) -> Result<Layer> {
    if rows.len() != grid.len() {
        bail!("aggregated row count {} does not match grid cell count {}", rows.len(), grid.len());
    }

    let mut out = Layer::new(grid.crs(), composed_schema(schema));
    for row in rows {
        if row.id >= grid.len() {
            bail!("aggregated row id {} is out of range for the grid layer", row.id);
        }
        let mut values = Vec::with_capacity(2 + row.weighted.len() + row.modes.len());
        values.push(AttrValue::Num(row.raster_value));
        values.extend(row.weighted.iter().map(|v| match v {
            Some(x) => AttrValue::Num(*x),
            None => AttrValue::Null,
        }));
        values.extend(row.modes.iter().map(|v| match v {
            Some(s) => AttrValue::Cat(s.clone()),
            None => AttrValue::Null,
        }));
        values.push(AttrValue::Bool(row.highlight));
        out.push(grid.geom(row.id).clone(), values)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use geo::{polygon, MultiPolygon};

    fn square(x: f64) -> MultiPolygon<f64> {
        polygon![
            (x: x, y: 0.0),
            (x: x + 1.0, y: 0.0),
            (x: x + 1.0, y: 1.0),
            (x: x, y: 1.0),
            (x: x, y: 0.0),
        ]
        .into()
    }

    fn grid(cells: usize) -> Layer {
        let mut layer = Layer::new(Crs::Wgs84, Schema::new(vec![Field::numeric(RASTER_VALUE)]));
        for i in 0..cells {
            layer.push(square(i as f64), vec![AttrValue::Num(2.0)]).unwrap();
        }
        layer
    }

    fn agg_schema() -> AggregateSchema {
        AggregateSchema::from_zone_schema(&Schema::new(vec![
            Field::numeric("POP"),
            Field::categorical("NAME"),
        ]))
    }

    #[test]
    fn composed_schema_uses_prefixed_names() {
        let schema = composed_schema(&agg_schema());
        assert_eq!(schema.position(RASTER_VALUE), Some(0));
        assert_eq!(schema.position("weighted_POP"), Some(1));
        assert_eq!(schema.position("mode_NAME"), Some(2));
        assert_eq!(schema.position(HIGHLIGHT), Some(3));
    }

    #[test]
    fn compose_round_trips_geometries_exactly() {
        let grid = grid(2);
        let rows = vec![
            AggregatedRow {
                id: 0,
                raster_value: 2.0,
                weighted: vec![Some(50.0)],
                modes: vec![Some("west".into())],
                highlight: true,
            },
            AggregatedRow {
                id: 1,
                raster_value: 2.0,
                weighted: vec![None],
                modes: vec![None],
                highlight: false,
            },
        ];
        let out = compose(&grid, &agg_schema(), &rows).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.geoms(), grid.geoms());
        assert_eq!(out.value(0, 1), &AttrValue::Num(50.0));
        assert_eq!(out.value(0, 3), &AttrValue::Bool(true));
        assert_eq!(out.value(1, 1), &AttrValue::Null);
        assert_eq!(out.value(1, 2), &AttrValue::Null);
        assert_eq!(out.value(1, 3), &AttrValue::Bool(false));
    }

    #[test]
    fn row_count_mismatch_is_rejected() {
        let grid = grid(2);
        assert!(compose(&grid, &agg_schema(), &[]).is_err());
    }
}
