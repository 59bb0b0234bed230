use anyhow::{bail, Result};
use tracing::debug;

use crate::error::Error;
use crate::layer::Layer;
use crate::raster::RASTER_VALUE;
use crate::types::{AttrKind, AttrValue, Schema};

use super::Fragment;

/// Column-name prefixes on the composed output; the presentation layer
/// keys on these verbatim.
pub const WEIGHTED_PREFIX: &str = "weighted_";
pub const MODE_PREFIX: &str = "mode_";

/// Per-group weights must sum to one within this tolerance.
pub const WEIGHT_SUM_TOL: f64 = 1e-9;

/// The zone schema split by aggregation rule, resolved once up front.
/// Positions index into the zone layer's columns.
#[derive(Debug, Clone)]
pub struct AggregateSchema {
    pub numeric: Vec<(usize, String)>,
    pub categorical: Vec<(usize, String)>,
}

impl AggregateSchema {
    pub fn from_zone_schema(schema: &Schema) -> Self {
        let mut numeric = Vec::new();
        let mut categorical = Vec::new();
        for (pos, field) in schema.fields().iter().enumerate() {
            match field.kind {
                AttrKind::Numeric => numeric.push((pos, field.name.clone())),
                AttrKind::Categorical => categorical.push((pos, field.name.clone())),
                AttrKind::Boolean => {}
            }
        }
        Self { numeric, categorical }
    }

    /// Index into the weighted columns for an unprefixed attribute name.
    pub fn weighted_position(&self, attribute: &str) -> Option<usize> {
        self.numeric.iter().position(|(_, name)| name == attribute)
    }
}

/// One output row per grid cell. `weighted` parallels the numeric zone
/// fields, `modes` the categorical ones; `None` marks a cell with no
/// usable overlap, which is distinct from zero.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRow {
    pub id: usize,
    pub raster_value: f64,
    pub weighted: Vec<Option<f64>>,
    pub modes: Vec<Option<String>>,
    pub highlight: bool,
}

/// Reduce fragments into one row per grid cell.
///
/// Numeric zone attributes become area-weighted sums over the cell's
/// fragments; categorical attributes take the value of the largest
/// fragment, per column, ties broken by first-encountered fragment. Cells
/// with no fragments still appear, carrying their own raster value and
/// nulls everywhere else.
///
/// `attribute` is the unprefixed numeric zone column later used for
/// thresholding; its absence is fatal here since weighting would have
/// nothing to compute.
pub fn aggregate(
    grid: &Layer,
    zones: &Layer,
    fragments: &[Fragment],
    attribute: &str,
) -> Result<Vec<AggregatedRow>> {
    let schema = AggregateSchema::from_zone_schema(zones.schema());
    if schema.weighted_position(attribute).is_none() {
        return Err(Error::MissingAttribute(attribute.to_string()).into());
    }

    let Some(raster_col) = grid.schema().position(RASTER_VALUE) else {
        bail!("grid layer is missing its `{RASTER_VALUE}` column");
    };

    let mut groups: Vec<Vec<&Fragment>> = vec![Vec::new(); grid.len()];
    for fragment in fragments {
        groups[fragment.parent_a].push(fragment);
    }

    let mut rows = Vec::with_capacity(grid.len());
    for (id, group) in groups.iter().enumerate() {
        let raster_value = match grid.value(id, raster_col) {
            AttrValue::Num(v) => *v,
            other => bail!("non-numeric raster value {other} on cell {id}"),
        };

        if group.is_empty() {
            rows.push(AggregatedRow {
                id,
                raster_value,
                weighted: vec![None; schema.numeric.len()],
                modes: vec![None; schema.categorical.len()],
                highlight: false,
            });
            continue;
        }

        let total_area: f64 = group.iter().map(|f| f.area).sum();
        if total_area <= 0.0 {
            return Err(Error::AggregationInvariantViolation { cell: id }.into());
        }
        debug_assert!(
            (group.iter().map(|f| f.area / total_area).sum::<f64>() - 1.0).abs() <= WEIGHT_SUM_TOL
        );

        let weighted = schema
            .numeric
            .iter()
            .map(|&(pos, _)| {
                let mut sum = 0.0;
                let mut any = false;
                for fragment in group {
                    match zones.value(fragment.parent_b, pos) {
                        AttrValue::Num(x) => {
                            sum += (fragment.area / total_area) * x;
                            any = true;
                        }
                        AttrValue::Null => {} // missing source value contributes nothing
                        other => bail!("non-numeric value {other} in numeric zone column"),
                    }
                }
                Ok(any.then_some(sum))
            })
            .collect::<Result<Vec<_>>>()?;

        let modes = schema
            .categorical
            .iter()
            .map(|&(pos, _)| {
                // Largest contributor wins; strict comparison keeps the
                // first-encountered fragment on ties.
                let mut best: Option<(&Fragment, &str)> = None;
                for fragment in group {
                    let Some(value) = zones.value(fragment.parent_b, pos).as_cat() else {
                        continue;
                    };
                    if best.is_none_or(|(b, _)| fragment.area > b.area) {
                        best = Some((fragment, value));
                    }
                }
                best.map(|(_, value)| value.to_string())
            })
            .collect();

        rows.push(AggregatedRow { id, raster_value, weighted, modes, highlight: false });
    }

    debug!(rows = rows.len(), fragments = fragments.len(), "aggregation complete");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::types::Field;
    use geo::{polygon, MultiPolygon};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]
        .into()
    }

    fn grid_layer(cells: usize) -> Layer {
        let mut layer =
            Layer::new(Crs::ConusAlbers, Schema::new(vec![Field::numeric(RASTER_VALUE)]));
        for i in 0..cells {
            layer
                .push(rect(i as f64, 0.0, i as f64 + 1.0, 1.0), vec![AttrValue::Num(2.0 + i as f64)])
                .unwrap();
        }
        layer
    }

    fn zone_layer(rows: Vec<(MultiPolygon<f64>, f64, &str)>) -> Layer {
        let schema = Schema::new(vec![Field::numeric("POP"), Field::categorical("NAME")]);
        let mut layer = Layer::new(Crs::ConusAlbers, schema);
        for (geom, pop, name) in rows {
            layer.push(geom, vec![AttrValue::Num(pop), AttrValue::Cat(name.into())]).unwrap();
        }
        layer
    }

    #[test]
    fn weights_are_area_proportional() {
        let grid = grid_layer(1);
        let zones = zone_layer(vec![
            (rect(0.0, 0.0, 0.5, 1.0), 100.0, "west"),
            (rect(0.5, 0.0, 1.0, 1.0), 0.0, "east"),
        ]);
        let frags = vec![
            Fragment { parent_a: 0, parent_b: 0, area: 0.5 },
            Fragment { parent_a: 0, parent_b: 1, area: 0.5 },
        ];
        let rows = aggregate(&grid, &zones, &frags, "POP").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].weighted[0], Some(50.0));
        // Tie on area: first-encountered fragment wins the mode.
        assert_eq!(rows[0].modes[0].as_deref(), Some("west"));
    }

    #[test]
    fn largest_fragment_wins_categorical() {
        let grid = grid_layer(1);
        let zones = zone_layer(vec![
            (rect(0.0, 0.0, 0.25, 1.0), 1.0, "small"),
            (rect(0.25, 0.0, 1.0, 1.0), 1.0, "large"),
        ]);
        let frags = vec![
            Fragment { parent_a: 0, parent_b: 0, area: 0.25 },
            Fragment { parent_a: 0, parent_b: 1, area: 0.75 },
        ];
        let rows = aggregate(&grid, &zones, &frags, "POP").unwrap();
        assert_eq!(rows[0].modes[0].as_deref(), Some("large"));
        assert_eq!(rows[0].weighted[0], Some(1.0));
    }

    #[test]
    fn cells_without_fragments_get_nulls_not_zeros() {
        let grid = grid_layer(2);
        let zones = zone_layer(vec![(rect(0.0, 0.0, 1.0, 1.0), 40.0, "only")]);
        let frags = vec![Fragment { parent_a: 0, parent_b: 0, area: 1.0 }];
        let rows = aggregate(&grid, &zones, &frags, "POP").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].weighted[0], Some(40.0));
        assert_eq!(rows[1].weighted[0], None);
        assert_eq!(rows[1].modes[0], None);
        assert_eq!(rows[1].raster_value, 3.0);
    }

    #[test]
    fn missing_attribute_is_fatal() {
        let grid = grid_layer(1);
        let zones = zone_layer(vec![(rect(0.0, 0.0, 1.0, 1.0), 1.0, "z")]);
        let err = aggregate(&grid, &zones, &[], "NOT_A_COLUMN").unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::MissingAttribute(_))));
    }

    #[test]
    fn zero_total_area_is_guarded() {
        let grid = grid_layer(1);
        let zones = zone_layer(vec![(rect(0.0, 0.0, 1.0, 1.0), 1.0, "z")]);
        let frags = vec![Fragment { parent_a: 0, parent_b: 0, area: 0.0 }];
        let err = aggregate(&grid, &zones, &frags, "POP").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::AggregationInvariantViolation { cell: 0 })
        ));
    }

    #[test]
    fn null_source_values_are_skipped_not_zeroed() {
        let grid = grid_layer(1);
        let schema = Schema::new(vec![Field::numeric("POP")]);
        let mut zones = Layer::new(Crs::ConusAlbers, schema);
        zones.push(rect(0.0, 0.0, 0.5, 1.0), vec![AttrValue::Num(10.0)]).unwrap();
        zones.push(rect(0.5, 0.0, 1.0, 1.0), vec![AttrValue::Null]).unwrap();
        let frags = vec![
            Fragment { parent_a: 0, parent_b: 0, area: 0.5 },
            Fragment { parent_a: 0, parent_b: 1, area: 0.5 },
        ];
        let rows = aggregate(&grid, &zones, &frags, "POP").unwrap();
        assert_eq!(rows[0].weighted[0], Some(5.0));
    }
}
