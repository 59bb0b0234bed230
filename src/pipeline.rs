use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classify::classify;
use crate::compose::compose;
use crate::crs::{normalize_pair, Crs};
use crate::layer::Layer;
use crate::overlay::aggregate::{aggregate, AggregateSchema};
use crate::overlay::intersect_layers;
use crate::raster::{polygonize, RasterGrid};

/// Tunable parameters of one pipeline run. Defaults match the production
/// batch job: overall vulnerability score, 80th percentile, heat-risk
/// categories 2 through 4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineParams {
    /// Unprefixed numeric zone attribute used for thresholding.
    pub attribute: String,
    /// Percentile cutoff in [0, 100].
    pub percentile: f64,
    /// Raster categories eligible for highlighting.
    pub accepted: Vec<f64>,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self { attribute: "OVERALL_SCORE".to_string(), percentile: 80.0, accepted: vec![2.0, 3.0, 4.0] }
    }
}

/// Run the whole overlay pipeline: polygonize the raster, bring both
/// layers into the equal-area CRS, intersect, aggregate, classify and
/// compose. Pure over its inputs; each invocation is independent.
///
/// The composed layer keeps the display-CRS (EPSG:4326) cell geometries
/// produced right after polygonization, so no geometry is ever
/// reprojected after fragment areas have been computed.
pub fn run_pipeline(raster: &RasterGrid, zones: &Layer, params: &PipelineParams) -> Result<Layer> {
    let native = polygonize(raster)?;
    let grid = native.reproject(Crs::Wgs84)?;
    info!(cells = grid.len(), zones = zones.len(), "layers ready for overlay");

    let (grid_eq, zones_eq) = normalize_pair(&grid, zones)?;
    let fragments = intersect_layers(&grid_eq, &zones_eq)?;

    let schema = AggregateSchema::from_zone_schema(zones.schema());
    let mut rows = aggregate(&grid_eq, &zones_eq, &fragments, &params.attribute)?;
    classify(&mut rows, &schema, &params.attribute, params.percentile, &params.accepted)?;

    compose(&grid, &schema, &rows)
}
