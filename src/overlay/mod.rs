pub mod aggregate;

use anyhow::Result;
use geo::{Area, BooleanOps, BoundingRect, Rect};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use tracing::{debug, warn};

use crate::error::Error;
use crate::layer::Layer;

/// Relative area cutoff: an intersection smaller than this fraction of
/// the smaller parent is a boundary-tracing sliver, not real overlap.
const SLIVER_EPS: f64 = 1e-9;

#[derive(Debug, Clone)]
struct BoundingBox {
    idx: usize, // Index of corresponding MultiPolygon in the zone layer
    bbox: Rect<f64>,
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// The geometric intersection of one grid cell and one zone, reduced to
/// what the aggregator needs: parent indices and positive area. Transient;
/// produced here and consumed immediately downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment {
    pub parent_a: usize,
    pub parent_b: usize,
    pub area: f64,
}

/// Compute all non-empty fragments between the grid layer and the zone
/// layer. Both layers must already share an area-preserving CRS.
///
/// The zone layer is indexed with an R-tree so each grid cell only tests
/// zones whose bounding boxes intersect its own. Cells are processed in
/// parallel; per-cell candidate zones are visited in index order so the
/// fragment stream is deterministic.
///
/// Degenerate features (empty or zero-area) are excluded and logged,
/// never intersected with undefined results.
pub fn intersect_layers(grid: &Layer, zones: &Layer) -> Result<Vec<Fragment>> {
    // Matching CRSs are not enough: area math on degree or mercator
    // coordinates is distorted, so anything non-equal-area is refused
    // outright rather than silently measured.
    if grid.crs() != zones.crs() || !grid.crs().is_area_preserving() {
        return Err(Error::CrsMismatch {
            left: grid.crs().epsg(),
            right: zones.crs().epsg(),
        }
        .into());
    }

    let zone_areas: Vec<f64> = zones.geoms().iter().map(|g| g.unsigned_area()).collect();

    let mut boxes = Vec::with_capacity(zones.len());
    for (idx, geom) in zones.geoms().iter().enumerate() {
        if zone_areas[idx] <= 0.0 {
            warn!(
                "{}",
                Error::DegenerateGeometry { index: idx, reason: "zero-area zone excluded from overlay" }
            );
            continue;
        }
        let Some(bbox) = geom.bounding_rect() else {
            warn!(
                "{}",
                Error::DegenerateGeometry { index: idx, reason: "empty zone excluded from overlay" }
            );
            continue;
        };
        boxes.push(BoundingBox { idx, bbox });
    }
    let rtree = RTree::bulk_load(boxes);

    let fragments: Vec<Fragment> = grid
        .geoms()
        .par_iter()
        .enumerate()
        .flat_map_iter(|(i, geom_a)| {
            let area_a = geom_a.unsigned_area();
            if area_a <= 0.0 {
                warn!(
                    "{}",
                    Error::DegenerateGeometry { index: i, reason: "zero-area cell excluded from overlay" }
                );
                return Vec::new().into_iter();
            }
            let Some(rect) = geom_a.bounding_rect() else {
                return Vec::new().into_iter();
            };
            let search = AABB::from_corners(rect.min().into(), rect.max().into());

            let mut candidates: Vec<usize> =
                rtree.locate_in_envelope_intersecting(&search).map(|bb| bb.idx).collect();
            candidates.sort_unstable();

            let mut out = Vec::new();
            for j in candidates {
                let area = geom_a.intersection(&zones.geoms()[j]).unsigned_area();
                // Boundary touches have zero area and are never emitted.
                if area > SLIVER_EPS * area_a.min(zone_areas[j]) {
                    out.push(Fragment { parent_a: i, parent_b: j, area });
                }
            }
            out.into_iter()
        })
        .collect();

    debug!(cells = grid.len(), zones = zones.len(), fragments = fragments.len(), "overlay complete");
    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::types::{AttrValue, Field, Schema};
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

    fn layer_of(geoms: Vec<MultiPolygon<f64>>) -> Layer {
        let mut layer = Layer::new(Crs::ConusAlbers, Schema::new(vec![Field::numeric("V")]));
        for (i, g) in geoms.into_iter().enumerate() {
            layer.push(g, vec![AttrValue::Num(i as f64)]).unwrap();
        }
        layer
    }

    #[test]
    fn half_overlap_produces_half_area_fragment() {
        let grid = layer_of(vec![rect(0.0, 0.0, 1.0, 1.0)]);
        let zones = layer_of(vec![rect(0.5, 0.0, 2.0, 1.0)]);
        let frags = intersect_layers(&grid, &zones).unwrap();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].parent_a, 0);
        assert_eq!(frags[0].parent_b, 0);
        assert!((frags[0].area - 0.5).abs() < 1e-9);
    }

    #[test]
    fn boundary_touch_is_not_emitted() {
        let grid = layer_of(vec![rect(0.0, 0.0, 1.0, 1.0)]);
        let zones = layer_of(vec![rect(1.0, 0.0, 2.0, 1.0)]);
        let frags = intersect_layers(&grid, &zones).unwrap();
        assert!(frags.is_empty());
    }

    #[test]
    fn disjoint_layers_produce_no_fragments() {
        let grid = layer_of(vec![rect(0.0, 0.0, 1.0, 1.0)]);
        let zones = layer_of(vec![rect(10.0, 10.0, 11.0, 11.0)]);
        assert!(intersect_layers(&grid, &zones).unwrap().is_empty());
    }

    #[test]
    fn fragment_area_never_exceeds_parents() {
        let grid = layer_of(vec![rect(0.0, 0.0, 2.0, 2.0)]);
        let zones = layer_of(vec![rect(1.0, 1.0, 5.0, 5.0), rect(-1.0, -1.0, 0.5, 0.5)]);
        let frags = intersect_layers(&grid, &zones).unwrap();
        assert_eq!(frags.len(), 2);
        for f in &frags {
            assert!(f.area <= grid.geom(f.parent_a).unsigned_area() + 1e-12);
            assert!(f.area <= zones.geom(f.parent_b).unsigned_area() + 1e-12);
        }
        // Candidate ordering is by zone index, cells in layer order.
        assert_eq!(frags[0].parent_b, 0);
        assert_eq!(frags[1].parent_b, 1);
    }

    #[test]
    fn mismatched_crs_is_rejected() {
        let grid = layer_of(vec![rect(0.0, 0.0, 1.0, 1.0)]);
        let mut zones = Layer::new(Crs::Wgs84, Schema::new(vec![Field::numeric("V")]));
        zones.push(rect(0.0, 0.0, 1.0, 1.0), vec![AttrValue::Num(0.0)]).unwrap();
        let err = intersect_layers(&grid, &zones).unwrap_err();
        assert!(err.to_string().contains("CRS mismatch"));
    }

    #[test]
    fn matching_but_non_equal_area_crs_is_rejected() {
        // Equal CRSs alone must not admit overlay: degree-based areas
        // are latitude-biased, mercator areas inflated poleward.
        for crs in [Crs::Wgs84, Crs::WebMercator] {
            let mut grid = Layer::new(crs, Schema::new(vec![Field::numeric("V")]));
            grid.push(rect(0.0, 0.0, 1.0, 1.0), vec![AttrValue::Num(0.0)]).unwrap();
            let mut zones = Layer::new(crs, Schema::new(vec![Field::numeric("V")]));
            zones.push(rect(0.0, 0.0, 1.0, 1.0), vec![AttrValue::Num(0.0)]).unwrap();
            let err = intersect_layers(&grid, &zones).unwrap_err();
            assert!(err.to_string().contains("CRS mismatch"), "{crs:?}");
        }
    }

    #[test]
    fn degenerate_zone_is_skipped() {
        let grid = layer_of(vec![rect(0.0, 0.0, 1.0, 1.0)]);
        // Second zone is a zero-area line disguised as a polygon.
        let degenerate: MultiPolygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 0.0, y: 0.0),
        ]
        .into();
        let zones = layer_of(vec![rect(0.0, 0.0, 1.0, 1.0), degenerate]);
        let frags = intersect_layers(&grid, &zones).unwrap();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].parent_b, 0);
    }
}
