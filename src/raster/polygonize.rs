use ahash::AHashMap;
use anyhow::{anyhow, bail, Result};
use geo::{Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use smallvec::SmallVec;
use tracing::debug;

use crate::layer::Layer;
use crate::types::{AttrValue, Field, Schema};

use super::RasterGrid;

/// Attribute carried by every polygonized cell region.
pub const RASTER_VALUE: &str = "raster_value";

/// Lattice corner in (col, row) grid coordinates.
type Vertex = (i64, i64);

/// Per-vertex outgoing boundary edges. Degree is at most 2 (saddle vertices).
type EdgeMap = AHashMap<Vertex, SmallVec<[Vertex; 2]>>;

/// Convert a raster into a layer with one polygon per maximal 4-connected
/// region of equal, non-nodata cell value, each tagged with that value
/// under `raster_value`. Geometry lives in the raster's native CRS; the
/// pipeline reprojects to the display CRS afterwards.
///
/// An all-nodata raster yields an empty layer, not an error.
pub fn polygonize(grid: &RasterGrid) -> Result<Layer> {
    let (labels, values) = label_regions(grid);
    let edge_maps = collect_boundary_edges(grid, &labels, values.len());

    let schema = Schema::new(vec![Field::numeric(RASTER_VALUE)]);
    let mut layer = Layer::new(grid.crs(), schema);

    for (region, edges) in edge_maps.into_iter().enumerate() {
        let total = edges.values().map(|v| v.len()).sum();
        let rings = trace_rings(edges, total)?;
        let geom = assemble_region(rings, grid)?;
        layer.push(geom, vec![AttrValue::Num(values[region])])?;
    }

    debug!(regions = layer.len(), "polygonized raster");
    Ok(layer)
}

/// Flood-fill labelling of 4-connected equal-value regions. Nodata cells
/// keep label -1. Cell values compare by exact bit pattern.
fn label_regions(grid: &RasterGrid) -> (Vec<i32>, Vec<f64>) {
    let (rows, cols) = (grid.rows(), grid.cols());
    let mut labels = vec![-1i32; rows * cols];
    let mut values = Vec::new();
    let mut stack = Vec::new();

    for r in 0..rows {
        for c in 0..cols {
            if labels[r * cols + c] >= 0 {
                continue;
            }
            let value = grid.get(r, c);
            if grid.is_nodata(value) {
                continue;
            }

            let label = values.len() as i32;
            values.push(value);
            labels[r * cols + c] = label;
            stack.push((r, c));

            while let Some((cr, cc)) = stack.pop() {
                let neighbors = [
                    (cr.wrapping_sub(1), cc),
                    (cr + 1, cc),
                    (cr, cc.wrapping_sub(1)),
                    (cr, cc + 1),
                ];
                for (nr, nc) in neighbors {
                    if nr >= rows || nc >= cols {
                        continue;
                    }
                    let idx = nr * cols + nc;
                    let nv = grid.get(nr, nc);
                    if labels[idx] < 0 && !grid.is_nodata(nv) && nv.to_bits() == value.to_bits() {
                        labels[idx] = label;
                        stack.push((nr, nc));
                    }
                }
            }
        }
    }

    (labels, values)
}

/// Collect oriented boundary edges per region. Each edge is a unit lattice
/// segment with the region's interior on its left, so exterior rings come
/// out with positive signed area and holes negative.
fn collect_boundary_edges(grid: &RasterGrid, labels: &[i32], regions: usize) -> Vec<EdgeMap> {
    let (rows, cols) = (grid.rows(), grid.cols());
    let mut maps: Vec<EdgeMap> = vec![EdgeMap::default(); regions];

    let differs = |r: i64, c: i64, label: i32| -> bool {
        if r < 0 || c < 0 || r as usize >= rows || c as usize >= cols {
            return true;
        }
        labels[r as usize * cols + c as usize] != label
    };

    for r in 0..rows {
        for c in 0..cols {
            let label = labels[r * cols + c];
            if label < 0 {
                continue;
            }
            let (x, y) = (c as i64, r as i64);
            let map = &mut maps[label as usize];
            let (ri, ci) = (r as i64, c as i64);

            if differs(ri - 1, ci, label) {
                push_edge(map, (x, y), (x + 1, y)); // top
            }
            if differs(ri, ci + 1, label) {
                push_edge(map, (x + 1, y), (x + 1, y + 1)); // right
            }
            if differs(ri + 1, ci, label) {
                push_edge(map, (x + 1, y + 1), (x, y + 1)); // bottom
            }
            if differs(ri, ci - 1, label) {
                push_edge(map, (x, y + 1), (x, y)); // left
            }
        }
    }

    maps
}

fn push_edge(map: &mut EdgeMap, from: Vertex, to: Vertex) {
    map.entry(from).or_default().push(to);
}

/// Stitch oriented edges into closed rings. At saddle vertices (two
/// outgoing edges) the walk prefers the sharpest right turn, which keeps
/// diagonally-touching boundaries on separate rings, matching
/// 4-connectivity.
fn trace_rings(mut edges: EdgeMap, total_edges: usize) -> Result<Vec<Vec<Vertex>>> {
    let mut starts: Vec<Vertex> = edges.keys().copied().collect();
    starts.sort_unstable();

    let mut rings = Vec::new();
    for &start in &starts {
        while let Some(first) = take_edge(&mut edges, start, None) {
            let mut ring: Vec<Vertex> = vec![start, first];
            let (mut prev, mut cur) = (start, first);
            let mut steps = 0usize;

            while cur != start {
                steps += 1;
                if steps > total_edges {
                    bail!("boundary tracing failed to close a ring at ({}, {})", cur.0, cur.1);
                }
                let dir = (cur.0 - prev.0, cur.1 - prev.1);
                let next = take_edge(&mut edges, cur, Some(dir))
                    .ok_or_else(|| anyhow!("boundary tracing dead end at ({}, {})", cur.0, cur.1))?;

                // Merge collinear runs as we go.
                if (next.0 - cur.0, next.1 - cur.1) == dir {
                    let last = ring.len() - 1;
                    ring[last] = next;
                } else {
                    ring.push(next);
                }
                prev = cur;
                cur = next;
            }

            // Seam: the closing segment may continue straight through the
            // start vertex into the opening segment.
            if ring.len() > 4 {
                let m = ring.len();
                let d_close = (ring[m - 1].0 - ring[m - 2].0, ring[m - 1].1 - ring[m - 2].1);
                let d_open = (ring[1].0 - ring[0].0, ring[1].1 - ring[0].1);
                if d_close == d_open {
                    ring.pop();
                    ring.remove(0);
                    let first = ring[0];
                    ring.push(first);
                }
            }

            rings.push(ring);
        }
    }

    Ok(rings)
}

/// Remove and return one outgoing edge at `at`. With an incoming
/// direction, preference order is right turn, straight, left turn.
fn take_edge(edges: &mut EdgeMap, at: Vertex, incoming: Option<(i64, i64)>) -> Option<Vertex> {
    let list = edges.get_mut(&at)?;
    let pick = match incoming {
        Some(d) if list.len() > 1 => {
            let prefs = [(d.1, -d.0), d, (-d.1, d.0)];
            prefs
                .iter()
                .find_map(|p| {
                    list.iter().position(|e| (e.0 - at.0, e.1 - at.1) == *p)
                })
                .unwrap_or(0)
        }
        _ => 0,
    };
    let next = list.remove(pick);
    if list.is_empty() {
        edges.remove(&at);
    }
    Some(next)
}

/// Twice the signed area of a closed lattice ring (positive = exterior).
fn signed_area2(ring: &[Vertex]) -> i64 {
    ring.windows(2).map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1).sum()
}

/// Classify rings into shells and holes, attach holes to the shell that
/// contains them, and map lattice coordinates into world coordinates.
fn assemble_region(rings: Vec<Vec<Vertex>>, grid: &RasterGrid) -> Result<MultiPolygon<f64>> {
    let mut shells: Vec<Vec<Vertex>> = Vec::new();
    let mut holes: Vec<Vec<Vertex>> = Vec::new();
    for ring in rings {
        match signed_area2(&ring) {
            a if a > 0 => shells.push(ring),
            a if a < 0 => holes.push(ring),
            _ => {} // zero-area sliver ring, suppressed
        }
    }
    if shells.is_empty() {
        bail!("region produced no exterior ring");
    }

    let to_world = |ring: &[Vertex]| -> LineString<f64> {
        LineString(
            ring.iter()
                .map(|&(x, y)| {
                    let (wx, wy) = grid.transform().apply(x as f64, y as f64);
                    Coord { x: wx, y: wy }
                })
                .collect(),
        )
    };

    if shells.len() == 1 {
        let exterior = to_world(&shells[0]);
        let interiors = holes.iter().map(|h| to_world(h)).collect();
        return Ok(MultiPolygon(vec![Polygon::new(exterior, interiors)]));
    }

    // Rare multi-shell fallback: resolve hole ownership by sampling a
    // point just inside the region from the hole's first edge, in lattice
    // space where containment is unambiguous.
    let lattice_shells: Vec<Polygon<f64>> = shells
        .iter()
        .map(|s| {
            Polygon::new(
                LineString(s.iter().map(|&(x, y)| Coord { x: x as f64, y: y as f64 }).collect()),
                vec![],
            )
        })
        .collect();

    let mut grouped: Vec<Vec<LineString<f64>>> = vec![Vec::new(); shells.len()];
    for hole in &holes {
        let (a, b) = (hole[0], hole[1]);
        let d = ((b.0 - a.0) as f64, (b.1 - a.1) as f64);
        let mid = ((a.0 + b.0) as f64 / 2.0, (a.1 + b.1) as f64 / 2.0);
        let sample = Point::new(mid.0 - 0.5 * d.1, mid.1 + 0.5 * d.0);
        let owner = lattice_shells
            .iter()
            .position(|s| s.contains(&sample))
            .ok_or_else(|| anyhow!("hole ring without a containing shell"))?;
        grouped[owner].push(to_world(hole));
    }

    Ok(MultiPolygon(
        shells
            .iter()
            .zip(grouped)
            .map(|(shell, interiors)| Polygon::new(to_world(shell), interiors))
            .collect(),
    ))
}
