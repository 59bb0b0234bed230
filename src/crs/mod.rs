mod normalize;

pub use normalize::normalize_pair;

use anyhow::{anyhow, Context, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::{proj::Proj as Proj4, transform::transform};

/// Coordinate reference systems the pipeline moves between.
///
/// `Other` carries an EPSG code we have no projection definition for;
/// layers in such a CRS cannot be reprojected into the equal-area CRS
/// and are never accepted for overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// EPSG:4326, lon/lat degrees. Display CRS for all outputs.
    Wgs84,
    /// EPSG:3857, spherical-mercator meters. Source CRS of the daily rasters.
    WebMercator,
    /// EPSG:5070, CONUS Albers equal-area meters. The only CRS area math
    /// is allowed in.
    ConusAlbers,
    /// Unrecognized EPSG code.
    Other(u32),
}

impl Crs {
    pub fn from_epsg(code: u32) -> Self {
        match code {
            4326 => Crs::Wgs84,
            3857 => Crs::WebMercator,
            5070 => Crs::ConusAlbers,
            other => Crs::Other(other),
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::ConusAlbers => 5070,
            Crs::Other(code) => *code,
        }
    }

    /// Degree-based CRS: area and intersection math on it is disallowed.
    #[inline]
    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }

    /// True for the one CRS whose areas are physically meaningful.
    #[inline]
    pub fn is_area_preserving(&self) -> bool {
        matches!(self, Crs::ConusAlbers)
    }

    fn proj4(&self) -> Option<&'static str> {
        match self {
            Crs::Wgs84 => Some("+proj=longlat +datum=WGS84 +no_defs +type=crs"),
            Crs::WebMercator => Some(
                "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +nadgrids=@null +no_defs +type=crs",
            ),
            Crs::ConusAlbers => Some(
                "+proj=aea +lat_0=23 +lon_0=-96 +lat_1=29.5 +lat_2=45.5 +x_0=0 +y_0=0 +datum=NAD83 +units=m +no_defs +type=crs",
            ),
            Crs::Other(_) => None,
        }
    }
}

/// Reproject shapes between two known CRSs.
///
/// Angular coordinates cross the proj boundary in radians; degree
/// conversion happens here so callers only ever see degrees or meters.
pub fn reproject(shapes: &[MultiPolygon<f64>], from: Crs, to: Crs) -> Result<Vec<MultiPolygon<f64>>> {
    if from == to {
        return Ok(shapes.to_vec());
    }

    let src = {
        let proj_string = from
            .proj4()
            .ok_or_else(|| anyhow!("no projection definition for EPSG:{}", from.epsg()))?;
        Proj4::from_proj_string(proj_string)
            .with_context(|| anyhow!("failed to build source PROJ.4: {proj_string}"))?
    };

    let dst = {
        let proj_string = to
            .proj4()
            .ok_or_else(|| anyhow!("no projection definition for EPSG:{}", to.epsg()))?;
        Proj4::from_proj_string(proj_string)
            .with_context(|| anyhow!("failed to build target PROJ.4: {proj_string}"))?
    };

    shapes
        .iter()
        .map(|shape| {
            shape.try_map_coords(|coord: Coord<f64>| -> Result<Coord<f64>> {
                let mut point = if from.is_geographic() {
                    (coord.x.to_radians(), coord.y.to_radians(), 0.0)
                } else {
                    (coord.x, coord.y, 0.0)
                };
                transform(&src, &dst, &mut point)?;
                let coord = if to.is_geographic() {
                    Coord { x: point.0.to_degrees(), y: point.1.to_degrees() }
                } else {
                    Coord { x: point.0, y: point.1 }
                };
                Ok(coord)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn unit_square_at(x: f64, y: f64) -> MultiPolygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + 1.0, y: y),
            (x: x + 1.0, y: y + 1.0),
            (x: x, y: y + 1.0),
            (x: x, y: y),
        ]
        .into()
    }

    #[test]
    fn identity_reprojection_is_exact() {
        let shapes = vec![unit_square_at(0.0, 0.0)];
        let out = reproject(&shapes, Crs::ConusAlbers, Crs::ConusAlbers).unwrap();
        assert_eq!(out, shapes);
    }

    #[test]
    fn albers_round_trip_is_close() {
        // A small square in the middle of CONUS, in lon/lat degrees.
        let shapes = vec![unit_square_at(-98.0, 39.0)];
        let projected = reproject(&shapes, Crs::Wgs84, Crs::ConusAlbers).unwrap();
        let back = reproject(&projected, Crs::ConusAlbers, Crs::Wgs84).unwrap();

        let orig = &shapes[0].0[0];
        let round = &back[0].0[0];
        for (a, b) in orig.exterior().coords().zip(round.exterior().coords()) {
            assert!((a.x - b.x).abs() < 1e-6, "{} vs {}", a.x, b.x);
            assert!((a.y - b.y).abs() < 1e-6, "{} vs {}", a.y, b.y);
        }
    }

    #[test]
    fn unknown_crs_cannot_be_reprojected() {
        let shapes = vec![unit_square_at(0.0, 0.0)];
        assert!(reproject(&shapes, Crs::Other(27700), Crs::Wgs84).is_err());
    }

    #[test]
    fn epsg_codes_round_trip() {
        for code in [4326, 3857, 5070, 27700] {
            assert_eq!(Crs::from_epsg(code).epsg(), code);
        }
    }
}
