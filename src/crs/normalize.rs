use anyhow::Result;
use tracing::debug;

use crate::error::Error;
use crate::layer::Layer;

use super::Crs;

/// Bring two layers into one CRS fit for area computation.
///
/// Policy: anything not already in the equal-area CRS (EPSG:5070) gets
/// reprojected into it, geographic inputs included. Degree-based area is
/// not physically meaningful, so overlay on unprojected layers is never
/// allowed through. Layers in a CRS we have no projection definition for
/// cannot be reconciled and fail fast with `CrsMismatch`.
pub fn normalize_pair(a: &Layer, b: &Layer) -> Result<(Layer, Layer)> {
    if a.crs() == b.crs() && a.crs().is_area_preserving() {
        return Ok((a.clone(), b.clone()));
    }

    if matches!(a.crs(), Crs::Other(_)) || matches!(b.crs(), Crs::Other(_)) {
        return Err(Error::CrsMismatch { left: a.crs().epsg(), right: b.crs().epsg() }.into());
    }

    debug!(
        from_a = a.crs().epsg(),
        from_b = b.crs().epsg(),
        to = Crs::ConusAlbers.epsg(),
        "normalizing layer pair to equal-area CRS"
    );

    Ok((a.reproject(Crs::ConusAlbers)?, b.reproject(Crs::ConusAlbers)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Schema;

    #[test]
    fn equal_area_pair_passes_through() {
        let a = Layer::new(Crs::ConusAlbers, Schema::default());
        let b = Layer::new(Crs::ConusAlbers, Schema::default());
        let (a2, b2) = normalize_pair(&a, &b).unwrap();
        assert_eq!(a2.crs(), Crs::ConusAlbers);
        assert_eq!(b2.crs(), Crs::ConusAlbers);
    }

    #[test]
    fn geographic_pair_is_projected() {
        let a = Layer::new(Crs::Wgs84, Schema::default());
        let b = Layer::new(Crs::Wgs84, Schema::default());
        let (a2, b2) = normalize_pair(&a, &b).unwrap();
        assert_eq!(a2.crs(), Crs::ConusAlbers);
        assert_eq!(b2.crs(), Crs::ConusAlbers);
    }

    #[test]
    fn unknown_crs_is_a_mismatch() {
        let a = Layer::new(Crs::Wgs84, Schema::default());
        let b = Layer::new(Crs::Other(27700), Schema::default());
        let err = normalize_pair(&a, &b).unwrap_err();
        assert!(err.downcast_ref::<Error>().is_some());
        assert!(err.to_string().contains("CRS mismatch"));
    }
}
