use thiserror::Error;

/// Failure modes of the overlay pipeline.
///
/// `DegenerateGeometry` is recovered locally: the offending feature is
/// excluded from overlay and logged, never silently included. The other
/// kinds abort the run.
#[derive(Debug, Error)]
pub enum Error {
    /// Input layers cannot be reconciled to one area-preserving CRS.
    #[error("CRS mismatch: cannot reconcile EPSG:{left} and EPSG:{right} to a common area-preserving target")]
    CrsMismatch { left: u32, right: u32 },

    /// The attribute designated for weighting/thresholding is absent from
    /// the zone layer.
    #[error("missing numeric attribute `{0}` in zone layer")]
    MissingAttribute(String),

    /// A fragment group summed to zero area; weights would divide by zero.
    /// Guarded so the aggregator never emits NaN silently.
    #[error("aggregation invariant violated: zero total intersection area for cell {cell}")]
    AggregationInvariantViolation { cell: usize },

    /// Input polygon unusable for overlay (empty or zero-area).
    #[error("degenerate geometry at feature {index}: {reason}")]
    DegenerateGeometry { index: usize, reason: &'static str },
}
