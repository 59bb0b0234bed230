use anyhow::Result;
use tracing::debug;

use crate::error::Error;
use crate::overlay::aggregate::{AggregateSchema, AggregatedRow};

/// Percentile `p` in [0, 100] with linear interpolation between closest
/// ranks (the numpy definition). Returns `None` for an empty sample.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let t = rank - lo as f64;
    Some(sorted[lo] * (1.0 - t) + sorted[hi] * t)
}

/// Flag rows whose designated weighted attribute reaches the `pct`
/// percentile of its non-null population AND whose raster value is one of
/// the accepted categories. Rows with a null value are never highlighted.
///
/// Operates purely on the aggregated table: re-running with different
/// parameters never touches the overlay or aggregation stages, and
/// re-running with identical parameters is idempotent.
pub fn classify(
    rows: &mut [AggregatedRow],
    schema: &AggregateSchema,
    attribute: &str,
    pct: f64,
    accepted: &[f64],
) -> Result<()> {
    let col = schema
        .weighted_position(attribute)
        .ok_or_else(|| Error::MissingAttribute(attribute.to_string()))?;

    let values: Vec<f64> = rows.iter().filter_map(|row| row.weighted[col]).collect();
    let threshold = percentile(&values, pct);

    for row in rows.iter_mut() {
        row.highlight = match (row.weighted[col], threshold) {
            (Some(value), Some(threshold)) => {
                value >= threshold && accepted.contains(&row.raster_value)
            }
            _ => false,
        };
    }

    debug!(
        attribute,
        pct,
        threshold = ?threshold,
        highlighted = rows.iter().filter(|r| r.highlight).count(),
        "classification complete"
    );
    Ok(())
}
