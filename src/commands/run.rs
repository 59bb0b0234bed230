use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{error, info};

use crate::cli::RunArgs;
use crate::io::raster::read_raster;
use crate::io::sink::write_layer_parquet;
use crate::io::zones::{join_attributes, read_attribute_table, read_zone_shapefile};
use crate::pipeline::{run_pipeline, PipelineParams};

/// Resolve the run parameters: defaults, then the optional JSON config,
/// then any explicit flags on top.
fn resolve_params(args: &RunArgs) -> Result<PipelineParams> {
    let mut params = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid config: {}", path.display()))?
        }
        None => PipelineParams::default(),
    };
    if let Some(attribute) = &args.attribute {
        params.attribute = attribute.clone();
    }
    if let Some(percentile) = args.percentile {
        params.percentile = percentile;
    }
    if !args.accepted.is_empty() {
        params.accepted = args.accepted.clone();
    }
    if !(0.0..=100.0).contains(&params.percentile) {
        bail!("percentile {} is outside [0, 100]", params.percentile);
    }
    Ok(params)
}

fn output_name(raster_path: &Path) -> String {
    let stem = raster_path.file_stem().and_then(|s| s.to_str()).unwrap_or("day");
    format!("{stem}.parquet")
}

pub fn run(cli: &crate::cli::Cli, args: &RunArgs) -> Result<()> {
    let params = resolve_params(args)?;

    let zones = read_zone_shapefile(&args.zones, args.zones_epsg)?;
    let zones = match &args.attributes {
        Some(path) => {
            let table = read_attribute_table(path)?;
            join_attributes(&zones, &table, &args.zone_key, &args.table_key)?
        }
        None => zones,
    };
    if zones.is_empty() {
        bail!("zone layer {} has no polygon features", args.zones.display());
    }

    fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create output dir: {}", args.output.display()))?;

    if cli.verbose > 0 {
        eprintln!("[run] {} rasters, {} zones -> {}", args.rasters.len(), zones.len(), args.output.display());
    }

    // Days are independent; one bad day must not sink the rest of the batch.
    let mut failures = 0usize;
    for raster_path in &args.rasters {
        let day = || raster_path.display().to_string();
        let result = read_raster(raster_path)
            .and_then(|raster| run_pipeline(&raster, &zones, &params))
            .and_then(|composed| {
                let out = args.output.join(output_name(raster_path));
                write_layer_parquet(&composed, &out)?;
                info!(raster = %day(), output = %out.display(), cells = composed.len(), "day composed");
                Ok(())
            });
        if let Err(err) = result {
            error!(raster = %day(), error = %format!("{err:#}"), "day failed");
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} of {} days failed", args.rasters.len());
    }
    Ok(())
}
