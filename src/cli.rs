use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

/// Heat-risk overlay CLI (argument schema only)
#[derive(Parser, Debug)]
#[command(name = "heatgrid", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Overlay daily raster grids onto the zone layer and write one
    /// composed Parquet table per day
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Daily raster grid artifacts, one per day
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    pub rasters: Vec<PathBuf>,

    /// Zone boundary shapefile (.shp)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub zones: PathBuf,

    /// CSV of zone attributes to join onto the boundaries
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub attributes: Option<PathBuf>,

    /// Join key column in the zone shapefile
    #[arg(long, default_value = "ZCTA5CE20")]
    pub zone_key: String,

    /// Join key column in the attribute CSV
    #[arg(long, default_value = "ZCTA")]
    pub table_key: String,

    /// EPSG code of the zone shapefile's CRS
    #[arg(long, default_value_t = 4326)]
    pub zones_epsg: u32,

    /// Numeric zone attribute used for percentile thresholding
    #[arg(long)]
    pub attribute: Option<String>,

    /// Percentile cutoff in [0, 100]
    #[arg(long)]
    pub percentile: Option<f64>,

    /// Raster categories eligible for highlighting (repeatable)
    #[arg(long)]
    pub accepted: Vec<f64>,

    /// JSON file of pipeline parameters; flags above override it
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Output directory for composed Parquet tables
    #[arg(short, long, value_hint = ValueHint::DirPath)]
    pub output: PathBuf,
}
