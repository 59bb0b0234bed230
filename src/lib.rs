#![doc = "Heatgrid public API: vector-raster overlay and area-weighted aggregation"]
mod classify;
mod compose;
mod crs;
mod error;
mod layer;
mod overlay;
mod pipeline;
mod raster;
mod types;

pub mod cli;
pub mod commands;
pub mod io;
pub mod logging;

#[doc(inline)]
pub use types::{AttrKind, AttrValue, Field, Schema};

#[doc(inline)]
pub use error::Error;

#[doc(inline)]
pub use crs::{normalize_pair, Crs};

#[doc(inline)]
pub use layer::Layer;

#[doc(inline)]
pub use raster::{polygonize, AffineTransform, RasterGrid, RASTER_VALUE};

#[doc(inline)]
pub use overlay::{intersect_layers, Fragment};

#[doc(inline)]
pub use overlay::aggregate::{aggregate, AggregateSchema, AggregatedRow};

#[doc(inline)]
pub use classify::{classify, percentile};

#[doc(inline)]
pub use compose::{compose, composed_schema, HIGHLIGHT};

#[doc(inline)]
pub use pipeline::{run_pipeline, PipelineParams};
