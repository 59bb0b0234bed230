pub mod raster;
pub mod sink;
pub mod zones;
