pub mod raster;
pub mod service;

pub use raster::*;
pub use service::*;
