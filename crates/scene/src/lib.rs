pub mod camera;
pub mod components;
pub mod lod;

pub use camera::*;
pub use lod::*;
