pub mod gradient;
pub mod heatmap;
pub mod layer;

pub use gradient::*;
pub use heatmap::*;
pub use layer::*;
