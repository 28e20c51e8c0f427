pub mod ellipsoid;
pub mod geodesy;
pub mod projection;
pub mod vec;

pub use ellipsoid::*;
pub use geodesy::*;
pub use projection::*;
pub use vec::*;
