pub mod protocol;
pub mod registry;
pub mod tile;

pub use protocol::*;
pub use registry::*;
pub use tile::*;
