pub mod channel;
pub mod config;
pub mod pending;
pub mod transport;

pub use channel::*;
pub use config::*;
pub use pending::*;
pub use transport::*;
