pub mod endpoint;
pub mod error;
pub mod layer;
pub mod network;
pub mod ops;
pub mod shape;
pub mod source;
pub mod stats;

pub use endpoint::*;
pub use error::*;
pub use layer::*;
pub use network::*;
pub use ops::*;
pub use shape::*;
pub use source::*;
pub use stats::*;
