pub mod faults;
pub mod model;
pub mod normalize;
pub mod reconcile;
pub mod registry;
pub mod staleness;
pub mod types;

pub use faults::*;
pub use model::*;
pub use normalize::*;
pub use reconcile::*;
pub use registry::*;
pub use staleness::*;
pub use types::*;
