pub mod collect;
pub mod contract;
pub mod source;
pub mod static_source;

pub use collect::*;
pub use contract::*;
pub use source::*;
pub use static_source::*;
