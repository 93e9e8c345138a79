pub mod catalog;
pub mod source;
pub mod wire;

pub use source::{PrometheusOptions, PrometheusSource};
