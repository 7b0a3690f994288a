// Arena Core Library

pub mod compare;
pub mod credentials;
pub mod model;

pub use compare::{ComparisonOrchestrator, ComparisonOutput, ComparisonStream, CompareError};
