//! Configuration sections, one per pipeline stage

pub mod batch;
pub mod build;
pub mod extraction;
pub mod query;

pub use batch::*;
pub use build::*;
pub use extraction::*;
pub use query::*;
