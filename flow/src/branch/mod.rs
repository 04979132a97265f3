// flow/src/branch/mod.rs

//! Branch steps: pick one of several sub-pipelines based on the parent
//! context, run it over its own extracted context, and map its outcome back
//! onto the parent run.

pub mod arm;
pub mod builder;

pub use builder::BranchBuilder;
