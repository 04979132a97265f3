// flow/src/lib.rs

//! A small async pipeline engine.
//!
//! A `Pipeline<T, E>` is an ordered list of named steps run over a shared
//! `ContextData<T>`. Each step carries `before`, `on` and `after` handlers;
//! any handler can stop the run early or fail it with `E`. A step can also be
//! turned into a branch that runs one of several sub-pipelines over a context
//! extracted from the parent. `FlowRegistry` keeps one pipeline per context
//! type so callers only need the context to start a run.

pub mod branch;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::branch::BranchBuilder;
pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::handler::{Handler, HandlerFuture};
pub use crate::core::step::{SkipCondition, StepDef};
pub use crate::error::{FlowError, FlowResult};
pub use crate::pipeline::Pipeline;
pub use crate::registry::FlowRegistry;
