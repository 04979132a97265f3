// flow/src/branch/builder.rs

//! Fluent wiring of a branch step:
//!
//! ```ignore
//! pipeline
//!   .branch_step("route")
//!   .when("card", |ctx| ctx.read().kind == Kind::Card, card_pipeline, |ctx| Ok(ctx.read().card.clone()))
//!   .when("cash", |ctx| ctx.read().kind == Kind::Cash, cash_pipeline, |ctx| Ok(ctx.read().cash.clone()))
//!   .otherwise_fail()
//!   .finish(false);
//! ```
//!
//! Arms are tried in the order they were added; the first matching arm runs
//! and no other.

use crate::branch::arm::{AnyArm, Arm};
use crate::core::context_data::ContextData;
use crate::core::control::PipelineControl;
use crate::core::handler::Handler;
use crate::error::FlowError;
use crate::pipeline::Pipeline;
use std::sync::Arc;
use tracing::{event, Level};

#[derive(Debug, Clone, Copy)]
enum NoMatch {
  Control(PipelineControl),
  Fail,
}

pub struct BranchBuilder<'p, TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pipeline: &'p mut Pipeline<TData, Err>,
  step_name: String,
  arms: Vec<Arc<dyn AnyArm<TData, Err>>>,
  no_match: NoMatch,
}

impl<'p, TData, Err> BranchBuilder<'p, TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) fn new(pipeline: &'p mut Pipeline<TData, Err>, step_name: String) -> Self {
    Self {
      pipeline,
      step_name,
      arms: Vec::new(),
      no_match: NoMatch::Control(PipelineControl::Continue),
    }
  }

  /// Adds an arm: when `condition` holds, `extractor` builds the arm's context
  /// and `sub_pipeline` runs over it.
  pub fn when<SData>(
    mut self,
    label: &str,
    condition: impl Fn(ContextData<TData>) -> bool + Send + Sync + 'static,
    sub_pipeline: Arc<Pipeline<SData, Err>>,
    extractor: impl Fn(ContextData<TData>) -> Result<ContextData<SData>, FlowError> + Send + Sync + 'static,
  ) -> Self
  where
    SData: 'static + Send + Sync,
  {
    self.arms.push(Arc::new(Arm {
      label: label.to_string(),
      condition: Arc::new(condition),
      extractor: Arc::new(extractor),
      pipeline: sub_pipeline,
    }));
    self
  }

  /// Control returned when no arm matches. Defaults to `Continue`.
  pub fn otherwise(mut self, control: PipelineControl) -> Self {
    self.no_match = NoMatch::Control(control);
    self
  }

  /// Fail the run with `FlowError::NoBranchMatched` when no arm matches.
  pub fn otherwise_fail(mut self) -> Self {
    self.no_match = NoMatch::Fail;
    self
  }

  /// Installs the branch as the step's `on` handler.
  pub fn finish(self, optional: bool) {
    let arms = Arc::new(self.arms);
    let no_match = self.no_match;
    let step_name = self.step_name.clone();

    let handler: Handler<TData, Err> = Box::new(move |ctx_data: ContextData<TData>| {
      let arms = arms.clone();
      let step_name = step_name.clone();
      Box::pin(async move {
        for arm in arms.iter() {
          if arm.matches(ctx_data.clone()) {
            event!(Level::DEBUG, step_name = %step_name, arm = arm.label(), "Branch arm selected.");
            return arm.run(&step_name, ctx_data).await;
          }
        }
        event!(Level::DEBUG, step_name = %step_name, "No branch arm matched.");
        match no_match {
          NoMatch::Control(control) => Ok(control),
          NoMatch::Fail => Err(Err::from(FlowError::NoBranchMatched { step_name })),
        }
      })
    });

    self.pipeline.set_optional(&self.step_name, optional);
    self.pipeline.push_boxed_on_handler(&self.step_name, handler);
  }
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Turns a declared step into a branch over sub-pipelines.
  pub fn branch_step(&mut self, step_name: &str) -> BranchBuilder<'_, TData, Err> {
    self.ensure_step_exists(step_name);
    BranchBuilder::new(self, step_name.to_string())
  }
}
