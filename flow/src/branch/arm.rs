// flow/src/branch/arm.rs

//! One arm of a branch step: a condition on the parent context, an extractor
//! producing the arm's own context, and the sub-pipeline run over it.

use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::error::FlowError;
use crate::pipeline::Pipeline;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{event, instrument, Level};

pub(crate) type Condition<TData> = Arc<dyn Fn(ContextData<TData>) -> bool + Send + Sync + 'static>;
pub(crate) type Extractor<TData, SData> =
  Arc<dyn Fn(ContextData<TData>) -> Result<ContextData<SData>, FlowError> + Send + Sync + 'static>;

/// Arms of different sub-context types stored side by side.
#[async_trait]
pub(crate) trait AnyArm<TData, Err>: Send + Sync
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn label(&self) -> &str;

  fn matches(&self, parent: ContextData<TData>) -> bool;

  async fn run(&self, step_name: &str, parent: ContextData<TData>) -> Result<PipelineControl, Err>;
}

pub(crate) struct Arm<TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) label: String,
  pub(crate) condition: Condition<TData>,
  pub(crate) extractor: Extractor<TData, SData>,
  pub(crate) pipeline: Arc<Pipeline<SData, Err>>,
}

#[async_trait]
impl<TData, SData, Err> AnyArm<TData, Err> for Arm<TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn label(&self) -> &str {
    &self.label
  }

  fn matches(&self, parent: ContextData<TData>) -> bool {
    (self.condition)(parent)
  }

  #[instrument(
    name = "branch_arm",
    skip(self, parent),
    fields(arm = %self.label, sub_context_type = %std::any::type_name::<SData>()),
    err(Display)
  )]
  async fn run(&self, step_name: &str, parent: ContextData<TData>) -> Result<PipelineControl, Err> {
    let sub_ctx = (self.extractor)(parent).map_err(|e| {
      event!(Level::ERROR, error = %e, "Extractor failed.");
      let source = match e {
        FlowError::ExtractorFailure { source, .. } | FlowError::HandlerError { source } => source,
        other => anyhow::Error::new(other),
      };
      Err::from(FlowError::ExtractorFailure {
        step_name: step_name.to_string(),
        source,
      })
    })?;

    match self.pipeline.run(sub_ctx).await? {
      PipelineResult::Completed => Ok(PipelineControl::Continue),
      PipelineResult::Stopped => {
        event!(Level::INFO, "Arm sub-pipeline stopped; stopping the parent run.");
        Ok(PipelineControl::Stop)
      }
    }
  }
}
