// flow/src/pipeline/execution.rs

//! `Pipeline::run`.

use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::core::handler::Handler;
use crate::core::step::StepDef;
use crate::error::FlowError;
use crate::pipeline::definition::Pipeline;
use tracing::{event, instrument, span, Instrument, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Runs every step in declaration order against `ctx_data`.
  ///
  /// A step whose skip condition holds is passed over. A non-optional step
  /// without any handler fails the run with `FlowError::HandlerMissing`.
  /// The first handler error aborts the run and is returned as-is; the first
  /// `PipelineControl::Stop` ends it with `PipelineResult::Stopped`.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(
      context_type = %std::any::type_name::<TData>(),
      num_steps = self.steps.len(),
    ),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    event!(Level::DEBUG, "Pipeline run starting.");

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_span = span!(
        Level::INFO,
        "pipeline_step",
        step_name = step_def.name.as_str(),
        step_index = step_idx,
        optional = step_def.optional
      );
      if let Some(result) = self.run_step(step_def, &ctx_data).instrument(step_span).await? {
        return Ok(result);
      }
    }

    event!(Level::DEBUG, "Pipeline run completed.");
    Ok(PipelineResult::Completed)
  }

  /// `Ok(Some(_))` ends the run early.
  async fn run_step(
    &self,
    step_def: &StepDef<TData>,
    ctx_data: &ContextData<TData>,
  ) -> Result<Option<PipelineResult>, Err> {
    let step_name = step_def.name.as_str();

    if let Some(skip) = &step_def.skip_if {
      if skip(ctx_data.clone()) {
        event!(Level::DEBUG, "Step skipped by its skip condition.");
        return Ok(None);
      }
    }

    let phases = [("before", &self.before), ("on", &self.on), ("after", &self.after)];
    let has_any = phases
      .iter()
      .any(|(_, phase)| phase.get(step_name).map_or(false, |v| !v.is_empty()));
    if !has_any {
      if step_def.optional {
        event!(Level::DEBUG, "Optional step has no handlers; passing over it.");
        return Ok(None);
      }
      event!(Level::ERROR, "Non-optional step has no handlers.");
      return Err(Err::from(FlowError::HandlerMissing {
        step_name: step_def.name.clone(),
      }));
    }

    for (phase_name, phase) in phases {
      if let Some(handlers) = phase.get(step_name) {
        if let Some(stopped) = run_phase(phase_name, handlers, ctx_data).await? {
          return Ok(Some(stopped));
        }
      }
    }
    event!(Level::DEBUG, "Step finished.");
    Ok(None)
  }
}

/// Runs one phase's handlers in registration order. `Some(Stopped)` means a
/// handler asked to halt the whole run.
async fn run_phase<TData, Err>(
  phase_name: &'static str,
  handlers: &[Handler<TData, Err>],
  ctx_data: &ContextData<TData>,
) -> Result<Option<PipelineResult>, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + Send + Sync + 'static,
{
  for (handler_idx, handler) in handlers.iter().enumerate() {
    let handler_span = span!(Level::DEBUG, "step_handler", phase = phase_name, handler_index = handler_idx);
    match handler(ctx_data.clone()).instrument(handler_span).await {
      Ok(PipelineControl::Continue) => {}
      Ok(PipelineControl::Stop) => {
        event!(Level::INFO, phase = phase_name, "Pipeline stopped by a handler.");
        return Ok(Some(PipelineResult::Stopped));
      }
      Err(e) => {
        event!(Level::ERROR, phase = phase_name, error = %e, "Handler failed.");
        return Err(e);
      }
    }
  }
  Ok(None)
}
