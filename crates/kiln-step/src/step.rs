use crate::context::StepContext;
use crate::error::StepError;

/// The work of a build step.
///
/// Implementations are blocking, synchronous units of work. They read the
/// items they consume and write the items they produce through the
/// [`StepContext`]; they must not share mutable state with other steps.
pub trait BuildStep: Send + Sync {
  fn execute(&self, ctx: &mut StepContext) -> Result<(), StepError>;
}

/// A [`BuildStep`] backed by a closure.
pub struct FnStep<F>(F);

impl<F> BuildStep for FnStep<F>
where
  F: Fn(&mut StepContext) -> Result<(), StepError> + Send + Sync,
{
  fn execute(&self, ctx: &mut StepContext) -> Result<(), StepError> {
    (self.0)(ctx)
  }
}

/// Wrap a closure as a [`BuildStep`].
///
/// ```ignore
/// let step = kiln_step::from_fn(|ctx| {
///   let config = ctx.get(&config_item)?;
///   ctx.produce(&jar_item, serde_json::json!({ "path": "app.jar" }))?;
///   Ok(())
/// });
/// ```
pub fn from_fn<F>(f: F) -> FnStep<F>
where
  F: Fn(&mut StepContext) -> Result<(), StepError> + Send + Sync,
{
  FnStep(f)
}
