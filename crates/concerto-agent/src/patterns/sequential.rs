use concerto_core::message::Message;
use concerto_core::pattern::{PatternKind, Step};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::RuntimeContext;
use crate::error::{FlowError, FlowResult};

/// Run steps left to right, feeding each output into the next step.
///
/// The first failing step aborts the pipeline unless it is marked
/// best-effort, in which case its input is passed on unchanged.
pub(super) async fn run(
    ctx: &RuntimeContext,
    steps: &[Step],
    input: Message,
    cancel: &CancellationToken,
) -> FlowResult<Message> {
    let mut current = input;
    for (idx, step) in steps.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(FlowError::Cancelled);
        }
        debug!(
            stage = idx,
            target = %step.target,
            input_len = current.content().len(),
            "Executing pipeline stage"
        );
        match ctx.run_target(&step.target, current.as_input(), cancel).await {
            Ok(output) => current = output,
            Err(FlowError::Cancelled) => return Err(FlowError::Cancelled),
            Err(e) if step.best_effort => {
                warn!(
                    stage = idx,
                    target = %step.target,
                    error = %e,
                    "Best-effort stage failed, passing its input through"
                );
            }
            Err(e) => return Err(FlowError::step(PatternKind::Sequential, step.target.label(), e)),
        }
    }
    info!(stages = steps.len(), "Pipeline completed");
    Ok(current)
}
