use concerto_core::message::Message;
use concerto_core::pattern::{PatternKind, StepRef};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::context::RuntimeContext;
use crate::error::{FlowError, FlowResult};

/// Pick the candidate named by a discriminator's output.
///
/// The trimmed output must be exactly a candidate name, or end with a line
/// holding nothing but one. Mentions inside prose, near misses (`"A."`,
/// `"a"`) and answers naming several candidates select nothing.
///
/// ```rust
/// use concerto_agent::patterns::select_route;
/// use concerto_core::{AgentName, StepRef};
///
/// let candidates = [
///     StepRef::agent(AgentName::parse("Billing").unwrap()),
///     StepRef::agent(AgentName::parse("Support").unwrap()),
/// ];
/// assert_eq!(select_route("Billing", &candidates), Some(&candidates[0]));
/// assert_eq!(select_route("Refund request.\nSupport", &candidates), Some(&candidates[1]));
/// assert_eq!(select_route("route this to Support please", &candidates), None);
/// assert_eq!(select_route("Billing or Support", &candidates), None);
/// ```
pub fn select_route<'a>(decision: &str, candidates: &'a [StepRef]) -> Option<&'a StepRef> {
    let decision = decision.trim();
    let matching = |token: &str| candidates.iter().find(|c| c.name() == Some(token));

    matching(decision).or_else(|| {
        let last_line = decision.lines().last()?.trim();
        matching(last_line)
    })
}

/// Ask the discriminator once, then forward the original input to the
/// chosen candidate or to the fallback.
pub(super) async fn run(
    ctx: &RuntimeContext,
    discriminator: &StepRef,
    candidates: &[StepRef],
    fallback: &StepRef,
    input: Message,
    cancel: &CancellationToken,
) -> FlowResult<Message> {
    let decision = ctx
        .run_target(discriminator, input.as_input(), cancel)
        .await
        .map_err(|e| FlowError::step(PatternKind::Router, discriminator.label(), e))?;

    let target = match select_route(decision.content(), candidates) {
        Some(candidate) => candidate,
        None => {
            info!(
                decision = %decision.content().trim(),
                fallback = %fallback,
                "No candidate matched, using fallback"
            );
            fallback
        }
    };
    info!(target = %target, "Routing input");

    ctx.run_target(target, input.as_input(), cancel)
        .await
        .map_err(|e| FlowError::step(PatternKind::Router, target.label(), e))
}
