//! The pattern engine.
//!
//! Each pattern kind lives in its own module:
//! - **sequential**: output of one step becomes the input of the next
//! - **parallel**: fan out to named tasks and collect ordered results
//! - **router**: a discriminator picks which candidate handles the input
//! - **discussion**: participants take turns on a shared transcript

mod discussion;
mod parallel;
mod router;
mod sequential;

pub use parallel::{TaskOutcome, TaskResults};
pub use router::select_route;

use concerto_core::message::Message;
use concerto_core::pattern::Pattern;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::context::RuntimeContext;
use crate::error::FlowResult;

/// Run `pattern` on `input`.
pub(crate) fn run_pattern<'a>(
    ctx: &'a RuntimeContext,
    pattern: &'a Pattern,
    input: Message,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, FlowResult<Message>> {
    Box::pin(async move {
        match pattern {
            Pattern::Sequential { steps } => sequential::run(ctx, steps.as_slice(), input, cancel).await,
            Pattern::Parallel {
                tasks,
                synthesis,
                max_in_flight,
            } => {
                let limit = max_in_flight.or(ctx.settings().max_in_flight);
                parallel::run(ctx, tasks.as_slice(), synthesis.as_ref(), limit, input, cancel).await
            }
            Pattern::Router {
                discriminator,
                candidates,
                fallback,
            } => router::run(ctx, discriminator, candidates.as_slice(), fallback, input, cancel).await,
            Pattern::Discussion {
                participants,
                moderator,
                max_rounds,
                termination,
            } => {
                let discussion = discussion::Discussion {
                    participants: participants.as_slice(),
                    moderator: moderator.as_ref(),
                    max_rounds: *max_rounds,
                    termination,
                };
                discussion.run(ctx, input, cancel).await
            }
        }
    })
}
