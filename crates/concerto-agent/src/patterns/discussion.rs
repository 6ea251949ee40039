use std::sync::Arc;

use concerto_core::identifiers::AgentName;
use concerto_core::message::Message;
use concerto_core::pattern::{PatternKind, Termination};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::context::RuntimeContext;
use crate::error::{FlowError, FlowResult};
use crate::executor::{AgentExecution, CallChain};

/// A round-based multi-agent discussion.
pub(super) struct Discussion<'a> {
    pub participants: &'a [AgentName],
    pub moderator: Option<&'a AgentName>,
    pub max_rounds: u32,
    pub termination: &'a Termination,
}

struct Turn {
    speaker: AgentName,
    text: String,
}

impl Discussion<'_> {
    pub(super) async fn run(
        &self,
        ctx: &RuntimeContext,
        input: Message,
        cancel: &CancellationToken,
    ) -> FlowResult<Message> {
        let topic = input.content().to_string();
        let mut transcript: Vec<Turn> = Vec::new();
        let mut rounds = 0;
        let mut consensus = false;

        info!(
            participants = self.participants.len(),
            max_rounds = self.max_rounds,
            "Discussion started"
        );
        for round in 1..=self.max_rounds {
            for participant in self.participants {
                let prompt = self.turn_prompt(&topic, &transcript, round, participant);
                let reply = ask(ctx, participant, prompt, cancel).await?;
                debug!(round, speaker = %participant, "Discussion turn finished");
                transcript.push(Turn {
                    speaker: participant.clone(),
                    text: reply.into_content(),
                });
            }
            rounds = round;

            if let (Termination::Consensus { marker }, Some(moderator)) = (self.termination, self.moderator) {
                let verdict = ask(ctx, moderator, consensus_prompt(&topic, &transcript, marker), cancel).await?;
                if verdict.content().contains(marker.as_str()) {
                    info!(round, moderator = %moderator, "Consensus reached");
                    consensus = true;
                    break;
                }
            }
        }

        let output = match self.moderator {
            Some(moderator) => {
                let summary = ask(ctx, moderator, summary_prompt(&topic, &transcript), cancel).await?;
                Message::assistant(summary.into_content()).with_author(moderator.clone())
            }
            None => Message::assistant(render_transcript(&transcript)),
        };
        info!(rounds, consensus, "Discussion completed");
        Ok(output
            .with_metadata("pattern", json!("discussion"))
            .with_metadata("rounds", json!(rounds))
            .with_metadata("consensus", json!(consensus)))
    }

    fn turn_prompt(&self, topic: &str, transcript: &[Turn], round: u32, speaker: &AgentName) -> String {
        format!(
            "Topic: {}\n\nDiscussion so far:\n{}\n\nRound {} of {}. You are {}. Add your contribution.",
            topic,
            render_or_empty(transcript),
            round,
            self.max_rounds,
            speaker
        )
    }
}

async fn ask(
    ctx: &RuntimeContext,
    agent: &AgentName,
    prompt: String,
    cancel: &CancellationToken,
) -> FlowResult<Message> {
    let result = match ctx.app().agent(agent.as_str()) {
        Some(spec) => {
            let execution = AgentExecution::new(ctx, Arc::clone(spec), CallChain::root(agent), cancel.clone());
            ctx.execute(execution, Message::user(prompt)).await
        }
        None => Err(FlowError::AgentNotFound(agent.to_string())),
    };
    result.map_err(|e| FlowError::step(PatternKind::Discussion, agent.to_string(), e))
}

fn render_transcript(transcript: &[Turn]) -> String {
    transcript
        .iter()
        .map(|turn| format!("[{}] {}", turn.speaker, turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_or_empty(transcript: &[Turn]) -> String {
    if transcript.is_empty() {
        "(no contributions yet)".to_string()
    } else {
        render_transcript(transcript)
    }
}

fn consensus_prompt(topic: &str, transcript: &[Turn], marker: &str) -> String {
    format!(
        "Topic: {}\n\nDiscussion so far:\n{}\n\nHave the participants reached consensus? \
         If they have, include {} in your answer.",
        topic,
        render_transcript(transcript),
        marker
    )
}

fn summary_prompt(topic: &str, transcript: &[Turn]) -> String {
    format!(
        "Topic: {}\n\nDiscussion transcript:\n{}\n\nSummarize the discussion and its outcome.",
        topic,
        render_transcript(transcript)
    )
}
