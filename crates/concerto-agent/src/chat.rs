//! Line-oriented interactive chat.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use concerto_core::error::ConfigError;

use crate::context::RuntimeContext;
use crate::error::FlowResult;

const PROMPT: &str = "> ";

/// Summary of an interactive session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatSummary {
    /// Lines answered successfully
    pub turns: usize,
    /// Lines whose run failed
    pub failures: usize,
}

impl RuntimeContext {
    /// Feed lines from `reader` to the default agent or flow and write each
    /// answer to `writer`.
    ///
    /// Stops at end of input or on a line reading `exit` or `quit`. Blank
    /// lines are skipped. A failed run is reported on `writer` and the
    /// session continues; only I/O errors and cancellation end it early.
    pub async fn interactive_chat<R, W>(&self, reader: R, mut writer: W) -> FlowResult<ChatSummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if self.app().default_target().is_none() {
            return Err(ConfigError::NoDefaultTarget.into());
        }

        let mut summary = ChatSummary::default();
        let mut lines = reader.lines();
        loop {
            writer.write_all(PROMPT.as_bytes()).await?;
            writer.flush().await?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line, "exit" | "quit") {
                debug!("Chat ended by user");
                break;
            }

            match self.run_default(line).await {
                Ok(answer) => {
                    summary.turns += 1;
                    writer.write_all(answer.content().as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                }
                Err(e) if self.is_cancelled() => return Err(e),
                Err(e) => {
                    summary.failures += 1;
                    warn!(error = %e, code = e.error_code(), "Chat turn failed");
                    writer.write_all(format!("error: {}\n", e).as_bytes()).await?;
                }
            }
        }
        writer.flush().await?;
        Ok(summary)
    }
}
