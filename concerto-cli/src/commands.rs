//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use concerto_agent::{AgentEvent, Application, ConfigDocument, RuntimeContext};
use concerto_core::identifiers::SessionId;
use concerto_core::pattern::{Pattern, StepRef, Termination};
use concerto_memory::{FileStore, MemoryStore};
use futures::StreamExt;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::dry_run::DryRunModel;
use crate::error::CliResult;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Configuration document (YAML, or JSON with a .json extension)
    #[arg(long, short, default_value = "concerto.yaml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Persist session logs as JSONL files under this directory
    #[arg(long)]
    pub memory_dir: Option<PathBuf>,
    /// Resume an existing session instead of starting a new one
    #[arg(long)]
    pub session: Option<String>,
}

#[derive(Args, Debug)]
pub struct DescribeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Print the registry as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    #[command(flatten)]
    pub session: SessionArgs,
    /// Flow to run
    #[arg(long, conflicts_with = "agent")]
    pub flow: Option<String>,
    /// Agent to call directly
    #[arg(long)]
    pub agent: Option<String>,
    /// Print the agent's answer as it is produced
    #[arg(long, requires = "agent")]
    pub stream: bool,
    /// Input text; read from stdin when omitted
    pub input: Option<String>,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    #[command(flatten)]
    pub session: SessionArgs,
}

/// Load a configuration document into an application bound to the dry-run
/// model and the standard tools.
pub fn load(config: &Path, memory: Option<Arc<dyn MemoryStore>>) -> CliResult<Arc<Application>> {
    let document = ConfigDocument::from_path(config)?;
    let mut builder = document
        .apply(Application::builder(Arc::new(DryRunModel)))?
        .tools(concerto_tools::standard::all());
    if let Some(memory) = memory {
        builder = builder.memory(memory);
    }
    Ok(builder.build()?)
}

async fn open_session(args: &SessionArgs) -> CliResult<(Option<Arc<dyn MemoryStore>>, SessionId)> {
    let memory: Option<Arc<dyn MemoryStore>> = match &args.memory_dir {
        Some(dir) => Some(Arc::new(FileStore::open(dir.clone()).await?)),
        None => None,
    };
    let session = match &args.session {
        Some(id) => SessionId::parse(id)?,
        None => SessionId::generate(),
    };
    Ok((memory, session))
}

pub fn validate(args: &ConfigArgs) -> CliResult<()> {
    let app = load(&args.config, None)?;
    println!(
        "{}: OK ({} agents, {} flows)",
        args.config.display(),
        app.agents().count(),
        app.flows().count()
    );
    Ok(())
}

pub fn describe(args: &DescribeArgs) -> CliResult<()> {
    let app = load(&args.config.config, None)?;
    if args.json {
        let registry = json!({
            "agents": app.agents().map(|a| a.as_ref()).collect::<Vec<_>>(),
            "flows": app.flows().map(|f| f.as_ref()).collect::<Vec<_>>(),
            "settings": app.settings(),
            "default": app.default_target(),
        });
        println!("{}", serde_json::to_string_pretty(&registry).unwrap_or_default());
    } else {
        print!("{}", render_description(&app));
    }
    Ok(())
}

pub async fn run(args: RunArgs) -> CliResult<()> {
    let (memory, session) = open_session(&args.session).await?;
    let app = load(&args.config.config, memory)?;
    let input = match args.input {
        Some(input) => input,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin().read_to_string(&mut buffer).await?;
            buffer.trim_end().to_string()
        }
    };
    info!(session = %session, "Running");

    let flow = args.flow;
    let agent = args.agent;
    let stream = args.stream;
    RuntimeContext::scope(app, session, |ctx| async move {
        let mut stdout = tokio::io::stdout();
        match (flow, agent) {
            (_, Some(agent)) if stream => {
                let mut events = ctx.call_agent_streaming(&agent, input);
                while let Some(event) = events.next().await {
                    match event? {
                        AgentEvent::TextDelta { text, .. } => {
                            stdout.write_all(text.as_bytes()).await?;
                            stdout.flush().await?;
                        }
                        AgentEvent::ToolCallRequested { agent, call } => {
                            info!(agent = %agent, tool = %call.name, "Tool call requested");
                        }
                        AgentEvent::ToolResult { agent, message } => {
                            debug!(agent = %agent, result = %message.content(), "Tool result");
                        }
                        AgentEvent::Completed(_) => stdout.write_all(b"\n").await?,
                    }
                }
            }
            (flow, agent) => {
                let answer = match (flow, agent) {
                    (Some(flow), _) => ctx.run_flow(&flow, input).await?,
                    (None, Some(agent)) => ctx.call_agent(&agent, input).await?,
                    (None, None) => ctx.run_default(input).await?,
                };
                stdout.write_all(answer.content().as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
        }
        stdout.flush().await?;
        Ok(())
    })
    .await?;
    Ok(())
}

pub async fn chat(args: ChatArgs) -> CliResult<()> {
    let (memory, session) = open_session(&args.session).await?;
    let app = load(&args.config.config, memory)?;
    if let Some(target) = app.default_target() {
        eprintln!("Chatting with {} (session {}). Type 'exit' to quit.", target, session);
    }

    let summary = RuntimeContext::scope(app, session, |ctx| async move {
        ctx.interactive_chat(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    })
    .await?;
    info!(turns = summary.turns, failures = summary.failures, "Chat finished");
    Ok(())
}

/// Human-readable listing of agents, flows and the default target.
pub fn render_description(app: &Application) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Agents ({}):", app.agents().count()));
    for agent in app.agents() {
        let mut line = format!("  {}", agent.name);
        if !agent.description.is_empty() {
            line.push_str(&format!(" - {}", agent.description));
        }
        if !agent.tools.is_empty() {
            line.push_str(&format!(" [tools: {}]", join(&agent.tools)));
        }
        if !agent.callable_agents.is_empty() {
            line.push_str(&format!(" [calls: {}]", join(&agent.callable_agents)));
        }
        lines.push(line);
    }

    lines.push(format!("Flows ({}):", app.flows().count()));
    for flow in app.flows() {
        if flow.description.is_empty() {
            lines.push(format!("  {}", flow.name));
        } else {
            lines.push(format!("  {} - {}", flow.name, flow.description));
        }
        describe_pattern(&flow.pattern, 4, &mut lines);
    }

    if let Some(target) = app.default_target() {
        lines.push(format!("Default: {}", target));
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn join<T: ToString>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn describe_step(step: &StepRef, prefix: String, indent: usize, lines: &mut Vec<String>) {
    let pad = " ".repeat(indent);
    match step {
        StepRef::Agent { name } => lines.push(format!("{}{}agent {}", pad, prefix, name)),
        StepRef::Flow { name } => lines.push(format!("{}{}flow {}", pad, prefix, name)),
        StepRef::Pattern { pattern } => {
            lines.push(format!("{}{}inline:", pad, prefix));
            describe_pattern(pattern, indent + 2, lines);
        }
    }
}

fn describe_pattern(pattern: &Pattern, indent: usize, lines: &mut Vec<String>) {
    let pad = " ".repeat(indent);
    match pattern {
        Pattern::Sequential { steps } => {
            lines.push(format!("{}sequential", pad));
            for step in steps {
                let prefix = if step.best_effort { "- (best effort) " } else { "- " };
                describe_step(&step.target, prefix.to_string(), indent + 2, lines);
            }
        }
        Pattern::Parallel {
            tasks,
            synthesis,
            max_in_flight,
        } => {
            match max_in_flight {
                Some(limit) => lines.push(format!("{}parallel (max in flight {})", pad, limit)),
                None => lines.push(format!("{}parallel", pad)),
            }
            for task in tasks {
                describe_step(&task.target, format!("{}: ", task.name), indent + 2, lines);
            }
            if let Some(step) = synthesis {
                describe_step(step, "synthesis: ".to_string(), indent + 2, lines);
            }
        }
        Pattern::Router {
            discriminator,
            candidates,
            fallback,
        } => {
            lines.push(format!("{}router", pad));
            describe_step(discriminator, "discriminator: ".to_string(), indent + 2, lines);
            for candidate in candidates {
                describe_step(candidate, "- ".to_string(), indent + 2, lines);
            }
            describe_step(fallback, "fallback: ".to_string(), indent + 2, lines);
        }
        Pattern::Discussion {
            participants,
            moderator,
            max_rounds,
            termination,
        } => {
            let until = match termination {
                Termination::MaxRounds => format!("{} rounds", max_rounds),
                Termination::Consensus { marker } => {
                    format!("up to {} rounds or consensus '{}'", max_rounds, marker)
                }
            };
            lines.push(format!("{}discussion ({})", pad, until));
            lines.push(format!("{}  participants: {}", pad, join(participants.as_slice())));
            if let Some(moderator) = moderator {
                lines.push(format!("{}  moderator: {}", pad, moderator));
            }
        }
    }
}
