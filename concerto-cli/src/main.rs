use clap::{Parser, Subcommand};

mod commands;
mod dry_run;
mod error;

use commands::{ChatArgs, ConfigArgs, DescribeArgs, RunArgs};
use error::CliResult;

#[derive(Parser, Debug)]
#[command(name = "concerto", version)]
#[command(about = "Concerto CLI - validate, inspect and run multi-agent flows")]
struct Cli {
    /// Log filter directive added to RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a configuration document without running anything
    Validate(ConfigArgs),
    /// List the agents and flows of a configuration document
    Describe(DescribeArgs),
    /// Run a flow or an agent once and print the answer
    Run(RunArgs),
    /// Line-by-line chat with the default agent or flow
    Chat(ChatArgs),
}

async fn dispatch(command: Commands) -> CliResult<()> {
    match command {
        Commands::Validate(args) => commands::validate(&args),
        Commands::Describe(args) => commands::describe(&args),
        Commands::Run(args) => commands::run(args).await,
        Commands::Chat(args) => commands::chat(args).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize JSON logging once. Logs go to stderr so answers on stdout
    // stay clean.
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match cli.log_level.parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter, // fallback to default if parsing fails
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .json()
        .try_init();

    if let Err(e) = dispatch(cli.command).await {
        tracing::error!(error = %e, code = e.error_code(), "Command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
