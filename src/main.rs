//! Fault assistant CLI - main entry point
//!
//! Ask maintenance questions against the fault knowledge graph, one-shot or
//! in an interactive multi-conversation chat.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use fault_graph_assistant::commands::{self, ask::AskOptions};
use fault_graph_assistant::{metrics, Config};
use tracing::warn;

#[derive(Parser)]
#[command(name = "fault_assistant")]
#[command(about = "Fault-diagnosis assistant backed by a maintenance knowledge graph", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Config file (defaults to ./config.yml, then ../config.yml)
    #[arg(short, long, env = "FAULT_ASSISTANT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the number of graph hits used per question
    #[arg(long)]
    top_k: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question, in English or Dutch
        question: String,

        /// Print answer and graph context as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Stream the answer as it is generated
        #[arg(long, default_value_t = false)]
        stream: bool,

        /// Also print the graph context, entity table and Cypher query
        #[arg(long, default_value_t = false)]
        show_context: bool,
    },

    /// Interactive chat with multiple conversations
    Chat {
        /// Wait for complete answers instead of streaming
        #[arg(long, default_value_t = false)]
        no_stream: bool,
    },

    /// Show the graph context for a question without answering it
    Retrieve {
        /// The question to search the graph for
        question: String,

        /// Print the bundle as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ask { .. } => "ask",
            Commands::Chat { .. } => "chat",
            Commands::Retrieve { .. } => "retrieve",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Logs go to stderr so answers on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("fault_graph_assistant=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let mut config = match cli.config.as_deref() {
        Some(path) => Config::load_from_file(path)?,
        None => Config::new(),
    };
    if let Some(top_k) = cli.top_k.filter(|k| *k > 0) {
        config.retrieval.top_k = top_k;
    }

    let command_name = cli.command.name();
    let start = Instant::now();

    let result = execute_command(cli.command, &config).await;

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());

    result
}

async fn execute_command(command: Commands, config: &Config) -> anyhow::Result<()> {
    let orchestrator = commands::build_orchestrator(config).await?;
    let history = config.history_path.as_deref();

    match command {
        Commands::Ask {
            question,
            json,
            stream,
            show_context,
        } => {
            let options = AskOptions {
                json,
                stream,
                show_context,
            };
            commands::ask::run(&orchestrator, &question, history, options).await?;
        }
        Commands::Chat { no_stream } => {
            commands::chat::run(&orchestrator, history, !no_stream).await?;
        }
        Commands::Retrieve { question, json } => {
            commands::retrieve::run(&orchestrator, &question, json).await?;
        }
    }

    Ok(())
}
