//! Interactive chat with multiple conversations.
//!
//! Lines starting with `/` are commands, anything else is a question for the
//! current conversation. Ctrl-C while an answer streams cancels that turn.

use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

use crate::conversation::ConversationRegistry;
use crate::error::{Error, Result};
use crate::export;
use crate::orchestrator::Orchestrator;

const HELP: &str = "\
Commands:
  /new [title]    start a new conversation
  /list           list conversations
  /switch N       switch to conversation N
  /graph          graph of the last turn as JSON
  /table          entity table of the last turn
  /query          Cypher query of the last turn
  /export PATH    write the current conversation as Markdown
  /help           show this help
  /quit           leave";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Ask(String),
    New(Option<String>),
    List,
    /// Zero-based conversation index.
    Switch(usize),
    Graph,
    Table,
    Query,
    Export(PathBuf),
    Help,
    Quit,
    Empty,
}

/// Parse a line typed at the prompt. Conversation numbers are 1-based.
pub fn parse_line(line: &str) -> Result<ReplCommand> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ReplCommand::Empty);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(ReplCommand::Ask(line.to_string()));
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name.to_lowercase().as_str() {
        "new" => Ok(ReplCommand::New((!arg.is_empty()).then(|| arg.to_string()))),
        "list" | "ls" => Ok(ReplCommand::List),
        "switch" | "sw" => {
            let number: usize = arg.parse().map_err(|_| {
                Error::InvalidArgument(format!(
                    "/switch expects a conversation number, got '{}'",
                    arg
                ))
            })?;
            number.checked_sub(1).map(ReplCommand::Switch).ok_or_else(|| {
                Error::InvalidArgument("conversations are numbered from 1".to_string())
            })
        }
        "graph" => Ok(ReplCommand::Graph),
        "table" => Ok(ReplCommand::Table),
        "query" | "cypher" => Ok(ReplCommand::Query),
        "export" if !arg.is_empty() => Ok(ReplCommand::Export(PathBuf::from(arg))),
        "export" => Err(Error::InvalidArgument("/export expects a file path".to_string())),
        "help" | "?" => Ok(ReplCommand::Help),
        "quit" | "exit" | "q" => Ok(ReplCommand::Quit),
        other => Err(Error::InvalidArgument(format!("unknown command /{}", other))),
    }
}

pub struct ChatSession<'a> {
    orchestrator: &'a Orchestrator,
    registry: ConversationRegistry,
    history: Option<PathBuf>,
    stream: bool,
}

impl<'a> ChatSession<'a> {
    pub fn new(
        orchestrator: &'a Orchestrator,
        registry: ConversationRegistry,
        history: Option<PathBuf>,
        stream: bool,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            history,
            stream,
        }
    }

    pub fn registry(&self) -> &ConversationRegistry {
        &self.registry
    }

    /// Execute one command. Returns false when the session should end.
    pub async fn execute(&self, command: ReplCommand) -> Result<bool> {
        match command {
            ReplCommand::Empty => {}
            ReplCommand::Quit => return Ok(false),
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Ask(question) => self.ask(&question).await?,
            ReplCommand::New(title) => {
                let (index, _) = self.registry.create_conversation(title.as_deref());
                println!("Started conversation {}", index + 1);
                self.persist().await;
            }
            ReplCommand::List => {
                for summary in self.registry.summaries().await {
                    let marker = if summary.is_current { "*" } else { " " };
                    println!(
                        "{} {:>2}. {} ({} turns)",
                        marker,
                        summary.index + 1,
                        summary.title,
                        summary.turns
                    );
                }
            }
            ReplCommand::Switch(index) => {
                let conversation = self.registry.select_conversation(index)?;
                let conversation = conversation.lock().await;
                println!(
                    "Switched to {} ({} turns)",
                    conversation.title(),
                    conversation.turn_count()
                );
            }
            ReplCommand::Graph => {
                let conversation = self.registry.current();
                let conversation = conversation.lock().await;
                match conversation.latest_bundle() {
                    Some(bundle) => println!("{}", bundle.graph.to_json()?),
                    None => println!("No turns yet."),
                }
            }
            ReplCommand::Table => {
                let conversation = self.registry.current();
                let conversation = conversation.lock().await;
                match conversation.latest_bundle() {
                    Some(bundle) if bundle.entity_table.is_empty() => {
                        println!("No graph entities for the last turn.")
                    }
                    Some(bundle) => {
                        for row in &bundle.entity_table {
                            println!("  {:<14} {}", row.entity_kind.as_str(), row.remarks);
                        }
                    }
                    None => println!("No turns yet."),
                }
            }
            ReplCommand::Query => {
                let conversation = self.registry.current();
                let conversation = conversation.lock().await;
                match conversation.latest_bundle() {
                    Some(bundle) if bundle.query_text.is_empty() => {
                        println!("No graph query for the last turn.")
                    }
                    Some(bundle) => println!("{}", bundle.query_text),
                    None => println!("No turns yet."),
                }
            }
            ReplCommand::Export(path) => {
                let conversation = self.registry.current();
                let conversation = conversation.lock().await;
                export::export_markdown(&conversation, &path)?;
                println!("Exported to {}", path.display());
            }
        }
        Ok(true)
    }

    async fn ask(&self, question: &str) -> Result<()> {
        let conversation = self.registry.current();

        if !self.stream {
            let outcome = self
                .orchestrator
                .handle_question(&conversation, question)
                .await?;
            println!("{}", outcome.answer);
            self.persist().await;
            return Ok(());
        }

        let mut turn = self
            .orchestrator
            .stream_question(&conversation, question)
            .await?;
        let mut stdout = std::io::stdout();

        loop {
            tokio::select! {
                chunk = turn.next_chunk() => match chunk? {
                    Some(chunk) => {
                        print!("{}", chunk);
                        stdout.flush()?;
                    }
                    None => break,
                },
                _ = signal::ctrl_c() => {
                    println!("\n(cancelled)");
                    return Ok(());
                }
            }
        }
        println!();

        let outcome = turn.finish().await?;
        if outcome.bundle.has_graph_context() {
            println!(
                "(graph: {} entities, /table for details)",
                outcome.bundle.graph.entities.len()
            );
        }
        self.persist().await;
        Ok(())
    }

    async fn persist(&self) {
        let Some(path) = self.history.as_deref() else {
            return;
        };
        if let Err(err) = export::save_snapshot(&self.registry, path).await {
            warn!(path = %path.display(), "Failed to save conversation history: {}", err);
        }
    }
}

/// Run the interactive loop on stdin.
pub async fn run(orchestrator: &Orchestrator, history: Option<&Path>, stream: bool) -> Result<()> {
    let registry = match history {
        Some(path) => export::load_or_new(path)?,
        None => ConversationRegistry::new(),
    };
    let session = ChatSession::new(orchestrator, registry, history.map(Path::to_path_buf), stream);

    info!(
        conversations = session.registry().len(),
        stream, "Chat session started"
    );
    println!("Fault assistant ready. Ask a question or type /help.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let keep_going = match parse_line(&line) {
            Ok(command) => match session.execute(command).await {
                Ok(keep_going) => keep_going,
                Err(err) => {
                    eprintln!("Error: {}", err);
                    true
                }
            },
            Err(err) => {
                eprintln!("{}", err);
                true
            }
        };
        if !keep_going {
            break;
        }
    }

    session.persist().await;
    Ok(())
}
