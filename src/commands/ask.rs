//! One-shot question command.

use std::io::Write;
use std::path::Path;

use serde_json::json;

use super::retrieve::print_bundle;
use crate::conversation::ConversationRegistry;
use crate::export;
use crate::orchestrator::{Orchestrator, TurnOutcome};
use crate::Result;

/// Options for `ask`.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub json: bool,
    pub stream: bool,
    pub show_context: bool,
}

/// Ask in the current conversation of `history` (or a fresh one) and save it back.
pub async fn run(
    orchestrator: &Orchestrator,
    question: &str,
    history: Option<&Path>,
    options: AskOptions,
) -> Result<()> {
    let registry = match history {
        Some(path) => export::load_or_new(path)?,
        None => ConversationRegistry::new(),
    };
    let conversation = registry.current();

    let outcome = if options.stream && !options.json {
        let mut turn = orchestrator.stream_question(&conversation, question).await?;
        let mut stdout = std::io::stdout();
        while let Some(chunk) = turn.next_chunk().await? {
            print!("{}", chunk);
            stdout.flush()?;
        }
        println!();
        turn.finish().await?
    } else {
        let outcome = orchestrator.handle_question(&conversation, question).await?;
        if !options.json {
            println!("{}", outcome.answer);
        }
        outcome
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);
    } else if options.show_context {
        println!();
        print_bundle(&outcome.bundle, false)?;
    }

    if let Some(path) = history {
        export::save_snapshot(&registry, path).await?;
    }
    Ok(())
}

pub fn outcome_json(outcome: &TurnOutcome) -> serde_json::Value {
    json!({
        "question": outcome.question,
        "answer": outcome.answer,
        "language": outcome.language,
        "effective_language": outcome.effective_language,
        "bundle": outcome.bundle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ContextBundle;
    use crate::language::Language;

    #[test]
    fn outcome_json_has_graph_payload() {
        let outcome = TurnOutcome {
            question: "q".to_string(),
            answer: "[LLM] a".to_string(),
            language: Language::Dutch,
            effective_language: Language::Dutch,
            bundle: ContextBundle::empty(),
        };

        let value = outcome_json(&outcome);
        assert_eq!(value["language"], "nl");
        assert!(value["bundle"]["graph"]["nodes"].is_array());
        assert!(value["bundle"]["graph"]["links"].is_array());
    }
}
