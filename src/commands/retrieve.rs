//! Retrieval-only command: show the graph context for a question.

use crate::graph::ContextBundle;
use crate::orchestrator::Orchestrator;
use crate::Result;

/// Print the bundle as JSON, or as readable sections.
pub fn print_bundle(bundle: &ContextBundle, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(bundle)?);
        return Ok(());
    }

    println!("── Graph context ──");
    print!("{}", bundle.context_text);
    if !bundle.context_text.ends_with('\n') {
        println!();
    }

    if !bundle.entity_table.is_empty() {
        println!("── Entities ──");
        for row in &bundle.entity_table {
            println!("  {:<14} {}", row.entity_kind.as_str(), row.remarks);
        }
    }

    if !bundle.query_text.is_empty() {
        println!("── Cypher ──");
        println!("{}", bundle.query_text);
    }
    Ok(())
}

pub async fn run(orchestrator: &Orchestrator, question: &str, json: bool) -> Result<()> {
    let retrieval = orchestrator.retrieve(question).await?;
    if !json {
        println!("Detected language: {}", retrieval.language);
    }
    print_bundle(&retrieval.bundle, json)
}
