//! Tests for transcript export from a chat session

use std::sync::Arc;

use fault_graph_assistant::commands::chat::{ChatSession, ReplCommand};
use fault_graph_assistant::ConversationRegistry;

use crate::support::{full_chain_hit, orchestrator, ScriptedAnswerer, StaticSearch};

#[tokio::test]
async fn test_export_writes_transcript_with_graph_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pump.md");
    let orchestrator = orchestrator(
        Arc::new(StaticSearch::with_hits(vec![full_chain_hit()])),
        Arc::new(ScriptedAnswerer::new("[Graph]")),
    );
    let session = ChatSession::new(&orchestrator, ConversationRegistry::new(), None, false);

    session
        .execute(ReplCommand::Ask("Why does pump A leak?".to_string()))
        .await
        .unwrap();
    session
        .execute(ReplCommand::Export(path.clone()))
        .await
        .unwrap();

    let markdown = std::fs::read_to_string(&path).unwrap();
    assert!(markdown.starts_with("# Conversation 1"));
    assert!(markdown.contains("**User:** Why does pump A leak?"));
    assert!(markdown.contains("| FaultReason | Worn seal |"));
    assert!(markdown.contains("| FaultMeasure | Replace seal |"));
    assert!(markdown.contains("elementId(n) IN"));
}

#[tokio::test]
async fn test_export_to_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("out.md");
    let orchestrator = orchestrator(
        Arc::new(StaticSearch::default()),
        Arc::new(ScriptedAnswerer::new("[LLM]")),
    );
    let session = ChatSession::new(&orchestrator, ConversationRegistry::new(), None, false);

    assert!(session.execute(ReplCommand::Export(path)).await.is_err());
}
