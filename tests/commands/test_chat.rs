//! Tests for the chat session command handling

use std::sync::Arc;

use fault_graph_assistant::commands::chat::{parse_line, ChatSession, ReplCommand};
use fault_graph_assistant::{ConversationRegistry, Error};

use crate::support::{orchestrator, pump_hit, ScriptedAnswerer, StaticSearch};

fn session_parts() -> fault_graph_assistant::Orchestrator {
    orchestrator(
        Arc::new(StaticSearch::with_hits(vec![pump_hit()])),
        Arc::new(ScriptedAnswerer::new("[Graph]")),
    )
}

#[tokio::test]
async fn test_question_goes_to_current_conversation() {
    let orchestrator = session_parts();
    let session = ChatSession::new(&orchestrator, ConversationRegistry::new(), None, false);

    let keep_going = session
        .execute(parse_line("Why does pump A leak?").unwrap())
        .await
        .unwrap();
    assert!(keep_going);

    let current = session.registry().current();
    let state = current.lock().await;
    assert_eq!(state.turn_count(), 1);
    assert_eq!(state.latest_bundle().unwrap().graph.entities.len(), 2);
}

#[tokio::test]
async fn test_streamed_question_is_recorded() {
    let orchestrator = session_parts();
    let session = ChatSession::new(&orchestrator, ConversationRegistry::new(), None, true);

    session
        .execute(ReplCommand::Ask("Why does pump A leak?".to_string()))
        .await
        .unwrap();

    assert_eq!(session.registry().current().lock().await.turn_count(), 1);
}

#[tokio::test]
async fn test_new_and_switch_conversations() {
    let orchestrator = session_parts();
    let session = ChatSession::new(&orchestrator, ConversationRegistry::new(), None, false);

    session.execute(ReplCommand::Ask("First".to_string())).await.unwrap();
    session
        .execute(ReplCommand::New(Some("Valves".to_string())))
        .await
        .unwrap();
    assert_eq!(session.registry().len(), 2);
    assert_eq!(session.registry().current_index(), 1);
    assert_eq!(session.registry().current().lock().await.turn_count(), 0);

    session.execute(parse_line("/switch 1").unwrap()).await.unwrap();
    assert_eq!(session.registry().current_index(), 0);
    assert_eq!(session.registry().current().lock().await.turn_count(), 1);
}

#[tokio::test]
async fn test_switch_out_of_range_is_error() {
    let orchestrator = session_parts();
    let session = ChatSession::new(&orchestrator, ConversationRegistry::new(), None, false);

    let err = session.execute(ReplCommand::Switch(4)).await.unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { index: 4, len: 1 }));
    assert_eq!(session.registry().current_index(), 0);
}

#[tokio::test]
async fn test_inspection_commands_without_turns() {
    let orchestrator = session_parts();
    let session = ChatSession::new(&orchestrator, ConversationRegistry::new(), None, false);

    for command in [
        ReplCommand::Graph,
        ReplCommand::Table,
        ReplCommand::Query,
        ReplCommand::List,
        ReplCommand::Help,
        ReplCommand::Empty,
    ] {
        assert!(session.execute(command).await.unwrap());
    }
    assert!(!session.execute(ReplCommand::Quit).await.unwrap());
}

#[tokio::test]
async fn test_session_persists_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    let orchestrator = session_parts();
    let session = ChatSession::new(
        &orchestrator,
        ConversationRegistry::new(),
        Some(path.clone()),
        false,
    );

    session
        .execute(ReplCommand::Ask("Why does pump A leak?".to_string()))
        .await
        .unwrap();

    let loaded = fault_graph_assistant::export::load_snapshot(&path).unwrap();
    assert_eq!(loaded.current().lock().await.turn_count(), 1);
}
