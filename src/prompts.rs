//! System prompts for the maintenance assistant.
//!
//! Built-in texts can be overridden by Markdown files in `prompts/` at the
//! project root. `{language}` in a prompt file is replaced by the reply
//! language name.

use std::path::PathBuf;

use crate::conversation::Message;
use crate::integrations::openai::ChatMessage;
use crate::language::Language;
use crate::{Error, Result};

/// Marker the assistant puts on graph-derived statements.
pub const GRAPH_MARKER: &str = "[Graph]";
/// Marker the assistant puts on general-knowledge statements.
pub const LLM_MARKER: &str = "[LLM]";

const MAINTENANCE_ASSISTANT: &str = "You are an industrial maintenance assistant chatbot. \
The user is currently speaking in {language}, so respond in that language. \
Use the provided graph context for factual information when relevant and mark such content explicitly as [Graph]. \
For answers not found in the graph, rely on your general knowledge and mark them as [LLM]. \
If the user's question is unrelated to the graph context, respond only with [LLM] knowledge.";

/// Available prompts.
#[derive(Debug, Clone, Copy)]
pub enum Prompt {
    /// System preface for fault-diagnosis answers.
    MaintenanceAssistant,
}

impl Prompt {
    /// Prompt file name (Markdown).
    pub fn filename(&self) -> &'static str {
        match self {
            Prompt::MaintenanceAssistant => "maintenance_assistant.md",
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            Prompt::MaintenanceAssistant => MAINTENANCE_ASSISTANT,
        }
    }

    /// Load from file, falling back to the built-in text.
    pub fn load(&self) -> String {
        load_prompt(self.filename()).unwrap_or_else(|_| self.builtin().to_string())
    }

    /// Prompt text with the reply language filled in.
    pub fn render(&self, language: Language) -> String {
        self.load().replace("{language}", language.name())
    }
}

/// Load a prompt by file name.
pub fn load_prompt(filename: &str) -> Result<String> {
    let path = prompts_dir().join(filename);
    std::fs::read_to_string(&path)
        .map_err(|e| Error::InvalidArgument(format!("Failed to load prompt {}: {}", filename, e)))
}

/// Path to the prompts directory.
pub fn prompts_dir() -> PathBuf {
    let candidates = [
        PathBuf::from("prompts"),
        PathBuf::from("../prompts"),
        PathBuf::from("../../prompts"),
    ];

    for path in candidates {
        if path.exists() {
            return path;
        }
    }

    PathBuf::from("prompts")
}

/// Final user message combining the graph context and the current question.
pub fn context_message(graph_context: &str, question: &str) -> String {
    format!(
        "Here is the graph context:\n{graph_context}\n\n\
         And here is the user's current question:\n{question}\n\n\
         Please answer clearly, mark with {GRAPH_MARKER} or {LLM_MARKER}, and follow the correct language."
    )
}

/// Chat-completion messages: system preface, history, context + question.
///
/// `history` already ends with the current question.
pub fn build_messages(
    system_prompt: &str,
    history: &[Message],
    graph_context: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::new("system", system_prompt));
    messages.extend(
        history
            .iter()
            .map(|m| ChatMessage::new(m.role.as_str(), m.content.clone())),
    );

    let question = history.last().map(|m| m.content.as_str()).unwrap_or("");
    messages.push(ChatMessage::new("user", context_message(graph_context, question)));
    messages
}

/// True if an answer cites the graph context.
pub fn cites_graph(answer: &str) -> bool {
    answer.contains(GRAPH_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_mentions_language_and_markers() {
        let dutch = Prompt::MaintenanceAssistant.render(Language::Dutch);
        assert!(dutch.contains("Dutch"));
        assert!(dutch.contains("[Graph]"));
        assert!(!dutch.contains("{language}"));

        let english = Prompt::MaintenanceAssistant.render(Language::English);
        assert!(english.contains("English"));
    }

    #[test]
    fn test_build_messages_layout() {
        let history = vec![
            Message::user("Why does pump A leak?", Some(Language::English)),
            Message::assistant("[Graph] Worn seal."),
            Message::user("How do I fix it?", None),
        ];

        let messages = build_messages("sys", &history, "Location: Pump A\n");

        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[2].role, "assistant");
        let last = messages[4].content.as_deref().unwrap();
        assert!(last.contains("Location: Pump A"));
        assert!(last.contains("How do I fix it?"));
    }

    #[test]
    fn test_build_messages_with_empty_history() {
        let messages = build_messages("sys", &[], "ctx");
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.as_deref().unwrap().contains("ctx"));
    }

    #[test]
    fn test_cites_graph() {
        assert!(cites_graph("[Graph] Replace the seal."));
        assert!(!cites_graph("[LLM] Call a technician."));
    }

    #[test]
    fn test_missing_prompt_file_errors() {
        assert!(load_prompt("does_not_exist_12345.md").is_err());
    }
}
