//! Export utilities for saving conversations to files
//!
//! - Markdown transcript of one conversation, with the graph entities and
//!   replay query of every turn
//! - JSON snapshot of the whole registry, guarded by an exclusive file lock

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conversation::{Conversation, ConversationRegistry};
use crate::error::{Error, Result};

/// Render a conversation as Markdown.
pub fn markdown_transcript(conversation: &Conversation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", conversation.title());
    let _ = writeln!(
        out,
        "\n_Started {}_\n",
        conversation.created_at().format("%Y-%m-%d %H:%M UTC")
    );

    for (idx, (question, answer, bundle)) in conversation.turns().enumerate() {
        let lang = question.language.map(|l| l.code()).unwrap_or("?");
        let _ = writeln!(out, "## Turn {} ({})\n", idx + 1, lang);
        let _ = writeln!(out, "**User:** {}\n", question.content);
        let _ = writeln!(out, "**Assistant:** {}\n", answer.content);

        if bundle.entity_table.is_empty() {
            continue;
        }

        out.push_str("| Entity | Remarks |\n|---|---|\n");
        for row in &bundle.entity_table {
            let remarks = row.remarks.replace('|', "\\|");
            let _ = writeln!(out, "| {} | {} |", row.entity_kind, remarks);
        }
        out.push('\n');

        if !bundle.query_text.is_empty() {
            let _ = writeln!(out, "```cypher\n{}\n```\n", bundle.query_text);
        }
    }

    out
}

/// Write the Markdown transcript of a conversation to `path`.
pub fn export_markdown<P: AsRef<Path>>(conversation: &Conversation, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    writer.write_all(markdown_transcript(conversation).as_bytes())?;
    writer.flush()?;

    info!(
        path = %path.as_ref().display(),
        turns = conversation.turn_count(),
        "Exported conversation transcript"
    );
    Ok(())
}

/// On-disk form of a registry.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub saved_at: DateTime<Utc>,
    pub current: usize,
    pub conversations: Vec<Conversation>,
}

/// Exclusive lock on a snapshot file, released on drop.
pub struct HistoryLock {
    file: Option<File>,
    path: PathBuf,
}

impl HistoryLock {
    /// Lock `<snapshot>.lock` next to the snapshot.
    pub fn acquire<P: AsRef<Path>>(snapshot: P) -> Result<Self> {
        let path = lock_path(snapshot.as_ref());
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::LockError(format!("Failed to open lock file: {}", e)))?;

        file.try_lock_exclusive().map_err(|_| {
            Error::LockError(format!("{} is held by another process", path.display()))
        })?;

        Ok(Self {
            file: Some(file),
            path,
        })
    }

    /// Release the lock manually
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Drop for HistoryLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn lock_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Save every conversation of the registry as JSON.
pub async fn save_snapshot<P: AsRef<Path>>(registry: &ConversationRegistry, path: P) -> Result<()> {
    let path = path.as_ref();
    let (conversations, current) = registry.snapshot().await;
    let snapshot = Snapshot {
        saved_at: Utc::now(),
        current,
        conversations,
    };

    let _lock = HistoryLock::acquire(path)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;

    debug!(
        path = %path.display(),
        conversations = snapshot.conversations.len(),
        "Saved conversation snapshot"
    );
    Ok(())
}

/// Load a registry saved by [`save_snapshot`].
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<ConversationRegistry> {
    let path = path.as_ref();
    let _lock = HistoryLock::acquire(path)?;
    let content = fs::read_to_string(path)?;
    let snapshot: Snapshot = serde_json::from_str(&content)?;

    for conversation in &snapshot.conversations {
        conversation.validate()?;
    }

    info!(
        path = %path.display(),
        conversations = snapshot.conversations.len(),
        "Loaded conversation snapshot"
    );
    ConversationRegistry::with_conversations(snapshot.conversations, snapshot.current)
}

/// Load the snapshot if it exists, otherwise start a fresh registry.
pub fn load_or_new<P: AsRef<Path>>(path: P) -> Result<ConversationRegistry> {
    if path.as_ref().exists() {
        load_snapshot(path)
    } else {
        Ok(ConversationRegistry::new())
    }
}
