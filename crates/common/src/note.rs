// Note document: ordered blocks plus note-level metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::Block;

/// A note: the full ordered collection of blocks plus metadata.
///
/// Invariant: `blocks` is never empty. Constructors seed a single empty
/// text block and mutation paths are required to preserve that.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    /// Store-assigned identifier. `None` until the note has been created
    /// remotely.
    pub remote_id: Option<Uuid>,
    pub title: String,
    /// Folder association, if the note is filed anywhere.
    pub folder: Option<String>,
    pub locked: bool,
    /// Uploaded attachment URLs. Append-only from the sync engine's side;
    /// removal is always a user edit.
    pub attachments: Vec<String>,
    pub blocks: Vec<Block>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// A fresh, never-persisted note holding one empty text block.
    pub fn new() -> Self {
        Self {
            remote_id: None,
            title: String::new(),
            folder: None,
            locked: false,
            attachments: Vec::new(),
            blocks: vec![Block::text("")],
            updated_at: Utc::now(),
        }
    }

    /// Newline-joined concatenation of block contents. Total; used for
    /// emptiness checks and as AI pipeline input.
    pub fn to_plain_text(&self) -> String {
        self.blocks.iter().map(|b| b.content.as_str()).collect::<Vec<_>>().join("\n")
    }

    /// Whether the note holds nothing worth persisting: title and every
    /// block trim to empty. Blank notes are never created or updated.
    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty() && self.blocks.iter().all(Block::is_empty)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Note {
    fn default() -> Self {
        Self::new()
    }
}
