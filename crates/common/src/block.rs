// Block model: the typed, ordered content unit of a note.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a block is. Kept deliberately small; kind-specific metadata lives
/// on the variant, everything else on [`Block`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BlockKind {
    /// Plain text paragraph (may span multiple lines).
    Text,
    /// ATX-style heading, level 1-6.
    Heading { level: u8 },
    /// Checklist item with a completion flag.
    Todo { done: bool },
    /// Image reference. The URL is metadata; `content` holds the alt text.
    Image { url: String },
}

/// A single content unit within a note.
///
/// The id is assigned once at construction and never reassigned for the
/// lifetime of the block; identity is independent of position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub id: Uuid,
    pub kind: BlockKind,
    pub content: String,
}

impl Block {
    pub fn new(kind: BlockKind, content: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(), kind, content: content.into() }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(BlockKind::Text, content)
    }

    /// Heading with the level clamped to the ATX range 1-6.
    pub fn heading(level: u8, content: impl Into<String>) -> Self {
        Self::new(BlockKind::Heading { level: level.clamp(1, 6) }, content)
    }

    pub fn todo(done: bool, content: impl Into<String>) -> Self {
        Self::new(BlockKind::Todo { done }, content)
    }

    pub fn image(url: impl Into<String>, alt: impl Into<String>) -> Self {
        Self::new(BlockKind::Image { url: url.into() }, alt)
    }

    /// Whether the block carries no user-visible content.
    ///
    /// An image reference counts as content even with empty alt text.
    pub fn is_empty(&self) -> bool {
        match self.kind {
            BlockKind::Image { .. } => false,
            _ => self.content.trim().is_empty(),
        }
    }
}
