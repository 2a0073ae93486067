// Document controller: the single legal mutation surface over a note's
// block sequence during an editing session.
//
// Every mutation returns whether it applied. Operations addressing a
// block id that no longer exists are no-ops, not errors: a stale id
// from work completing after a concurrent deletion must degrade
// gracefully.

use uuid::Uuid;

use jotter_common::block::{Block, BlockKind};
use jotter_common::markdown;
use jotter_common::note::Note;

/// Value capture of the persistable controller state, taken at save time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSnapshot {
    pub title: String,
    pub folder: Option<String>,
    pub locked: bool,
    pub blocks: Vec<Block>,
}

/// Owns the working note and focus state for one editing session.
pub struct DocumentController {
    note: Note,
    focused_block_id: Option<Uuid>,
}

impl DocumentController {
    /// Controller over a brand-new note (one empty text block).
    pub fn new() -> Self {
        Self::from_note(Note::new())
    }

    /// Controller over an existing note. Restores the non-empty
    /// invariant if the stored note somehow arrived with no blocks.
    pub fn from_note(mut note: Note) -> Self {
        if note.blocks.is_empty() {
            note.blocks.push(Block::text(""));
        }
        Self { note, focused_block_id: None }
    }

    pub fn note(&self) -> &Note {
        &self.note
    }

    pub fn blocks(&self) -> &[Block] {
        &self.note.blocks
    }

    pub fn block(&self, id: Uuid) -> Option<&Block> {
        self.note.blocks.iter().find(|b| b.id == id)
    }

    pub fn focused_block_id(&self) -> Option<Uuid> {
        self.focused_block_id
    }

    /// Advisory focus tracking; has no effect on persistence.
    pub fn set_focus(&mut self, id: Option<Uuid>) -> bool {
        match id {
            Some(id) if self.index_of(id).is_none() => false,
            _ => {
                self.focused_block_id = id;
                true
            }
        }
    }

    // ── Mutations ──────────────────────────────────────────────────

    /// Insert at `index` (clamped to the sequence length). Rejects a
    /// block whose id is already present.
    pub fn insert_block(&mut self, index: usize, block: Block) -> bool {
        if self.index_of(block.id).is_some() {
            return false;
        }
        let index = index.min(self.note.blocks.len());
        self.note.blocks.insert(index, block);
        self.note.touch();
        true
    }

    /// Replace a block's content. No-op for unknown ids and for writes
    /// that change nothing.
    pub fn update_content(&mut self, id: Uuid, content: &str) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        if self.note.blocks[index].content == content {
            return false;
        }
        self.note.blocks[index].content = content.to_string();
        self.note.touch();
        true
    }

    /// Flip a checklist item's completion flag. No-op for unknown ids,
    /// non-todo blocks, and writes that change nothing.
    pub fn set_todo_done(&mut self, id: Uuid, done: bool) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        match &mut self.note.blocks[index].kind {
            BlockKind::Todo { done: current } if *current != done => {
                *current = done;
                self.note.touch();
                true
            }
            _ => false,
        }
    }

    /// Remove a block. Removing the last remaining block reseeds a
    /// fresh empty text block: a note never reaches zero blocks.
    pub fn remove_block(&mut self, id: Uuid) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        self.note.blocks.remove(index);
        if self.note.blocks.is_empty() {
            self.note.blocks.push(Block::text(""));
        }
        if self.focused_block_id == Some(id) {
            self.focused_block_id = None;
        }
        self.note.touch();
        true
    }

    /// Move a block to `to_index` (clamped). No-op if it is already
    /// there or the id is unknown.
    pub fn move_block(&mut self, id: Uuid, to_index: usize) -> bool {
        let Some(from) = self.index_of(id) else {
            return false;
        };
        let to_index = to_index.min(self.note.blocks.len() - 1);
        if from == to_index {
            return false;
        }
        let block = self.note.blocks.remove(from);
        self.note.blocks.insert(to_index, block);
        self.note.touch();
        true
    }

    pub fn set_title(&mut self, title: &str) -> bool {
        if self.note.title == title {
            return false;
        }
        self.note.title = title.to_string();
        self.note.touch();
        true
    }

    pub fn set_folder(&mut self, folder: Option<String>) -> bool {
        if self.note.folder == folder {
            return false;
        }
        self.note.folder = folder;
        self.note.touch();
        true
    }

    pub fn set_locked(&mut self, locked: bool) -> bool {
        if self.note.locked == locked {
            return false;
        }
        self.note.locked = locked;
        self.note.touch();
        true
    }

    // ── Serialization boundaries ───────────────────────────────────

    /// Newline-joined block contents. Total and non-blocking; used for
    /// emptiness checks and as AI pipeline input.
    pub fn to_plain_text(&self) -> String {
        self.note.to_plain_text()
    }

    pub fn to_markdown(&self) -> String {
        markdown::serialize(&self.note.blocks)
    }

    /// Wholesale replacement of the block sequence from markdown. Used
    /// only by undo/redo restore and AI replace, never for incremental
    /// edits. Block ids are regenerated, so focus is dropped.
    pub fn replace_from_markdown(&mut self, text: &str) {
        self.note.blocks = markdown::deserialize(text);
        self.focused_block_id = None;
        self.note.touch();
    }

    /// Append blocks parsed from markdown after the existing sequence
    /// (the AI add-more "append" choice). Blank input appends nothing.
    pub fn append_from_markdown(&mut self, text: &str) -> bool {
        let parsed = markdown::deserialize(text);
        if parsed.iter().all(Block::is_empty) {
            return false;
        }
        self.note.blocks.extend(parsed);
        self.note.touch();
        true
    }

    /// Value snapshot of the persistable state (title, blocks, folder,
    /// lock flag) for the sync engine.
    pub fn snapshot(&self) -> NoteSnapshot {
        NoteSnapshot {
            title: self.note.title.clone(),
            folder: self.note.folder.clone(),
            locked: self.note.locked,
            blocks: self.note.blocks.clone(),
        }
    }

    fn index_of(&self, id: Uuid) -> Option<usize> {
        self.note.blocks.iter().position(|b| b.id == id)
    }
}

impl Default for DocumentController {
    fn default() -> Self {
        Self::new()
    }
}
