// Editor session orchestration.
//
// One `EditorSession` per opened note, constructed with explicit
// collaborator handles rather than ambient globals. The session owns
// the controller and undo stack behind a std mutex (never held across
// an await) and fans every successful mutation out to undo recording,
// the autosave loop, and the date-detection scan.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use jotter_common::block::Block;
use jotter_common::note::Note;

use crate::ai::{
    self, AiTransformer, ExpansionChoice, PendingExpansion, TransformError, TransformOp,
    TransformState,
};
use crate::autosave::{run_autosave, AutosaveOptions, EditSignal, SnapshotSource};
use crate::config::EditorConfig;
use crate::detect::{self, DateDetector, EventPrompt};
use crate::editor::DocumentController;
use crate::sync::{
    AttachmentUploader, ImageCache, ImageData, NoteStore, SavePayload, SyncEngine,
};
use crate::undo::UndoStack;

/// Collaborator handles injected per session.
pub struct SessionDeps {
    pub store: Arc<dyn NoteStore>,
    pub uploader: Arc<dyn AttachmentUploader>,
    pub image_cache: Arc<dyn ImageCache>,
    pub transformer: Arc<dyn AiTransformer>,
    pub detector: Arc<dyn DateDetector>,
}

struct SessionState {
    controller: DocumentController,
    undo: UndoStack,
    transform: TransformState,
    event_prompt: Option<EventPrompt>,
    /// The event prompt is one-shot per session.
    event_prompt_raised: bool,
    images: Vec<ImageData>,
}

/// Captures the freshest state for the autosave loop at fire time.
struct SharedState(Arc<StdMutex<SessionState>>);

impl SnapshotSource for SharedState {
    fn capture(&self) -> SavePayload {
        let state = self.0.lock().expect("session state lock poisoned");
        SavePayload { snapshot: state.controller.snapshot(), images: state.images.clone() }
    }
}

/// One editing session over one note: the single logical writer.
pub struct EditorSession {
    state: Arc<StdMutex<SessionState>>,
    sync: Arc<SyncEngine>,
    transformer: Arc<dyn AiTransformer>,
    detector: Arc<dyn DateDetector>,
    edit_tx: mpsc::UnboundedSender<EditSignal>,
    shutdown_tx: broadcast::Sender<()>,
}

impl EditorSession {
    /// Open a session over an existing note, rehydrating attachments
    /// from the image cache, and start its autosave loop. Must run
    /// inside a tokio runtime.
    pub async fn open(note: Note, deps: SessionDeps, config: &EditorConfig) -> Self {
        let sync = Arc::new(SyncEngine::new(
            deps.store,
            deps.uploader,
            deps.image_cache,
            note.clone(),
        ));
        let images = sync.rehydrate_attachments().await;

        let state = Arc::new(StdMutex::new(SessionState {
            controller: DocumentController::from_note(note),
            undo: UndoStack::new(config.undo.effective_depth()),
            transform: TransformState::Idle,
            event_prompt: None,
            event_prompt_raised: false,
            images,
        }));

        let (edit_tx, edit_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let options = AutosaveOptions {
            window: config.autosave.debounce_window(),
            poll_interval: Duration::from_millis(50),
        };
        tokio::spawn(run_autosave(
            edit_rx,
            Arc::new(SharedState(Arc::clone(&state))),
            Arc::clone(&sync),
            options,
            shutdown_rx,
        ));

        info!("editor session opened");
        Self {
            state,
            sync,
            transformer: deps.transformer,
            detector: deps.detector,
            edit_tx,
            shutdown_tx,
        }
    }

    /// Open a session over a brand-new note (one empty text block).
    pub async fn open_new(deps: SessionDeps, config: &EditorConfig) -> Self {
        Self::open(Note::new(), deps, config).await
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// The working note as the controller sees it.
    pub fn note(&self) -> Note {
        self.lock().controller.note().clone()
    }

    /// The app-visible cached note (optimistically synced state).
    pub fn cached_note(&self) -> Note {
        self.sync.cached_note()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.lock().controller.blocks().to_vec()
    }

    pub fn to_plain_text(&self) -> String {
        self.lock().controller.to_plain_text()
    }

    pub fn to_markdown(&self) -> String {
        self.lock().controller.to_markdown()
    }

    pub fn can_undo(&self) -> bool {
        self.lock().undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.lock().undo.can_redo()
    }

    pub fn transform_state(&self) -> TransformState {
        self.lock().transform.clone()
    }

    /// Consume the one-shot calendar-event prompt, if one was raised.
    pub fn take_event_prompt(&self) -> Option<EventPrompt> {
        self.lock().event_prompt.take()
    }

    // ── Mutations (fan out on success) ─────────────────────────────

    pub fn insert_block(&self, index: usize, block: Block) -> bool {
        let id = block.id;
        let mut state = self.lock();
        let applied = state.controller.insert_block(index, block);
        if applied {
            self.after_mutation(&mut state, Some(id));
        }
        applied
    }

    pub fn update_content(&self, id: Uuid, content: &str) -> bool {
        let mut state = self.lock();
        let applied = state.controller.update_content(id, content);
        if applied {
            self.after_mutation(&mut state, Some(id));
        }
        applied
    }

    pub fn set_todo_done(&self, id: Uuid, done: bool) -> bool {
        let mut state = self.lock();
        let applied = state.controller.set_todo_done(id, done);
        if applied {
            self.after_mutation(&mut state, Some(id));
        }
        applied
    }

    pub fn remove_block(&self, id: Uuid) -> bool {
        let mut state = self.lock();
        let applied = state.controller.remove_block(id);
        if applied {
            self.after_mutation(&mut state, None);
        }
        applied
    }

    pub fn move_block(&self, id: Uuid, to_index: usize) -> bool {
        let mut state = self.lock();
        let applied = state.controller.move_block(id, to_index);
        if applied {
            self.after_mutation(&mut state, Some(id));
        }
        applied
    }

    pub fn set_title(&self, title: &str) -> bool {
        let mut state = self.lock();
        let applied = state.controller.set_title(title);
        if applied {
            self.after_mutation(&mut state, None);
        }
        applied
    }

    pub fn set_folder(&self, folder: Option<String>) -> bool {
        let mut state = self.lock();
        let applied = state.controller.set_folder(folder);
        if applied {
            self.after_mutation(&mut state, None);
        }
        applied
    }

    pub fn set_locked(&self, locked: bool) -> bool {
        let mut state = self.lock();
        let applied = state.controller.set_locked(locked);
        if applied {
            self.after_mutation(&mut state, None);
        }
        applied
    }

    /// Advisory focus tracking; no undo entry, no autosave.
    pub fn set_focus(&self, id: Option<Uuid>) -> bool {
        self.lock().controller.set_focus(id)
    }

    /// Hand a newly picked image to the session. Upload happens on the
    /// next save (or once the note exists remotely).
    pub fn attach_image(&self, image: ImageData) {
        self.lock().images.push(image);
        let _ = self.edit_tx.send(EditSignal);
    }

    // ── Undo / redo ────────────────────────────────────────────────

    pub fn undo(&self) -> bool {
        let mut state = self.lock();
        let Some(text) = state.undo.undo() else {
            return false;
        };
        state.controller.replace_from_markdown(&text);
        drop(state);
        let _ = self.edit_tx.send(EditSignal);
        true
    }

    pub fn redo(&self) -> bool {
        let mut state = self.lock();
        let Some(text) = state.undo.redo() else {
            return false;
        };
        state.controller.replace_from_markdown(&text);
        drop(state);
        let _ = self.edit_tx.send(EditSignal);
        true
    }

    // ── AI transforms ──────────────────────────────────────────────

    /// Reformat the note in place. Low risk: same content, cleaned up.
    pub async fn cleanup(&self) -> Result<(), TransformError> {
        let text = self.begin_transform(TransformOp::Cleanup, None)?;
        let result = self.transformer.cleanup(text).await.and_then(ai::normalize_result);
        self.finish_replace(TransformOp::Cleanup, result)
    }

    /// Replace the note with a summary of itself.
    pub async fn summarize(&self) -> Result<(), TransformError> {
        let text = self.begin_transform(TransformOp::Summarize, None)?;
        let result = self.transformer.summarize(text).await.and_then(ai::normalize_result);
        self.finish_replace(TransformOp::Summarize, result)
    }

    /// Generate additional content per `instruction`. The result is NOT
    /// applied; it is held until `resolve_expansion` picks append,
    /// replace, or cancel.
    pub async fn add_more(&self, instruction: &str) -> Result<(), TransformError> {
        let text = self.begin_transform(TransformOp::AddMore, Some(instruction))?;
        let result = self
            .transformer
            .expand(text, instruction.to_string())
            .await
            .and_then(ai::normalize_result);

        let mut state = self.lock();
        match result {
            Ok(markdown) => {
                state.transform = TransformState::AwaitingChoice(PendingExpansion { markdown });
                Ok(())
            }
            Err(error) => {
                state.transform = TransformState::Idle;
                warn!(%error, "add-more failed; document untouched");
                Err(error)
            }
        }
    }

    /// The held add-more result, if any.
    pub fn pending_expansion(&self) -> Option<PendingExpansion> {
        match &self.lock().transform {
            TransformState::AwaitingChoice(pending) => Some(pending.clone()),
            _ => None,
        }
    }

    /// Apply the user's choice for a held add-more result.
    pub fn resolve_expansion(&self, choice: ExpansionChoice) -> Result<(), TransformError> {
        let mut state = self.lock();
        let TransformState::AwaitingChoice(pending) = state.transform.clone() else {
            return Err(TransformError::NothingPending);
        };
        state.transform = TransformState::Idle;

        let applied = match choice {
            ExpansionChoice::Cancel => false,
            ExpansionChoice::Append => state.controller.append_from_markdown(&pending.markdown),
            ExpansionChoice::Replace => {
                state.controller.replace_from_markdown(&pending.markdown);
                true
            }
        };

        if applied {
            let snapshot = state.controller.to_markdown();
            state.undo.record(&snapshot);
            drop(state);
            let _ = self.edit_tx.send(EditSignal);
        }
        Ok(())
    }

    /// Guards, pre-transform undo snapshot, and the Running transition.
    /// The lock is released before any await.
    fn begin_transform(
        &self,
        op: TransformOp,
        instruction: Option<&str>,
    ) -> Result<String, TransformError> {
        let mut state = self.lock();
        if state.transform.is_busy() {
            return Err(TransformError::Busy);
        }
        let text = state.controller.to_plain_text();
        if text.trim().is_empty() {
            return Err(TransformError::EmptyDocument);
        }
        if op == TransformOp::AddMore && instruction.map_or(true, |i| i.trim().is_empty()) {
            return Err(TransformError::EmptyInstruction);
        }

        // The pre-transform state is always recoverable, even if the
        // response arrives out of order with further edits.
        let snapshot = state.controller.to_markdown();
        state.undo.record(&snapshot);
        state.transform = TransformState::Running(op);
        Ok(text)
    }

    fn finish_replace(
        &self,
        op: TransformOp,
        result: Result<String, TransformError>,
    ) -> Result<(), TransformError> {
        let mut state = self.lock();
        state.transform = TransformState::Idle;
        match result {
            Ok(markdown) => {
                state.controller.replace_from_markdown(&markdown);
                let snapshot = state.controller.to_markdown();
                state.undo.record(&snapshot);
                drop(state);
                let _ = self.edit_tx.send(EditSignal);
                info!(op = op.as_str(), "transform applied");
                Ok(())
            }
            Err(error) => {
                warn!(op = op.as_str(), %error, "transform failed; document untouched");
                Err(error)
            }
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Save-and-dismiss. The session ends immediately; the final save
    /// and any pending upload run to completion in the background. The
    /// returned handles may be awaited but never need to be.
    pub fn finish(self) -> Vec<JoinHandle<()>> {
        let _ = self.shutdown_tx.send(());
        let payload = {
            let state = self.lock();
            SavePayload { snapshot: state.controller.snapshot(), images: state.images.clone() }
        };
        let tasks = self.sync.save(payload);
        info!("editor session finished");
        tasks
    }

    /// Delete the note (if it was ever created remotely) and end the
    /// session.
    pub fn delete(self) -> Option<JoinHandle<()>> {
        let _ = self.shutdown_tx.send(());
        let task = self.sync.delete();
        info!("editor session ended with delete");
        task
    }

    // ── Internals ──────────────────────────────────────────────────

    fn after_mutation(&self, state: &mut SessionState, edited_block: Option<Uuid>) {
        let snapshot = state.controller.to_markdown();
        state.undo.record(&snapshot);
        self.maybe_raise_event_prompt(state, edited_block);
        let _ = self.edit_tx.send(EditSignal);
    }

    fn maybe_raise_event_prompt(&self, state: &mut SessionState, edited_block: Option<Uuid>) {
        if state.event_prompt_raised {
            return;
        }
        let target = edited_block.or_else(|| state.controller.focused_block_id());
        let Some(block) = target.and_then(|id| state.controller.block(id)) else {
            return;
        };
        let today = Utc::now().date_naive();
        if let Some(prompt) = detect::scan_block(self.detector.as_ref(), block, today) {
            debug!(date = %prompt.date, "calendar-like date detected");
            state.event_prompt = Some(prompt);
            state.event_prompt_raised = true;
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().expect("session state lock poisoned")
    }
}
