// Optimistic sync: edits become visible in the local note cache
// immediately; persistence and attachment upload run as background
// tasks that merge their results against the then-current note.
//
// Every save transmits the full current state, so out-of-order or
// repeated sends are harmless (the store's update is idempotent).
// Attachment URL merges re-read the cache under the lock rather than
// closing over the snapshot captured when the upload started; that is
// the anti-lost-update rule.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use jotter_common::markdown;
use jotter_common::note::Note;

use crate::editor::NoteSnapshot;

// ── Collaborator contracts ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Transient I/O failure; retried with backoff.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Permanent rejection; not retried.
    #[error("store rejected the note: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("attachment upload failed: {0}")]
    Failed(String),
}

/// Raw image bytes handed over by the picker or the image cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
}

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Remote persistence store. `update` must tolerate repeated calls with
/// the same content.
pub trait NoteStore: Send + Sync {
    fn create(&self, note: Note) -> BoxFuture<Result<Uuid, StoreError>>;
    fn update(&self, note: Note) -> BoxFuture<Result<(), StoreError>>;
    fn delete(&self, note_id: Uuid) -> BoxFuture<Result<(), StoreError>>;
}

/// Attachment uploader: one URL per input image, order-preserving.
pub trait AttachmentUploader: Send + Sync {
    fn upload(&self, images: Vec<ImageData>, owner_id: Uuid)
        -> BoxFuture<Result<Vec<String>, UploadError>>;
}

/// Rehydrates previously uploaded attachments when a session resumes.
pub trait ImageCache: Send + Sync {
    fn load(&self, url: &str) -> BoxFuture<Option<ImageData>>;
}

// ── Backoff ─────────────────────────────────────────────────────────

const BASE_DELAY_MS: u64 = 250;
const MAX_DELAY_MS: u64 = 10_000;
const MAX_ATTEMPTS: u32 = 4;

/// Exponential backoff delay for a given attempt number (0-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.min(6); // cap exponent to avoid overflow
    let delay_ms = BASE_DELAY_MS.saturating_mul(1u64 << exp).min(MAX_DELAY_MS);
    Duration::from_millis(delay_ms)
}

trait TransientError {
    fn is_transient(&self) -> bool;
}

impl TransientError for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl TransientError for UploadError {
    fn is_transient(&self) -> bool {
        true
    }
}

async fn with_retry<T, E, F>(op_name: &str, mut op: F) -> Result<T, E>
where
    E: TransientError + std::fmt::Display,
    F: FnMut() -> BoxFuture<Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                warn!(%error, attempt, "transient {op_name} failure, backing off");
                tokio::time::sleep(backoff_delay(attempt)).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

// ── Payload & cache state ───────────────────────────────────────────

/// Everything the autosave/dismiss paths hand over per save: the value
/// snapshot of the controller state plus the session's local images.
#[derive(Debug, Clone)]
pub struct SavePayload {
    pub snapshot: NoteSnapshot,
    pub images: Vec<ImageData>,
}

struct CacheState {
    note: Note,
    /// The session's local image list as of the latest save.
    local_images: Vec<ImageData>,
    /// How many of the session's local images are already uploaded.
    uploaded_count: usize,
    /// Content hash of the last state sent to the store successfully
    /// (or in flight); suppresses no-op saves.
    persisted_hash: Option<String>,
    create_in_flight: bool,
    upload_in_flight: bool,
}

/// Per-session sync engine over one note. Cloning is cheap (shared
/// state behind Arcs); background tasks hold their own clone.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn NoteStore>,
    uploader: Arc<dyn AttachmentUploader>,
    images: Arc<dyn ImageCache>,
    state: Arc<StdMutex<CacheState>>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn NoteStore>,
        uploader: Arc<dyn AttachmentUploader>,
        images: Arc<dyn ImageCache>,
        note: Note,
    ) -> Self {
        let uploaded_count = note.attachments.len();
        Self {
            store,
            uploader,
            images,
            state: Arc::new(StdMutex::new(CacheState {
                note,
                local_images: Vec::new(),
                uploaded_count,
                persisted_hash: None,
                create_in_flight: false,
                upload_in_flight: false,
            })),
        }
    }

    /// The app-visible cached note, reflecting every optimistic apply
    /// and merged attachment URL so far.
    pub fn cached_note(&self) -> Note {
        self.lock().note.clone()
    }

    pub fn uploaded_count(&self) -> usize {
        self.lock().uploaded_count
    }

    /// Apply a payload optimistically and persist in the background.
    ///
    /// Returns handles to the spawned tasks so the caller *may* await
    /// them; dropping the handles leaves the tasks running to
    /// completion (dismissal never cancels in-flight persistence).
    pub fn save(&self, payload: SavePayload) -> Vec<JoinHandle<()>> {
        self.lock().local_images = payload.images;

        let mut tasks = Vec::new();
        if let Some(handle) = self.apply_and_persist(payload.snapshot) {
            tasks.push(handle);
        }
        if let Some(handle) = self.upload_new_attachments() {
            tasks.push(handle);
        }
        tasks
    }

    /// Delete the note remotely, if it was ever created.
    pub fn delete(&self) -> Option<JoinHandle<()>> {
        let remote_id = self.lock().note.remote_id?;
        let store = Arc::clone(&self.store);
        Some(tokio::spawn(async move {
            match with_retry("delete", || store.delete(remote_id)).await {
                Ok(()) => info!(%remote_id, "note deleted"),
                Err(error) => warn!(%error, "delete failed"),
            }
        }))
    }

    /// Load previously uploaded attachments from the image cache and
    /// align the upload watermark with what actually came back. Call
    /// once when resuming a session, before accepting new images.
    pub async fn rehydrate_attachments(&self) -> Vec<ImageData> {
        let urls = self.lock().note.attachments.clone();
        let mut rehydrated = Vec::with_capacity(urls.len());
        for url in urls {
            match self.images.load(&url).await {
                Some(image) => rehydrated.push(image),
                None => debug!(%url, "attachment missing from image cache"),
            }
        }
        self.lock().uploaded_count = rehydrated.len();
        rehydrated
    }

    // ── Persistence ────────────────────────────────────────────────

    fn apply_and_persist(&self, snapshot: NoteSnapshot) -> Option<JoinHandle<()>> {
        let (note, hash, is_create) = {
            let mut state = self.lock();
            state.note.title = snapshot.title;
            state.note.folder = snapshot.folder;
            state.note.locked = snapshot.locked;
            state.note.blocks = snapshot.blocks;
            state.note.touch();

            if state.note.is_blank() {
                trace!("blank note, skipping persistence");
                return None;
            }
            let hash = content_hash(&state.note);
            if state.persisted_hash.as_deref() == Some(hash.as_str()) {
                trace!("content unchanged since last persist, skipping");
                return None;
            }

            let is_create = state.note.remote_id.is_none();
            if is_create {
                if state.create_in_flight {
                    // The in-flight create issues a follow-up update
                    // with the then-current state once it has an id.
                    return None;
                }
                state.create_in_flight = true;
            }
            (state.note.clone(), hash, is_create)
        };

        let engine = self.clone();
        Some(tokio::spawn(async move {
            if is_create {
                engine.run_create(note, hash).await;
            } else {
                engine.run_update(note, hash).await;
            }
        }))
    }

    async fn run_create(&self, note: Note, sent_hash: String) {
        let store = Arc::clone(&self.store);
        let result = with_retry("create", || store.create(note.clone())).await;

        let follow_up = {
            let mut state = self.lock();
            state.create_in_flight = false;
            match result {
                Ok(remote_id) => {
                    state.note.remote_id = Some(remote_id);
                    state.persisted_hash = Some(sent_hash.clone());
                    info!(%remote_id, "note created");

                    // Edits may have landed while the create was in
                    // flight; catch up from the then-current state.
                    let current_hash = content_hash(&state.note);
                    if current_hash != sent_hash && !state.note.is_blank() {
                        Some((state.note.clone(), current_hash))
                    } else {
                        None
                    }
                }
                Err(error) => {
                    warn!(%error, "create failed; the next autosave retries");
                    None
                }
            }
        };

        if let Some((note, hash)) = follow_up {
            self.run_update(note, hash).await;
        }

        // Images handed over before the note existed upload now that an
        // owner id is available.
        if let Some(handle) = self.upload_new_attachments() {
            if let Err(error) = handle.await {
                warn!(%error, "deferred attachment upload task failed");
            }
        }
    }

    async fn run_update(&self, note: Note, sent_hash: String) {
        let store = Arc::clone(&self.store);
        match with_retry("update", || store.update(note.clone())).await {
            Ok(()) => {
                self.lock().persisted_hash = Some(sent_hash);
                debug!("note updated");
            }
            Err(error) => warn!(%error, "update failed; the next autosave retries"),
        }
    }

    // ── Attachments ────────────────────────────────────────────────

    fn upload_new_attachments(&self) -> Option<JoinHandle<()>> {
        let (delta, owner_id) = {
            let mut state = self.lock();
            if state.upload_in_flight || state.local_images.len() <= state.uploaded_count {
                return None;
            }
            let Some(owner_id) = state.note.remote_id else {
                // Not created yet; the delta goes up once the create
                // lands (`run_create` re-checks) or on a later save.
                trace!("no remote id yet, deferring attachment upload");
                return None;
            };
            let delta = state.local_images[state.uploaded_count..].to_vec();
            state.upload_in_flight = true;
            (delta, owner_id)
        };

        let engine = self.clone();
        Some(tokio::spawn(async move {
            let count = delta.len();
            let uploader = Arc::clone(&engine.uploader);
            match with_retry("upload", || uploader.upload(delta.clone(), owner_id)).await {
                Ok(urls) => {
                    if urls.len() != count {
                        warn!(expected = count, got = urls.len(), "uploader URL count mismatch");
                    }
                    let (note, hash) = {
                        let mut state = engine.lock();
                        state.upload_in_flight = false;
                        state.uploaded_count += count;
                        // Merge into the then-current note, not the
                        // payload captured when the upload started.
                        state.note.attachments.extend(urls);
                        state.note.touch();
                        let hash = content_hash(&state.note);
                        (state.note.clone(), hash)
                    };
                    engine.run_update(note, hash).await;
                }
                Err(error) => {
                    warn!(%error, "attachment upload failed; the next autosave retries");
                    engine.lock().upload_in_flight = false;
                }
            }
        }))
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().expect("sync cache lock poisoned")
    }
}

/// Hash of the persistable content, used to suppress no-op saves.
fn content_hash(note: &Note) -> String {
    let mut hasher = Sha256::new();
    hasher.update(note.title.as_bytes());
    hasher.update([0xff]);
    hasher.update(note.folder.as_deref().unwrap_or_default().as_bytes());
    hasher.update([u8::from(note.locked)]);
    hasher.update(markdown::serialize(&note.blocks).as_bytes());
    for url in &note.attachments {
        hasher.update([0xfe]);
        hasher.update(url.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
