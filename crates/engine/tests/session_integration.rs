// End-to-end editing session scenarios: debounce coalescing, empty-note
// suppression, the cleanup/undo flow, and add-more confirmation choices,
// all against mock collaborators.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use uuid::Uuid;

use jotter_common::block::BlockKind;
use jotter_common::note::Note;
use jotter_engine::ai::{AiTransformer, ExpansionChoice, TransformError, TransformState};
use jotter_engine::config::{AutosaveConfig, EditorConfig};
use jotter_engine::detect::{DateDetector, RegexDateDetector};
use jotter_engine::session::{EditorSession, SessionDeps};
use jotter_engine::sync::{
    AttachmentUploader, BoxFuture, ImageCache, ImageData, NoteStore, StoreError, UploadError,
};

// ── Mock collaborators ─────────────────────────────────────────────

#[derive(Default)]
struct MockStore {
    created: Mutex<Vec<Note>>,
    updated: Mutex<Vec<Note>>,
    deleted: Mutex<Vec<Uuid>>,
}

impl MockStore {
    fn persist_calls(&self) -> usize {
        self.created.lock().unwrap().len() + self.updated.lock().unwrap().len()
    }

    fn last_persisted(&self) -> Option<Note> {
        let updated = self.updated.lock().unwrap();
        if let Some(note) = updated.last() {
            return Some(note.clone());
        }
        self.created.lock().unwrap().last().cloned()
    }
}

impl NoteStore for MockStore {
    fn create(&self, note: Note) -> BoxFuture<Result<Uuid, StoreError>> {
        self.created.lock().unwrap().push(note);
        Box::pin(async { Ok(Uuid::new_v4()) })
    }

    fn update(&self, note: Note) -> BoxFuture<Result<(), StoreError>> {
        self.updated.lock().unwrap().push(note);
        Box::pin(async { Ok(()) })
    }

    fn delete(&self, note_id: Uuid) -> BoxFuture<Result<(), StoreError>> {
        self.deleted.lock().unwrap().push(note_id);
        Box::pin(async { Ok(()) })
    }
}

#[derive(Default)]
struct MockUploader {
    calls: Mutex<Vec<usize>>,
    counter: AtomicU32,
}

impl AttachmentUploader for MockUploader {
    fn upload(
        &self,
        images: Vec<ImageData>,
        _owner_id: Uuid,
    ) -> BoxFuture<Result<Vec<String>, UploadError>> {
        self.calls.lock().unwrap().push(images.len());
        let base = self.counter.fetch_add(images.len() as u32, Ordering::SeqCst);
        Box::pin(async move {
            Ok((0..images.len())
                .map(|i| format!("https://cdn.example.com/{}.png", base as usize + i))
                .collect())
        })
    }
}

struct EmptyImageCache;

impl ImageCache for EmptyImageCache {
    fn load(&self, _url: &str) -> BoxFuture<Option<ImageData>> {
        Box::pin(async { None })
    }
}

/// Transformer with canned responses per operation.
struct CannedTransformer {
    cleanup: Result<String, TransformError>,
    summarize: Result<String, TransformError>,
    expand: Result<String, TransformError>,
}

impl CannedTransformer {
    fn ok(cleanup: &str, summarize: &str, expand: &str) -> Self {
        Self {
            cleanup: Ok(cleanup.to_string()),
            summarize: Ok(summarize.to_string()),
            expand: Ok(expand.to_string()),
        }
    }

    fn failing() -> Self {
        let error = TransformError::Service("service offline".into());
        Self { cleanup: Err(error.clone()), summarize: Err(error.clone()), expand: Err(error) }
    }
}

impl AiTransformer for CannedTransformer {
    fn cleanup(
        &self,
        _text: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransformError>> + Send>> {
        let result = self.cleanup.clone();
        Box::pin(async move { result })
    }

    fn summarize(
        &self,
        _text: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransformError>> + Send>> {
        let result = self.summarize.clone();
        Box::pin(async move { result })
    }

    fn expand(
        &self,
        _text: String,
        _instruction: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransformError>> + Send>> {
        let result = self.expand.clone();
        Box::pin(async move { result })
    }
}

/// Transformer whose cleanup blocks until released, to observe the
/// Running state from outside.
struct GatedTransformer {
    gate: Arc<Notify>,
}

impl AiTransformer for GatedTransformer {
    fn cleanup(
        &self,
        text: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransformError>> + Send>> {
        let gate = Arc::clone(&self.gate);
        Box::pin(async move {
            gate.notified().await;
            Ok(format!("cleaned: {text}"))
        })
    }

    fn summarize(
        &self,
        _text: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransformError>> + Send>> {
        Box::pin(async { Err(TransformError::Service("unused".into())) })
    }

    fn expand(
        &self,
        _text: String,
        _instruction: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransformError>> + Send>> {
        Box::pin(async { Err(TransformError::Service("unused".into())) })
    }
}

struct NullDetector;

impl DateDetector for NullDetector {
    fn find_dates(&self, _text: &str) -> Vec<chrono::NaiveDate> {
        Vec::new()
    }
}

// ── Harness ────────────────────────────────────────────────────────

fn deps(store: Arc<MockStore>, transformer: Arc<dyn AiTransformer>) -> SessionDeps {
    SessionDeps {
        store,
        uploader: Arc::new(MockUploader::default()),
        image_cache: Arc::new(EmptyImageCache),
        transformer,
        detector: Arc::new(NullDetector),
    }
}

fn fast_config() -> EditorConfig {
    EditorConfig { autosave: AutosaveConfig { debounce_ms: 250 }, ..EditorConfig::default() }
}

async fn wait_for(condition: impl Fn() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ── Debounce coalescing ────────────────────────────────────────────

#[tokio::test]
async fn edits_within_the_window_coalesce_into_one_save() {
    let store = Arc::new(MockStore::default());
    let transformer = Arc::new(CannedTransformer::ok("x", "x", "x"));
    let session =
        EditorSession::open_new(deps(Arc::clone(&store), transformer), &fast_config()).await;

    let id = session.blocks()[0].id;
    for i in 0..5 {
        assert!(session.update_content(id, &format!("draft {i}")));
    }

    wait_for(|| store.persist_calls() == 1, "the coalesced save").await;
    // No further saves show up after the burst.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.persist_calls(), 1);
    assert_eq!(store.last_persisted().unwrap().blocks[0].content, "draft 4");
}

#[tokio::test]
async fn edits_spaced_beyond_the_window_each_save() {
    let store = Arc::new(MockStore::default());
    let transformer = Arc::new(CannedTransformer::ok("x", "x", "x"));
    let session =
        EditorSession::open_new(deps(Arc::clone(&store), transformer), &fast_config()).await;

    let id = session.blocks()[0].id;
    session.update_content(id, "first");
    wait_for(|| store.persist_calls() == 1, "first save").await;

    session.update_content(id, "second");
    wait_for(|| store.persist_calls() == 2, "second save").await;
    assert_eq!(store.created.lock().unwrap().len(), 1);
    assert_eq!(store.updated.lock().unwrap().len(), 1);
}

// ── Empty-note suppression ─────────────────────────────────────────

#[tokio::test]
async fn content_typed_and_deleted_before_dismissal_never_persists() {
    let store = Arc::new(MockStore::default());
    let transformer = Arc::new(CannedTransformer::ok("x", "x", "x"));
    let session =
        EditorSession::open_new(deps(Arc::clone(&store), transformer), &fast_config()).await;

    let id = session.blocks()[0].id;
    session.update_content(id, "scratch thought");
    session.update_content(id, "");

    for task in session.finish() {
        task.await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.persist_calls(), 0, "a blank note must never be created or updated");
}

// ── Cleanup / undo scenario ────────────────────────────────────────

#[tokio::test]
async fn cleanup_then_undo_twice_lands_on_the_oldest_state() {
    let store = Arc::new(MockStore::default());
    let transformer = Arc::new(CannedTransformer::ok("- [ ] Buy milk", "x", "x"));
    let session =
        EditorSession::open_new(deps(Arc::clone(&store), transformer), &fast_config()).await;

    let id = session.blocks()[0].id;
    assert!(session.update_content(id, "Buy milk"));

    session.cleanup().await.unwrap();
    assert_eq!(session.blocks()[0].kind, BlockKind::Todo { done: false });
    assert_eq!(session.blocks()[0].content, "Buy milk");

    assert!(session.undo(), "first undo restores the pre-transform text");
    assert_eq!(session.blocks()[0].kind, BlockKind::Text);
    assert_eq!(session.blocks()[0].content, "Buy milk");

    assert!(!session.undo(), "already at the oldest retained state");
    assert_eq!(session.blocks()[0].content, "Buy milk");
}

#[tokio::test]
async fn redo_restores_an_undone_transform() {
    let store = Arc::new(MockStore::default());
    let transformer = Arc::new(CannedTransformer::ok("# Tidy", "x", "x"));
    let session =
        EditorSession::open_new(deps(Arc::clone(&store), transformer), &fast_config()).await;

    let id = session.blocks()[0].id;
    session.update_content(id, "tidy");
    session.cleanup().await.unwrap();

    assert!(session.undo());
    assert_eq!(session.to_markdown(), "tidy");
    assert!(session.redo());
    assert_eq!(session.to_markdown(), "# Tidy");
}

// ── Add-more confirmation scenario ─────────────────────────────────

const EXPANSION: &str = "- [ ] book flights by 2026-09-01";

async fn session_awaiting_choice(store: Arc<MockStore>) -> EditorSession {
    let transformer = Arc::new(CannedTransformer::ok("x", "x", EXPANSION));
    let session = EditorSession::open_new(deps(store, transformer), &fast_config()).await;
    let id = session.blocks()[0].id;
    session.update_content(id, "Plan the trip");
    session.add_more("add a deadline").await.unwrap();
    session
}

#[tokio::test]
async fn add_more_result_is_held_not_applied() {
    let session = session_awaiting_choice(Arc::new(MockStore::default())).await;

    assert_eq!(session.blocks().len(), 1, "result must not apply before a choice");
    assert_eq!(session.pending_expansion().unwrap().markdown, EXPANSION);
}

#[tokio::test]
async fn append_choice_adds_blocks_after_existing_ones() {
    let session = session_awaiting_choice(Arc::new(MockStore::default())).await;

    session.resolve_expansion(ExpansionChoice::Append).unwrap();
    let blocks = session.blocks();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].content, "Plan the trip");
    assert_eq!(blocks[1].kind, BlockKind::Todo { done: false });
}

#[tokio::test]
async fn replace_choice_discards_prior_blocks() {
    let session = session_awaiting_choice(Arc::new(MockStore::default())).await;

    session.resolve_expansion(ExpansionChoice::Replace).unwrap();
    let blocks = session.blocks();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].kind, BlockKind::Todo { done: false });
    assert_eq!(blocks[0].content, "book flights by 2026-09-01");
}

#[tokio::test]
async fn cancel_choice_leaves_the_document_unchanged() {
    let session = session_awaiting_choice(Arc::new(MockStore::default())).await;
    let before = session.to_markdown();

    session.resolve_expansion(ExpansionChoice::Cancel).unwrap();
    assert_eq!(session.to_markdown(), before);
    assert_eq!(session.transform_state(), TransformState::Idle);
    assert!(session.pending_expansion().is_none());

    // A second resolve has nothing to act on.
    assert_eq!(
        session.resolve_expansion(ExpansionChoice::Append),
        Err(TransformError::NothingPending)
    );
}

#[tokio::test]
async fn add_more_requires_an_instruction() {
    let store = Arc::new(MockStore::default());
    let transformer = Arc::new(CannedTransformer::ok("x", "x", EXPANSION));
    let session = EditorSession::open_new(deps(store, transformer), &fast_config()).await;
    let id = session.blocks()[0].id;
    session.update_content(id, "content");

    assert_eq!(session.add_more("   ").await, Err(TransformError::EmptyInstruction));
}

// ── Busy flag & failure semantics ──────────────────────────────────

#[tokio::test]
async fn a_second_transform_is_rejected_while_one_runs() {
    let store = Arc::new(MockStore::default());
    let gate = Arc::new(Notify::new());
    let transformer = Arc::new(GatedTransformer { gate: Arc::clone(&gate) });
    let session =
        Arc::new(EditorSession::open_new(deps(store, transformer), &fast_config()).await);

    let id = session.blocks()[0].id;
    session.update_content(id, "busy test");

    let runner = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.cleanup().await })
    };
    wait_for(|| session.transform_state().is_busy(), "the Running state").await;

    assert_eq!(session.add_more("more").await, Err(TransformError::Busy));
    assert_eq!(session.summarize().await, Err(TransformError::Busy));

    gate.notify_one();
    runner.await.unwrap().unwrap();
    assert_eq!(session.transform_state(), TransformState::Idle);
    assert_eq!(session.to_markdown(), "cleaned: busy test");
}

#[tokio::test]
async fn transform_failure_leaves_the_document_untouched() {
    let store = Arc::new(MockStore::default());
    let transformer = Arc::new(CannedTransformer::failing());
    let session = EditorSession::open_new(deps(store, transformer), &fast_config()).await;

    let id = session.blocks()[0].id;
    session.update_content(id, "precious");
    let before = session.to_markdown();

    let error = session.cleanup().await.unwrap_err();
    assert!(matches!(error, TransformError::Service(_)));
    assert_eq!(session.to_markdown(), before);
    assert_eq!(session.transform_state(), TransformState::Idle);

    // And the session is usable afterwards.
    assert_eq!(session.summarize().await.unwrap_err(), TransformError::Service("service offline".into()));
}

#[tokio::test]
async fn empty_document_rejects_transforms() {
    let store = Arc::new(MockStore::default());
    let transformer = Arc::new(CannedTransformer::ok("x", "x", "x"));
    let session = EditorSession::open_new(deps(store, transformer), &fast_config()).await;

    assert_eq!(session.cleanup().await, Err(TransformError::EmptyDocument));
}

// ── Attachments through the session ────────────────────────────────

#[tokio::test]
async fn picked_images_upload_and_merge_after_create() {
    let store = Arc::new(MockStore::default());
    let uploader = Arc::new(MockUploader::default());
    let transformer: Arc<dyn AiTransformer> = Arc::new(CannedTransformer::ok("x", "x", "x"));
    let session = EditorSession::open(
        Note::new(),
        SessionDeps {
            store: Arc::clone(&store) as Arc<dyn NoteStore>,
            uploader: Arc::clone(&uploader) as Arc<dyn AttachmentUploader>,
            image_cache: Arc::new(EmptyImageCache),
            transformer,
            detector: Arc::new(NullDetector),
        },
        &fast_config(),
    )
    .await;

    let id = session.blocks()[0].id;
    session.update_content(id, "photo note");
    session.attach_image(ImageData { bytes: vec![1, 2, 3] });

    wait_for(|| session.cached_note().attachments.len() == 1, "the merged attachment URL").await;
    assert_eq!(uploader.calls.lock().unwrap().clone(), vec![1]);
    let persisted = store.last_persisted().unwrap();
    assert_eq!(persisted.attachments.len(), 1);
    assert_eq!(persisted.blocks[0].content, "photo note");
}

// ── Event-detection heuristic ──────────────────────────────────────

#[tokio::test]
async fn a_future_date_raises_one_prompt_per_session() {
    let store = Arc::new(MockStore::default());
    let transformer: Arc<dyn AiTransformer> = Arc::new(CannedTransformer::ok("x", "x", "x"));
    let session = EditorSession::open(
        Note::new(),
        SessionDeps {
            store,
            uploader: Arc::new(MockUploader::default()),
            image_cache: Arc::new(EmptyImageCache),
            transformer,
            detector: Arc::new(RegexDateDetector),
        },
        &fast_config(),
    )
    .await;

    let id = session.blocks()[0].id;
    session.update_content(id, "dentist on 2099-01-01");

    let prompt = session.take_event_prompt().expect("future date should prompt");
    assert_eq!(prompt.block_id, id);
    assert_eq!(prompt.date, chrono::NaiveDate::from_ymd_opt(2099, 1, 1).unwrap());

    // One-shot: later date edits stay quiet this session.
    session.update_content(id, "lunch on 2099-02-02");
    assert!(session.take_event_prompt().is_none());
}

// ── Lifecycle ──────────────────────────────────────────────────────

#[tokio::test]
async fn finish_persists_the_freshest_state_in_the_background() {
    let store = Arc::new(MockStore::default());
    let transformer = Arc::new(CannedTransformer::ok("x", "x", "x"));
    let session =
        EditorSession::open_new(deps(Arc::clone(&store), transformer), &fast_config()).await;

    let id = session.blocks()[0].id;
    session.update_content(id, "final words");

    // Dismiss immediately, inside the debounce window.
    for task in session.finish() {
        task.await.unwrap();
    }
    assert_eq!(store.persist_calls(), 1);
    assert_eq!(store.last_persisted().unwrap().blocks[0].content, "final words");
}

#[tokio::test]
async fn delete_removes_a_created_note() {
    let store = Arc::new(MockStore::default());
    let transformer = Arc::new(CannedTransformer::ok("x", "x", "x"));
    let session =
        EditorSession::open_new(deps(Arc::clone(&store), transformer), &fast_config()).await;

    let id = session.blocks()[0].id;
    session.update_content(id, "doomed");
    wait_for(|| store.persist_calls() == 1, "the autosave create").await;

    if let Some(task) = session.delete() {
        task.await.unwrap();
    }
    assert_eq!(store.deleted.lock().unwrap().len(), 1);
}
