// AI text transformation: cleanup, summarize, and add-more, with a
// confirmation step gating destructive replacement.
//
// The transformer is a pure collaborator over plain text; applying its
// output to the document is the session's job. Failures never touch the
// document and never escalate past a non-fatal notification.

pub mod http;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// The transform operations a session can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOp {
    Cleanup,
    Summarize,
    AddMore,
}

impl TransformOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cleanup => "cleanup",
            Self::Summarize => "summarize",
            Self::AddMore => "add_more",
        }
    }
}

/// Why a transform request was rejected or failed. None of these are
/// fatal: the document is untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("a transform is already in flight")]
    Busy,
    #[error("nothing to transform")]
    EmptyDocument,
    #[error("add-more needs an instruction")]
    EmptyInstruction,
    #[error("no transform result awaiting a choice")]
    NothingPending,
    #[error("the service returned an empty result")]
    EmptyResult,
    #[error("transform service error: {0}")]
    Service(String),
}

/// External text transformer. All operations are fallible, pure
/// functions of their inputs with no side effects on the document.
///
/// In production this is an HTTP client ([`http::HttpTransformer`]);
/// tests inject mocks that return canned responses.
pub trait AiTransformer: Send + Sync {
    fn cleanup(&self, text: String)
        -> Pin<Box<dyn Future<Output = Result<String, TransformError>> + Send>>;
    fn summarize(
        &self,
        text: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransformError>> + Send>>;
    fn expand(
        &self,
        text: String,
        instruction: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransformError>> + Send>>;
}

/// An add-more result held until the user picks what to do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExpansion {
    pub markdown: String,
}

/// Per-session transform state. One explicit machine instead of a
/// busy-flag per operation, so illegal combinations (two operations
/// running at once) cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransformState {
    #[default]
    Idle,
    Running(TransformOp),
    AwaitingChoice(PendingExpansion),
}

impl TransformState {
    pub fn is_busy(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// What the user decided to do with a held add-more result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionChoice {
    /// Parsed blocks are added after the existing ones.
    Append,
    /// The block sequence is wholesale replaced.
    Replace,
    /// The result is discarded; the document stays untouched.
    Cancel,
}

/// Normalize a transformer response: trimmed, and empty output is an
/// error rather than a silent wipe of the document.
pub fn normalize_result(response: String) -> Result<String, TransformError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(TransformError::EmptyResult);
    }
    Ok(trimmed.to_string())
}
