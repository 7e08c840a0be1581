//! Per-request context: identity, cancellation, and an observer for events.
//!
//! Every [`crate::Pipeline::run`] call takes a [`RequestContext`]. It carries
//! the request id that names temp files and tags the tracing span, the
//! [`CancellationToken`] the pipeline polls between stages and selects on
//! while a child process runs, and an optional [`ConversionObserver`].
//!
//! # Example
//!
//! ```rust
//! use mediaconv::{ConversionObserver, RequestContext, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//! use uuid::Uuid;
//!
//! struct StageCounter(AtomicUsize);
//!
//! impl ConversionObserver for StageCounter {
//!     fn on_stage(&self, _id: Uuid, _stage: Stage) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let ctx = RequestContext::new().with_observer(Arc::new(StageCounter(AtomicUsize::new(0))));
//! ctx.cancel_token().cancel();
//! assert!(ctx.is_cancelled());
//! ```

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ConvertError;
use crate::output::ConversionResult;

/// Orchestrator states, in the order a successful request visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Validated,
    Resolved,
    Converting,
    Succeeded,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Resolved => "resolved",
            Stage::Converting => "converting",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Receives events as a request moves through the pipeline.
///
/// All methods default to no-ops. Implementations must be `Send + Sync`:
/// concurrent requests may share one observer and call it from different
/// worker threads.
pub trait ConversionObserver: Send + Sync {
    /// Called on each state transition, including the terminal one.
    fn on_stage(&self, request_id: Uuid, stage: Stage) {
        let _ = (request_id, stage);
    }

    /// Called just before an external tool is spawned.
    fn on_tool_start(&self, request_id: Uuid, tool: &str) {
        let _ = (request_id, tool);
    }

    /// Called once with the final outcome.
    fn on_complete(&self, request_id: Uuid, outcome: Result<&ConversionResult, &ConvertError>) {
        let _ = (request_id, outcome);
    }
}

/// Observer that ignores every event. The default.
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}

/// Shared observer handle.
pub type Observer = Arc<dyn ConversionObserver>;

/// Everything about a request that is not its payload.
#[derive(Clone)]
pub struct RequestContext {
    id: Uuid,
    cancel: CancellationToken,
    observer: Observer,
}

impl RequestContext {
    /// Fresh context with a random v4 id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            cancel: CancellationToken::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    /// Use a caller-owned token, e.g. a child of a server-wide shutdown token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `Err(Cancelled)` once the token has fired.
    pub(crate) fn check_cancelled(&self) -> Result<(), ConvertError> {
        if self.cancel.is_cancelled() {
            Err(ConvertError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn stage(&self, stage: Stage) {
        tracing::debug!(stage = %stage, "state transition");
        self.observer.on_stage(self.id, stage);
    }

    pub(crate) fn tool_started(&self, tool: &str) {
        self.observer.on_tool_start(self.id, tool);
    }

    pub(crate) fn complete(&self, outcome: Result<&ConversionResult, &ConvertError>) {
        self.observer.on_complete(self.id, outcome);
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
