//! Promise-style request/response bridge between page script and native
//! handlers.
//!
//! Page script calls `hostBridge.query({request: "<type>", ...})`. The router
//! parses the JSON, looks up the handler registered for `<type>` and gives
//! it a [`QueryCallback`] to resolve or reject the page's promise.

use super::native::{FrameRef, NativeBrowser};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

pub const QUERY_FUNCTION: &str = "hostBridge.query";
pub const CANCEL_FUNCTION: &str = "hostBridge.queryCancel";

/// Failure code for a missing or non-string `request` field.
pub const ERR_MISSING_REQUEST: i32 = -1;
/// Failure code for a body that is not valid JSON.
pub const ERR_INVALID_JSON: i32 = -2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Missing or invalid 'request' field")]
    MissingRequestField,
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

impl RouterError {
    pub fn code(&self) -> i32 {
        match self {
            RouterError::MissingRequestField => ERR_MISSING_REQUEST,
            RouterError::InvalidJson(_) => ERR_INVALID_JSON,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryReply {
    Success(String),
    Failure { code: i32, message: String },
}

/// Delivers a reply back into the page. Supplied by the backend per query.
pub type QueryResponder = Arc<dyn Fn(QueryReply) + Send + Sync>;

pub struct QueryRequest<'a> {
    pub browser: &'a dyn NativeBrowser,
    pub frame: &'a FrameRef,
    pub query_id: i64,
    pub request: &'a str,
    pub persistent: bool,
}

pub type QueryHandler = Arc<dyn Fn(&QueryRequest<'_>, QueryCallback) -> bool + Send + Sync>;
pub type CancelHook = Arc<dyn Fn(i64) + Send + Sync>;

struct PendingQuery {
    query_type: String,
    frame_id: i64,
    persistent: bool,
}

type PendingMap = Arc<Mutex<HashMap<i64, PendingQuery>>>;

/// Reply handle for one query. Replies after the query was cancelled or
/// completed are ignored, so handlers may hold on to a clone without
/// checking liveness first.
#[derive(Clone)]
pub struct QueryCallback {
    query_id: i64,
    pending: PendingMap,
    responder: QueryResponder,
}

impl QueryCallback {
    pub fn query_id(&self) -> i64 {
        self.query_id
    }

    pub fn is_active(&self) -> bool {
        self.pending.lock().contains_key(&self.query_id)
    }

    /// Resolves the page promise. Persistent queries stay open and may
    /// succeed repeatedly. Returns false if the query is no longer pending.
    pub fn success(&self, response: impl Into<String>) -> bool {
        let delivered = {
            let mut pending = self.pending.lock();
            match pending.get(&self.query_id) {
                Some(query) if query.persistent => true,
                Some(_) => pending.remove(&self.query_id).is_some(),
                None => false,
            }
        };

        if delivered {
            (self.responder)(QueryReply::Success(response.into()));
        } else {
            trace!("Reply to inactive query {} ignored", self.query_id);
        }
        delivered
    }

    /// Rejects the page promise and closes the query.
    pub fn failure(&self, code: i32, message: impl Into<String>) -> bool {
        let delivered = self.pending.lock().remove(&self.query_id).is_some();
        if delivered {
            (self.responder)(QueryReply::Failure {
                code,
                message: message.into(),
            });
        } else {
            trace!("Failure for inactive query {} ignored", self.query_id);
        }
        delivered
    }
}

fn parse_query_type(request: &str) -> Result<String, RouterError> {
    let value: serde_json::Value =
        serde_json::from_str(request).map_err(|e| RouterError::InvalidJson(e.to_string()))?;
    value
        .get("request")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or(RouterError::MissingRequestField)
}

/// Handlers and hooks are cloned out of their maps before they run, so a
/// handler may register or unregister handlers on the same router.
pub struct MessageRouter {
    handlers: RwLock<HashMap<String, QueryHandler>>,
    cancel_hooks: RwLock<HashMap<String, CancelHook>>,
    pending: PendingMap,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            cancel_hooks: RwLock::new(HashMap::new()),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Replaces any handler already registered for `query_type`.
    pub fn register_handler<F>(&self, query_type: &str, handler: F)
    where
        F: Fn(&QueryRequest<'_>, QueryCallback) -> bool + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .insert(query_type.to_string(), Arc::new(handler));
        info!("Registered query handler for: {}", query_type);
    }

    /// Called with the query id whenever a query of this type is cancelled
    /// before completing.
    pub fn register_cancel_hook<F>(&self, query_type: &str, hook: F)
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        self.cancel_hooks
            .write()
            .insert(query_type.to_string(), Arc::new(hook));
    }

    pub fn unregister_handler(&self, query_type: &str) {
        self.handlers.write().remove(query_type);
        self.cancel_hooks.write().remove(query_type);
        info!("Unregistered query handler for: {}", query_type);
    }

    pub fn has_handler(&self, query_type: &str) -> bool {
        self.handlers.read().contains_key(query_type)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, query_id: i64) -> bool {
        self.pending.lock().contains_key(&query_id)
    }

    /// Returns whether the query was handled. Malformed input is handled
    /// (it fails immediately); an unknown type is not, so another router in
    /// a chain may take it.
    pub fn on_query(
        &self,
        browser: &dyn NativeBrowser,
        frame: &FrameRef,
        query_id: i64,
        request: &str,
        persistent: bool,
        responder: QueryResponder,
    ) -> bool {
        debug!(
            "on_query: query_id={}, persistent={}, request={}",
            query_id, persistent, request
        );

        let query_type = match parse_query_type(request) {
            Ok(query_type) => query_type,
            Err(e) => {
                warn!("on_query: rejecting query {}: {}", query_id, e);
                responder(QueryReply::Failure {
                    code: e.code(),
                    message: e.to_string(),
                });
                return true;
            }
        };

        let handler = self.handlers.read().get(&query_type).cloned();
        let Some(handler) = handler else {
            debug!("on_query: no handler registered for query type: {}", query_type);
            return false;
        };

        self.pending.lock().insert(
            query_id,
            PendingQuery {
                query_type: query_type.clone(),
                frame_id: frame.id,
                persistent,
            },
        );

        let callback = QueryCallback {
            query_id,
            pending: Arc::clone(&self.pending),
            responder,
        };
        let query = QueryRequest {
            browser,
            frame,
            query_id,
            request,
            persistent,
        };

        let handled = match panic::catch_unwind(AssertUnwindSafe(|| handler(&query, callback))) {
            Ok(handled) => handled,
            Err(_) => {
                error!("on_query: handler for '{}' panicked on query {}", query_type, query_id);
                false
            }
        };
        if !handled {
            self.pending.lock().remove(&query_id);
        }
        handled
    }

    /// The page dropped the query (navigation, explicit cancel, frame gone).
    pub fn on_query_canceled(&self, query_id: i64) {
        let removed = self.pending.lock().remove(&query_id);
        match removed {
            Some(query) => {
                debug!("on_query_canceled: query_id={}", query_id);
                self.run_cancel_hook(&query.query_type, query_id);
            }
            None => trace!("on_query_canceled: query {} not pending", query_id),
        }
    }

    /// Cancels every pending query issued from `frame_id`.
    pub fn on_frame_detached(&self, frame_id: i64) {
        let cancelled: Vec<(i64, String)> = {
            let mut pending = self.pending.lock();
            let ids: Vec<i64> = pending
                .iter()
                .filter(|(_, q)| q.frame_id == frame_id)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|q| (id, q.query_type)))
                .collect()
        };
        for (id, query_type) in cancelled {
            self.run_cancel_hook(&query_type, id);
        }
    }

    /// Cancels everything; used when the browser closes.
    pub fn cancel_all(&self) {
        let drained: Vec<(i64, PendingQuery)> = self.pending.lock().drain().collect();
        for (id, query) in drained {
            self.run_cancel_hook(&query.query_type, id);
        }
    }

    fn run_cancel_hook(&self, query_type: &str, query_id: i64) {
        let hook = self.cancel_hooks.read().get(query_type).cloned();
        let Some(hook) = hook else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| hook(query_id))).is_err() {
            error!("Cancel hook for '{}' panicked on query {}", query_type, query_id);
        }
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}
