use osr_browser_engine::browser::router::{QueryReply, ERR_INVALID_JSON, ERR_MISSING_REQUEST};
use osr_browser_engine::{
    BrowserConfig, BrowserEngine, BrowserId, Engine, EngineConfig, GlRenderer, HeadlessEngine,
    MemorySurface, QueryCallback, SharedRenderer,
};
use parking_lot::Mutex;
use std::sync::Arc;

struct Harness {
    engine: Engine<HeadlessEngine>,
    id: BrowserId,
    _renderer: SharedRenderer,
}

impl Harness {
    async fn new() -> Self {
        let renderer = GlRenderer::shared();
        renderer
            .lock()
            .initialize(Box::new(MemorySurface::new()))
            .unwrap();
        let mut engine = Engine::new(HeadlessEngine::new());
        engine.initialize(EngineConfig::default()).await.unwrap();
        let id = engine
            .create_browser(BrowserConfig::new("https://app.example/", &renderer))
            .unwrap();
        engine.do_message_loop_work();
        Self {
            engine,
            id,
            _renderer: renderer,
        }
    }

    fn query(&mut self, request: &str, persistent: bool) -> i64 {
        let query_id = self
            .engine
            .native()
            .send_query(self.id, request, persistent)
            .unwrap();
        self.engine.do_message_loop_work();
        query_id
    }

    fn replies(&self, query_id: i64) -> Vec<QueryReply> {
        self.engine
            .native()
            .query_outcome(query_id)
            .map(|o| o.replies)
            .unwrap_or_default()
    }

    fn handled(&self, query_id: i64) -> Option<bool> {
        self.engine
            .native()
            .query_outcome(query_id)
            .and_then(|o| o.handled)
    }
}

#[tokio::test]
async fn test_registered_handler_replies() {
    let mut h = Harness::new().await;
    let client = h.engine.client(h.id).unwrap();
    client.register_query_handler("echo", |query, callback| {
        let body: serde_json::Value = serde_json::from_str(query.request).unwrap();
        callback.success(body["text"].as_str().unwrap_or_default())
    });

    let id = h.query(r#"{"request":"echo","text":"hello"}"#, false);
    assert_eq!(h.handled(id), Some(true));
    assert_eq!(h.replies(id), vec![QueryReply::Success("hello".into())]);
    assert_eq!(client.router().pending_count(), 0);
}

#[tokio::test]
async fn test_malformed_queries_fail_immediately() {
    let mut h = Harness::new().await;
    let client = h.engine.client(h.id).unwrap();

    let held: Arc<Mutex<Option<QueryCallback>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&held);
    client.register_query_handler("feed", move |_, callback| {
        *slot.lock() = Some(callback);
        true
    });
    let cancelled = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&cancelled);
    client.register_query_cancel_hook("feed", move |query_id| sink.lock().push(query_id));
    let feed = h.query(r#"{"request":"feed"}"#, true);
    assert!(client.router().is_pending(feed));

    let id = h.query("{not json", false);
    assert_eq!(h.handled(id), Some(true));
    assert!(matches!(
        h.replies(id).as_slice(),
        [QueryReply::Failure { code, .. }] if *code == ERR_INVALID_JSON
    ));

    let id = h.query(r#"{"text":"no type"}"#, false);
    assert!(matches!(
        h.replies(id).as_slice(),
        [QueryReply::Failure { code, .. }] if *code == ERR_MISSING_REQUEST
    ));

    let id = h.query(r#"{"request": 7}"#, false);
    assert!(matches!(
        h.replies(id).as_slice(),
        [QueryReply::Failure { code, .. }] if *code == ERR_MISSING_REQUEST
    ));

    // The open query is untouched by the bad input.
    assert!(client.router().is_pending(feed));
    assert_eq!(client.router().pending_count(), 1);
    assert!(cancelled.lock().is_empty());
    let callback = held.lock().clone().unwrap();
    assert!(callback.success("item"));
    assert_eq!(h.replies(feed), vec![QueryReply::Success("item".into())]);
}

#[tokio::test]
async fn test_unregistered_type_is_not_handled() {
    let mut h = Harness::new().await;
    let client = h.engine.client(h.id).unwrap();
    client.register_query_handler("saveFile", |_, callback| callback.success("ok"));
    client.unregister_query_handler("saveFile");

    let id = h.query(r#"{"request":"saveFile"}"#, false);
    assert_eq!(h.handled(id), Some(false));
    assert!(h.replies(id).is_empty());
}

#[tokio::test]
async fn test_persistent_query_until_cancelled() {
    let mut h = Harness::new().await;
    let client = h.engine.client(h.id).unwrap();

    let held: Arc<Mutex<Option<QueryCallback>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&held);
    client.register_query_handler("subscribe", move |_, callback| {
        *slot.lock() = Some(callback);
        true
    });
    let cancelled = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&cancelled);
    client.register_query_cancel_hook("subscribe", move |query_id| sink.lock().push(query_id));

    let id = h.query(r#"{"request":"subscribe"}"#, true);
    let callback = held.lock().clone().unwrap();
    assert!(callback.success("tick 1"));
    assert!(callback.success("tick 2"));
    assert_eq!(h.replies(id).len(), 2);

    h.engine.native().cancel_query(h.id, id);
    h.engine.do_message_loop_work();
    assert_eq!(*cancelled.lock(), vec![id]);
    assert!(!callback.is_active());
    assert!(!callback.success("late"));
    assert_eq!(h.replies(id).len(), 2);
}

#[tokio::test]
async fn test_navigation_cancels_pending_queries() {
    let mut h = Harness::new().await;
    let client = h.engine.client(h.id).unwrap();
    client.register_query_handler("slow", |_, _callback| true);
    let cancelled = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&cancelled);
    client.register_query_cancel_hook("slow", move |_| *sink.lock() += 1);

    h.query(r#"{"request":"slow"}"#, false);
    h.query(r#"{"request":"slow"}"#, false);
    assert_eq!(client.router().pending_count(), 2);

    h.engine.load_url(h.id, "https://app.example/next");
    h.engine.do_message_loop_work();
    assert_eq!(client.router().pending_count(), 0);
    assert_eq!(*cancelled.lock(), 2);
}

#[tokio::test]
async fn test_close_cancels_pending_queries() {
    let mut h = Harness::new().await;
    let client = h.engine.client(h.id).unwrap();
    client.register_query_handler("slow", |_, _callback| true);

    let id = h.query(r#"{"request":"slow"}"#, false);
    assert!(client.router().is_pending(id));

    h.engine.close_browser(h.id, true);
    h.engine.do_message_loop_work();
    assert_eq!(client.router().pending_count(), 0);
    assert!(!client.is_attached());
}

#[tokio::test]
async fn test_panicking_handler_does_not_escape() {
    let mut h = Harness::new().await;
    let client = h.engine.client(h.id).unwrap();
    client.register_query_handler("boom", |_, _| panic!("handler bug"));

    let hook_runs = Arc::new(Mutex::new(0));
    let runs = Arc::clone(&hook_runs);
    client.register_query_cancel_hook("boom", move |_| *runs.lock() += 1);

    let id = h.query(r#"{"request":"boom"}"#, false);
    assert_eq!(h.handled(id), Some(false));
    assert!(h.engine.is_attached(h.id));
    assert_eq!(client.router().pending_count(), 0);
    assert!(!client.router().is_pending(id));

    h.engine.native().cancel_query(h.id, id);
    h.engine.do_message_loop_work();
    assert_eq!(*hook_runs.lock(), 0);
}

#[tokio::test]
async fn test_one_shot_handler_can_unregister_itself() {
    let mut h = Harness::new().await;
    let client = h.engine.client(h.id).unwrap();
    let weak = Arc::downgrade(&client);
    client.register_query_handler("once", move |_, callback| {
        if let Some(client) = weak.upgrade() {
            client.unregister_query_handler("once");
        }
        callback.success("first")
    });

    let first = h.query(r#"{"request":"once"}"#, false);
    assert_eq!(h.replies(first), vec![QueryReply::Success("first".into())]);

    let second = h.query(r#"{"request":"once"}"#, false);
    assert_eq!(h.handled(second), Some(false));
}
