//! In-process reference backend.
//!
//! `HeadlessEngine` implements the native seam without an embedded web
//! engine: work is queued and executed on `do_message_loop_work`, pages are
//! painted as a solid colour derived from their URL, cookies live in one
//! jar per request context and scripts go through a very small evaluator
//! that understands `document.cookie`, `document.title` and
//! `location.href`. It lets the engine, the adapter and the renderer be
//! driven end to end from tests and the demo binary.

use super::adapter::ClientAdapter;
use super::native::{
    CreateBrowserRequest, FrameRef, NativeBrowser, NativeEngine, NativeError, NativeEvent,
    NativeSettings, RequestContext,
};
use super::router::QueryReply;
use super::script::ScriptResult;
use super::BrowserId;
use crate::core::{Point, Rect, ScaleFactor};
use crate::rendering::buffer::BYTES_PER_PIXEL;
use crate::rendering::PaintElement;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use url::Url;

/// Upper bound of tasks run per pump, so a task that keeps re-queueing
/// work cannot starve the host loop.
pub const MAX_TASKS_PER_PUMP: usize = 256;

const MAIN_FRAME_ID: i64 = 1;

/// Cookies of one request context, keyed by host.
#[derive(Debug, Default)]
pub struct CookieJar {
    hosts: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl CookieJar {
    pub fn set(&self, host: &str, name: &str, value: &str) {
        self.hosts
            .lock()
            .entry(host.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, host: &str, name: &str) -> Option<String> {
        self.hosts.lock().get(host)?.get(name).cloned()
    }

    /// `document.cookie` rendering: `a=1; b=2`, sorted by name.
    pub fn cookie_string(&self, host: &str) -> String {
        self.hosts
            .lock()
            .get(host)
            .map(|cookies| {
                cookies
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.hosts.lock().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryOutcome {
    /// `None` until the router has seen the query.
    pub handled: Option<bool>,
    pub replies: Vec<QueryReply>,
    pub cancelled: bool,
}

type Outcomes = Arc<Mutex<HashMap<i64, QueryOutcome>>>;

enum Task {
    Create(PendingCreate),
    Navigate { target: Arc<BrowserInner>, url: String },
    History { target: Arc<BrowserInner>, delta: i32 },
    Reload { target: Arc<BrowserInner> },
    Paint { target: Arc<BrowserInner>, element: PaintElement },
    Script { target: Arc<BrowserInner>, request_id: String, code: String },
    Query { target: Arc<BrowserInner>, query_id: i64, request: String, persistent: bool },
    CancelQuery { target: Arc<BrowserInner>, query_id: i64 },
    Popup { target: Arc<BrowserInner>, rect: Option<Rect> },
    Close { target: Arc<BrowserInner> },
}

struct PendingCreate {
    id: BrowserId,
    client: Arc<ClientAdapter>,
    url: String,
    frame_rate: u32,
    context: RequestContext,
    windowed: bool,
}

#[derive(Debug, Default)]
struct PageState {
    history: Vec<String>,
    index: usize,
    title: String,
    loading: bool,
}

impl PageState {
    fn url(&self) -> String {
        self.history.get(self.index).cloned().unwrap_or_default()
    }

    fn can_go_back(&self) -> bool {
        !self.history.is_empty() && self.index > 0
    }

    fn can_go_forward(&self) -> bool {
        self.index + 1 < self.history.len()
    }
}

#[derive(Debug, Default)]
struct Counters {
    resized: AtomicUsize,
    invalidated: AtomicUsize,
    focus_calls: AtomicUsize,
    focused: AtomicBool,
    dev_tools: AtomicUsize,
    paints: AtomicUsize,
}

struct BrowserInner {
    native_id: i32,
    host_id: BrowserId,
    client: Arc<ClientAdapter>,
    context: RequestContext,
    cookies: Arc<CookieJar>,
    frame_rate: u32,
    page: Mutex<PageState>,
    counters: Counters,
    /// Physical-pixel bounds of the open popup widget.
    popup: Mutex<Option<Rect>>,
    closing: AtomicBool,
    tasks: Sender<Task>,
}

impl BrowserInner {
    fn enqueue(self: &Arc<Self>, task: Task) {
        if self.tasks.send(task).is_err() {
            trace!("Headless browser {}: engine gone, task dropped", self.native_id);
        }
    }
}

/// Handle to a headless browser. Clones share one page.
#[derive(Clone)]
pub struct HeadlessBrowser {
    inner: Arc<BrowserInner>,
}

impl HeadlessBrowser {
    pub fn host_id(&self) -> BrowserId {
        self.inner.host_id
    }

    pub fn request_context(&self) -> RequestContext {
        self.inner.context
    }

    pub fn frame_rate(&self) -> u32 {
        self.inner.frame_rate
    }

    pub fn title(&self) -> String {
        self.inner.page.lock().title.clone()
    }

    pub fn resize_notifications(&self) -> usize {
        self.inner.counters.resized.load(Ordering::SeqCst)
    }

    pub fn invalidations(&self) -> usize {
        self.inner.counters.invalidated.load(Ordering::SeqCst)
    }

    pub fn focus_calls(&self) -> usize {
        self.inner.counters.focus_calls.load(Ordering::SeqCst)
    }

    pub fn has_focus(&self) -> bool {
        self.inner.counters.focused.load(Ordering::SeqCst)
    }

    pub fn dev_tools_opened(&self) -> usize {
        self.inner.counters.dev_tools.load(Ordering::SeqCst)
    }

    pub fn paint_count(&self) -> usize {
        self.inner.counters.paints.load(Ordering::SeqCst)
    }

    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        let host = host_of(&self.url());
        self.inner.cookies.get(&host, name)
    }

    fn main_frame(&self) -> FrameRef {
        FrameRef::main(self.url())
    }
}

impl NativeBrowser for HeadlessBrowser {
    fn native_id(&self) -> i32 {
        self.inner.native_id
    }

    fn load_url(&self, url: &str) {
        self.inner.enqueue(Task::Navigate {
            target: Arc::clone(&self.inner),
            url: url.to_string(),
        });
    }

    fn go_back(&self) {
        self.inner.enqueue(Task::History {
            target: Arc::clone(&self.inner),
            delta: -1,
        });
    }

    fn go_forward(&self) {
        self.inner.enqueue(Task::History {
            target: Arc::clone(&self.inner),
            delta: 1,
        });
    }

    fn can_go_back(&self) -> bool {
        self.inner.page.lock().can_go_back()
    }

    fn can_go_forward(&self) -> bool {
        self.inner.page.lock().can_go_forward()
    }

    fn reload(&self) {
        self.inner.enqueue(Task::Reload {
            target: Arc::clone(&self.inner),
        });
    }

    fn reload_ignore_cache(&self) {
        // No cache to bypass.
        self.reload();
    }

    fn stop_load(&self) {
        self.inner.page.lock().loading = false;
    }

    fn is_loading(&self) -> bool {
        self.inner.page.lock().loading
    }

    fn url(&self) -> String {
        self.inner.page.lock().url()
    }

    fn was_resized(&self) {
        self.inner.counters.resized.fetch_add(1, Ordering::SeqCst);
        self.inner.enqueue(Task::Paint {
            target: Arc::clone(&self.inner),
            element: PaintElement::View,
        });
    }

    fn invalidate(&self, element: PaintElement) {
        self.inner.counters.invalidated.fetch_add(1, Ordering::SeqCst);
        self.inner.enqueue(Task::Paint {
            target: Arc::clone(&self.inner),
            element,
        });
    }

    fn set_focus(&self, focus: bool) {
        self.inner.counters.focus_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.counters.focused.store(focus, Ordering::SeqCst);
    }

    fn show_dev_tools(&self, inspect_at: Option<Point>) {
        self.inner.counters.dev_tools.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Headless browser {}: devtools requested (inspect at {:?})",
            self.inner.native_id, inspect_at
        );
    }

    fn execute_script(&self, request_id: &str, code: &str) {
        self.inner.enqueue(Task::Script {
            target: Arc::clone(&self.inner),
            request_id: request_id.to_string(),
            code: code.to_string(),
        });
    }

    fn close(&self, force: bool) {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(
            "Headless browser {}: close requested (force={})",
            self.inner.native_id, force
        );
        self.inner.enqueue(Task::Close {
            target: Arc::clone(&self.inner),
        });
    }
}

/// Backend with no external engine. See the module docs.
pub struct HeadlessEngine {
    running: bool,
    settings: Option<NativeSettings>,
    events: Option<Sender<NativeEvent<HeadlessBrowser>>>,
    tasks_tx: Sender<Task>,
    tasks_rx: Receiver<Task>,
    jars: HashMap<u64, Arc<CookieJar>>,
    /// Released by the host but still used by a browser that is closing.
    released_contexts: HashSet<u64>,
    next_context_id: u64,
    next_native_id: i32,
    next_query_id: AtomicI64,
    live: HashMap<BrowserId, HeadlessBrowser>,
    outcomes: Outcomes,
    reject_next_create: bool,
    fail_startup: Option<String>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        let (tasks_tx, tasks_rx) = channel::unbounded();
        Self {
            running: false,
            settings: None,
            events: None,
            tasks_tx,
            tasks_rx,
            jars: HashMap::new(),
            released_contexts: HashSet::new(),
            next_context_id: 1,
            next_native_id: 1,
            next_query_id: AtomicI64::new(1),
            live: HashMap::new(),
            outcomes: Arc::new(Mutex::new(HashMap::new())),
            reject_next_create: false,
            fail_startup: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Settings received at startup, flags included.
    pub fn settings(&self) -> Option<&NativeSettings> {
        self.settings.as_ref()
    }

    /// Makes the next `create_browser` call fail synchronously.
    pub fn reject_next_create(&mut self) {
        self.reject_next_create = true;
    }

    /// Makes the next `initialize` call fail with `reason`.
    pub fn fail_next_startup(&mut self, reason: impl Into<String>) {
        self.fail_startup = Some(reason.into());
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks_rx.len()
    }

    pub fn browser(&self, id: BrowserId) -> Option<&HeadlessBrowser> {
        self.live.get(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn context_count(&self) -> usize {
        self.jars.len()
    }

    pub fn cookie_jar(&self, context: RequestContext) -> Option<Arc<CookieJar>> {
        self.jars.get(&context.id).cloned()
    }

    /// Issues a page-side `hostBridge.query` call from the main frame of
    /// `id`. Returns the query id, or `None` if the browser is not live.
    pub fn send_query(&self, id: BrowserId, request: &str, persistent: bool) -> Option<i64> {
        let browser = self.live.get(&id)?;
        let query_id = self.next_query_id.fetch_add(1, Ordering::Relaxed);
        self.outcomes.lock().insert(query_id, QueryOutcome::default());
        browser.inner.enqueue(Task::Query {
            target: Arc::clone(&browser.inner),
            query_id,
            request: request.to_string(),
            persistent,
        });
        Some(query_id)
    }

    /// Page-side cancel of a pending query.
    pub fn cancel_query(&self, id: BrowserId, query_id: i64) {
        if let Some(browser) = self.live.get(&id) {
            browser.inner.enqueue(Task::CancelQuery {
                target: Arc::clone(&browser.inner),
                query_id,
            });
        }
    }

    pub fn query_outcome(&self, query_id: i64) -> Option<QueryOutcome> {
        self.outcomes.lock().get(&query_id).cloned()
    }

    /// Opens (`Some`) or closes (`None`) a popup widget over the page.
    pub fn set_popup(&self, id: BrowserId, rect: Option<Rect>) {
        if let Some(browser) = self.live.get(&id) {
            browser.inner.enqueue(Task::Popup {
                target: Arc::clone(&browser.inner),
                rect,
            });
        }
    }

    fn jar_for(&mut self, context: RequestContext) -> Arc<CookieJar> {
        if context.isolated && !self.jars.contains_key(&context.id) {
            // Released before the create ran; the browser gets a private jar
            // that goes away with it.
            debug!("Request context {} already released", context.id);
            return Arc::new(CookieJar::default());
        }
        Arc::clone(self.jars.entry(context.id).or_default())
    }

    fn context_in_use(&self, context_id: u64) -> bool {
        self.live
            .values()
            .any(|browser| browser.inner.context.id == context_id)
    }

    /// Drops the jar of a released context once no live browser uses it.
    fn collect_context(&mut self, context_id: u64) {
        if !self.released_contexts.contains(&context_id) || self.context_in_use(context_id) {
            return;
        }
        self.released_contexts.remove(&context_id);
        if self.jars.remove(&context_id).is_some() {
            debug!("Request context {} released", context_id);
        }
    }

    fn run_task(&mut self, task: Task) {
        match task {
            Task::Create(pending) => self.finish_create(pending),
            Task::Navigate { target, url } => {
                if target.closing.load(Ordering::SeqCst) {
                    return;
                }
                {
                    let mut page = target.page.lock();
                    let keep = if page.history.is_empty() { 0 } else { page.index + 1 };
                    page.history.truncate(keep);
                    page.history.push(url);
                    page.index = page.history.len() - 1;
                }
                commit_load(&target);
            }
            Task::History { target, delta } => {
                let moved = {
                    let mut page = target.page.lock();
                    let next = page.index as i64 + delta as i64;
                    if next >= 0 && (next as usize) < page.history.len() && !page.history.is_empty() {
                        page.index = next as usize;
                        true
                    } else {
                        false
                    }
                };
                if moved {
                    commit_load(&target);
                }
            }
            Task::Reload { target } => {
                if !target.page.lock().history.is_empty() {
                    commit_load(&target);
                }
            }
            Task::Paint { target, element } => {
                if !target.closing.load(Ordering::SeqCst) {
                    paint(&target, element);
                }
            }
            Task::Script {
                target,
                request_id,
                code,
            } => {
                let browser = HeadlessBrowser {
                    inner: Arc::clone(&target),
                };
                let result = evaluate(&browser, &code);
                target
                    .client
                    .on_script_result(&request_id, &result.to_payload());
            }
            Task::Query {
                target,
                query_id,
                request,
                persistent,
            } => {
                let browser = HeadlessBrowser {
                    inner: Arc::clone(&target),
                };
                let outcomes = Arc::clone(&self.outcomes);
                let responder = Arc::new(move |reply: QueryReply| {
                    outcomes.lock().entry(query_id).or_default().replies.push(reply);
                });
                let handled = target.client.on_query(
                    &browser,
                    &browser.main_frame(),
                    query_id,
                    &request,
                    persistent,
                    responder,
                );
                self.outcomes.lock().entry(query_id).or_default().handled = Some(handled);
            }
            Task::CancelQuery { target, query_id } => {
                target.client.on_query_canceled(query_id);
                self.outcomes.lock().entry(query_id).or_default().cancelled = true;
            }
            Task::Popup { target, rect } => {
                let browser = HeadlessBrowser {
                    inner: Arc::clone(&target),
                };
                *target.popup.lock() = rect;
                match rect {
                    Some(rect) => {
                        target.client.on_popup_show(&browser, true);
                        target.client.on_popup_size(rect);
                        paint(&target, PaintElement::Popup);
                    }
                    None => target.client.on_popup_show(&browser, false),
                }
            }
            Task::Close { target } => self.finish_close(&target),
        }
    }

    fn finish_create(&mut self, pending: PendingCreate) {
        let cookies = self.jar_for(pending.context);
        let native_id = self.next_native_id;
        self.next_native_id += 1;

        let browser = HeadlessBrowser {
            inner: Arc::new(BrowserInner {
                native_id,
                host_id: pending.id,
                client: pending.client,
                context: pending.context,
                cookies,
                frame_rate: pending.frame_rate,
                page: Mutex::new(PageState::default()),
                counters: Counters::default(),
                popup: Mutex::new(None),
                closing: AtomicBool::new(false),
                tasks: self.tasks_tx.clone(),
            }),
        };

        debug!(
            "Headless browser {} created for host id {} (context {}, windowed={})",
            native_id, pending.id, pending.context.id, pending.windowed
        );
        browser.inner.client.on_after_created(&browser);
        self.live.insert(pending.id, browser.clone());

        if !pending.url.is_empty() {
            browser.load_url(&pending.url);
        }

        let delivered = self.events.as_ref().map_or(false, |events| {
            events
                .send(NativeEvent::Created {
                    id: pending.id,
                    browser: browser.clone(),
                })
                .is_ok()
        });
        if !delivered {
            warn!("Headless browser {}: nobody to attach to, closing", native_id);
            browser.close(true);
        }
    }

    fn finish_close(&mut self, target: &Arc<BrowserInner>) {
        let browser = HeadlessBrowser {
            inner: Arc::clone(target),
        };
        if target.client.do_close(&browser) {
            return;
        }
        target.client.on_before_close(&browser);
        self.live.remove(&target.host_id);
        self.collect_context(target.context.id);
        if let Some(events) = &self.events {
            let _ = events.send(NativeEvent::Closed { id: target.host_id });
        }
        debug!("Headless browser {} closed", target.native_id);
    }
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeEngine for HeadlessEngine {
    type Browser = HeadlessBrowser;

    fn initialize(
        &mut self,
        settings: &NativeSettings,
        events: Sender<NativeEvent<HeadlessBrowser>>,
    ) -> Result<(), NativeError> {
        if let Some(reason) = self.fail_startup.take() {
            return Err(NativeError::Startup(reason));
        }
        if self.running {
            return Err(NativeError::Startup("already running".to_string()));
        }

        self.jars.insert(RequestContext::GLOBAL.id, Arc::new(CookieJar::default()));
        self.settings = Some(settings.clone());
        self.events = Some(events);
        self.running = true;
        info!(
            "Headless engine started ({} switches, windowless={})",
            settings.command_line.len(),
            settings.windowless_rendering
        );
        Ok(())
    }

    fn shutdown(&mut self) {
        if !self.running {
            return;
        }

        let live: Vec<HeadlessBrowser> = self.live.values().cloned().collect();
        for browser in live {
            browser.inner.closing.store(true, Ordering::SeqCst);
            self.finish_close(&browser.inner);
        }
        while self.tasks_rx.try_recv().is_ok() {}

        self.jars.clear();
        self.released_contexts.clear();
        self.events = None;
        self.running = false;
        info!("Headless engine stopped");
    }

    fn create_browser(&mut self, request: CreateBrowserRequest) -> Result<(), NativeError> {
        if !self.running {
            return Err(NativeError::NotRunning);
        }
        if std::mem::take(&mut self.reject_next_create) {
            return Err(NativeError::CreateRejected(format!(
                "browser {} refused",
                request.id
            )));
        }

        let task = Task::Create(PendingCreate {
            id: request.id,
            client: request.client,
            url: request.url,
            frame_rate: request.frame_rate,
            context: request.request_context.unwrap_or(RequestContext::GLOBAL),
            windowed: request.parent_window.is_some(),
        });
        self.tasks_tx
            .send(task)
            .map_err(|_| NativeError::NotRunning)
    }

    fn create_isolated_context(&mut self) -> RequestContext {
        let context = RequestContext {
            id: self.next_context_id,
            isolated: true,
        };
        self.next_context_id += 1;
        self.jars.insert(context.id, Arc::new(CookieJar::default()));
        context
    }

    fn release_context(&mut self, context: RequestContext) {
        if !context.isolated || context.id == RequestContext::GLOBAL.id {
            return;
        }
        self.released_contexts.insert(context.id);
        self.collect_context(context.id);
    }

    fn do_message_loop_work(&mut self) {
        if !self.running {
            return;
        }
        for _ in 0..MAX_TASKS_PER_PUMP {
            match self.tasks_rx.try_recv() {
                Ok(task) => self.run_task(task),
                Err(_) => break,
            }
        }
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_default()
}

fn title_for(url: &str) -> String {
    if let Some(html) = url.strip_prefix("data:text/html,") {
        if let (Some(start), Some(end)) = (html.find("<title>"), html.find("</title>")) {
            if start + 7 <= end {
                return html[start + 7..end].to_string();
            }
        }
    }
    match host_of(url) {
        host if host.is_empty() => url.to_string(),
        host => host,
    }
}

/// BGRA colour for a URL; stable across runs.
fn page_color(url: &str) -> [u8; 4] {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    let bits = hasher.finish().to_le_bytes();
    [bits[0], bits[1], bits[2], 0xff]
}

fn commit_load(target: &Arc<BrowserInner>) {
    let browser = HeadlessBrowser {
        inner: Arc::clone(target),
    };
    let client = &target.client;

    // Pending queries belong to the document being replaced.
    client.router().on_frame_detached(MAIN_FRAME_ID);

    let (url, back, forward) = {
        let mut page = target.page.lock();
        page.loading = true;
        (page.url(), page.can_go_back(), page.can_go_forward())
    };
    client.on_loading_state_change(&browser, true, back, forward);
    client.on_address_change(&FrameRef::main(url.clone()), &url);

    let title = title_for(&url);
    target.page.lock().title = title.clone();
    client.on_title_change(&title);

    paint(target, PaintElement::View);

    target.page.lock().loading = false;
    client.on_loading_state_change(&browser, false, back, forward);
    trace!("Headless browser {}: loaded {}", target.native_id, url);
}

fn paint(target: &Arc<BrowserInner>, element: PaintElement) {
    let client = &target.client;
    let scale = ScaleFactor(client.screen_scale_factor());
    let area = match element {
        PaintElement::View => Rect::from_size(scale.scale_size(client.view_rect().size())),
        PaintElement::Popup => match *target.popup.lock() {
            Some(popup) => Rect::from_size(popup.size()),
            None => return,
        },
    };
    if area.is_empty() {
        return;
    }

    let url = target.page.lock().url();
    let color = match element {
        PaintElement::View => page_color(&url),
        PaintElement::Popup => [0xf0, 0xf0, 0xf0, 0xff],
    };
    let pixels = area.width as usize * area.height as usize;
    let mut buffer = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
    for _ in 0..pixels {
        buffer.extend_from_slice(&color);
    }

    client.on_paint(element, &[area], &buffer, area.width, area.height);
    target.counters.paints.fetch_add(1, Ordering::SeqCst);
}

/// Evaluates the handful of expressions the headless page understands.
fn evaluate(browser: &HeadlessBrowser, code: &str) -> ScriptResult {
    let mut expr = code.trim();
    if let Some(rest) = expr.strip_prefix("return ") {
        expr = rest.trim();
    }
    let expr = expr.trim_end_matches(';').trim();

    let host = host_of(&browser.url());
    let jar = &browser.inner.cookies;

    if let Some(assignment) = expr.strip_prefix("document.cookie") {
        let assignment = assignment.trim();
        if assignment.is_empty() {
            return ScriptResult::ok(Value::String(jar.cookie_string(&host)));
        }
        let Some(rhs) = assignment.strip_prefix('=') else {
            return ScriptResult::err(format!("SyntaxError: unexpected token in '{}'", expr));
        };
        let Some(literal) = string_literal(rhs.trim()) else {
            return ScriptResult::err("TypeError: document.cookie expects a string");
        };
        let pair = literal.split(';').next().unwrap_or_default();
        if let Some((name, value)) = pair.split_once('=') {
            jar.set(&host, name.trim(), value.trim());
        }
        return ScriptResult::ok(Value::String(literal));
    }

    match expr {
        "" | "undefined" => ScriptResult::undefined(),
        "document.title" => ScriptResult::ok(Value::String(browser.title())),
        "location.href" | "window.location.href" | "document.URL" => {
            ScriptResult::ok(Value::String(browser.url()))
        }
        "true" => ScriptResult::ok(Value::Bool(true)),
        "false" => ScriptResult::ok(Value::Bool(false)),
        "null" => ScriptResult::ok(Value::Null),
        other => {
            if let Some(s) = string_literal(other) {
                return ScriptResult::ok(Value::String(s));
            }
            if let Ok(number) = serde_json::from_str::<serde_json::Number>(other) {
                return ScriptResult::ok(Value::Number(number));
            }
            ScriptResult::err(format!("ReferenceError: {} is not defined", other))
        }
    }
}

fn string_literal(text: &str) -> Option<String> {
    let quote = text.chars().next()?;
    if (quote == '"' || quote == '\'') && text.len() >= 2 && text.ends_with(quote) {
        Some(text[1..text.len() - 1].to_string())
    } else {
        None
    }
}
