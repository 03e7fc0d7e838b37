use super::native::{FrameRef, NativeBrowser};
use super::router::{MessageRouter, QueryCallback, QueryRequest, QueryResponder};
use super::BrowserId;
use crate::core::Rect;
use crate::rendering::{GlRenderer, PaintElement, SharedRenderer};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace, warn};

pub const DEFAULT_VIEW_WIDTH: i32 = 1200;
pub const DEFAULT_VIEW_HEIGHT: i32 = 800;

fn pack_size(width: i32, height: i32) -> u64 {
    ((width as u32 as u64) << 32) | height as u32 as u64
}

fn unpack_size(packed: u64) -> (i32, i32) {
    ((packed >> 32) as u32 as i32, packed as u32 as i32)
}

/// Geometry written by the GUI thread and read by the engine thread at
/// arbitrary times. Width and height share one word so a reader never sees
/// half of a resize.
#[derive(Debug)]
pub struct ViewState {
    size: AtomicU64,
    scale_bits: AtomicU32,
    focused: AtomicBool,
}

impl ViewState {
    pub fn new() -> Self {
        Self {
            size: AtomicU64::new(0),
            scale_bits: AtomicU32::new(1.0f32.to_bits()),
            focused: AtomicBool::new(false),
        }
    }

    pub fn set_size(&self, width: i32, height: i32) {
        self.size.store(pack_size(width, height), Ordering::Release);
    }

    pub fn size(&self) -> (i32, i32) {
        unpack_size(self.size.load(Ordering::Acquire))
    }

    pub fn set_scale_factor(&self, scale: f32) {
        self.scale_bits.store(scale.to_bits(), Ordering::Release);
    }

    pub fn scale_factor(&self) -> f32 {
        f32::from_bits(self.scale_bits.load(Ordering::Acquire))
    }

    pub fn set_focus(&self, focus: bool) {
        self.focused.store(focus, Ordering::Release);
    }

    pub fn has_focus(&self) -> bool {
        self.focused.load(Ordering::Acquire)
    }

    /// Logical view rect; the engine applies the scale factor itself.
    pub fn view_rect(&self) -> Rect {
        match self.size() {
            (w, h) if w > 0 && h > 0 => Rect::new(0, 0, w, h),
            _ => Rect::new(0, 0, DEFAULT_VIEW_WIDTH, DEFAULT_VIEW_HEIGHT),
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadingState {
    pub is_loading: bool,
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

type TextCallback = Arc<dyn Fn(&str) + Send + Sync>;
type LoadingCallback = Arc<dyn Fn(LoadingState) + Send + Sync>;
type RenderCallback = Arc<dyn Fn(PaintElement) + Send + Sync>;

#[derive(Default, Clone)]
struct Callbacks {
    address: Option<TextCallback>,
    title: Option<TextCallback>,
    loading: Option<LoadingCallback>,
    render_invalidated: Option<RenderCallback>,
}

#[derive(Debug, Default)]
struct ScriptRequest {
    completed: bool,
    payload: String,
}

/// Per-browser receiver of every engine callback.
///
/// The host registers what it cares about through the `set_*` callback
/// slots. Callbacks run on the engine thread; a slot that touches widgets
/// must marshal through a [`GuiDispatcher`](super::marshal::GuiDispatcher).
pub struct ClientAdapter {
    id: BrowserId,
    view: ViewState,
    renderer: Weak<Mutex<GlRenderer>>,
    callbacks: RwLock<Callbacks>,
    router: MessageRouter,
    scripts: Mutex<HashMap<String, ScriptRequest>>,
    next_script_id: AtomicU64,
    attached: AtomicBool,
}

impl ClientAdapter {
    pub fn new(id: BrowserId, renderer: &SharedRenderer) -> Self {
        Self {
            id,
            view: ViewState::new(),
            renderer: Arc::downgrade(renderer),
            callbacks: RwLock::new(Callbacks::default()),
            router: MessageRouter::new(),
            scripts: Mutex::new(HashMap::new()),
            next_script_id: AtomicU64::new(1),
            attached: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> BrowserId {
        self.id
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    fn with_renderer(&self, f: impl FnOnce(&mut GlRenderer)) -> bool {
        match self.renderer.upgrade() {
            Some(renderer) => {
                f(&mut renderer.lock());
                true
            }
            None => false,
        }
    }

    fn guarded<R>(&self, callback: &str, fallback: R, f: impl FnOnce() -> R) -> R {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => value,
            Err(_) => {
                error!("Browser {}: panic in {} callback", self.id, callback);
                fallback
            }
        }
    }

    // ---- callback slots -------------------------------------------------

    pub fn set_on_address_change<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.write().address = Some(Arc::new(f));
    }

    pub fn set_on_title_change<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.write().title = Some(Arc::new(f));
    }

    pub fn set_on_loading_state_change<F>(&self, f: F)
    where
        F: Fn(LoadingState) + Send + Sync + 'static,
    {
        self.callbacks.write().loading = Some(Arc::new(f));
    }

    pub fn set_on_render_invalidated<F>(&self, f: F)
    where
        F: Fn(PaintElement) + Send + Sync + 'static,
    {
        self.callbacks.write().render_invalidated = Some(Arc::new(f));
    }

    // ---- GUI-thread operations ------------------------------------------

    /// Records the logical size, tells the renderer, then notifies the
    /// browser once if attached. Repeating the same size still notifies.
    pub fn set_size(&self, width: i32, height: i32, browser: Option<&dyn NativeBrowser>) {
        self.view.set_size(width, height);
        self.with_renderer(|r| r.set_view_size(width, height));
        if let Some(browser) = browser {
            browser.was_resized();
        }
    }

    pub fn set_device_scale_factor(&self, scale: f32, browser: Option<&dyn NativeBrowser>) {
        self.view.set_scale_factor(scale);
        self.with_renderer(|r| r.set_scale_factor(scale));
        if let Some(browser) = browser {
            browser.was_resized();
        }
    }

    pub fn set_focus(&self, focus: bool) {
        self.view.set_focus(focus);
        debug!("Browser {}: focus state changed to {}", self.id, focus);
    }

    pub fn device_scale_factor(&self) -> f32 {
        self.view.scale_factor()
    }

    // ---- router ----------------------------------------------------------

    pub fn register_query_handler<F>(&self, query_type: &str, handler: F)
    where
        F: Fn(&QueryRequest<'_>, QueryCallback) -> bool + Send + Sync + 'static,
    {
        self.router.register_handler(query_type, handler);
    }

    pub fn register_query_cancel_hook<F>(&self, query_type: &str, hook: F)
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        self.router.register_cancel_hook(query_type, hook);
    }

    pub fn unregister_query_handler(&self, query_type: &str) {
        self.router.unregister_handler(query_type);
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    // ---- script evaluation ----------------------------------------------

    /// Sends `code` to the main frame. Returns the request id to poll with
    /// [`try_consume_script_result`](Self::try_consume_script_result), or
    /// `None` before the browser is attached.
    pub fn request_script_evaluation(
        &self,
        browser: Option<&dyn NativeBrowser>,
        code: &str,
    ) -> Option<String> {
        let Some(browser) = browser else {
            warn!("Browser {}: script evaluation requested before attach", self.id);
            return None;
        };

        let request_id = self.next_script_id.fetch_add(1, Ordering::Relaxed).to_string();
        self.scripts
            .lock()
            .insert(request_id.clone(), ScriptRequest::default());

        debug!("Browser {}: dispatching script request {}", self.id, request_id);
        browser.execute_script(&request_id, code);
        Some(request_id)
    }

    /// Takes the result payload once it has arrived.
    pub fn try_consume_script_result(&self, request_id: &str) -> Option<String> {
        let mut scripts = self.scripts.lock();
        match scripts.get(request_id) {
            Some(request) if request.completed => {
                scripts.remove(request_id).map(|r| r.payload)
            }
            _ => None,
        }
    }

    pub fn cancel_script_evaluation(&self, request_id: &str) {
        self.scripts.lock().remove(request_id);
    }

    pub fn pending_script_count(&self) -> usize {
        self.scripts.lock().len()
    }

    // ---- engine-thread callbacks ------------------------------------------

    pub fn on_after_created(&self, browser: &dyn NativeBrowser) {
        self.guarded("on_after_created", (), || {
            self.attached.store(true, Ordering::Release);
            info!(
                "Browser {} attached (native id {}), scale factor {}",
                self.id,
                browser.native_id(),
                self.view.scale_factor()
            );
        })
    }

    /// Returning false lets the close proceed.
    pub fn do_close(&self, _browser: &dyn NativeBrowser) -> bool {
        false
    }

    pub fn on_before_close(&self, _browser: &dyn NativeBrowser) {
        self.guarded("on_before_close", (), || {
            self.attached.store(false, Ordering::Release);
            self.router.cancel_all();
            self.scripts.lock().clear();
            info!("Browser {} closed", self.id);
        })
    }

    pub fn on_title_change(&self, title: &str) {
        self.guarded("on_title_change", (), || {
            let callback = self.callbacks.read().title.clone();
            if let Some(callback) = callback {
                callback(title);
            }
        })
    }

    /// Only main-frame address changes are forwarded.
    pub fn on_address_change(&self, frame: &FrameRef, url: &str) {
        self.guarded("on_address_change", (), || {
            if !frame.is_main {
                return;
            }
            let callback = self.callbacks.read().address.clone();
            if let Some(callback) = callback {
                callback(url);
            }
        })
    }

    pub fn on_loading_state_change(
        &self,
        browser: &dyn NativeBrowser,
        is_loading: bool,
        can_go_back: bool,
        can_go_forward: bool,
    ) {
        self.guarded("on_loading_state_change", (), || {
            // The engine loses track of focus across navigations; re-assert
            // it once the load finishes so the caret stays visible.
            if !is_loading && self.view.has_focus() {
                debug!("Browser {}: load complete, refreshing focus", self.id);
                browser.set_focus(true);
            }

            let callback = self.callbacks.read().loading.clone();
            if let Some(callback) = callback {
                callback(LoadingState {
                    is_loading,
                    can_go_back,
                    can_go_forward,
                });
            }
        })
    }

    pub fn view_rect(&self) -> Rect {
        self.view.view_rect()
    }

    pub fn screen_scale_factor(&self) -> f32 {
        self.view.scale_factor()
    }

    pub fn on_paint(
        &self,
        element: PaintElement,
        dirty_rects: &[Rect],
        buffer: &[u8],
        width: i32,
        height: i32,
    ) {
        self.guarded("on_paint", (), || {
            let mut result = Ok(());
            let alive = self.with_renderer(|r| {
                result = r.on_paint(element, dirty_rects, buffer, width, height);
            });
            if !alive {
                trace!("Browser {}: paint dropped, renderer gone", self.id);
                return;
            }
            if let Err(e) = result {
                warn!("Browser {}: paint upload failed: {}", self.id, e);
            }

            let callback = self.callbacks.read().render_invalidated.clone();
            if let Some(callback) = callback {
                callback(element);
            }
        })
    }

    pub fn on_popup_show(&self, browser: &dyn NativeBrowser, show: bool) {
        self.guarded("on_popup_show", (), || {
            self.with_renderer(|r| r.on_popup_show(show));
            if !show {
                browser.invalidate(PaintElement::View);
            }
        })
    }

    pub fn on_popup_size(&self, rect: Rect) {
        self.guarded("on_popup_size", (), || {
            self.with_renderer(|r| r.on_popup_size(rect));
        })
    }

    pub fn on_query(
        &self,
        browser: &dyn NativeBrowser,
        frame: &FrameRef,
        query_id: i64,
        request: &str,
        persistent: bool,
        responder: QueryResponder,
    ) -> bool {
        self.guarded("on_query", false, || {
            self.router
                .on_query(browser, frame, query_id, request, persistent, responder)
        })
    }

    pub fn on_query_canceled(&self, query_id: i64) {
        self.guarded("on_query_canceled", (), || {
            self.router.on_query_canceled(query_id);
        })
    }

    pub fn on_script_result(&self, request_id: &str, payload: &str) {
        self.guarded("on_script_result", (), || {
            let mut scripts = self.scripts.lock();
            match scripts.get_mut(request_id) {
                Some(request) => {
                    request.completed = true;
                    request.payload = payload.to_string();
                    debug!("Browser {}: script result for request {}", self.id, request_id);
                }
                None => warn!(
                    "Browser {}: script result for unknown request {}",
                    self.id, request_id
                ),
            }
        })
    }
}
