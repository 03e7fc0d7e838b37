use super::adapter::ClientAdapter;
use super::debug_port::wait_for_port_availability;
use super::flags::{platform_flags, HostOs};
use super::native::{
    CreateBrowserRequest, NativeBrowser, NativeEngine, NativeEvent, NativeSettings, RequestContext,
};
use super::{BrowserConfig, BrowserEngine, BrowserId, EngineConfig, EngineError};
use crate::core::Point;
use crate::rendering::PaintElement;
use async_trait::async_trait;
use crossbeam::channel::{self, Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

struct BrowserInfo<B> {
    client: Arc<ClientAdapter>,
    /// `None` until the backend reports the browser as created.
    browser: Option<B>,
    request_context: Option<RequestContext>,
}

/// Browser registry over a single native backend.
///
/// The registry is instance-scoped and only touched from the thread that
/// calls [`do_message_loop_work`](BrowserEngine::do_message_loop_work).
pub struct Engine<N: NativeEngine> {
    native: N,
    initialized: bool,
    config: EngineConfig,
    next_id: u64,
    browsers: HashMap<BrowserId, BrowserInfo<N::Browser>>,
    events_tx: Sender<NativeEvent<N::Browser>>,
    events_rx: Receiver<NativeEvent<N::Browser>>,
    remote_debugging_port: u16,
    port_wait_timeout: Duration,
}

impl<N: NativeEngine> Engine<N> {
    pub fn new(native: N) -> Self {
        let (events_tx, events_rx) = channel::unbounded();
        Self {
            native,
            initialized: false,
            config: EngineConfig::default(),
            next_id: 1,
            browsers: HashMap::new(),
            events_tx,
            events_rx,
            remote_debugging_port: 0,
            port_wait_timeout: Duration::ZERO,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn native(&self) -> &N {
        &self.native
    }

    pub fn native_mut(&mut self) -> &mut N {
        &mut self.native
    }

    pub fn len(&self) -> usize {
        self.browsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.browsers.is_empty()
    }

    pub fn browser_ids(&self) -> Vec<BrowserId> {
        let mut ids: Vec<_> = self.browsers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn client(&self, id: BrowserId) -> Option<Arc<ClientAdapter>> {
        self.browsers.get(&id).map(|info| Arc::clone(&info.client))
    }

    pub fn native_browser(&self, id: BrowserId) -> Option<&N::Browser> {
        self.browsers.get(&id).and_then(|info| info.browser.as_ref())
    }

    pub fn is_attached(&self, id: BrowserId) -> bool {
        self.native_browser(id).is_some()
    }

    pub fn request_context(&self, id: BrowserId) -> Option<RequestContext> {
        self.browsers.get(&id).and_then(|info| info.request_context)
    }

    pub fn remote_debugging_port(&self) -> u16 {
        self.remote_debugging_port
    }

    fn generate_id(&mut self) -> BrowserId {
        let id = BrowserId(self.next_id);
        self.next_id += 1;
        id
    }

    fn with_attached(&self, id: BrowserId, f: impl FnOnce(&N::Browser)) {
        if let Some(browser) = self.native_browser(id) {
            f(browser);
        }
    }

    fn attached_dyn(&self, id: BrowserId) -> Option<(&Arc<ClientAdapter>, Option<&dyn NativeBrowser>)> {
        self.browsers.get(&id).map(|info| {
            (
                &info.client,
                info.browser.as_ref().map(|b| b as &dyn NativeBrowser),
            )
        })
    }

    fn release_context(&mut self, id: BrowserId, context: Option<RequestContext>) {
        if let Some(context) = context {
            debug!("Browser {}: releasing request context {}", id, context.id);
            self.native.release_context(context);
        }
    }

    fn drain_native_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                NativeEvent::Created { id, browser } => match self.browsers.get_mut(&id) {
                    Some(info) => {
                        if info.client.view().has_focus() {
                            browser.set_focus(true);
                        }
                        info.browser = Some(browser);
                        debug!("Browser {} attached", id);
                    }
                    None => {
                        debug!("Browser {} was closed before it attached; closing handle", id);
                        browser.close(true);
                    }
                },
                NativeEvent::Closed { id } => {
                    let attached = self
                        .browsers
                        .get(&id)
                        .map_or(false, |info| info.browser.is_some());
                    if attached {
                        if let Some(info) = self.browsers.remove(&id) {
                            self.release_context(id, info.request_context);
                        }
                        info!("Browser {} closed by the engine", id);
                    }
                }
            }
        }
    }

    fn teardown(&mut self) {
        let closing: Vec<_> = self.browsers.drain().collect();
        for (id, info) in closing {
            if let Some(browser) = info.browser {
                browser.close(true);
            }
            self.release_context(id, info.request_context);
        }
        self.native.shutdown();
        while self.events_rx.try_recv().is_ok() {}
        self.initialized = false;
    }
}

#[async_trait(?Send)]
impl<N: NativeEngine> BrowserEngine for Engine<N> {
    async fn initialize(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        if self.initialized {
            return Err(EngineError::AlreadyInitialized);
        }

        let port = config.remote_debugging_port;
        let timeout = config.port_wait_timeout();

        if port > 0 {
            if !wait_for_port_availability(port, timeout).await {
                return Err(EngineError::DebugPortBusy {
                    port,
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            info!("Remote debugging enabled on fixed port {}", port);
        } else {
            info!("Remote debugging port set to dynamic allocation");
        }

        let command_line = platform_flags(config.flag_preset, HostOs::current());
        let settings = NativeSettings {
            cache_path: config.cache_path.clone(),
            subprocess_path: config
                .subprocess_path
                .clone()
                .or_else(|| std::env::current_exe().ok()),
            no_sandbox: !config.enable_sandbox,
            windowless_rendering: config.windowless_rendering,
            remote_debugging_port: port,
            command_line: Vec::new(),
        }
        .with_command_line(&command_line);

        self.native
            .initialize(&settings, self.events_tx.clone())
            .map_err(|e| EngineError::InitializationFailed(e.to_string()))?;

        self.remote_debugging_port = port;
        self.port_wait_timeout = timeout;
        self.config = config;
        self.initialized = true;
        info!(
            "Engine initialized ({} preset, {} startup switches)",
            self.config.flag_preset,
            command_line.len()
        );
        Ok(())
    }

    async fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }

        let open = self.browsers.len();
        self.teardown();

        let port = self.remote_debugging_port;
        if port > 0 && !wait_for_port_availability(port, self.port_wait_timeout).await {
            warn!(
                "Remote debugging port {} did not become available within {} ms; \
                 a lingering process may still be holding it",
                port,
                self.port_wait_timeout.as_millis()
            );
        }
        self.remote_debugging_port = 0;

        info!("Engine shutdown complete ({} browsers closed)", open);
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn create_browser(&mut self, config: BrowserConfig<'_>) -> Result<BrowserId, EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        let renderer = config.renderer.ok_or(EngineError::MissingRenderer)?;

        let id = self.generate_id();
        let client = Arc::new(ClientAdapter::new(id, renderer));
        client.set_device_scale_factor(config.device_scale_factor, None);
        client.set_size(config.width, config.height, None);

        let request_context = if config.isolate_storage {
            let context = self.native.create_isolated_context();
            debug!("Browser {}: isolated request context {}", id, context.id);
            Some(context)
        } else {
            debug!("Browser {}: using the global request context", id);
            None
        };

        // Registered before the backend confirms so commands on `id` are
        // accepted right away.
        self.browsers.insert(
            id,
            BrowserInfo {
                client: Arc::clone(&client),
                browser: None,
                request_context,
            },
        );

        let request = CreateBrowserRequest {
            id,
            client,
            url: config.url.clone(),
            frame_rate: self.config.frame_rate,
            request_context,
            parent_window: config.window.map(|w| w.as_raw()),
        };

        if let Err(e) = self.native.create_browser(request) {
            self.browsers.remove(&id);
            self.release_context(id, request_context);
            return Err(EngineError::CreationFailed(e.to_string()));
        }

        info!("Browser {} created with URL: {}", id, config.url);
        Ok(id)
    }

    fn close_browser(&mut self, id: BrowserId, force: bool) {
        let Some(info) = self.browsers.remove(&id) else {
            return;
        };
        if let Some(browser) = info.browser {
            browser.close(force);
        }
        self.release_context(id, info.request_context);
        debug!("Browser {} removed from registry", id);
    }

    fn has_browser(&self, id: BrowserId) -> bool {
        self.browsers.contains_key(&id)
    }

    fn load_url(&self, id: BrowserId, url: &str) {
        self.with_attached(id, |b| b.load_url(url));
    }

    fn go_back(&self, id: BrowserId) {
        self.with_attached(id, |b| {
            if b.can_go_back() {
                b.go_back();
            }
        });
    }

    fn go_forward(&self, id: BrowserId) {
        self.with_attached(id, |b| {
            if b.can_go_forward() {
                b.go_forward();
            }
        });
    }

    fn reload(&self, id: BrowserId, ignore_cache: bool) {
        self.with_attached(id, |b| {
            if ignore_cache {
                b.reload_ignore_cache();
            } else {
                b.reload();
            }
        });
    }

    fn stop_load(&self, id: BrowserId) {
        self.with_attached(id, |b| b.stop_load());
    }

    fn can_go_back(&self, id: BrowserId) -> bool {
        self.native_browser(id).map_or(false, |b| b.can_go_back())
    }

    fn can_go_forward(&self, id: BrowserId) -> bool {
        self.native_browser(id).map_or(false, |b| b.can_go_forward())
    }

    fn is_loading(&self, id: BrowserId) -> bool {
        self.native_browser(id).map_or(false, |b| b.is_loading())
    }

    fn url(&self, id: BrowserId) -> String {
        self.native_browser(id).map(|b| b.url()).unwrap_or_default()
    }

    fn set_size(&self, id: BrowserId, width: i32, height: i32) {
        if let Some((client, browser)) = self.attached_dyn(id) {
            client.set_size(width, height, browser);
        }
    }

    fn set_device_scale_factor(&self, id: BrowserId, scale: f32) {
        if let Some((client, browser)) = self.attached_dyn(id) {
            client.set_device_scale_factor(scale, browser);
        }
    }

    fn invalidate(&self, id: BrowserId) {
        self.with_attached(id, |b| b.invalidate(PaintElement::View));
    }

    fn set_focus(&self, id: BrowserId, focus: bool) {
        if let Some((client, browser)) = self.attached_dyn(id) {
            client.set_focus(focus);
            if let Some(browser) = browser {
                browser.set_focus(focus);
            }
        }
    }

    fn do_message_loop_work(&mut self) {
        if !self.initialized {
            return;
        }
        self.native.do_message_loop_work();
        self.drain_native_events();
    }

    fn show_dev_tools(&self, id: BrowserId, inspect_at: Option<Point>) {
        if !self.initialized {
            warn!("show_dev_tools: engine not initialized");
            return;
        }
        let Some(info) = self.browsers.get(&id) else {
            warn!("show_dev_tools: no browser with id {}", id);
            return;
        };
        match &info.browser {
            Some(browser) => {
                browser.show_dev_tools(inspect_at);
                info!("DevTools opened for browser {}", id);
            }
            None => warn!("show_dev_tools: browser {} not attached yet", id),
        }
    }

    fn execute_script(&self, id: BrowserId, code: &str) -> Option<String> {
        let (client, browser) = self.attached_dyn(id)?;
        client.request_script_evaluation(browser, code)
    }

    fn try_consume_script_result(&self, id: BrowserId, request_id: &str) -> Option<String> {
        self.browsers
            .get(&id)?
            .client
            .try_consume_script_result(request_id)
    }

    fn cancel_script(&self, id: BrowserId, request_id: &str) {
        if let Some(info) = self.browsers.get(&id) {
            info.client.cancel_script_evaluation(request_id);
        }
    }
}

impl<N: NativeEngine> Drop for Engine<N> {
    fn drop(&mut self) {
        if self.initialized {
            self.teardown();
        }
    }
}
