//! The seam between the host-facing engine and the one embedded web engine
//! it delegates to.
//!
//! A backend implements [`NativeEngine`] (global lifecycle, browser
//! creation, its own cooperative run loop) and hands out
//! [`NativeBrowser`] handles. Every callback a backend fires goes to the
//! browser's [`ClientAdapter`], on the thread that pumps the run loop.

use super::adapter::ClientAdapter;
use super::flags::CommandLine;
use super::BrowserId;
use crate::core::Point;
use crate::rendering::PaintElement;
use crossbeam::channel::Sender;
use raw_window_handle::RawWindowHandle;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NativeError {
    #[error("Engine startup failed: {0}")]
    Startup(String),
    #[error("Browser creation rejected: {0}")]
    CreateRejected(String),
    #[error("Engine is not running")]
    NotRunning,
}

/// Process-wide settings handed to the backend once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeSettings {
    pub cache_path: Option<PathBuf>,
    pub subprocess_path: Option<PathBuf>,
    pub no_sandbox: bool,
    pub windowless_rendering: bool,
    /// 0 lets the engine pick a port.
    pub remote_debugging_port: u16,
    pub command_line: Vec<String>,
}

impl NativeSettings {
    pub fn with_command_line(mut self, cmd: &CommandLine) -> Self {
        self.command_line = cmd.to_args();
        self
    }
}

/// Cookie/cache partition a browser runs in. Isolated contexts share the
/// global on-disk cache but keep their own cookie jar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestContext {
    pub id: u64,
    pub isolated: bool,
}

impl RequestContext {
    pub const GLOBAL: RequestContext = RequestContext {
        id: 0,
        isolated: false,
    };
}

/// A frame inside a browser, as seen by query handlers and navigation
/// callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameRef {
    pub id: i64,
    pub is_main: bool,
    pub url: String,
}

impl FrameRef {
    pub fn main(url: impl Into<String>) -> Self {
        Self {
            id: 1,
            is_main: true,
            url: url.into(),
        }
    }
}

/// Handle to one live native browser. Implementations are reference-counted
/// handles; the engine registry keeps exactly one and drops it on close.
pub trait NativeBrowser {
    /// Backend-assigned identifier, unrelated to [`BrowserId`].
    fn native_id(&self) -> i32;

    fn load_url(&self, url: &str);
    fn go_back(&self);
    fn go_forward(&self);
    fn can_go_back(&self) -> bool;
    fn can_go_forward(&self) -> bool;
    fn reload(&self);
    fn reload_ignore_cache(&self);
    fn stop_load(&self);
    fn is_loading(&self) -> bool;
    fn url(&self) -> String;

    fn was_resized(&self);
    fn invalidate(&self, element: PaintElement);
    fn set_focus(&self, focus: bool);
    fn show_dev_tools(&self, inspect_at: Option<Point>);

    /// Evaluates `code` in the main frame; the backend reports the outcome
    /// through `ClientAdapter::on_script_result` with `request_id`.
    fn execute_script(&self, request_id: &str, code: &str);

    fn close(&self, force: bool);
}

/// Lifecycle notices a backend reports for browsers it created.
pub enum NativeEvent<B> {
    Created { id: BrowserId, browser: B },
    Closed { id: BrowserId },
}

/// Everything the backend needs to create one browser.
pub struct CreateBrowserRequest {
    pub id: BrowserId,
    pub client: Arc<ClientAdapter>,
    pub url: String,
    pub frame_rate: u32,
    pub request_context: Option<RequestContext>,
    pub parent_window: Option<RawWindowHandle>,
}

pub trait NativeEngine {
    type Browser: NativeBrowser + 'static;

    /// `events` receives `Created` once the browser handle exists and
    /// `Closed` once the backend has finished tearing it down.
    fn initialize(
        &mut self,
        settings: &NativeSettings,
        events: Sender<NativeEvent<Self::Browser>>,
    ) -> Result<(), NativeError>;

    fn shutdown(&mut self);

    /// Starts asynchronous creation. Success only means the request was
    /// accepted; the handle arrives later as [`NativeEvent::Created`].
    fn create_browser(&mut self, request: CreateBrowserRequest) -> Result<(), NativeError>;

    fn create_isolated_context(&mut self) -> RequestContext;

    /// The host holds no more browsers in `context`. The backend frees the
    /// partition once the last browser running in it has closed. The global
    /// context is never released.
    fn release_context(&mut self, context: RequestContext);

    /// One non-blocking step of the backend's run loop.
    fn do_message_loop_work(&mut self);
}
