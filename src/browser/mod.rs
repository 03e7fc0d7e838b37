//! Host-facing browser management.
//!
//! [`BrowserEngine`] is the only surface tab UI and automation layers may
//! depend on. [`Engine`] implements it over a [`NativeEngine`] backend.

pub mod adapter;
pub mod debug_port;
pub mod engine;
pub mod flags;
pub mod headless;
pub mod marshal;
pub mod native;
pub mod router;
pub mod script;

pub use adapter::{ClientAdapter, LoadingState, ViewState};
pub use engine::Engine;
pub use flags::{FlagPreset, HostOs};
pub use headless::HeadlessEngine;
pub use marshal::{GuiDispatcher, GuiTaskQueue, MarshalError};
pub use native::{NativeBrowser, NativeEngine, RequestContext};
pub use router::{MessageRouter, QueryCallback, QueryRequest, RouterError};
pub use script::ScriptResult;

use crate::core::Point;
use crate::rendering::SharedRenderer;
use async_trait::async_trait;
use raw_window_handle::WindowHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Opaque browser handle. 0 is never issued and ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BrowserId(pub u64);

impl BrowserId {
    pub const INVALID: BrowserId = BrowserId(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for BrowserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine already initialized")]
    AlreadyInitialized,
    #[error("Engine not initialized")]
    NotInitialized,
    #[error("A renderer is required to create a browser")]
    MissingRenderer,
    #[error("Browser creation failed: {0}")]
    CreationFailed(String),
    #[error("Engine initialization failed: {0}")]
    InitializationFailed(String),
    #[error("Remote debugging port {port} is still in use after {waited_ms} ms")]
    DebugPortBusy { port: u16, waited_ms: u64 },
    #[error("Invalid engine configuration: {0}")]
    Config(String),
}

/// Engine-wide settings, fixed once `initialize` succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache_path: Option<PathBuf>,
    /// Helper executable for engine subprocesses; the current executable
    /// when unset.
    pub subprocess_path: Option<PathBuf>,
    pub enable_sandbox: bool,
    pub windowless_rendering: bool,
    pub frame_rate: u32,
    /// Fixed remote-debugging port, or 0 to let the engine choose.
    pub remote_debugging_port: u16,
    pub port_wait_timeout_ms: i64,
    pub flag_preset: FlagPreset,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_path: None,
            subprocess_path: None,
            enable_sandbox: false,
            windowless_rendering: true,
            frame_rate: 60,
            remote_debugging_port: 0,
            port_wait_timeout_ms: debug_port::DEFAULT_PORT_WAIT_MS,
            flag_preset: FlagPreset::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    /// Port wait timeout clamped to [0, 60000] ms.
    pub fn port_wait_timeout(&self) -> Duration {
        debug_port::clamp_wait_timeout(self.port_wait_timeout_ms)
    }
}

/// Per-browser creation parameters. `renderer` and `window` are borrowed:
/// both must outlive the browser.
pub struct BrowserConfig<'a> {
    pub url: String,
    pub width: i32,
    pub height: i32,
    pub device_scale_factor: f32,
    pub renderer: Option<&'a SharedRenderer>,
    pub window: Option<WindowHandle<'a>>,
    /// Give the browser its own cookie jar instead of the shared one.
    pub isolate_storage: bool,
}

impl Default for BrowserConfig<'_> {
    fn default() -> Self {
        Self {
            url: String::new(),
            width: 1200,
            height: 800,
            device_scale_factor: 1.0,
            renderer: None,
            window: None,
            isolate_storage: false,
        }
    }
}

impl<'a> BrowserConfig<'a> {
    pub fn new(url: impl Into<String>, renderer: &'a SharedRenderer) -> Self {
        Self {
            url: url.into(),
            renderer: Some(renderer),
            ..Self::default()
        }
    }
}

/// Operations on a stale or not-yet-attached id are no-ops that return safe
/// defaults.
#[async_trait(?Send)]
pub trait BrowserEngine {
    async fn initialize(&mut self, config: EngineConfig) -> Result<(), EngineError>;
    async fn shutdown(&mut self);
    fn is_initialized(&self) -> bool;

    fn create_browser(&mut self, config: BrowserConfig<'_>) -> Result<BrowserId, EngineError>;
    fn close_browser(&mut self, id: BrowserId, force: bool);
    fn has_browser(&self, id: BrowserId) -> bool;

    fn load_url(&self, id: BrowserId, url: &str);
    fn go_back(&self, id: BrowserId);
    fn go_forward(&self, id: BrowserId);
    fn reload(&self, id: BrowserId, ignore_cache: bool);
    fn stop_load(&self, id: BrowserId);

    fn can_go_back(&self, id: BrowserId) -> bool;
    fn can_go_forward(&self, id: BrowserId) -> bool;
    fn is_loading(&self, id: BrowserId) -> bool;
    fn url(&self, id: BrowserId) -> String;

    fn set_size(&self, id: BrowserId, width: i32, height: i32);
    fn set_device_scale_factor(&self, id: BrowserId, scale: f32);
    fn invalidate(&self, id: BrowserId);
    fn set_focus(&self, id: BrowserId, focus: bool);

    /// Pumps the backend run loop one step. Call regularly from the host
    /// loop.
    fn do_message_loop_work(&mut self);

    fn show_dev_tools(&self, id: BrowserId, inspect_at: Option<Point>);

    fn execute_script(&self, id: BrowserId, code: &str) -> Option<String>;
    fn try_consume_script_result(&self, id: BrowserId, request_id: &str) -> Option<String>;
    fn cancel_script(&self, id: BrowserId, request_id: &str);
}
