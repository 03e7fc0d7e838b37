//! Off-screen browser engine host.
//!
//! Notes for the embedding application:
//!  - All engine operations run on the thread that pumps
//!    [`BrowserEngine::do_message_loop_work`]; the async lifecycle methods
//!    (`initialize`, `shutdown`) are `?Send` and belong on a current-thread
//!    runtime or a `tokio::task::LocalSet`.
//!  - Engine callbacks that touch widgets must hop to the GUI thread through
//!    a [`GuiDispatcher`].
//!  - Frames arrive as BGRA paint buffers and end up in a [`GlRenderer`]
//!    texture the host draws from its own render callback.

use thiserror::Error;

pub mod browser;
pub mod core;
pub mod rendering;

pub use crate::browser::{
    BrowserConfig, BrowserEngine, BrowserId, ClientAdapter, Engine, EngineConfig, EngineError,
    FlagPreset, GuiDispatcher, GuiTaskQueue, HeadlessEngine, MarshalError, MessageRouter,
    QueryCallback, RouterError, ScriptResult,
};
pub use crate::browser::native::NativeError;
pub use crate::core::{Point, Rect, ScaleFactor, Size};
pub use crate::rendering::{
    BufferError, GlRenderer, MemorySurface, PaintElement, RenderError, ScalingManager,
    ScreenshotError, ScreenshotOptions, SharedRenderer,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Engine error: {0}")]
    Engine(EngineError),
    #[error("Native engine error: {0}")]
    Native(NativeError),
    #[error("Render error: {0}")]
    Render(RenderError),
    #[error("Pixel buffer error: {0}")]
    Buffer(BufferError),
    #[error("Screenshot error: {0}")]
    Screenshot(ScreenshotError),
    #[error("Query router error: {0}")]
    Router(RouterError),
    #[error("GUI marshaling error: {0}")]
    Marshal(MarshalError),
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Error::Engine(e)
    }
}
impl From<NativeError> for Error {
    fn from(e: NativeError) -> Self {
        Error::Native(e)
    }
}
impl From<RenderError> for Error {
    fn from(e: RenderError) -> Self {
        Error::Render(e)
    }
}
impl From<BufferError> for Error {
    fn from(e: BufferError) -> Self {
        Error::Buffer(e)
    }
}
impl From<ScreenshotError> for Error {
    fn from(e: ScreenshotError) -> Self {
        Error::Screenshot(e)
    }
}
impl From<RouterError> for Error {
    fn from(e: RouterError) -> Self {
        Error::Router(e)
    }
}
impl From<MarshalError> for Error {
    fn from(e: MarshalError) -> Self {
        Error::Marshal(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
