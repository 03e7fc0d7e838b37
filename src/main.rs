use anyhow::{bail, Context};
use base64::Engine as _;
use osr_browser_engine::browser::flags::{preset_description, HostOs};
use osr_browser_engine::browser::NativeBrowser;
use osr_browser_engine::{
    BrowserConfig, BrowserEngine, BrowserId, Engine, EngineConfig, FlagPreset, GlRenderer,
    GuiTaskQueue, HeadlessEngine, MemorySurface, ScreenshotOptions, ScriptResult, SharedRenderer,
};
use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const MAX_PUMPS: usize = 500;

#[derive(Debug, Clone)]
struct AppConfig {
    url: String,
    config_path: Option<PathBuf>,
    preset: Option<FlagPreset>,
    width: i32,
    height: i32,
    scale: f32,
    isolate: bool,
    screenshot_path: Option<PathBuf>,
    keep_running: bool,
    enable_tracy: bool,
    log_level: Level,
}

impl AppConfig {
    fn from_args() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut config = Self::default();

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned();
            match (args[i].as_str(), value) {
                ("--url", Some(v)) => {
                    config.url = v;
                    i += 1;
                }
                ("--config", Some(v)) => {
                    config.config_path = Some(PathBuf::from(v));
                    i += 1;
                }
                ("--preset", Some(v)) => {
                    config.preset = FlagPreset::parse(&v);
                    if config.preset.is_none() {
                        eprintln!("Unknown preset '{}', using the configured one", v);
                    }
                    i += 1;
                }
                ("--size", Some(v)) => {
                    if let Some((w, h)) = v.split_once('x') {
                        config.width = w.parse().unwrap_or(config.width);
                        config.height = h.parse().unwrap_or(config.height);
                    }
                    i += 1;
                }
                ("--scale", Some(v)) => {
                    config.scale = v.parse().unwrap_or(config.scale);
                    i += 1;
                }
                ("--screenshot", Some(v)) => {
                    config.screenshot_path = Some(PathBuf::from(v));
                    i += 1;
                }
                ("--isolate", _) => config.isolate = true,
                ("--keep-running", _) => config.keep_running = true,
                ("--tracy", _) => config.enable_tracy = true,
                ("--debug", _) => config.log_level = Level::DEBUG,
                ("--trace", _) => config.log_level = Level::TRACE,
                _ => {}
            }
            i += 1;
        }

        config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            url: "data:text/html,<title>Off-screen host</title><h1>Ready</h1>".to_string(),
            config_path: None,
            preset: None,
            width: 1200,
            height: 800,
            scale: 1.0,
            isolate: false,
            screenshot_path: None,
            keep_running: false,
            enable_tracy: false,
            log_level: Level::INFO,
        }
    }
}

fn setup_logging(level: Level, enable_tracy: bool) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    if enable_tracy {
        #[cfg(feature = "tracy")]
        tracy_client::Client::start();
    }
    Ok(())
}

fn load_engine_config(app_config: &AppConfig) -> anyhow::Result<EngineConfig> {
    let mut config = match &app_config.config_path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(preset) = app_config.preset {
        config.flag_preset = preset;
    }
    Ok(config)
}

/// Pumps the engine and the GUI queue until `done` holds or the pump
/// budget runs out.
async fn pump_until(
    engine: &mut Engine<HeadlessEngine>,
    gui: &GuiTaskQueue,
    interval: Duration,
    mut done: impl FnMut(&Engine<HeadlessEngine>) -> bool,
) -> bool {
    for _ in 0..MAX_PUMPS {
        engine.do_message_loop_work();
        gui.run_pending();
        if done(engine) {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

fn wire_callbacks(engine: &Engine<HeadlessEngine>, id: BrowserId, gui: &GuiTaskQueue) {
    let Some(client) = engine.client(id) else {
        return;
    };

    let dispatcher = gui.dispatcher();
    client.set_on_title_change(move |title| {
        let title = title.to_string();
        let _ = dispatcher.dispatch(move || info!("Title: {}", title));
    });
    let dispatcher = gui.dispatcher();
    client.set_on_address_change(move |url| {
        let url = url.to_string();
        let _ = dispatcher.dispatch(move || info!("Address: {}", url));
    });
    client.set_on_loading_state_change(|state| {
        tracing::debug!("Loading state: {:?}", state);
    });

    client.register_query_handler("ping", |query, callback| {
        callback.success(format!("pong from browser {}", query.browser.native_id()))
    });
}

async fn run_demo(
    app_config: &AppConfig,
    engine: &mut Engine<HeadlessEngine>,
    renderer: &SharedRenderer,
    gui: &GuiTaskQueue,
) -> anyhow::Result<()> {
    let frame_interval = Duration::from_millis(1000 / engine.config().frame_rate.max(1) as u64);

    let id = engine.create_browser(BrowserConfig {
        url: app_config.url.clone(),
        width: app_config.width,
        height: app_config.height,
        device_scale_factor: app_config.scale,
        isolate_storage: app_config.isolate,
        ..BrowserConfig::new(app_config.url.clone(), renderer)
    })?;
    wire_callbacks(engine, id, gui);

    let load_start = Instant::now();
    let loaded = pump_until(engine, gui, frame_interval, |e| {
        e.native_browser(id).is_some() && !e.is_loading(id)
    })
    .await;
    if !loaded {
        bail!("Browser {} did not finish loading", id);
    }
    info!("Loaded {} in {:?}", engine.url(id), load_start.elapsed());

    if let Some(request_id) = engine.execute_script(id, "document.title") {
        let mut payload = None;
        pump_until(engine, gui, frame_interval, |e| {
            payload = e.try_consume_script_result(id, &request_id);
            payload.is_some()
        })
        .await;
        match payload.as_deref().map(ScriptResult::parse) {
            Some(Ok(result)) if result.success => info!("document.title = {}", result.as_text()),
            Some(Ok(result)) => warn!("Script failed: {:?}", result.error_message()),
            Some(Err(e)) => warn!("Unreadable script result: {}", e),
            None => warn!("No script result"),
        }
    }

    let screenshot = renderer.lock().take_screenshot(&ScreenshotOptions::default())?;
    let size = renderer.lock().view_size();
    info!("Screenshot of {} view: {} base64 bytes", size, screenshot.len());

    if let Some(path) = &app_config.screenshot_path {
        let png = base64::engine::general_purpose::STANDARD
            .decode(&screenshot)
            .context("Screenshot is not valid base64")?;
        std::fs::write(path, png)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Screenshot written to {}", path.display());
    }

    if app_config.keep_running {
        info!("Running until Ctrl-C");
        let mut ticker = tokio::time::interval(frame_interval);
        loop {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = ticker.tick() => {
                    engine.do_message_loop_work();
                    gui.run_pending();
                }
            }
        }
    }

    engine.close_browser(id, false);
    engine.do_message_loop_work();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let app_config = AppConfig::from_args();

    setup_logging(app_config.log_level, app_config.enable_tracy)?;

    info!("Starting off-screen browser host");

    let engine_config = load_engine_config(&app_config)?;
    info!(
        "{}",
        preset_description(engine_config.flag_preset, HostOs::current())
    );

    let renderer = GlRenderer::shared();
    renderer.lock().initialize(Box::new(MemorySurface::new()))?;

    let gui = GuiTaskQueue::new();
    let mut engine = Engine::new(HeadlessEngine::new());
    engine.initialize(engine_config).await?;

    let result = run_demo(&app_config, &mut engine, &renderer, &gui).await;
    if let Err(e) = &result {
        error!("Demo failed: {:#}", e);
    }

    engine.shutdown().await;
    renderer.lock().cleanup();
    result
}
