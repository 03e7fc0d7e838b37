use osr_browser_engine::browser::NativeBrowser;
use osr_browser_engine::core::{Point, Size};
use osr_browser_engine::{
    BrowserConfig, BrowserEngine, BrowserId, Engine, EngineConfig, EngineError, GlRenderer,
    HeadlessEngine, MemorySurface, ScriptResult, SharedRenderer,
};
use std::net::{Ipv4Addr, TcpListener};
use std::thread;
use std::time::{Duration, Instant};

fn renderer() -> SharedRenderer {
    let renderer = GlRenderer::shared();
    renderer
        .lock()
        .initialize(Box::new(MemorySurface::new()))
        .unwrap();
    renderer
}

async fn started() -> Engine<HeadlessEngine> {
    let mut engine = Engine::new(HeadlessEngine::new());
    engine.initialize(EngineConfig::default()).await.unwrap();
    engine
}

fn pump(engine: &mut Engine<HeadlessEngine>, times: usize) {
    for _ in 0..times {
        engine.do_message_loop_work();
    }
}

#[tokio::test]
async fn test_browser_attaches_after_pump() {
    let mut engine = started().await;
    let renderer = renderer();

    let id = engine
        .create_browser(BrowserConfig::new("https://example.com/", &renderer))
        .unwrap();
    assert!(id.is_valid());
    assert!(engine.has_browser(id));
    assert!(!engine.is_attached(id));
    assert_eq!(engine.url(id), "");

    pump(&mut engine, 1);
    assert!(engine.is_attached(id));
    assert_eq!(engine.url(id), "https://example.com/");
    assert!(!engine.is_loading(id));
    assert_eq!(renderer.lock().view_size(), Size::new(1200, 800));
}

#[tokio::test]
async fn test_ids_are_unique_across_close() {
    let mut engine = started().await;
    let renderer = renderer();

    let mut seen = Vec::new();
    for _ in 0..5 {
        let id = engine
            .create_browser(BrowserConfig::new("about:blank", &renderer))
            .unwrap();
        assert!(!seen.contains(&id));
        seen.push(id);
        pump(&mut engine, 1);
        engine.close_browser(id, true);
    }
    pump(&mut engine, 2);
    assert!(engine.is_empty());
    assert_eq!(engine.native().live_count(), 0);
}

#[tokio::test]
async fn test_unknown_ids_are_safe_noops() {
    let mut engine = started().await;
    let ghost = BrowserId(99);

    engine.close_browser(ghost, true);
    engine.load_url(ghost, "https://example.com");
    engine.go_back(ghost);
    engine.set_size(ghost, 10, 10);
    engine.set_focus(ghost, true);
    engine.show_dev_tools(ghost, None);

    assert!(!engine.has_browser(ghost));
    assert!(!engine.can_go_back(ghost));
    assert!(!engine.can_go_forward(ghost));
    assert!(!engine.is_loading(ghost));
    assert_eq!(engine.url(ghost), "");
    assert_eq!(engine.execute_script(ghost, "1"), None);
    assert_eq!(engine.try_consume_script_result(ghost, "1"), None);
}

#[tokio::test]
async fn test_rejected_creation_leaves_no_entry() {
    let mut engine = started().await;
    let renderer = renderer();

    engine.native_mut().reject_next_create();
    let result = engine.create_browser(BrowserConfig::new("about:blank", &renderer));
    assert!(matches!(result, Err(EngineError::CreationFailed(_))));
    assert!(engine.is_empty());

    let id = engine
        .create_browser(BrowserConfig::new("about:blank", &renderer))
        .unwrap();
    assert_eq!(engine.browser_ids(), vec![id]);
}

#[tokio::test]
async fn test_failed_startup_can_be_retried() {
    let mut engine = Engine::new(HeadlessEngine::new());
    engine.native_mut().fail_next_startup("no GPU process");

    let result = engine.initialize(EngineConfig::default()).await;
    assert!(matches!(result, Err(EngineError::InitializationFailed(msg)) if msg.contains("no GPU process")));
    assert!(!engine.is_initialized());

    engine.initialize(EngineConfig::default()).await.unwrap();
    assert!(engine.is_initialized());
    let settings = engine.native().settings().unwrap();
    assert!(settings.no_sandbox);
    assert!(settings.windowless_rendering);
    assert!(settings
        .command_line
        .contains(&"--disable-gpu-sandbox".to_string()));
}

#[tokio::test]
async fn test_state_set_before_attach_is_applied() {
    let mut engine = started().await;
    let renderer = renderer();

    let id = engine
        .create_browser(BrowserConfig::new("about:blank", &renderer))
        .unwrap();
    engine.set_size(id, 640, 480);
    engine.set_device_scale_factor(id, 2.0);
    engine.set_focus(id, true);
    engine.go_back(id);

    pump(&mut engine, 1);
    let browser = engine.native_browser(id).unwrap();
    assert_eq!(browser.resize_notifications(), 0);
    assert!(browser.has_focus());
    assert_eq!(renderer.lock().view_size(), Size::new(1280, 960));
    assert_eq!(renderer.lock().scale_factor(), 2.0);
}

#[tokio::test]
async fn test_device_scale_factor_change_repaints_at_new_density() {
    let mut engine = started().await;
    let renderer = renderer();

    let id = engine
        .create_browser(BrowserConfig::new("https://example.com/", &renderer))
        .unwrap();
    pump(&mut engine, 1);
    assert_eq!(renderer.lock().view_size(), Size::new(1200, 800));

    engine.set_device_scale_factor(id, 2.0);
    assert_eq!(engine.native_browser(id).unwrap().resize_notifications(), 1);
    assert_eq!(engine.client(id).unwrap().screen_scale_factor(), 2.0);

    pump(&mut engine, 1);
    assert_eq!(renderer.lock().view_size(), Size::new(2400, 1600));

    // Same value again still notifies exactly once.
    engine.set_device_scale_factor(id, 2.0);
    engine.set_size(id, 1200, 800);
    assert_eq!(engine.native_browser(id).unwrap().resize_notifications(), 3);
}

#[tokio::test]
async fn test_handle_arriving_after_close_is_released() {
    let mut engine = started().await;
    let renderer = renderer();

    let id = engine
        .create_browser(BrowserConfig::new("about:blank", &renderer))
        .unwrap();
    engine.close_browser(id, false);
    assert!(!engine.has_browser(id));

    pump(&mut engine, 1);
    assert_eq!(engine.native().live_count(), 1);
    pump(&mut engine, 1);
    assert_eq!(engine.native().live_count(), 0);
    assert!(engine.is_empty());
}

#[tokio::test]
async fn test_navigation_history() {
    let mut engine = started().await;
    let renderer = renderer();

    let id = engine
        .create_browser(BrowserConfig::new("https://a.example/", &renderer))
        .unwrap();
    pump(&mut engine, 1);

    engine.load_url(id, "https://b.example/");
    pump(&mut engine, 1);
    assert!(engine.can_go_back(id));
    assert!(!engine.can_go_forward(id));

    engine.go_back(id);
    pump(&mut engine, 1);
    assert_eq!(engine.url(id), "https://a.example/");
    assert!(engine.can_go_forward(id));

    engine.go_forward(id);
    pump(&mut engine, 1);
    assert_eq!(engine.url(id), "https://b.example/");

    engine.reload(id, true);
    engine.stop_load(id);
    pump(&mut engine, 1);
    assert_eq!(engine.url(id), "https://b.example/");
}

#[tokio::test]
async fn test_script_round_trip() {
    let mut engine = started().await;
    let renderer = renderer();

    let id = engine
        .create_browser(BrowserConfig::new(
            "data:text/html,<title>Checkout</title>",
            &renderer,
        ))
        .unwrap();
    assert_eq!(engine.execute_script(id, "document.title"), None);
    pump(&mut engine, 1);

    let request = engine.execute_script(id, "return document.title;").unwrap();
    assert_eq!(engine.try_consume_script_result(id, &request), None);
    pump(&mut engine, 1);

    let payload = engine.try_consume_script_result(id, &request).unwrap();
    let result = ScriptResult::parse(&payload).unwrap();
    assert!(result.success);
    assert_eq!(result.as_text(), "Checkout");
    assert_eq!(engine.try_consume_script_result(id, &request), None);

    let failing = engine.execute_script(id, "undefinedFunction()").unwrap();
    pump(&mut engine, 1);
    let result = ScriptResult::parse(&engine.try_consume_script_result(id, &failing).unwrap()).unwrap();
    assert!(!result.success);

    let cancelled = engine.execute_script(id, "1").unwrap();
    engine.cancel_script(id, &cancelled);
    pump(&mut engine, 1);
    assert_eq!(engine.try_consume_script_result(id, &cancelled), None);
}

#[tokio::test]
async fn test_dev_tools() {
    let mut engine = Engine::new(HeadlessEngine::new());
    engine.show_dev_tools(BrowserId(1), None);

    engine.initialize(EngineConfig::default()).await.unwrap();
    let renderer = renderer();
    let id = engine
        .create_browser(BrowserConfig::new("about:blank", &renderer))
        .unwrap();
    engine.show_dev_tools(id, None);
    pump(&mut engine, 1);
    assert_eq!(engine.native_browser(id).unwrap().dev_tools_opened(), 0);

    engine.show_dev_tools(id, Some(Point::new(10, 20)));
    assert_eq!(engine.native_browser(id).unwrap().dev_tools_opened(), 1);
}

#[tokio::test]
async fn test_focus_is_refreshed_after_load() {
    let mut engine = started().await;
    let renderer = renderer();

    let id = engine
        .create_browser(BrowserConfig::new("about:blank", &renderer))
        .unwrap();
    pump(&mut engine, 1);
    engine.set_focus(id, true);
    let before = engine.native_browser(id).unwrap().focus_calls();

    engine.load_url(id, "https://example.com/");
    pump(&mut engine, 1);
    assert_eq!(engine.native_browser(id).unwrap().focus_calls(), before + 1);
}

#[tokio::test]
async fn test_shutdown_closes_every_browser() {
    let mut engine = started().await;
    let renderer = renderer();

    for _ in 0..3 {
        engine
            .create_browser(BrowserConfig::new("about:blank", &renderer))
            .unwrap();
    }
    pump(&mut engine, 1);
    assert_eq!(engine.len(), 3);

    engine.shutdown().await;
    assert!(engine.is_empty());
    assert!(!engine.is_initialized());
    assert_eq!(engine.native().live_count(), 0);

    engine.shutdown().await;
    assert_eq!(
        engine.create_browser(BrowserConfig::new("about:blank", &renderer)),
        Err(EngineError::NotInitialized)
    );
}

fn occupied_port() -> (TcpListener, u16) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[tokio::test]
async fn test_busy_debug_port_without_wait_fails() {
    let (_listener, port) = occupied_port();
    let mut engine = Engine::new(HeadlessEngine::new());

    let config = EngineConfig {
        remote_debugging_port: port,
        port_wait_timeout_ms: 0,
        ..EngineConfig::default()
    };
    let result = engine.initialize(config).await;
    assert_eq!(
        result,
        Err(EngineError::DebugPortBusy { port, waited_ms: 0 })
    );
    assert!(!engine.is_initialized());
    assert!(!engine.native().is_running());
}

#[tokio::test]
async fn test_debug_port_released_within_wait() {
    let (listener, port) = occupied_port();
    let holder = thread::spawn(move || {
        thread::sleep(Duration::from_millis(500));
        drop(listener);
    });

    let mut engine = Engine::new(HeadlessEngine::new());
    let config = EngineConfig {
        remote_debugging_port: port,
        port_wait_timeout_ms: 3000,
        ..EngineConfig::default()
    };

    let start = Instant::now();
    engine.initialize(config).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(400));
    assert_eq!(engine.remote_debugging_port(), port);
    assert_eq!(engine.native().settings().unwrap().remote_debugging_port, port);

    holder.join().unwrap();
    engine.shutdown().await;
}
