use base64::Engine as _;
use osr_browser_engine::browser::LoadingState;
use osr_browser_engine::{
    BrowserConfig, BrowserEngine, Engine, EngineConfig, GlRenderer, GuiTaskQueue, HeadlessEngine,
    MemorySurface, PaintElement, ScreenshotOptions,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[tokio::test]
async fn test_browse_and_capture() {
    let gui = GuiTaskQueue::new();
    let renderer = GlRenderer::shared();
    renderer
        .lock()
        .initialize(Box::new(MemorySurface::new()))
        .unwrap();

    let mut engine = Engine::new(HeadlessEngine::new());
    engine.initialize(EngineConfig::default()).await.unwrap();

    let id = engine
        .create_browser(BrowserConfig {
            width: 320,
            height: 240,
            ..BrowserConfig::new("https://news.example/", &renderer)
        })
        .unwrap();

    let addresses = Arc::new(Mutex::new(Vec::new()));
    let loading = Arc::new(Mutex::new(Vec::new()));
    let frames = Arc::new(Mutex::new(0usize));
    {
        let client = engine.client(id).unwrap();
        let dispatcher = gui.dispatcher();
        let sink = Arc::clone(&addresses);
        client.set_on_address_change(move |url| {
            let url = url.to_string();
            let _ = dispatcher.post(&Arc::downgrade(&sink), move |list: &Mutex<Vec<String>>| {
                list.lock().push(url)
            });
        });
        let sink = Arc::clone(&loading);
        client.set_on_loading_state_change(move |state: LoadingState| sink.lock().push(state));
        let sink = Arc::clone(&frames);
        client.set_on_render_invalidated(move |element| {
            if element == PaintElement::View {
                *sink.lock() += 1;
            }
        });
    }

    engine.do_message_loop_work();
    engine.load_url(id, "https://news.example/story");
    engine.do_message_loop_work();
    engine.go_back(id);
    engine.do_message_loop_work();
    gui.run_pending();

    assert_eq!(
        *addresses.lock(),
        vec![
            "https://news.example/".to_string(),
            "https://news.example/story".to_string(),
            "https://news.example/".to_string(),
        ]
    );

    let states = loading.lock().clone();
    assert_eq!(states.len(), 6);
    assert!(states.chunks(2).all(|pair| pair[0].is_loading && !pair[1].is_loading));
    assert_eq!(
        states[3],
        LoadingState {
            is_loading: false,
            can_go_back: true,
            can_go_forward: false,
        }
    );
    assert!(states[5].can_go_forward);
    assert_eq!(*frames.lock(), 3);

    let encoded = renderer
        .lock()
        .take_screenshot(&ScreenshotOptions::default())
        .unwrap();
    let png = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap();
    let image = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (160, 120));
    let first = image.get_pixel(0, 0).0;
    assert!(image.pixels().all(|p| p.0 == first));
    assert_eq!(first[3], 0xff);

    engine.shutdown().await;
    assert!(engine.is_empty());
}
