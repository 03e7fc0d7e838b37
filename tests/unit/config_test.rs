use osr_browser_engine::browser::flags::{platform_flags, preset_description, HostOs};
use osr_browser_engine::{EngineConfig, EngineError, FlagPreset, ScreenshotOptions};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::time::Duration;

#[test]
fn test_engine_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "cache_path": "/tmp/osr-cache",
            "remote_debugging_port": 9333,
            "port_wait_timeout_ms": 90000,
            "flag_preset": "performance"
        }}"#
    )
    .unwrap();

    let config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.remote_debugging_port, 9333);
    assert_eq!(config.flag_preset, FlagPreset::Performance);
    assert_eq!(config.port_wait_timeout(), Duration::from_secs(60));
    assert_eq!(
        config.cache_path.as_deref(),
        Some(std::path::Path::new("/tmp/osr-cache"))
    );
    assert_eq!(config.frame_rate, 60);
    assert!(!config.enable_sandbox);
}

#[test]
fn test_missing_config_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = EngineConfig::from_file(dir.path().join("absent.json"));
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[test]
fn test_screenshot_options_defaults() {
    let options: ScreenshotOptions = serde_json::from_str("{}").unwrap();
    assert!(options.downsample);
    assert_eq!(options.target_scale, 0.5);
}

#[test]
fn test_linux_release_flags() {
    let cmd = platform_flags(FlagPreset::Release, HostOs::Linux);
    assert_eq!(cmd.switch_value("ozone-platform"), Some("x11"));
    assert_eq!(cmd.switch_value("use-angle"), Some("gl-egl"));
    assert_eq!(cmd.switch_value("enable-features"), Some("VaapiVideoDecoder"));
    assert!(cmd.has_switch("disable-gpu-sandbox"));
    assert!(!cmd.has_switch("in-process-gpu"));
}

#[test]
fn test_windows_debug_has_no_angle_backend() {
    let cmd = platform_flags(FlagPreset::Debug, HostOs::Windows);
    assert!(!cmd.has_switch("use-angle"));
    assert!(cmd.has_switch("enable-gpu-debugging"));
    assert!(cmd.to_args().contains(&"--v=1".to_string()));
}

#[test]
fn test_preset_description_names_the_preset() {
    for preset in [
        FlagPreset::Debug,
        FlagPreset::Release,
        FlagPreset::Performance,
        FlagPreset::Compatibility,
    ] {
        let text = preset_description(preset, HostOs::MacOs);
        assert!(text.contains(&preset.as_str().to_uppercase()), "{}", text);
    }
}
