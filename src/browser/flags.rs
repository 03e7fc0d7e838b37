use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagPreset {
    Debug,
    #[default]
    Release,
    Performance,
    Compatibility,
}

impl FlagPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagPreset::Debug => "debug",
            FlagPreset::Release => "release",
            FlagPreset::Performance => "performance",
            FlagPreset::Compatibility => "compatibility",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "debug" => Some(FlagPreset::Debug),
            "release" => Some(FlagPreset::Release),
            "performance" => Some(FlagPreset::Performance),
            "compatibility" => Some(FlagPreset::Compatibility),
            _ => None,
        }
    }
}

impl fmt::Display for FlagPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOs {
    Linux,
    Windows,
    MacOs,
    Other,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            HostOs::Linux
        } else if cfg!(target_os = "windows") {
            HostOs::Windows
        } else if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else {
            HostOs::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    pub name: String,
    pub value: Option<String>,
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "--{}={}", self.name, value),
            None => write!(f, "--{}", self.name),
        }
    }
}

/// Ordered engine startup switches. A switch name is only ever added once;
/// later additions of the same name are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    switches: Vec<Switch>,
}

impl CommandLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_switch(&self, name: &str) -> bool {
        self.switches.iter().any(|s| s.name == name)
    }

    pub fn switch_value(&self, name: &str) -> Option<&str> {
        self.switches
            .iter()
            .find(|s| s.name == name)
            .and_then(|s| s.value.as_deref())
    }

    pub fn append_switch(&mut self, name: &str) {
        if !self.has_switch(name) {
            self.switches.push(Switch {
                name: name.to_string(),
                value: None,
            });
        }
    }

    pub fn append_switch_with_value(&mut self, name: &str, value: &str) {
        if !self.has_switch(name) {
            self.switches.push(Switch {
                name: name.to_string(),
                value: Some(value.to_string()),
            });
        }
    }

    pub fn switches(&self) -> &[Switch] {
        &self.switches
    }

    pub fn len(&self) -> usize {
        self.switches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }

    pub fn to_args(&self) -> Vec<String> {
        self.switches.iter().map(|s| s.to_string()).collect()
    }
}

fn apply_common_flags(cmd: &mut CommandLine) {
    cmd.append_switch("disable-gpu-sandbox");
    cmd.append_switch("enable-logging");
}

fn apply_linux_flags(cmd: &mut CommandLine, preset: FlagPreset) {
    // OSR child embedding is only reliable on X11, and recent engine builds
    // need ANGLE over EGL.
    cmd.append_switch_with_value("ozone-platform", "x11");
    cmd.append_switch_with_value("use-angle", "gl-egl");

    match preset {
        FlagPreset::Debug => {
            cmd.append_switch("in-process-gpu");
            cmd.append_switch("enable-gpu-debugging");
            cmd.append_switch_with_value("v", "1");
        }
        FlagPreset::Release => {
            cmd.append_switch_with_value("log-severity", "warning");
        }
        FlagPreset::Performance => {
            cmd.append_switch("in-process-gpu");
            cmd.append_switch("enable-zero-copy");
            cmd.append_switch("disable-logging");
        }
        FlagPreset::Compatibility => {
            cmd.append_switch("in-process-gpu");
            cmd.append_switch("disable-gpu-compositing");
            cmd.append_switch_with_value("v", "1");
        }
    }

    cmd.append_switch_with_value("enable-features", "VaapiVideoDecoder");
}

fn apply_windows_flags(cmd: &mut CommandLine, preset: FlagPreset) {
    match preset {
        FlagPreset::Debug => {
            cmd.append_switch("enable-gpu-debugging");
            cmd.append_switch_with_value("v", "1");
        }
        FlagPreset::Release => {
            cmd.append_switch_with_value("use-angle", "d3d11");
            cmd.append_switch_with_value("log-severity", "warning");
        }
        FlagPreset::Performance => {
            cmd.append_switch_with_value("use-angle", "d3d11");
            cmd.append_switch("enable-zero-copy");
            cmd.append_switch("disable-logging");
        }
        FlagPreset::Compatibility => {
            cmd.append_switch("disable-gpu-compositing");
            cmd.append_switch_with_value("use-angle", "d3d9");
            cmd.append_switch_with_value("v", "1");
        }
    }

    cmd.append_switch("high-dpi-support");
    cmd.append_switch("force-device-scale-factor");
}

fn apply_macos_flags(cmd: &mut CommandLine, preset: FlagPreset) {
    match preset {
        FlagPreset::Debug => {
            cmd.append_switch("enable-gpu-debugging");
            cmd.append_switch_with_value("v", "1");
        }
        FlagPreset::Release => {
            cmd.append_switch_with_value("use-angle", "metal");
            cmd.append_switch_with_value("log-severity", "warning");
        }
        FlagPreset::Performance => {
            cmd.append_switch_with_value("use-angle", "metal");
            cmd.append_switch("enable-zero-copy");
            cmd.append_switch("disable-logging");
        }
        FlagPreset::Compatibility => {
            cmd.append_switch_with_value("use-angle", "gl");
            cmd.append_switch("disable-gpu-compositing");
            cmd.append_switch_with_value("v", "1");
        }
    }

    cmd.append_switch("force-device-scale-factor");
}

/// Adds the startup switches for `preset` on `os`. Switches already present
/// in `cmd` keep their existing value.
pub fn apply_platform_flags(cmd: &mut CommandLine, preset: FlagPreset, os: HostOs) {
    apply_common_flags(cmd);
    match os {
        HostOs::Linux => apply_linux_flags(cmd, preset),
        HostOs::Windows => apply_windows_flags(cmd, preset),
        HostOs::MacOs => apply_macos_flags(cmd, preset),
        HostOs::Other => {}
    }
}

pub fn platform_flags(preset: FlagPreset, os: HostOs) -> CommandLine {
    let mut cmd = CommandLine::new();
    apply_platform_flags(&mut cmd, preset, os);
    cmd
}

pub fn preset_description(preset: FlagPreset, os: HostOs) -> String {
    let body = match preset {
        FlagPreset::Debug => {
            "DEBUG\n  \
             - Verbose logging (--v=1)\n  \
             - GPU validation layers\n  \
             - In-process GPU (easier debugging)\n  \
             - Synchronous rendering\n  \
             Use for: Development, debugging, issue investigation"
        }
        FlagPreset::Release => {
            "RELEASE\n  \
             - Minimal logging (warnings only)\n  \
             - Optimized GPU backend (ANGLE D3D11/Metal/GL-EGL)\n  \
             - Separate GPU process (stability)\n  \
             - Hardware acceleration enabled\n  \
             Use for: Production builds, end users"
        }
        FlagPreset::Performance => {
            "PERFORMANCE\n  \
             - No logging (--disable-logging)\n  \
             - Zero-copy rasterizer (--enable-zero-copy)\n  \
             - In-process GPU (reduced IPC overhead)\n  \
             - Maximum hardware acceleration\n  \
             Use for: Benchmarking, resource-constrained systems"
        }
        FlagPreset::Compatibility => {
            "COMPATIBILITY\n  \
             - Verbose logging for diagnostics\n  \
             - Software rendering fallback\n  \
             - Older/safer GPU backends\n  \
             - Conservative optimizations\n  \
             Use for: Troubleshooting GPU/rendering issues"
        }
    };

    let platform = match os {
        HostOs::Linux => "Linux (X11 + ANGLE GL-EGL)",
        HostOs::Windows => "Windows (ANGLE D3D11)",
        HostOs::MacOs => "macOS (ANGLE Metal)",
        HostOs::Other => "Unknown platform",
    };

    format!(
        "Platform Flag Preset: {}\n\nPlatform-specific flags applied for: {}",
        body, platform
    )
}
