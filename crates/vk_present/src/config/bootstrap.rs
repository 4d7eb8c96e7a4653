//! # Bootstrap Configuration
//!
//! Everything the presentation bootstrap reads is gathered here so that the
//! instance layers, device extensions and frame pacing parameters are decided
//! once, up front, instead of living in mutable globals.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{Config, ConfigError};

/// Upper bound on frames in flight accepted by [`BootstrapConfig::validate`]
pub const MAX_SUPPORTED_FRAMES_IN_FLIGHT: usize = 8;

/// Window creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Requested client width in pixels
    pub width: u32,
    /// Requested client height in pixels
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Window".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// # Shader Configuration
///
/// Paths to the SPIR-V binaries used by the single graphics pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries the build output directory first, then a few common locations,
    /// so the app can be started from the workspace root or its own folder.
    #[must_use]
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        let shader_dirs = ["target/shaders/", "shaders/", "resources/shaders/", "../target/shaders/", "./"];

        let find = |name: &str| {
            shader_dirs
                .iter()
                .map(|dir| format!("{dir}{name}"))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("target/shaders/{name}"))
        };

        Self {
            vertex_shader_path: find(base_vertex),
            fragment_shader_path: find(base_fragment),
        }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("triangle.vert.spv", "triangle.frag.spv")
    }
}

/// Wait limits for the two blocking calls of the render loop.
///
/// `None` means wait forever, which is the default: a hung GPU then looks
/// like a very slow frame. A finite value turns a stuck wait into a dropped
/// frame reporting a timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Limit for swapchain image acquisition, in milliseconds
    pub acquire_ms: Option<u64>,
    /// Limit for fence waits, in milliseconds
    pub fence_ms: Option<u64>,
}

impl TimeoutConfig {
    /// Acquisition limit in nanoseconds, `u64::MAX` when unbounded
    #[must_use]
    pub fn acquire_ns(&self) -> u64 {
        Self::to_ns(self.acquire_ms)
    }

    /// Fence wait limit in nanoseconds, `u64::MAX` when unbounded
    #[must_use]
    pub fn fence_ns(&self) -> u64 {
        Self::to_ns(self.fence_ms)
    }

    fn to_ns(ms: Option<u64>) -> u64 {
        ms.map_or(u64::MAX, |ms| {
            u64::try_from(Duration::from_millis(ms).as_nanos()).unwrap_or(u64::MAX)
        })
    }
}

/// # Bootstrap Configuration
///
/// Immutable input to [`crate::render::VulkanRenderer::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Window parameters
    pub window: WindowConfig,
    /// Whether to request validation layers and a debug messenger
    pub enable_validation: bool,
    /// Instance layers requested when validation is enabled
    pub required_instance_layers: Vec<String>,
    /// Device extensions a physical device must support to be selected
    pub required_device_extensions: Vec<String>,
    /// Prefer discrete GPUs over integrated ones during device selection
    pub prefer_discrete_gpu: bool,
    /// Number of flight slots (frames the CPU may run ahead of the GPU)
    pub max_frames_in_flight: usize,
    /// Shader binaries for the graphics pipeline
    pub shaders: ShaderConfig,
    /// Clear color used by the render pass
    pub clear_color: [f32; 4],
    /// Blocking wait limits
    pub timeouts: TimeoutConfig,
    /// Default log level for the application
    pub log_level: String,
}

impl BootstrapConfig {
    /// Create a configuration with defaults and the given application name
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            ..Self::default()
        }
    }

    /// Set maximum frames in flight
    #[must_use]
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    /// Set custom shader configuration
    #[must_use]
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set blocking wait limits
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Validate the configuration
    ///
    /// Shader files are not checked here; a missing file fails the pipeline
    /// stage of the bootstrap with the path in the message.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }

        if self.application_name.contains('\0') {
            return Err(ConfigError::Invalid("Application name cannot contain NUL".to_string()));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if self.max_frames_in_flight == 0 {
            return Err(ConfigError::Invalid("Max frames in flight must be at least 1".to_string()));
        }

        if self.max_frames_in_flight > MAX_SUPPORTED_FRAMES_IN_FLIGHT {
            return Err(ConfigError::Invalid(format!(
                "Max frames in flight should not exceed {MAX_SUPPORTED_FRAMES_IN_FLIGHT}"
            )));
        }

        let names = self.required_instance_layers.iter().chain(&self.required_device_extensions);
        for name in names {
            if name.is_empty() || name.contains('\0') {
                return Err(ConfigError::Invalid(format!("Invalid layer or extension name: {name:?}")));
            }
        }

        Ok(())
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            application_name: "Hello Triangle".to_string(),
            window: WindowConfig::default(),
            enable_validation: cfg!(debug_assertions),
            required_instance_layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            required_device_extensions: vec!["VK_KHR_swapchain".to_string()],
            prefer_discrete_gpu: true,
            max_frames_in_flight: 2,
            shaders: ShaderConfig::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            timeouts: TimeoutConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config for BootstrapConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BootstrapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_frames_in_flight, 2);
        assert_eq!(config.required_device_extensions, vec!["VK_KHR_swapchain".to_string()]);
    }

    #[test]
    fn test_frames_in_flight_bounds() {
        assert!(BootstrapConfig::default().with_max_frames_in_flight(0).validate().is_err());
        assert!(BootstrapConfig::default().with_max_frames_in_flight(1).validate().is_ok());
        assert!(BootstrapConfig::default().with_max_frames_in_flight(3).validate().is_ok());
        assert!(BootstrapConfig::default().with_max_frames_in_flight(9).validate().is_err());
    }

    #[test]
    fn test_rejects_bad_names() {
        let mut config = BootstrapConfig::new("");
        assert!(config.validate().is_err());

        config.application_name = "app".to_string();
        config.required_device_extensions.push(String::new());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_zero_window() {
        let mut config = BootstrapConfig::default();
        config.window.height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let text = r#"
            application_name = "Pacing Test"
            max_frames_in_flight = 3

            [window]
            width = 1024

            [timeouts]
            fence_ms = 250
        "#;

        let config = BootstrapConfig::parse("test.toml", text).expect("toml should parse");
        assert_eq!(config.application_name, "Pacing Test");
        assert_eq!(config.max_frames_in_flight, 3);
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.timeouts.fence_ns(), 250_000_000);
        assert_eq!(config.timeouts.acquire_ns(), u64::MAX);
    }

    #[test]
    fn test_ron_parse() {
        let text = r#"(application_name: "Ron App", enable_validation: false)"#;
        let config = BootstrapConfig::parse("app.ron", text).expect("ron should parse");
        assert_eq!(config.application_name, "Ron App");
        assert!(!config.enable_validation);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = BootstrapConfig::parse("app.json", "{}");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_unbounded_timeouts_by_default() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(timeouts.acquire_ns(), u64::MAX);
        assert_eq!(timeouts.fence_ns(), u64::MAX);
    }
}
