use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::frame::{OutputFormat, TransportFormat};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rx: RxConfig,
    #[serde(default)]
    pub video: VideoConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub dump: DumpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RxConfig {
    #[serde(default = "default_sessions")]
    pub sessions: u32,
    /// Sleep cadence of the run loop while waiting for the exit signal.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Stop on our own after this many seconds instead of waiting for Ctrl-C.
    #[serde(default)]
    pub run_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default)]
    pub interlaced: bool,
    #[serde(default = "default_transport_format")]
    pub transport_format: TransportFormat,
    #[serde(default = "default_output_format")]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Primary interface name.
    pub port: String,
    /// Primary receive address.
    pub ip: Ipv4Addr,
    #[serde(default)]
    pub redundant_port: Option<String>,
    #[serde(default)]
    pub redundant_ip: Option<Ipv4Addr>,
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    #[serde(default = "default_payload_type")]
    pub payload_type: u8,
    /// Give each session its own address (last octet + index) instead of its own udp port.
    #[serde(default)]
    pub multi_inc_addr: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_framebuffer_count")]
    pub framebuffer_count: u16,
    /// Upper bound of one blocking get-frame call. Also bounds how long a
    /// worker can take to notice a stop request if it never gets woken.
    #[serde(default = "default_get_frame_timeout_ms")]
    pub get_frame_timeout_ms: u64,
    #[serde(default)]
    pub user_meta: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DumpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_dump_path")]
    pub path: String,
    #[serde(default = "default_dump_frame_buffer_count")]
    pub frame_buffer_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            sessions: default_sessions(),
            poll_interval_ms: default_poll_interval_ms(),
            run_secs: None,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            interlaced: false,
            transport_format: default_transport_format(),
            output_format: default_output_format(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            framebuffer_count: default_framebuffer_count(),
            get_frame_timeout_ms: default_get_frame_timeout_ms(),
            user_meta: false,
        }
    }
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_dump_path(),
            frame_buffer_count: default_dump_frame_buffer_count(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl NetworkConfig {
    /// Redundant path is only used when both the interface and the address are set.
    pub fn redundant(&self) -> Option<(&str, Ipv4Addr)> {
        match (&self.redundant_port, self.redundant_ip) {
            (Some(port), Some(ip)) => Some((port.as_str(), ip)),
            _ => None,
        }
    }

    pub fn num_ports(&self) -> u8 {
        if self.redundant().is_some() {
            2
        } else {
            1
        }
    }
}

const MIN_FPS: f64 = 0.001;
const MAX_FPS: f64 = 1000.0;

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rx.sessions == 0 {
            return Err(ConfigError::Invalid("rx.sessions must be at least 1".into()));
        }
        if self.video.width == 0 || self.video.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "video dimensions must be non-zero, got {}x{}",
                self.video.width, self.video.height
            )));
        }
        if self
            .video
            .output_format
            .frame_size(self.video.width, self.video.height, self.video.interlaced)
            .is_none()
        {
            return Err(ConfigError::Invalid(format!(
                "video frame size overflows for {}x{}",
                self.video.width, self.video.height
            )));
        }
        if !(MIN_FPS..=MAX_FPS).contains(&self.video.fps) {
            return Err(ConfigError::Invalid(format!(
                "video.fps must be within {MIN_FPS}..={MAX_FPS}, got {}",
                self.video.fps
            )));
        }
        if self.pipeline.framebuffer_count == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.framebuffer_count must be at least 1".into(),
            ));
        }
        if self.pipeline.get_frame_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.get_frame_timeout_ms must be non-zero".into(),
            ));
        }
        if self.dump.frame_buffer_count == 0 {
            return Err(ConfigError::Invalid(
                "dump.frame_buffer_count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_sessions() -> u32 {
    1
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_fps() -> f64 {
    59.94
}
fn default_transport_format() -> TransportFormat {
    TransportFormat::Yuv422Bit10
}
fn default_output_format() -> OutputFormat {
    OutputFormat::Yuv422Planar10Le
}
fn default_udp_port() -> u16 {
    20000
}
fn default_payload_type() -> u8 {
    112
}
fn default_framebuffer_count() -> u16 {
    3
}
fn default_get_frame_timeout_ms() -> u64 {
    1000
}
fn default_dump_path() -> String {
    "/tmp/rx_dump.yuv".into()
}
fn default_dump_frame_buffer_count() -> usize {
    3
}
fn default_log_level() -> String {
    "info".into()
}
