use std::env;

use crate::controller::{ControllerOptions, MuteStrategy, DEFAULT_LOG_CAPACITY};
use crate::pipeline::{
    PipelineSettings, DEFAULT_QUALITY, DEFAULT_REFERER, DEFAULT_USER_AGENT, MAX_VIDEO_BITRATE_KBPS,
};

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address (127.0.0.1 keeps the panel local, 0.0.0.0 exposes it on the LAN)
    pub bind_addr: String,
    /// How `POST /mute` changes the audio of a running pipeline
    pub mute_strategy: MuteStrategy,
    /// Maximum retained log lines
    pub log_capacity: usize,
    /// Report a pipeline that exits on its own as crashed
    pub detect_exit: bool,
    /// Shell used to run the two-stage pipeline
    pub shell: String,
    /// Path or name of the streamlink executable
    pub streamlink_binary: String,
    /// Path or name of the ffmpeg executable
    pub ffmpeg_binary: String,
    /// User-Agent header sent by the extraction stage
    pub user_agent: String,
    /// Referer header sent by the extraction stage
    pub referer: String,
    /// Quality requested when a start request names none
    pub default_quality: String,
    /// Video bitrate cap in kbit/s
    pub video_bitrate_kbps: u32,
    /// Map audio optionally so audio-less sources do not fail the transform stage
    pub audio_optional: bool,
    /// CORS allowed origins (comma-separated in env var)
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of a variable if set
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("RELAY_PORT")
            .unwrap_or_else(|| "5000".to_string())
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let mute_strategy = match lookup("RELAY_MUTE_STRATEGY") {
            Some(raw) => raw.parse::<MuteStrategy>().map_err(ConfigError::InvalidValue)?,
            None => MuteStrategy::default(),
        };

        let log_capacity = match lookup("RELAY_LOG_CAPACITY") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(capacity) if capacity >= 1 => capacity,
                _ => {
                    return Err(ConfigError::InvalidValue(format!(
                        "RELAY_LOG_CAPACITY must be a positive integer, got '{}'",
                        raw
                    )))
                }
            },
            None => DEFAULT_LOG_CAPACITY,
        };

        let video_bitrate_kbps = match lookup("RELAY_VIDEO_BITRATE_KBPS") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(kbps) if (1..=MAX_VIDEO_BITRATE_KBPS).contains(&kbps) => kbps,
                _ => {
                    return Err(ConfigError::InvalidValue(format!(
                        "RELAY_VIDEO_BITRATE_KBPS must be between 1 and {}, got '{}'",
                        MAX_VIDEO_BITRATE_KBPS, raw
                    )))
                }
            },
            None => PipelineSettings::default().video_bitrate_kbps,
        };

        let flag = |key: &str, default: bool| {
            lookup(key)
                .map(|v| v.trim().to_lowercase() == "true")
                .unwrap_or(default)
        };

        Ok(Self {
            port,
            bind_addr: lookup("RELAY_BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            mute_strategy,
            log_capacity,
            detect_exit: flag("RELAY_DETECT_EXIT", true),
            shell: lookup("RELAY_SHELL").unwrap_or_else(|| "sh".to_string()),
            streamlink_binary: lookup("STREAMLINK_BINARY")
                .unwrap_or_else(|| "streamlink".to_string()),
            ffmpeg_binary: lookup("FFMPEG_BINARY").unwrap_or_else(|| "ffmpeg".to_string()),
            user_agent: lookup("RELAY_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            referer: lookup("RELAY_REFERER").unwrap_or_else(|| DEFAULT_REFERER.to_string()),
            default_quality: lookup("RELAY_DEFAULT_QUALITY")
                .unwrap_or_else(|| DEFAULT_QUALITY.to_string()),
            video_bitrate_kbps,
            audio_optional: flag("RELAY_AUDIO_OPTIONAL", false),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| {
                    vec![
                        "http://localhost:5000".to_string(),
                        "http://127.0.0.1:5000".to_string(),
                    ]
                }),
        })
    }

    /// Get the full bind address (addr:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Check if the panel is reachable from other machines
    pub fn is_lan_mode(&self) -> bool {
        self.bind_addr == "0.0.0.0"
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            streamlink_binary: self.streamlink_binary.clone(),
            ffmpeg_binary: self.ffmpeg_binary.clone(),
            user_agent: self.user_agent.clone(),
            referer: self.referer.clone(),
            default_quality: self.default_quality.clone(),
            video_bitrate_kbps: self.video_bitrate_kbps,
            audio_optional: self.audio_optional,
        }
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            mute_strategy: self.mute_strategy,
            log_capacity: self.log_capacity,
            detect_exit: self.detect_exit,
            pipeline: self.pipeline_settings(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
