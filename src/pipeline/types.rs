use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ControlError;

const TIKTOK_LIVE_BASE: &str = "https://www.tiktok.com/@";
const YOUTUBE_INGEST_BASE: &str = "rtmp://a.rtmp.youtube.com/live2/";
const FACEBOOK_INGEST_BASE: &str = "rtmps://live-api-s.facebook.com:443/rtmp/";

/// Highest output frame rate accepted
pub const MAX_FRAME_RATE: u32 = 240;

/// Target framing of the outgoing stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectProfile {
    /// 9:16, 720x1280
    Portrait,
    /// 16:9, 1280x720
    Landscape,
}

impl AspectProfile {
    /// Output frame size as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            AspectProfile::Portrait => (720, 1280),
            AspectProfile::Landscape => (1280, 720),
        }
    }
}

impl fmt::Display for AspectProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AspectProfile::Portrait => write!(f, "portrait"),
            AspectProfile::Landscape => write!(f, "landscape"),
        }
    }
}

impl FromStr for AspectProfile {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "mobile"/"desktop" are the names the control panel sends
        match s.trim().to_lowercase().as_str() {
            "portrait" | "mobile" | "9:16" => Ok(AspectProfile::Portrait),
            "landscape" | "desktop" | "16:9" => Ok(AspectProfile::Landscape),
            other => Err(ControlError::config(format!(
                "unknown aspect profile '{}' (expected portrait or landscape)",
                other
            ))),
        }
    }
}

/// Frame rate as it arrives over the wire: the panel sends strings, API clients numbers
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FrameRateInput {
    Number(serde_json::Number),
    Text(String),
}

impl FrameRateInput {
    fn parse(&self) -> Result<u32, ControlError> {
        let raw = match self {
            FrameRateInput::Number(n) => n.to_string(),
            FrameRateInput::Text(s) => s.trim().to_string(),
        };
        match raw.parse::<u32>() {
            Ok(fps) if (1..=MAX_FRAME_RATE).contains(&fps) => Ok(fps),
            _ => Err(ControlError::config(format!(
                "frame rate must be an integer between 1 and {}, got '{}'",
                MAX_FRAME_RATE, raw
            ))),
        }
    }
}

/// Body of `POST /start`
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    #[serde(alias = "tiktok", default)]
    pub source_url: String,
    #[serde(alias = "yt", default)]
    pub primary_destination_url: String,
    #[serde(alias = "fb", default)]
    pub secondary_destination_url: Option<String>,
    #[serde(alias = "fps")]
    pub frame_rate: Option<FrameRateInput>,
    #[serde(alias = "ratio")]
    pub aspect_profile: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
}

/// A validated stream configuration, immutable once accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamConfig {
    pub source_url: String,
    pub primary_destination_url: String,
    pub secondary_destination_url: Option<String>,
    pub frame_rate: u32,
    pub aspect_profile: AspectProfile,
    /// Extraction quality; the pipeline default applies when absent
    pub quality: Option<String>,
}

impl StreamConfig {
    pub fn new(
        source_url: impl Into<String>,
        primary_destination_url: impl Into<String>,
        frame_rate: u32,
        aspect_profile: AspectProfile,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            primary_destination_url: primary_destination_url.into(),
            secondary_destination_url: None,
            frame_rate,
            aspect_profile,
            quality: None,
        }
    }

    pub fn with_secondary(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.secondary_destination_url = if url.trim().is_empty() { None } else { Some(url) };
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    /// Copy with destination stream keys masked, for status reporting
    pub fn redacted(&self) -> Self {
        Self {
            primary_destination_url: mask_stream_key(&self.primary_destination_url),
            secondary_destination_url: self
                .secondary_destination_url
                .as_deref()
                .map(mask_stream_key),
            ..self.clone()
        }
    }
}

impl TryFrom<StartRequest> for StreamConfig {
    type Error = ControlError;

    fn try_from(request: StartRequest) -> Result<Self, Self::Error> {
        let source = request.source_url.trim();
        if source.is_empty() {
            return Err(ControlError::config("source URL is required"));
        }
        let primary = request.primary_destination_url.trim();
        if primary.is_empty() {
            return Err(ControlError::config("primary destination URL is required"));
        }

        let frame_rate = request
            .frame_rate
            .as_ref()
            .ok_or_else(|| ControlError::config("frame rate is required"))?
            .parse()?;

        let aspect_profile = match request.aspect_profile.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => AspectProfile::Landscape,
        };

        let secondary = request
            .secondary_destination_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| expand_destination(s, FACEBOOK_INGEST_BASE));

        let quality = request
            .quality
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        Ok(Self {
            source_url: expand_source(source),
            primary_destination_url: expand_destination(primary, YOUTUBE_INGEST_BASE),
            secondary_destination_url: secondary,
            frame_rate,
            aspect_profile,
            quality,
        })
    }
}

/// A bare username becomes the platform's live page URL
fn expand_source(source: &str) -> String {
    if source.contains("://") {
        source.to_string()
    } else {
        format!("{}{}/live", TIKTOK_LIVE_BASE, source.trim_start_matches('@'))
    }
}

/// A bare stream key becomes the platform's ingest URL
fn expand_destination(destination: &str, ingest_base: &str) -> String {
    if destination.contains("://") {
        destination.to_string()
    } else {
        format!("{}{}", ingest_base, destination)
    }
}

fn mask_stream_key(url: &str) -> String {
    match url.rfind('/') {
        Some(idx) if idx + 1 < url.len() => format!("{}/****", &url[..idx]),
        _ => url.to_string(),
    }
}
