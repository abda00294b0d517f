//! Translates a [`StreamConfig`] into the two-stage shell pipeline that does the relaying.
//!
//! The extraction stage pulls the source rendition to stdout, the transform stage reads it
//! from `pipe:0`, normalizes framing and frame rate, encodes once and fans the result out to
//! every destination through ffmpeg's `tee` muxer.

use serde::Serialize;

use super::types::{AspectProfile, StreamConfig, MAX_FRAME_RATE};
use crate::error::{ControlError, ControlResult};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10)";
pub const DEFAULT_REFERER: &str = "https://www.tiktok.com/";
pub const DEFAULT_QUALITY: &str = "best";
pub const SINK_FORMAT: &str = "flv";
pub const SINK_SEPARATOR: char = '|';
/// Highest video bitrate cap accepted, in kbit/s
pub const MAX_VIDEO_BITRATE_KBPS: u32 = 100_000;

/// Characters the `tee` muxer reads as syntax inside a target list
const TEE_SPECIAL_CHARS: [char; 4] = ['|', '[', ']', '\\'];

/// Static settings applied to every pipeline, resolved once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub streamlink_binary: String,
    pub ffmpeg_binary: String,
    pub user_agent: String,
    pub referer: String,
    pub default_quality: String,
    pub video_bitrate_kbps: u32,
    /// Map the first audio stream only if present instead of requiring it
    pub audio_optional: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            streamlink_binary: "streamlink".to_string(),
            ffmpeg_binary: "ffmpeg".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            default_quality: DEFAULT_QUALITY.to_string(),
            video_bitrate_kbps: 1200,
            audio_optional: false,
        }
    }
}

/// Fetches the source stream and writes it to stdout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionStage {
    pub program: String,
    pub headers: Vec<(String, String)>,
    pub source_url: String,
    pub quality: String,
}

impl ExtractionStage {
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (name, value) in &self.headers {
            args.push("--http-header".to_string());
            args.push(format!("{}={}", name, value));
        }
        args.push("-O".to_string());
        args.push(self.source_url.clone());
        args.push(self.quality.clone());
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioEncoding {
    pub map: String,
    pub codec: String,
    pub bitrate: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub filter: String,
}

/// Scales, pads, normalizes frame rate and encodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformStage {
    pub program: String,
    pub width: u32,
    pub height: u32,
    pub video_filter: String,
    pub frame_rate: u32,
    pub gop_size: u32,
    pub video_bitrate_kbps: u32,
    /// `None` when the pipeline is muted
    pub audio: Option<AudioEncoding>,
}

impl TransformStage {
    fn args(&self, tee_target: &str) -> Vec<String> {
        let mut args: Vec<String> = ["-re", "-i", "pipe:0", "-map", "0:v:0"]
            .map(String::from)
            .to_vec();

        if let Some(audio) = &self.audio {
            args.extend(["-map".to_string(), audio.map.clone()]);
        }

        args.extend(["-vf".to_string(), self.video_filter.clone()]);
        args.extend(["-r".to_string(), self.frame_rate.to_string()]);

        args.extend(
            [
                "-c:v",
                "libx264",
                "-preset",
                "ultrafast",
                "-tune",
                "zerolatency",
            ]
            .map(String::from),
        );
        args.extend(["-g".to_string(), self.gop_size.to_string()]);
        args.extend(["-pix_fmt", "yuv420p"].map(String::from));
        args.extend([
            "-b:v".to_string(),
            format!("{}k", self.video_bitrate_kbps),
            "-maxrate".to_string(),
            format!("{}k", self.video_bitrate_kbps),
            "-bufsize".to_string(),
            format!("{}k", self.video_bitrate_kbps.saturating_mul(2)),
        ]);

        match &self.audio {
            Some(audio) => {
                args.extend([
                    "-c:a".to_string(),
                    audio.codec.clone(),
                    "-b:a".to_string(),
                    audio.bitrate.clone(),
                    "-ar".to_string(),
                    audio.sample_rate.to_string(),
                    "-ac".to_string(),
                    audio.channels.to_string(),
                    "-af".to_string(),
                    audio.filter.clone(),
                ]);
            }
            None => args.push("-an".to_string()),
        }

        args.extend(["-f".to_string(), "tee".to_string(), tee_target.to_string()]);
        args
    }
}

/// One destination of the fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sink {
    pub format: String,
    pub url: String,
}

impl Sink {
    fn tagged(&self) -> String {
        format!("[f={}]{}", self.format, self.url)
    }
}

/// Complete description of one pipeline invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSpec {
    pub extraction: ExtractionStage,
    pub transform: TransformStage,
    pub sinks: Vec<Sink>,
    pub muted: bool,
}

impl PipelineSpec {
    /// The `tee` muxer target: every sink tagged with its container, joined by `|`
    pub fn tee_target(&self) -> String {
        self.sinks
            .iter()
            .map(Sink::tagged)
            .collect::<Vec<_>>()
            .join(&SINK_SEPARATOR.to_string())
    }

    pub fn extraction_argv(&self) -> Vec<String> {
        let mut argv = vec![self.extraction.program.clone()];
        argv.extend(self.extraction.args());
        argv
    }

    pub fn transform_argv(&self) -> Vec<String> {
        let mut argv = vec![self.transform.program.clone()];
        argv.extend(self.transform.args(&self.tee_target()));
        argv
    }

    /// Render as a single `extraction | transform` shell command line
    pub fn to_shell_script(&self) -> String {
        format!(
            "{} | {}",
            join_quoted(&self.extraction_argv()),
            join_quoted(&self.transform_argv())
        )
    }
}

/// Build the pipeline for `config`, dropping audio entirely when `muted`
pub fn build_pipeline(
    config: &StreamConfig,
    muted: bool,
    settings: &PipelineSettings,
) -> ControlResult<PipelineSpec> {
    if config.source_url.trim().is_empty() {
        return Err(ControlError::config("source URL is required"));
    }
    if config.primary_destination_url.trim().is_empty() {
        return Err(ControlError::config("primary destination URL is required"));
    }
    if !(1..=MAX_FRAME_RATE).contains(&config.frame_rate) {
        return Err(ControlError::config(format!(
            "frame rate must be an integer between 1 and {}, got {}",
            MAX_FRAME_RATE, config.frame_rate
        )));
    }
    if !(1..=MAX_VIDEO_BITRATE_KBPS).contains(&settings.video_bitrate_kbps) {
        return Err(ControlError::config(format!(
            "video bitrate must be between 1 and {} kbit/s, got {}",
            MAX_VIDEO_BITRATE_KBPS, settings.video_bitrate_kbps
        )));
    }
    check_sink_url(&config.primary_destination_url)?;
    if let Some(secondary) = config.secondary_destination_url.as_deref() {
        check_sink_url(secondary)?;
    }
    let gop_size = config
        .frame_rate
        .checked_mul(2)
        .ok_or_else(|| ControlError::config("frame rate is too large"))?;

    let quality = config
        .quality
        .clone()
        .unwrap_or_else(|| settings.default_quality.clone());

    let extraction = ExtractionStage {
        program: settings.streamlink_binary.clone(),
        headers: vec![
            ("User-Agent".to_string(), settings.user_agent.clone()),
            ("Referer".to_string(), settings.referer.clone()),
        ],
        source_url: config.source_url.clone(),
        quality,
    };

    let (width, height) = config.aspect_profile.dimensions();
    let audio = if muted {
        None
    } else {
        Some(AudioEncoding {
            map: if settings.audio_optional { "0:a?" } else { "0:a:0" }.to_string(),
            codec: "aac".to_string(),
            bitrate: "128k".to_string(),
            sample_rate: 44100,
            channels: 2,
            filter: "aresample=async=1:first_pts=0".to_string(),
        })
    };

    let transform = TransformStage {
        program: settings.ffmpeg_binary.clone(),
        width,
        height,
        video_filter: scale_pad_filter(config.aspect_profile),
        frame_rate: config.frame_rate,
        gop_size,
        video_bitrate_kbps: settings.video_bitrate_kbps,
        audio,
    };

    let mut sinks = vec![Sink {
        format: SINK_FORMAT.to_string(),
        url: config.primary_destination_url.clone(),
    }];
    if let Some(secondary) = config
        .secondary_destination_url
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        sinks.push(Sink {
            format: SINK_FORMAT.to_string(),
            url: secondary.to_string(),
        });
    }

    Ok(PipelineSpec {
        extraction,
        transform,
        sinks,
        muted,
    })
}

/// A destination must stay a single `tee` output
fn check_sink_url(url: &str) -> ControlResult<()> {
    match url.chars().find(|c| TEE_SPECIAL_CHARS.contains(c)) {
        Some(c) => Err(ControlError::config(format!(
            "destination URL may not contain '{}'",
            c
        ))),
        None => Ok(()),
    }
}

/// Fit inside the target frame keeping the source aspect ratio, then center-pad
fn scale_pad_filter(profile: AspectProfile) -> String {
    let (w, h) = profile.dimensions();
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
    )
}

fn join_quoted(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

/// POSIX single-quote `arg` unless it is made only of shell-safe characters
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg.bytes().all(|b| {
            b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'/' | b':' | b'=' | b'@' | b',')
        });
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
