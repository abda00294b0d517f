use clap::Args;

use crate::error::ControlResult;
use crate::pipeline::{
    build_pipeline, FrameRateInput, PipelineSettings, PipelineSpec, StartRequest, StreamConfig,
};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_INTERNAL: i32 = 1;
pub const EXIT_INVALID_CONFIG: i32 = 2;

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Source live page URL, or a bare username
    #[arg(long)]
    pub source: String,

    /// Primary destination ingest URL, or a bare stream key
    #[arg(long)]
    pub primary: String,

    /// Optional secondary destination ingest URL, or a bare stream key
    #[arg(long)]
    pub secondary: Option<String>,

    /// Output frame rate
    #[arg(long, default_value = "30")]
    pub fps: String,

    /// Output framing: portrait (720x1280) or landscape (1280x720)
    #[arg(long, default_value = "landscape")]
    pub profile: String,

    /// Extraction quality (e.g. best, 720p)
    #[arg(long)]
    pub quality: Option<String>,

    /// Drop audio from the output
    #[arg(long)]
    pub muted: bool,

    /// Print the pipeline description as JSON instead of a shell command line
    #[arg(long)]
    pub json: bool,
}

impl PipelineArgs {
    /// The same request body the control panel would send
    pub fn to_request(&self) -> StartRequest {
        StartRequest {
            source_url: self.source.clone(),
            primary_destination_url: self.primary.clone(),
            secondary_destination_url: self.secondary.clone(),
            frame_rate: Some(FrameRateInput::Text(self.fps.clone())),
            aspect_profile: Some(self.profile.clone()),
            quality: self.quality.clone(),
        }
    }

    pub fn build(&self, settings: &PipelineSettings) -> ControlResult<PipelineSpec> {
        let config = StreamConfig::try_from(self.to_request())?;
        build_pipeline(&config, self.muted, settings)
    }

    /// Print the pipeline and return the process exit code
    pub fn execute(&self, settings: &PipelineSettings) -> i32 {
        let spec = match self.build(settings) {
            Ok(spec) => spec,
            Err(e) => {
                eprintln!("Error: {}", e);
                return EXIT_INVALID_CONFIG;
            }
        };

        if !self.json {
            println!("{}", spec.to_shell_script());
            return EXIT_SUCCESS;
        }

        match serde_json::to_string_pretty(&spec) {
            Ok(json) => {
                println!("{}", json);
                EXIT_SUCCESS
            }
            Err(e) => {
                eprintln!("Error: failed to serialize pipeline: {}", e);
                EXIT_INTERNAL
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControlError;

    fn args() -> PipelineArgs {
        PipelineArgs {
            source: "alice".to_string(),
            primary: "KEY".to_string(),
            secondary: None,
            fps: "30".to_string(),
            profile: "portrait".to_string(),
            quality: None,
            muted: false,
            json: false,
        }
    }

    #[test]
    fn test_build_expands_shorthand() {
        let spec = args().build(&PipelineSettings::default()).unwrap();

        assert_eq!(spec.extraction.source_url, "https://www.tiktok.com/@alice/live");
        assert_eq!(spec.sinks[0].url, "rtmp://a.rtmp.youtube.com/live2/KEY");
        assert_eq!((spec.transform.width, spec.transform.height), (720, 1280));
    }

    #[test]
    fn test_build_rejects_bad_fps() {
        let mut args = args();
        args.fps = "fast".to_string();

        assert!(matches!(
            args.build(&PipelineSettings::default()),
            Err(ControlError::Config(_))
        ));
        assert_eq!(args.execute(&PipelineSettings::default()), EXIT_INVALID_CONFIG);
    }
}
