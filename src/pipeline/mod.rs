mod builder;
mod types;

pub use builder::{
    build_pipeline, AudioEncoding, ExtractionStage, PipelineSettings, PipelineSpec, Sink,
    TransformStage, DEFAULT_QUALITY, DEFAULT_REFERER, DEFAULT_USER_AGENT, MAX_VIDEO_BITRATE_KBPS,
    SINK_FORMAT, SINK_SEPARATOR,
};
pub use types::{AspectProfile, FrameRateInput, StartRequest, StreamConfig, MAX_FRAME_RATE};
