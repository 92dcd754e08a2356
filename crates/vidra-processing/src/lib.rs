//! Vidra Processing Library
//!
//! The transcoding side of the system: source probing via ffprobe, the
//! quality ladder and ffmpeg transcoder, adaptive streaming manifests, and
//! the pipeline that orchestrates all stages for one processing job.

pub mod manifest;
pub mod pipeline;
pub mod probe;
pub mod transcode;

pub use manifest::{build_dash_mpd, build_hls_master};
pub use pipeline::{PipelineConfig, ProcessingPipeline};
pub use probe::{FfprobeProbe, MediaProbe};
pub use transcode::{FfmpegTranscoder, QualityProfile, Transcoder, WatermarkOverlay};
