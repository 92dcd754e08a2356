//! Source media probing via ffprobe.
//!
//! A source that ffprobe cannot read, or that carries no video stream, will
//! not become readable on retry; probe failures are therefore unrecoverable
//! and fail the job immediately.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

use vidra_core::models::SourceMetadata;
use vidra_core::JobError;

#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Extract technical metadata from a local source file.
    async fn probe(&self, path: &Path) -> Result<SourceMetadata, JobError>;
}

/// Probe implementation shelling out to ffprobe.
pub struct FfprobeProbe {
    ffprobe_path: String,
}

impl FfprobeProbe {
    pub fn new(ffprobe_path: String) -> Self {
        Self { ffprobe_path }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<SourceMetadata, JobError> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                JobError::unrecoverable(anyhow::anyhow!(
                    "failed to run ffprobe at {}: {e}",
                    self.ffprobe_path
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JobError::unrecoverable(anyhow::anyhow!(
                "ffprobe failed on {}: {}",
                path.display(),
                stderr.trim()
            )));
        }

        let file_size = tokio::fs::metadata(path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        let json = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&json, file_size)
    }
}

#[derive(Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

#[derive(Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
    size: Option<String>,
}

/// Parse ffprobe's JSON output into source metadata.
///
/// `fallback_size` is used when the format section carries no size field.
pub(crate) fn parse_probe_output(
    json: &str,
    fallback_size: u64,
) -> Result<SourceMetadata, JobError> {
    let probed: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| JobError::unrecoverable(anyhow::anyhow!("unparseable ffprobe output: {e}")))?;

    let video = probed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            JobError::unrecoverable(anyhow::anyhow!("source contains no video stream"))
        })?;

    let audio = probed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(JobError::unrecoverable(anyhow::anyhow!(
                "video stream has no usable dimensions"
            )))
        }
    };

    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    let format = probed.format.as_ref();
    let duration = format
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    if duration <= 0.0 {
        return Err(JobError::unrecoverable(anyhow::anyhow!(
            "source has zero or unknown duration"
        )));
    }

    let bitrate = format
        .and_then(|f| f.bit_rate.as_deref())
        .and_then(|b| b.parse::<u64>().ok());
    let file_size = format
        .and_then(|f| f.size.as_deref())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(fallback_size);

    Ok(SourceMetadata {
        duration,
        width,
        height,
        frame_rate,
        bitrate,
        video_codec: video.codec_name.clone().unwrap_or_else(|| "unknown".into()),
        audio_codec: audio.and_then(|a| a.codec_name.clone()),
        file_size,
    })
}

/// Parse ffprobe rational frame rates such as "30000/1001" or plain "25".
fn parse_frame_rate(raw: &str) -> Option<f64> {
    if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "streams": [
            {
                "codec_type": "video",
                "codec_name": "h264",
                "width": 1920,
                "height": 1080,
                "avg_frame_rate": "30000/1001",
                "r_frame_rate": "30000/1001"
            },
            {
                "codec_type": "audio",
                "codec_name": "aac"
            }
        ],
        "format": {
            "duration": "734.500000",
            "bit_rate": "4800000",
            "size": "440700000"
        }
    }"#;

    #[test]
    fn parses_full_probe_output() {
        let meta = parse_probe_output(PROBE_JSON, 0).unwrap();
        assert_eq!(meta.width, 1920);
        assert_eq!(meta.height, 1080);
        assert_eq!(meta.video_codec, "h264");
        assert_eq!(meta.audio_codec.as_deref(), Some("aac"));
        assert_eq!(meta.duration, 734.5);
        assert_eq!(meta.bitrate, Some(4_800_000));
        assert_eq!(meta.file_size, 440_700_000);
        assert!((meta.frame_rate - 29.97).abs() < 0.01);
    }

    #[test]
    fn rational_frame_rates() {
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("24000/1001").map(|f| (f * 100.0).round()), Some(2398.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[test]
    fn missing_video_stream_is_unrecoverable() {
        let json = r#"{"streams": [{"codec_type": "audio", "codec_name": "mp3"}],
                       "format": {"duration": "10.0"}}"#;
        let err = parse_probe_output(json, 0).unwrap_err();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("no video stream"));
    }

    #[test]
    fn zero_duration_is_unrecoverable() {
        let json = r#"{"streams": [{"codec_type": "video", "codec_name": "h264",
                                    "width": 640, "height": 360}],
                       "format": {"duration": "0.0"}}"#;
        let err = parse_probe_output(json, 0).unwrap_err();
        assert!(!err.is_recoverable());
    }
}
