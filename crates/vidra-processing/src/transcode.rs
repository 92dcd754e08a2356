//! Quality ladder and ffmpeg transcoding.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// One rung of the encoding ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityProfile {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
}

impl QualityProfile {
    /// The full ladder in ascending bitrate order.
    pub fn ladder() -> Vec<Self> {
        vec![
            Self {
                label: "360p".into(),
                width: 640,
                height: 360,
                bitrate_kbps: 1000,
            },
            Self {
                label: "480p".into(),
                width: 854,
                height: 480,
                bitrate_kbps: 2500,
            },
            Self {
                label: "720p".into(),
                width: 1280,
                height: 720,
                bitrate_kbps: 5000,
            },
            Self {
                label: "1080p".into(),
                width: 1920,
                height: 1080,
                bitrate_kbps: 8000,
            },
        ]
    }

    pub fn for_label(label: &str) -> Option<Self> {
        Self::ladder().into_iter().find(|p| p.label == label)
    }
}

/// Resolve requested quality labels against the ladder and the source height.
///
/// Profiles taller than the source are dropped to avoid upscaling; if that
/// would leave nothing, the smallest requested profile is kept so every valid
/// source yields at least one rendition. Unknown labels are skipped.
pub fn applicable_profiles(requested: &[String], source_height: u32) -> Vec<QualityProfile> {
    let mut known: Vec<QualityProfile> = requested
        .iter()
        .filter_map(|label| {
            let profile = QualityProfile::for_label(label);
            if profile.is_none() {
                tracing::warn!(quality = %label, "Unknown quality label, skipping");
            }
            profile
        })
        .collect();
    known.sort_by_key(|p| p.bitrate_kbps);
    known.dedup_by(|a, b| a.label == b.label);

    let fitting: Vec<QualityProfile> = known
        .iter()
        .filter(|p| p.height <= source_height)
        .cloned()
        .collect();
    if fitting.is_empty() {
        return known.into_iter().take(1).collect();
    }
    fitting
}

/// Watermark ready for overlay: the image has been staged to a local path.
#[derive(Debug, Clone)]
pub struct WatermarkOverlay {
    pub image_path: PathBuf,
    /// ffmpeg overlay position expression, e.g. "W-w-10:H-h-10".
    pub position: String,
    pub opacity: f32,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Encode `input` into one rendition at `output`.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        profile: &QualityProfile,
        watermark: Option<&WatermarkOverlay>,
    ) -> Result<()>;

    /// Grab a single poster frame at `offset_secs`.
    async fn extract_poster(&self, input: &Path, output: &Path, offset_secs: f64) -> Result<()>;

    /// Cut a short muted preview clip from the start of the source.
    async fn extract_preview(&self, input: &Path, output: &Path, duration_secs: f64) -> Result<()>;
}

/// Transcoder shelling out to ffmpeg with a wall-clock timeout per invocation.
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: String, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            timeout,
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        tracing::debug!(ffmpeg = %self.ffmpeg_path, ?args, "Running ffmpeg");
        let child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn ffmpeg at {}", self.ffmpeg_path))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                anyhow::anyhow!("ffmpeg exceeded {}s wall-clock budget", self.timeout.as_secs())
            })?
            .context("ffmpeg did not produce an exit status")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            anyhow::bail!("ffmpeg exited with {}: {tail}", output.status);
        }
        Ok(())
    }
}

/// Build the full argument list for one rendition encode.
pub(crate) fn build_transcode_args(
    input: &Path,
    output: &Path,
    profile: &QualityProfile,
    watermark: Option<&WatermarkOverlay>,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-i".into(), input.display().to_string()];

    let scale = format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = profile.width,
        h = profile.height
    );

    match watermark {
        Some(wm) => {
            args.push("-i".into());
            args.push(wm.image_path.display().to_string());
            args.push("-filter_complex".into());
            args.push(format!(
                "[0:v]{scale}[base];[1:v]format=rgba,colorchannelmixer=aa={opacity}[wm];[base][wm]overlay={position}",
                opacity = wm.opacity,
                position = wm.position
            ));
        }
        None => {
            args.push("-vf".into());
            args.push(scale);
        }
    }

    args.extend(
        [
            "-c:v",
            "libx264",
            "-preset",
            "medium",
            "-profile:v",
            "high",
        ]
        .map(String::from),
    );
    args.push("-b:v".into());
    args.push(format!("{}k", profile.bitrate_kbps));
    args.push("-maxrate".into());
    args.push(format!("{}k", profile.bitrate_kbps));
    args.push("-bufsize".into());
    args.push(format!("{}k", profile.bitrate_kbps * 2));
    args.extend(
        [
            "-c:a",
            "aac",
            "-b:a",
            "128k",
            "-movflags",
            "+faststart",
        ]
        .map(String::from),
    );
    args.push(output.display().to_string());
    args
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        profile: &QualityProfile,
        watermark: Option<&WatermarkOverlay>,
    ) -> Result<()> {
        self.run(build_transcode_args(input, output, profile, watermark))
            .await
            .with_context(|| format!("transcode to {} failed", profile.label))
    }

    async fn extract_poster(&self, input: &Path, output: &Path, offset_secs: f64) -> Result<()> {
        let args = vec![
            "-y".to_string(),
            "-ss".to_string(),
            format!("{offset_secs}"),
            "-i".to_string(),
            input.display().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-q:v".to_string(),
            "2".to_string(),
            output.display().to_string(),
        ];
        self.run(args).await.context("poster extraction failed")
    }

    async fn extract_preview(&self, input: &Path, output: &Path, duration_secs: f64) -> Result<()> {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-t".to_string(),
            format!("{duration_secs}"),
            "-an".to_string(),
            "-vf".to_string(),
            "scale=640:-2".to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.display().to_string(),
        ];
        self.run(args).await.context("preview extraction failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_is_ascending_by_bitrate() {
        let ladder = QualityProfile::ladder();
        assert_eq!(ladder.len(), 4);
        assert!(ladder.windows(2).all(|w| w[0].bitrate_kbps < w[1].bitrate_kbps));
        assert_eq!(ladder[0].label, "360p");
        assert_eq!(ladder[3].width, 1920);
    }

    #[test]
    fn applicable_profiles_drop_upscaling_rungs() {
        let requested: Vec<String> =
            vec!["360p".into(), "480p".into(), "720p".into(), "1080p".into()];
        let profiles = applicable_profiles(&requested, 720);
        let labels: Vec<&str> = profiles.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["360p", "480p", "720p"]);
    }

    #[test]
    fn tiny_source_keeps_smallest_profile() {
        let requested: Vec<String> = vec!["720p".into(), "1080p".into()];
        let profiles = applicable_profiles(&requested, 240);
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].label, "720p");
    }

    #[test]
    fn unknown_labels_are_skipped() {
        let requested: Vec<String> = vec!["4320p".into(), "480p".into()];
        let profiles = applicable_profiles(&requested, 1080);
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].label, "480p");
    }

    #[test]
    fn transcode_args_carry_bitrate_and_scale() {
        let profile = QualityProfile::for_label("720p").unwrap();
        let args = build_transcode_args(
            Path::new("/tmp/in.mp4"),
            Path::new("/tmp/out.mp4"),
            &profile,
            None,
        );
        assert!(args.contains(&"-b:v".to_string()));
        assert!(args.contains(&"5000k".to_string()));
        assert!(args.iter().any(|a| a.contains("scale=1280:720")));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn watermark_switches_to_filter_complex() {
        let profile = QualityProfile::for_label("480p").unwrap();
        let wm = WatermarkOverlay {
            image_path: PathBuf::from("/tmp/wm.png"),
            position: "W-w-10:H-h-10".into(),
            opacity: 0.5,
        };
        let args = build_transcode_args(
            Path::new("/tmp/in.mp4"),
            Path::new("/tmp/out.mp4"),
            &profile,
            Some(&wm),
        );
        assert!(args.contains(&"-filter_complex".to_string()));
        let filter = args
            .iter()
            .find(|a| a.contains("overlay=W-w-10:H-h-10"))
            .unwrap();
        assert!(filter.contains("colorchannelmixer=aa=0.5"));
        assert!(!args.contains(&"-vf".to_string()));
    }
}
