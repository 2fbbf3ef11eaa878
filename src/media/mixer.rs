//! Mixing narration with background music beds.
//!
//! One BGM track means simple mode: loop the bed, keep it quiet, fade it out
//! before the narration ends. Several time-bound segments are trimmed,
//! gain-staged and crossfaded at their boundaries, then summed against the
//! narration. A failed segmented mix degrades to simple mode with the first
//! segment's track instead of failing the job.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{BgmConfig, EncoderConfig};
use crate::error::{RenderError, Result};
use crate::media::ffmpeg::FfmpegCommand;
use crate::media::{AudioAsset, AudioFormat};

const BOUNDARY_TOLERANCE: f64 = 1e-6;

/// One background music segment bound to a narration time range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BgmSegment {
    /// Segment start, seconds
    pub start_seconds: f64,
    /// Segment end, seconds
    pub end_seconds: f64,
    /// Music track for this segment
    pub track_path: PathBuf,
    /// Mood label from the script generator, informational only
    pub mood: Option<String>,
}

impl BgmSegment {
    pub fn new(start_seconds: f64, end_seconds: f64, track_path: impl Into<PathBuf>) -> Self {
        Self {
            start_seconds,
            end_seconds,
            track_path: track_path.into(),
            mood: None,
        }
    }

    /// Segment length in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

/// Mix result: the new audio asset plus a degradation marker.
#[derive(Debug)]
pub struct MixOutcome {
    pub audio: AudioAsset,
    /// Segmented mix failed and the simple fallback was used
    pub used_fallback: bool,
}

/// Narration + BGM mixer
pub struct AudioMixer<'a> {
    bgm: &'a BgmConfig,
    encoder: &'a EncoderConfig,
}

impl<'a> AudioMixer<'a> {
    pub fn new(bgm: &'a BgmConfig, encoder: &'a EncoderConfig) -> Self {
        Self { bgm, encoder }
    }

    /// Mixes narration with the BGM plan; the segment list is authoritative.
    pub async fn mix(
        &self,
        narration: &AudioAsset,
        segments: &[BgmSegment],
        output: &Path,
    ) -> Result<MixOutcome> {
        validate_segments(segments)?;
        for segment in segments {
            if !segment.track_path.exists() {
                return Err(RenderError::FileNotFound(
                    segment.track_path.display().to_string(),
                ));
            }
        }

        if segments.len() == 1 {
            log::info!("Mixing narration with a single looped BGM track");
            self.simple_mix(narration, &segments[0].track_path, output)
                .await?;
            let audio = AudioAsset::probe(output, AudioFormat::M4a)?;
            return Ok(MixOutcome {
                audio,
                used_fallback: false,
            });
        }

        log::info!("Mixing narration with {} BGM segments", segments.len());
        match self.segmented_mix(narration, segments, output).await {
            Ok(()) => {
                let audio = AudioAsset::probe(output, AudioFormat::M4a)?;
                Ok(MixOutcome {
                    audio,
                    used_fallback: false,
                })
            }
            Err(error) if fallback_eligible(&error) => {
                log::warn!(
                    "Segmented mix failed ({}), falling back to simple mix with the first track",
                    error
                );
                self.simple_mix(narration, &segments[0].track_path, output)
                    .await?;
                let audio = AudioAsset::probe(output, AudioFormat::M4a)?;
                Ok(MixOutcome {
                    audio,
                    used_fallback: true,
                })
            }
            Err(error) => Err(error),
        }
    }

    async fn simple_mix(
        &self,
        narration: &AudioAsset,
        bgm_track: &Path,
        output: &Path,
    ) -> Result<()> {
        FfmpegCommand::simple_mix(
            &narration.path,
            bgm_track,
            self.bgm,
            narration.duration_seconds,
            &self.encoder.audio_bitrate,
            output,
        )
        .run(self.encoder.timeout_secs)
        .await
    }

    async fn segmented_mix(
        &self,
        narration: &AudioAsset,
        segments: &[BgmSegment],
        output: &Path,
    ) -> Result<()> {
        FfmpegCommand::segmented_mix(
            &narration.path,
            segments,
            self.bgm,
            narration.duration_seconds,
            &self.encoder.audio_bitrate,
            output,
        )
        .run(self.encoder.timeout_secs)
        .await
    }
}

/// Only encode-level failures degrade to simple mode; a missing encoder or a
/// wall-clock timeout would fail the fallback the same way.
fn fallback_eligible(error: &RenderError) -> bool {
    matches!(
        error,
        RenderError::CommandFailed { .. }
            | RenderError::AudioProcessing(_)
            | RenderError::VideoProcessing(_)
    )
}

/// Segments must be ordered, non-overlapping and contiguous.
pub(crate) fn validate_segments(segments: &[BgmSegment]) -> Result<()> {
    if segments.is_empty() {
        return Err(RenderError::AudioProcessing(
            "BGM plan carries no segments".to_string(),
        ));
    }

    for segment in segments {
        if segment.start_seconds < 0.0 || segment.duration_seconds() <= 0.0 {
            return Err(RenderError::AudioProcessing(format!(
                "invalid BGM segment [{:.3}, {:.3}]",
                segment.start_seconds, segment.end_seconds
            )));
        }
    }
    for pair in segments.windows(2) {
        if (pair[1].start_seconds - pair[0].end_seconds).abs() > BOUNDARY_TOLERANCE {
            return Err(RenderError::AudioProcessing(format!(
                "BGM segments must be contiguous: [{:.3}, {:.3}] then [{:.3}, {:.3}]",
                pair[0].start_seconds,
                pair[0].end_seconds,
                pair[1].start_seconds,
                pair[1].end_seconds
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_segments_pass_validation() {
        let segments = vec![
            BgmSegment::new(0.0, 30.0, "a.mp3"),
            BgmSegment::new(30.0, 60.0, "b.mp3"),
            BgmSegment::new(60.0, 95.5, "c.mp3"),
        ];
        assert!(validate_segments(&segments).is_ok());
    }

    #[test]
    fn gaps_and_overlaps_are_rejected() {
        let gap = vec![
            BgmSegment::new(0.0, 30.0, "a.mp3"),
            BgmSegment::new(31.0, 60.0, "b.mp3"),
        ];
        assert!(validate_segments(&gap).is_err());

        let overlap = vec![
            BgmSegment::new(0.0, 30.0, "a.mp3"),
            BgmSegment::new(29.0, 60.0, "b.mp3"),
        ];
        assert!(validate_segments(&overlap).is_err());
    }

    #[test]
    fn degenerate_segments_are_rejected() {
        assert!(validate_segments(&[]).is_err());
        assert!(validate_segments(&[BgmSegment::new(10.0, 10.0, "a.mp3")]).is_err());
        assert!(validate_segments(&[BgmSegment::new(-1.0, 10.0, "a.mp3")]).is_err());
    }

    #[test]
    fn fallback_covers_encode_failures_only() {
        assert!(fallback_eligible(&RenderError::CommandFailed {
            tool: "ffmpeg",
            status: 1,
            stderr: "invalid filter graph".to_string(),
        }));
        assert!(!fallback_eligible(&RenderError::ToolNotInstalled(
            "ffmpeg".to_string()
        )));
        assert!(!fallback_eligible(&RenderError::CommandTimeout {
            tool: "ffmpeg",
            seconds: 1800,
        }));
    }
}
