//! Сборка видео из изображений, аудио и субтитров
//!
//! Многокартиночный путь идет в два этапа: сначала рендер через
//! concat-демуксер, затем отдельный проход вжигания субтитров. Совмещение
//! concat и subtitles в одном графе фильтров дает дрейф таймстампов, поэтому
//! этапы разделены. Для единственного изображения достаточно одного прохода.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::EncoderConfig;
use crate::error::{RenderError, Result};
use crate::media::ffmpeg::FfmpegCommand;
use crate::media::AudioAsset;
use crate::utils::temp::ScratchDir;

/// Задание на рендеринг — точка соединения всех артефактов конвейера.
///
/// Собирается на один запрос и уничтожается после кодирования.
#[derive(Debug)]
pub struct RenderJob<'a> {
    /// Аудиодорожка (наррация или сведенный микс)
    pub audio: &'a AudioAsset,
    /// Изображения в порядке показа
    pub images: &'a [PathBuf],
    /// Моменты появления изображений; None — равное деление длительности
    pub timestamps: Option<&'a [f64]>,
    /// ASS файл для вжигания
    pub subtitle: Option<&'a Path>,
    /// Путь итогового видео
    pub output_path: &'a Path,
}

/// Сборщик видео
pub struct VideoAssembler<'a> {
    encoder: &'a EncoderConfig,
}

impl<'a> VideoAssembler<'a> {
    pub fn new(encoder: &'a EncoderConfig) -> Self {
        Self { encoder }
    }

    /// Собирает итоговое видео
    pub async fn assemble(&self, job: &RenderJob<'_>, scratch: &ScratchDir) -> Result<PathBuf> {
        if job.images.is_empty() {
            return Err(RenderError::VideoProcessing(
                "render job carries no images".to_string(),
            ));
        }
        validate_timestamps(job)?;

        let duration = job.audio.duration_seconds;
        if job.images.len() == 1 {
            log::info!("Assembling single-image video, {:.1} s", duration);
            FfmpegCommand::single_image(
                &job.images[0],
                &job.audio.path,
                job.subtitle,
                self.encoder,
                duration,
                job.output_path,
            )?
            .run(self.encoder.timeout_secs)
            .await?;
            return Ok(job.output_path.to_path_buf());
        }

        log::info!(
            "Assembling {}-image video in two stages, {:.1} s",
            job.images.len(),
            duration
        );
        let durations = image_durations(job.images.len(), job.timestamps, duration);
        let list_path = scratch.file("concat", "txt");
        let mut list_file = std::fs::File::create(&list_path)?;
        list_file.write_all(build_concat_list(job.images, &durations).as_bytes())?;
        drop(list_file);

        let silent = scratch.file("silent", "mp4");
        FfmpegCommand::concat_render(&list_path, &job.audio.path, self.encoder, duration, &silent)?
            .run(self.encoder.timeout_secs)
            .await?;

        match job.subtitle {
            Some(subtitle) => {
                FfmpegCommand::subtitle_burn(&silent, subtitle, self.encoder, job.output_path)
                    .run(self.encoder.timeout_secs)
                    .await?;
            }
            None => {
                std::fs::copy(&silent, job.output_path)?;
            }
        }

        Ok(job.output_path.to_path_buf())
    }
}

fn validate_timestamps(job: &RenderJob<'_>) -> Result<()> {
    let timestamps = match job.timestamps {
        Some(timestamps) => timestamps,
        None => return Ok(()),
    };

    if timestamps.len() != job.images.len() {
        return Err(RenderError::VideoProcessing(format!(
            "{} timestamps for {} images",
            timestamps.len(),
            job.images.len()
        )));
    }
    if timestamps.first().copied().unwrap_or(0.0) < 0.0 {
        return Err(RenderError::VideoProcessing(
            "image timestamps must start at or after 0".to_string(),
        ));
    }
    for pair in timestamps.windows(2) {
        if pair[0] >= pair[1] {
            return Err(RenderError::VideoProcessing(
                "image timestamps must be strictly increasing".to_string(),
            ));
        }
    }
    if let Some(&last) = timestamps.last() {
        if last >= job.audio.duration_seconds {
            return Err(RenderError::VideoProcessing(format!(
                "last image timestamp {:.3} is beyond audio duration {:.3}",
                last, job.audio.duration_seconds
            )));
        }
    }
    Ok(())
}

/// Длительности показа изображений.
///
/// С таймстампами: следующий минус текущий, последнему достается остаток.
/// Без таймстампов: равное деление общей длительности.
pub(crate) fn image_durations(count: usize, timestamps: Option<&[f64]>, total: f64) -> Vec<f64> {
    match timestamps {
        Some(timestamps) => timestamps
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                if i + 1 < timestamps.len() {
                    timestamps[i + 1] - t
                } else {
                    (total - t).max(0.0)
                }
            })
            .collect(),
        None => vec![total / count as f64; count],
    }
}

/// Текст concat-списка.
///
/// Последний файл перечислен дважды: требование демуксера для корректной
/// длительности последнего сегмента.
pub(crate) fn build_concat_list(images: &[PathBuf], durations: &[f64]) -> String {
    let mut out = String::new();
    for (image, duration) in images.iter().zip(durations) {
        let escaped = image.display().to_string().replace('\'', "'\\''");
        out.push_str(&format!("file '{}'\n", escaped));
        out.push_str(&format!("duration {:.3}\n", duration));
    }
    if let Some(last) = images.last() {
        let escaped = last.display().to_string().replace('\'', "'\\''");
        out.push_str(&format!("file '{}'\n", escaped));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_from_timestamps_with_remainder_for_last() {
        let durations = image_durations(3, Some(&[0.0, 10.0, 25.0]), 40.0);
        assert_eq!(durations, vec![10.0, 15.0, 15.0]);
    }

    #[test]
    fn durations_by_even_division() {
        let durations = image_durations(4, None, 60.0);
        assert_eq!(durations, vec![15.0, 15.0, 15.0, 15.0]);
    }

    #[test]
    fn concat_list_repeats_last_image() {
        let images = vec![PathBuf::from("a.png"), PathBuf::from("b.png")];
        let list = build_concat_list(&images, &[10.0, 5.0]);
        let expected = "file 'a.png'\nduration 10.000\nfile 'b.png'\nduration 5.000\nfile 'b.png'\n";
        assert_eq!(list, expected);
    }

    #[test]
    fn concat_list_escapes_quotes() {
        let images = vec![PathBuf::from("it's.png")];
        let list = build_concat_list(&images, &[3.0]);
        assert!(list.contains("file 'it'\\''s.png'"));
    }

    #[test]
    fn timestamps_validation() {
        use crate::media::{AudioAsset, AudioFormat};

        let audio = AudioAsset {
            path: PathBuf::from("voice.mp3"),
            duration_seconds: 60.0,
            format: AudioFormat::Mp3,
        };
        let images = vec![PathBuf::from("a.png"), PathBuf::from("b.png")];
        let output = PathBuf::from("out.mp4");

        let ok = RenderJob {
            audio: &audio,
            images: &images,
            timestamps: Some(&[0.0, 30.0]),
            subtitle: None,
            output_path: &output,
        };
        assert!(validate_timestamps(&ok).is_ok());

        let not_increasing = RenderJob {
            timestamps: Some(&[30.0, 30.0]),
            ..ok
        };
        assert!(validate_timestamps(&not_increasing).is_err());

        let beyond_duration = RenderJob {
            timestamps: Some(&[0.0, 60.0]),
            ..ok
        };
        assert!(validate_timestamps(&beyond_duration).is_err());

        let wrong_count = RenderJob {
            timestamps: Some(&[0.0]),
            ..ok
        };
        assert!(validate_timestamps(&wrong_count).is_err());
    }
}
