//! Типизированный построитель команд ffmpeg
//!
//! Каждая операция кодирования перечислена отдельным конструктором, собирающим
//! полный вектор аргументов: некорректный набор флагов — ошибка типов на этапе
//! компиляции, а не строка, упавшая в рантайме. Запуск несет жесткий таймаут,
//! усеченную диагностику stderr и гарантию отсутствия частичного выходного
//! файла после сбоя.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::config::{BgmConfig, EncoderConfig};
use crate::error::{RenderError, Result};
use crate::media::mixer::BgmSegment;
use crate::utils::truncate_output;

/// Проверяет наличие ffmpeg в PATH
pub fn is_ffmpeg_installed() -> bool {
    which::which("ffmpeg").is_ok()
}

/// Проверяет наличие инструмента в PATH
pub(crate) fn ensure_tool_installed(tool: &str) -> Result<()> {
    which::which(tool)
        .map(|_| ())
        .map_err(|_| RenderError::ToolNotInstalled(tool.to_string()))
}

/// Проверяет наличие ffmpeg перед первым запуском кодировщика
pub fn ensure_ffmpeg_installed() -> Result<()> {
    ensure_tool_installed("ffmpeg")
}

/// Видеофильтр масштабирования с добавлением полей до целевого разрешения
fn scale_pad_filter(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = width,
        h = height
    )
}

/// Одна собранная команда ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    description: &'static str,
    args: Vec<String>,
    output: PathBuf,
}

impl FfmpegCommand {
    /// Одно изображение + аудио (+ необязательные субтитры) за один проход
    pub fn single_image(
        image: &Path,
        audio: &Path,
        subtitle: Option<&Path>,
        encoder: &EncoderConfig,
        duration: f64,
        output: &Path,
    ) -> Result<Self> {
        let (width, height) = encoder.dimensions()?;
        let mut filter = scale_pad_filter(width, height);
        if let Some(subtitle) = subtitle {
            filter.push_str(&format!(",ass={}", subtitle.display()));
        }

        let args = vec![
            "-y".to_string(),
            "-loop".to_string(),
            "1".to_string(),
            "-i".to_string(),
            image.display().to_string(),
            "-i".to_string(),
            audio.display().to_string(),
            "-vf".to_string(),
            filter,
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            encoder.preset.clone(),
            "-crf".to_string(),
            encoder.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-r".to_string(),
            encoder.fps.to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            encoder.audio_bitrate.clone(),
            "-t".to_string(),
            format!("{:.3}", duration),
            "-shortest".to_string(),
            output.display().to_string(),
        ];

        Ok(Self {
            description: "single image render",
            args,
            output: output.to_path_buf(),
        })
    }

    /// Этап 1 двухэтапной сборки: рендер из concat-списка и аудио
    pub fn concat_render(
        concat_list: &Path,
        audio: &Path,
        encoder: &EncoderConfig,
        duration: f64,
        output: &Path,
    ) -> Result<Self> {
        let (width, height) = encoder.dimensions()?;

        let args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            concat_list.display().to_string(),
            "-i".to_string(),
            audio.display().to_string(),
            "-vf".to_string(),
            scale_pad_filter(width, height),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            encoder.preset.clone(),
            "-crf".to_string(),
            encoder.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-r".to_string(),
            encoder.fps.to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            encoder.audio_bitrate.clone(),
            "-t".to_string(),
            format!("{:.3}", duration),
            output.display().to_string(),
        ];

        Ok(Self {
            description: "concat render",
            args,
            output: output.to_path_buf(),
        })
    }

    /// Этап 2 двухэтапной сборки: вжигание субтитров, аудио копируется
    pub fn subtitle_burn(
        input_video: &Path,
        subtitle: &Path,
        encoder: &EncoderConfig,
        output: &Path,
    ) -> Self {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input_video.display().to_string(),
            "-vf".to_string(),
            format!("ass={}", subtitle.display()),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            encoder.preset.clone(),
            "-crf".to_string(),
            encoder.crf.to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
            output.display().to_string(),
        ];

        Self {
            description: "subtitle burn",
            args,
            output: output.to_path_buf(),
        }
    }

    /// Склейка аудио concat-демуксером без перекодирования
    pub fn concat_audio_copy(concat_list: &Path, output: &Path) -> Self {
        let args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            concat_list.display().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.display().to_string(),
        ];

        Self {
            description: "audio concat",
            args,
            output: output.to_path_buf(),
        }
    }

    /// Простое сведение: наррация + один зацикленный BGM трек.
    ///
    /// Без автонормализации: amix с normalize=0, уровни задает вызывающий код.
    pub fn simple_mix(
        narration: &Path,
        bgm_track: &Path,
        bgm: &BgmConfig,
        narration_duration: f64,
        audio_bitrate: &str,
        output: &Path,
    ) -> Self {
        let fade_start =
            (narration_duration - bgm.tail_silence_secs - bgm.fade_secs).max(0.0);
        let filter = format!(
            "[1:a]volume={bgm_vol:.2},afade=t=out:st={fade_start:.3}:d={fade:.3}[bg];\
             [0:a]volume={narr_vol:.2}[voice];\
             [voice][bg]amix=inputs=2:duration=first:normalize=0[mix]",
            bgm_vol = bgm.bgm_volume,
            fade_start = fade_start,
            fade = bgm.fade_secs,
            narr_vol = bgm.narration_volume,
        );

        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            narration.display().to_string(),
            "-stream_loop".to_string(),
            "-1".to_string(),
            "-i".to_string(),
            bgm_track.display().to_string(),
            "-filter_complex".to_string(),
            filter,
            "-map".to_string(),
            "[mix]".to_string(),
            "-t".to_string(),
            format!("{:.3}", narration_duration),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            audio_bitrate.to_string(),
            output.display().to_string(),
        ];

        Self {
            description: "simple bgm mix",
            args,
            output: output.to_path_buf(),
        }
    }

    /// Сегментное сведение: каждый трек обрезается под свой сегмент, границы
    /// перекрываются кроссфейдом шириной `fade_secs`.
    pub fn segmented_mix(
        narration: &Path,
        segments: &[BgmSegment],
        bgm: &BgmConfig,
        narration_duration: f64,
        audio_bitrate: &str,
        output: &Path,
    ) -> Self {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            narration.display().to_string(),
        ];
        for segment in segments {
            args.push("-i".to_string());
            args.push(segment.track_path.display().to_string());
        }

        let mut filter = String::new();
        let mut labels = String::new();
        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            let segment_len = segment.duration_seconds();
            // Не последний сегмент переигрывает свою границу на ширину фейда,
            // чтобы затухание наложилось на вступление следующего трека
            let trim_len = if i < last {
                segment_len + bgm.fade_secs
            } else {
                segment_len
            };

            filter.push_str(&format!(
                "[{input}:a]atrim=0:{trim:.3},volume={vol:.2}",
                input = i + 1,
                trim = trim_len,
                vol = bgm.bgm_volume,
            ));
            if i > 0 {
                filter.push_str(&format!(",afade=t=in:st=0:d={:.3}", bgm.fade_secs));
            }
            if i < last {
                filter.push_str(&format!(
                    ",afade=t=out:st={:.3}:d={:.3}",
                    segment_len, bgm.fade_secs
                ));
            }
            if segment.start_seconds > 0.0 {
                let delay_ms = (segment.start_seconds * 1000.0).round() as u64;
                filter.push_str(&format!(",adelay={0}|{0}", delay_ms));
            }
            filter.push_str(&format!("[s{}];", i));
            labels.push_str(&format!("[s{}]", i));
        }

        filter.push_str(&format!(
            "{labels}amix=inputs={n}:duration=longest:normalize=0[bg];\
             [0:a]volume={narr_vol:.2}[voice];\
             [voice][bg]amix=inputs=2:duration=first:normalize=0[mix]",
            labels = labels,
            n = segments.len(),
            narr_vol = bgm.narration_volume,
        ));

        args.extend([
            "-filter_complex".to_string(),
            filter,
            "-map".to_string(),
            "[mix]".to_string(),
            "-t".to_string(),
            format!("{:.3}", narration_duration),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            audio_bitrate.to_string(),
            output.display().to_string(),
        ]);

        Self {
            description: "segmented bgm mix",
            args,
            output: output.to_path_buf(),
        }
    }

    /// Собранные аргументы команды
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Путь выходного файла
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Запускает команду с жестким таймаутом.
    ///
    /// Успех — нулевой код выхода и непустой выходной файл. При сбое или
    /// таймауте частичный выходной файл удаляется, stderr усекается до
    /// нескольких сотен символов.
    pub async fn run(&self, timeout_secs: u64) -> Result<()> {
        ensure_ffmpeg_installed()?;
        log::info!("Running ffmpeg ({}): ffmpeg {}", self.description, self.args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RenderError::ToolNotInstalled("ffmpeg".to_string())
                } else {
                    RenderError::Io(e)
                }
            })?;

        let stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buffer = Vec::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut buffer).await;
            }
            buffer
        });

        let status = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait(),
        )
        .await
        {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                self.remove_partial_output();
                return Err(e.into());
            }
            Err(_) => {
                log::error!(
                    "ffmpeg ({}) exceeded {} s, killing it",
                    self.description,
                    timeout_secs
                );
                let _ = child.kill().await;
                self.remove_partial_output();
                return Err(RenderError::CommandTimeout {
                    tool: "ffmpeg",
                    seconds: timeout_secs,
                });
            }
        };

        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            self.remove_partial_output();
            return Err(RenderError::CommandFailed {
                tool: "ffmpeg",
                status: status.code().unwrap_or(-1),
                stderr: truncate_output(&String::from_utf8_lossy(&stderr), 400),
            });
        }

        self.verify_output()
    }

    /// Непустой выходной файл после нулевого кода выхода
    fn verify_output(&self) -> Result<()> {
        match std::fs::metadata(&self.output) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => {
                self.remove_partial_output();
                Err(RenderError::VideoProcessing(format!(
                    "encoder reported success but produced no output at {}",
                    self.output.display()
                )))
            }
        }
    }

    fn remove_partial_output(&self) {
        if self.output.exists() {
            let _ = std::fs::remove_file(&self.output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BgmConfig, EncoderConfig};

    fn joined(command: &FfmpegCommand) -> String {
        command.args().join(" ")
    }

    #[test]
    fn single_image_command_args() {
        let encoder = EncoderConfig::default();
        let command = FfmpegCommand::single_image(
            Path::new("scene.png"),
            Path::new("voice.mp3"),
            Some(Path::new("subs.ass")),
            &encoder,
            12.5,
            Path::new("out.mp4"),
        )
        .unwrap();

        let args = joined(&command);
        assert!(args.starts_with("-y -loop 1 -i scene.png -i voice.mp3"));
        assert!(args.contains("scale=1920:1080:force_original_aspect_ratio=decrease"));
        assert!(args.contains(",ass=subs.ass"));
        assert!(args.contains("-preset veryfast -crf 28"));
        assert!(args.contains("-t 12.500 -shortest out.mp4"));
    }

    #[test]
    fn single_image_without_subtitles_has_no_ass_filter() {
        let encoder = EncoderConfig::default();
        let command = FfmpegCommand::single_image(
            Path::new("scene.png"),
            Path::new("voice.mp3"),
            None,
            &encoder,
            5.0,
            Path::new("out.mp4"),
        )
        .unwrap();
        assert!(!joined(&command).contains("ass="));
    }

    #[test]
    fn concat_render_command_args() {
        let encoder = EncoderConfig::default();
        let command = FfmpegCommand::concat_render(
            Path::new("list.txt"),
            Path::new("voice.mp3"),
            &encoder,
            72.0,
            Path::new("silent.mp4"),
        )
        .unwrap();

        let args = joined(&command);
        assert!(args.starts_with("-y -f concat -safe 0 -i list.txt -i voice.mp3"));
        assert!(args.contains("-pix_fmt yuv420p -r 30"));
        assert!(args.contains("-t 72.000 silent.mp4"));
    }

    #[test]
    fn subtitle_burn_copies_audio() {
        let encoder = EncoderConfig::default();
        let command = FfmpegCommand::subtitle_burn(
            Path::new("silent.mp4"),
            Path::new("subs.ass"),
            &encoder,
            Path::new("final.mp4"),
        );

        let args = joined(&command);
        assert!(args.contains("-vf ass=subs.ass"));
        assert!(args.contains("-c:a copy"));
        assert!(!args.contains("-t "));
    }

    #[test]
    fn simple_mix_disables_normalization_and_fades_out_early() {
        let bgm = BgmConfig::default();
        let command = FfmpegCommand::simple_mix(
            Path::new("voice.mp3"),
            Path::new("bed.mp3"),
            &bgm,
            60.0,
            "192k",
            Path::new("mixed.m4a"),
        );

        let args = joined(&command);
        assert!(args.contains("-stream_loop -1 -i bed.mp3"));
        // Фейд-аут заканчивается за tail_silence секунд до конца наррации
        assert!(args.contains("afade=t=out:st=55.000:d=2.000"));
        assert!(args.contains("volume=0.15"));
        assert!(args.contains("volume=1.50"));
        assert!(args.matches("normalize=0").count() == 1);
        assert!(args.contains("-t 60.000"));
    }

    #[test]
    fn segmented_mix_crossfades_at_boundaries() {
        let bgm = BgmConfig::default();
        let segments = vec![
            BgmSegment::new(0.0, 30.0, "trackA.mp3"),
            BgmSegment::new(30.0, 60.0, "trackB.mp3"),
        ];
        let command = FfmpegCommand::segmented_mix(
            Path::new("voice.mp3"),
            &segments,
            &bgm,
            60.0,
            "192k",
            Path::new("mixed.m4a"),
        );

        let args = joined(&command);
        // Первый сегмент переигрывает границу и затухает на ней
        assert!(args.contains("[1:a]atrim=0:32.000,volume=0.15,afade=t=out:st=30.000:d=2.000[s0]"));
        // Второй вступает с фейдом и задержкой до своей границы
        assert!(args.contains("[2:a]atrim=0:30.000,volume=0.15,afade=t=in:st=0:d=2.000,adelay=30000|30000[s1]"));
        assert!(args.contains("[s0][s1]amix=inputs=2:duration=longest:normalize=0[bg]"));
        assert!(args.contains("amix=inputs=2:duration=first:normalize=0[mix]"));
        assert!(args.contains("-t 60.000"));
    }

    #[test]
    fn missing_tool_is_reported_clearly() {
        let result = ensure_tool_installed("definitely-not-a-real-encoder-binary");
        assert!(matches!(result, Err(RenderError::ToolNotInstalled(_))));
    }
}
