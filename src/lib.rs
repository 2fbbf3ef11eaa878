//! Основной файл библиотеки rendernova
//!
//! Эта библиотека превращает текст наррации в синхронизированное с аудио
//! видео: синтез речи с резервными провайдерами, восстановление таймлайна
//! предложений, субтитры, расписание изображений, двухэтапная сборка видео
//! и сведение фоновой музыки.

pub mod config;
pub mod error;
pub mod media;
pub mod probe;
pub mod progress;
pub mod schedule;
pub mod subtitle;
pub mod tts;
pub mod utils;

use std::path::PathBuf;

use crate::config::{RenderConfig, StylePreset};
use crate::error::{RenderError, Result};
use crate::media::mixer::{AudioMixer, BgmSegment};
use crate::media::video::{RenderJob, VideoAssembler};
use crate::progress::{NullReporter, ProcessStep, ProgressReporter};
use crate::tts::SpeechSynthesizer;
use crate::utils::temp::ScratchDir;

/// Запрос на рендеринг — граница с внешними подсистемами
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Текст наррации
    pub narration: String,
    /// Упорядоченные изображения сцен
    pub images: Vec<PathBuf>,
    /// Авторские таймстампы сцен, проставленные по оценочной длительности.
    /// Используются только количество и порядок: привязка переделывается по
    /// фактической измеренной длительности.
    pub authored_timestamps: Option<Vec<f64>>,
    /// Имя пресета оформления субтитров
    pub style_preset: String,
    /// План фоновой музыки; пустой список — без музыки
    pub bgm: Vec<BgmSegment>,
    /// Путь итогового видео
    pub output_path: PathBuf,
}

/// Предупреждение о пониженном качестве результата.
///
/// Ролик собран, но один из документированных резервных путей сработал.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caveat {
    /// Таймлайн субтитров построен пропорциональной оценкой
    ProportionalTiming,
    /// Сегментное сведение не удалось, музыка сведена простым режимом
    BgmFallback,
    /// Слотов расписания больше, чем изображений: последнее повторено
    RepeatedLastImage,
    /// Авторские таймстампы отброшены и пересчитаны
    RemappedAuthoredTimestamps,
}

/// Результат рендеринга
#[derive(Debug)]
pub struct RenderOutcome {
    /// Путь итогового видео
    pub video_path: PathBuf,
    /// Измеренная длительность, секунды
    pub duration_seconds: f64,
    /// Сработавшие резервные пути
    pub caveats: Vec<Caveat>,
}

/// Конвейер рендеринга
pub struct RenderPipeline {
    config: RenderConfig,
    reporter: Box<dyn ProgressReporter>,
}

impl RenderPipeline {
    /// Создать конвейер с указанной конфигурацией
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            reporter: Box::new(NullReporter),
        }
    }

    /// Создать конвейер с репортером прогресса
    pub fn with_reporter(config: RenderConfig, reporter: Box<dyn ProgressReporter>) -> Self {
        Self { config, reporter }
    }

    /// Основной метод: выполняет этапы строго последовательно и прерывается
    /// на первом недеградируемом сбое. Резервные пути копятся в caveats.
    pub async fn render(&self, request: &RenderRequest) -> Result<RenderOutcome> {
        self.validate_request(request)?;
        let scratch = ScratchDir::new(self.config.cleanup_temp_files)?;
        let mut caveats = Vec::new();

        // 1. Синтез речи и таймлайн
        self.reporter
            .report(ProcessStep::SpeechGeneration, 0.0, Some("starting synthesis"));
        let synthesizer = SpeechSynthesizer::new(&self.config.tts)?;
        let speech = synthesizer.synthesize(&request.narration, &scratch).await?;
        if speech.proportional_timing {
            caveats.push(Caveat::ProportionalTiming);
        }
        self.reporter.report(
            ProcessStep::SpeechGeneration,
            100.0,
            Some(&format!("{:.1} s of narration", speech.audio.duration_seconds)),
        );

        // 2. Субтитры: SRT дорожка и стилизованный ASS
        self.reporter
            .report(ProcessStep::SubtitleGeneration, 0.0, None);
        let srt_track = subtitle::srt::to_srt(&speech.timeline);
        let preset = StylePreset::from_name(&request.style_preset);
        let ass_track =
            subtitle::ass::to_ass(&srt_track, preset, self.config.encoder.dimensions()?)?;
        let ass_path = scratch.file("subtitles", "ass");
        std::fs::write(&ass_path, &ass_track)?;
        self.reporter
            .report(ProcessStep::SubtitleGeneration, 100.0, None);

        // 3. Расписание изображений по фактической длительности
        self.reporter.report(ProcessStep::ImageScheduling, 0.0, None);
        if request.authored_timestamps.is_some() {
            log::info!("Authored scene timestamps are re-mapped onto the measured duration");
            caveats.push(Caveat::RemappedAuthoredTimestamps);
        }
        let image_schedule = schedule::schedule_images(
            &request.images,
            speech.audio.duration_seconds,
            &self.config.scheduler,
        )?;
        if image_schedule.repeated_last {
            caveats.push(Caveat::RepeatedLastImage);
        }
        self.reporter.report(
            ProcessStep::ImageScheduling,
            100.0,
            Some(&format!("{} slots", image_schedule.images.len())),
        );

        // 4. Сведение фоновой музыки, если план не пуст
        let final_audio = if request.bgm.is_empty() {
            speech.audio.clone()
        } else {
            self.reporter.report(ProcessStep::AudioMixing, 0.0, None);
            let mixer = AudioMixer::new(&self.config.bgm, &self.config.encoder);
            let mixed_path = scratch.file("mixed", "m4a");
            let outcome = mixer
                .mix(&speech.audio, &request.bgm, &mixed_path)
                .await?;
            if outcome.used_fallback {
                caveats.push(Caveat::BgmFallback);
            }
            self.reporter.report(ProcessStep::AudioMixing, 100.0, None);
            outcome.audio
        };

        // 5. Сборка видео
        self.reporter.report(ProcessStep::VideoAssembly, 0.0, None);
        let image_paths: Vec<PathBuf> = image_schedule
            .images
            .iter()
            .map(|s| s.image_path.clone())
            .collect();
        let timestamps: Vec<f64> = image_schedule
            .images
            .iter()
            .map(|s| s.timestamp_seconds)
            .collect();
        let job = RenderJob {
            audio: &final_audio,
            images: &image_paths,
            timestamps: Some(&timestamps),
            subtitle: Some(ass_path.as_path()),
            output_path: &request.output_path,
        };
        let assembler = VideoAssembler::new(&self.config.encoder);
        let video_path = assembler.assemble(&job, &scratch).await?;
        self.reporter.report(ProcessStep::VideoAssembly, 100.0, None);

        let duration_seconds = probe::duration(&video_path);
        if duration_seconds <= 0.0 {
            return Err(RenderError::VideoProcessing(format!(
                "rendered video is unusable: {}",
                video_path.display()
            )));
        }

        log::info!(
            "Render finished: {} ({:.1} s, {} caveats)",
            video_path.display(),
            duration_seconds,
            caveats.len()
        );
        Ok(RenderOutcome {
            video_path,
            duration_seconds,
            caveats,
        })
    }

    fn validate_request(&self, request: &RenderRequest) -> Result<()> {
        if request.narration.trim().is_empty() {
            return Err(RenderError::Configuration(
                "narration text is empty".to_string(),
            ));
        }
        if request.images.is_empty() {
            return Err(RenderError::Configuration(
                "request carries no scene images".to_string(),
            ));
        }
        for image in &request.images {
            if !image.exists() {
                return Err(RenderError::FileNotFound(image.display().to_string()));
            }
        }
        if let Some(timestamps) = &request.authored_timestamps {
            if timestamps.len() != request.images.len() {
                return Err(RenderError::Configuration(format!(
                    "{} authored timestamps for {} images",
                    timestamps.len(),
                    request.images.len()
                )));
            }
        }
        if let Some(parent) = request.output_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Публичный API для удобного использования
pub async fn render_video(request: &RenderRequest, config: RenderConfig) -> Result<RenderOutcome> {
    RenderPipeline::new(config).render(request).await
}
