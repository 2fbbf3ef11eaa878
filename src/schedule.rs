//! Планирование изображений по длительности аудио
//!
//! Таймстампы раздаются интервалами плотности: чаще в начале ролика, реже в
//! длинной наррации. Привязка изображений к таймстампам всегда делается по
//! фактической измеренной длительности и переделывается заново после каждой
//! повторной генерации речи.

use std::path::PathBuf;

use crate::config::{DensityBucket, SchedulerConfig};
use crate::error::{RenderError, Result};

/// Сцена, авторизованная офлайн, без привязки ко времени
#[derive(Debug, Clone, PartialEq)]
pub struct ScenePrompt {
    /// Порядковый номер сцены
    pub index: usize,
    /// Путь к изображению
    pub image_path: PathBuf,
}

/// Сцена, привязанная к моменту времени конкретной измеренной длительности
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledImage {
    /// Порядковый номер слота
    pub index: usize,
    /// Момент появления, секунды
    pub timestamp_seconds: f64,
    /// Путь к изображению
    pub image_path: PathBuf,
}

/// Результат планирования
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSchedule {
    /// Слоты в порядке возрастания времени
    pub images: Vec<ScheduledImage>,
    /// Изображений оказалось меньше, чем слотов: последнее повторено
    pub repeated_last: bool,
    /// Сколько изображений не поместилось в расписание
    pub dropped: usize,
}

/// Таймстампы по интервалам плотности.
///
/// Генерация идет от нуля, пока `t < duration`; шаг равен интервалу
/// диапазона, в который попадает текущий `t`. Последовательность строго
/// возрастает и всегда остается меньше длительности.
pub fn density_timestamps(duration: f64, buckets: &[DensityBucket]) -> Vec<f64> {
    let mut timestamps = Vec::new();
    if duration <= 0.0 || buckets.is_empty() {
        return timestamps;
    }

    let mut t = 0.0;
    while t < duration {
        timestamps.push(t);
        let interval = interval_for(buckets, t);
        if interval <= 0.0 {
            break;
        }
        t += interval;
    }
    timestamps
}

fn interval_for(buckets: &[DensityBucket], t: f64) -> f64 {
    let mut interval = buckets[0].interval_secs;
    for bucket in buckets {
        if t >= bucket.start_secs {
            interval = bucket.interval_secs;
        }
    }
    interval
}

/// Раскладывает изображения по слотам расписания.
///
/// Слотов больше, чем изображений — последнее изображение повторяется, пустых
/// слотов не остается. Изображений больше, чем слотов — хвост отбрасывается с
/// предупреждением.
pub fn schedule_images(
    images: &[PathBuf],
    duration: f64,
    config: &SchedulerConfig,
) -> Result<ImageSchedule> {
    if images.is_empty() {
        return Err(RenderError::Scheduling(
            "no scene images to schedule".to_string(),
        ));
    }
    if duration <= 0.0 {
        return Err(RenderError::Scheduling(format!(
            "cannot schedule images against non-positive duration {}",
            duration
        )));
    }

    let slots = density_timestamps(duration, &config.buckets);
    if slots.is_empty() {
        return Err(RenderError::Scheduling(
            "density buckets produced no slots".to_string(),
        ));
    }

    let repeated_last = images.len() < slots.len();
    if repeated_last {
        log::info!(
            "Only {} images for {} slots, repeating the last image",
            images.len(),
            slots.len()
        );
    }
    let dropped = images.len().saturating_sub(slots.len());
    if dropped > 0 {
        log::warn!("{} trailing images do not fit the schedule and are dropped", dropped);
    }

    let last = images.last().unwrap();
    let scheduled = slots
        .iter()
        .enumerate()
        .map(|(i, &timestamp)| ScheduledImage {
            index: i,
            timestamp_seconds: timestamp,
            image_path: images.get(i).unwrap_or(last).clone(),
        })
        .collect();

    Ok(ImageSchedule {
        images: scheduled,
        repeated_last,
        dropped,
    })
}

/// Перепривязка авторских сцен к фактической длительности.
///
/// Авторские таймстампы считались по оценочной длительности и отбрасываются;
/// сохраняются только количество и порядок сцен, которые раскладываются по
/// слотам плотности фактической длительности.
pub fn reschedule_prompts(
    prompts: &[ScenePrompt],
    duration: f64,
    config: &SchedulerConfig,
) -> Result<ImageSchedule> {
    let paths: Vec<PathBuf> = prompts.iter().map(|p| p.image_path.clone()).collect();
    schedule_images(&paths, duration, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("scene_{}.png", i))).collect()
    }

    #[test]
    fn seventy_two_seconds_gives_seven_slots() {
        let config = SchedulerConfig::default();
        let timestamps = density_timestamps(72.0, &config.buckets);
        assert_eq!(timestamps, vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
    }

    #[test]
    fn buckets_thin_out_for_long_narration() {
        let config = SchedulerConfig::default();
        let timestamps = density_timestamps(700.0, &config.buckets);

        // Первая минута шагом 10, далее 30 до пятой минуты, 40 до десятой, потом 60
        assert_eq!(&timestamps[..7], &[0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
        assert!(timestamps.contains(&90.0));
        assert!(timestamps.contains(&270.0));
        // 270 + 30 = 300 — граница пятой минуты, дальше шаг 40
        assert!(timestamps.contains(&300.0));
        assert!(timestamps.contains(&340.0));
        // 580 + 40 = 620 — уже за границей десятой минуты, шаг 60
        assert!(timestamps.contains(&620.0));
        assert!(timestamps.contains(&680.0));

        for pair in timestamps.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(*timestamps.last().unwrap() < 700.0);
        assert_eq!(timestamps[0], 0.0);
    }

    #[test]
    fn scheduling_is_idempotent() {
        let config = SchedulerConfig::default();
        let images = paths(5);
        let first = schedule_images(&images, 72.0, &config).unwrap();
        let second = schedule_images(&images, 72.0, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_images_repeat_the_last_one() {
        let config = SchedulerConfig::default();
        let images = paths(3);
        let schedule = schedule_images(&images, 72.0, &config).unwrap();

        assert_eq!(schedule.images.len(), 7);
        assert!(schedule.repeated_last);
        assert_eq!(schedule.dropped, 0);
        assert_eq!(schedule.images[2].image_path, PathBuf::from("scene_2.png"));
        for slot in &schedule.images[3..] {
            assert_eq!(slot.image_path, PathBuf::from("scene_2.png"));
        }
    }

    #[test]
    fn surplus_images_are_dropped() {
        let config = SchedulerConfig::default();
        let images = paths(10);
        let schedule = schedule_images(&images, 72.0, &config).unwrap();

        assert_eq!(schedule.images.len(), 7);
        assert!(!schedule.repeated_last);
        assert_eq!(schedule.dropped, 3);
    }

    #[test]
    fn rescheduling_keeps_count_and_order() {
        let config = SchedulerConfig::default();
        let prompts: Vec<ScenePrompt> = paths(4)
            .into_iter()
            .enumerate()
            .map(|(index, image_path)| ScenePrompt { index, image_path })
            .collect();

        let schedule = reschedule_prompts(&prompts, 72.0, &config).unwrap();
        assert_eq!(schedule.images.len(), 7);
        for (i, prompt) in prompts.iter().enumerate() {
            assert_eq!(schedule.images[i].image_path, prompt.image_path);
        }
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let config = SchedulerConfig::default();
        assert!(schedule_images(&[], 72.0, &config).is_err());
        assert!(schedule_images(&paths(1), 0.0, &config).is_err());
        assert!(schedule_images(&paths(1), -5.0, &config).is_err());
    }
}
