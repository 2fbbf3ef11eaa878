//! Определение длительности аудиофайлов
//!
//! Провайдеры отдают недостоверные или пустые метаданные, поэтому длительность
//! всегда измеряется заново. Методы перечислены явной цепочкой в порядке
//! убывания точности: ffprobe, разбор WAV заголовка, метаданные symphonia,
//! оценка по размеру файла.

use std::fs::File;
use std::path::Path;
use std::process::Command;

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Один метод определения длительности; None означает "метод не сработал"
pub type ProbeStrategy = fn(&Path) -> Option<f64>;

/// Стандартная цепочка методов
pub const DEFAULT_STRATEGIES: &[ProbeStrategy] = &[
    ffprobe_duration,
    wav_header_duration,
    symphonia_duration,
    size_estimate_duration,
];

/// Возвращает длительность файла в секундах.
///
/// 0.0 возвращается только если файл не существует или ни один метод не дал
/// положительного значения; вызывающий код обязан трактовать 0.0 как
/// непригодный результат, а не как пустой клип.
pub fn duration(path: &Path) -> f64 {
    duration_with(path, DEFAULT_STRATEGIES)
}

/// Вариант с явной цепочкой методов
pub fn duration_with(path: &Path, strategies: &[ProbeStrategy]) -> f64 {
    if !path.exists() {
        log::warn!("Cannot probe duration, file does not exist: {}", path.display());
        return 0.0;
    }
    for strategy in strategies {
        if let Some(value) = strategy(path) {
            if value > 0.0 {
                return value;
            }
        }
    }
    log::warn!("All duration probes failed for {}", path.display());
    0.0
}

/// Длительность через ffprobe
fn ffprobe_duration(path: &Path) -> Option<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| *d > 0.0)
}

/// Длительность из заголовка WAV: число сэмплов / частота дискретизации
fn wav_header_duration(path: &Path) -> Option<f64> {
    let reader = hound::WavReader::open(path).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(reader.duration() as f64 / spec.sample_rate as f64)
}

/// Длительность из метаданных сжатого формата через symphonia
fn symphonia_duration(path: &Path) -> Option<f64> {
    let file = File::open(path).ok()?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;

    let format = probed.format;
    let track = format.default_track()?;
    let time_base = track.codec_params.time_base?;
    let frames = track.codec_params.n_frames?;
    let time = time_base.calc_time(frames);
    Some(time.seconds as f64 + time.frac)
}

// Константы оценки по размеру: 24 kHz mono 16-bit WAV и 128 kbps MP3
const WAV_BYTES_PER_SECOND: f64 = 48_000.0;
const MP3_BYTES_PER_SECOND: f64 = 16_000.0;

/// Грубая оценка длительности по размеру файла для известных кодировок
fn size_estimate_duration(path: &Path) -> Option<f64> {
    let len = std::fs::metadata(path).ok()?.len();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())?;
    let bytes_per_second = match ext.as_str() {
        "wav" => WAV_BYTES_PER_SECOND,
        "mp3" => MP3_BYTES_PER_SECOND,
        _ => return None,
    };
    let estimate = len as f64 / bytes_per_second;
    log::debug!(
        "Estimated duration of {} from file size: {:.2} s",
        path.display(),
        estimate
    );
    Some(estimate).filter(|d| *d > 0.0)
}
