//! Склейка аудиофрагментов
//!
//! Явная цепочка методов: сэмпловая склейка WAV через hound, concat-демуксер
//! ffmpeg, побайтовая склейка. Последний метод допустим только когда все
//! фрагменты разделяют один и тот же сжатый формат.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{RenderError, Result};
use crate::media::ffmpeg::FfmpegCommand;
use crate::media::AudioFormat;

const CONCAT_TIMEOUT_SECS: u64 = 300;

/// Склеивает фрагменты в один файл, пробуя методы по порядку.
///
/// Ошибка возвращается только если не сработал ни один метод цепочки.
pub async fn concat_audio(files: &[PathBuf], format: AudioFormat, output: &Path) -> Result<()> {
    if files.is_empty() {
        return Err(RenderError::AudioProcessing(
            "no audio chunks to concatenate".to_string(),
        ));
    }
    if files.len() == 1 {
        std::fs::copy(&files[0], output)?;
        return Ok(());
    }

    if format == AudioFormat::Wav {
        match merge_wav(files, output) {
            Ok(()) => {
                log::debug!("Concatenated {} WAV chunks sample-wise", files.len());
                return Ok(());
            }
            Err(e) => log::warn!("Sample-wise WAV merge failed ({}), trying ffmpeg", e),
        }
    }

    match ffmpeg_concat(files, output).await {
        Ok(()) => return Ok(()),
        Err(e) => log::warn!("ffmpeg concat failed ({}), trying raw byte concat", e),
    }

    match format {
        AudioFormat::Mp3 => byte_concat(files, output),
        _ => Err(RenderError::AudioProcessing(format!(
            "all concatenation methods failed for {} {:?} chunks",
            files.len(),
            format
        ))),
    }
}

/// Сэмпловая склейка WAV файлов с одинаковыми параметрами
fn merge_wav(files: &[PathBuf], output: &Path) -> Result<()> {
    let spec = hound::WavReader::open(&files[0])
        .map_err(|e| RenderError::AudioProcessing(e.to_string()))?
        .spec();

    let mut writer = hound::WavWriter::create(output, spec)
        .map_err(|e| RenderError::AudioProcessing(e.to_string()))?;

    for file in files {
        let mut reader = hound::WavReader::open(file)
            .map_err(|e| RenderError::AudioProcessing(e.to_string()))?;
        if reader.spec() != spec {
            return Err(RenderError::InvalidFormat(format!(
                "WAV spec mismatch in {}",
                file.display()
            )));
        }

        match spec.sample_format {
            hound::SampleFormat::Int => {
                for sample in reader.samples::<i32>() {
                    let sample = sample.map_err(|e| RenderError::AudioProcessing(e.to_string()))?;
                    writer
                        .write_sample(sample)
                        .map_err(|e| RenderError::AudioProcessing(e.to_string()))?;
                }
            }
            hound::SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    let sample = sample.map_err(|e| RenderError::AudioProcessing(e.to_string()))?;
                    writer
                        .write_sample(sample)
                        .map_err(|e| RenderError::AudioProcessing(e.to_string()))?;
                }
            }
        }
    }

    writer
        .finalize()
        .map_err(|e| RenderError::AudioProcessing(e.to_string()))
}

/// Склейка concat-демуксером ffmpeg без перекодирования
async fn ffmpeg_concat(files: &[PathBuf], output: &Path) -> Result<()> {
    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    let mut list_file = tempfile::Builder::new()
        .prefix("concat_")
        .suffix(".txt")
        .tempfile_in(parent)?;

    for file in files {
        // Одинарные кавычки в пути экранируются по правилам concat-демуксера
        let escaped = file.display().to_string().replace('\'', "'\\''");
        writeln!(list_file, "file '{}'", escaped)?;
    }
    list_file.flush()?;

    FfmpegCommand::concat_audio_copy(list_file.path(), output)
        .run(CONCAT_TIMEOUT_SECS)
        .await
}

/// Побайтовая склейка фрагментов одинакового сжатого формата
fn byte_concat(files: &[PathBuf], output: &Path) -> Result<()> {
    log::warn!("Falling back to raw byte concatenation of {} chunks", files.len());
    let mut out = std::fs::File::create(output)?;
    for file in files {
        let bytes = std::fs::read(file)?;
        out.write_all(&bytes)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe;

    fn write_wav(path: &Path, seconds: f64, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..(seconds * sample_rate as f64) as usize {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[tokio::test]
    async fn wav_chunks_merge_sample_wise() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_wav(&a, 1.0, 24_000);
        write_wav(&b, 2.0, 24_000);

        let output = dir.path().join("merged.wav");
        concat_audio(&[a, b], AudioFormat::Wav, &output).await.unwrap();

        let reader = hound::WavReader::open(&output).unwrap();
        let measured = reader.duration() as f64 / reader.spec().sample_rate as f64;
        assert!((measured - 3.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn single_chunk_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        write_wav(&a, 1.5, 24_000);

        let output = dir.path().join("merged.wav");
        concat_audio(&[a], AudioFormat::Wav, &output).await.unwrap();
        assert!((probe::duration(&output) - 1.5).abs() < 0.05);
    }

    #[test]
    fn wav_spec_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_wav(&a, 1.0, 24_000);
        write_wav(&b, 1.0, 44_100);

        let output = dir.path().join("merged.wav");
        assert!(merge_wav(&[a, b], &output).is_err());
    }

    #[test]
    fn byte_concat_joins_chunks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.mp3");
        let b = dir.path().join("b.mp3");
        std::fs::write(&a, b"AAAA").unwrap();
        std::fs::write(&b, b"BBBB").unwrap();

        let output = dir.path().join("merged.mp3");
        byte_concat(&[a, b], &output).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"AAAABBBB");
    }

    #[test]
    fn empty_chunk_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("merged.wav");
        let result = tokio_test::block_on(concat_audio(&[], AudioFormat::Wav, &output));
        assert!(result.is_err());
    }
}
