//! Формирование и разбор SRT дорожек

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{RenderError, Result};
use crate::subtitle::SubtitleCue;
use crate::tts::timeline::TimelineEntry;

/// Формирует SRT дорожку из таймлайна.
///
/// Пустой таймлайн дает пустую дорожку.
pub fn to_srt(timeline: &[TimelineEntry]) -> String {
    let mut out = String::new();
    for (i, entry) in timeline.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_time(entry.start_seconds),
            format_srt_time(entry.end_seconds),
            entry.text
        ));
    }
    out
}

/// Форматирует время в `HH:MM:SS,mmm`.
///
/// Поле часов не усекается по модулю: реплика за границей часа сохраняет
/// полное значение.
pub fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let s = total_secs % 60;
    let total_mins = total_secs / 60;
    let m = total_mins % 60;
    let h = total_mins / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

static TIMECODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+):(\d{2}):(\d{2})[,.](\d{1,3})$").unwrap());

/// Разбирает строку времени `HH:MM:SS,mmm` в секунды
pub fn parse_srt_time(time_str: &str) -> Result<f64> {
    let captures = TIMECODE_RE.captures(time_str.trim()).ok_or_else(|| {
        RenderError::Subtitle(format!("invalid SRT timecode: {}", time_str))
    })?;

    let hours: u64 = captures[1].parse().unwrap_or(0);
    let minutes: u64 = captures[2].parse().unwrap_or(0);
    let seconds: u64 = captures[3].parse().unwrap_or(0);
    let ms_str = &captures[4];
    let mut ms: u64 = ms_str.parse().unwrap_or(0);
    // "5" означает 500 мс, "50" — 500 мс
    for _ in ms_str.len()..3 {
        ms *= 10;
    }

    Ok((hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + ms) as f64 / 1000.0)
}

/// Разбирает SRT дорожку на реплики.
///
/// Блоки разделены пустой строкой: строка номера, строка таймкодов, одна или
/// несколько строк текста. Многострочный текст сохраняет переводы строк.
pub fn parse_srt(content: &str) -> Result<Vec<SubtitleCue>> {
    let mut cues = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in content.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if !block.is_empty() {
                if let Some(cue) = parse_cue_block(&block)? {
                    cues.push(cue);
                }
                block.clear();
            }
        } else {
            block.push(line);
        }
    }

    Ok(cues)
}

fn parse_cue_block(lines: &[&str]) -> Result<Option<SubtitleCue>> {
    // Ищем строку с таймкодами; строка номера перед ней необязательна
    let timing_index = match lines.iter().position(|line| line.contains("-->")) {
        Some(index) => index,
        None => return Ok(None),
    };

    let parts: Vec<&str> = lines[timing_index].split("-->").collect();
    if parts.len() != 2 {
        return Err(RenderError::Subtitle(format!(
            "invalid SRT timing line: {}",
            lines[timing_index]
        )));
    }

    let start_seconds = parse_srt_time(parts[0])?;
    let end_seconds = parse_srt_time(parts[1])?;

    let text = lines[timing_index + 1..].join("\n");
    if text.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(SubtitleCue {
        start_seconds,
        end_seconds,
        text,
    }))
}
