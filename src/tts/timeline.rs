//! Восстановление таймлайна предложений
//!
//! Таймлайн строится либо по посимвольному выравниванию провайдера (точно),
//! либо пропорциональной оценкой по числу символов (приближенно, без учета
//! пауз на пунктуации — лучшего сигнала без выравнивания нет).

use crate::tts::chunker::TextChunk;
use crate::tts::CharAlignment;

/// Запись таймлайна
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    /// Начало, секунды от начала всей наррации
    pub start_seconds: f64,
    /// Конец, секунды от начала всей наррации
    pub end_seconds: f64,
    /// Текст предложения
    pub text: String,
}

/// Пропорциональная оценка таймлайна чанка.
///
/// Длительность чанка делится между предложениями пропорционально числу
/// символов. Счет ведется в целых миллисекундах, остаток округления уходит
/// последнему предложению, поэтому сумма длительностей равна длительности
/// чанка точно.
pub fn proportional(chunk: &TextChunk, chunk_duration: f64, offset: f64) -> Vec<TimelineEntry> {
    let n = chunk.sentences.len();
    if n == 0 {
        return Vec::new();
    }

    let total_ms = (chunk_duration * 1000.0).round() as u64;
    let char_counts: Vec<u64> = chunk
        .sentences
        .iter()
        .map(|s| s.chars().count() as u64)
        .collect();
    let total_chars: u64 = char_counts.iter().sum();

    let mut entries = Vec::with_capacity(n);
    let mut cursor_ms: u64 = 0;
    for (i, sentence) in chunk.sentences.iter().enumerate() {
        let duration_ms = if i + 1 == n {
            total_ms.saturating_sub(cursor_ms)
        } else if total_chars == 0 {
            total_ms / n as u64
        } else {
            ((total_ms as f64) * (char_counts[i] as f64) / (total_chars as f64)).round() as u64
        };

        entries.push(TimelineEntry {
            start_seconds: offset + cursor_ms as f64 / 1000.0,
            end_seconds: offset + (cursor_ms + duration_ms) as f64 / 1000.0,
            text: sentence.clone(),
        });
        cursor_ms += duration_ms;
    }

    entries
}

/// Строит записи таймлайна по посимвольному выравниванию провайдера.
///
/// Для каждого предложения ищется непрерывный (с точностью до пробелов) спан
/// символов выравнивания. Несопоставленные предложения получают
/// пропорциональную оценку внутри промежутка между соседними сопоставленными;
/// возвращаемый признак сообщает, что такая деградация произошла.
pub fn from_alignment(
    chunk: &TextChunk,
    alignment: &CharAlignment,
    chunk_duration: f64,
    offset: f64,
) -> (Vec<TimelineEntry>, bool) {
    let n = chunk.sentences.len();
    if n == 0 {
        return (Vec::new(), false);
    }

    let chars = &alignment.characters;
    let mut spans: Vec<Option<(usize, usize)>> = Vec::with_capacity(n);
    let mut cursor = 0usize;
    let mut used_fallback = false;

    for sentence in &chunk.sentences {
        let target: Vec<char> = sentence.chars().filter(|c| !c.is_whitespace()).collect();
        if target.is_empty() {
            spans.push(None);
            used_fallback = true;
            continue;
        }
        match match_span(chars, cursor, &target) {
            Some((first, last)) => {
                spans.push(Some((first, last)));
                cursor = last + 1;
            }
            None => {
                log::debug!("Alignment match failed for sentence: {}", sentence);
                spans.push(None);
                used_fallback = true;
            }
        }
    }

    let mut entries: Vec<TimelineEntry> = Vec::with_capacity(n);
    let mut prev_end = 0.0f64;
    let mut i = 0;
    while i < n {
        if let Some((first, last)) = spans[i] {
            let start = alignment
                .start_times
                .get(first)
                .copied()
                .unwrap_or(prev_end)
                .max(prev_end)
                .min(chunk_duration);
            let end = alignment
                .end_times
                .get(last)
                .copied()
                .unwrap_or(chunk_duration)
                .clamp(start, chunk_duration);
            entries.push(TimelineEntry {
                start_seconds: offset + start,
                end_seconds: offset + end,
                text: chunk.sentences[i].clone(),
            });
            prev_end = end;
            i += 1;
        } else {
            // Группа подряд идущих несопоставленных предложений делит
            // промежуток до следующего сопоставленного пропорционально
            let group_start = i;
            while i < n && spans[i].is_none() {
                i += 1;
            }
            let gap_end = match spans.get(i).and_then(|s| *s) {
                Some((first, _)) => alignment
                    .start_times
                    .get(first)
                    .copied()
                    .unwrap_or(chunk_duration)
                    .clamp(prev_end, chunk_duration),
                None => chunk_duration,
            };
            let gap = (gap_end - prev_end).max(0.0);
            let total_chars: usize = chunk.sentences[group_start..i]
                .iter()
                .map(|s| s.chars().count())
                .sum();

            let mut cursor_t = prev_end;
            for j in group_start..i {
                let end_t = if j + 1 == i {
                    gap_end
                } else if total_chars == 0 {
                    cursor_t
                } else {
                    cursor_t
                        + gap * chunk.sentences[j].chars().count() as f64 / total_chars as f64
                };
                entries.push(TimelineEntry {
                    start_seconds: offset + cursor_t,
                    end_seconds: offset + end_t,
                    text: chunk.sentences[j].clone(),
                });
                cursor_t = end_t;
            }
            prev_end = gap_end;
        }
    }

    // Последнее предложение дозвучивает до конца измеренного аудио чанка
    if let Some(last) = entries.last_mut() {
        last.end_seconds = offset + chunk_duration;
    }

    (entries, used_fallback)
}

/// Ищет спан `target` в `chars` начиная с позиции `from`, пробельные символы
/// с обеих сторон пропускаются
fn match_span(chars: &[char], from: usize, target: &[char]) -> Option<(usize, usize)> {
    let mut start = from;
    while start < chars.len() {
        if chars[start].is_whitespace() {
            start += 1;
            continue;
        }

        let mut i = start;
        let mut t = 0;
        let mut last = start;
        while i < chars.len() && t < target.len() {
            if chars[i].is_whitespace() {
                i += 1;
                continue;
            }
            if chars[i] != target[t] {
                break;
            }
            last = i;
            t += 1;
            i += 1;
        }
        if t == target.len() {
            return Some((start, last));
        }
        start += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::chunker::pack_chunks;

    fn chunk_of(sentences: &[&str]) -> TextChunk {
        let owned: Vec<String> = sentences.iter().map(|s| s.to_string()).collect();
        pack_chunks(&owned, usize::MAX).remove(0)
    }

    fn alignment_for(text: &str, seconds_per_char: f64) -> CharAlignment {
        let characters: Vec<char> = text.chars().collect();
        let mut start_times = Vec::with_capacity(characters.len());
        let mut end_times = Vec::with_capacity(characters.len());
        for i in 0..characters.len() {
            start_times.push(i as f64 * seconds_per_char);
            end_times.push((i + 1) as f64 * seconds_per_char);
        }
        CharAlignment {
            characters,
            start_times,
            end_times,
        }
    }

    #[test]
    fn proportional_sum_is_exact() {
        // 3 предложения, 40 символов суммарно, 10.0 s без выравнивания
        let chunk = chunk_of(&["One two.", "Three four!", "Five six seven eight?"]);
        let total_chars: usize = chunk.sentences.iter().map(|s| s.chars().count()).sum();
        assert_eq!(total_chars, 40);

        let entries = proportional(&chunk, 10.0, 0.0);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].start_seconds, 0.0);
        assert_eq!(entries.last().unwrap().end_seconds, 10.0);

        // Длительности пропорциональны числу символов: 8/40, 11/40, 21/40
        assert!((entries[0].end_seconds - entries[0].start_seconds - 2.0).abs() < 1e-9);
        assert!((entries[1].end_seconds - entries[1].start_seconds - 2.75).abs() < 1e-9);
        assert!((entries[2].end_seconds - entries[2].start_seconds - 5.25).abs() < 1e-9);

        // Смежность без перекрытий
        for pair in entries.windows(2) {
            assert_eq!(pair[0].end_seconds, pair[1].start_seconds);
        }
    }

    #[test]
    fn proportional_applies_offset() {
        let chunk = chunk_of(&["Aaaa.", "Bbbb."]);
        let entries = proportional(&chunk, 4.0, 100.0);
        assert_eq!(entries[0].start_seconds, 100.0);
        assert_eq!(entries.last().unwrap().end_seconds, 104.0);
    }

    #[test]
    fn alignment_produces_ordered_entries_ending_at_duration() {
        let chunk = chunk_of(&["Hi there.", "Bye now."]);
        let alignment = alignment_for(&chunk.text, 0.1);
        let duration = chunk.text.chars().count() as f64 * 0.1;

        let (entries, fallback) = from_alignment(&chunk, &alignment, duration, 0.0);
        assert!(!fallback);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].start_seconds, 0.0);
        for pair in entries.windows(2) {
            assert!(pair[0].end_seconds <= pair[1].start_seconds + 1e-9);
            assert!(pair[0].start_seconds < pair[0].end_seconds);
        }
        assert!((entries.last().unwrap().end_seconds - duration).abs() < 1e-9);
    }

    #[test]
    fn alignment_falls_back_per_sentence() {
        // Провайдер "нормализовал" второе предложение до неузнаваемости
        let chunk = chunk_of(&["Hi there.", "Numbers 42.", "Bye now."]);
        let spoken = "Hi there. XXXXXXX XX. Bye now.";
        let alignment = alignment_for(spoken, 0.1);
        let duration = spoken.chars().count() as f64 * 0.1;

        let (entries, fallback) = from_alignment(&chunk, &alignment, duration, 0.0);
        assert!(fallback);
        assert_eq!(entries.len(), 3);
        // Первое и третье сопоставлены точно, второе заняло промежуток между ними
        assert!(entries[1].start_seconds >= entries[0].end_seconds - 1e-9);
        assert!(entries[1].end_seconds <= entries[2].start_seconds + 1e-9);
        assert!((entries.last().unwrap().end_seconds - duration).abs() < 1e-9);
    }

    #[test]
    fn alignment_with_chunk_offset() {
        let chunk = chunk_of(&["Second chunk."]);
        let alignment = alignment_for(&chunk.text, 0.05);
        let duration = chunk.text.chars().count() as f64 * 0.05;

        let (entries, _) = from_alignment(&chunk, &alignment, duration, 30.0);
        assert_eq!(entries[0].start_seconds, 30.0);
        assert!((entries[0].end_seconds - (30.0 + duration)).abs() < 1e-9);
    }
}
