//! Разбиение наррации на предложения и чанки
//!
//! Чанк — единица одного запроса к TTS провайдеру и одного цикла повторных
//! попыток. Предложение никогда не разрезается между чанками.

use once_cell::sync::Lazy;
use regex::Regex;

/// Чанк текста с исходными предложениями
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Текст чанка, предложения соединены одним пробелом
    pub text: String,
    /// Исходные предложения в порядке следования
    pub sentences: Vec<String>,
    /// Размер текста в символах
    pub size_chars: usize,
}

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

static SENTENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(.*?[.!?…])(?:\s+|$)").unwrap());

/// Подготовка текста перед синтезом: снять HTML разметку и нормализовать пробелы
pub fn prepare_text(text: &str) -> String {
    let text = HTML_TAG_RE.replace_all(text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&apos;", "'");

    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Разбивает текст на предложения.
///
/// Граница предложения — завершающая пунктуация, за которой следует пробел
/// или конец текста. Пунктуация остается в своем предложении. Хвост без
/// завершающей пунктуации становится отдельным предложением.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last_end = 0;

    for captures in SENTENCE_RE.captures_iter(text) {
        let sentence = captures.get(1).unwrap().as_str().trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        last_end = captures.get(0).unwrap().end();
    }

    if last_end < text.len() {
        let tail = text[last_end..].trim();
        if !tail.is_empty() {
            sentences.push(tail.to_string());
        }
    }

    sentences
}

/// Жадно упаковывает предложения в чанки не длиннее `max_chars` символов.
///
/// Предложение длиннее потолка уходит целиком в собственный чанк.
pub fn pack_chunks(sentences: &[String], max_chars: usize) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;

    for sentence in sentences {
        let sentence_len = sentence.chars().count();
        let added = if current.is_empty() {
            sentence_len
        } else {
            sentence_len + 1
        };

        if !current.is_empty() && current_len + added > max_chars {
            chunks.push(make_chunk(std::mem::take(&mut current)));
            current_len = 0;
        }

        current_len += if current.is_empty() {
            sentence_len
        } else {
            sentence_len + 1
        };
        current.push(sentence.clone());
    }

    if !current.is_empty() {
        chunks.push(make_chunk(current));
    }

    chunks
}

fn make_chunk(sentences: Vec<String>) -> TextChunk {
    let text = sentences.join(" ");
    TextChunk {
        size_chars: text.chars().count(),
        text,
        sentences,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_text_strips_markup_and_entities() {
        let raw = "Hello <b>world</b>!&nbsp; Next&amp;last.\n\n  Done.";
        assert_eq!(prepare_text(raw), "Hello world! Next&last. Done.");
    }

    #[test]
    fn split_keeps_punctuation_with_sentence() {
        let sentences = split_sentences("First one. Second one! Third one?");
        assert_eq!(sentences, vec!["First one.", "Second one!", "Third one?"]);
    }

    #[test]
    fn split_keeps_unterminated_tail() {
        let sentences = split_sentences("Finished sentence. And a trailing fragment");
        assert_eq!(
            sentences,
            vec!["Finished sentence.", "And a trailing fragment"]
        );
    }

    #[test]
    fn packing_preserves_sentence_sequence() {
        let sentences: Vec<String> = (0..20)
            .map(|i| format!("Sentence number {} is right here.", i))
            .collect();
        let chunks = pack_chunks(&sentences, 120);

        // Ни одно предложение не потеряно, не продублировано и не разрезано
        let rejoined: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.sentences.iter().cloned())
            .collect();
        assert_eq!(rejoined, sentences);

        let rejoined_text = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(rejoined_text, sentences.join(" "));

        for chunk in &chunks {
            assert!(chunk.size_chars <= 120);
            assert_eq!(chunk.text.chars().count(), chunk.size_chars);
        }
        assert!(chunks.len() > 1);
    }

    #[test]
    fn oversized_sentence_gets_its_own_chunk() {
        let long = "word ".repeat(100).trim().to_string() + ".";
        let sentences = vec!["Short one.".to_string(), long.clone(), "Tail.".to_string()];
        let chunks = pack_chunks(&sentences, 50);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].sentences, vec![long]);
        assert!(chunks[1].size_chars > 50);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_sentences("").is_empty());
        assert!(pack_chunks(&[], 100).is_empty());
    }
}
