//! Конвертация SRT дорожки в стилизованный ASS для вжигания
//!
//! ASS файл несет ровно одну стилевую запись, выбранную из таблицы пресетов
//! по имени контентной вертикали. Переводы строк внутри реплики кодируются
//! маркером `\N`, а не литеральным переводом строки.

use crate::config::StylePreset;
use crate::error::Result;
use crate::subtitle::srt;

/// Стилевая запись ASS
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    /// Шрифт
    pub font: &'static str,
    /// Размер шрифта
    pub font_size: u32,
    /// Основной цвет в формате ABGR
    pub primary_colour: &'static str,
    /// Цвет обводки в формате ABGR
    pub outline_colour: &'static str,
    /// Толщина обводки
    pub outline: u32,
    /// Глубина тени
    pub shadow: u32,
    /// Вертикальный отступ
    pub margin_v: u32,
}

impl StylePreset {
    /// Таблица стилей по вертикалям
    pub fn overlay_style(&self) -> OverlayStyle {
        match self {
            StylePreset::History => OverlayStyle {
                font: "Georgia",
                font_size: 52,
                primary_colour: "&H00E8E8E8",
                outline_colour: "&H00101010",
                outline: 2,
                shadow: 1,
                margin_v: 48,
            },
            StylePreset::Isekai => OverlayStyle {
                font: "Trebuchet MS",
                font_size: 54,
                primary_colour: "&H00F4D6CD",
                outline_colour: "&H001B1111",
                outline: 3,
                shadow: 1,
                margin_v: 56,
            },
            StylePreset::Sermon => OverlayStyle {
                font: "Times New Roman",
                font_size: 50,
                primary_colour: "&H00FFFFFF",
                outline_colour: "&H00202020",
                outline: 2,
                shadow: 2,
                margin_v: 44,
            },
            // Вертикальный формат: крупнее и выше над нижней кромкой
            StylePreset::Shorts => OverlayStyle {
                font: "Arial",
                font_size: 72,
                primary_colour: "&H00FFFFFF",
                outline_colour: "&H00000000",
                outline: 4,
                shadow: 2,
                margin_v: 260,
            },
            StylePreset::Default => OverlayStyle {
                font: "Arial",
                font_size: 48,
                primary_colour: "&H00FFFFFF",
                outline_colour: "&H00000000",
                outline: 2,
                shadow: 1,
                margin_v: 40,
            },
        }
    }
}

/// Форматирует время в `H:MM:SS.cc` (сантисекунды), часы без усечения
fn format_ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_secs = total_cs / 100;
    let s = total_secs % 60;
    let total_mins = total_secs / 60;
    let m = total_mins % 60;
    let h = total_mins / 60;
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

/// Переразбирает SRT дорожку и выдает стилизованный ASS.
///
/// Дорожка без реплик дает файл из одних заголовков.
pub fn to_ass(srt_content: &str, preset: StylePreset, play_res: (u32, u32)) -> Result<String> {
    let cues = srt::parse_srt(srt_content)?;
    let style = preset.overlay_style();
    let (res_x, res_y) = play_res;

    let mut out = String::new();
    out.push_str("[Script Info]\n");
    out.push_str("ScriptType: v4.00+\n");
    out.push_str(&format!("PlayResX: {}\n", res_x));
    out.push_str(&format!("PlayResY: {}\n", res_y));
    out.push_str("WrapStyle: 0\n\n");

    out.push_str("[V4+ Styles]\n");
    out.push_str(
        "Format: Name, Fontname, Fontsize, PrimaryColour, OutlineColour, BackColour, Bold, \
         Italic, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n",
    );
    out.push_str(&format!(
        "Style: {name},{font},{size},{primary},{outline_c},&H80000000,0,0,1,{outline},{shadow},2,40,40,{margin_v},1\n\n",
        name = preset.as_str(),
        font = style.font,
        size = style.font_size,
        primary = style.primary_colour,
        outline_c = style.outline_colour,
        outline = style.outline,
        shadow = style.shadow,
        margin_v = style.margin_v,
    ));

    out.push_str("[Events]\n");
    out.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
    for cue in &cues {
        let text = cue.text.replace('\n', "\\N");
        out.push_str(&format!(
            "Dialogue: 0,{},{},{},,0,0,0,,{}\n",
            format_ass_time(cue.start_seconds),
            format_ass_time(cue.end_seconds),
            preset.as_str(),
            text
        ));
    }

    Ok(out)
}
