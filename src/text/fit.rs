use serde::Serialize;

use super::font::{FontCache, FontFace, ScaledFont};

pub const DEFAULT_MAX_FONT_SIZE: u32 = 50;
pub const DEFAULT_MIN_FONT_SIZE: u32 = 10;

/// Glyph used to estimate the average character width.
const PROXY_GLYPH: &str = "W";
/// Words wider than this share of the box get force-hyphenated.
const LONG_WORD_RATIO: f32 = 0.975;
/// The proxy glyph is wider than average text; widen the column budget.
const COLUMN_FACTOR: f32 = 1.6;
/// Vertical breathing room required around the wrapped block.
const HEIGHT_MARGIN: f32 = 1.3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FitResult {
    pub font_size: u32,
    pub wrapped_text: String,
}

/// Largest size in `min_size..=max_size` whose wrapped layout fits the box.
///
/// Never fails: when no size fits, `min_size` is returned with the text
/// unwrapped and the caller renders whatever overflows.
pub fn fit_text(
    font: &FontFace,
    text: &str,
    box_width: u32,
    box_height: u32,
    max_size: u32,
    min_size: u32,
) -> FitResult {
    let mut cache = FontCache::new(font);
    fit_text_cached(&mut cache, text, box_width, box_height, max_size, min_size)
}

pub(crate) fn fit_text_cached(
    cache: &mut FontCache<'_>,
    text: &str,
    box_width: u32,
    box_height: u32,
    max_size: u32,
    min_size: u32,
) -> FitResult {
    let mut best = FitResult {
        font_size: min_size,
        wrapped_text: text.to_string(),
    };
    let box_width_px = box_width as f32;
    let box_height_px = box_height as f32;

    for size in min_size..=max_size {
        let font = cache.get(size);
        let char_width = font.line_width(PROXY_GLYPH);
        if char_width <= 0.0 {
            break;
        }

        let processed = hyphenate_long_words(text, box_width_px, font);
        let columns = ((box_width_px / char_width * COLUMN_FACTOR) as usize).max(1);
        let wrapped = wrap_text(&processed, columns).join("\n");

        let extent = font.measure(&wrapped);
        if extent.height * HEIGHT_MARGIN <= box_height_px {
            best = FitResult {
                font_size: size,
                wrapped_text: wrapped,
            };
        } else {
            break;
        }
    }

    best
}

/// Splits every word of `text` that is too wide for `max_width` once,
/// as `prefix-\nremainder`. Other whitespace is preserved as-is.
pub(crate) fn hyphenate_long_words(text: &str, max_width: f32, font: &ScaledFont<'_>) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut word = String::new();
    for ch in text.chars() {
        if ch.is_whitespace() {
            flush_word(&mut out, &mut word, max_width, font);
            out.push(ch);
        } else {
            word.push(ch);
        }
    }
    flush_word(&mut out, &mut word, max_width, font);
    out
}

fn flush_word(out: &mut String, word: &mut String, max_width: f32, font: &ScaledFont<'_>) {
    if word.is_empty() {
        return;
    }
    if font.line_width(word) > max_width * LONG_WORD_RATIO {
        out.push_str(&break_long_word(word, max_width, font));
    } else {
        out.push_str(word);
    }
    word.clear();
}

/// Breaks `word` at the longest prefix for which `prefix-` fits within
/// `max_width`. Returns the word untouched when it already fits or when
/// not even one character plus a hyphen fits.
pub fn break_long_word(word: &str, max_width: f32, font: &ScaledFont<'_>) -> String {
    if font.line_width(word) <= max_width {
        return word.to_string();
    }
    let boundaries: Vec<usize> = word.char_indices().map(|(idx, _)| idx).skip(1).collect();
    for &split in boundaries.iter().rev() {
        let (head, tail) = word.split_at(split);
        let fragment = format!("{}-", head);
        if font.line_width(&fragment) <= max_width {
            return format!("{}\n{}", fragment, tail);
        }
    }
    word.to_string()
}

/// Greedy word wrap to `columns` characters per line.
///
/// Words are never split, hyphens are not break points, and explicit line
/// breaks in the input are kept. A word longer than `columns` sits alone
/// on its own line.
pub fn wrap_text(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0usize;
        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            if current_len > 0 && current_len + 1 + word_len > columns {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += word_len;
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> FontFace {
        FontFace::builtin()
    }

    #[test]
    fn short_text_in_large_box_uses_max_size() {
        let result = fit_text(&builtin(), "Hi", 400, 400, 50, 10);
        assert_eq!(result.font_size, 50);
        assert_eq!(result.wrapped_text, "Hi");
    }

    #[test]
    fn shrinking_height_never_grows_font() {
        let font = builtin();
        let text = "I can't believe you actually came all the way out here just to see me";
        let mut previous = u32::MAX;
        for height in (20..=400).rev().step_by(7) {
            let result = fit_text(&font, text, 180, height, 50, 10);
            assert!(result.font_size <= previous, "height {}", height);
            previous = result.font_size;
        }
    }

    #[test]
    fn never_fails_and_falls_back_to_min_size() {
        let font = builtin();
        let text = "This text can never fit into such a tiny box no matter what";
        let result = fit_text(&font, text, 20, 5, 50, 10);
        assert_eq!(result.font_size, 10);
        assert_eq!(result.wrapped_text, text);
    }

    #[test]
    fn fitted_layout_respects_height_margin() {
        let font = builtin();
        let text = "Wait... you mean the whole crew already knew about the plan?";
        let result = fit_text(&font, text, 150, 120, 50, 10);
        let extent = font.at_size(result.font_size).measure(&result.wrapped_text);
        assert!(extent.height * HEIGHT_MARGIN <= 120.0);
        assert!(result.wrapped_text.contains('\n'));
    }

    #[test]
    fn long_word_gets_hyphen_and_break() {
        let font = builtin();
        let scaled = font.at_size(20);
        let word = "aaaaaaaaaaaaaaaaaaaa";
        let broken = break_long_word(word, 60.0, &scaled);
        assert!(broken.contains("-\n"));
        let (head, tail) = broken.split_once("-\n").unwrap();
        assert!(scaled.line_width(&format!("{}-", head)) <= 60.0);
        assert_eq!(format!("{}{}", head, tail), word);
    }

    #[test]
    fn fit_inserts_hyphen_for_oversized_word() {
        let result = fit_text(&builtin(), "aaaaaaaaaaaaaaaaaaaa", 60, 400, 20, 20);
        assert_eq!(result.font_size, 20);
        assert!(result.wrapped_text.contains("-\n"));
    }

    #[test]
    fn word_that_fits_is_left_alone() {
        let font = builtin();
        let scaled = font.at_size(10);
        assert_eq!(break_long_word("short", 200.0, &scaled), "short");
    }

    #[test]
    fn word_is_kept_when_no_prefix_fits() {
        let font = builtin();
        let scaled = font.at_size(40);
        assert_eq!(break_long_word("abc", 20.0, &scaled), "abc");
    }

    #[test]
    fn only_long_words_are_hyphenated() {
        let font = builtin();
        let scaled = font.at_size(10);
        let out = hyphenate_long_words("ok supercalifragilistic ok", 80.0, &scaled);
        assert!(out.starts_with("ok "));
        assert!(out.ends_with(" ok"));
        assert_eq!(out.matches("-\n").count(), 1);
    }

    #[test]
    fn wrap_keeps_words_whole() {
        let lines = wrap_text("the quick brown fox jumps", 10);
        assert_eq!(lines, vec!["the quick", "brown fox", "jumps"]);
    }

    #[test]
    fn wrap_puts_long_word_on_its_own_line() {
        let lines = wrap_text("a extraordinarily b", 5);
        assert_eq!(lines, vec!["a", "extraordinarily", "b"]);
    }

    #[test]
    fn wrap_does_not_break_at_hyphens() {
        let lines = wrap_text("well-known fact", 6);
        assert_eq!(lines, vec!["well-known", "fact"]);
    }

    #[test]
    fn wrap_honours_explicit_breaks() {
        let lines = wrap_text("swim-\nsuit day", 40);
        assert_eq!(lines, vec!["swim-", "suit day"]);
    }
}
