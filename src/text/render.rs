use anyhow::{Result, anyhow};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use once_cell::sync::Lazy;
use regex::Regex;
use tiny_skia::{Paint, Pixmap};
use tracing::debug;

use super::fit::{DEFAULT_MAX_FONT_SIZE, DEFAULT_MIN_FONT_SIZE, FitResult, fit_text_cached};
use super::font::{FontCache, FontFace, ScaledFont};
use crate::geometry::BBox;

pub const DEFAULT_PADDING: i32 = 5;
pub const DEFAULT_OUTLINE_WIDTH: u8 = 2;

static SPACED_PERIODS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\s+\.").expect("static regex"));
static PERIOD_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{3,}").expect("static regex"));

#[derive(Debug, Clone)]
pub struct RenderStyle {
    pub text_color: Rgba<u8>,
    pub outline_color: Rgba<u8>,
    /// Halo radius in pixels (L-infinity), i.e. every offset in
    /// `[-w, w]^2` around a glyph pixel is covered.
    pub outline_width: u8,
    pub padding: i32,
    pub max_font_size: u32,
    pub min_font_size: u32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            text_color: Rgba([0, 0, 0, 255]),
            outline_color: Rgba([255, 255, 255, 255]),
            outline_width: DEFAULT_OUTLINE_WIDTH,
            padding: DEFAULT_PADDING,
            max_font_size: DEFAULT_MAX_FONT_SIZE,
            min_font_size: DEFAULT_MIN_FONT_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Text was drawn with its block's top-left corner at `origin`.
    Drawn { fit: FitResult, origin: (i32, i32) },
    /// The box minus padding has no room left; the image is untouched.
    TooSmall,
    /// Nothing printable remained after normalization.
    Empty,
}

impl RenderOutcome {
    pub fn is_drawn(&self) -> bool {
        matches!(self, RenderOutcome::Drawn { .. })
    }
}

/// Draws `text` centered inside `bbox`, shrinking and wrapping it to fit,
/// with a halo in the outline color behind the glyphs.
pub fn render_text(
    image: &mut RgbaImage,
    font: &FontFace,
    text: &str,
    bbox: BBox,
    style: &RenderStyle,
) -> RenderOutcome {
    let text = normalize_punctuation(text);

    let box_width = bbox.width() - 2 * style.padding;
    let box_height = bbox.height() - 2 * style.padding;
    if box_width <= 0 || box_height <= 0 {
        return RenderOutcome::TooSmall;
    }
    if text.trim().is_empty() {
        return RenderOutcome::Empty;
    }

    let mut cache = FontCache::new(font);
    let fit = fit_text_cached(
        &mut cache,
        &text,
        box_width as u32,
        box_height as u32,
        style.max_font_size,
        style.min_font_size,
    );
    let scaled = cache.get(fit.font_size);
    let extent = scaled.measure(&fit.wrapped_text);

    let (center_x, center_y) = bbox.center();
    let text_x = (center_x - extent.width / 2.0).round() as i32;
    let text_y = (center_y - extent.height / 2.0).round() as i32;
    debug!(
        "render: size={} lines={} at ({}, {})",
        fit.font_size,
        fit.wrapped_text.lines().count(),
        text_x,
        text_y
    );

    let margin = style.outline_width as u32 + 2;
    let Some(coverage) = rasterize_block(scaled, &fit.wrapped_text, extent.width, extent.height, margin)
    else {
        return RenderOutcome::Empty;
    };
    let halo = if style.outline_width > 0 {
        morphology::dilate(&coverage, Norm::LInf, style.outline_width)
    } else {
        GrayImage::new(coverage.width(), coverage.height())
    };

    let left = text_x - margin as i32;
    let top = text_y - margin as i32;
    composite(image, &halo, left, top, style.outline_color);
    composite(image, &coverage, left, top, style.text_color);

    RenderOutcome::Drawn {
        fit,
        origin: (text_x, text_y),
    }
}

/// Glyph coverage of a wrapped block, each line centered in the block,
/// with `margin` empty pixels on every side.
fn rasterize_block(
    font: &ScaledFont<'_>,
    wrapped: &str,
    block_width: f32,
    block_height: f32,
    margin: u32,
) -> Option<GrayImage> {
    let width = block_width.ceil() as u32 + margin * 2;
    let height = block_height.ceil() as u32 + margin * 2;
    let mut pixmap = Pixmap::new(width, height)?;

    let mut paint = Paint::default();
    paint.set_color_rgba8(0, 0, 0, 255);
    paint.anti_alias = true;

    for (idx, line) in wrapped.split('\n').enumerate() {
        let line_width = font.line_width(line);
        let x = margin as f32 + (block_width - line_width) / 2.0;
        let y = margin as f32 + idx as f32 * font.line_pitch();
        font.draw_line(&mut pixmap, x, y, line, &paint);
    }

    Some(GrayImage::from_fn(width, height, |x, y| {
        Luma([pixmap.pixel(x, y).map(|px| px.alpha()).unwrap_or(0)])
    }))
}

fn composite(image: &mut RgbaImage, mask: &GrayImage, left: i32, top: i32, color: Rgba<u8>) {
    let (img_w, img_h) = (image.width() as i32, image.height() as i32);
    for (mx, my, coverage) in mask.enumerate_pixels() {
        let alpha = coverage.0[0];
        if alpha == 0 {
            continue;
        }
        let x = left + mx as i32;
        let y = top + my as i32;
        if x < 0 || y < 0 || x >= img_w || y >= img_h {
            continue;
        }
        let dst = image.get_pixel_mut(x as u32, y as u32);
        blend(dst, color, alpha);
    }
}

fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>, coverage: u8) {
    let alpha = (coverage as f32 / 255.0) * (src.0[3] as f32 / 255.0);
    for channel in 0..3 {
        let mixed = dst.0[channel] as f32 * (1.0 - alpha) + src.0[channel] as f32 * alpha;
        dst.0[channel] = mixed.round().clamp(0.0, 255.0) as u8;
    }
    let dst_alpha = dst.0[3] as f32 / 255.0;
    dst.0[3] = ((dst_alpha + alpha * (1.0 - dst_alpha)) * 255.0).round() as u8;
}

/// Folds full-width periods and ellipses to ASCII, joins periods separated
/// by whitespace, and caps runs of periods at three.
pub fn normalize_punctuation(text: &str) -> String {
    let ascii: String = text
        .chars()
        .map(|ch| if ch == '．' || ch == '…' { '.' } else { ch })
        .collect();
    let joined = SPACED_PERIODS_RE.replace_all(&ascii, "..");
    PERIOD_RUN_RE.replace_all(&joined, "...").into_owned()
}

/// Parses `#rrggbb` or `#rrggbbaa`.
pub fn parse_color(value: &str) -> Result<Rgba<u8>> {
    let hex = value.trim().trim_start_matches('#');
    let channel = |idx: usize| {
        hex.get(idx..idx + 2)
            .and_then(|part| u8::from_str_radix(part, 16).ok())
            .ok_or_else(|| anyhow!("invalid color '{}'", value))
    };
    match hex.len() {
        6 => Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, 255])),
        8 => Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
        _ => Err(anyhow!("invalid color '{}'", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{fit_text, load_font};

    const GRAY: Rgba<u8> = Rgba([128, 128, 128, 255]);

    fn canvas() -> RgbaImage {
        RgbaImage::from_pixel(240, 160, GRAY)
    }

    #[test]
    fn normalizes_full_width_periods() {
        let out = normalize_punctuation("よし．．．");
        assert!(!out.contains('．'));
        assert_eq!(out, "よし...");
    }

    #[test]
    fn collapses_long_period_runs() {
        assert_eq!(normalize_punctuation("What...."), "What...");
        assert_eq!(normalize_punctuation("Hmm……"), "Hmm..");
        assert_eq!(normalize_punctuation("no.. way"), "no.. way");
    }

    #[test]
    fn joins_spaced_periods() {
        assert_eq!(normalize_punctuation("Wait. . ."), "Wait.. .");
        assert_eq!(normalize_punctuation("End. Next"), "End. Next");
        assert_eq!(normalize_punctuation(". . . . ."), ".. .. .");
        assert_eq!(normalize_punctuation("Huh. . . ."), "Huh.. ..");
    }

    #[test]
    fn box_smaller_than_padding_is_a_noop() {
        let font = FontFace::builtin();
        let mut image = canvas();
        let before = image.clone();
        let outcome = render_text(
            &mut image,
            &font,
            "Hello",
            BBox::new(10, 10, 20, 100),
            &RenderStyle::default(),
        );
        assert_eq!(outcome, RenderOutcome::TooSmall);
        assert_eq!(image, before);
    }

    #[test]
    fn draws_text_with_halo_inside_box() {
        let font = FontFace::builtin();
        let mut image = canvas();
        let bbox = BBox::new(20, 20, 220, 140);
        let outcome = render_text(&mut image, &font, "Hi there", bbox, &RenderStyle::default());
        assert!(outcome.is_drawn());

        let mut black = 0;
        let mut white = 0;
        for (x, y, px) in image.enumerate_pixels() {
            if *px == GRAY {
                continue;
            }
            assert!(
                y as i32 >= bbox.y_min && y as i32 <= bbox.y_max,
                "pixel {} {} outside box rows",
                x,
                y
            );
            if px.0[..3] == [0, 0, 0] {
                black += 1;
            }
            if px.0[..3] == [255, 255, 255] {
                white += 1;
            }
        }
        assert!(black > 0);
        assert!(white > 0);
        assert_eq!(*image.get_pixel(0, 0), GRAY);
    }

    #[test]
    fn block_is_centered_on_box() {
        let font = FontFace::builtin();
        let mut image = canvas();
        let bbox = BBox::new(0, 0, 240, 160);
        let RenderOutcome::Drawn { fit, origin } =
            render_text(&mut image, &font, "Hi", bbox, &RenderStyle::default())
        else {
            panic!("expected text to be drawn");
        };
        let extent = font.at_size(fit.font_size).measure(&fit.wrapped_text);
        let expected_x = (120.0 - extent.width / 2.0).round() as i32;
        let expected_y = (80.0 - extent.height / 2.0).round() as i32;
        assert_eq!(origin, (expected_x, expected_y));
    }

    #[test]
    fn system_outline_font_fits_and_draws() {
        let font = load_font(None, None, Some("sans-serif"));
        if font.is_builtin() {
            return;
        }

        assert_eq!(fit_text(&font, "Hi", 400, 400, 50, 10).font_size, 50);
        let hyphenated = fit_text(&font, "aaaaaaaaaaaaaaaaaaaa", 60, 400, 20, 20);
        assert_eq!(hyphenated.font_size, 20);
        assert!(hyphenated.wrapped_text.contains("-\n"));

        let mut image = canvas();
        let bbox = BBox::new(20, 20, 220, 140);
        let outcome = render_text(&mut image, &font, "Hi there", bbox, &RenderStyle::default());
        assert!(outcome.is_drawn());
        let mut dark = 0;
        for (x, y, px) in image.enumerate_pixels() {
            if *px == GRAY {
                continue;
            }
            assert!(
                y as i32 >= bbox.y_min && y as i32 <= bbox.y_max,
                "pixel {} {} outside box rows",
                x,
                y
            );
            if px.0[0] < 64 {
                dark += 1;
            }
        }
        assert!(dark > 0);
    }

    #[test]
    fn whitespace_only_text_draws_nothing() {
        let font = FontFace::builtin();
        let mut image = canvas();
        let before = image.clone();
        let outcome = render_text(
            &mut image,
            &font,
            "   ",
            BBox::new(0, 0, 200, 100),
            &RenderStyle::default(),
        );
        assert_eq!(outcome, RenderOutcome::Empty);
        assert_eq!(image, before);
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(parse_color("#ffffff").unwrap(), Rgba([255, 255, 255, 255]));
        assert_eq!(parse_color("00000080").unwrap(), Rgba([0, 0, 0, 128]));
        assert!(parse_color("#fff").is_err());
        assert!(parse_color("#gg0000").is_err());
    }
}
