mod builtin;
pub mod debug;
mod fit;
mod font;
mod render;

pub use fit::{
    DEFAULT_MAX_FONT_SIZE, DEFAULT_MIN_FONT_SIZE, FitResult, break_long_word, fit_text, wrap_text,
};
pub use font::{FontCache, FontFace, LINE_SPACING_PX, ScaledFont, TextExtent, load_font};
pub use render::{
    DEFAULT_OUTLINE_WIDTH, DEFAULT_PADDING, RenderOutcome, RenderStyle, normalize_punctuation,
    parse_color, render_text,
};
