use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Rect, Transform};
use tracing::{debug, warn};
use ttf_parser::{Face, OutlineBuilder, name_id};
use usvg::fontdb;

use super::builtin;

/// Extra pixels between consecutive lines of a multi-line block.
pub const LINE_SPACING_PX: f32 = 4.0;

/// A loaded font, independent of size.
///
/// Outline fonts keep their raw file data behind an `Arc`, so clones are
/// cheap and the value can be shared across threads.
#[derive(Clone)]
pub struct FontFace {
    kind: FontKind,
}

#[derive(Clone)]
enum FontKind {
    Outline(OutlineData),
    BuiltIn,
}

#[derive(Clone)]
struct OutlineData {
    data: Arc<Vec<u8>>,
    face_index: u32,
    family: Option<String>,
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FontKind::Outline(outline) => f
                .debug_struct("FontFace")
                .field("family", &outline.family)
                .field("face_index", &outline.face_index)
                .finish(),
            FontKind::BuiltIn => f.write_str("FontFace(builtin)"),
        }
    }
}

impl FontFace {
    pub fn builtin() -> Self {
        Self {
            kind: FontKind::BuiltIn,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read font: {}", path.display()))?;
        Self::from_data(data, None)
            .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
    }

    /// Parses font data, picking the face whose family matches
    /// `preferred_family` in a collection, or the first usable face.
    pub fn from_data(data: Vec<u8>, preferred_family: Option<&str>) -> Result<Self> {
        let mut fallback = None;
        let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
        for index in 0..count {
            let Ok(face) = Face::parse(&data, index) else {
                continue;
            };
            let family = extract_family_name(&face);
            if let (Some(preferred), Some(found)) = (preferred_family, &family) {
                if found.eq_ignore_ascii_case(preferred) {
                    return Ok(Self::outline(data, index, family));
                }
            }
            if fallback.is_none() {
                fallback = Some((index, family));
            }
        }
        if preferred_family.is_some() {
            return Err(anyhow!("font family not found in font file"));
        }
        let (index, family) = fallback.ok_or_else(|| anyhow!("failed to parse font data"))?;
        Ok(Self::outline(data, index, family))
    }

    fn outline(data: Vec<u8>, face_index: u32, family: Option<String>) -> Self {
        Self {
            kind: FontKind::Outline(OutlineData {
                data: Arc::new(data),
                face_index,
                family,
            }),
        }
    }

    pub fn family(&self) -> Option<&str> {
        match &self.kind {
            FontKind::Outline(outline) => outline.family.as_deref(),
            FontKind::BuiltIn => None,
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.kind, FontKind::BuiltIn)
    }

    /// Opens a handle at `size` pixels per em.
    pub fn at_size(&self, size: u32) -> ScaledFont<'_> {
        let size = size.max(1) as f32;
        let kind = match &self.kind {
            FontKind::Outline(outline) => match Face::parse(&outline.data, outline.face_index) {
                Ok(face) => {
                    let units_per_em = face.units_per_em().max(1);
                    let scale = size / units_per_em as f32;
                    let space_advance = face
                        .glyph_index(' ')
                        .and_then(|id| face.glyph_hor_advance(id))
                        .unwrap_or(units_per_em / 2);
                    let ascender = face.ascender() as f32 * scale;
                    let descender = face.descender() as f32 * scale;
                    ScaledKind::Outline {
                        face,
                        scale,
                        space_advance,
                        ascender,
                        line_height: (ascender - descender).max(1.0),
                    }
                }
                Err(err) => {
                    warn!("font face became unreadable ({}); using builtin font", err);
                    ScaledKind::BuiltIn {
                        unit: size / builtin::EM_UNITS,
                    }
                }
            },
            FontKind::BuiltIn => ScaledKind::BuiltIn {
                unit: size / builtin::EM_UNITS,
            },
        };
        ScaledFont { kind }
    }
}

/// Resolves the rendering font: `primary` file, then `secondary` file,
/// then a system font by `family`, then the builtin bitmap font.
pub fn load_font(
    primary: Option<&Path>,
    secondary: Option<&Path>,
    family: Option<&str>,
) -> FontFace {
    for path in [primary, secondary].into_iter().flatten() {
        match FontFace::from_path(path) {
            Ok(font) => {
                debug!("font: loaded {}", path.display());
                return font;
            }
            Err(err) => warn!("font: {:#}", err),
        }
    }
    if let Some(family) = family {
        match load_system_family(family) {
            Ok(font) => {
                debug!("font: using system family '{}'", family);
                return font;
            }
            Err(err) => warn!("font: {:#}", err),
        }
    }
    warn!("font: no outline font available; falling back to the builtin font");
    FontFace::builtin()
}

fn load_system_family(family: &str) -> Result<FontFace> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    let name = {
        let face = Face::parse(&data, index)
            .map_err(|err| anyhow!("failed to parse font: {} (face {}, {})", family, index, err))?;
        extract_family_name(&face)
    };
    Ok(FontFace::outline(data, index, name))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

/// Width and height of a measured text block in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextExtent {
    pub width: f32,
    pub height: f32,
}

/// A font opened at one pixel size. All widths and heights used for
/// fitting and placement come from [`ScaledFont::measure`] and
/// [`ScaledFont::line_width`].
pub struct ScaledFont<'a> {
    kind: ScaledKind<'a>,
}

enum ScaledKind<'a> {
    Outline {
        face: Face<'a>,
        scale: f32,
        space_advance: u16,
        ascender: f32,
        line_height: f32,
    },
    BuiltIn {
        unit: f32,
    },
}

impl ScaledFont<'_> {
    /// Advance width of a single line. Line breaks are ignored.
    pub fn line_width(&self, line: &str) -> f32 {
        match &self.kind {
            ScaledKind::Outline {
                face,
                scale,
                space_advance,
                ..
            } => {
                let mut advance = 0u32;
                for ch in line.chars() {
                    if ch == '\n' {
                        continue;
                    }
                    let glyph_advance = face
                        .glyph_index(ch)
                        .and_then(|glyph| face.glyph_hor_advance(glyph))
                        .unwrap_or(*space_advance);
                    advance = advance.saturating_add(glyph_advance as u32);
                }
                advance as f32 * scale
            }
            ScaledKind::BuiltIn { unit } => {
                let count = line.chars().filter(|ch| *ch != '\n').count();
                count as f32 * builtin::ADVANCE_UNITS * unit
            }
        }
    }

    pub fn line_height(&self) -> f32 {
        match &self.kind {
            ScaledKind::Outline { line_height, .. } => *line_height,
            ScaledKind::BuiltIn { unit } => builtin::GLYPH_ROWS as f32 * unit,
        }
    }

    /// Extent of `text` laid out one line per `\n`.
    pub fn measure(&self, text: &str) -> TextExtent {
        if text.is_empty() {
            return TextExtent {
                width: 0.0,
                height: 0.0,
            };
        }
        let mut width: f32 = 0.0;
        let mut lines = 0usize;
        for line in text.split('\n') {
            width = width.max(self.line_width(line));
            lines += 1;
        }
        let height =
            lines as f32 * self.line_height() + (lines.saturating_sub(1)) as f32 * LINE_SPACING_PX;
        TextExtent { width, height }
    }

    /// Distance from the top of one line to the top of the next.
    pub fn line_pitch(&self) -> f32 {
        self.line_height() + LINE_SPACING_PX
    }

    /// Fills the glyphs of `line` with its top-left corner at `(x, top)`.
    pub(crate) fn draw_line(&self, pixmap: &mut Pixmap, x: f32, top: f32, line: &str, paint: &Paint) {
        match &self.kind {
            ScaledKind::Outline {
                face,
                scale,
                space_advance,
                ascender,
                ..
            } => {
                let mut sink = PathSink {
                    builder: PathBuilder::new(),
                    scale: *scale,
                    origin_x: x,
                    baseline: top + ascender,
                };
                for ch in line.chars() {
                    let Some(glyph) = face.glyph_index(ch) else {
                        sink.origin_x += *space_advance as f32 * scale;
                        continue;
                    };
                    face.outline_glyph(glyph, &mut sink);
                    let advance = face.glyph_hor_advance(glyph).unwrap_or(*space_advance);
                    sink.origin_x += advance as f32 * scale;
                }
                if let Some(path) = sink.builder.finish() {
                    pixmap.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
                }
            }
            ScaledKind::BuiltIn { unit } => {
                let mut pen = x;
                for ch in line.chars() {
                    for (col, row) in builtin::lit_cells(ch) {
                        let cell = Rect::from_xywh(
                            pen + col as f32 * unit,
                            top + row as f32 * unit,
                            *unit,
                            *unit,
                        );
                        if let Some(cell) = cell {
                            pixmap.fill_rect(cell, paint, Transform::identity(), None);
                        }
                    }
                    pen += builtin::ADVANCE_UNITS * unit;
                }
            }
        }
    }
}

struct PathSink {
    builder: PathBuilder,
    scale: f32,
    origin_x: f32,
    baseline: f32,
}

impl PathSink {
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.baseline - y * self.scale)
    }
}

impl OutlineBuilder for PathSink {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Size-keyed font handles for the duration of one fit/render call.
pub struct FontCache<'a> {
    font: &'a FontFace,
    sizes: HashMap<u32, ScaledFont<'a>>,
}

impl<'a> FontCache<'a> {
    pub fn new(font: &'a FontFace) -> Self {
        Self {
            font,
            sizes: HashMap::new(),
        }
    }

    pub fn get(&mut self, size: u32) -> &ScaledFont<'a> {
        let font = self.font;
        self.sizes.entry(size).or_insert_with(|| font.at_size(size))
    }
}
