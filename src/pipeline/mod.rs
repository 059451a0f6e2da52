use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub mod detect;
pub mod inpaint;
pub mod ocr;
mod process;
pub mod translate;

use crate::geometry::BBox;
use crate::grouping::{DEFAULT_Y_THRESHOLD, Group, group_boxes};
use crate::text::{FontFace, RenderOutcome, RenderStyle, debug::render_groups_overlay, render_text};
use detect::Detector;
use inpaint::{DEFAULT_INPAINT_PADDING, Inpainter};
use ocr::Ocr;
use translate::Translate;

/// One translated speech bubble, ready for rendering or hand editing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationUnit {
    pub group_box: BBox,
    pub japanese_text: String,
    pub english_text: String,
    /// Member boxes whose OCR produced text.
    pub original_boxes: Vec<BBox>,
}

/// The page after text removal, with the units to render onto it.
#[derive(Debug, Clone)]
pub struct PageOutput {
    pub image: RgbaImage,
    pub units: Vec<TranslationUnit>,
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    pub dir: PathBuf,
    pub emit_units: bool,
    pub debug_groups: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReport {
    pub output: PathBuf,
    pub units: usize,
    pub drawn: usize,
}

pub struct PagePipeline {
    detector: Box<dyn Detector>,
    ocr: Box<dyn Ocr>,
    translator: Box<dyn Translate>,
    inpainter: Option<Box<dyn Inpainter>>,
    font: FontFace,
    style: RenderStyle,
    y_threshold: i32,
    inpaint_padding: i32,
}

impl PagePipeline {
    pub fn new(
        detector: Box<dyn Detector>,
        ocr: Box<dyn Ocr>,
        translator: Box<dyn Translate>,
        font: FontFace,
    ) -> Self {
        Self {
            detector,
            ocr,
            translator,
            inpainter: None,
            font,
            style: RenderStyle::default(),
            y_threshold: DEFAULT_Y_THRESHOLD,
            inpaint_padding: DEFAULT_INPAINT_PADDING,
        }
    }

    pub fn with_inpainter(mut self, inpainter: Box<dyn Inpainter>) -> Self {
        self.inpainter = Some(inpainter);
        self
    }

    pub fn with_style(mut self, style: RenderStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_y_threshold(mut self, y_threshold: i32) -> Self {
        self.y_threshold = y_threshold;
        self
    }

    pub fn with_inpaint_padding(mut self, padding: i32) -> Self {
        self.inpaint_padding = padding;
        self
    }

    /// Detects, groups, reads and translates a page, then removes the
    /// original lettering. Nothing is rendered yet.
    ///
    /// Only a load or detection failure is an error. Boxes and groups
    /// that fail later are skipped, and a failed inpainting pass keeps
    /// the original page.
    pub fn run(&self, image_path: &Path) -> Result<PageOutput> {
        info!("page: {}", image_path.display());
        let image = image::open(image_path)
            .with_context(|| format!("failed to load image: {}", image_path.display()))?
            .to_rgba8();

        let boxes = self
            .detector
            .detect(image_path)
            .with_context(|| "text detection failed")?;
        if boxes.is_empty() {
            warn!("page: no text regions detected");
            return Ok(PageOutput {
                image,
                units: Vec::new(),
                groups: Vec::new(),
            });
        }
        info!("page: detected {} text regions", boxes.len());

        let groups = group_boxes(&boxes, self.y_threshold);
        info!(
            "page: grouped {} boxes into {} translation units",
            boxes.len(),
            groups.len()
        );

        let units = self.translate_groups(&image, &groups);
        if units.is_empty() {
            warn!("page: nothing was extracted and translated; keeping the original image");
            return Ok(PageOutput {
                image,
                units,
                groups,
            });
        }

        let image = match &self.inpainter {
            Some(inpainter) => {
                match inpainter.inpaint(image_path, &image, &boxes, self.inpaint_padding) {
                    Ok(inpainted) => {
                        info!("page: inpainting complete");
                        inpainted
                    }
                    Err(err) => {
                        error!("page: inpainting failed: {:#}; keeping the original image", err);
                        image
                    }
                }
            }
            None => image,
        };

        Ok(PageOutput {
            image,
            units,
            groups,
        })
    }

    fn translate_groups(&self, image: &RgbaImage, groups: &[Group]) -> Vec<TranslationUnit> {
        let total = groups.len();
        let mut units = Vec::with_capacity(total);
        for (index, group) in groups.iter().enumerate() {
            let number = index + 1;
            let mut texts = Vec::new();
            let mut recognized = Vec::new();
            for bbox in group.boxes() {
                match self.recognize_box(image, bbox) {
                    Ok(Some(text)) => {
                        texts.push(text);
                        recognized.push(*bbox);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        error!("group {}/{}: OCR failed for {:?}: {:#}", number, total, bbox, err)
                    }
                }
            }

            let japanese_text = texts.join(" ");
            if japanese_text.trim().is_empty() {
                warn!("group {}/{}: no text extracted; skipping", number, total);
                continue;
            }
            info!("group {}/{}: source '{}'", number, total, preview(&japanese_text));

            let english_text = match self.translator.translate(&japanese_text) {
                Ok(text) => text,
                Err(err) => {
                    error!("group {}/{}: translation failed: {:#}", number, total, err);
                    continue;
                }
            };
            info!("group {}/{}: translated '{}'", number, total, preview(&english_text));

            units.push(TranslationUnit {
                group_box: group.bbox(),
                japanese_text,
                english_text,
                original_boxes: recognized,
            });
        }
        units
    }

    fn recognize_box(&self, image: &RgbaImage, bbox: &BBox) -> Result<Option<String>> {
        let Some(region) = bbox.clamp_to(image.width(), image.height()) else {
            debug!("ocr: {:?} lies outside the page", bbox);
            return Ok(None);
        };
        let crop = image::imageops::crop_imm(
            image,
            region.x_min as u32,
            region.y_min as u32,
            region.width() as u32,
            region.height() as u32,
        )
        .to_image();
        let text = self.ocr.recognize(&crop)?;
        Ok(text.filter(|text| !text.trim().is_empty()))
    }

    /// Draws every unit's translation into its group box and returns how
    /// many were drawn.
    pub fn render_units(&self, image: &mut RgbaImage, units: &[TranslationUnit]) -> usize {
        let mut drawn = 0;
        for (index, unit) in units.iter().enumerate() {
            let outcome = render_text(
                image,
                &self.font,
                &unit.english_text,
                unit.group_box,
                &self.style,
            );
            match outcome {
                RenderOutcome::Drawn { fit, .. } => {
                    debug!(
                        "render {}/{}: size {}, {} lines",
                        index + 1,
                        units.len(),
                        fit.font_size,
                        fit.wrapped_text.lines().count()
                    );
                    drawn += 1;
                }
                RenderOutcome::TooSmall => warn!(
                    "render {}/{}: box {:?} is too small after padding; skipped",
                    index + 1,
                    units.len(),
                    unit.group_box
                ),
                RenderOutcome::Empty => {
                    debug!("render {}/{}: nothing to draw", index + 1, units.len())
                }
            }
        }
        drawn
    }

    /// Runs the page end to end and writes the result into `options.dir`.
    pub fn process_page(&self, input: &Path, options: &OutputOptions) -> Result<PageReport> {
        let PageOutput {
            mut image,
            units,
            groups,
        } = self.run(input)?;
        let drawn = self.render_units(&mut image, &units);

        std::fs::create_dir_all(&options.dir).with_context(|| {
            format!("failed to create output directory: {}", options.dir.display())
        })?;
        let output = output_path(input, &options.dir);
        save_image(&image, &output)?;
        info!("page: saved {}", output.display());

        if options.emit_units {
            let path = output.with_extension("json");
            let json = serde_json::to_string_pretty(&units)?;
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write units: {}", path.display()))?;
        }
        if options.debug_groups && !groups.is_empty() {
            let overlay = render_groups_overlay(&image, &groups)?;
            let path = options.dir.join(format!("{}_groups.png", file_stem(input)));
            overlay
                .save_with_format(&path, ImageFormat::Png)
                .with_context(|| format!("failed to write overlay: {}", path.display()))?;
        }

        Ok(PageReport {
            output,
            units: units.len(),
            drawn,
        })
    }
}

/// `<dir>/<stem>_translated.<ext>`, defaulting to png without an extension.
pub fn output_path(input: &Path, dir: &Path) -> PathBuf {
    let extension = input
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or("png");
    dir.join(format!("{}_translated.{}", file_stem(input), extension))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("page")
        .to_string()
}

fn save_image(image: &RgbaImage, path: &Path) -> Result<()> {
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
    let result = match format {
        ImageFormat::Jpeg => image::DynamicImage::ImageRgba8(image.clone())
            .to_rgb8()
            .save_with_format(path, format),
        _ => image.save_with_format(path, format),
    };
    result.with_context(|| format!("failed to save image: {}", path.display()))
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(30).collect();
    if text.chars().count() > 30 {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_keeps_extension() {
        let dir = Path::new("output");
        assert_eq!(
            output_path(Path::new("/pages/ch1_p03.jpg"), dir),
            PathBuf::from("output/ch1_p03_translated.jpg")
        );
        assert_eq!(
            output_path(Path::new("scan"), dir),
            PathBuf::from("output/scan_translated.png")
        );
    }

    #[test]
    fn preview_truncates_long_text() {
        assert_eq!(preview("short"), "short");
        let long = "あ".repeat(40);
        assert_eq!(preview(&long), format!("{}...", "あ".repeat(30)));
    }
}
