use anyhow::{Context, Result};
use image::RgbaImage;
use std::io::Write;
use tracing::debug;

use super::process::{expand_args, run_capture};

/// Text recognition for one cropped region.
pub trait Ocr: Send + Sync {
    /// `Ok(None)` when the crop holds no readable text.
    fn recognize(&self, crop: &RgbaImage) -> Result<Option<String>>;
}

/// Runs an external OCR program on a temporary PNG of the crop and reads
/// the text from its stdout.
#[derive(Debug, Clone)]
pub struct CommandOcr {
    program: String,
    args: Vec<String>,
}

impl CommandOcr {
    /// `{image}` inside `args` is replaced by the crop's path; without a
    /// placeholder the path is appended.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Ocr for CommandOcr {
    fn recognize(&self, crop: &RgbaImage) -> Result<Option<String>> {
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        image::DynamicImage::ImageRgba8(crop.clone())
            .write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush()
            .with_context(|| "failed to flush temp image for OCR")?;

        let mut args = expand_args(&self.args, Some(tmp.path()));
        if !self.args.iter().any(|arg| arg.contains("{image}")) {
            args.push(tmp.path().to_string_lossy().to_string());
        }
        let stdout = run_capture(&self.program, &args, None)?;
        let text = clean_ocr_output(&stdout);
        debug!("ocr: {} chars", text.chars().count());
        Ok((!text.is_empty()).then_some(text))
    }
}

/// Joins output lines and strips the whitespace OCR engines pad with.
fn clean_ocr_output(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("")
}
