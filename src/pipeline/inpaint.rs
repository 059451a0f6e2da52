use anyhow::{Context, Result, anyhow};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::path::Path;
use tracing::{debug, info};

use super::process::run_capture;
use crate::geometry::BBox;

pub const DEFAULT_INPAINT_PADDING: i32 = 10;

/// Removes the original lettering from a page.
pub trait Inpainter: Send + Sync {
    /// `boxes` are all detected regions of the page, ungrouped.
    fn inpaint(
        &self,
        image_path: &Path,
        image: &RgbaImage,
        boxes: &[BBox],
        padding: i32,
    ) -> Result<RgbaImage>;
}

/// Binary mask of the padded boxes: 255 where text is, 0 elsewhere.
pub fn create_mask(width: u32, height: u32, boxes: &[BBox], padding: i32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    for bbox in boxes {
        if let Some(rect) = padded_rect(bbox, padding, width, height) {
            draw_filled_rect_mut(&mut mask, rect, Luma([255]));
        }
    }
    mask
}

/// The padded box as an inclusive pixel rect, clamped to the canvas.
fn padded_rect(bbox: &BBox, padding: i32, width: u32, height: u32) -> Option<Rect> {
    let padded = bbox.padded_within(padding, width, height);
    let x_max = padded.x_max.min(width as i32 - 1);
    let y_max = padded.y_max.min(height as i32 - 1);
    if x_max < padded.x_min || y_max < padded.y_min {
        return None;
    }
    Some(
        Rect::at(padded.x_min, padded.y_min)
            .of_size((x_max - padded.x_min + 1) as u32, (y_max - padded.y_min + 1) as u32),
    )
}

/// Calls the `iopaint` CLI with a mask of the padded boxes.
#[derive(Debug, Clone)]
pub struct IopaintCli {
    program: String,
    model: String,
    device: String,
}

impl IopaintCli {
    pub fn new(program: impl Into<String>, model: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            model: model.into(),
            device: device.into(),
        }
    }
}

impl Inpainter for IopaintCli {
    fn inpaint(
        &self,
        image_path: &Path,
        image: &RgbaImage,
        boxes: &[BBox],
        padding: i32,
    ) -> Result<RgbaImage> {
        let mask = create_mask(image.width(), image.height(), boxes, padding);
        let mask_file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp mask file")?;
        mask.save_with_format(mask_file.path(), image::ImageFormat::Png)
            .with_context(|| "failed to write inpainting mask")?;
        let output_dir = tempfile::tempdir().with_context(|| "failed to create temp output dir")?;

        let args = vec![
            "run".to_string(),
            "--image".to_string(),
            image_path.to_string_lossy().to_string(),
            "--mask".to_string(),
            mask_file.path().to_string_lossy().to_string(),
            "--output".to_string(),
            output_dir.path().to_string_lossy().to_string(),
            "--model".to_string(),
            self.model.clone(),
            "--device".to_string(),
            self.device.clone(),
        ];
        info!("inpaint: running {} with model {}", self.program, self.model);
        let stdout = run_capture(&self.program, &args, None)?;
        debug!("inpaint: {}", stdout.trim());

        let output = find_output(image_path, output_dir.path())?;
        let result = image::open(&output)
            .with_context(|| format!("failed to open inpainted image: {}", output.display()))?
            .to_rgba8();
        Ok(result)
    }
}

fn find_output(image_path: &Path, output_dir: &Path) -> Result<std::path::PathBuf> {
    let stem = image_path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    let expected = output_dir.join(format!("{}_out.png", stem));
    if expected.exists() {
        return Ok(expected);
    }
    let mut produced: Vec<_> = std::fs::read_dir(output_dir)
        .with_context(|| format!("failed to list {}", output_dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .collect();
    produced.sort();
    produced
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("inpainter did not produce an output image"))
}

/// Paints the padded boxes with a solid color. Works well on plain
/// white speech bubbles and needs no external model.
#[derive(Debug, Clone)]
pub struct FillInpainter {
    color: Rgba<u8>,
}

impl FillInpainter {
    pub fn new(color: Rgba<u8>) -> Self {
        Self { color }
    }
}

impl Default for FillInpainter {
    fn default() -> Self {
        Self::new(Rgba([255, 255, 255, 255]))
    }
}

impl Inpainter for FillInpainter {
    fn inpaint(
        &self,
        _image_path: &Path,
        image: &RgbaImage,
        boxes: &[BBox],
        padding: i32,
    ) -> Result<RgbaImage> {
        let mut out = image.clone();
        for bbox in boxes {
            if let Some(rect) = padded_rect(bbox, padding, image.width(), image.height()) {
                draw_filled_rect_mut(&mut out, rect, self.color);
            }
        }
        Ok(out)
    }
}
