use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::RgbaImage;
use resvg::render;
use std::io::Cursor;
use tiny_skia::Pixmap;
use usvg::{Options, Tree};

use crate::grouping::Group;

/// Draws each group's enclosing box and its member boxes over the page.
pub fn render_groups_svg(image: &RgbaImage, groups: &[Group]) -> Result<String> {
    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .with_context(|| "failed to encode page for debug overlay")?;
    let data_uri = format!("data:image/png;base64,{}", BASE64.encode(&png));
    let (width, height) = image.dimensions();

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = width,
        h = height
    ));

    for group in groups {
        for member in group.boxes() {
            svg.push_str(&format!(
                r##"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="#ff6d00" stroke-width="1" stroke-dasharray="4 2"/>"##,
                x = member.x_min,
                y = member.y_min,
                w = member.width(),
                h = member.height()
            ));
        }
        let bbox = group.bbox();
        svg.push_str(&format!(
            r##"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="#00c853" stroke-width="2"/>"##,
            x = bbox.x_min,
            y = bbox.y_min,
            w = bbox.width(),
            h = bbox.height()
        ));
    }

    svg.push_str("</svg>");
    Ok(svg)
}

pub fn rasterize_svg(svg: &str) -> Result<RgbaImage> {
    let tree = Tree::from_str(svg, &Options::default()).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))
}

/// Page with group overlays, ready to be saved.
pub fn render_groups_overlay(image: &RgbaImage, groups: &[Group]) -> Result<RgbaImage> {
    let svg = render_groups_svg(image, groups)?;
    rasterize_svg(&svg)
}
