use anyhow::{Context, Result, anyhow, bail};
use futures_util::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

pub mod geometry;
pub mod grouping;
pub mod logging;
pub mod pipeline;
pub mod settings;
pub mod text;

pub use geometry::BBox;
pub use grouping::{Group, group_bounding_box, group_boxes};
pub use pipeline::{OutputOptions, PageOutput, PagePipeline, PageReport, TranslationUnit};
pub use settings::{InpaintBackend, Settings};
pub use text::{FitResult, FontFace, RenderOutcome, RenderStyle, fit_text, render_text};

use pipeline::detect::BoxesFileDetector;
use pipeline::inpaint::{FillInpainter, IopaintCli};
use pipeline::ocr::CommandOcr;
use pipeline::translate::{CommandTranslator, TranslationService};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub inputs: Vec<PathBuf>,
    pub boxes: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub settings_path: Option<String>,
    pub y_threshold: Option<i32>,
    pub inpaint: Option<String>,
    pub emit_units: bool,
    pub debug_groups: bool,
    pub jobs: Option<usize>,
}

#[derive(Debug)]
pub struct PageResult {
    pub input: PathBuf,
    pub outcome: Result<PageReport>,
}

/// Results in input order.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub pages: Vec<PageResult>,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.pages.iter().filter(|page| page.outcome.is_err()).count()
    }
}

pub async fn run(config: Config) -> Result<BatchSummary> {
    if config.inputs.is_empty() {
        bail!("no input images given");
    }
    if config.boxes.is_some() && config.inputs.len() > 1 {
        bail!("--boxes applies to a single page; use <stem>.boxes.json sidecars for batches");
    }

    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    let pipeline = Arc::new(build_pipeline(&settings, &config)?);
    let options = OutputOptions {
        dir: config
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&settings.output_dir)),
        emit_units: config.emit_units,
        debug_groups: config.debug_groups,
    };

    Ok(process_batch(pipeline, config.inputs, options, config.jobs).await)
}

/// Processes pages concurrently on blocking workers. A failing page is
/// reported in its slot and does not stop the others.
pub async fn process_batch(
    pipeline: Arc<PagePipeline>,
    inputs: Vec<PathBuf>,
    options: OutputOptions,
    jobs: Option<usize>,
) -> BatchSummary {
    let concurrency = jobs.unwrap_or_else(num_cpus::get).max(1);
    info!("batch: {} pages, {} at a time", inputs.len(), concurrency);
    let options = Arc::new(options);

    let mut results: Vec<(usize, PageResult)> = stream::iter(inputs.into_iter().enumerate())
        .map(|(index, input)| {
            let pipeline = Arc::clone(&pipeline);
            let options = Arc::clone(&options);
            async move {
                let page = input.clone();
                let outcome =
                    tokio::task::spawn_blocking(move || pipeline.process_page(&page, &options))
                        .await
                        .map_err(|err| anyhow!("page task failed: {}", err))
                        .and_then(|result| result);
                if let Err(err) = &outcome {
                    error!("page {}: {:#}", input.display(), err);
                }
                (index, PageResult { input, outcome })
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);
    BatchSummary {
        pages: results.into_iter().map(|(_, page)| page).collect(),
    }
}

/// Wires the command-line collaborators described by `settings`, with
/// `config` overrides applied.
pub fn build_pipeline(settings: &Settings, config: &Config) -> Result<PagePipeline> {
    let font = text::load_font(
        settings.font_path.as_deref().map(Path::new),
        settings.fallback_font_path.as_deref().map(Path::new),
        settings.font_family.as_deref(),
    );
    let style = RenderStyle {
        text_color: text::parse_color(&settings.text_color)
            .with_context(|| "invalid render.text_color")?,
        outline_color: text::parse_color(&settings.outline_color)
            .with_context(|| "invalid render.outline_color")?,
        padding: settings.padding,
        max_font_size: settings.max_font_size,
        min_font_size: settings.min_font_size,
        ..RenderStyle::default()
    };

    let detector = BoxesFileDetector::new(config.boxes.clone());
    let ocr = CommandOcr::new(settings.ocr_program.clone(), settings.ocr_args.clone());
    let backend = CommandTranslator::new(
        settings.translate_program.clone(),
        settings.translate_args.clone(),
    );
    let translator = TranslationService::new(
        Box::new(backend),
        settings.dictionary_path.as_ref().map(PathBuf::from),
    );
    if let Err(err) = translator.ensure_initialized() {
        error!("translate: initialization failed: {:#}", err);
    }

    let mut pipeline = PagePipeline::new(
        Box::new(detector),
        Box::new(ocr),
        Box::new(translator),
        font,
    )
    .with_style(style)
    .with_y_threshold(config.y_threshold.unwrap_or(settings.y_threshold))
    .with_inpaint_padding(settings.inpaint_padding);

    let backend = match config.inpaint.as_deref() {
        Some(value) => InpaintBackend::parse(value)?,
        None => settings.inpaint_backend,
    };
    pipeline = match backend {
        InpaintBackend::Iopaint => pipeline.with_inpainter(Box::new(IopaintCli::new(
            settings.inpaint_program.clone(),
            settings.inpaint_model.clone(),
            settings.inpaint_device.clone(),
        ))),
        InpaintBackend::Fill => {
            let color = text::parse_color(&settings.inpaint_fill_color)
                .with_context(|| "invalid inpaint.fill_color")?;
            pipeline.with_inpainter(Box::new(FillInpainter::new(color)))
        }
        InpaintBackend::None => pipeline,
    };
    Ok(pipeline)
}
