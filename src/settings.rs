use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InpaintBackend {
    Iopaint,
    Fill,
    None,
}

impl InpaintBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "iopaint" | "lama" => Ok(Self::Iopaint),
            "fill" => Ok(Self::Fill),
            "none" | "off" => Ok(Self::None),
            other => Err(anyhow!(
                "unknown inpaint backend '{}' (expected iopaint, fill or none)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub y_threshold: i32,
    pub font_path: Option<String>,
    pub fallback_font_path: Option<String>,
    pub font_family: Option<String>,
    pub max_font_size: u32,
    pub min_font_size: u32,
    pub padding: i32,
    pub text_color: String,
    pub outline_color: String,
    pub ocr_program: String,
    pub ocr_args: Vec<String>,
    pub translate_program: String,
    pub translate_args: Vec<String>,
    pub dictionary_path: Option<String>,
    pub inpaint_backend: InpaintBackend,
    pub inpaint_program: String,
    pub inpaint_model: String,
    pub inpaint_device: String,
    pub inpaint_padding: i32,
    pub inpaint_fill_color: String,
    pub output_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            y_threshold: 50,
            font_path: None,
            fallback_font_path: None,
            font_family: None,
            max_font_size: 50,
            min_font_size: 10,
            padding: 5,
            text_color: "#000000".to_string(),
            outline_color: "#ffffff".to_string(),
            ocr_program: "tesseract".to_string(),
            ocr_args: Vec::new(),
            translate_program: "argos-translate".to_string(),
            translate_args: Vec::new(),
            dictionary_path: None,
            inpaint_backend: InpaintBackend::Iopaint,
            inpaint_program: "iopaint".to_string(),
            inpaint_model: "lama".to_string(),
            inpaint_device: "cpu".to_string(),
            inpaint_padding: 10,
            inpaint_fill_color: "#ffffff".to_string(),
            output_dir: "output".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    grouping: Option<GroupingSettings>,
    render: Option<RenderSettings>,
    ocr: Option<CommandSettings>,
    translate: Option<TranslateSettings>,
    inpaint: Option<InpaintSettings>,
    output: Option<OutputSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct GroupingSettings {
    y_threshold: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderSettings {
    font_path: Option<String>,
    fallback_font_path: Option<String>,
    font_family: Option<String>,
    max_font_size: Option<u32>,
    min_font_size: Option<u32>,
    padding: Option<i32>,
    text_color: Option<String>,
    outline_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CommandSettings {
    program: Option<String>,
    args: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateSettings {
    program: Option<String>,
    args: Option<Vec<String>>,
    dictionary_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InpaintSettings {
    backend: Option<String>,
    program: Option<String>,
    model: Option<String>,
    device: Option<String>,
    padding: Option<i32>,
    fill_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSettings {
    dir: Option<String>,
}

/// Loads the embedded defaults, then `./settings.toml`,
/// `./settings.local.toml`, the same pair under
/// `~/.manga-translator-rust/`, and finally `extra_path`. Later files win.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
    }
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        ordered_paths.push(extra.to_path_buf());
    }

    load_settings_from(&ordered_paths)
}

/// Merges the existing files of `paths`, in order, over the defaults.
pub fn load_settings_from(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    settings
        .merge_str(DEFAULT_SETTINGS_TOML)
        .with_context(|| "failed to parse built-in settings")?;

    for path in paths {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings
                .merge_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    if settings.min_font_size > settings.max_font_size {
        return Err(anyhow!(
            "render.min_font_size ({}) exceeds render.max_font_size ({})",
            settings.min_font_size,
            settings.max_font_size
        ));
    }
    Ok(settings)
}

impl Settings {
    fn merge_str(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed)
    }

    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(grouping) = incoming.grouping {
            if let Some(threshold) = grouping.y_threshold {
                self.y_threshold = threshold;
            }
        }
        if let Some(render) = incoming.render {
            merge_optional(&mut self.font_path, render.font_path);
            merge_optional(&mut self.fallback_font_path, render.fallback_font_path);
            merge_optional(&mut self.font_family, render.font_family);
            if let Some(size) = render.max_font_size.filter(|size| *size > 0) {
                self.max_font_size = size;
            }
            if let Some(size) = render.min_font_size.filter(|size| *size > 0) {
                self.min_font_size = size;
            }
            if let Some(padding) = render.padding.filter(|padding| *padding >= 0) {
                self.padding = padding;
            }
            merge_string(&mut self.text_color, render.text_color);
            merge_string(&mut self.outline_color, render.outline_color);
        }
        if let Some(ocr) = incoming.ocr {
            merge_string(&mut self.ocr_program, ocr.program);
            if let Some(args) = ocr.args {
                self.ocr_args = args;
            }
        }
        if let Some(translate) = incoming.translate {
            merge_string(&mut self.translate_program, translate.program);
            if let Some(args) = translate.args {
                self.translate_args = args;
            }
            merge_optional(&mut self.dictionary_path, translate.dictionary_path);
        }
        if let Some(inpaint) = incoming.inpaint {
            if let Some(backend) = inpaint.backend {
                if !backend.trim().is_empty() {
                    self.inpaint_backend = InpaintBackend::parse(&backend)?;
                }
            }
            merge_string(&mut self.inpaint_program, inpaint.program);
            merge_string(&mut self.inpaint_model, inpaint.model);
            merge_string(&mut self.inpaint_device, inpaint.device);
            if let Some(padding) = inpaint.padding.filter(|padding| *padding >= 0) {
                self.inpaint_padding = padding;
            }
            merge_string(&mut self.inpaint_fill_color, inpaint.fill_color);
        }
        if let Some(output) = incoming.output {
            merge_string(&mut self.output_dir, output.dir);
        }
        Ok(())
    }
}

/// Blank strings leave the current value alone.
fn merge_string(target: &mut String, value: Option<String>) {
    if let Some(value) = value {
        if !value.trim().is_empty() {
            *target = value;
        }
    }
}

fn merge_optional(target: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        if !value.trim().is_empty() {
            *target = Some(value);
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".manga-translator-rust"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn built_in_defaults() {
        let settings = load_settings_from(&[]).unwrap();
        assert_eq!(settings.y_threshold, 50);
        assert_eq!(settings.max_font_size, 50);
        assert_eq!(settings.min_font_size, 10);
        assert_eq!(settings.padding, 5);
        assert_eq!(settings.font_path, None);
        assert_eq!(settings.font_family.as_deref(), Some("sans-serif"));
        assert_eq!(settings.ocr_args, vec!["{image}", "stdout", "-l", "jpn"]);
        assert_eq!(settings.inpaint_backend, InpaintBackend::Iopaint);
        assert_eq!(settings.inpaint_padding, 10);
        assert_eq!(settings.output_dir, "output");
    }

    #[test]
    fn later_files_override_earlier_ones() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path().join("settings.toml");
        let local = dir.path().join("settings.local.toml");
        fs::write(
            &base,
            "[grouping]\ny_threshold = 30\n[render]\nfont_path = \"/fonts/a.ttf\"\nmax_font_size = 40\n",
        )
        .expect("write base");
        fs::write(
            &local,
            "[grouping]\ny_threshold = 20\n[render]\nfont_path = \"\"\n[inpaint]\nbackend = \"fill\"\n",
        )
        .expect("write local");

        let settings =
            load_settings_from(&[base, dir.path().join("missing.toml"), local]).unwrap();
        assert_eq!(settings.y_threshold, 20);
        assert_eq!(settings.font_path.as_deref(), Some("/fonts/a.ttf"));
        assert_eq!(settings.max_font_size, 40);
        assert_eq!(settings.inpaint_backend, InpaintBackend::Fill);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[inpaint]\nbackend = \"magic\"\n").expect("write");
        assert!(load_settings_from(&[path.clone()]).is_err());

        fs::write(&path, "[render]\nmin_font_size = 60\n").expect("write");
        assert!(load_settings_from(&[path.clone()]).is_err());

        fs::write(&path, "[render\n").expect("write");
        assert!(load_settings_from(&[path]).is_err());
    }

    #[test]
    fn font_range_may_be_split_across_files() {
        let dir = tempdir().expect("tempdir");
        let first = dir.path().join("a.toml");
        let second = dir.path().join("b.toml");
        fs::write(&first, "[render]\nmax_font_size = 8\n").expect("write a");
        fs::write(&second, "[render]\nmin_font_size = 6\n").expect("write b");

        let settings = load_settings_from(&[first.clone(), second]).unwrap();
        assert_eq!(settings.max_font_size, 8);
        assert_eq!(settings.min_font_size, 6);

        let err = load_settings_from(&[first]).unwrap_err();
        assert!(err.to_string().contains("exceeds render.max_font_size"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = load_settings(Some(Path::new("/nonexistent/extra.toml"))).unwrap_err();
        assert!(err.to_string().contains("settings file not found"));
    }

    #[test]
    fn parses_backend_names() {
        assert_eq!(InpaintBackend::parse("IOPaint").unwrap(), InpaintBackend::Iopaint);
        assert_eq!(InpaintBackend::parse("none").unwrap(), InpaintBackend::None);
        assert!(InpaintBackend::parse("").is_err());
    }
}
