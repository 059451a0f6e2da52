use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

use super::process::run_capture;

/// Translation of one unit of source text.
pub trait Translate: Send + Sync {
    fn translate(&self, text: &str) -> Result<String>;
}

/// The primary machine translation engine behind [`TranslationService`].
pub trait TranslateBackend: Send + Sync {
    fn translate(&self, text: &str) -> Result<String>;
}

/// Pipes the source text to an external translator's stdin and reads the
/// translation from stdout.
#[derive(Debug, Clone)]
pub struct CommandTranslator {
    program: String,
    args: Vec<String>,
}

impl CommandTranslator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl TranslateBackend for CommandTranslator {
    fn translate(&self, text: &str) -> Result<String> {
        let stdout = run_capture(&self.program, &self.args, Some(text))?;
        Ok(stdout.trim().to_string())
    }
}

/// Kanji to English meanings, used when the backend returns nothing.
#[derive(Debug, Clone, Default)]
pub struct KanjiDictionary {
    entries: HashMap<char, Vec<String>>,
}

impl KanjiDictionary {
    /// Loads a joyo-style CSV: one header row, the kanji in the second
    /// column and `|`-separated meanings in the eighth.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read kanji dictionary: {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();
        for row in content.lines().skip(1) {
            let fields = split_csv_row(row);
            if fields.len() <= 7 {
                continue;
            }
            let mut kanji = fields[1].trim().chars();
            let (Some(ch), None) = (kanji.next(), kanji.next()) else {
                continue;
            };
            let meanings: Vec<String> = fields[7]
                .split('|')
                .map(str::trim)
                .filter(|meaning| !meaning.is_empty())
                .map(str::to_string)
                .collect();
            if !meanings.is_empty() {
                entries.insert(ch, meanings);
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_meaning(&self, ch: char) -> Option<&str> {
        self.entries
            .get(&ch)
            .and_then(|meanings| meanings.first())
            .map(String::as_str)
    }

    /// Replaces every known kanji with `[meaning]`, keeping other
    /// characters as they are.
    pub fn gloss(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() * 2);
        for ch in text.chars() {
            match self.first_meaning(ch) {
                Some(meaning) => {
                    out.push('[');
                    out.push_str(meaning);
                    out.push(']');
                }
                None => out.push(ch),
            }
        }
        out
    }
}

fn split_csv_row(row: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = row.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            '\r' if !in_quotes => {}
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// Translation service handed to the pipeline.
///
/// The kanji dictionary is loaded on first use (or on an explicit
/// [`TranslationService::ensure_initialized`]) and kept for the lifetime
/// of the service.
pub struct TranslationService {
    backend: Box<dyn TranslateBackend>,
    dictionary_path: Option<PathBuf>,
    dictionary: OnceLock<KanjiDictionary>,
}

impl TranslationService {
    pub fn new(backend: Box<dyn TranslateBackend>, dictionary_path: Option<PathBuf>) -> Self {
        Self {
            backend,
            dictionary_path,
            dictionary: OnceLock::new(),
        }
    }

    pub fn with_dictionary(backend: Box<dyn TranslateBackend>, dictionary: KanjiDictionary) -> Self {
        let service = Self::new(backend, None);
        let _ = service.dictionary.set(dictionary);
        service
    }

    /// Loads the dictionary once. Later calls are no-ops; a failed load
    /// is retried on the next call.
    pub fn ensure_initialized(&self) -> Result<()> {
        if self.dictionary.get().is_some() {
            return Ok(());
        }
        let dictionary = match &self.dictionary_path {
            Some(path) => {
                let dictionary = KanjiDictionary::load(path)?;
                info!("translate: kanji dictionary loaded ({} entries)", dictionary.len());
                dictionary
            }
            None => KanjiDictionary::default(),
        };
        let _ = self.dictionary.set(dictionary);
        Ok(())
    }

    fn dictionary(&self) -> Result<&KanjiDictionary> {
        self.ensure_initialized()?;
        self.dictionary
            .get()
            .ok_or_else(|| anyhow!("kanji dictionary is not initialized"))
    }
}

impl Translate for TranslationService {
    fn translate(&self, text: &str) -> Result<String> {
        let dictionary = self
            .dictionary()
            .with_context(|| "translator initialization failed")?;
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let translated = self.backend.translate(text)?;
        if !translated.trim().is_empty() || dictionary.is_empty() {
            return Ok(translated);
        }

        let glossed = dictionary.gloss(text);
        if glossed.trim() != text.trim() {
            warn!(
                "translate: empty translation for '{}'; using kanji dictionary fallback",
                text
            );
            return Ok(glossed);
        }
        Ok(translated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const JOYO: &str = "id,kanji,old,radical,strokes,grade,year,meanings,on,kun\n\
1,亜,亞,二,7,S,2010,Asia|rank next|come after,ア,\n\
2,腹,,肉,13,6,,\"abdomen|belly, stomach\",フク,はら\n\
3,空,,穴,8,1,,empty|sky|void,クウ,そら\n\
4,bad row\n";

    struct FixedBackend {
        reply: Result<String, String>,
    }

    impl FixedBackend {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
            }
        }
    }

    impl TranslateBackend for FixedBackend {
        fn translate(&self, _text: &str) -> Result<String> {
            self.reply.clone().map_err(|message| anyhow!(message))
        }
    }

    #[test]
    fn parses_joyo_rows() {
        let dictionary = KanjiDictionary::parse(JOYO);
        assert_eq!(dictionary.len(), 3);
        assert_eq!(dictionary.first_meaning('亜'), Some("Asia"));
        assert_eq!(dictionary.first_meaning('腹'), Some("abdomen"));
        assert_eq!(dictionary.first_meaning('あ'), None);
    }

    #[test]
    fn gloss_keeps_kana_and_punctuation() {
        let dictionary = KanjiDictionary::parse(JOYO);
        assert_eq!(dictionary.gloss("お腹が空いた。"), "お[abdomen]が[empty]いた。");
    }

    #[test]
    fn backend_translation_is_returned() {
        let service = TranslationService::new(Box::new(FixedBackend::ok("I'm hungry.")), None);
        assert_eq!(service.translate("お腹が空いた。").unwrap(), "I'm hungry.");
    }

    #[test]
    fn empty_translation_falls_back_to_dictionary() {
        let service = TranslationService::with_dictionary(
            Box::new(FixedBackend::ok("  ")),
            KanjiDictionary::parse(JOYO),
        );
        assert_eq!(service.translate("お腹が空いた").unwrap(), "お[abdomen]が[empty]いた");
    }

    #[test]
    fn fallback_is_skipped_when_nothing_is_known() {
        let service = TranslationService::with_dictionary(
            Box::new(FixedBackend::ok("")),
            KanjiDictionary::parse(JOYO),
        );
        assert_eq!(service.translate("ごめん").unwrap(), "");
    }

    #[test]
    fn blank_input_skips_backend() {
        let backend = FixedBackend::failing("backend must not be called");
        let service = TranslationService::new(Box::new(backend), None);
        assert_eq!(service.translate("   ").unwrap(), "");
    }

    #[test]
    fn backend_errors_propagate() {
        let service = TranslationService::new(Box::new(FixedBackend::failing("offline")), None);
        let err = service.translate("こんにちは").unwrap_err();
        assert!(format!("{:#}", err).contains("offline"));
    }

    #[test]
    fn ensure_initialized_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("joyo.csv");
        std::fs::write(&path, JOYO).expect("write dictionary");
        let service = TranslationService::new(Box::new(FixedBackend::ok("")), Some(path.clone()));
        service.ensure_initialized().unwrap();
        std::fs::remove_file(&path).expect("remove dictionary");
        service.ensure_initialized().unwrap();
        assert_eq!(service.translate("空").unwrap(), "[empty]");
    }

    #[test]
    fn missing_dictionary_fails_initialization() {
        let service = TranslationService::new(
            Box::new(FixedBackend::ok("x")),
            Some(PathBuf::from("/nonexistent/joyo.csv")),
        );
        assert!(service.ensure_initialized().is_err());
        assert!(service.translate("漢字").is_err());
    }
}
