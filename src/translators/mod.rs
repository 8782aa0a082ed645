use anyhow::{Result, anyhow};
use std::future::Future;
use std::pin::Pin;

mod deepl;
mod google;
mod retry;

pub use deepl::DeeplTranslator;
pub use google::GoogleTranslator;

pub type TranslateFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>>;

/// Translates source text into the target language. `Ok(None)` means the
/// service returned nothing usable.
pub trait TextTranslator: Send + Sync {
    fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslatorKind {
    Google,
    Deepl,
}

impl TranslatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslatorKind::Google => "google",
            TranslatorKind::Deepl => "deepl",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "google" | "gtx" => Ok(TranslatorKind::Google),
            "deepl" => Ok(TranslatorKind::Deepl),
            other => Err(anyhow!(
                "unknown translation provider '{}' (expected google or deepl)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TranslatorImpl {
    Google(GoogleTranslator),
    Deepl(DeeplTranslator),
}

impl TextTranslator for TranslatorImpl {
    fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a> {
        match self {
            TranslatorImpl::Google(translator) => translator.translate(text),
            TranslatorImpl::Deepl(translator) => translator.translate(text),
        }
    }
}

pub fn build_translator(
    kind: TranslatorKind,
    source: &str,
    target: &str,
    key: Option<String>,
) -> Result<TranslatorImpl> {
    match kind {
        TranslatorKind::Google => Ok(TranslatorImpl::Google(GoogleTranslator::new(
            source, target,
        ))),
        TranslatorKind::Deepl => {
            let key = key.ok_or_else(|| anyhow!("DeepL needs an API key (DEEPL_API_KEY)"))?;
            Ok(TranslatorImpl::Deepl(DeeplTranslator::new(
                key, source, target,
            )))
        }
    }
}

/// Explicit key first, then the provider's environment variable.
pub fn resolve_key(kind: TranslatorKind, override_key: Option<&str>) -> Option<String> {
    if let Some(key) = override_key.filter(|value| !value.trim().is_empty()) {
        return Some(key.trim().to_string());
    }
    match kind {
        TranslatorKind::Google => None,
        TranslatorKind::Deepl => get_env("DEEPL_API_KEY"),
    }
}

pub(crate) fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
